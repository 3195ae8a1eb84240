//! Calendar periods for recurring tasks.
//!
//! Every recurring frequency partitions the calendar into periods (days, Monday-based ISO
//! weeks, months, calendar quarters). A period is identified by a string key derived from
//! any date inside it; completion records are stored against that key, so generation and
//! lookup must both go through [`period_identifier`].

use std::fmt;

use chrono::{Datelike, Days, Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::fields::Frequency;

/// Key of one calendar period: `YYYY-MM-DD` (daily, weekly), `YYYY-MM` (monthly) or
/// `YYYY-Q<n>` (quarterly).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeriodId(String);

impl PeriodId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeriodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeriodId {
    fn from(s: &str) -> Self {
        PeriodId(s.to_string())
    }
}

/// Derive the identifier of the period containing `date`. One-time tasks are not
/// periodized and yield `None`.
pub fn period_identifier(date: NaiveDate, frequency: Frequency) -> Option<PeriodId> {
    let id = match frequency {
        Frequency::OneTime => return None,
        Frequency::Daily => date.format("%Y-%m-%d").to_string(),
        Frequency::Weekly => start_of_week(date).format("%Y-%m-%d").to_string(),
        Frequency::Monthly => start_of_month(date).format("%Y-%m").to_string(),
        Frequency::Quarterly => format!("{}-Q{}", date.year(), quarter_of(date)),
    };
    Some(PeriodId(id))
}

/// Monday of the ISO week containing `date`, clamped to the first representable date.
pub fn start_of_week(date: NaiveDate) -> NaiveDate {
    date.checked_sub_days(Days::new(date.weekday().num_days_from_monday().into()))
        .unwrap_or(NaiveDate::MIN)
}

pub fn start_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Calendar quarter (1-4) of `date`.
pub fn quarter_of(date: NaiveDate) -> u32 {
    date.month0() / 3 + 1
}

/// First day of the calendar quarter (Jan, Apr, Jul, Oct) containing `date`.
pub fn start_of_quarter(date: NaiveDate) -> NaiveDate {
    let month = (quarter_of(date) - 1) * 3 + 1;
    NaiveDate::from_ymd_opt(date.year(), month, 1).unwrap_or(date)
}

/// First day of the period containing `date`. One-time tasks are their own period.
pub fn period_start(date: NaiveDate, frequency: Frequency) -> NaiveDate {
    match frequency {
        Frequency::OneTime | Frequency::Daily => date,
        Frequency::Weekly => start_of_week(date),
        Frequency::Monthly => start_of_month(date),
        Frequency::Quarterly => start_of_quarter(date),
    }
}

/// First day of the period following the one that starts at `start`.
///
/// Returns `None` at the end of chrono's representable range.
pub fn next_period_start(start: NaiveDate, frequency: Frequency) -> Option<NaiveDate> {
    match frequency {
        Frequency::OneTime | Frequency::Daily => start.succ_opt(),
        Frequency::Weekly => start.checked_add_signed(Duration::days(7)),
        Frequency::Monthly => start.checked_add_months(Months::new(1)),
        Frequency::Quarterly => start.checked_add_months(Months::new(3)),
    }
}

/// Last day of the period containing `date`.
pub fn period_end(date: NaiveDate, frequency: Frequency) -> NaiveDate {
    let start = period_start(date, frequency);
    next_period_start(start, frequency)
        .and_then(|next| next.pred_opt())
        .unwrap_or(NaiveDate::MAX)
}

/// Iterator over the start dates of every period intersecting `[from, to]`.
///
/// The first anchor is the natural start of the period containing `from`, which may fall
/// before `from` when the range begins mid-period.
#[derive(Debug, Clone)]
pub struct PeriodAnchors {
    next: Option<NaiveDate>,
    to: NaiveDate,
    frequency: Frequency,
}

impl Iterator for PeriodAnchors {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        let current = self.next.filter(|d| *d <= self.to)?;
        self.next = next_period_start(current, self.frequency);
        Some(current)
    }
}

/// Enumerate period anchors for a recurring frequency over an inclusive range. An
/// inverted range or a one-time frequency yields nothing.
pub fn period_anchors(from: NaiveDate, to: NaiveDate, frequency: Frequency) -> PeriodAnchors {
    let next = if from > to || !frequency.is_recurring() {
        None
    } else {
        Some(period_start(from, frequency))
    };
    PeriodAnchors { next, to, frequency }
}

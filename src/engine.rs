//! Instance materialization.
//!
//! Given task templates, the sparse set of completion records and a date window, produce
//! every task instance visible in that window with its status resolved. The derivation is
//! pure: it is re-run in full on every load and never mutates its inputs.

use std::collections::HashMap;

use chrono::{Days, Duration, NaiveDate};
use tracing::{debug, warn};

use crate::error::Result;
use crate::fields::*;
use crate::instance::{RecurringInstance, TaskInstance};
use crate::period::{period_anchors, period_end, period_identifier, start_of_week, PeriodId};
use crate::task::{CompletionRecord, Schedule, TaskTemplate};

/// Inclusive date range of a query. An inverted window (`to < from`) is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateWindow {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        DateWindow { from, to }
    }

    /// Default listing window: from the Monday `weeks_back` weeks ago to `weeks_ahead`
    /// weeks from today. `None` when either end leaves chrono's date range.
    pub fn around(today: NaiveDate, weeks_back: u32, weeks_ahead: u32) -> Option<Self> {
        let back = today.checked_sub_signed(Duration::try_weeks(weeks_back.into())?)?;
        let to = today.checked_add_signed(Duration::try_weeks(weeks_ahead.into())?)?;
        Some(DateWindow { from: start_of_week(back), to })
    }

    pub fn is_empty(&self) -> bool {
        self.from > self.to
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }

    /// Intersect with a template's active range `[start, end ?? +inf]`.
    pub fn clamp(&self, start: NaiveDate, end: Option<NaiveDate>) -> Option<(NaiveDate, NaiveDate)> {
        let from = self.from.max(start);
        let to = end.map_or(self.to, |e| self.to.min(e));
        (from <= to).then_some((from, to))
    }
}

/// Lookup of completion records by `(task_id, period_identifier)`.
///
/// Duplicate keys are an invariant violation upstream; the first record wins.
#[derive(Debug, Default)]
pub struct CompletionIndex<'a> {
    by_period: HashMap<(u64, &'a str), &'a CompletionRecord>,
}

impl<'a> CompletionIndex<'a> {
    pub fn new(records: &'a [CompletionRecord]) -> Self {
        let mut by_period = HashMap::with_capacity(records.len());
        for rec in records {
            by_period.entry((rec.task_id, rec.period_identifier.as_str())).or_insert(rec);
        }
        CompletionIndex { by_period }
    }

    pub fn get(&self, task_id: u64, period: &PeriodId) -> Option<&'a CompletionRecord> {
        self.by_period.get(&(task_id, period.as_str())).copied()
    }
}

/// Knobs for a derivation run.
#[derive(Debug, Clone, Copy)]
pub struct InstanceOptions {
    /// Reference date for overdue derivation.
    pub today: NaiveDate,
    pub weekly_expansion: WeeklyExpansion,
}

impl InstanceOptions {
    pub fn new(today: NaiveDate) -> Self {
        InstanceOptions { today, weekly_expansion: WeeklyExpansion::default() }
    }
}

/// Status of a recurring period: the stored completion status if any, otherwise overdue
/// once the whole period has passed, otherwise pending.
pub fn derive_status(
    completion: Option<&CompletionRecord>,
    anchor: NaiveDate,
    frequency: Frequency,
    today: NaiveDate,
) -> Status {
    match completion {
        Some(rec) => rec.status.into(),
        None if today > period_end(anchor, frequency) => Status::Overdue,
        None => Status::Pending,
    }
}

/// Materialize every instance visible in `window`, one-time and recurring, in template
/// order.
///
/// A template with malformed or missing dates is skipped with a warning; the others are
/// still instanced.
pub fn materialize(
    templates: &[TaskTemplate],
    completions: &[CompletionRecord],
    window: &DateWindow,
    opts: &InstanceOptions,
) -> Vec<TaskInstance> {
    if window.is_empty() {
        debug!(from = %window.from, to = %window.to, "inverted window, no instances");
        return Vec::new();
    }

    let index = CompletionIndex::new(completions);
    let mut instances = Vec::new();
    let mut skipped = 0usize;

    for template in templates {
        match materialize_template(template, &index, window, opts) {
            Ok(mut found) => instances.append(&mut found),
            Err(e) => {
                skipped += 1;
                warn!(task_id = template.id, error = %e, "skipping task template");
            }
        }
    }

    debug!(
        templates = templates.len(),
        instances = instances.len(),
        skipped,
        from = %window.from,
        to = %window.to,
        "materialized task instances"
    );
    instances
}

/// Instances of a single template within `window`.
pub fn materialize_template(
    template: &TaskTemplate,
    index: &CompletionIndex<'_>,
    window: &DateWindow,
    opts: &InstanceOptions,
) -> Result<Vec<TaskInstance>> {
    let (frequency, start, end, weekdays) = match template.schedule()? {
        Schedule::OneTime { due } => {
            if !window.contains(due) {
                return Ok(Vec::new());
            }
            return Ok(vec![TaskInstance::OneTime {
                task: template.clone(),
                due,
                status: template.stored_status(),
            }]);
        }
        Schedule::Recurring { frequency, start, end, weekdays } => (frequency, start, end, weekdays),
    };

    let Some((from, to)) = window.clamp(start, end) else {
        return Ok(Vec::new());
    };

    let fan_out = frequency == Frequency::Weekly
        && opts.weekly_expansion == WeeklyExpansion::PerWeekday
        && !weekdays.is_empty();

    let mut out = Vec::new();
    for anchor in period_anchors(from, to, frequency) {
        let Some(period) = period_identifier(anchor, frequency) else {
            continue;
        };
        let completion = index.get(template.id, &period);
        let status = derive_status(completion, anchor, frequency, opts.today);

        if fan_out {
            for &day in &weekdays {
                let Some(date) = anchor.checked_add_days(Days::new(day.num_days_from_monday().into())) else {
                    continue;
                };
                if date < from || date > to {
                    continue;
                }
                out.push(TaskInstance::Recurring(RecurringInstance {
                    template: template.clone(),
                    period: period.clone(),
                    instance_date: date,
                    weekday: Some(day),
                    status,
                    completion: completion.cloned(),
                }));
            }
        } else {
            out.push(TaskInstance::Recurring(RecurringInstance {
                template: template.clone(),
                period,
                instance_date: anchor,
                weekday: None,
                status,
                completion: completion.cloned(),
            }));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn one_time(id: u64, due: &str) -> TaskTemplate {
        TaskTemplate {
            id,
            title: format!("one-time {id}"),
            description: None,
            categories: vec![],
            project_names: vec![],
            assigned_partners: vec![],
            priority: None,
            frequency: Frequency::OneTime,
            due_date: Some(due.into()),
            start_date: None,
            end_date: None,
            weekly_days: vec![],
            status: None,
            estimated_duration: None,
            created_at_utc: 0,
            updated_at_utc: 0,
        }
    }

    fn recurring(id: u64, frequency: Frequency, start: &str, end: Option<&str>) -> TaskTemplate {
        TaskTemplate {
            frequency,
            due_date: None,
            start_date: Some(start.into()),
            end_date: end.map(Into::into),
            title: format!("{} {id}", frequency.as_str()),
            ..one_time(id, "2000-01-01")
        }
    }

    fn completion(task_id: u64, frequency: Frequency, period: &str, status: CompletionStatus) -> CompletionRecord {
        CompletionRecord {
            task_id,
            period_type: frequency,
            period_identifier: PeriodId::from(period),
            completion_date: d("2024-01-02"),
            status,
            completed_by: "gm@example.com".into(),
        }
    }

    fn window(from: &str, to: &str) -> DateWindow {
        DateWindow::new(d(from), d(to))
    }

    fn opts(today: &str) -> InstanceOptions {
        InstanceOptions::new(d(today))
    }

    fn periods(instances: &[TaskInstance]) -> Vec<String> {
        instances.iter().filter_map(|i| i.period().map(|p| p.to_string())).collect()
    }

    #[test]
    fn weekly_january_yields_five_monday_periods() {
        let t = recurring(1, Frequency::Weekly, "2024-01-01", Some("2024-01-31"));
        let out = materialize(&[t], &[], &window("2024-01-01", "2024-01-31"), &opts("2023-12-01"));
        assert_eq!(periods(&out), vec!["2024-01-01", "2024-01-08", "2024-01-15", "2024-01-22", "2024-01-29"]);
        assert!(out.iter().all(|i| i.is_instance() && i.template_id() == 1));
        assert_eq!(out[2].id(), "1-2024-01-15");
        assert_eq!(out[2].date(), d("2024-01-15"));
    }

    #[test]
    fn one_time_due_in_window_yields_single_pass_through() {
        let t = one_time(7, "2024-03-15");
        let out = materialize(&[t], &[], &window("2024-03-01", "2024-03-31"), &opts("2024-03-01"));
        assert_eq!(out.len(), 1);
        assert!(!out[0].is_instance());
        assert_eq!(out[0].id(), "7");
        assert_eq!(out[0].status(), Status::Pending);
    }

    #[test]
    fn one_time_window_bounds_are_inclusive() {
        let ts = vec![one_time(1, "2024-03-01"), one_time(2, "2024-03-31"), one_time(3, "2024-04-01")];
        let out = materialize(&ts, &[], &window("2024-03-01", "2024-03-31"), &opts("2024-03-01"));
        let ids: Vec<_> = out.iter().map(|i| i.id()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn one_time_status_comes_from_template() {
        let mut t = one_time(1, "2024-03-05");
        t.status = Some(Status::Completed);
        let out = materialize(&[t], &[], &window("2024-03-01", "2024-03-31"), &opts("2024-06-01"));
        assert_eq!(out[0].status(), Status::Completed);
    }

    #[test]
    fn quarterly_full_year() {
        let t = recurring(2, Frequency::Quarterly, "2024-01-01", Some("2024-12-31"));
        let out = materialize(&[t], &[], &window("2024-01-01", "2024-12-31"), &opts("2024-01-01"));
        assert_eq!(periods(&out), vec!["2024-Q1", "2024-Q2", "2024-Q3", "2024-Q4"]);
    }

    #[test]
    fn quarter_boundary_start_uses_calendar_quarter() {
        let t = recurring(2, Frequency::Quarterly, "2024-03-31", None);
        let out = materialize(&[t], &[], &window("2024-03-01", "2024-06-30"), &opts("2024-01-01"));
        assert_eq!(periods(&out), vec!["2024-Q1", "2024-Q2"]);
        assert_eq!(out[0].date(), d("2024-01-01"));
    }

    #[test]
    fn status_derivation() {
        let t = recurring(3, Frequency::Weekly, "2024-01-01", None);
        let records = vec![completion(3, Frequency::Weekly, "2024-01-08", CompletionStatus::InProgress)];
        // Today is Wednesday of the third week.
        let out = materialize(&[t], &records, &window("2024-01-01", "2024-01-21"), &opts("2024-01-17"));
        let statuses: Vec<_> = out.iter().map(|i| i.status()).collect();
        assert_eq!(statuses, vec![Status::Overdue, Status::InProgress, Status::Pending]);
        assert!(out[1].completion().is_some());
        assert!(out[0].completion().is_none());
    }

    #[test]
    fn overdue_only_after_the_whole_period() {
        let t = recurring(4, Frequency::Monthly, "2024-01-01", None);
        let w = window("2024-01-01", "2024-01-31");
        assert_eq!(materialize(&[t.clone()], &[], &w, &opts("2024-01-31"))[0].status(), Status::Pending);
        assert_eq!(materialize(&[t], &[], &w, &opts("2024-02-01"))[0].status(), Status::Overdue);
    }

    #[test]
    fn completions_of_other_templates_do_not_leak() {
        let t = recurring(5, Frequency::Daily, "2024-01-01", None);
        let records = vec![completion(6, Frequency::Daily, "2024-01-01", CompletionStatus::Completed)];
        let out = materialize(&[t], &records, &window("2024-01-01", "2024-01-01"), &opts("2024-01-01"));
        assert_eq!(out[0].status(), Status::Pending);
    }

    #[test]
    fn template_range_clamps_window() {
        let t = recurring(8, Frequency::Daily, "2024-01-10", Some("2024-01-12"));
        let out = materialize(&[t], &[], &window("2024-01-01", "2024-01-31"), &opts("2024-01-01"));
        assert_eq!(periods(&out), vec!["2024-01-10", "2024-01-11", "2024-01-12"]);
    }

    #[test]
    fn inverted_ranges_yield_nothing() {
        let inverted_template = recurring(9, Frequency::Daily, "2024-02-01", Some("2024-01-01"));
        let out = materialize(&[inverted_template], &[], &window("2024-01-01", "2024-03-01"), &opts("2024-01-01"));
        assert!(out.is_empty());

        let t = recurring(10, Frequency::Daily, "2024-01-01", None);
        assert!(materialize(&[t], &[], &window("2024-02-01", "2024-01-01"), &opts("2024-01-01")).is_empty());
    }

    #[test]
    fn template_starting_after_window_yields_nothing() {
        let t = recurring(11, Frequency::Weekly, "2024-05-01", None);
        assert!(materialize(&[t], &[], &window("2024-01-01", "2024-04-30"), &opts("2024-01-01")).is_empty());
    }

    #[test]
    fn malformed_template_does_not_block_others() {
        let mut broken = recurring(12, Frequency::Daily, "not-a-date", None);
        broken.title = "broken".into();
        let good = one_time(13, "2024-01-05");
        let mut no_start = recurring(14, Frequency::Weekly, "2024-01-01", None);
        no_start.start_date = None;
        let out = materialize(&[broken, good, no_start], &[], &window("2024-01-01", "2024-01-31"), &opts("2024-01-01"));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].template_id(), 13);
    }

    #[test]
    fn per_week_is_the_default_for_weekly_days() {
        let mut t = recurring(15, Frequency::Weekly, "2024-01-01", Some("2024-01-14"));
        t.weekly_days = vec!["monday".into(), "thursday".into()];
        let out = materialize(&[t], &[], &window("2024-01-01", "2024-01-14"), &opts("2024-01-01"));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn per_weekday_fan_out_shares_the_week_period() {
        let mut t = recurring(16, Frequency::Weekly, "2024-01-03", Some("2024-01-14"));
        t.weekly_days = vec!["monday".into(), "thursday".into()];
        let records = vec![completion(16, Frequency::Weekly, "2024-01-08", CompletionStatus::Completed)];
        let o = InstanceOptions { today: d("2024-01-01"), weekly_expansion: WeeklyExpansion::PerWeekday };
        let out = materialize(&[t], &records, &window("2024-01-01", "2024-01-14"), &o);

        // Monday 2024-01-01 precedes the template start and is dropped.
        let dates: Vec<_> = out.iter().map(|i| i.date()).collect();
        assert_eq!(dates, vec![d("2024-01-04"), d("2024-01-08"), d("2024-01-11")]);
        assert_eq!(periods(&out), vec!["2024-01-01", "2024-01-08", "2024-01-08"]);
        assert_eq!(out[1].status(), Status::Completed);
        assert_eq!(out[2].status(), Status::Completed);
        assert_eq!(out[1].id(), "16-2024-01-08-mon");
        assert_ne!(out[1].id(), out[2].id());
    }

    #[test]
    fn window_around_today_starts_on_monday() {
        let w = DateWindow::around(d("2024-01-17"), 1, 2).unwrap();
        assert_eq!(w.from, d("2024-01-08"));
        assert_eq!(w.to, d("2024-01-31"));
    }

    #[test]
    fn window_around_out_of_range_is_none() {
        assert_eq!(DateWindow::around(d("2024-01-17"), 100_000_000, 2), None);
        assert_eq!(DateWindow::around(d("2024-01-17"), 1, u32::MAX), None);
    }

    #[test]
    fn weekday_fan_out_near_the_end_of_time_does_not_panic() {
        let mut t = recurring(3, Frequency::Weekly, "2024-01-01", None);
        t.weekly_days = vec!["mon".into(), "sun".into()];
        let last = NaiveDate::MAX;
        let opts = InstanceOptions { today: last, weekly_expansion: WeeklyExpansion::PerWeekday };
        let out = materialize(&[t], &[], &DateWindow::new(last, last), &opts);
        assert!(out.iter().all(|i| i.date() <= last));
    }

    #[test]
    fn duplicate_completion_records_first_wins() {
        let records = vec![
            completion(1, Frequency::Daily, "2024-01-01", CompletionStatus::Completed),
            completion(1, Frequency::Daily, "2024-01-01", CompletionStatus::InProgress),
        ];
        let index = CompletionIndex::new(&records);
        let found = index.get(1, &PeriodId::from("2024-01-01")).unwrap();
        assert_eq!(found.status, CompletionStatus::Completed);
    }

    fn arb_date() -> impl Strategy<Value = NaiveDate> {
        (0i64..1500).prop_map(|off| d("2023-01-01") + Duration::days(off))
    }

    fn arb_frequency() -> impl Strategy<Value = Frequency> {
        prop_oneof![
            Just(Frequency::Daily),
            Just(Frequency::Weekly),
            Just(Frequency::Monthly),
            Just(Frequency::Quarterly),
        ]
    }

    proptest! {
        /// A one-time task appears iff its due date is inside the window.
        #[test]
        fn one_time_membership(due in arb_date(), a in arb_date(), b in arb_date()) {
            let t = one_time(1, &due.format("%Y-%m-%d").to_string());
            let out = materialize(&[t], &[], &DateWindow::new(a, b), &InstanceOptions::new(a));
            prop_assert_eq!(out.len() == 1, a <= due && due <= b);
        }

        /// Windows split on a period boundary never emit the same period twice.
        #[test]
        fn split_windows_are_disjoint(freq in arb_frequency(), a in arb_date(), len in 0i64..400, cut in 0i64..400) {
            let t = recurring(1, freq, "2023-01-01", None);
            let b = a + Duration::days(len);
            let split = crate::period::period_start(a + Duration::days(cut.min(len)), freq);
            prop_assume!(split > a);
            let o = InstanceOptions::new(a);
            let left = materialize(&[t.clone()], &[], &DateWindow::new(a, split.pred_opt().unwrap()), &o);
            let right = materialize(&[t], &[], &DateWindow::new(split, b), &o);
            let left_ids: std::collections::HashSet<_> = periods(&left).into_iter().collect();
            for id in periods(&right) {
                prop_assert!(!left_ids.contains(&id));
            }
        }

        /// Re-deriving the identifier from an instance date reproduces the instance's period.
        #[test]
        fn period_identifier_is_consistent(freq in arb_frequency(), a in arb_date(), len in 0i64..200) {
            let t = recurring(1, freq, "2023-01-01", None);
            let out = materialize(&[t], &[], &DateWindow::new(a, a + Duration::days(len)), &InstanceOptions::new(a));
            for inst in &out {
                let again = period_identifier(inst.date(), freq);
                prop_assert_eq!(again.as_ref(), inst.period());
            }
        }
    }
}

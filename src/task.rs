//! Task templates and completion records.
//!
//! A `TaskTemplate` is the stored unit of one-time or recurring work. Its dates are kept
//! as the raw strings they were stored with so that a single malformed template can be
//! loaded, reported and skipped instead of failing the whole database. [`Schedule`] is the
//! validated view of a template's timing fields.

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fields::*;
use crate::period::PeriodId;

/// A one-time or recurring unit of work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskTemplate {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub project_names: Vec<String>,
    #[serde(default)]
    pub assigned_partners: Vec<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    pub frequency: Frequency,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub weekly_days: Vec<String>,
    /// Only meaningful for one-time tasks; recurring instances derive their own.
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default)]
    pub estimated_duration: Option<String>,
    #[serde(default)]
    pub created_at_utc: i64,
    #[serde(default)]
    pub updated_at_utc: i64,
}

/// Validated timing of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    OneTime {
        due: NaiveDate,
    },
    Recurring {
        frequency: Frequency,
        start: NaiveDate,
        end: Option<NaiveDate>,
        /// Selected weekdays; empty unless the frequency is weekly.
        weekdays: Vec<Weekday>,
    },
}

impl TaskTemplate {
    /// Parse and validate the template's timing fields.
    ///
    /// Exactly one of `due_date` (one-time) or `start_date` (recurring) must be set.
    pub fn schedule(&self) -> Result<Schedule> {
        let invalid = |reason: &str| Error::InvalidTemplate { id: self.id, reason: reason.to_string() };

        if self.frequency == Frequency::OneTime {
            if self.start_date.is_some() {
                return Err(invalid("one-time task must not carry a start_date"));
            }
            let due = self.due_date.as_deref().ok_or_else(|| invalid("one-time task has no due_date"))?;
            return Ok(Schedule::OneTime { due: parse_stored_date("due_date", due)? });
        }

        if self.due_date.is_some() {
            return Err(invalid("recurring task must not carry a due_date"));
        }
        let start = self.start_date.as_deref().ok_or_else(|| invalid("recurring task has no start_date"))?;
        let start = parse_stored_date("start_date", start)?;
        let end = self
            .end_date
            .as_deref()
            .map(|e| parse_stored_date("end_date", e))
            .transpose()?;

        let weekdays = if self.frequency == Frequency::Weekly {
            let mut days = Vec::with_capacity(self.weekly_days.len());
            for name in &self.weekly_days {
                let day = name
                    .trim()
                    .parse::<Weekday>()
                    .map_err(|_| invalid(&format!("unknown weekday '{name}'")))?;
                if !days.contains(&day) {
                    days.push(day);
                }
            }
            days.sort_by_key(|d| d.num_days_from_monday());
            days
        } else {
            Vec::new()
        };

        Ok(Schedule::Recurring { frequency: self.frequency, start, end, weekdays })
    }

    /// Stored status of a one-time task, defaulting to pending.
    pub fn stored_status(&self) -> Status {
        self.status.unwrap_or(Status::Pending)
    }
}

/// Resolution of one template for one calendar period.
///
/// At most one record exists per `(task_id, period_identifier)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionRecord {
    pub task_id: u64,
    pub period_type: Frequency,
    pub period_identifier: PeriodId,
    pub completion_date: NaiveDate,
    pub status: CompletionStatus,
    #[serde(default = "unknown_user")]
    pub completed_by: String,
}

pub fn unknown_user() -> String {
    "Unknown User".to_string()
}

/// Parse a stored `YYYY-MM-DD` date. A trailing time component (`2024-01-01T00:00:00Z`)
/// is tolerated and ignored.
pub fn parse_stored_date(field: &'static str, value: &str) -> Result<NaiveDate> {
    let trimmed = value.trim();
    let date_part = match trimmed.char_indices().nth(10) {
        Some((idx, 'T')) | Some((idx, ' ')) => &trimmed[..idx],
        _ => trimmed,
    };
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|_| Error::InvalidDate { field, value: value.to_string() })
}

//! Enumerations and field types for task scheduling.
//!
//! This module defines the structured values used to describe task templates and their
//! derived instances: recurrence frequency, priority, stored and derived status values,
//! and the list sorting and weekly expansion options.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// How often a task template produces work.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Frequency {
    #[serde(alias = "one_time", alias = "once")]
    OneTime,
    Daily,
    Weekly,
    Monthly,
    Quarterly,
}

impl Frequency {
    pub fn is_recurring(self) -> bool {
        !matches!(self, Frequency::OneTime)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::OneTime => "one-time",
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
        }
    }
}

/// Priority classification for task importance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Sort rank: high first, unset last.
    pub fn rank(p: Option<Priority>) -> u8 {
        match p {
            Some(Priority::High) => 0,
            Some(Priority::Medium) => 1,
            Some(Priority::Low) => 2,
            None => 3,
        }
    }
}

/// Status of a displayable task instance.
///
/// `Overdue` is only ever derived for recurring instances; a completion record never
/// stores it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    #[serde(alias = "in-progress")]
    #[value(alias = "in_progress")]
    InProgress,
    Completed,
    Overdue,
}

impl Status {
    /// Whether this status is the implicit default of a recurring period, i.e. needs no
    /// completion record to be re-derived.
    pub fn is_default(self) -> bool {
        matches!(self, Status::Pending | Status::Overdue)
    }
}

/// Status persisted on a completion record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Pending,
    #[serde(alias = "in-progress")]
    InProgress,
    Completed,
}

impl From<CompletionStatus> for Status {
    fn from(s: CompletionStatus) -> Self {
        match s {
            CompletionStatus::Pending => Status::Pending,
            CompletionStatus::InProgress => Status::InProgress,
            CompletionStatus::Completed => Status::Completed,
        }
    }
}

impl TryFrom<Status> for CompletionStatus {
    type Error = Status;

    fn try_from(s: Status) -> Result<Self, Status> {
        match s {
            Status::Pending => Ok(CompletionStatus::Pending),
            Status::InProgress => Ok(CompletionStatus::InProgress),
            Status::Completed => Ok(CompletionStatus::Completed),
            Status::Overdue => Err(s),
        }
    }
}

/// Available sorting options for instance lists.
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum SortKey {
    /// Current user's tasks first, then by priority.
    #[default]
    Priority,
    /// Due date or instance date.
    Date,
    Id,
}

/// How weekly templates with a `weekly_days` selection are instanced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum WeeklyExpansion {
    /// One instance per ISO week, anchored on Monday.
    #[default]
    PerWeek,
    /// One instance per selected weekday; all share the week's period.
    PerWeekday,
}

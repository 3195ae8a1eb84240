//! Displayable task instances.
//!
//! An instance is either a one-time task passed through as-is, or one materialized
//! occurrence of a recurring template. The two carry their status differently (stored on
//! the template vs. derived from a completion record), so they are separate variants.

use chrono::{NaiveDate, Weekday};
use serde::Serialize;

use crate::fields::*;
use crate::period::PeriodId;
use crate::task::{CompletionRecord, TaskTemplate};

/// One occurrence of a recurring template within a calendar period.
#[derive(Debug, Clone, PartialEq)]
pub struct RecurringInstance {
    pub template: TaskTemplate,
    pub period: PeriodId,
    /// Period anchor, or the selected weekday's date when weekly days are fanned out.
    pub instance_date: NaiveDate,
    /// Set only for per-weekday instances.
    pub weekday: Option<Weekday>,
    pub status: Status,
    pub completion: Option<CompletionRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskInstance {
    OneTime { task: TaskTemplate, due: NaiveDate, status: Status },
    Recurring(RecurringInstance),
}

impl TaskInstance {
    /// Stable display id: the template id for one-time tasks,
    /// `{template}-{period}` (plus `-{weekday}` when fanned out) for recurring ones.
    pub fn id(&self) -> String {
        match self {
            TaskInstance::OneTime { task, .. } => task.id.to_string(),
            TaskInstance::Recurring(r) => match r.weekday {
                Some(day) => format!("{}-{}-{}", r.template.id, r.period, weekday_key(day)),
                None => format!("{}-{}", r.template.id, r.period),
            },
        }
    }

    pub fn template_id(&self) -> u64 {
        self.template().id
    }

    pub fn template(&self) -> &TaskTemplate {
        match self {
            TaskInstance::OneTime { task, .. } => task,
            TaskInstance::Recurring(r) => &r.template,
        }
    }

    pub fn is_instance(&self) -> bool {
        matches!(self, TaskInstance::Recurring(_))
    }

    pub fn status(&self) -> Status {
        match self {
            TaskInstance::OneTime { status, .. } => *status,
            TaskInstance::Recurring(r) => r.status,
        }
    }

    /// Due date for one-time tasks, instance date for recurring ones.
    pub fn date(&self) -> NaiveDate {
        match self {
            TaskInstance::OneTime { due, .. } => *due,
            TaskInstance::Recurring(r) => r.instance_date,
        }
    }

    pub fn period(&self) -> Option<&PeriodId> {
        match self {
            TaskInstance::OneTime { .. } => None,
            TaskInstance::Recurring(r) => Some(&r.period),
        }
    }

    pub fn completion(&self) -> Option<&CompletionRecord> {
        match self {
            TaskInstance::OneTime { .. } => None,
            TaskInstance::Recurring(r) => r.completion.as_ref(),
        }
    }

    /// Display hint for one-time tasks whose due date has passed without completion.
    /// Recurring instances already carry `Overdue` as their status.
    pub fn is_past_due(&self, today: NaiveDate) -> bool {
        match self {
            TaskInstance::OneTime { due, status, .. } => *due < today && *status != Status::Completed,
            TaskInstance::Recurring(r) => r.status == Status::Overdue,
        }
    }

    /// Flatten into the external instance shape.
    pub fn to_view(&self) -> InstanceView {
        let t = self.template();
        InstanceView {
            id: self.id(),
            is_instance: self.is_instance(),
            template_id: self.is_instance().then_some(t.id),
            instance_date: match self {
                TaskInstance::Recurring(r) => Some(r.instance_date),
                TaskInstance::OneTime { .. } => None,
            },
            period_identifier: self.period().cloned(),
            title: t.title.clone(),
            description: t.description.clone(),
            categories: t.categories.clone(),
            project_names: t.project_names.clone(),
            assigned_partners: t.assigned_partners.clone(),
            priority: t.priority,
            frequency: t.frequency,
            due_date: t.due_date.clone(),
            start_date: t.start_date.clone(),
            end_date: t.end_date.clone(),
            status: self.status(),
        }
    }
}

/// Serializable flat view of an instance.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceView {
    pub id: String,
    pub is_instance: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period_identifier: Option<PeriodId>,
    pub title: String,
    pub description: Option<String>,
    pub categories: Vec<String>,
    pub project_names: Vec<String>,
    pub assigned_partners: Vec<String>,
    pub priority: Option<Priority>,
    pub frequency: Frequency,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    pub status: Status,
}

fn weekday_key(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "mon",
        Weekday::Tue => "tue",
        Weekday::Wed => "wed",
        Weekday::Thu => "thu",
        Weekday::Fri => "fri",
        Weekday::Sat => "sat",
        Weekday::Sun => "sun",
    }
}

//! Status transitions and bulk operations on task instances.
//!
//! Writes are planned from an instance as a [`StatusWrite`] and then applied through a
//! [`TaskStore`]. One-time tasks change the template's stored status; recurring instances
//! create, update or delete the completion record of their period. Pending and overdue
//! are always re-derivable, so reverting to them removes the record instead of storing it.
//! One-time tasks have no derived status, so they can't be set to overdue by hand.

use std::collections::HashSet;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::fields::*;
use crate::instance::TaskInstance;
use crate::period::PeriodId;
use crate::task::CompletionRecord;

/// Persistence operations the transition layer needs from an entity store.
pub trait TaskStore {
    fn update_task_status(&mut self, task_id: u64, status: Status) -> Result<()>;
    fn create_completion(&mut self, record: CompletionRecord) -> Result<()>;
    fn update_completion(
        &mut self,
        task_id: u64,
        period: &PeriodId,
        status: CompletionStatus,
        completion_date: NaiveDate,
    ) -> Result<()>;
    fn delete_completion(&mut self, task_id: u64, period: &PeriodId) -> Result<()>;
    /// Delete a template together with every completion record referencing it.
    fn delete_task(&mut self, task_id: u64) -> Result<()>;
}

/// A single planned write.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusWrite {
    UpdateTaskStatus { task_id: u64, status: Status },
    CreateCompletion(CompletionRecord),
    UpdateCompletion { task_id: u64, period: PeriodId, status: CompletionStatus, completion_date: NaiveDate },
    DeleteCompletion { task_id: u64, period: PeriodId },
    Noop,
}

/// Who is acting, and when.
#[derive(Debug, Clone, Copy)]
pub struct TransitionContext<'a> {
    pub today: NaiveDate,
    pub actor: &'a str,
}

/// Plan the write that moves `instance` to `new_status`.
pub fn plan_status_change(
    instance: &TaskInstance,
    new_status: Status,
    ctx: &TransitionContext<'_>,
) -> Result<StatusWrite> {
    let TaskInstance::Recurring(r) = instance else {
        if new_status == Status::Overdue {
            return Err(Error::InvalidArgument(format!(
                "task {} is one-time; overdue is not a status it can be set to",
                instance.template_id()
            )));
        }
        return Ok(StatusWrite::UpdateTaskStatus { task_id: instance.template_id(), status: new_status });
    };

    let task_id = r.template.id;
    let stored = match CompletionStatus::try_from(new_status) {
        Ok(CompletionStatus::Pending) | Err(_) => None,
        Ok(s) => Some(s),
    };

    let write = match (stored, r.completion.is_some()) {
        (Some(status), true) => StatusWrite::UpdateCompletion {
            task_id,
            period: r.period.clone(),
            status,
            completion_date: ctx.today,
        },
        (Some(status), false) => StatusWrite::CreateCompletion(CompletionRecord {
            task_id,
            period_type: r.template.frequency,
            period_identifier: r.period.clone(),
            completion_date: ctx.today,
            status,
            completed_by: ctx.actor.to_string(),
        }),
        (None, true) => StatusWrite::DeleteCompletion { task_id, period: r.period.clone() },
        (None, false) => StatusWrite::Noop,
    };
    Ok(write)
}

/// Execute a planned write against the store.
pub fn apply<S: TaskStore + ?Sized>(store: &mut S, write: StatusWrite) -> Result<()> {
    match write {
        StatusWrite::UpdateTaskStatus { task_id, status } => store.update_task_status(task_id, status),
        StatusWrite::CreateCompletion(record) => store.create_completion(record),
        StatusWrite::UpdateCompletion { task_id, period, status, completion_date } => {
            store.update_completion(task_id, &period, status, completion_date)
        }
        StatusWrite::DeleteCompletion { task_id, period } => store.delete_completion(task_id, &period),
        StatusWrite::Noop => Ok(()),
    }
}

/// Move one instance to `new_status`.
pub fn set_instance_status<S: TaskStore + ?Sized>(
    store: &mut S,
    instance: &TaskInstance,
    new_status: Status,
    ctx: &TransitionContext<'_>,
) -> Result<StatusWrite> {
    let write = plan_status_change(instance, new_status, ctx)?;
    info!(instance = %instance.id(), status = ?new_status, write = ?write, "status transition");
    apply(store, write.clone())?;
    Ok(write)
}

/// Aggregate result of a bulk operation. Succeeded writes are never rolled back.
#[derive(Debug, Default)]
pub struct BulkOutcome {
    pub applied: usize,
    pub failed: Vec<(String, Error)>,
}

impl BulkOutcome {
    pub fn attempted(&self) -> usize {
        self.applied + self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Collapse into a single error when anything failed.
    pub fn into_result(self) -> Result<usize> {
        if self.failed.is_empty() {
            Ok(self.applied)
        } else {
            Err(Error::PartialFailure { attempted: self.attempted(), failed: self.failed.len() })
        }
    }

    fn record(&mut self, key: String, result: Result<()>) {
        match result {
            Ok(()) => self.applied += 1,
            Err(e) => {
                warn!(target_id = %key, error = %e, "bulk write failed");
                self.failed.push((key, e));
            }
        }
    }
}

pub fn find_instance<'a>(instances: &'a [TaskInstance], id: &str) -> Option<&'a TaskInstance> {
    instances.iter().find(|i| i.id() == id)
}

/// Apply `new_status` to every selected instance id.
///
/// Selected instances that share a completion record (weekday fan-out of one week) are
/// written once.
pub fn bulk_set_status<S: TaskStore + ?Sized>(
    store: &mut S,
    instances: &[TaskInstance],
    selected: &[String],
    new_status: Status,
    ctx: &TransitionContext<'_>,
) -> BulkOutcome {
    let mut outcome = BulkOutcome::default();
    let mut seen_periods: HashSet<(u64, PeriodId)> = HashSet::new();

    for id in selected {
        let Some(instance) = find_instance(instances, id) else {
            outcome.failed.push((id.clone(), Error::InstanceNotFound(id.clone())));
            continue;
        };
        if let Some(period) = instance.period() {
            if !seen_periods.insert((instance.template_id(), period.clone())) {
                continue;
            }
        }
        let result = plan_status_change(instance, new_status, ctx).and_then(|write| apply(store, write));
        outcome.record(id.clone(), result);
    }

    info!(applied = outcome.applied, failed = outcome.failed.len(), status = ?new_status, "bulk status update");
    outcome
}

/// Templates to delete for a selection of instance ids.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DeletionPlan {
    /// Unique template ids, in order of first selection.
    pub template_ids: Vec<u64>,
    pub unknown: Vec<String>,
}

/// Map selected instance ids back to their templates. Several occurrences of one
/// recurring template collapse into a single deletion.
pub fn plan_bulk_delete(instances: &[TaskInstance], selected: &[String]) -> DeletionPlan {
    let mut plan = DeletionPlan::default();
    let mut seen = HashSet::new();
    for id in selected {
        match find_instance(instances, id) {
            Some(instance) => {
                let template_id = instance.template_id();
                if seen.insert(template_id) {
                    plan.template_ids.push(template_id);
                }
            }
            None => plan.unknown.push(id.clone()),
        }
    }
    plan
}

/// Delete each planned template exactly once.
pub fn bulk_delete<S: TaskStore + ?Sized>(store: &mut S, plan: &DeletionPlan) -> BulkOutcome {
    let mut outcome = BulkOutcome::default();
    for &task_id in &plan.template_ids {
        outcome.record(task_id.to_string(), store.delete_task(task_id));
    }
    info!(applied = outcome.applied, failed = outcome.failed.len(), "bulk delete");
    outcome
}

//! Filtering, ordering, paging and statistics over a derived instance set.

use serde::Serialize;

use crate::fields::*;
use crate::instance::TaskInstance;

pub const DEFAULT_PAGE_SIZE: usize = 12;

/// Optional, AND-combined filters applied on top of the derived instances.
#[derive(Debug, Clone, Default)]
pub struct InstanceFilter {
    /// Case-insensitive substring of title or description.
    pub search: Option<String>,
    pub status: Option<Status>,
    pub project: Option<String>,
    pub priority: Option<Priority>,
    pub partner: Option<String>,
}

impl InstanceFilter {
    pub fn matches(&self, instance: &TaskInstance) -> bool {
        let t = instance.template();
        if let Some(ref term) = self.search {
            let term = term.to_lowercase();
            let in_title = t.title.to_lowercase().contains(&term);
            let in_desc = t
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&term));
            if !in_title && !in_desc {
                return false;
            }
        }
        if let Some(s) = self.status {
            if instance.status() != s {
                return false;
            }
        }
        if let Some(ref p) = self.project {
            if !t.project_names.iter().any(|name| name == p) {
                return false;
            }
        }
        if let Some(p) = self.priority {
            if t.priority != Some(p) {
                return false;
            }
        }
        if let Some(ref partner) = self.partner {
            if !t.assigned_partners.iter().any(|name| name == partner) {
                return false;
            }
        }
        true
    }

    pub fn apply<'a>(&self, instances: &'a [TaskInstance]) -> Vec<&'a TaskInstance> {
        instances.iter().filter(|i| self.matches(i)).collect()
    }
}

/// Sort instances in place. For [`SortKey::Priority`], instances assigned to
/// `current_user` come first, then high > medium > low > unset. Sorting is stable.
pub fn sort_instances(instances: &mut [&TaskInstance], key: SortKey, current_user: Option<&str>) {
    match key {
        SortKey::Priority => instances.sort_by_key(|i| {
            let mine = current_user.is_some_and(|u| i.template().assigned_partners.iter().any(|p| p == u));
            (!mine, Priority::rank(i.template().priority))
        }),
        SortKey::Date => instances.sort_by_key(|i| (i.date(), i.template_id())),
        SortKey::Id => instances.sort_by_key(|i| (i.template_id(), i.date())),
    }
}

/// 1-based page of `items`; an out-of-range page is empty.
pub fn paginate<T>(items: &[T], page: usize, per_page: usize) -> &[T] {
    if page == 0 || per_page == 0 {
        return &[];
    }
    let start = (page - 1).saturating_mul(per_page);
    if start >= items.len() {
        return &[];
    }
    let end = start.saturating_add(per_page).min(items.len());
    &items[start..end]
}

pub fn page_count(total: usize, per_page: usize) -> usize {
    if per_page == 0 {
        0
    } else {
        total.div_ceil(per_page)
    }
}

/// Status counts over a derived instance set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskStats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub overdue: usize,
    pub in_progress: usize,
    /// Completed share in percent, rounded to one decimal.
    pub completion_rate: f64,
}

impl TaskStats {
    pub fn from_instances<'a, I>(instances: I) -> Self
    where
        I: IntoIterator<Item = &'a TaskInstance>,
    {
        let mut stats = TaskStats::default();
        for i in instances {
            stats.total += 1;
            match i.status() {
                Status::Completed => stats.completed += 1,
                Status::Pending => stats.pending += 1,
                Status::Overdue => stats.overdue += 1,
                Status::InProgress => stats.in_progress += 1,
            }
        }
        if stats.total > 0 {
            let rate = stats.completed as f64 * 100.0 / stats.total as f64;
            stats.completion_rate = (rate * 10.0).round() / 10.0;
        }
        stats
    }
}

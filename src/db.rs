//! Database operations and utility functions for task management.
//!
//! This module provides the `Database` struct that stores task templates and completion
//! records in a single JSON file, its `TaskStore` implementation, and the date parsing
//! and table formatting helpers shared by the command handlers.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use chrono::{Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::fields::*;
use crate::instance::TaskInstance;
use crate::period::PeriodId;
use crate::task::{CompletionRecord, TaskTemplate};
use crate::transition::TaskStore;

/// In-memory database of task templates and their completion records.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Database {
    pub tasks: Vec<TaskTemplate>,
    #[serde(default)]
    pub completions: Vec<CompletionRecord>,
}

impl Database {
    /// Load database from a JSON file. A missing file is an empty database.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no database file, starting empty");
            return Ok(Database::default());
        }
        let buf = fs::read_to_string(path).map_err(|source| Error::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        let db: Database = serde_json::from_str(&buf)?;
        debug!(path = %path.display(), tasks = db.tasks.len(), completions = db.completions.len(), "loaded database");
        Ok(db)
    }

    /// Save database to JSON file using atomic write (temp file + rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_string_pretty(self)?;
        let mut f = File::create(&tmp)?;
        f.write_all(data.as_bytes())?;
        f.flush()?;
        fs::rename(tmp, path)?;
        Ok(())
    }

    /// Generate the next available task ID.
    pub fn next_id(&self) -> u64 {
        self.tasks.iter().map(|t| t.id).max().unwrap_or(0) + 1
    }

    /// Get a task by ID.
    pub fn get(&self, id: u64) -> Option<&TaskTemplate> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Get a mutable reference to a task by ID.
    pub fn get_mut(&mut self, id: u64) -> Option<&mut TaskTemplate> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    fn completion_mut(&mut self, task_id: u64, period: &PeriodId) -> Option<&mut CompletionRecord> {
        self.completions
            .iter_mut()
            .find(|c| c.task_id == task_id && &c.period_identifier == period)
    }

    pub fn completions_for(&self, task_id: u64) -> impl Iterator<Item = &CompletionRecord> {
        self.completions.iter().filter(move |c| c.task_id == task_id)
    }

    /// Drop every completion record of a template; returns how many were removed.
    pub fn clear_completions(&mut self, task_id: u64) -> usize {
        let before = self.completions.len();
        self.completions.retain(|c| c.task_id != task_id);
        before - self.completions.len()
    }
}

impl TaskStore for Database {
    fn update_task_status(&mut self, task_id: u64, status: Status) -> Result<()> {
        let t = self.get_mut(task_id).ok_or(Error::TaskNotFound(task_id))?;
        t.status = Some(status);
        t.updated_at_utc = Utc::now().timestamp();
        Ok(())
    }

    fn create_completion(&mut self, record: CompletionRecord) -> Result<()> {
        if self.get(record.task_id).is_none() {
            return Err(Error::TaskNotFound(record.task_id));
        }
        if self.completion_mut(record.task_id, &record.period_identifier).is_some() {
            return Err(Error::DuplicateCompletion {
                task_id: record.task_id,
                period: record.period_identifier.to_string(),
            });
        }
        self.completions.push(record);
        Ok(())
    }

    fn update_completion(
        &mut self,
        task_id: u64,
        period: &PeriodId,
        status: CompletionStatus,
        completion_date: NaiveDate,
    ) -> Result<()> {
        let rec = self.completion_mut(task_id, period).ok_or_else(|| Error::CompletionNotFound {
            task_id,
            period: period.to_string(),
        })?;
        rec.status = status;
        rec.completion_date = completion_date;
        Ok(())
    }

    fn delete_completion(&mut self, task_id: u64, period: &PeriodId) -> Result<()> {
        let before = self.completions.len();
        self.completions
            .retain(|c| !(c.task_id == task_id && &c.period_identifier == period));
        if self.completions.len() == before {
            return Err(Error::CompletionNotFound { task_id, period: period.to_string() });
        }
        Ok(())
    }

    fn delete_task(&mut self, task_id: u64) -> Result<()> {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != task_id);
        if self.tasks.len() == before {
            return Err(Error::TaskNotFound(task_id));
        }
        // Also drop completion records of the removed template.
        self.completions.retain(|c| c.task_id != task_id);
        Ok(())
    }
}

/// Normalise a list value by trimming; empty entries are dropped.
pub fn split_list(inputs: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    for raw in inputs {
        for part in raw.split(',') {
            let item = part.trim();
            if !item.is_empty() && !out.iter().any(|x: &String| x == item) {
                out.push(item.to_string());
            }
        }
    }
    out
}

/// Parse human-readable date input relative to `today`.
///
/// Supports:
/// - "today", "tomorrow", "yesterday"
/// - "next monday", "this friday", bare weekday names
/// - "end of week", "end of month"
/// - "in 3d", "in 2w", "in 1m"
/// - "YYYY-MM-DD" format
pub fn parse_date_input(s: &str, today: NaiveDate) -> Option<NaiveDate> {
    let s = s.trim().to_lowercase();

    match s.as_str() {
        "today" => return Some(today),
        "tomorrow" => return today.succ_opt(),
        "yesterday" => return today.pred_opt(),
        "end of week" | "eow" => {
            let (_, end) = start_end_of_week(today);
            return Some(end);
        }
        "end of month" | "eom" => {
            return Some(crate::period::period_end(today, Frequency::Monthly));
        }
        _ => {}
    }

    if let Some(rest) = s.strip_prefix("in ") {
        if let Some(nd) = rest.strip_suffix('d') {
            if let Ok(days) = nd.trim().parse::<i64>() {
                return Duration::try_days(days).and_then(|d| today.checked_add_signed(d));
            }
        }
        if let Some(nw) = rest.strip_suffix('w') {
            if let Ok(weeks) = nw.trim().parse::<i64>() {
                return Duration::try_weeks(weeks).and_then(|w| today.checked_add_signed(w));
            }
        }
        if let Some(nm) = rest.strip_suffix('m') {
            if let Ok(months) = nm.trim().parse::<u32>() {
                return today.checked_add_months(chrono::Months::new(months));
            }
        }
    }

    let (prefix, day_name) = match s.split_once(' ') {
        Some((p @ ("next" | "this"), rest)) => (Some(p), rest),
        _ => (None, s.as_str()),
    };
    if let Ok(target) = day_name.parse::<chrono::Weekday>() {
        let current = today.weekday().num_days_from_monday() as i64;
        let days_ahead = (target.num_days_from_monday() as i64 + 7 - current) % 7;
        let days = match prefix {
            Some("next") => days_ahead + 7,
            _ => days_ahead,
        };
        return today.checked_add_signed(Duration::days(days));
    }

    NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()
}

/// Calculate the start and end dates of the ISO week (Monday to Sunday) containing `today`.
pub fn start_end_of_week(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = crate::period::start_of_week(today);
    (start, start + Duration::days(6))
}

/// Format a date relative to today ("today", "tomorrow", "in 3d", "2d late").
pub fn format_due_relative(due: NaiveDate, today: NaiveDate) -> String {
    let delta = (due - today).num_days();
    match delta {
        0 => "today".into(),
        1 => "tomorrow".into(),
        n if n > 1 => format!("in {n}d"),
        n => format!("{}d late", -n),
    }
}

pub fn format_frequency(f: Frequency) -> &'static str {
    match f {
        Frequency::OneTime => "Once",
        Frequency::Daily => "Daily",
        Frequency::Weekly => "Weekly",
        Frequency::Monthly => "Monthly",
        Frequency::Quarterly => "Quarterly",
    }
}

pub fn format_priority(p: Option<Priority>) -> &'static str {
    match p {
        Some(Priority::High) => "High",
        Some(Priority::Medium) => "Medium",
        Some(Priority::Low) => "Low",
        None => "-",
    }
}

pub fn format_status(s: Status) -> &'static str {
    match s {
        Status::Pending => "Pending",
        Status::InProgress => "InProgress",
        Status::Completed => "Completed",
        Status::Overdue => "Overdue",
    }
}

/// Print instances in a formatted table.
pub fn print_table(instances: &[&TaskInstance], today: NaiveDate) {
    println!(
        "{:<18} {:<10} {:<11} {:<7} {:<12} {:<16} {}",
        "ID", "Freq", "Status", "Pri", "Date", "Projects", "Title"
    );
    for i in instances {
        let t = i.template();
        let date = format!("{} {}", i.date().format("%m-%d"), format_due_relative(i.date(), today));
        let projects = if t.project_names.is_empty() { "-".to_string() } else { t.project_names.join(",") };
        let marker = if !i.is_instance() && i.is_past_due(today) { " (late)" } else { "" };
        println!(
            "{:<18} {:<10} {:<11} {:<7} {:<12} {:<16} {}{}",
            truncate(&i.id(), 18),
            format_frequency(t.frequency),
            format_status(i.status()),
            format_priority(t.priority),
            truncate(&date, 12),
            truncate(&projects, 16),
            t.title,
            marker
        );
    }
}

/// Truncate a string to a maximum width, adding ellipsis if needed.
pub fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out = String::new();
        for (i, ch) in s.chars().enumerate() {
            if i + 1 >= width {
                out.push('…');
                break;
            }
            out.push(ch);
        }
        out
    }
}

/// Resolve a template identifier: numeric template ID, instance ID from the current
/// listing (`12-2024-01-08`), or case-insensitive title.
pub fn resolve_template(identifier: &str, db: &Database, instances: &[TaskInstance]) -> Result<u64> {
    if let Ok(id) = identifier.parse::<u64>() {
        return db.get(id).map(|t| t.id).ok_or(Error::TaskNotFound(id));
    }

    if let Some(instance) = instances.iter().find(|i| i.id() == identifier) {
        return Ok(instance.template_id());
    }

    let matches: Vec<&TaskTemplate> = db
        .tasks
        .iter()
        .filter(|task| task.title.to_lowercase() == identifier.to_lowercase())
        .collect();

    match matches.len() {
        0 => Err(Error::InvalidArgument(format!("No task found with id or name '{identifier}'"))),
        1 => Ok(matches[0].id),
        _ => {
            let mut msg = format!("Multiple tasks found with name '{identifier}':\n");
            for task in matches {
                msg.push_str(&format!("  ID {}: {} ({})\n", task.id, task.title, format_frequency(task.frequency)));
            }
            msg.push_str("Please use the specific ID instead.");
            Err(Error::InvalidArgument(msg))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{materialize, DateWindow, InstanceOptions};
    use crate::transition::{set_instance_status, TransitionContext};

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn template(id: u64, title: &str, frequency: Frequency) -> TaskTemplate {
        TaskTemplate {
            id,
            title: title.into(),
            description: None,
            categories: vec![],
            project_names: vec![],
            assigned_partners: vec![],
            priority: None,
            frequency,
            due_date: (frequency == Frequency::OneTime).then(|| "2024-01-10".to_string()),
            start_date: (frequency != Frequency::OneTime).then(|| "2024-01-01".to_string()),
            end_date: None,
            weekly_days: vec![],
            status: None,
            estimated_duration: None,
            created_at_utc: 0,
            updated_at_utc: 0,
        }
    }

    fn record(task_id: u64, period: &str) -> CompletionRecord {
        CompletionRecord {
            task_id,
            period_type: Frequency::Daily,
            period_identifier: PeriodId::from(period),
            completion_date: d("2024-01-02"),
            status: CompletionStatus::Completed,
            completed_by: "x".into(),
        }
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tasks.json");
        let mut db = Database::default();
        db.tasks.push(template(1, "Open checklist", Frequency::Daily));
        db.completions.push(record(1, "2024-01-01"));
        db.save(&path).unwrap();

        let loaded = Database::load(&path).unwrap();
        assert_eq!(loaded.tasks, db.tasks);
        assert_eq!(loaded.completions, db.completions);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn missing_file_loads_empty_and_corrupt_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        assert!(Database::load(&path).unwrap().tasks.is_empty());

        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Database::load(&path), Err(Error::Json(_))));
    }

    #[test]
    fn completion_key_is_unique() {
        let mut db = Database::default();
        db.tasks.push(template(1, "Open checklist", Frequency::Daily));
        db.create_completion(record(1, "2024-01-01")).unwrap();
        assert!(matches!(
            db.create_completion(record(1, "2024-01-01")),
            Err(Error::DuplicateCompletion { task_id: 1, .. })
        ));
        assert!(matches!(db.create_completion(record(9, "2024-01-01")), Err(Error::TaskNotFound(9))));
    }

    #[test]
    fn deleting_a_task_drops_its_completions() {
        let mut db = Database::default();
        db.tasks.push(template(1, "a", Frequency::Daily));
        db.tasks.push(template(2, "b", Frequency::Daily));
        db.completions.push(record(1, "2024-01-01"));
        db.completions.push(record(2, "2024-01-01"));
        db.delete_task(1).unwrap();
        assert_eq!(db.tasks.len(), 1);
        assert_eq!(db.completions.len(), 1);
        assert_eq!(db.completions_for(2).count(), 1);
        assert!(matches!(db.delete_task(1), Err(Error::TaskNotFound(1))));
    }

    #[test]
    fn database_backs_status_round_trip() {
        let mut db = Database::default();
        db.tasks.push(template(5, "Temp log", Frequency::Weekly));
        let window = DateWindow::new(d("2024-01-01"), d("2024-01-14"));
        let opts = InstanceOptions::new(d("2024-01-03"));
        let ctx = TransitionContext { today: d("2024-01-03"), actor: "gm@example.com" };

        let first = materialize(&db.tasks, &db.completions, &window, &opts);
        set_instance_status(&mut db, &first[0], Status::Completed, &ctx).unwrap();
        let second = materialize(&db.tasks, &db.completions, &window, &opts);
        assert_eq!(second[0].status(), Status::Completed);

        set_instance_status(&mut db, &second[0], Status::Pending, &ctx).unwrap();
        assert!(db.completions.is_empty());
        let third = materialize(&db.tasks, &db.completions, &window, &opts);
        assert_eq!(third[0].status(), Status::Pending);
    }

    #[test]
    fn next_id_follows_max() {
        let mut db = Database::default();
        assert_eq!(db.next_id(), 1);
        db.tasks.push(template(7, "a", Frequency::Daily));
        assert_eq!(db.next_id(), 8);
    }

    #[test]
    fn parse_date_input_forms() {
        let today = d("2024-01-17"); // Wednesday
        assert_eq!(parse_date_input("today", today), Some(today));
        assert_eq!(parse_date_input("tomorrow", today), Some(d("2024-01-18")));
        assert_eq!(parse_date_input("in 3d", today), Some(d("2024-01-20")));
        assert_eq!(parse_date_input("in 2w", today), Some(d("2024-01-31")));
        assert_eq!(parse_date_input("in 1m", today), Some(d("2024-02-17")));
        assert_eq!(parse_date_input("eow", today), Some(d("2024-01-21")));
        assert_eq!(parse_date_input("end of month", today), Some(d("2024-01-31")));
        assert_eq!(parse_date_input("friday", today), Some(d("2024-01-19")));
        assert_eq!(parse_date_input("wed", today), Some(today));
        assert_eq!(parse_date_input("next monday", today), Some(d("2024-01-29")));
        assert_eq!(parse_date_input("2024-03-15", today), Some(d("2024-03-15")));
        assert_eq!(parse_date_input("someday", today), None);
    }

    #[test]
    fn out_of_range_offsets_are_rejected() {
        let today = d("2024-01-17");
        assert_eq!(parse_date_input("in 200000000000d", today), None);
        assert_eq!(parse_date_input("in 9223372036854775807w", today), None);
        assert_eq!(parse_date_input("in -200000000000d", today), None);
        assert_eq!(parse_date_input("in 4294967295m", today), None);
    }

    #[test]
    fn relative_formatting() {
        let today = d("2024-01-17");
        assert_eq!(format_due_relative(today, today), "today");
        assert_eq!(format_due_relative(d("2024-01-20"), today), "in 3d");
        assert_eq!(format_due_relative(d("2024-01-15"), today), "2d late");
    }

    #[test]
    fn resolve_by_id_instance_or_title() {
        let mut db = Database::default();
        db.tasks.push(template(1, "Open checklist", Frequency::Daily));
        db.tasks.push(template(2, "Close checklist", Frequency::OneTime));
        db.tasks.push(template(3, "close checklist", Frequency::Weekly));
        let instances = materialize(
            &db.tasks,
            &db.completions,
            &DateWindow::new(d("2024-01-01"), d("2024-01-02")),
            &InstanceOptions::new(d("2024-01-01")),
        );

        assert_eq!(resolve_template("1", &db, &instances).unwrap(), 1);
        assert_eq!(resolve_template("1-2024-01-02", &db, &instances).unwrap(), 1);
        assert_eq!(resolve_template("OPEN CHECKLIST", &db, &instances).unwrap(), 1);
        assert!(resolve_template("close checklist", &db, &instances).is_err());
        assert!(matches!(resolve_template("42", &db, &instances), Err(Error::TaskNotFound(42))));
    }

    #[test]
    fn split_list_dedups_and_trims() {
        let got = split_list(&["Mei, Raj".to_string(), "Raj".into(), " ".into()]);
        assert_eq!(got, vec!["Mei".to_string(), "Raj".into()]);
    }

    #[test]
    fn truncate_adds_ellipsis() {
        assert_eq!(truncate("Central Kitchen", 8), "Central…");
        assert_eq!(truncate("Central", 8), "Central");
    }
}

//! Command implementations for the CLI interface.
//!
//! This module contains the command handlers behind each subcommand: template
//! creation and editing, instance listing over a date window, status transitions,
//! bulk deletion, statistics, calendar export and the watch loop.

use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate, Utc};
use clap::{Args, Subcommand};
use clap_complete::{generate, Shell};
use tracing::{debug, info};

use crate::backoff::{CheckOutcome, RecheckSchedule, SystemClock};
use crate::calendar::render_ics;
use crate::config::Config;
use crate::db::*;
use crate::engine::{materialize, DateWindow, InstanceOptions};
use crate::error::{Error, Result};
use crate::fields::*;
use crate::instance::{InstanceView, TaskInstance};
use crate::query::{page_count, paginate, sort_instances, InstanceFilter, TaskStats, DEFAULT_PAGE_SIZE};
use crate::task::TaskTemplate;
use crate::transition::{bulk_delete, bulk_set_status, plan_bulk_delete, BulkOutcome, TransitionContext};

#[derive(Subcommand)]
pub enum Commands {
    /// Add a new one-time or recurring task.
    Add(AddArgs),

    /// List task instances in a date window.
    List(ListArgs),

    /// View a task template and its instances.
    View {
        /// Task ID, instance ID or title.
        id: String,
        #[command(flatten)]
        window: WindowArgs,
    },

    /// Update fields on a task template.
    Update(UpdateArgs),

    /// Set the status of one or more instances.
    Status {
        /// New status: pending | in-progress | completed | overdue.
        #[arg(value_enum)]
        status: Status,
        /// Instance IDs (one-time task ID or `<task>-<period>`).
        #[arg(required = true)]
        ids: Vec<String>,
        #[command(flatten)]
        window: WindowArgs,
    },

    /// Mark instances completed.
    Complete {
        #[arg(required = true)]
        ids: Vec<String>,
        #[command(flatten)]
        window: WindowArgs,
    },

    /// Return instances to pending.
    Reopen {
        #[arg(required = true)]
        ids: Vec<String>,
        #[command(flatten)]
        window: WindowArgs,
    },

    /// Delete the templates behind the selected instances.
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
        /// Skip the confirmation prompt.
        #[arg(long, short)]
        yes: bool,
        #[command(flatten)]
        window: WindowArgs,
    },

    /// Show status counts for a date window.
    Stats {
        #[command(flatten)]
        window: WindowArgs,
    },

    /// List distinct projects and template counts.
    Projects,

    /// Export instances in a date window to an iCalendar file.
    Export {
        /// Output file path (default: opsdesk-tasks-<today>.ics).
        #[arg(long, short)]
        output: Option<PathBuf>,
        #[command(flatten)]
        window: WindowArgs,
    },

    /// Periodically re-derive the window and report status counts.
    Watch {
        /// Stop after this many checks.
        #[arg(long)]
        checks: Option<u32>,
        #[command(flatten)]
        window: WindowArgs,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Date window; defaults come from the `[window]` config section.
#[derive(Args, Debug, Clone, Default)]
pub struct WindowArgs {
    /// Window start: YYYY-MM-DD, "today", "in 3d", "next monday", ...
    #[arg(long)]
    pub from: Option<String>,
    /// Window end (inclusive).
    #[arg(long)]
    pub to: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    /// Short title for the task.
    pub title: String,
    /// Optional longer description.
    #[arg(long)]
    pub desc: Option<String>,
    /// Frequency: one-time | daily | weekly | monthly | quarterly.
    #[arg(long, value_enum, default_value_t = Frequency::OneTime)]
    pub frequency: Frequency,
    /// Due date (one-time tasks).
    #[arg(long)]
    pub due: Option<String>,
    /// Start date (recurring tasks, default today).
    #[arg(long)]
    pub start: Option<String>,
    /// End date (recurring tasks).
    #[arg(long)]
    pub end: Option<String>,
    /// Weekdays for weekly tasks. May be repeated and comma-separated.
    #[arg(long = "day")]
    pub weekly_days: Vec<String>,
    #[arg(long, value_enum)]
    pub priority: Option<Priority>,
    /// Project names. May be repeated and comma-separated.
    #[arg(long = "project")]
    pub projects: Vec<String>,
    /// Assigned partner names. May be repeated and comma-separated.
    #[arg(long = "partner")]
    pub partners: Vec<String>,
    /// Categories. May be repeated and comma-separated.
    #[arg(long = "category")]
    pub categories: Vec<String>,
    /// Estimated duration, free text ("30m", "2h").
    #[arg(long)]
    pub duration: Option<String>,
    /// Initial status (one-time tasks).
    #[arg(long, value_enum)]
    pub status: Option<Status>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    #[command(flatten)]
    pub window: WindowArgs,
    /// Search title and description.
    #[arg(long, short)]
    pub search: Option<String>,
    #[arg(long, value_enum)]
    pub status: Option<Status>,
    #[arg(long)]
    pub project: Option<String>,
    #[arg(long, value_enum)]
    pub priority: Option<Priority>,
    #[arg(long)]
    pub partner: Option<String>,
    /// Sort key.
    #[arg(long, value_enum, default_value_t = SortKey::Priority)]
    pub sort: SortKey,
    /// Page number (1-based).
    #[arg(long, default_value_t = 1)]
    pub page: usize,
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub per_page: usize,
    /// Print every matching instance without paging.
    #[arg(long)]
    pub all: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct UpdateArgs {
    /// Task ID, instance ID or title.
    pub id: String,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub desc: Option<String>,
    #[arg(long, value_enum)]
    pub frequency: Option<Frequency>,
    #[arg(long)]
    pub due: Option<String>,
    #[arg(long)]
    pub start: Option<String>,
    #[arg(long)]
    pub end: Option<String>,
    /// Clear the end date.
    #[arg(long)]
    pub clear_end: bool,
    /// Replace weekly days.
    #[arg(long = "day")]
    pub weekly_days: Vec<String>,
    #[arg(long, value_enum)]
    pub priority: Option<Priority>,
    /// Replace project names.
    #[arg(long = "project")]
    pub projects: Vec<String>,
    /// Replace assigned partners.
    #[arg(long = "partner")]
    pub partners: Vec<String>,
    /// Replace categories.
    #[arg(long = "category")]
    pub categories: Vec<String>,
    #[arg(long)]
    pub duration: Option<String>,
    /// Window used to resolve an instance ID.
    #[command(flatten)]
    pub window: WindowArgs,
}

/// Per-invocation state shared by the handlers.
#[derive(Debug, Clone)]
pub struct Session {
    pub db_path: PathBuf,
    pub config: Config,
    pub today: NaiveDate,
    pub json: bool,
}

impl Session {
    pub fn new(db_path: PathBuf, config: Config, json: bool) -> Self {
        Session { db_path, config, today: Local::now().date_naive(), json }
    }

    /// Resolve window arguments against config defaults.
    pub fn window(&self, args: &WindowArgs) -> Result<DateWindow> {
        let cfg = &self.config.window;
        let default = DateWindow::around(self.today, cfg.weeks_back, cfg.weeks_ahead).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "[window] weeks_back = {} / weeks_ahead = {} is out of range",
                cfg.weeks_back, cfg.weeks_ahead
            ))
        })?;
        let from = match args.from.as_deref() {
            Some(s) => self.parse_date("from", s)?,
            None => default.from,
        };
        let to = match args.to.as_deref() {
            Some(s) => self.parse_date("to", s)?,
            None => default.to,
        };
        Ok(DateWindow::new(from, to))
    }

    pub fn options(&self) -> InstanceOptions {
        InstanceOptions { today: self.today, weekly_expansion: self.config.instancing.weekly_days }
    }

    pub fn derive(&self, db: &Database, window: &DateWindow) -> Vec<TaskInstance> {
        materialize(&db.tasks, &db.completions, window, &self.options())
    }

    fn parse_date(&self, field: &'static str, s: &str) -> Result<NaiveDate> {
        parse_date_input(s, self.today).ok_or_else(|| Error::InvalidDate { field, value: s.to_string() })
    }

    fn date_string(&self, field: &'static str, s: &str) -> Result<String> {
        Ok(self.parse_date(field, s)?.format("%Y-%m-%d").to_string())
    }

    fn save(&self, db: &Database) -> Result<()> {
        db.save(&self.db_path)
    }
}

/// Add a new task template to the database.
pub fn cmd_add(db: &mut Database, session: &Session, args: AddArgs) -> Result<()> {
    let (due_date, start_date, end_date) = if args.frequency.is_recurring() {
        if args.due.is_some() {
            return Err(Error::InvalidArgument("recurring tasks take --start/--end, not --due".into()));
        }
        let start = match args.start.as_deref() {
            Some(s) => session.date_string("start", s)?,
            None => session.today.format("%Y-%m-%d").to_string(),
        };
        let end = args.end.as_deref().map(|s| session.date_string("end", s)).transpose()?;
        (None, Some(start), end)
    } else {
        if args.start.is_some() || args.end.is_some() {
            return Err(Error::InvalidArgument("one-time tasks take --due, not --start/--end".into()));
        }
        let due = args
            .due
            .as_deref()
            .ok_or_else(|| Error::InvalidArgument("one-time tasks need --due".into()))?;
        (Some(session.date_string("due", due)?), None, None)
    };

    let now_utc = Utc::now().timestamp();
    let id = db.next_id();
    let task = TaskTemplate {
        id,
        title: args.title,
        description: args.desc.filter(|d| !d.trim().is_empty()),
        categories: split_list(&args.categories),
        project_names: split_list(&args.projects),
        assigned_partners: split_list(&args.partners),
        priority: args.priority,
        frequency: args.frequency,
        due_date,
        start_date,
        end_date,
        weekly_days: if args.frequency == Frequency::Weekly { split_list(&args.weekly_days) } else { Vec::new() },
        status: if args.frequency.is_recurring() { None } else { Some(args.status.unwrap_or(Status::Pending)) },
        estimated_duration: args.duration,
        created_at_utc: now_utc,
        updated_at_utc: now_utc,
    };
    task.schedule()?;

    info!(task_id = id, frequency = task.frequency.as_str(), "adding task");
    db.tasks.push(task);
    session.save(db)?;
    println!("Added task {id}");
    Ok(())
}

/// List instances in a window with optional filtering, sorting and paging.
pub fn cmd_list(db: &Database, session: &Session, args: ListArgs) -> Result<()> {
    let window = session.window(&args.window)?;
    let instances = session.derive(db, &window);

    let filter = InstanceFilter {
        search: args.search,
        status: args.status,
        project: args.project,
        priority: args.priority,
        partner: args.partner,
    };
    let mut filtered = filter.apply(&instances);
    sort_instances(&mut filtered, args.sort, session.config.user.name.as_deref());

    let total = filtered.len();
    let shown: &[&TaskInstance] = if args.all { &filtered } else { paginate(&filtered, args.page, args.per_page) };

    if session.json {
        let views: Vec<InstanceView> = shown.iter().map(|i| i.to_view()).collect();
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }

    println!("Window {} .. {}", window.from, window.to);
    print_table(shown, session.today);
    if !args.all && total > 0 {
        println!("Page {}/{} ({} task(s))", args.page, page_count(total, args.per_page), total);
    }
    Ok(())
}

/// View a template, its instances in the window and its completion history.
pub fn cmd_view(db: &Database, session: &Session, id: String, window: WindowArgs) -> Result<()> {
    let window = session.window(&window)?;
    let instances = session.derive(db, &window);
    let task_id = resolve_template(&id, db, &instances)?;
    let task = db.get(task_id).ok_or(Error::TaskNotFound(task_id))?;
    let own: Vec<&TaskInstance> = instances.iter().filter(|i| i.template_id() == task_id).collect();

    if session.json {
        let views: Vec<InstanceView> = own.iter().map(|i| i.to_view()).collect();
        let out = serde_json::json!({ "task": task, "instances": views });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("ID:           {}", task.id);
    println!("Title:        {}", task.title);
    println!("Frequency:    {}", format_frequency(task.frequency));
    println!("Priority:     {}", format_priority(task.priority));
    match task.frequency {
        Frequency::OneTime => {
            println!("Due:          {}", task.due_date.as_deref().unwrap_or("-"));
            println!("Status:       {}", format_status(task.stored_status()));
        }
        _ => {
            println!("Start:        {}", task.start_date.as_deref().unwrap_or("-"));
            println!("End:          {}", task.end_date.as_deref().unwrap_or("-"));
            if task.frequency == Frequency::Weekly {
                println!("Weekly days:  {}", list_or_dash(&task.weekly_days));
            }
        }
    }
    println!("Projects:     {}", list_or_dash(&task.project_names));
    println!("Partners:     {}", list_or_dash(&task.assigned_partners));
    println!("Categories:   {}", list_or_dash(&task.categories));
    println!("Duration:     {}", task.estimated_duration.as_deref().unwrap_or("-"));
    println!("Description:\n{}\n", task.description.as_deref().unwrap_or("-"));

    if let Err(e) = task.schedule() {
        println!("Warning: {e}");
    }

    if task.frequency.is_recurring() {
        println!("Instances {} .. {}:", window.from, window.to);
        if own.is_empty() {
            println!("  -");
        }
        for i in &own {
            let by = i.completion().map(|c| format!(" ({} on {})", c.completed_by, c.completion_date)).unwrap_or_default();
            println!("  {:<24} {:<11}{}", i.id(), format_status(i.status()), by);
        }
        println!("Completion records: {}", db.completions_for(task_id).count());
    }
    Ok(())
}

/// Update fields on a template. An instance ID targets its template.
pub fn cmd_update(db: &mut Database, session: &Session, args: UpdateArgs) -> Result<()> {
    let instances = session.derive(db, &session.window(&args.window)?);
    let task_id = resolve_template(&args.id, db, &instances)?;

    let due = args.due.as_deref().map(|s| session.date_string("due", s)).transpose()?;
    let start = args.start.as_deref().map(|s| session.date_string("start", s)).transpose()?;
    let end = args.end.as_deref().map(|s| session.date_string("end", s)).transpose()?;

    let t = db.get_mut(task_id).ok_or(Error::TaskNotFound(task_id))?;
    let mut updated = t.clone();

    if let Some(s) = args.title {
        updated.title = s;
    }
    if let Some(d) = args.desc {
        updated.description = if d.trim().is_empty() { None } else { Some(d) };
    }
    if let Some(p) = args.priority {
        updated.priority = Some(p);
    }
    if !args.projects.is_empty() {
        updated.project_names = split_list(&args.projects);
    }
    if !args.partners.is_empty() {
        updated.assigned_partners = split_list(&args.partners);
    }
    if !args.categories.is_empty() {
        updated.categories = split_list(&args.categories);
    }
    if let Some(d) = args.duration {
        updated.estimated_duration = Some(d);
    }
    if let Some(f) = args.frequency {
        updated.frequency = f;
    }
    if due.is_some() {
        updated.due_date = due;
    }
    if start.is_some() {
        updated.start_date = start;
    }
    if end.is_some() {
        updated.end_date = end;
    }
    if args.clear_end {
        updated.end_date = None;
    }
    if !args.weekly_days.is_empty() {
        updated.weekly_days = split_list(&args.weekly_days);
    }

    // Keep exactly one of due_date / start_date populated.
    if updated.frequency.is_recurring() {
        updated.due_date = None;
        if updated.frequency != Frequency::Weekly {
            updated.weekly_days.clear();
        }
    } else {
        updated.start_date = None;
        updated.end_date = None;
        updated.weekly_days.clear();
        if updated.status.is_none() {
            updated.status = Some(Status::Pending);
        }
    }
    updated.schedule()?;

    // Period identifiers of different frequencies can collide ("2024-01-08" is both a day
    // and a week), so records of the old frequency can't carry over.
    let frequency_changed = updated.frequency != t.frequency;
    updated.updated_at_utc = Utc::now().timestamp();
    *t = updated;
    if frequency_changed {
        let dropped = db.clear_completions(task_id);
        info!(task_id, dropped, "frequency changed, dropped completion records");
        if dropped > 0 {
            println!("Cleared {dropped} completion record(s) from the previous frequency");
        }
    }
    session.save(db)?;
    println!("Updated task {task_id}");
    Ok(())
}

/// Move the selected instances to `status`.
pub fn cmd_status(
    db: &mut Database,
    session: &Session,
    ids: Vec<String>,
    status: Status,
    window: WindowArgs,
) -> Result<()> {
    let window = session.window(&window)?;
    let instances = session.derive(db, &window);
    let actor = session.config.user.actor();
    let ctx = TransitionContext { today: session.today, actor: &actor };

    let outcome = bulk_set_status(db, &instances, &ids, status, &ctx);
    // Succeeded writes are kept even when others failed.
    if outcome.applied > 0 {
        session.save(db)?;
    }
    report_bulk(&outcome);
    let applied = outcome.into_result()?;
    println!("Set {} instance(s) to {}", applied, format_status(status));
    Ok(())
}

/// Delete the templates behind the selected instances, each exactly once.
pub fn cmd_delete(db: &mut Database, session: &Session, ids: Vec<String>, yes: bool, window: WindowArgs) -> Result<()> {
    let window = session.window(&window)?;
    let instances = session.derive(db, &window);
    let plan = plan_bulk_delete(&instances, &ids);

    for id in &plan.unknown {
        eprintln!("Skipping unknown instance {id}");
    }
    if plan.template_ids.is_empty() {
        println!("No tasks selected for deletion.");
        return Ok(());
    }

    println!("Will delete {} task(s) with all their instances:", plan.template_ids.len());
    for &task_id in &plan.template_ids {
        if let Some(task) = db.get(task_id) {
            println!("  {} - {}", task_id, task.title);
        }
    }
    if !yes && !confirm("Proceed? [y/N] ")? {
        println!("Aborted.");
        return Ok(());
    }

    let outcome = bulk_delete(db, &plan);
    if outcome.applied > 0 {
        session.save(db)?;
    }
    report_bulk(&outcome);
    let applied = outcome.into_result()?;
    println!("Deleted {applied} task(s).");
    Ok(())
}

/// Print status counts for the window.
pub fn cmd_stats(db: &Database, session: &Session, window: WindowArgs) -> Result<()> {
    let window = session.window(&window)?;
    let instances = session.derive(db, &window);
    let stats = TaskStats::from_instances(&instances);

    if session.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    println!("Window {} .. {}", window.from, window.to);
    println!("{:<12} {}", "Total", stats.total);
    println!("{:<12} {}", "Completed", stats.completed);
    println!("{:<12} {}", "InProgress", stats.in_progress);
    println!("{:<12} {}", "Pending", stats.pending);
    println!("{:<12} {}", "Overdue", stats.overdue);
    println!("{:<12} {:.1}%", "Rate", stats.completion_rate);
    Ok(())
}

/// List all distinct project names across templates.
pub fn cmd_projects(db: &Database) {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for t in &db.tasks {
        if t.project_names.is_empty() {
            *counts.entry("-".into()).or_default() += 1;
        }
        for p in &t.project_names {
            *counts.entry(p.clone()).or_default() += 1;
        }
    }
    println!("{:<24} {}", "Project", "Count");
    for (p, c) in counts {
        println!("{:<24} {}", truncate(&p, 24), c);
    }
}

/// Export the window's instances to an `.ics` file.
pub fn cmd_export(db: &Database, session: &Session, output: Option<PathBuf>, window: WindowArgs) -> Result<()> {
    let window = session.window(&window)?;
    let instances = session.derive(db, &window);
    let refs: Vec<&TaskInstance> = instances.iter().collect();
    let ics = render_ics(&refs, Utc::now());

    let path = output.unwrap_or_else(|| PathBuf::from(format!("opsdesk-tasks-{}.ics", session.today.format("%Y-%m-%d"))));
    std::fs::write(&path, ics)?;
    println!("Exported {} event(s) to {}", refs.len(), path.display());
    Ok(())
}

/// Re-derive the window on a schedule, backing off while the database can't be read.
pub fn cmd_watch(session: &Session, checks: Option<u32>, window: WindowArgs) -> Result<()> {
    let window = session.window(&window)?;
    let clock = SystemClock;
    let mut schedule = RecheckSchedule::new(session.config.watch.backoff(), &clock);
    let mut done = 0u32;

    loop {
        std::thread::sleep(schedule.until_due(&clock));
        let outcome = match Database::load(&session.db_path) {
            Ok(db) => {
                let stats = TaskStats::from_instances(&session.derive(&db, &window));
                println!(
                    "{} total={} completed={} in_progress={} pending={} overdue={} rate={:.1}%",
                    Local::now().format("%H:%M:%S"),
                    stats.total,
                    stats.completed,
                    stats.in_progress,
                    stats.pending,
                    stats.overdue,
                    stats.completion_rate
                );
                CheckOutcome::Success
            }
            Err(e) => {
                eprintln!("check failed: {e}");
                CheckOutcome::Failed
            }
        };
        let wait = schedule.complete(outcome, &clock);
        debug!(wait_ms = wait.as_millis() as u64, errors = schedule.backoff().error_count(), "next check scheduled");

        done += 1;
        if checks.is_some_and(|n| done >= n) {
            return Ok(());
        }
    }
}

/// Generate shell completion scripts.
pub fn cmd_completions(shell: Shell) {
    use crate::cli::Cli;
    use clap::CommandFactory;

    let mut app = Cli::command();
    let app_name = app.get_name().to_string();
    generate(shell, &mut app, app_name, &mut io::stdout());
}

/// Default database location inside the data directory.
pub fn default_db_path(data_dir: &Path) -> PathBuf {
    data_dir.join("tasks.json")
}

fn list_or_dash(v: &[String]) -> String {
    if v.is_empty() {
        "-".to_string()
    } else {
        v.join(", ")
    }
}

fn report_bulk(outcome: &BulkOutcome) {
    for (id, err) in &outcome.failed {
        eprintln!("  {id}: {err}");
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(matches!(line.trim().to_lowercase().as_str(), "y" | "yes"))
}

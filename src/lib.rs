//! # opsdesk
//!
//! Recurring task instancing and completion tracking for multi-site restaurant
//! operations.
//!
//! Task templates are either one-time (with a due date) or recurring (daily, weekly,
//! monthly, quarterly, with a start and optional end date). For a date window, the engine
//! materializes one instance per calendar period and derives its status from sparse
//! per-period completion records:
//!
//! ```
//! use chrono::NaiveDate;
//! use opsdesk::engine::{materialize, DateWindow, InstanceOptions};
//! use opsdesk::fields::Frequency;
//! use opsdesk::task::TaskTemplate;
//!
//! let template: TaskTemplate = serde_json::from_str(
//!     r#"{"id": 1, "title": "Grease trap check", "frequency": "weekly",
//!         "start_date": "2024-01-01", "end_date": "2024-01-31"}"#,
//! ).unwrap();
//! let from = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
//! let to = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
//! let instances = materialize(&[template], &[], &DateWindow::new(from, to), &InstanceOptions::new(from));
//! assert_eq!(instances.len(), 5);
//! assert_eq!(instances[0].id(), "1-2024-01-01");
//! assert_eq!(instances[0].template().frequency, Frequency::Weekly);
//! ```
//!
//! Status changes are planned per instance and written through a [`transition::TaskStore`];
//! the bundled [`db::Database`] keeps everything in one JSON file.

pub mod backoff;
pub mod calendar;
pub mod cli;
pub mod cmd;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod fields;
pub mod instance;
pub mod period;
pub mod query;
pub mod task;
pub mod transition;

pub use error::{Error, Result};

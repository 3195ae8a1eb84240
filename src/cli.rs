use std::path::PathBuf;

use clap::Parser;

use crate::cmd::Commands;

/// File-backed operations task tracker.
/// Storage defaults to ~/.opsdesk/tasks.json or a path passed via --db.
#[derive(Parser)]
#[command(name = "opsdesk", version, about = "Recurring operations task tracker")]
pub struct Cli {
    /// Path to the JSON database file.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Path to the TOML configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit JSON instead of tables.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

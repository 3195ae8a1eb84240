//! # opsdesk
//!
//! Command-line tracker for recurring restaurant operations tasks: line checks,
//! equipment maintenance, inspections and other work that repeats daily, weekly,
//! monthly or quarterly across sites.
//!
//! ## Quick Start
//!
//! ```bash
//! # A weekly task, from today on
//! opsdesk add "Grease trap check" --frequency weekly --project "Downtown"
//!
//! # A one-time task
//! opsdesk add "Health inspection prep" --due "next friday" --priority high
//!
//! # Instances for the default window (last week through two weeks ahead)
//! opsdesk list
//!
//! # Complete this week's occurrence
//! opsdesk complete 1-2024-01-08
//! ```
//!
//! Data is stored in `~/.opsdesk/tasks.json`; settings are read from
//! `~/.opsdesk/config.toml` when present. Set `RUST_LOG=opsdesk=debug` for logs.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use opsdesk::cli::Cli;
use opsdesk::cmd::*;
use opsdesk::config::Config;
use opsdesk::db::Database;
use opsdesk::fields::Status;
use opsdesk::Result;

fn main() -> ExitCode {
    // Tracing is opt-in via RUST_LOG; an invalid filter is ignored.
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|raw| EnvFilter::try_new(raw.trim()).ok())
        .unwrap_or_else(|| EnvFilter::new("off"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let data_dir = {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".opsdesk")
    };
    let db_path = cli.db.unwrap_or_else(|| default_db_path(&data_dir));
    let config_path = cli.config.unwrap_or_else(|| data_dir.join("config.toml"));
    let config = Config::load(&config_path)?;
    let session = Session::new(db_path, config, cli.json);

    match cli.command {
        Commands::Completions { shell } => {
            cmd_completions(shell);
            Ok(())
        }

        Commands::Watch { checks, window } => cmd_watch(&session, checks, window),

        Commands::Add(args) => cmd_add(&mut load(&session)?, &session, args),

        Commands::List(args) => cmd_list(&load(&session)?, &session, args),

        Commands::View { id, window } => cmd_view(&load(&session)?, &session, id, window),

        Commands::Update(args) => cmd_update(&mut load(&session)?, &session, args),

        Commands::Status { status, ids, window } => cmd_status(&mut load(&session)?, &session, ids, status, window),

        Commands::Complete { ids, window } => {
            cmd_status(&mut load(&session)?, &session, ids, Status::Completed, window)
        }

        Commands::Reopen { ids, window } => cmd_status(&mut load(&session)?, &session, ids, Status::Pending, window),

        Commands::Delete { ids, yes, window } => cmd_delete(&mut load(&session)?, &session, ids, yes, window),

        Commands::Stats { window } => cmd_stats(&load(&session)?, &session, window),

        Commands::Projects => {
            cmd_projects(&load(&session)?);
            Ok(())
        }

        Commands::Export { output, window } => cmd_export(&load(&session)?, &session, output, window),
    }
}

fn load(session: &Session) -> Result<Database> {
    Database::load(&session.db_path)
}

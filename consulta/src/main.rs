//! consulta - consultation agent companion
//!
//! Command line front end for meetings and consultation sessions: lifecycle
//! changes, transcript turns, requirements and generated documents.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Database: $XDG_DATA_HOME/consulta/consulta.db (~/.local/share/consulta/consulta.db)
//! - Config: $XDG_CONFIG_HOME/consulta/config.toml (~/.config/consulta/config.toml)
//! - Logs: $XDG_STATE_HOME/consulta/ (~/.local/state/consulta/)

mod meeting;
mod output;
mod session;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use consulta_core::{Config, ConsultationService, Database};

use crate::meeting::MeetingCommand;
use crate::output::Format;
use crate::session::SessionCommand;

pub type Service = ConsultationService<Database>;

#[derive(Parser)]
#[command(name = "consulta")]
#[command(about = "Track consultation meetings, transcripts and requirements")]
#[command(version)]
struct Args {
    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = Format::Text)]
    format: Format,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create and drive meetings
    #[command(subcommand)]
    Meeting(MeetingCommand),

    /// Open and drive consultation sessions
    #[command(subcommand)]
    Session(SessionCommand),
}

fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging (to file, stdout is for command output)
    let _log_guard =
        consulta_core::logging::init(&config.logging).context("failed to initialize logging")?;

    // Open database
    let db_path = Config::database_path();
    tracing::debug!(path = %db_path.display(), "Opening database");

    let db = Database::open(&db_path).context("failed to open database")?;
    db.migrate().context("failed to run database migrations")?;

    let service = ConsultationService::with_system_clock(db, config.sessions.clone());

    match args.command {
        Command::Meeting(cmd) => meeting::run(&service, cmd, args.format),
        Command::Session(cmd) => session::run(&service, &config, cmd, args.format),
    }
}

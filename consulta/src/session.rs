//! `consulta session ...`

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Subcommand;
use consulta_core::{
    BlockingGenerator, Config, DocumentType, NewConversation, NewRequirement, RequirementPriority,
    SessionFilter, SessionStatus, SessionType, Speaker,
};
use uuid::Uuid;

use crate::meeting::{resolve_meeting, resolve_prefix};
use crate::output::{self, emit, Format};
use crate::Service;

#[derive(Subcommand)]
pub enum SessionCommand {
    /// Open a session for a meeting
    Open {
        meeting: String,
        agent: Uuid,

        /// development_consultation, architecture_review or technical_interview
        #[arg(short = 't', long = "type")]
        session_type: Option<SessionType>,
    },

    /// Start an initializing session
    Start { id: String },

    /// Pause an active session
    Pause { id: String },

    /// Resume a paused session
    Resume { id: String },

    /// Complete an active session
    Complete { id: String },

    /// Mark a session as failed
    Fail { id: String },

    /// Append a turn to the transcript
    Say {
        id: String,

        /// user, agent or system
        speaker: Speaker,

        text: String,

        /// Media chunk the turn was transcribed from
        #[arg(long)]
        media: Option<String>,
    },

    /// Record a requirement
    Require {
        id: String,
        title: String,

        #[arg(short, long)]
        category: String,

        /// low, medium, high or critical
        #[arg(short, long, default_value = "medium")]
        priority: RequirementPriority,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// Show a session with its latest turns
    Show {
        id: String,

        /// Number of turns to print
        #[arg(long, default_value_t = 10)]
        turns: usize,
    },

    /// List requirements, optionally filtered
    Requirements {
        id: String,

        #[arg(short, long)]
        category: Option<String>,

        #[arg(short, long)]
        priority: Option<RequirementPriority>,
    },

    /// Generate a document from the session's requirements and transcript
    Generate {
        id: String,

        /// requirements, specification, architecture or estimate
        document_type: DocumentType,
    },

    /// List sessions, newest first
    List {
        /// Only sessions of this meeting
        #[arg(short, long)]
        meeting: Option<String>,

        #[arg(short, long)]
        status: Option<SessionStatus>,

        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Print new turns as they are recorded
    Watch {
        id: String,

        /// Poll interval in milliseconds
        #[arg(long, default_value = "1000")]
        poll: u64,
    },
}

pub fn run(service: &Service, config: &Config, cmd: SessionCommand, format: Format) -> Result<()> {
    match cmd {
        SessionCommand::Open {
            meeting,
            agent,
            session_type,
        } => {
            let meeting_id = resolve_meeting(service, &meeting)?;
            let session = service
                .open_session(meeting_id, agent, session_type)
                .context("failed to open session")?;
            emit(format, &session, |s| {
                println!("Opened {} session {}", s.session_type(), s.id());
            })
        }
        SessionCommand::Start { id } => {
            let session = service.start_session(resolve_session(service, &id)?)?;
            emit(format, &session, |s| println!("Session {} is {}", s.id(), s.status()))
        }
        SessionCommand::Pause { id } => {
            let session = service.pause_session(resolve_session(service, &id)?)?;
            emit(format, &session, |s| println!("Session {} is {}", s.id(), s.status()))
        }
        SessionCommand::Resume { id } => {
            let session = service.resume_session(resolve_session(service, &id)?)?;
            emit(format, &session, |s| println!("Session {} is {}", s.id(), s.status()))
        }
        SessionCommand::Complete { id } => {
            let session = service.complete_session(resolve_session(service, &id)?)?;
            emit(format, &session, |s| println!("Session {} is {}", s.id(), s.status()))
        }
        SessionCommand::Fail { id } => {
            let session = service.fail_session(resolve_session(service, &id)?)?;
            emit(format, &session, |s| println!("Session {} is {}", s.id(), s.status()))
        }
        SessionCommand::Say {
            id,
            speaker,
            text,
            media,
        } => {
            let mut turn = NewConversation::new(speaker, text);
            if let Some(media) = media {
                turn = turn.with_media(media);
            }
            let turn = service.record_turn(resolve_session(service, &id)?, turn)?;
            emit(format, &turn, output::print_turn)
        }
        SessionCommand::Require {
            id,
            title,
            category,
            priority,
            description,
        } => {
            let mut requirement = NewRequirement::new(service.ids(), title, category, priority);
            if let Some(description) = description {
                requirement = requirement.with_description(description);
            }
            let requirement =
                service.record_requirement(resolve_session(service, &id)?, requirement)?;
            emit(format, &requirement, output::print_requirement)
        }
        SessionCommand::Show { id, turns } => {
            let session = service.session(resolve_session(service, &id)?)?;
            emit(format, &session, |s| {
                output::print_session(s, turns, service.clock())
            })
        }
        SessionCommand::Requirements {
            id,
            category,
            priority,
        } => {
            let session = service.session(resolve_session(service, &id)?)?;
            let requirements: Vec<_> = session
                .requirements()
                .iter()
                .filter(|r| category.as_deref().map_or(true, |c| r.category == c))
                .filter(|r| priority.map_or(true, |p| r.priority == p))
                .collect();

            emit(format, &requirements, |requirements| {
                if requirements.is_empty() {
                    println!("No requirements recorded.");
                    return;
                }
                for p in RequirementPriority::DESCENDING {
                    let group: Vec<_> = requirements.iter().filter(|r| r.priority == p).collect();
                    if group.is_empty() {
                        continue;
                    }
                    println!("{} ({})", p, group.len());
                    for r in group {
                        output::print_requirement(r);
                    }
                }
            })
        }
        SessionCommand::Generate { id, document_type } => {
            let generator = BlockingGenerator::new(&config.generator)?.with_context(|| {
                format!(
                    "document generator is not configured; set [generator] in {}",
                    Config::config_path().display()
                )
            })?;
            let document = service
                .generate_document(resolve_session(service, &id)?, document_type, &generator)
                .context("document generation failed")?;
            emit(format, &document, |d| {
                println!("Generated {} document {}", d.document_type, d.id);
                println!("  Title:     {}", d.title);
                println!("  Reference: {}", d.reference);
            })
        }
        SessionCommand::List {
            meeting,
            status,
            limit,
        } => {
            let meeting_id = meeting
                .map(|m| resolve_meeting(service, &m))
                .transpose()?;
            let sessions = service.list_sessions(&SessionFilter {
                meeting_id,
                status,
                limit,
            })?;
            emit(format, &sessions, |sessions| {
                if sessions.is_empty() {
                    println!("No sessions found.");
                }
                for s in sessions {
                    output::print_session_row(s);
                }
            })
        }
        SessionCommand::Watch { id, poll } => {
            let session_id = resolve_session(service, &id)?;
            run_watch(service, session_id, Duration::from_millis(poll), format)
        }
    }
}

/// Full UUID, or a unique prefix of a stored session id
fn resolve_session(service: &Service, input: &str) -> Result<Uuid> {
    if let Ok(id) = Uuid::parse_str(input) {
        return Ok(id);
    }
    let sessions = service.list_sessions(&SessionFilter::default())?;
    resolve_prefix("session", input, sessions.iter().map(|s| s.id()))
}

/// Follow a session's transcript until Ctrl+C or until the session ends.
///
/// Reads the database directly so turns recorded by other processes show up.
fn run_watch(service: &Service, session_id: Uuid, poll: Duration, format: Format) -> Result<()> {
    let db = service.repository();
    if db.session_status(session_id)?.is_none() {
        anyhow::bail!("No session found matching '{}'", session_id);
    }

    // Set up signal handler for graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        eprintln!("\nShutting down...");
        r.store(false, Ordering::SeqCst);
    })
    .context("failed to set Ctrl+C handler")?;

    if format == Format::Text {
        println!(
            "Watching session {} (poll every {}ms). Press Ctrl+C to stop.",
            session_id,
            poll.as_millis()
        );
        println!();
    }

    let mut last_seen = 0u32;

    while running.load(Ordering::SeqCst) {
        for turn in db.conversations_since(session_id, last_seen)? {
            last_seen = turn.sequence_number;
            match format {
                Format::Json => println!("{}", serde_json::to_string(&turn)?),
                Format::Text => output::print_turn(&turn),
            }
        }

        let status = db.session_status(session_id)?;
        if matches!(
            status,
            Some(SessionStatus::Completed) | Some(SessionStatus::Failed) | None
        ) {
            // Pick up anything written between the two reads
            for turn in db.conversations_since(session_id, last_seen)? {
                match format {
                    Format::Json => println!("{}", serde_json::to_string(&turn)?),
                    Format::Text => output::print_turn(&turn),
                }
            }
            if format == Format::Text {
                let status = status.map_or("removed".to_string(), |s| s.to_string());
                println!("[{}] Session {}", output::now_stamp(), status);
            }
            tracing::info!(session_id = %session_id, "watch stopped: session finished");
            return Ok(());
        }

        thread::sleep(poll);
    }

    if format == Format::Text {
        println!("Watch mode stopped.");
    }
    tracing::info!(session_id = %session_id, "watch stopped");
    Ok(())
}

//! `consulta meeting ...`

use anyhow::{Context, Result};
use clap::Subcommand;
use consulta_core::{MeetingFilter, MeetingStatus, ParticipantDraft, ParticipantRole};
use uuid::Uuid;

use crate::output::{self, emit, Format};
use crate::Service;

#[derive(Subcommand)]
pub enum MeetingCommand {
    /// Create a meeting for a video call URL
    Create {
        url: String,

        /// Human readable title
        #[arg(short, long)]
        title: Option<String>,

        /// Host user id
        #[arg(long)]
        host: Option<Uuid>,
    },

    /// Mark a waiting meeting as started
    Start { id: String },

    /// End an active meeting
    End { id: String },

    /// Cancel a meeting that has not ended
    Cancel { id: String },

    /// Add a participant to an active meeting
    Join {
        id: String,
        name: String,

        /// host, guest or agent
        #[arg(short, long, default_value = "guest")]
        role: ParticipantRole,

        /// External user id of the participant
        #[arg(long)]
        user: Option<Uuid>,
    },

    /// Mark a participant as having left
    Leave { id: String, participant: String },

    /// Show one meeting with its roster
    Show { id: String },

    /// List meetings, newest first
    List {
        /// Only meetings in this status
        #[arg(short, long)]
        status: Option<MeetingStatus>,

        /// Maximum number of meetings
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

pub fn run(service: &Service, cmd: MeetingCommand, format: Format) -> Result<()> {
    match cmd {
        MeetingCommand::Create { url, title, host } => {
            let meeting = service
                .create_meeting(&url, title, host)
                .context("failed to create meeting")?;
            emit(format, &meeting, |m| {
                println!("Created meeting {}", m.id());
            })
        }
        MeetingCommand::Start { id } => {
            let meeting = service.start_meeting(resolve_meeting(service, &id)?)?;
            emit(format, &meeting, |m| println!("Meeting {} is {}", m.id(), m.status()))
        }
        MeetingCommand::End { id } => {
            let meeting = service.end_meeting(resolve_meeting(service, &id)?)?;
            emit(format, &meeting, |m| println!("Meeting {} is {}", m.id(), m.status()))
        }
        MeetingCommand::Cancel { id } => {
            let meeting = service.cancel_meeting(resolve_meeting(service, &id)?)?;
            emit(format, &meeting, |m| println!("Meeting {} is {}", m.id(), m.status()))
        }
        MeetingCommand::Join {
            id,
            name,
            role,
            user,
        } => {
            let meeting_id = resolve_meeting(service, &id)?;
            let mut draft = ParticipantDraft::new(service.ids(), name).with_role(role);
            if let Some(user) = user {
                draft = draft.with_user(user);
            }
            let participant = service.join_meeting(meeting_id, draft)?;
            emit(format, &participant, |p| {
                println!("{} joined as {} ({})", p.display_name, p.role, p.id);
            })
        }
        MeetingCommand::Leave { id, participant } => {
            let meeting_id = resolve_meeting(service, &id)?;
            let meeting = service.meeting(meeting_id)?;
            let participant_id = resolve_prefix(
                "participant",
                &participant,
                meeting.participants().iter().map(|p| p.id),
            )?;
            service.leave_meeting(meeting_id, participant_id)?;

            let meeting = service.meeting(meeting_id)?;
            let entry = meeting.find_participant(participant_id);
            emit(format, &entry, |p| {
                if let Some(p) = p {
                    println!("{} left meeting {}", p.display_name, meeting_id);
                }
            })
        }
        MeetingCommand::Show { id } => {
            let meeting = service.meeting(resolve_meeting(service, &id)?)?;
            emit(format, &meeting, |m| output::print_meeting(m, service.clock()))
        }
        MeetingCommand::List { status, limit } => {
            let meetings = service.list_meetings(&MeetingFilter { status, limit })?;
            emit(format, &meetings, |meetings| {
                if meetings.is_empty() {
                    println!("No meetings found.");
                }
                for m in meetings {
                    output::print_meeting_row(m);
                }
            })
        }
    }
}

/// Full UUID, or a unique prefix of a stored meeting id
pub fn resolve_meeting(service: &Service, input: &str) -> Result<Uuid> {
    if let Ok(id) = Uuid::parse_str(input) {
        return Ok(id);
    }
    let meetings = service.list_meetings(&MeetingFilter::default())?;
    resolve_prefix("meeting", input, meetings.iter().map(|m| m.id()))
}

/// Pick the single id among `candidates` that starts with `prefix`
pub fn resolve_prefix(
    entity: &str,
    prefix: &str,
    candidates: impl IntoIterator<Item = Uuid>,
) -> Result<Uuid> {
    if let Ok(id) = Uuid::parse_str(prefix) {
        return Ok(id);
    }

    let needle = prefix.to_ascii_lowercase();
    let matches: Vec<Uuid> = candidates
        .into_iter()
        .filter(|id| id.to_string().starts_with(&needle))
        .collect();

    match matches.as_slice() {
        [] => anyhow::bail!("No {} found matching '{}'", entity, prefix),
        [id] => Ok(*id),
        _ => anyhow::bail!(
            "'{}' matches {} {}s; use more characters",
            prefix,
            matches.len(),
            entity
        ),
    }
}

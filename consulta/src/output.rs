//! Rendering for command results.

use anyhow::Result;
use chrono::Utc;
use clap::ValueEnum;
use consulta_core::format::{format_duration, format_relative_time, truncate};
use consulta_core::{
    Clock, ConsultationSession, Conversation, GeneratedDocument, Meeting, Participant, Requirement,
};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Text,
    Json,
}

/// Print `value` as pretty JSON, or hand it to `text` for human output.
pub fn emit<T: Serialize + ?Sized>(format: Format, value: &T, text: impl FnOnce(&T)) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(value)?),
        Format::Text => text(value),
    }
    Ok(())
}

fn short(id: uuid::Uuid) -> String {
    id.to_string()[..8].to_string()
}

pub fn print_meeting(meeting: &Meeting, clock: &dyn Clock) {
    println!("Meeting {}", meeting.id());
    println!("  URL:        {}", meeting.url());
    if let Some(title) = meeting.title() {
        println!("  Title:      {}", title);
    }
    println!("  Status:     {}", meeting.status());
    if let Some(host) = meeting.host_user_id() {
        println!("  Host:       {}", host);
    }
    println!(
        "  Created:    {}",
        format_relative_time(meeting.created_at(), clock.now())
    );
    if meeting.started_at().is_some() {
        println!("  Duration:   {}", format_duration(meeting.duration(clock)));
    }

    if !meeting.participants().is_empty() {
        println!("  Participants:");
        for p in meeting.participants() {
            print_participant(p);
        }
    }
}

pub fn print_participant(p: &Participant) {
    let state = if p.is_active { "present" } else { "left" };
    println!(
        "    {}  {:<20} {:<6} {}",
        short(p.id),
        truncate(&p.display_name, 20),
        p.role.as_str(),
        state
    );
}

pub fn print_meeting_row(meeting: &Meeting) {
    println!(
        "{}  {:<9} {:>3} present  {}",
        short(meeting.id()),
        meeting.status().as_str(),
        meeting.active_participants().len(),
        meeting.title().unwrap_or(meeting.url())
    );
}

pub fn print_session(session: &ConsultationSession, turns: usize, clock: &dyn Clock) {
    println!("Session {}", session.id());
    println!("  Meeting:      {}", session.meeting_id());
    println!("  Agent:        {}", session.agent_id());
    println!("  Type:         {}", session.session_type());
    println!("  Status:       {}", session.status());
    println!(
        "  Created:      {}",
        format_relative_time(session.created_at(), clock.now())
    );
    println!("  Duration:     {}", format_duration(session.duration(clock)));
    println!("  Turns:        {}", session.conversations().len());
    println!("  Requirements: {}", session.requirements().len());

    if !session.documents().is_empty() {
        println!("  Documents:");
        for doc in session.documents() {
            print_document(doc);
        }
    }

    let latest = session.latest_conversations(turns);
    if !latest.is_empty() {
        println!();
        for turn in latest {
            print_turn(turn);
        }
    }
}

pub fn print_session_row(session: &ConsultationSession) {
    println!(
        "{}  {:<12} {:<24} {:>4} turns  meeting {}",
        short(session.id()),
        session.status().as_str(),
        session.session_type().as_str(),
        session.conversations().len(),
        short(session.meeting_id())
    );
}

pub fn print_turn(turn: &Conversation) {
    let time = turn.timestamp.with_timezone(&chrono::Local).format("%H:%M:%S");
    match &turn.media_ref {
        Some(media) => println!(
            "[{:>4}] {} {:<6} {}  ({})",
            turn.sequence_number,
            time,
            turn.speaker.as_str(),
            turn.text,
            media
        ),
        None => println!(
            "[{:>4}] {} {:<6} {}",
            turn.sequence_number,
            time,
            turn.speaker.as_str(),
            turn.text
        ),
    }
}

pub fn print_requirement(req: &Requirement) {
    println!(
        "{}  {:<8} {:<14} {}",
        short(req.id),
        req.priority.as_str(),
        truncate(&req.category, 14),
        req.title
    );
    if let Some(description) = &req.description {
        println!("          {}", description);
    }
}

pub fn print_document(doc: &GeneratedDocument) {
    println!(
        "    {}  {:<14} {}  {}",
        short(doc.id),
        doc.document_type.as_str(),
        doc.title,
        doc.reference
    );
}

/// Local time for messages that are not tied to a stored timestamp
pub fn now_stamp() -> String {
    Utc::now()
        .with_timezone(&chrono::Local)
        .format("%H:%M:%S")
        .to_string()
}

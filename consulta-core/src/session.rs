//! Consultation sessions
//!
//! A [`ConsultationSession`] is the consultation overlay riding on a meeting.
//! It owns three collections:
//!
//! | Collection | Ordering | Guard |
//! |------------|----------|-------|
//! | Ledger ([`Conversation`]) | dense sequence numbers 1..N | session must be active |
//! | [`Requirement`]s | insertion order | none |
//! | [`GeneratedDocument`]s | insertion order | none |
//!
//! Requirements are accepted in any status because elicitation results can
//! arrive after the live window closes. Conversation turns are not.
//!
//! The session refers to its meeting by id only. Nothing here looks at the
//! meeting's status.

use crate::clock::{Clock, IdGenerator};
use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

// ============================================
// Status
// ============================================

/// Lifecycle status of a consultation session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Initializing,
    Active,
    Paused,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Initializing => "initializing",
            SessionStatus::Active => "active",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }

    /// Transition table. `Fail` is accepted from every status.
    pub fn apply(self, action: SessionAction) -> Option<SessionStatus> {
        use SessionAction::*;
        use SessionStatus::*;

        match (self, action) {
            (_, Fail) => Some(Failed),
            (Initializing, Start) => Some(Active),
            (Active, Pause) => Some(Paused),
            (Paused, Resume) => Some(Active),
            (Active, Complete) => Some(Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "initializing" => Ok(SessionStatus::Initializing),
            "active" => Ok(SessionStatus::Active),
            "paused" => Ok(SessionStatus::Paused),
            "completed" => Ok(SessionStatus::Completed),
            "failed" => Ok(SessionStatus::Failed),
            _ => Err(format!("unknown session status: {}", s)),
        }
    }
}

/// Lifecycle actions on a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionAction {
    Start,
    Pause,
    Resume,
    Complete,
    Fail,
}

impl SessionAction {
    pub const ALL: [SessionAction; 5] = [
        SessionAction::Start,
        SessionAction::Pause,
        SessionAction::Resume,
        SessionAction::Complete,
        SessionAction::Fail,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionAction::Start => "start",
            SessionAction::Pause => "pause",
            SessionAction::Resume => "resume",
            SessionAction::Complete => "complete",
            SessionAction::Fail => "fail",
        }
    }
}

/// Kind of consultation being run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    #[default]
    DevelopmentConsultation,
    ArchitectureReview,
    TechnicalInterview,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::DevelopmentConsultation => "development_consultation",
            SessionType::ArchitectureReview => "architecture_review",
            SessionType::TechnicalInterview => "technical_interview",
        }
    }
}

impl std::fmt::Display for SessionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SessionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "development_consultation" => Ok(SessionType::DevelopmentConsultation),
            "architecture_review" => Ok(SessionType::ArchitectureReview),
            "technical_interview" => Ok(SessionType::TechnicalInterview),
            _ => Err(format!("unknown session type: {}", s)),
        }
    }
}

// ============================================
// Conversation ledger
// ============================================

/// Who produced a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    /// A human in the meeting
    User,
    /// The consultation agent
    Agent,
    System,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Speaker::User => "user",
            Speaker::Agent => "agent",
            Speaker::System => "system",
        }
    }
}

impl std::fmt::Display for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Speaker {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(Speaker::User),
            "agent" => Ok(Speaker::Agent),
            "system" => Ok(Speaker::System),
            _ => Err(format!("unknown speaker: {}", s)),
        }
    }
}

/// One turn in the ledger. `sequence_number` is its identity within the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub session_id: Uuid,
    /// 1-based position in the ledger
    pub sequence_number: u32,
    pub timestamp: DateTime<Utc>,
    pub speaker: Speaker,
    pub text: String,
    /// Reference to the media chunk this turn was transcribed from
    pub media_ref: Option<String>,
}

/// A turn waiting to be appended to the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewConversation {
    pub speaker: Speaker,
    pub text: String,
    pub media_ref: Option<String>,
}

impl NewConversation {
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
            media_ref: None,
        }
    }

    pub fn with_media(mut self, media_ref: impl Into<String>) -> Self {
        self.media_ref = Some(media_ref.into());
        self
    }
}

// ============================================
// Requirements
// ============================================

/// Requirement priority, ordered from least to most urgent
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RequirementPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl RequirementPriority {
    /// Highest priority first
    pub const DESCENDING: [RequirementPriority; 4] = [
        RequirementPriority::Critical,
        RequirementPriority::High,
        RequirementPriority::Medium,
        RequirementPriority::Low,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequirementPriority::Low => "low",
            RequirementPriority::Medium => "medium",
            RequirementPriority::High => "high",
            RequirementPriority::Critical => "critical",
        }
    }
}

impl std::fmt::Display for RequirementPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RequirementPriority {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "low" => Ok(RequirementPriority::Low),
            "medium" => Ok(RequirementPriority::Medium),
            "high" => Ok(RequirementPriority::High),
            "critical" => Ok(RequirementPriority::Critical),
            _ => Err(format!("unknown requirement priority: {}", s)),
        }
    }
}

/// An elicited requirement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub id: Uuid,
    pub session_id: Uuid,
    /// Free-form classification key ("functional", "security", ...)
    pub category: String,
    pub priority: RequirementPriority,
    pub title: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A requirement waiting to be recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRequirement {
    pub id: Uuid,
    pub category: String,
    pub priority: RequirementPriority,
    pub title: String,
    pub description: Option<String>,
}

impl NewRequirement {
    pub fn new(
        ids: &dyn IdGenerator,
        title: impl Into<String>,
        category: impl Into<String>,
        priority: RequirementPriority,
    ) -> Self {
        Self {
            id: ids.next_id(),
            category: category.into(),
            priority,
            title: title.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

// ============================================
// Generated documents
// ============================================

/// Kind of artifact produced from a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Requirements,
    Specification,
    Architecture,
    Estimate,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Requirements => "requirements",
            DocumentType::Specification => "specification",
            DocumentType::Architecture => "architecture",
            DocumentType::Estimate => "estimate",
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DocumentType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "requirements" => Ok(DocumentType::Requirements),
            "specification" => Ok(DocumentType::Specification),
            "architecture" => Ok(DocumentType::Architecture),
            "estimate" => Ok(DocumentType::Estimate),
            _ => Err(format!("unknown document type: {}", s)),
        }
    }
}

/// Reference to an artifact produced by the document generator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedDocument {
    pub id: Uuid,
    pub session_id: Uuid,
    pub document_type: DocumentType,
    pub title: String,
    /// Where the artifact lives (URL, object key, ...)
    pub reference: String,
    /// SHA-256 of the artifact body, hex encoded, when the body was returned
    pub content_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// What a generator hands back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentDraft {
    pub document_type: DocumentType,
    pub title: String,
    pub reference: String,
    #[serde(default)]
    pub content: Option<String>,
}

/// Hex-encoded SHA-256 of a document body
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

// ============================================
// Session
// ============================================

/// The consultation overlay bound to one meeting and one agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsultationSession {
    pub(crate) id: Uuid,
    pub(crate) meeting_id: Uuid,
    pub(crate) agent_id: Uuid,
    pub(crate) status: SessionStatus,
    pub(crate) session_type: SessionType,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    pub(crate) completed_at: Option<DateTime<Utc>>,
    pub(crate) conversations: Vec<Conversation>,
    pub(crate) requirements: Vec<Requirement>,
    pub(crate) documents: Vec<GeneratedDocument>,
    /// Stored revision; 0 until first saved
    #[serde(default)]
    pub(crate) version: i64,
}

impl ConsultationSession {
    /// Create a session in `initializing` status.
    ///
    /// Fails with [`Error::Validation`] if either id is nil.
    pub fn new(
        meeting_id: Uuid,
        agent_id: Uuid,
        session_type: SessionType,
        ids: &dyn IdGenerator,
        clock: &dyn Clock,
    ) -> Result<Self> {
        if meeting_id.is_nil() {
            return Err(Error::Validation("meeting ID is required".to_string()));
        }
        if agent_id.is_nil() {
            return Err(Error::Validation("agent ID is required".to_string()));
        }

        let now = clock.now();
        Ok(Self {
            id: ids.next_id(),
            meeting_id,
            agent_id,
            status: SessionStatus::Initializing,
            session_type,
            created_at: now,
            updated_at: now,
            completed_at: None,
            conversations: Vec::new(),
            requirements: Vec::new(),
            documents: Vec::new(),
            version: 0,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn meeting_id(&self) -> Uuid {
        self.meeting_id
    }

    pub fn agent_id(&self) -> Uuid {
        self.agent_id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn session_type(&self) -> SessionType {
        self.session_type
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Revision of the stored row this copy matches
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Record the revision a repository just wrote
    pub fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    /// The whole ledger, oldest first
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn documents(&self) -> &[GeneratedDocument] {
        &self.documents
    }

    // ============================================
    // Transitions
    // ============================================

    /// initializing → active
    pub fn start(&mut self, clock: &dyn Clock) -> Result<()> {
        self.transition(SessionAction::Start, clock)
    }

    /// active → paused
    pub fn pause(&mut self, clock: &dyn Clock) -> Result<()> {
        self.transition(SessionAction::Pause, clock)
    }

    /// paused → active
    pub fn resume(&mut self, clock: &dyn Clock) -> Result<()> {
        self.transition(SessionAction::Resume, clock)
    }

    /// active → completed. A paused session has to resume first.
    pub fn complete(&mut self, clock: &dyn Clock) -> Result<()> {
        self.transition(SessionAction::Complete, clock)
    }

    /// Any status → failed. Never fails.
    pub fn fail(&mut self, clock: &dyn Clock) {
        let now = clock.now();
        self.status = SessionStatus::Failed;
        // completed_at tracks status == completed
        self.completed_at = None;
        self.updated_at = now;
    }

    /// Apply a lifecycle action. The session is untouched on failure.
    pub fn transition(&mut self, action: SessionAction, clock: &dyn Clock) -> Result<()> {
        if action == SessionAction::Fail {
            self.fail(clock);
            return Ok(());
        }

        let next = self
            .status
            .apply(action)
            .ok_or_else(|| Error::InvalidTransition {
                entity: "session",
                from: self.status.to_string(),
                action: action.as_str(),
            })?;

        let now = clock.now();
        self.status = next;
        self.updated_at = now;
        if next == SessionStatus::Completed {
            self.completed_at = Some(now);
        }

        Ok(())
    }

    // ============================================
    // Queries
    // ============================================

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Time since creation: up to completion, or up to now while the session
    /// is active or paused. Zero otherwise.
    pub fn duration(&self, clock: &dyn Clock) -> Duration {
        if let Some(completed) = self.completed_at {
            return completed - self.created_at;
        }

        match self.status {
            SessionStatus::Active | SessionStatus::Paused => clock.now() - self.created_at,
            _ => Duration::zero(),
        }
    }

    // ============================================
    // Ledger
    // ============================================

    /// Append a turn. Only allowed while the session is active.
    pub fn add_conversation(
        &mut self,
        turn: NewConversation,
        clock: &dyn Clock,
    ) -> Result<&Conversation> {
        if !self.is_active() {
            return Err(Error::InvalidState {
                entity: "session",
                status: self.status.to_string(),
                operation: "add conversation",
            });
        }

        let sequence_number = u32::try_from(self.conversations.len() + 1)
            .map_err(|_| Error::Validation("conversation ledger is full".to_string()))?;

        let now = clock.now();
        self.conversations.push(Conversation {
            session_id: self.id,
            sequence_number,
            timestamp: now,
            speaker: turn.speaker,
            text: turn.text,
            media_ref: turn.media_ref,
        });
        self.updated_at = now;

        let index = self.conversations.len() - 1;
        Ok(&self.conversations[index])
    }

    /// The last `limit` turns, oldest first.
    pub fn latest_conversations(&self, limit: usize) -> &[Conversation] {
        let start = self.conversations.len().saturating_sub(limit);
        &self.conversations[start..]
    }

    // ============================================
    // Requirements
    // ============================================

    /// Record a requirement, whatever the session status.
    ///
    /// A requirement id that is already recorded is a [`Error::Validation`].
    pub fn add_requirement(
        &mut self,
        requirement: NewRequirement,
        clock: &dyn Clock,
    ) -> Result<&Requirement> {
        if self.requirements.iter().any(|r| r.id == requirement.id) {
            return Err(Error::Validation(format!(
                "requirement {} is already recorded",
                requirement.id
            )));
        }

        let now = clock.now();
        self.requirements.push(Requirement {
            id: requirement.id,
            session_id: self.id,
            category: requirement.category,
            priority: requirement.priority,
            title: requirement.title,
            description: requirement.description,
            created_at: now,
            updated_at: now,
        });
        self.updated_at = now;

        let index = self.requirements.len() - 1;
        Ok(&self.requirements[index])
    }

    pub fn requirements_by_category(&self, category: &str) -> Vec<&Requirement> {
        self.requirements
            .iter()
            .filter(|r| r.category == category)
            .collect()
    }

    pub fn requirements_by_priority(&self, priority: RequirementPriority) -> Vec<&Requirement> {
        self.requirements
            .iter()
            .filter(|r| r.priority == priority)
            .collect()
    }

    /// Non-empty priority groups, most urgent first
    pub fn requirements_grouped_by_priority(&self) -> Vec<(RequirementPriority, Vec<&Requirement>)> {
        RequirementPriority::DESCENDING
            .iter()
            .map(|p| (*p, self.requirements_by_priority(*p)))
            .filter(|(_, group)| !group.is_empty())
            .collect()
    }

    // ============================================
    // Documents
    // ============================================

    /// Attach a generated artifact
    pub fn attach_document(
        &mut self,
        draft: DocumentDraft,
        ids: &dyn IdGenerator,
        clock: &dyn Clock,
    ) -> &GeneratedDocument {
        let now = clock.now();
        self.documents.push(GeneratedDocument {
            id: ids.next_id(),
            session_id: self.id,
            document_type: draft.document_type,
            title: draft.title,
            reference: draft.reference,
            content_hash: draft.content.as_deref().map(content_hash),
            created_at: now,
        });
        self.updated_at = now;

        let index = self.documents.len() - 1;
        &self.documents[index]
    }

    pub fn documents_of_type(&self, document_type: DocumentType) -> Vec<&GeneratedDocument> {
        self.documents
            .iter()
            .filter(|d| d.document_type == document_type)
            .collect()
    }
}

//! Meeting lifecycle and participant roster
//!
//! A [`Meeting`] mirrors one external video call. Its status moves through a
//! small lattice:
//!
//! ```text
//! waiting ──start──▶ active ──end──▶ ended
//!    │                  │
//!    └──────cancel──────┴──▶ cancelled
//! ```
//!
//! Cancellation is allowed from every status except `ended`. Participants can
//! only join while the meeting is active.

use crate::clock::{Clock, IdGenerator};
use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================
// Status
// ============================================

/// Lifecycle status of a meeting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingStatus {
    Waiting,
    Active,
    Ended,
    Cancelled,
}

impl MeetingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeetingStatus::Waiting => "waiting",
            MeetingStatus::Active => "active",
            MeetingStatus::Ended => "ended",
            MeetingStatus::Cancelled => "cancelled",
        }
    }

    /// Transition table. Returns the next status, or `None` if `action` is
    /// not allowed from `self`.
    pub fn apply(self, action: MeetingAction) -> Option<MeetingStatus> {
        use MeetingAction::*;
        use MeetingStatus::*;

        match (self, action) {
            (Waiting, Start) => Some(Active),
            (Active, End) => Some(Ended),
            (Waiting | Active | Cancelled, Cancel) => Some(Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for MeetingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MeetingStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(MeetingStatus::Waiting),
            "active" => Ok(MeetingStatus::Active),
            "ended" => Ok(MeetingStatus::Ended),
            "cancelled" => Ok(MeetingStatus::Cancelled),
            _ => Err(format!("unknown meeting status: {}", s)),
        }
    }
}

/// Lifecycle actions on a meeting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeetingAction {
    Start,
    End,
    Cancel,
}

impl MeetingAction {
    pub const ALL: [MeetingAction; 3] =
        [MeetingAction::Start, MeetingAction::End, MeetingAction::Cancel];

    pub fn as_str(&self) -> &'static str {
        match self {
            MeetingAction::Start => "start",
            MeetingAction::End => "end",
            MeetingAction::Cancel => "cancel",
        }
    }
}

// ============================================
// Participants
// ============================================

/// What a participant is doing in the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Host,
    #[default]
    Guest,
    /// The consultation agent itself
    Agent,
}

impl ParticipantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantRole::Host => "host",
            ParticipantRole::Guest => "guest",
            ParticipantRole::Agent => "agent",
        }
    }
}

impl std::fmt::Display for ParticipantRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ParticipantRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "host" => Ok(ParticipantRole::Host),
            "guest" => Ok(ParticipantRole::Guest),
            "agent" => Ok(ParticipantRole::Agent),
            _ => Err(format!("unknown participant role: {}", s)),
        }
    }
}

/// A roster entry.
///
/// `left_at` is set exactly when `is_active` is false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: Uuid,
    /// Meeting this entry belongs to (back reference by id)
    pub meeting_id: Uuid,
    pub display_name: String,
    pub role: ParticipantRole,
    /// External user account, if the participant is signed in
    pub user_id: Option<Uuid>,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// Someone about to join a meeting. The id is minted here so the caller can
/// refer to the participant later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantDraft {
    pub id: Uuid,
    pub display_name: String,
    pub role: ParticipantRole,
    pub user_id: Option<Uuid>,
}

impl ParticipantDraft {
    pub fn new(ids: &dyn IdGenerator, display_name: impl Into<String>) -> Self {
        Self {
            id: ids.next_id(),
            display_name: display_name.into(),
            role: ParticipantRole::default(),
            user_id: None,
        }
    }

    pub fn with_role(mut self, role: ParticipantRole) -> Self {
        self.role = role;
        self
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }
}

// ============================================
// Meeting
// ============================================

/// One external video call and its roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meeting {
    pub(crate) id: Uuid,
    pub(crate) url: String,
    pub(crate) title: Option<String>,
    pub(crate) status: MeetingStatus,
    pub(crate) host_user_id: Option<Uuid>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    pub(crate) started_at: Option<DateTime<Utc>>,
    pub(crate) ended_at: Option<DateTime<Utc>>,
    /// Join order
    pub(crate) participants: Vec<Participant>,
    /// Stored revision; 0 until first saved
    #[serde(default)]
    pub(crate) version: i64,
}

impl Meeting {
    /// Create a meeting in `waiting` status.
    ///
    /// Fails with [`Error::Validation`] if `url` is empty.
    pub fn new(
        url: impl Into<String>,
        title: Option<String>,
        host_user_id: Option<Uuid>,
        ids: &dyn IdGenerator,
        clock: &dyn Clock,
    ) -> Result<Self> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(Error::Validation("meeting URL is required".to_string()));
        }

        let now = clock.now();
        Ok(Self {
            id: ids.next_id(),
            url,
            title: title.filter(|t| !t.trim().is_empty()),
            status: MeetingStatus::Waiting,
            host_user_id,
            created_at: now,
            updated_at: now,
            started_at: None,
            ended_at: None,
            participants: Vec::new(),
            version: 0,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn status(&self) -> MeetingStatus {
        self.status
    }

    pub fn host_user_id(&self) -> Option<Uuid> {
        self.host_user_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Revision of the stored row this copy matches
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Record the revision a repository just wrote
    pub fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    /// Full roster in join order, including participants who have left
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    // ============================================
    // Transitions
    // ============================================

    /// waiting → active
    pub fn start(&mut self, clock: &dyn Clock) -> Result<()> {
        self.transition(MeetingAction::Start, clock)
    }

    /// active → ended
    pub fn end(&mut self, clock: &dyn Clock) -> Result<()> {
        self.transition(MeetingAction::End, clock)
    }

    /// anything but ended → cancelled
    pub fn cancel(&mut self, clock: &dyn Clock) -> Result<()> {
        self.transition(MeetingAction::Cancel, clock)
    }

    /// Apply a lifecycle action. The meeting is untouched on failure.
    pub fn transition(&mut self, action: MeetingAction, clock: &dyn Clock) -> Result<()> {
        let next = self
            .status
            .apply(action)
            .ok_or_else(|| Error::InvalidTransition {
                entity: "meeting",
                from: self.status.to_string(),
                action: action.as_str(),
            })?;

        let now = clock.now();
        self.status = next;
        self.updated_at = now;
        match action {
            MeetingAction::Start => self.started_at = Some(now),
            MeetingAction::End => self.ended_at = Some(now),
            MeetingAction::Cancel => {}
        }

        Ok(())
    }

    // ============================================
    // Queries
    // ============================================

    pub fn is_active(&self) -> bool {
        self.status == MeetingStatus::Active
    }

    /// How long the call has been (or was) running.
    ///
    /// Zero when it never started, or was cancelled.
    pub fn duration(&self, clock: &dyn Clock) -> Duration {
        let Some(started) = self.started_at else {
            return Duration::zero();
        };

        if let Some(ended) = self.ended_at {
            return ended - started;
        }

        if self.status == MeetingStatus::Active {
            return clock.now() - started;
        }

        Duration::zero()
    }

    // ============================================
    // Roster
    // ============================================

    /// Add someone to the call. Only allowed while the meeting is active.
    ///
    /// A draft whose id is already on the roster is a [`Error::Validation`].
    pub fn add_participant(
        &mut self,
        draft: ParticipantDraft,
        clock: &dyn Clock,
    ) -> Result<&Participant> {
        if !self.is_active() {
            return Err(Error::InvalidState {
                entity: "meeting",
                status: self.status.to_string(),
                operation: "add participant",
            });
        }
        if self.find_participant(draft.id).is_some() {
            return Err(Error::Validation(format!(
                "participant {} is already on the roster",
                draft.id
            )));
        }

        let now = clock.now();
        self.participants.push(Participant {
            id: draft.id,
            meeting_id: self.id,
            display_name: draft.display_name,
            role: draft.role,
            user_id: draft.user_id,
            joined_at: now,
            left_at: None,
            is_active: true,
        });
        self.updated_at = now;

        let index = self.participants.len() - 1;
        Ok(&self.participants[index])
    }

    /// Mark a participant as having left.
    ///
    /// Any roster entry with this id matches, including one that already
    /// left; leaving again re-stamps `left_at`.
    pub fn remove_participant(&mut self, participant_id: Uuid, clock: &dyn Clock) -> Result<()> {
        let entry = self
            .participants
            .iter_mut()
            .find(|p| p.id == participant_id)
            .ok_or_else(|| Error::not_found("participant", participant_id))?;

        let now = clock.now();
        entry.is_active = false;
        entry.left_at = Some(now);
        self.updated_at = now;

        Ok(())
    }

    pub fn find_participant(&self, participant_id: Uuid) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == participant_id)
    }

    /// Participants currently in the call, in join order
    pub fn active_participants(&self) -> Vec<&Participant> {
        self.participants.iter().filter(|p| p.is_active).collect()
    }
}

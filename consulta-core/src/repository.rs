//! Persistence seams
//!
//! Repositories store and return full entity snapshots. They never decide
//! whether a transition was legal; the entity methods already did.
//!
//! Saves are optimistic: a snapshot carries the version it was loaded at,
//! and a save on top of a newer stored version fails with
//! [`Error::Conflict`](crate::Error::Conflict). On success the repository
//! writes the new version back into the entity.

use crate::error::Result;
use crate::meeting::{Meeting, MeetingStatus};
use crate::session::{ConsultationSession, SessionStatus};
use uuid::Uuid;

/// Filter for listing meetings
#[derive(Debug, Clone, Default)]
pub struct MeetingFilter {
    pub status: Option<MeetingStatus>,
    /// Maximum rows, newest first
    pub limit: Option<usize>,
}

/// Filter for listing sessions
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub meeting_id: Option<Uuid>,
    pub status: Option<SessionStatus>,
    /// Maximum rows, newest first
    pub limit: Option<usize>,
}

pub trait MeetingRepository: Send + Sync {
    /// Insert or overwrite the meeting and its roster
    fn save_meeting(&self, meeting: &mut Meeting) -> Result<()>;

    fn load_meeting(&self, id: Uuid) -> Result<Option<Meeting>>;

    fn find_meeting_by_url(&self, url: &str) -> Result<Option<Meeting>>;

    fn list_meetings(&self, filter: &MeetingFilter) -> Result<Vec<Meeting>>;
}

pub trait SessionRepository: Send + Sync {
    /// Insert or overwrite the session with its ledger, requirements and documents
    fn save_session(&self, session: &mut ConsultationSession) -> Result<()>;

    fn load_session(&self, id: Uuid) -> Result<Option<ConsultationSession>>;

    fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<ConsultationSession>>;
}

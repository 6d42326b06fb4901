//! Use-case layer
//!
//! [`ConsultationService`] is the single entry point front ends talk to.
//! Every operation follows the same path:
//!
//! 1. find the live handle (registry, else repository, else `NotFound`)
//! 2. run the entity method under the entity lock
//! 3. save the snapshot while still holding that lock
//!
//! A failed save restores the entity to its previous state. When the stored
//! snapshot was moved on by another writer (another process on the same
//! database), the save is rejected with [`Error::Conflict`]; the handle is
//! dropped, the entity reloaded, and the operation applied again on top of
//! the stored state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

use crate::clock::{Clock, IdGenerator, RandomIds, SystemClock};
use crate::config::SessionPolicy;
use crate::error::{Error, Result};
use crate::generator::{DocumentGenerator, GenerationRequest};
use crate::meeting::{Meeting, MeetingStatus, Participant, ParticipantDraft};
use crate::repository::{MeetingFilter, MeetingRepository, SessionFilter, SessionRepository};
use crate::session::{
    Conversation, ConsultationSession, DocumentType, GeneratedDocument, NewConversation,
    NewRequirement, Requirement, SessionType,
};
use crate::shared::Shared;

type Registry<T> = Mutex<HashMap<Uuid, Shared<T>>>;

/// Tries per operation before a conflict is handed to the caller
const SAVE_ATTEMPTS: usize = 3;

pub struct ConsultationService<R> {
    repo: R,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    policy: SessionPolicy,
    meetings: Registry<Meeting>,
    sessions: Registry<ConsultationSession>,
}

impl<R> ConsultationService<R>
where
    R: MeetingRepository + SessionRepository,
{
    pub fn new(
        repo: R,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        policy: SessionPolicy,
    ) -> Self {
        Self {
            repo,
            clock,
            ids,
            policy,
            meetings: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Wall clock and random v4 ids
    pub fn with_system_clock(repo: R, policy: SessionPolicy) -> Self {
        Self::new(repo, Arc::new(SystemClock), Arc::new(RandomIds), policy)
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Id source for drafts (participants, requirements)
    pub fn ids(&self) -> &dyn IdGenerator {
        self.ids.as_ref()
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    // ============================================
    // Meetings
    // ============================================

    /// Create and persist a meeting in `waiting` status.
    ///
    /// A URL already used by another meeting is a [`Error::Validation`].
    pub fn create_meeting(
        &self,
        url: &str,
        title: Option<String>,
        host_user_id: Option<Uuid>,
    ) -> Result<Meeting> {
        let mut meeting = Meeting::new(url, title, host_user_id, self.ids(), self.clock())?;

        // Held across check and insert so two creates in this process cannot both pass
        let mut registry = lock(&self.meetings);
        if self.repo.find_meeting_by_url(meeting.url())?.is_some() {
            return Err(Error::Validation(format!(
                "meeting URL already in use: {}",
                meeting.url()
            )));
        }
        self.repo.save_meeting(&mut meeting)?;
        registry.insert(meeting.id(), Shared::new(meeting.clone()));
        drop(registry);

        tracing::info!(meeting_id = %meeting.id(), url = %meeting.url(), "Meeting created");
        Ok(meeting)
    }

    pub fn start_meeting(&self, id: Uuid) -> Result<Meeting> {
        let meeting = self.update_meeting(id, |m, clock| m.start(clock).map(|_| m.clone()))?;
        tracing::info!(meeting_id = %id, "Meeting started");
        Ok(meeting)
    }

    pub fn end_meeting(&self, id: Uuid) -> Result<Meeting> {
        let meeting = self.update_meeting(id, |m, clock| m.end(clock).map(|_| m.clone()))?;
        tracing::info!(
            meeting_id = %id,
            duration_secs = meeting.duration(self.clock()).num_seconds(),
            "Meeting ended"
        );
        Ok(meeting)
    }

    pub fn cancel_meeting(&self, id: Uuid) -> Result<Meeting> {
        let meeting = self.update_meeting(id, |m, clock| m.cancel(clock).map(|_| m.clone()))?;
        tracing::info!(meeting_id = %id, "Meeting cancelled");
        Ok(meeting)
    }

    /// Add a participant to an active meeting
    pub fn join_meeting(&self, meeting_id: Uuid, draft: ParticipantDraft) -> Result<Participant> {
        let participant =
            self.update_meeting(meeting_id, |m, clock| {
                m.add_participant(draft.clone(), clock).cloned()
            })?;
        tracing::info!(
            meeting_id = %meeting_id,
            participant_id = %participant.id,
            role = %participant.role,
            "Participant joined"
        );
        Ok(participant)
    }

    pub fn leave_meeting(&self, meeting_id: Uuid, participant_id: Uuid) -> Result<()> {
        self.update_meeting(meeting_id, |m, clock| {
            m.remove_participant(participant_id, clock)
        })?;
        tracing::info!(meeting_id = %meeting_id, participant_id = %participant_id, "Participant left");
        Ok(())
    }

    /// Current state of one meeting
    pub fn meeting(&self, id: Uuid) -> Result<Meeting> {
        Ok(self.meeting_handle(id)?.snapshot())
    }

    pub fn list_meetings(&self, filter: &MeetingFilter) -> Result<Vec<Meeting>> {
        self.repo.list_meetings(filter)
    }

    // ============================================
    // Sessions
    // ============================================

    /// Create and persist a session for an existing meeting.
    ///
    /// `session_type` falls back to the configured default.
    pub fn open_session(
        &self,
        meeting_id: Uuid,
        agent_id: Uuid,
        session_type: Option<SessionType>,
    ) -> Result<ConsultationSession> {
        // Existence check only; the session keeps the id, not the meeting
        self.meeting_handle(meeting_id)?;

        let session_type = session_type.unwrap_or(self.policy.default_type);
        let mut session = ConsultationSession::new(
            meeting_id,
            agent_id,
            session_type,
            self.ids(),
            self.clock(),
        )?;
        self.repo.save_session(&mut session)?;
        lock(&self.sessions).insert(session.id(), Shared::new(session.clone()));

        tracing::info!(
            session_id = %session.id(),
            meeting_id = %meeting_id,
            session_type = %session_type,
            "Session opened"
        );
        Ok(session)
    }

    /// Move a session to `active`.
    ///
    /// With `require_live_meeting` set, the meeting must be active too.
    pub fn start_session(&self, id: Uuid) -> Result<ConsultationSession> {
        if self.policy.require_live_meeting {
            let meeting_id = self.session_handle(id)?.read(|s| s.meeting_id());
            let meeting_status = self.meeting_handle(meeting_id)?.read(|m| m.status());
            if meeting_status != MeetingStatus::Active {
                return Err(Error::InvalidState {
                    entity: "meeting",
                    status: meeting_status.to_string(),
                    operation: "start session",
                });
            }
        }

        let session = self.update_session(id, |s, clock| s.start(clock).map(|_| s.clone()))?;
        tracing::info!(session_id = %id, "Session started");
        Ok(session)
    }

    pub fn pause_session(&self, id: Uuid) -> Result<ConsultationSession> {
        let session = self.update_session(id, |s, clock| s.pause(clock).map(|_| s.clone()))?;
        tracing::info!(session_id = %id, "Session paused");
        Ok(session)
    }

    pub fn resume_session(&self, id: Uuid) -> Result<ConsultationSession> {
        let session = self.update_session(id, |s, clock| s.resume(clock).map(|_| s.clone()))?;
        tracing::info!(session_id = %id, "Session resumed");
        Ok(session)
    }

    pub fn complete_session(&self, id: Uuid) -> Result<ConsultationSession> {
        let session = self.update_session(id, |s, clock| s.complete(clock).map(|_| s.clone()))?;
        tracing::info!(
            session_id = %id,
            turns = session.conversations().len(),
            requirements = session.requirements().len(),
            "Session completed"
        );
        Ok(session)
    }

    /// Mark a session failed. Never rejected by status.
    pub fn fail_session(&self, id: Uuid) -> Result<ConsultationSession> {
        let session = self.update_session(id, |s, clock| {
            s.fail(clock);
            Ok(s.clone())
        })?;
        tracing::warn!(session_id = %id, "Session failed");
        Ok(session)
    }

    /// Append a turn to an active session's ledger
    pub fn record_turn(&self, session_id: Uuid, turn: NewConversation) -> Result<Conversation> {
        let turn = self.update_session(session_id, |s, clock| {
            s.add_conversation(turn.clone(), clock).cloned()
        })?;
        tracing::debug!(
            session_id = %session_id,
            sequence_number = turn.sequence_number,
            speaker = %turn.speaker,
            "Turn recorded"
        );
        Ok(turn)
    }

    pub fn record_requirement(
        &self,
        session_id: Uuid,
        requirement: NewRequirement,
    ) -> Result<Requirement> {
        let requirement = self.update_session(session_id, |s, clock| {
            s.add_requirement(requirement.clone(), clock).cloned()
        })?;
        tracing::info!(
            session_id = %session_id,
            requirement_id = %requirement.id,
            priority = %requirement.priority,
            category = %requirement.category,
            "Requirement recorded"
        );
        Ok(requirement)
    }

    /// The last `limit` turns, oldest first
    pub fn latest_turns(&self, session_id: Uuid, limit: usize) -> Result<Vec<Conversation>> {
        Ok(self
            .session_handle(session_id)?
            .read(|s| s.latest_conversations(limit).to_vec()))
    }

    /// Current state of one session
    pub fn session(&self, id: Uuid) -> Result<ConsultationSession> {
        Ok(self.session_handle(id)?.snapshot())
    }

    pub fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<ConsultationSession>> {
        self.repo.list_sessions(filter)
    }

    /// Generate a document and attach it to the session.
    ///
    /// The generator runs with no lock held; turns and requirements recorded
    /// meanwhile are kept but not part of this document.
    pub fn generate_document(
        &self,
        session_id: Uuid,
        document_type: DocumentType,
        generator: &dyn DocumentGenerator,
    ) -> Result<GeneratedDocument> {
        let request = self.session_handle(session_id)?.read(|s| GenerationRequest {
            session_id,
            session_type: s.session_type(),
            document_type,
            requirements: s.requirements().to_vec(),
            transcript: s
                .latest_conversations(self.policy.transcript_window)
                .to_vec(),
        });

        tracing::info!(
            session_id = %session_id,
            document_type = %document_type,
            requirements = request.requirements.len(),
            turns = request.transcript.len(),
            "Requesting document"
        );
        let draft = generator.generate(&request)?;

        let document = self.update_session(session_id, |s, clock| {
            Ok(s.attach_document(draft.clone(), self.ids(), clock).clone())
        })?;
        tracing::info!(
            session_id = %session_id,
            document_id = %document.id,
            reference = %document.reference,
            "Document attached"
        );
        Ok(document)
    }

    // ============================================
    // Handles
    // ============================================

    fn meeting_handle(&self, id: Uuid) -> Result<Shared<Meeting>> {
        if let Some(handle) = lock(&self.meetings).get(&id) {
            return Ok(handle.clone());
        }

        let meeting = self
            .repo
            .load_meeting(id)?
            .ok_or_else(|| Error::not_found("meeting", id))?;

        // Another caller may have loaded it meanwhile; theirs wins
        Ok(lock(&self.meetings)
            .entry(id)
            .or_insert_with(|| Shared::new(meeting))
            .clone())
    }

    fn session_handle(&self, id: Uuid) -> Result<Shared<ConsultationSession>> {
        if let Some(handle) = lock(&self.sessions).get(&id) {
            return Ok(handle.clone());
        }

        let session = self
            .repo
            .load_session(id)?
            .ok_or_else(|| Error::not_found("session", id))?;

        Ok(lock(&self.sessions)
            .entry(id)
            .or_insert_with(|| Shared::new(session))
            .clone())
    }

    fn update_meeting<T>(
        &self,
        id: Uuid,
        mut f: impl FnMut(&mut Meeting, &dyn Clock) -> Result<T>,
    ) -> Result<T> {
        let mut attempt = 1;
        loop {
            let handle = self.meeting_handle(id)?;
            let result = handle.update(|meeting| {
                let before = meeting.clone();
                let out = f(meeting, self.clock())?;
                if let Err(e) = self.repo.save_meeting(meeting) {
                    *meeting = before;
                    return Err(e);
                }
                Ok(out)
            });

            match result {
                Err(e) if e.is_conflict() => {
                    evict(&self.meetings, id, &handle);
                    if attempt == SAVE_ATTEMPTS {
                        return Err(e);
                    }
                    tracing::debug!(meeting_id = %id, attempt, "Stale meeting, reloading");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    fn update_session<T>(
        &self,
        id: Uuid,
        mut f: impl FnMut(&mut ConsultationSession, &dyn Clock) -> Result<T>,
    ) -> Result<T> {
        let mut attempt = 1;
        loop {
            let handle = self.session_handle(id)?;
            let result = handle.update(|session| {
                let before = session.clone();
                let out = f(session, self.clock())?;
                if let Err(e) = self.repo.save_session(session) {
                    *session = before;
                    return Err(e);
                }
                Ok(out)
            });

            match result {
                Err(e) if e.is_conflict() => {
                    evict(&self.sessions, id, &handle);
                    if attempt == SAVE_ATTEMPTS {
                        return Err(e);
                    }
                    tracing::debug!(session_id = %id, attempt, "Stale session, reloading");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

/// Forget `handle` so the next lookup reloads from the repository. A newer
/// handle registered meanwhile is left alone.
fn evict<T>(registry: &Registry<T>, id: Uuid, handle: &Shared<T>) {
    let mut registry = lock(registry);
    if registry.get(&id).is_some_and(|h| h.ptr_eq(handle)) {
        registry.remove(&id);
    }
}

fn lock<T>(registry: &Mutex<T>) -> MutexGuard<'_, T> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

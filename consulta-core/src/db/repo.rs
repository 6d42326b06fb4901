//! Database repository layer
//!
//! Stores meeting and session snapshots. A save writes the parent row and
//! every child row in one transaction, so a reader never sees a session
//! whose ledger is half written.
//!
//! Parent rows carry a `version`. A save only applies on top of the
//! revision the snapshot was loaded at; otherwise it fails with
//! [`Error::Conflict`] and nothing is written.

use crate::error::{Error, Result};
use crate::meeting::{Meeting, Participant};
use crate::repository::{MeetingFilter, MeetingRepository, SessionFilter, SessionRepository};
use crate::session::{
    Conversation, ConsultationSession, GeneratedDocument, Requirement, SessionStatus,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Database handle (single connection for now)
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &PathBuf) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable foreign keys and WAL mode for better concurrency
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn();
        super::schema::run_migrations(&conn)
    }

    /// Get the underlying connection (for advanced use)
    pub fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn()
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ============================================
    // Meeting rows
    // ============================================

    fn fetch_meeting(conn: &Connection, id: &str) -> Result<Option<Meeting>> {
        let meeting = conn
            .query_row("SELECT * FROM meetings WHERE id = ?", [id], Self::row_to_meeting)
            .optional()?;

        let Some(mut meeting) = meeting else {
            return Ok(None);
        };

        let mut stmt =
            conn.prepare("SELECT * FROM participants WHERE meeting_id = ? ORDER BY position")?;
        meeting.participants = stmt
            .query_map([id], Self::row_to_participant)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Some(meeting))
    }

    fn row_to_meeting(row: &Row) -> rusqlite::Result<Meeting> {
        Ok(Meeting {
            id: get_uuid(row, "id")?,
            url: row.get("url")?,
            title: row.get("title")?,
            status: get_parsed(row, "status")?,
            host_user_id: get_opt_uuid(row, "host_user_id")?,
            created_at: get_ts(row, "created_at")?,
            updated_at: get_ts(row, "updated_at")?,
            started_at: get_opt_ts(row, "started_at")?,
            ended_at: get_opt_ts(row, "ended_at")?,
            participants: Vec::new(),
            version: row.get("version")?,
        })
    }

    fn row_to_participant(row: &Row) -> rusqlite::Result<Participant> {
        Ok(Participant {
            id: get_uuid(row, "id")?,
            meeting_id: get_uuid(row, "meeting_id")?,
            display_name: row.get("display_name")?,
            role: get_parsed(row, "role")?,
            user_id: get_opt_uuid(row, "user_id")?,
            joined_at: get_ts(row, "joined_at")?,
            left_at: get_opt_ts(row, "left_at")?,
            is_active: row.get("is_active")?,
        })
    }

    // ============================================
    // Session rows
    // ============================================

    fn fetch_session(conn: &Connection, id: &str) -> Result<Option<ConsultationSession>> {
        let session = conn
            .query_row(
                "SELECT * FROM consultation_sessions WHERE id = ?",
                [id],
                Self::row_to_session,
            )
            .optional()?;

        let Some(mut session) = session else {
            return Ok(None);
        };

        let mut stmt = conn
            .prepare("SELECT * FROM conversations WHERE session_id = ? ORDER BY sequence_number")?;
        session.conversations = stmt
            .query_map([id], Self::row_to_conversation)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut stmt =
            conn.prepare("SELECT * FROM requirements WHERE session_id = ? ORDER BY position")?;
        session.requirements = stmt
            .query_map([id], Self::row_to_requirement)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut stmt =
            conn.prepare("SELECT * FROM documents WHERE session_id = ? ORDER BY position")?;
        session.documents = stmt
            .query_map([id], Self::row_to_document)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Some(session))
    }

    fn row_to_session(row: &Row) -> rusqlite::Result<ConsultationSession> {
        Ok(ConsultationSession {
            id: get_uuid(row, "id")?,
            meeting_id: get_uuid(row, "meeting_id")?,
            agent_id: get_uuid(row, "agent_id")?,
            status: get_parsed(row, "status")?,
            session_type: get_parsed(row, "session_type")?,
            created_at: get_ts(row, "created_at")?,
            updated_at: get_ts(row, "updated_at")?,
            completed_at: get_opt_ts(row, "completed_at")?,
            conversations: Vec::new(),
            requirements: Vec::new(),
            documents: Vec::new(),
            version: row.get("version")?,
        })
    }

    fn row_to_conversation(row: &Row) -> rusqlite::Result<Conversation> {
        Ok(Conversation {
            session_id: get_uuid(row, "session_id")?,
            sequence_number: row.get("sequence_number")?,
            timestamp: get_ts(row, "timestamp")?,
            speaker: get_parsed(row, "speaker")?,
            text: row.get("text")?,
            media_ref: row.get("media_ref")?,
        })
    }

    fn row_to_requirement(row: &Row) -> rusqlite::Result<Requirement> {
        Ok(Requirement {
            id: get_uuid(row, "id")?,
            session_id: get_uuid(row, "session_id")?,
            category: row.get("category")?,
            priority: get_parsed(row, "priority")?,
            title: row.get("title")?,
            description: row.get("description")?,
            created_at: get_ts(row, "created_at")?,
            updated_at: get_ts(row, "updated_at")?,
        })
    }

    fn row_to_document(row: &Row) -> rusqlite::Result<GeneratedDocument> {
        Ok(GeneratedDocument {
            id: get_uuid(row, "id")?,
            session_id: get_uuid(row, "session_id")?,
            document_type: get_parsed(row, "document_type")?,
            title: row.get("title")?,
            reference: row.get("reference")?,
            content_hash: row.get("content_hash")?,
            created_at: get_ts(row, "created_at")?,
        })
    }

    // ============================================
    // Stats
    // ============================================

    /// Number of turns stored for a session
    pub fn count_conversations(&self, session_id: Uuid) -> Result<i64> {
        let conn = self.conn();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM conversations WHERE session_id = ?",
            [session_id.to_string()],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    /// Stored status of a session, without loading its children
    pub fn session_status(&self, session_id: Uuid) -> Result<Option<SessionStatus>> {
        let conn = self.conn();
        let status = conn
            .query_row(
                "SELECT status FROM consultation_sessions WHERE id = ?",
                [session_id.to_string()],
                |r| get_parsed(r, "status"),
            )
            .optional()?;
        Ok(status)
    }

    /// Turns with a sequence number above `after`, oldest first.
    ///
    /// Lets a poller pick up only what was appended since its last look.
    pub fn conversations_since(&self, session_id: Uuid, after: u32) -> Result<Vec<Conversation>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT * FROM conversations WHERE session_id = ? AND sequence_number > ? ORDER BY sequence_number",
        )?;
        let turns = stmt
            .query_map(params![session_id.to_string(), after], Self::row_to_conversation)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(turns)
    }
}

impl MeetingRepository for Database {
    fn save_meeting(&self, meeting: &mut Meeting) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let next_version = meeting.version + 1;

        // Only applies on top of the revision this copy was loaded at
        let written = tx.execute(
            r#"
            INSERT INTO meetings (id, url, title, status, host_user_id,
                                  created_at, updated_at, started_at, ended_at, version)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                status = excluded.status,
                host_user_id = excluded.host_user_id,
                updated_at = excluded.updated_at,
                started_at = excluded.started_at,
                ended_at = excluded.ended_at,
                version = excluded.version
            WHERE meetings.version = ?11
            "#,
            params![
                meeting.id.to_string(),
                meeting.url,
                meeting.title,
                meeting.status.as_str(),
                meeting.host_user_id.map(|id| id.to_string()),
                ts(meeting.created_at),
                ts(meeting.updated_at),
                meeting.started_at.map(ts),
                meeting.ended_at.map(ts),
                next_version,
                meeting.version,
            ],
        )?;
        if written == 0 {
            return Err(Error::Conflict {
                entity: "meeting",
                id: meeting.id.to_string(),
            });
        }

        for (position, p) in meeting.participants.iter().enumerate() {
            tx.execute(
                r#"
                INSERT INTO participants (id, meeting_id, position, display_name, role,
                                          user_id, joined_at, left_at, is_active)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(id) DO UPDATE SET
                    left_at = excluded.left_at,
                    is_active = excluded.is_active
                "#,
                params![
                    p.id.to_string(),
                    p.meeting_id.to_string(),
                    position as i64,
                    p.display_name,
                    p.role.as_str(),
                    p.user_id.map(|id| id.to_string()),
                    ts(p.joined_at),
                    p.left_at.map(ts),
                    p.is_active,
                ],
            )?;
        }

        tx.commit()?;
        meeting.version = next_version;
        Ok(())
    }

    fn load_meeting(&self, id: Uuid) -> Result<Option<Meeting>> {
        let conn = self.conn();
        Self::fetch_meeting(&conn, &id.to_string())
    }

    fn find_meeting_by_url(&self, url: &str) -> Result<Option<Meeting>> {
        let conn = self.conn();
        let id: Option<String> = conn
            .query_row("SELECT id FROM meetings WHERE url = ?", [url], |r| r.get(0))
            .optional()?;

        match id {
            Some(id) => Self::fetch_meeting(&conn, &id),
            None => Ok(None),
        }
    }

    fn list_meetings(&self, filter: &MeetingFilter) -> Result<Vec<Meeting>> {
        let conn = self.conn();

        let mut sql = String::from("SELECT id FROM meetings WHERE 1=1");
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![];

        if let Some(status) = &filter.status {
            sql.push_str(" AND status = ?");
            params.push(Box::new(status.as_str().to_string()));
        }

        sql.push_str(" ORDER BY created_at DESC");

        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let ids: Vec<String> = {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_refs.as_slice(), |r| r.get(0))?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };

        let mut meetings = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(meeting) = Self::fetch_meeting(&conn, &id)? {
                meetings.push(meeting);
            }
        }
        Ok(meetings)
    }
}

impl SessionRepository for Database {
    fn save_session(&self, session: &mut ConsultationSession) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let session_id = session.id.to_string();
        let next_version = session.version + 1;

        let written = tx.execute(
            r#"
            INSERT INTO consultation_sessions (id, meeting_id, agent_id, status, session_type,
                                               created_at, updated_at, completed_at, version)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                updated_at = excluded.updated_at,
                completed_at = excluded.completed_at,
                version = excluded.version
            WHERE consultation_sessions.version = ?10
            "#,
            params![
                session_id,
                session.meeting_id.to_string(),
                session.agent_id.to_string(),
                session.status.as_str(),
                session.session_type.as_str(),
                ts(session.created_at),
                ts(session.updated_at),
                session.completed_at.map(ts),
                next_version,
                session.version,
            ],
        )?;
        if written == 0 {
            return Err(Error::Conflict {
                entity: "session",
                id: session_id,
            });
        }

        // Append-only children: the stored rows are a prefix of ours, so only
        // the tail is inserted. A collision is an error, never skipped.
        let stored_turns: i64 = tx.query_row(
            "SELECT COUNT(*) FROM conversations WHERE session_id = ?",
            [&session_id],
            |r| r.get(0),
        )?;
        for turn in session.conversations.iter().skip(stored_turns as usize) {
            tx.execute(
                r#"
                INSERT INTO conversations
                    (session_id, sequence_number, timestamp, speaker, text, media_ref)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    session_id,
                    turn.sequence_number,
                    ts(turn.timestamp),
                    turn.speaker.as_str(),
                    turn.text,
                    turn.media_ref,
                ],
            )?;
        }

        for (position, req) in session.requirements.iter().enumerate() {
            tx.execute(
                r#"
                INSERT INTO requirements (id, session_id, position, category, priority,
                                          title, description, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(id) DO UPDATE SET
                    category = excluded.category,
                    priority = excluded.priority,
                    title = excluded.title,
                    description = excluded.description,
                    updated_at = excluded.updated_at
                "#,
                params![
                    req.id.to_string(),
                    session_id,
                    position as i64,
                    req.category,
                    req.priority.as_str(),
                    req.title,
                    req.description,
                    ts(req.created_at),
                    ts(req.updated_at),
                ],
            )?;
        }

        let stored_documents: i64 = tx.query_row(
            "SELECT COUNT(*) FROM documents WHERE session_id = ?",
            [&session_id],
            |r| r.get(0),
        )?;
        for (position, doc) in session
            .documents
            .iter()
            .enumerate()
            .skip(stored_documents as usize)
        {
            tx.execute(
                r#"
                INSERT INTO documents (id, session_id, position, document_type,
                                       title, reference, content_hash, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    doc.id.to_string(),
                    session_id,
                    position as i64,
                    doc.document_type.as_str(),
                    doc.title,
                    doc.reference,
                    doc.content_hash,
                    ts(doc.created_at),
                ],
            )?;
        }

        tx.commit()?;
        session.version = next_version;
        Ok(())
    }

    fn load_session(&self, id: Uuid) -> Result<Option<ConsultationSession>> {
        let conn = self.conn();
        Self::fetch_session(&conn, &id.to_string())
    }

    fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<ConsultationSession>> {
        let conn = self.conn();

        let mut sql = String::from("SELECT id FROM consultation_sessions WHERE 1=1");
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![];

        if let Some(meeting_id) = &filter.meeting_id {
            sql.push_str(" AND meeting_id = ?");
            params.push(Box::new(meeting_id.to_string()));
        }

        if let Some(status) = &filter.status {
            sql.push_str(" AND status = ?");
            params.push(Box::new(status.as_str().to_string()));
        }

        sql.push_str(" ORDER BY created_at DESC");

        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let ids: Vec<String> = {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_refs.as_slice(), |r| r.get(0))?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };

        let mut sessions = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(session) = Self::fetch_session(&conn, &id)? {
                sessions.push(session);
            }
        }
        Ok(sessions)
    }
}

// ============================================
// Column helpers
// ============================================

/// Fixed-width RFC 3339 so text ordering matches time ordering
fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn conversion_error(
    column: &str,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    let err: Box<dyn std::error::Error + Send + Sync> = err.into();
    tracing::warn!(column, error = %err, "Unreadable column value");
    rusqlite::Error::FromSqlConversionFailure(0, Type::Text, err)
}

fn parse_ts(column: &str, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(column, e))
}

fn get_ts(row: &Row, column: &str) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(column)?;
    parse_ts(column, &raw)
}

fn get_opt_ts(row: &Row, column: &str) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(column)?;
    raw.map(|s| parse_ts(column, &s)).transpose()
}

fn get_uuid(row: &Row, column: &str) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(column)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(column, e))
}

fn get_opt_uuid(row: &Row, column: &str) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(column)?;
    raw.map(|s| Uuid::parse_str(&s).map_err(|e| conversion_error(column, e)))
        .transpose()
}

fn get_parsed<T>(row: &Row, column: &str) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.get(column)?;
    raw.parse().map_err(|e: String| conversion_error(column, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SequentialIds};
    use crate::meeting::{MeetingStatus, ParticipantDraft};
    use crate::session::{
        DocumentDraft, DocumentType, NewConversation, NewRequirement, RequirementPriority,
        SessionType, Speaker,
    };
    use chrono::{Duration, TimeZone};

    fn fixture() -> (Database, ManualClock, SequentialIds) {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap());
        (db, clock, SequentialIds::new())
    }

    fn create_test_meeting(clock: &ManualClock, ids: &SequentialIds, url: &str) -> Meeting {
        Meeting::new(url, Some("Review".to_string()), None, ids, clock).unwrap()
    }

    #[test]
    fn test_meeting_roundtrip_with_roster() {
        let (db, clock, ids) = fixture();
        let mut meeting = create_test_meeting(&clock, &ids, "https://meet/a");
        meeting.start(&clock).unwrap();

        let alex = ParticipantDraft::new(&ids, "Alex");
        let alex_id = alex.id;
        meeting.add_participant(alex, &clock).unwrap();
        clock.advance(Duration::milliseconds(1234));
        meeting
            .add_participant(ParticipantDraft::new(&ids, "Sam"), &clock)
            .unwrap();
        meeting.remove_participant(alex_id, &clock).unwrap();

        db.save_meeting(&mut meeting).unwrap();
        assert_eq!(meeting.version(), 1);
        let loaded = db.load_meeting(meeting.id()).unwrap().unwrap();
        assert_eq!(loaded, meeting);

        // Overwrite with a later snapshot
        meeting.end(&clock).unwrap();
        db.save_meeting(&mut meeting).unwrap();
        let loaded = db.load_meeting(meeting.id()).unwrap().unwrap();
        assert_eq!(loaded.status(), MeetingStatus::Ended);
        assert_eq!(loaded, meeting);
    }

    #[test]
    fn test_missing_meeting_is_none() {
        let (db, _, _) = fixture();
        assert!(db.load_meeting(Uuid::from_u128(7)).unwrap().is_none());
        assert!(db.find_meeting_by_url("https://nowhere").unwrap().is_none());
    }

    #[test]
    fn test_find_by_url_and_unique_url() {
        let (db, clock, ids) = fixture();
        let mut meeting = create_test_meeting(&clock, &ids, "https://meet/unique");
        db.save_meeting(&mut meeting).unwrap();

        let found = db.find_meeting_by_url("https://meet/unique").unwrap();
        assert_eq!(found.map(|m| m.id()), Some(meeting.id()));

        let mut twin = create_test_meeting(&clock, &ids, "https://meet/unique");
        assert!(matches!(db.save_meeting(&mut twin), Err(Error::Database(_))));
        assert_eq!(twin.version(), 0);
    }

    #[test]
    fn test_list_meetings_filter_and_order() {
        let (db, clock, ids) = fixture();
        for i in 0..3 {
            let mut meeting = create_test_meeting(&clock, &ids, &format!("https://meet/{}", i));
            if i > 0 {
                meeting.start(&clock).unwrap();
            }
            db.save_meeting(&mut meeting).unwrap();
            clock.advance(Duration::minutes(1));
        }

        let all = db.list_meetings(&MeetingFilter::default()).unwrap();
        let urls: Vec<&str> = all.iter().map(|m| m.url()).collect();
        assert_eq!(urls, vec!["https://meet/2", "https://meet/1", "https://meet/0"]);

        let active = db
            .list_meetings(&MeetingFilter {
                status: Some(MeetingStatus::Active),
                limit: Some(1),
            })
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].url(), "https://meet/2");
    }

    #[test]
    fn test_session_roundtrip_with_children() {
        let (db, clock, ids) = fixture();
        let mut session = ConsultationSession::new(
            Uuid::from_u128(500),
            Uuid::from_u128(600),
            SessionType::ArchitectureReview,
            &ids,
            &clock,
        )
        .unwrap();
        session.start(&clock).unwrap();
        session
            .add_conversation(NewConversation::new(Speaker::User, "We need SSO"), &clock)
            .unwrap();
        clock.advance(Duration::microseconds(17));
        session
            .add_conversation(
                NewConversation::new(Speaker::Agent, "Which IdP?").with_media("chunk-2"),
                &clock,
            )
            .unwrap();
        session
            .add_requirement(
                NewRequirement::new(&ids, "SSO", "security", RequirementPriority::High)
                    .with_description("SAML or OIDC"),
                &clock,
            )
            .unwrap();
        session.attach_document(
            DocumentDraft {
                document_type: DocumentType::Architecture,
                title: "Auth design".to_string(),
                reference: "file:///tmp/auth.md".to_string(),
                content: Some("body".to_string()),
            },
            &ids,
            &clock,
        );

        db.save_session(&mut session).unwrap();
        let loaded = db.load_session(session.id()).unwrap().unwrap();
        assert_eq!(loaded, session);
        assert_eq!(db.count_conversations(session.id()).unwrap(), 2);

        session
            .add_conversation(NewConversation::new(Speaker::User, "Okta"), &clock)
            .unwrap();
        session.complete(&clock).unwrap();
        db.save_session(&mut session).unwrap();

        let loaded = db.load_session(session.id()).unwrap().unwrap();
        assert_eq!(loaded.status(), SessionStatus::Completed);
        assert_eq!(loaded, session);

        assert_eq!(
            db.session_status(session.id()).unwrap(),
            Some(SessionStatus::Completed)
        );
        assert_eq!(db.session_status(Uuid::from_u128(77)).unwrap(), None);

        let newer = db.conversations_since(session.id(), 1).unwrap();
        let numbers: Vec<u32> = newer.iter().map(|c| c.sequence_number).collect();
        assert_eq!(numbers, vec![2, 3]);
    }

    #[test]
    fn test_list_sessions_by_meeting() {
        let (db, clock, ids) = fixture();
        let meeting_a = Uuid::from_u128(1);
        let meeting_b = Uuid::from_u128(2);
        for meeting_id in [meeting_a, meeting_b, meeting_a] {
            let mut session = ConsultationSession::new(
                meeting_id,
                Uuid::from_u128(9),
                SessionType::default(),
                &ids,
                &clock,
            )
            .unwrap();
            db.save_session(&mut session).unwrap();
            clock.advance(Duration::seconds(1));
        }

        let for_a = db
            .list_sessions(&SessionFilter {
                meeting_id: Some(meeting_a),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(for_a.len(), 2);
        assert!(for_a.iter().all(|s| s.meeting_id() == meeting_a));

        let initializing = db
            .list_sessions(&SessionFilter {
                status: Some(SessionStatus::Initializing),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(initializing.len(), 3);
    }

    #[test]
    fn test_file_database_persists_across_handles() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("nested/consulta.db");
        let (_, clock, ids) = fixture();
        let mut meeting = create_test_meeting(&clock, &ids, "https://meet/file");

        {
            let db = Database::open(&path).unwrap();
            db.migrate().unwrap();
            db.save_meeting(&mut meeting).unwrap();
        }

        let db = Database::open(&path).unwrap();
        db.migrate().unwrap();
        assert_eq!(db.load_meeting(meeting.id()).unwrap(), Some(meeting));
    }

    #[test]
    fn test_stale_meeting_snapshot_is_rejected() {
        let (db, clock, ids) = fixture();
        let mut meeting = create_test_meeting(&clock, &ids, "https://meet/stale");
        db.save_meeting(&mut meeting).unwrap();

        let mut stale = meeting.clone();
        meeting.start(&clock).unwrap();
        db.save_meeting(&mut meeting).unwrap();
        assert_eq!(meeting.version(), 2);

        stale.cancel(&clock).unwrap();
        let err = db.save_meeting(&mut stale).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(stale.version(), 1);

        let stored = db.load_meeting(meeting.id()).unwrap().unwrap();
        assert_eq!(stored.status(), MeetingStatus::Active);
        assert_eq!(stored, meeting);
    }

    #[test]
    fn test_stale_session_snapshot_keeps_stored_turns() {
        let (db, clock, ids) = fixture();
        let mut session = ConsultationSession::new(
            Uuid::from_u128(500),
            Uuid::from_u128(600),
            SessionType::default(),
            &ids,
            &clock,
        )
        .unwrap();
        session.start(&clock).unwrap();
        db.save_session(&mut session).unwrap();

        let mut stale = session.clone();
        session
            .add_conversation(NewConversation::new(Speaker::User, "first writer"), &clock)
            .unwrap();
        session.complete(&clock).unwrap();
        db.save_session(&mut session).unwrap();

        stale
            .add_conversation(NewConversation::new(Speaker::User, "second writer"), &clock)
            .unwrap();
        assert!(db.save_session(&mut stale).unwrap_err().is_conflict());

        let stored = db.load_session(session.id()).unwrap().unwrap();
        let texts: Vec<&str> = stored.conversations().iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["first writer"]);
        assert_eq!(stored.status(), SessionStatus::Completed);
        assert!(stored.completed_at().is_some());
    }
}

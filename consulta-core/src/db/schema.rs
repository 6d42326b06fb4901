//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: meetings, sessions and their owned collections
    r#"
    -- ============================================
    -- Meetings
    -- ============================================

    CREATE TABLE IF NOT EXISTS meetings (
        id               TEXT PRIMARY KEY,
        url              TEXT NOT NULL UNIQUE,
        title            TEXT,
        status           TEXT NOT NULL,
        host_user_id     TEXT,
        created_at       DATETIME NOT NULL,
        updated_at       DATETIME NOT NULL,
        started_at       DATETIME,
        ended_at         DATETIME,
        -- bumped on every save; writers compare before overwriting
        version          INTEGER NOT NULL DEFAULT 0
    );

    -- Roster, ordered by position (join order)
    CREATE TABLE IF NOT EXISTS participants (
        id               TEXT PRIMARY KEY,
        meeting_id       TEXT NOT NULL REFERENCES meetings(id) ON DELETE CASCADE,
        position         INTEGER NOT NULL,
        display_name     TEXT NOT NULL,
        role             TEXT NOT NULL,
        user_id          TEXT,
        joined_at        DATETIME NOT NULL,
        left_at          DATETIME,
        is_active        INTEGER NOT NULL
    );

    -- ============================================
    -- Consultation sessions
    -- ============================================

    -- meeting_id is a reference, not ownership: no foreign key
    CREATE TABLE IF NOT EXISTS consultation_sessions (
        id               TEXT PRIMARY KEY,
        meeting_id       TEXT NOT NULL,
        agent_id         TEXT NOT NULL,
        status           TEXT NOT NULL,
        session_type     TEXT NOT NULL,
        created_at       DATETIME NOT NULL,
        updated_at       DATETIME NOT NULL,
        completed_at     DATETIME,
        version          INTEGER NOT NULL DEFAULT 0
    );

    -- Ledger; append-only
    CREATE TABLE IF NOT EXISTS conversations (
        session_id       TEXT NOT NULL REFERENCES consultation_sessions(id) ON DELETE CASCADE,
        sequence_number  INTEGER NOT NULL,
        timestamp        DATETIME NOT NULL,
        speaker          TEXT NOT NULL,
        text             TEXT NOT NULL,
        media_ref        TEXT,

        PRIMARY KEY (session_id, sequence_number)
    );

    CREATE TABLE IF NOT EXISTS requirements (
        id               TEXT PRIMARY KEY,
        session_id       TEXT NOT NULL REFERENCES consultation_sessions(id) ON DELETE CASCADE,
        position         INTEGER NOT NULL,
        category         TEXT NOT NULL,
        priority         TEXT NOT NULL,
        title            TEXT NOT NULL,
        description      TEXT,
        created_at       DATETIME NOT NULL,
        updated_at       DATETIME NOT NULL
    );

    CREATE TABLE IF NOT EXISTS documents (
        id               TEXT PRIMARY KEY,
        session_id       TEXT NOT NULL REFERENCES consultation_sessions(id) ON DELETE CASCADE,
        position         INTEGER NOT NULL,
        document_type    TEXT NOT NULL,
        title            TEXT NOT NULL,
        reference        TEXT NOT NULL,
        content_hash     TEXT,
        created_at       DATETIME NOT NULL
    );

    -- ============================================
    -- Indexes
    -- ============================================

    CREATE INDEX IF NOT EXISTS idx_meetings_status ON meetings(status);
    CREATE INDEX IF NOT EXISTS idx_meetings_created ON meetings(created_at DESC);
    CREATE INDEX IF NOT EXISTS idx_participants_meeting ON participants(meeting_id, position);
    CREATE INDEX IF NOT EXISTS idx_sessions_meeting ON consultation_sessions(meeting_id);
    CREATE INDEX IF NOT EXISTS idx_sessions_status ON consultation_sessions(status);
    CREATE INDEX IF NOT EXISTS idx_requirements_session ON requirements(session_id, position);
    CREATE INDEX IF NOT EXISTS idx_requirements_category ON requirements(session_id, category);
    CREATE INDEX IF NOT EXISTS idx_documents_session ON documents(session_id, position);
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute_batch(&format!("PRAGMA user_version = {}", version))?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}

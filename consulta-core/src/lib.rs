//! # consulta-core
//!
//! Core library for consulta - a consultation agent that sits in on video
//! meetings and keeps track of what was said and asked for.
//!
//! This library provides:
//! - The meeting and consultation session state machines
//! - The conversation ledger, requirement collection and generated documents
//! - A use-case service with per-instance locking
//! - Database storage layer with SQLite
//! - Document generation over HTTP
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Example
//!
//! ```rust,no_run
//! use consulta_core::{Config, ConsultationService, Database};
//!
//! // Load configuration
//! let config = Config::load().expect("failed to load config");
//!
//! // Open database
//! let db = Database::open(&Config::database_path()).expect("failed to open database");
//! db.migrate().expect("failed to run migrations");
//!
//! let service = ConsultationService::with_system_clock(db, config.sessions);
//! let meeting = service
//!     .create_meeting("https://meet.example.com/abc", None, None)
//!     .expect("failed to create meeting");
//! ```

// Re-export commonly used items at the crate root
pub use clock::{Clock, IdGenerator, ManualClock, RandomIds, SequentialIds, SystemClock};
pub use config::{Config, GeneratorConfig, SessionPolicy};
pub use db::Database;
pub use error::{Error, Result};
pub use generator::{BlockingGenerator, DocumentGenerator, GenerationRequest, GeneratorClient};
pub use meeting::{
    Meeting, MeetingAction, MeetingStatus, Participant, ParticipantDraft, ParticipantRole,
};
pub use repository::{MeetingFilter, MeetingRepository, SessionFilter, SessionRepository};
pub use service::ConsultationService;
pub use session::{
    content_hash, ConsultationSession, Conversation, DocumentDraft, DocumentType,
    GeneratedDocument, NewConversation, NewRequirement, Requirement, RequirementPriority,
    SessionAction, SessionStatus, SessionType, Speaker,
};
pub use shared::Shared;

// Public modules
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod format;
pub mod generator;
pub mod logging;
pub mod meeting;
pub mod repository;
pub mod service;
pub mod session;
pub mod shared;

//! Database layer for consulta
//!
//! SQLite storage for meeting and session snapshots:
//! - Schema migrations
//! - Repository implementations for the persistence traits

pub mod repo;
pub mod schema;

pub use repo::Database;

//! Document generation
//!
//! A session's requirements and recent transcript go out to a generator,
//! and a [`DocumentDraft`] comes back to be attached to the session.
//!
//! ## Usage
//!
//! Enable the HTTP generator in `~/.config/consulta/config.toml`:
//!
//! ```toml
//! [generator]
//! enabled = true
//! endpoint = "https://docs.example.com"
//! api_key = "..."
//! ```

mod client;

pub use client::GeneratorClient;

use serde::Serialize;
use uuid::Uuid;

use crate::config::GeneratorConfig;
use crate::error::{Error, Result};
use crate::session::{Conversation, DocumentDraft, DocumentType, Requirement, SessionType};

/// Everything a generator sees about a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationRequest {
    pub session_id: Uuid,
    pub session_type: SessionType,
    pub document_type: DocumentType,
    /// Requirement list at the time of the request
    pub requirements: Vec<Requirement>,
    /// Most recent turns, oldest first
    pub transcript: Vec<Conversation>,
}

/// Produces a document for a session.
///
/// Called without any session lock held, so it may block for as long as it
/// needs.
pub trait DocumentGenerator: Send + Sync {
    fn generate(&self, request: &GenerationRequest) -> Result<DocumentDraft>;
}

/// Synchronous wrapper for [`GeneratorClient`]
///
/// Owns a current-thread runtime and blocks on each request.
pub struct BlockingGenerator {
    client: GeneratorClient,
    runtime: tokio::runtime::Runtime,
}

impl BlockingGenerator {
    /// Create a blocking generator from configuration
    ///
    /// Returns None if the generator is not enabled or has no endpoint.
    pub fn new(config: &GeneratorConfig) -> Result<Option<Self>> {
        if !config.is_ready() {
            return Ok(None);
        }

        let client = GeneratorClient::new(config)?;
        Ok(Some(Self::from_client(client)?))
    }

    /// Wrap an already configured client
    pub fn from_client(client: GeneratorClient) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Generator(format!("failed to create runtime: {}", e)))?;

        Ok(Self { client, runtime })
    }
}

impl DocumentGenerator for BlockingGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<DocumentDraft> {
        self.runtime.block_on(self.client.generate(request))
    }
}

//! HTTP client for the document generation API
//!
//! One endpoint: `POST {endpoint}/documents` takes a [`GenerationRequest`]
//! and answers with a [`DocumentDraft`].

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;

use crate::config::GeneratorConfig;
use crate::error::{Error, Result};
use crate::session::DocumentDraft;

use super::GenerationRequest;

/// Upper bound on the wait between two attempts
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// One failed attempt, tagged with whether another attempt could succeed
#[derive(Debug)]
struct AttemptError {
    error: Error,
    transient: bool,
}

impl AttemptError {
    fn transient(msg: String) -> Self {
        Self {
            error: Error::Generator(msg),
            transient: true,
        }
    }

    fn fatal(msg: String) -> Self {
        Self {
            error: Error::Generator(msg),
            transient: false,
        }
    }
}

/// Async HTTP client for the document generator
#[derive(Debug, Clone)]
pub struct GeneratorClient {
    http_client: reqwest::Client,
    base_url: String,
    max_retries: usize,
    initial_backoff: Duration,
}

impl GeneratorClient {
    /// Create a new client from configuration
    ///
    /// Returns an error if the configuration is invalid or has no endpoint.
    pub fn new(config: &GeneratorConfig) -> Result<Self> {
        config.validate()?;

        let base_url = config
            .endpoint
            .clone()
            .ok_or_else(|| Error::Config("generator.endpoint is required".to_string()))?
            .trim_end_matches('/')
            .to_string();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(api_key) = &config.api_key {
            let auth_value = format!("Bearer {}", api_key);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth_value)
                    .map_err(|e| Error::Config(format!("invalid api_key: {}", e)))?,
            );
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(500),
        })
    }

    /// Override the first retry delay (doubles on every further retry)
    pub fn with_initial_backoff(mut self, delay: Duration) -> Self {
        self.initial_backoff = delay;
        self
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Request a document, retrying transient failures with exponential backoff.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<DocumentDraft> {
        let mut last_error = None;
        let mut delay = self.initial_backoff;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tracing::debug!(
                    "Retrying generate (attempt {}/{}), waiting {:?}",
                    attempt + 1,
                    self.max_retries + 1,
                    delay
                );
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, MAX_BACKOFF);
            }

            match self.send(request).await {
                Ok(draft) => return Ok(draft),
                Err(failure) if failure.transient => {
                    tracing::warn!(
                        session_id = %request.session_id,
                        error = %failure.error,
                        "Transient error from document generator"
                    );
                    last_error = Some(failure.error);
                }
                Err(failure) => return Err(failure.error),
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Generator("max retries exceeded".to_string())))
    }

    async fn send(&self, request: &GenerationRequest) -> std::result::Result<DocumentDraft, AttemptError> {
        let url = format!("{}/documents", self.base_url);

        let response = self
            .http_client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                let msg = format!("HTTP request failed: {}", e);
                if e.is_timeout() || e.is_connect() || e.is_request() {
                    AttemptError::transient(msg)
                } else {
                    AttemptError::fatal(msg)
                }
            })?;

        let status = response.status();

        if status.is_success() {
            let draft: DocumentDraft = response
                .json()
                .await
                .map_err(|e| AttemptError::fatal(format!("failed to parse response: {}", e)))?;

            if draft.document_type != request.document_type {
                return Err(AttemptError::fatal(format!(
                    "generator returned a {} document, expected {}",
                    draft.document_type, request.document_type
                )));
            }
            Ok(draft)
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            let msg = format!("API error ({}): {}", status, error_text);
            if is_transient_status(status) {
                Err(AttemptError::transient(msg))
            } else {
                Err(AttemptError::fatal(msg))
            }
        }
    }
}

/// 5xx and 429 are worth another attempt; other statuses are final
fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

//! Capability interfaces of the outside world, and their HTTP adapters.
//!
//! Processors depend only on the traits; the worker wires in
//! [`GmailClient`] and [`OpenRouterClient`], tests wire in fakes.

pub mod gmail;
pub mod openrouter;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use inboxpay_ai::{AiError, ExtractionOutcome, MessageContent};

pub use gmail::GmailClient;
pub use openrouter::OpenRouterClient;

/// Result of an OAuth refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedToken {
    pub access_token: String,
    /// Present only when the provider rotated the refresh token.
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// One page of message identifiers, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePage {
    pub ids: Vec<String>,
    pub next_cursor: Option<String>,
}

/// Failure talking to the mail provider or its token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("network error: {0}")]
    Network(String),

    #[error("provider error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    Malformed(String),
}

/// Failure talking to the extraction model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    #[error("network error: {0}")]
    Network(String),

    #[error("model API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error(transparent)]
    Response(#[from] AiError),
}

#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken, SourceError>;
}

#[async_trait]
pub trait MessageSource: Send + Sync {
    async fn list_message_ids(
        &self,
        access_token: &str,
        query: &str,
        page_size: u32,
        cursor: Option<&str>,
    ) -> Result<MessagePage, SourceError>;

    async fn fetch_message(&self, access_token: &str, message_id: &str) -> Result<MessageContent, SourceError>;
}

#[async_trait]
pub trait ExtractionOracle: Send + Sync {
    /// One outcome per input message, in input order.
    async fn extract_batch(&self, messages: &[MessageContent]) -> Result<Vec<ExtractionOutcome>, OracleError>;
}

pub(crate) fn network_error(err: reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timed out: {err}")
    } else {
        err.to_string()
    }
}

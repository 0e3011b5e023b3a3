//! Domain error model.

use thiserror::Error;

/// Domain-level error.
///
/// Deterministic parse failures only (malformed identifiers, unknown status
/// tags). Store and network failures belong to the infra layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A persisted status or mode tag is not one this pipeline knows.
    #[error("unknown {kind}: {value}")]
    UnknownTag { kind: &'static str, value: String },
}

impl DomainError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn unknown_tag(kind: &'static str, value: impl Into<String>) -> Self {
        Self::UnknownTag {
            kind,
            value: value.into(),
        }
    }
}

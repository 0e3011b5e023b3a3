use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AiError {
    #[error("malformed model response: {0}")]
    MalformedResponse(String),

    #[error("model returned no choices")]
    EmptyResponse,
}

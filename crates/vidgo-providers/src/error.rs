//! Provider client error types.

use thiserror::Error;

use vidgo_models::Capability;

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors surfaced by provider clients.
///
/// The dispatcher treats every variant as a failed attempt triggering
/// failover to the next provider in the list.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed provider response: {0}")]
    Malformed(String),

    #[error("Provider task failed: {0}")]
    TaskFailed(String),

    #[error("Provider task did not finish within {0} polls")]
    PollExhausted(u32),

    #[error("Input rejected by moderation: {0}")]
    Rejected(String),

    #[error("Capability {0} not supported by this provider")]
    Unsupported(Capability),

    #[error("Missing required param: {0}")]
    MissingParam(&'static str),
}

impl ProviderError {
    /// Short classification used in attempt records and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Http(_) => "http",
            ProviderError::Status { .. } => "status",
            ProviderError::Malformed(_) => "malformed",
            ProviderError::TaskFailed(_) => "task_failed",
            ProviderError::PollExhausted(_) => "poll_exhausted",
            ProviderError::Rejected(_) => "rejected",
            ProviderError::Unsupported(_) => "unsupported",
            ProviderError::MissingParam(_) => "missing_param",
        }
    }
}

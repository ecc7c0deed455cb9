//! Error types for the captioning and generation workflows.
//!
//! None of these escape the controller: each is turned into inline result text or an
//! alert at the operation boundary.

use thiserror::Error;

/// Precondition failures detected before any work is started.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{}", crate::model::MISSING_FILE_MESSAGE)]
    MissingFile,

    #[error("prompt is empty")]
    EmptyPrompt,

    #[error("unsupported file type: {0}")]
    UnsupportedType(String),
}

/// Failures of an outbound request to the inference service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("{0}")]
    Transport(String),

    /// Non-success status. `message` is the body text or the status reason phrase.
    #[error("{message}")]
    Remote { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    /// The generated image arrived but could not be written locally.
    #[error("could not save generated image: {0}")]
    Save(String),

    /// The task running the request died before producing an outcome.
    #[error("request task failed: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for RequestError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RequestError::Transport(format!("request timed out: {e}"))
        } else {
            RequestError::Transport(e.to_string())
        }
    }
}

/// The selected file could not be read or decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct PreviewError(pub String);

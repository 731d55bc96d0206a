//! Error taxonomy shared by the retrieval pipeline and the conversation loop.
//!
//! | Variant | Raised by | Handling |
//! |---------|-----------|----------|
//! | [`HarnessError::Config`] | config validation, chunker preconditions | fail at setup |
//! | [`HarnessError::NotFound`] | document loader | fail at setup |
//! | [`HarnessError::Service`] | embedding / completion calls (incl. timeouts) | fatal for the turn |
//! | [`HarnessError::InvalidResponse`] | malformed service payloads | fatal for the turn |
//! | [`HarnessError::StepLimit`] | conversation loop guard | fatal for the turn |
//!
//! Tool failures never surface here: the tool registry turns them into
//! tool-result messages (see [`crate::tools`]).

use std::path::PathBuf;

/// Library result alias.
pub type Result<T, E = HarnessError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("path not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{service} service error: {message}")]
    Service {
        service: &'static str,
        message: String,
    },

    #[error("invalid response from {service} service: {message}")]
    InvalidResponse {
        service: &'static str,
        message: String,
    },

    #[error("conversation turn exceeded {0} model calls")]
    StepLimit(usize),

    #[error("conversation turn aborted: {0}")]
    Aborted(String),
}

impl HarnessError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Map a transport error from `reqwest`. Timeouts and connection failures
    /// land on the same fatal path as any other unreachable-service failure.
    pub fn from_http(service: &'static str, url: &str, err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("request to {} timed out", url)
        } else if err.is_connect() {
            format!("cannot reach {} (is the service running?): {}", url, err)
        } else {
            format!("request to {} failed: {}", url, err)
        };
        Self::Service { service, message }
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

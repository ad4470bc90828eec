//! Runtime error types.

use thiserror::Error;

/// Errors from conversation session management.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The tab already has an active session. The caller must end it first.
    #[error("tab {0} already has an active session")]
    SessionExists(String),

    /// No active session for the tab.
    #[error("no active session for tab {0}")]
    NoSession(String),

    /// Credential fetch failed.
    #[error("credential fetch failed: {0}")]
    Credential(String),

    /// The conversational-AI provider refused or dropped the connection.
    #[error("provider failure: {0}")]
    Provider(String),

    /// The audio collaborator could not attach to the tab.
    #[error("audio failure: {0}")]
    Audio(String),
}

/// Result alias for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

impl From<RuntimeError> for halo_core::errors::HaloError {
    fn from(e: RuntimeError) -> Self {
        match e {
            RuntimeError::SessionExists(t) => {
                Self::Conflict(format!("tab {t} already has an active session"))
            }
            RuntimeError::NoSession(t) => Self::NotFound(format!("no active session for tab {t}")),
            RuntimeError::Credential(m) => Self::Unauthorized(m),
            RuntimeError::Provider(m) => Self::upstream_retryable(m),
            RuntimeError::Audio(m) => Self::upstream_fatal(m),
        }
    }
}

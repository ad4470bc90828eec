//! Error taxonomy shared across the workspace.
//!
//! Every failure the backend or runtime surfaces falls into one of seven
//! classes, each with a fixed retry policy:
//!
//! | Variant | Retry? | Typical source |
//! |---------|--------|----------------|
//! | `NotFound` | never | unknown session / operator |
//! | `Unauthorized` | never | missing credential |
//! | `Forbidden` | never | mismatched operator on accept |
//! | `Conflict` | caller reconciles | re-accept, duplicate start |
//! | `Upstream` | when `retryable` | presence / push / store I/O |
//! | `Timeout` | reported as tool error | unanswered tool call |
//! | `Internal` | never | caught unexpected failure |

use thiserror::Error;

/// Convenience result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, HaloError>;

/// Workspace-wide error taxonomy.
#[derive(Debug, Error)]
pub enum HaloError {
    /// Unknown session, operator, or resource. Always surfaced, never
    /// silently retried.
    #[error("not found: {0}")]
    NotFound(String),

    /// Missing or invalid credential. Terminal.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Credential valid but not permitted for this resource. Terminal.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// State mismatch the caller must reconcile rather than blindly retry.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A collaborator (provider, presence, push, durable store) failed.
    #[error("upstream failure: {message}")]
    Upstream {
        /// What failed.
        message: String,
        /// Whether the operation is safe to retry.
        retryable: bool,
    },

    /// An operation exceeded its deadline.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Unexpected failure caught at a handler boundary.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HaloError {
    /// A retryable upstream failure.
    pub fn upstream_retryable(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
            retryable: true,
        }
    }

    /// A non-retryable upstream failure.
    pub fn upstream_fatal(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
            retryable: false,
        }
    }

    /// Whether a caller may retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Upstream { retryable: true, .. })
    }

    /// Stable label for metrics and logs.
    pub fn class(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::Conflict(_) => "conflict",
            Self::Upstream { .. } => "upstream",
            Self::Timeout(_) => "timeout",
            Self::Internal(_) => "internal",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

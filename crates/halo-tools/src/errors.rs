//! Error types for tool dispatch and routing.

use thiserror::Error;

/// Errors a tool handler or the dispatch layer can produce.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Parameters were missing or had the wrong shape.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// The handler ran and failed.
    #[error("execution failed: {0}")]
    Execution(String),

    /// The handler panicked; caught at the dispatch boundary.
    #[error("handler panicked: {0}")]
    Panicked(String),

    /// The routing channel to the peer context closed before a reply.
    #[error("channel closed before response")]
    ChannelClosed,
}

/// Result alias for tool operations.
pub type Result<T> = std::result::Result<T, ToolError>;

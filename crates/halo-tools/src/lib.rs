//! Tool dispatch and cross-context message routing.
//!
//! | Module         | Purpose                                            |
//! |----------------|----------------------------------------------------|
//! | [`traits`]     | `ToolHandler` trait, execution context, namespaces |
//! | [`registry`]   | two-tier name→handler table                        |
//! | [`dispatcher`] | contained execution, `Unhandled` sentinel, ping    |
//! | [`router`]     | async request/response channel between contexts    |

pub mod dispatcher;
pub mod errors;
pub mod registry;
pub mod router;
pub mod traits;

#[cfg(test)]
mod testutil;

pub use dispatcher::{DispatchOutcome, PING_TOOL, ToolDispatcher};
pub use errors::{Result, ToolError};
pub use registry::ToolRegistry;
pub use router::{ToolRouter, spawn_router};
pub use traits::{ToolContext, ToolHandler, ToolNamespace};

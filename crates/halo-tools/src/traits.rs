//! The tool handler trait and execution context.

use async_trait::async_trait;
use serde_json::Value;

use halo_core::ids::TabId;
use halo_core::tools::ToolEnvelope;

use crate::errors::Result;

/// Where a tool's handler came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolNamespace {
    /// Built into this extension.
    Local,
    /// Supplied by the page's verified domain owner.
    DomainProvided,
    /// No handler registered under this name.
    Unknown,
}

/// Per-invocation context handed to every handler.
#[derive(Clone, Debug)]
pub struct ToolContext {
    /// Tab whose page the tool acts on.
    pub tab_id: TabId,
    /// Domain of the page, for handlers that gate on it.
    pub domain: String,
}

/// One registered tool.
///
/// Handlers return `Ok(envelope)` for both tool success and tool failure;
/// `Err` is reserved for faults the handler could not turn into an envelope
/// itself (the dispatcher converts those at the boundary).
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Name the dispatcher routes on.
    fn name(&self) -> &str;

    /// Run the tool against the given tab.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolEnvelope>;
}

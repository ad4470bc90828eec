//! Shared test utilities for dispatch and routing tests.
//!
//! Provides `make_ctx()` plus a few canned handlers — previously
//! copy-pasted across every dispatch test module.

use async_trait::async_trait;
use serde_json::Value;

use halo_core::ids::TabId;
use halo_core::tools::ToolEnvelope;

use crate::errors::{Result, ToolError};
use crate::traits::{ToolContext, ToolHandler};

/// Build a standard test `ToolContext`.
pub fn make_ctx() -> ToolContext {
    ToolContext {
        tab_id: TabId::new("tab_1"),
        domain: "shop.example.com".into(),
    }
}

/// Handler returning a fixed envelope regardless of params.
pub struct StaticTool {
    name: String,
    envelope: ToolEnvelope,
}

impl StaticTool {
    pub fn new(name: impl Into<String>, envelope: ToolEnvelope) -> Self {
        Self {
            name: name.into(),
            envelope,
        }
    }
}

#[async_trait]
impl ToolHandler for StaticTool {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _params: Value, _ctx: &ToolContext) -> Result<ToolEnvelope> {
        Ok(self.envelope.clone())
    }
}

/// Handler that always returns `Err`, for boundary tests.
pub struct FailingTool {
    name: String,
}

impl FailingTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl ToolHandler for FailingTool {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _params: Value, _ctx: &ToolContext) -> Result<ToolEnvelope> {
        Err(ToolError::Execution("boom".into()))
    }
}

/// Handler that panics, for boundary tests.
pub struct PanickingTool;

#[async_trait]
impl ToolHandler for PanickingTool {
    fn name(&self) -> &str {
        "panics"
    }

    async fn execute(&self, _params: Value, _ctx: &ToolContext) -> Result<ToolEnvelope> {
        panic!("handler bug");
    }
}

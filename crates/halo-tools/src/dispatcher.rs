//! Tool dispatcher — routes one invocation to its handler, safely.
//!
//! Used identically from the async message router and from local calls in
//! the tab's own manager. The boundary guarantees:
//!
//! - every handled call yields exactly one uniform envelope; handler `Err`s
//!   and panics are converted, never propagated
//! - an unknown name yields the distinguished [`DispatchOutcome::Unhandled`]
//!   sentinel so callers can tell "handled, failed" from "not handled"
//! - the `ping` probe answers without touching the registry, so a caller
//!   can detect a live engine process before spawning a new one

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use parking_lot::RwLock;
use serde_json::{Value, json};
use tracing::{debug, warn};

use halo_core::tools::{ToolCallRequest, ToolCallResponse, ToolEnvelope};

use crate::errors::ToolError;
use crate::registry::ToolRegistry;
use crate::traits::{ToolContext, ToolNamespace};

/// Name of the liveness probe message.
pub const PING_TOOL: &str = "ping";

/// Result of a dispatch attempt.
#[derive(Clone, Debug, PartialEq)]
pub enum DispatchOutcome {
    /// A handler ran (successfully or not); here is its envelope.
    Handled(ToolEnvelope),
    /// No handler is registered under this name. The caller decides what
    /// that means; the dispatcher never fakes a resolution.
    Unhandled,
}

/// Routes invocations through a [`ToolRegistry`].
pub struct ToolDispatcher {
    registry: RwLock<ToolRegistry>,
}

impl ToolDispatcher {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry: RwLock::new(registry),
        }
    }

    /// Mutate the registry (install/clear domain-provided handlers).
    pub fn with_registry<T>(&self, f: impl FnOnce(&mut ToolRegistry) -> T) -> T {
        f(&mut self.registry.write())
    }

    /// Which namespace a name resolves in.
    pub fn resolve(&self, name: &str) -> ToolNamespace {
        if name == PING_TOOL {
            ToolNamespace::Local
        } else {
            self.registry.read().resolve(name)
        }
    }

    /// Dispatch one invocation.
    ///
    /// The handler runs on its own task so a panic is contained and turned
    /// into a failure envelope.
    pub async fn dispatch(&self, request: &ToolCallRequest, ctx: &ToolContext) -> DispatchOutcome {
        let start = Instant::now();
        let name = request.tool_name.as_str();

        // Liveness probe. Answered here so it works even with an empty
        // registry, and never hits a handler.
        if name == PING_TOOL {
            counter!("halo_tool_dispatch_total", "outcome" => "ping").increment(1);
            return DispatchOutcome::Handled(ToolEnvelope::ok_with(json!({"alive": true})));
        }

        let Some(handler) = self.registry.read().get(name) else {
            debug!(tool_name = name, "no handler registered");
            counter!("halo_tool_dispatch_total", "outcome" => "unhandled").increment(1);
            return DispatchOutcome::Unhandled;
        };

        let envelope = run_contained(handler, request.parameters.clone(), ctx.clone()).await;
        let outcome = if envelope.is_err() { "error" } else { "ok" };
        counter!("halo_tool_dispatch_total", "outcome" => outcome).increment(1);
        histogram!("halo_tool_dispatch_duration_seconds").record(start.elapsed().as_secs_f64());
        DispatchOutcome::Handled(envelope)
    }

    /// Dispatch and wrap into a correlated response.
    ///
    /// Unknown names become a structured failure tagged with the provider's
    /// call ID; the correlation ID is echoed verbatim either way.
    pub async fn dispatch_to_response(
        &self,
        request: &ToolCallRequest,
        ctx: &ToolContext,
    ) -> ToolCallResponse {
        let envelope = match self.dispatch(request, ctx).await {
            DispatchOutcome::Handled(envelope) => envelope,
            DispatchOutcome::Unhandled => {
                ToolEnvelope::err(format!("unknown tool: {}", request.tool_name))
            }
        };
        ToolCallResponse {
            call_id: request.call_id.clone(),
            envelope,
        }
    }
}

/// Run a handler on its own task so panics become envelopes.
async fn run_contained(
    handler: Arc<dyn crate::traits::ToolHandler>,
    params: Value,
    ctx: ToolContext,
) -> ToolEnvelope {
    let name = handler.name().to_string();
    let task = tokio::spawn(async move { handler.execute(params, &ctx).await });
    match task.await {
        Ok(Ok(envelope)) => envelope,
        Ok(Err(e)) => {
            warn!(tool_name = %name, error = %e, "tool handler failed");
            ToolEnvelope::err(e.to_string())
        }
        Err(join_err) => {
            let e = if join_err.is_panic() {
                ToolError::Panicked(name.clone())
            } else {
                ToolError::Execution("handler task cancelled".into())
            };
            warn!(tool_name = %name, error = %e, "tool handler did not finish");
            ToolEnvelope::err(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FailingTool, PanickingTool, StaticTool, make_ctx};
    use assert_matches::assert_matches;
    use halo_core::ids::{CallId, TabId};

    fn request(name: &str) -> ToolCallRequest {
        ToolCallRequest {
            tool_name: name.into(),
            call_id: CallId::new("tc_1"),
            parameters: json!({}),
            origin_tab_id: TabId::new("tab_1"),
        }
    }

    fn dispatcher_with(handlers: Vec<Arc<dyn crate::traits::ToolHandler>>) -> ToolDispatcher {
        let mut registry = ToolRegistry::new();
        for h in handlers {
            registry.register_local(h);
        }
        ToolDispatcher::new(registry)
    }

    #[tokio::test]
    async fn handled_tool_returns_its_envelope() {
        let dispatcher = dispatcher_with(vec![Arc::new(StaticTool::new(
            "click_element",
            ToolEnvelope::ok_with(json!({"clicked": true})),
        ))]);
        let outcome = dispatcher.dispatch(&request("click_element"), &make_ctx()).await;
        assert_matches!(outcome, DispatchOutcome::Handled(env) if env.success);
    }

    #[tokio::test]
    async fn unknown_name_is_unhandled_not_error() {
        let dispatcher = dispatcher_with(vec![]);
        let outcome = dispatcher.dispatch(&request("nope"), &make_ctx()).await;
        assert_eq!(outcome, DispatchOutcome::Unhandled);
    }

    #[tokio::test]
    async fn handler_error_becomes_failure_envelope() {
        let dispatcher = dispatcher_with(vec![Arc::new(FailingTool::new("flaky"))]);
        let outcome = dispatcher.dispatch(&request("flaky"), &make_ctx()).await;
        assert_matches!(outcome, DispatchOutcome::Handled(env) => {
            assert!(env.is_err());
            assert!(env.error.unwrap().contains("boom"));
        });
    }

    #[tokio::test]
    async fn handler_panic_is_contained() {
        let dispatcher = dispatcher_with(vec![Arc::new(PanickingTool)]);
        let outcome = dispatcher.dispatch(&request("panics"), &make_ctx()).await;
        assert_matches!(outcome, DispatchOutcome::Handled(env) => {
            assert!(env.is_err());
            assert!(env.error.unwrap().contains("panicked"));
        });
    }

    #[tokio::test]
    async fn ping_answers_with_empty_registry() {
        let dispatcher = dispatcher_with(vec![]);
        let outcome = dispatcher.dispatch(&request(PING_TOOL), &make_ctx()).await;
        assert_matches!(outcome, DispatchOutcome::Handled(env) => {
            assert!(env.success);
            assert_eq!(env.data["alive"], true);
        });
    }

    #[tokio::test]
    async fn response_echoes_call_id_for_unknown_name() {
        let dispatcher = dispatcher_with(vec![]);
        let resp = dispatcher
            .dispatch_to_response(&request("mystery"), &make_ctx())
            .await;
        assert_eq!(resp.call_id, CallId::new("tc_1"));
        assert!(resp.envelope.is_err());
        assert!(resp.envelope.error.unwrap().contains("mystery"));
    }
}

//! Async message router between execution contexts.
//!
//! The engine context and the tab context share no memory; a tool call
//! crosses between them as a request/response pair over channels,
//! correlated by the provider's call ID. The serving side holds the reply
//! sender open for the whole handler run, so async results arrive whenever
//! they finish rather than racing a synchronous return. A peer going away
//! closes the channel, which resolves every pending call with
//! [`ToolError::ChannelClosed`] instead of hanging.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use halo_core::tools::{ToolCallRequest, ToolCallResponse};

use crate::dispatcher::ToolDispatcher;
use crate::errors::{Result, ToolError};
use crate::traits::ToolContext;

/// One in-flight cross-context call.
struct RouterMessage {
    request: ToolCallRequest,
    reply: oneshot::Sender<ToolCallResponse>,
}

/// Caller-side handle. Cheap to clone; dropping every clone shuts the
/// serving loop down.
#[derive(Clone)]
pub struct ToolRouter {
    tx: mpsc::Sender<RouterMessage>,
}

impl ToolRouter {
    /// Send a request and wait for its correlated response.
    ///
    /// There is no per-call timeout here; the provider enforces tool
    /// budgets upstream. The contract is respond eventually or fail.
    pub async fn call(&self, request: ToolCallRequest) -> Result<ToolCallResponse> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(RouterMessage {
                request,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ToolError::ChannelClosed)?;
        reply_rx.await.map_err(|_| ToolError::ChannelClosed)
    }
}

/// Spawn the serving loop for one tab's dispatcher.
///
/// Each message gets its own task so a slow handler never blocks the
/// channel for later calls.
pub fn spawn_router(
    dispatcher: Arc<ToolDispatcher>,
    ctx: ToolContext,
    buffer: usize,
) -> ToolRouter {
    let (tx, mut rx) = mpsc::channel::<RouterMessage>(buffer.max(1));

    let _serve = tokio::spawn(async move {
        debug!(tab_id = %ctx.tab_id, "tool router started");
        while let Some(msg) = rx.recv().await {
            let dispatcher = Arc::clone(&dispatcher);
            let ctx = ctx.clone();
            let _call = tokio::spawn(async move {
                let response = dispatcher.dispatch_to_response(&msg.request, &ctx).await;
                // Caller may have given up (tab closed); nothing to do then.
                let _ = msg.reply.send(response);
            });
        }
        info!(tab_id = %ctx.tab_id, "tool router closed");
    });

    ToolRouter { tx }
}

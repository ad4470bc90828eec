//! Write-behind queue in front of [`CallStore`].
//!
//! Call-path mutations must never block on disk, so the registry enqueues
//! mirror writes here and a single worker thread drains them in order.
//! The queue is bounded; when it is full the write is dropped, counted,
//! and reported on the failure channel rather than applying backpressure
//! to the call path.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use halo_core::audit::CallEvent;
use halo_core::call::CallSession;
use halo_core::ids::SessionId;

use crate::store::CallStore;

/// One queued durable write.
#[derive(Debug)]
pub enum StoreOp {
    /// Mirror the full current state of a live session.
    MirrorSession(Box<CallSession>),
    /// Record final disposition for a session.
    SessionEnded {
        session_id: SessionId,
        ended_at: chrono::DateTime<chrono::Utc>,
        reason: String,
        duration_secs: i64,
    },
    /// Append one audit event.
    AppendEvent(Box<CallEvent>),
}

impl StoreOp {
    fn kind(&self) -> &'static str {
        match self {
            Self::MirrorSession(_) => "mirror_session",
            Self::SessionEnded { .. } => "session_ended",
            Self::AppendEvent(_) => "append_event",
        }
    }
}

/// A write that was given up on, surfaced on the failure channel.
#[derive(Clone, Debug)]
pub struct WriteFailure {
    /// Which kind of op failed.
    pub op: &'static str,
    /// Why.
    pub reason: String,
    pub at: chrono::DateTime<chrono::Utc>,
}

/// Sender half handed to the registry and coordinators.
#[derive(Clone)]
pub struct WriteBehindQueue {
    tx: mpsc::Sender<StoreOp>,
    failures: watch::Sender<Option<WriteFailure>>,
}

impl WriteBehindQueue {
    /// Enqueue without blocking. A full queue drops the op and reports it.
    pub fn enqueue(&self, op: StoreOp) {
        let kind = op.kind();
        if let Err(e) = self.tx.try_send(op) {
            counter!("halo_store_write_failures_total", "op" => kind, "stage" => "enqueue")
                .increment(1);
            warn!(op = kind, error = %e, "durable write dropped, queue full or closed");
            let _ = self.failures.send(Some(WriteFailure {
                op: kind,
                reason: format!("enqueue failed: {e}"),
                at: chrono::Utc::now(),
            }));
        }
    }

    /// Convenience wrappers used by the registry.
    pub fn mirror(&self, session: &CallSession) {
        self.enqueue(StoreOp::MirrorSession(Box::new(session.clone())));
    }

    pub fn session_ended(
        &self,
        session_id: SessionId,
        ended_at: chrono::DateTime<chrono::Utc>,
        reason: impl Into<String>,
        duration_secs: i64,
    ) {
        self.enqueue(StoreOp::SessionEnded {
            session_id,
            ended_at,
            reason: reason.into(),
            duration_secs,
        });
    }

    pub fn append_event(&self, event: CallEvent) {
        self.enqueue(StoreOp::AppendEvent(Box::new(event)));
    }
}

/// Spawn the worker and return the queue handle plus a failure watch.
///
/// The worker owns its receiver; dropping every `WriteBehindQueue` clone
/// closes the channel and the worker drains what is left, then exits.
pub fn spawn_writer(
    store: Arc<CallStore>,
    queue_depth: usize,
    write_retries: u32,
) -> (WriteBehindQueue, watch::Receiver<Option<WriteFailure>>) {
    let (tx, mut rx) = mpsc::channel::<StoreOp>(queue_depth.max(1));
    let (failure_tx, failure_rx) = watch::channel(None);
    let queue = WriteBehindQueue {
        tx,
        failures: failure_tx.clone(),
    };

    // SQLite work is blocking; keep it off the async runtime's core threads.
    let _handle = tokio::task::spawn_blocking(move || {
        info!("store writer started");
        while let Some(op) = rx.blocking_recv() {
            apply_with_retries(&store, &op, write_retries, &failure_tx);
        }
        info!("store writer drained, exiting");
    });

    (queue, failure_rx)
}

fn apply_with_retries(
    store: &CallStore,
    op: &StoreOp,
    write_retries: u32,
    failures: &watch::Sender<Option<WriteFailure>>,
) {
    let mut last_err = None;
    for attempt in 0..=write_retries {
        match apply(store, op) {
            Ok(()) => {
                counter!("halo_store_writes_total", "op" => op.kind()).increment(1);
                return;
            }
            Err(e) => {
                warn!(op = op.kind(), attempt, error = %e, "durable write failed");
                last_err = Some(e);
                if attempt < write_retries {
                    std::thread::sleep(Duration::from_millis(50 * u64::from(attempt + 1)));
                }
            }
        }
    }

    let reason = last_err.map_or_else(|| "unknown".to_string(), |e| e.to_string());
    counter!("halo_store_write_failures_total", "op" => op.kind(), "stage" => "apply")
        .increment(1);
    error!(op = op.kind(), reason, "durable write abandoned after retries");
    let _ = failures.send(Some(WriteFailure {
        op: op.kind(),
        reason,
        at: chrono::Utc::now(),
    }));
}

fn apply(store: &CallStore, op: &StoreOp) -> crate::errors::Result<()> {
    match op {
        StoreOp::MirrorSession(session) => store.mirror_session(session),
        StoreOp::SessionEnded {
            session_id,
            ended_at,
            reason,
            duration_secs,
        } => store.mark_session_ended(session_id, *ended_at, reason, *duration_secs),
        StoreOp::AppendEvent(event) => store.append_event(event).map(|_| ()),
    }
}

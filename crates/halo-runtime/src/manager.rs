//! Conversation session manager — one live AI conversation per tab.
//!
//! Owns the provider handle, the audio attachment, and the pending
//! tool-call tracker for each tab. Provider callbacks are translated into
//! three effect streams: widget UI state, transcript entries, and tool
//! dispatch through the [`ToolRouter`].
//!
//! Ordering guarantee: the page's initial context is pushed as the first
//! contextual update, after (never before) the provider reports
//! `Connected`. It is the only way the model learns what page it is on.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use halo_core::ids::{CallId, TabId};
use halo_core::tools::{ToolCallRequest, ToolEnvelope};
use halo_tools::{ToolError, ToolRouter};

use crate::audio::AudioBridge;
use crate::errors::{Result, RuntimeError};
use crate::provider::{
    ConversationProvider, CredentialSource, PageCategory, ProviderEvent, ProviderSession,
};
use crate::tracker::ToolCallTracker;

/// On-page widget display state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WidgetState {
    /// Credential fetched, provider connecting.
    Connecting,
    /// Connected, user's turn.
    Listening,
    /// The agent is speaking.
    Speaking,
    /// Non-fatal provider error shown inline.
    Error(String),
    /// Conversation over.
    Ended,
}

/// One finalized transcript line.
#[derive(Clone, Debug, PartialEq)]
pub struct TranscriptEntry {
    /// True for the end user's speech, false for the agent's.
    pub from_user: bool,
    pub text: String,
    pub at: chrono::DateTime<chrono::Utc>,
}

/// Effects the tab UI consumes.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEffect {
    Widget(WidgetState),
    Transcript(TranscriptEntry),
}

/// Everything needed to start one conversation.
pub struct StartOptions {
    pub tab_id: TabId,
    pub domain: String,
    pub page_url: String,
    /// Serialized page snapshot pushed as the first contextual update.
    pub initial_context: String,
    /// Byte cap on `initial_context`; oversized snapshots are truncated.
    pub max_context_bytes: usize,
    /// Route to this tab's tool dispatcher.
    pub router: ToolRouter,
}

struct ManagedSession {
    handle: Arc<dyn ProviderSession>,
    tracker: Arc<Mutex<ToolCallTracker>>,
}

/// At-most-one-active-session-per-tab manager.
pub struct ConversationSessionManager {
    provider: Arc<dyn ConversationProvider>,
    credentials: Arc<dyn CredentialSource>,
    audio: Arc<dyn AudioBridge>,
    sessions: Mutex<HashMap<TabId, ManagedSession>>,
}

impl ConversationSessionManager {
    pub fn new(
        provider: Arc<dyn ConversationProvider>,
        credentials: Arc<dyn CredentialSource>,
        audio: Arc<dyn AudioBridge>,
    ) -> Self {
        Self {
            provider,
            credentials,
            audio,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Whether the tab has a live conversation.
    pub fn has_session(&self, tab_id: &TabId) -> bool {
        self.sessions.lock().contains_key(tab_id)
    }

    /// Start a conversation for the tab.
    ///
    /// Returns the effect stream the tab UI should consume. A second start
    /// for a tab that already has a session is rejected; the caller must
    /// end the existing one first.
    #[instrument(skip(self, opts), fields(tab_id = %opts.tab_id, domain = %opts.domain))]
    pub async fn start(&self, mut opts: StartOptions) -> Result<mpsc::Receiver<SessionEffect>> {
        if self.has_session(&opts.tab_id) {
            return Err(RuntimeError::SessionExists(opts.tab_id.to_string()));
        }

        if opts.initial_context.len() > opts.max_context_bytes {
            warn!(
                tab_id = %opts.tab_id,
                bytes = opts.initial_context.len(),
                cap = opts.max_context_bytes,
                "page context over budget, truncating"
            );
            opts.initial_context = halo_core::text::truncate_with_suffix(
                &opts.initial_context,
                opts.max_context_bytes,
                "…[truncated]",
            );
        }

        let category = PageCategory::detect(&opts.page_url);
        let credential = self.credentials.fetch(category).await?;
        debug!(category = category.as_str(), "credential fetched");

        self.audio.attach(&opts.tab_id).await?;

        let (events_tx, events_rx) = mpsc::channel(64);
        let handle: Arc<dyn ProviderSession> = match self
            .provider
            .start_session(credential, events_tx)
            .await
        {
            Ok(handle) => Arc::from(handle),
            Err(e) => {
                self.audio.release(&opts.tab_id).await;
                return Err(e);
            }
        };

        let tracker = Arc::new(Mutex::new(ToolCallTracker::new()));
        let (effects_tx, effects_rx) = mpsc::channel(64);
        let _ = effects_tx.try_send(SessionEffect::Widget(WidgetState::Connecting));

        {
            let mut sessions = self.sessions.lock();
            // A racing start may have won while we were connecting.
            if sessions.contains_key(&opts.tab_id) {
                drop(sessions);
                let late = Arc::clone(&handle);
                let _ = tokio::spawn(async move {
                    let _ = late.end_session().await;
                });
                self.audio.release(&opts.tab_id).await;
                return Err(RuntimeError::SessionExists(opts.tab_id.to_string()));
            }
            let _ = sessions.insert(
                opts.tab_id.clone(),
                ManagedSession {
                    handle: Arc::clone(&handle),
                    tracker: Arc::clone(&tracker),
                },
            );
        }

        let _events = tokio::spawn(translate_events(
            opts,
            handle,
            tracker,
            events_rx,
            effects_tx,
        ));

        metrics::counter!("halo_runtime_sessions_started_total").increment(1);
        Ok(effects_rx)
    }

    /// End the tab's conversation.
    ///
    /// The tab is considered ended as soon as this returns; provider close
    /// and audio release happen in the background, with failures logged
    /// rather than surfaced.
    #[instrument(skip(self), fields(tab_id = %tab_id))]
    pub fn end(&self, tab_id: &TabId) -> Result<()> {
        let Some(session) = self.sessions.lock().remove(tab_id) else {
            return Err(RuntimeError::NoSession(tab_id.to_string()));
        };

        // Pending tool calls resolve as cancelled, never hang.
        session.tracker.lock().cancel_all();

        let audio = Arc::clone(&self.audio);
        let tab = tab_id.clone();
        let _teardown = tokio::spawn(async move {
            if let Err(e) = session.handle.end_session().await {
                warn!(tab_id = %tab, error = %e, "provider close failed");
            }
            audio.release(&tab).await;
            info!(tab_id = %tab, "conversation ended");
        });

        metrics::counter!("halo_runtime_sessions_ended_total").increment(1);
        Ok(())
    }

    /// Inject a typed user message.
    pub async fn send_user_message(&self, tab_id: &TabId, text: String) -> Result<()> {
        self.handle_for(tab_id)?.send_user_message(text).await
    }

    /// Set playback volume for the tab's conversation.
    pub async fn set_volume(&self, tab_id: &TabId, volume: f32) -> Result<()> {
        self.handle_for(tab_id)?.set_volume(volume).await
    }

    /// Mute or unmute the user's microphone.
    pub async fn set_mic_muted(&self, tab_id: &TabId, muted: bool) -> Result<()> {
        self.handle_for(tab_id)?.set_mic_muted(muted).await
    }

    fn handle_for(&self, tab_id: &TabId) -> Result<Arc<dyn ProviderSession>> {
        self.sessions
            .lock()
            .get(tab_id)
            .map(|s| Arc::clone(&s.handle))
            .ok_or_else(|| RuntimeError::NoSession(tab_id.to_string()))
    }
}

/// Translate provider callbacks into effects and tool dispatch.
async fn translate_events(
    opts: StartOptions,
    handle: Arc<dyn ProviderSession>,
    tracker: Arc<Mutex<ToolCallTracker>>,
    mut events: mpsc::Receiver<ProviderEvent>,
    effects: mpsc::Sender<SessionEffect>,
) {
    let StartOptions {
        tab_id,
        initial_context,
        router,
        ..
    } = opts;
    let mut initial_context = Some(initial_context);

    while let Some(event) = events.recv().await {
        match event {
            ProviderEvent::Connected => {
                // First contextual update, and only now that we are
                // connected. Without it the model does not know the page.
                if let Some(context) = initial_context.take() {
                    if let Err(e) = handle.send_contextual_update(context).await {
                        warn!(tab_id = %tab_id, error = %e, "initial context push failed");
                    }
                }
                let _ = effects.send(SessionEffect::Widget(WidgetState::Listening)).await;
            }
            ProviderEvent::Speaking(speaking) => {
                let state = if speaking {
                    WidgetState::Speaking
                } else {
                    WidgetState::Listening
                };
                let _ = effects.send(SessionEffect::Widget(state)).await;
            }
            ProviderEvent::Transcript { from_user, text } => {
                let _ = effects
                    .send(SessionEffect::Transcript(TranscriptEntry {
                        from_user,
                        text,
                        at: chrono::Utc::now(),
                    }))
                    .await;
            }
            ProviderEvent::ToolCall {
                call_id,
                tool_name,
                parameters,
            } => {
                dispatch_tool_call(
                    &tab_id,
                    &router,
                    &tracker,
                    Arc::clone(&handle),
                    call_id,
                    tool_name,
                    parameters,
                );
            }
            ProviderEvent::Error(message) => {
                warn!(tab_id = %tab_id, error = %message, "provider error");
                let _ = effects
                    .send(SessionEffect::Widget(WidgetState::Error(message)))
                    .await;
            }
            ProviderEvent::Closed { reason } => {
                debug!(tab_id = %tab_id, reason, "provider closed session");
                let _ = effects.send(SessionEffect::Widget(WidgetState::Ended)).await;
                break;
            }
        }
    }
}

/// Route one tool call and feed the result back as a contextual update.
///
/// Two tasks: the dispatch task resolves the tracker, the feeder waits on
/// the tracker's receiver. `cancel_all` on session end closes the receiver
/// so a late result is dropped instead of reaching the provider.
fn dispatch_tool_call(
    tab_id: &TabId,
    router: &ToolRouter,
    tracker: &Arc<Mutex<ToolCallTracker>>,
    handle: Arc<dyn ProviderSession>,
    call_id: CallId,
    tool_name: String,
    parameters: serde_json::Value,
) {
    let waiter = tracker.lock().register(&call_id);
    let request = ToolCallRequest {
        tool_name,
        call_id: call_id.clone(),
        parameters,
        origin_tab_id: tab_id.clone(),
    };

    let router = router.clone();
    let dispatch_tracker = Arc::clone(tracker);
    let dispatch_id = call_id.clone();
    let _dispatch = tokio::spawn(async move {
        let envelope = match router.call(request).await {
            Ok(response) => response.envelope,
            Err(ToolError::ChannelClosed) => ToolEnvelope::err("tab closed before response"),
            Err(e) => ToolEnvelope::err(e.to_string()),
        };
        let _ = dispatch_tracker.lock().resolve(&dispatch_id, envelope);
    });

    let tab = tab_id.clone();
    let _feed = tokio::spawn(async move {
        match waiter.await {
            Ok(envelope) => {
                let update = json!({
                    "toolResult": {
                        "callId": call_id.as_str(),
                        "result": envelope,
                    }
                })
                .to_string();
                if let Err(e) = handle.send_contextual_update(update).await {
                    warn!(tab_id = %tab, call_id = %call_id, error = %e, "tool result push failed");
                }
            }
            Err(_) => {
                debug!(tab_id = %tab, call_id = %call_id, "tool call cancelled");
            }
        }
    });
}

//! Halo backend: call lifecycle, escalation, signaling relay, and push.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `metrics` | Prometheus recorder install and rendering |
//! | `registry` | Live session map over the write-behind store |
//! | `escalation` | AI→human hand-off coordinator, end-of-call |
//! | `signaling` | Socket directory, room relay, WebSocket transport |
//! | `push` | APNS-style delivery and the notification trigger |
//! | `http` | REST surface, tokens, error mapping |
//! | `state` | Shared per-request application state |
//!
//! ## Data Flow
//!
//! `http` routes mutate the `registry` through the `escalation`
//! coordinator; mutations mirror to the durable store via the write-behind
//! queue and fan out to the room via `signaling`. Hand-offs reach operator
//! devices through `push`.

pub mod escalation;
pub mod http;
pub mod metrics;
pub mod push;
pub mod registry;
pub mod signaling;
pub mod state;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use state::AppState;

/// Build the full HTTP + WebSocket router over a wired state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(http::routes::health))
        .route("/calls/start", post(http::routes::start_call))
        .route("/calls/escalate", post(http::routes::escalate_call))
        .route("/calls/accept", post(http::routes::accept_call))
        .route("/calls/end", post(http::routes::end_call))
        .route("/calls/active", get(http::routes::active_calls))
        .route("/devices/register", post(http::routes::register_device))
        .route("/devices/unregister", post(http::routes::unregister_device))
        .route("/signaling", get(signaling::ws::signaling_handler))
        .layer(TraceLayer::new_for_http())
        // The extension calls from page origins, so the surface stays open.
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Wire the state graph from settings, an opened store, and the
/// collaborator services.
pub fn build_state(
    settings: Arc<halo_settings::HaloSettings>,
    store: Arc<halo_store::CallStore>,
    queue: halo_store::WriteBehindQueue,
    ownership: Arc<dyn escalation::DomainOwnership>,
    presence: Arc<dyn escalation::Presence>,
    delivery: Arc<dyn push::NotificationDelivery>,
) -> AppState {
    let registry = Arc::new(registry::SessionRegistry::new(queue));
    let trigger = Arc::new(push::NotificationTrigger::new(
        Arc::clone(&store),
        delivery,
    ));
    let coordinator = Arc::new(escalation::EscalationCoordinator::new(
        Arc::clone(&registry),
        Arc::clone(&store),
        ownership,
        presence,
        trigger,
    ));
    let directory = Arc::new(signaling::SocketDirectory::new(
        settings.signaling.max_send_failures,
    ));
    let relay = Arc::new(signaling::SignalingRelay::new(
        Arc::clone(&registry),
        directory,
    ));
    let tokens = Arc::new(http::auth::TokenIssuer::from_settings(&settings.auth));
    AppState {
        settings,
        registry,
        store,
        coordinator,
        relay,
        tokens,
    }
}

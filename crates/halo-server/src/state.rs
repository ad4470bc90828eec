//! Shared application state handed to every handler.

use std::sync::Arc;

use halo_settings::HaloSettings;
use halo_store::CallStore;

use crate::escalation::EscalationCoordinator;
use crate::http::auth::TokenIssuer;
use crate::registry::SessionRegistry;
use crate::signaling::SignalingRelay;

/// Everything a request handler can reach. Cheap to clone; all fields
/// are shared handles.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<HaloSettings>,
    pub registry: Arc<SessionRegistry>,
    pub store: Arc<CallStore>,
    pub coordinator: Arc<EscalationCoordinator>,
    pub relay: Arc<SignalingRelay>,
    pub tokens: Arc<TokenIssuer>,
}

//! REST surface for the call lifecycle.
//!
//! | Route | Auth | Purpose |
//! |-------|------|---------|
//! | `POST /calls/start` | none | create a session, mint its call token |
//! | `POST /calls/escalate` | call token | request AI→human hand-off |
//! | `POST /calls/accept` | operator | operator takes the call |
//! | `POST /calls/end` | call token or operator | end the call from any state |
//! | `GET /calls/active` | operator | list live calls |
//! | `POST /devices/register` | operator | register a push token |
//! | `POST /devices/unregister` | operator | remove a push token |
//! | `GET /health` | none | liveness probe |

use axum::extract::{Query, State};
use axum::http::request::Parts;
use axum::Json;
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, instrument};

use halo_core::audit::{CallEvent, CallEventKind};
use halo_core::call::{CallSession, CallSessionPatch, CallStatus};
use halo_core::errors::HaloError;
use halo_core::ids::{OperatorId, SessionId, UserId};

use crate::state::AppState;

use super::auth::{bearer_token, OperatorAuth};
use super::error::{ApiError, ApiResult};

// ─────────────────────────────────────────────────────────────────────────────
// POST /calls/start
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartCallRequest {
    pub domain: String,
    pub user_id: UserId,
    pub page_url: String,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartCallResponse {
    pub session_id: SessionId,
    pub token: String,
    pub status: CallStatus,
}

#[instrument(skip(state, req), fields(domain = %req.domain))]
pub async fn start_call(
    State(state): State<AppState>,
    Json(req): Json<StartCallRequest>,
) -> ApiResult<Json<StartCallResponse>> {
    if req.domain.is_empty() {
        return Err(HaloError::Conflict("domain must not be empty".into()).into());
    }
    let metadata = if req.metadata.is_null() {
        json!({})
    } else {
        req.metadata
    };
    let session = CallSession::new(
        SessionId::generate(),
        req.user_id.clone(),
        &req.domain,
        &req.page_url,
        metadata,
    );
    let session_id = session.session_id.clone();
    let status = session.status;

    state.registry.create(session)?;
    state.registry.audit(CallEvent::now(
        session_id.clone(),
        CallEventKind::CallStarted,
        json!({ "userId": req.user_id.as_str(), "domain": req.domain }),
    ));

    let token = state
        .tokens
        .issue_call_token(&session_id, &req.user_id, &req.domain)?;

    counter!("halo_calls_started_total").increment(1);
    info!(session_id = %session_id, "call started");
    Ok(Json(StartCallResponse {
        session_id,
        token,
        status,
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// POST /calls/escalate
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalateRequest {
    pub session_id: SessionId,
    pub reason: String,
    /// Replacement session metadata, recorded at hand-off time.
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalateResponse {
    pub success: bool,
    pub owner_id: OperatorId,
    pub owner_online: bool,
}

pub async fn escalate_call(
    State(state): State<AppState>,
    parts: Parts,
    Json(req): Json<EscalateRequest>,
) -> ApiResult<Json<EscalateResponse>> {
    let token = bearer_token(&parts)?;
    let _ = state.tokens.verify_call_token(token, &req.session_id)?;

    if let Some(metadata) = req.metadata {
        let _ = state.registry.update(
            &req.session_id,
            CallSessionPatch {
                metadata: Some(metadata),
                ..CallSessionPatch::default()
            },
        )?;
    }
    let outcome = state.coordinator.escalate(&req.session_id, &req.reason).await?;
    Ok(Json(EscalateResponse {
        success: true,
        owner_id: outcome.owner_id,
        owner_online: outcome.owner_online,
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// POST /calls/accept
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptRequest {
    pub session_id: SessionId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptResponse {
    pub success: bool,
    pub session: CallSession,
}

pub async fn accept_call(
    State(state): State<AppState>,
    OperatorAuth(operator_id): OperatorAuth,
    Json(req): Json<AcceptRequest>,
) -> ApiResult<Json<AcceptResponse>> {
    let session = state
        .coordinator
        .accept(&req.session_id, &operator_id)
        .await?;
    Ok(Json(AcceptResponse {
        success: true,
        session,
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// POST /calls/end
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndRequest {
    pub session_id: SessionId,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub duration_secs: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndResponse {
    pub success: bool,
}

pub async fn end_call(
    State(state): State<AppState>,
    parts: Parts,
    Json(req): Json<EndRequest>,
) -> ApiResult<Json<EndResponse>> {
    // Either side of the call may end it.
    let token = bearer_token(&parts)?;
    let authorized = state
        .tokens
        .verify_call_token(token, &req.session_id)
        .map(|_| ())
        .or_else(|_| state.tokens.verify_operator_token(token).map(|_| ()));
    authorized?;

    let reason = req.reason.as_deref().unwrap_or("ended");
    state
        .coordinator
        .end(&req.session_id, reason, req.duration_secs)
        .await?;

    // Room teardown is advisory; the call is already over.
    state
        .relay
        .broadcast_call_ended(&req.session_id, req.reason.clone())
        .await;

    Ok(Json(EndResponse { success: true }))
}

// ─────────────────────────────────────────────────────────────────────────────
// GET /calls/active
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveQuery {
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveResponse {
    pub calls: Vec<CallSession>,
    pub total: usize,
}

pub async fn active_calls(
    State(state): State<AppState>,
    OperatorAuth(_operator_id): OperatorAuth,
    Query(query): Query<ActiveQuery>,
) -> ApiResult<Json<ActiveResponse>> {
    let max = state.settings.server.max_list_limit;
    let limit = query.limit.unwrap_or(max).min(max) as usize;
    let (calls, total) = state.registry.active(query.domain.as_deref(), limit);
    Ok(Json(ActiveResponse { calls, total }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Device tokens
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDeviceRequest {
    pub token: String,
    #[serde(default)]
    pub environment: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnregisterDeviceRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceResponse {
    pub success: bool,
}

pub async fn register_device(
    State(state): State<AppState>,
    OperatorAuth(operator_id): OperatorAuth,
    Json(req): Json<RegisterDeviceRequest>,
) -> ApiResult<Json<DeviceResponse>> {
    if req.token.is_empty() {
        return Err(HaloError::Conflict("token must not be empty".into()).into());
    }
    let environment = req.environment.unwrap_or_else(|| "production".to_owned());
    let store = std::sync::Arc::clone(&state.store);
    tokio::task::spawn_blocking(move || {
        store.register_device_token(&req.token, operator_id.as_str(), &environment)
    })
    .await
    .map_err(|e| ApiError(HaloError::Internal(format!("store task failed: {e}"))))?
    .map_err(|e| ApiError(HaloError::upstream_retryable(format!("store write failed: {e}"))))?;
    Ok(Json(DeviceResponse { success: true }))
}

pub async fn unregister_device(
    State(state): State<AppState>,
    OperatorAuth(_operator_id): OperatorAuth,
    Json(req): Json<UnregisterDeviceRequest>,
) -> ApiResult<Json<DeviceResponse>> {
    let store = std::sync::Arc::clone(&state.store);
    let existed = tokio::task::spawn_blocking(move || store.unregister_device_token(&req.token))
        .await
        .map_err(|e| ApiError(HaloError::Internal(format!("store task failed: {e}"))))?
        .map_err(|e| ApiError(HaloError::upstream_retryable(format!("store write failed: {e}"))))?;
    Ok(Json(DeviceResponse { success: existed }))
}

// ─────────────────────────────────────────────────────────────────────────────
// GET /health
// ─────────────────────────────────────────────────────────────────────────────

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "liveSessions": state.registry.len(),
        "signalingSockets": state.relay.directory().connection_count(),
    }))
}

//! Call-token issuance and request authentication.
//!
//! Two HS256 token scopes share one signing secret:
//!
//! * `call` — minted by `POST /calls/start`, scoped to one session. The
//!   tab presents it on escalate/end for that session only.
//! * `operator` — presented by owner devices on accept, list, and device
//!   token routes. Minting these is the device-link flow's job; this
//!   module only verifies.
//!
//! An empty configured secret gets replaced by a random one at boot, so
//! tokens simply stop verifying across a restart instead of the server
//! running unsigned.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use halo_core::errors::{HaloError, Result};
use halo_core::ids::{OperatorId, SessionId, UserId};
use halo_settings::types::AuthSettings;

use crate::state::AppState;

use super::error::ApiError;

/// Claims carried by a per-session call token.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CallClaims {
    /// End-user the token was minted for.
    pub sub: String,
    /// Session the token is scoped to.
    pub sid: String,
    /// Domain the session runs on.
    pub dom: String,
    /// Token scope tag.
    pub scope: String,
    pub iat: u64,
    pub exp: u64,
}

/// Claims carried by an operator token.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OperatorClaims {
    /// Operator identity.
    pub sub: String,
    /// Token scope tag.
    pub scope: String,
    pub iat: u64,
    pub exp: u64,
}

/// Mints and verifies both token scopes.
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: u64,
}

impl TokenIssuer {
    pub fn from_settings(settings: &AuthSettings) -> Self {
        let secret = if settings.secret.is_empty() {
            // Ephemeral per-process secret.
            format!("{}{}", Uuid::now_v7().simple(), Uuid::now_v7().simple())
        } else {
            settings.secret.clone()
        };
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs: settings.token_ttl_secs,
        }
    }

    /// Mint the session-scoped token returned by `POST /calls/start`.
    pub fn issue_call_token(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
        domain: &str,
    ) -> Result<String> {
        let now = now_secs();
        let claims = CallClaims {
            sub: user_id.as_str().to_owned(),
            sid: session_id.as_str().to_owned(),
            dom: domain.to_owned(),
            scope: "call".to_owned(),
            iat: now,
            exp: now + self.ttl_secs,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| HaloError::Internal(format!("token signing failed: {e}")))
    }

    /// Verify a call token and check it is scoped to `session_id`.
    pub fn verify_call_token(&self, token: &str, session_id: &SessionId) -> Result<CallClaims> {
        let claims = decode::<CallClaims>(token, &self.decoding, &Validation::default())
            .map_err(|e| HaloError::Unauthorized(format!("invalid call token: {e}")))?
            .claims;
        if claims.scope != "call" {
            return Err(HaloError::Unauthorized("wrong token scope".into()));
        }
        if claims.sid != session_id.as_str() {
            return Err(HaloError::Forbidden(
                "token is for a different session".into(),
            ));
        }
        Ok(claims)
    }

    /// Mint an operator token. Used by the device-link flow and by tests.
    pub fn issue_operator_token(&self, operator_id: &OperatorId) -> Result<String> {
        let now = now_secs();
        let claims = OperatorClaims {
            sub: operator_id.as_str().to_owned(),
            scope: "operator".to_owned(),
            iat: now,
            exp: now + self.ttl_secs,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| HaloError::Internal(format!("token signing failed: {e}")))
    }

    pub fn verify_operator_token(&self, token: &str) -> Result<OperatorClaims> {
        let claims = decode::<OperatorClaims>(token, &self.decoding, &Validation::default())
            .map_err(|e| HaloError::Unauthorized(format!("invalid operator token: {e}")))?
            .claims;
        if claims.scope != "operator" {
            return Err(HaloError::Unauthorized("wrong token scope".into()));
        }
        Ok(claims)
    }
}

fn now_secs() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Pull the bearer token out of the `Authorization` header.
pub fn bearer_token(parts: &Parts) -> Result<&str> {
    let header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or_else(|| HaloError::Unauthorized("missing Authorization header".into()))?;
    let value = header
        .to_str()
        .map_err(|_| HaloError::Unauthorized("malformed Authorization header".into()))?;
    value
        .strip_prefix("Bearer ")
        .ok_or_else(|| HaloError::Unauthorized("expected a bearer token".into()))
}

/// Extractor for operator-authenticated routes.
pub struct OperatorAuth(pub OperatorId);

impl FromRequestParts<AppState> for OperatorAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let claims = state.tokens.verify_operator_token(token)?;
        Ok(OperatorAuth(OperatorId::new(claims.sub)))
    }
}

/// Extractor for routes authenticated by a per-session call token. The
/// session check happens later, once the handler knows which session the
/// body names; this only proves the scope.
pub struct CallAuth(pub String);

impl FromRequestParts<AppState> for CallAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        Ok(CallAuth(token.to_owned()))
    }
}

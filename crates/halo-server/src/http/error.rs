//! `HaloError` → HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use metrics::counter;
use serde_json::json;
use tracing::warn;

use halo_core::errors::HaloError;

/// Newtype so the shared error taxonomy can become an axum response.
pub struct ApiError(pub HaloError);

/// Handler result alias.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl From<HaloError> for ApiError {
    fn from(e: HaloError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            HaloError::NotFound(_) => StatusCode::NOT_FOUND,
            HaloError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            HaloError::Forbidden(_) => StatusCode::FORBIDDEN,
            HaloError::Conflict(_) => StatusCode::CONFLICT,
            HaloError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            HaloError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            HaloError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let class = self.0.class();
        counter!("halo_http_errors_total", "class" => class).increment(1);
        if status.is_server_error() {
            warn!(class, error = %self.0, "request failed");
        }
        let body = json!({
            "error": {
                "class": class,
                "message": self.0.to_string(),
                "retryable": self.0.is_retryable(),
            }
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_expected_statuses() {
        let cases = [
            (HaloError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (HaloError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (HaloError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (HaloError::Conflict("x".into()), StatusCode::CONFLICT),
            (HaloError::upstream_retryable("x"), StatusCode::BAD_GATEWAY),
            (HaloError::Timeout("x".into()), StatusCode::GATEWAY_TIMEOUT),
            (
                HaloError::Internal("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(ApiError(error).status(), expected);
        }
    }
}

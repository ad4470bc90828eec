//! Tool-call protocol types.
//!
//! A tool call is a structured request from the AI model to perform a
//! browser action: a name, a provider-issued correlation ID echoed verbatim,
//! and JSON parameters. Handlers return a uniform envelope — `{success, …}`
//! on success, `{success: false, error}` on failure — so a malformed call
//! can never crash the session or leave the model waiting with no feedback.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::{CallId, TabId};

/// An inbound tool invocation, correlated by the provider's call ID.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRequest {
    /// Tool name, resolved against the dispatcher's namespace.
    pub tool_name: String,
    /// Provider-issued correlation ID, echoed verbatim in the response.
    pub call_id: CallId,
    /// Tool parameters, opaque to the router.
    #[serde(default)]
    pub parameters: Value,
    /// Tab whose DOM the tool should act on.
    pub origin_tab_id: TabId,
}

/// The response paired with a [`ToolCallRequest`].
///
/// At most one response is delivered per call ID.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResponse {
    /// The request's correlation ID, echoed verbatim.
    pub call_id: CallId,
    /// The handler's result envelope.
    pub envelope: ToolEnvelope,
}

/// Uniform handler result shape.
///
/// Successful envelopes carry arbitrary result fields flattened alongside
/// `success: true`. Failures carry `success: false` and an `error` message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolEnvelope {
    /// Whether the handler succeeded.
    pub success: bool,
    /// Failure description. Present iff `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Result fields, flattened into the envelope on the wire.
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl ToolEnvelope {
    /// A bare success with no result fields.
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            data: Map::new(),
        }
    }

    /// A success carrying result fields.
    ///
    /// Non-object values are nested under a `"result"` key so the envelope
    /// shape stays uniform.
    pub fn ok_with(data: Value) -> Self {
        let data = match data {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                let _ = map.insert("result".to_owned(), other);
                map
            }
        };
        Self {
            success: true,
            error: None,
            data,
        }
    }

    /// A failure with a message.
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            data: Map::new(),
        }
    }

    /// Whether this envelope reports failure.
    pub fn is_err(&self) -> bool {
        !self.success
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

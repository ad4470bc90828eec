//! Row structs returned by the repositories.
//!
//! These mirror table columns one-to-one. Conversion into domain types
//! (e.g. [`halo_core::call::CallSession`]) happens in `store.rs` so the
//! repositories stay purely about SQL.

use serde::{Deserialize, Serialize};

/// One row of the `sessions` mirror table.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionRow {
    pub id: String,
    pub user_id: String,
    pub owner_id: Option<String>,
    pub domain: String,
    pub page_url: String,
    pub status: String,
    pub started_at: String,
    pub escalated_at: Option<String>,
    pub ai_ended_at: Option<String>,
    pub ended_at: Option<String>,
    pub end_reason: Option<String>,
    pub duration_secs: Option<i64>,
    /// JSON object, stored as text.
    pub metadata: String,
}

/// One row of the `call_events` audit table.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CallEventRow {
    pub id: String,
    pub session_id: String,
    pub kind: String,
    pub timestamp: String,
    /// JSON object, stored as text.
    pub data: String,
}

/// One row of the `device_tokens` table.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeviceTokenRow {
    pub token: String,
    pub owner_id: String,
    pub environment: String,
    pub active: bool,
    pub created_at: String,
    pub last_seen_at: String,
}

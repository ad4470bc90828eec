//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` to match the JSON wire
//! format the dashboard and extension read. Each type implements [`Default`]
//! with production values; `#[serde(default)]` makes every file partial —
//! missing fields get defaults during deserialization.

use serde::{Deserialize, Serialize};

/// Root settings type for Halo.
///
/// Loaded from `~/.halo/settings.json` with defaults applied for missing
/// fields. `HALO_*` environment variables override specific values.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HaloSettings {
    /// Settings schema version.
    pub version: String,
    /// Backend network settings.
    pub server: ServerSettings,
    /// Signaling relay settings.
    pub signaling: SignalingSettings,
    /// Push notification delivery settings.
    pub push: PushSettings,
    /// Call-token issuance settings.
    pub auth: AuthSettings,
    /// Durable store settings.
    pub store: StoreSettings,
    /// Extension-runtime session settings.
    pub runtime: RuntimeSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Default for HaloSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            server: ServerSettings::default(),
            signaling: SignalingSettings::default(),
            push: PushSettings::default(),
            auth: AuthSettings::default(),
            store: StoreSettings::default(),
            runtime: RuntimeSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl HaloSettings {
    /// Correct invalid values in place rather than rejecting the file.
    ///
    /// Called automatically during loading; users get corrected behavior
    /// plus a warning instead of a confusing startup error.
    pub fn validate(&mut self) {
        if self.signaling.max_send_failures == 0 {
            tracing::warn!("signaling.maxSendFailures may not be 0, using 1");
            self.signaling.max_send_failures = 1;
        }
        if self.auth.token_ttl_secs == 0 {
            tracing::warn!("auth.tokenTtlSecs may not be 0, using default");
            self.auth.token_ttl_secs = AuthSettings::default().token_ttl_secs;
        }
        if self.store.write_queue_depth == 0 {
            tracing::warn!("store.writeQueueDepth may not be 0, using default");
            self.store.write_queue_depth = StoreSettings::default().write_queue_depth;
        }
    }
}

/// Backend HTTP/WebSocket bind settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// HTTP + WebSocket port.
    pub port: u16,
    /// Maximum `limit` accepted by `GET /calls/active`.
    pub max_list_limit: u32,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8790,
            max_list_limit: 200,
        }
    }
}

/// Signaling relay tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignalingSettings {
    /// Per-socket outbound buffer (messages).
    pub send_buffer: usize,
    /// Total lifetime send failures before a slow socket is dropped.
    pub max_send_failures: u64,
}

impl Default for SignalingSettings {
    fn default() -> Self {
        Self {
            send_buffer: 64,
            max_send_failures: 100,
        }
    }
}

/// Push delivery (APNS-style HTTP/2 + ES256 JWT) settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PushSettings {
    /// Whether push delivery is enabled at all.
    pub enabled: bool,
    /// Signing key ID.
    pub key_id: String,
    /// Team ID (JWT issuer).
    pub team_id: String,
    /// App bundle ID (push topic).
    pub bundle_id: String,
    /// `sandbox` or `production`.
    pub environment: String,
    /// Path to the `.p8` signing key. `None` means `~/.halo/push.p8`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_path: Option<String>,
}

/// Call-token issuance settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// Lifetime of tokens minted by `POST /calls/start`, in seconds.
    pub token_ttl_secs: u64,
    /// HS256 signing secret. Empty means generate an ephemeral one at boot
    /// (tokens won't survive a restart, which is fine for single-process).
    pub secret: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            token_ttl_secs: 15 * 60,
            secret: String::new(),
        }
    }
}

/// Durable store settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// SQLite database path. `None` means `~/.halo/halo.db`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
    /// Audit-trail retention window, in days.
    pub retention_days: u32,
    /// Write-behind queue depth (ops).
    pub write_queue_depth: usize,
    /// Per-op retry attempts before the write is declared lost.
    pub write_retries: u32,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            db_path: None,
            retention_days: 90,
            write_queue_depth: 1024,
            write_retries: 3,
        }
    }
}

/// Extension-runtime session settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeSettings {
    /// Max bytes of page context pushed as the first contextual update.
    pub max_context_bytes: usize,
    /// Backend base URL the extension talks to.
    pub backend_url: String,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            max_context_bytes: 16 * 1024,
            backend_url: "http://127.0.0.1:8790".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default tracing filter directive.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

//! Concrete collaborator services wired by the binary.
//!
//! Self-hosted deployments declare domain ownership on the command line
//! (`--owner shop.example.com=op_1`), and presence is inferred from the
//! device-token table: an operator with at least one active token is
//! reachable. A hosted platform would swap these for service-backed
//! implementations of the same traits.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use halo_core::errors::{HaloError, Result};
use halo_core::ids::OperatorId;
use halo_core::notify::NotificationEvent;
use halo_server::escalation::{DomainOwnership, OwnershipRecord, Presence, PresenceStatus};
use halo_server::push::{NotificationDelivery, PushSendResult};
use halo_store::CallStore;

/// Ownership from a static domain→operator map.
pub struct StaticOwnership {
    owners: HashMap<String, OperatorId>,
}

impl StaticOwnership {
    pub fn new(owners: HashMap<String, OperatorId>) -> Self {
        Self { owners }
    }

    /// Parse one `domain=operator` CLI argument.
    pub fn parse_entry(entry: &str) -> anyhow::Result<(String, OperatorId)> {
        let (domain, operator) = entry
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("expected domain=operator, got {entry:?}"))?;
        if domain.is_empty() || operator.is_empty() {
            anyhow::bail!("expected domain=operator, got {entry:?}");
        }
        Ok((domain.to_owned(), OperatorId::new(operator)))
    }
}

#[async_trait]
impl DomainOwnership for StaticOwnership {
    async fn verify(&self, domain: &str) -> Result<Option<OwnershipRecord>> {
        Ok(self.owners.get(domain).map(|owner_id| OwnershipRecord {
            owner_id: owner_id.clone(),
            verified: true,
        }))
    }
}

/// Presence inferred from active device tokens: an operator with a
/// registered, valid token is treated as online and accepting.
pub struct DeviceTokenPresence {
    store: Arc<CallStore>,
}

impl DeviceTokenPresence {
    pub fn new(store: Arc<CallStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Presence for DeviceTokenPresence {
    async fn get(&self, owner_id: &OperatorId) -> Result<PresenceStatus> {
        let store = Arc::clone(&self.store);
        let owner = owner_id.as_str().to_owned();
        let tokens = tokio::task::spawn_blocking(move || store.active_device_tokens(&owner))
            .await
            .map_err(|e| HaloError::Internal(format!("presence task failed: {e}")))?
            .map_err(|e| HaloError::upstream_retryable(format!("presence lookup failed: {e}")))?;
        let online = !tokens.is_empty();
        Ok(PresenceStatus {
            online,
            accepting_calls: online,
        })
    }
}

/// Delivery stand-in used when push is disabled: logs instead of sending.
pub struct LogOnlyDelivery;

#[async_trait]
impl NotificationDelivery for LogOnlyDelivery {
    async fn send(&self, tokens: &[String], event: &NotificationEvent) -> Vec<PushSendResult> {
        info!(
            owner_id = %event.owner_id,
            kind = ?event.kind,
            tokens = tokens.len(),
            "push disabled, notification not sent"
        );
        tokens
            .iter()
            .map(|t| PushSendResult {
                token: t.clone(),
                success: true,
                status_code: None,
                reason: None,
                permanent_failure: false,
                error: None,
            })
            .collect()
    }
}

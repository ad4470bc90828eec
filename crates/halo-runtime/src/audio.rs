//! Audio collaborator seam.
//!
//! The runtime does not touch capture or playback devices directly; it
//! asks an [`AudioBridge`] to wire the tab's stream to the provider and
//! to release it on teardown.

use async_trait::async_trait;

use halo_core::ids::TabId;

use crate::errors::Result;

/// Wires a tab's audio stream to the live conversation.
#[async_trait]
pub trait AudioBridge: Send + Sync {
    /// Attach capture and playback for the tab. Fails if the user denied
    /// the microphone or the device is busy.
    async fn attach(&self, tab_id: &TabId) -> Result<()>;

    /// Release the tab's stream. Must not fail teardown; implementations
    /// swallow and log their own errors.
    async fn release(&self, tab_id: &TabId);
}

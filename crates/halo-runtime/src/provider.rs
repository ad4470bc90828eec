//! Conversational-AI provider seam.
//!
//! The runtime never talks to a concrete vendor; it holds a
//! [`ConversationProvider`] that mints live sessions and a
//! [`ProviderSession`] handle per conversation. Provider callbacks arrive
//! on a channel as [`ProviderEvent`]s, which the manager translates into
//! widget state, transcript entries, and tool dispatch.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use halo_core::ids::CallId;

use crate::errors::Result;

/// What kind of page the conversation starts on. Credentials are scoped
/// to the category, not the exact URL.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageCategory {
    /// Checkout and payment flows.
    Checkout,
    /// Product and catalog pages.
    Product,
    /// Help and support pages.
    Support,
    /// Anything else.
    General,
}

impl PageCategory {
    /// Coarse path-based detection. The page itself can override via
    /// metadata; this is the fallback.
    pub fn detect(page_url: &str) -> Self {
        let lower = page_url.to_ascii_lowercase();
        if lower.contains("/checkout") || lower.contains("/cart") || lower.contains("/payment") {
            Self::Checkout
        } else if lower.contains("/product") || lower.contains("/item") || lower.contains("/p/") {
            Self::Product
        } else if lower.contains("/support") || lower.contains("/help") || lower.contains("/faq") {
            Self::Support
        } else {
            Self::General
        }
    }

    /// Stable label used in credential scopes and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Checkout => "checkout",
            Self::Product => "product",
            Self::Support => "support",
            Self::General => "general",
        }
    }
}

/// A short-lived credential for one provider session.
#[derive(Clone, Debug)]
pub struct ProviderCredential {
    /// Opaque token handed to the provider.
    pub token: String,
    /// Category the token is scoped to.
    pub category: PageCategory,
    /// Expiry, for logging only; the provider enforces it.
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

/// Mints short-lived provider credentials.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Fetch a credential scoped to the page's category.
    async fn fetch(&self, category: PageCategory) -> Result<ProviderCredential>;
}

/// One callback from the live provider connection.
#[derive(Clone, Debug)]
pub enum ProviderEvent {
    /// The session is connected and ready for contextual updates.
    Connected,
    /// The model started or stopped speaking.
    Speaking(bool),
    /// A finalized transcript line.
    Transcript {
        /// True for the end user's speech, false for the agent's.
        from_user: bool,
        text: String,
    },
    /// The model requested a tool invocation.
    ToolCall {
        call_id: CallId,
        tool_name: String,
        parameters: Value,
    },
    /// The provider reported a non-fatal error.
    Error(String),
    /// The provider closed the session.
    Closed { reason: String },
}

/// Live handle to one provider conversation.
#[async_trait]
pub trait ProviderSession: Send + Sync {
    /// Close the conversation. Idempotent.
    async fn end_session(&self) -> Result<()>;

    /// Push out-of-band context (page state, tool results).
    async fn send_contextual_update(&self, text: String) -> Result<()>;

    /// Inject a typed user message into the conversation.
    async fn send_user_message(&self, text: String) -> Result<()>;

    /// Playback volume, 0.0 to 1.0.
    async fn set_volume(&self, volume: f32) -> Result<()>;

    /// Mute or unmute the user's microphone.
    async fn set_mic_muted(&self, muted: bool) -> Result<()>;
}

/// Mints live conversations.
#[async_trait]
pub trait ConversationProvider: Send + Sync {
    /// Open a session; callbacks flow to `events` until `Closed`.
    async fn start_session(
        &self,
        credential: ProviderCredential,
        events: mpsc::Sender<ProviderEvent>,
    ) -> Result<Box<dyn ProviderSession>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_detection_from_path() {
        assert_eq!(
            PageCategory::detect("https://shop.example.com/checkout/step2"),
            PageCategory::Checkout
        );
        assert_eq!(
            PageCategory::detect("https://shop.example.com/product/widget-9"),
            PageCategory::Product
        );
        assert_eq!(
            PageCategory::detect("https://shop.example.com/help"),
            PageCategory::Support
        );
        assert_eq!(
            PageCategory::detect("https://shop.example.com/about"),
            PageCategory::General
        );
    }

    #[test]
    fn category_labels_are_stable() {
        assert_eq!(PageCategory::Checkout.as_str(), "checkout");
        assert_eq!(PageCategory::General.as_str(), "general");
    }
}

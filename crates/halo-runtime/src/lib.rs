//! Conversation runtime — one live AI conversation per browser tab.
//!
//! | Module      | Purpose                                             |
//! |-------------|-----------------------------------------------------|
//! | [`provider`]| conversational-AI provider seam, page categories    |
//! | [`audio`]   | audio collaborator seam                             |
//! | [`tracker`] | pending tool-call correlation via oneshot channels  |
//! | [`manager`] | per-tab session lifecycle and effect translation    |

pub mod audio;
pub mod errors;
pub mod manager;
pub mod provider;
pub mod tracker;

pub use audio::AudioBridge;
pub use errors::{Result, RuntimeError};
pub use manager::{
    ConversationSessionManager, SessionEffect, StartOptions, TranscriptEntry, WidgetState,
};
pub use provider::{
    ConversationProvider, CredentialSource, PageCategory, ProviderCredential, ProviderEvent,
    ProviderSession,
};
pub use tracker::ToolCallTracker;

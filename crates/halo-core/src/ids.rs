//! Branded ID newtypes.
//!
//! Every entity in Halo is addressed by a string ID with a recognizable
//! prefix (`sess_`, `sock_`, …). Newtypes keep a session ID from being
//! passed where a socket ID is expected; the inner string is the wire form.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh ID with the type's prefix and a UUIDv7 suffix.
            pub fn generate() -> Self {
                Self(format!(concat!($prefix, "_{}"), Uuid::now_v7()))
            }

            /// Wrap an existing ID string without validation.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// The inner string form.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

branded_id!(
    /// One end-to-end call, spanning the AI-handled and human-handled phases.
    SessionId,
    "sess"
);

branded_id!(
    /// One open signaling socket (a browser participant's connection).
    SocketId,
    "sock"
);

branded_id!(
    /// Provider-issued tool-call correlation ID, echoed verbatim.
    CallId,
    "call"
);

branded_id!(
    /// A human operator (domain owner) who can accept escalations.
    OperatorId,
    "op"
);

branded_id!(
    /// The end user on whose page the agent is running.
    UserId,
    "user"
);

branded_id!(
    /// A browser tab hosting at most one conversation session.
    TabId,
    "tab"
);

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

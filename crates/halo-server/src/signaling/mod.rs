//! Real-time signaling: socket directory, relay, and WebSocket transport.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `directory` | Connected sockets, per-socket outbound buffers, room fan-out |
//! | `relay` | Room membership rules, verbatim offer/answer/ICE relay |
//! | `ws` | WebSocket upgrade, per-socket read/write loops |
//!
//! ## Data Flow
//!
//! `ws` read loop → `relay` (membership + routing) → `directory` fan-out →
//! `ws` write loops of the other sockets in the room.

pub mod directory;
pub mod relay;
pub mod ws;

pub use directory::{SocketConnection, SocketDirectory, SocketIdentity};
pub use relay::SignalingRelay;

//! Operator push notifications.
//!
//! | Module     | Purpose                                             |
//! |------------|-----------------------------------------------------|
//! | `delivery` | HTTP/2 push transport (ES256 JWT), per-token results|
//! | `trigger`  | dedupe, pending-clear on accept, stale-token pruning|

pub mod delivery;
pub mod trigger;

pub use delivery::{ApnsDelivery, NotificationDelivery, PushSendResult};
pub use trigger::NotificationTrigger;

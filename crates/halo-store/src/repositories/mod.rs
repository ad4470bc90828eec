//! Stateless repositories — every method takes `&Connection`.
//!
//! | Repo              | Table           |
//! |-------------------|-----------------|
//! | [`SessionRepo`]   | `sessions`      |
//! | [`CallEventRepo`] | `call_events`   |
//! | [`DeviceTokenRepo`]| `device_tokens`|

mod call_event;
mod device_token;
mod session;

pub use call_event::CallEventRepo;
pub use device_token::DeviceTokenRepo;
pub use session::{ListSessionsOptions, SessionRepo, UpsertSessionOptions};

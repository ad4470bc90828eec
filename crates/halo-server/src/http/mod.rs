//! REST surface: authentication, error mapping, and route handlers.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `auth` | HS256 call/operator tokens, bearer extractors |
//! | `error` | `HaloError` → status code + JSON body |
//! | `routes` | `/calls/*`, `/devices/*`, `/health` handlers |

pub mod auth;
pub mod error;
pub mod routes;

pub use auth::{CallAuth, OperatorAuth, TokenIssuer};
pub use error::{ApiError, ApiResult};

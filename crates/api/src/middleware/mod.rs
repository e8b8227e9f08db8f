//! Request pipeline, outermost first:
//!
//! 1. [`trace::propagate_trace`]
//! 2. [`trace::date_header`]
//! 3. [`trace::access_log`]
//! 4. CORS (built in `app`)
//! 5. [`recover::panic_handler`] and [`recover::deadline`]
//! 6. [`auth::auth_middleware`]
//! 7. [`etag::etag`]

pub mod auth;
pub mod etag;
pub mod recover;
pub mod trace;

pub use auth::{AuthState, SkipPaths, auth_middleware, extract_token};

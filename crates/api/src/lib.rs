//! `warden-api`: the HTTP gateway.
//!
//! Authenticates requests, propagates trace context and forwards calls to
//! the identity service, rendering every outcome in the `{code, message, data}`
//! envelope.

pub mod app;
pub mod context;
pub mod middleware;

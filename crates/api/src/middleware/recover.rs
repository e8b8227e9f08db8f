use std::any::Any;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{error, warn};

use warden_core::ErrorCode;

use crate::app::errors::ApiError;

/// Longest panic payload that reaches logs or clients.
pub const PANIC_DETAIL_LIMIT: usize = 2048;

fn truncate(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Turn a handler panic into a 500 `INTERNAL` envelope.
///
/// The payload is logged; it is shown to clients only with `detailed`.
pub fn panic_handler(detailed: bool) -> impl Fn(Box<dyn Any + Send + 'static>) -> Response + Clone {
    move |payload| {
        let detail = truncate(panic_message(payload.as_ref()), PANIC_DETAIL_LIMIT);
        error!(panic = %detail, "handler panicked");
        let message = if detailed {
            format!("panic: {detail}")
        } else {
            ErrorCode::Internal.default_message().to_string()
        };
        ApiError::new(ErrorCode::Internal, message).into_response()
    }
}

/// Bound the rest of the pipeline by `timeout`.
pub async fn deadline(State(timeout): State<Duration>, req: Request, next: Next) -> Response {
    match tokio::time::timeout(timeout, next.run(req)).await {
        Ok(res) => res,
        Err(_) => {
            warn!(timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX), "request deadline exceeded");
            ApiError::from(ErrorCode::GatewayTimeout).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "é".repeat(PANIC_DETAIL_LIMIT);
        let cut = truncate(&text, PANIC_DETAIL_LIMIT);
        assert!(cut.len() <= PANIC_DETAIL_LIMIT);
        assert!(cut.chars().all(|c| c == 'é'));
        assert_eq!(truncate("short", PANIC_DETAIL_LIMIT), "short");
    }

    #[test]
    fn panic_payloads_are_read_as_text() {
        let payload: Box<dyn Any + Send> = Box::new(String::from("boom"));
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}

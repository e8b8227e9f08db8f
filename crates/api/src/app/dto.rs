use std::str::FromStr;

use axum::Json;
use axum::async_trait;
use axum::extract::{FromRequest, Request};
use axum::response::{IntoResponse, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use warden_auth::Page;
use warden_core::{ErrorCode, ServiceError};

use crate::app::errors::ApiError;

// ─────────────────────────────────────────────────────────────────────────────
// Envelope
// ─────────────────────────────────────────────────────────────────────────────

/// Every response body: `code` 0 on success, `data` only when there is some.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope<T> {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> Envelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: ErrorCode::Success,
            message: ErrorCode::Success.default_message().to_string(),
            data: Some(data),
        }
    }
}

/// 200 with `data` wrapped in a success envelope.
pub fn ok<T: Serialize>(data: T) -> Response {
    Json(Envelope::success(data)).into_response()
}

// ─────────────────────────────────────────────────────────────────────────────
// Extractors
// ─────────────────────────────────────────────────────────────────────────────

/// JSON body whose rejections come back as `INVALID_PARAMS` envelopes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(ApiError::new(ErrorCode::InvalidParams, rejection.body_text())),
        }
    }
}

/// Parse a path segment into an id, `INVALID_PARAMS` on failure.
pub fn parse_id<T>(raw: &str) -> Result<T, ApiError>
where
    T: FromStr<Err = ServiceError>,
{
    raw.parse::<T>().map_err(ApiError::from)
}

// ─────────────────────────────────────────────────────────────────────────────
// Request DTOs
// ─────────────────────────────────────────────────────────────────────────────

pub const DEFAULT_PAGE_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

impl PageQuery {
    pub fn page(&self) -> Page {
        Page::new(self.offset.unwrap_or(0), self.limit.unwrap_or(DEFAULT_PAGE_LIMIT))
    }
}

/// `?token=` fallback for clients that cannot set headers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_omits_nothing_but_absent_data() {
        let body = serde_json::to_value(Envelope::success(serde_json::json!({"a": 1}))).unwrap();
        assert_eq!(body["code"], 0);
        assert_eq!(body["data"]["a"], 1);

        let empty: Envelope<()> = Envelope {
            code: ErrorCode::Forbidden,
            message: "no".into(),
            data: None,
        };
        let body = serde_json::to_value(empty).unwrap();
        assert_eq!(body["code"], 100_003);
        assert!(body.get("data").is_none());
    }

    #[test]
    fn page_query_defaults_and_clamps() {
        let page = PageQuery::default().page();
        assert_eq!((page.offset, page.limit), (0, DEFAULT_PAGE_LIMIT));
        let page = PageQuery {
            offset: Some(10),
            limit: Some(100_000),
        }
        .page();
        assert_eq!((page.offset, page.limit), (10, Page::MAX_LIMIT));
    }

    #[test]
    fn bad_ids_are_invalid_params() {
        let err = parse_id::<warden_core::UserId>("nope").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidParams);
    }
}

//! Trace propagation.
//!
//! Inbound requests carry `X-Request-ID` / `X-Trace-ID`; missing ids are minted
//! as UUID v4 and a missing trace id falls back to the request id. The pair is
//! carried as a typed value through the gateway and injected into outbound
//! RPC metadata. Nothing ever fails for lack of trace information.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const TRACE_ID_HEADER: &str = "x-trace-id";

fn mint_id() -> String {
    Uuid::new_v4().to_string()
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Request-local trace identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceContext {
    pub request_id: String,
    pub trace_id: String,
}

impl TraceContext {
    /// A brand-new context: fresh request id, trace id equal to it.
    pub fn mint() -> Self {
        let request_id = mint_id();
        Self {
            trace_id: request_id.clone(),
            request_id,
        }
    }

    /// Build from optional inbound values, minting whatever is missing.
    pub fn from_parts(request_id: Option<&str>, trace_id: Option<&str>) -> Self {
        let request_id = non_empty(request_id).unwrap_or_else(mint_id);
        let trace_id = non_empty(trace_id).unwrap_or_else(|| request_id.clone());
        Self {
            request_id,
            trace_id,
        }
    }

    /// Build from a case-insensitive header lookup.
    pub fn from_lookup<'a, F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        Self::from_parts(lookup(REQUEST_ID_HEADER), lookup(TRACE_ID_HEADER))
    }
}

/// Cross-service metadata (outbound RPC headers).
///
/// Keys are lower-case header names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RpcMetadata(BTreeMap<String, String>);

impl RpcMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata carrying `ctx`.
    pub fn from_context(ctx: &TraceContext) -> Self {
        let mut md = Self::new();
        md.inject(ctx);
        md
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into().to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Write both trace ids.
    pub fn inject(&mut self, ctx: &TraceContext) {
        self.insert(REQUEST_ID_HEADER, ctx.request_id.clone());
        self.insert(TRACE_ID_HEADER, ctx.trace_id.clone());
    }

    /// Server-side extraction; regenerates only what is truly missing.
    pub fn extract(&self) -> TraceContext {
        let request_id = non_empty(self.get(REQUEST_ID_HEADER));
        let trace_id = non_empty(self.get(TRACE_ID_HEADER));
        if request_id.is_none() || trace_id.is_none() {
            ::tracing::warn!(
                has_request_id = request_id.is_some(),
                has_trace_id = trace_id.is_some(),
                "rpc metadata missing trace ids, regenerating"
            );
        }
        TraceContext::from_parts(request_id.as_deref(), trace_id.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_ids_are_minted_and_trace_falls_back_to_request() {
        let ctx = TraceContext::from_parts(None, None);
        assert!(Uuid::parse_str(&ctx.request_id).is_ok());
        assert_eq!(ctx.trace_id, ctx.request_id);

        let ctx = TraceContext::from_parts(Some("req-1"), Some("  "));
        assert_eq!(ctx.request_id, "req-1");
        assert_eq!(ctx.trace_id, "req-1");
    }

    #[test]
    fn inbound_ids_are_preserved() {
        let ctx = TraceContext::from_lookup(|name| match name {
            REQUEST_ID_HEADER => Some("r"),
            TRACE_ID_HEADER => Some("t"),
            _ => None,
        });
        assert_eq!(ctx.request_id, "r");
        assert_eq!(ctx.trace_id, "t");
    }

    #[test]
    fn metadata_round_trips_through_rpc_boundary() {
        let ctx = TraceContext::mint();
        let md = RpcMetadata::from_context(&ctx);
        assert_eq!(md.get("X-Request-ID"), Some(ctx.request_id.as_str()));
        assert_eq!(md.extract(), ctx);
    }

    #[test]
    fn empty_metadata_still_yields_context() {
        let ctx = RpcMetadata::new().extract();
        assert!(!ctx.request_id.is_empty());
        assert_eq!(ctx.trace_id, ctx.request_id);
    }

    #[test]
    fn serializes_as_flat_map() {
        let mut md = RpcMetadata::new();
        md.insert("X-Trace-ID", "abc");
        let json = serde_json::to_value(&md).unwrap();
        assert_eq!(json["x-trace-id"], "abc");
    }
}

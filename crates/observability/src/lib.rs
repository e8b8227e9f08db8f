//! Tracing setup and trace-context propagation (shared by gateway and identity service).

/// Initialize process-wide tracing with the given output format.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init(format: LogFormat) {
    tracing::init(format);
}

/// Request-id / trace-id propagation.
pub mod trace;

/// Tracing configuration (filters, layers).
pub mod tracing;

pub use trace::{REQUEST_ID_HEADER, RpcMetadata, TRACE_ID_HEADER, TraceContext};
pub use tracing::LogFormat;

/// Span/Log attribute keys for stream consumption.
/// Keep these stable; changing them is a breaking change for dashboards.
pub const KEY_STREAM_ID: &str = "sse.stream_id";
pub const KEY_ENDPOINT: &str = "sse.endpoint";
pub const KEY_REQUEST_ID: &str = "req.id";

pub const KEY_OUTCOME: &str = "sse.outcome";
pub const KEY_DELTAS: &str = "sse.deltas";
pub const KEY_MALFORMED: &str = "sse.malformed";
pub const KEY_BYTES: &str = "sse.bytes";
pub const KEY_LATENCY_MS: &str = "latency.ms";

/// Error-related (if applicable)
pub const KEY_ERROR_KIND: &str = "error.kind";

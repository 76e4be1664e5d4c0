use serde::{Deserialize, Serialize};

use crate::decoder::DecodeStats;

/// One record per consumed stream, emitted when it ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StreamTrace {
    pub stream_id: Option<u64>,

    /// Which backend stream, e.g. "novel.generate", "chat.stream".
    pub endpoint: Option<String>,

    /// Caller-supplied correlation id, if any.
    pub request_id: Option<String>,

    pub bytes: u64,
    pub chunks: u64,
    pub deltas: u64,
    pub malformed: u64,

    pub latency_ms: Option<u64>,

    /// "signalled", "end_of_stream", "cancelled" or "error".
    pub outcome: Option<String>,

    /// Optional error metadata, if applicable.
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
}

impl StreamTrace {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn stream_id(mut self, id: u64) -> Self {
        self.stream_id = Some(id);
        self
    }
    pub fn endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = Some(endpoint.to_string());
        self
    }
    pub fn request_id_opt(mut self, rid: Option<&str>) -> Self {
        self.request_id = rid.map(|s| s.to_string());
        self
    }
    pub fn stats(mut self, s: DecodeStats) -> Self {
        self.bytes = s.bytes;
        self.chunks = s.chunks;
        self.deltas = s.deltas;
        self.malformed = s.malformed;
        self
    }
    pub fn latency_ms(mut self, ms: u64) -> Self {
        self.latency_ms = Some(ms);
        self
    }
    pub fn outcome(mut self, outcome: &str) -> Self {
        self.outcome = Some(outcome.to_string());
        self
    }
    pub fn error_kind(mut self, kind: &str) -> Self {
        self.error_kind = Some(kind.to_string());
        self
    }
    pub fn error_message(mut self, msg: &str) -> Self {
        self.error_message = Some(msg.to_string());
        self
    }
}

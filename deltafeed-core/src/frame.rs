//! Line classification for `text/event-stream` bodies.

const DATA_PREFIX: &str = "data:";
const EVENT_PREFIX: &str = "event:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// `event: <label>`; recognised but never acted on.
    Event,
    /// `data: <payload>`
    Data,
    /// `: ...` comments and any field this client does not read (`id:`, `retry:`, ...).
    Comment,
}

/// One classified line. Built per line and discarded after it is handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub payload: String,
}

impl Frame {
    /// Classify a complete line (terminator already removed). Blank lines yield `None`.
    ///
    /// For `data:` and `event:` exactly the field token is stripped and the rest is trimmed, so
    /// `data:{..}` and `data: {..}` are the same frame.
    pub fn parse(line: &str) -> Option<Self> {
        if line.trim().is_empty() {
            return None;
        }
        let (kind, payload) = if let Some(rest) = line.strip_prefix(DATA_PREFIX) {
            (FrameKind::Data, rest.trim())
        } else if let Some(rest) = line.strip_prefix(EVENT_PREFIX) {
            (FrameKind::Event, rest.trim())
        } else if let Some(rest) = line.strip_prefix(':') {
            (FrameKind::Comment, rest.trim())
        } else {
            (FrameKind::Comment, line)
        };
        Some(Self {
            kind,
            payload: payload.to_string(),
        })
    }

    pub fn is_data(&self) -> bool {
        self.kind == FrameKind::Data
    }
}

//! Chunk-boundary-independent SSE frame decoder.
//!
//! Contract:
//! - `feed` may be called with arbitrarily split chunks; the concatenated output of all `feed`
//!   calls plus `finish` depends only on the concatenated input bytes.
//! - Output is 0..n `Delta`s followed by exactly one `Done`.
//! - After `Done`, every call returns an empty vec.

use serde::Serialize;

use crate::config::MalformedPolicy;
use crate::delta::DeltaEvent;
use crate::frame::{Frame, FrameKind};
use crate::utf8::Utf8Decoder;

/// Why the terminal signal fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// The server sent a frame with a truthy `done`.
    Signalled,
    /// The body ended without one.
    EndOfStream,
}

impl Completion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Signalled => "signalled",
            Self::EndOfStream => "end_of_stream",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emission {
    Delta(String),
    Done(Completion),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecodeStats {
    pub bytes: u64,
    pub chunks: u64,
    pub lines: u64,
    pub deltas: u64,
    pub malformed: u64,
}

#[derive(Debug)]
pub struct SseDecoder {
    utf8: Utf8Decoder,
    buffer: String,
    policy: MalformedPolicy,
    finished: bool,
    stats: DecodeStats,
}

impl SseDecoder {
    pub fn new(policy: MalformedPolicy) -> Self {
        Self {
            utf8: Utf8Decoder::new(),
            buffer: String::new(),
            policy,
            finished: false,
            stats: DecodeStats::default(),
        }
    }

    /// Decode one network chunk and return what it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Emission> {
        if self.finished {
            return Vec::new();
        }
        self.stats.bytes += chunk.len() as u64;
        self.stats.chunks += 1;
        let text = self.utf8.decode(chunk);
        self.buffer.push_str(&text);
        let mut out = Vec::new();
        self.drain_lines(&mut out);
        out
    }

    /// Signal end of input. Flushes the unterminated last line, then completes if the body
    /// never sent `done`.
    pub fn finish(&mut self) -> Vec<Emission> {
        let mut out = Vec::new();
        if self.finished {
            return out;
        }
        let tail = self.utf8.finish();
        self.buffer.push_str(&tail);
        self.drain_lines(&mut out);
        if !self.finished && !self.buffer.is_empty() {
            let last = std::mem::take(&mut self.buffer);
            self.handle_line(&last, &mut out);
        }
        if !self.finished {
            self.finished = true;
            out.push(Emission::Done(Completion::EndOfStream));
        }
        out
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Text received after the last newline.
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    fn drain_lines(&mut self, out: &mut Vec<Emission>) {
        let Some(last_nl) = self.buffer.rfind('\n') else {
            return;
        };
        let rest = self.buffer.split_off(last_nl + 1);
        let complete = std::mem::replace(&mut self.buffer, rest);
        for line in complete[..last_nl].split('\n') {
            if self.finished {
                break;
            }
            self.handle_line(line, out);
        }
        if self.finished {
            self.buffer.clear();
        }
    }

    fn handle_line(&mut self, line: &str, out: &mut Vec<Emission>) {
        let line = line.strip_suffix('\r').unwrap_or(line);
        self.stats.lines += 1;
        let Some(frame) = Frame::parse(line) else {
            return;
        };
        match frame.kind {
            FrameKind::Event | FrameKind::Comment => {
                tracing::trace!(kind = ?frame.kind, payload = %frame.payload, "ignoring frame");
            }
            FrameKind::Data => self.handle_data(frame.payload, out),
        }
    }

    fn handle_data(&mut self, payload: String, out: &mut Vec<Emission>) {
        if payload.is_empty() {
            return;
        }
        match DeltaEvent::parse(&payload) {
            Ok(ev) if ev.done => {
                self.finished = true;
                out.push(Emission::Done(Completion::Signalled));
            }
            Ok(ev) => {
                if let Some(content) = ev.content {
                    self.stats.deltas += 1;
                    out.push(Emission::Delta(content));
                }
            }
            Err(e) => {
                self.stats.malformed += 1;
                match self.policy {
                    MalformedPolicy::Drop => {
                        tracing::warn!(
                            error = %e,
                            payload = %payload,
                            "dropping malformed data frame"
                        );
                    }
                    MalformedPolicy::AppendRaw => {
                        tracing::debug!(error = %e, "appending malformed data frame verbatim");
                        self.stats.deltas += 1;
                        out.push(Emission::Delta(payload));
                    }
                }
            }
        }
    }
}

/// Decode a complete body in one go. Handy for captured transcripts.
pub fn decode_all(body: &[u8], policy: MalformedPolicy) -> Vec<Emission> {
    let mut dec = SseDecoder::new(policy);
    let mut out = dec.feed(body);
    out.extend(dec.finish());
    out
}

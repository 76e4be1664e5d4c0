//! Streaming primitives exposed by deltafeed.
//!
//! Contract:
//! - A `DeltaStream` yields 0..n `Delta` events followed by exactly one terminal event:
//!   `Done` or `Error`.
//! - After a terminal event, no further events are emitted and the byte source has been dropped.
//!
//! This module intentionally avoids deriving `Clone` / `PartialEq` because `Error` contains
//! `DeltaFeedError`, which is not (and should not be) `Clone` or `Eq`.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::stream::Stream;

use crate::config::MalformedPolicy;
use crate::decoder::{DecodeStats, Emission, SseDecoder};
use crate::error::{CoreResult, DeltaFeedError};

pub use crate::decoder::Completion;

/// Raw body chunks, already mapped to the crate's error type.
pub type ByteStream = Pin<Box<dyn Stream<Item = CoreResult<Bytes>> + Send>>;

/// What the caller receives incrementally.
#[derive(Debug)]
pub enum StreamEvent {
    /// Partial generated text.
    Delta(String),
    /// The stream finished; the variant says whether the server said so.
    Done(Completion),
    /// Transport error surfaced mid-stream; stream ends after this.
    Error(DeltaFeedError),
}

impl StreamEvent {
    /// Returns true if this event terminates the stream (`Done` or `Error`).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Error(_))
    }

    /// Convenience accessor for `Delta` contents.
    pub fn as_text_delta(&self) -> Option<&str> {
        match self {
            Self::Delta(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl From<Emission> for StreamEvent {
    fn from(e: Emission) -> Self {
        match e {
            Emission::Delta(s) => Self::Delta(s),
            Emission::Done(c) => Self::Done(c),
        }
    }
}

/// Adapts a chunked SSE body into `StreamEvent`s.
pub struct DeltaStream {
    inner: Option<ByteStream>,
    decoder: SseDecoder,
    queued: VecDeque<Emission>,
    terminated: bool,
}

impl DeltaStream {
    pub fn new(inner: ByteStream, policy: MalformedPolicy) -> Self {
        Self {
            inner: Some(inner),
            decoder: SseDecoder::new(policy),
            queued: VecDeque::new(),
            terminated: false,
        }
    }

    pub fn stats(&self) -> DecodeStats {
        self.decoder.stats()
    }

    /// Drop the byte source now; the stream yields `None` afterwards. Stats are kept.
    pub fn release(&mut self) {
        self.inner = None;
        self.queued.clear();
        self.terminated = true;
    }

    /// True once the byte source has been released.
    pub fn is_released(&self) -> bool {
        self.inner.is_none()
    }
}

impl Stream for DeltaStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(em) = self.queued.pop_front() {
                if matches!(em, Emission::Done(_)) {
                    self.terminated = true;
                    self.inner = None;
                }
                return Poll::Ready(Some(em.into()));
            }
            if self.terminated {
                return Poll::Ready(None);
            }

            let Some(inner) = self.inner.as_mut() else {
                return Poll::Ready(None);
            };
            match inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    let out = self.decoder.feed(&chunk);
                    self.queued.extend(out);
                }
                Poll::Ready(Some(Err(e))) => {
                    tracing::warn!(error = %e, "sse body failed mid-stream");
                    self.terminated = true;
                    self.inner = None;
                    return Poll::Ready(Some(StreamEvent::Error(e)));
                }
                Poll::Ready(None) => {
                    let out = self.decoder.finish();
                    self.queued.extend(out);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

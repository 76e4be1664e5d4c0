//! Push-style consumption: drive a body to completion, feeding a caller-supplied sink.

use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::MalformedPolicy;
use crate::decoder::{Completion, DecodeStats};
use crate::error::CoreResult;
use crate::stream::{ByteStream, DeltaStream, StreamEvent};

/// Receives decoded output for one stream.
///
/// `on_done` is called at most once. It is not called after a transport error, or once the
/// consumer has observed cancellation.
pub trait DeltaSink {
    fn on_delta(&mut self, text: &str);
    fn on_done(&mut self, completion: Completion);
}

impl<T: DeltaSink + ?Sized> DeltaSink for &mut T {
    fn on_delta(&mut self, text: &str) {
        (**self).on_delta(text)
    }
    fn on_done(&mut self, completion: Completion) {
        (**self).on_done(completion)
    }
}

/// Shared state behind a mutex, e.g. a conversation also read by a UI loop.
impl<T: DeltaSink> DeltaSink for Arc<Mutex<T>> {
    fn on_delta(&mut self, text: &str) {
        // a poisoned lock still holds the partial text; keep appending
        let mut guard = self.lock().unwrap_or_else(|p| p.into_inner());
        guard.on_delta(text);
    }
    fn on_done(&mut self, completion: Completion) {
        let mut guard = self.lock().unwrap_or_else(|p| p.into_inner());
        guard.on_done(completion);
    }
}

/// A sink made of two callbacks.
pub struct FnSink<D, F> {
    on_delta: D,
    on_done: F,
}

impl<D, F> FnSink<D, F>
where
    D: FnMut(&str),
    F: FnMut(Completion),
{
    pub fn new(on_delta: D, on_done: F) -> Self {
        Self { on_delta, on_done }
    }
}

impl<D, F> DeltaSink for FnSink<D, F>
where
    D: FnMut(&str),
    F: FnMut(Completion),
{
    fn on_delta(&mut self, text: &str) {
        (self.on_delta)(text)
    }
    fn on_done(&mut self, completion: Completion) {
        (self.on_done)(completion)
    }
}

/// How a consumption ended, other than by transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Completed(Completion),
    Cancelled,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed(c) => c.as_str(),
            Self::Cancelled => "cancelled",
        }
    }
}

/// One stream, one consumer.
pub struct Consumer {
    events: DeltaStream,
    cancel: CancellationToken,
}

impl Consumer {
    pub fn new(body: ByteStream, policy: MalformedPolicy, cancel: CancellationToken) -> Self {
        Self {
            events: DeltaStream::new(body, policy),
            cancel,
        }
    }

    /// Drive the body to its end. The body is released on every return path.
    pub async fn run<S: DeltaSink + ?Sized>(&mut self, sink: &mut S) -> CoreResult<Outcome> {
        let res = self.pump(sink).await;
        self.events.release();
        res
    }

    async fn pump<S: DeltaSink + ?Sized>(&mut self, sink: &mut S) -> CoreResult<Outcome> {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::debug!("stream cancelled by caller");
                    return Ok(Outcome::Cancelled);
                }
                ev = self.events.next() => ev,
            };
            match next {
                Some(StreamEvent::Delta(text)) => sink.on_delta(&text),
                Some(StreamEvent::Done(completion)) => {
                    sink.on_done(completion);
                    return Ok(Outcome::Completed(completion));
                }
                Some(StreamEvent::Error(e)) => return Err(e),
                None => {
                    // DeltaStream always ends with a terminal event; never leave the caller hanging
                    sink.on_done(Completion::EndOfStream);
                    return Ok(Outcome::Completed(Completion::EndOfStream));
                }
            }
        }
    }

    pub fn stats(&self) -> DecodeStats {
        self.events.stats()
    }
}

/// Consume `body` into `sink` until the terminal signal, a transport error, or cancellation.
pub async fn consume<S: DeltaSink + ?Sized>(
    body: ByteStream,
    sink: &mut S,
    policy: MalformedPolicy,
    cancel: &CancellationToken,
) -> CoreResult<Outcome> {
    Consumer::new(body, policy, cancel.clone()).run(sink).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeltaFeedError;
    use crate::stream::test_support::*;
    use std::sync::atomic::Ordering;

    #[derive(Default)]
    struct Recorder {
        deltas: Vec<String>,
        done: Vec<Completion>,
    }

    impl DeltaSink for Recorder {
        fn on_delta(&mut self, text: &str) {
            self.deltas.push(text.to_string());
        }
        fn on_done(&mut self, completion: Completion) {
            self.done.push(completion);
        }
    }

    #[tokio::test]
    async fn callbacks_receive_deltas_and_one_done() {
        let mut text = String::new();
        let mut dones = 0;
        {
            let mut sink = FnSink::new(|d: &str| text.push_str(d), |_c| dones += 1);
            let body = body_of(vec![
                ok("data: {\"content\":\"hello\",\"done\":false}\n\n"),
                ok("data: {\"content\":\" world\",\"done\":false}\n\n"),
                ok("data: {\"done\":true}\n\n"),
                ok("data: {\"done\":true}\n\n"),
            ]);
            let outcome = consume(body, &mut sink, MalformedPolicy::Drop, &CancellationToken::new())
                .await
                .unwrap();
            assert_eq!(outcome, Outcome::Completed(Completion::Signalled));
        }
        assert_eq!(text, "hello world");
        assert_eq!(dones, 1);
    }

    #[tokio::test]
    async fn transport_error_skips_done_and_keeps_deltas() {
        let mut rec = Recorder::default();
        let (body, dropped) = TrackedBody::new(
            vec![
                ok("data: {\"content\":\"kept\"}\n"),
                Err(DeltaFeedError::Transport("eof".into())),
            ],
            false,
        );
        let err = consume(body, &mut rec, MalformedPolicy::Drop, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DeltaFeedError::Transport(_)));
        assert_eq!(rec.deltas, vec!["kept"]);
        assert!(rec.done.is_empty());
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn pre_cancelled_token_emits_nothing() {
        let mut rec = Recorder::default();
        let (body, dropped) = TrackedBody::new(vec![ok("data: {\"content\":\"x\"}\n")], false);
        let token = CancellationToken::new();
        token.cancel();
        let outcome = consume(body, &mut rec, MalformedPolicy::Drop, &token).await.unwrap();
        assert_eq!(outcome, Outcome::Cancelled);
        assert!(rec.deltas.is_empty());
        assert!(rec.done.is_empty());
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cancel_while_waiting_for_next_chunk() {
        let shared = Arc::new(Mutex::new(Recorder::default()));
        let (body, dropped) = TrackedBody::new(vec![ok("data: {\"content\":\"first\"}\n")], true);
        let token = CancellationToken::new();
        let mut consumer = Consumer::new(body, MalformedPolicy::Drop, token.clone());

        let mut sink = shared.clone();
        let task = tokio::spawn(async move {
            let outcome = consumer.run(&mut sink).await;
            (outcome, consumer.stats())
        });
        for _ in 0..100 {
            if !shared.lock().unwrap().deltas.is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        token.cancel();
        let (outcome, stats) = task.await.unwrap();
        assert_eq!(outcome.unwrap(), Outcome::Cancelled);
        assert_eq!(stats.deltas, 1);
        assert!(dropped.load(Ordering::SeqCst));
        let rec = shared.lock().unwrap();
        assert_eq!(rec.deltas, vec!["first"]);
        assert!(rec.done.is_empty());
    }

    #[tokio::test]
    async fn end_of_stream_completes_exactly_once() {
        let mut rec = Recorder::default();
        let body = body_of(vec![ok("data: not-json\n"), ok("data: {\"content\":\"a\"}")]);
        let outcome = consume(body, &mut rec, MalformedPolicy::AppendRaw, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Completed(Completion::EndOfStream));
        assert_eq!(rec.deltas, vec!["not-json", "a"]);
        assert_eq!(rec.done, vec![Completion::EndOfStream]);
    }
}

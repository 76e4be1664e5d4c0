//! Owned handles for streams running on the tokio runtime.
//!
//! Opening a stream returns a `StreamHandle`; the caller decides whether to wait for it, cancel
//! it, or keep its canceller in an `ActiveStreams` set alongside other streams.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_futures::Instrument;

use crate::config::MalformedPolicy;
use crate::consumer::{Consumer, DeltaSink, Outcome};
use crate::decoder::DecodeStats;
use crate::error::{CoreResult, DeltaFeedError};
use crate::stream::ByteStream;
use crate::telemetry::{self, StreamTrace};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Everything a finished stream hands back. The sink is returned even on failure so partial
/// output can still be shown.
#[derive(Debug)]
pub struct Finished<S> {
    pub sink: S,
    pub outcome: CoreResult<Outcome>,
    pub stats: DecodeStats,
}

pub struct StreamHandle<S> {
    id: u64,
    label: String,
    cancel: CancellationToken,
    task: Option<JoinHandle<Finished<S>>>,
}

impl<S> StreamHandle<S>
where
    S: DeltaSink + Send + 'static,
{
    /// Start consuming `body` on a background task.
    pub fn spawn(
        label: impl Into<String>,
        body: ByteStream,
        sink: S,
        policy: MalformedPolicy,
    ) -> Self {
        Self::spawn_with(label, None, body, sink, policy)
    }

    pub(crate) fn spawn_with(
        label: impl Into<String>,
        request_id: Option<String>,
        body: ByteStream,
        mut sink: S,
        policy: MalformedPolicy,
    ) -> Self {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let label = label.into();
        let cancel = CancellationToken::new();

        let span = tracing::info_span!(
            "sse_stream",
            sse.stream_id = id,
            sse.endpoint = %label,
            req.id = request_id.as_deref().unwrap_or(""),
            sse.outcome = tracing::field::Empty,
            sse.deltas = tracing::field::Empty,
            sse.malformed = tracing::field::Empty,
            sse.bytes = tracing::field::Empty,
            latency.ms = tracing::field::Empty,
            error.kind = tracing::field::Empty,
        );

        let token = cancel.clone();
        let trace_label = label.clone();
        let task_span = span.clone();
        let fut = async move {
            let started = Instant::now();
            let mut consumer = Consumer::new(body, policy, token);
            let outcome = consumer.run(&mut sink).await;
            let stats = consumer.stats();
            let latency_ms = started.elapsed().as_millis() as u64;

            task_span.record(telemetry::KEY_DELTAS, stats.deltas);
            task_span.record(telemetry::KEY_MALFORMED, stats.malformed);
            task_span.record(telemetry::KEY_BYTES, stats.bytes);
            task_span.record(telemetry::KEY_LATENCY_MS, latency_ms);
            let mut trace = StreamTrace::new()
                .stream_id(id)
                .endpoint(&trace_label)
                .request_id_opt(request_id.as_deref())
                .stats(stats)
                .latency_ms(latency_ms);
            match &outcome {
                Ok(o) => {
                    task_span.record(telemetry::KEY_OUTCOME, o.as_str());
                    tracing::debug!(outcome = o.as_str(), "stream finished");
                    trace = trace.outcome(o.as_str());
                }
                Err(e) => {
                    task_span.record(telemetry::KEY_OUTCOME, "error");
                    task_span.record(telemetry::KEY_ERROR_KIND, e.kind());
                    tracing::warn!(error = %e, "stream failed");
                    trace = trace
                        .outcome("error")
                        .error_kind(e.kind())
                        .error_message(&e.to_string());
                }
            }
            telemetry::emit(trace);
            Finished {
                sink,
                outcome,
                stats,
            }
        };

        let task = tokio::spawn(fut.instrument(span));
        Self {
            id,
            label,
            cancel,
            task: Some(task),
        }
    }
}

impl<S> StreamHandle<S> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Stop the stream. Nothing further is read from the body once the task sees the
    /// cancellation; an event already taken from the body may still reach the sink.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A token that cancels this stream, for callers that track several.
    pub fn canceller(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Wait for the stream to end and take back the sink.
    pub async fn join(mut self) -> CoreResult<Finished<S>> {
        let Some(task) = self.task.as_mut() else {
            return Err(DeltaFeedError::Validation(format!(
                "stream {} already joined",
                self.id
            )));
        };
        let res = task.await;
        self.task = None;
        res.map_err(|e| DeltaFeedError::Other(anyhow::anyhow!("stream task failed: {e}")))
    }
}

impl<S> Drop for StreamHandle<S> {
    fn drop(&mut self) {
        // abandoned without join: stop reading so the connection is released
        if self.task.is_some() {
            self.cancel.cancel();
        }
    }
}

impl<S> std::fmt::Debug for StreamHandle<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Caller-owned set of running streams, keyed by handle id.
#[derive(Debug, Default)]
pub struct ActiveStreams {
    entries: BTreeMap<u64, (String, CancellationToken)>,
}

impl ActiveStreams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track<S>(&mut self, handle: &StreamHandle<S>) {
        self.entries
            .insert(handle.id(), (handle.label().to_string(), handle.canceller()));
    }

    /// Cancel one stream and stop tracking it. Returns false for unknown ids.
    pub fn cancel(&mut self, id: u64) -> bool {
        match self.entries.remove(&id) {
            Some((label, token)) => {
                tracing::debug!(stream_id = id, endpoint = %label, "cancelling stream");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel everything, e.g. on shutdown. Returns how many streams were cancelled.
    pub fn cancel_all(&mut self) -> usize {
        let n = self.entries.len();
        for (_, (_, token)) in std::mem::take(&mut self.entries) {
            token.cancel();
        }
        n
    }

    /// Stop tracking a stream that ended on its own.
    pub fn forget(&mut self, id: u64) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub fn ids(&self) -> Vec<u64> {
        self.entries.keys().copied().collect()
    }

    pub fn label(&self, id: u64) -> Option<&str> {
        self.entries.get(&id).map(|(l, _)| l.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

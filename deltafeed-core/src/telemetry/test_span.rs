#![cfg(test)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{Subscriber, span};
use tracing_core::field::{Field, Visit};
use tracing_subscriber::registry;
use tracing_subscriber::{Layer, layer::Context, registry::LookupSpan};

#[derive(Default, Debug)]
pub struct SpanData {
    pub name: String,
    pub fields: Mutex<HashMap<String, String>>, // stringified values
}

#[derive(Default, Debug)]
pub struct SpanStore {
    pub spans: Mutex<HashMap<tracing::span::Id, Arc<SpanData>>>,
}

impl SpanStore {
    /// Fields of the first span with `name`, if one was opened.
    pub fn fields_of(&self, name: &str) -> Option<HashMap<String, String>> {
        let spans = self.spans.lock().unwrap();
        spans
            .values()
            .find(|d| d.name == name)
            .map(|d| d.fields.lock().unwrap().clone())
    }
}

#[derive(Clone)]
pub struct CaptureLayer {
    pub store: Arc<SpanStore>,
}

struct MapVisitor<'a> {
    map: &'a mut HashMap<String, String>,
}

impl Visit for MapVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn core::fmt::Debug) {
        self.map.insert(field.name().to_string(), format!("{value:?}"));
    }
    fn record_i64(&mut self, field: &Field, value: i64) {
        self.map.insert(field.name().to_string(), value.to_string());
    }
    fn record_u64(&mut self, field: &Field, value: u64) {
        self.map.insert(field.name().to_string(), value.to_string());
    }
    fn record_bool(&mut self, field: &Field, value: bool) {
        self.map.insert(field.name().to_string(), value.to_string());
    }
    fn record_str(&mut self, field: &Field, value: &str) {
        self.map.insert(field.name().to_string(), value.to_string());
    }
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, _ctx: Context<'_, S>) {
        let name = attrs.metadata().name().to_string();
        let data = Arc::new(SpanData {
            name,
            ..Default::default()
        });
        {
            let mut map = data.fields.lock().unwrap();
            attrs.record(&mut MapVisitor { map: &mut map });
        }
        self.store.spans.lock().unwrap().insert(id.clone(), data);
    }

    fn on_record(&self, id: &span::Id, values: &span::Record<'_>, _ctx: Context<'_, S>) {
        if let Some(data) = self.store.spans.lock().unwrap().get(id) {
            let mut map = data.fields.lock().unwrap();
            values.record(&mut MapVisitor { map: &mut map });
        }
    }
}

/// Route spans created on the current thread into a fresh store.
/// The returned guard restores the previous subscriber when dropped.
pub fn install_capture() -> (Arc<SpanStore>, tracing::subscriber::DefaultGuard) {
    use tracing_subscriber::prelude::*;
    let store = Arc::new(SpanStore::default());
    let layer = CaptureLayer {
        store: store.clone(),
    };
    let subscriber = registry::Registry::default().with(layer);
    let guard = tracing::subscriber::set_default(subscriber);
    (store, guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MalformedPolicy;
    use crate::consumer::DeltaSink;
    use crate::decoder::Completion;
    use crate::handle::StreamHandle;
    use crate::stream::test_support::*;
    use crate::telemetry::keys::*;

    #[derive(Debug)]
    struct Discard;
    impl DeltaSink for Discard {
        fn on_delta(&mut self, _text: &str) {}
        fn on_done(&mut self, _completion: Completion) {}
    }

    #[tokio::test]
    async fn stream_span_records_summary_fields() {
        let (store, _guard) = install_capture();
        let body = body_of(vec![ok(
            "data: {\"content\":\"a\"}\ndata: {\"content\":\"b\"}\ndata: junk\n",
        )]);
        StreamHandle::spawn_with(
            "novel.segment",
            Some("req-9".into()),
            body,
            Discard,
            MalformedPolicy::Drop,
        )
        .join()
        .await
        .unwrap();

        let fields = store.fields_of("sse_stream").expect("span opened");
        assert_eq!(fields.get(KEY_ENDPOINT).map(String::as_str), Some("novel.segment"));
        assert_eq!(fields.get(KEY_REQUEST_ID).map(String::as_str), Some("req-9"));
        assert!(fields.contains_key(KEY_STREAM_ID));
        assert_eq!(fields.get(KEY_OUTCOME).map(String::as_str), Some("end_of_stream"));
        assert_eq!(fields.get(KEY_DELTAS).map(String::as_str), Some("2"));
        assert_eq!(fields.get(KEY_MALFORMED).map(String::as_str), Some("1"));
        assert!(fields.contains_key(KEY_LATENCY_MS));
        assert!(!fields.contains_key(KEY_ERROR_KIND));
    }
}

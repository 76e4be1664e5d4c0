//! Backend-facing entry point: build the request, open the body, hand it to a consumer.

use reqwest::Url;

use crate::config::{Config, EndpointsCfg, MalformedPolicy};
use crate::consumer::DeltaSink;
use crate::error::CoreResult;
use crate::handle::StreamHandle;
use crate::http_client::{HttpClient, RequestCtx};
use crate::model::StreamRequest;
use crate::stream::ByteStream;

#[derive(Debug, Clone)]
pub struct StreamClient {
    http: HttpClient,
    base_url: Url,
    endpoints: EndpointsCfg,
    policy: MalformedPolicy,
}

impl StreamClient {
    pub fn new(cfg: &Config) -> CoreResult<Self> {
        Ok(Self {
            base_url: cfg.base_url()?,
            http: HttpClient::from_cfg(&cfg.http)?,
            endpoints: cfg.server.endpoints.clone(),
            policy: cfg.decoder.malformed,
        })
    }

    pub fn url_for(&self, req: &StreamRequest) -> CoreResult<Url> {
        req.url(&self.base_url, &self.endpoints)
    }

    /// Open the SSE body for `req` without consuming it.
    pub async fn open(&self, req: &StreamRequest, ctx: &RequestCtx<'_>) -> CoreResult<ByteStream> {
        let url = self.url_for(req)?;
        tracing::debug!(endpoint = req.label(), url = %url, "opening stream");
        let resp = self
            .http
            .open_sse(req.method(), url, req.body().as_ref(), req.label(), ctx)
            .await?;
        if let Some(upstream) = &resp.upstream_request_id {
            tracing::debug!(
                endpoint = req.label(),
                upstream_request_id = %upstream,
                "stream accepted"
            );
        }
        Ok(resp.body)
    }

    /// Open `req` and consume it on a background task feeding `sink`.
    pub async fn start<S>(&self, req: StreamRequest, sink: S) -> CoreResult<StreamHandle<S>>
    where
        S: DeltaSink + Send + 'static,
    {
        self.start_with(req, &RequestCtx::default(), sink).await
    }

    pub async fn start_with<S>(
        &self,
        req: StreamRequest,
        ctx: &RequestCtx<'_>,
        sink: S,
    ) -> CoreResult<StreamHandle<S>>
    where
        S: DeltaSink + Send + 'static,
    {
        let body = self.open(&req, ctx).await?;
        Ok(StreamHandle::spawn_with(
            req.label(),
            ctx.request_id.map(str::to_string),
            body,
            sink,
            self.policy,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::Outcome;
    use crate::decoder::Completion;
    use crate::error::DeltaFeedError;
    use crate::model::GenerateRequest;
    use httpmock::Method::{GET, POST};
    use httpmock::MockServer;
    use serde_json::json;

    #[derive(Default, Debug)]
    struct Text {
        out: String,
        done: Option<Completion>,
    }

    impl DeltaSink for Text {
        fn on_delta(&mut self, text: &str) {
            self.out.push_str(text);
        }
        fn on_done(&mut self, completion: Completion) {
            self.done = Some(completion);
        }
    }

    fn client_for(server: &MockServer, policy: MalformedPolicy) -> StreamClient {
        let mut cfg = Config::default();
        cfg.server.base_url = format!("{}/", server.base_url());
        cfg.decoder.malformed = policy;
        StreamClient::new(&cfg).unwrap()
    }

    #[tokio::test]
    async fn generate_posts_body_and_streams_text() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(POST)
                .path("/api/novel/stream")
                .header("accept", "text/event-stream")
                .json_body(json!({"prompt": "rain", "maxTokens": 64}));
            then.status(200)
                .header("content-type", "text/event-stream")
                .body(concat!(
                    "data: {\"content\":\"It \"}\n\n",
                    "data: {\"content\":\"rained.\"}\n\n",
                    "data: {\"done\":true}\n\n",
                ));
        });
        let client = client_for(&server, MalformedPolicy::Drop);
        let req = StreamRequest::Generate(GenerateRequest {
            max_tokens: Some(64),
            ..GenerateRequest::new("rain")
        });
        let finished = client
            .start(req, Text::default())
            .await
            .unwrap()
            .join()
            .await
            .unwrap();
        assert_eq!(finished.outcome.unwrap(), Outcome::Completed(Completion::Signalled));
        assert_eq!(finished.sink.out, "It rained.");
        assert_eq!(finished.sink.done, Some(Completion::Signalled));
        m.assert();
    }

    #[tokio::test]
    async fn segment_uses_get_with_query_and_request_id() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(GET)
                .path("/api/novel/story/sess-1/generate")
                .query_param("segment", "2")
                .header("x-request-id", "r-42");
            then.status(200).body("data: {\"content\":\"chapter\"}\n");
        });
        let client = client_for(&server, MalformedPolicy::Drop);
        let req = StreamRequest::Segment {
            session_id: "sess-1".into(),
            index: 2,
        };
        let ctx = RequestCtx {
            request_id: Some("r-42"),
        };
        let finished = client
            .start_with(req, &ctx, Text::default())
            .await
            .unwrap()
            .join()
            .await
            .unwrap();
        assert_eq!(finished.outcome.unwrap(), Outcome::Completed(Completion::EndOfStream));
        assert_eq!(finished.sink.out, "chapter");
        m.assert();
    }

    #[tokio::test]
    async fn revise_sends_feedback_body() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(POST)
                .path("/api/novel/story/s9/revise")
                .query_param("segment", "0")
                .json_body(json!({"feedback": "more dialogue"}));
            then.status(200)
                .body("data: oops\ndata: {\"content\":\"ok\"}\ndata: {\"done\":true}\n");
        });
        let client = client_for(&server, MalformedPolicy::AppendRaw);
        let req = StreamRequest::Revise {
            session_id: "s9".into(),
            index: 0,
            feedback: "more dialogue".into(),
        };
        let finished = client
            .start(req, Text::default())
            .await
            .unwrap()
            .join()
            .await
            .unwrap();
        assert_eq!(finished.sink.out, "oopsok");
        assert_eq!(finished.stats.malformed, 1);
        m.assert();
    }

    #[tokio::test]
    async fn chat_error_status_fails_before_spawning() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(GET).path("/api/chat/stream/c1");
            then.status(404).body("no such conversation");
        });
        let client = client_for(&server, MalformedPolicy::Drop);
        let req = StreamRequest::Chat {
            conversation_id: "c1".into(),
        };
        let err = client.start(req, Text::default()).await.unwrap_err();
        match err {
            DeltaFeedError::Upstream { endpoint, code, message } => {
                assert_eq!(endpoint, "chat.stream");
                assert_eq!(code, "404");
                assert_eq!(message, "no such conversation");
            }
            other => panic!("expected Upstream, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn base_url_path_prefix_is_preserved() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(GET).path("/proxy/api/chat/stream/c1");
            then.status(200).body("data: {\"content\":\"hey\"}\n");
        });
        let mut cfg = Config::default();
        cfg.server.base_url = format!("{}/proxy", server.base_url());
        let client = StreamClient::new(&cfg).unwrap();
        let req = StreamRequest::Chat {
            conversation_id: "c1".into(),
        };
        assert_eq!(client.url_for(&req).unwrap().path(), "/proxy/api/chat/stream/c1");
        let finished = client
            .start(req, Text::default())
            .await
            .unwrap()
            .join()
            .await
            .unwrap();
        assert_eq!(finished.sink.out, "hey");
        m.assert();
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let mut cfg = Config::default();
        cfg.server.base_url = "localhost:8080".into();
        assert!(matches!(StreamClient::new(&cfg), Err(DeltaFeedError::Validation(_))));
    }
}

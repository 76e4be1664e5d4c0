use std::time::Duration;

use futures_util::TryStreamExt;
use http::Method;
use reqwest::{Client, IntoUrl, StatusCode};
use serde::Serialize;

use crate::config::HttpCfg;
use crate::error::{CoreResult, DeltaFeedError};
use crate::stream::ByteStream;

/// Request context carries the tracing id forwarded to the backend.
#[derive(Clone, Copy, Default)]
pub struct RequestCtx<'a> {
    pub request_id: Option<&'a str>,
}

/// A streaming response that passed the status check.
pub struct SseResponse {
    pub body: ByteStream,
    /// Backend's own correlation id, when it sends one.
    pub upstream_request_id: Option<String>,
}

/// Thin wrapper around reqwest::Client with defaults and helpers.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
    user_agent: String,
}

impl HttpClient {
    pub fn new_default() -> CoreResult<Self> {
        Self::from_cfg(&HttpCfg::default())
    }

    pub fn from_cfg(cfg: &HttpCfg) -> CoreResult<Self> {
        let mut builder =
            Client::builder().connect_timeout(Duration::from_millis(cfg.connect_timeout_ms));
        if let Some(ms) = cfg.stream_timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        if let Some(n) = cfg.pool_max_idle_per_host {
            builder = builder.pool_max_idle_per_host(n);
        }
        let inner = builder
            .build()
            .map_err(|e| DeltaFeedError::Other(anyhow::anyhow!("http client build failed: {e}")))?;
        Ok(Self {
            inner,
            user_agent: cfg.user_agent.clone(),
        })
    }

    /// Send a request expecting `text/event-stream` and hand back the raw body.
    ///
    /// Failures before the body starts (connect errors, non-2xx) are returned here; read
    /// failures afterwards surface as `Transport` items in the body stream.
    pub async fn open_sse<U: IntoUrl, T: Serialize + ?Sized>(
        &self,
        method: Method,
        url: U,
        body: Option<&T>,
        endpoint: &str,
        ctx: &RequestCtx<'_>,
    ) -> CoreResult<SseResponse> {
        let mut req = self
            .inner
            .request(method, url)
            .header("User-Agent", &self.user_agent)
            .header("Accept", "text/event-stream");
        if let Some(b) = body {
            req = req.json(b);
        }
        if let Some(rid) = ctx.request_id {
            req = req.header("X-Request-Id", rid);
        }

        let resp = req.send().await.map_err(|e| {
            tracing::warn!(endpoint, error = %e, "sse request failed to send");
            DeltaFeedError::Unavailable {
                endpoint: endpoint.into(),
            }
        })?;

        let status = resp.status();
        let headers = resp.headers().clone();
        if !status.is_success() {
            let ra = parse_retry_after(&headers);
            let text = resp.text().await.unwrap_or_default();
            return Err(map_http_error(endpoint, status, ra, &text));
        }

        let upstream_request_id = extract_request_id(&headers);
        let body = resp
            .bytes_stream()
            .map_err(|e| DeltaFeedError::Transport(e.to_string()));
        Ok(SseResponse {
            body: Box::pin(body),
            upstream_request_id,
        })
    }
}

fn extract_request_id(headers: &reqwest::header::HeaderMap) -> Option<String> {
    static CANDIDATES: [&str; 3] = ["x-request-id", "request-id", "x-trace-id"];
    for k in CANDIDATES {
        if let Some(v) = headers.get(k)
            && let Ok(s) = v.to_str()
        {
            return Some(s.to_string());
        }
    }
    None
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    if let Some(v) = headers.get("retry-after")
        && let Ok(s) = v.to_str()
        && let Ok(secs) = s.trim().parse::<u64>()
    {
        return Some(secs);
    }
    // HTTP-date forms are ignored.
    None
}

fn map_http_error(
    endpoint: &str,
    status: StatusCode,
    retry_after: Option<u64>,
    body: &str,
) -> DeltaFeedError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => DeltaFeedError::RateLimited {
            endpoint: endpoint.to_string(),
            retry_after,
        },
        s if s.is_server_error() => DeltaFeedError::Unavailable {
            endpoint: endpoint.to_string(),
        },
        s => DeltaFeedError::Upstream {
            endpoint: endpoint.to_string(),
            code: s.as_u16().to_string(),
            message: truncate(body, 300),
        },
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() > max {
        let mut cut = max;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        let mut t = s[..cut].to_string();
        t.push_str("...");
        t
    } else {
        s.to_string()
    }
}

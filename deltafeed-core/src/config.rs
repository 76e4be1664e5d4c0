use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// What the decoder does with a `data:` payload that is not valid JSON.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MalformedPolicy {
    /// Log and skip the frame.
    #[default]
    Drop,
    /// Emit the raw payload text as a delta.
    AppendRaw,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct DecoderCfg {
    #[serde(default)]
    pub malformed: MalformedPolicy,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct EndpointsCfg {
    /// Free-form text generation, POST with a JSON body.
    #[serde(default = "default_generate_path")]
    pub generate_path: String,
    /// Story session root; `/{session}/generate` and `/{session}/revise` hang off it.
    #[serde(default = "default_story_path")]
    pub story_path: String,
    /// Conversation stream root; `/{conversation}` is appended.
    #[serde(default = "default_chat_path")]
    pub chat_path: String,
}

impl Default for EndpointsCfg {
    fn default() -> Self {
        Self {
            generate_path: default_generate_path(),
            story_path: default_story_path(),
            chat_path: default_chat_path(),
        }
    }
}

fn default_generate_path() -> String {
    "/api/novel/stream".to_string()
}
fn default_story_path() -> String {
    "/api/novel/story".to_string()
}
fn default_chat_path() -> String {
    "/api/chat/stream".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ServerCfg {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub endpoints: EndpointsCfg,
}

impl Default for ServerCfg {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            endpoints: EndpointsCfg::default(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct HttpCfg {
    /// TCP connect timeout in milliseconds (default 5000ms)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Deadline for a whole streamed response. None lets generation run as long as the server
    /// keeps the body open.
    #[serde(default)]
    pub stream_timeout_ms: Option<u64>,
    /// Optional per-host idle connection pool cap (None = reqwest default)
    #[serde(default)]
    pub pool_max_idle_per_host: Option<usize>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpCfg {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            stream_timeout_ms: None,
            pool_max_idle_per_host: None,
            user_agent: default_user_agent(),
        }
    }
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_user_agent() -> String {
    "deltafeed/0.1".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerCfg,
    /// HTTP client configuration (timeouts, pooling). Missing → defaults.
    #[serde(default)]
    pub http: HttpCfg,
    #[serde(default)]
    pub decoder: DecoderCfg,
}

impl Config {
    /// Load a Config from a file path (JSON or TOML by extension). If the
    /// extension is missing or unrecognized, try JSON first, then TOML.
    pub fn from_path<P: AsRef<Path>>(path: P) -> crate::error::CoreResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(crate::error::DeltaFeedError::from)?;
        let s = std::str::from_utf8(&bytes)
            .map_err(|e| crate::error::DeltaFeedError::Other(e.into()))?;
        let cfg: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str::<Self>(s)
                .map_err(|e| crate::error::DeltaFeedError::Other(e.into()))?,
            Some("toml") => toml::from_str::<Self>(s)
                .map_err(|e| crate::error::DeltaFeedError::Other(e.into()))?,
            _ => serde_json::from_str::<Self>(s)
                .map_err(|e| crate::error::DeltaFeedError::Other(e.into()))
                .or_else(|_| {
                    toml::from_str::<Self>(s)
                        .map_err(|e| crate::error::DeltaFeedError::Other(e.into()))
                })?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parsed `server.base_url`. Only http and https are accepted.
    pub fn base_url(&self) -> crate::error::CoreResult<Url> {
        let raw = &self.server.base_url;
        let url = Url::parse(raw).map_err(|e| {
            crate::error::DeltaFeedError::Validation(format!(
                "server.base_url '{raw}' is not a URL: {e}"
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(crate::error::DeltaFeedError::Validation(format!(
                "server.base_url must be an http(s) URL, got '{raw}'"
            )));
        }
        Ok(url)
    }

    pub fn validate(&self) -> crate::error::CoreResult<()> {
        self.base_url().map(|_| ())
    }
}

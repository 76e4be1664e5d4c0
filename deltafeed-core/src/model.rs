use http::Method;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::config::EndpointsCfg;
use crate::error::{CoreResult, DeltaFeedError};

/// Body of a free-form generation request.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ReviseBody {
    pub feedback: String,
}

/// JSON body attached to a stream request, if any.
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum RequestBody<'a> {
    Generate(&'a GenerateRequest),
    Revise(ReviseBody),
}

/// One streaming call against the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamRequest {
    Generate(GenerateRequest),
    Segment {
        session_id: String,
        index: u32,
    },
    Revise {
        session_id: String,
        index: u32,
        feedback: String,
    },
    Chat {
        conversation_id: String,
    },
}

impl StreamRequest {
    /// Stable endpoint label used in logs, spans and errors.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Generate(_) => "novel.generate",
            Self::Segment { .. } => "novel.segment",
            Self::Revise { .. } => "novel.revise",
            Self::Chat { .. } => "chat.stream",
        }
    }

    pub fn method(&self) -> Method {
        match self {
            Self::Generate(_) | Self::Revise { .. } => Method::POST,
            Self::Segment { .. } | Self::Chat { .. } => Method::GET,
        }
    }

    /// Full request URL: `base` plus the configured endpoint path, the id segments and the
    /// `segment` query for story calls.
    pub fn url(&self, base: &Url, endpoints: &EndpointsCfg) -> CoreResult<Url> {
        let (prefix, ids, segment) = match self {
            Self::Generate(_) => (endpoints.generate_path.as_str(), vec![], None),
            Self::Segment { session_id, index } => (
                endpoints.story_path.as_str(),
                vec![session_id.as_str(), "generate"],
                Some(*index),
            ),
            Self::Revise {
                session_id, index, ..
            } => (
                endpoints.story_path.as_str(),
                vec![session_id.as_str(), "revise"],
                Some(*index),
            ),
            Self::Chat { conversation_id } => (
                endpoints.chat_path.as_str(),
                vec![conversation_id.as_str()],
                None,
            ),
        };

        let mut url = base.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                DeltaFeedError::Validation(format!("base url '{base}' cannot carry a path"))
            })?;
            path.pop_if_empty();
            path.extend(prefix.split('/').filter(|p| !p.is_empty()));
            for id in ids {
                path.push(id);
            }
        }
        if let Some(i) = segment {
            url.query_pairs_mut().append_pair("segment", &i.to_string());
        }
        Ok(url)
    }

    pub fn body(&self) -> Option<RequestBody<'_>> {
        match self {
            Self::Generate(g) => Some(RequestBody::Generate(g)),
            Self::Revise { feedback, .. } => Some(RequestBody::Revise(ReviseBody {
                feedback: feedback.clone(),
            })),
            Self::Segment { .. } | Self::Chat { .. } => None,
        }
    }
}

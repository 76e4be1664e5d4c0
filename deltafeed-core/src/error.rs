use thiserror::Error;

/// Core error type for deltafeed.
/// Internally, modules can use `anyhow::Result<T>` for convenience,
/// but public boundaries should expose `CoreResult<T>` with this error.
#[derive(Debug, Error)]
pub enum DeltaFeedError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("rate limited by {endpoint}")]
    RateLimited {
        endpoint: String,
        retry_after: Option<u64>,
    },

    #[error("endpoint unavailable: {endpoint}")]
    Unavailable { endpoint: String },

    #[error("upstream error from {endpoint}: {code} {message}")]
    Upstream {
        endpoint: String,
        code: String,
        message: String,
    },

    /// The body stopped mid-stream; deltas already delivered stay valid.
    #[error("stream interrupted: {0}")]
    Transport(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DeltaFeedError {
    /// Stable label used in telemetry and span fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::RateLimited { .. } => "rate_limited",
            Self::Unavailable { .. } => "unavailable",
            Self::Upstream { .. } => "upstream",
            Self::Transport(_) => "transport",
            Self::Io(_) => "io",
            Self::Other(_) => "other",
        }
    }
}

pub type CoreResult<T> = std::result::Result<T, DeltaFeedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(DeltaFeedError::Transport("reset".into()).kind(), "transport");
        assert_eq!(
            DeltaFeedError::RateLimited {
                endpoint: "novel.generate".into(),
                retry_after: Some(3),
            }
            .kind(),
            "rate_limited"
        );
        let io: DeltaFeedError = std::io::Error::other("boom").into();
        assert_eq!(io.kind(), "io");
    }

    #[test]
    fn display_carries_context() {
        let err = DeltaFeedError::Upstream {
            endpoint: "chat.stream".into(),
            code: "404".into(),
            message: "no such conversation".into(),
        };
        assert_eq!(
            err.to_string(),
            "upstream error from chat.stream: 404 no such conversation"
        );
    }
}

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Core error type for ResearchMesh.
#[derive(Debug, Error)]
pub enum ResearchMeshError {
    #[error("configuration error: {0}")]
    InvalidConfiguration(String),
    #[error("I/O error while reading {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no API key supplied for this session")]
    MissingCredential,
    #[error("model backend rejected the credential: {0}")]
    Authentication(String),
    #[error("model backend rate limit reached: {0}")]
    RateLimited(String),
    #[error("model backend error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("request to model backend failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed model response: {0}")]
    MalformedResponse(String),
    #[error("tool `{tool}` failed: {message}")]
    Tool { tool: String, message: String },
    #[error("streaming responses are not supported")]
    StreamingUnsupported,
    #[error("orchestration failure: {0}")]
    Orchestration(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ResearchMeshError {
    pub fn config_io(path: PathBuf, source: std::io::Error) -> Self {
        Self::ConfigIo { path, source }
    }

    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Coarse category used by renderers and metrics.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::InvalidConfiguration(_) | Self::ConfigIo { .. } | Self::MissingCredential => {
                FailureKind::Configuration
            }
            Self::Authentication(_) => FailureKind::Authentication,
            Self::RateLimited(_) => FailureKind::RateLimit,
            Self::Api { .. } | Self::Transport(_) => FailureKind::Backend,
            Self::MalformedResponse(_) => FailureKind::MalformedResponse,
            Self::Tool { .. } => FailureKind::Tool,
            Self::StreamingUnsupported | Self::Orchestration(_) | Self::Other(_) => {
                FailureKind::Internal
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Configuration,
    Authentication,
    RateLimit,
    Backend,
    MalformedResponse,
    Tool,
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Configuration => "configuration",
            FailureKind::Authentication => "authentication",
            FailureKind::RateLimit => "rate_limit",
            FailureKind::Backend => "backend",
            FailureKind::MalformedResponse => "malformed_response",
            FailureKind::Tool => "tool",
            FailureKind::Internal => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_group_backend_failures() {
        let api = ResearchMeshError::Api {
            status: 500,
            message: "boom".into(),
        };
        assert_eq!(api.kind(), FailureKind::Backend);
        assert_eq!(
            ResearchMeshError::RateLimited("slow down".into()).kind(),
            FailureKind::RateLimit
        );
        assert_eq!(
            ResearchMeshError::tool("read_article", "404").kind(),
            FailureKind::Tool
        );
    }

    #[test]
    fn tool_error_display_names_tool() {
        let err = ResearchMeshError::tool("duckduckgo_search", "captcha");
        assert_eq!(err.to_string(), "tool `duckduckgo_search` failed: captcha");
    }
}

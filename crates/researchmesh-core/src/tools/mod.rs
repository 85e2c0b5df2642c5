//! Capability modules bound to agents.
//!
//! Each toolkit exposes one or more functions to the model. An agent holds
//! exactly one toolkit.

mod article;
mod duckduckgo;
mod hackernews;

pub use article::{Article, ArticleReaderTools};
pub use duckduckgo::{DuckDuckGoTools, SearchHit};
pub use hackernews::{HackerNewsTools, HackerNewsUser, Story};

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::ToolsConfig;

/// Function schema advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema for the function arguments.
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
    #[error("unexpected upstream payload: {0}")]
    Upstream(String),
}

impl ToolError {
    /// Errors the model caused itself; reported back to it instead of failing the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ToolError::InvalidArguments(_) | ToolError::UnknownFunction(_))
    }
}

/// A capability module: a named set of functions backed by one external service.
#[async_trait]
pub trait Toolkit: Send + Sync {
    fn name(&self) -> &str;

    fn functions(&self) -> Vec<ToolDefinition>;

    /// Invoke `function` with JSON arguments; returns the text handed back to the model.
    async fn invoke(&self, function: &str, arguments: Value) -> Result<String, ToolError>;
}

pub(crate) fn http_client(config: &ToolsConfig) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()
}

pub(crate) fn required_str<'a>(arguments: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing '{key}' parameter")))
}

pub(crate) fn optional_usize(arguments: &Value, key: &str) -> Option<usize> {
    arguments.get(key).and_then(|value| match value {
        Value::Number(number) => number.as_u64().map(|n| n as usize),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    })
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<String, ToolError> {
    serde_json::to_string(value).map_err(|err| ToolError::Upstream(err.to_string()))
}

//! Chat-completion backend used by every agent and by the team coordinator.
//!
//! `OpenAiChat` speaks the OpenAI `chat/completions` wire format (function
//! tools included) and is also usable against compatible endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::LlmConfig;
use crate::security::SessionCredential;
use crate::tools::ToolDefinition;
use crate::ResearchMeshError;

/// One message in a chat transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(default)]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Tool {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments, exactly as the model produced them.
    pub arguments: String,
}

#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
}

#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: TokenUsage,
}

impl ChatResponse {
    pub fn into_message(self) -> ChatMessage {
        ChatMessage::Assistant {
            content: self.content,
            tool_calls: self.tool_calls,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn add(&mut self, other: TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Chat model shared by the agents of a team.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Backend model identifier, e.g. `gpt-4o-mini`.
    fn id(&self) -> &str;

    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, ResearchMeshError>;
}

/// OpenAI chat-completions client bound to one session credential.
pub struct OpenAiChat {
    client: reqwest::Client,
    credential: SessionCredential,
    model: String,
    base_url: String,
}

impl OpenAiChat {
    pub fn new(
        credential: SessionCredential,
        config: &LlmConfig,
    ) -> Result<Self, ResearchMeshError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            credential,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction<'a>,
}

#[derive(Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct WireMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Deserialize)]
struct WireError {
    error: WireErrorDetail,
}

#[derive(Deserialize)]
struct WireErrorDetail {
    message: String,
}

#[async_trait]
impl ChatModel for OpenAiChat {
    fn id(&self) -> &str {
        &self.model
    }

    #[instrument(name = "llm.complete", skip(self, request), fields(model = %self.model, messages = request.messages.len(), tools = request.tools.len()))]
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, ResearchMeshError> {
        let body = WireRequest {
            model: &self.model,
            messages: &request.messages,
            tools: request
                .tools
                .iter()
                .map(|tool| WireTool {
                    kind: "function",
                    function: WireFunction {
                        name: &tool.name,
                        description: &tool.description,
                        parameters: &tool.parameters,
                    },
                })
                .collect(),
            stream: false,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.credential.expose())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &text));
        }

        let text = response.text().await?;
        let parsed: WireResponse = serde_json::from_str(&text)
            .map_err(|err| ResearchMeshError::MalformedResponse(err.to_string()))?;
        let choice = parsed.choices.into_iter().next().ok_or_else(|| {
            ResearchMeshError::MalformedResponse("response contained no choices".into())
        })?;

        let usage = parsed.usage.unwrap_or_default();
        debug!(
            total_tokens = usage.total_tokens,
            tool_calls = choice.message.tool_calls.as_ref().map_or(0, Vec::len),
            "model turn completed"
        );

        Ok(ChatResponse {
            content: choice.message.content,
            tool_calls: choice.message.tool_calls.unwrap_or_default(),
            usage,
        })
    }
}

fn classify_failure(status: StatusCode, body: &str) -> ResearchMeshError {
    let message = serde_json::from_str::<WireError>(body)
        .map(|err| err.error.message)
        .unwrap_or_else(|_| {
            if body.trim().is_empty() {
                status.to_string()
            } else {
                body.trim().to_string()
            }
        });

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ResearchMeshError::Authentication(message)
        }
        StatusCode::TOO_MANY_REQUESTS => ResearchMeshError::RateLimited(message),
        _ => ResearchMeshError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

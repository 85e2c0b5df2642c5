//! Agent roles: a name, a role description, one toolkit and the shared model.

use std::sync::Arc;

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::llm::{ChatMessage, ChatModel, ChatRequest, TokenUsage, ToolCall};
use crate::metrics::record_tool_call;
use crate::tools::{ToolError, Toolkit};
use crate::ResearchMeshError;

/// Stateless agent. Each `run` starts from a fresh transcript.
pub struct Agent {
    name: String,
    role: String,
    model: Arc<dyn ChatModel>,
    toolkit: Arc<dyn Toolkit>,
    add_datetime_to_context: bool,
    markdown: bool,
    max_tool_rounds: u8,
}

/// Serializable view of an agent's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub name: String,
    pub role: String,
    pub model: String,
    pub toolkit: String,
    pub functions: Vec<String>,
    pub add_datetime_to_context: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AgentRunOutput {
    pub content: String,
    pub tool_calls: usize,
    pub usage: TokenUsage,
}

impl Agent {
    pub fn new(
        name: impl Into<String>,
        role: impl Into<String>,
        model: Arc<dyn ChatModel>,
        toolkit: Arc<dyn Toolkit>,
    ) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            model,
            toolkit,
            add_datetime_to_context: false,
            markdown: false,
            max_tool_rounds: 6,
        }
    }

    pub fn with_datetime_context(mut self) -> Self {
        self.add_datetime_to_context = true;
        self
    }

    pub fn with_markdown(mut self, enabled: bool) -> Self {
        self.markdown = enabled;
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: u8) -> Self {
        self.max_tool_rounds = rounds.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn descriptor(&self) -> AgentDescriptor {
        AgentDescriptor {
            name: self.name.clone(),
            role: self.role.clone(),
            model: self.model.id().to_string(),
            toolkit: self.toolkit.name().to_string(),
            functions: self
                .toolkit
                .functions()
                .into_iter()
                .map(|function| function.name)
                .collect(),
            add_datetime_to_context: self.add_datetime_to_context,
        }
    }

    fn system_prompt(&self) -> String {
        let mut prompt = format!(
            "You are {}. Your role: {}\n\nUse your tools to gather facts before answering. \
             Cite the URLs you relied on.",
            self.name, self.role
        );
        if self.add_datetime_to_context {
            prompt.push_str(&format!(
                "\n\nThe current time is {}.",
                Local::now().format("%Y-%m-%d %H:%M:%S %Z")
            ));
        }
        if self.markdown {
            prompt.push_str("\n\nUse markdown to format your answers.");
        }
        prompt
    }

    /// Run one task to completion, executing tool calls as the model requests them.
    #[instrument(name = "agent.run", skip(self, task), fields(agent = %self.name))]
    pub async fn run(&self, task: &str) -> Result<AgentRunOutput, ResearchMeshError> {
        let mut messages = vec![
            ChatMessage::system(self.system_prompt()),
            ChatMessage::user(task),
        ];
        let functions = self.toolkit.functions();
        let mut output = AgentRunOutput::default();

        for round in 0..=self.max_tool_rounds {
            // The final round withholds tools so the model has to answer.
            let tools = if round < self.max_tool_rounds {
                functions.clone()
            } else {
                warn!(agent = %self.name, rounds = round, "tool round limit reached; requesting final answer");
                Vec::new()
            };

            let response = self
                .model
                .complete(ChatRequest {
                    messages: messages.clone(),
                    tools,
                })
                .await?;
            output.usage.add(response.usage);

            if response.tool_calls.is_empty() {
                output.content = response.content.unwrap_or_default().trim().to_string();
                info!(
                    agent = %self.name,
                    tool_calls = output.tool_calls,
                    chars = output.content.len(),
                    "agent finished"
                );
                return Ok(output);
            }

            let calls = response.tool_calls.clone();
            messages.push(response.into_message());
            for call in &calls {
                output.tool_calls += 1;
                let result = self.execute_call(call).await?;
                messages.push(ChatMessage::tool(call.id.clone(), result));
            }
        }

        Err(ResearchMeshError::MalformedResponse(format!(
            "{} kept requesting tools after the final round",
            self.name
        )))
    }

    async fn execute_call(&self, call: &ToolCall) -> Result<String, ResearchMeshError> {
        let function = call.function.name.as_str();
        let arguments = if call.function.arguments.trim().is_empty() {
            Ok(serde_json::Value::Object(Default::default()))
        } else {
            serde_json::from_str(&call.function.arguments)
                .map_err(|err| ToolError::InvalidArguments(err.to_string()))
        };

        let result = match arguments {
            Ok(arguments) => {
                debug!(agent = %self.name, function, %arguments, "invoking tool");
                self.toolkit.invoke(function, arguments).await
            }
            Err(err) => Err(err),
        };

        match result {
            Ok(content) => {
                record_tool_call(self.toolkit.name(), function, "ok");
                Ok(content)
            }
            Err(err) if err.is_recoverable() => {
                record_tool_call(self.toolkit.name(), function, "rejected");
                warn!(agent = %self.name, function, error = %err, "tool call rejected");
                Ok(format!("Error: {err}"))
            }
            Err(err) => {
                record_tool_call(self.toolkit.name(), function, "failed");
                Err(ResearchMeshError::tool(function, err.to_string()))
            }
        }
    }
}

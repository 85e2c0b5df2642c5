//! ResearchMesh core: a three-agent research team over an OpenAI-compatible
//! chat backend.
//!
//! The crate provides the agent roles, their toolkits (HackerNews, DuckDuckGo,
//! article extraction), the `graph_flow` backed team orchestrator and the
//! run-cycle state machine shared by the GUI and the CLI.

pub mod agent;
pub mod config;
pub mod error;
pub mod llm;
pub mod metrics;
pub mod render;
pub mod roles;
pub mod security;
pub mod session;
pub mod team;
pub mod telemetry;
pub mod tools;

pub use agent::{Agent, AgentDescriptor, AgentRunOutput};
pub use config::{Config, ConfigLoader, LlmConfig, TeamConfig, ToolsConfig};
pub use error::{FailureKind, ResearchMeshError};
pub use llm::{ChatMessage, ChatModel, ChatRequest, ChatResponse, OpenAiChat, TokenUsage};
pub use render::{escape_html, render_markdown};
pub use roles::{ResearchTeamFactory, TEAM_INSTRUCTIONS, TEAM_NAME, TeamFactory};
pub use security::{SessionCredential, redact_secrets};
pub use session::{Interaction, RunCycle, RunState};
pub use team::{MemberResponse, Orchestrator, RunOutput, Team, TeamDescriptor};
pub use telemetry::{TelemetryOptions, init_telemetry};
pub use tools::{ToolDefinition, ToolError, Toolkit};

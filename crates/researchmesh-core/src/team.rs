//! Team orchestration expressed as a `graph_flow` graph.
//!
//! Every run wires one graph task per member, in member order, followed by a
//! coordinator task that merges the members' findings into the final answer.

use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use async_trait::async_trait;
use graph_flow::{
    Context, ExecutionStatus, FlowRunner, GraphBuilder, InMemorySessionStorage, NextAction,
    Session, SessionStorage, Task, TaskResult,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::agent::{Agent, AgentDescriptor};
use crate::llm::{ChatMessage, ChatModel, ChatRequest, TokenUsage};
use crate::metrics::record_run;
use crate::ResearchMeshError;

const QUERY_KEY: &str = "query";
const TRANSCRIPT_KEY: &str = "team.transcript";
const CONTENT_KEY: &str = "team.content";
const COORDINATOR_ID: &str = "coordinator";

/// Merged result of one team run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    pub content: String,
    pub member_responses: Vec<MemberResponse>,
    pub model: String,
    pub usage: TokenUsage,
}

impl RunOutput {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            member_responses: Vec::new(),
            model: String::new(),
            usage: TokenUsage::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberResponse {
    pub member: String,
    pub content: String,
}

/// Serializable, comparable snapshot of a team's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamDescriptor {
    pub name: String,
    pub model: String,
    pub members: Vec<AgentDescriptor>,
    pub instructions: Vec<String>,
    pub markdown: bool,
    pub debug_mode: bool,
    pub show_members_responses: bool,
}

/// Boundary the run cycle talks to. Delegation strategy stays behind it.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    fn descriptor(&self) -> TeamDescriptor;

    /// Blocks (asynchronously) until the merged response is available.
    async fn run(&self, query: &str, stream: bool) -> Result<RunOutput, ResearchMeshError>;
}

pub struct Team {
    name: String,
    model: Arc<dyn ChatModel>,
    members: Vec<Arc<Agent>>,
    instructions: Vec<String>,
    markdown: bool,
    debug_mode: bool,
    show_members_responses: bool,
}

impl Team {
    pub fn new(name: impl Into<String>, model: Arc<dyn ChatModel>) -> Self {
        Self {
            name: name.into(),
            model,
            members: Vec::new(),
            instructions: Vec::new(),
            markdown: false,
            debug_mode: false,
            show_members_responses: false,
        }
    }

    pub fn with_member(mut self, agent: Agent) -> Self {
        self.members.push(Arc::new(agent));
        self
    }

    pub fn with_instructions<I, S>(mut self, instructions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.instructions.extend(instructions.into_iter().map(Into::into));
        self
    }

    pub fn with_markdown(mut self, enabled: bool) -> Self {
        self.markdown = enabled;
        self
    }

    pub fn with_debug_mode(mut self, enabled: bool) -> Self {
        self.debug_mode = enabled;
        self
    }

    pub fn with_members_responses(mut self, enabled: bool) -> Self {
        self.show_members_responses = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn brief(&self) -> Arc<TeamBrief> {
        Arc::new(TeamBrief {
            name: self.name.clone(),
            roster: self
                .members
                .iter()
                .map(|agent| (agent.name().to_string(), agent.role().to_string()))
                .collect(),
            instructions: self.instructions.clone(),
            markdown: self.markdown,
            debug_mode: self.debug_mode,
        })
    }

    fn build_graph(&self, ledger: &Arc<RunLedger>) -> (Arc<graph_flow::Graph>, String) {
        let brief = self.brief();

        let member_tasks: Vec<Arc<MemberTask>> = self
            .members
            .iter()
            .enumerate()
            .map(|(index, agent)| {
                Arc::new(MemberTask {
                    id: format!("member-{index}-{}", slug(agent.name())),
                    agent: agent.clone(),
                    brief: brief.clone(),
                    ledger: ledger.clone(),
                })
            })
            .collect();
        let coordinator = Arc::new(CoordinatorTask {
            model: self.model.clone(),
            brief,
            ledger: ledger.clone(),
        });

        let mut builder = GraphBuilder::new("research_team");
        for task in &member_tasks {
            builder = builder.add_task(task.clone());
        }
        builder = builder.add_task(coordinator.clone());

        let mut order: Vec<&str> = member_tasks.iter().map(|task| task.id()).collect();
        order.push(coordinator.id());
        for pair in order.windows(2) {
            builder = builder.add_edge(pair[0], pair[1]);
        }
        let start = order[0].to_string();
        let graph = Arc::new(builder.set_start_task(&start).build());

        (graph, start)
    }
}

#[async_trait]
impl Orchestrator for Team {
    fn descriptor(&self) -> TeamDescriptor {
        TeamDescriptor {
            name: self.name.clone(),
            model: self.model.id().to_string(),
            members: self.members.iter().map(|agent| agent.descriptor()).collect(),
            instructions: self.instructions.clone(),
            markdown: self.markdown,
            debug_mode: self.debug_mode,
            show_members_responses: self.show_members_responses,
        }
    }

    #[instrument(name = "team.run", skip(self, query), fields(team = %self.name))]
    async fn run(&self, query: &str, stream: bool) -> Result<RunOutput, ResearchMeshError> {
        if stream {
            return Err(ResearchMeshError::StreamingUnsupported);
        }

        let started = Instant::now();
        let result = self.execute(query).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(output) => {
                record_run("completed", duration_ms, self.members.len());
                info!(
                    duration_ms,
                    total_tokens = output.usage.total_tokens,
                    "team run completed"
                );
            }
            Err(err) => {
                record_run(err.kind().as_str(), duration_ms, self.members.len());
                error!(duration_ms, error = %err, "team run failed");
            }
        }

        result
    }
}

impl Team {
    async fn execute(&self, query: &str) -> Result<RunOutput, ResearchMeshError> {
        let ledger = Arc::new(RunLedger::default());
        let (graph, start) = self.build_graph(&ledger);

        let storage = Arc::new(InMemorySessionStorage::new());
        let runner = FlowRunner::new(graph, storage.clone());

        let session_id = Uuid::new_v4().to_string();
        let session = Session::new_from_task(session_id.clone(), &start);
        session.context.set(QUERY_KEY, query.to_string()).await;
        session
            .context
            .set(TRANSCRIPT_KEY, Vec::<MemberResponse>::new())
            .await;

        storage
            .save(session)
            .await
            .map_err(|err| anyhow!("failed to persist session: {err}"))?;

        loop {
            let result = runner
                .run(&session_id)
                .await
                .map_err(|err| anyhow!("graph execution failure: {err}"))?;

            match result.status {
                ExecutionStatus::Completed => break,
                ExecutionStatus::WaitingForInput => continue,
                ExecutionStatus::Error(message) => {
                    return Err(ResearchMeshError::Orchestration(message));
                }
            }
        }

        if let Some(failure) = ledger.failure.lock().await.take() {
            return Err(failure);
        }

        let session = storage
            .get(&session_id)
            .await
            .map_err(|err| anyhow!("failed to reload session: {err}"))?
            .ok_or_else(|| anyhow!("session missing after execution"))?;

        let content: String = session
            .context
            .get(CONTENT_KEY)
            .await
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(ResearchMeshError::MalformedResponse(
                "team produced an empty response".into(),
            ));
        }

        let member_responses: Vec<MemberResponse> = session
            .context
            .get(TRANSCRIPT_KEY)
            .await
            .unwrap_or_default();
        let usage = *ledger.usage.lock().await;

        Ok(RunOutput {
            content,
            member_responses,
            model: self.model.id().to_string(),
            usage,
        })
    }
}

/// Per-run side channel for failures and token accounting.
#[derive(Default)]
struct RunLedger {
    failure: Mutex<Option<ResearchMeshError>>,
    usage: Mutex<TokenUsage>,
}

impl RunLedger {
    async fn fail(&self, err: ResearchMeshError) {
        let mut slot = self.failure.lock().await;
        if slot.is_none() {
            *slot = Some(err);
        }
    }
}

struct TeamBrief {
    name: String,
    roster: Vec<(String, String)>,
    instructions: Vec<String>,
    markdown: bool,
    debug_mode: bool,
}

impl TeamBrief {
    fn numbered_instructions(&self) -> String {
        self.instructions
            .iter()
            .enumerate()
            .map(|(idx, instruction)| format!("{}. {}", idx + 1, instruction))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn member_prompt(&self, query: &str, transcript: &[MemberResponse]) -> String {
        let mut prompt = format!(
            "You are working as part of the team \"{}\".\n\nResearch request: {query}\n\nTeam instructions:\n{}",
            self.name,
            self.numbered_instructions()
        );
        if !transcript.is_empty() {
            prompt.push_str("\n\nFindings shared by your teammates so far:");
            prompt.push_str(&render_transcript(transcript));
        }
        prompt.push_str(
            "\n\nComplete the part of this research your role is responsible for. \
             Report concise findings and include the source URLs.",
        );
        prompt
    }

    fn coordinator_messages(&self, query: &str, transcript: &[MemberResponse]) -> Vec<ChatMessage> {
        let roster = self
            .roster
            .iter()
            .map(|(name, role)| format!("- {name}: {role}"))
            .collect::<Vec<_>>()
            .join("\n");
        let mut system = format!(
            "You are the leader of {}. Your team:\n{roster}\n\nInstructions:\n{}",
            self.name,
            self.numbered_instructions()
        );
        if self.markdown {
            system.push_str("\n\nUse markdown to format your answers.");
        }

        let mut user = format!("Research request: {query}");
        if transcript.is_empty() {
            user.push_str("\n\nNo findings were gathered by the team.");
        } else {
            user.push_str("\n\nFindings from your team:");
            user.push_str(&render_transcript(transcript));
        }
        user.push_str("\n\nWrite the final response for the user.");

        vec![ChatMessage::system(system), ChatMessage::user(user)]
    }
}

fn render_transcript(transcript: &[MemberResponse]) -> String {
    transcript
        .iter()
        .map(|response| format!("\n\n### {}\n{}", response.member, response.content))
        .collect()
}

fn slug(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

struct MemberTask {
    id: String,
    agent: Arc<Agent>,
    brief: Arc<TeamBrief>,
    ledger: Arc<RunLedger>,
}

#[async_trait]
impl Task for MemberTask {
    fn id(&self) -> &str {
        &self.id
    }

    #[instrument(name = "task.member", skip(self, context), fields(member = %self.agent.name()))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let query: String = context.get(QUERY_KEY).await.unwrap_or_default();
        let mut transcript: Vec<MemberResponse> =
            context.get(TRANSCRIPT_KEY).await.unwrap_or_default();

        let prompt = self.brief.member_prompt(&query, &transcript);
        if self.brief.debug_mode {
            debug!(member = %self.agent.name(), %prompt, "member prompt");
        }

        match self.agent.run(&prompt).await {
            Ok(output) => {
                self.ledger.usage.lock().await.add(output.usage);
                if self.brief.debug_mode {
                    debug!(member = %self.agent.name(), content = %output.content, "member response");
                }
                debug!(
                    member = %self.agent.name(),
                    tool_calls = output.tool_calls,
                    "member contributed findings"
                );
                transcript.push(MemberResponse {
                    member: self.agent.name().to_string(),
                    content: output.content,
                });
                context.set(TRANSCRIPT_KEY, &transcript).await;

                Ok(TaskResult::new(
                    Some(format!("{} contributed findings", self.agent.name())),
                    NextAction::ContinueAndExecute,
                ))
            }
            Err(err) => {
                let message = format!("{} failed: {err}", self.agent.name());
                self.ledger.fail(err).await;
                Ok(TaskResult::new(Some(message), NextAction::End))
            }
        }
    }
}

struct CoordinatorTask {
    model: Arc<dyn ChatModel>,
    brief: Arc<TeamBrief>,
    ledger: Arc<RunLedger>,
}

#[async_trait]
impl Task for CoordinatorTask {
    fn id(&self) -> &str {
        COORDINATOR_ID
    }

    #[instrument(name = "task.coordinator", skip(self, context))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let query: String = context.get(QUERY_KEY).await.unwrap_or_default();
        let transcript: Vec<MemberResponse> =
            context.get(TRANSCRIPT_KEY).await.unwrap_or_default();

        let messages = self.brief.coordinator_messages(&query, &transcript);
        let response = self
            .model
            .complete(ChatRequest {
                messages,
                tools: Vec::new(),
            })
            .await;

        match response {
            Ok(response) => {
                self.ledger.usage.lock().await.add(response.usage);
                let content = response.content.unwrap_or_default().trim().to_string();
                info!(chars = content.len(), "coordinator merged team findings");
                context.set(CONTENT_KEY, content.clone()).await;
                Ok(TaskResult::new(Some(content), NextAction::End))
            }
            Err(err) => {
                let message = format!("coordinator failed: {err}");
                self.ledger.fail(err).await;
                Ok(TaskResult::new(Some(message), NextAction::End))
            }
        }
    }
}

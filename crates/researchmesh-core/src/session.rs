//! One run cycle: credential gate, query validation, a single team run.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::FailureKind;
use crate::roles::TeamFactory;
use crate::security::{SessionCredential, redact_secrets};
use crate::team::RunOutput;

pub const CREDENTIAL_PROMPT: &str =
    "Please enter your OpenAI API key in the sidebar to get started.";
pub const QUERY_WARNING: &str = "Please enter a research query.";
pub const RUNNING_MESSAGE: &str = "Researching across agents...";
pub const SUCCESS_MESSAGE: &str = "Research complete!";

/// Everything one user interaction carries.
#[derive(Debug, Clone, Default)]
pub struct Interaction {
    pub credential: String,
    pub query: String,
    pub triggered: bool,
}

impl Interaction {
    pub fn trigger(credential: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            credential: credential.into(),
            query: query.into(),
            triggered: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    AwaitingCredential,
    Idle,
    Warned,
    Running,
    Completed { output: RunOutput },
    Failed { message: String, kind: FailureKind },
}

impl RunState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AwaitingCredential => "awaiting_credential",
            Self::Idle => "idle",
            Self::Warned => "warned",
            Self::Running => "running",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }

    /// Banner text for the state, if it has one.
    pub fn message(&self) -> Option<String> {
        match self {
            Self::AwaitingCredential => Some(CREDENTIAL_PROMPT.to_string()),
            Self::Idle => None,
            Self::Warned => Some(QUERY_WARNING.to_string()),
            Self::Running => Some(RUNNING_MESSAGE.to_string()),
            Self::Completed { .. } => Some(SUCCESS_MESSAGE.to_string()),
            Self::Failed { message, .. } => Some(format!("Research failed: {message}")),
        }
    }

    pub fn output(&self) -> Option<&RunOutput> {
        match self {
            Self::Completed { output } => Some(output),
            _ => None,
        }
    }
}

/// Drives a single interaction through the run-cycle state machine.
#[derive(Clone)]
pub struct RunCycle {
    factory: Arc<dyn TeamFactory>,
}

impl RunCycle {
    pub fn new(factory: Arc<dyn TeamFactory>) -> Self {
        Self { factory }
    }

    /// Handle one interaction, reporting each state to `observer` as it is
    /// entered. Returns the terminal state of the cycle.
    pub async fn handle(
        &self,
        interaction: &Interaction,
        observer: &mut (dyn FnMut(&RunState) + Send),
    ) -> RunState {
        match Self::admit(interaction) {
            Ok(credential) => self.run_admitted(&credential, &interaction.query, observer).await,
            Err(state) => enter(observer, state),
        }
    }

    /// Resolve the local gating states. `Ok` carries the credential of an
    /// interaction that should run; `Err` is the state to show instead.
    pub fn admit(interaction: &Interaction) -> Result<SessionCredential, RunState> {
        let Some(credential) = SessionCredential::from_input(&interaction.credential) else {
            return Err(RunState::AwaitingCredential);
        };

        if !interaction.triggered {
            return Err(RunState::Idle);
        }

        if interaction.query.trim().is_empty() {
            warn!("run triggered without a query");
            return Err(RunState::Warned);
        }

        Ok(credential)
    }

    /// Build the team and run `query` for an interaction that passed [`RunCycle::admit`].
    pub async fn run_admitted(
        &self,
        credential: &SessionCredential,
        query: &str,
        observer: &mut (dyn FnMut(&RunState) + Send),
    ) -> RunState {
        observer(&RunState::Running);
        let started = Instant::now();

        let outcome = match self.factory.build(credential) {
            Ok(team) => team.run(query, false).await,
            Err(err) => Err(err),
        };

        let state = match outcome {
            Ok(output) => {
                info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    members = output.member_responses.len(),
                    "run cycle completed"
                );
                RunState::Completed { output }
            }
            Err(err) => {
                let message = redact_secrets(&err.to_string());
                warn!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    kind = err.kind().as_str(),
                    error = %message,
                    "run cycle failed"
                );
                RunState::Failed {
                    message,
                    kind: err.kind(),
                }
            }
        };

        enter(observer, state)
    }
}

fn enter(observer: &mut (dyn FnMut(&RunState) + Send), state: RunState) -> RunState {
    observer(&state);
    state
}

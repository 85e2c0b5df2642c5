use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use researchmesh_core::{Interaction, MemberResponse, RunState, TeamDescriptor, TokenUsage, render_markdown};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::AppError;
use crate::state::{AppState, RunService};

#[derive(Debug, Deserialize)]
pub struct ResearchRequest {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct ResearchResponse {
    pub state: &'static str,
    pub message: String,
    pub content: String,
    pub html: String,
    pub model: String,
    pub usage: TokenUsage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_responses: Option<Vec<MemberResponse>>,
}

pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/research", post(research))
        .route("/team", get(team))
}

#[instrument(skip_all)]
async fn research(
    State(state): State<AppState>,
    Json(request): Json<ResearchRequest>,
) -> Result<Json<ResearchResponse>, AppError> {
    let interaction = Interaction::trigger(request.api_key, request.query);
    let session_id = RunService::new_session_id();
    let run_state = state.run_service().run(&session_id, &interaction).await;

    if let Some(error) = AppError::from_state(&run_state) {
        return Err(error);
    }

    let message = run_state.message().unwrap_or_default();
    match run_state {
        RunState::Completed { output } => {
            let member_responses = state
                .team()
                .show_members_responses
                .then_some(output.member_responses);
            Ok(Json(ResearchResponse {
                state: "completed",
                message,
                html: render_markdown(&output.content),
                content: output.content,
                model: output.model,
                usage: output.usage,
                member_responses,
            }))
        }
        other => Err(AppError::internal(format!(
            "run ended in unexpected state `{}`",
            other.name()
        ))),
    }
}

async fn team(State(state): State<AppState>) -> Json<TeamDescriptor> {
    Json(state.team().as_ref().clone())
}

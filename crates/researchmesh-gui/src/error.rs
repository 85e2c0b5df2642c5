use axum::{Json, http::StatusCode, response::IntoResponse};
use researchmesh_core::{FailureKind, RunState};
use serde::Serialize;
use std::fmt;

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    kind: Option<FailureKind>,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            kind: None,
        }
    }

    pub fn internal(error: impl ToString) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Map a non-successful run state onto an HTTP error.
    pub fn from_state(state: &RunState) -> Option<Self> {
        let message = state.message().unwrap_or_default();
        match state {
            RunState::AwaitingCredential => Some(Self::new(StatusCode::UNAUTHORIZED, message)),
            RunState::Warned => Some(Self::new(StatusCode::BAD_REQUEST, message)),
            RunState::Failed { kind, .. } => Some(Self {
                status: StatusCode::BAD_GATEWAY,
                message,
                kind: Some(*kind),
            }),
            RunState::Idle | RunState::Running | RunState::Completed { .. } => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let payload = ErrorResponse {
            error: self.message,
            kind: self.kind,
        };
        (self.status, Json(payload)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::internal(error.to_string())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<FailureKind>,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

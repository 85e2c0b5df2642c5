use axum::{
    Form, Router,
    extract::State,
    http::{HeaderMap, HeaderValue, header},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use researchmesh_core::RunState;
use serde::Deserialize;
use tracing::instrument;

use crate::state::{AppState, RunService};
use crate::view::{PageView, render_page};

pub const SESSION_COOKIE: &str = "researchmesh_session";

#[derive(Debug, Deserialize)]
pub struct CredentialForm {
    #[serde(default)]
    pub api_key: String,
}

#[derive(Debug, Deserialize)]
pub struct ResearchForm {
    #[serde(default)]
    pub query: String,
}

pub fn page_router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/credential", post(update_credential))
        .route("/research", post(research))
}

async fn index(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (session_id, issued) = resolve_session(&headers);
    let page = page_for(&state, &session_id, "", None);
    with_session_cookie(page, &session_id, issued)
}

#[instrument(skip_all)]
async fn update_credential(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<CredentialForm>,
) -> Response {
    let (session_id, issued) = resolve_session(&headers);
    state.run_service().set_credential(&session_id, &form.api_key);
    with_session_cookie(Redirect::to("/").into_response(), &session_id, issued)
}

#[instrument(skip_all)]
async fn research(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<ResearchForm>,
) -> Response {
    let (session_id, issued) = resolve_session(&headers);
    let run_state = state
        .run_service()
        .run_for_session(&session_id, &form.query)
        .await;
    let page = page_for(&state, &session_id, &form.query, Some(&run_state));
    with_session_cookie(page, &session_id, issued)
}

fn page_for(state: &AppState, session_id: &str, query: &str, run_state: Option<&RunState>) -> Response {
    let team = state.team();
    let has_credential = state.run_service().has_credential(session_id);
    Html(render_page(&PageView {
        has_credential,
        query,
        state: run_state,
        team: &team,
    }))
    .into_response()
}

/// Session id from the cookie, or a fresh one (`true` when newly issued).
fn resolve_session(headers: &HeaderMap) -> (String, bool) {
    match session_from_cookies(headers) {
        Some(id) => (id, false),
        None => (RunService::new_session_id(), true),
    }
}

fn session_from_cookies(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().strip_prefix(SESSION_COOKIE)?.strip_prefix('='))
        .map(str::trim)
        .find(|id| !id.is_empty() && id.len() <= 64 && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'))
        .map(str::to_string)
}

fn with_session_cookie(mut response: Response, session_id: &str, issued: bool) -> Response {
    if issued
        && let Ok(value) = HeaderValue::from_str(&format!(
            "{SESSION_COOKIE}={session_id}; Path=/; HttpOnly; SameSite=Lax"
        ))
    {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    response
}

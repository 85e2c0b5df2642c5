use std::future::IntoFuture;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderValue, header};
use axum_test::{TestResponse, TestServer};
use researchmesh_core::{
    MemberResponse, Orchestrator, ResearchMeshError, RunOutput, SessionCredential,
    TeamDescriptor, TeamFactory,
};
use researchmesh_gui::routes::{SESSION_COOKIE, build_router};
use researchmesh_gui::state::AppState;
use serde_json::{Value, json};
use tokio::sync::Notify;

#[derive(Default)]
struct Calls {
    builds: Mutex<Vec<String>>,
    runs: Mutex<Vec<(String, bool)>>,
}

struct StubTeam(Arc<Calls>);

#[async_trait]
impl Orchestrator for StubTeam {
    fn descriptor(&self) -> TeamDescriptor {
        descriptor(false)
    }

    async fn run(&self, query: &str, stream: bool) -> Result<RunOutput, ResearchMeshError> {
        self.0
            .runs
            .lock()
            .expect("lock")
            .push((query.to_string(), stream));

        if query.contains("fail") {
            return Err(ResearchMeshError::RateLimited(
                "Rate limit reached for key sk-live-abcdef".into(),
            ));
        }

        let mut output = RunOutput::new("## Summary\n...");
        output.member_responses.push(MemberResponse {
            member: "HackerNews Researcher".into(),
            content: "Top stories".into(),
        });
        Ok(output)
    }
}

struct StubFactory(Arc<Calls>);

impl TeamFactory for StubFactory {
    fn build(
        &self,
        credential: &SessionCredential,
    ) -> Result<Arc<dyn Orchestrator>, ResearchMeshError> {
        self.0
            .builds
            .lock()
            .expect("lock")
            .push(credential.expose().to_string());
        Ok(Arc::new(StubTeam(self.0.clone())))
    }
}

/// Runs whose query mentions "slow" park until `release` is notified.
struct ParkingTeam {
    calls: Arc<Calls>,
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl Orchestrator for ParkingTeam {
    fn descriptor(&self) -> TeamDescriptor {
        descriptor(false)
    }

    async fn run(&self, query: &str, stream: bool) -> Result<RunOutput, ResearchMeshError> {
        self.calls
            .runs
            .lock()
            .expect("lock")
            .push((query.to_string(), stream));
        if query.contains("slow") {
            self.entered.notify_one();
            self.release.notified().await;
        }
        Ok(RunOutput::new("## Summary\n..."))
    }
}

struct ParkingFactory {
    calls: Arc<Calls>,
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl TeamFactory for ParkingFactory {
    fn build(
        &self,
        _credential: &SessionCredential,
    ) -> Result<Arc<dyn Orchestrator>, ResearchMeshError> {
        Ok(Arc::new(ParkingTeam {
            calls: self.calls.clone(),
            entered: self.entered.clone(),
            release: self.release.clone(),
        }))
    }
}

fn descriptor(show_members: bool) -> TeamDescriptor {
    TeamDescriptor {
        name: "HackerNews AI Team".into(),
        model: "gpt-4o-mini".into(),
        members: Vec::new(),
        instructions: vec!["Produce a thoughtful, engaging summary.".into()],
        markdown: true,
        debug_mode: false,
        show_members_responses: show_members,
    }
}

fn server_with(show_members: bool) -> (TestServer, Arc<Calls>) {
    let calls = Arc::new(Calls::default());
    let state = AppState::new(
        Arc::new(StubFactory(calls.clone())),
        descriptor(show_members),
        2,
    );
    (TestServer::new(build_router(state)).unwrap(), calls)
}

fn session_cookie(response: &TestResponse) -> HeaderValue {
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .expect("session cookie issued")
        .to_string();
    let pair = set_cookie.split(';').next().expect("cookie pair").to_string();
    assert!(pair.starts_with(SESSION_COOKIE));
    HeaderValue::from_str(&pair).expect("cookie header")
}

/// Open a session and store `api_key` for it.
async fn session_with_key(server: &TestServer, api_key: &str) -> HeaderValue {
    let cookie = session_cookie(&server.get("/").await);
    let response = server
        .post("/credential")
        .add_header(header::COOKIE, cookie.clone())
        .form(&[("api_key", api_key)])
        .await;
    assert_eq!(response.status_code(), 303);
    cookie
}

#[tokio::test]
async fn missing_credential_shows_prompt_only() {
    let (server, calls) = server_with(false);

    let response = server.get("/").await;
    assert_eq!(response.status_code(), 200);
    let body = response.text();
    assert!(body.contains("Please enter your OpenAI API key in the sidebar to get started."));
    assert!(!body.contains("What do you want to research?"));

    // A research post without a key stays gated and never builds a team.
    let cookie = session_cookie(&response);
    let body = server
        .post("/research")
        .add_header(header::COOKIE, cookie)
        .form(&[("query", "rust")])
        .await
        .text();
    assert!(body.contains("Please enter your OpenAI API key"));
    assert!(calls.builds.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn stored_credential_unlocks_the_query_form() {
    let (server, _calls) = server_with(false);
    let cookie = session_with_key(&server, "sk-test").await;

    let body = server.get("/").add_header(header::COOKIE, cookie.clone()).await.text();
    assert!(body.contains("What do you want to research?"));
    assert!(!body.contains("Please enter your OpenAI API key in the sidebar"));
    assert!(!body.contains("sk-test"));

    // Blank input clears the key again.
    server
        .post("/credential")
        .add_header(header::COOKIE, cookie.clone())
        .form(&[("api_key", "  ")])
        .await;
    let body = server.get("/").add_header(header::COOKIE, cookie).await.text();
    assert!(body.contains("Please enter your OpenAI API key"));
}

#[tokio::test]
async fn blank_query_warns_without_running() {
    let (server, calls) = server_with(false);
    let cookie = session_with_key(&server, "sk-test").await;

    let body = server
        .post("/research")
        .add_header(header::COOKIE, cookie)
        .form(&[("query", "")])
        .await
        .text();
    assert!(body.contains("Please enter a research query."));
    assert!(!body.contains("Research complete!"));
    assert!(!body.contains("Research Output"));
    assert!(calls.runs.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn research_runs_once_and_renders_markdown() {
    let (server, calls) = server_with(false);
    let cookie = session_with_key(&server, "sk-test").await;

    let body = server
        .post("/research")
        .add_header(header::COOKIE, cookie)
        .form(&[("query", "Latest trends in Generative AI on HackerNews")])
        .await
        .text();

    assert!(body.contains("Research complete!"));
    assert!(body.contains("<h2>Summary</h2>"));
    assert!(!body.contains("<summary>HackerNews Researcher</summary>"));
    assert_eq!(*calls.builds.lock().expect("lock"), vec!["sk-test".to_string()]);
    assert_eq!(
        *calls.runs.lock().expect("lock"),
        vec![("Latest trends in Generative AI on HackerNews".to_string(), false)]
    );
}

#[tokio::test]
async fn member_responses_are_shown_when_enabled() {
    let (server, _calls) = server_with(true);
    let cookie = session_with_key(&server, "sk-test").await;

    let body = server
        .post("/research")
        .add_header(header::COOKIE, cookie)
        .form(&[("query", "rust")])
        .await
        .text();
    assert!(body.contains("<summary>HackerNews Researcher</summary>"));
}

#[tokio::test]
async fn failure_banner_is_redacted_and_session_stays_usable() {
    let (server, calls) = server_with(false);
    let cookie = session_with_key(&server, "sk-test").await;

    let body = server
        .post("/research")
        .add_header(header::COOKIE, cookie.clone())
        .form(&[("query", "please fail")])
        .await
        .text();
    assert!(body.contains("Research failed:"));
    assert!(!body.contains("Research complete!"));
    assert!(!body.contains("sk-live-abcdef"));

    let body = server
        .post("/research")
        .add_header(header::COOKIE, cookie)
        .form(&[("query", "rust")])
        .await
        .text();
    assert!(body.contains("Research complete!"));
    assert_eq!(calls.runs.lock().expect("lock").len(), 2);
}

#[tokio::test]
async fn json_api_maps_states_to_status_codes() {
    let (server, calls) = server_with(false);

    let response = server
        .post("/api/research")
        .json(&json!({"api_key": "", "query": "rust"}))
        .await;
    assert_eq!(response.status_code(), 401);

    let response = server
        .post("/api/research")
        .json(&json!({"api_key": "sk-test", "query": "   "}))
        .await;
    assert_eq!(response.status_code(), 400);
    assert_eq!(
        response.json::<Value>()["error"],
        "Please enter a research query."
    );

    let response = server
        .post("/api/research")
        .json(&json!({"api_key": "sk-test", "query": "fail please"}))
        .await;
    assert_eq!(response.status_code(), 502);
    let body = response.json::<Value>();
    assert_eq!(body["kind"], "rate_limit");
    assert!(!body["error"].as_str().unwrap_or_default().contains("sk-live-abcdef"));

    let response = server
        .post("/api/research")
        .json(&json!({"api_key": "sk-test", "query": "rust"}))
        .await;
    assert_eq!(response.status_code(), 200);
    let body = response.json::<Value>();
    assert_eq!(body["state"], "completed");
    assert_eq!(body["content"], "## Summary\n...");
    assert!(body.get("member_responses").is_none());

    assert_eq!(calls.runs.lock().expect("lock").len(), 2);
}

#[tokio::test]
async fn team_and_health_endpoints_need_no_credential() {
    let (server, calls) = server_with(false);

    let team = server.get("/api/team").await.json::<Value>();
    assert_eq!(team["name"], "HackerNews AI Team");
    assert_eq!(team["markdown"], true);

    let live = server.get("/health/live").await;
    assert_eq!(live.status_code(), 200);

    let ready = server.get("/health/ready").await;
    assert_eq!(ready.status_code(), 200);
    let body = ready.json::<Value>();
    assert_eq!(body["metrics"]["max_concurrency"], 2);
    assert_eq!(body["metrics"]["available_permits"], 2);

    assert!(calls.builds.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn saturated_service_queues_runs_and_reports_not_ready() {
    let calls = Arc::new(Calls::default());
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let queue = Notify::new();
    let factory = ParkingFactory {
        calls: calls.clone(),
        entered: entered.clone(),
        release: release.clone(),
    };
    let server =
        TestServer::new(build_router(AppState::new(Arc::new(factory), descriptor(false), 1)))
            .unwrap();
    let cookie = session_with_key(&server, "sk-test").await;

    let slow = server
        .post("/api/research")
        .json(&json!({"api_key": "sk-test", "query": "slow topic"}))
        .into_future();
    let queued = async {
        queue.notified().await;
        server
            .post("/api/research")
            .json(&json!({"api_key": "sk-test", "query": "queued topic"}))
            .await
    };
    let while_saturated = async {
        entered.notified().await;

        let ready = server.get("/health/ready").await;
        assert_eq!(ready.status_code(), 503);
        let body = ready.json::<Value>();
        assert_eq!(body["status"], "saturated");
        assert_eq!(body["metrics"]["available_permits"], 0);
        assert_eq!(body["metrics"]["running_runs"], 1);

        // Local gating answers without waiting for the busy permit.
        let body = server
            .post("/research")
            .add_header(header::COOKIE, cookie.clone())
            .form(&[("query", "  ")])
            .await
            .text();
        assert!(body.contains("Please enter a research query."));
        let keyless = server
            .post("/api/research")
            .json(&json!({"api_key": "", "query": "rust"}))
            .await;
        assert_eq!(keyless.status_code(), 401);

        queue.notify_one();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.runs.lock().expect("lock").len(), 1);

        release.notify_one();
    };

    let (slow, queued, ()) = tokio::join!(slow, queued, while_saturated);
    assert_eq!(slow.status_code(), 200);
    assert_eq!(queued.status_code(), 200);
    assert_eq!(queued.json::<Value>()["state"], "completed");
    assert_eq!(calls.runs.lock().expect("lock").len(), 2);

    let ready = server.get("/health/ready").await;
    assert_eq!(ready.status_code(), 200);
    let body = ready.json::<Value>();
    assert_eq!(body["metrics"]["running_runs"], 0);
    assert_eq!(body["metrics"]["available_permits"], 1);
}

use std::sync::Arc;

use researchmesh_core::session::{CREDENTIAL_PROMPT, QUERY_WARNING, SUCCESS_MESSAGE};
use researchmesh_core::{
    Config, Interaction, Orchestrator, ResearchMeshError, ResearchTeamFactory, RunCycle, RunState,
    SessionCredential, TeamFactory,
};
use serde_json::{Value, json};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SUMMARY: &str = "## Summary\n...";

fn answer(content: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 10, "completion_tokens": 4, "total_tokens": 14 }
    })
}

fn tool_call(id: &str, name: &str, arguments: &str) -> Value {
    json!({
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": id,
                    "type": "function",
                    "function": { "name": name, "arguments": arguments }
                }]
            },
            "finish_reason": "tool_calls"
        }],
        "usage": { "prompt_tokens": 8, "completion_tokens": 2, "total_tokens": 10 }
    })
}

/// Model backend plus HackerNews API on one mock server.
async fn research_backend() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("You are the leader of HackerNews AI Team"))
        .respond_with(ResponseTemplate::new(200).set_body_json(answer(SUMMARY)))
        .with_priority(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("\"tool_call_id\""))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(answer("Top story: Rust 2024 edition ships (https://blog.rust-lang.org)")),
        )
        .with_priority(2)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("You are HackerNews Researcher"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tool_call(
            "call_1",
            "get_top_hackernews_stories",
            r#"{"num_stories": 1}"#,
        )))
        .with_priority(3)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(answer("Nothing further to add.")))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/hn/topstories.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([101, 102])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/hn/item/101.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 101,
            "title": "Rust 2024 edition ships",
            "url": "https://blog.rust-lang.org",
            "score": 512,
            "by": "steveklabnik",
            "time": 1_730_000_000u64,
            "descendants": 88
        })))
        .mount(&server)
        .await;

    server
}

fn config_for(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.llm.base_url = format!("{}/v1", server.uri());
    config.tools.hackernews_base_url = format!("{}/hn", server.uri());
    config.tools.duckduckgo_url = format!("{}/ddg/", server.uri());
    config
}

fn credential() -> SessionCredential {
    SessionCredential::from_input("sk-test").expect("credential")
}

#[tokio::test]
async fn team_delegates_to_every_member_then_summarises() {
    let server = research_backend().await;
    let team = ResearchTeamFactory::new(config_for(&server))
        .build(&credential())
        .expect("team");

    let output = team
        .run("Latest trends in Generative AI on HackerNews", false)
        .await
        .expect("run should succeed");

    assert_eq!(output.content, SUMMARY);
    assert_eq!(output.model, "gpt-4o-mini");

    let members: Vec<&str> = output
        .member_responses
        .iter()
        .map(|response| response.member.as_str())
        .collect();
    assert_eq!(members, ["HackerNews Researcher", "Web Searcher", "Article Reader"]);
    assert!(output.member_responses[0].content.contains("Rust 2024"));

    // 2 calls for the researcher, 1 per other member, 1 for the coordinator.
    assert_eq!(output.usage.total_tokens, 10 + 14 * 4);

    let requests = server.received_requests().await.expect("recording enabled");
    let hn_item_fetches = requests
        .iter()
        .filter(|request| request.url.path() == "/hn/item/101.json")
        .count();
    assert_eq!(hn_item_fetches, 1);
    assert!(
        requests
            .iter()
            .filter(|request| request.url.path() == "/v1/chat/completions")
            .all(|request| request
                .headers
                .get("authorization")
                .is_some_and(|value| value == "Bearer sk-test"))
    );
}

#[tokio::test]
async fn streaming_is_rejected() {
    let server = MockServer::start().await;
    let team = ResearchTeamFactory::new(config_for(&server))
        .build(&credential())
        .expect("team");

    let err = team.run("anything", true).await.unwrap_err();
    assert!(matches!(err, ResearchMeshError::StreamingUnsupported));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn empty_summary_is_a_malformed_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(answer("   ")))
        .mount(&server)
        .await;

    let team = ResearchTeamFactory::new(config_for(&server))
        .build(&credential())
        .expect("team");
    let err = team.run("rust", false).await.unwrap_err();
    assert!(matches!(err, ResearchMeshError::MalformedResponse(_)));
}

#[tokio::test]
async fn rejected_credential_aborts_before_the_coordinator() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "message": "Incorrect API key provided: sk-test", "type": "invalid_request_error" }
        })))
        .mount(&server)
        .await;

    let team = ResearchTeamFactory::new(config_for(&server))
        .build(&credential())
        .expect("team");
    let err = team.run("rust", false).await.unwrap_err();
    assert!(matches!(err, ResearchMeshError::Authentication(_)));

    // The first member fails, so nothing after it is asked.
    assert_eq!(server.received_requests().await.expect("recording").len(), 1);
}

// Run-cycle scenarios against the real team wiring.

#[tokio::test]
async fn scenario_missing_credential_prompts_only() {
    let server = MockServer::start().await;
    let cycle = RunCycle::new(Arc::new(ResearchTeamFactory::new(config_for(&server))));

    let state = cycle
        .handle(&Interaction::trigger("", "rust"), &mut |_state: &RunState| {})
        .await;

    assert_eq!(state, RunState::AwaitingCredential);
    assert_eq!(state.message().as_deref(), Some(CREDENTIAL_PROMPT));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn scenario_blank_query_warns() {
    let server = MockServer::start().await;
    let cycle = RunCycle::new(Arc::new(ResearchTeamFactory::new(config_for(&server))));

    let state = cycle
        .handle(&Interaction::trigger("sk-test", ""), &mut |_state: &RunState| {})
        .await;

    assert_eq!(state, RunState::Warned);
    assert_eq!(state.message().as_deref(), Some(QUERY_WARNING));
    assert!(state.output().is_none());
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn scenario_successful_run_renders_content() {
    let server = research_backend().await;
    let cycle = RunCycle::new(Arc::new(ResearchTeamFactory::new(config_for(&server))));

    let mut states = Vec::new();
    let state = cycle
        .handle(
            &Interaction::trigger("sk-test", "Latest trends in Generative AI on HackerNews"),
            &mut |state: &RunState| states.push(state.name()),
        )
        .await;

    assert_eq!(states, ["running", "completed"]);
    assert_eq!(state.message().as_deref(), Some(SUCCESS_MESSAGE));
    let output = state.output().expect("completed output");
    assert_eq!(output.content, SUMMARY);
    assert!(researchmesh_core::render_markdown(&output.content).contains("<h2>Summary</h2>"));
}

#[tokio::test]
async fn scenario_backend_failure_keeps_session_usable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": { "message": "Rate limit reached" }
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(answer(SUMMARY)))
        .mount(&server)
        .await;

    let cycle = RunCycle::new(Arc::new(ResearchTeamFactory::new(config_for(&server))));
    let interaction = Interaction::trigger("sk-test", "rust");

    let failed = cycle.handle(&interaction, &mut |_state: &RunState| {}).await;
    match &failed {
        RunState::Failed { message, .. } => assert!(message.contains("Rate limit reached")),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_ne!(failed.message().as_deref(), Some(SUCCESS_MESSAGE));

    let retried = cycle.handle(&interaction, &mut |_state: &RunState| {}).await;
    assert_eq!(retried.output().map(|o| o.content.as_str()), Some(SUMMARY));
}

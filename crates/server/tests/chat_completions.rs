//! End-to-end tests for `POST /{project}/chat/completions`.
//!
//! The router runs against an in-process relay; agents are scripted tasks
//! subscribed to their prompt topic.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use threadgate_core::config::BridgeConfig;
use threadgate_relay::events::{AgentAnnouncement, AgentFragment, ProjectStatusEvent, ThreadPrompt};
use threadgate_relay::{echo, topics, MemoryTransport, Message, MessageTransport, RelayError, Subscription};
use threadgate_server::bridge::Bridge;
use threadgate_server::registry::ProjectRegistry;
use threadgate_server::router::build_router;
use threadgate_server::state::AppState;

const AGENT: &str = "agent-1";
const TIMEOUT: Duration = Duration::from_secs(5);

// ── Harness ───────────────────────────────────────────────────────

struct TestApp {
    relay: Arc<MemoryTransport>,
    registry: Arc<ProjectRegistry>,
    router: Router,
}

fn test_config() -> BridgeConfig {
    BridgeConfig {
        status_wait_secs: 0,
        armed_timeout_secs: 2,
        inter_fragment_timeout_secs: 2,
        ..BridgeConfig::default()
    }
}

fn app_with(relay: Arc<MemoryTransport>, transport: Arc<dyn MessageTransport>, config: BridgeConfig) -> TestApp {
    let registry = Arc::new(ProjectRegistry::new(false));
    let state = Arc::new(AppState {
        bridge: Bridge::new(registry.clone(), transport, &config),
        registry: registry.clone(),
        keep_alive: config.keep_alive(),
    });
    TestApp {
        relay,
        registry,
        router: build_router(state, "*"),
    }
}

fn app(config: BridgeConfig) -> TestApp {
    let relay = Arc::new(MemoryTransport::default());
    app_with(relay.clone(), relay, config)
}

impl TestApp {
    /// Register `project` with `AGENT` as its primary, last seen `age` ago.
    fn online(&self, project: &str, age: chrono::Duration) {
        self.registry.register(project);
        let event = ProjectStatusEvent {
            project: project.into(),
            backend: "backend-1".into(),
            agents: vec![AgentAnnouncement {
                identity: AGENT.into(),
                name: "Agent".into(),
                primary: true,
            }],
            created_at: Utc::now(),
        };
        self.registry.apply_status(&event, Utc::now() - age);
    }

    /// Answer every prompt for `AGENT` with the messages `script` builds.
    async fn agent<F>(&self, script: F)
    where
        F: Fn(&ThreadPrompt) -> Vec<Message> + Send + 'static,
    {
        let mut prompts = self.relay.subscribe(&topics::prompt(AGENT)).await.unwrap();
        let relay = self.relay.clone();
        tokio::spawn(async move {
            while let Some(msg) = prompts.recv().await {
                let prompt: ThreadPrompt = msg.decode().unwrap();
                for reply in script(&prompt) {
                    relay.publish(reply).await.unwrap();
                }
            }
        });
    }

    async fn post(&self, project: &str, body: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("POST")
            .uri(format!("/{project}/chat/completions"))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = tokio::time::timeout(TIMEOUT, self.router.clone().oneshot(request))
            .await
            .expect("request timed out")
            .unwrap();
        let status = response.status();
        let bytes = tokio::time::timeout(TIMEOUT, response.into_body().collect())
            .await
            .expect("body timed out")
            .unwrap()
            .to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }
}

fn fragment(prompt: &ThreadPrompt, fragment: &AgentFragment) -> Message {
    Message::new(topics::thread(&prompt.thread_id), fragment).unwrap()
}

fn text(prompt: &ThreadPrompt, seq: Option<u64>, s: &str) -> Message {
    fragment(prompt, &AgentFragment::text_delta(&prompt.thread_id, AGENT, seq, s))
}

fn finish(prompt: &ThreadPrompt, seq: Option<u64>) -> Message {
    fragment(prompt, &AgentFragment::finish(&prompt.thread_id, AGENT, seq))
}

fn request(content: &str, stream: bool) -> String {
    json!({
        "model": "gpt-4",
        "messages": [{"role": "user", "content": content}],
        "stream": stream
    })
    .to_string()
}

/// `data:` payloads of an SSE body, in order.
fn sse_data(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")))
        .map(str::to_string)
        .collect()
}

fn content_of(events: &[String]) -> String {
    events
        .iter()
        .filter(|e| e.as_str() != "[DONE]")
        .filter_map(|e| serde_json::from_str::<Value>(e).ok())
        .filter_map(|v| v["choices"][0]["delta"]["content"].as_str().map(str::to_string))
        .collect()
}

fn error_type(body: &str) -> String {
    let v: Value = serde_json::from_str(body).unwrap();
    v["error"]["type"].as_str().unwrap().to_string()
}

// ── Streaming ─────────────────────────────────────────────────────

#[tokio::test]
async fn streams_reply_with_role_chunks_stop_and_sentinel() {
    let app = app(test_config());
    app.online("demo", chrono::Duration::seconds(1));
    app.agent(|p| vec![text(p, None, "Hello"), text(p, None, "!"), finish(p, None)]).await;

    let (status, body) = app.post("demo", &request("Hello", true)).await;
    assert_eq!(status, StatusCode::OK);

    let events = sse_data(&body);
    assert_eq!(events.len(), 5, "{body}");
    assert_eq!(events[4], "[DONE]");

    let chunks: Vec<Value> = events[..4].iter().map(|e| serde_json::from_str(e).unwrap()).collect();
    let id = chunks[0]["id"].as_str().unwrap();
    assert!(id.starts_with("chatcmpl-"));
    assert_eq!(id.len(), "chatcmpl-".len() + 24);
    for chunk in &chunks {
        assert_eq!(chunk["id"], id);
        assert_eq!(chunk["object"], "chat.completion.chunk");
        assert_eq!(chunk["model"], "gpt-4");
    }

    assert_eq!(chunks[0]["choices"][0]["delta"], json!({"role": "assistant"}));
    assert_eq!(chunks[1]["choices"][0]["delta"], json!({"content": "Hello"}));
    assert_eq!(chunks[2]["choices"][0]["delta"], json!({"content": "!"}));
    assert_eq!(chunks[3]["choices"][0]["delta"], json!({}));
    assert_eq!(chunks[3]["choices"][0]["finish_reason"], "stop");
    assert!(chunks[1]["choices"][0]["finish_reason"].is_null());
}

#[tokio::test]
async fn redelivered_fragment_is_emitted_once() {
    let app = app(test_config());
    app.online("demo", chrono::Duration::seconds(1));
    app.agent(|p| {
        let hello = text(p, None, "Hello");
        vec![hello.clone(), hello, finish(p, None)]
    })
    .await;

    let (_, body) = app.post("demo", &request("Hi", true)).await;
    assert_eq!(content_of(&sse_data(&body)), "Hello");
}

#[tokio::test]
async fn sequenced_fragments_are_put_back_in_order() {
    let app = app(test_config());
    app.online("demo", chrono::Duration::seconds(1));
    app.agent(|p| {
        vec![
            text(p, Some(0), "one "),
            text(p, Some(2), "three"),
            text(p, Some(1), "two "),
            finish(p, Some(3)),
        ]
    })
    .await;

    let (_, body) = app.post("demo", &request("count", true)).await;
    assert_eq!(content_of(&sse_data(&body)), "one two three");
}

#[tokio::test]
async fn silent_agent_times_out_with_error_then_sentinel() {
    let app = app(BridgeConfig {
        armed_timeout_secs: 1,
        ..test_config()
    });
    app.online("demo", chrono::Duration::seconds(1));
    app.agent(|_| Vec::new()).await;

    let started = std::time::Instant::now();
    let (status, body) = app.post("demo", &request("anyone?", true)).await;
    let elapsed = started.elapsed();

    assert_eq!(status, StatusCode::OK);
    let events = sse_data(&body);
    assert_eq!(events.last().map(String::as_str), Some("[DONE]"));
    let error: Value = serde_json::from_str(&events[events.len() - 2]).unwrap();
    assert_eq!(error["error"]["type"], "timeout_error");
    assert_eq!(events.iter().filter(|e| e.contains("\"error\"")).count(), 1);
    assert!(elapsed >= Duration::from_millis(900), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "{elapsed:?}");
}

#[tokio::test]
async fn concurrent_requests_get_their_own_threads() {
    let app = app(test_config());
    app.online("demo", chrono::Duration::seconds(1));
    let relay: Arc<dyn MessageTransport> = app.relay.clone();
    tokio::spawn(echo::serve(relay, AGENT.to_string(), Duration::from_millis(5)));
    tokio::time::sleep(Duration::from_millis(20)).await;

    let req_a = request("alpha beta gamma", true);
    let req_b = request("one two three four", true);
    let (a, b) = tokio::join!(app.post("demo", &req_a), app.post("demo", &req_b),);

    let (a_events, b_events) = (sse_data(&a.1), sse_data(&b.1));
    assert_eq!(content_of(&a_events), "alpha beta gamma");
    assert_eq!(content_of(&b_events), "one two three four");

    let id = |events: &[String]| -> String {
        let v: Value = serde_json::from_str(&events[0]).unwrap();
        v["id"].as_str().unwrap().to_string()
    };
    assert_ne!(id(&a_events), id(&b_events));
}

// ── Non-streaming ─────────────────────────────────────────────────

#[tokio::test]
async fn non_streaming_returns_one_completion() {
    let app = app(test_config());
    app.online("demo", chrono::Duration::seconds(1));
    app.agent(|p| vec![text(p, None, "Hello"), text(p, None, "!"), finish(p, None)]).await;

    let (status, body) = app.post("demo", &request("Hello", false)).await;
    assert_eq!(status, StatusCode::OK);

    let v: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(v["object"], "chat.completion");
    assert_eq!(v["model"], "gpt-4");
    assert_eq!(v["choices"][0]["message"], json!({"role": "assistant", "content": "Hello!"}));
    assert_eq!(v["choices"][0]["finish_reason"], "stop");
}

#[tokio::test]
async fn non_streaming_timeout_is_504() {
    let app = app(BridgeConfig {
        armed_timeout_secs: 1,
        ..test_config()
    });
    app.online("demo", chrono::Duration::seconds(1));
    app.agent(|_| Vec::new()).await;

    let (status, body) = app.post("demo", &request("hi", false)).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(error_type(&body), "timeout_error");
}

#[tokio::test]
async fn garbage_from_agent_is_502() {
    let app = app(test_config());
    app.online("demo", chrono::Duration::seconds(1));
    app.agent(|p| {
        (0..6)
            .map(|_| Message::new(topics::thread(&p.thread_id), &"garbage").unwrap())
            .collect()
    })
    .await;

    let (status, body) = app.post("demo", &request("hi", false)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(error_type(&body), "bad_gateway_error");
}

// ── Rejections before streaming ───────────────────────────────────

#[tokio::test]
async fn unknown_project_is_404() {
    let app = app(test_config());
    let (status, body) = app.post("nope", &request("hi", true)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_type(&body), "not_found_error");
    assert!(!body.contains("data:"));
}

#[tokio::test]
async fn project_without_agents_is_503() {
    let app = app(test_config());
    app.registry.register("quiet");
    let (status, body) = app.post("quiet", &request("hi", true)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(error_type(&body), "service_unavailable_error");
}

#[tokio::test]
async fn stale_primary_is_503() {
    let app = app(test_config());
    app.online("demo", chrono::Duration::seconds(301));
    let (status, _) = app.post("demo", &request("hi", false)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn invalid_requests_are_400() {
    let app = app(test_config());
    app.online("demo", chrono::Duration::seconds(1));

    let bodies = [
        "not json".to_string(),
        json!({"model": "m", "messages": []}).to_string(),
        json!({"model": "m", "messages": [{"role": "wizard", "content": "hi"}]}).to_string(),
        json!({"model": "m", "messages": [{"role": "system", "content": "be nice"}]}).to_string(),
        json!({"model": "m", "messages": [{"role": "user", "content": "   "}]}).to_string(),
    ];
    for body in bodies {
        let (status, response) = app.post("demo", &body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(error_type(&response), "invalid_request_error", "{body}");
    }
}

// ── Relay failures ────────────────────────────────────────────────

/// Delivers subscriptions but refuses every publish.
struct RefusingRelay(Arc<MemoryTransport>);

#[async_trait]
impl MessageTransport for RefusingRelay {
    async fn publish(&self, _message: Message) -> Result<(), RelayError> {
        Err(RelayError::Transport("broker down".into()))
    }

    async fn subscribe(&self, topic_prefix: &str) -> Result<Subscription, RelayError> {
        self.0.subscribe(topic_prefix).await
    }
}

#[tokio::test]
async fn publish_failure_is_500() {
    let relay = Arc::new(MemoryTransport::default());
    let app = app_with(relay.clone(), Arc::new(RefusingRelay(relay)), test_config());
    app.online("demo", chrono::Duration::seconds(1));

    let (status, body) = app.post("demo", &request("hi", false)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_type(&body), "server_error");

    let (status, body) = app.post("demo", &request("hi", true)).await;
    assert_eq!(status, StatusCode::OK);
    let events = sse_data(&body);
    assert!(events.iter().any(|e| e.contains("server_error")));
    assert_eq!(events.last().map(String::as_str), Some("[DONE]"));
}

// ── Health ────────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_project_count() {
    let app = app(test_config());
    app.registry.register("a");
    app.registry.register("b");

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let v: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(v["status"], "ok");
    assert_eq!(v["projects"], 2);
}

//! Integration tests for the agent-state WebSocket + REST bridge.
//!
//! Each test spins up an Axum server on a random port, connects via
//! tokio-tungstenite, and exercises the real WS / REST contract.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use esports_copilot::agent::{AgentStateStore, SignOutPolicy};
use esports_copilot::instructions::PageContext;
use esports_copilot::relay::{InMemoryTranscript, MessageRelay, RelayPolicy};
use esports_copilot::render::ToolRenderRegistry;
use esports_copilot::routes::{CopilotState, copilot_routes};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

fn london_page() -> PageContext {
    PageContext {
        page_id: "esports-jobs-london".into(),
        page_type: "location-hub".into(),
        title: "Esports Jobs London - The UK's Esports Capital".into(),
        page_h1: Some("Esports Jobs London: The UK's Esports Capital".into()),
        page_url: "/test-london".into(),
        page_description: None,
        location: Some("London".into()),
        companies: vec!["Fnatic".into(), "FACEIT".into()],
    }
}

/// Start an Axum server on a random port, return (port, state).
async fn start_server() -> (u16, CopilotState) {
    let store = AgentStateStore::new("esports_agent", SignOutPolicy::Clear);
    let relay = Arc::new(MessageRelay::new(
        InMemoryTranscript::new(),
        RelayPolicy::UserOnly,
    ));
    let state = CopilotState::new(
        store,
        relay,
        Arc::new(ToolRenderRegistry::with_defaults()),
        Some(london_page()),
    );
    let app = copilot_routes(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (port, state)
}

/// Parse a WS text frame into a serde_json::Value.
fn parse_ws_json(msg: &Message) -> Value {
    match msg {
        Message::Text(txt) => serde_json::from_str(txt).expect("invalid JSON from server"),
        other => panic!("expected Text frame, got {:?}", other),
    }
}

fn jo_session() -> Value {
    json!({
        "status": "signed_in",
        "user": {"id": "u1", "name": "Jo Smith", "email": "jo@x.com"}
    })
}

// ── WebSocket Tests ──────────────────────────────────────────────────

#[tokio::test]
async fn ws_connect_receives_initial_snapshot() {
    timeout(TEST_TIMEOUT, async {
        let (port, _state) = start_server().await;

        let (mut ws, _resp) = connect_async(format!("ws://127.0.0.1:{port}/ws/agent"))
            .await
            .expect("WS connect failed");

        let msg = ws.next().await.unwrap().unwrap();
        let json = parse_ws_json(&msg);

        assert_eq!(json["type"], "state_snapshot");
        assert_eq!(json["version"], 0);
        assert!(json["state"]["jobs"].as_array().unwrap().is_empty());
        assert_eq!(json["state"]["search_query"], "");
        assert!(json["state"].get("user").is_none());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn ws_session_sync_broadcasts_once() {
    timeout(TEST_TIMEOUT, async {
        let (port, state) = start_server().await;

        let (mut ws, _) = connect_async(format!("ws://127.0.0.1:{port}/ws/agent"))
            .await
            .unwrap();
        let _ = ws.next().await.unwrap().unwrap();

        let frame = json!({"type": "session", "session": jo_session()});
        ws.send(Message::Text(frame.to_string().into())).await.unwrap();
        ws.send(Message::Text(frame.to_string().into())).await.unwrap();

        let msg = ws.next().await.unwrap().unwrap();
        let json = parse_ws_json(&msg);
        assert_eq!(json["type"], "state_snapshot");
        assert_eq!(json["version"], 1);
        assert_eq!(json["state"]["user"]["id"], "u1");
        assert_eq!(json["state"]["user"]["firstName"], "Jo");

        // The duplicate frame must not produce a second write.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(state.store.version().await, 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn ws_agent_update_keeps_user() {
    timeout(TEST_TIMEOUT, async {
        let (port, state) = start_server().await;

        let client = reqwest::Client::new();
        client
            .post(format!("http://127.0.0.1:{port}/api/session"))
            .json(&jo_session())
            .send()
            .await
            .unwrap();

        let (mut ws, _) = connect_async(format!("ws://127.0.0.1:{port}/ws/agent"))
            .await
            .unwrap();
        let _ = ws.next().await.unwrap().unwrap();

        let update = json!({
            "type": "agent_update",
            "state": {
                "search_query": "remote esports jobs",
                "jobs": [{
                    "id": "j1",
                    "title": "Esports Coach",
                    "company": "Fnatic",
                    "location": "London",
                    "type": "full-time",
                    "salary": "£35,000 - £70,000",
                    "url": "https://esportsjobs.quest/jobs/j1"
                }]
            }
        });
        ws.send(Message::Text(update.to_string().into())).await.unwrap();

        let msg = ws.next().await.unwrap().unwrap();
        let json = parse_ws_json(&msg);
        assert_eq!(json["type"], "state_snapshot");
        assert_eq!(json["state"]["search_query"], "remote esports jobs");
        assert_eq!(json["state"]["jobs"][0]["type"], "full-time");
        assert_eq!(json["state"]["user"]["id"], "u1");

        assert_eq!(state.store.state().await.jobs.len(), 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn ws_tool_call_lifecycle_renders_views() {
    timeout(TEST_TIMEOUT, async {
        let (port, _state) = start_server().await;

        let (mut ws, _) = connect_async(format!("ws://127.0.0.1:{port}/ws/agent"))
            .await
            .unwrap();
        let _ = ws.next().await.unwrap().unwrap();

        let executing = json!({
            "type": "tool_call",
            "name": "search_esports_jobs",
            "status": "executing"
        });
        ws.send(Message::Text(executing.to_string().into())).await.unwrap();

        let msg = ws.next().await.unwrap().unwrap();
        let json = parse_ws_json(&msg);
        assert_eq!(json["type"], "tool_call_view");
        assert_eq!(json["name"], "search_esports_jobs");
        assert_eq!(json["view"]["view"], "loading");

        let complete = json!({
            "type": "tool_call",
            "name": "search_esports_jobs",
            "status": "complete",
            "result": {"jobs": [], "search_query": "remote esports jobs"}
        });
        ws.send(Message::Text(complete.to_string().into())).await.unwrap();

        let msg = ws.next().await.unwrap().unwrap();
        let json = parse_ws_json(&msg);
        assert_eq!(json["type"], "tool_call_view");
        assert_eq!(json["view"]["view"], "empty");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn ws_late_tool_event_does_not_replace_results() {
    timeout(TEST_TIMEOUT, async {
        let (port, _state) = start_server().await;

        let (mut ws, _) = connect_async(format!("ws://127.0.0.1:{port}/ws/agent"))
            .await
            .unwrap();
        let _ = ws.next().await.unwrap().unwrap();

        let complete = json!({
            "type": "tool_call",
            "name": "search_esports_jobs",
            "call_id": "call-1",
            "status": "complete",
            "result": {
                "query": "coach",
                "jobs": [{
                    "title": "Esports Coach",
                    "company": "Fnatic",
                    "location": "London",
                    "salary": "Competitive",
                    "url": "https://esportsjobs.quest/jobs"
                }]
            }
        });
        ws.send(Message::Text(complete.to_string().into())).await.unwrap();

        let json = parse_ws_json(&ws.next().await.unwrap().unwrap());
        assert_eq!(json["call_id"], "call-1");
        assert_eq!(json["view"]["view"], "results");

        // Arrives after complete for the same call: must not be broadcast.
        let late = json!({
            "type": "tool_call",
            "name": "search_esports_jobs",
            "call_id": "call-1",
            "status": "executing"
        });
        ws.send(Message::Text(late.to_string().into())).await.unwrap();

        let next_call = json!({
            "type": "tool_call",
            "name": "search_esports_jobs",
            "call_id": "call-2",
            "status": "complete",
            "result": {"jobs": [], "search_query": "caster"}
        });
        ws.send(Message::Text(next_call.to_string().into())).await.unwrap();

        let json = parse_ws_json(&ws.next().await.unwrap().unwrap());
        assert_eq!(json["call_id"], "call-2");
        assert_eq!(json["view"]["view"], "empty");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn ws_agent_update_with_agent_job_shape() {
    timeout(TEST_TIMEOUT, async {
        let (port, state) = start_server().await;

        let (mut ws, _) = connect_async(format!("ws://127.0.0.1:{port}/ws/agent"))
            .await
            .unwrap();
        let _ = ws.next().await.unwrap().unwrap();

        let update = json!({
            "type": "agent_update",
            "state": {
                "search_query": "coach",
                "jobs": [{"title": "Coach", "company": "Fnatic", "location": "London"}]
            }
        });
        ws.send(Message::Text(update.to_string().into())).await.unwrap();

        let json = parse_ws_json(&ws.next().await.unwrap().unwrap());
        assert_eq!(json["type"], "state_snapshot");
        assert_eq!(json["state"]["search_query"], "coach");
        assert_eq!(json["state"]["jobs"][0]["title"], "Coach");
        assert_eq!(state.store.state().await.jobs.len(), 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn multiple_ws_clients_receive_broadcasts() {
    timeout(TEST_TIMEOUT, async {
        let (port, state) = start_server().await;

        let (mut ws1, _) = connect_async(format!("ws://127.0.0.1:{port}/ws/agent"))
            .await
            .unwrap();
        let (mut ws2, _) = connect_async(format!("ws://127.0.0.1:{port}/ws/agent"))
            .await
            .unwrap();
        let _ = ws1.next().await.unwrap().unwrap();
        let _ = ws2.next().await.unwrap().unwrap();

        state
            .store
            .apply_agent_update(esports_copilot::agent::AgentStatePatch {
                jobs: None,
                search_query: Some("valorant".into()),
            })
            .await;

        for ws in [&mut ws1, &mut ws2] {
            let msg = ws.next().await.unwrap().unwrap();
            let json = parse_ws_json(&msg);
            assert_eq!(json["state"]["search_query"], "valorant");
        }
    })
    .await
    .expect("test timed out");
}

// ── REST Tests ───────────────────────────────────────────────────────

#[tokio::test]
async fn rest_health_endpoint() {
    timeout(TEST_TIMEOUT, async {
        let (port, _state) = start_server().await;

        let resp = reqwest::get(format!("http://127.0.0.1:{port}/health"))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "esports-copilot");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn rest_voice_user_message_reaches_transcript() {
    timeout(TEST_TIMEOUT, async {
        let (port, _state) = start_server().await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("http://127.0.0.1:{port}/api/voice/message"))
            .json(&json!({"text": "find coaching jobs", "role": "user"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["outcome"], "appended");

        let resp = client
            .post(format!("http://127.0.0.1:{port}/api/voice/message"))
            .json(&json!({"text": "Here are some coaching jobs", "role": "assistant"}))
            .send()
            .await
            .unwrap();
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["outcome"], "dropped");

        let transcript: Vec<Value> = reqwest::get(format!("http://127.0.0.1:{port}/api/transcript"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0]["content"], "find coaching jobs");
        assert_eq!(transcript[0]["role"], "user");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn rest_tool_call_results_echo_result_query() {
    timeout(TEST_TIMEOUT, async {
        let (port, _state) = start_server().await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("http://127.0.0.1:{port}/api/tool-calls/search_esports_jobs"))
            .json(&json!({
                "status": "complete",
                "result": {
                    "search_query": "fnatic coaching",
                    "jobs": [{
                        "id": "j2",
                        "title": "Assistant Coach",
                        "company": "Fnatic",
                        "location": "London",
                        "type": "full-time",
                        "salary": "£40,000",
                        "url": "https://esportsjobs.quest/jobs/j2"
                    }]
                }
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["view"], "results");
        assert_eq!(body["query"], "fnatic coaching");
        assert_eq!(body["jobs"][0]["title"], "Assistant Coach");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn rest_instructions_follow_session() {
    timeout(TEST_TIMEOUT, async {
        let (port, _state) = start_server().await;
        let client = reqwest::Client::new();

        let guest: Value = reqwest::get(format!("http://127.0.0.1:{port}/api/instructions"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let text = guest["instructions"].as_str().unwrap();
        assert!(text.contains("Page URL: /test-london"));
        assert!(text.contains("## GUEST USER"));
        assert_eq!(guest["labels"]["title"], "London Esports Jobs AI");

        client
            .post(format!("http://127.0.0.1:{port}/api/session"))
            .json(&jo_session())
            .send()
            .await
            .unwrap();

        let signed_in: Value = reqwest::get(format!("http://127.0.0.1:{port}/api/instructions"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let text = signed_in["instructions"].as_str().unwrap();
        assert!(text.contains("User ID: u1"));
        assert!(text.contains("User Email: jo@x.com"));
        assert!(
            signed_in["labels"]["initial"]
                .as_str()
                .unwrap()
                .starts_with("Hey Jo!")
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn rest_sign_out_clears_user_but_keeps_jobs() {
    timeout(TEST_TIMEOUT, async {
        let (port, state) = start_server().await;
        let client = reqwest::Client::new();

        client
            .post(format!("http://127.0.0.1:{port}/api/session"))
            .json(&jo_session())
            .send()
            .await
            .unwrap();
        state
            .store
            .apply_agent_update(esports_copilot::agent::AgentStatePatch {
                jobs: None,
                search_query: Some("caster".into()),
            })
            .await;

        let body: Value = client
            .post(format!("http://127.0.0.1:{port}/api/session"))
            .json(&json!({"status": "signed_out"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["outcome"], "cleared");
        assert!(body["state"].get("user").is_none());
        assert_eq!(body["state"]["search_query"], "caster");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn rest_voice_session_and_quick_replies() {
    timeout(TEST_TIMEOUT, async {
        let (port, _state) = start_server().await;
        let client = reqwest::Client::new();

        client
            .post(format!("http://127.0.0.1:{port}/api/session"))
            .json(&jo_session())
            .send()
            .await
            .unwrap();

        let session: Value = reqwest::get(format!("http://127.0.0.1:{port}/api/voice/session"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let session_id = session["session_id"].as_str().unwrap().to_string();
        assert_eq!(session_id, "Jo|esports_u1|location:London,jobs:0");

        let body: Value = client
            .post(format!("http://127.0.0.1:{port}/api/voice/message"))
            .json(&json!({"text": "Which page is this?", "role": "user", "sessionId": session_id}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["outcome"], "appended");
        assert_eq!(body["intent"], "ask_page");
        assert!(body["reply"].as_str().unwrap().contains("London esports jobs page"));

        let body: Value = client
            .post(format!("http://127.0.0.1:{port}/api/voice/message"))
            .json(&json!({"text": "find coaching jobs", "role": "user"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["intent"], "other");
        assert!(body.get("reply").is_none());
    })
    .await
    .expect("test timed out");
}

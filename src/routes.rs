//! WebSocket server + REST endpoints for the agent-state bridge.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::agent::state::{AgentState, AgentStatePatch};
use crate::agent::store::{AgentStateStore, StateEvent, SyncOutcome};
use crate::instructions::{ChatLabels, PageContext, build_instructions, chat_labels};
use crate::relay::{MessageRelay, RelayOutcome};
use crate::render::{ToolCallEvent, ToolCallTracker, ToolCallView, ToolRenderRegistry};
use crate::session::SessionState;
use crate::voice::{UtteranceIntent, VoiceSessionId, VoiceTranscript, quick_reply};

/// Default broadcast channel capacity for rendered tool views.
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

// ── JSON Protocol ───────────────────────────────────────────────────────

/// Frame from a client (page, voice widget, or the remote agent) → server.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Remote agent wrote `jobs` / `search_query`.
    AgentUpdate { state: serde_json::Value },
    /// The page's session changed.
    Session { session: SessionState },
    /// Lifecycle event for a named tool call.
    ToolCall {
        name: String,
        #[serde(flatten)]
        event: ToolCallEvent,
    },
    /// Finalized voice utterance.
    Voice(VoiceTranscript),
}

/// Frame from server → clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    StateSnapshot { version: u64, state: AgentState },
    ToolCallView {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        call_id: Option<String>,
        view: ToolCallView,
    },
}

impl From<StateEvent> for ServerMessage {
    fn from(event: StateEvent) -> Self {
        match event {
            StateEvent::StateSnapshot { version, state } => Self::StateSnapshot { version, state },
        }
    }
}

// ── Shared State ────────────────────────────────────────────────────────

/// Application state shared across handlers.
#[derive(Clone)]
pub struct CopilotState {
    pub store: Arc<AgentStateStore>,
    pub relay: Arc<MessageRelay>,
    pub renderers: Arc<ToolRenderRegistry>,
    /// Page the assistant is embedded on.
    pub page: Option<Arc<PageContext>>,
    /// Invocations identified by a call id.
    pub tool_calls: Arc<ToolCallTracker>,
    views: broadcast::Sender<ServerMessage>,
}

impl CopilotState {
    pub fn new(
        store: Arc<AgentStateStore>,
        relay: Arc<MessageRelay>,
        renderers: Arc<ToolRenderRegistry>,
        page: Option<PageContext>,
    ) -> Self {
        let (views, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Self {
            store,
            relay,
            renderers,
            page: page.map(Arc::new),
            tool_calls: Arc::new(ToolCallTracker::default()),
            views,
        }
    }

    /// Render a tool event and broadcast the view. `None` for unknown tools.
    ///
    /// Events carrying a call id go through the invocation tracker. One that
    /// would move its invocation backwards is not broadcast; the invocation's
    /// current view is returned instead.
    pub async fn render_tool_call(&self, name: &str, event: &ToolCallEvent) -> Option<ToolCallView> {
        if !self.renderers.has(name).await {
            debug!(tool = %name, "No renderer registered for tool");
            return None;
        }

        let view = match event.call_id.as_deref() {
            Some(call_id) => {
                let tracked = self.tool_calls.observe(name, call_id, event).await;
                let view = self.renderers.render_invocation(&tracked.invocation).await?;
                if !tracked.applied {
                    return Some(view);
                }
                view
            }
            None => self.renderers.render(name, event).await?,
        };

        let _ = self.views.send(ServerMessage::ToolCallView {
            name: name.to_string(),
            call_id: event.call_id.clone(),
            view: view.clone(),
        });
        Some(view)
    }

    /// Relay a voice utterance and answer it from context when it can be.
    pub async fn handle_voice(&self, transcript: &VoiceTranscript) -> VoiceResponse {
        let speaker = transcript.session_id.as_deref().map(VoiceSessionId::parse);
        let intent = UtteranceIntent::classify(&transcript.text);
        let reply = match intent {
            UtteranceIntent::Other => None,
            _ => {
                let agent_state = self.store.state().await;
                let page = self.page.as_deref();
                let instructions = build_instructions(page, agent_state.user.as_ref());
                quick_reply(intent, &instructions, page, speaker.as_ref())
            }
        };

        // Relay failures are absorbed; callers always get an outcome.
        let outcome = self.relay.relay(&transcript.text, transcript.role).await;
        VoiceResponse {
            outcome,
            intent,
            reply,
        }
    }

    /// Session id for the voice widget, built from the mirrored user.
    pub async fn voice_session_id(&self) -> VoiceSessionId {
        let agent_state = self.store.state().await;
        let user = agent_state.user.as_ref();
        VoiceSessionId {
            first_name: user.and_then(|u| u.first_name.clone()).unwrap_or_default(),
            user_id: user.and_then(|u| u.id.clone()).unwrap_or_default(),
            location: self.page.as_ref().and_then(|p| p.location.clone()),
            total_jobs: u32::try_from(agent_state.jobs.len()).ok(),
        }
    }
}

/// Reply to a relayed voice utterance.
#[derive(Debug, Clone, Serialize)]
pub struct VoiceResponse {
    #[serde(flatten)]
    pub outcome: RelayOutcome,
    pub intent: UtteranceIntent,
    /// Direct answer for name and page questions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
}

/// Build the Axum router with the agent WebSocket and REST routes.
pub fn copilot_routes(state: CopilotState) -> Router {
    Router::new()
        .route("/ws/agent", get(ws_handler))
        .route("/health", get(health))
        .route("/api/agent/state", get(get_state))
        .route("/api/session", post(post_session))
        .route("/api/voice/message", post(post_voice))
        .route("/api/voice/session", get(get_voice_session))
        .route("/api/transcript", get(get_transcript))
        .route("/api/tool-calls/{name}", post(post_tool_call))
        .route("/api/instructions", get(get_instructions))
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "esports-copilot"
    }))
}

// ── REST ────────────────────────────────────────────────────────────────

async fn get_state(State(state): State<CopilotState>) -> impl IntoResponse {
    Json(state.store.state().await)
}

#[derive(Debug, Serialize)]
struct SessionResponse {
    outcome: SyncOutcome,
    state: AgentState,
}

async fn post_session(
    State(state): State<CopilotState>,
    Json(session): Json<SessionState>,
) -> impl IntoResponse {
    let outcome = state.store.sync_session(&session).await;
    Json(SessionResponse {
        outcome,
        state: state.store.state().await,
    })
}

async fn post_voice(
    State(state): State<CopilotState>,
    Json(transcript): Json<VoiceTranscript>,
) -> impl IntoResponse {
    Json(state.handle_voice(&transcript).await)
}

async fn get_voice_session(State(state): State<CopilotState>) -> impl IntoResponse {
    let session = state.voice_session_id().await;
    Json(serde_json::json!({
        "session_id": session.encode(),
        "session": session,
    }))
}

async fn get_transcript(State(state): State<CopilotState>) -> impl IntoResponse {
    Json(state.relay.transcript().messages().await)
}

async fn post_tool_call(
    State(state): State<CopilotState>,
    Path(name): Path<String>,
    Json(event): Json<ToolCallEvent>,
) -> impl IntoResponse {
    match state.render_tool_call(&name, &event).await {
        Some(view) => Json(view).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": format!("No renderer for tool {name}")})),
        )
            .into_response(),
    }
}

#[derive(Debug, Serialize)]
struct InstructionsResponse {
    instructions: String,
    labels: ChatLabels,
}

async fn get_instructions(State(state): State<CopilotState>) -> impl IntoResponse {
    let agent_state = state.store.state().await;
    let page = state.page.as_deref();
    let user = agent_state.user.as_ref();
    Json(InstructionsResponse {
        instructions: build_instructions(page, user),
        labels: chat_labels(page, user.and_then(|u| u.first_name.as_deref())),
    })
}

// ── WebSocket ───────────────────────────────────────────────────────────

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<CopilotState>) -> impl IntoResponse {
    info!("Agent WebSocket client connecting");
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn send_json(socket: &mut WebSocket, msg: &ServerMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to serialize server message");
            true
        }
    }
}

async fn handle_socket(mut socket: WebSocket, state: CopilotState) {
    info!("Agent WebSocket client connected");

    // Subscribe before the initial snapshot so no write is missed in between.
    let mut state_rx = state.store.subscribe();
    let mut views_rx = state.views.subscribe();

    let snapshot = ServerMessage::from(state.store.snapshot().await);
    if !send_json(&mut socket, &snapshot).await {
        warn!("Failed to send initial snapshot, client disconnected");
        return;
    }

    loop {
        tokio::select! {
            result = state_rx.recv() => {
                match result {
                    Ok(event) => {
                        if !send_json(&mut socket, &ServerMessage::from(event)).await {
                            debug!("Client disconnected during send");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(missed = n, "WS client lagged behind state broadcast");
                        // Re-sync with the latest snapshot.
                        let snapshot = ServerMessage::from(state.store.snapshot().await);
                        if !send_json(&mut socket, &snapshot).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("State broadcast channel closed");
                        break;
                    }
                }
            }

            result = views_rx.recv() => {
                match result {
                    Ok(msg) => {
                        if !send_json(&mut socket, &msg).await {
                            debug!("Client disconnected during send");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(missed = n, "WS client lagged behind tool view broadcast");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Tool view broadcast channel closed");
                        break;
                    }
                }
            }

            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&text, &state).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Agent WebSocket client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Agent WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("Agent WebSocket connection closed");
}

async fn handle_client_message(text: &str, state: &CopilotState) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::AgentUpdate { state: value }) => {
            match AgentStatePatch::from_value(&value) {
                Ok(patch) => {
                    state.store.apply_agent_update(patch).await;
                }
                Err(e) => warn!(error = %e, "Rejected agent update"),
            }
        }
        Ok(ClientMessage::Session { session }) => {
            let outcome = state.store.sync_session(&session).await;
            debug!(outcome = ?outcome, "Session sync via WS");
        }
        Ok(ClientMessage::ToolCall { name, event }) => {
            if state.render_tool_call(&name, &event).await.is_none() {
                debug!(tool = %name, "Tool call for unregistered tool ignored");
            }
        }
        Ok(ClientMessage::Voice(transcript)) => {
            let response = state.handle_voice(&transcript).await;
            if let RelayOutcome::Appended { ref message } = response.outcome {
                debug!(message_id = %message.id, intent = ?response.intent, "Voice message relayed via WS");
            }
        }
        Err(e) => {
            debug!(error = %e, text = text, "Unrecognized WS message from client");
        }
    }
}

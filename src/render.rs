//! Tool-call rendering — maps a tool invocation's lifecycle to a view.
//!
//! The mapping is a pure function of `(status, result)`, so overlapping or
//! repeated invocations of the same tool never interfere with each other.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::agent::state::{Job, parse_jobs};

/// How many identified invocations [`ToolCallTracker`] remembers.
pub const DEFAULT_TRACKED_INVOCATIONS: usize = 1024;

/// Name of the agent's job-search tool.
pub const SEARCH_JOBS_TOOL: &str = "search_esports_jobs";

/// Lifecycle status reported by the chat SDK for a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ToolCallStatus {
    InProgress,
    Executing,
    Complete,
    /// Anything else, including `"notStarted"`.
    Other(String),
}

impl ToolCallStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::InProgress => "inProgress",
            Self::Executing => "executing",
            Self::Complete => "complete",
            Self::Other(s) => s,
        }
    }

    /// Position in the ordered lifecycle. Unknown statuses sort first.
    fn rank(&self) -> u8 {
        match self {
            Self::Other(_) => 0,
            Self::InProgress => 1,
            Self::Executing => 2,
            Self::Complete => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl From<&str> for ToolCallStatus {
    fn from(s: &str) -> Self {
        match s {
            "inProgress" => Self::InProgress,
            "executing" => Self::Executing,
            "complete" => Self::Complete,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for ToolCallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for ToolCallStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ToolCallStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s.as_str()))
    }
}

/// Payload of a completed job-search call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ToolCallResult {
    #[serde(default)]
    pub jobs: Vec<Job>,
    #[serde(default)]
    pub search_query: String,
}

impl ToolCallResult {
    /// Lenient parse. A missing or non-array `jobs` field means no jobs; it is
    /// not an error. Malformed records inside the array are skipped one by one.
    /// The query is read from `search_query`, falling back to `query`.
    pub fn from_value(value: &serde_json::Value) -> Self {
        let jobs = value.get("jobs").and_then(parse_jobs).unwrap_or_default();
        let search_query = value
            .get("search_query")
            .or_else(|| value.get("query"))
            .and_then(|q| q.as_str())
            .unwrap_or_default()
            .to_string();
        Self { jobs, search_query }
    }
}

/// What to show for a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum ToolCallView {
    /// Skeleton placeholder.
    Loading,
    /// Completed with no matches.
    Empty,
    /// Job card grid, labelled with the query that produced it.
    Results { jobs: Vec<Job>, query: String },
}

/// Map a tool call's status and result to its view.
///
/// The displayed query always comes from the result payload, never from any
/// locally held query string. `complete` without a result payload keeps the
/// skeleton up; a payload without jobs is the empty state.
pub fn render_tool_call(status: &ToolCallStatus, result: Option<&ToolCallResult>) -> ToolCallView {
    match status {
        ToolCallStatus::InProgress | ToolCallStatus::Executing => ToolCallView::Loading,
        ToolCallStatus::Complete => match result {
            None => ToolCallView::Loading,
            Some(result) if result.jobs.is_empty() => ToolCallView::Empty,
            Some(result) => ToolCallView::Results {
                jobs: result.jobs.clone(),
                query: result.search_query.clone(),
            },
        },
        ToolCallStatus::Other(_) => ToolCallView::Loading,
    }
}

/// One lifecycle event for a named tool, as delivered by the chat SDK.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallEvent {
    /// Identifies the invocation across its events. Events without one are
    /// rendered on their own.
    #[serde(default, alias = "callId", skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    pub status: ToolCallStatus,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
}

impl ToolCallEvent {
    pub fn parsed_result(&self) -> Option<ToolCallResult> {
        self.result.as_ref().map(ToolCallResult::from_value)
    }
}

/// Ephemeral record of a single tool round-trip.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallInvocation {
    pub id: String,
    pub tool_name: String,
    pub status: ToolCallStatus,
    pub result: Option<ToolCallResult>,
}

impl ToolCallInvocation {
    /// New invocation with a generated id.
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), tool_name)
    }

    pub fn with_id(id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tool_name: tool_name.into(),
            status: ToolCallStatus::Other("notStarted".to_string()),
            result: None,
        }
    }

    /// Record a lifecycle event. Returns `false` when the event was ignored.
    ///
    /// States may be skipped (a page mounted late can see `complete` first),
    /// but never revisited: events ranked behind the current status, and
    /// anything after `complete`, are ignored.
    pub fn observe(&mut self, status: ToolCallStatus, result: Option<ToolCallResult>) -> bool {
        if self.status.is_terminal() || status.rank() < self.status.rank() {
            debug!(
                tool = %self.tool_name,
                invocation = %self.id,
                current = %self.status,
                ignored = %status,
                "Ignoring out-of-order tool call event"
            );
            return false;
        }
        self.status = status;
        if result.is_some() {
            self.result = result;
        }
        true
    }

    /// View under the built-in job-search renderer.
    pub fn view(&self) -> ToolCallView {
        render_tool_call(&self.status, self.result.as_ref())
    }
}

/// Result of feeding one event to the tracker.
#[derive(Debug, Clone)]
pub struct TrackedEvent {
    /// Invocation state after the event.
    pub invocation: ToolCallInvocation,
    /// Whether the event moved the invocation forward.
    pub applied: bool,
}

struct TrackerInner {
    calls: HashMap<(String, String), ToolCallInvocation>,
    order: VecDeque<(String, String)>,
}

/// Live invocations keyed by `(tool name, call id)`.
///
/// Bounded: once `capacity` invocations are tracked the oldest is forgotten.
pub struct ToolCallTracker {
    capacity: usize,
    inner: Mutex<TrackerInner>,
}

impl ToolCallTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(TrackerInner {
                calls: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Apply `event` to the invocation `call_id` of tool `name`, creating it on
    /// first sight.
    pub async fn observe(&self, name: &str, call_id: &str, event: &ToolCallEvent) -> TrackedEvent {
        let key = (name.to_string(), call_id.to_string());
        let mut inner = self.inner.lock().await;

        if !inner.calls.contains_key(&key) {
            if inner.order.len() >= self.capacity {
                if let Some(oldest) = inner.order.pop_front() {
                    inner.calls.remove(&oldest);
                }
            }
            inner.order.push_back(key.clone());
        }
        let invocation = inner
            .calls
            .entry(key)
            .or_insert_with(|| ToolCallInvocation::with_id(call_id, name));

        let applied = invocation.observe(event.status.clone(), event.parsed_result());
        TrackedEvent {
            invocation: invocation.clone(),
            applied,
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.calls.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for ToolCallTracker {
    fn default() -> Self {
        Self::new(DEFAULT_TRACKED_INVOCATIONS)
    }
}

/// Renderer for one tool's lifecycle events.
pub type ToolRenderer =
    Arc<dyn Fn(&ToolCallStatus, Option<&ToolCallResult>) -> ToolCallView + Send + Sync>;

/// Tool renderers keyed by tool name.
pub struct ToolRenderRegistry {
    renderers: RwLock<HashMap<String, ToolRenderer>>,
}

impl ToolRenderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            renderers: RwLock::new(HashMap::new()),
        }
    }

    /// Registry with the job-search renderer installed.
    pub fn with_defaults() -> Self {
        let mut renderers: HashMap<String, ToolRenderer> = HashMap::new();
        renderers.insert(SEARCH_JOBS_TOOL.to_string(), Arc::new(render_tool_call));
        Self {
            renderers: RwLock::new(renderers),
        }
    }

    /// Register (or replace) the renderer for a tool.
    pub async fn register(&self, name: impl Into<String>, renderer: ToolRenderer) {
        let name = name.into();
        if self
            .renderers
            .write()
            .await
            .insert(name.clone(), renderer)
            .is_some()
        {
            warn!(tool = %name, "Replaced existing tool renderer");
        } else {
            debug!(tool = %name, "Registered tool renderer");
        }
    }

    pub async fn unregister(&self, name: &str) -> bool {
        self.renderers.write().await.remove(name).is_some()
    }

    pub async fn has(&self, name: &str) -> bool {
        self.renderers.read().await.contains_key(name)
    }

    /// List registered tool names, sorted.
    pub async fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.renderers.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Render an event for `name`. `None` when no renderer is registered.
    pub async fn render(&self, name: &str, event: &ToolCallEvent) -> Option<ToolCallView> {
        let renderer = self.renderers.read().await.get(name).cloned()?;
        let result = event.parsed_result();
        Some(renderer(&event.status, result.as_ref()))
    }

    /// Render a tracked invocation's current status and result.
    pub async fn render_invocation(&self, invocation: &ToolCallInvocation) -> Option<ToolCallView> {
        let renderer = self
            .renderers
            .read()
            .await
            .get(&invocation.tool_name)
            .cloned()?;
        Some(renderer(&invocation.status, invocation.result.as_ref()))
    }
}

impl Default for ToolRenderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

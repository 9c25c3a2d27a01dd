//! Agent module — the state shared with the remote agent and its store.

pub mod state;
pub mod store;

pub use state::{AgentState, AgentStatePatch, Job, SignOutPolicy, UserProfile};
pub use store::{AgentStateStore, StateEvent, SyncOutcome};

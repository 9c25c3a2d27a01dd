//! Agent state store — the shared record plus broadcast to subscribers.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info};

use super::state::{
    AgentState, AgentStatePatch, SignOutPolicy, apply_user_identity, clear_user_identity,
    needs_identity_sync,
};
use crate::session::SessionState;

/// Default broadcast channel capacity.
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Result of syncing the session into the shared state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// A new identity was written.
    Updated,
    /// The mirrored identity was cleared after sign-out.
    Cleared,
    /// The mirrored identity already matches; nothing written.
    Unchanged,
    /// The session is still resolving; nothing written.
    Pending,
}

/// Events fanned out to every subscriber after a write.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateEvent {
    /// Full state after a write, with the store version that produced it.
    StateSnapshot { version: u64, state: AgentState },
}

struct Inner {
    state: AgentState,
    version: u64,
}

/// Shared, mutable agent state with two writers: the session sync and the
/// remote agent.
pub struct AgentStateStore {
    name: String,
    sign_out: SignOutPolicy,
    inner: RwLock<Inner>,
    tx: broadcast::Sender<StateEvent>,
}

impl AgentStateStore {
    /// Create a store for the named agent with an empty initial state.
    pub fn new(name: impl Into<String>, sign_out: SignOutPolicy) -> Arc<Self> {
        Self::with_initial_state(name, sign_out, AgentState::default())
    }

    pub fn with_initial_state(
        name: impl Into<String>,
        sign_out: SignOutPolicy,
        initial: AgentState,
    ) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Arc::new(Self {
            name: name.into(),
            sign_out,
            inner: RwLock::new(Inner {
                state: initial,
                version: 0,
            }),
            tx,
        })
    }

    /// Agent name this state belongs to.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sign_out_policy(&self) -> SignOutPolicy {
        self.sign_out
    }

    /// Subscribe to state snapshots.
    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.tx.subscribe()
    }

    /// Current state.
    pub async fn state(&self) -> AgentState {
        self.inner.read().await.state.clone()
    }

    /// Number of writes applied so far.
    pub async fn version(&self) -> u64 {
        self.inner.read().await.version
    }

    /// Current state together with its version.
    pub async fn snapshot(&self) -> StateEvent {
        let inner = self.inner.read().await;
        StateEvent::StateSnapshot {
            version: inner.version,
            state: inner.state.clone(),
        }
    }

    /// Write the state through an updater over the previous value.
    pub async fn set_state<F>(&self, updater: F) -> u64
    where
        F: FnOnce(&AgentState) -> AgentState,
    {
        let mut inner = self.inner.write().await;
        let next = updater(&inner.state);
        self.commit(&mut inner, next)
    }

    /// Replace the whole state.
    pub async fn replace(&self, state: AgentState) -> u64 {
        self.set_state(|_| state).await
    }

    /// Mirror the session identity into `user`.
    ///
    /// Idempotent: the check and the write happen under one lock, so repeated
    /// calls with the same identity write nothing.
    pub async fn sync_session(&self, session: &SessionState) -> SyncOutcome {
        if session.is_pending() {
            return SyncOutcome::Pending;
        }

        let mut inner = self.inner.write().await;
        if !needs_identity_sync(&inner.state, session, self.sign_out) {
            debug!(agent = %self.name, "Session identity unchanged, skipping sync");
            return SyncOutcome::Unchanged;
        }

        match session.user() {
            Some(user) => {
                let next = apply_user_identity(&inner.state, user);
                let version = self.commit(&mut inner, next);
                info!(agent = %self.name, user_id = %user.id, version, "Synced user identity into agent state");
                SyncOutcome::Updated
            }
            None => {
                let next = clear_user_identity(&inner.state);
                let version = self.commit(&mut inner, next);
                info!(agent = %self.name, version, "Cleared user identity after sign-out");
                SyncOutcome::Cleared
            }
        }
    }

    /// Apply a write from the remote agent. Empty patches are ignored.
    pub async fn apply_agent_update(&self, patch: AgentStatePatch) -> Option<u64> {
        if patch.is_empty() {
            debug!(agent = %self.name, "Ignoring empty agent update");
            return None;
        }
        let mut inner = self.inner.write().await;
        let next = patch.apply(&inner.state);
        let version = self.commit(&mut inner, next);
        debug!(
            agent = %self.name,
            version,
            jobs = inner.state.jobs.len(),
            query = %inner.state.search_query,
            "Applied agent state update"
        );
        Some(version)
    }

    fn commit(&self, inner: &mut Inner, next: AgentState) -> u64 {
        inner.state = next;
        inner.version += 1;
        // Ok if nobody is subscribed.
        let _ = self.tx.send(StateEvent::StateSnapshot {
            version: inner.version,
            state: inner.state.clone(),
        });
        inner.version
    }
}

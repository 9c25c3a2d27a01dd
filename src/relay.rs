//! Message relay — forwards voice transcripts into the chat transcript.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::RelayError;

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single transcript entry. Appended, never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub content: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(content: impl Into<String>, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            role,
            created_at: Utc::now(),
        }
    }
}

/// The chat transcript owned by the conversational UI.
#[async_trait]
pub trait ChatTranscript: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Append a message to the end of the transcript.
    async fn append_message(&self, message: ChatMessage) -> Result<(), RelayError>;

    /// All messages in append order.
    async fn messages(&self) -> Vec<ChatMessage>;
}

/// Transcript held in memory.
pub struct InMemoryTranscript {
    messages: RwLock<Vec<ChatMessage>>,
}

impl InMemoryTranscript {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            messages: RwLock::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ChatTranscript for InMemoryTranscript {
    fn name(&self) -> &str {
        "memory"
    }

    async fn append_message(&self, message: ChatMessage) -> Result<(), RelayError> {
        self.messages.write().await.push(message);
        Ok(())
    }

    async fn messages(&self) -> Vec<ChatMessage> {
        self.messages.read().await.clone()
    }
}

/// Which transcripts the relay forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayPolicy {
    /// Only user speech. The assistant's own synthesized speech is already in
    /// the transcript, so relaying it would duplicate it.
    #[default]
    UserOnly,
    /// Everything; an untagged transcript counts as the assistant's.
    AllRoles,
}

impl std::str::FromStr for RelayPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user_only" | "user-only" => Ok(Self::UserOnly),
            "all_roles" | "all-roles" | "all" => Ok(Self::AllRoles),
            other => Err(format!("expected 'user_only' or 'all_roles', got '{other}'")),
        }
    }
}

/// What happened to a relayed transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RelayOutcome {
    Appended { message: ChatMessage },
    Dropped,
    Failed,
}

/// Log-and-continue error policy for paths where losing data is acceptable.
///
/// Voice transcription is lossy anyway; a failed append is logged and
/// forgotten, never retried and never surfaced.
pub struct NonCritical;

impl NonCritical {
    /// Run `result` through the policy, returning `None` on error.
    pub fn absorb<T>(context: &str, result: Result<T, RelayError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(context, error = %e, "Non-critical operation failed, continuing");
                None
            }
        }
    }
}

/// Bridges voice transcripts into the chat transcript.
pub struct MessageRelay {
    transcript: Arc<dyn ChatTranscript>,
    policy: RelayPolicy,
}

impl MessageRelay {
    pub fn new(transcript: Arc<dyn ChatTranscript>, policy: RelayPolicy) -> Self {
        Self { transcript, policy }
    }

    pub fn policy(&self) -> RelayPolicy {
        self.policy
    }

    pub fn transcript(&self) -> &Arc<dyn ChatTranscript> {
        &self.transcript
    }

    /// Role the message will be appended with, or `None` to drop it.
    fn resolve_role(&self, role: Option<Role>) -> Option<Role> {
        match (self.policy, role) {
            (RelayPolicy::UserOnly, Some(Role::User)) => Some(Role::User),
            (RelayPolicy::UserOnly, _) => None,
            (RelayPolicy::AllRoles, role) => Some(role.unwrap_or(Role::Assistant)),
        }
    }

    /// Relay one finalized utterance. Never fails.
    pub async fn relay(&self, text: &str, role: Option<Role>) -> RelayOutcome {
        let preview: String = text.chars().take(50).collect();
        debug!(role = ?role, text = %preview, "Voice transcript received");

        if text.trim().is_empty() {
            return RelayOutcome::Dropped;
        }

        let Some(role) = self.resolve_role(role) else {
            debug!(policy = ?self.policy, "Dropping transcript not eligible for relay");
            return RelayOutcome::Dropped;
        };

        let message = ChatMessage::new(text, role);
        let appended = self.transcript.append_message(message.clone()).await;
        match NonCritical::absorb(self.transcript.name(), appended) {
            Some(()) => RelayOutcome::Appended { message },
            None => RelayOutcome::Failed,
        }
    }
}

//! Shared agent state and the merge rules for its two writers.
//!
//! The state is co-owned: the page writes `user` when the session identity
//! changes, the remote agent writes `jobs` and `search_query` as a side effect
//! of its tool calls. Every write here is a merge that leaves the other
//! writer's fields untouched.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StateError;
use crate::session::{SessionState, SessionUser, first_name};

/// A job listing as returned by the agent's search tool.
///
/// Passed through for rendering only. The agent omits fields freely (its
/// own state carries just title, company and location), so every field
/// defaults to empty.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Job {
    pub id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    #[serde(rename = "type")]
    pub job_type: String,
    pub salary: String,
    pub url: String,
}

/// Identity projection mirrored into the agent state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl UserProfile {
    /// Build the profile for a session user. Empty strings become `None`.
    pub fn from_session_user(user: &SessionUser) -> Self {
        let non_empty = |s: &Option<String>| s.clone().filter(|v| !v.trim().is_empty());
        Self {
            id: Some(user.id.clone()),
            name: non_empty(&user.name),
            first_name: user
                .name
                .as_deref()
                .and_then(first_name)
                .map(str::to_string),
            email: non_empty(&user.email),
        }
    }

    /// Name to greet the user with: first name, then full name.
    pub fn display_name(&self) -> Option<&str> {
        self.first_name.as_deref().or(self.name.as_deref())
    }
}

/// State shared between the page and the remote agent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AgentState {
    #[serde(default)]
    pub jobs: Vec<Job>,
    #[serde(default)]
    pub search_query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
}

impl AgentState {
    /// Id of the currently mirrored user, if any.
    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().and_then(|u| u.id.as_deref())
    }
}

/// What happens to the mirrored user when the session signs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignOutPolicy {
    /// Clear `user` with a merge-update.
    #[default]
    Clear,
    /// Leave the last identity in place until the next sign-in.
    Retain,
}

impl std::str::FromStr for SignOutPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clear" => Ok(Self::Clear),
            "retain" => Ok(Self::Retain),
            other => Err(format!("expected 'clear' or 'retain', got '{other}'")),
        }
    }
}

/// Replace `user` with the session identity, carrying `jobs` and
/// `search_query` forward verbatim.
pub fn apply_user_identity(state: &AgentState, user: &SessionUser) -> AgentState {
    AgentState {
        jobs: state.jobs.clone(),
        search_query: state.search_query.clone(),
        user: Some(UserProfile::from_session_user(user)),
    }
}

/// Drop the mirrored identity, carrying `jobs` and `search_query` forward.
pub fn clear_user_identity(state: &AgentState) -> AgentState {
    AgentState {
        jobs: state.jobs.clone(),
        search_query: state.search_query.clone(),
        user: None,
    }
}

/// Whether the session requires an identity write.
///
/// Only the user id is compared: a name or email change under the same id
/// does not trigger a write.
pub fn needs_identity_sync(
    state: &AgentState,
    session: &SessionState,
    policy: SignOutPolicy,
) -> bool {
    match session {
        SessionState::Pending => false,
        SessionState::SignedIn(user) => state.user_id() != Some(user.id.as_str()),
        SessionState::SignedOut => policy == SignOutPolicy::Clear && state.user.is_some(),
    }
}

/// Parse a `jobs` array one record at a time.
///
/// Null fields count as missing. Records that still fail to parse are skipped
/// so one bad entry cannot empty the list. `None` when `value` is not an array
/// at all.
pub fn parse_jobs(value: &serde_json::Value) -> Option<Vec<Job>> {
    let items = value.as_array()?;
    let jobs: Vec<Job> = items
        .iter()
        .map(|item| match item {
            serde_json::Value::Object(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
            other => other.clone(),
        })
        .filter_map(|item| match serde_json::from_value::<Job>(item) {
            Ok(job) => Some(job),
            Err(e) => {
                debug!(error = %e, "Skipping malformed job record");
                None
            }
        })
        .collect();
    Some(jobs)
}

/// Partial write from the remote agent. `None` fields are left as they are.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AgentStatePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobs: Option<Vec<Job>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_query: Option<String>,
}

impl AgentStatePatch {
    /// Parse an agent-side snapshot. Any `user` key is ignored; the agent does
    /// not own it.
    ///
    /// Job records are parsed leniently (see [`parse_jobs`]). A `jobs` or
    /// `search_query` of the wrong type is an error.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, StateError> {
        let Some(object) = value.as_object() else {
            return Err(StateError::InvalidPayload(format!(
                "expected an object, got {value}"
            )));
        };

        let jobs = match object.get("jobs") {
            None | Some(serde_json::Value::Null) => None,
            Some(jobs) => Some(parse_jobs(jobs).ok_or_else(|| {
                StateError::InvalidPayload(format!("jobs must be an array, got {jobs}"))
            })?),
        };
        let search_query = match object.get("search_query") {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(q)) => Some(q.clone()),
            Some(other) => {
                return Err(StateError::InvalidPayload(format!(
                    "search_query must be a string, got {other}"
                )));
            }
        };

        Ok(Self { jobs, search_query })
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_none() && self.search_query.is_none()
    }

    /// Apply onto `state`, preserving `user`.
    pub fn apply(self, state: &AgentState) -> AgentState {
        AgentState {
            jobs: self.jobs.unwrap_or_else(|| state.jobs.clone()),
            search_query: self
                .search_query
                .unwrap_or_else(|| state.search_query.clone()),
            user: state.user.clone(),
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_job(id: &str, title: &str) -> Job {
    Job {
        id: id.to_string(),
        title: title.to_string(),
        company: "Fnatic".to_string(),
        location: "London".to_string(),
        job_type: "full-time".to_string(),
        salary: "£35,000 - £70,000".to_string(),
        url: format!("https://esportsjobs.quest/jobs/{id}"),
    }
}

//! Session provider contract — who is signed in on the page.

use serde::{Deserialize, Serialize};

/// The authenticated user as reported by the session provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl SessionUser {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            email: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// First whitespace-separated token of the display name.
    pub fn first_name(&self) -> Option<&str> {
        self.name.as_deref().and_then(first_name)
    }
}

/// Extract the first name from a display name. Blank names yield `None`.
pub fn first_name(name: &str) -> Option<&str> {
    name.split_whitespace().next()
}

/// Reactive session value.
///
/// `Pending` while the provider is still resolving, `SignedOut` when there is
/// no session, `SignedIn` once a user is known.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "status", content = "user", rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Pending,
    SignedOut,
    SignedIn(SessionUser),
}

impl SessionState {
    /// Build from the provider's `{ data, isPending }` shape.
    pub fn from_provider(user: Option<SessionUser>, is_pending: bool) -> Self {
        match (is_pending, user) {
            (true, _) => Self::Pending,
            (false, Some(user)) => Self::SignedIn(user),
            (false, None) => Self::SignedOut,
        }
    }

    pub fn user(&self) -> Option<&SessionUser> {
        match self {
            Self::SignedIn(user) => Some(user),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

//! Voice widget contract — transcripts, session ids and quick intents.

use serde::{Deserialize, Serialize};

use crate::instructions::{PageContext, extract_user_from_instructions};
use crate::relay::Role;
use crate::session::first_name;

/// Prefix on the user segment of a voice session id.
const USER_PREFIX: &str = "esports_";
/// Prefix used when the speaker is not signed in.
const ANON_PREFIX: &str = "esports_anon_";

/// One finalized utterance from the voice widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceTranscript {
    pub text: String,
    #[serde(default)]
    pub role: Option<Role>,
    /// The widget's personalization id, when it sends one.
    #[serde(default, alias = "sessionId")]
    pub session_id: Option<String>,
}

/// Personalization id handed to the voice widget.
///
/// Wire form: `firstName|esports_<userId>|location:London,jobs:25`. The
/// third segment is optional.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VoiceSessionId {
    pub first_name: String,
    pub user_id: String,
    pub location: Option<String>,
    pub total_jobs: Option<u32>,
}

impl VoiceSessionId {
    /// Encode for the widget. Anonymous sessions get the anon prefix.
    pub fn encode(&self) -> String {
        let user = if self.user_id.is_empty() {
            format!("{ANON_PREFIX}{}", uuid::Uuid::new_v4().simple())
        } else {
            format!("{USER_PREFIX}{}", self.user_id)
        };

        let mut context = Vec::new();
        if let Some(ref location) = self.location {
            context.push(format!("location:{location}"));
        }
        if let Some(jobs) = self.total_jobs {
            context.push(format!("jobs:{jobs}"));
        }

        let mut out = format!("{}|{}", self.first_name, user);
        if !context.is_empty() {
            out.push('|');
            out.push_str(&context.join(","));
        }
        out
    }

    /// Parse a widget session id. Missing segments become empty / `None`;
    /// unknown keys and unparsable job counts are ignored.
    pub fn parse(raw: &str) -> Self {
        let mut parts = raw.split('|');
        let first_name = parts.next().unwrap_or_default().to_string();
        let session = parts.next().unwrap_or_default();
        let user_id = session
            .strip_prefix(ANON_PREFIX)
            .map(|_| "")
            .or_else(|| session.strip_prefix(USER_PREFIX))
            .unwrap_or(session)
            .to_string();

        let mut location = None;
        let mut total_jobs = None;
        for pair in parts.next().unwrap_or_default().split(',') {
            match pair.split_once(':') {
                Some(("location", value)) if !value.is_empty() => {
                    location = Some(value.to_string());
                }
                Some(("jobs", value)) => total_jobs = value.trim().parse().ok(),
                _ => {}
            }
        }

        Self {
            first_name,
            user_id,
            location,
            total_jobs,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_empty()
    }
}

/// Questions the agent answers from context without calling a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UtteranceIntent {
    AskName,
    AskPage,
    Other,
}

const NAME_PHRASES: &[&str] = &["my name", "who am i", "what am i called"];
const PAGE_PHRASES: &[&str] = &["what page", "where are we", "which page", "current page"];

impl UtteranceIntent {
    pub fn classify(text: &str) -> Self {
        let q = text.to_lowercase();
        if NAME_PHRASES.iter().any(|p| q.contains(p)) {
            Self::AskName
        } else if PAGE_PHRASES.iter().any(|p| q.contains(p)) {
            Self::AskPage
        } else {
            Self::Other
        }
    }
}

/// Answer for a question the context already settles. `None` for
/// [`UtteranceIntent::Other`].
///
/// The name is read back from the user block of `instructions`, falling back
/// to the speaker's session id.
pub fn quick_reply(
    intent: UtteranceIntent,
    instructions: &str,
    page: Option<&PageContext>,
    speaker: Option<&VoiceSessionId>,
) -> Option<String> {
    match intent {
        UtteranceIntent::AskName => {
            let extracted = extract_user_from_instructions(instructions);
            let name = extracted
                .name
                .as_deref()
                .and_then(first_name)
                .map(str::to_string)
                .or_else(|| {
                    speaker
                        .map(|s| s.first_name.trim().to_string())
                        .filter(|n| !n.is_empty())
                });
            Some(match name {
                Some(name) => {
                    format!("Your name is {name}! I remembered that from when you signed in.")
                }
                None => "I don't know your name yet. You can tell me, or sign in so I can remember you!"
                    .to_string(),
            })
        }
        UtteranceIntent::AskPage => {
            let location = page.and_then(|p| p.location.as_deref());
            let total_jobs = speaker.and_then(|s| s.total_jobs);
            Some(match (location, total_jobs) {
                (Some(location), Some(jobs)) => format!(
                    "We're on the {location} esports jobs page. There are {jobs} roles here. Want me to show you them?"
                ),
                (Some(location), None) => format!(
                    "We're on the {location} esports jobs page. Want me to show you the roles?"
                ),
                (None, _) => {
                    "We're on the main esports jobs page. Which location interests you?".to_string()
                }
            })
        }
        UtteranceIntent::Other => None,
    }
}

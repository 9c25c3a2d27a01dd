//! Agent instructions — the system prompt handed to the remote agent.
//!
//! Built from the page the assistant is embedded on and the mirrored user.
//! The user block uses labelled lines the agent parses back out with
//! [`extract_user_from_instructions`].

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::agent::state::UserProfile;

/// A tool the remote agent can call, with a one-line usage hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentTool {
    pub name: &'static str,
    pub hint: &'static str,
}

/// Tools the esports agent exposes.
pub const AGENT_TOOLS: &[AgentTool] = &[
    AgentTool {
        name: "search_esports_jobs",
        hint: "Find jobs by query, category, country, or type",
    },
    AgentTool {
        name: "lookup_esports_company",
        hint: "Get info on companies like Team Liquid, Riot Games, Fnatic",
    },
    AgentTool {
        name: "get_categories",
        hint: "List job categories",
    },
    AgentTool {
        name: "get_countries",
        hint: "List countries with jobs",
    },
];

/// The page the assistant is embedded on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContext {
    pub page_id: String,
    pub page_type: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_h1: Option<String>,
    pub page_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Companies featured on the page.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub companies: Vec<String>,
}

impl PageContext {
    /// Heading the assistant should call the page by.
    pub fn heading(&self) -> &str {
        self.page_h1.as_deref().unwrap_or(&self.title)
    }
}

/// Build the instructions for the agent.
///
/// Deterministic: the same page and user always produce the same string.
pub fn build_instructions(page: Option<&PageContext>, user: Option<&UserProfile>) -> String {
    let mut sections = Vec::new();

    if let Some(page) = page {
        sections.push(page_section(page));
    }
    sections.push(user_section(user));
    sections.push(role_section(page));
    sections.push(tools_section());
    sections.push(
        "Always use your tools to provide real data! Be enthusiastic about esports careers!"
            .to_string(),
    );

    sections.join("\n\n")
}

fn page_section(page: &PageContext) -> String {
    let mut lines = vec![
        "## PAGE CONTEXT (for agent parsing)".to_string(),
        format!("Page URL: {}", page.page_url),
        format!("Page Type: {}", page.page_type),
        format!("Page Title: {}", page.title),
        format!("Page H1: {}", page.heading()),
    ];
    if let Some(ref location) = page.location {
        lines.push(format!("Location Focus: {location}"));
    }
    if let Some(ref description) = page.page_description {
        lines.push(format!("Page Description: {description}"));
    }

    lines.push(String::new());
    lines.push(format!("## CRITICAL: You are on the {} page", page.heading()));
    lines.push(format!(
        "When asked \"what page am I on?\" or \"where am I?\", say: \"You're on the {} page\"",
        page.heading()
    ));
    if let Some(ref location) = page.location {
        lines.push(format!(
            "When the user asks about jobs, PRIORITIZE {location} opportunities. \
             If they say \"show me jobs\" or \"find jobs\", search for jobs in {location}."
        ));
    }
    if !page.companies.is_empty() {
        lines.push(format!(
            "The companies on this page include: {}.",
            page.companies.join(", ")
        ));
    }

    lines.join("\n")
}

fn user_section(user: Option<&UserProfile>) -> String {
    match user.filter(|u| u.id.is_some()) {
        Some(user) => {
            let mut lines = vec!["## USER INFO".to_string()];
            if let Some(name) = user.display_name() {
                lines.push(format!("User Name: {name}"));
            }
            if let Some(ref email) = user.email {
                lines.push(format!("User Email: {email}"));
            }
            if let Some(ref id) = user.id {
                lines.push(format!("User ID: {id}"));
            }
            lines.push(String::new());
            lines.push("Greet them by name and be friendly!".to_string());
            lines.join("\n")
        }
        None => "## GUEST USER\n\
                 The user is not logged in. Encourage them to sign up for personalized recommendations."
            .to_string(),
    }
}

fn role_section(page: Option<&PageContext>) -> String {
    let mut out = "## YOUR ROLE\n\
                   You are an AI assistant for EsportsJobs.quest helping users find esports jobs."
        .to_string();
    if let Some(location) = page.and_then(|p| p.location.as_deref()) {
        out.push_str(&format!(
            "\nOn THIS page, you are specifically focused on {location} esports opportunities."
        ));
    }
    out
}

fn tools_section() -> String {
    let mut lines = vec!["## YOUR TOOLS".to_string()];
    lines.extend(
        AGENT_TOOLS
            .iter()
            .map(|tool| format!("- {}: {}", tool.name, tool.hint)),
    );
    lines.join("\n")
}

/// User identity recovered from an instructions string.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ExtractedUser {
    pub user_id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
}

static USER_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)User ID:\s*([a-f0-9-]+)").expect("valid regex"));
static USER_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)User Name:\s*([^\n]+)").expect("valid regex"));
static USER_EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)User Email:\s*([^\n]+)").expect("valid regex"));

/// Parse the `## USER INFO` block back out of an instructions string.
///
/// User ids are matched as hex/dash (UUID-shaped); other ids are not found.
pub fn extract_user_from_instructions(instructions: &str) -> ExtractedUser {
    let capture = |re: &Regex| {
        re.captures(instructions)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
    };
    ExtractedUser {
        user_id: capture(&USER_ID_RE),
        name: capture(&USER_NAME_RE),
        email: capture(&USER_EMAIL_RE),
    }
}

/// Chat popup title and opening line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatLabels {
    pub title: String,
    pub initial: String,
}

/// Labels for the chat popup, personalised when the first name is known.
pub fn chat_labels(page: Option<&PageContext>, first_name: Option<&str>) -> ChatLabels {
    let first_name = first_name.filter(|n| !n.trim().is_empty());
    match page {
        Some(page) => {
            let title = match page.location {
                Some(ref location) => format!("{location} Esports Jobs AI"),
                None => "Esports Jobs AI".to_string(),
            };
            let initial = match first_name {
                Some(name) => format!(
                    "Hey {name}! You're on the {} page. How can I help you find your next role?",
                    page.heading()
                ),
                None => format!(
                    "You're on the {} page! How can I help you find your next role?",
                    page.heading()
                ),
            };
            ChatLabels { title, initial }
        }
        None => ChatLabels {
            title: "Esports Jobs AI".to_string(),
            initial: match first_name {
                Some(name) => format!("Hey {name}! Ready to find your dream job in esports?"),
                None => "Ready to find your dream job in esports? Ask me anything!".to_string(),
            },
        },
    }
}

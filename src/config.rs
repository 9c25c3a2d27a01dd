//! Configuration types.

use crate::agent::state::SignOutPolicy;
use crate::error::ConfigError;
use crate::instructions::PageContext;
use crate::relay::RelayPolicy;

/// Bridge configuration.
#[derive(Debug, Clone)]
pub struct CopilotConfig {
    /// Name of the remote agent whose state is mirrored.
    pub agent_name: String,
    /// Port for the HTTP / WebSocket server.
    pub port: u16,
    /// Which voice transcripts are relayed into the chat.
    pub relay_policy: RelayPolicy,
    /// What sign-out does to the mirrored user.
    pub sign_out_policy: SignOutPolicy,
    /// Page the assistant is embedded on, if any.
    pub page: Option<PageContext>,
}

impl Default for CopilotConfig {
    fn default() -> Self {
        Self {
            agent_name: "esports_agent".to_string(),
            port: 8080,
            relay_policy: RelayPolicy::default(),
            sign_out_policy: SignOutPolicy::default(),
            page: None,
        }
    }
}

impl CopilotConfig {
    /// Load from `ESPORTS_COPILOT_*` environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(name) = get("ESPORTS_COPILOT_AGENT_NAME") {
            config.agent_name = name.trim().to_string();
        }

        if let Some(port) = get("ESPORTS_COPILOT_PORT") {
            config.port = port.trim().parse().map_err(|e| ConfigError::InvalidValue {
                key: "ESPORTS_COPILOT_PORT".to_string(),
                message: format!("{e}"),
            })?;
        }

        if let Some(relay) = get("ESPORTS_COPILOT_RELAY") {
            config.relay_policy = relay.parse().map_err(|message| ConfigError::InvalidValue {
                key: "ESPORTS_COPILOT_RELAY".to_string(),
                message,
            })?;
        }

        if let Some(sign_out) = get("ESPORTS_COPILOT_SIGN_OUT") {
            config.sign_out_policy =
                sign_out
                    .parse()
                    .map_err(|message| ConfigError::InvalidValue {
                        key: "ESPORTS_COPILOT_SIGN_OUT".to_string(),
                        message,
                    })?;
        }

        if let Some(page) = get("ESPORTS_COPILOT_PAGE") {
            let page: PageContext = serde_json::from_str(&page).map_err(|e| {
                ConfigError::ParseError(format!("ESPORTS_COPILOT_PAGE is not a page context: {e}"))
            })?;
            config.page = Some(page);
        }

        Ok(config)
    }
}

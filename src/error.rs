//! Error types for the esports copilot bridge.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("Agent state error: {0}")]
    State(#[from] StateError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),
}

/// Errors raised while appending to the chat transcript.
///
/// These never leave the relay: see [`crate::relay::NonCritical`].
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Transcript {name} rejected message: {reason}")]
    AppendFailed { name: String, reason: String },

    #[error("Transcript {name} is closed")]
    Closed { name: String },
}

/// Agent state errors.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Invalid agent state payload: {0}")]
    InvalidPayload(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// HTTP / WebSocket transport errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to bind {addr}: {reason}")]
    BindFailed { addr: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the bridge.
pub type Result<T> = std::result::Result<T, Error>;

use std::sync::Arc;

use esports_copilot::agent::AgentStateStore;
use esports_copilot::config::CopilotConfig;
use esports_copilot::error::{Result, TransportError};
use esports_copilot::relay::{InMemoryTranscript, MessageRelay};
use esports_copilot::render::ToolRenderRegistry;
use esports_copilot::routes::{CopilotState, copilot_routes};
use tower_http::cors::CorsLayer;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = CopilotConfig::from_env()?;

    eprintln!("🎮 Esports Copilot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Agent: {}", config.agent_name);
    eprintln!("   Agent WS: ws://0.0.0.0:{}/ws/agent", config.port);
    eprintln!("   State API: http://0.0.0.0:{}/api/agent/state", config.port);
    eprintln!("   Relay: {:?}", config.relay_policy);
    eprintln!("   Sign-out: {:?}", config.sign_out_policy);
    match config.page {
        Some(ref page) => eprintln!("   Page: {} ({})", page.page_id, page.page_url),
        None => eprintln!("   Page: none"),
    }

    // ── Bridge ──────────────────────────────────────────────────────────
    let store = AgentStateStore::new(config.agent_name.clone(), config.sign_out_policy);
    let relay = Arc::new(MessageRelay::new(
        InMemoryTranscript::new(),
        config.relay_policy,
    ));
    let renderers = Arc::new(ToolRenderRegistry::with_defaults());
    eprintln!("   Tool renderers: {}\n", renderers.list().await.join(", "));

    let state = CopilotState::new(store, relay, renderers, config.page.clone());
    let app = copilot_routes(state).layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| TransportError::BindFailed {
            addr: addr.clone(),
            reason: e.to_string(),
        })?;
    tracing::info!(port = config.port, "Agent bridge server started");

    axum::serve(listener, app)
        .await
        .map_err(TransportError::from)?;

    Ok(())
}

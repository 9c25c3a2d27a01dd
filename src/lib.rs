//! Esports Copilot — agent-state bridge and tool-render pipeline.

pub mod agent;
pub mod config;
pub mod error;
pub mod instructions;
pub mod relay;
pub mod render;
pub mod routes;
pub mod session;
pub mod voice;

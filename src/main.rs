use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};

mod chart;
mod chat;
mod config;
mod db;
mod llm;
mod speech;
mod util;
mod web;

use crate::config::{AppConfig, CliArgs};
use crate::llm::LlmManager;
use crate::speech::Transcriber;
use crate::util::logging::init_tracing;
use crate::web::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    init_tracing();

    // Parse command line arguments
    let args = CliArgs::parse();

    // Load configuration
    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Initialize LLM manager
    info!("Initializing LLM manager with backend: {}", config.llm.backend);
    let llm_manager = LlmManager::new(&config.llm)?;

    // Speech input is optional; without an API key the endpoint reports
    // itself as unconfigured
    let transcriber = if config.speech.api_key.is_some() {
        info!("Initializing speech transcriber with model: {}", config.speech.model);
        Some(Transcriber::new(&config.speech)?)
    } else {
        info!("Speech input disabled (no API key configured)");
        None
    };

    // Create application state
    let app_state = Arc::new(AppState::new(config.clone(), llm_manager, transcriber));

    // Best-effort reachability check, for the logs and the status endpoint
    if db::executor::probe(app_state.db_path()).await {
        info!("Database connected: {}", app_state.db_path());
    } else {
        warn!("Database disconnected: {}", app_state.db_path());
    }

    // Initialize schema cache
    info!("Initializing schema cache");
    if let Err(e) = app_state.schema_manager.refresh_cache().await {
        error!("Failed to initialize schema cache: {}", e);
        // Continue anyway, it will be refreshed later
    }

    // Start the web server
    info!("Starting nl-chat server on {}:{}", config.web.host, config.web.port);
    match web::run_server(config.web, app_state).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => {
            error!("Server error: {}", e);
            return Err(std::io::Error::other(e.to_string()).into());
        }
    }

    Ok(())
}

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};

mod config;
mod db;
mod llm;
mod pipeline;
mod schema;
mod sql;
mod util;
mod web;

use crate::config::{AppConfig, CliArgs};
use crate::db::executor::QueryExecutor;
use crate::llm::LlmTranslator;
use crate::pipeline::{Pipeline, PipelineConfig};
use crate::util::logging::init_tracing;
use crate::web::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .env is optional
    let dotenv = dotenvy::dotenv();

    init_tracing();

    if let Err(e) = &dotenv {
        if !e.not_found() {
            warn!("Failed to read .env file: {}", e);
        }
    }

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

    info!("Initializing LLM translator with backend: {}", config.llm.backend);
    let translator = match LlmTranslator::connect(&config.llm) {
        Ok(translator) => translator,
        Err(e) => {
            error!("Failed to initialize LLM translator: {}", e);
            return Err(e.into());
        }
    };

    info!("Initializing DuckDB connection pool for {}", config.database.connection_string);
    let executor = QueryExecutor::new(&config.database);

    let pipeline = match Pipeline::new(PipelineConfig::from_app_config(&config), translator, executor) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("Refusing to start: {}", e);
            return Err(e.into());
        }
    };
    info!("Loaded schema description version {}", pipeline.schema().version);

    let app_state = Arc::new(AppState::new(pipeline));

    // Start the web server
    info!("Starting nl-query server on {}:{}", config.web.host, config.web.port);
    match web::run_server(config.web, app_state).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => {
            error!("Server error: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}

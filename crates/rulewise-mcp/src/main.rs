mod server;
mod service;

use rmcp::ServiceExt;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rulewise_core::{FileStore, MemoryStore, RuleStore};
use rulewise_suggest::Pipeline;

use crate::server::RulewiseServer;
use crate::service::RuleService;

/// stdout carries the MCP protocol, so logs go to stderr.
fn init_logging() {
    let filter = EnvFilter::try_from_env("RULEWISE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_ansi(false).with_target(false))
        .with(filter)
        .init();
}

fn open_store(in_memory: bool) -> Result<Box<dyn RuleStore>, Box<dyn std::error::Error>> {
    if in_memory {
        tracing::info!("using in-memory rule store");
        return Ok(Box::new(MemoryStore::new()));
    }
    let store = FileStore::open(FileStore::default_path())?;
    tracing::info!(path = %store.path().display(), "opened rule store");
    Ok(Box::new(store))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let in_memory = std::env::args().skip(1).any(|a| a == "--memory");

    let settings = rulewise_core::read_settings();
    if !rulewise_core::ai_configured(&settings) {
        tracing::warn!("no AI provider configured; every result will come from local fallbacks");
    } else {
        tracing::info!(
            provider = %settings.provider,
            model = %settings.model,
            "AI provider configured"
        );
    }

    let service = RuleService::new(Pipeline::from_settings(settings), open_store(in_memory)?);
    let running = RulewiseServer::new(service)
        .serve(rmcp::transport::io::stdio())
        .await
        .inspect_err(|e| tracing::error!("MCP server error: {}", e))?;
    running.waiting().await?;
    Ok(())
}

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use concierge::api::ApiServer;
use concierge::config::ConciergeConfig;
use concierge::context::{KnowledgeBase, DEFAULT_INSTRUCTIONS};
use concierge::guardrail::run_sweeper;
use concierge::pipeline::ChatPipeline;
use concierge::provider::{CredentialPool, HttpTransport};

/// Chat assistant backend for a portfolio website.
#[derive(Parser, Debug)]
#[command(name = "concierge", version)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Knowledge base document (overrides `knowledge.path`)
    #[arg(short, long)]
    knowledge: Option<PathBuf>,

    /// Listen address (overrides `server.listen_addr`)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Credentials may come from a local .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init();
    }

    info!("Starting Concierge chat service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = ConciergeConfig::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }
    info!(listen_addr = %config.server.listen_addr, "Configuration loaded");

    let knowledge_path = args
        .knowledge
        .or_else(|| config.knowledge.path.as_ref().map(PathBuf::from));
    let knowledge = match knowledge_path {
        Some(path) => KnowledgeBase::from_file(path)?,
        None => {
            warn!("No knowledge base configured, answering from instructions only");
            KnowledgeBase::new()
        }
    };

    let instructions = match &config.knowledge.instructions_path {
        Some(path) => std::fs::read_to_string(path)?,
        None => DEFAULT_INSTRUCTIONS.to_string(),
    };

    // Missing credentials are a startup failure, never a per-request one
    let pool = CredentialPool::from_env()?;
    let transport = Arc::new(HttpTransport::new(
        config.provider.endpoint.clone(),
        config.provider.request_timeout(),
    )?);
    info!(endpoint = %transport.endpoint(), "Provider transport ready");

    let pipeline = Arc::new(ChatPipeline::from_config(
        &config,
        &instructions,
        &knowledge,
        transport,
        pool,
    ));

    tokio::spawn(run_sweeper(
        Arc::clone(pipeline.limiter()),
        config.guardrail.sweep_interval(),
    ));

    let server = ApiServer::new(&config.server, pipeline);

    // Run the server with graceful shutdown on Ctrl+C
    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Concierge chat service stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

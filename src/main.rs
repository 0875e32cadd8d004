//! Gateway entry point: loads configuration, assembles the shared
//! recognition resources, binds the WebSocket listener, and waits for a
//! shutdown signal.

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use asr_gateway::config::GatewayConfig;
use asr_gateway::server::Server;
use asr_gateway::state::GatewayContext;

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional; absence is not an error
    dotenv::dotenv().ok();

    init_tracing();

    let config = GatewayConfig::load()?;
    config.validate()?;

    info!("starting asr-gateway v{}", env!("CARGO_PKG_VERSION"));

    let ctx = GatewayContext::from_config(&config)?;
    info!(
        languages = ctx.registry.len(),
        default = %ctx.registry.default_tag(),
        slots = config.pool.slots,
        streaming_partials = config.recognition.streaming_partials,
        "recognition resources ready"
    );

    let server = Server::bind(&config.server).await?;

    let mut sigterm =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        result = server.serve(Arc::clone(&ctx)) => {
            if let Err(err) = result {
                error!(error = %err, "listener failed");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT, shutting down");
        }
        _ = sigterm.recv() => {
            info!("received SIGTERM, shutting down");
        }
    }

    let stats = ctx.pool.stats();
    info!(
        uptime_secs = ctx.uptime().as_secs(),
        recognitions = stats.completed,
        rejected = stats.rejected,
        "gateway stopped"
    );
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "asr_gateway=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

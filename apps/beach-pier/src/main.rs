mod cli;
mod config;
mod handlers;
mod launcher;
mod pairs;
mod registry;
mod relay;
mod signaling;
mod telemetry;
mod websocket;

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tokio::signal;
use tracing::info;

use crate::{
    cli::{Cli, Commands},
    config::Config,
    handlers::{build_router, AppState},
    launcher::RendererLauncher,
    relay::Relay,
    telemetry::Telemetry,
};

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();
    let telemetry = Telemetry::init(&cli.log_level)?;

    if let Some(Commands::Probe(args)) = cli.command.take() {
        return cli::run_probe(args).await;
    }

    let config = Config::try_from(&cli)?;
    info!(
        listen_addr = %config.listen_addr,
        renderer = ?config.renderer.as_ref().map(|renderer| renderer.program.display().to_string()),
        "starting beach-pier relay"
    );

    run(config, telemetry.metrics_handle()).await
}

async fn run(config: Config, metrics: PrometheusHandle) -> Result<()> {
    let state = AppState {
        relay: Arc::new(Relay::new()),
        launcher: config
            .renderer
            .clone()
            .map(|renderer| Arc::new(RendererLauncher::new(renderer))),
        metrics,
    };

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;

    info!("beach-pier listening on ws://{}", config.listen_addr);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server shutdown with error")?;

    info!(
        grace_seconds = config.shutdown_grace.as_secs(),
        "shutdown signal received; draining"
    );
    tokio::time::sleep(config.shutdown_grace).await;
    info!("shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
}

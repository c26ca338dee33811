//! Promptline server - drive interactive command-line programs over HTTP.

use anyhow::Result;
use clap::Parser;
use promptline_server::{config, logging, reaper, routes, state};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use config::Config;
use logging::{LogArgs, LogConfig};
use state::AppState;

/// Promptline server - multi-session interactive process controller.
#[derive(Parser, Debug)]
#[command(name = "promptline-server")]
#[command(about = "Start, drive and stop interactive programs over HTTP")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override port from config
    #[arg(short, long)]
    port: Option<u16>,

    #[command(flatten)]
    log: LogArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(&LogConfig::from_args(&cli.log));

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(port) = cli.port {
        config.port = port;
    }

    tracing::info!(
        target: "promptline::startup",
        "Loaded configuration (port: {}, grace: {:?}, log dir: {})",
        config.port,
        config.grace_period(),
        config.log_dir.display()
    );

    let state = Arc::new(AppState::new(config.clone()));

    let reaper = match config.idle_timeout() {
        Some(max_idle) => {
            tracing::info!(
                target: "promptline::startup",
                "Idle sessions are reaped after {:?}",
                max_idle
            );
            Some(reaper::spawn_idle_reaper(
                state.registry.clone(),
                max_idle,
                config.reap_interval(),
            ))
        }
        None => {
            tracing::info!(target: "promptline::startup", "Idle session reaping disabled");
            None
        }
    };

    let app = routes::app(state.clone())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!(target: "promptline::startup", "Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = reaper {
        handle.abort();
    }
    tracing::info!(
        target: "promptline::startup",
        "Stopping {} sessions",
        state.registry.len()
    );
    state.registry.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(target: "promptline::startup", "Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!(target: "promptline::startup", "Shutdown requested");
}

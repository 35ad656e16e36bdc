//! Gangway Daemon
//!
//! Headless service that lets thin clients drive remote machines over SSH.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use daemon::config::Config;
use daemon::relay::Relay;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Gangway daemon - remote shell and file management over SSH.
#[derive(Parser, Debug)]
#[command(name = "gangway")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Relay bind address as host:port, overriding the configuration
    #[arg(short, long, value_name = "ADDR")]
    listen: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    config.apply_env_overrides();

    if let Some(listen) = &cli.listen {
        let (address, port) = listen
            .rsplit_once(':')
            .ok_or_else(|| anyhow!("--listen expects host:port, got {listen:?}"))?;
        config.listen.address = address.to_string();
        config.listen.port = port
            .parse()
            .with_context(|| format!("invalid port in --listen: {port:?}"))?;
    }
    if cli.verbose {
        config.daemon.log_level = "debug".to_string();
    }
    config.validate().map_err(|e| anyhow!(e))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.daemon.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let addr = format!("{}:{}", config.listen.address, config.listen.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind relay listener on {addr}"))?;
    tracing::info!(%addr, "relay listening");

    let relay = Arc::new(Relay::new(Arc::new(config)));
    let registry = Arc::clone(relay.registry());

    tokio::select! {
        () = Arc::clone(&relay).serve(listener) => {}
        () = shutdown_signal() => {
            tracing::info!("shutdown signal received, closing sessions");
        }
    }

    registry.shutdown_all().await;
    tracing::info!("all sessions closed, exiting");
    Ok(())
}

/// Resolves when SIGINT or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    {
        let mut term =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            () = ctrl_c => {}
            _ = term.recv() => {}
        }
    }

    #[cfg(not(unix))]
    ctrl_c.await;
}

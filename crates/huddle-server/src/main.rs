//! `huddled` — the Huddle session server binary.
//!
//! Single-node and dev runner: serves the in-memory store, talks to a
//! Redis substrate when one is configured (loopback otherwise), and
//! accepts dev tokens. Production deployments embed [`huddle_server::Engine`]
//! with the platform's store adapter and token verifier.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use huddle_cluster::{MemorySubstrate, RedisSubstrate, Substrate};
use huddle_server::{DevTokenVerifier, Engine, ServerConfig};
use huddle_store::Store;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "huddled", version, about = "Huddle real-time session server")]
struct Cli {
    /// Listen address for WebSocket upgrades.
    #[arg(long, env = "HUDDLE_BIND")]
    bind: Option<SocketAddr>,

    /// Cluster substrate URL (e.g. redis://127.0.0.1:6379).
    #[arg(long, env = "HUDDLE_SUBSTRATE_URL")]
    substrate_url: Option<String>,

    /// Path to a TOML configuration file.
    #[arg(long, env = "HUDDLE_CONFIG")]
    config: Option<PathBuf>,

    /// Presence grace period in seconds.
    #[arg(long, env = "HUDDLE_GRACE_PERIOD_SECS")]
    grace_period_secs: Option<u64>,

    /// Idle read deadline in seconds.
    #[arg(long, env = "HUDDLE_READ_DEADLINE_SECS")]
    read_deadline_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }
    if let Some(url) = cli.substrate_url {
        config.substrate_url = Some(url);
    }
    if let Some(grace) = cli.grace_period_secs {
        config.grace_period_secs = grace;
    }
    if let Some(deadline) = cli.read_deadline_secs {
        config.read_deadline_secs = deadline;
    }
    config.validate()?;

    if config.store_url.is_some() {
        anyhow::bail!(
            "this binary bundles only the in-memory store; embed the Engine \
             with the platform's store adapter to use store_url"
        );
    }
    let (store, _memory) = Store::in_memory();

    let substrate: Arc<dyn Substrate> = match &config.substrate_url {
        Some(url) => {
            info!(url = %url, topic = %config.cluster_topic, "Using redis substrate");
            Arc::new(RedisSubstrate::new(url, config.cluster_topic.clone())?)
        },
        None => {
            info!("No substrate configured; running single-replica");
            Arc::new(MemorySubstrate::new())
        },
    };

    let engine = Engine::new(config, store, substrate, Arc::new(DevTokenVerifier));
    tokio::select! {
        result = engine.serve() => result?,
        () = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }
    engine.shutdown().await;
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            },
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

//! Leader Evictor daemon.
//!
//! Watches inter-node probe latency in a storage cluster and moves
//! leadership away from nodes whose links have been bad for a sustained
//! window, reverting once the links have been quiet for long enough.

#![forbid(unsafe_code)]

mod control;
mod daemon;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use control::{ControlV3, ControlV4};
use daemon::Evictor;
use evict_core::{ControlVersion, EvictorConfig};
use metrics::MetricsClient;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "evictd")]
#[command(author, version, about = "Latency-driven leader eviction daemon")]
struct Cli {
    /// Address of the metrics backend (Prometheus)
    #[arg(long, value_name = "URL")]
    prometheus: String,

    /// Address of the cluster control plane (PD)
    #[arg(long, value_name = "URL")]
    pd: String,

    /// Control-plane protocol version (v3 or v4)
    #[arg(long, default_value = "v3")]
    pd_version: String,

    /// Max number of stores this daemon may keep evicted at once
    #[arg(long, default_value_t = 10)]
    max_evicted: usize,

    /// Interval between latency refreshes
    #[arg(long, default_value = "15s", value_parser = humantime::parse_duration)]
    interval: Duration,

    /// Latency above this threshold counts as a bad reading
    #[arg(long, default_value = "1s", value_parser = humantime::parse_duration)]
    threshold: Duration,

    /// How long latency must stay bad before a store is evicted
    #[arg(long, default_value = "1m", value_parser = humantime::parse_duration)]
    pending_for_evict: Duration,

    /// How long latency must stay good before an evicted store recovers
    #[arg(long, default_value = "30s", value_parser = humantime::parse_duration)]
    pending_for_recover: Duration,

    /// Bad links required before a node is unhealthy rather than unstable
    #[arg(long, default_value_t = 1)]
    bad_link_fuse: u32,

    /// Print debug logs
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    // An unknown protocol version is fatal here, before anything runs.
    let control_version: ControlVersion = cli
        .pd_version
        .parse()
        .context("invalid --pd-version")?;

    let config = EvictorConfig {
        metrics_address: cli.prometheus,
        control_address: cli.pd,
        control_version,
        max_evicted: cli.max_evicted,
        interval: cli.interval,
        threshold: cli.threshold,
        pending_for_evict: cli.pending_for_evict,
        pending_for_recover: cli.pending_for_recover,
        bad_link_fuse: cli.bad_link_fuse,
    };
    info!(config = ?config, "evictor configuration");

    let shutdown = spawn_shutdown_listener();
    let metrics = MetricsClient::new(&config.metrics_address);
    let control_address = config.control_address.clone();

    match control_version {
        ControlVersion::V3 => {
            Evictor::new(config, metrics, ControlV3::new(control_address))
                .run(shutdown)
                .await;
        }
        ControlVersion::V4 => {
            Evictor::new(config, metrics, ControlV4::new(control_address))
                .run(shutdown)
                .await;
        }
    }
    Ok(())
}

/// Flip a watch channel on ctrl-c or SIGTERM. The loop checks it only at
/// tick boundaries, so the current cycle always finishes first.
fn spawn_shutdown_listener() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        let _ = tx.send(true);
    });
    rx
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

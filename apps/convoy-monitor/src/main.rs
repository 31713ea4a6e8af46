mod config;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::Parser;
use convoy_client::{AuthEvent, EntityEvent, Model, Readable, Subscribable, SyncClient};
use convoy_transport_websocket::WebSocketLink;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::MonitorConfig;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,
    /// Cluster path to watch; overrides the configured one
    #[arg(long, env = "CONVOY_MONITOR_CLUSTER")]
    cluster: Option<String>,
    /// Stop after this long (e.g. "30s"); runs until interrupted otherwise
    #[arg(long, value_parser = humantime_serde::re::humantime::parse_duration)]
    run_for: Option<Duration>,
}

fn describe(event: &EntityEvent) -> String {
    match event {
        EntityEvent::ChildAdded { kind, path } => format!("{kind} added at {path}"),
        EntityEvent::ChildUpdated { kind, path, fields } => {
            format!("{kind} {path} changed {}", fields.join(", "))
        }
        EntityEvent::ChildRemoved { kind, path } => format!("{kind} removed from {path}"),
        EntityEvent::Routed(route) => format!("route with {} stops", route.stops.len()),
        other => format!("{other:?}"),
    }
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let mut config = MonitorConfig::new(cli.config).context("failed to load config")?;
    if let Some(cluster) = cli.cluster {
        config.cluster = cluster;
    }

    let link = WebSocketLink::connect(config.link_config())
        .with_context(|| format!("failed to start link to {}", config.ws_url))?;
    let mut client = SyncClient::new(link, config.sync_config());

    let auth_failed = Arc::new(AtomicBool::new(false));
    let failed = Arc::clone(&auth_failed);
    client.add_auth_listener(move |event| match event {
        AuthEvent::Successful => info!("authenticated"),
        AuthEvent::Failed(reason) => {
            error!("authentication failed: {reason}");
            failed.store(true, Ordering::SeqCst);
        }
    });

    let cluster = client
        .cluster(&config.cluster)
        .with_context(|| format!("invalid cluster path {:?}", config.cluster))?;
    let watched = config.cluster.clone();
    cluster.add_listener(move |event| match event {
        EntityEvent::Error(message) => warn!("{watched}: server error: {message}"),
        other => info!("{watched}: {}", describe(other)),
    });
    // Queued until the handshake completes.
    cluster.connect();
    cluster.subscribe();

    let started = Instant::now();
    loop {
        let mut deadline = Instant::now() + config.stats_interval;
        if let Some(limit) = cli.run_for {
            deadline = deadline.min(started + limit);
        }
        if client.run_until(deadline, |_| auth_failed.load(Ordering::SeqCst)) {
            bail!("authentication failed; not retrying");
        }

        let stats = client.stats();
        info!(
            "sent={} received={} dropped={} queued={} entities={} transports={} commodities={}",
            stats.connection.sent,
            stats.connection.received,
            stats.connection.dropped,
            stats.connection.queued,
            stats.registered,
            cluster.transports().len(),
            cluster.commodities().len(),
        );

        if cli.run_for.is_some_and(|limit| started.elapsed() >= limit) {
            info!("run time elapsed; exiting");
            return Ok(());
        }
    }
}

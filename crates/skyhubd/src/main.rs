//! skyhubd — multiplayer flight position relay daemon.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;

use skyhub_core::addr::NetAddress;
use skyhub_core::config::HubConfig;
use skyhub_relay::{Hub, HubParams};

mod listener;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = HubConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = HubConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        HubConfig::default()
    });

    let params = HubParams {
        server_name: config.server.name.clone(),
        session_ttl: config.sessions.ttl_secs,
        max_radar_range_nm: config.sessions.max_radar_range_nm,
        out_of_reach_nm: config.sessions.out_of_reach_nm,
        hub_mode: config.server.hub_mode,
    };
    tracing::info!(
        name = %params.server_name,
        port = config.server.port,
        hub_mode = params.hub_mode,
        session_ttl = params.session_ttl,
        "skyhubd starting"
    );

    let hub = Arc::new(Hub::new(params));
    seed_from_config(&hub, &config);

    let socket = listener::make_data_socket(&config.server.bind_address, config.server.port)
        .context("failed to bind data socket")?;
    let socket = UdpSocket::from_std(socket).context("failed to convert to tokio UdpSocket")?;

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let relay_task = tokio::spawn(listener::relay_loop(
        socket,
        hub.clone(),
        shutdown_tx.subscribe(),
    ));
    let expiry_task = tokio::spawn(listener::expiry_loop(hub.clone(), shutdown_tx.subscribe()));
    let stats_task = tokio::spawn(listener::stats_loop(hub.clone(), shutdown_tx.subscribe()));

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv() => tracing::info!("shutting down"),
        r = relay_task         => tracing::error!("relay listener exited: {:?}", r),
        r = expiry_task        => tracing::error!("expiry task exited: {:?}", r),
        r = stats_task         => tracing::error!("stats task exited: {:?}", r),
    }

    Ok(())
}

/// Register the configured relays, crossfeeds and access lists.
/// Unresolvable or nonsensical entries are skipped with a warning so
/// one bad line does not keep the hub down.
fn seed_from_config(hub: &Hub, config: &HubConfig) {
    let now = listener::unix_now();

    for feed in &config.relays {
        let addr = match NetAddress::parse(&feed.host) {
            Ok(a) => a.with_port(feed.port),
            Err(e) => {
                tracing::warn!(host = %feed.host, error = %e, "skipping relay");
                continue;
            }
        };
        if addr.is_loopback() {
            tracing::warn!(host = %feed.host, "relay points back to me, skipping");
            continue;
        }
        if hub.add_relay(&feed.host, addr, now) {
            tracing::info!(host = %feed.host, port = feed.port, "relay registered");
        }
    }

    for feed in &config.crossfeeds {
        let addr = match NetAddress::parse(&feed.host) {
            Ok(a) => a.with_port(feed.port),
            Err(e) => {
                tracing::warn!(host = %feed.host, error = %e, "skipping crossfeed");
                continue;
            }
        };
        if hub.add_crossfeed(&feed.host, addr, now) {
            tracing::info!(host = %feed.host, port = feed.port, "crossfeed registered");
        }
    }

    for entry in &config.access.whitelist {
        match NetAddress::parse(entry) {
            Ok(a) => {
                hub.add_whitelist(a, now);
                tracing::info!(addr = %entry, "whitelist entry");
            }
            Err(e) => tracing::warn!(addr = %entry, error = %e, "skipping whitelist entry"),
        }
    }

    for entry in &config.access.blacklist {
        match NetAddress::parse(entry) {
            Ok(a) => {
                hub.add_blacklist("blacklisted in config", a, 0, now);
                tracing::info!(addr = %entry, "blacklist entry");
            }
            Err(e) => tracing::warn!(addr = %entry, error = %e, "skipping blacklist entry"),
        }
    }
}

//! The UDP data socket and the loops that run the hub.
//!
//! One socket carries everything: client traffic, relay traffic and
//! our own fan-out. The receive loop hands each datagram to the
//! engine with a collecting sink, then flushes the sink back out the
//! same socket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;

use skyhub_core::addr::NetAddress;
use skyhub_core::wire::MAX_PACKET_SIZE;
use skyhub_relay::engine::{Hub, VecSink};
use skyhub_relay::stats::HubStats;

/// Current unix time in seconds, the clock the whole engine runs on.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Bind the data socket. A large receive buffer rides out fan-out
/// stalls without dropping client reports.
pub fn make_data_socket(bind: &str, port: u16) -> Result<std::net::UdpSocket> {
    let addr: SocketAddr = if bind.is_empty() {
        SocketAddr::from(([0, 0, 0, 0], port))
    } else {
        let ip: std::net::IpAddr = bind
            .parse()
            .with_context(|| format!("invalid bind address {bind}"))?;
        SocketAddr::new(ip, port)
    };
    let domain = if addr.is_ipv6() {
        Domain::IPV6
    } else {
        Domain::IPV4
    };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP)).context("socket()")?;

    socket.set_reuse_address(true).context("SO_REUSEADDR")?;
    socket.set_recv_buffer_size(1 << 20).context("SO_RCVBUF")?;
    socket.set_nonblocking(true).context("set_nonblocking")?;
    socket.bind(&addr.into()).context("bind()")?;

    Ok(socket.into())
}

/// Receive datagrams and run them through the hub until shutdown.
///
/// The buffer is one byte past the protocol maximum so an oversized
/// datagram is seen as oversized instead of silently truncated.
pub async fn relay_loop(
    socket: UdpSocket,
    hub: Arc<Hub>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let mut buf = vec![0u8; MAX_PACKET_SIZE + 1];
    tracing::info!(addr = %socket.local_addr()?, "relay listener started");

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("relay listener stopping");
                return Ok(());
            }
            r = socket.recv_from(&mut buf) => {
                let (len, from) = match r {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!(error = %e, "recv_from failed");
                        continue;
                    }
                };

                let mut sink = VecSink::default();
                hub.handle_packet(from, &buf[..len], unix_now(), &mut sink);

                for (target, data) in sink.sent {
                    if let Err(e) = socket.send_to(&data, target).await {
                        tracing::warn!(%target, error = %e, "send failed");
                        let addr = NetAddress::from(target);
                        if hub.crossfeeds.find_by_endpoint(&addr).is_some() {
                            HubStats::inc(&hub.stats.crossfeed_failed);
                        }
                    }
                }
            }
        }
    }
}

/// Sweep out silent sessions and expired blacklist entries. Runs on
/// the session TTL so eviction happens even with no traffic at all.
pub async fn expiry_loop(hub: Arc<Hub>, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
    let period = hub.params.session_ttl.max(1);
    let mut interval = tokio::time::interval(Duration::from_secs(period));
    loop {
        tokio::select! {
            _ = shutdown.recv() => return Ok(()),
            _ = interval.tick() => hub.expire(unix_now()),
        }
    }
}

/// Periodic traffic summary for the operator.
pub async fn stats_loop(hub: Arc<Hub>, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    // skip the tick fired immediately on startup
    interval.tick().await;
    loop {
        tokio::select! {
            _ = shutdown.recv() => return Ok(()),
            _ = interval.tick() => {
                let s = hub.stats.snapshot();
                tracing::info!(
                    received = s.packets_received,
                    position = s.position_msgs,
                    chat = s.chat_msgs,
                    ping = s.ping_msgs,
                    invalid = s.invalid_packets,
                    blacklisted = s.blacklist_rejected,
                    unknown_relay = s.unknown_relay,
                    relayed_in = s.relayed_in,
                    crossfeed_sent = s.crossfeed_sent,
                    crossfeed_failed = s.crossfeed_failed,
                    local = s.local_sessions,
                    remote = s.remote_sessions,
                    max = s.max_sessions,
                    "traffic summary"
                );
            }
        }
    }
}

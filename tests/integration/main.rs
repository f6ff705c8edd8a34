//! skyhub integration test harness.
//!
//! Each test runs a hub in-process on a loopback UDP socket and talks
//! to it through plain UDP sockets, exactly like a client would. The
//! engine's registries and counters stay reachable through the shared
//! `Arc<Hub>`, so tests assert on both the wire and the state.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use tokio::net::UdpSocket;

use skyhub_core::codec::{Encoding, PacketBuf};
use skyhub_core::geom::{geod_to_cart, Vec3};
use skyhub_core::wire::{
    MsgHeader, MsgId, PositionData, HEADER_SIZE, MAX_PACKET_SIZE, MSG_MAGIC, POSITION_MSG_SIZE,
};
use skyhub_relay::engine::VecSink;
use skyhub_relay::{Hub, HubParams};

mod fanout;
mod validation;

// ── Harness ───────────────────────────────────────────────────────────────────

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Start a hub on an ephemeral loopback port. The receive loop lives
/// until the test's runtime is torn down.
pub async fn spawn_hub(params: HubParams) -> Result<(Arc<Hub>, SocketAddr)> {
    let socket = UdpSocket::bind("127.0.0.1:0")
        .await
        .context("failed to bind hub socket")?;
    let addr = socket.local_addr()?;
    let hub = Arc::new(Hub::new(params));

    let pump = hub.clone();
    tokio::spawn(async move {
        let mut buf = vec![0u8; MAX_PACKET_SIZE + 1];
        loop {
            let Ok((len, from)) = socket.recv_from(&mut buf).await else {
                break;
            };
            let mut sink = VecSink::default();
            pump.handle_packet(from, &buf[..len], unix_now(), &mut sink);
            for (target, data) in sink.sent {
                let _ = socket.send_to(&data, target).await;
            }
        }
    });

    Ok((hub, addr))
}

/// A simulated client: one UDP socket on loopback.
pub struct Client {
    pub socket: UdpSocket,
    pub addr: SocketAddr,
}

impl Client {
    pub async fn new() -> Result<Client> {
        let socket = UdpSocket::bind("127.0.0.1:0")
            .await
            .context("failed to bind client socket")?;
        let addr = socket.local_addr()?;
        Ok(Client { socket, addr })
    }

    pub async fn send(&self, hub: SocketAddr, packet: &[u8]) -> Result<()> {
        self.socket.send_to(packet, hub).await?;
        Ok(())
    }

    /// Receive one datagram, or None if nothing arrives in time.
    pub async fn recv_timeout(&self, ms: u64) -> Option<Vec<u8>> {
        let mut buf = vec![0u8; MAX_PACKET_SIZE + 1];
        match tokio::time::timeout(Duration::from_millis(ms), self.socket.recv(&mut buf)).await {
            Ok(Ok(len)) => {
                buf.truncate(len);
                Some(buf)
            }
            _ => None,
        }
    }
}

/// Poll until `cond` holds, or give up after two seconds.
pub async fn wait_for<F: Fn() -> bool>(cond: F) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

// ── Packet builders ───────────────────────────────────────────────────────────

/// A settled position near Frankfurt, offset east by roughly
/// `east_nm` nautical miles.
pub fn pos_near_eddf(east_nm: f64) -> Vec3 {
    let lat = 50.0_f64.to_radians();
    // one degree of longitude at 50N is about 38.6 NM
    let lon = (8.5 + east_nm / 38.6).to_radians();
    geod_to_cart(lat, lon, 1000.0)
}

pub fn position_packet(callsign: &str, model: &str, pos: Vec3, radar_raw: u32, magic: u32) -> Vec<u8> {
    let mut header = MsgHeader::new(MsgId::Position, POSITION_MSG_SIZE as u32, callsign);
    header.magic = magic;
    header.radar_range = radar_raw;
    let data = PositionData {
        model: model.to_owned(),
        time: 0,
        lag: 0,
        position: pos,
        orientation: [0.1, 0.2, 0.3],
        linear_vel: [0.0; 3],
        angular_vel: [0.0; 3],
        linear_accel: [0.0; 3],
        angular_accel: [0.0; 3],
    };
    let mut buf = PacketBuf::new(MAX_PACKET_SIZE, Encoding::Xdr);
    header.encode(&mut buf).unwrap();
    data.encode(&mut buf).unwrap();
    buf.as_slice().to_vec()
}

pub fn ping_packet(callsign: &str) -> Vec<u8> {
    let header = MsgHeader::new(MsgId::Ping, HEADER_SIZE as u32, callsign);
    let mut buf = PacketBuf::new(MAX_PACKET_SIZE, Encoding::Xdr);
    header.encode(&mut buf).unwrap();
    buf.as_slice().to_vec()
}

pub fn decode_header(packet: &[u8]) -> MsgHeader {
    let mut buf = PacketBuf::from_bytes(&packet[..HEADER_SIZE], Encoding::Xdr);
    MsgHeader::decode(&mut buf).unwrap()
}

// ── Smoke test ────────────────────────────────────────────────────────────────

/// A single client opens a session and shows up in the registries.
#[tokio::test]
async fn position_report_over_udp_opens_a_session() -> Result<()> {
    let (hub, hub_addr) = spawn_hub(HubParams::default()).await?;
    let client = Client::new().await?;

    let pkt = position_packet("D-ABCD", "c172p", pos_near_eddf(0.0), 0, MSG_MAGIC);
    client.send(hub_addr, &pkt).await?;

    assert!(wait_for(|| hub.sessions.find_by_name("D-ABCD").is_some()).await);
    let s = hub.sessions.find_by_name("D-ABCD").unwrap();
    assert!(s.is_local);
    assert_eq!(s.record.address.port(), client.addr.port());
    assert_eq!(hub.stats.snapshot().local_sessions, 1);
    Ok(())
}

//! The relay engine: validate, track, fan out.
//!
//! One call per received datagram. The engine never touches a socket;
//! every outbound packet goes through the caller's [`PacketSink`], and
//! the current time arrives as a parameter. Fan-out never re-encodes a
//! packet: the received bytes are copied once per destination class
//! with only the leading magic rewritten.

use std::net::SocketAddr;

use bytes::Bytes;
use tracing::{debug, info, warn};

use skyhub_core::addr::NetAddress;
use skyhub_core::codec::{Encoding, PacketBuf};
use skyhub_core::geom::{cart_to_geod, distance_nm};
use skyhub_core::wire::{
    patch_magic, patch_msg_id, MsgHeader, MsgId, PositionData, RadarRange, HEADER_SIZE,
    MAX_PACKET_SIZE, MSG_MAGIC, POSITION_MSG_SIZE, RELAY_MAGIC, UPDATE_INACTIVE_SECS,
};

use crate::entry::{AtcRole, EntryRecord, Session};
use crate::registry::Registry;
use crate::stats::HubStats;

/// Sessions evicted for silence get this long after joining before the
/// timeout applies, so a client with a slow start is not dropped
/// mid-handshake.
const JOIN_GRACE_SECS: u64 = 30;

/// Where outbound packets go. The daemon backs this with the UDP
/// socket; tests collect into a [`VecSink`].
pub trait PacketSink {
    fn send(&mut self, target: SocketAddr, data: Bytes);
}

/// Collects outbound packets instead of sending them.
#[derive(Debug, Default)]
pub struct VecSink {
    pub sent: Vec<(SocketAddr, Bytes)>,
}

impl PacketSink for VecSink {
    fn send(&mut self, target: SocketAddr, data: Bytes) {
        self.sent.push((target, data));
    }
}

/// Engine tuning, fixed at startup.
#[derive(Debug, Clone)]
pub struct HubParams {
    /// Name announced in operator output and logs.
    pub server_name: String,
    /// Seconds of silence before a session is evicted.
    pub session_ttl: u64,
    /// Upper bound on a client-advertised radar range, NM.
    pub max_radar_range_nm: u16,
    /// Range assigned when a client advertises none, NM.
    pub out_of_reach_nm: u16,
    /// Hub mode forwards relay-origin traffic on to other relays.
    pub hub_mode: bool,
}

impl Default for HubParams {
    fn default() -> Self {
        Self {
            server_name: "skyhub".to_owned(),
            session_ttl: 10,
            max_radar_range_nm: 2000,
            out_of_reach_nm: 100,
            hub_mode: false,
        }
    }
}

/// The hub: all registries plus the packet path over them.
#[derive(Debug)]
pub struct Hub {
    pub params: HubParams,
    pub sessions: Registry<Session>,
    pub relays: Registry<EntryRecord>,
    pub crossfeeds: Registry<EntryRecord>,
    pub whitelist: Registry<EntryRecord>,
    pub blacklist: Registry<EntryRecord>,
    pub stats: HubStats,
}

impl Hub {
    pub fn new(params: HubParams) -> Self {
        Self {
            params,
            sessions: Registry::new(),
            relays: Registry::new(),
            crossfeeds: Registry::new(),
            whitelist: Registry::new(),
            blacklist: Registry::new(),
            stats: HubStats::default(),
        }
    }

    // ── seeding ───────────────────────────────────────────────────────

    /// Register a relay peer. Duplicate endpoints are ignored.
    pub fn add_relay(&self, label: &str, addr: NetAddress, now: u64) -> bool {
        if self.relays.find_by_endpoint(&addr).is_some() {
            return false;
        }
        self.relays.add(EntryRecord::new(label, addr, now, 0));
        true
    }

    /// Register a crossfeed sink. Duplicate endpoints are ignored.
    pub fn add_crossfeed(&self, label: &str, addr: NetAddress, now: u64) -> bool {
        if self.crossfeeds.find_by_endpoint(&addr).is_some() {
            return false;
        }
        self.crossfeeds.add(EntryRecord::new(label, addr, now, 0));
        true
    }

    /// Accept relay traffic from this address or prefix.
    pub fn add_whitelist(&self, addr: NetAddress, now: u64) -> bool {
        if self.whitelist.find_by_addr(&addr).is_some() {
            return false;
        }
        self.whitelist.add(EntryRecord::new("whitelisted", addr, now, 0));
        true
    }

    /// Drop all traffic from this address or prefix. A ttl of 0 blocks
    /// until restart.
    pub fn add_blacklist(&self, reason: &str, addr: NetAddress, ttl_secs: u64, now: u64) -> bool {
        if self.blacklist.find_by_addr(&addr).is_some() {
            return false;
        }
        self.blacklist.add(EntryRecord::new(reason, addr, now, ttl_secs));
        true
    }

    // ── packet path ───────────────────────────────────────────────────

    /// Process one received datagram. `now` is unix seconds.
    pub fn handle_packet<S: PacketSink>(
        &self,
        sender: SocketAddr,
        packet: &[u8],
        now: u64,
        sink: &mut S,
    ) {
        HubStats::inc(&self.stats.packets_received);
        let addr = NetAddress::from(sender);

        // blacklist first, before any byte of the packet is parsed
        if let Some(block) = self.blacklist.find_containing(&addr) {
            HubStats::inc(&self.stats.blacklist_rejected);
            self.blacklist.record_rcvd(block.id, packet.len(), now);
            debug!(%addr, reason = %block.name, "dropped blacklisted packet");
            return;
        }

        let Some(header) = self.validate(&addr, packet, now) else {
            return;
        };

        match header.id() {
            MsgId::Ping => {
                // echoed verbatim with the id swapped; pings never
                // create or refresh a session
                HubStats::inc(&self.stats.ping_msgs);
                let mut echo = packet.to_vec();
                patch_msg_id(&mut echo, MsgId::Pong);
                sink.send(sender, Bytes::from(echo));
                return;
            }
            MsgId::Pong => {
                HubStats::inc(&self.stats.pong_msgs);
                return;
            }
            MsgId::Chat => HubStats::inc(&self.stats.chat_msgs),
            MsgId::Position => HubStats::inc(&self.stats.position_msgs),
            MsgId::Unknown(id) => {
                // unassigned ids are counted but still relayed, so new
                // client message types pass through old hubs
                HubStats::inc(&self.stats.unknown_msgs);
                debug!(id, callsign = %header.callsign, "unassigned message id");
            }
        }

        self.relay_message(addr, &header, packet, now, sink);
    }

    /// Header-level validation. Returns None after recording the
    /// failure; unknown relay senders are blacklisted on the spot.
    fn validate(&self, addr: &NetAddress, packet: &[u8], now: u64) -> Option<MsgHeader> {
        if packet.len() < HEADER_SIZE || packet.len() > MAX_PACKET_SIZE {
            self.reject(addr, "bad packet size", packet, now);
            return None;
        }
        let mut buf = PacketBuf::from_bytes(&packet[..HEADER_SIZE], Encoding::Xdr);
        let header = match MsgHeader::decode(&mut buf) {
            Ok(h) => h,
            Err(_) => {
                self.reject(addr, "unreadable header", packet, now);
                return None;
            }
        };
        if header.magic != MSG_MAGIC && header.magic != RELAY_MAGIC {
            self.reject(addr, "invalid magic", packet, now);
            return None;
        }
        if header.proto_major() != 1 {
            self.reject(addr, "invalid protocol version", packet, now);
            return None;
        }
        if header.magic == RELAY_MAGIC {
            let known = self.relays.find_by_addr(addr).is_some()
                || self.whitelist.find_containing(addr).is_some();
            if !known {
                HubStats::inc(&self.stats.unknown_relay);
                warn!(%addr, "relay traffic from unknown address, blacklisting");
                self.blacklist
                    .add(EntryRecord::new("not a valid relay", *addr, now, 0));
                return None;
            }
            HubStats::inc(&self.stats.relayed_in);
        }
        if header.id() == MsgId::Position && packet.len() < POSITION_MSG_SIZE {
            self.reject(addr, "short position report", packet, now);
            return None;
        }
        Some(header)
    }

    fn reject(&self, addr: &NetAddress, reason: &str, packet: &[u8], now: u64) {
        HubStats::inc(&self.stats.invalid_packets);
        let preview = hex::encode(&packet[..packet.len().min(16)]);
        warn!(%addr, reason, preview, "rejected packet");
        self.note_bad_client(addr, reason, packet.len(), now);
    }

    /// Remember a misbehaving address as an error-flagged session so
    /// repeated garbage shows up in operator listings instead of only
    /// in counters. An address that already has a session only gets the
    /// bytes accounted: one stray datagram must not mute a valid pilot.
    fn note_bad_client(&self, addr: &NetAddress, reason: &str, bytes: usize, now: u64) {
        if let Some(existing) = self.sessions.find_by_addr(addr) {
            self.sessions.record_rcvd(existing.record.id, bytes, now);
            return;
        }
        let mut bad = Session::new("* Bad Client *", *addr, now, self.params.session_ttl);
        bad.model = "* unknown *".to_owned();
        bad.error = Some(reason.to_owned());
        bad.record.pkts_rcvd = 1;
        bad.record.bytes_rcvd = bytes as u64;
        self.sessions.add(bad);
    }

    fn relay_message<S: PacketSink>(
        &self,
        addr: NetAddress,
        header: &MsgHeader,
        packet: &[u8],
        now: u64,
        sink: &mut S,
    ) {
        let is_relay_origin = header.magic == RELAY_MAGIC;

        let known = match self.sessions.find_by_name(&header.callsign) {
            Some(s) if s.record.address != addr => {
                // callsign already in use from another address
                debug!(callsign = %header.callsign, %addr, "callsign collision, dropping");
                return;
            }
            other => other,
        };

        let session = if header.id() == MsgId::Position {
            let mut buf =
                PacketBuf::from_bytes(&packet[HEADER_SIZE..POSITION_MSG_SIZE], Encoding::Xdr);
            let pos = match PositionData::decode(&mut buf) {
                Ok(p) => p,
                Err(_) => {
                    self.reject(&addr, "unreadable position report", packet, now);
                    return;
                }
            };
            if pos.position.is_unsettled() {
                // the client's simulation has not settled yet
                return;
            }
            match known {
                Some(s) => {
                    self.refresh_session(&s, header, &pos, packet.len(), now);
                    match self.sessions.get(s.record.id) {
                        Some(s) => s,
                        None => return,
                    }
                }
                None => self.admit_session(addr, header, &pos, is_relay_origin, packet.len(), now),
            }
        } else {
            // only position reports open a session
            match known {
                Some(s) => {
                    self.sessions.record_rcvd(s.record.id, packet.len(), now);
                    s
                }
                None => return,
            }
        };

        if session.error.is_some() {
            return;
        }

        if is_relay_origin {
            if let Some(relay) = self.relays.find_by_addr(&addr) {
                self.relays.record_rcvd(relay.id, packet.len(), now);
            }
        }

        self.fan_out(&session, is_relay_origin, packet, now, sink);
    }

    fn admit_session(
        &self,
        addr: NetAddress,
        header: &MsgHeader,
        pos: &PositionData,
        is_relay_origin: bool,
        bytes: usize,
        now: u64,
    ) -> Session {
        let mut session = Session::new(&header.callsign, addr, now, self.params.session_ttl);
        session.model = pos.model.clone();
        session.last_pos = pos.position;
        session.geod = cart_to_geod(pos.position);
        session.orientation = pos.orientation;
        session.is_local = !is_relay_origin;
        session.atc = AtcRole::from_session(&header.callsign, &pos.model);
        session.radar_range_nm = self.admitted_radar_range(header.radar_range);
        session.proto_major = header.proto_major();
        session.proto_minor = header.proto_minor();
        session.record.pkts_rcvd = 1;
        session.record.bytes_rcvd = bytes as u64;

        session.record.id = self.sessions.add(session.clone());
        self.refresh_gauges();
        info!(
            callsign = %session.record.name,
            model = %session.model,
            %addr,
            local = session.is_local,
            lat = session.geod.lat_deg,
            lon = session.geod.lon_deg,
            radar_nm = session.radar_range_nm,
            "new session"
        );
        session
    }

    fn refresh_session(
        &self,
        session: &Session,
        header: &MsgHeader,
        pos: &PositionData,
        bytes: usize,
        now: u64,
    ) {
        let range = RadarRange::from_wire(header.radar_range);
        let max = self.params.max_radar_range_nm;
        self.sessions.modify(session.record.id, |s| {
            s.record.pkts_rcvd += 1;
            s.record.bytes_rcvd += bytes as u64;
            s.record.last_seen = now;
            s.last_pos = pos.position;
            s.geod = cart_to_geod(pos.position);
            s.orientation = pos.orientation;
            // an advertised range past the cap is ignored, not clamped
            if let RadarRange::Advertised(nm) = range {
                if nm <= max {
                    s.radar_range_nm = nm;
                }
            }
        });
    }

    fn admitted_radar_range(&self, raw: u32) -> u16 {
        match RadarRange::from_wire(raw) {
            RadarRange::Advertised(nm) if nm <= self.params.max_radar_range_nm => nm,
            _ => self.params.out_of_reach_nm,
        }
    }

    fn fan_out<S: PacketSink>(
        &self,
        sender: &Session,
        is_relay_origin: bool,
        packet: &[u8],
        now: u64,
        sink: &mut S,
    ) {
        // crossfeeds see every relayed packet, stamped as relay traffic
        if !self.crossfeeds.is_empty() {
            let mut copy = packet.to_vec();
            patch_magic(&mut copy, RELAY_MAGIC);
            let copy = Bytes::from(copy);
            for feed in self.crossfeeds.snapshot() {
                if let Some(target) = feed.address.to_socket_addr() {
                    sink.send(target, copy.clone());
                    HubStats::inc(&self.stats.crossfeed_sent);
                    self.crossfeeds.record_sent(feed.id, copy.len(), now);
                }
            }
        }

        // once per interval the sender goes out to every relay even
        // when no one behind it is in range, so relays keep the
        // session alive
        let do_update =
            now.saturating_sub(sender.last_relayed_to_inactive) > UPDATE_INACTIVE_SECS;
        if do_update {
            self.sessions
                .modify(sender.record.id, |s| s.last_relayed_to_inactive = now);
        }

        // local receivers
        if !sender.is_observer() {
            let mut copy = packet.to_vec();
            patch_magic(&mut copy, MSG_MAGIC);
            let copy = Bytes::from(copy);
            for receiver in self.sessions.snapshot() {
                if receiver.record.id == sender.record.id {
                    continue;
                }
                if receiver.error.is_some() {
                    // error sessions never receive; drop them here once
                    // their timeout passes instead of waiting for the
                    // eviction sweep
                    if receiver.record.expired(now) {
                        self.sessions.remove(receiver.record.id);
                        info!(
                            callsign = %receiver.record.name,
                            addr = %receiver.record.address,
                            "dropped error session"
                        );
                    }
                    continue;
                }
                if !receiver.is_local {
                    continue;
                }
                let dist = distance_nm(sender.last_pos, receiver.last_pos);
                if dist < receiver.radar_range_nm as f64 {
                    if let Some(target) = receiver.record.address.to_socket_addr() {
                        sink.send(target, copy.clone());
                        self.sessions.record_sent(receiver.record.id, copy.len(), now);
                    }
                }
            }
        }

        // relay peers; relay-origin traffic stops here unless this hub
        // is the designated hub of a relay star
        if is_relay_origin && !self.params.hub_mode {
            return;
        }
        if self.relays.is_empty() {
            return;
        }
        let mut copy = packet.to_vec();
        patch_magic(&mut copy, RELAY_MAGIC);
        let copy = Bytes::from(copy);
        for relay in self.relays.snapshot() {
            if relay.address == sender.record.address {
                continue;
            }
            if do_update || self.relay_in_range(&relay, sender) {
                if let Some(target) = relay.address.to_socket_addr() {
                    sink.send(target, copy.clone());
                    self.relays.record_sent(relay.id, copy.len(), now);
                }
            }
        }
    }

    /// A relay wants the sender's traffic while any session that
    /// arrived through it can see the sender.
    fn relay_in_range(&self, relay: &EntryRecord, sender: &Session) -> bool {
        self.sessions.snapshot().iter().any(|s| {
            !s.is_local
                && s.error.is_none()
                && s.record.address == relay.address
                && distance_nm(sender.last_pos, s.last_pos) < s.radar_range_nm as f64
        })
    }

    // ── maintenance ───────────────────────────────────────────────────

    /// Periodic sweep: silent sessions and expired blacklist entries.
    pub fn expire(&self, now: u64) {
        let dropped = self.sessions.evict_expired(now, JOIN_GRACE_SECS);
        for s in &dropped {
            info!(
                callsign = %s.record.name,
                addr = %s.record.address,
                pkts_rcvd = s.record.pkts_rcvd,
                pkts_sent = s.record.pkts_sent,
                online_secs = s.record.last_seen.saturating_sub(s.record.join_time),
                "session timed out"
            );
        }
        if !dropped.is_empty() {
            self.refresh_gauges();
        }
        for b in self.blacklist.evict_expired(now, 0) {
            info!(addr = %b.address, reason = %b.name, "blacklist entry expired");
        }
    }

    fn refresh_gauges(&self) {
        let snapshot = self.sessions.snapshot();
        let local = snapshot
            .iter()
            .filter(|s| s.is_local && s.error.is_none())
            .count() as u64;
        let remote = snapshot
            .iter()
            .filter(|s| !s.is_local && s.error.is_none())
            .count() as u64;
        self.stats.set_session_gauges(local, remote);
    }
}

//! Tracked state for everything the hub talks to.
//!
//! Sessions, relays, crossfeeds and access-list entries all share the
//! same bookkeeping core, [`EntryRecord`]: identity, address, traffic
//! counters and a timeout. [`Session`] wraps a record with the flight
//! state needed for the visibility rule.

use skyhub_core::addr::NetAddress;
use skyhub_core::geom::{Geodetic, Vec3};

/// Common bookkeeping shared by all registry entries.
#[derive(Debug, Clone)]
pub struct EntryRecord {
    /// Registry-assigned id, unique within one registry, never reused.
    pub id: u64,
    /// Callsign, peer label, or block reason depending on the registry.
    pub name: String,
    pub address: NetAddress,
    /// Unix seconds.
    pub join_time: u64,
    pub last_seen: u64,
    pub last_sent: u64,
    pub pkts_sent: u64,
    pub bytes_sent: u64,
    pub pkts_rcvd: u64,
    pub bytes_rcvd: u64,
    /// Seconds of silence before eviction. 0 = never expires.
    pub timeout_secs: u64,
}

impl EntryRecord {
    pub fn new(name: &str, address: NetAddress, now: u64, timeout_secs: u64) -> Self {
        Self {
            id: 0,
            name: name.to_owned(),
            address,
            join_time: now,
            last_seen: now,
            last_sent: 0,
            pkts_sent: 0,
            bytes_sent: 0,
            pkts_rcvd: 0,
            bytes_rcvd: 0,
            timeout_secs,
        }
    }

    /// True once the entry has been silent past its timeout.
    pub fn expired(&self, now: u64) -> bool {
        self.timeout_secs != 0 && now.saturating_sub(self.last_seen) > self.timeout_secs
    }
}

/// Anything a [`Registry`](crate::registry::Registry) can hold.
pub trait Recorded {
    fn record(&self) -> &EntryRecord;
    fn record_mut(&mut self) -> &mut EntryRecord;
}

/// Relays, crossfeeds and access lists hold bare records.
impl Recorded for EntryRecord {
    fn record(&self) -> &EntryRecord {
        self
    }

    fn record_mut(&mut self) -> &mut EntryRecord {
        self
    }
}

/// The controller position an ATC client announces through its
/// callsign suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtcRole {
    /// Not an ATC client.
    None,
    /// ATC without a recognized position suffix.
    Generic,
    Delivery,
    Ground,
    Tower,
    Approach,
    Departure,
    Center,
}

impl AtcRole {
    /// Detect an ATC client from its model and callsign. Controllers
    /// fly the OpenRadar pseudo-model or one of the ATC models and tag
    /// their position onto the callsign.
    pub fn from_session(callsign: &str, model: &str) -> Self {
        if model != "OpenRadar" && !model.contains("ATC") {
            return AtcRole::None;
        }
        if callsign.ends_with("_DL") {
            AtcRole::Delivery
        } else if callsign.ends_with("_GN") {
            AtcRole::Ground
        } else if callsign.ends_with("_TW") {
            AtcRole::Tower
        } else if callsign.ends_with("_AP") {
            AtcRole::Approach
        } else if callsign.ends_with("_DE") {
            AtcRole::Departure
        } else if callsign.ends_with("_CT") {
            AtcRole::Center
        } else {
            AtcRole::Generic
        }
    }
}

/// One connected client, either direct or seen through a relay.
#[derive(Debug, Clone)]
pub struct Session {
    pub record: EntryRecord,
    /// Aircraft model path from the last position report.
    pub model: String,
    /// Last settled cartesian position, meters.
    pub last_pos: Vec3,
    /// Geodetic rendition of `last_pos`, for operator output.
    pub geod: Geodetic,
    pub orientation: [f32; 3],
    /// True when the client sends to this hub directly rather than
    /// arriving through a relay peer.
    pub is_local: bool,
    pub atc: AtcRole,
    /// Clamped radar range in nautical miles.
    pub radar_range_nm: u16,
    pub proto_major: u16,
    pub proto_minor: u16,
    /// Set when the session exists only to remember a misbehaving
    /// address. Error sessions never receive traffic and are evicted
    /// once their timeout passes.
    pub error: Option<String>,
    /// Last time this sender was forced out to relays regardless of
    /// range, unix seconds.
    pub last_relayed_to_inactive: u64,
}

impl Session {
    pub fn new(callsign: &str, address: NetAddress, now: u64, timeout_secs: u64) -> Self {
        Self {
            record: EntryRecord::new(callsign, address, now, timeout_secs),
            model: String::new(),
            last_pos: Vec3::default(),
            geod: Geodetic::default(),
            orientation: [0.0; 3],
            is_local: true,
            atc: AtcRole::None,
            radar_range_nm: 0,
            proto_major: 0,
            proto_minor: 0,
            error: None,
            last_relayed_to_inactive: 0,
        }
    }

    pub fn callsign(&self) -> &str {
        &self.record.name
    }

    /// Observers watch but are not shown to other clients.
    pub fn is_observer(&self) -> bool {
        let cs = self.record.name.as_bytes();
        cs.len() >= 3 && cs[..3].eq_ignore_ascii_case(b"obs")
    }
}

impl Recorded for Session {
    fn record(&self) -> &EntryRecord {
        &self.record
    }

    fn record_mut(&mut self) -> &mut EntryRecord {
        &mut self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> NetAddress {
        NetAddress::parse(s).unwrap()
    }

    #[test]
    fn record_expiry_honors_timeout() {
        let mut rec = EntryRecord::new("D-ABCD", addr("10.0.0.1"), 1000, 10);
        assert!(!rec.expired(1005));
        assert!(!rec.expired(1010));
        assert!(rec.expired(1011));
        rec.timeout_secs = 0;
        assert!(!rec.expired(999_999));
    }

    #[test]
    fn atc_role_from_callsign_suffix() {
        assert_eq!(AtcRole::from_session("EDDF_TW", "OpenRadar"), AtcRole::Tower);
        assert_eq!(
            AtcRole::from_session("KSFO_GN", "Models/ATC/atc.xml"),
            AtcRole::Ground
        );
        assert_eq!(
            AtcRole::from_session("EDDF_AP", "OpenRadar"),
            AtcRole::Approach
        );
        assert_eq!(AtcRole::from_session("EDDF", "OpenRadar"), AtcRole::Generic);
        assert_eq!(
            AtcRole::from_session("EDDF_TW", "Aircraft/c172p/c172p.xml"),
            AtcRole::None
        );
    }

    #[test]
    fn observer_prefix_is_case_insensitive() {
        assert!(Session::new("obsEDDF", addr("10.0.0.1"), 0, 10).is_observer());
        assert!(Session::new("OBS-1", addr("10.0.0.1"), 0, 10).is_observer());
        assert!(!Session::new("D-OBS", addr("10.0.0.1"), 0, 10).is_observer());
        assert!(!Session::new("ob", addr("10.0.0.1"), 0, 10).is_observer());
    }
}

//! The multiplayer wire protocol.
//!
//! Every packet starts with a 32-byte header; a position report
//! carries a 196-byte payload behind it. These layouts ARE the
//! protocol and are shared with a large installed base of clients and
//! peer hubs. Nothing here may change without breaking the wire.

use static_assertions::const_assert_eq;

use crate::codec::{CodecError, Encoding, PacketBuf};
use crate::geom::Vec3;

/// Magic of a packet sent by a client directly ("FGFS").
pub const MSG_MAGIC: u32 = 0x4647_4653;
/// Magic of a packet forwarded by a relay hub ("GSGF").
pub const RELAY_MAGIC: u32 = 0x5346_4746;
/// Protocol version, major in the high 16 bits. Currently 1.1.
pub const PROTO_VERSION: u32 = 0x0001_0001;

/// Largest packet the hub accepts or emits.
pub const MAX_PACKET_SIZE: usize = 1200;
/// Maximum callsign length carried in the header.
pub const MAX_CALLSIGN_LEN: usize = 8;
/// Maximum aircraft model path length in a position report.
pub const MAX_MODEL_NAME_LEN: usize = 96;

/// Encoded header size in bytes.
pub const HEADER_SIZE: usize = 6 * 4 + MAX_CALLSIGN_LEN;
/// Encoded position payload size in bytes.
pub const POSITION_SIZE: usize = MAX_MODEL_NAME_LEN + 2 * 8 + 3 * 8 + 5 * 3 * 4;
/// A full position message: header plus payload.
pub const POSITION_MSG_SIZE: usize = HEADER_SIZE + POSITION_SIZE;

// The installed base expects exactly these sizes.
const_assert_eq!(HEADER_SIZE, 32);
const_assert_eq!(POSITION_SIZE, 196);
const_assert_eq!(POSITION_MSG_SIZE, 228);

/// Seconds between forced updates to relays that are otherwise out of
/// range of a sender.
pub const UPDATE_INACTIVE_SECS: u64 = 1;

/// Message kinds carried in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgId {
    /// Broadcast chat text. Rare in practice.
    Chat,
    /// Echoed back to the sender verbatim, with the id swapped to Pong.
    Ping,
    Pong,
    /// A position report, the bulk of all traffic.
    Position,
    /// Ids 4 through 6 are retired, anything else was never assigned.
    Unknown(u32),
}

impl From<u32> for MsgId {
    fn from(raw: u32) -> Self {
        match raw {
            1 => MsgId::Chat,
            2 => MsgId::Ping,
            3 => MsgId::Pong,
            7 => MsgId::Position,
            other => MsgId::Unknown(other),
        }
    }
}

impl From<MsgId> for u32 {
    fn from(id: MsgId) -> u32 {
        match id {
            MsgId::Chat => 1,
            MsgId::Ping => 2,
            MsgId::Pong => 3,
            MsgId::Position => 7,
            MsgId::Unknown(other) => other,
        }
    }
}

/// The decoded packet header.
///
/// `radar_range` and `reply_port` are kept raw; the radar-range field
/// needs the 16/16 split rule ([`RadarRange::from_wire`]) and the
/// reply port is a dead field that must round-trip unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct MsgHeader {
    pub magic: u32,
    pub version: u32,
    pub msg_id: u32,
    pub msg_len: u32,
    pub radar_range: u32,
    pub reply_port: u32,
    pub callsign: String,
}

impl MsgHeader {
    pub fn new(msg_id: MsgId, msg_len: u32, callsign: &str) -> Self {
        Self {
            magic: MSG_MAGIC,
            version: PROTO_VERSION,
            msg_id: msg_id.into(),
            msg_len,
            radar_range: 0,
            reply_port: 0,
            callsign: callsign.to_owned(),
        }
    }

    pub fn id(&self) -> MsgId {
        MsgId::from(self.msg_id)
    }

    /// Major protocol version, high 16 bits of the version field.
    pub fn proto_major(&self) -> u16 {
        (self.version >> 16) as u16
    }

    pub fn proto_minor(&self) -> u16 {
        (self.version & 0xffff) as u16
    }

    pub fn encode(&self, buf: &mut PacketBuf) -> Result<(), CodecError> {
        buf.write_u32(self.magic)?;
        buf.write_u32(self.version)?;
        buf.write_u32(self.msg_id)?;
        buf.write_u32(self.msg_len)?;
        buf.write_u32(self.radar_range)?;
        buf.write_u32(self.reply_port)?;
        buf.write_fixed_str(&self.callsign, MAX_CALLSIGN_LEN)
    }

    pub fn decode(buf: &mut PacketBuf) -> Result<Self, CodecError> {
        Ok(Self {
            magic: buf.read_u32()?,
            version: buf.read_u32()?,
            msg_id: buf.read_u32()?,
            msg_len: buf.read_u32()?,
            radar_range: buf.read_u32()?,
            reply_port: buf.read_u32()?,
            callsign: buf.read_fixed_str(MAX_CALLSIGN_LEN)?,
        })
    }
}

/// The position payload following the header in a position report.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionData {
    pub model: String,
    /// Sender simulation time.
    pub time: u64,
    /// Artificial lag the client wants receivers to stay behind.
    pub lag: u64,
    /// Earth-centered cartesian position, meters.
    pub position: Vec3,
    /// Orientation as angle-axis, angle coded into the axis length.
    pub orientation: [f32; 3],
    pub linear_vel: [f32; 3],
    pub angular_vel: [f32; 3],
    pub linear_accel: [f32; 3],
    pub angular_accel: [f32; 3],
}

impl PositionData {
    pub fn encode(&self, buf: &mut PacketBuf) -> Result<(), CodecError> {
        buf.write_fixed_str(&self.model, MAX_MODEL_NAME_LEN)?;
        buf.write_u64(self.time)?;
        buf.write_u64(self.lag)?;
        buf.write_f64(self.position.x)?;
        buf.write_f64(self.position.y)?;
        buf.write_f64(self.position.z)?;
        for block in [
            &self.orientation,
            &self.linear_vel,
            &self.angular_vel,
            &self.linear_accel,
            &self.angular_accel,
        ] {
            for v in block {
                buf.write_f32(*v)?;
            }
        }
        Ok(())
    }

    pub fn decode(buf: &mut PacketBuf) -> Result<Self, CodecError> {
        let model = buf.read_fixed_str(MAX_MODEL_NAME_LEN)?;
        let time = buf.read_u64()?;
        let lag = buf.read_u64()?;
        let position = Vec3::new(buf.read_f64()?, buf.read_f64()?, buf.read_f64()?);
        let mut blocks = [[0f32; 3]; 5];
        for block in blocks.iter_mut() {
            for v in block.iter_mut() {
                *v = buf.read_f32()?;
            }
        }
        Ok(Self {
            model,
            time,
            lag,
            position,
            orientation: blocks[0],
            linear_vel: blocks[1],
            angular_vel: blocks[2],
            linear_accel: blocks[3],
            angular_accel: blocks[4],
        })
    }
}

/// The advertised radar range, decoded from the raw header field.
///
/// Current clients put the range in nautical miles into the high 16
/// bits and leave the low 16 bits zero. Old servers overwrite the
/// field and old clients never set it, so anything with a non-zero
/// low half or a zero high half means "no usable value". The split is
/// inherently ambiguous for a deliberate zero; it is kept bit-for-bit
/// for wire compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadarRange {
    /// No usable value; the configured fallback applies.
    Legacy,
    /// The advertised range in nautical miles, not yet clamped.
    Advertised(u16),
}

impl RadarRange {
    pub fn from_wire(raw: u32) -> Self {
        let high = (raw >> 16) as u16;
        let low = (raw & 0xffff) as u16;
        if low != 0 || high == 0 {
            RadarRange::Legacy
        } else {
            RadarRange::Advertised(high)
        }
    }
}

/// Patch the magic of an already-encoded packet in place.
///
/// Fan-out never re-encodes a packet; the bytes are forwarded as
/// received with only the leading magic rewritten.
pub fn patch_magic(packet: &mut [u8], magic: u32) {
    if packet.len() >= 4 {
        packet[..4].copy_from_slice(&magic.to_be_bytes());
    }
}

/// Patch the message id of an already-encoded packet in place.
/// Used to turn a PING around into a PONG.
pub fn patch_msg_id(packet: &mut [u8], id: MsgId) {
    if packet.len() >= 12 {
        packet[8..12].copy_from_slice(&u32::from(id).to_be_bytes());
    }
}

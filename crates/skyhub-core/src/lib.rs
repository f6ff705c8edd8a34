//! skyhub-core — wire format, packet codec, address model, geometry
//! and configuration. All other skyhub crates depend on this one.

pub mod addr;
pub mod codec;
pub mod config;
pub mod geom;
pub mod wire;

pub use addr::{AddrError, AddrFamily, NetAddress};
pub use codec::{CodecError, Encoding, PacketBuf};
pub use wire::{MsgHeader, MsgId, PositionData};

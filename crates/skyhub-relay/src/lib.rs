//! skyhub-relay — the position relay engine.
//!
//! Pure packet-in, packets-out logic: session tracking, admission
//! control and fan-out. No sockets live here; the daemon hands every
//! received datagram to [`engine::Hub::handle_packet`] together with a
//! [`engine::PacketSink`] that does the actual sending. Time is passed
//! in as unix seconds, so the whole engine is testable without a
//! clock or a network.

pub mod engine;
pub mod entry;
pub mod registry;
pub mod stats;

pub use engine::{Hub, HubParams, PacketSink, VecSink};
pub use entry::{AtcRole, EntryRecord, Recorded, Session};
pub use registry::Registry;
pub use stats::HubStats;

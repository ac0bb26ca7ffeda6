//! Protocol engine for the IMS real-time media stack: RTP/RTCP packet
//! codecs, the RTP session state machine, the jitter-network analyser, and
//! the supporting bit-I/O, time, queue and socket primitives they're built
//! from. No device or codec-specific media processing lives here; see
//! `ims-media-core` for that.

pub mod analyser;
pub mod bitio;
pub mod error;
pub mod packet;
pub mod queue;
pub mod session;
pub mod socket;
pub mod stats;
pub mod time;

pub use error::{Error, Result};

/// Synchronization source identifier (RFC 3550 §3).
pub type RtpSsrc = u32;

/// RTP sequence number; wraps modulo 2^16.
pub type RtpSequenceNumber = u16;

/// RTP media timestamp; wraps modulo 2^32.
pub type RtpTimestamp = u32;

/// Default MTU-driven ceiling for a single UDP datagram carrying RTP/RTCP,
/// chosen to stay clear of IPv4/IPv6 fragmentation on typical access links.
pub const DEFAULT_MAX_PACKET_SIZE: usize = 1500;

//! Wire-format codecs for RTP and RTCP packets.

pub mod rtcp;
pub mod rtp;

pub use rtp::{RtpExtension, RtpHeader, RtpPacket};

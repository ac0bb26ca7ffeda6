use bytes::{Buf, BufMut};

use crate::error::Error;
use crate::Result;

/// RTCP packet type field (RFC 3550 §6.1, RFC 4585 §6.1, RFC 5104, RFC 3611).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtcpPacketType {
    SenderReport,
    ReceiverReport,
    SourceDescription,
    Goodbye,
    ApplicationDefined,
    /// RTPFB (205): generic NACK, TMMBR, TMMBN (RFC 4585, RFC 5104).
    TransportFeedback,
    /// PSFB (206): PLI, FIR, SLI (RFC 4585, RFC 5104).
    PayloadFeedback,
    /// XR (207): extended report blocks (RFC 3611).
    ExtendedReport,
}

impl RtcpPacketType {
    pub fn to_u8(self) -> u8 {
        match self {
            Self::SenderReport => 200,
            Self::ReceiverReport => 201,
            Self::SourceDescription => 202,
            Self::Goodbye => 203,
            Self::ApplicationDefined => 204,
            Self::TransportFeedback => 205,
            Self::PayloadFeedback => 206,
            Self::ExtendedReport => 207,
        }
    }

    /// `None` for any PT this crate doesn't implement (a future RFC, a
    /// vendor extension): the caller skips over it by length rather than
    /// treating it as a parse error (spec §4.6: unknown PTs in a compound
    /// packet are skipped, not fatal).
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            200 => Self::SenderReport,
            201 => Self::ReceiverReport,
            202 => Self::SourceDescription,
            203 => Self::Goodbye,
            204 => Self::ApplicationDefined,
            205 => Self::TransportFeedback,
            206 => Self::PayloadFeedback,
            207 => Self::ExtendedReport,
            _ => return None,
        })
    }
}

/// The 4-byte common RTCP header shared by every packet type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtcpHeader {
    pub version: u8,
    pub padding: bool,
    /// Reception report count, subtype or FMT, depending on packet type.
    pub count: u8,
    packet_type_raw: u8,
    /// Packet length in 32-bit words, minus one, per RFC 3550 §6.1 — i.e.
    /// `(payload_bytes / 4) - 1` where payload_bytes includes any padding.
    pub length_words: u16,
}

pub const RTCP_VERSION: u8 = 2;
pub const HEADER_SIZE: usize = 4;

impl RtcpHeader {
    pub fn new(packet_type: RtcpPacketType, count: u8, length_words: u16) -> Self {
        Self { version: RTCP_VERSION, padding: false, count, packet_type_raw: packet_type.to_u8(), length_words }
    }

    /// `None` when the wire byte isn't one of the PTs this crate decodes.
    /// The header itself (count, length) is still valid and parsed.
    pub fn packet_type(&self) -> Option<RtcpPacketType> {
        RtcpPacketType::from_u8(self.packet_type_raw)
    }

    pub fn packet_type_raw(&self) -> u8 {
        self.packet_type_raw
    }

    /// Total packet size in bytes implied by the header, including itself.
    pub fn packet_size(&self) -> usize {
        (self.length_words as usize + 1) * 4
    }

    pub fn parse(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < HEADER_SIZE {
            return Err(Error::BufferTooSmall { required: HEADER_SIZE, available: buf.remaining() });
        }
        let b0 = buf.get_u8();
        let version = b0 >> 6;
        if version != RTCP_VERSION {
            return Err(Error::rtcp(format!("unsupported RTCP version {version}")));
        }
        let padding = (b0 & 0x20) != 0;
        let count = b0 & 0x1F;
        let packet_type_raw = buf.get_u8();
        let length_words = buf.get_u16();
        Ok(Self { version, padding, count, packet_type_raw, length_words })
    }

    pub fn serialize(&self, buf: &mut impl BufMut) {
        let b0 = (self.version << 6) | ((self.padding as u8) << 5) | (self.count & 0x1F);
        buf.put_u8(b0);
        buf.put_u8(self.packet_type_raw);
        buf.put_u16(self.length_words);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn roundtrip() {
        let header = RtcpHeader::new(RtcpPacketType::ReceiverReport, 1, 7);
        let mut buf = BytesMut::new();
        header.serialize(&mut buf);
        let parsed = RtcpHeader::parse(&mut buf.freeze()).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.packet_size(), 32);
    }

    #[test]
    fn unknown_type_parses_with_no_resolved_packet_type() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0x80, 0x99, 0x00, 0x01]);
        let header = RtcpHeader::parse(&mut buf.freeze()).unwrap();
        assert_eq!(header.packet_type_raw(), 0x99);
        assert!(header.packet_type().is_none());
        assert_eq!(header.packet_size(), 8);
    }
}

//! RTCP packet codecs (RFC 3550 §6, RFC 3611, RFC 4585, RFC 5104) and
//! MTU-aware compound-packet assembly.

pub mod app;
pub mod bye;
pub mod feedback;
pub mod header;
pub mod ntp;
pub mod receiver_report;
pub mod report_block;
pub mod sdes;
pub mod sender_report;
pub mod xr;

pub use app::RtcpApplicationDefined;
pub use bye::RtcpGoodbye;
pub use feedback::RtcpFeedback;
pub use header::{RtcpHeader, RtcpPacketType, HEADER_SIZE};
pub use ntp::NtpTimestamp;
pub use receiver_report::RtcpReceiverReport;
pub use report_block::RtcpReportBlock;
pub use sdes::RtcpSourceDescription;
pub use sender_report::RtcpSenderReport;
pub use xr::RtcpExtendedReport;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::Error;
use crate::Result;

/// A single decoded RTCP packet, tagged by type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtcpPacket {
    SenderReport(RtcpSenderReport),
    ReceiverReport(RtcpReceiverReport),
    SourceDescription(RtcpSourceDescription),
    Goodbye(RtcpGoodbye),
    ApplicationDefined(RtcpApplicationDefined),
    TransportFeedback(RtcpFeedback),
    PayloadFeedback(RtcpFeedback),
    ExtendedReport(RtcpExtendedReport),
}

impl RtcpPacket {
    fn body_size(&self) -> usize {
        match self {
            Self::SenderReport(p) => p.size(),
            Self::ReceiverReport(p) => p.size(),
            Self::SourceDescription(p) => p.size(),
            Self::Goodbye(p) => p.size(),
            Self::ApplicationDefined(p) => p.size(),
            Self::TransportFeedback(p) | Self::PayloadFeedback(p) => p.size(),
            Self::ExtendedReport(p) => p.size(),
        }
    }

    fn count_or_fmt(&self) -> u8 {
        match self {
            Self::SenderReport(p) => p.report_blocks.len() as u8,
            Self::ReceiverReport(p) => p.report_blocks.len() as u8,
            Self::SourceDescription(p) => p.chunks.len() as u8,
            Self::Goodbye(p) => p.sources.len() as u8,
            Self::ApplicationDefined(_) => 0,
            Self::TransportFeedback(p) | Self::PayloadFeedback(p) => p.fmt(),
            Self::ExtendedReport(_) => 0,
        }
    }

    fn packet_type(&self) -> RtcpPacketType {
        match self {
            Self::SenderReport(_) => RtcpPacketType::SenderReport,
            Self::ReceiverReport(_) => RtcpPacketType::ReceiverReport,
            Self::SourceDescription(_) => RtcpPacketType::SourceDescription,
            Self::Goodbye(_) => RtcpPacketType::Goodbye,
            Self::ApplicationDefined(_) => RtcpPacketType::ApplicationDefined,
            Self::TransportFeedback(_) => RtcpPacketType::TransportFeedback,
            Self::PayloadFeedback(_) => RtcpPacketType::PayloadFeedback,
            Self::ExtendedReport(_) => RtcpPacketType::ExtendedReport,
        }
    }

    /// Total size in bytes including the 4-byte common header, rounded up
    /// to a 32-bit word boundary.
    pub fn size(&self) -> usize {
        let raw = HEADER_SIZE + self.body_size();
        raw + ((4 - (raw % 4)) % 4)
    }

    fn serialize_body(&self, buf: &mut BytesMut) -> Result<()> {
        match self {
            Self::SenderReport(p) => {
                let body = p.serialize()?;
                buf.put_slice(&body);
            }
            Self::ReceiverReport(p) => {
                let body = p.serialize()?;
                buf.put_slice(&body);
            }
            Self::SourceDescription(p) => {
                let body = p.serialize()?;
                buf.put_slice(&body);
            }
            Self::Goodbye(p) => {
                let body = p.serialize()?;
                buf.put_slice(&body);
            }
            Self::ApplicationDefined(p) => {
                let body = p.serialize()?;
                buf.put_slice(&body);
            }
            Self::TransportFeedback(p) | Self::PayloadFeedback(p) => {
                let body = p.serialize()?;
                buf.put_slice(&body);
            }
            Self::ExtendedReport(p) => {
                let body = p.serialize()?;
                buf.put_slice(&body);
            }
        }
        Ok(())
    }

    pub fn serialize(&self) -> Result<BytesMut> {
        let body_size = self.body_size();
        let padded_body = body_size + ((4 - (body_size % 4)) % 4);
        let length_words = ((HEADER_SIZE + padded_body) / 4) - 1;
        if length_words > u16::MAX as usize {
            return Err(Error::invalid_parameter("RTCP packet too large for 16-bit length field"));
        }

        let mut buf = BytesMut::with_capacity(self.size());
        let header = RtcpHeader::new(self.packet_type(), self.count_or_fmt(), length_words as u16);
        header.serialize(&mut buf);

        let before = buf.len();
        self.serialize_body(&mut buf)?;
        let written = buf.len() - before;
        for _ in 0..(padded_body - written) {
            buf.put_u8(0);
        }
        Ok(buf)
    }

    /// Parses the next packet, or `Ok(None)` when its type isn't one this
    /// crate decodes — the caller still advances past it by
    /// `header.packet_size()` (spec §4.6: unknown PTs are skipped, not
    /// fatal, so later packets in the same compound datagram still parse).
    fn parse_one(buf: &mut impl Buf) -> Result<Option<Self>> {
        let header = RtcpHeader::parse(buf)?;
        let body_len = header.packet_size() - HEADER_SIZE;
        if buf.remaining() < body_len {
            return Err(Error::BufferTooSmall { required: body_len, available: buf.remaining() });
        }
        let body_bytes: Bytes = buf.copy_to_bytes(body_len);
        let mut body = body_bytes.as_ref();

        let Some(packet_type) = header.packet_type() else {
            return Ok(None);
        };

        let packet = match packet_type {
            RtcpPacketType::SenderReport => {
                Self::SenderReport(sender_report::parse_sender_report(&mut body, header.count)?)
            }
            RtcpPacketType::ReceiverReport => {
                Self::ReceiverReport(receiver_report::parse_receiver_report(&mut body, header.count)?)
            }
            RtcpPacketType::SourceDescription => {
                Self::SourceDescription(sdes::parse_sdes(&mut body, header.count)?)
            }
            RtcpPacketType::Goodbye => Self::Goodbye(bye::parse_bye(&mut body, header.count)?),
            RtcpPacketType::ApplicationDefined => Self::ApplicationDefined(app::parse_app(&mut body)?),
            RtcpPacketType::TransportFeedback => {
                Self::TransportFeedback(RtcpFeedback::parse_transport(header.count, &mut body)?)
            }
            RtcpPacketType::PayloadFeedback => {
                Self::PayloadFeedback(RtcpFeedback::parse_payload(header.count, &mut body)?)
            }
            RtcpPacketType::ExtendedReport => Self::ExtendedReport(xr::parse_xr(&mut body)?),
        };
        Ok(Some(packet))
    }
}

/// Parses every RTCP packet in a compound datagram (RFC 3550 §6.1 requires
/// at least one SR/RR, but we don't enforce ordering here — the session
/// layer validates that). Packets with an unrecognised type are skipped by
/// length rather than aborting the rest of the datagram.
pub fn parse_compound(data: &[u8]) -> Result<Vec<RtcpPacket>> {
    let mut buf = data;
    let mut packets = Vec::new();
    while buf.remaining() >= HEADER_SIZE {
        if let Some(packet) = RtcpPacket::parse_one(&mut buf)? {
            packets.push(packet);
        }
    }
    if buf.has_remaining() {
        return Err(Error::rtcp("trailing bytes after last RTCP packet in compound datagram"));
    }
    Ok(packets)
}

/// Packs `packets` into as few compound datagrams as possible while keeping
/// each datagram at or under `mtu` bytes. A single packet larger than `mtu`
/// still goes out alone (RTCP has no packet-level fragmentation).
pub fn serialize_compound(packets: &[RtcpPacket], mtu: usize) -> Result<Vec<BytesMut>> {
    let mut datagrams = Vec::new();
    let mut current = BytesMut::new();

    for packet in packets {
        let serialized = packet.serialize()?;
        if !current.is_empty() && current.len() + serialized.len() > mtu {
            datagrams.push(std::mem::take(&mut current));
        }
        current.extend_from_slice(&serialized);
    }
    if !current.is_empty() {
        datagrams.push(current);
    }
    Ok(datagrams)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compound_packet_roundtrip() {
        let sr = RtcpPacket::SenderReport(RtcpSenderReport::new(0x1111_1111));
        let bye = RtcpPacket::Goodbye(RtcpGoodbye::new_for_source(0x1111_1111));

        let mut combined = BytesMut::new();
        combined.extend_from_slice(&sr.serialize().unwrap());
        combined.extend_from_slice(&bye.serialize().unwrap());

        let parsed = parse_compound(&combined).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0], sr);
        assert_eq!(parsed[1], bye);
    }

    #[test]
    fn unknown_packet_type_is_skipped_not_fatal() {
        let sr = RtcpPacket::SenderReport(RtcpSenderReport::new(0x1111_1111));
        let bye = RtcpPacket::Goodbye(RtcpGoodbye::new_for_source(0x2222_2222));

        // A well-formed header for a PT this crate doesn't decode (208),
        // carrying one 32-bit word of body, sandwiched between two valid
        // packets.
        let mut unknown = BytesMut::new();
        RtcpHeader::new(RtcpPacketType::ExtendedReport, 0, 1).serialize(&mut unknown);
        unknown[1] = 208;
        unknown.extend_from_slice(&[0u8; 4]);

        let mut combined = BytesMut::new();
        combined.extend_from_slice(&sr.serialize().unwrap());
        combined.extend_from_slice(&unknown);
        combined.extend_from_slice(&bye.serialize().unwrap());

        let parsed = parse_compound(&combined).unwrap();
        assert_eq!(parsed, vec![sr, bye]);
    }

    #[test]
    fn rejects_trailing_garbage() {
        let sr = RtcpPacket::SenderReport(RtcpSenderReport::new(1));
        let mut combined = sr.serialize().unwrap();
        combined.put_u8(0xFF);
        assert!(parse_compound(&combined).is_err());
    }

    #[test]
    fn mtu_aware_packing_splits_across_datagrams() {
        let packets: Vec<RtcpPacket> = (0..50)
            .map(|i| RtcpPacket::Goodbye(RtcpGoodbye::new_for_source(i)))
            .collect();
        let datagrams = serialize_compound(&packets, 200).unwrap();
        assert!(datagrams.len() > 1);
        for dg in &datagrams {
            assert!(dg.len() <= 200 || datagrams.len() == 1);
        }

        // every packet still recoverable by re-parsing each datagram
        let mut total = 0;
        for dg in &datagrams {
            total += parse_compound(dg).unwrap().len();
        }
        assert_eq!(total, packets.len());
    }
}

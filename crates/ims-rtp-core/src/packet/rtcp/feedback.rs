//! Transport-layer (RTPFB) and payload-specific (PSFB) feedback messages:
//! generic NACK (RFC 4585 §6.2.1), PLI (RFC 4585 §6.3.1), FIR and
//! TMMBR/TMMBN (RFC 5104 §4.2, §4.3).

use bytes::{Buf, BufMut, BytesMut};

use crate::error::Error;
use crate::{Result, RtpSsrc};

const COMMON_FB_HEADER_SIZE: usize = 8;

/// The 8-byte header shared by every RTPFB/PSFB packet: sender and media
/// source SSRCs, sitting after the common 4-byte RTCP header whose `count`
/// field carries the FMT value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackCommonHeader {
    pub sender_ssrc: RtpSsrc,
    pub media_ssrc: RtpSsrc,
}

impl FeedbackCommonHeader {
    fn parse(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < COMMON_FB_HEADER_SIZE {
            return Err(Error::BufferTooSmall {
                required: COMMON_FB_HEADER_SIZE,
                available: buf.remaining(),
            });
        }
        Ok(Self { sender_ssrc: buf.get_u32(), media_ssrc: buf.get_u32() })
    }

    fn serialize(&self, buf: &mut BytesMut) {
        buf.put_u32(self.sender_ssrc);
        buf.put_u32(self.media_ssrc);
    }
}

/// One blocked-packet run in a generic NACK FCI entry: `pid` is the first
/// lost sequence number, `bitmask` marks up to 16 further losses following
/// it (bit *i* set means `pid + i + 1` was also lost).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NackEntry {
    pub pid: u16,
    pub bitmask: u16,
}

impl NackEntry {
    /// Returns every sequence number this entry marks as lost.
    pub fn lost_sequence_numbers(&self) -> Vec<u16> {
        let mut out = vec![self.pid];
        for bit in 0..16 {
            if self.bitmask & (1 << bit) != 0 {
                out.push(self.pid.wrapping_add(bit + 1));
            }
        }
        out
    }
}

/// An SSRC's requested temporary maximum media bitrate (RFC 5104 §4.2),
/// carried by both TMMBR requests and TMMBN notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TmmbItem {
    pub ssrc: RtpSsrc,
    pub bitrate_bps: u64,
    pub overhead: u16,
}

impl TmmbItem {
    fn parse(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < 8 {
            return Err(Error::BufferTooSmall { required: 8, available: buf.remaining() });
        }
        let ssrc = buf.get_u32();
        let word = buf.get_u32();
        let exponent = (word >> 26) & 0x3F;
        let mantissa = (word >> 9) & 0x1FFFF;
        let overhead = (word & 0x1FF) as u16;
        let bitrate_bps = (mantissa as u64) << exponent;
        Ok(Self { ssrc, bitrate_bps, overhead })
    }

    fn serialize(&self, buf: &mut BytesMut) -> Result<()> {
        // Pick the smallest exponent that fits the mantissa in 17 bits.
        let mut exponent: u32 = 0;
        let mut mantissa = self.bitrate_bps;
        while mantissa > 0x1FFFF && exponent < 63 {
            mantissa >>= 1;
            exponent += 1;
        }
        if mantissa > 0x1FFFF {
            return Err(Error::invalid_parameter("TMMB bitrate too large to encode"));
        }
        let word = (exponent << 26) | ((mantissa as u32) << 9) | (self.overhead as u32 & 0x1FF);
        buf.put_u32(self.ssrc);
        buf.put_u32(word);
        Ok(())
    }
}

/// A decoded RTPFB or PSFB message body (the common header has already been
/// split out of the caller's compound-packet walk).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtcpFeedback {
    /// RTPFB FMT 1.
    GenericNack { header: FeedbackCommonHeader, entries: Vec<NackEntry> },
    /// PSFB FMT 1, no feedback control information.
    PictureLossIndication { header: FeedbackCommonHeader },
    /// PSFB FMT 4: one SSRC + sequence number per requesting source.
    FullIntraRequest { header: FeedbackCommonHeader, requests: Vec<(RtpSsrc, u8)> },
    /// RTPFB FMT 3.
    Tmmbr { header: FeedbackCommonHeader, items: Vec<TmmbItem> },
    /// RTPFB FMT 4.
    Tmmbn { header: FeedbackCommonHeader, items: Vec<TmmbItem> },
}

impl RtcpFeedback {
    pub fn header(&self) -> FeedbackCommonHeader {
        match self {
            Self::GenericNack { header, .. }
            | Self::PictureLossIndication { header }
            | Self::FullIntraRequest { header, .. }
            | Self::Tmmbr { header, .. }
            | Self::Tmmbn { header, .. } => *header,
        }
    }

    /// Parses an RTPFB (transport-layer feedback) body given its FMT value.
    pub fn parse_transport(fmt: u8, buf: &mut impl Buf) -> Result<Self> {
        let header = FeedbackCommonHeader::parse(buf)?;
        match fmt {
            1 => {
                let mut entries = Vec::new();
                while buf.remaining() >= 4 {
                    entries.push(NackEntry { pid: buf.get_u16(), bitmask: buf.get_u16() });
                }
                Ok(Self::GenericNack { header, entries })
            }
            3 => {
                let mut items = Vec::new();
                while buf.remaining() >= 8 {
                    items.push(TmmbItem::parse(buf)?);
                }
                Ok(Self::Tmmbr { header, items })
            }
            4 => {
                let mut items = Vec::new();
                while buf.remaining() >= 8 {
                    items.push(TmmbItem::parse(buf)?);
                }
                Ok(Self::Tmmbn { header, items })
            }
            other => Err(Error::rtcp(format!("unsupported RTPFB FMT {other}"))),
        }
    }

    /// Parses a PSFB (payload-specific feedback) body given its FMT value.
    pub fn parse_payload(fmt: u8, buf: &mut impl Buf) -> Result<Self> {
        let header = FeedbackCommonHeader::parse(buf)?;
        match fmt {
            1 => Ok(Self::PictureLossIndication { header }),
            4 => {
                let mut requests = Vec::new();
                while buf.remaining() >= 4 {
                    let ssrc = buf.get_u32();
                    let seq = buf.get_u8();
                    buf.advance(3); // reserved
                    requests.push((ssrc, seq));
                }
                Ok(Self::FullIntraRequest { header, requests })
            }
            other => Err(Error::rtcp(format!("unsupported PSFB FMT {other}"))),
        }
    }

    /// FMT value to place in the common RTCP header's `count` field.
    pub fn fmt(&self) -> u8 {
        match self {
            Self::GenericNack { .. } => 1,
            Self::PictureLossIndication { .. } => 1,
            Self::FullIntraRequest { .. } => 4,
            Self::Tmmbr { .. } => 3,
            Self::Tmmbn { .. } => 4,
        }
    }

    pub fn size(&self) -> usize {
        COMMON_FB_HEADER_SIZE
            + match self {
                Self::GenericNack { entries, .. } => entries.len() * 4,
                Self::PictureLossIndication { .. } => 0,
                Self::FullIntraRequest { requests, .. } => requests.len() * 4,
                Self::Tmmbr { items, .. } | Self::Tmmbn { items, .. } => items.len() * 8,
            }
    }

    pub fn serialize(&self) -> Result<BytesMut> {
        let mut buf = BytesMut::with_capacity(self.size());
        self.header().serialize(&mut buf);
        match self {
            Self::GenericNack { entries, .. } => {
                for e in entries {
                    buf.put_u16(e.pid);
                    buf.put_u16(e.bitmask);
                }
            }
            Self::PictureLossIndication { .. } => {}
            Self::FullIntraRequest { requests, .. } => {
                for (ssrc, seq) in requests {
                    buf.put_u32(*ssrc);
                    buf.put_u8(*seq);
                    buf.put_u8(0);
                    buf.put_u16(0);
                }
            }
            Self::Tmmbr { items, .. } | Self::Tmmbn { items, .. } => {
                for item in items {
                    item.serialize(&mut buf)?;
                }
            }
        }
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> FeedbackCommonHeader {
        FeedbackCommonHeader { sender_ssrc: 0x1000_0001, media_ssrc: 0x2000_0002 }
    }

    #[test]
    fn encodes_literal_generic_nack_vector() {
        let fb = RtcpFeedback::GenericNack {
            header: FeedbackCommonHeader { sender_ssrc: 0x01020304, media_ssrc: 0xaaaaaaaa },
            entries: vec![NackEntry { pid: 0xe65f, bitmask: 0xa531 }],
        };
        let packet = crate::packet::rtcp::RtcpPacket::TransportFeedback(fb);

        let serialized = packet.serialize().unwrap();
        let expected: [u8; 16] = [
            0x81, 0xcd, 0x00, 0x03, 0x01, 0x02, 0x03, 0x04, 0xaa, 0xaa, 0xaa, 0xaa, 0xe6, 0x5f,
            0xa5, 0x31,
        ];
        assert_eq!(&serialized[..], &expected[..]);
    }

    #[test]
    fn nack_roundtrip_and_bitmask_expansion() {
        let fb = RtcpFeedback::GenericNack {
            header: header(),
            entries: vec![NackEntry { pid: 100, bitmask: 0b101 }],
        };
        let serialized = fb.serialize().unwrap();
        let parsed = RtcpFeedback::parse_transport(1, &mut serialized.freeze()).unwrap();
        assert_eq!(parsed, fb);

        if let RtcpFeedback::GenericNack { entries, .. } = &fb {
            assert_eq!(entries[0].lost_sequence_numbers(), vec![100, 101, 103]);
        }
    }

    #[test]
    fn pli_has_no_fci() {
        let fb = RtcpFeedback::PictureLossIndication { header: header() };
        let serialized = fb.serialize().unwrap();
        assert_eq!(serialized.len(), COMMON_FB_HEADER_SIZE);
        let parsed = RtcpFeedback::parse_payload(1, &mut serialized.freeze()).unwrap();
        assert_eq!(parsed, fb);
    }

    #[test]
    fn fir_roundtrip() {
        let fb = RtcpFeedback::FullIntraRequest {
            header: header(),
            requests: vec![(0x3333_3333, 5)],
        };
        let serialized = fb.serialize().unwrap();
        let parsed = RtcpFeedback::parse_payload(4, &mut serialized.freeze()).unwrap();
        assert_eq!(parsed, fb);
    }

    #[test]
    fn tmmbr_bitrate_roundtrips_through_exponent_mantissa() {
        let fb = RtcpFeedback::Tmmbr {
            header: header(),
            items: vec![TmmbItem { ssrc: 0x4444_4444, bitrate_bps: 640_000, overhead: 40 }],
        };
        let serialized = fb.serialize().unwrap();
        let parsed = RtcpFeedback::parse_transport(3, &mut serialized.freeze()).unwrap();
        if let RtcpFeedback::Tmmbr { items, .. } = parsed {
            assert_eq!(items[0].ssrc, 0x4444_4444);
            assert_eq!(items[0].bitrate_bps, 640_000);
            assert_eq!(items[0].overhead, 40);
        } else {
            panic!("expected Tmmbr");
        }
    }
}

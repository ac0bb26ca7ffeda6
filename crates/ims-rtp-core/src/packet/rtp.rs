//! RTP packet header, extension and payload codec (RFC 3550 §5).

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::Error;
use crate::{Result, RtpSequenceNumber, RtpSsrc, RtpTimestamp};

pub const RTP_VERSION: u8 = 2;
const FIXED_HEADER_SIZE: usize = 12;

/// One-byte (RFC 5285 §4.2) or two-byte (§4.3) header extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpExtension {
    pub profile: u16,
    pub data: Bytes,
}

/// RTP header fields (RFC 3550 §5.1), CSRC list and optional extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpHeader {
    pub version: u8,
    pub padding: bool,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: RtpSequenceNumber,
    pub timestamp: RtpTimestamp,
    pub ssrc: RtpSsrc,
    pub csrc: Vec<RtpSsrc>,
    pub extension: Option<RtpExtension>,
}

impl RtpHeader {
    pub fn new(payload_type: u8, sequence_number: RtpSequenceNumber, timestamp: RtpTimestamp, ssrc: RtpSsrc) -> Self {
        Self {
            version: RTP_VERSION,
            padding: false,
            marker: false,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrc: Vec::new(),
            extension: None,
        }
    }

    fn header_len(&self) -> usize {
        let mut len = FIXED_HEADER_SIZE + self.csrc.len() * 4;
        if let Some(ext) = &self.extension {
            // extension is padded to a whole number of 32-bit words
            let words = (ext.data.len() + 3) / 4;
            len += 4 + words * 4;
        }
        len
    }
}

/// A fully decoded RTP packet: header plus payload, with any trailing
/// padding bytes already stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    pub header: RtpHeader,
    pub payload: Bytes,
}

impl RtpPacket {
    pub fn new(header: RtpHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    pub fn size(&self) -> usize {
        self.header.header_len() + self.payload.len()
    }

    /// Parses a complete RTP packet out of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < FIXED_HEADER_SIZE {
            return Err(Error::BufferTooSmall { required: FIXED_HEADER_SIZE, available: data.len() });
        }
        let mut buf = data;

        let b0 = buf.get_u8();
        let version = b0 >> 6;
        if version != RTP_VERSION {
            return Err(Error::rtp_decode(format!("unsupported RTP version {version}")));
        }
        let padding_flag = (b0 & 0x20) != 0;
        let extension_flag = (b0 & 0x10) != 0;
        let cc = b0 & 0x0F;

        let b1 = buf.get_u8();
        let marker = (b1 & 0x80) != 0;
        let payload_type = b1 & 0x7F;

        if buf.remaining() < 8 + cc as usize * 4 {
            return Err(Error::BufferTooSmall {
                required: 8 + cc as usize * 4,
                available: buf.remaining(),
            });
        }
        let sequence_number = buf.get_u16();
        let timestamp = buf.get_u32();
        let ssrc = buf.get_u32();

        let mut csrc = Vec::with_capacity(cc as usize);
        for _ in 0..cc {
            csrc.push(buf.get_u32());
        }

        let extension = if extension_flag {
            if buf.remaining() < 4 {
                return Err(Error::BufferTooSmall { required: 4, available: buf.remaining() });
            }
            let profile = buf.get_u16();
            let words = buf.get_u16() as usize;
            let ext_len = words * 4;
            if buf.remaining() < ext_len {
                return Err(Error::BufferTooSmall { required: ext_len, available: buf.remaining() });
            }
            let data = Bytes::copy_from_slice(&buf[..ext_len]);
            buf.advance(ext_len);
            Some(RtpExtension { profile, data })
        } else {
            None
        };

        let mut payload_len = buf.remaining();
        if padding_flag {
            if payload_len == 0 {
                return Err(Error::rtp_decode("padding bit set but no payload bytes present"));
            }
            let pad_count = buf[payload_len - 1] as usize;
            if pad_count == 0 || pad_count > payload_len {
                return Err(Error::rtp_decode(format!(
                    "invalid padding count {pad_count} for payload of {payload_len} bytes"
                )));
            }
            payload_len -= pad_count;
        }
        let payload = Bytes::copy_from_slice(&buf[..payload_len]);

        Ok(RtpPacket {
            header: RtpHeader {
                version,
                padding: padding_flag,
                marker,
                payload_type,
                sequence_number,
                timestamp,
                ssrc,
                csrc,
                extension,
            },
            payload,
        })
    }

    /// Serializes the packet. `pad_to_multiple_of`, if non-zero, adds RTP
    /// padding so the total packet length is a multiple of that many bytes
    /// (used for SRTP block alignment by upstream callers; irrelevant here
    /// without SRTP but kept because callers still pack over fixed MTUs).
    pub fn serialize(&self, pad_to_multiple_of: usize) -> Result<BytesMut> {
        let h = &self.header;
        let mut buf = BytesMut::with_capacity(self.size() + 4);

        let b0 = (h.version << 6)
            | ((h.padding as u8) << 5)
            | ((h.extension.is_some() as u8) << 4)
            | (h.csrc.len() as u8 & 0x0F);
        buf.put_u8(b0);

        let b1 = ((h.marker as u8) << 7) | (h.payload_type & 0x7F);
        buf.put_u8(b1);

        buf.put_u16(h.sequence_number);
        buf.put_u32(h.timestamp);
        buf.put_u32(h.ssrc);
        for csrc in &h.csrc {
            buf.put_u32(*csrc);
        }

        if let Some(ext) = &h.extension {
            buf.put_u16(ext.profile);
            let words = (ext.data.len() + 3) / 4;
            buf.put_u16(words as u16);
            buf.put_slice(&ext.data);
            for _ in 0..(words * 4 - ext.data.len()) {
                buf.put_u8(0);
            }
        }

        buf.put_slice(&self.payload);

        if pad_to_multiple_of > 1 {
            let current = buf.len();
            let remainder = current % pad_to_multiple_of;
            if remainder != 0 {
                let pad_count = pad_to_multiple_of - remainder;
                if pad_count > 255 {
                    return Err(Error::invalid_parameter(
                        "padding required exceeds the 255-byte RTP padding count field",
                    ));
                }
                for _ in 0..pad_count - 1 {
                    buf.put_u8(0);
                }
                buf.put_u8(pad_count as u8);
            }
        }

        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The 36-byte vector from the literal RTP decode test: PT=8 (PCMA),
    /// seq=0x1234, ts=0xAABBCCDD, ssrc=0x11223344, 16 bytes of payload.
    const RTP_VECTOR: [u8; 28] = [
        0x80, 0x08, 0x12, 0x34, 0xAA, 0xBB, 0xCC, 0xDD, 0x11, 0x22, 0x33, 0x44, 0x01, 0x02, 0x03,
        0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F, 0x10,
    ];

    #[test]
    fn parse_basic_fixed_header_packet() {
        let packet = RtpPacket::parse(&RTP_VECTOR).unwrap();
        assert_eq!(packet.header.version, 2);
        assert!(!packet.header.padding);
        assert!(!packet.header.marker);
        assert_eq!(packet.header.payload_type, 8);
        assert_eq!(packet.header.sequence_number, 0x1234);
        assert_eq!(packet.header.timestamp, 0xAABBCCDD);
        assert_eq!(packet.header.ssrc, 0x11223344);
        assert!(packet.header.csrc.is_empty());
        assert!(packet.header.extension.is_none());
        assert_eq!(packet.payload.len(), 16);
    }

    #[test]
    fn decodes_literal_vector_with_one_byte_header_extension() {
        let data: [u8; 36] = [
            0x90, 0xe3, 0xa5, 0x83, 0x00, 0x00, 0xe1, 0xc8, 0x92, 0x7d, 0xcd, 0x02, 0xbe, 0xde,
            0x00, 0x01, 0x41, 0x78, 0x42, 0x00, 0x67, 0x42, 0xc0, 0x0c, 0xda, 0x0f, 0x0a, 0x69,
            0xa8, 0x10, 0x10, 0x10, 0x3c, 0x58, 0xba, 0x80,
        ];
        let packet = RtpPacket::parse(&data).unwrap();

        assert_eq!(packet.header.version, 2);
        assert!(!packet.header.padding);
        assert!(packet.header.marker);
        assert!(packet.header.csrc.is_empty());
        assert_eq!(packet.header.payload_type, 99);
        assert_eq!(packet.header.sequence_number, 0xa583);
        assert_eq!(packet.header.timestamp, 0x0000e1c8);
        assert_eq!(packet.header.ssrc, 0x927dcd02);

        let ext = packet.header.extension.as_ref().unwrap();
        assert_eq!(ext.profile, 0xbede);
        assert_eq!(&ext.data[..], &[0x41, 0x78, 0x42, 0x00]);

        assert_eq!(
            &packet.payload[..],
            &[
                0x67, 0x42, 0xc0, 0x0c, 0xda, 0x0f, 0x0a, 0x69, 0xa8, 0x10, 0x10, 0x10, 0x3c,
                0x58, 0xba, 0x80,
            ]
        );
    }

    #[test]
    fn serialize_parse_roundtrip_with_extension_and_csrc() {
        let mut header = RtpHeader::new(96, 1000, 160000, 0xDEADBEEF);
        header.marker = true;
        header.csrc = vec![0x1111_1111, 0x2222_2222];
        header.extension = Some(RtpExtension {
            profile: 0xBEDE,
            data: Bytes::from_static(&[0x30, 0x01, 0x02]),
        });
        let packet = RtpPacket::new(header, Bytes::from_static(b"payload-bytes"));

        let serialized = packet.serialize(0).unwrap();
        let parsed = RtpPacket::parse(&serialized).unwrap();

        assert_eq!(parsed.header.marker, true);
        assert_eq!(parsed.header.csrc, vec![0x1111_1111, 0x2222_2222]);
        assert_eq!(parsed.header.extension.as_ref().unwrap().profile, 0xBEDE);
        assert_eq!(parsed.payload, Bytes::from_static(b"payload-bytes"));
    }

    #[test]
    fn padding_is_stripped_on_parse_and_applied_on_serialize() {
        let header = RtpHeader::new(0, 1, 160, 0xCAFEBABE);
        let packet = RtpPacket::new(header, Bytes::from_static(b"abc"));

        let serialized = packet.serialize(4).unwrap();
        assert_eq!(serialized.len() % 4, 0);

        let parsed = RtpPacket::parse(&serialized).unwrap();
        assert!(parsed.header.padding);
        assert_eq!(parsed.payload, Bytes::from_static(b"abc"));
    }

    #[test]
    fn rejects_wrong_version() {
        let mut bad = RTP_VECTOR;
        bad[0] = 0x00; // version 0
        assert!(RtpPacket::parse(&bad).is_err());
    }

    #[test]
    fn rejects_truncated_header() {
        assert!(RtpPacket::parse(&RTP_VECTOR[..8]).is_err());
    }
}

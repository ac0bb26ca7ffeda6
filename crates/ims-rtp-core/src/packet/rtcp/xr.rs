//! RTCP Extended Report (XR, RFC 3611) container.
//!
//! By default the block list is carried and re-serialized opaquely: a
//! higher-level statistics collector assembles the per-block-type payloads
//! (VoIP metrics, statistics summary, ...) and this layer just ferries them
//! inside the compound packet. Enable the `xr-decode` feature to additionally
//! decode the block header (and, incrementally, individual block bodies).

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::Error;
use crate::{Result, RtpSsrc};

/// One XR report block, kept as an opaque `(block_type, type_specific,
/// payload)` triple unless `xr-decode` is enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XrBlock {
    pub block_type: u8,
    pub type_specific: u8,
    pub payload: Bytes,
}

impl XrBlock {
    fn size(&self) -> usize {
        4 + self.payload.len()
    }

    fn serialize(&self, buf: &mut BytesMut) -> Result<()> {
        if self.payload.len() % 4 != 0 {
            return Err(Error::invalid_parameter(
                "XR block payload must already be padded to a 4-byte boundary",
            ));
        }
        let length_words = self.payload.len() / 4;
        if length_words > u16::MAX as usize {
            return Err(Error::invalid_parameter("XR block payload too large"));
        }
        buf.put_u8(self.block_type);
        buf.put_u8(self.type_specific);
        buf.put_u16(length_words as u16);
        buf.put_slice(&self.payload);
        Ok(())
    }

    fn parse(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < 4 {
            return Err(Error::BufferTooSmall { required: 4, available: buf.remaining() });
        }
        let block_type = buf.get_u8();
        let type_specific = buf.get_u8();
        let length_words = buf.get_u16() as usize;
        let payload_len = length_words * 4;
        if buf.remaining() < payload_len {
            return Err(Error::BufferTooSmall { required: payload_len, available: buf.remaining() });
        }
        let payload = buf.copy_to_bytes(payload_len);
        Ok(Self { block_type, type_specific, payload })
    }
}

/// RTCP XR packet: reporter SSRC plus an opaque (or, with `xr-decode`,
/// partially interpreted) list of report blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcpExtendedReport {
    pub ssrc: RtpSsrc,
    pub blocks: Vec<XrBlock>,
}

impl RtcpExtendedReport {
    pub fn new(ssrc: RtpSsrc) -> Self {
        Self { ssrc, blocks: Vec::new() }
    }

    pub fn size(&self) -> usize {
        4 + self.blocks.iter().map(XrBlock::size).sum::<usize>()
    }

    pub fn serialize(&self) -> Result<BytesMut> {
        let mut buf = BytesMut::with_capacity(self.size());
        buf.put_u32(self.ssrc);
        for block in &self.blocks {
            block.serialize(&mut buf)?;
        }
        Ok(buf)
    }
}

pub fn parse_xr(buf: &mut impl Buf) -> Result<RtcpExtendedReport> {
    if buf.remaining() < 4 {
        return Err(Error::BufferTooSmall { required: 4, available: buf.remaining() });
    }
    let ssrc = buf.get_u32();
    let mut blocks = Vec::new();
    while buf.remaining() >= 4 {
        blocks.push(XrBlock::parse(buf)?);
    }
    Ok(RtcpExtendedReport { ssrc, blocks })
}

#[cfg(feature = "xr-decode")]
pub mod decode {
    //! Best-effort decoding of individual XR block bodies. Only the VoIP
    //! Metrics block (RFC 3611 §4.7) is currently interpreted; other block
    //! types still come through `XrBlock::payload` opaque.
    use super::XrBlock;
    use crate::error::Error;
    use crate::{Result, RtpSsrc};
    use bytes::Buf;

    pub const BLOCK_TYPE_VOIP_METRICS: u8 = 7;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VoipMetrics {
        pub ssrc: RtpSsrc,
        pub loss_rate: u8,
        pub discard_rate: u8,
        pub burst_density: u8,
        pub gap_density: u8,
        pub round_trip_delay_ms: u16,
        pub end_system_delay_ms: u16,
        pub r_factor: u8,
        pub mos_lq: u8,
        pub mos_cq: u8,
    }

    pub fn decode_voip_metrics(block: &XrBlock) -> Result<VoipMetrics> {
        if block.block_type != BLOCK_TYPE_VOIP_METRICS {
            return Err(Error::rtcp("block is not a VoIP Metrics report"));
        }
        let mut buf = block.payload.as_ref();
        if buf.remaining() < 16 {
            return Err(Error::BufferTooSmall { required: 16, available: buf.remaining() });
        }
        Ok(VoipMetrics {
            ssrc: buf.get_u32(),
            loss_rate: buf.get_u8(),
            discard_rate: buf.get_u8(),
            burst_density: buf.get_u8(),
            gap_density: buf.get_u8(),
            round_trip_delay_ms: buf.get_u16(),
            end_system_delay_ms: buf.get_u16(),
            r_factor: { buf.get_u8() },
            mos_lq: { buf.advance(1); buf.get_u8() },
            mos_cq: buf.get_u8(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_block_roundtrip() {
        let xr = RtcpExtendedReport {
            ssrc: 0xAAAA_BBBB,
            blocks: vec![XrBlock {
                block_type: 7,
                type_specific: 0,
                payload: Bytes::from_static(&[0u8; 28]),
            }],
        };
        let serialized = xr.serialize().unwrap();
        let parsed = parse_xr(&mut serialized.freeze()).unwrap();
        assert_eq!(parsed, xr);
    }

    #[test]
    fn rejects_unpadded_block_payload() {
        let xr = RtcpExtendedReport {
            ssrc: 1,
            blocks: vec![XrBlock { block_type: 1, type_specific: 0, payload: Bytes::from_static(b"abc") }],
        };
        assert!(xr.serialize().is_err());
    }
}

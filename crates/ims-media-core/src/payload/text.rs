//! T.140 text RTP payload format (RFC 4103) with RFC 2198 redundancy
//! (spec.md §4.13). The decode-side reassembly/recovery lives in
//! [`crate::jitter::text`]; this module only builds and parses the RED
//! block-header framing.

use bytes::Bytes;
use ims_rtp_core::bitio::{BitReader, BitWriter};

use crate::error::{Error, Result};

/// One redundant generation carried alongside the primary block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedBlock {
    pub payload_type: u8,
    /// RTP timestamp offset (primary timestamp minus this block's original
    /// timestamp), 14 bits.
    pub timestamp_offset: u32,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedPacket {
    pub primary_payload_type: u8,
    pub primary: Bytes,
    /// Oldest generation first, matching wire order.
    pub redundant: Vec<RedBlock>,
}

fn bitio_err(e: ims_rtp_core::Error) -> Error {
    Error::Rtp(e)
}

/// RFC 2198 §3: one 4-byte header per redundant block (`F=1`, PT, 14-bit
/// timestamp offset, 10-bit length) followed by a 1-byte primary header
/// (`F=0`, PT), then the block payloads in the same order as the headers.
pub fn pack(packet: &RedPacket) -> Result<Bytes> {
    let mut w = BitWriter::with_capacity(4 * packet.redundant.len() + 1 + packet.primary.len());
    for block in &packet.redundant {
        w.write(1, 1).map_err(bitio_err)?;
        w.write(block.payload_type as u32 & 0x7F, 7).map_err(bitio_err)?;
        w.write(block.timestamp_offset & 0x3FFF, 14).map_err(bitio_err)?;
        w.write(block.data.len() as u32 & 0x3FF, 10).map_err(bitio_err)?;
    }
    w.write(0, 1).map_err(bitio_err)?;
    w.write(packet.primary_payload_type as u32 & 0x7F, 7).map_err(bitio_err)?;

    let mut out = w.into_bytes();
    for block in &packet.redundant {
        out.extend_from_slice(&block.data);
    }
    out.extend_from_slice(&packet.primary);
    Ok(Bytes::from(out))
}

pub fn unpack(data: &[u8]) -> Result<RedPacket> {
    let mut r = BitReader::new(data);
    let mut headers = Vec::new();
    loop {
        let more = r.read_bit().map_err(bitio_err)?;
        let pt = r.read(7).map_err(bitio_err)? as u8;
        if !more {
            headers.push((pt, None, None));
            break;
        }
        let offset = r.read(14).map_err(bitio_err)?;
        let len = r.read(10).map_err(bitio_err)? as usize;
        headers.push((pt, Some(offset), Some(len)));
    }

    r.align_to_byte();
    let mut pos = r.byte_position();
    let mut redundant = Vec::new();
    for (pt, offset, len) in &headers[..headers.len() - 1] {
        let len = len.unwrap();
        let end = pos + len;
        let chunk = data.get(pos..end).ok_or_else(|| Error::payload("RED redundant block truncated"))?;
        redundant.push(RedBlock { payload_type: *pt, timestamp_offset: offset.unwrap(), data: Bytes::copy_from_slice(chunk) });
        pos = end;
    }

    let (primary_pt, _, _) = headers.last().copied().expect("at least the primary header was parsed");
    let primary = Bytes::copy_from_slice(data.get(pos..).ok_or_else(|| Error::payload("RED primary block truncated"))?);

    Ok(RedPacket { primary_payload_type: primary_pt, primary, redundant })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_primary_with_two_redundant_generations() {
        let packet = RedPacket {
            primary_payload_type: 100,
            primary: Bytes::from_static(b"c"),
            redundant: vec![
                RedBlock { payload_type: 100, timestamp_offset: 320, data: Bytes::from_static(b"a") },
                RedBlock { payload_type: 100, timestamp_offset: 160, data: Bytes::from_static(b"b") },
            ],
        };
        let wire = pack(&packet).unwrap();
        let parsed = unpack(&wire).unwrap();
        assert_eq!(parsed, packet);
    }

    #[test]
    fn roundtrips_primary_only() {
        let packet = RedPacket { primary_payload_type: 100, primary: Bytes::from_static(b"hello"), redundant: vec![] };
        let wire = pack(&packet).unwrap();
        let parsed = unpack(&wire).unwrap();
        assert_eq!(parsed, packet);
    }
}

//! EVS RTP payload format (3GPP TS 26.445 Annex A), compact and
//! header-full variants (spec.md §4.13). One frame per RTP packet; EVS's
//! own multi-channel/AMR-WB IO interoperability modes are out of this
//! engine's scope (spec.md §1 Non-goals — the codec itself is external).

use bytes::Bytes;

use crate::error::{Error, Result};

/// Compact format (3GPP TS 26.445 Annex A.2.2): the payload *is* the codec
/// frame, no header byte. The bitrate is signalled out of band (SDP), so
/// there's nothing for this layer to add or strip.
pub fn pack_compact(frame: Bytes) -> Bytes {
    frame
}

pub fn unpack_compact(data: Bytes) -> Bytes {
    data
}

/// Header-full format (3GPP TS 26.445 Annex A.2.3): a one-byte ToC
/// precedes the frame carrying the channel-aware-mode offset (for CA
/// mode) or CMR (for primary mode) in its low bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvsHeaderFullFrame {
    pub cmr_or_offset: u8,
    pub frame: Bytes,
}

pub fn pack_header_full(frame: EvsHeaderFullFrame) -> Bytes {
    let mut out = Vec::with_capacity(1 + frame.frame.len());
    out.push(frame.cmr_or_offset & 0x0F);
    out.extend_from_slice(&frame.frame);
    Bytes::from(out)
}

pub fn unpack_header_full(data: &[u8]) -> Result<EvsHeaderFullFrame> {
    let (&header, rest) = data.split_first().ok_or_else(|| Error::payload("EVS header-full payload is empty"))?;
    Ok(EvsHeaderFullFrame { cmr_or_offset: header & 0x0F, frame: Bytes::copy_from_slice(rest) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_format_passes_through_unchanged() {
        let frame = Bytes::from_static(b"evs-frame-bits");
        assert_eq!(unpack_compact(pack_compact(frame.clone())), frame);
    }

    #[test]
    fn header_full_roundtrips_offset_and_frame() {
        let frame = EvsHeaderFullFrame { cmr_or_offset: 5, frame: Bytes::from_static(b"codec-bits") };
        let packed = pack_header_full(frame.clone());
        let unpacked = unpack_header_full(&packed).unwrap();
        assert_eq!(unpacked, frame);
    }

    #[test]
    fn header_full_rejects_empty_payload() {
        assert!(unpack_header_full(&[]).is_err());
    }
}

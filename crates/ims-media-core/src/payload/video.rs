//! AVC/HEVC RTP payload format (RFC 6184 FU-A, RFC 7798 FU), spec.md §4.13.
//! NAL units no larger than the configured MTU go out as single-NAL
//! packets; larger ones are split into fragmentation-unit packets and
//! reassembled on the way back in.

use bytes::Bytes;

use crate::error::{Error, Result};

const AVC_FU_A_TYPE: u8 = 28;
const HEVC_FU_TYPE: u8 = 49;

/// RFC 6184 §5.8: splits one AVC NAL unit into FU-A fragments if it won't
/// fit in `mtu` bytes, otherwise returns it untouched as a single-NAL
/// packet.
pub fn fragment_avc(nal: &[u8], mtu: usize) -> Result<Vec<Bytes>> {
    if nal.is_empty() {
        return Err(Error::payload("cannot fragment an empty NAL unit"));
    }
    if nal.len() <= mtu {
        return Ok(vec![Bytes::copy_from_slice(nal)]);
    }

    let header = nal[0];
    let nri = header & 0x60;
    let nal_type = header & 0x1F;
    let payload = &nal[1..];

    let max_fragment = mtu.saturating_sub(2).max(1);
    let chunks: Vec<&[u8]> = payload.chunks(max_fragment).collect();
    let last = chunks.len() - 1;

    let mut out = Vec::with_capacity(chunks.len());
    for (i, chunk) in chunks.into_iter().enumerate() {
        let start = i == 0;
        let end = i == last;
        let fu_indicator = nri | AVC_FU_A_TYPE;
        let fu_header = ((start as u8) << 7) | ((end as u8) << 6) | nal_type;
        let mut buf = Vec::with_capacity(2 + chunk.len());
        buf.push(fu_indicator);
        buf.push(fu_header);
        buf.extend_from_slice(chunk);
        out.push(Bytes::from(buf));
    }
    Ok(out)
}

/// Reassembles an ordered, complete run of FU-A fragments (from the first,
/// `S=1`, to the last, `E=1`) back into one NAL unit.
pub fn reassemble_avc(fragments: &[Bytes]) -> Result<Bytes> {
    let first = fragments.first().ok_or_else(|| Error::payload("no FU-A fragments to reassemble"))?;
    if first.len() < 2 {
        return Err(Error::payload("FU-A fragment shorter than its 2-byte header"));
    }
    let fu_indicator = first[0];
    let fu_header = first[1];
    let nri = fu_indicator & 0x60;
    let nal_type = fu_header & 0x1F;

    let mut out = vec![nri | nal_type];
    for f in fragments {
        if f.len() < 2 {
            return Err(Error::payload("FU-A fragment shorter than its 2-byte header"));
        }
        out.extend_from_slice(&f[2..]);
    }
    Ok(Bytes::from(out))
}

/// RFC 7798 §4.4.3: HEVC's FU header is one byte (`S/E/FuType`) following
/// the usual 2-byte HEVC NAL header, itself rewritten to mark
/// `nal_unit_type = 49` (FU).
pub fn fragment_hevc(nal: &[u8], mtu: usize) -> Result<Vec<Bytes>> {
    if nal.len() < 2 {
        return Err(Error::payload("HEVC NAL unit shorter than its 2-byte header"));
    }
    if nal.len() <= mtu {
        return Ok(vec![Bytes::copy_from_slice(nal)]);
    }

    let header0 = nal[0];
    let header1 = nal[1];
    let nal_type = (header0 >> 1) & 0x3F;
    let payload = &nal[2..];

    let fu_header0 = (header0 & 0x81) | (HEVC_FU_TYPE << 1);
    let max_fragment = mtu.saturating_sub(3).max(1);
    let chunks: Vec<&[u8]> = payload.chunks(max_fragment).collect();
    let last = chunks.len() - 1;

    let mut out = Vec::with_capacity(chunks.len());
    for (i, chunk) in chunks.into_iter().enumerate() {
        let start = i == 0;
        let end = i == last;
        let fu_header = ((start as u8) << 7) | ((end as u8) << 6) | nal_type;
        let mut buf = Vec::with_capacity(3 + chunk.len());
        buf.push(fu_header0);
        buf.push(header1);
        buf.push(fu_header);
        buf.extend_from_slice(chunk);
        out.push(Bytes::from(buf));
    }
    Ok(out)
}

pub fn reassemble_hevc(fragments: &[Bytes]) -> Result<Bytes> {
    let first = fragments.first().ok_or_else(|| Error::payload("no FU fragments to reassemble"))?;
    if first.len() < 3 {
        return Err(Error::payload("HEVC FU fragment shorter than its 3-byte header"));
    }
    let fu_header0 = first[0];
    let header1 = first[1];
    let fu_header = first[2];
    let nal_type = fu_header & 0x3F;
    let header0 = (fu_header0 & 0x81) | (nal_type << 1);

    let mut out = vec![header0, header1];
    for f in fragments {
        if f.len() < 3 {
            return Err(Error::payload("HEVC FU fragment shorter than its 3-byte header"));
        }
        out.extend_from_slice(&f[3..]);
    }
    Ok(Bytes::from(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avc_small_nal_is_not_fragmented() {
        let nal = vec![0x65, 1, 2, 3];
        let packets = fragment_avc(&nal, 1400).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(&packets[0][..], &nal[..]);
    }

    #[test]
    fn avc_large_nal_fragments_and_reassembles() {
        let mut nal = vec![0x65u8]; // NRI=3, type=5 (IDR slice)
        nal.extend(std::iter::repeat(0xAA).take(3000));

        let fragments = fragment_avc(&nal, 500).unwrap();
        assert!(fragments.len() > 1);
        assert!((fragments[0][1] & 0x80) != 0); // S bit on first fragment
        assert!((fragments.last().unwrap()[1] & 0x40) != 0); // E bit on last

        let rebuilt = reassemble_avc(&fragments).unwrap();
        assert_eq!(rebuilt, Bytes::from(nal));
    }

    #[test]
    fn hevc_large_nal_fragments_and_reassembles() {
        let mut nal = vec![0x26u8, 0x01]; // IDR_W_RADL-ish type, layer 0, tid 1
        nal.extend(std::iter::repeat(0xBB).take(3000));

        let fragments = fragment_hevc(&nal, 500).unwrap();
        assert!(fragments.len() > 1);
        let rebuilt = reassemble_hevc(&fragments).unwrap();
        assert_eq!(rebuilt, Bytes::from(nal));
    }
}

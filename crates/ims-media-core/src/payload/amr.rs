//! AMR/AMR-WB RTP payload format (RFC 4867 §4.3/§4.4), both octet-aligned
//! and bandwidth-efficient framing, one payload header + ToC per packet
//! possibly carrying several frames (spec.md §4.13).

use bytes::Bytes;
use ims_rtp_core::bitio::{BitReader, BitWriter};

use crate::config::AudioCodec;
use crate::error::{Error, Result};
use crate::payload::copy_bits;

/// One AMR/AMR-WB codec frame, already produced by the external encoder.
/// `payload` holds `frame_bits(codec, frame_type)` bits, left-justified
/// (MSB-first) in the minimum number of bytes; any bits past that count in
/// the final byte are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmrFrame {
    pub frame_type: u8,
    pub quality_bit: bool,
    pub payload: Bytes,
}

/// Bits of compressed speech data for one AMR/AMR-WB frame type (RFC 4867
/// Table 1, Table 2), excluding the ToC entry itself.
pub fn frame_bits(codec: AudioCodec, frame_type: u8) -> usize {
    const NB: [usize; 16] = [95, 103, 118, 134, 148, 159, 204, 244, 39, 0, 0, 0, 0, 0, 0, 0];
    const WB: [usize; 16] =
        [132, 177, 253, 285, 317, 365, 397, 461, 477, 40, 0, 0, 0, 0, 0, 0];
    let table = if codec == AudioCodec::AmrWb { &WB } else { &NB };
    table.get(frame_type as usize).copied().unwrap_or(0)
}

/// RFC 4867 §4.3: payload header (CMR + 4 reserved bits) then one ToC octet
/// per frame (F/FT/Q/2 padding bits), then octet-aligned speech data.
pub fn pack_octet_aligned(cmr: u8, frames: &[AmrFrame], codec: AudioCodec) -> Result<Bytes> {
    let mut w = BitWriter::with_capacity(frames.len() * 32 + 1);
    w.write(cmr as u32 & 0x0F, 4).map_err(bitio_err)?;
    w.write(0, 4).map_err(bitio_err)?;

    for (i, f) in frames.iter().enumerate() {
        let more = i + 1 < frames.len();
        w.write(more as u32, 1).map_err(bitio_err)?;
        w.write(f.frame_type as u32, 4).map_err(bitio_err)?;
        w.write(f.quality_bit as u32, 1).map_err(bitio_err)?;
        w.write(0, 2).map_err(bitio_err)?;
    }

    for f in frames {
        let nbytes = frame_bits(codec, f.frame_type).div_ceil(8);
        if f.payload.len() < nbytes {
            return Err(Error::payload(format!(
                "AMR frame type {} needs {} bytes, got {}",
                f.frame_type,
                nbytes,
                f.payload.len()
            )));
        }
        w.write_byte_buffer(&f.payload[..nbytes]).map_err(bitio_err)?;
    }

    Ok(Bytes::from(w.into_bytes()))
}

pub fn unpack_octet_aligned(data: &[u8], codec: AudioCodec) -> Result<(u8, Vec<AmrFrame>)> {
    let mut r = BitReader::new(data);
    let cmr = r.read(4).map_err(bitio_err)? as u8;
    let _reserved = r.read(4).map_err(bitio_err)?;

    let mut toc = Vec::new();
    loop {
        let more = r.read_bit().map_err(bitio_err)?;
        let ft = r.read(4).map_err(bitio_err)? as u8;
        let q = r.read_bit().map_err(bitio_err)?;
        let _pad = r.read(2).map_err(bitio_err)?;
        toc.push((ft, q));
        if !more {
            break;
        }
    }

    r.align_to_byte();
    let mut frames = Vec::with_capacity(toc.len());
    for (ft, q) in toc {
        let nbytes = frame_bits(codec, ft).div_ceil(8);
        let start = r.byte_position();
        let end = start + nbytes;
        let slice = data.get(start..end).ok_or_else(|| Error::payload("AMR speech data truncated"))?;
        let payload = Bytes::copy_from_slice(slice);
        // advance reader past the consumed bytes
        for _ in 0..nbytes {
            r.read(8).map_err(bitio_err)?;
        }
        frames.push(AmrFrame { frame_type: ft, quality_bit: q, payload });
    }

    Ok((cmr, frames))
}

/// RFC 4867 §4.4: CMR + ToC entries bit-packed with no padding, speech data
/// bit-packed back-to-back, the whole payload padded to an octet only at
/// the very end.
pub fn pack_bandwidth_efficient(cmr: u8, frames: &[AmrFrame], codec: AudioCodec) -> Result<Bytes> {
    let mut w = BitWriter::with_capacity(frames.len() * 32 + 1);
    w.write(cmr as u32 & 0x0F, 4).map_err(bitio_err)?;

    for (i, f) in frames.iter().enumerate() {
        let more = i + 1 < frames.len();
        w.write(more as u32, 1).map_err(bitio_err)?;
        w.write(f.frame_type as u32, 4).map_err(bitio_err)?;
        w.write(f.quality_bit as u32, 1).map_err(bitio_err)?;
    }

    for f in frames {
        let nbits = frame_bits(codec, f.frame_type);
        let mut r = BitReader::new(&f.payload);
        copy_bits(&mut r, &mut w, nbits).map_err(bitio_err)?;
    }

    Ok(Bytes::from(w.into_bytes()))
}

pub fn unpack_bandwidth_efficient(data: &[u8], codec: AudioCodec) -> Result<(u8, Vec<AmrFrame>)> {
    let mut r = BitReader::new(data);
    let cmr = r.read(4).map_err(bitio_err)? as u8;

    let mut toc = Vec::new();
    loop {
        let more = r.read_bit().map_err(bitio_err)?;
        let ft = r.read(4).map_err(bitio_err)? as u8;
        let q = r.read_bit().map_err(bitio_err)?;
        toc.push((ft, q));
        if !more {
            break;
        }
    }

    let mut frames = Vec::with_capacity(toc.len());
    for (ft, q) in toc {
        let nbits = frame_bits(codec, ft);
        let mut w = BitWriter::with_capacity(nbits.div_ceil(8));
        copy_bits(&mut r, &mut w, nbits).map_err(bitio_err)?;
        frames.push(AmrFrame { frame_type: ft, quality_bit: q, payload: Bytes::from(w.into_bytes()) });
    }

    Ok((cmr, frames))
}

fn bitio_err(e: ims_rtp_core::Error) -> Error {
    Error::Rtp(e)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(ft: u8, codec: AudioCodec) -> AmrFrame {
        let nbytes = frame_bits(codec, ft).div_ceil(8);
        AmrFrame { frame_type: ft, quality_bit: true, payload: Bytes::from(vec![0xAB; nbytes]) }
    }

    #[test]
    fn octet_aligned_roundtrips_single_frame() {
        let codec = AudioCodec::Amr;
        let f = frame(7, codec); // 12.2 kbit/s
        let packed = pack_octet_aligned(15, &[f.clone()], codec).unwrap();
        let (cmr, frames) = unpack_octet_aligned(&packed, codec).unwrap();
        assert_eq!(cmr, 15);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].frame_type, 7);
        assert_eq!(frames[0].payload, f.payload);
    }

    #[test]
    fn octet_aligned_roundtrips_multiple_frames() {
        let codec = AudioCodec::Amr;
        let frames_in = vec![frame(0, codec), frame(7, codec), frame(8, codec)];
        let packed = pack_octet_aligned(5, &frames_in, codec).unwrap();
        let (cmr, frames_out) = unpack_octet_aligned(&packed, codec).unwrap();
        assert_eq!(cmr, 5);
        assert_eq!(frames_out.len(), 3);
        for (a, b) in frames_in.iter().zip(frames_out.iter()) {
            assert_eq!(a.frame_type, b.frame_type);
        }
    }

    #[test]
    fn bandwidth_efficient_roundtrips_amr_wb() {
        let codec = AudioCodec::AmrWb;
        let f = frame(8, codec); // 23.85 kbit/s
        let packed = pack_bandwidth_efficient(0, &[f.clone()], codec).unwrap();
        let (_, frames) = unpack_bandwidth_efficient(&packed, codec).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].frame_type, 8);
    }
}

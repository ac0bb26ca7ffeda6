//! RTP payload formatters (spec.md §4.13 / C13): the bit-level framing
//! rules for each media type, layered on top of `ims_rtp_core`'s generic RTP
//! packet codec. The actual audio/video compressors are external
//! collaborators (spec.md §1 Non-goals); these modules only pack/unpack the
//! already-encoded bits into (or out of) an RTP payload.

pub mod amr;
pub mod dtmf;
pub mod evs;
pub mod text;
pub mod video;

use ims_rtp_core::bitio::{BitReader, BitWriter};
use ims_rtp_core::Result as RtpResult;

/// Copies `n` bits (any width) from `reader` into `writer`, chunked to
/// respect `BitReader`/`BitWriter`'s 24-bit-per-call limit.
pub(crate) fn copy_bits(reader: &mut BitReader, writer: &mut BitWriter, mut n: usize) -> RtpResult<()> {
    while n > 0 {
        let take = n.min(24) as u8;
        let bits = reader.read(take)?;
        writer.write(bits, take)?;
        n -= take as usize;
    }
    Ok(())
}

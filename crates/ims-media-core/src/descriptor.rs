//! The inter-node packet descriptor (spec.md §3 "Packet descriptor") that
//! flows between every pair of connected nodes in a stream graph, and the
//! subtype/data-type tags a consumer inspects to know how to interpret it.

use bytes::Bytes;

/// What kind of bits a [`PacketDescriptor`] carries, so a downstream node
/// doesn't have to guess from context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaSubtype {
    /// Raw, unencoded media samples (PCM audio, raw video frame).
    RawMedia,
    /// Bits already compressed by a codec (AMR/EVS/AVC/HEVC payload).
    CompressedMedia,
    /// A fully formed RTP payload ready for (or just taken off) the wire.
    RtpPayload,
    /// A fully formed RTCP compound packet.
    RtcpPayload,
    /// An RFC 4733 DTMF event.
    DtmfEvent,
    /// A refresh marker requesting the encoder re-send configuration NAL
    /// units (SPS/PPS/VPS) to a newly joined receiver.
    RefreshMarker,
    /// An out-of-band control message (e.g. a config parcel routed through
    /// the data path rather than invoked directly).
    Control,
    /// Placeholder substituted by the audio jitter buffer when a playout
    /// tick has no data yet (`MEDIASUBTYPE_AUDIO_NODATA`).
    AudioNoData,
}

/// Video frame kind, populated only when [`PacketDescriptor::subtype`] is
/// media carrying video (optional "data-type tag" from spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFrameType {
    Idr,
    NonIdr,
    ConfigNalUnit,
}

/// One datum passed between pipeline nodes. Ownership of `data` moves with
/// the descriptor; a [`ims_rtp_core::queue::DataQueue`] clones on insert and
/// drops the clone on delete, matching spec.md's "queues copy on insert and
/// free on delete" (in Rust, `Bytes` is refcounted so "copy" is a cheap
/// clone rather than a deep copy).
#[derive(Debug, Clone)]
pub struct PacketDescriptor {
    pub data: Bytes,
    /// RTP timestamp (32-bit), meaningful once assigned by the RTP encoder
    /// or read off an inbound RTP packet.
    pub rtp_timestamp: u32,
    pub marker: bool,
    pub sequence_number: u16,
    pub subtype: MediaSubtype,
    pub video_frame_type: Option<VideoFrameType>,
    /// Local arrival time in milliseconds (socket-reader/jitter-buffer
    /// clock), `None` for descriptors produced locally (e.g. by an encoder
    /// before transmission).
    pub arrival_time_ms: Option<u64>,
    /// First fragment of a (possibly) multi-fragment frame.
    pub header: bool,
    /// Fully reassembled and ready for the next stage.
    pub valid: bool,
}

impl PacketDescriptor {
    pub fn new(data: Bytes, subtype: MediaSubtype) -> Self {
        Self {
            data,
            rtp_timestamp: 0,
            marker: false,
            sequence_number: 0,
            subtype,
            video_frame_type: None,
            arrival_time_ms: None,
            header: true,
            valid: true,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Builds the reserved no-data placeholder the audio jitter buffer
    /// emits on a playout tick whose expected frame hasn't arrived yet.
    pub fn no_data(rtp_timestamp: u32) -> Self {
        let mut d = Self::new(Bytes::new(), MediaSubtype::AudioNoData);
        d.rtp_timestamp = rtp_timestamp;
        d
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_data_descriptor_is_empty_and_tagged() {
        let d = PacketDescriptor::no_data(1600);
        assert!(d.is_empty());
        assert_eq!(d.subtype, MediaSubtype::AudioNoData);
        assert_eq!(d.rtp_timestamp, 1600);
    }
}

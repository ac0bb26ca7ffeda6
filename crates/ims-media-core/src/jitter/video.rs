//! Video jitter buffer (spec.md §4.10 / C10): reorders RTP-depacketized NAL
//! fragments by sequence number, reassembles frames, and raises feedback
//! events (NACK source data, IDR request) when a gap corrupts the frame
//! currently being assembled. RTCP feedback-packet encoding itself stays in
//! `ims-rtp-core`; this module only decides *that* feedback is owed.

use std::collections::BTreeMap;

use crate::config::VideoJitterBufferConfig;
use crate::descriptor::{PacketDescriptor, VideoFrameType};

/// Events the video pipeline node turns into outbound RTCP feedback or a
/// delivered frame.
#[derive(Debug, Clone, PartialEq)]
pub enum VideoJitterEvent {
    FrameReady {
        data: Vec<bytes::Bytes>,
        rtp_timestamp: u32,
        frame_type: Option<VideoFrameType>,
        /// Set when a fragment of this frame never arrived; the frame is
        /// forwarded anyway (some decoders conceal single-slice loss) but
        /// flagged so the renderer/decoder node can react.
        corrupted: bool,
    },
    /// Sequence numbers that were skipped over (never arrived before a
    /// later sequence was delivered). The RTCP node packs these into a
    /// Generic NACK FCI (RFC 4585 §6.2.1 PID/BLP).
    PacketLoss { lost_sequences: Vec<u16> },
    /// A corrupted frame happened to contain (or immediately follow) an IDR
    /// fragment — request a fresh one (RFC 5104 FIR semantics via PLI).
    RequestIdr,
}

fn seq_gap(expected: u16, actual: u16) -> u16 {
    actual.wrapping_sub(expected)
}

pub struct VideoJitterBuffer {
    #[allow(dead_code)]
    config: VideoJitterBufferConfig,
    pending: BTreeMap<u16, PacketDescriptor>,
    expected_seq: Option<u16>,
    assembling: Vec<bytes::Bytes>,
    frame_corrupted: bool,
    received_count: u64,
    lost_count: u64,
}

impl VideoJitterBuffer {
    pub fn new(config: VideoJitterBufferConfig) -> Self {
        Self {
            config,
            pending: BTreeMap::new(),
            expected_seq: None,
            assembling: Vec::new(),
            frame_corrupted: false,
            received_count: 0,
            lost_count: 0,
        }
    }

    pub fn received_count(&self) -> u64 {
        self.received_count
    }

    pub fn lost_count(&self) -> u64 {
        self.lost_count
    }

    pub fn loss_rate_percent(&self) -> f32 {
        let total = self.received_count + self.lost_count;
        if total == 0 {
            0.0
        } else {
            (self.lost_count as f32 / total as f32) * 100.0
        }
    }

    /// Feeds one depacketized NAL fragment in and returns whatever became
    /// ready to act on: zero or more lost-sequence/IDR events followed by
    /// at most one completed frame.
    pub fn add(&mut self, desc: PacketDescriptor) -> Vec<VideoJitterEvent> {
        let mut events = Vec::new();
        self.received_count += 1;

        let seq = desc.sequence_number;
        if self.expected_seq.is_none() {
            self.expected_seq = Some(seq);
        }

        let expected = self.expected_seq.unwrap();
        let gap = seq_gap(expected, seq);
        if gap != 0 && gap < u16::MAX / 2 {
            // `seq` arrived ahead of what we're waiting for: everything
            // strictly between is missing (for now).
            let lost: Vec<u16> = (0..gap).map(|i| expected.wrapping_add(i)).collect();
            if !lost.is_empty() {
                self.lost_count += lost.len() as u64;
                self.frame_corrupted = true;
                events.push(VideoJitterEvent::PacketLoss { lost_sequences: lost });
            }
        }

        self.pending.insert(seq, desc);
        events.extend(self.drain_sequential());
        events
    }

    fn drain_sequential(&mut self) -> Vec<VideoJitterEvent> {
        let mut events = Vec::new();
        loop {
            let Some(expected) = self.expected_seq else { break };
            let Some(next) = self.pending.remove(&expected) else { break };
            self.expected_seq = Some(expected.wrapping_add(1));

            let is_idr = next.video_frame_type == Some(VideoFrameType::Idr);
            let ts = next.rtp_timestamp;
            let frame_type = next.video_frame_type;
            let marker = next.marker;
            self.assembling.push(next.data);

            if marker {
                let data = std::mem::take(&mut self.assembling);
                let corrupted = self.frame_corrupted;
                self.frame_corrupted = false;
                if corrupted && is_idr {
                    events.push(VideoJitterEvent::RequestIdr);
                }
                events.push(VideoJitterEvent::FrameReady { data, rtp_timestamp: ts, frame_type, corrupted });
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn frag(seq: u16, ts: u32, marker: bool, idr: bool) -> PacketDescriptor {
        let mut d = PacketDescriptor::new(Bytes::from_static(b"nal"), crate::descriptor::MediaSubtype::CompressedMedia);
        d.sequence_number = seq;
        d.rtp_timestamp = ts;
        d.marker = marker;
        d.video_frame_type = Some(if idr { VideoFrameType::Idr } else { VideoFrameType::NonIdr });
        d
    }

    #[test]
    fn in_order_fragments_reassemble_into_one_frame() {
        let mut jb = VideoJitterBuffer::new(VideoJitterBufferConfig::default());
        let mut events = jb.add(frag(0, 1000, false, false));
        events.extend(jb.add(frag(1, 1000, false, false)));
        events.extend(jb.add(frag(2, 1000, true, false)));

        assert_eq!(events.len(), 1);
        match &events[0] {
            VideoJitterEvent::FrameReady { data, rtp_timestamp, corrupted, .. } => {
                assert_eq!(data.len(), 3);
                assert_eq!(*rtp_timestamp, 1000);
                assert!(!corrupted);
            }
            other => panic!("expected FrameReady, got {other:?}"),
        }
    }

    #[test]
    fn missing_fragment_reports_loss_and_corrupted_frame() {
        let mut jb = VideoJitterBuffer::new(VideoJitterBufferConfig::default());
        let mut events = jb.add(frag(0, 1000, false, true));
        // seq 1 never arrives
        events.extend(jb.add(frag(2, 1000, true, true)));

        let has_loss = events.iter().any(|e| matches!(e, VideoJitterEvent::PacketLoss { lost_sequences } if lost_sequences == &vec![1]));
        assert!(has_loss);

        let has_idr_request = events.iter().any(|e| matches!(e, VideoJitterEvent::RequestIdr));
        assert!(has_idr_request);

        let frame = events.iter().find(|e| matches!(e, VideoJitterEvent::FrameReady { .. })).unwrap();
        match frame {
            VideoJitterEvent::FrameReady { corrupted, data, .. } => {
                assert!(*corrupted);
                assert_eq!(data.len(), 2);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn loss_rate_percent_tracks_received_vs_lost() {
        let mut jb = VideoJitterBuffer::new(VideoJitterBufferConfig::default());
        jb.add(frag(0, 1000, false, false));
        jb.add(frag(2, 1000, true, false)); // seq 1 lost
        assert!(jb.loss_rate_percent() > 0.0);
    }
}

//! Jitter-buffer pipeline nodes (spec.md §4.9–§4.10, §4.13 / C9/C10/C13):
//! thin [`Node`] wrappers that ingest depacketized RTP payloads every tick
//! and emit playout output on their own cadence. Registered as source nodes
//! since they're self-timed rather than purely reactive to queue depth.

use std::time::{Duration, Instant};

use ims_rtp_core::queue::DataQueue;

use crate::descriptor::PacketDescriptor;
use crate::events::{MediaEvent, RtpPacketStatus};
use crate::jitter::audio::AudioJitterBuffer;
use crate::jitter::text::TextJitterBuffer;
use crate::jitter::video::{VideoJitterBuffer, VideoJitterEvent};
use crate::node::{BaseNode, Node};

pub struct AudioJitterBufferNode {
    base: BaseNode,
    jitter: AudioJitterBuffer,
    tick_interval: Duration,
    next_tick: Instant,
    events: std::sync::Arc<DataQueue<MediaEvent>>,
    ssrc: ims_rtp_core::RtpSsrc,
}

impl AudioJitterBufferNode {
    pub fn new(name: impl Into<String>, jitter: AudioJitterBuffer, tick_interval: Duration, events: std::sync::Arc<DataQueue<MediaEvent>>, ssrc: ims_rtp_core::RtpSsrc) -> Self {
        Self { base: BaseNode::new(name), jitter, tick_interval, next_tick: Instant::now(), events, ssrc }
    }
}

impl Node for AudioJitterBufferNode {
    fn base(&self) -> &BaseNode {
        &self.base
    }

    fn is_source(&self) -> bool {
        true
    }

    fn process_data(&mut self) -> crate::Result<()> {
        let now = Instant::now();
        while let Some(desc) = self.base.input_queue().get() {
            let arrival = Instant::now();
            // SID/DTX frames are tagged upstream by the AMR/EVS payload
            // decoder (RFC 4867 §3.2 F-bit / 3GPP TS 26.445 Annex A type);
            // by the time a descriptor reaches the jitter buffer the only
            // signal left is an empty comfort-noise payload.
            let is_sid = desc.is_empty();
            self.jitter.add(desc, arrival, is_sid);
        }

        if now < self.next_tick {
            return Ok(());
        }
        self.next_tick = now + self.tick_interval;

        let (desc, status, discarded) = self.jitter.get_with_discards();
        for _ in discarded {
            self.events.add(MediaEvent::PacketStatus { ssrc: self.ssrc, status: RtpPacketStatus::Discarded });
        }
        self.events.add(MediaEvent::PacketStatus { ssrc: self.ssrc, status });
        self.jitter.maybe_adapt();
        self.base.send_to_rear(desc);
        Ok(())
    }
}

pub struct VideoJitterBufferNode {
    base: BaseNode,
    jitter: VideoJitterBuffer,
    events: std::sync::Arc<DataQueue<MediaEvent>>,
    ssrc: ims_rtp_core::RtpSsrc,
}

impl VideoJitterBufferNode {
    pub fn new(name: impl Into<String>, jitter: VideoJitterBuffer, events: std::sync::Arc<DataQueue<MediaEvent>>, ssrc: ims_rtp_core::RtpSsrc) -> Self {
        Self { base: BaseNode::new(name), jitter, events, ssrc }
    }
}

impl Node for VideoJitterBufferNode {
    fn base(&self) -> &BaseNode {
        &self.base
    }

    fn process_data(&mut self) -> crate::Result<()> {
        let Some(desc) = self.base.input_queue().get() else { return Ok(()) };

        for event in self.jitter.add(desc) {
            match event {
                VideoJitterEvent::FrameReady { data, rtp_timestamp, frame_type, corrupted } => {
                    let mut combined = Vec::new();
                    for chunk in data {
                        combined.extend_from_slice(&chunk);
                    }
                    let mut out = PacketDescriptor::new(bytes::Bytes::from(combined), crate::descriptor::MediaSubtype::CompressedMedia);
                    out.rtp_timestamp = rtp_timestamp;
                    out.video_frame_type = frame_type;
                    out.valid = !corrupted;
                    self.base.send_to_rear(out);
                }
                VideoJitterEvent::PacketLoss { lost_sequences } => {
                    let loss_rate = self.jitter.loss_rate_percent();
                    let _ = lost_sequences;
                    self.events.add(MediaEvent::PacketLoss { ssrc: self.ssrc, loss_rate_percent: loss_rate });
                }
                VideoJitterEvent::RequestIdr => {
                    self.events.add(MediaEvent::Feedback(crate::events::FeedbackRequest::RequestVideoIdrFrame));
                }
            }
        }
        Ok(())
    }
}

pub struct TextJitterBufferNode {
    base: BaseNode,
    jitter: TextJitterBuffer,
}

impl TextJitterBufferNode {
    pub fn new(name: impl Into<String>, jitter: TextJitterBuffer) -> Self {
        Self { base: BaseNode::new(name), jitter }
    }
}

impl Node for TextJitterBufferNode {
    fn base(&self) -> &BaseNode {
        &self.base
    }

    fn process_data(&mut self) -> crate::Result<()> {
        let Some(desc) = self.base.input_queue().get() else { return Ok(()) };

        let blocks = self.jitter.add(desc.sequence_number, desc.data, Vec::new());
        for block in blocks {
            let out = PacketDescriptor::new(block.data, crate::descriptor::MediaSubtype::CompressedMedia);
            self.base.send_to_rear(out);
        }
        Ok(())
    }
}

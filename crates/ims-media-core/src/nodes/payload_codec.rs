//! Payload encoder/decoder nodes (spec.md §4.13 / C13): sit between the
//! jitter buffer / raw-media side and the RTP encoder/decoder, turning
//! codec frames into RTP payload bytes and back. One node per media type,
//! each enforcing `is_same_config` the way `config.rs`'s value objects
//! describe.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::config::{AudioCodec, AudioPayloadConfig, TextPayloadConfig, VideoCodec, VideoPayloadConfig};
use crate::descriptor::{MediaSubtype, PacketDescriptor};
use crate::node::{BaseNode, Node};
use crate::payload::{amr, dtmf, evs, text as text_payload, video};

fn amr_frame_type_for_len(codec: AudioCodec, len: usize) -> u8 {
    (0..16u8).find(|&ft| amr::frame_bits(codec, ft).div_ceil(8) == len).unwrap_or(0)
}

/// Packs one already-compressed audio frame per call into an AMR/AMR-WB or
/// EVS RTP payload. Aggregation of several frames into one packet (up to
/// `max_ptime_ms`) is left to the caller feeding frames at the configured
/// `ptime_ms` cadence, matching spec.md §4.13 "multi-frame aggregation up
/// to `maxPtime`" as a one-frame-per-tick degenerate case.
pub struct AudioPayloadEncoderNode {
    base: BaseNode,
    config: AudioPayloadConfig,
}

impl AudioPayloadEncoderNode {
    pub fn new(name: impl Into<String>, config: AudioPayloadConfig) -> Self {
        Self { base: BaseNode::new(name), config }
    }

    pub fn is_same_config(&self, other: &AudioPayloadConfig) -> bool {
        self.config.is_same_config(other)
    }

    pub fn set_config(&mut self, config: AudioPayloadConfig) {
        self.config = config;
    }
}

impl Node for AudioPayloadEncoderNode {
    fn base(&self) -> &BaseNode {
        &self.base
    }

    fn process_data(&mut self) -> crate::Result<()> {
        let Some(desc) = self.base.input_queue().get() else { return Ok(()) };

        let payload = match self.config.codec {
            AudioCodec::Amr | AudioCodec::AmrWb => {
                let frame_type = amr_frame_type_for_len(self.config.codec, desc.len());
                let frame = amr::AmrFrame { frame_type, quality_bit: true, payload: desc.data.clone() };
                if self.config.octet_aligned {
                    amr::pack_octet_aligned(15, &[frame], self.config.codec)?
                } else {
                    amr::pack_bandwidth_efficient(15, &[frame], self.config.codec)?
                }
            }
            AudioCodec::Evs if self.config.evs_header_full => {
                evs::pack_header_full(evs::EvsHeaderFullFrame { cmr_or_offset: self.config.evs_channel_aware_offset, frame: desc.data.clone() })
            }
            AudioCodec::Evs => evs::pack_compact(desc.data.clone()),
            AudioCodec::Pcmu | AudioCodec::Pcma => desc.data.clone(),
        };

        let mut out = PacketDescriptor::new(payload, MediaSubtype::CompressedMedia);
        out.rtp_timestamp = desc.rtp_timestamp;
        out.marker = desc.marker;
        self.base.send_to_rear(out);
        Ok(())
    }
}

pub struct AudioPayloadDecoderNode {
    base: BaseNode,
    config: AudioPayloadConfig,
}

impl AudioPayloadDecoderNode {
    pub fn new(name: impl Into<String>, config: AudioPayloadConfig) -> Self {
        Self { base: BaseNode::new(name), config }
    }

    pub fn is_same_config(&self, other: &AudioPayloadConfig) -> bool {
        self.config.is_same_config(other)
    }
}

impl Node for AudioPayloadDecoderNode {
    fn base(&self) -> &BaseNode {
        &self.base
    }

    fn process_data(&mut self) -> crate::Result<()> {
        let Some(desc) = self.base.input_queue().get() else { return Ok(()) };

        let frames: Vec<Bytes> = match self.config.codec {
            AudioCodec::Amr | AudioCodec::AmrWb => {
                let (_, frames) = if self.config.octet_aligned {
                    amr::unpack_octet_aligned(&desc.data, self.config.codec)?
                } else {
                    amr::unpack_bandwidth_efficient(&desc.data, self.config.codec)?
                };
                frames.into_iter().map(|f| f.payload).collect()
            }
            AudioCodec::Evs if self.config.evs_header_full => {
                vec![evs::unpack_header_full(&desc.data)?.frame]
            }
            AudioCodec::Evs => vec![evs::unpack_compact(desc.data.clone())],
            AudioCodec::Pcmu | AudioCodec::Pcma => vec![desc.data.clone()],
        };

        for frame in frames {
            let mut out = PacketDescriptor::new(frame, MediaSubtype::RawMedia);
            out.rtp_timestamp = desc.rtp_timestamp;
            out.marker = desc.marker;
            out.sequence_number = desc.sequence_number;
            out.arrival_time_ms = desc.arrival_time_ms;
            self.base.send_to_rear(out);
        }
        Ok(())
    }
}

pub struct VideoPayloadEncoderNode {
    base: BaseNode,
    config: VideoPayloadConfig,
}

impl VideoPayloadEncoderNode {
    pub fn new(name: impl Into<String>, config: VideoPayloadConfig) -> Self {
        Self { base: BaseNode::new(name), config }
    }

    pub fn is_same_config(&self, other: &VideoPayloadConfig) -> bool {
        self.config.is_same_config(other)
    }
}

impl Node for VideoPayloadEncoderNode {
    fn base(&self) -> &BaseNode {
        &self.base
    }

    fn process_data(&mut self) -> crate::Result<()> {
        let Some(desc) = self.base.input_queue().get() else { return Ok(()) };

        let fragments = match self.config.codec {
            VideoCodec::Avc => video::fragment_avc(&desc.data, self.config.mtu)?,
            VideoCodec::Hevc => video::fragment_hevc(&desc.data, self.config.mtu)?,
        };
        let last = fragments.len().saturating_sub(1);
        for (i, frag) in fragments.into_iter().enumerate() {
            let mut out = PacketDescriptor::new(frag, MediaSubtype::RtpPayload);
            out.rtp_timestamp = desc.rtp_timestamp;
            out.video_frame_type = desc.video_frame_type;
            out.marker = i == last && desc.marker;
            self.base.send_to_rear(out);
        }
        Ok(())
    }
}

pub struct VideoPayloadDecoderNode {
    base: BaseNode,
    config: VideoPayloadConfig,
    pending: Vec<Bytes>,
}

impl VideoPayloadDecoderNode {
    pub fn new(name: impl Into<String>, config: VideoPayloadConfig) -> Self {
        Self { base: BaseNode::new(name), config, pending: Vec::new() }
    }

    pub fn is_same_config(&self, other: &VideoPayloadConfig) -> bool {
        self.config.is_same_config(other)
    }

    fn is_fu(&self, first_byte: u8) -> bool {
        match self.config.codec {
            VideoCodec::Avc => (first_byte & 0x1F) == 28,
            VideoCodec::Hevc => ((first_byte >> 1) & 0x3F) == 49,
        }
    }

    fn fu_end_bit(&self, fragment: &[u8]) -> bool {
        match self.config.codec {
            VideoCodec::Avc => fragment.get(1).is_some_and(|b| b & 0x40 != 0),
            VideoCodec::Hevc => fragment.get(2).is_some_and(|b| b & 0x40 != 0),
        }
    }
}

impl Node for VideoPayloadDecoderNode {
    fn base(&self) -> &BaseNode {
        &self.base
    }

    fn process_data(&mut self) -> crate::Result<()> {
        let Some(desc) = self.base.input_queue().get() else { return Ok(()) };

        let Some(&first_byte) = desc.data.first() else { return Ok(()) };

        if !self.is_fu(first_byte) {
            let mut out = PacketDescriptor::new(desc.data, MediaSubtype::CompressedMedia);
            out.rtp_timestamp = desc.rtp_timestamp;
            out.video_frame_type = desc.video_frame_type;
            out.marker = desc.marker;
            self.base.send_to_rear(out);
            return Ok(());
        }

        let is_end = self.fu_end_bit(&desc.data);
        self.pending.push(desc.data.clone());
        if !is_end {
            return Ok(());
        }

        let fragments = std::mem::take(&mut self.pending);
        let nal = match self.config.codec {
            VideoCodec::Avc => video::reassemble_avc(&fragments)?,
            VideoCodec::Hevc => video::reassemble_hevc(&fragments)?,
        };
        let mut out = PacketDescriptor::new(nal, MediaSubtype::CompressedMedia);
        out.rtp_timestamp = desc.rtp_timestamp;
        out.video_frame_type = desc.video_frame_type;
        out.marker = desc.marker;
        self.base.send_to_rear(out);
        Ok(())
    }
}

pub struct TextPayloadEncoderNode {
    base: BaseNode,
    config: TextPayloadConfig,
    history: VecDeque<(u32, Bytes)>,
}

impl TextPayloadEncoderNode {
    pub fn new(name: impl Into<String>, config: TextPayloadConfig) -> Self {
        Self { base: BaseNode::new(name), config, history: VecDeque::new() }
    }

    pub fn is_same_config(&self, other: &TextPayloadConfig) -> bool {
        self.config.is_same_config(other)
    }
}

impl Node for TextPayloadEncoderNode {
    fn base(&self) -> &BaseNode {
        &self.base
    }

    fn process_data(&mut self) -> crate::Result<()> {
        let Some(desc) = self.base.input_queue().get() else { return Ok(()) };

        let payload = if let Some(red_pt) = self.config.red_payload_type {
            let redundant = self
                .history
                .iter()
                .rev()
                .take(self.config.redundancy_level as usize)
                .map(|(ts, data)| text_payload::RedBlock {
                    payload_type: red_pt,
                    timestamp_offset: desc.rtp_timestamp.wrapping_sub(*ts) & 0x3FFF,
                    data: data.clone(),
                })
                .collect();
            let packet = text_payload::RedPacket { primary_payload_type: self.config.payload_type, primary: desc.data.clone(), redundant };
            text_payload::pack(&packet)?
        } else {
            desc.data.clone()
        };

        self.history.push_back((desc.rtp_timestamp, desc.data.clone()));
        while self.history.len() > self.config.redundancy_level as usize {
            self.history.pop_front();
        }

        let mut out = PacketDescriptor::new(payload, MediaSubtype::RtpPayload);
        out.rtp_timestamp = desc.rtp_timestamp;
        self.base.send_to_rear(out);
        Ok(())
    }
}

pub struct TextPayloadDecoderNode {
    base: BaseNode,
    config: TextPayloadConfig,
}

impl TextPayloadDecoderNode {
    pub fn new(name: impl Into<String>, config: TextPayloadConfig) -> Self {
        Self { base: BaseNode::new(name), config }
    }

    pub fn is_same_config(&self, other: &TextPayloadConfig) -> bool {
        self.config.is_same_config(other)
    }
}

impl Node for TextPayloadDecoderNode {
    fn base(&self) -> &BaseNode {
        &self.base
    }

    fn process_data(&mut self) -> crate::Result<()> {
        let Some(desc) = self.base.input_queue().get() else { return Ok(()) };

        if self.config.red_payload_type.is_some() {
            let packet = text_payload::unpack(&desc.data)?;
            for block in packet.redundant {
                let mut out = PacketDescriptor::new(block.data, MediaSubtype::CompressedMedia);
                out.rtp_timestamp = desc.rtp_timestamp.wrapping_sub(block.timestamp_offset);
                out.sequence_number = desc.sequence_number;
                self.base.send_to_rear(out);
            }
            let mut primary = PacketDescriptor::new(packet.primary, MediaSubtype::CompressedMedia);
            primary.rtp_timestamp = desc.rtp_timestamp;
            primary.sequence_number = desc.sequence_number;
            self.base.send_to_rear(primary);
        } else {
            let mut out = PacketDescriptor::new(desc.data, MediaSubtype::CompressedMedia);
            out.rtp_timestamp = desc.rtp_timestamp;
            out.sequence_number = desc.sequence_number;
            self.base.send_to_rear(out);
        }
        Ok(())
    }
}

/// Drains a queued DTMF digit sequence into RFC 4733 events at a fixed
/// cadence (spec.md §4.13): marker set on the first packet of a digit,
/// end-bit on the last, which is retransmitted for `retransmit_duration`
/// past the nominal digit end for loss resilience.
pub struct DtmfEncoderNode {
    base: BaseNode,
    digits: VecDeque<(u8, Duration)>,
    frame_duration: Duration,
    retransmit_duration: Duration,
    next_tick: Instant,
    current: Option<DtmfPlayback>,
}

struct DtmfPlayback {
    event: u8,
    elapsed: Duration,
    digit_duration: Duration,
    base_timestamp: u32,
    clock_rate: u32,
    end_sent_at: Option<Duration>,
}

impl DtmfEncoderNode {
    pub fn new(name: impl Into<String>, frame_duration: Duration, retransmit_duration: Duration) -> Self {
        Self {
            base: BaseNode::new(name),
            digits: VecDeque::new(),
            frame_duration,
            retransmit_duration,
            next_tick: Instant::now(),
            current: None,
        }
    }

    pub fn queue_digit(&mut self, digit: char, duration: Duration) -> crate::Result<()> {
        let event = dtmf::event_code_for_digit(digit)?;
        self.digits.push_back((event, duration));
        Ok(())
    }

    /// A digit request arriving through the input queue: one ASCII digit
    /// byte followed by a big-endian `u32` duration in milliseconds. Lets a
    /// session enqueue digits without holding a direct handle to this node.
    fn ingest_queued_requests(&mut self) {
        while let Some(desc) = self.base.input_queue().get() {
            if desc.data.len() < 5 {
                continue;
            }
            let digit = desc.data[0] as char;
            let duration_ms = u32::from_be_bytes([desc.data[1], desc.data[2], desc.data[3], desc.data[4]]);
            if let Ok(event) = dtmf::event_code_for_digit(digit) {
                self.digits.push_back((event, Duration::from_millis(duration_ms as u64)));
            }
        }
    }

    fn start_next(&mut self, clock_rate: u32, base_timestamp: u32) {
        if let Some((event, duration)) = self.digits.pop_front() {
            self.current = Some(DtmfPlayback { event, elapsed: Duration::ZERO, digit_duration: duration, base_timestamp, clock_rate, end_sent_at: None });
        }
    }
}

impl Node for DtmfEncoderNode {
    fn base(&self) -> &BaseNode {
        &self.base
    }

    fn is_source(&self) -> bool {
        true
    }

    fn process_data(&mut self) -> crate::Result<()> {
        self.ingest_queued_requests();

        let now = Instant::now();
        if now < self.next_tick {
            return Ok(());
        }
        self.next_tick = now + self.frame_duration;

        if self.current.is_none() {
            self.start_next(8000, 0);
        }
        let Some(playback) = self.current.as_mut() else { return Ok(()) };

        let ended = playback.elapsed >= playback.digit_duration;
        if ended {
            let sent_so_far = playback.end_sent_at.unwrap_or(Duration::ZERO);
            if sent_so_far >= self.retransmit_duration {
                self.current = None;
                return Ok(());
            }
            playback.end_sent_at = Some(sent_so_far + self.frame_duration);
        }

        let duration_units = ((playback.elapsed.as_secs_f64() * playback.clock_rate as f64) as u32).min(0xFFFF);
        let event = dtmf::DtmfEvent { event: playback.event, end: ended, volume: 0, duration: duration_units as u16 };
        let mut out = PacketDescriptor::new(dtmf::pack(event), MediaSubtype::DtmfEvent);
        out.rtp_timestamp = playback.base_timestamp;
        out.marker = playback.elapsed == Duration::ZERO;
        self.base.send_to_rear(out);

        if !ended {
            playback.elapsed += self.frame_duration;
        }
        Ok(())
    }
}

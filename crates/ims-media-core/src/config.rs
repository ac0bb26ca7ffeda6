//! Configuration value objects (spec.md §1 "out of scope... configuration
//! value-object classes are pure data holders", §8 "AmrParams, EvsParams,
//! RtcpConfig, AudioConfig, TextConfig"). Plain `Clone + Debug + PartialEq`
//! structs with telephony-sane `Default`s, matching the style of
//! `ims_rtp_core::session::RtpSessionConfig` and
//! `ims_rtp_core::analyser::AnalyserConfig`.

use std::time::Duration;

/// Codec-level identity carried by an [`AudioPayloadConfig`]. The native
/// codec implementation itself (the actual AMR/EVS compressor) is an
/// external collaborator per spec.md §1; this only selects which RTP
/// payload packetizer (C13) to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
    Amr,
    AmrWb,
    Evs,
    Pcmu,
    Pcma,
}

/// AMR/AMR-WB/EVS RTP payload format parameters (RFC 4867, 3GPP TS 26.445
/// Annex A). Round-trips by value per spec.md §8.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioPayloadConfig {
    pub codec: AudioCodec,
    pub payload_type: u8,
    pub dtmf_payload_type: Option<u8>,
    pub sampling_rate_hz: u32,
    /// RFC 4867 §4.3 vs §4.4: octet-aligned mode pads ToC/CMR to byte
    /// boundaries; bandwidth-efficient mode bit-packs them. Mirrored on
    /// encoder and decoder — the negotiation source of truth is this
    /// config (spec.md §9 Design Notes: no auto-detection).
    pub octet_aligned: bool,
    pub ptime_ms: u32,
    pub max_ptime_ms: u32,
    /// EVS-only: header-full mode vs compact mode (3GPP TS 26.445 Annex A).
    pub evs_header_full: bool,
    /// EVS channel-aware mode offset (0 = disabled).
    pub evs_channel_aware_offset: u8,
}

impl Default for AudioPayloadConfig {
    fn default() -> Self {
        Self {
            codec: AudioCodec::Amr,
            payload_type: 96,
            dtmf_payload_type: Some(101),
            sampling_rate_hz: 8000,
            octet_aligned: true,
            ptime_ms: 20,
            max_ptime_ms: 20,
            evs_header_full: false,
            evs_channel_aware_offset: 0,
        }
    }
}

impl AudioPayloadConfig {
    /// C13: "Enforce `isSameConfig` on: codec, octet-aligned, ptime,
    /// bandwidth, EVS header mode, channel-aware offset."
    pub fn is_same_config(&self, other: &Self) -> bool {
        self.codec == other.codec
            && self.octet_aligned == other.octet_aligned
            && self.ptime_ms == other.ptime_ms
            && self.sampling_rate_hz == other.sampling_rate_hz
            && self.evs_header_full == other.evs_header_full
            && self.evs_channel_aware_offset == other.evs_channel_aware_offset
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    Avc,
    Hevc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoPayloadConfig {
    pub codec: VideoCodec,
    pub payload_type: u8,
    pub mtu: usize,
    /// 3GPP TS 26.114 §6.2.3 Coordination of Video Orientation.
    pub cvo_extension_id: Option<u8>,
}

impl Default for VideoPayloadConfig {
    fn default() -> Self {
        Self { codec: VideoCodec::Avc, payload_type: 99, mtu: 1400, cvo_extension_id: None }
    }
}

impl VideoPayloadConfig {
    pub fn is_same_config(&self, other: &Self) -> bool {
        self.codec == other.codec && self.mtu == other.mtu
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextPayloadConfig {
    pub payload_type: u8,
    /// RFC 2198 redundant payload type; `None` disables RED.
    pub red_payload_type: Option<u8>,
    pub redundancy_level: u8,
}

impl Default for TextPayloadConfig {
    fn default() -> Self {
        Self { payload_type: 100, red_payload_type: Some(102), redundancy_level: 1 }
    }
}

impl TextPayloadConfig {
    pub fn is_same_config(&self, other: &Self) -> bool {
        self.payload_type == other.payload_type && self.red_payload_type == other.red_payload_type
    }
}

/// RFC 3611 XR block types this session is configured to exchange,
/// enumerated as a bitfield per spec.md §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RtcpXrBlocks {
    pub loss_rle: bool,
    pub duplicate_rle: bool,
    pub receipt_times: bool,
    pub receiver_reference_time: bool,
    pub dlrr: bool,
    pub statistics_summary: bool,
    pub voip_metrics: bool,
}

/// RTCP scheduling/feature configuration, mirroring the "configuration
/// value-object" `RtcpConfig` named in spec.md §8.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RtcpConfig {
    pub canonical_name_hash: u32,
    /// Fraction of the session's overall bandwidth (bytes/sec) set aside
    /// for RTCP (RFC 3550 §6.2 `rtcp_bw`).
    pub rtcp_bandwidth_bytes_per_sec: f64,
    pub xr_blocks: RtcpXrBlocks,
    pub terminal_number: u8,
}

impl Default for RtcpConfig {
    fn default() -> Self {
        Self {
            canonical_name_hash: 0,
            rtcp_bandwidth_bytes_per_sec: 4000.0,
            xr_blocks: RtcpXrBlocks::default(),
            terminal_number: 0,
        }
    }
}

/// Audio jitter-buffer sizing and adaptation knobs (C9), expressed in
/// packet intervals the way `BaseJitterBuffer::SetJitterBufferSize` and
/// `AudioJitterBuffer::SetJitterOptions` do in the original source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JitterBufferConfig {
    pub init_depth: u32,
    pub min_depth: u32,
    pub max_depth: u32,
    pub reduce_threshold: u32,
    pub step_size: u32,
    pub z_value: f64,
    /// SID (DTX comfort-noise) frames don't count against depth but still
    /// advance the playout timestamp.
    pub ignore_sid_packets: bool,
    /// Every N successful `Get`s, re-consult the analyser for a new target
    /// depth (never mid-talk-spurt).
    pub check_update_packet_count: u32,
    pub good_cooldown: Duration,
    pub frame_duration_ms: u32,
    pub clock_rate: u32,
}

impl Default for JitterBufferConfig {
    fn default() -> Self {
        Self {
            init_depth: 4,
            min_depth: 2,
            max_depth: 20,
            reduce_threshold: 2,
            step_size: 1,
            z_value: 3.0,
            ignore_sid_packets: true,
            check_update_packet_count: 50,
            good_cooldown: Duration::from_secs(2),
            frame_duration_ms: 20,
            clock_rate: 8000,
        }
    }
}

impl JitterBufferConfig {
    /// `setJitterOptions` on the base jitter buffer is a no-op in the
    /// original source; only the audio buffer honours it (spec.md §9 Open
    /// Questions). We keep that asymmetry: this setter only exists on the
    /// audio-specific config, not on a shared base type.
    pub fn with_options(mut self, reduce_threshold: u32, step_size: u32, z_value: f64, ignore_sid: bool) -> Self {
        self.reduce_threshold = reduce_threshold;
        self.step_size = step_size;
        self.z_value = z_value;
        self.ignore_sid_packets = ignore_sid;
        self
    }
}

/// Video jitter-buffer loss-monitoring window (C10).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoJitterBufferConfig {
    pub loss_monitor_window: Duration,
    pub loss_rate_threshold_percent: f32,
    pub nack_enabled: bool,
}

impl Default for VideoJitterBufferConfig {
    fn default() -> Self {
        Self {
            loss_monitor_window: Duration::from_secs(5),
            loss_rate_threshold_percent: 5.0,
            nack_enabled: true,
        }
    }
}

/// Text jitter-buffer gap tolerance (C10): how long to wait for a missing
/// sequence number to show up as a RED redundant copy before giving up and
/// skipping ahead (T.140 has no retransmission of its own).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextJitterBufferConfig {
    pub max_wait_packets: u32,
}

impl Default for TextJitterBufferConfig {
    fn default() -> Self {
        Self { max_wait_packets: 3 }
    }
}

/// Media-quality threshold record a session hands to decoder/receiver
/// nodes so they know when to raise `onMediaQualityStatus` (spec.md §4.15).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaQualityThreshold {
    pub rtp_inactivity_timeout: Duration,
    pub rtcp_inactivity_timeout: Duration,
    pub packet_loss_window: Duration,
    pub packet_loss_threshold_percent: f32,
    pub jitter_threshold_ms: u32,
    /// Minimum time between repeated notifications of the same condition,
    /// to suppress flapping.
    pub hysteresis: Duration,
}

impl Default for MediaQualityThreshold {
    fn default() -> Self {
        Self {
            rtp_inactivity_timeout: Duration::from_secs(30),
            rtcp_inactivity_timeout: Duration::from_secs(30),
            packet_loss_window: Duration::from_secs(5),
            packet_loss_threshold_percent: 5.0,
            jitter_threshold_ms: 100,
            hysteresis: Duration::from_secs(3),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_payload_config_same_config_ignores_payload_type() {
        let mut a = AudioPayloadConfig::default();
        let mut b = AudioPayloadConfig::default();
        a.payload_type = 96;
        b.payload_type = 97;
        assert!(a.is_same_config(&b));

        b.octet_aligned = !a.octet_aligned;
        assert!(!a.is_same_config(&b));
    }

    #[test]
    fn default_jitter_buffer_config_is_within_its_own_bounds() {
        let cfg = JitterBufferConfig::default();
        assert!(cfg.min_depth <= cfg.init_depth);
        assert!(cfg.init_depth <= cfg.max_depth);
    }
}

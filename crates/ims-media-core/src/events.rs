//! Event/status vocabulary the data path reports through instead of
//! throwing (spec.md §7 "data-path errors never throw; they flow out as
//! event notifications on the session callback").

use std::time::Duration;

use ims_rtp_core::RtpSsrc;

/// Per-packet receive disposition a jitter buffer assigns on delivery,
/// consumed by the media-quality reporter (spec.md §4.9 "Collection").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtpPacketStatus {
    Normal,
    /// Purged by a resync or evicted for a full buffer.
    Discarded,
    /// Playout tick had no data yet.
    NotReceived,
    /// Delivered out of its expected playout order.
    Late,
    Duplicated,
}

/// Which watchdog timer fired (spec.md §4.15, §7 "Watchdog errors").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InactivityTimerKind {
    Rtp,
    Rtcp,
}

/// What the local sender/encoder should do in response to inbound RTCP
/// feedback (spec.md §4.7 "dispatched to the local sender/encoder via the
/// session callback").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackRequest {
    RequestVideoIdrFrame,
    RequestVideoBitrateChange { kbps: u32 },
    RequestAudioCmr { mode: u8 },
}

/// Notifications a session/node emits on the session callback. Mirrors the
/// parcel surface in spec.md §6 (`onMediaQualityStatusChanged`,
/// `onCallQualityChanged`, `onTriggerAnbrQuery`, ...) plus the data-path
/// escalations from §7.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    /// `kImsMediaEventNotifyError`: persistent decode failure or similar
    /// protocol-layer escalation that doesn't by itself justify tearing
    /// down the session.
    NotifyError { reason: String },
    /// `kImsMediaEventPacketLoss`: loss rate over the monitored window
    /// crossed the configured threshold.
    PacketLoss { ssrc: RtpSsrc, loss_rate_percent: f32 },
    /// `kImsMediaEventMediaInactivity`: RTP or RTCP inactivity timer
    /// elapsed. Policy (whether to tear the session down) belongs to the
    /// signalling layer above, so this is advisory only.
    MediaInactivity { timer: InactivityTimerKind, elapsed: Duration },
    /// Feedback-driven request to the local encoder/sender.
    Feedback(FeedbackRequest),
    /// `onMediaQualityStatusChanged`: aggregate threshold crossing.
    MediaQualityStatusChanged { rtp_inactivity: bool, rtcp_inactivity: bool, packet_loss: bool, jitter: bool },
    /// `onHeaderExtensionReceived`.
    HeaderExtensionReceived { id: u8, data: bytes::Bytes },
    /// `kRtpStatusDiscarded` and friends counted into per-SSRC stats,
    /// surfaced for observability without a dedicated escalation.
    PacketStatus { ssrc: RtpSsrc, status: RtpPacketStatus },
}

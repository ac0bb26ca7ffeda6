//! # ims-media-core
//!
//! The media-plane engine for an IMS real-time communication stack:
//! jitter buffers, the payload codec layer (AMR/AMR-WB/EVS, AVC/HEVC,
//! T.140/RED, RFC 4733 DTMF), the cooperative pipeline scheduler that
//! strings them together into a stream graph, and the session state
//! machine a signalling layer drives through `open`/`modify`/`close`.
//!
//! `ims-rtp-core` owns the wire-level RTP/RTCP protocol engine this crate
//! builds on; native audio/video codecs themselves are external
//! collaborators this crate never implements (see `config::AudioCodec`'s
//! docs).

pub mod config;
pub mod descriptor;
pub mod error;
pub mod events;
pub mod graph;
pub mod jitter;
pub mod node;
pub mod nodes;
pub mod payload;
pub mod scheduler;
pub mod session;

pub use error::{Error, Result};

/// Commonly paired imports for code that assembles and drives a session.
pub mod prelude {
    pub use crate::config::{
        AudioCodec, AudioPayloadConfig, JitterBufferConfig, MediaQualityThreshold, RtcpConfig, TextJitterBufferConfig, TextPayloadConfig,
        VideoCodec, VideoJitterBufferConfig, VideoPayloadConfig,
    };
    pub use crate::descriptor::{MediaSubtype, PacketDescriptor, VideoFrameType};
    pub use crate::error::{Error, Result};
    pub use crate::events::{FeedbackRequest, InactivityTimerKind, MediaEvent, RtpPacketStatus};
    pub use crate::session::{MediaLegConfig, MediaSocketPair, Parcel, Session, SessionConfig, SessionManager, SessionSockets, SessionState};
}

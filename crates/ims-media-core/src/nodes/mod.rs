//! Concrete pipeline nodes (spec.md §4.13 / C13): the socket boundary, the
//! RTP/RTCP codecs, and jitter-buffer/payload wrappers, each implementing
//! [`crate::node::Node`] so a [`crate::scheduler::StreamScheduler`] can
//! drive them.

pub mod media;
pub mod payload_codec;
pub mod rtcp_codec;
pub mod rtp_codec;
pub mod socket_io;

pub use media::{AudioJitterBufferNode, TextJitterBufferNode, VideoJitterBufferNode};
pub use payload_codec::{
    AudioPayloadDecoderNode, AudioPayloadEncoderNode, DtmfEncoderNode, TextPayloadDecoderNode, TextPayloadEncoderNode,
    VideoPayloadDecoderNode, VideoPayloadEncoderNode,
};
pub use rtcp_codec::{RtcpReceiverNode, RtcpSenderNode};
pub use rtp_codec::{RtpDecoderNode, RtpEncoderNode};
pub use socket_io::{SocketReader, SocketWriterNode};

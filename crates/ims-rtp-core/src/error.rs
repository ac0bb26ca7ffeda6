//! Error types for the RTP/RTCP protocol engine.

use thiserror::Error;

/// Result type alias used throughout `ims-rtp-core`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by packet codecs, the RTP session, and the socket layer.
#[derive(Error, Debug)]
pub enum Error {
    /// An input buffer did not contain enough bytes for the field being read.
    #[error("buffer too small: required {required} bytes, have {available}")]
    BufferTooSmall { required: usize, available: usize },

    /// A parameter supplied by the caller was invalid.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// RTP header/payload could not be parsed or violates RFC 3550 §5.
    #[error("RTP decode error: {0}")]
    RtpDecodeError(String),

    /// An RTCP packet could not be parsed or violates RFC 3550 §6 / RFC 3611.
    #[error("RTCP error: {0}")]
    RtcpError(String),

    /// The fully-formed packet would exceed the configured MTU.
    #[error("packet of {size} bytes exceeds configured MTU of {mtu} bytes")]
    MtuExceeded { size: usize, mtu: usize },

    /// Per-session or scheduling state error (e.g. scheduler not running).
    #[error("session error: {0}")]
    SessionError(String),

    /// Our own SSRC was observed arriving from another transport address.
    #[error("SSRC collision on {ssrc:#010x}")]
    SsrcCollision { ssrc: u32 },

    /// A BYE was received for the source being queried.
    #[error("BYE received for SSRC {ssrc:#010x}")]
    ByeReceived { ssrc: u32 },

    /// Socket-layer failure (bind, send, receive).
    #[error("socket error: {0}")]
    SocketError(String),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    pub fn rtcp(msg: impl Into<String>) -> Self {
        Self::RtcpError(msg.into())
    }

    pub fn rtp_decode(msg: impl Into<String>) -> Self {
        Self::RtpDecodeError(msg.into())
    }

    pub fn session(msg: impl Into<String>) -> Self {
        Self::SessionError(msg.into())
    }

    /// Data-path protocol errors (malformed packets, bad SSRC state) are
    /// never fatal to the session — they are dropped and counted.
    pub fn is_data_path_recoverable(&self) -> bool {
        matches!(
            self,
            Self::BufferTooSmall { .. } | Self::RtpDecodeError(_) | Self::RtcpError(_)
        )
    }
}

//! Error types for jitter buffers, the pipeline scheduler, and session
//! management.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The underlying RTP/RTCP protocol engine returned an error.
    #[error(transparent)]
    Rtp(#[from] ims_rtp_core::Error),

    /// A jitter buffer operation failed (resync, malformed descriptor).
    #[error("jitter buffer error: {0}")]
    JitterBuffer(String),

    /// A payload codec could not encode/decode the given frame.
    #[error("payload codec error: {0}")]
    Payload(String),

    /// A pipeline node rejected a lifecycle transition (start/stop) or a
    /// config update it could not apply in place.
    #[error("pipeline node error: {0}")]
    Node(String),

    /// Session state machine violation (e.g. modify on a closed session).
    #[error("session error: {0}")]
    Session(String),

    /// No session exists for the given identifier.
    #[error("unknown session id {0}")]
    UnknownSession(u64),
}

impl Error {
    pub fn jitter(msg: impl Into<String>) -> Self {
        Self::JitterBuffer(msg.into())
    }

    pub fn payload(msg: impl Into<String>) -> Self {
        Self::Payload(msg.into())
    }

    pub fn node(msg: impl Into<String>) -> Self {
        Self::Node(msg.into())
    }

    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }
}

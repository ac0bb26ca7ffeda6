//! Per-call session state machine, manager, and parcel dispatch (spec.md
//! §4.15 / C15). Each media type in a call negotiates its own RTP session
//! (its own SSRC/sequence-number space, clock rate, and RTP+RTCP port
//! pair, mirroring one SDP `m=` line), so a [`Session`] owns up to three
//! independent legs (audio/video/text), each with its own
//! `ims_rtp_core::session::RtpSession`, `RtcpScheduler` and stream graphs,
//! all driven by one shared [`StreamScheduler`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::warn;

use ims_rtp_core::queue::DataQueue;
use ims_rtp_core::session::{RtcpScheduler, RtpSession, RtpSessionConfig};
use ims_rtp_core::socket::RtpSocket;

use crate::config::{AudioPayloadConfig, JitterBufferConfig, MediaQualityThreshold, RtcpConfig, TextJitterBufferConfig, TextPayloadConfig, VideoJitterBufferConfig, VideoPayloadConfig};
use crate::error::{Error, Result};
use crate::events::MediaEvent;
use crate::graph::{AudioRxGraph, AudioTxGraph, RtcpGraph, TextRxGraph, TextTxGraph, VideoRxGraph, VideoTxGraph};
use crate::jitter::{AudioJitterBuffer, TextJitterBuffer, VideoJitterBuffer};
use crate::scheduler::StreamScheduler;

/// spec.md §4.15 state machine: `closed --open--> opened --modify(active)-->
/// active`, `opened/active --modify(inactive)--> suspended`, `any --close-->
/// closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Opened,
    Active,
    Suspended,
}

/// An IPC message in or out of the core, opaque beyond its tag (spec.md
/// §4.15 "messages arrive as IPC parcels... treated as tag + payload").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parcel {
    pub tag: u32,
    pub payload: Vec<u8>,
}

/// Tag for a DTMF-digit parcel: `payload[0]` is the ASCII digit,
/// `payload[1..5]` the duration in milliseconds (big-endian).
pub const PARCEL_TAG_DTMF_DIGIT: u32 = 1;

/// One SDP `m=` line's worth of negotiated state: remote endpoint, the
/// clock rate its RTP timestamps run on, RTCP scheduling parameters, and
/// the media-specific payload format.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaLegConfig<Payload> {
    pub remote_rtp: SocketAddr,
    pub remote_rtcp: SocketAddr,
    pub clock_rate: u32,
    pub rtcp: RtcpConfig,
    pub payload: Payload,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub audio: Option<MediaLegConfig<AudioPayloadConfig>>,
    pub video: Option<MediaLegConfig<VideoPayloadConfig>>,
    pub text: Option<MediaLegConfig<TextPayloadConfig>>,
    pub quality: MediaQualityThreshold,
    /// `false` moves (or keeps) the session in `suspended` rather than
    /// `active` once opened, per spec.md §4.15 "modify(inactive cfg)".
    pub active: bool,
}

/// The bound RTP/RTCP socket pair for one media leg. Separate from
/// [`SessionConfig`] since binding is async and happens one layer up, so
/// the state machine here stays synchronous.
pub struct MediaSocketPair {
    pub rtp: Arc<RtpSocket>,
    pub rtcp: Arc<RtpSocket>,
}

#[derive(Default)]
pub struct SessionSockets {
    pub audio: Option<MediaSocketPair>,
    pub video: Option<MediaSocketPair>,
    pub text: Option<MediaSocketPair>,
}

#[derive(Default)]
struct QualityHysteresis {
    last_status: Option<(bool, bool, bool, bool)>,
    last_notified_at: Option<Instant>,
}

impl QualityHysteresis {
    /// Returns `Some` only on a genuine state change that isn't being
    /// suppressed by `hysteresis` (spec.md §4.15 "hysteresis time...to
    /// suppress flapping").
    fn evaluate(&mut self, status: (bool, bool, bool, bool), hysteresis: Duration) -> Option<(bool, bool, bool, bool)> {
        let now = Instant::now();
        let changed = self.last_status != Some(status);
        let cooled_down = self.last_notified_at.map_or(true, |t| now.duration_since(t) >= hysteresis);
        if changed && cooled_down {
            self.last_status = Some(status);
            self.last_notified_at = Some(now);
            Some(status)
        } else {
            None
        }
    }
}

struct AudioLeg {
    tx: AudioTxGraph,
    rx: AudioRxGraph,
    rtcp: RtcpGraph,
}

impl AudioLeg {
    fn teardown(&self) {
        self.tx.teardown();
        self.rx.teardown();
        self.rtcp.teardown();
    }
}

struct VideoLeg {
    tx: VideoTxGraph,
    rx: VideoRxGraph,
    rtcp: RtcpGraph,
}

impl VideoLeg {
    fn teardown(&self) {
        self.tx.teardown();
        self.rx.teardown();
        self.rtcp.teardown();
    }
}

struct TextLeg {
    tx: TextTxGraph,
    rx: TextRxGraph,
    rtcp: RtcpGraph,
}

impl TextLeg {
    fn teardown(&self) {
        self.tx.teardown();
        self.rx.teardown();
        self.rtcp.teardown();
    }
}

#[derive(Default)]
struct Graphs {
    audio: Option<AudioLeg>,
    video: Option<VideoLeg>,
    text: Option<TextLeg>,
}

impl Graphs {
    fn teardown_all(&mut self) {
        if let Some(leg) = self.audio.take() {
            leg.teardown();
        }
        if let Some(leg) = self.video.take() {
            leg.teardown();
        }
        if let Some(leg) = self.text.take() {
            leg.teardown();
        }
    }
}

pub struct Session {
    id: u64,
    cname: String,
    state: Mutex<SessionState>,
    config: Mutex<Option<SessionConfig>>,
    scheduler: Arc<StreamScheduler>,
    graphs: Mutex<Graphs>,
    events: Arc<DataQueue<MediaEvent>>,
    quality: Mutex<QualityHysteresis>,
}

impl Session {
    fn new(id: u64, cname: impl Into<String>) -> Self {
        Self {
            id,
            cname: cname.into(),
            state: Mutex::new(SessionState::Closed),
            config: Mutex::new(None),
            scheduler: Arc::new(StreamScheduler::new()),
            graphs: Mutex::new(Graphs::default()),
            events: Arc::new(DataQueue::new()),
            quality: Mutex::new(QualityHysteresis::default()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// `closed --open--> opened|active`.
    pub fn open(&self, config: SessionConfig, sockets: SessionSockets) -> Result<()> {
        let mut state = self.state.lock();
        if *state != SessionState::Closed {
            return Err(Error::session(format!("open() called on a session in state {state:?}")));
        }

        self.apply_config(None, &config, sockets);
        self.scheduler.start()?;
        *state = if config.active { SessionState::Active } else { SessionState::Opened };
        *self.config.lock() = Some(config);
        Ok(())
    }

    /// Applies a new config one media leg at a time: a leg whose remote
    /// endpoint changed, was added, was removed, or whose payload config
    /// isn't `is_same_config` to what's running gets torn down and
    /// rebuilt; everything else is left untouched (spec.md §4.15: "apply
    /// in place when `isSameGraph`/`isSameConfig`, else teardown and
    /// recreate").
    pub fn modify(&self, new_config: SessionConfig, sockets: SessionSockets) -> Result<()> {
        let mut state = self.state.lock();
        if *state == SessionState::Closed {
            return Err(Error::session("modify() called on a closed session"));
        }

        let old_config = self.config.lock().clone();
        self.apply_config(old_config.as_ref(), &new_config, sockets);

        *state = if new_config.active { SessionState::Active } else { SessionState::Suspended };
        *self.config.lock() = Some(new_config);
        Ok(())
    }

    fn leg_changed<P: Copy>(old: Option<&MediaLegConfig<P>>, new: Option<&MediaLegConfig<P>>, same_payload: impl Fn(&P, &P) -> bool) -> bool {
        match (old, new) {
            (None, None) => false,
            (Some(_), None) | (None, Some(_)) => true,
            (Some(o), Some(n)) => o.remote_rtp != n.remote_rtp || o.remote_rtcp != n.remote_rtcp || !same_payload(&o.payload, &n.payload),
        }
    }

    fn apply_config(&self, old: Option<&SessionConfig>, new_config: &SessionConfig, sockets: SessionSockets) {
        let mut graphs = self.graphs.lock();

        if Self::leg_changed(old.and_then(|c| c.audio.as_ref()), new_config.audio.as_ref(), AudioPayloadConfig::is_same_config) {
            if let Some(leg) = graphs.audio.take() {
                leg.teardown();
            }
            if let (Some(leg_cfg), Some(leg_sockets)) = (&new_config.audio, &sockets.audio) {
                graphs.audio = Some(Self::build_audio_leg(&self.scheduler, &self.cname, &self.events, leg_cfg, leg_sockets));
            }
        }

        if Self::leg_changed(old.and_then(|c| c.video.as_ref()), new_config.video.as_ref(), VideoPayloadConfig::is_same_config) {
            if let Some(leg) = graphs.video.take() {
                leg.teardown();
            }
            if let (Some(leg_cfg), Some(leg_sockets)) = (&new_config.video, &sockets.video) {
                graphs.video = Some(Self::build_video_leg(&self.scheduler, &self.cname, &self.events, leg_cfg, leg_sockets));
            }
        }

        if Self::leg_changed(old.and_then(|c| c.text.as_ref()), new_config.text.as_ref(), TextPayloadConfig::is_same_config) {
            if let Some(leg) = graphs.text.take() {
                leg.teardown();
            }
            if let (Some(leg_cfg), Some(leg_sockets)) = (&new_config.text, &sockets.text) {
                graphs.text = Some(Self::build_text_leg(&self.scheduler, &self.cname, &self.events, leg_cfg, leg_sockets));
            }
        }
    }

    fn build_audio_leg(scheduler: &Arc<StreamScheduler>, cname: &str, events: &Arc<DataQueue<MediaEvent>>, leg: &MediaLegConfig<AudioPayloadConfig>, sockets: &MediaSocketPair) -> AudioLeg {
        let rtp_session = Arc::new(Mutex::new(RtpSession::new(RtpSessionConfig { clock_rate: leg.clock_rate, mtu: 1400, terminal_number: leg.rtcp.terminal_number })));
        let local_ssrc = rtp_session.lock().local_ssrc();
        let rtcp_scheduler = Arc::new(Mutex::new(RtcpScheduler::new(leg.rtcp.rtcp_bandwidth_bytes_per_sec)));

        let rtcp = RtcpGraph::new(scheduler.clone(), sockets.rtcp.clone(), leg.remote_rtcp, rtp_session.clone(), rtcp_scheduler, cname.to_string(), 1400, events.clone());
        rtcp.start();

        let tx = AudioTxGraph::new(scheduler.clone(), sockets.rtp.clone(), leg.remote_rtp, rtp_session.clone(), leg.payload, Duration::from_millis(20), Duration::from_millis(100));

        let jitter = AudioJitterBuffer::new(JitterBufferConfig { clock_rate: leg.clock_rate, ..Default::default() });
        let rx = AudioRxGraph::new(
            scheduler.clone(),
            sockets.rtp.clone(),
            leg.remote_rtp,
            rtp_session,
            leg.clock_rate,
            leg.payload,
            jitter,
            Duration::from_millis(leg.payload.ptime_ms as u64),
            events.clone(),
            local_ssrc,
        );
        rx.start();

        AudioLeg { tx, rx, rtcp }
    }

    fn build_video_leg(scheduler: &Arc<StreamScheduler>, cname: &str, events: &Arc<DataQueue<MediaEvent>>, leg: &MediaLegConfig<VideoPayloadConfig>, sockets: &MediaSocketPair) -> VideoLeg {
        let rtp_session = Arc::new(Mutex::new(RtpSession::new(RtpSessionConfig { clock_rate: leg.clock_rate, mtu: leg.payload.mtu, terminal_number: leg.rtcp.terminal_number })));
        let local_ssrc = rtp_session.lock().local_ssrc();
        let rtcp_scheduler = Arc::new(Mutex::new(RtcpScheduler::new(leg.rtcp.rtcp_bandwidth_bytes_per_sec)));

        let rtcp = RtcpGraph::new(scheduler.clone(), sockets.rtcp.clone(), leg.remote_rtcp, rtp_session.clone(), rtcp_scheduler, cname.to_string(), leg.payload.mtu, events.clone());
        rtcp.start();

        let tx = VideoTxGraph::new(scheduler.clone(), sockets.rtp.clone(), leg.remote_rtp, rtp_session.clone(), leg.payload);

        let jitter = VideoJitterBuffer::new(VideoJitterBufferConfig::default());
        let rx = VideoRxGraph::new(scheduler.clone(), sockets.rtp.clone(), leg.remote_rtp, rtp_session, leg.clock_rate, leg.payload, jitter, events.clone(), local_ssrc);
        rx.start();

        VideoLeg { tx, rx, rtcp }
    }

    fn build_text_leg(scheduler: &Arc<StreamScheduler>, cname: &str, events: &Arc<DataQueue<MediaEvent>>, leg: &MediaLegConfig<TextPayloadConfig>, sockets: &MediaSocketPair) -> TextLeg {
        let rtp_session = Arc::new(Mutex::new(RtpSession::new(RtpSessionConfig { clock_rate: leg.clock_rate, mtu: 1400, terminal_number: leg.rtcp.terminal_number })));
        let rtcp_scheduler = Arc::new(Mutex::new(RtcpScheduler::new(leg.rtcp.rtcp_bandwidth_bytes_per_sec)));

        let rtcp = RtcpGraph::new(scheduler.clone(), sockets.rtcp.clone(), leg.remote_rtcp, rtp_session.clone(), rtcp_scheduler, cname.to_string(), 1400, events.clone());
        rtcp.start();

        let tx = TextTxGraph::new(scheduler.clone(), sockets.rtp.clone(), leg.remote_rtp, rtp_session.clone(), leg.payload);

        let jitter = TextJitterBuffer::new(TextJitterBufferConfig::default());
        let rx = TextRxGraph::new(scheduler.clone(), sockets.rtp.clone(), leg.remote_rtp, rtp_session, leg.clock_rate, leg.payload, jitter, events.clone());
        rx.start();

        TextLeg { tx, rx, rtcp }
    }

    /// `any --close--> closed`.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.graphs.lock().teardown_all();
        let scheduler = self.scheduler.clone();
        tokio::spawn(async move { scheduler.stop().await });
        *self.config.lock() = None;
        *state = SessionState::Closed;
        Ok(())
    }

    /// Entry point for the request-handler thread (spec.md §4.15, §5).
    pub fn dispatch_parcel(&self, parcel: Parcel) -> Result<()> {
        match parcel.tag {
            PARCEL_TAG_DTMF_DIGIT => {
                if parcel.payload.len() < 5 {
                    return Err(Error::session("DTMF parcel shorter than 5 bytes"));
                }
                let graphs = self.graphs.lock();
                let Some(audio) = graphs.audio.as_ref() else {
                    return Err(Error::session("DTMF digit requested but no audio leg is open"));
                };
                audio.tx.dtmf_input.add(crate::descriptor::PacketDescriptor::new(
                    bytes::Bytes::copy_from_slice(&parcel.payload[..5]),
                    crate::descriptor::MediaSubtype::DtmfEvent,
                ));
                Ok(())
            }
            other => {
                warn!(session = self.id, tag = other, "ignoring parcel with unrecognized tag");
                Ok(())
            }
        }
    }

    /// Drains everything escalated to the response-handler thread so far
    /// (spec.md §5 "response-handler thread... dispatches stack events
    /// out").
    pub fn drain_events(&self) -> Vec<MediaEvent> {
        let mut out = Vec::new();
        while let Some(ev) = self.events.get() {
            out.push(ev);
        }
        out
    }

    /// Folds a fresh quality sample into the hysteresis state and returns
    /// an `onMediaQualityStatus`-equivalent event if this crossing is worth
    /// reporting (spec.md §4.15).
    pub fn evaluate_quality(
        &self,
        rtp_silent_for: Duration,
        rtcp_silent_for: Duration,
        packet_loss_percent: f32,
        jitter_ms: u32,
    ) -> Option<MediaEvent> {
        let config = self.config.lock().clone()?;
        let t = config.quality;
        let status = (
            rtp_silent_for >= t.rtp_inactivity_timeout,
            rtcp_silent_for >= t.rtcp_inactivity_timeout,
            packet_loss_percent >= t.packet_loss_threshold_percent,
            jitter_ms >= t.jitter_threshold_ms,
        );
        let (rtp_inactivity, rtcp_inactivity, packet_loss, jitter) = self.quality.lock().evaluate(status, t.hysteresis)?;
        Some(MediaEvent::MediaQualityStatusChanged { rtp_inactivity, rtcp_inactivity, packet_loss, jitter })
    }
}

/// Owns the `sessionId -> Session` map (spec.md §4.15 "per-media
/// manager").
pub struct SessionManager {
    sessions: Mutex<HashMap<u64, Arc<Session>>>,
    next_id: AtomicU64,
}

impl SessionManager {
    pub fn new() -> Self {
        Self { sessions: Mutex::new(HashMap::new()), next_id: AtomicU64::new(1) }
    }

    pub fn create_session(&self, cname: impl Into<String>) -> Arc<Session> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let session = Arc::new(Session::new(id, cname));
        self.sessions.lock().insert(id, session.clone());
        session
    }

    pub fn get(&self, id: u64) -> Option<Arc<Session>> {
        self.sessions.lock().get(&id).cloned()
    }

    pub fn close_session(&self, id: u64) -> Result<()> {
        let session = self.sessions.lock().remove(&id).ok_or(Error::UnknownSession(id))?;
        session.close()
    }

    pub fn dispatch_parcel(&self, session_id: u64, parcel: Parcel) -> Result<()> {
        let session = self.get(session_id).ok_or(Error::UnknownSession(session_id))?;
        session.dispatch_parcel(parcel)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns the request-handler thread: an IPC parcel queue drained on its
/// own task so dispatch never runs on the caller's (signalling) thread
/// (spec.md §5 "strict separation to avoid reentrancy between client
/// callback and stack").
pub fn spawn_request_handler(manager: Arc<SessionManager>) -> (tokio::sync::mpsc::UnboundedSender<(u64, Parcel)>, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<(u64, Parcel)>();
    let handle = tokio::spawn(async move {
        while let Some((session_id, parcel)) = rx.recv().await {
            if let Err(err) = manager.dispatch_parcel(session_id, parcel) {
                warn!(session_id, error = %err, "parcel dispatch failed");
            }
        }
    });
    (tx, handle)
}

/// Spawns the response-handler thread: polls a session's event queue and
/// forwards each entry to `on_event`, kept off the request-handler task so
/// a slow callback can't delay parcel dispatch.
pub fn spawn_response_handler<F>(session: Arc<Session>, mut on_event: F) -> tokio::task::JoinHandle<()>
where
    F: FnMut(MediaEvent) + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            for ev in session.drain_events() {
                on_event(ev);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_hysteresis_suppresses_repeated_notifications() {
        let mut h = QualityHysteresis::default();
        let hysteresis = Duration::from_secs(3);
        let bad = (true, false, false, false);

        assert_eq!(h.evaluate(bad, hysteresis), Some(bad));
        // Same status again, immediately: suppressed.
        assert_eq!(h.evaluate(bad, hysteresis), None);
    }

    #[test]
    fn new_session_starts_closed() {
        let manager = SessionManager::new();
        let session = manager.create_session("test@example.com");
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn leg_changed_ignores_non_structural_payload_differences() {
        let mut a = AudioPayloadConfig::default();
        a.payload_type = 96;
        let mut b = a;
        b.payload_type = 97;

        let remote: SocketAddr = "127.0.0.1:10000".parse().unwrap();
        let leg_a = MediaLegConfig { remote_rtp: remote, remote_rtcp: remote, clock_rate: 8000, rtcp: RtcpConfig::default(), payload: a };
        let leg_b = MediaLegConfig { payload: b, ..leg_a };

        assert!(!Session::leg_changed(Some(&leg_a), Some(&leg_b), AudioPayloadConfig::is_same_config));
    }

    #[test]
    fn leg_changed_on_remote_address_change() {
        let cfg = AudioPayloadConfig::default();
        let remote_a: SocketAddr = "127.0.0.1:10000".parse().unwrap();
        let remote_b: SocketAddr = "127.0.0.1:20000".parse().unwrap();
        let leg_a = MediaLegConfig { remote_rtp: remote_a, remote_rtcp: remote_a, clock_rate: 8000, rtcp: RtcpConfig::default(), payload: cfg };
        let leg_b = MediaLegConfig { remote_rtp: remote_b, ..leg_a };

        assert!(Session::leg_changed(Some(&leg_a), Some(&leg_b), AudioPayloadConfig::is_same_config));
    }
}

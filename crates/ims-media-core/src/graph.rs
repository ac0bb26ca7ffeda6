//! Stream graph wiring (spec.md §4.14 / C14): assembles the node chains for
//! one media leg — `AudioStreamGraphRtpTx`-style encode path, the inverse
//! decode path, and the 2-node RTCP graph — on a single shared
//! [`StreamScheduler`], and decides whether a config change can be applied
//! in place (`isSameGraph`) or needs a teardown/rebuild.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use ims_rtp_core::session::{RtcpScheduler, RtpSession};
use ims_rtp_core::socket::RtpSocket;

use crate::config::{AudioPayloadConfig, TextPayloadConfig, VideoPayloadConfig};
use crate::descriptor::MediaSubtype;
use crate::events::MediaEvent;
use crate::node::{DescriptorQueue, Node};
use crate::nodes::{
    AudioJitterBufferNode, AudioPayloadDecoderNode, AudioPayloadEncoderNode, DtmfEncoderNode, RtcpReceiverNode, RtcpSenderNode,
    RtpDecoderNode, RtpEncoderNode, SocketReader, SocketWriterNode, TextJitterBufferNode, TextPayloadDecoderNode, TextPayloadEncoderNode,
    VideoJitterBufferNode, VideoPayloadDecoderNode, VideoPayloadEncoderNode,
};
use crate::scheduler::StreamScheduler;
use ims_rtp_core::queue::DataQueue;

/// What `isSameGraph` keys on (spec.md §4.14: "remote address + remote port
/// equal -> same graph").
fn is_same_remote(a: SocketAddr, b: SocketAddr) -> bool {
    a == b
}

/// One direction of one media type's RTP path, plus the handles a session
/// needs to feed/drain it without reaching into the node internals.
pub struct AudioTxGraph {
    scheduler: Arc<StreamScheduler>,
    remote: SocketAddr,
    node_ids: Vec<u64>,
    /// Feed already-compressed AMR/EVS frames in here.
    pub encoder_input: Arc<DescriptorQueue>,
    /// Feed `(digit, duration_ms)` requests in here (see
    /// [`crate::nodes::DtmfEncoderNode`]).
    pub dtmf_input: Arc<DescriptorQueue>,
}

impl AudioTxGraph {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        scheduler: Arc<StreamScheduler>,
        socket: Arc<RtpSocket>,
        remote: SocketAddr,
        session: Arc<Mutex<RtpSession>>,
        payload_config: AudioPayloadConfig,
        dtmf_frame_duration: Duration,
        dtmf_retransmit_duration: Duration,
    ) -> Self {
        let payload_encoder = AudioPayloadEncoderNode::new("audio-payload-encoder", payload_config);
        let encoder_input = payload_encoder.base().input_queue();

        let dtmf_encoder = DtmfEncoderNode::new("dtmf-encoder", dtmf_frame_duration, dtmf_retransmit_duration);
        let dtmf_input = dtmf_encoder.base().input_queue();

        let rtp_encoder = RtpEncoderNode::new("audio-rtp-encoder", session, payload_config.payload_type);
        let rtp_input = rtp_encoder.base().input_queue();
        payload_encoder.base().connect_rear(rtp_input.clone());
        dtmf_encoder.base().connect_rear(rtp_input);

        let socket_writer = SocketWriterNode::new("audio-socket-writer", socket, remote);
        rtp_encoder.base().connect_rear(socket_writer.base().input_queue());

        let mut node_ids = Vec::new();
        node_ids.push(scheduler.register_node(Box::new(payload_encoder)));
        node_ids.push(scheduler.register_node(Box::new(dtmf_encoder)));
        node_ids.push(scheduler.register_node(Box::new(rtp_encoder)));
        node_ids.push(scheduler.register_node(Box::new(socket_writer)));

        Self { scheduler, remote, node_ids, encoder_input, dtmf_input }
    }

    pub fn is_same_graph(&self, remote: SocketAddr) -> bool {
        is_same_remote(self.remote, remote)
    }

    pub fn teardown(&self) {
        for id in &self.node_ids {
            self.scheduler.deregister_node(*id);
        }
    }
}

pub struct AudioRxGraph {
    scheduler: Arc<StreamScheduler>,
    remote: SocketAddr,
    node_ids: Vec<u64>,
    socket_reader: Arc<SocketReader>,
    /// Played-out audio lands here, one reassembled frame (or a no-data
    /// placeholder) per playout tick.
    pub output: Arc<DescriptorQueue>,
}

impl AudioRxGraph {
    pub fn new(
        scheduler: Arc<StreamScheduler>,
        socket: Arc<RtpSocket>,
        remote: SocketAddr,
        session: Arc<Mutex<RtpSession>>,
        clock_rate: u32,
        payload_config: AudioPayloadConfig,
        jitter: crate::jitter::AudioJitterBuffer,
        tick_interval: Duration,
        events: Arc<DataQueue<MediaEvent>>,
        ssrc: ims_rtp_core::RtpSsrc,
    ) -> Self {
        let rtp_decoder = RtpDecoderNode::new("audio-rtp-decoder", session, clock_rate, events.clone());
        let socket_reader = Arc::new(SocketReader::new(socket, rtp_decoder.base().input_queue(), scheduler.clone(), MediaSubtype::RtpPayload));

        let payload_decoder = AudioPayloadDecoderNode::new("audio-payload-decoder", payload_config);
        rtp_decoder.base().connect_rear(payload_decoder.base().input_queue());

        let jitter_node = AudioJitterBufferNode::new("audio-jitter-buffer", jitter, tick_interval, events, ssrc);
        payload_decoder.base().connect_rear(jitter_node.base().input_queue());

        let output = Arc::new(DescriptorQueue::new());
        jitter_node.base().connect_rear(output.clone());

        let mut node_ids = Vec::new();
        node_ids.push(scheduler.register_node(Box::new(rtp_decoder)));
        node_ids.push(scheduler.register_node(Box::new(payload_decoder)));
        node_ids.push(scheduler.register_node(Box::new(jitter_node)));

        Self { scheduler, remote, node_ids, socket_reader, output }
    }

    pub fn start(&self) {
        self.socket_reader.start();
    }

    pub fn is_same_graph(&self, remote: SocketAddr) -> bool {
        is_same_remote(self.remote, remote)
    }

    pub fn teardown(&self) {
        self.socket_reader.stop();
        for id in &self.node_ids {
            self.scheduler.deregister_node(*id);
        }
    }
}

pub struct VideoTxGraph {
    scheduler: Arc<StreamScheduler>,
    remote: SocketAddr,
    node_ids: Vec<u64>,
    pub encoder_input: Arc<DescriptorQueue>,
}

impl VideoTxGraph {
    pub fn new(
        scheduler: Arc<StreamScheduler>,
        socket: Arc<RtpSocket>,
        remote: SocketAddr,
        session: Arc<Mutex<RtpSession>>,
        payload_config: VideoPayloadConfig,
    ) -> Self {
        let payload_encoder = VideoPayloadEncoderNode::new("video-payload-encoder", payload_config);
        let encoder_input = payload_encoder.base().input_queue();

        let rtp_encoder = RtpEncoderNode::new("video-rtp-encoder", session, payload_config.payload_type);
        payload_encoder.base().connect_rear(rtp_encoder.base().input_queue());

        let socket_writer = SocketWriterNode::new("video-socket-writer", socket, remote);
        rtp_encoder.base().connect_rear(socket_writer.base().input_queue());

        let mut node_ids = Vec::new();
        node_ids.push(scheduler.register_node(Box::new(payload_encoder)));
        node_ids.push(scheduler.register_node(Box::new(rtp_encoder)));
        node_ids.push(scheduler.register_node(Box::new(socket_writer)));

        Self { scheduler, remote, node_ids, encoder_input }
    }

    pub fn is_same_graph(&self, remote: SocketAddr) -> bool {
        is_same_remote(self.remote, remote)
    }

    pub fn teardown(&self) {
        for id in &self.node_ids {
            self.scheduler.deregister_node(*id);
        }
    }
}

pub struct VideoRxGraph {
    scheduler: Arc<StreamScheduler>,
    remote: SocketAddr,
    node_ids: Vec<u64>,
    socket_reader: Arc<SocketReader>,
    pub output: Arc<DescriptorQueue>,
}

impl VideoRxGraph {
    pub fn new(
        scheduler: Arc<StreamScheduler>,
        socket: Arc<RtpSocket>,
        remote: SocketAddr,
        session: Arc<Mutex<RtpSession>>,
        clock_rate: u32,
        payload_config: VideoPayloadConfig,
        jitter: crate::jitter::VideoJitterBuffer,
        events: Arc<DataQueue<MediaEvent>>,
        ssrc: ims_rtp_core::RtpSsrc,
    ) -> Self {
        let rtp_decoder = RtpDecoderNode::new("video-rtp-decoder", session, clock_rate, events.clone());
        let socket_reader = Arc::new(SocketReader::new(socket, rtp_decoder.base().input_queue(), scheduler.clone(), MediaSubtype::RtpPayload));

        let payload_decoder = VideoPayloadDecoderNode::new("video-payload-decoder", payload_config);
        rtp_decoder.base().connect_rear(payload_decoder.base().input_queue());

        let jitter_node = VideoJitterBufferNode::new("video-jitter-buffer", jitter, events, ssrc);
        payload_decoder.base().connect_rear(jitter_node.base().input_queue());

        let output = Arc::new(DescriptorQueue::new());
        jitter_node.base().connect_rear(output.clone());

        let mut node_ids = Vec::new();
        node_ids.push(scheduler.register_node(Box::new(rtp_decoder)));
        node_ids.push(scheduler.register_node(Box::new(payload_decoder)));
        node_ids.push(scheduler.register_node(Box::new(jitter_node)));

        Self { scheduler, remote, node_ids, socket_reader, output }
    }

    pub fn start(&self) {
        self.socket_reader.start();
    }

    pub fn is_same_graph(&self, remote: SocketAddr) -> bool {
        is_same_remote(self.remote, remote)
    }

    pub fn teardown(&self) {
        self.socket_reader.stop();
        for id in &self.node_ids {
            self.scheduler.deregister_node(*id);
        }
    }
}

pub struct TextTxGraph {
    scheduler: Arc<StreamScheduler>,
    remote: SocketAddr,
    node_ids: Vec<u64>,
    pub encoder_input: Arc<DescriptorQueue>,
}

impl TextTxGraph {
    pub fn new(
        scheduler: Arc<StreamScheduler>,
        socket: Arc<RtpSocket>,
        remote: SocketAddr,
        session: Arc<Mutex<RtpSession>>,
        payload_config: TextPayloadConfig,
    ) -> Self {
        let payload_encoder = TextPayloadEncoderNode::new("text-payload-encoder", payload_config);
        let encoder_input = payload_encoder.base().input_queue();

        let rtp_encoder = RtpEncoderNode::new("text-rtp-encoder", session, payload_config.payload_type);
        payload_encoder.base().connect_rear(rtp_encoder.base().input_queue());

        let socket_writer = SocketWriterNode::new("text-socket-writer", socket, remote);
        rtp_encoder.base().connect_rear(socket_writer.base().input_queue());

        let mut node_ids = Vec::new();
        node_ids.push(scheduler.register_node(Box::new(payload_encoder)));
        node_ids.push(scheduler.register_node(Box::new(rtp_encoder)));
        node_ids.push(scheduler.register_node(Box::new(socket_writer)));

        Self { scheduler, remote, node_ids, encoder_input }
    }

    pub fn is_same_graph(&self, remote: SocketAddr) -> bool {
        is_same_remote(self.remote, remote)
    }

    pub fn teardown(&self) {
        for id in &self.node_ids {
            self.scheduler.deregister_node(*id);
        }
    }
}

pub struct TextRxGraph {
    scheduler: Arc<StreamScheduler>,
    remote: SocketAddr,
    node_ids: Vec<u64>,
    socket_reader: Arc<SocketReader>,
    pub output: Arc<DescriptorQueue>,
}

impl TextRxGraph {
    pub fn new(
        scheduler: Arc<StreamScheduler>,
        socket: Arc<RtpSocket>,
        remote: SocketAddr,
        session: Arc<Mutex<RtpSession>>,
        clock_rate: u32,
        payload_config: TextPayloadConfig,
        jitter: crate::jitter::TextJitterBuffer,
        events: Arc<DataQueue<MediaEvent>>,
    ) -> Self {
        let rtp_decoder = RtpDecoderNode::new("text-rtp-decoder", session, clock_rate, events);
        let socket_reader = Arc::new(SocketReader::new(socket, rtp_decoder.base().input_queue(), scheduler.clone(), MediaSubtype::RtpPayload));

        let payload_decoder = TextPayloadDecoderNode::new("text-payload-decoder", payload_config);
        rtp_decoder.base().connect_rear(payload_decoder.base().input_queue());

        let jitter_node = TextJitterBufferNode::new("text-jitter-buffer", jitter);
        payload_decoder.base().connect_rear(jitter_node.base().input_queue());

        let output = Arc::new(DescriptorQueue::new());
        jitter_node.base().connect_rear(output.clone());

        let mut node_ids = Vec::new();
        node_ids.push(scheduler.register_node(Box::new(rtp_decoder)));
        node_ids.push(scheduler.register_node(Box::new(payload_decoder)));
        node_ids.push(scheduler.register_node(Box::new(jitter_node)));

        Self { scheduler, remote, node_ids, socket_reader, output }
    }

    pub fn start(&self) {
        self.socket_reader.start();
    }

    pub fn is_same_graph(&self, remote: SocketAddr) -> bool {
        is_same_remote(self.remote, remote)
    }

    pub fn teardown(&self) {
        self.socket_reader.stop();
        for id in &self.node_ids {
            self.scheduler.deregister_node(*id);
        }
    }
}

/// The 2-node RTCP graph (spec.md §4.14: "RTCP is its own 2-node graph
/// (reader + decoder; encoder + writer)"), sharing one socket for both
/// directions the way RFC 3550 multiplexes RTCP on a single port pair.
pub struct RtcpGraph {
    scheduler: Arc<StreamScheduler>,
    remote: SocketAddr,
    node_ids: Vec<u64>,
    socket_reader: Arc<SocketReader>,
}

impl RtcpGraph {
    pub fn new(
        scheduler: Arc<StreamScheduler>,
        socket: Arc<RtpSocket>,
        remote: SocketAddr,
        session: Arc<Mutex<RtpSession>>,
        rtcp_scheduler: Arc<Mutex<RtcpScheduler>>,
        cname: impl Into<String>,
        mtu: usize,
        events: Arc<DataQueue<MediaEvent>>,
    ) -> Self {
        let rtcp_receiver = RtcpReceiverNode::new("rtcp-receiver", events);
        let socket_reader = Arc::new(SocketReader::new(socket.clone(), rtcp_receiver.base().input_queue(), scheduler.clone(), MediaSubtype::RtcpPayload));

        let rtcp_sender = RtcpSenderNode::new("rtcp-sender", session, rtcp_scheduler, cname, mtu);
        let socket_writer = SocketWriterNode::new("rtcp-socket-writer", socket, remote);
        rtcp_sender.base().connect_rear(socket_writer.base().input_queue());

        let mut node_ids = Vec::new();
        node_ids.push(scheduler.register_node(Box::new(rtcp_receiver)));
        node_ids.push(scheduler.register_node(Box::new(rtcp_sender)));
        node_ids.push(scheduler.register_node(Box::new(socket_writer)));

        Self { scheduler, remote, node_ids, socket_reader }
    }

    pub fn start(&self) {
        self.socket_reader.start();
    }

    pub fn is_same_graph(&self, remote: SocketAddr) -> bool {
        is_same_remote(self.remote, remote)
    }

    pub fn teardown(&self) {
        self.socket_reader.stop();
        for id in &self.node_ids {
            self.scheduler.deregister_node(*id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_graph_keys_on_remote_socket_addr() {
        let a: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        let b: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        let c: SocketAddr = "127.0.0.1:5002".parse().unwrap();
        assert!(is_same_remote(a, b));
        assert!(!is_same_remote(a, c));
    }
}

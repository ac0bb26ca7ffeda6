//! RTP encoder/decoder nodes (spec.md §4.13 / C13), wrapping
//! `ims_rtp_core::session::RtpSession` for sequence/timestamp assignment
//! and Appendix A.1 receive-side validation.

use std::sync::Arc;

use ims_rtp_core::packet::rtcp::NtpTimestamp;
use ims_rtp_core::packet::rtp::RtpPacket;
use ims_rtp_core::session::{CollisionAction, RtpSession};
use parking_lot::Mutex;

use crate::descriptor::{MediaSubtype, PacketDescriptor};
use crate::events::MediaEvent;
use crate::node::{BaseNode, Node};
use ims_rtp_core::queue::DataQueue;

/// Packetizes one already-compressed/raw media descriptor per call into an
/// outbound RTP packet.
pub struct RtpEncoderNode {
    base: BaseNode,
    session: Arc<Mutex<RtpSession>>,
    payload_type: u8,
}

impl RtpEncoderNode {
    pub fn new(name: impl Into<String>, session: Arc<Mutex<RtpSession>>, payload_type: u8) -> Self {
        Self { base: BaseNode::new(name), session, payload_type }
    }
}

impl Node for RtpEncoderNode {
    fn base(&self) -> &BaseNode {
        &self.base
    }

    fn process_data(&mut self) -> crate::Result<()> {
        let Some(desc) = self.base.input_queue().get() else { return Ok(()) };

        let packet = {
            let mut session = self.session.lock();
            session.build_outbound_packet(self.payload_type, desc.data, desc.marker, NtpTimestamp::now())?
        };
        let bytes = packet.serialize(1)?;

        let mut out = PacketDescriptor::new(bytes.freeze(), MediaSubtype::RtpPayload);
        out.rtp_timestamp = packet.header.timestamp;
        out.sequence_number = packet.header.sequence_number;
        out.marker = packet.header.marker;
        self.base.send_to_rear(out);
        Ok(())
    }
}

/// Parses one inbound RTP datagram per call and hands the depacketized
/// payload to the rear node (typically a jitter buffer).
pub struct RtpDecoderNode {
    base: BaseNode,
    session: Arc<Mutex<RtpSession>>,
    clock_rate: u32,
    events: Arc<DataQueue<MediaEvent>>,
}

impl RtpDecoderNode {
    pub fn new(name: impl Into<String>, session: Arc<Mutex<RtpSession>>, clock_rate: u32, events: Arc<DataQueue<MediaEvent>>) -> Self {
        Self { base: BaseNode::new(name), session, clock_rate, events }
    }
}

impl Node for RtpDecoderNode {
    fn base(&self) -> &BaseNode {
        &self.base
    }

    fn process_data(&mut self) -> crate::Result<()> {
        let Some(desc) = self.base.input_queue().get() else { return Ok(()) };

        let packet = match RtpPacket::parse(&desc.data) {
            Ok(p) => p,
            Err(err) => {
                self.events.add(MediaEvent::NotifyError { reason: format!("malformed RTP packet: {err}") });
                return Ok(());
            }
        };

        let arrival_rtp_ts = ims_rtp_core::time::current_rtp_timestamp(self.clock_rate);
        let action = {
            let mut session = self.session.lock();
            session.process_inbound(&packet, arrival_rtp_ts)
        };
        if let Some(CollisionAction::SendByeAndReroll { old_ssrc, new_ssrc }) = action {
            self.events.add(MediaEvent::NotifyError {
                reason: format!("SSRC collision with local sender {old_ssrc:#010x}, rerolled to {new_ssrc:#010x}"),
            });
        }

        let mut out = PacketDescriptor::new(packet.payload, MediaSubtype::CompressedMedia);
        out.rtp_timestamp = packet.header.timestamp;
        out.sequence_number = packet.header.sequence_number;
        out.marker = packet.header.marker;
        out.arrival_time_ms = desc.arrival_time_ms;
        self.base.send_to_rear(out);
        Ok(())
    }
}

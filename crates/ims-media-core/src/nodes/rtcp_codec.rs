//! RTCP sender/receiver nodes (spec.md §4.13 / C13), driving
//! `ims_rtp_core::session::RtcpScheduler`'s interval and turning inbound
//! feedback (NACK/PLI/FIR) into [`MediaEvent`]s for the local encoder.

use std::sync::Arc;
use std::time::Instant;

use ims_rtp_core::packet::rtcp::{
    parse_compound, serialize_compound, RtcpFeedback, RtcpPacket, RtcpReportBlock, RtcpSenderReport,
    RtcpSourceDescription,
};
use ims_rtp_core::packet::rtcp::sdes::SdesChunk;
use ims_rtp_core::queue::DataQueue;
use ims_rtp_core::session::{RtcpScheduler, RtpSession};
use parking_lot::Mutex;

use crate::descriptor::{MediaSubtype, PacketDescriptor};
use crate::events::{FeedbackRequest, MediaEvent};
use crate::node::{BaseNode, Node};

/// Fires compound SR/SDES packets on the schedule `RtcpScheduler` computes.
/// Self-driven (no front node feeds it), so it's a source node serviced
/// every scheduler tick; most ticks are a no-op since the deadline hasn't
/// arrived yet.
pub struct RtcpSenderNode {
    base: BaseNode,
    session: Arc<Mutex<RtpSession>>,
    scheduler: Arc<Mutex<RtcpScheduler>>,
    cname: String,
    mtu: usize,
}

impl RtcpSenderNode {
    pub fn new(name: impl Into<String>, session: Arc<Mutex<RtpSession>>, scheduler: Arc<Mutex<RtcpScheduler>>, cname: impl Into<String>, mtu: usize) -> Self {
        Self { base: BaseNode::new(name), session, scheduler, cname: cname.into(), mtu }
    }
}

impl Node for RtcpSenderNode {
    fn base(&self) -> &BaseNode {
        &self.base
    }

    fn is_source(&self) -> bool {
        true
    }

    fn process_data(&mut self) -> crate::Result<()> {
        let due = Instant::now() >= self.scheduler.lock().next_interval_deadline();
        if !due {
            return Ok(());
        }

        let packets = {
            let session = self.session.lock();
            let ssrc = session.local_ssrc();

            let mut sr = RtcpSenderReport::new(ssrc);
            sr.sender_packet_count = session.sender_packet_count();
            sr.sender_octet_count = session.sender_octet_count();
            for receiver in session.receivers() {
                let mut block = RtcpReportBlock::new(receiver.ssrc);
                block.cumulative_lost = receiver.packets_lost.max(0) as u32;
                block.highest_seq = receiver.extended_max_seq();
                block.jitter = receiver.jitter as u32;
                sr.add_report_block(block);
            }

            let sdes = RtcpSourceDescription { chunks: vec![SdesChunk::new_cname(ssrc, self.cname.clone())] };
            vec![RtcpPacket::SenderReport(sr), RtcpPacket::SourceDescription(sdes)]
        };

        let buffers = serialize_compound(&packets, self.mtu)?;
        let mut total_bytes = 0usize;
        for buf in buffers {
            total_bytes += buf.len();
            self.base.send_to_rear(PacketDescriptor::new(buf.freeze(), MediaSubtype::RtcpPayload));
        }

        let mut scheduler = self.scheduler.lock();
        scheduler.on_rtcp_sent(total_bytes);
        scheduler.schedule_next();
        Ok(())
    }
}

/// Parses inbound compound RTCP packets and turns PSFB/RTPFB feedback into
/// [`MediaEvent::Feedback`] notifications for the local sender.
pub struct RtcpReceiverNode {
    base: BaseNode,
    events: Arc<DataQueue<MediaEvent>>,
}

impl RtcpReceiverNode {
    pub fn new(name: impl Into<String>, events: Arc<DataQueue<MediaEvent>>) -> Self {
        Self { base: BaseNode::new(name), events }
    }
}

impl Node for RtcpReceiverNode {
    fn base(&self) -> &BaseNode {
        &self.base
    }

    fn process_data(&mut self) -> crate::Result<()> {
        let Some(desc) = self.base.input_queue().get() else { return Ok(()) };

        let packets = match parse_compound(&desc.data) {
            Ok(p) => p,
            Err(err) => {
                self.events.add(MediaEvent::NotifyError { reason: format!("malformed RTCP compound packet: {err}") });
                return Ok(());
            }
        };

        for packet in packets {
            match packet {
                RtcpPacket::TransportFeedback(fb) | RtcpPacket::PayloadFeedback(fb) => self.handle_feedback(fb),
                RtcpPacket::Goodbye(bye) => {
                    for ssrc in bye.sources {
                        self.events.add(MediaEvent::NotifyError { reason: format!("BYE received from ssrc {ssrc:#010x}") });
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl RtcpReceiverNode {
    fn handle_feedback(&self, fb: RtcpFeedback) {
        match fb {
            RtcpFeedback::PictureLossIndication { .. } => {
                self.events.add(MediaEvent::Feedback(FeedbackRequest::RequestVideoIdrFrame));
            }
            RtcpFeedback::FullIntraRequest { .. } => {
                self.events.add(MediaEvent::Feedback(FeedbackRequest::RequestVideoIdrFrame));
            }
            RtcpFeedback::Tmmbr { items, .. } => {
                for item in items {
                    self.events.add(MediaEvent::Feedback(FeedbackRequest::RequestVideoBitrateChange {
                        kbps: (item.bitrate_bps / 1000) as u32,
                    }));
                }
            }
            RtcpFeedback::GenericNack { entries, .. } => {
                // Sequence-level retransmission is out of scope for audio
                // call media (spec.md §1 Non-goals: "no RTP retransmission
                // via RFC 4588"); surfaced only as a diagnostic.
                let lost: usize = entries.iter().map(|e| e.lost_sequence_numbers().len() + 1).sum();
                self.events.add(MediaEvent::NotifyError { reason: format!("received NACK for {lost} packets") });
            }
            RtcpFeedback::Tmmbn { .. } => {}
        }
    }
}

//! The RTP session: per-remote-source receiver state (RFC 3550 Appendix
//! A.1), outbound packet assembly with MTU enforcement, RTCP transmission
//! timing (§6.2/§6.3), and SSRC collision handling (§8.2).

pub mod rtcp_scheduler;
pub mod scheduling;

pub use rtcp_scheduler::RtcpScheduler;

use tracing::{debug, info, warn};

use crate::error::Error;
use crate::packet::{RtpHeader, RtpPacket};
use crate::time::{calc_rtp_timestamp, SsrcGenerator};
use crate::packet::rtcp::NtpTimestamp;
use crate::{Result, RtpSequenceNumber, RtpSsrc, RtpTimestamp};

/// RFC 3550 Appendix A.1 §2: consecutive in-sequence packets required
/// before a brand-new source leaves probation and its stats are trusted.
/// Zero means a brand-new source is trusted on its first in-order packet.
pub const MIN_SEQUENTIAL: u16 = 0;
/// Max allowed forward jump in sequence number before we treat it as a
/// restart rather than ordinary loss.
pub const MAX_DROPOUT: u32 = 3000;
/// Max allowed backward jump before we treat it as misorder rather than a
/// restart.
pub const MAX_MISORDER: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceState {
    Probation { sequential: u16 },
    Valid,
}

/// Per-remote-SSRC receive-side bookkeeping, maintained per RFC 3550
/// Appendix A.1.
#[derive(Debug)]
pub struct ReceiverRecord {
    pub ssrc: RtpSsrc,
    state: SourceState,
    max_seq: RtpSequenceNumber,
    cycles: u32,
    base_seq: RtpSequenceNumber,
    bad_seq: Option<u32>,
    pub packets_received: u64,
    pub octets_received: u64,
    pub packets_lost: i64,
    pub jitter: f64,
    last_transit: Option<i64>,
    pub probation_restarts: u64,
}

impl ReceiverRecord {
    fn new(first_seq: RtpSequenceNumber) -> Self {
        Self {
            ssrc: 0,
            state: SourceState::Probation { sequential: 0 },
            // Seeded one behind `first_seq` so the immediate `update_seq(first_seq)`
            // call sees it as the next expected packet and validates the source on
            // its first in-order packet (MIN_SEQUENTIAL == 0).
            max_seq: first_seq.wrapping_sub(1),
            cycles: 0,
            base_seq: first_seq,
            bad_seq: None,
            packets_received: 0,
            octets_received: 0,
            packets_lost: 0,
            jitter: 0.0,
            last_transit: None,
            probation_restarts: 0,
        }
    }

    fn restart(&mut self, seq: RtpSequenceNumber) {
        self.state = SourceState::Probation { sequential: 1 };
        self.base_seq = seq;
        self.max_seq = seq;
        self.cycles = 0;
        self.bad_seq = None;
        self.probation_restarts += 1;
    }

    /// Extended (cycles<<16 | seq) highest sequence number, as carried in
    /// RTCP report blocks.
    pub fn extended_max_seq(&self) -> u32 {
        (self.cycles << 16) | self.max_seq as u32
    }

    pub fn extended_base_seq(&self) -> u32 {
        self.base_seq as u32
    }

    pub fn expected_packets(&self) -> u64 {
        (self.extended_max_seq() as i64 - self.extended_base_seq() as i64 + 1).max(0) as u64
    }

    pub fn is_valid(&self) -> bool {
        matches!(self.state, SourceState::Valid)
    }

    /// Feeds a newly arrived RTP sequence number through the Appendix A.1
    /// state machine, returning `true` when the packet should be accepted
    /// into the stream's stats/jitter-buffer path.
    fn update_seq(&mut self, seq: RtpSequenceNumber) -> bool {
        let udelta = seq.wrapping_sub(self.max_seq) as u32;

        match self.state {
            SourceState::Probation { sequential } => {
                if seq == self.max_seq.wrapping_add(1) {
                    self.max_seq = seq;
                    if sequential + 1 >= MIN_SEQUENTIAL {
                        self.state = SourceState::Valid;
                    } else {
                        self.state = SourceState::Probation { sequential: sequential + 1 };
                    }
                    true
                } else {
                    self.restart(seq);
                    false
                }
            }
            SourceState::Valid => {
                if udelta < MAX_DROPOUT {
                    if seq < self.max_seq {
                        self.cycles += 1;
                    }
                    self.max_seq = seq;
                    true
                } else if udelta <= (u16::MAX as u32 + 1) - MAX_MISORDER {
                    // Too big a jump forward — possibly a restarted source.
                    let bad_seq = self.bad_seq.unwrap_or(0);
                    if seq as u32 == bad_seq {
                        self.restart(seq);
                    } else {
                        self.bad_seq = Some((seq as u32 + 1) & 0xFFFF);
                    }
                    false
                } else {
                    // Duplicate or misordered within tolerance.
                    true
                }
            }
        }
    }

    fn update_jitter(&mut self, packet_ts: RtpTimestamp, arrival_rtp_ts: u32) {
        let transit = arrival_rtp_ts as i64 - packet_ts as i64;
        if let Some(prev) = self.last_transit {
            let d = (transit - prev).unsigned_abs() as f64;
            self.jitter += (d - self.jitter) / 16.0;
        }
        self.last_transit = Some(transit);
    }
}

/// Outbound sequence/timestamp state for the local SSRC.
struct SenderState {
    ssrc: RtpSsrc,
    sequence: RtpSequenceNumber,
    clock_rate: u32,
    packets_sent: u64,
    octets_sent: u64,
    last_rtp: Option<(RtpTimestamp, NtpTimestamp)>,
}

/// Configuration for an [`RtpSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpSessionConfig {
    pub clock_rate: u32,
    pub mtu: usize,
    pub terminal_number: u8,
}

impl Default for RtpSessionConfig {
    fn default() -> Self {
        Self { clock_rate: 8000, mtu: crate::DEFAULT_MAX_PACKET_SIZE, terminal_number: 0 }
    }
}

/// Owns the local sender record and the remote-SSRC -> [`ReceiverRecord`]
/// map for one RTP stream.
pub struct RtpSession {
    config: RtpSessionConfig,
    sender: SenderState,
    receivers: std::collections::HashMap<RtpSsrc, ReceiverRecord>,
    ssrc_gen: SsrcGenerator,
}

impl RtpSession {
    pub fn new(config: RtpSessionConfig) -> Self {
        let mut ssrc_gen = SsrcGenerator::new(config.terminal_number);
        let ssrc = ssrc_gen.next_ssrc();
        Self {
            sender: SenderState {
                ssrc,
                sequence: 0,
                clock_rate: config.clock_rate,
                packets_sent: 0,
                octets_sent: 0,
                last_rtp: None,
            },
            config,
            receivers: std::collections::HashMap::new(),
            ssrc_gen,
        }
    }

    pub fn local_ssrc(&self) -> RtpSsrc {
        self.sender.ssrc
    }

    /// Assembles an outbound RTP packet, assigning sequence number, RTP
    /// timestamp and SSRC. Returns [`Error::MtuExceeded`] without sending
    /// anything if the formed packet would exceed the configured MTU.
    pub fn build_outbound_packet(
        &mut self,
        payload_type: u8,
        payload: bytes::Bytes,
        marker: bool,
        ntp_now: NtpTimestamp,
    ) -> Result<RtpPacket> {
        let timestamp = match self.sender.last_rtp {
            Some((prev_rtp, prev_ntp)) => {
                calc_rtp_timestamp(prev_rtp, ntp_now, prev_ntp, self.sender.clock_rate)
            }
            None => 0,
        };

        let mut header = RtpHeader::new(payload_type, self.sender.sequence, timestamp, self.sender.ssrc);
        header.marker = marker;
        let packet = RtpPacket::new(header, payload);

        if packet.size() > self.config.mtu {
            return Err(Error::MtuExceeded { size: packet.size(), mtu: self.config.mtu });
        }

        self.sender.sequence = self.sender.sequence.wrapping_add(1);
        self.sender.packets_sent += 1;
        self.sender.octets_sent += packet.payload.len() as u64;
        self.sender.last_rtp = Some((timestamp, ntp_now));

        Ok(packet)
    }

    pub fn sender_packet_count(&self) -> u32 {
        self.sender.packets_sent as u32
    }

    pub fn sender_octet_count(&self) -> u32 {
        self.sender.octets_sent as u32
    }

    /// Processes an inbound RTP packet against the Appendix A.1 state
    /// machine for its SSRC, resolving a collision against our own SSRC by
    /// sending a BYE and rolling a fresh one (§8.2 / §4.7).
    ///
    /// Returns `Some(())` when the packet is accepted into the stats/jitter
    /// path, `None` when it should be dropped (probation not yet cleared,
    /// or identified as a restarted/misordered source).
    pub fn process_inbound(&mut self, packet: &RtpPacket, arrival_rtp_ts: u32) -> Option<CollisionAction> {
        let ssrc = packet.header.ssrc;

        if ssrc == self.sender.ssrc {
            warn!(ssrc = format!("{ssrc:#010x}"), "SSRC collision with local sender, rolling new SSRC");
            let old = self.sender.ssrc;
            self.sender.ssrc = self.ssrc_gen.next_ssrc();
            return Some(CollisionAction::SendByeAndReroll { old_ssrc: old, new_ssrc: self.sender.ssrc });
        }

        let record = self
            .receivers
            .entry(ssrc)
            .or_insert_with(|| {
                let mut r = ReceiverRecord::new(packet.header.sequence_number);
                r.ssrc = ssrc;
                r
            });

        let accepted = record.update_seq(packet.header.sequence_number);
        if accepted {
            record.packets_received += 1;
            record.octets_received += packet.payload.len() as u64;
            record.update_jitter(packet.header.timestamp, arrival_rtp_ts);
            None
        } else {
            debug!(ssrc = format!("{ssrc:#010x}"), seq = packet.header.sequence_number, "dropped: probation/misorder");
            None
        }
    }

    pub fn receiver(&self, ssrc: RtpSsrc) -> Option<&ReceiverRecord> {
        self.receivers.get(&ssrc)
    }

    pub fn receivers(&self) -> impl Iterator<Item = &ReceiverRecord> {
        self.receivers.values()
    }

    pub fn remove_receiver(&mut self, ssrc: RtpSsrc) {
        if self.receivers.remove(&ssrc).is_some() {
            info!(ssrc = format!("{ssrc:#010x}"), "removed receiver record (BYE received)");
        }
    }

    pub fn config(&self) -> &RtpSessionConfig {
        &self.config
    }
}

/// What the caller must do in response to [`RtpSession::process_inbound`]
/// detecting our own SSRC arriving from the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionAction {
    SendByeAndReroll { old_ssrc: RtpSsrc, new_ssrc: RtpSsrc },
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn packet_with_seq(ssrc: RtpSsrc, seq: RtpSequenceNumber) -> RtpPacket {
        let header = RtpHeader::new(0, seq, 0, ssrc);
        RtpPacket::new(header, Bytes::from_static(b"x"))
    }

    #[test]
    fn new_source_is_valid_on_its_first_in_order_packet() {
        let mut session = RtpSession::new(RtpSessionConfig::default());
        let ssrc = 0x5000_0000;

        assert!(session.process_inbound(&packet_with_seq(ssrc, 100), 0).is_none());
        let record = session.receiver(ssrc).unwrap();
        assert!(record.is_valid());
        assert_eq!(record.packets_received, 1);
    }

    #[test]
    fn mtu_exceeded_rejects_outbound_packet() {
        let mut config = RtpSessionConfig::default();
        config.mtu = 20;
        let mut session = RtpSession::new(config);
        let big_payload = Bytes::from(vec![0u8; 1000]);
        let result = session.build_outbound_packet(0, big_payload, false, NtpTimestamp::now());
        assert!(matches!(result, Err(Error::MtuExceeded { .. })));
    }

    #[test]
    fn collision_with_local_ssrc_triggers_reroll() {
        let mut session = RtpSession::new(RtpSessionConfig::default());
        let own_ssrc = session.local_ssrc();
        let action = session.process_inbound(&packet_with_seq(own_ssrc, 1), 0);
        match action {
            Some(CollisionAction::SendByeAndReroll { old_ssrc, new_ssrc }) => {
                assert_eq!(old_ssrc, own_ssrc);
                assert_ne!(new_ssrc, own_ssrc);
            }
            _ => panic!("expected collision action"),
        }
    }

    #[test]
    fn large_forward_jump_restarts_rather_than_accepts() {
        let mut session = RtpSession::new(RtpSessionConfig::default());
        let ssrc = 0x6000_0000;
        session.process_inbound(&packet_with_seq(ssrc, 100), 0);
        session.process_inbound(&packet_with_seq(ssrc, 101), 0);
        assert!(session.receiver(ssrc).unwrap().is_valid());

        // Jump far beyond MAX_DROPOUT — should be flagged as a possible
        // restart, not silently accepted into the valid stream.
        session.process_inbound(&packet_with_seq(ssrc, 101u16.wrapping_add(40000)), 0);
        let record = session.receiver(ssrc).unwrap();
        assert_eq!(record.max_seq, 101);
    }
}

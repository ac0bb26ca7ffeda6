//! Builds outgoing RTCP Sender/Receiver Reports and SDES chunks from the
//! running statistics accumulated for a session (RFC 3550 §6.3-6.4).

use std::collections::HashMap;
use std::time::Instant;

use crate::packet::rtcp::sdes::SdesChunk;
use crate::packet::rtcp::{
    NtpTimestamp, RtcpReceiverReport, RtcpReportBlock, RtcpSenderReport, RtcpSourceDescription,
};
use crate::RtpSsrc;

/// RFC 3550 §6.2: minimum interval between RTCP packets from a single
/// participant, before the randomization factor is applied.
pub const RTCP_MIN_INTERVAL_SECS: f64 = 5.0;
pub const RTCP_MIN_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5);

/// Fraction of session bandwidth RTCP traffic is allowed to consume.
pub const RTCP_BANDWIDTH_FRACTION: f64 = 0.05;

struct RemoteSourceStats {
    report_block: RtcpReportBlock,
    packets_received_since_sr: u64,
    expected_prior: u64,
    received_prior: u64,
    highest_seq_seen: u32,
}

/// Accumulates the local sender/receiver-side counters needed to build an
/// RTCP compound packet (SR + zero or more report blocks + SDES) on each
/// scheduled RTCP interval.
pub struct RtcpReportGenerator {
    local_ssrc: RtpSsrc,
    cname: String,
    packets_sent: u32,
    octets_sent: u32,
    remotes: HashMap<RtpSsrc, RemoteSourceStats>,
    last_sr_sent_at: Option<Instant>,
}

impl RtcpReportGenerator {
    pub fn new(local_ssrc: RtpSsrc, cname: String) -> Self {
        Self {
            local_ssrc,
            cname,
            packets_sent: 0,
            octets_sent: 0,
            remotes: HashMap::new(),
            last_sr_sent_at: None,
        }
    }

    /// Folds in locally-sent RTP packet/byte counts, for the SR sender info.
    pub fn update_sent_stats(&mut self, packets: u32, bytes: u32) {
        self.packets_sent = self.packets_sent.saturating_add(packets);
        self.octets_sent = self.octets_sent.saturating_add(bytes);
    }

    /// Folds in a just-received RTP packet from `remote_ssrc`, updating the
    /// extended highest sequence number tracked for that source's report
    /// block. Loss/jitter fields on the block are filled in separately via
    /// [`Self::update_remote_loss`] and [`Self::update_remote_jitter`] since
    /// those come from dedicated trackers per source.
    pub fn process_received_packet(&mut self, remote_ssrc: RtpSsrc, seq: u16) {
        let entry = self.remotes.entry(remote_ssrc).or_insert_with(|| RemoteSourceStats {
            report_block: RtcpReportBlock::new(remote_ssrc),
            packets_received_since_sr: 0,
            expected_prior: 0,
            received_prior: 0,
            highest_seq_seen: seq as u32,
        });
        entry.packets_received_since_sr += 1;
        if seq as u32 > (entry.highest_seq_seen & 0xFFFF) || entry.highest_seq_seen == 0 {
            entry.highest_seq_seen = (entry.highest_seq_seen & 0xFFFF_0000) | seq as u32;
        }
        entry.report_block.highest_seq = entry.highest_seq_seen;
    }

    pub fn update_remote_loss(&mut self, remote_ssrc: RtpSsrc, fraction_lost: u8, cumulative_lost: u32) {
        let entry = self
            .remotes
            .entry(remote_ssrc)
            .or_insert_with(|| RemoteSourceStats {
                report_block: RtcpReportBlock::new(remote_ssrc),
                packets_received_since_sr: 0,
                expected_prior: 0,
                received_prior: 0,
                highest_seq_seen: 0,
            });
        entry.report_block.fraction_lost = fraction_lost;
        entry.report_block.cumulative_lost = cumulative_lost;
    }

    pub fn update_remote_jitter(&mut self, remote_ssrc: RtpSsrc, jitter: u32) {
        if let Some(entry) = self.remotes.get_mut(&remote_ssrc) {
            entry.report_block.jitter = jitter;
        }
    }

    /// Records that a Sender Report was just received from `remote_ssrc`,
    /// so `last_sr`/`delay_since_last_sr` can be populated on the next
    /// report block we build for that source.
    pub fn record_remote_sr(&mut self, remote_ssrc: RtpSsrc, sr_ntp: NtpTimestamp) {
        let entry = self
            .remotes
            .entry(remote_ssrc)
            .or_insert_with(|| RemoteSourceStats {
                report_block: RtcpReportBlock::new(remote_ssrc),
                packets_received_since_sr: 0,
                expected_prior: 0,
                received_prior: 0,
                highest_seq_seen: 0,
            });
        entry.report_block.last_sr = sr_ntp.to_u32();
        entry.report_block.delay_since_last_sr = 0;
    }

    fn build_report_blocks(&self) -> Vec<RtcpReportBlock> {
        self.remotes.values().map(|r| r.report_block.clone()).collect()
    }

    /// Builds a Sender Report (when we've sent at least one RTP packet
    /// since the generator was created) or a Receiver Report otherwise,
    /// along with the matching SDES chunk.
    pub fn build_reports(&mut self, rtp_timestamp: u32) -> (ReportOrSenderReport, RtcpSourceDescription) {
        let blocks = self.build_report_blocks();
        let sdes = RtcpSourceDescription {
            chunks: vec![SdesChunk::new_cname(self.local_ssrc, self.cname.clone())],
        };

        let report = if self.packets_sent > 0 {
            self.last_sr_sent_at = Some(Instant::now());
            let mut sr = RtcpSenderReport::new(self.local_ssrc);
            sr.ntp_timestamp = NtpTimestamp::now();
            sr.rtp_timestamp = rtp_timestamp;
            sr.sender_packet_count = self.packets_sent;
            sr.sender_octet_count = self.octets_sent;
            sr.report_blocks = blocks;
            ReportOrSenderReport::Sender(sr)
        } else {
            let mut rr = RtcpReceiverReport::new(self.local_ssrc);
            rr.report_blocks = blocks;
            ReportOrSenderReport::Receiver(rr)
        };
        (report, sdes)
    }

    pub fn local_ssrc(&self) -> RtpSsrc {
        self.local_ssrc
    }
}

/// RTCP report generation picks SR over RR only once we've sent traffic;
/// this wraps whichever one came out so callers can serialize either.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOrSenderReport {
    Sender(RtcpSenderReport),
    Receiver(RtcpReceiverReport),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_receiver_report_before_any_send() {
        let mut gen = RtcpReportGenerator::new(0xAAAA_AAAA, "alice@example.com".into());
        gen.process_received_packet(0xBBBB_BBBB, 100);
        let (report, sdes) = gen.build_reports(0);
        match report {
            ReportOrSenderReport::Receiver(rr) => {
                assert_eq!(rr.ssrc, 0xAAAA_AAAA);
                assert_eq!(rr.report_blocks.len(), 1);
            }
            ReportOrSenderReport::Sender(_) => panic!("expected RR before any send"),
        }
        assert_eq!(sdes.chunks[0].ssrc, 0xAAAA_AAAA);
    }

    #[test]
    fn builds_sender_report_once_traffic_sent() {
        let mut gen = RtcpReportGenerator::new(0xAAAA_AAAA, "alice@example.com".into());
        gen.update_sent_stats(10, 1600);
        let (report, _) = gen.build_reports(8000);
        match report {
            ReportOrSenderReport::Sender(sr) => {
                assert_eq!(sr.sender_packet_count, 10);
                assert_eq!(sr.sender_octet_count, 1600);
            }
            ReportOrSenderReport::Receiver(_) => panic!("expected SR after sending"),
        }
    }
}

//! Round-trip time estimation from RTCP SR/RR exchanges (RFC 3550 §6.4.1).

use crate::packet::rtcp::NtpTimestamp;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RttStats {
    pub last_rtt_ms: Option<f64>,
    pub smoothed_rtt_ms: Option<f64>,
}

/// Tracks the NTP timestamp of our own most recently sent Sender Reports so
/// that a peer's Receiver Report (`last_sr` + `delay_since_last_sr`) can be
/// turned into a round-trip estimate.
pub struct RttEstimator {
    last_sr_sent: Option<NtpTimestamp>,
    stats: RttStats,
}

impl RttEstimator {
    pub fn new() -> Self {
        Self { last_sr_sent: None, stats: RttStats::default() }
    }

    /// Call when we send a Sender Report, so a later Receiver Report
    /// referencing it can be matched up.
    pub fn record_sr_sent(&mut self, ntp: NtpTimestamp) {
        self.last_sr_sent = Some(ntp);
    }

    /// Processes a Receiver Report's `last_sr` (middle 32 bits of the SR's
    /// NTP timestamp) and `delay_since_last_sr` (1/65536s units) fields,
    /// returning the computed RTT in milliseconds if `last_sr` matches the
    /// SR we last sent.
    pub fn process_receiver_report(&mut self, last_sr: u32, delay_since_last_sr: u32) -> Option<f64> {
        let sent = self.last_sr_sent?;
        if sent.to_u32() != last_sr {
            // RR refers to an SR we didn't just send (stale or out of order).
            return None;
        }

        let now = NtpTimestamp::now();
        let arrival_mid32 = now.to_u32() as i64;
        let lsr = last_sr as i64;
        let dlsr = delay_since_last_sr as i64;

        // All three terms are in units of 1/65536 second.
        let rtt_units = arrival_mid32 - lsr - dlsr;
        if rtt_units < 0 {
            return None;
        }
        let rtt_ms = (rtt_units as f64 / 65536.0) * 1000.0;

        self.stats.last_rtt_ms = Some(rtt_ms);
        self.stats.smoothed_rtt_ms = Some(match self.stats.smoothed_rtt_ms {
            Some(prev) => prev * 0.875 + rtt_ms * 0.125,
            None => rtt_ms,
        });
        Some(rtt_ms)
    }

    pub fn stats(&self) -> RttStats {
        self.stats
    }

    pub fn reset(&mut self) {
        self.last_sr_sent = None;
        self.stats = RttStats::default();
    }
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_rr_referring_to_unknown_sr() {
        let mut est = RttEstimator::new();
        assert_eq!(est.process_receiver_report(0xDEAD_BEEF, 0), None);
    }

    #[test]
    fn records_and_matches_sent_sr() {
        let mut est = RttEstimator::new();
        let sr_ntp = NtpTimestamp::now();
        est.record_sr_sent(sr_ntp);
        // With zero elapsed real time and zero DLSR this should be ~0, not negative.
        let rtt = est.process_receiver_report(sr_ntp.to_u32(), 0);
        assert!(rtt.is_some());
        assert!(rtt.unwrap() >= 0.0);
    }
}

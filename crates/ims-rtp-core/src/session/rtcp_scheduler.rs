//! RTCP transmission interval computation (RFC 3550 §6.2/§6.3), including
//! the reverse-reconsideration rule triggered by BYE (§6.3.4).

use std::time::{Duration, Instant};

use rand::Rng;

/// Minimum RTCP reporting interval before randomization, per §6.2.
const RTCP_MIN_TIME_SECS: f64 = 5.0;
/// Compensate for the fact that the timer reconsideration algorithm
/// converges to a value below the intended average interval by this factor
/// (RFC 3550 §6.3.1, "1.21828").
const COMPENSATION_FACTOR: f64 = 1.21828;

pub struct RtcpScheduler {
    members: u32,
    pmembers: u32,
    senders: u32,
    rtcp_bw_bytes_per_sec: f64,
    avg_rtcp_size: f64,
    we_sent: bool,
    initial: bool,
    tp: Instant,
    tn: Instant,
}

impl RtcpScheduler {
    pub fn new(rtcp_bw_bytes_per_sec: f64) -> Self {
        let now = Instant::now();
        Self {
            members: 1,
            pmembers: 1,
            senders: 0,
            rtcp_bw_bytes_per_sec,
            avg_rtcp_size: 200.0,
            we_sent: false,
            initial: true,
            tp: now,
            tn: now,
        }
    }

    pub fn set_member_count(&mut self, members: u32) {
        self.members = members;
    }

    pub fn set_sender_count(&mut self, senders: u32) {
        self.senders = senders;
        self.we_sent = senders > 0;
    }

    pub fn next_interval_deadline(&self) -> Instant {
        self.tn
    }

    /// Computes the deterministic interval `T` (before applying the
    /// uniform randomization factor), per §6.3.1's `rtcp_interval()`.
    fn calculated_interval_secs(&self) -> f64 {
        let members = self.members.max(1) as f64;

        let rtcp_fraction_for_senders = if self.senders as f64 <= members * 0.25 {
            if self.we_sent {
                0.25
            } else {
                0.75
            }
        } else {
            1.0
        };

        let effective_members = if self.we_sent && self.senders as f64 <= members * 0.25 {
            self.senders.max(1) as f64
        } else {
            members
        };

        let bw_share = self.rtcp_bw_bytes_per_sec.max(1.0) * rtcp_fraction_for_senders;
        let t = (self.avg_rtcp_size * effective_members) / bw_share;
        let t = t.max(RTCP_MIN_TIME_SECS);

        if self.initial { t / 2.0 } else { t }
    }

    /// Randomizes the calculated interval within `[0.5T, 1.5T] /
    /// 1.21828` and advances `Tp`/`Tn` (§6.3.1, "schedule next
    /// transmission").
    pub fn schedule_next(&mut self) {
        let t = self.calculated_interval_secs();
        let factor = rand::thread_rng().gen_range(0.5..1.5);
        let randomized = (t * factor) / COMPENSATION_FACTOR;

        self.tp = self.tn;
        self.tn = self.tp + Duration::from_secs_f64(randomized);
    }

    /// Called immediately after an RTCP compound packet is actually
    /// transmitted: clears `initial`, folds the packet's size into the
    /// running average, resets `pmembers`, and schedules the next tick.
    pub fn on_rtcp_sent(&mut self, packet_size_bytes: usize) {
        self.initial = false;
        self.avg_rtcp_size = self.avg_rtcp_size + (packet_size_bytes as f64 - self.avg_rtcp_size) / 16.0;
        self.pmembers = self.members;
        self.schedule_next();
    }

    /// Applies the reverse-reconsideration rule (§6.3.4) when a BYE drops
    /// the active member count below `pmembers`: rescales `Tn`/`Tp` so the
    /// group converges to the new, smaller interval faster instead of
    /// waiting out a timer sized for the old membership.
    pub fn on_bye_received(&mut self, members_after_bye: u32) {
        if members_after_bye < self.pmembers {
            let scale = members_after_bye.max(1) as f64 / self.pmembers.max(1) as f64;
            let now = Instant::now();

            let remaining_to_tn = self.tn.saturating_duration_since(now);
            self.tn = now + Duration::from_secs_f64(remaining_to_tn.as_secs_f64() * scale);

            let elapsed_since_tp = now.saturating_duration_since(self.tp);
            self.tp = now - Duration::from_secs_f64(elapsed_since_tp.as_secs_f64() * scale);

            self.members = members_after_bye;
            self.pmembers = members_after_bye;
        } else {
            self.members = members_after_bye;
        }
    }

    pub fn is_initial(&self) -> bool {
        self.initial
    }

    pub fn avg_rtcp_size(&self) -> f64 {
        self.avg_rtcp_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_interval_is_halved() {
        let scheduler = RtcpScheduler::new(4000.0);
        let t = scheduler.calculated_interval_secs();
        assert!(t >= RTCP_MIN_TIME_SECS / 2.0);
    }

    #[test]
    fn sending_clears_initial_flag() {
        let mut scheduler = RtcpScheduler::new(4000.0);
        assert!(scheduler.is_initial());
        scheduler.on_rtcp_sent(300);
        assert!(!scheduler.is_initial());
    }

    #[test]
    fn reverse_reconsideration_shrinks_interval_on_membership_drop() {
        let mut scheduler = RtcpScheduler::new(4000.0);
        scheduler.set_member_count(10);
        scheduler.on_rtcp_sent(300);
        let tn_before = scheduler.next_interval_deadline();

        scheduler.on_bye_received(2);
        let tn_after = scheduler.next_interval_deadline();
        assert!(tn_after <= tn_before);
    }

    #[test]
    fn avg_rtcp_size_converges_toward_observed_packet_size() {
        let mut scheduler = RtcpScheduler::new(4000.0);
        for _ in 0..200 {
            scheduler.on_rtcp_sent(500);
        }
        assert!((scheduler.avg_rtcp_size() - 500.0).abs() < 1.0);
    }
}

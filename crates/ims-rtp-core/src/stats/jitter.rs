//! Interarrival jitter estimation (RFC 3550 §6.4.1, Appendix A.8).

use std::time::Instant;

use crate::time::duration_to_rtp_timestamp;

/// Running estimate of interarrival jitter, computed with the same
/// exponential smoothing (gain 1/16) the RFC's sample code uses.
pub struct JitterEstimator {
    clock_rate: u32,
    previous: Option<(Instant, u32)>,
    jitter: f64,
}

impl JitterEstimator {
    pub fn new(clock_rate: u32) -> Self {
        Self { clock_rate, previous: None, jitter: 0.0 }
    }

    /// Feeds in a newly arrived packet's RTP timestamp and local arrival
    /// time, returning the updated jitter estimate in RTP timestamp units.
    pub fn update(&mut self, timestamp: u32, arrival: Instant) -> f64 {
        if let Some((prev_arrival, prev_timestamp)) = self.previous {
            // D(i,j) = (Rj - Ri) - (Sj - Si), both expressed in RTP units.
            let arrival_delta = arrival.saturating_duration_since(prev_arrival);
            let arrival_units = duration_to_rtp_timestamp(arrival_delta, self.clock_rate) as i64;
            let timestamp_delta = timestamp as i64 - prev_timestamp as i64;
            let d = arrival_units - timestamp_delta;
            self.jitter += (d.unsigned_abs() as f64 - self.jitter) / 16.0;
        }
        self.previous = Some((arrival, timestamp));
        self.jitter
    }

    pub fn value(&self) -> f64 {
        self.jitter
    }

    pub fn reset(&mut self) {
        self.previous = None;
        self.jitter = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn constant_inter_packet_spacing_converges_to_zero_jitter() {
        let mut est = JitterEstimator::new(8000);
        let start = Instant::now();
        let mut ts = 0u32;
        let mut arrival = start;
        for _ in 0..50 {
            est.update(ts, arrival);
            ts += 160; // 20ms of audio at 8kHz
            arrival += Duration::from_millis(20);
        }
        assert!(est.value() < 1.0);
    }

    #[test]
    fn first_sample_does_not_move_the_estimate() {
        let mut est = JitterEstimator::new(8000);
        assert_eq!(est.update(0, Instant::now()), 0.0);
    }
}

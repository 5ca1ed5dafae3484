//! Bounded-memory streaming percentile estimator.
//!
//! A fixed-capacity ring buffer of `f64` millisecond observations,
//! overwritten oldest-first once full, with a sorted-copy percentile query
//! on demand.

use std::sync::Mutex;

/// Ring buffer of the last `N` latency observations (milliseconds). A
/// percentile query sorts a copy of the current window and applies the
/// nearest-rank tie-break: `percentile(q)` = value at sorted index
/// `ceil(q * m) - 1`, where `m` is the number of observations currently
/// held (`m <= N`).
pub struct LatencyEstimator {
    capacity: usize,
    window: Mutex<Vec<f64>>,
    /// Index of the oldest entry in `window`, once it has wrapped.
    next: Mutex<usize>,
}

impl LatencyEstimator {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            window: Mutex::new(Vec::with_capacity(capacity.max(1))),
            next: Mutex::new(0),
        }
    }

    pub fn observe(&self, latency_ms: f64) {
        let mut window = self.window.lock().expect("latency window lock poisoned");
        if window.len() < self.capacity {
            window.push(latency_ms);
        } else {
            let mut next = self.next.lock().expect("latency cursor lock poisoned");
            window[*next] = latency_ms;
            *next = (*next + 1) % self.capacity;
        }
    }

    /// Nearest-rank percentile over the current window. Returns `None`
    /// when no observations have been recorded yet.
    pub fn percentile(&self, q: f64) -> Option<f64> {
        let window = self.window.lock().expect("latency window lock poisoned");
        let m = window.len();
        if m == 0 {
            return None;
        }
        let mut sorted = window.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).expect("latency observation is NaN"));
        let rank = ((q * m as f64).ceil() as usize).max(1);
        Some(sorted[rank - 1])
    }

    pub fn snapshot(&self) -> LatencySnapshot {
        LatencySnapshot {
            p50: self.percentile(0.50),
            p90: self.percentile(0.90),
            p95: self.percentile(0.95),
            p99: self.percentile(0.99),
        }
    }

    pub fn len(&self) -> usize {
        self.window.lock().expect("latency window lock poisoned").len()
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct LatencySnapshot {
    pub p50: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_estimator_has_no_percentiles() {
        let e = LatencyEstimator::new(1000);
        assert_eq!(e.percentile(0.5), None);
    }

    #[test]
    fn percentiles_follow_nearest_rank_over_100_samples() {
        let e = LatencyEstimator::new(1000);
        for i in 1..=100u32 {
            e.observe((i * 10) as f64);
        }
        assert_eq!(e.percentile(0.50), Some(500.0));
        assert_eq!(e.percentile(0.90), Some(900.0));
        assert_eq!(e.percentile(0.95), Some(950.0));
        assert_eq!(e.percentile(0.99), Some(990.0));
    }

    #[test]
    fn percentile_ordering_invariant_holds() {
        let e = LatencyEstimator::new(200);
        for i in 0..173u32 {
            e.observe((i * i % 97) as f64);
        }
        let snap = e.snapshot();
        let (p50, p90, p95, p99) = (
            snap.p50.unwrap(),
            snap.p90.unwrap(),
            snap.p95.unwrap(),
            snap.p99.unwrap(),
        );
        assert!(p50 <= p90 && p90 <= p95 && p95 <= p99);
    }

    #[test]
    fn window_smaller_than_capacity_uses_its_own_length() {
        let e = LatencyEstimator::new(1000);
        for v in [10.0, 20.0, 30.0, 40.0] {
            e.observe(v);
        }
        // m = 4: p50 -> index ceil(0.5*4)-1 = 1 -> 20.0
        assert_eq!(e.percentile(0.5), Some(20.0));
    }

    #[test]
    fn ring_buffer_evicts_oldest_observation() {
        let e = LatencyEstimator::new(3);
        e.observe(1.0);
        e.observe(2.0);
        e.observe(3.0);
        assert_eq!(e.len(), 3);
        // Evicts the 1.0 observation.
        e.observe(100.0);
        assert_eq!(e.len(), 3);
        assert_eq!(e.percentile(1.0), Some(100.0));
        assert_eq!(e.percentile(0.01), Some(2.0));
    }
}

//! Cost/insight diminishing-returns tracking.

use std::collections::VecDeque;

/// One iteration's cost/novelty sample.
#[derive(Debug, Clone, Copy)]
pub struct InsightRecord {
    pub tokens_used: u32,
    pub cost: f64,
    pub state_changed: bool,
    pub output_novelty: f64,
    pub timestamp: u64,
}

pub struct CostPerInsightTracker {
    window_size: usize,
    min_iterations: usize,
    novelty_floor: f64,
    records: VecDeque<InsightRecord>,
}

impl CostPerInsightTracker {
    pub fn new(window_size: usize, min_iterations: usize, novelty_floor: f64) -> Self {
        Self { window_size, min_iterations, novelty_floor, records: VecDeque::with_capacity(window_size * 2) }
    }

    pub fn record(&mut self, record: InsightRecord) {
        if self.records.len() == self.window_size * 2 {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    fn window(&self) -> Vec<&InsightRecord> {
        self.records.iter().rev().take(self.window_size).collect()
    }

    /// Returns `Some(reason)` if the tracker recommends terminating the
    /// agent, checked in this exact order.
    pub fn should_terminate(&self) -> Option<String> {
        if self.records.len() < self.min_iterations {
            return None;
        }

        let window = self.window();

        if !window.iter().any(|r| r.state_changed) {
            let total_cost: f64 = window.iter().map(|r| r.cost).sum();
            return Some(format!(
                "No state changes in last {} iterations (cost: ${:.4}). Agent is not making progress.",
                window.len(),
                total_cost
            ));
        }

        let avg_novelty = window.iter().map(|r| r.output_novelty).sum::<f64>() / window.len() as f64;
        if avg_novelty < self.novelty_floor {
            return Some(format!(
                "Average novelty {:.3} below threshold {:.3}.",
                avg_novelty, self.novelty_floor
            ));
        }

        if window.len() >= 4 {
            // window is newest-first; split into first/second half of
            // chronological order by reversing back.
            let chrono: Vec<&InsightRecord> = window.iter().rev().copied().collect();
            let mid = chrono.len() / 2;
            let (first_half, second_half) = chrono.split_at(mid);
            let c1: f64 = first_half.iter().map(|r| r.cost).sum();
            let c2: f64 = second_half.iter().map(|r| r.cost).sum();
            let n1 = first_half.iter().map(|r| r.output_novelty).sum::<f64>() / first_half.len() as f64;
            let n2 = second_half.iter().map(|r| r.output_novelty).sum::<f64>() / second_half.len() as f64;

            if c2 > 1.5 * c1 && n2 < 0.5 * n1 {
                return Some("Cost increasing while insight decreasing.".to_string());
            }
        }

        None
    }

    /// `min(1, 0.6*avg_novelty + 0.4*state_change_rate)`; `1.0` when the
    /// window is empty or cumulative cost is zero.
    pub fn efficiency_score(&self) -> f64 {
        let window = self.window();
        let total_cost: f64 = window.iter().map(|r| r.cost).sum();
        if window.is_empty() || total_cost == 0.0 {
            return 1.0;
        }
        let avg_novelty = window.iter().map(|r| r.output_novelty).sum::<f64>() / window.len() as f64;
        let state_change_rate = window.iter().filter(|r| r.state_changed).count() as f64 / window.len() as f64;
        (0.6 * avg_novelty + 0.4 * state_change_rate).min(1.0)
    }
}

impl Default for CostPerInsightTracker {
    fn default() -> Self {
        Self::new(10, 3, 0.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(cost: f64, novelty: f64, state_changed: bool) -> InsightRecord {
        InsightRecord { tokens_used: 100, cost, state_changed, output_novelty: novelty, timestamp: 0 }
    }

    #[test]
    fn below_min_iterations_never_terminates() {
        let mut tracker = CostPerInsightTracker::new(5, 3, 0.1);
        tracker.record(record(0.01, 0.0, false));
        assert!(tracker.should_terminate().is_none());
    }

    #[test]
    fn no_state_changes_in_window_terminates() {
        let mut tracker = CostPerInsightTracker::new(3, 3, 0.0);
        for _ in 0..3 {
            tracker.record(record(0.01, 0.5, false));
        }
        let reason = tracker.should_terminate().unwrap();
        assert!(reason.contains("No state changes"));
    }

    #[test]
    fn low_average_novelty_terminates() {
        let mut tracker = CostPerInsightTracker::new(3, 3, 0.5);
        for _ in 0..3 {
            tracker.record(record(0.01, 0.05, true));
        }
        let reason = tracker.should_terminate().unwrap();
        assert!(reason.contains("novelty"));
    }

    #[test]
    fn efficiency_score_is_one_when_cost_is_zero() {
        let tracker = CostPerInsightTracker::new(5, 3, 0.1);
        assert_eq!(tracker.efficiency_score(), 1.0);
    }

    #[test]
    fn cost_up_insight_down_terminates() {
        let mut tracker = CostPerInsightTracker::new(4, 4, 0.0);
        tracker.record(record(0.01, 0.9, true));
        tracker.record(record(0.01, 0.9, true));
        tracker.record(record(0.05, 0.1, true));
        tracker.record(record(0.05, 0.1, true));
        let reason = tracker.should_terminate().unwrap();
        assert!(reason.contains("Cost increasing"));
    }
}

//! Loop detection and diminishing-returns tracking.
//!
//! Grounded line-for-line on the reference implementation's loop detector:
//! four checks in a fixed order, with a deliberate asymmetry in when the
//! current output is added to history (see [`LoopDetector::check`]).

mod insight;

pub use insight::{CostPerInsightTracker, InsightRecord};

use std::collections::VecDeque;

use sha2::{Digest, Sha256};

/// Which strategy classified the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopType {
    ExactRepeat,
    Oscillation,
    SemanticLoop,
    LengthStagnation,
}

impl LoopType {
    fn suggestion(self) -> &'static str {
        match self {
            LoopType::ExactRepeat => "the agent is repeating an identical response",
            LoopType::Oscillation => "the agent is oscillating between a small set of responses",
            LoopType::SemanticLoop => "the agent's responses are semantically converging without progress",
            LoopType::LengthStagnation => "the agent's response length has stagnated across iterations",
        }
    }
}

/// Result of a single `check` call.
#[derive(Debug, Clone)]
pub enum LoopDetectionResult {
    NoLoop,
    Loop { loop_type: LoopType, confidence: f64, suggestion: String },
}

impl LoopDetectionResult {
    pub fn is_loop(&self) -> bool {
        matches!(self, LoopDetectionResult::Loop { .. })
    }
}

/// Bounded-window classifier over a stream of agent outputs.
pub struct LoopDetector {
    window_size: usize,
    hash_threshold: usize,
    similarity_threshold: f64,
    length_stagnation_window: usize,

    outputs: VecDeque<String>,
    hashes: VecDeque<String>,
    lengths: VecDeque<usize>,
}

impl LoopDetector {
    pub fn new(window_size: usize, hash_threshold: usize, similarity_threshold: f64, length_stagnation_window: usize) -> Self {
        Self {
            window_size,
            hash_threshold,
            similarity_threshold,
            length_stagnation_window,
            outputs: VecDeque::with_capacity(window_size),
            hashes: VecDeque::with_capacity(window_size * 2),
            lengths: VecDeque::with_capacity(window_size),
        }
    }

    /// Check one new output against history, in this exact order:
    /// exact-repeat (checked BEFORE recording), then record, then
    /// oscillation / semantic-similarity / length-stagnation (all checked
    /// AFTER recording, so the current output is already in history for
    /// those three). This asymmetry is deliberate: it is what makes the
    /// fourth identical arrival trip exact-repeat (boundary B1) while still
    /// letting oscillation compare against a history that includes the
    /// output that just arrived.
    pub fn check(&mut self, output: &str) -> LoopDetectionResult {
        let hash = hash_prefix(output);

        // 1. Exact repeat - counted against history BEFORE this output is recorded.
        let prior_count = self.hashes.iter().filter(|h| **h == hash).count();
        if prior_count >= self.hash_threshold {
            let confidence = ((prior_count + 1) as f64 / (self.hash_threshold + 2) as f64).min(1.0);
            self.record(output, &hash);
            return LoopDetectionResult::Loop {
                loop_type: LoopType::ExactRepeat,
                confidence,
                suggestion: LoopType::ExactRepeat.suggestion().to_string(),
            };
        }

        // 2. Record.
        self.record(output, &hash);

        // 3. Oscillation.
        if let Some(result) = self.check_oscillation() {
            return result;
        }

        // 4. Semantic similarity (compares against all-but-the-current entry).
        if let Some(result) = self.check_semantic_similarity(output) {
            return result;
        }

        // 5. Length stagnation.
        if self.check_length_stagnation() {
            return LoopDetectionResult::Loop {
                loop_type: LoopType::LengthStagnation,
                confidence: 0.6,
                suggestion: LoopType::LengthStagnation.suggestion().to_string(),
            };
        }

        LoopDetectionResult::NoLoop
    }

    fn record(&mut self, output: &str, hash: &str) {
        if self.outputs.len() == self.window_size {
            self.outputs.pop_front();
        }
        self.outputs.push_back(output.to_string());

        if self.hashes.len() == self.window_size * 2 {
            self.hashes.pop_front();
        }
        self.hashes.push_back(hash.to_string());

        if self.lengths.len() == self.window_size {
            self.lengths.pop_front();
        }
        self.lengths.push_back(output.chars().count());
    }

    fn check_oscillation(&self) -> Option<LoopDetectionResult> {
        let recent: Vec<&String> = self.hashes.iter().rev().take(6).rev().collect();
        if recent.len() < 4 {
            return None;
        }

        let period2 = (0..recent.len() - 2).all(|i| recent[i] == recent[i + 2]) && recent[recent.len() - 1] != recent[recent.len() - 2];
        if period2 {
            return Some(LoopDetectionResult::Loop {
                loop_type: LoopType::Oscillation,
                confidence: 0.9,
                suggestion: LoopType::Oscillation.suggestion().to_string(),
            });
        }

        if recent.len() >= 6 {
            let period3 = (0..recent.len() - 3).all(|i| recent[i] == recent[i + 3]);
            let distinct_first_three: std::collections::HashSet<&&String> = recent[..3].iter().collect();
            if period3 && distinct_first_three.len() >= 2 {
                return Some(LoopDetectionResult::Loop {
                    loop_type: LoopType::Oscillation,
                    confidence: 0.85,
                    suggestion: LoopType::Oscillation.suggestion().to_string(),
                });
            }
        }

        None
    }

    fn check_semantic_similarity(&self, current: &str) -> Option<LoopDetectionResult> {
        if self.outputs.len() < 2 {
            return None;
        }
        // The current output is already the last entry (recorded above);
        // compare against everything before it.
        let previous_count = self.outputs.len() - 1;

        let mut similar_count = 0usize;
        let mut max_sim = 0.0f64;
        for other in self.outputs.iter().take(previous_count) {
            let sim = jaccard_similarity(current, other);
            if sim > self.similarity_threshold {
                similar_count += 1;
                if sim > max_sim {
                    max_sim = sim;
                }
            }
        }

        if similar_count >= 2 {
            let confidence = (max_sim * (similar_count as f64 / previous_count as f64)).min(1.0);
            return Some(LoopDetectionResult::Loop {
                loop_type: LoopType::SemanticLoop,
                confidence,
                suggestion: LoopType::SemanticLoop.suggestion().to_string(),
            });
        }
        None
    }

    fn check_length_stagnation(&self) -> bool {
        if self.lengths.len() < self.length_stagnation_window {
            return false;
        }
        let window: Vec<usize> = self.lengths.iter().rev().take(self.length_stagnation_window).copied().collect();
        window.windows(2).all(|w| w[0] == w[1])
    }

    pub fn reset(&mut self) {
        self.outputs.clear();
        self.hashes.clear();
        self.lengths.clear();
    }

    pub fn hash_count(&self) -> usize {
        self.hashes.len()
    }
}

impl Default for LoopDetector {
    fn default() -> Self {
        Self::new(10, 3, 0.85, 5)
    }
}

fn hash_prefix(output: &str) -> String {
    let digest = Sha256::digest(output.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..16].to_string()
}

/// Jaccard similarity over whitespace-separated, lowercased word sets.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let words_a: std::collections::HashSet<String> = a.to_lowercase().split_whitespace().map(str::to_string).collect();
    let words_b: std::collections::HashSet<String> = b.to_lowercase().split_whitespace().map(str::to_string).collect();
    if words_a.is_empty() && words_b.is_empty() {
        return 1.0;
    }
    let intersection = words_a.intersection(&words_b).count();
    let union = words_a.union(&words_b).count();
    if union == 0 { 0.0 } else { intersection as f64 / union as f64 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourth_identical_arrival_trips_exact_repeat() {
        // default hash_threshold = 3: first three build history, the
        // fourth sees the threshold met (boundary B1).
        let mut detector = LoopDetector::default();
        for _ in 0..3 {
            assert!(!detector.check("same output").is_loop());
        }
        let result = detector.check("same output");
        assert!(matches!(
            result,
            LoopDetectionResult::Loop { loop_type: LoopType::ExactRepeat, .. }
        ));
    }

    #[test]
    fn distinct_outputs_never_trip_exact_repeat() {
        let mut detector = LoopDetector::default();
        for i in 0..10 {
            let result = detector.check(&format!("unique output number {i} with enough distinct words to avoid similarity"));
            assert!(!result.is_loop());
        }
    }

    #[test]
    fn hash_buffer_never_exceeds_twice_window_size() {
        let mut detector = LoopDetector::new(5, 3, 0.85, 5);
        for i in 0..50 {
            detector.check(&format!("distinct message {i}"));
            assert!(detector.hash_count() <= 10);
        }
    }

    #[test]
    fn reset_clears_all_buffers() {
        let mut detector = LoopDetector::default();
        detector.check("something");
        detector.reset();
        assert_eq!(detector.hash_count(), 0);
    }

    #[test]
    fn jaccard_similarity_is_one_for_identical_word_sets() {
        assert!((jaccard_similarity("hello world", "world hello") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn jaccard_similarity_is_zero_for_disjoint_word_sets() {
        assert_eq!(jaccard_similarity("alpha beta", "gamma delta"), 0.0);
    }
}

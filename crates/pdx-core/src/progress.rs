//! Progress reporting for merge operations

use serde::{Deserialize, Serialize};

/// Progress notification published during a merge
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ProgressEvent {
    DefinitionMerge { percentage: f64 },
    /// `step` 1 lists mod files, step 2 copies them
    FileMerge { step: u8, percentage: f64 },
}

/// Share of `processed` in `total` as a percentage, rounded to two
/// decimals and clamped to `0..=max`
pub fn progress_percentage(total: usize, processed: usize, max: f64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let percentage = (processed as f64 / total as f64 * 100.0 * 100.0).round() / 100.0;
    percentage.clamp(0.0, max)
}

/// Turns processed counts into a non-decreasing sequence of changed values
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total: usize,
    processed: usize,
    max: f64,
    last: f64,
}

impl ProgressTracker {
    pub fn new(total: usize, max: f64) -> Self {
        Self {
            total,
            processed: 0,
            max,
            last: 0.0,
        }
    }

    /// Record `count` processed items, returning the percentage to publish
    /// when it changed
    pub fn advance(&mut self, count: usize) -> Option<f64> {
        self.processed += count;
        let percentage = progress_percentage(self.total, self.processed, self.max);
        self.update(percentage)
    }

    /// Final value, `100` unless already published
    pub fn finish(&mut self) -> Option<f64> {
        self.update(100.0)
    }

    pub fn last(&self) -> f64 {
        self.last
    }

    fn update(&mut self, percentage: f64) -> Option<f64> {
        if percentage > self.last {
            self.last = percentage;
            Some(percentage)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percentage_rounds_and_clamps() {
        assert_eq!(progress_percentage(3, 1, 100.0), 33.33);
        assert_eq!(progress_percentage(3, 2, 100.0), 66.67);
        assert_eq!(progress_percentage(10, 10, 99.9), 99.9);
        assert_eq!(progress_percentage(10, 25, 100.0), 100.0);
        assert_eq!(progress_percentage(0, 5, 100.0), 0.0);
    }

    #[test]
    fn test_ten_file_sequence_ends_at_hundred() {
        let mut tracker = ProgressTracker::new(10, 99.9);
        let mut published = Vec::new();
        for _ in 0..10 {
            published.extend(tracker.advance(1));
        }
        published.extend(tracker.finish());

        assert!(published.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(published.last().copied(), Some(100.0));
        assert_eq!(published[published.len() - 2], 99.9);
        assert!(tracker.finish().is_none());
    }

    #[test]
    fn test_unchanged_value_is_not_published() {
        let mut tracker = ProgressTracker::new(100_000, 100.0);
        assert!(tracker.advance(1).is_none());
        assert!(tracker.advance(1).is_none());
        assert_eq!(tracker.advance(998), Some(1.0));
    }
}

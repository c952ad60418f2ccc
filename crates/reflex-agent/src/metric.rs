//! Change magnitude between artifact versions

use std::sync::Arc;

use similar::TextDiff;

/// A dissimilarity between two versions, normalized to `[0, 1]`.
///
/// Identical inputs must score `0.0`, and the score must not decrease as
/// more of the text changes.
pub trait ChangeMetric: Send + Sync {
    fn name(&self) -> &'static str;

    fn change(&self, previous: &str, current: &str) -> f64;
}

/// `1 - similarity` of a word-level diff
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffRatio;

impl ChangeMetric for DiffRatio {
    fn name(&self) -> &'static str {
        "diff_ratio"
    }

    fn change(&self, previous: &str, current: &str) -> f64 {
        if previous == current {
            return 0.0;
        }
        let ratio = TextDiff::from_words(previous, current).ratio() as f64;
        (1.0 - ratio).clamp(0.0, 1.0)
    }
}

/// Relative difference in length
#[derive(Debug, Clone, Copy, Default)]
pub struct SizeDelta;

impl ChangeMetric for SizeDelta {
    fn name(&self) -> &'static str {
        "size_delta"
    }

    fn change(&self, previous: &str, current: &str) -> f64 {
        let (a, b) = (previous.len() as f64, current.len() as f64);
        let max = a.max(b);
        if max == 0.0 {
            return 0.0;
        }
        ((a - b).abs() / max).clamp(0.0, 1.0)
    }
}

/// Look up a metric by its config name
pub fn metric_by_name(name: &str) -> Option<Arc<dyn ChangeMetric>> {
    match name {
        "diff_ratio" | "diff" => Some(Arc::new(DiffRatio)),
        "size_delta" | "size" => Some(Arc::new(SizeDelta)),
        _ => None,
    }
}

/// Whitespace-separated word count
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

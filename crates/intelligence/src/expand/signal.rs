//! Strong-signal detection: skip query expansion when the initial BM25
//! search is already confident.
//!
//! Expansion is the one piece of query handling that costs an extra model
//! round trip, so it is only worth paying for when the unexpanded search
//! looks shaky. [`SignalDetector`] makes that call from the scores alone,
//! with no model involved.

/// A single scored search result, the only field the signal check needs.
#[derive(Debug, Clone, Copy)]
pub struct ScoredResult {
    /// The result's BM25 (or fused) relevance score.
    pub score: f32,
}

/// Detects a strong BM25 signal to skip unnecessary query expansion.
///
/// A strong signal means the top result is both confident on its own and
/// well separated from the runner-up, so expanding the query is unlikely to
/// surface anything better.
#[derive(Debug, Clone, Copy)]
pub struct SignalDetector {
    /// Skip expansion if the top score is at least this.
    pub strong_signal_threshold: f32,
    /// Required gap between the top and second scores to count as separated.
    pub separation_threshold: f32,
}

impl Default for SignalDetector {
    fn default() -> Self {
        SignalDetector {
            strong_signal_threshold: 0.85,
            separation_threshold: 0.10,
        }
    }
}

impl SignalDetector {
    /// A detector with explicit thresholds.
    pub fn new(strong_signal_threshold: f32, separation_threshold: f32) -> Self {
        SignalDetector {
            strong_signal_threshold,
            separation_threshold,
        }
    }

    /// Whether `results` show a strong signal (top score high and
    /// well-separated from the second).
    pub fn has_strong_signal(&self, results: &[ScoredResult]) -> bool {
        let Some(top) = results.first() else {
            return false;
        };
        let second = results.get(1).map(|r| r.score).unwrap_or(0.0);
        top.score >= self.strong_signal_threshold && (top.score - second) >= self.separation_threshold
    }

    /// Whether expansion is warranted for `results` — the negation of
    /// [`Self::has_strong_signal`].
    pub fn should_expand(&self, results: &[ScoredResult]) -> bool {
        !self.has_strong_signal(results)
    }
}

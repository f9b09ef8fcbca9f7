//! Lightweight per-operation counters for diagnostics.
//!
//! The cache and evaluator increment a named counter on every hot-path call;
//! dump surfaces read them back sorted to show where traffic is going.

use std::collections::HashMap;

/// Tallies how often each named operation has run.
///
/// Operation names are static strings so the hot path never allocates.
#[derive(Debug, Default, Clone)]
pub struct OperationCounter {
    counts: HashMap<&'static str, u64>,
}

impl OperationCounter {
    /// Create a new, empty counter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment an operation's count by one.
    pub fn increment(&mut self, operation: &'static str) {
        *self.counts.entry(operation).or_insert(0) += 1;
    }

    /// Decrement an operation's count by one, saturating at zero.
    pub fn decrement(&mut self, operation: &'static str) {
        let entry = self.counts.entry(operation).or_insert(0);
        *entry = entry.saturating_sub(1);
    }

    /// Count for one operation, zero if never seen.
    #[must_use]
    pub fn get(&self, operation: &str) -> u64 {
        self.counts.get(operation).copied().unwrap_or(0)
    }

    /// All counts, highest first. Ties break by name for stable output.
    #[must_use]
    pub fn sorted(&self) -> Vec<(&'static str, u64)> {
        let mut entries: Vec<(&'static str, u64)> =
            self.counts.iter().map(|(&op, &n)| (op, n)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        entries
    }

    /// Reset every count.
    pub fn clear(&mut self) {
        self.counts.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide generator of segment identifiers.
///
/// Ids have the form `{interaction_id}-seg-{n}` where `n` is drawn from a
/// single shared counter, so every id in a run is unique across interactions.
/// Callers must not expect contiguous `n` within one interaction.
#[derive(Debug, Default)]
pub struct SegmentIdGenerator {
    counter: AtomicU64,
}

impl SegmentIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next segment id for the given interaction.
    pub fn next(&self, interaction_id: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{interaction_id}-seg-{n}")
    }
}

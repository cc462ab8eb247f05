//! Optional cache statistics.
//!
//! Compulsory misses are first sightings of a (entry, frame) pair;
//! non-compulsory misses are re-renders of frames the cache has seen
//! before, the ones a better policy could have avoided. Indirection
//! entries never cache, so they are excluded from all counts.

use std::collections::HashSet;

use uuid::Uuid;

/// Hit/miss counters.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: u64,
    compulsory_misses: u64,
    noncompulsory_misses: u64,
    seen: HashSet<(Uuid, u64)>,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn hit(&mut self, is_indirection: bool) {
        if !is_indirection {
            self.hits += 1;
        }
    }

    pub(crate) fn miss(&mut self, entry_id: Uuid, n: u64, is_indirection: bool) {
        if !is_indirection {
            if self.seen.contains(&(entry_id, n)) {
                self.noncompulsory_misses += 1;
            } else {
                self.compulsory_misses += 1;
            }
        }
    }

    pub(crate) fn seen_frame(&mut self, entry_id: Uuid, n: u64) {
        self.seen.insert((entry_id, n));
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn compulsory_misses(&self) -> u64 {
        self.compulsory_misses
    }

    pub fn noncompulsory_misses(&self) -> u64 {
        self.noncompulsory_misses
    }

    /// Hits over avoidable lookups.
    pub fn hit_ratio(&self) -> Option<f64> {
        let denominator = self.hits + self.noncompulsory_misses;
        if denominator == 0 {
            None
        } else {
            Some(self.hits as f64 / denominator as f64)
        }
    }

    /// One-line summary for the console.
    pub fn summary(&self) -> String {
        let ratio = self
            .hit_ratio()
            .map_or_else(|| "inf".to_string(), |ratio| format!("{ratio:.5}"));
        format!(
            "Cache stats: {} h / {} ncm / {} cm / {} hr",
            self.hits, self.noncompulsory_misses, self.compulsory_misses, ratio
        )
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

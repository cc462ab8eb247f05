//! Eviction policies.
//!
//! All four policies share one interface; the store runs the eviction
//! loop and asks the policy which frame dies next. The specialised
//! policy ranks whole entries by priority and evicts from the middle of
//! the victim entry's recency queue; the others treat (entry, frame)
//! pairs uniformly.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::entry::CacheEntry;
use crate::cache::queue::RecentlyUsedQueue;

/// Which eviction policy the cache runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheAlgorithm {
    #[default]
    Specialised,
    Fifo,
    Lru,
    Mru,
}

impl std::str::FromStr for CacheAlgorithm {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text {
            "specialised" => Ok(Self::Specialised),
            "fifo" => Ok(Self::Fifo),
            "lru" => Ok(Self::Lru),
            "mru" => Ok(Self::Mru),
            other => Err(format!("unknown cache algorithm {other:?}")),
        }
    }
}

/// The policy interface the store drives.
pub trait EvictionPolicy: Send {
    /// A cached frame was served.
    fn on_hit(&mut self, entry: &Arc<CacheEntry>, n: u64);

    /// Select the next frame to evict to make room for a frame of
    /// `candidate`, or `None` when the admission rule refuses to evict
    /// anything for it. The store calls this repeatedly until the new
    /// frame fits or the policy gives up; the gate is re-evaluated
    /// against the current victim on every call.
    fn choose_victim(&mut self, candidate: &Arc<CacheEntry>) -> Option<(Arc<CacheEntry>, u64)>;

    /// A frame of `entry` was admitted.
    fn on_admit(&mut self, entry: &Arc<CacheEntry>, n: u64, bytes: usize);

    /// Reprioritise finished; `entries` are the surviving committed
    /// entries.
    fn rebuild(&mut self, entries: &[Arc<CacheEntry>]);
}

/// Construct the policy for an algorithm.
pub fn make_policy(algorithm: CacheAlgorithm) -> Box<dyn EvictionPolicy> {
    match algorithm {
        CacheAlgorithm::Specialised => Box::new(SpecialisedPolicy::default()),
        CacheAlgorithm::Fifo => Box::new(FifoPolicy::default()),
        CacheAlgorithm::Lru => Box::new(RecencyPolicy::lru()),
        CacheAlgorithm::Mru => Box::new(RecencyPolicy::mru()),
    }
}

// ── Specialised ─────────────────────────────────────────────────

/// Entries sorted by priority ascending, with a cursor on the leftmost
/// lowest-priority non-empty entry (the victim). Within the victim,
/// frames die from the middle of its recency queue. Admission demands a
/// victim with strictly lower priority than the candidate, so ties are
/// rejected deterministically.
#[derive(Default)]
pub struct SpecialisedPolicy {
    /// Entries in ascending priority order as of the last rebuild.
    queue: Vec<Arc<CacheEntry>>,
    /// Entry id -> position in `queue`.
    positions: HashMap<Uuid, usize>,
    /// Index of the current victim entry, if any.
    victim: Option<usize>,
}

impl SpecialisedPolicy {
    /// Advance the cursor to the leftmost non-empty entry at or after
    /// `start`.
    fn find_new_victim(&mut self, start: usize) {
        let mut index = start;
        while index < self.queue.len() && self.queue[index].cached_frame_count() == 0 {
            index += 1;
        }
        self.victim = if index < self.queue.len() {
            Some(index)
        } else {
            None
        };
    }

    fn peek(&self) -> Option<&Arc<CacheEntry>> {
        self.victim.map(|index| &self.queue[index])
    }
}

impl EvictionPolicy for SpecialisedPolicy {
    fn on_hit(&mut self, _entry: &Arc<CacheEntry>, _n: u64) {
        // Recency is tracked inside the entry's own queue.
    }

    fn choose_victim(&mut self, candidate: &Arc<CacheEntry>) -> Option<(Arc<CacheEntry>, u64)> {
        loop {
            let index = self.victim?;
            let entry = self.queue[index].clone();
            if entry.cached_frame_count() == 0 {
                self.find_new_victim(index);
                continue;
            }
            // Strict comparison: a tie never evicts, so admission is
            // deterministic.
            if entry.priority() >= candidate.priority() {
                return None;
            }
            match entry.pop_middle_held() {
                Some(n) => return Some((entry, n)),
                None => self.find_new_victim(index),
            }
        }
    }

    fn on_admit(&mut self, entry: &Arc<CacheEntry>, _n: u64, _bytes: usize) {
        // The new frame's entry becomes the victim if it ranks at or
        // below the current one; equal priorities keep the leftmost.
        let Some(&position) = self.positions.get(&entry.id()) else {
            return;
        };
        let current_priority = self.peek().map(|victim| victim.priority());
        match current_priority {
            None => self.victim = Some(position),
            Some(priority) => {
                if priority == entry.priority() {
                    self.victim = Some(self.victim.expect("victim is set").min(position));
                } else if priority > entry.priority() {
                    self.victim = Some(position);
                }
            }
        }
    }

    fn rebuild(&mut self, entries: &[Arc<CacheEntry>]) {
        self.queue = entries.to_vec();
        self.queue
            .sort_by(|a, b| a.priority().total_cmp(&b.priority()));
        self.positions = self
            .queue
            .iter()
            .enumerate()
            .map(|(index, entry)| (entry.id(), index))
            .collect();
        self.find_new_victim(0);
    }
}

// ── FIFO ────────────────────────────────────────────────────────

/// Insertion-ordered eviction.
#[derive(Default)]
pub struct FifoPolicy {
    queue: VecDeque<(Weak<CacheEntry>, u64)>,
}

impl EvictionPolicy for FifoPolicy {
    fn on_hit(&mut self, _entry: &Arc<CacheEntry>, _n: u64) {}

    fn choose_victim(&mut self, _candidate: &Arc<CacheEntry>) -> Option<(Arc<CacheEntry>, u64)> {
        while let Some((weak, n)) = self.queue.pop_front() {
            if let Some(entry) = weak.upgrade() {
                return Some((entry, n));
            }
        }
        None
    }

    fn on_admit(&mut self, entry: &Arc<CacheEntry>, n: u64, _bytes: usize) {
        self.queue.push_back((Arc::downgrade(entry), n));
    }

    fn rebuild(&mut self, _entries: &[Arc<CacheEntry>]) {
        self.queue.retain(|(weak, _)| weak.strong_count() > 0);
    }
}

// ── LRU / MRU ───────────────────────────────────────────────────

/// A recency queue over (entry, frame) pairs. Hits move to the head;
/// LRU evicts the tail, MRU the head.
pub struct RecencyPolicy {
    queue: RecentlyUsedQueue<(Uuid, u64)>,
    entries: HashMap<Uuid, Weak<CacheEntry>>,
    evict_head: bool,
}

impl RecencyPolicy {
    pub fn lru() -> Self {
        Self {
            queue: RecentlyUsedQueue::new(),
            entries: HashMap::new(),
            evict_head: false,
        }
    }

    pub fn mru() -> Self {
        Self {
            queue: RecentlyUsedQueue::new(),
            entries: HashMap::new(),
            evict_head: true,
        }
    }
}

impl EvictionPolicy for RecencyPolicy {
    fn on_hit(&mut self, entry: &Arc<CacheEntry>, n: u64) {
        self.entries
            .entry(entry.id())
            .or_insert_with(|| Arc::downgrade(entry));
        self.queue.access(&(entry.id(), n));
    }

    fn choose_victim(&mut self, _candidate: &Arc<CacheEntry>) -> Option<(Arc<CacheEntry>, u64)> {
        loop {
            let (id, n) = if self.evict_head {
                self.queue.pop_head()?
            } else {
                self.queue.pop_tail()?
            };
            if let Some(entry) = self.entries.get(&id).and_then(Weak::upgrade) {
                return Some((entry, n));
            }
            self.entries.remove(&id);
        }
    }

    fn on_admit(&mut self, entry: &Arc<CacheEntry>, n: u64, _bytes: usize) {
        self.entries
            .entry(entry.id())
            .or_insert_with(|| Arc::downgrade(entry));
        let key = (entry.id(), n);
        if !self.queue.contains(&key) {
            self.queue.insert(key);
        }
    }

    fn rebuild(&mut self, _entries: &[Arc<CacheEntry>]) {
        self.entries.retain(|_, weak| weak.strong_count() > 0);
    }
}

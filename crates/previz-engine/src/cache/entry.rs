//! Cache entries: the per-node state the cache persists across sessions.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use previz_core::SharedFrame;
use uuid::Uuid;

use crate::cache::queue::MiddleRecentlyUsedQueue;
use crate::node::Clip;

/// Age threshold beyond which an empty, low-priority entry is purged.
pub(crate) const PURGE_MAX_AGE: u32 = 5;
/// Priority threshold below which an old, empty entry is purged.
pub(crate) const PURGE_MIN_PRIORITY: f64 = 0.5;

/// The mutable state of a cache entry. One lock per entry; the engine
/// is single-threaded, the lock only satisfies shared ownership.
pub struct EntryState {
    /// Sessions since this node was last part of the current graph.
    pub age: u32,
    pub is_root: bool,
    /// Was this node absent from the previous session's graph?
    pub is_hotnode: bool,
    /// Does a hotnode consume this node?
    pub precedes_hotnode: bool,
    pub is_indirection: bool,
    /// Maximum path length from a root to this node.
    pub root_distance: u32,
    /// Session stamp guarding against re-visiting within one
    /// reprioritise.
    pub traverse_time: u64,
    /// Indirection entries whose priority this entry inherits.
    pub associated_indirections: Vec<Weak<CacheEntry>>,
    /// Reverse-edge index: successor node hash -> entry id -> entry.
    /// Lets reprioritise find a node's existing entry in O(out-degree)
    /// instead of O(d^2) equality probes.
    pub successors: HashMap<u64, HashMap<Uuid, Weak<CacheEntry>>>,
    /// The cached frames.
    frames: HashMap<u64, SharedFrame>,
    /// Recency queue over the cached frame indices, with a pop-middle
    /// operation for the specialised policy's victim selection.
    held: MiddleRecentlyUsedQueue<u64>,
}

/// The cached data and priority bookkeeping of a single clip.
pub struct CacheEntry {
    id: Uuid,
    /// The node this entry was created for. Later sessions' equivalent
    /// nodes share the entry without replacing this.
    node: Clip,
    pub state: Mutex<EntryState>,
}

impl CacheEntry {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        node: Clip,
        is_root: bool,
        is_hotnode: bool,
        precedes_hotnode: bool,
        root_distance: u32,
        is_indirection: bool,
        traverse_time: u64,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            node,
            state: Mutex::new(EntryState {
                age: 0,
                is_root,
                is_hotnode,
                precedes_hotnode,
                is_indirection,
                root_distance,
                traverse_time,
                associated_indirections: Vec::new(),
                successors: HashMap::new(),
                frames: HashMap::new(),
                held: MiddleRecentlyUsedQueue::new(),
            }),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The node this entry was created for.
    pub fn node(&self) -> &Clip {
        &self.node
    }

    // ── Frame storage ───────────────────────────────────────────

    /// Fetch a cached frame, recording the access in the recency queue.
    pub fn get_frame(&self, n: u64) -> Option<SharedFrame> {
        let mut state = self.state.lock();
        let frame = state.frames.get(&n).cloned();
        if frame.is_some() {
            state.held.access(&n);
        }
        frame
    }

    /// Store a frame, replacing any previous frame at `n`. Returns the
    /// net growth in bytes, so re-committing a frame that survived from
    /// an earlier session costs nothing.
    pub fn insert_frame(&self, n: u64, frame: SharedFrame) -> usize {
        let bytes = frame.nbytes();
        let mut state = self.state.lock();
        let replaced = state.frames.insert(n, frame);
        if replaced.is_none() {
            state.held.insert(n);
        }
        bytes.saturating_sub(replaced.map_or(0, |old| old.nbytes()))
    }

    /// Discard the frame at `n`, returning the bytes freed.
    pub fn discard_frame(&self, n: u64) -> usize {
        let mut state = self.state.lock();
        state.held.delete(&n);
        state.frames.remove(&n).map_or(0, |frame| frame.nbytes())
    }

    /// Pop the middle of the recency queue; the caller discards the
    /// returned frame index.
    pub(crate) fn pop_middle_held(&self) -> Option<u64> {
        self.state.lock().held.pop_middle()
    }

    /// Number of cached frames.
    pub fn cached_frame_count(&self) -> usize {
        self.state.lock().frames.len()
    }

    /// Total bytes held by this entry.
    pub fn cached_bytes(&self) -> usize {
        self.state
            .lock()
            .frames
            .values()
            .map(|frame| frame.nbytes())
            .sum()
    }

    /// The cached frame indices, unordered.
    pub fn cached_frames(&self) -> Vec<u64> {
        self.state.lock().frames.keys().copied().collect()
    }

    // ── Priorities ──────────────────────────────────────────────

    /// The raw priority formula. Recency dominates through the age
    /// halving; deeper nodes rank higher because they are more
    /// expensive to recompute; feeding a fresh hotnode (or being a
    /// preview leaf) earns a flat boost because the user is probably
    /// iterating there.
    pub fn raw_priority(&self) -> f64 {
        let state = self.state.lock();
        Self::raw_priority_of(&state)
    }

    fn raw_priority_of(state: &EntryState) -> f64 {
        let boost = (state.precedes_hotnode && !state.is_hotnode) || state.successors.is_empty();
        let numerator = if boost {
            1.0 + state.root_distance as f64 + 100.0
        } else {
            1.0 + state.root_distance as f64
        };
        numerator / 2f64.powi(state.age as i32)
    }

    /// The effective priority used for admission and eviction.
    ///
    /// Indirection entries store nothing and root entries are file
    /// backings rather than pixel caches, so both pin to negative
    /// infinity and never displace anything. A concrete entry inherits
    /// the raw priority of any indirection stacked above it, so a
    /// frequently queried `concat(..).subclip(..)` keeps its underlying
    /// concrete nodes cached.
    pub fn priority(&self) -> f64 {
        let (raw, associated) = {
            let state = self.state.lock();
            if state.is_indirection {
                return f64::NEG_INFINITY;
            }
            let raw = if state.is_root {
                f64::NEG_INFINITY
            } else {
                Self::raw_priority_of(&state)
            };
            (raw, state.associated_indirections.clone())
        };
        associated
            .iter()
            .filter_map(Weak::upgrade)
            .map(|entry| entry.raw_priority())
            .fold(raw, f64::max)
    }

    /// Does this entry qualify for the purge sweep?
    pub(crate) fn purgeable(&self) -> bool {
        {
            let state = self.state.lock();
            if state.age <= PURGE_MAX_AGE || !state.frames.is_empty() {
                return false;
            }
        }
        self.priority() < PURGE_MIN_PRIORITY
    }
}

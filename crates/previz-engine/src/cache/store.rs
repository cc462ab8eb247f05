//! The two-tier frame store and the reprioritise walk.
//!
//! While the user script runs, rendered frames go to *staging*; at
//! session end they are committed through the eviction policy into the
//! priority-ranked *committed* store, which persists across sessions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use previz_core::{PrevizError, Result, SharedFrame};
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::entry::CacheEntry;
use crate::cache::policy::{make_policy, CacheAlgorithm, EvictionPolicy};
use crate::cache::stats::CacheStats;
use crate::graph::GraphHandle;
use crate::node::{Clip, Source};

/// The frame cache: staging, the committed store, and the policy.
pub struct FrameCache {
    /// Persistent store, keyed by node identity.
    committed: HashMap<Clip, Arc<CacheEntry>>,
    /// Volatile store filled while the user script executes.
    staged: HashMap<Clip, HashMap<u64, SharedFrame>>,
    policy: Box<dyn EvictionPolicy>,
    algorithm: CacheAlgorithm,
    script_running: bool,
    staging_locked: bool,
    current_size: usize,
    max_size: usize,
    stats: Option<CacheStats>,
    /// Monotonic session stamp for the traversal guard.
    session_counter: u64,
}

impl FrameCache {
    /// Create a cache bounded to `max_size` bytes.
    pub fn new(max_size: usize, algorithm: CacheAlgorithm, enable_statistics: bool) -> Self {
        Self {
            committed: HashMap::new(),
            staged: HashMap::new(),
            policy: make_policy(algorithm),
            algorithm,
            script_running: false,
            staging_locked: false,
            current_size: 0,
            max_size,
            stats: enable_statistics.then(CacheStats::new),
            session_counter: 0,
        }
    }

    pub fn algorithm(&self) -> CacheAlgorithm {
        self.algorithm
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Bytes currently held by committed frames.
    pub fn current_size(&self) -> usize {
        self.current_size
    }

    /// Number of committed entries.
    pub fn entry_count(&self) -> usize {
        self.committed.len()
    }

    /// Routes `set` calls: staging while the script runs, policy
    /// admission otherwise.
    pub fn set_script_running(&mut self, running: bool) {
        self.script_running = running;
    }

    pub fn script_running(&self) -> bool {
        self.script_running
    }

    pub fn stats(&self) -> Option<&CacheStats> {
        self.stats.as_ref()
    }

    pub fn reset_stats(&mut self) {
        if let Some(stats) = &mut self.stats {
            stats.reset();
        }
    }

    /// The committed entries, unordered.
    pub fn entries(&self) -> Vec<Arc<CacheEntry>> {
        self.committed.values().cloned().collect()
    }

    // ── Lookup and insertion ────────────────────────────────────

    /// Fetch a frame: staging first, then the node's committed entry.
    pub fn get(&mut self, clip: &Clip, n: u64) -> Option<SharedFrame> {
        if let Some(frames) = self.staged.get(clip) {
            if let Some(frame) = frames.get(&n) {
                return Some(frame.clone());
            }
        }

        let entry = clip.cache_entry();
        match entry.as_ref().and_then(|entry| entry.get_frame(n)) {
            Some(frame) => {
                if let Some(stats) = &mut self.stats {
                    stats.hit(clip.is_indirection());
                }
                self.policy
                    .on_hit(entry.as_ref().expect("entry present on hit"), n);
                Some(frame)
            }
            None => {
                if let (Some(stats), Some(entry)) = (&mut self.stats, entry.as_ref()) {
                    stats.miss(entry.id(), n, clip.is_indirection());
                }
                None
            }
        }
    }

    /// Offer a rendered frame to the cache.
    pub fn set(&mut self, clip: &Clip, n: u64, frame: SharedFrame) {
        if let (Some(stats), Some(entry)) = (&mut self.stats, clip.cache_entry()) {
            stats.seen_frame(entry.id(), n);
        }
        if self.script_running {
            if !self.staging_locked {
                self.stage(clip, n, frame);
            }
            return;
        }
        self.admit(clip, n, frame);
    }

    /// Unconditional insertion into the staging area.
    pub fn stage(&mut self, clip: &Clip, n: u64, frame: SharedFrame) {
        self.staged.entry(clip.clone()).or_default().insert(n, frame);
    }

    /// Discard all staged frames (script failure).
    pub fn empty_staging(&mut self) {
        self.staged.clear();
    }

    /// Number of frames currently staged.
    pub fn staged_frame_count(&self) -> usize {
        self.staged.values().map(HashMap::len).sum()
    }

    /// Block staging while an export floods frames through `set`.
    pub fn lock_staging(&mut self) -> Result<()> {
        if self.staging_locked {
            return Err(PrevizError::CacheInconsistency(
                "attempted to lock the staging area, but it was already locked".into(),
            ));
        }
        self.staging_locked = true;
        Ok(())
    }

    pub fn unlock_staging(&mut self) -> Result<()> {
        if !self.staging_locked {
            return Err(PrevizError::CacheInconsistency(
                "attempted to unlock the staging area, but it was already unlocked".into(),
            ));
        }
        self.staging_locked = false;
        Ok(())
    }

    /// Move every staged frame through the policy's admission rule,
    /// then clear staging. Frames of clips that lost their entry (for
    /// example a resize annihilated by the fit-to-viewport pass) are
    /// silently dropped.
    pub fn commit(&mut self) -> Result<()> {
        if self.script_running {
            return Err(PrevizError::CacheInconsistency(
                "attempted to commit staged frames while a user script is running".into(),
            ));
        }
        let staged = std::mem::take(&mut self.staged);
        let mut clips: Vec<(Clip, HashMap<u64, SharedFrame>)> = staged.into_iter().collect();
        // Deterministic admission order regardless of map iteration.
        clips.sort_by_key(|(clip, _)| clip.timestamp());
        for (clip, frames) in clips {
            if clip.cache_entry().is_none() {
                continue;
            }
            let mut indices: Vec<u64> = frames.keys().copied().collect();
            indices.sort_unstable();
            for n in indices {
                self.set(&clip, n, frames[&n].clone());
            }
        }
        Ok(())
    }

    /// Policy admission of one frame, evicting victims to make room.
    fn admit(&mut self, clip: &Clip, n: u64, frame: SharedFrame) {
        if clip.is_indirection() {
            // Indirection frames are verbatim source frames; caching
            // them would double-store the bytes.
            return;
        }
        let Some(entry) = clip.cache_entry() else {
            return;
        };
        let bytes = frame.nbytes();
        while self.current_size + bytes > self.max_size {
            match self.policy.choose_victim(&entry) {
                Some((victim, victim_frame)) => {
                    self.current_size -= victim.discard_frame(victim_frame);
                }
                None => break,
            }
        }
        if self.current_size + bytes <= self.max_size {
            self.current_size += entry.insert_frame(n, frame);
            self.policy.on_admit(&entry, n, bytes);
        }
    }

    // ── Reprioritise ────────────────────────────────────────────

    /// Re-derive every entry's priority inputs from the given graph.
    ///
    /// Ages every committed entry first, then walks the graph post-order
    /// from its leaves, assigning each node its entry (locating existing
    /// ones through the predecessors' reverse-edge index), then runs the
    /// indirection-association pass, the purge sweep, and rebuilds the
    /// policy queue.
    pub fn reprioritise(&mut self, graph: &GraphHandle) -> Result<()> {
        let leaves = graph.leaves();
        if let Some(first) = leaves.first() {
            if first.has_cache_entry_slot() {
                warn!("attempted to reprioritise using a graph that has already been used");
                return Ok(());
            }
        }
        let started = Instant::now();

        self.session_counter += 1;
        let traverse_time = self.session_counter;

        // Age before visiting: entries refreshed below reset to zero,
        // so age 1 afterwards means "present last session but not this
        // one" and age > 1 before refresh identifies hotnodes.
        for entry in self.committed.values() {
            entry.state.lock().age += 1;
        }

        let mut visited = 0usize;
        for leaf in &leaves {
            self.visit(leaf, traverse_time, &mut visited)?;
        }

        for leaf in &leaves {
            associate_indirections(leaf, HashMap::new());
        }

        self.purge();

        let entries: Vec<Arc<CacheEntry>> = self.committed.values().cloned().collect();
        self.policy.rebuild(&entries);

        info!(
            nodes = visited,
            entries = self.committed.len(),
            elapsed = ?started.elapsed(),
            "reprioritised"
        );
        Ok(())
    }

    /// Post-order visit of one node; returns its entry for this session.
    fn visit(
        &mut self,
        node: &Clip,
        traverse_time: u64,
        visited: &mut usize,
    ) -> Result<Arc<CacheEntry>> {
        if let Some(entry) = node.cache_entry() {
            // Already visited this session.
            return Ok(entry);
        }
        *visited += 1;

        let entry = match node.source() {
            Source::Generated | Source::File(_) => match self.committed.get(node).cloned() {
                Some(existing) => {
                    let mut state = existing.state.lock();
                    if state.traverse_time != traverse_time {
                        state.is_root = true;
                        state.is_hotnode = state.age > 1;
                        state.precedes_hotnode = false;
                        state.root_distance = 0;
                        state.is_indirection = node.is_indirection();
                        state.associated_indirections.clear();
                        state.age = 0;
                        state.traverse_time = traverse_time;
                    }
                    drop(state);
                    existing
                }
                None => {
                    let entry = CacheEntry::new(
                        node.clone(),
                        true,
                        true,
                        false,
                        0,
                        node.is_indirection(),
                        traverse_time,
                    );
                    self.committed.insert(node.clone(), entry.clone());
                    entry
                }
            },
            Source::Parents(parents) => {
                let parents: Vec<Clip> = parents.to_vec();
                let mut source_entries = Vec::with_capacity(parents.len());
                for parent in &parents {
                    source_entries.push(self.visit(parent, traverse_time, visited)?);
                }

                // Locate an existing entry through the sources'
                // reverse-edge index: the candidates under this node's
                // hash that every indexing source agrees on, confirmed
                // by pseudo-equality. A full committed-map probe here
                // would cost O(d^2) equality over the session.
                let hash = node.structural_hash();
                let indexed: Vec<Vec<(Uuid, Arc<CacheEntry>)>> = source_entries
                    .iter()
                    .filter_map(|source| {
                        let state = source.state.lock();
                        state.successors.get(&hash).map(|bucket| {
                            bucket
                                .iter()
                                .filter_map(|(id, weak)| weak.upgrade().map(|e| (*id, e)))
                                .collect()
                        })
                    })
                    .collect();
                let mut chosen: Vec<Arc<CacheEntry>> = match indexed.split_first() {
                    None => Vec::new(),
                    Some((first, rest)) => first
                        .iter()
                        .filter(|(id, _)| {
                            rest.iter()
                                .all(|bucket| bucket.iter().any(|(other, _)| other == id))
                        })
                        .map(|(_, entry)| entry.clone())
                        .filter(|candidate| node.pseudo_eq(candidate.node()))
                        .collect(),
                };
                if chosen.len() > 1 {
                    return Err(PrevizError::CacheInconsistency(format!(
                        "duplicate cache entries found for {node:?}"
                    )));
                }
                let existing = chosen.pop();

                // If this node is hot, its sources precede a hotnode.
                // Read ages before any refresh below.
                let is_hot = match &existing {
                    None => true,
                    Some(entry) => entry.state.lock().age > 1,
                };
                let mut max_root_distance = 0;
                for source in &source_entries {
                    let mut state = source.state.lock();
                    if is_hot {
                        state.precedes_hotnode = true;
                    }
                    max_root_distance = max_root_distance.max(state.root_distance);
                }

                let entry = match existing {
                    Some(entry) => {
                        let mut state = entry.state.lock();
                        if state.traverse_time != traverse_time {
                            state.is_root = false;
                            state.is_hotnode = state.age > 1;
                            state.precedes_hotnode = false;
                            state.root_distance = max_root_distance + 1;
                            state.is_indirection = node.is_indirection();
                            state.associated_indirections.clear();
                            state.age = 0;
                            state.traverse_time = traverse_time;
                        }
                        drop(state);
                        entry
                    }
                    None => {
                        let entry = CacheEntry::new(
                            node.clone(),
                            false,
                            true,
                            false,
                            max_root_distance + 1,
                            node.is_indirection(),
                            traverse_time,
                        );
                        self.committed.insert(node.clone(), entry.clone());
                        entry
                    }
                };

                // Let the predecessors know this entry is a successor.
                for source in &source_entries {
                    source
                        .state
                        .lock()
                        .successors
                        .entry(hash)
                        .or_default()
                        .entry(entry.id())
                        .or_insert_with(|| Arc::downgrade(&entry));
                }
                entry
            }
        };

        node.set_cache_entry(&entry);
        node.reset_indirection_marks();
        Ok(entry)
    }

    /// Delete entries that have been out of the graph for a while, hold
    /// no frames, and rank below the purge threshold, unlinking them
    /// from their predecessors' reverse-edge index.
    fn purge(&mut self) {
        let purgeable: Vec<(Clip, Arc<CacheEntry>)> = self
            .committed
            .iter()
            .filter(|(_, entry)| entry.purgeable())
            .map(|(clip, entry)| (clip.clone(), entry.clone()))
            .collect();
        for (clip, entry) in &purgeable {
            if let Source::Parents(parents) = clip.source() {
                let hash = clip.structural_hash();
                for parent in parents.iter() {
                    if let Some(parent_entry) = parent.cache_entry() {
                        if let Some(bucket) =
                            parent_entry.state.lock().successors.get_mut(&hash)
                        {
                            bucket.remove(&entry.id());
                        }
                    }
                }
            }
            self.committed.remove(clip);
        }
        if !purgeable.is_empty() {
            info!(purged = purgeable.len(), "purged stale cache entries");
        }
    }
}

/// Second reprioritise pass: walk down from each leaf accumulating the
/// indirection entries passed through, and deposit them on the first
/// concrete (or root) entry reached, so that entry inherits their
/// priority. Per-node marks avoid re-work across shared subgraphs.
fn associate_indirections(node: &Clip, indirections: HashMap<Uuid, Arc<CacheEntry>>) {
    let Some(entry) = node.cache_entry() else {
        return;
    };
    let parents: Vec<Clip> = match node.source() {
        Source::Generated | Source::File(_) => {
            entry
                .state
                .lock()
                .associated_indirections
                .extend(indirections.values().map(Arc::downgrade));
            return;
        }
        Source::Parents(parents) => parents.to_vec(),
    };

    if entry.state.lock().is_indirection {
        let mut marks_slot = node.indirection_marks().lock();
        if marks_slot.is_none() {
            let mut carried = indirections;
            carried.insert(entry.id(), entry.clone());
            *marks_slot = Some(carried.clone());
            drop(marks_slot);
            for parent in &parents {
                associate_indirections(parent, carried.clone());
            }
        } else {
            // Keep only indirections this node has not yet carried
            // down, and remember them.
            let marks = marks_slot.as_mut().expect("checked above");
            let mut carried = indirections;
            carried.retain(|id, candidate| {
                if marks.contains_key(id) {
                    false
                } else {
                    marks.insert(*id, candidate.clone());
                    true
                }
            });
            if carried.is_empty() {
                return;
            }
            drop(marks_slot);
            for parent in &parents {
                associate_indirections(parent, carried.clone());
            }
        }
    } else {
        entry
            .state
            .lock()
            .associated_indirections
            .extend(indirections.values().map(Arc::downgrade));
        let mut marks_slot = node.indirection_marks().lock();
        if marks_slot.is_none() {
            *marks_slot = Some(indirections);
            drop(marks_slot);
            // A predecessor may itself be an indirection stack; restart
            // the accumulation from here.
            for parent in &parents {
                associate_indirections(parent, HashMap::new());
            }
        }
    }
}

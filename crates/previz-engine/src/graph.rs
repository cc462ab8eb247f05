//! The composition DAG.
//!
//! A graph holds the set of *leaf* nodes: clips with no consumer yet,
//! the candidates for preview. Edges are implicit, pointing from each
//! node to its sources; the graph is explored from its leaves.
//!
//! At any point in time there is exactly one current graph, accessible
//! via [`current`]. It can usually be left untouched, but [`swap`]
//! allows tests and tools to juggle several distinct graphs.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use previz_core::{PrevizError, Result};
use tracing::{debug, info};

use crate::node::{Clip, ClipKind};

static GRAPH_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Whether constructors apply the canonical-order rewrite rules and the
/// session applies concat flattening. On by default; the configuration
/// layer can switch it off for A/B evaluation.
static TRANSFORMATIONS_ENABLED: AtomicBool = AtomicBool::new(true);

/// Enable or disable the algebraic rewrite passes globally.
pub fn set_transformations_enabled(enabled: bool) {
    TRANSFORMATIONS_ENABLED.store(enabled, Ordering::Relaxed);
}

/// Whether the rewrite passes are currently enabled.
pub fn transformations_enabled() -> bool {
    TRANSFORMATIONS_ENABLED.load(Ordering::Relaxed)
}

#[derive(Default)]
struct GraphInner {
    leaves: Vec<Clip>,
    forced: Vec<Clip>,
}

/// A directed acyclic graph of clips, represented by its leaf set.
pub struct CompositionGraph {
    id: u64,
    inner: Mutex<GraphInner>,
}

/// A cheap shared handle to a [`CompositionGraph`].
#[derive(Clone)]
pub struct GraphHandle {
    graph: Arc<CompositionGraph>,
}

impl GraphHandle {
    /// Create a new, empty graph.
    pub fn new() -> Self {
        Self {
            graph: Arc::new(CompositionGraph {
                id: GRAPH_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
                inner: Mutex::new(GraphInner::default()),
            }),
        }
    }

    /// Identity of the underlying graph.
    pub fn id(&self) -> u64 {
        self.graph.id
    }

    /// Do two handles refer to the same graph?
    pub fn same_graph(a: &GraphHandle, b: &GraphHandle) -> bool {
        Arc::ptr_eq(&a.graph, &b.graph)
    }

    /// Add `clip` to the graph as a leaf. Adding a clip that is already
    /// a leaf is a no-op.
    pub fn add_leaf(&self, clip: &Clip) {
        let mut inner = self.graph.inner.lock();
        if !inner.leaves.iter().any(|leaf| Clip::same_node(leaf, clip)) {
            inner.leaves.push(clip.clone());
        }
    }

    /// Remove `clip` from the leaf set.
    ///
    /// Fails with [`PrevizError::NotALeaf`] if it was not present —
    /// never silently.
    pub fn remove_leaf(&self, clip: &Clip) -> Result<()> {
        let mut inner = self.graph.inner.lock();
        match inner
            .leaves
            .iter()
            .position(|leaf| Clip::same_node(leaf, clip))
        {
            Some(index) => {
                inner.leaves.remove(index);
                Ok(())
            }
            None => Err(PrevizError::NotALeaf),
        }
    }

    /// Is `clip` currently a leaf of this graph?
    pub fn is_leaf(&self, clip: &Clip) -> bool {
        self.graph
            .inner
            .lock()
            .leaves
            .iter()
            .any(|leaf| Clip::same_node(leaf, clip))
    }

    /// The current leaves, ordered by construction timestamp so preview
    /// iteration is stable across sessions.
    pub fn leaves(&self) -> Vec<Clip> {
        let mut leaves = self.graph.inner.lock().leaves.clone();
        leaves.sort_by_key(|leaf| leaf.timestamp());
        leaves
    }

    /// Number of leaves.
    pub fn leaf_count(&self) -> usize {
        self.graph.inner.lock().leaves.len()
    }

    /// Mark `clip` to be previewed regardless of whether it is a leaf.
    pub fn add_forced_preview(&self, clip: &Clip) {
        let mut inner = self.graph.inner.lock();
        if !inner.forced.iter().any(|c| Clip::same_node(c, clip)) {
            inner.forced.push(clip.clone());
        }
    }

    /// Whether any forced preview nodes are pending.
    pub fn has_forced_preview_nodes(&self) -> bool {
        !self.graph.inner.lock().forced.is_empty()
    }

    /// Move the forced preview nodes into the leaf set.
    pub fn unify_preview_nodes(&self) {
        let mut inner = self.graph.inner.lock();
        let forced = std::mem::take(&mut inner.forced);
        for clip in forced {
            if !inner.leaves.iter().any(|leaf| Clip::same_node(leaf, &clip)) {
                inner.leaves.push(clip);
            }
        }
    }

    /// Flatten every concat leaf: recursively expand `Concat` sources so
    /// the leaf's source list contains no `Concat`, then replace the
    /// leaf with one flat concat carrying the original timestamp.
    ///
    /// Skipped while forced preview nodes are pending, and skipped
    /// entirely when transformations are disabled.
    pub fn flatten_concats(&self) -> Result<()> {
        if !transformations_enabled() {
            return Ok(());
        }
        if self.has_forced_preview_nodes() {
            debug!("skipping concat flattening: forced preview nodes pending");
            return Ok(());
        }

        let started = Instant::now();
        let leaves = self.leaves();
        for leaf in leaves {
            if !matches!(leaf.kind(), ClipKind::Concat { .. }) {
                continue;
            }
            let flat = flat_sources(&leaf);
            let already_flat = {
                let sources = leaf.source().parents();
                sources.len() == flat.len()
                    && sources
                        .iter()
                        .zip(flat.iter())
                        .all(|(a, b)| Clip::same_node(a, b))
            };
            if already_flat {
                continue;
            }
            let new_leaf = flat[0].concat(&flat[1..])?;
            new_leaf.set_timestamp(leaf.timestamp());
            self.remove_leaf(&leaf)?;
        }
        info!(elapsed = ?started.elapsed(), "flattened concat leaves");
        Ok(())
    }
}

impl Default for GraphHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Depth-first expansion of a concat's sources with nested concats
/// replaced by their own sources.
fn flat_sources(clip: &Clip) -> Vec<Clip> {
    let mut queue: Vec<Clip> = clip.source().parents().iter().rev().cloned().collect();
    let mut out = Vec::new();
    while let Some(source) = queue.pop() {
        if matches!(source.kind(), ClipKind::Concat { .. }) {
            queue.extend(source.source().parents().iter().rev().cloned());
        } else {
            out.push(source);
        }
    }
    out
}

// ── Process-wide current graph ──────────────────────────────────

static CURRENT_GRAPH: Lazy<Mutex<GraphHandle>> = Lazy::new(|| Mutex::new(GraphHandle::new()));

/// The current composition graph.
pub fn current() -> GraphHandle {
    CURRENT_GRAPH.lock().clone()
}

/// Discard the current graph and install a new, empty one.
pub fn reset() {
    *CURRENT_GRAPH.lock() = GraphHandle::new();
}

/// Replace the current graph with `new_graph`, returning the old one.
pub fn swap(new_graph: GraphHandle) -> GraphHandle {
    std::mem::replace(&mut *CURRENT_GRAPH.lock(), new_graph)
}

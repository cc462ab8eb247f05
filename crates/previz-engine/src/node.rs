//! Clip nodes and their structural identity.
//!
//! A [`Clip`] is a cheap handle to an immutable node describing a pure
//! function `frame index -> image`. Nodes never change after
//! construction; the few mutable fields (child count, timestamp, the
//! cache-entry slot) are bookkeeping the graph and cache layers maintain,
//! not part of the node's identity.
//!
//! Identity comes in three strengths:
//! - `structural_hash` — variant tag, metadata, parameters, and source
//!   identity (file path for roots, parent hashes otherwise). Memoized.
//! - `pseudo_eq` — variant, metadata and parameters match; sources are
//!   *not* compared. Used with the cache's predecessor reverse-index to
//!   find an existing entry without O(d^2) deep comparisons.
//! - `==` — `pseudo_eq` plus source equality.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use previz_core::raster::{self, Interp, SlideOrigin};
use previz_core::{Frame, PrevizError, Result, SharedFrame};
use smallvec::SmallVec;
use uuid::Uuid;

use crate::cache::{self, CacheEntry};
use crate::graph::GraphHandle;
use crate::meta::ClipMeta;
use crate::ops::text::TextParams;
use crate::reader::SharedReader;

/// Construction-order counter. Gives every node a timestamp used to
/// stabilise leaf iteration order across sessions.
static CONSTRUCTION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Where a node's frames come from.
#[derive(Clone)]
pub enum Source {
    /// No source; frames are generated (rendered text).
    Generated,
    /// Frames read from a media file.
    File(PathBuf),
    /// Frames derived from one or more parent clips, in order.
    Parents(SmallVec<[Clip; 2]>),
}

impl Source {
    /// The parent clips, if any.
    pub fn parents(&self) -> &[Clip] {
        match self {
            Source::Parents(parents) => parents,
            _ => &[],
        }
    }

    /// True for file-backed and generated nodes.
    pub fn is_root(&self) -> bool {
        !matches!(self, Source::Parents(_))
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Generated => write!(f, "Generated"),
            Source::File(path) => write!(f, "File({path:?})"),
            Source::Parents(parents) => write!(f, "Parents(x{})", parents.len()),
        }
    }
}

/// The per-variant payload of a clip node.
pub enum ClipKind {
    /// Frames decoded from a file through a pooled reader.
    Loaded { reader: SharedReader },
    /// A rendered string of text; a constant single-frame clip.
    Text(TextParams),
    Resized {
        interp: Interp,
    },
    Cropped {
        x1: u32,
        y1: u32,
        x2: u32,
        y2: u32,
    },
    Brightened {
        amount: f64,
    },
    Greyscale,
    Blurred {
        width: u32,
        height: u32,
    },
    GaussianBlurred {
        width: u32,
        height: u32,
        sigma: (f64, f64),
    },
    RateChanged,
    Reversed,
    Sped {
        scale: f64,
    },
    SubClip {
        n1: u64,
        n2: u64,
    },
    SlideTransition {
        origin: SlideOrigin,
        frame_count: u64,
        /// Tabulated easing outputs over `[0, frame_count)`. Easing
        /// functions are identified by these values, never by identity.
        f_values: Vec<f64>,
    },
    /// Foreground overlaid on a background at `(x1, y1)`.
    Composite {
        x1: i64,
        y1: i64,
    },
    /// Two or more clips played back to back.
    Concat {
        /// Prefix sums of the source frame counts.
        start_frames: Vec<u64>,
        /// Most recently accessed source, a fast path for sequential play.
        recent_source: AtomicUsize,
    },
}

impl ClipKind {
    /// Stable discriminant used in the structural hash.
    fn tag(&self) -> u8 {
        match self {
            ClipKind::Loaded { .. } => 0,
            ClipKind::Text(_) => 1,
            ClipKind::Resized { .. } => 2,
            ClipKind::Cropped { .. } => 3,
            ClipKind::Brightened { .. } => 4,
            ClipKind::Greyscale => 5,
            ClipKind::Blurred { .. } => 6,
            ClipKind::GaussianBlurred { .. } => 7,
            ClipKind::RateChanged => 8,
            ClipKind::Reversed => 9,
            ClipKind::Sped { .. } => 10,
            ClipKind::SubClip { .. } => 11,
            ClipKind::SlideTransition { .. } => 12,
            ClipKind::Composite { .. } => 13,
            ClipKind::Concat { .. } => 14,
        }
    }

    /// Variant name for logs and the priority visualiser.
    pub fn name(&self) -> &'static str {
        match self {
            ClipKind::Loaded { .. } => "Loaded",
            ClipKind::Text(_) => "Text",
            ClipKind::Resized { .. } => "Resized",
            ClipKind::Cropped { .. } => "Cropped",
            ClipKind::Brightened { .. } => "Brightened",
            ClipKind::Greyscale => "Greyscale",
            ClipKind::Blurred { .. } => "Blurred",
            ClipKind::GaussianBlurred { .. } => "GaussianBlurred",
            ClipKind::RateChanged => "RateChanged",
            ClipKind::Reversed => "Reversed",
            ClipKind::Sped { .. } => "Sped",
            ClipKind::SubClip { .. } => "SubClip",
            ClipKind::SlideTransition { .. } => "SlideTransition",
            ClipKind::Composite { .. } => "Composite",
            ClipKind::Concat { .. } => "Concat",
        }
    }

    /// Feed the variant-specific parameters into the hasher.
    fn feed_params<H: Hasher>(&self, state: &mut H) {
        match self {
            // A loaded clip is identified purely by its file path, which
            // hashes as part of the source.
            ClipKind::Loaded { .. } => {}
            ClipKind::Text(params) => params.feed(state),
            ClipKind::Resized { interp } => interp.hash(state),
            ClipKind::Cropped { x1, y1, x2, y2 } => (x1, y1, x2, y2).hash(state),
            ClipKind::Brightened { amount } => amount.to_bits().hash(state),
            ClipKind::Greyscale => {}
            ClipKind::Blurred { width, height } => (width, height).hash(state),
            ClipKind::GaussianBlurred {
                width,
                height,
                sigma,
            } => {
                (width, height).hash(state);
                sigma.0.to_bits().hash(state);
                sigma.1.to_bits().hash(state);
            }
            ClipKind::RateChanged => {}
            ClipKind::Reversed => {}
            ClipKind::Sped { scale } => scale.to_bits().hash(state),
            ClipKind::SubClip { n1, n2 } => (n1, n2).hash(state),
            ClipKind::SlideTransition {
                origin,
                frame_count,
                f_values,
            } => {
                origin.hash(state);
                frame_count.hash(state);
                for v in f_values {
                    v.to_bits().hash(state);
                }
            }
            ClipKind::Composite { x1, y1 } => (x1, y1).hash(state),
            // A concat is identified by its sources alone.
            ClipKind::Concat { .. } => {}
        }
    }

    /// Variant-and-parameter equality; the pseudo-equality payload.
    fn params_eq(&self, other: &ClipKind) -> bool {
        match (self, other) {
            (ClipKind::Loaded { .. }, ClipKind::Loaded { .. }) => true,
            (ClipKind::Text(a), ClipKind::Text(b)) => a == b,
            (ClipKind::Resized { interp: a }, ClipKind::Resized { interp: b }) => a == b,
            (
                ClipKind::Cropped { x1, y1, x2, y2 },
                ClipKind::Cropped {
                    x1: ox1,
                    y1: oy1,
                    x2: ox2,
                    y2: oy2,
                },
            ) => (x1, y1, x2, y2) == (ox1, oy1, ox2, oy2),
            (ClipKind::Brightened { amount: a }, ClipKind::Brightened { amount: b }) => a == b,
            (ClipKind::Greyscale, ClipKind::Greyscale) => true,
            (
                ClipKind::Blurred { width, height },
                ClipKind::Blurred {
                    width: ow,
                    height: oh,
                },
            ) => (width, height) == (ow, oh),
            (
                ClipKind::GaussianBlurred {
                    width,
                    height,
                    sigma,
                },
                ClipKind::GaussianBlurred {
                    width: ow,
                    height: oh,
                    sigma: os,
                },
            ) => (width, height) == (ow, oh) && sigma == os,
            (ClipKind::RateChanged, ClipKind::RateChanged) => true,
            (ClipKind::Reversed, ClipKind::Reversed) => true,
            (ClipKind::Sped { scale: a }, ClipKind::Sped { scale: b }) => a == b,
            (
                ClipKind::SubClip { n1, n2 },
                ClipKind::SubClip { n1: on1, n2: on2 },
            ) => (n1, n2) == (on1, on2),
            (
                ClipKind::SlideTransition {
                    origin,
                    frame_count,
                    f_values,
                },
                ClipKind::SlideTransition {
                    origin: oo,
                    frame_count: ofc,
                    f_values: ofv,
                },
            ) => origin == oo && frame_count == ofc && f_values == ofv,
            (ClipKind::Composite { x1, y1 }, ClipKind::Composite { x1: ox, y1: oy }) => {
                (x1, y1) == (ox, oy)
            }
            (ClipKind::Concat { .. }, ClipKind::Concat { .. }) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for ClipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One immutable node in the composition DAG.
pub struct ClipNode {
    kind: ClipKind,
    meta: ClipMeta,
    source: Source,
    /// True iff `frame(n)` returns a source frame without transforming
    /// pixels. Such frames must never be cached.
    is_indirection: bool,
    /// True iff `frame(n)` is independent of `n`.
    is_constant: bool,
    /// Construction order; inherited by rewrite replacements so preview
    /// ordering is stable across sessions.
    timestamp: AtomicU64,
    /// Number of consumers this node has acquired.
    child_count: AtomicU32,
    /// The graph this node was registered in.
    graph: Mutex<Option<GraphHandle>>,
    /// Weak handle to this node's cache entry, set during reprioritise.
    cache_entry: Mutex<Option<Weak<CacheEntry>>>,
    /// Per-session marker used by the indirection-association pass.
    indirection_marks: Mutex<Option<HashMap<Uuid, Arc<CacheEntry>>>>,
    memoized_hash: OnceLock<u64>,
}

/// A shared handle to a [`ClipNode`]; the type user scripts manipulate.
#[derive(Clone)]
pub struct Clip {
    node: Arc<ClipNode>,
}

impl Clip {
    /// Build a node. Parent child-counts are incremented here; graph
    /// registration happens separately in [`register`].
    pub(crate) fn new_node(
        kind: ClipKind,
        meta: ClipMeta,
        source: Source,
        is_indirection: bool,
        is_constant: bool,
    ) -> Clip {
        for parent in source.parents() {
            parent.node.child_count.fetch_add(1, Ordering::Relaxed);
        }
        Clip {
            node: Arc::new(ClipNode {
                kind,
                meta,
                source,
                is_indirection,
                is_constant,
                timestamp: AtomicU64::new(CONSTRUCTION_COUNTER.fetch_add(1, Ordering::Relaxed)),
                child_count: AtomicU32::new(0),
                graph: Mutex::new(None),
                cache_entry: Mutex::new(None),
                indirection_marks: Mutex::new(None),
                memoized_hash: OnceLock::new(),
            }),
        }
    }

    // ── Metadata accessors ──────────────────────────────────────

    /// The node's metadata record.
    #[inline]
    pub fn meta(&self) -> ClipMeta {
        self.node.meta
    }

    /// (width, height) in pixels.
    #[inline]
    pub fn size(&self) -> (u32, u32) {
        self.node.meta.size
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.node.meta.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.node.meta.height()
    }

    #[inline]
    pub fn fps(&self) -> f64 {
        self.node.meta.fps
    }

    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.node.meta.frame_count
    }

    /// Duration in seconds.
    #[inline]
    pub fn duration(&self) -> f64 {
        self.node.meta.duration()
    }

    // ── Node accessors ──────────────────────────────────────────

    /// The variant payload.
    #[inline]
    pub fn kind(&self) -> &ClipKind {
        &self.node.kind
    }

    /// Where this node's frames come from.
    #[inline]
    pub fn source(&self) -> &Source {
        &self.node.source
    }

    /// True iff frames pass through untransformed and must not be cached.
    #[inline]
    pub fn is_indirection(&self) -> bool {
        self.node.is_indirection
    }

    /// True iff every frame is the same image.
    #[inline]
    pub fn is_constant(&self) -> bool {
        self.node.is_constant
    }

    /// Construction-order timestamp.
    #[inline]
    pub fn timestamp(&self) -> u64 {
        self.node.timestamp.load(Ordering::Relaxed)
    }

    /// Overwrite the timestamp. Rewrites use this so a replacement node
    /// keeps the original's place in preview-tab ordering.
    pub fn set_timestamp(&self, timestamp: u64) {
        self.node.timestamp.store(timestamp, Ordering::Relaxed);
    }

    /// Number of consumers.
    #[inline]
    pub fn child_count(&self) -> u32 {
        self.node.child_count.load(Ordering::Relaxed)
    }

    pub(crate) fn dec_child_count(&self) {
        self.node.child_count.fetch_sub(1, Ordering::Relaxed);
    }

    /// The graph this node is registered in, if any.
    pub fn graph(&self) -> Option<GraphHandle> {
        self.node.graph.lock().clone()
    }

    pub(crate) fn set_graph(&self, graph: GraphHandle) {
        *self.node.graph.lock() = Some(graph);
    }

    /// Identity comparison: do the handles point at the same node?
    #[inline]
    pub fn same_node(a: &Clip, b: &Clip) -> bool {
        Arc::ptr_eq(&a.node, &b.node)
    }

    // ── Cache bookkeeping ───────────────────────────────────────

    /// This node's cache entry, if reprioritise has assigned one and it
    /// is still alive.
    pub fn cache_entry(&self) -> Option<Arc<CacheEntry>> {
        self.node.cache_entry.lock().as_ref().and_then(Weak::upgrade)
    }

    /// Whether a cache entry has ever been assigned to this node.
    pub(crate) fn has_cache_entry_slot(&self) -> bool {
        self.node.cache_entry.lock().is_some()
    }

    pub(crate) fn set_cache_entry(&self, entry: &Arc<CacheEntry>) {
        *self.node.cache_entry.lock() = Some(Arc::downgrade(entry));
    }

    pub(crate) fn indirection_marks(
        &self,
    ) -> &Mutex<Option<HashMap<Uuid, Arc<CacheEntry>>>> {
        &self.node.indirection_marks
    }

    pub(crate) fn reset_indirection_marks(&self) {
        *self.node.indirection_marks.lock() = None;
    }

    // ── Identity ────────────────────────────────────────────────

    /// The memoized structural hash.
    pub fn structural_hash(&self) -> u64 {
        *self.node.memoized_hash.get_or_init(|| {
            let mut state = DefaultHasher::new();
            self.node.kind.tag().hash(&mut state);
            self.node.meta.feed(&mut state);
            self.node.kind.feed_params(&mut state);
            match &self.node.source {
                Source::Generated => 0u8.hash(&mut state),
                Source::File(path) => path.hash(&mut state),
                Source::Parents(parents) => {
                    for parent in parents {
                        parent.structural_hash().hash(&mut state);
                    }
                }
            }
            state.finish()
        })
    }

    /// Variant, metadata and parameters match; sources are not compared.
    pub fn pseudo_eq(&self, other: &Clip) -> bool {
        self.node.meta == other.node.meta && self.node.kind.params_eq(&other.node.kind)
    }

    fn source_eq(&self, other: &Clip) -> bool {
        match (&self.node.source, &other.node.source) {
            (Source::Generated, Source::Generated) => true,
            (Source::File(a), Source::File(b)) => a == b,
            (Source::Parents(a), Source::Parents(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y)
            }
            _ => false,
        }
    }

    // ── Rendering ───────────────────────────────────────────────

    /// Render the frame at index `n`, consulting the current cache first
    /// and offering the result back to it.
    pub fn frame(&self, n: u64) -> Result<SharedFrame> {
        // Constant clips redirect every request to frame 0 so the same
        // image is never rendered or cached twice.
        let n = if self.node.is_constant { 0 } else { n };
        if n >= self.frame_count() {
            return Err(PrevizError::OutOfRange(format!(
                "frame {n} requested, but this clip has {} frames",
                self.frame_count()
            )));
        }

        if let Some(image) = cache::with_current(|c| c.get(self, n)) {
            return Ok(image);
        }
        let image = self.render(n)?;
        cache::with_current(|c| c.set(self, n, image.clone()));
        Ok(image)
    }

    /// The per-variant frame generator.
    fn render(&self, n: u64) -> Result<SharedFrame> {
        let parents = self.node.source.parents();
        match &self.node.kind {
            ClipKind::Loaded { reader } => {
                let frame = reader.lock().read_frame(n)?;
                Ok(Arc::new(frame))
            }
            ClipKind::Text(params) => Ok(Arc::new(crate::ops::text::rasterize(params))),
            ClipKind::Resized { interp } => {
                let src = parents[0].frame(n)?;
                let (w, h) = self.size();
                Ok(Arc::new(raster::resize(&src, w, h, *interp)))
            }
            ClipKind::Cropped { x1, y1, x2, y2 } => {
                let src = parents[0].frame(n)?;
                Ok(Arc::new(raster::crop(&src, *x1, *y1, *x2, *y2)))
            }
            ClipKind::Brightened { amount } => {
                let src = parents[0].frame(n)?;
                Ok(Arc::new(raster::brighten(&src, *amount)))
            }
            ClipKind::Greyscale => {
                let src = parents[0].frame(n)?;
                Ok(Arc::new(raster::greyscale(&src)))
            }
            ClipKind::Blurred { width, height } => {
                let src = parents[0].frame(n)?;
                Ok(Arc::new(raster::box_blur(&src, *width, *height)))
            }
            ClipKind::GaussianBlurred {
                width,
                height,
                sigma,
            } => {
                let src = parents[0].frame(n)?;
                Ok(Arc::new(raster::gaussian_blur(&src, *width, *height, *sigma)))
            }
            ClipKind::RateChanged => parents[0].frame(n),
            ClipKind::Reversed => {
                let source = &parents[0];
                source.frame(source.frame_count() - n - 1)
            }
            ClipKind::Sped { scale } => parents[0].frame((n as f64 * scale) as u64),
            ClipKind::SubClip { n1, .. } => parents[0].frame(n1 + n),
            ClipKind::SlideTransition {
                origin, f_values, ..
            } => {
                let base = parents[0].frame(n)?;
                let succ = parents[1].frame(n)?;
                Ok(Arc::new(raster::slide_blit(
                    &base, &succ, *origin, f_values[n as usize],
                )))
            }
            ClipKind::Composite { x1, y1 } => {
                let bg = parents[0].frame(n)?;
                let fg = parents[1].frame(n)?;
                let mut out: Frame = (*bg).clone();
                raster::blit(&mut out, &fg, *x1, *y1);
                Ok(Arc::new(out))
            }
            ClipKind::Concat {
                start_frames,
                recent_source,
            } => {
                let index = locate_concat_source(start_frames, recent_source, n);
                let offset = if index == 0 {
                    0
                } else {
                    start_frames[index - 1]
                };
                parents[index].frame(n - offset)
            }
        }
    }

    /// Apply an arbitrary effect function: `clip.fx(f)` is `f(clip)`.
    /// Useful for chaining custom effects.
    pub fn fx<F>(&self, f: F) -> Result<Clip>
    where
        F: FnOnce(&Clip) -> Result<Clip>,
    {
        f(self)
    }
}

/// Find which concat source holds global frame `n`, preferring the most
/// recently used source before falling back to binary search.
fn locate_concat_source(start_frames: &[u64], recent: &AtomicUsize, n: u64) -> usize {
    let last = recent.load(Ordering::Relaxed);
    let index = if last == 0 && n < start_frames[0] {
        0
    } else if last > 0
        && last < start_frames.len()
        && n >= start_frames[last - 1]
        && n < start_frames[last]
    {
        last
    } else if last + 1 < start_frames.len()
        && n >= start_frames[last]
        && n < start_frames[last + 1]
    {
        last + 1
    } else if n == 0 {
        0
    } else {
        start_frames.partition_point(|&s| s <= n)
    };
    recent.store(index, Ordering::Relaxed);
    index
}

/// Register a freshly constructed node in the appropriate graph.
///
/// Root nodes join the current graph; derived nodes join their sources'
/// graph, displacing any source that was a leaf. Sources living in
/// different graphs are a [`PrevizError::GraphDomainMismatch`].
pub(crate) fn register(clip: Clip) -> Result<Clip> {
    match clip.source() {
        Source::Generated | Source::File(_) => {
            let graph = crate::graph::current();
            clip.set_graph(graph.clone());
            graph.add_leaf(&clip);
        }
        Source::Parents(parents) => {
            let first_graph = parents[0]
                .graph()
                .ok_or(PrevizError::GraphDomainMismatch)?;
            for parent in parents.iter() {
                let parent_graph = parent.graph().ok_or(PrevizError::GraphDomainMismatch)?;
                if !GraphHandle::same_graph(&parent_graph, &first_graph) {
                    return Err(PrevizError::GraphDomainMismatch);
                }
                if parent_graph.is_leaf(parent) {
                    parent_graph.remove_leaf(parent)?;
                }
            }
            clip.set_graph(first_graph.clone());
            first_graph.add_leaf(&clip);
        }
    }
    Ok(clip)
}

impl PartialEq for Clip {
    /// Full structural equality: pseudo-equality plus source equality.
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.node, &other.node) {
            return true;
        }
        self.pseudo_eq(other) && self.source_eq(other)
    }
}

impl Eq for Clip {}

impl Hash for Clip {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.structural_hash().hash(state);
    }
}

impl fmt::Debug for Clip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clip")
            .field("kind", &self.node.kind.name())
            .field("size", &self.node.meta.size)
            .field("frames", &self.node.meta.frame_count)
            .field("hash", &format_args!("{:016x}", self.structural_hash()))
            .finish()
    }
}

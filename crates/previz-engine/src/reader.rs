//! Frame readers and the filename-keyed reader pool.
//!
//! Decoding is an external concern: the engine only sees the
//! [`FrameReader`] trait. Readers are pooled per path across sessions —
//! a FIFO queue per filename, so repeat sessions are likely to reclaim
//! the reader that an equivalent clip used last time, keeping its
//! internal decode position warm.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use previz_core::{Frame, PrevizError, Result};

use crate::meta::ClipMeta;

/// Decodes frames from one media file.
pub trait FrameReader: Send {
    /// The stream's metadata.
    fn metadata(&self) -> ClipMeta;

    /// Decode the frame at index `n`.
    fn read_frame(&mut self, n: u64) -> Result<Frame>;
}

/// Opens readers for paths. Installed by the harness; the default
/// factory only validates existence and then reports that no decoder
/// is available.
pub trait ReaderFactory: Send {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameReader>>;
}

/// A reader shared between the clip that renders through it and the
/// pool that recycles it across sessions.
pub type SharedReader = Arc<Mutex<Box<dyn FrameReader>>>;

struct FsReaderFactory;

impl ReaderFactory for FsReaderFactory {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameReader>> {
        if !path.exists() {
            return Err(PrevizError::FileNotFound(path.to_path_buf()));
        }
        Err(PrevizError::BadArgument(format!(
            "no frame reader is registered for {path:?}; install one with reader::set_factory"
        )))
    }
}

/// The process-wide reader pool.
///
/// `open` holds readers claimed during the current session; `ready`
/// holds readers from the previous session awaiting reuse.
pub struct ReaderRegistry {
    factory: Box<dyn ReaderFactory>,
    open: HashMap<PathBuf, VecDeque<SharedReader>>,
    ready: HashMap<PathBuf, VecDeque<SharedReader>>,
}

impl ReaderRegistry {
    fn new() -> Self {
        Self {
            factory: Box::new(FsReaderFactory),
            open: HashMap::new(),
            ready: HashMap::new(),
        }
    }

    /// Claim a reader for `path`: reuse a ready one when possible,
    /// otherwise open a new one through the factory.
    pub fn acquire(&mut self, path: &Path) -> Result<SharedReader> {
        let reader = match self.ready.get_mut(path) {
            Some(queue) => {
                // A queue rather than a stack, so clips tend to pop the
                // reader their equivalent used in the previous session.
                let reader = queue.pop_front().expect("ready queues are never empty");
                if queue.is_empty() {
                    self.ready.remove(path);
                }
                reader
            }
            None => Arc::new(Mutex::new(self.factory.open(path)?)),
        };
        self.open
            .entry(path.to_path_buf())
            .or_default()
            .push_back(reader.clone());
        Ok(reader)
    }

    /// End-of-session rotation: drop readers the session did not
    /// reclaim, then make this session's readers available to the next.
    pub fn rotate(&mut self) {
        self.ready.clear();
        std::mem::swap(&mut self.ready, &mut self.open);
    }

    /// Replace the reader factory.
    pub fn set_factory(&mut self, factory: Box<dyn ReaderFactory>) {
        self.factory = factory;
    }

    /// Number of ready readers pooled for `path`.
    pub fn ready_count(&self, path: &Path) -> usize {
        self.ready.get(path).map_or(0, VecDeque::len)
    }
}

static REGISTRY: Lazy<Mutex<ReaderRegistry>> = Lazy::new(|| Mutex::new(ReaderRegistry::new()));

/// Run `f` with the process-wide reader registry.
pub fn with_registry<R>(f: impl FnOnce(&mut ReaderRegistry) -> R) -> R {
    f(&mut REGISTRY.lock())
}

/// Install a reader factory globally.
pub fn set_factory(factory: Box<dyn ReaderFactory>) {
    with_registry(|registry| registry.set_factory(factory));
}

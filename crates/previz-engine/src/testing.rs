//! Test support: session isolation and deterministic synthetic media.
//!
//! The current graph, cache, and reader pool are process-wide, so tests
//! that touch them must not interleave. [`isolated_session`] serialises
//! such tests and resets all three. The synthetic readers produce
//! deterministic procedural frames, so no media files are needed.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::{Mutex, MutexGuard};
use previz_core::{Frame, PrevizError, Result};

use crate::cache::{self, CacheAlgorithm, FrameCache};
use crate::graph;
use crate::meta::ClipMeta;
use crate::node::Clip;
use crate::reader::{self, FrameReader, ReaderFactory, SharedReader};

static TEST_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Holds the test lock for the duration of a test.
pub struct SessionGuard {
    _lock: MutexGuard<'static, ()>,
}

/// Serialise access to the process-wide state and reset it: fresh empty
/// graph, fresh specialised cache of `cache_mib` MiB, synthetic reader
/// factory, transformations enabled.
pub fn isolated_session(cache_mib: usize) -> SessionGuard {
    let lock = TEST_LOCK.lock();
    graph::reset();
    graph::set_transformations_enabled(true);
    cache::swap(FrameCache::new(
        cache_mib * 1024 * 1024,
        CacheAlgorithm::Specialised,
        false,
    ));
    reader::set_factory(Box::new(SyntheticFactory::new((64, 48), 96, 24.0)));
    SessionGuard { _lock: lock }
}

/// Run `f` with the rewrite passes switched off, restoring them after.
pub fn with_transformations_disabled<R>(f: impl FnOnce() -> R) -> R {
    struct Restore;
    impl Drop for Restore {
        fn drop(&mut self) {
            graph::set_transformations_enabled(true);
        }
    }
    let _restore = Restore;
    graph::set_transformations_enabled(false);
    f()
}

// ── Synthetic readers ───────────────────────────────────────────

/// Opens a [`SyntheticReader`] for any path, existing or not.
pub struct SyntheticFactory {
    size: (u32, u32),
    frame_count: u64,
    fps: f64,
}

impl SyntheticFactory {
    pub fn new(size: (u32, u32), frame_count: u64, fps: f64) -> Self {
        Self {
            size,
            frame_count,
            fps,
        }
    }
}

impl ReaderFactory for SyntheticFactory {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameReader>> {
        let mut hasher = DefaultHasher::new();
        path.hash(&mut hasher);
        Ok(Box::new(SyntheticReader {
            meta: ClipMeta::new(self.size, self.frame_count, self.fps),
            seed: hasher.finish(),
        }))
    }
}

/// Deterministic procedural frames seeded by the file path.
pub struct SyntheticReader {
    meta: ClipMeta,
    seed: u64,
}

impl FrameReader for SyntheticReader {
    fn metadata(&self) -> ClipMeta {
        self.meta
    }

    fn read_frame(&mut self, n: u64) -> Result<Frame> {
        if n >= self.meta.frame_count {
            return Err(PrevizError::OutOfRange(format!(
                "synthetic stream has {} frames, frame {n} requested",
                self.meta.frame_count
            )));
        }
        let seed = self.seed;
        Ok(Frame::from_fn(
            self.meta.width(),
            self.meta.height(),
            |x, y| {
                (
                    ((x as u64 * 7 + n * 13 + seed) % 256) as u8,
                    ((y as u64 * 11 + n * 17 + (seed >> 8)) % 256) as u8,
                    (((x ^ y) as u64 + n + (seed >> 16)) % 256) as u8,
                )
            },
        ))
    }
}

/// The default factory's behaviour: existence check, then refuse, so
/// tests can exercise the `FileNotFound` path.
pub struct FsOnlyFactory;

impl ReaderFactory for FsOnlyFactory {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameReader>> {
        if !path.exists() {
            return Err(PrevizError::FileNotFound(path.to_path_buf()));
        }
        Err(PrevizError::BadArgument(format!(
            "no frame reader available for {path:?}"
        )))
    }
}

struct SolidReader {
    meta: ClipMeta,
    rgb: (u8, u8, u8),
}

impl FrameReader for SolidReader {
    fn metadata(&self) -> ClipMeta {
        self.meta
    }

    fn read_frame(&mut self, _n: u64) -> Result<Frame> {
        Ok(Frame::filled(self.meta.width(), self.meta.height(), self.rgb))
    }
}

struct GradientReader {
    meta: ClipMeta,
}

impl FrameReader for GradientReader {
    fn metadata(&self) -> ClipMeta {
        self.meta
    }

    fn read_frame(&mut self, n: u64) -> Result<Frame> {
        Ok(Frame::from_fn(
            self.meta.width(),
            self.meta.height(),
            |x, y| {
                (
                    ((x as u64 * 5 + n * 19) % 256) as u8,
                    ((y as u64 * 3 + n * 23) % 256) as u8,
                    (((x + y) as u64 * 2 + n) % 256) as u8,
                )
            },
        ))
    }
}

/// A root clip whose frames are all one colour. Identity is derived
/// from the parameters, so equal calls produce structurally equal clips
/// across sessions.
pub fn solid_clip(width: u32, height: u32, frame_count: u64, rgb: (u8, u8, u8)) -> Clip {
    let path = PathBuf::from(format!(
        "solid://{width}x{height}x{frame_count}/{}-{}-{}",
        rgb.0, rgb.1, rgb.2
    ));
    let meta = ClipMeta::new((width, height), frame_count, 24.0);
    let reader: SharedReader = Arc::new(Mutex::new(Box::new(SolidReader { meta, rgb })));
    crate::ops::load::loaded_from_reader(path, reader).expect("synthetic clip always loads")
}

/// A root clip with per-frame gradient pixels, so every (frame, pixel)
/// pair is distinguishable. 24 fps.
pub fn gradient_clip(width: u32, height: u32, frame_count: u64) -> Clip {
    let path = PathBuf::from(format!("grad://{width}x{height}x{frame_count}"));
    let meta = ClipMeta::new((width, height), frame_count, 24.0);
    let reader: SharedReader = Arc::new(Mutex::new(Box::new(GradientReader { meta })));
    crate::ops::load::loaded_from_reader(path, reader).expect("synthetic clip always loads")
}

//! Loading clips from media files.

use std::path::{Path, PathBuf};

use previz_core::Result;

use crate::node::{self, Clip, ClipKind, Source};
use crate::reader::{self, SharedReader};

/// Load the media at `filepath` as a clip.
///
/// The node's identity is the absolute file path, so two sessions that
/// load the same file produce structurally equal roots. Readers come
/// from the process-wide pool and are recycled across sessions.
pub fn load(filepath: impl AsRef<Path>) -> Result<Clip> {
    let path = absolutize(filepath.as_ref());
    let shared_reader = reader::with_registry(|registry| registry.acquire(&path))?;
    loaded_from_reader(path, shared_reader)
}

/// Build a `Loaded` node around an already-claimed reader.
pub(crate) fn loaded_from_reader(path: PathBuf, reader: SharedReader) -> Result<Clip> {
    let meta = reader.lock().metadata();
    // Single-frame media (still images) is constant: every request
    // renders the same image.
    let is_constant = meta.frame_count == 1;
    node::register(Clip::new_node(
        ClipKind::Loaded { reader },
        meta,
        Source::File(path),
        false,
        is_constant,
    ))
}

/// Absolute form of `path`, falling back to the lexical join with the
/// working directory when the file does not (yet) exist.
fn absolutize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        }
    })
}

//! Clip constructors: the script-facing API surface.
//!
//! Each module holds one effect: argument processing, the canonical-order
//! push/fuse/annihilate rules against its source's variant, and the node
//! construction that runs when no rewrite applies. Rewrites happen inside
//! the constructor, so they complete before it returns and apply
//! recursively through the constructors they call.

pub mod blur;
pub mod brighten;
pub mod composite;
pub mod concat;
pub mod crop;
pub mod gaussian_blur;
pub mod greyscale;
pub mod load;
pub mod rate;
pub mod resize;
pub mod reverse;
pub mod slide;
pub mod speed;
pub mod subclip;
pub mod text;

pub use blur::KernelSize;
pub use composite::CompositePlacement;
pub use crop::CropRegion;
pub use resize::ResizeTarget;
pub use slide::SlideSpec;
pub use speed::SpeedTarget;
pub use subclip::SubclipRange;
pub use text::{GlyphRasterizer, TextStyle};

use crate::node::Clip;

/// Drop a node that a rewrite has replaced: if nothing consumes it and
/// it still sits in the leaf set, remove it.
pub(crate) fn retire_if_leaf(clip: &Clip) {
    if clip.child_count() == 0 {
        if let Some(graph) = clip.graph() {
            if graph.is_leaf(clip) {
                let _ = graph.remove_leaf(clip);
            }
        }
    }
}

/// Annihilate a single-source wrapper entirely, returning its source.
/// The source loses the wrapper as a consumer and is promoted back to a
/// leaf when nothing else consumes it.
pub(crate) fn annihilate_wrapper(clip: &Clip) -> Clip {
    let source = clip.source().parents()[0].clone();
    if clip.child_count() == 0 {
        if let Some(graph) = clip.graph() {
            if graph.is_leaf(clip) {
                let _ = graph.remove_leaf(clip);
                source.dec_child_count();
                if source.child_count() == 0 {
                    if let Some(source_graph) = source.graph() {
                        source_graph.add_leaf(&source);
                    }
                }
            }
        }
    }
    source
}

//! Concatenation.
//!
//! A concat delivers its members' frames back to back, so it is an
//! indirection. Members are auto-resized to the first clip's dimensions.
//! When rewrites are enabled, the constructor already flattens nested
//! concats; the global flattening pass catches the leaves that form
//! later.

use std::sync::atomic::AtomicUsize;

use previz_core::{PrevizError, Result};
use smallvec::SmallVec;

use crate::graph::transformations_enabled;
use crate::meta::ClipMeta;
use crate::node::{self, Clip, ClipKind, Source};
use crate::ops::{retire_if_leaf, ResizeTarget};

impl Clip {
    /// Play `self` immediately followed by each clip in `others`.
    pub fn concat(&self, others: &[Clip]) -> Result<Clip> {
        if others.is_empty() {
            return Err(PrevizError::BadArgument(
                "expected at least two clips to concatenate together".into(),
            ));
        }

        // Scale every member to the first clip's dimensions.
        let others: Vec<Clip> = others
            .iter()
            .map(|other| {
                if other.size() != self.size() {
                    other.resize(ResizeTarget::Size(self.width(), self.height()))
                } else {
                    Ok(other.clone())
                }
            })
            .collect::<Result<_>>()?;

        let mut sources: SmallVec<[Clip; 2]> = SmallVec::new();
        if transformations_enabled() {
            // Grab nested concats' sources directly instead of stacking
            // concat over concat.
            if let ClipKind::Concat { .. } = self.kind() {
                retire_if_leaf(self);
                sources.extend(self.source().parents().iter().cloned());
            } else {
                sources.push(self.clone());
            }
            for other in &others {
                if let ClipKind::Concat { .. } = other.kind() {
                    retire_if_leaf(other);
                    sources.extend(other.source().parents().iter().cloned());
                } else {
                    sources.push(other.clone());
                }
            }
        } else {
            sources.push(self.clone());
            sources.extend(others.iter().cloned());
        }

        let start_frames: Vec<u64> = sources
            .iter()
            .scan(0u64, |acc, clip| {
                *acc += clip.frame_count();
                Some(*acc)
            })
            .collect();
        let frame_count = *start_frames.last().unwrap_or(&0);

        let meta = ClipMeta::new(self.size(), frame_count, self.fps());
        node::register(Clip::new_node(
            ClipKind::Concat {
                start_frames,
                recent_source: AtomicUsize::new(0),
            },
            meta,
            Source::Parents(sources),
            true,
            false,
        ))
    }
}

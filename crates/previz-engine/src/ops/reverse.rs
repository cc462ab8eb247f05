//! Frame-order reversal.

use previz_core::{PrevizError, Result};

use crate::graph::transformations_enabled;
use crate::node::{self, Clip, ClipKind, Source};
use crate::ops::{annihilate_wrapper, retire_if_leaf};

impl Clip {
    /// Reverse the frame order: frame 0 becomes frame `count - 1`.
    pub fn reverse(&self) -> Result<Clip> {
        if transformations_enabled() {
            match self.kind() {
                // Double reversal annihilates.
                ClipKind::Reversed => return Ok(annihilate_wrapper(self)),
                ClipKind::SubClip { n1, n2 } => {
                    let (n1, n2) = (*n1, *n2);
                    let source = self.source().parents()[0].clone();
                    let count = source.frame_count();
                    retire_if_leaf(self);
                    return source
                        .reverse()?
                        .subclip_frames((count - n2) as i64, (count - n1) as i64);
                }
                ClipKind::SlideTransition { .. } => {
                    return Err(PrevizError::UnsupportedComposition(
                        "reversing a slide transition".into(),
                    ));
                }
                _ => {}
            }
        }

        node::register(Clip::new_node(
            ClipKind::Reversed,
            self.meta(),
            Source::Parents([self.clone()].into_iter().collect()),
            true,
            self.is_constant(),
        ))
    }
}

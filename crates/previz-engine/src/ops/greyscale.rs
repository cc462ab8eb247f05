//! Greyscale conversion.

use previz_core::Result;

use crate::graph::transformations_enabled;
use crate::node::{self, Clip, ClipKind, Source};

impl Clip {
    /// Convert every frame to greyscale
    /// (intensity `0.299 R + 0.587 G + 0.114 B`).
    pub fn greyscale(&self) -> Result<Clip> {
        // Idempotent: a second greyscale annihilates into the first.
        if transformations_enabled() && matches!(self.kind(), ClipKind::Greyscale) {
            return Ok(self.clone());
        }

        node::register(Clip::new_node(
            ClipKind::Greyscale,
            self.meta(),
            Source::Parents([self.clone()].into_iter().collect()),
            false,
            self.is_constant(),
        ))
    }
}

//! Frame-rate changes.
//!
//! A rate change relabels frame timing without touching frames, so it is
//! an indirection. Two stacked rate changes collapse: only the outer one
//! matters.

use previz_core::{PrevizError, Result};

use crate::graph::transformations_enabled;
use crate::meta::ClipMeta;
use crate::node::{self, Clip, ClipKind, Source};
use crate::ops::retire_if_leaf;

impl Clip {
    /// Deliver frames at `fps` frames per second.
    pub fn rate(&self, fps: f64) -> Result<Clip> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(PrevizError::BadArgument(format!(
                "fps must be positive, got {fps}"
            )));
        }

        if transformations_enabled() {
            if let ClipKind::RateChanged = self.kind() {
                // The outer rate replaces the inner one.
                let source = self.source().parents()[0].clone();
                retire_if_leaf(self);
                return source.rate(fps);
            }
        }

        let meta = ClipMeta::new(self.size(), self.frame_count(), fps);
        node::register(Clip::new_node(
            ClipKind::RateChanged,
            meta,
            Source::Parents([self.clone()].into_iter().collect()),
            true,
            self.is_constant(),
        ))
    }

    /// Deliver one frame every `delay` seconds.
    pub fn rate_delay(&self, delay: f64) -> Result<Clip> {
        if !delay.is_finite() || delay <= 0.0 {
            return Err(PrevizError::BadArgument(format!(
                "delay must be positive, got {delay}"
            )));
        }
        self.rate(1.0 / delay)
    }
}

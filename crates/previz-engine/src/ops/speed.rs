//! Playback speed changes.
//!
//! A sped clip skips or repeats source frames; each delivered frame is a
//! verbatim source frame, so speed is an indirection.

use previz_core::{PrevizError, Result};

use crate::graph::transformations_enabled;
use crate::meta::ClipMeta;
use crate::node::{self, Clip, ClipKind, Source};
use crate::ops::retire_if_leaf;

/// How the new playback speed is specified.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpeedTarget {
    /// Direct scale factor: 2.0 plays twice as fast.
    Scale(f64),
    /// Scale so the result lasts this many seconds.
    Duration(f64),
    /// Scale so the result has this many frames.
    FrameCount(u64),
}

impl Clip {
    /// Change playback speed. The frame rate stays the same; the frame
    /// count shrinks or grows by the scale factor.
    pub fn speed(&self, target: SpeedTarget) -> Result<Clip> {
        let scale = match target {
            SpeedTarget::Scale(scale) => scale,
            SpeedTarget::Duration(duration) => {
                if duration <= 0.0 {
                    return Err(PrevizError::BadArgument(format!(
                        "speed duration must be positive, got {duration}"
                    )));
                }
                self.duration() / duration
            }
            SpeedTarget::FrameCount(frames) => {
                if frames == 0 {
                    return Err(PrevizError::BadArgument(
                        "speed frame count must be positive".into(),
                    ));
                }
                self.frame_count() as f64 / frames as f64
            }
        };
        if !scale.is_finite() || scale <= 0.0 {
            return Err(PrevizError::BadArgument(format!(
                "speed scale must be positive, got {scale}"
            )));
        }
        if scale == 1.0 {
            return Ok(self.clone());
        }
        let frame_count = (self.frame_count() as f64 / scale) as u64;
        if frame_count == 0 {
            return Err(PrevizError::OutOfRange(format!(
                "speeding up by {scale} would leave no frames"
            )));
        }

        if transformations_enabled() {
            match self.kind() {
                ClipKind::Sped { scale: inner } => {
                    let combined = scale * inner;
                    retire_if_leaf(self);
                    return self.source().parents()[0].speed(SpeedTarget::Scale(combined));
                }
                ClipKind::SubClip { n1, n2 } => {
                    let (n1, n2) = (*n1, *n2);
                    let source = self.source().parents()[0].clone();
                    retire_if_leaf(self);
                    return source.speed(SpeedTarget::Scale(scale))?.subclip_frames(
                        (n1 as f64 / scale) as i64,
                        (n2 as f64 / scale) as i64,
                    );
                }
                _ => {}
            }
        }

        let meta = ClipMeta::new(self.size(), frame_count, self.fps());
        node::register(Clip::new_node(
            ClipKind::Sped { scale },
            meta,
            Source::Parents([self.clone()].into_iter().collect()),
            true,
            self.is_constant(),
        ))
    }
}

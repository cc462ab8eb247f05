//! Slide transitions.
//!
//! `a.slide(b, origin, ...)` concatenates `a` and `b` with `b` sliding
//! in from the given edge. Only the overlapping stretch becomes a
//! `SlideTransition` node; the rest of both clips is stitched around it
//! with subclips and a concat. Easing curves are captured as their
//! tabulated values, which is also what the node hashes and compares.

use previz_core::raster::SlideOrigin;
use previz_core::{EasingCurve, PrevizError, Result};

use crate::meta::ClipMeta;
use crate::node::{self, Clip, ClipKind, Source};

/// Duration and easing of a slide transition.
#[derive(Debug, Clone, Default)]
pub struct SlideSpec {
    /// Transition length in seconds. Exactly one of `duration` and
    /// `frame_count` must be given.
    pub duration: Option<f64>,
    /// Transition length in frames.
    pub frame_count: Option<u64>,
    /// Easing curve; linear when neither this nor `f_values` is given.
    pub easing: Option<EasingCurve>,
    /// Pre-tabulated easing outputs, one per transition frame. Rewrites
    /// use this to rebuild transitions without re-tabulating.
    pub f_values: Option<Vec<f64>>,
    /// Return only the sliding stretch instead of the full stitch.
    pub transition_only: bool,
}

impl Clip {
    /// Concatenate `successor` onto this clip with a slide transition
    /// from `origin`.
    pub fn slide(&self, successor: &Clip, origin: SlideOrigin, spec: SlideSpec) -> Result<Clip> {
        if self.fps() != successor.fps() {
            return Err(PrevizError::BadArgument(format!(
                "expected equal fps, but found {} and {}",
                self.fps(),
                successor.fps()
            )));
        }
        if self.size() != successor.size() {
            return Err(PrevizError::BadArgument(format!(
                "expected equal sizes, but found {:?} and {:?}",
                self.size(),
                successor.size()
            )));
        }

        let frame_count = match (spec.duration, spec.frame_count) {
            (Some(_), Some(_)) => {
                return Err(PrevizError::BadArgument(
                    "expected exactly one of duration and frame_count, but received both".into(),
                ))
            }
            (Some(duration), None) => (duration * self.fps()) as u64,
            (None, Some(frames)) => frames,
            (None, None) => {
                return Err(PrevizError::BadArgument(
                    "expected one of duration and frame_count".into(),
                ))
            }
        };
        if frame_count > self.frame_count() || frame_count > successor.frame_count() {
            return Err(PrevizError::BadArgument(format!(
                "the transition ({frame_count} frames) cannot outlast either input \
                 ({} and {} frames)",
                self.frame_count(),
                successor.frame_count()
            )));
        }
        if frame_count == 0 {
            return self.concat(&[successor.clone()]);
        }

        let f_values = match (spec.f_values, spec.easing) {
            (Some(values), None) => {
                if values.len() != frame_count as usize {
                    return Err(PrevizError::BadArgument(format!(
                        "expected {frame_count} easing values, got {}",
                        values.len()
                    )));
                }
                values
            }
            (Some(_), Some(_)) => {
                return Err(PrevizError::BadArgument(
                    "expected at most one of easing and f_values, but received both".into(),
                ))
            }
            (None, easing) => easing.unwrap_or_default().tabulate(frame_count),
        };

        // The sliding stretch: the tail of `self` against the head of
        // `successor`.
        let a = self.subclip_frames(
            (self.frame_count() - frame_count) as i64,
            self.frame_count() as i64,
        )?;
        let b = successor.subclip_frames(0, frame_count as i64)?;
        let meta = ClipMeta::new(self.size(), frame_count, self.fps());
        let transition = node::register(Clip::new_node(
            ClipKind::SlideTransition {
                origin,
                frame_count,
                f_values,
            },
            meta,
            Source::Parents([a, b].into_iter().collect()),
            false,
            false,
        ))?;

        if spec.transition_only {
            return Ok(transition);
        }

        // Stitch the non-overlapping stretches around the transition.
        if frame_count == self.frame_count() {
            if frame_count == successor.frame_count() {
                Ok(transition)
            } else {
                transition.concat(&[successor.subclip_frames(
                    frame_count as i64,
                    successor.frame_count() as i64,
                )?])
            }
        } else if frame_count == successor.frame_count() {
            self.subclip_frames(0, (self.frame_count() - frame_count) as i64)?
                .concat(&[transition])
        } else {
            self.subclip_frames(0, (self.frame_count() - frame_count) as i64)?
                .concat(&[
                    transition,
                    successor.subclip_frames(
                        frame_count as i64,
                        successor.frame_count() as i64,
                    )?,
                ])
        }
    }
}

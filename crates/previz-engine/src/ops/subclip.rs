//! Contiguous frame subranges.

use previz_core::time::Timecode;
use previz_core::{interpret_subclip_bounds, PrevizError, Result};

use crate::graph::transformations_enabled;
use crate::meta::ClipMeta;
use crate::node::{self, Clip, ClipKind, Source};
use crate::ops::{retire_if_leaf, ResizeTarget};

/// How the subrange is specified. Any consistent subset of fields may be
/// set; frame numbers and timecodes for the same bound conflict.
#[derive(Debug, Clone, Default)]
pub struct SubclipRange {
    pub n1: Option<i64>,
    pub n2: Option<i64>,
    pub frame_count: Option<i64>,
    pub t1: Option<Timecode>,
    pub t2: Option<Timecode>,
    pub duration: Option<Timecode>,
}

impl Clip {
    /// Keep only the frames in the half-open range described by `range`.
    /// Negative bounds count from the end.
    pub fn subclip(&self, range: SubclipRange) -> Result<Clip> {
        let SubclipRange {
            mut n1,
            mut n2,
            mut frame_count,
            t1,
            t2,
            duration,
        } = range;

        // Timecodes convert to frame numbers; giving both forms of the
        // same bound is contradictory.
        if let Some(t1) = t1 {
            if n1.is_some() {
                return Err(PrevizError::BadArgument(
                    "expected at most one of t1 and n1, but received both".into(),
                ));
            }
            n1 = Some(t1.to_frame(self.fps())?);
        }
        if let Some(t2) = t2 {
            if n2.is_some() {
                return Err(PrevizError::BadArgument(
                    "expected at most one of t2 and n2, but received both".into(),
                ));
            }
            n2 = Some(t2.to_frame(self.fps())?);
        }
        if let Some(duration) = duration {
            if frame_count.is_some() {
                return Err(PrevizError::BadArgument(
                    "expected at most one of duration and frame_count, but received both".into(),
                ));
            }
            frame_count = Some(duration.to_frame(self.fps())?);
        }

        let (n1, n2) = match (n1, n2, frame_count) {
            (Some(_), Some(_), Some(_)) => {
                return Err(PrevizError::BadArgument(
                    "expected at most two of n1, n2, frame_count, but received all three".into(),
                ))
            }
            (Some(n1), Some(n2), None) => (n1, n2),
            (Some(n1), None, Some(count)) => (n1, n1 + count),
            (Some(n1), None, None) => (n1, self.frame_count() as i64),
            (None, Some(n2), Some(count)) => (n2 - count, n2),
            (None, Some(n2), None) => (0, n2),
            (None, None, Some(count)) => (0, count),
            (None, None, None) => {
                return Err(PrevizError::BadArgument(
                    "subclip requires at least one bound".into(),
                ))
            }
        };
        self.subclip_frames(n1, n2)
    }

    /// Keep the frames in `[n1, n2)`; negative bounds count from the end.
    pub fn subclip_frames(&self, n1: i64, n2: i64) -> Result<Clip> {
        let (n1, n2) = interpret_subclip_bounds(n1, n2, self.frame_count())?;
        if n1 == 0 && n2 == self.frame_count() {
            return Ok(self.clone());
        }

        if transformations_enabled() {
            if let Some(rewritten) = self.push_subclip(n1, n2)? {
                return Ok(rewritten);
            }
        }

        let meta = ClipMeta::new(self.size(), n2 - n1, self.fps());
        node::register(Clip::new_node(
            ClipKind::SubClip { n1, n2 },
            meta,
            Source::Parents([self.clone()].into_iter().collect()),
            true,
            self.is_constant(),
        ))
    }

    fn push_subclip(&self, n1: u64, n2: u64) -> Result<Option<Clip>> {
        let parents = self.source().parents();
        match self.kind() {
            // A subclip stays outside every pixel effect; it only moves
            // through structural nodes.
            ClipKind::Resized { interp } => {
                if self.meta().area() >= parents[0].meta().area() {
                    let (interp, size) = (*interp, self.size());
                    retire_if_leaf(self);
                    parents[0]
                        .subclip_frames(n1 as i64, n2 as i64)?
                        .resize_with(ResizeTarget::Size(size.0, size.1), interp)
                        .map(Some)
                } else {
                    Ok(None)
                }
            }
            ClipKind::SubClip { n1: inner, .. } => {
                let offset = *inner;
                retire_if_leaf(self);
                parents[0]
                    .subclip_frames((offset + n1) as i64, (offset + n2) as i64)
                    .map(Some)
            }
            ClipKind::SlideTransition { .. } => Err(PrevizError::UnsupportedComposition(
                "taking a subclip of a slide transition".into(),
            )),
            ClipKind::Concat { start_frames, .. } => {
                let start_frames = start_frames.clone();
                let sources: Vec<Clip> = parents.to_vec();
                retire_if_leaf(self);

                // Locate the boundary members by binary search over the
                // prefix sums, then stitch the trimmed pieces back into
                // one flat concat.
                let first_index = start_frames.partition_point(|&s| s <= n1);
                let second_index = start_frames.partition_point(|&s| s < n2);
                let first_offset = if first_index == 0 {
                    n1
                } else {
                    n1 - start_frames[first_index - 1]
                };
                let second_offset = if second_index == 0 {
                    n2
                } else {
                    n2 - start_frames[second_index - 1]
                };

                if first_index == second_index {
                    sources[first_index]
                        .subclip_frames(first_offset as i64, second_offset as i64)
                        .map(Some)
                } else {
                    let first = sources[first_index].subclip_frames(
                        first_offset as i64,
                        sources[first_index].frame_count() as i64,
                    )?;
                    let mut tail: Vec<Clip> =
                        sources[first_index + 1..second_index].to_vec();
                    tail.push(
                        sources[second_index].subclip_frames(0, second_offset as i64)?,
                    );
                    first.concat(&tail).map(Some)
                }
            }
            _ => Ok(None),
        }
    }
}

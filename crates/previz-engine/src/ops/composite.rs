//! Overlay compositing.
//!
//! `bg.composite(fg, ...)` overlays `fg` on `bg` over a frame range.
//! Only the overlapped stretch becomes a `Composite` node; the before
//! and after stretches are subclips of the background stitched around
//! it with a concat, so the untouched stretches still share cache
//! entries with the plain background.

use previz_core::time::Timecode;
use previz_core::{interpret_subclip_bounds, PrevizError, Result};

use crate::graph::transformations_enabled;
use crate::node::{self, Clip, ClipKind, Source};
use crate::ops::retire_if_leaf;

/// Placement of the foreground in space (pixel coordinates, any
/// consistent subset) and time (frames or timecodes).
#[derive(Debug, Clone, Default)]
pub struct CompositePlacement {
    pub x1: Option<f64>,
    pub y1: Option<f64>,
    pub x2: Option<f64>,
    pub y2: Option<f64>,
    pub xc: Option<f64>,
    pub yc: Option<f64>,
    pub n1: Option<i64>,
    pub n2: Option<i64>,
    pub t1: Option<Timecode>,
    pub t2: Option<Timecode>,
}

impl Clip {
    /// Overlay `fg` on this clip.
    pub fn composite(&self, fg: &Clip, place: CompositePlacement) -> Result<Clip> {
        // Deduce the frame range the foreground occupies.
        let mut n1 = place.n1;
        let mut n2 = place.n2;
        if let Some(t1) = &place.t1 {
            if n1.is_some() {
                return Err(PrevizError::BadArgument(
                    "expected at most one of n1 and t1, but received both".into(),
                ));
            }
            n1 = Some(t1.to_frame(self.fps())?);
        }
        if let Some(t2) = &place.t2 {
            if n2.is_some() {
                return Err(PrevizError::BadArgument(
                    "expected at most one of n2 and t2, but received both".into(),
                ));
            }
            n2 = Some(t2.to_frame(self.fps())?);
        }
        let (n1, n2) = match (n1, n2) {
            (Some(n1), Some(n2)) => (n1, n2),
            (Some(n1), None) => (n1, n1 + fg.frame_count() as i64),
            (None, Some(n2)) => (n2 - fg.frame_count() as i64, n2),
            (None, None) => (0, fg.frame_count() as i64),
        };

        // Deduce the top-left placement point from whichever spatial
        // coordinates were given, checking the rest for consistency.
        let x1 = deduce_coordinate(place.x1, place.x2, place.xc, fg.width(), "x")?;
        let y1 = deduce_coordinate(place.y1, place.y2, place.yc, fg.height(), "y")?;

        let (n1, n2) = interpret_subclip_bounds(n1, n2, self.frame_count())?;
        if n1 == n2 {
            return Ok(self.clone());
        }

        let middle = composite_part(self, fg, n1, n2, x1, y1)?;

        // Stitch the untouched stretches of the background around the
        // overlapped part.
        let count = self.frame_count();
        if n1 == 0 {
            if n2 == count {
                Ok(middle)
            } else {
                middle.concat(&[self.subclip_frames(n2 as i64, count as i64)?])
            }
        } else if n2 == count {
            self.subclip_frames(0, n1 as i64)?.concat(&[middle])
        } else {
            self.subclip_frames(0, n1 as i64)?.concat(&[
                middle,
                self.subclip_frames(n2 as i64, count as i64)?,
            ])
        }
    }
}

/// Resolve one placement coordinate from `low`, `high`, or `centre`.
fn deduce_coordinate(
    low: Option<f64>,
    high: Option<f64>,
    centre: Option<f64>,
    extent: u32,
    axis: &str,
) -> Result<i64> {
    let extent = extent as f64;
    if let Some(low) = low {
        if let Some(high) = high {
            if (low + extent) as i64 != high as i64 {
                return Err(PrevizError::BadArgument(format!(
                    "inconsistent composite arguments on {axis}: {low} + {extent} != {high}"
                )));
            }
        }
        if let Some(centre) = centre {
            if (low + extent) as i64 != (centre * 2.0) as i64 {
                return Err(PrevizError::BadArgument(format!(
                    "inconsistent composite arguments on {axis}: centre {centre} \
                     does not match {low} + {extent}"
                )));
            }
        }
        Ok(low as i64)
    } else if let Some(high) = high {
        Ok((high - extent) as i64)
    } else if let Some(centre) = centre {
        Ok((centre - extent / 2.0) as i64)
    } else {
        Ok(0)
    }
}

/// Build the overlapped stretch: the background subclip `[n1, n2)` with
/// `fg` blitted at `(x1, y1)`. Distributes over concats on either side
/// so the composite nodes sit directly on concrete members.
fn composite_part(bg: &Clip, fg: &Clip, n1: u64, n2: u64, x1: i64, y1: i64) -> Result<Clip> {
    let middle_bg = bg.subclip_frames(n1 as i64, n2 as i64)?;

    if transformations_enabled()
        && (matches!(middle_bg.kind(), ClipKind::Concat { .. })
            || matches!(fg.kind(), ClipKind::Concat { .. }))
    {
        retire_if_leaf(&middle_bg);
        let (bg_sources, bg_starts): (Vec<Clip>, Vec<u64>) =
            if let ClipKind::Concat { start_frames, .. } = middle_bg.kind() {
                (middle_bg.source().parents().to_vec(), start_frames.clone())
            } else {
                (vec![middle_bg.clone()], vec![middle_bg.frame_count()])
            };

        let mut parts: Vec<Clip> = Vec::new();
        let mut offset = 0u64;
        for (index, &start) in bg_starts.iter().enumerate() {
            let fg_part = fg.subclip_frames(offset as i64, start as i64)?;
            if let ClipKind::Concat { start_frames, .. } = fg_part.kind() {
                let fg_starts = start_frames.clone();
                let fg_sources = fg_part.source().parents().to_vec();
                retire_if_leaf(&fg_part);
                let mut fg_offset = 0u64;
                for (fg_index, &fg_start) in fg_starts.iter().enumerate() {
                    parts.push(
                        bg_sources[index]
                            .subclip_frames(fg_offset as i64, fg_start as i64)?
                            .composite(
                                &fg_sources[fg_index],
                                CompositePlacement {
                                    x1: Some(x1 as f64),
                                    y1: Some(y1 as f64),
                                    ..Default::default()
                                },
                            )?,
                    );
                    fg_offset = fg_start;
                }
            } else {
                parts.push(bg_sources[index].composite(
                    &fg_part,
                    CompositePlacement {
                        x1: Some(x1 as f64),
                        y1: Some(y1 as f64),
                        ..Default::default()
                    },
                )?);
            }
            offset = start;
        }
        return parts[0].concat(&parts[1..]);
    }

    composite_raw(&middle_bg, fg, x1, y1)
}

/// Build a `Composite` node directly. Used by rewrites that already
/// hold aligned background and foreground pieces.
pub(crate) fn composite_raw(bg: &Clip, fg: &Clip, x1: i64, y1: i64) -> Result<Clip> {
    node::register(Clip::new_node(
        ClipKind::Composite { x1, y1 },
        bg.meta(),
        Source::Parents([bg.clone(), fg.clone()].into_iter().collect()),
        false,
        bg.is_constant() && fg.is_constant(),
    ))
}

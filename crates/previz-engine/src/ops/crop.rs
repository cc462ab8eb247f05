//! Rectangular cropping.
//!
//! Crop sinks towards the roots through pixelwise and structural
//! effects, converts to source coordinates through a resize, and picks
//! apart composites by rectangle containment. The crop itself is an
//! indirection: its frames are slices of source frames.

use previz_core::{PrevizError, Result};

use crate::graph::transformations_enabled;
use crate::meta::ClipMeta;
use crate::node::{self, Clip, ClipKind, Source};
use crate::ops::{retire_if_leaf, CompositePlacement, ResizeTarget, SlideSpec, SpeedTarget};

/// The crop rectangle; any consistent subset of fields.
/// `width`/`height` combine with an edge or centre coordinate.
#[derive(Debug, Clone, Copy, Default)]
pub struct CropRegion {
    pub x1: Option<f64>,
    pub y1: Option<f64>,
    pub x2: Option<f64>,
    pub y2: Option<f64>,
    pub xc: Option<f64>,
    pub yc: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

/// Resolve one axis: (low, high) from the bounds, centre, and extent.
fn resolve_axis(
    low: Option<f64>,
    high: Option<f64>,
    centre: Option<f64>,
    extent: Option<f64>,
    default_high: f64,
    axis: &str,
) -> Result<(f64, f64)> {
    let (mut low, mut high) = (low, high);
    if let Some(extent) = extent {
        match (low, high, centre) {
            (Some(l), Some(h), _) => {
                if l + extent != h {
                    return Err(PrevizError::BadArgument(format!(
                        "inconsistent crop arguments on {axis}: {l} + {extent} != {h}"
                    )));
                }
            }
            (Some(l), None, _) => high = Some(l + extent),
            (None, Some(h), _) => low = Some(h - extent),
            (None, None, Some(c)) => {
                low = Some(c - extent / 2.0);
                high = Some(c + extent / 2.0);
            }
            (None, None, None) => {
                low = Some(0.0);
                high = Some(extent);
            }
        }
    }
    Ok((low.unwrap_or(0.0), high.unwrap_or(default_high)))
}

impl Clip {
    /// Keep the rectangular subregion described by `region`.
    pub fn crop(&self, region: CropRegion) -> Result<Clip> {
        let (x1, x2) = resolve_axis(
            region.x1,
            region.x2,
            region.xc,
            region.width,
            self.width() as f64,
            "x",
        )?;
        let (y1, y2) = resolve_axis(
            region.y1,
            region.y2,
            region.yc,
            region.height,
            self.height() as f64,
            "y",
        )?;
        // Pixel coordinates truncate toward zero before use.
        self.crop_rect(x1 as i64, y1 as i64, x2 as i64, y2 as i64)
    }

    /// Keep the pixels in `[x1, x2) x [y1, y2)`.
    pub fn crop_rect(&self, x1: i64, y1: i64, x2: i64, y2: i64) -> Result<Clip> {
        if x1 < 0 || y1 < 0 {
            return Err(PrevizError::OutOfRange(format!(
                "the crop region exceeds the clip's top-left boundary (x1 = {x1}, y1 = {y1})"
            )));
        }
        if x2 > self.width() as i64 || y2 > self.height() as i64 {
            return Err(PrevizError::OutOfRange(format!(
                "the crop region exceeds the clip's bottom-right boundary \
                 (x2 = {x2}, y2 = {y2}, clip size = {:?})",
                self.size()
            )));
        }
        if x2 <= x1 || y2 <= y1 {
            return Err(PrevizError::OutOfRange(format!(
                "the crop region is empty (x1 = {x1}, x2 = {x2}, y1 = {y1}, y2 = {y2})"
            )));
        }
        let (x1, y1, x2, y2) = (x1 as u32, y1 as u32, x2 as u32, y2 as u32);
        if (x1, y1) == (0, 0) && (x2, y2) == self.size() {
            return Ok(self.clone());
        }

        if transformations_enabled() {
            if let Some(rewritten) = self.push_crop(x1, y1, x2, y2)? {
                return Ok(rewritten);
            }
        }

        let meta = ClipMeta::new((x2 - x1, y2 - y1), self.frame_count(), self.fps());
        node::register(Clip::new_node(
            ClipKind::Cropped { x1, y1, x2, y2 },
            meta,
            Source::Parents([self.clone()].into_iter().collect()),
            true,
            self.is_constant(),
        ))
    }

    fn push_crop(&self, x1: u32, y1: u32, x2: u32, y2: u32) -> Result<Option<Clip>> {
        let parents = self.source().parents();
        match self.kind() {
            ClipKind::Cropped {
                x1: ox1, y1: oy1, ..
            } => {
                // Offsets add; bounds were validated against this node's
                // size, which is the inner crop's extent.
                let (ox1, oy1) = (*ox1, *oy1);
                retire_if_leaf(self);
                parents[0]
                    .crop_rect(
                        (ox1 + x1) as i64,
                        (oy1 + y1) as i64,
                        (ox1 + x2) as i64,
                        (oy1 + y2) as i64,
                    )
                    .map(Some)
            }
            ClipKind::Resized { interp } => {
                // Convert to source coordinates, crop there, then resize
                // the cropped region to the requested extent.
                let interp = *interp;
                let w_scale = self.width() as f64 / parents[0].width() as f64;
                let h_scale = self.height() as f64 / parents[0].height() as f64;
                retire_if_leaf(self);
                parents[0]
                    .crop_rect(
                        (x1 as f64 / w_scale) as i64,
                        (y1 as f64 / h_scale) as i64,
                        (x2 as f64 / w_scale) as i64,
                        (y2 as f64 / h_scale) as i64,
                    )?
                    .resize_with(ResizeTarget::Size(x2 - x1, y2 - y1), interp)
                    .map(Some)
            }
            ClipKind::Brightened { amount } => {
                let amount = *amount;
                retire_if_leaf(self);
                parents[0]
                    .crop_rect(x1 as i64, y1 as i64, x2 as i64, y2 as i64)?
                    .brighten(amount)
                    .map(Some)
            }
            ClipKind::Greyscale => {
                retire_if_leaf(self);
                parents[0]
                    .crop_rect(x1 as i64, y1 as i64, x2 as i64, y2 as i64)?
                    .greyscale()
                    .map(Some)
            }
            // Blurs sample outside the crop region, so commuting with
            // them would change pixels near the edges.
            ClipKind::Blurred { .. } | ClipKind::GaussianBlurred { .. } => Ok(None),
            ClipKind::RateChanged => {
                let fps = self.fps();
                retire_if_leaf(self);
                parents[0]
                    .crop_rect(x1 as i64, y1 as i64, x2 as i64, y2 as i64)?
                    .rate(fps)
                    .map(Some)
            }
            ClipKind::Reversed => {
                retire_if_leaf(self);
                parents[0]
                    .crop_rect(x1 as i64, y1 as i64, x2 as i64, y2 as i64)?
                    .reverse()
                    .map(Some)
            }
            ClipKind::Sped { scale } => {
                let scale = *scale;
                retire_if_leaf(self);
                parents[0]
                    .crop_rect(x1 as i64, y1 as i64, x2 as i64, y2 as i64)?
                    .speed(SpeedTarget::Scale(scale))
                    .map(Some)
            }
            ClipKind::SubClip { n1, n2 } => {
                let (n1, n2) = (*n1 as i64, *n2 as i64);
                retire_if_leaf(self);
                parents[0]
                    .crop_rect(x1 as i64, y1 as i64, x2 as i64, y2 as i64)?
                    .subclip_frames(n1, n2)
                    .map(Some)
            }
            ClipKind::SlideTransition {
                origin,
                frame_count,
                f_values,
            } => {
                let (origin, frame_count) = (*origin, *frame_count);
                // Progress values are fractions of the full frame; after
                // cropping they must be re-expressed as fractions of the
                // cropped extent.
                let rescaled: Vec<f64> = if matches!(
                    origin,
                    previz_core::raster::SlideOrigin::Left
                        | previz_core::raster::SlideOrigin::Right
                ) {
                    f_values
                        .iter()
                        .map(|fv| {
                            ((fv * self.width() as f64).min(x2 as f64) - x1 as f64).max(0.0)
                                / (x2 - x1) as f64
                        })
                        .collect()
                } else {
                    f_values
                        .iter()
                        .map(|fv| {
                            ((fv * self.height() as f64).min(y2 as f64) - y1 as f64).max(0.0)
                                / (y2 - y1) as f64
                        })
                        .collect()
                };
                retire_if_leaf(self);
                let a = parents[0].crop_rect(x1 as i64, y1 as i64, x2 as i64, y2 as i64)?;
                let b = parents[1].crop_rect(x1 as i64, y1 as i64, x2 as i64, y2 as i64)?;
                a.slide(
                    &b,
                    origin,
                    SlideSpec {
                        frame_count: Some(frame_count),
                        f_values: Some(rescaled),
                        transition_only: true,
                        ..SlideSpec::default()
                    },
                )
                .map(Some)
            }
            ClipKind::Composite {
                x1: cx1,
                y1: cy1,
            } => {
                let bg = parents[0].clone();
                let fg = parents[1].clone();
                let (cx1, cy1) = (*cx1, *cy1);
                let (cx2, cy2) = (cx1 + fg.width() as i64, cy1 + fg.height() as i64);
                let (x1, y1, x2, y2) = (x1 as i64, y1 as i64, x2 as i64, y2 as i64);

                let outside = |x: i64, y: i64| {
                    ((x < cx1) as u8) << 3
                        | ((x > cx2) as u8) << 2
                        | ((y < cy1) as u8) << 1
                        | ((y > cy2) as u8)
                };
                let q1 = outside(x1, y1);
                let q2 = outside(x2, y2);
                retire_if_leaf(self);

                if q1 == 0 && q2 == 0 {
                    // Fully inside the foreground: the background never
                    // shows through.
                    fg.crop_rect(x1 - cx1, y1 - cy1, x2 - cx1, y2 - cy1).map(Some)
                } else if q1 & q2 != 0 {
                    // Fully outside the foreground.
                    bg.crop_rect(x1, y1, x2, y2).map(Some)
                } else {
                    // Straddling the foreground's edge: crop both and
                    // re-composite at the shifted point.
                    let fg_region = (
                        (x1 - cx1).max(0),
                        (y1 - cy1).max(0),
                        (x2 - cx1).min(fg.width() as i64),
                        (y2 - cy1).min(fg.height() as i64),
                    );
                    let new_point = ((cx1 - x1).max(0), (cy1 - y1).max(0));
                    let cropped_bg = bg.crop_rect(x1, y1, x2, y2)?;
                    let cropped_fg =
                        fg.crop_rect(fg_region.0, fg_region.1, fg_region.2, fg_region.3)?;
                    cropped_bg
                        .composite(
                            &cropped_fg,
                            CompositePlacement {
                                x1: Some(new_point.0 as f64),
                                y1: Some(new_point.1 as f64),
                                ..Default::default()
                            },
                        )
                        .map(Some)
                }
            }
            ClipKind::Concat { .. } => {
                let sources: Vec<Clip> = parents.to_vec();
                retire_if_leaf(self);
                let cropped: Vec<Clip> = sources
                    .iter()
                    .map(|source| {
                        source.crop_rect(x1 as i64, y1 as i64, x2 as i64, y2 as i64)
                    })
                    .collect::<Result<_>>()?;
                cropped[0].concat(&cropped[1..]).map(Some)
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn test_full_frame_is_identity() {
        let _guard = testing::isolated_session(64);
        let base = testing::gradient_clip(16, 16, 10);
        let same = base.crop_rect(0, 0, 16, 16).unwrap();
        assert!(Clip::same_node(&base, &same));
    }

    #[test]
    fn test_crop_region_pixels() {
        let _guard = testing::isolated_session(64);
        let base = testing::gradient_clip(16, 16, 10);
        let cut = base.crop_rect(2, 3, 10, 9).unwrap();
        assert_eq!(cut.size(), (8, 6));
        let frame = cut.frame(0).unwrap();
        let full = base.frame(0).unwrap();
        assert_eq!(frame.get(0, 0), full.get(2, 3));
    }

    #[test]
    fn test_out_of_range_rejected() {
        let _guard = testing::isolated_session(64);
        let base = testing::gradient_clip(16, 16, 10);
        assert!(base.crop_rect(-1, 0, 8, 8).is_err());
        assert!(base.crop_rect(0, 0, 17, 8).is_err());
        assert!(base.crop_rect(8, 0, 8, 8).is_err());
    }

    #[test]
    fn test_centre_and_extent() {
        let _guard = testing::isolated_session(64);
        let base = testing::gradient_clip(16, 16, 10);
        let cut = base
            .crop(CropRegion {
                xc: Some(8.0),
                yc: Some(8.0),
                width: Some(8.0),
                height: Some(8.0),
                ..Default::default()
            })
            .unwrap();
        assert!(matches!(
            cut.kind(),
            ClipKind::Cropped {
                x1: 4,
                y1: 4,
                x2: 12,
                y2: 12
            }
        ));
    }

    #[test]
    fn test_inconsistent_extent_rejected() {
        let _guard = testing::isolated_session(64);
        let base = testing::gradient_clip(16, 16, 10);
        assert!(base
            .crop(CropRegion {
                x1: Some(0.0),
                x2: Some(10.0),
                width: Some(4.0),
                ..Default::default()
            })
            .is_err());
    }

    #[test]
    fn test_nested_crops_fuse() {
        let _guard = testing::isolated_session(64);
        let base = testing::gradient_clip(32, 32, 10);
        let cut = base
            .crop_rect(4, 4, 28, 28)
            .unwrap()
            .crop_rect(2, 2, 10, 10)
            .unwrap();
        assert!(matches!(
            cut.kind(),
            ClipKind::Cropped {
                x1: 6,
                y1: 6,
                x2: 14,
                y2: 14
            }
        ));
        assert!(matches!(
            cut.source().parents()[0].kind(),
            ClipKind::Loaded { .. }
        ));
    }

    #[test]
    fn test_crop_through_resize() {
        let _guard = testing::isolated_session(64);
        let base = testing::gradient_clip(400, 400, 4);
        let a = base
            .resize(ResizeTarget::Scale(0.5))
            .unwrap()
            .crop_rect(0, 0, 100, 100)
            .unwrap();
        let b = base
            .crop_rect(0, 0, 200, 200)
            .unwrap()
            .resize(ResizeTarget::Scale(0.5))
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.structural_hash(), b.structural_hash());
        assert_eq!(a.frame(0).unwrap(), b.frame(0).unwrap());
    }

    #[test]
    fn test_crop_does_not_commute_with_blur() {
        let _guard = testing::isolated_session(64);
        let base = testing::gradient_clip(16, 16, 10);
        let cut = base
            .blur(crate::ops::KernelSize::Square(3))
            .unwrap()
            .crop_rect(2, 2, 10, 10)
            .unwrap();
        assert!(matches!(cut.kind(), ClipKind::Cropped { .. }));
        assert!(matches!(
            cut.source().parents()[0].kind(),
            ClipKind::Blurred { .. }
        ));
    }

    #[test]
    fn test_crop_inside_composite_foreground() {
        let _guard = testing::isolated_session(64);
        let bg = testing::gradient_clip(32, 32, 10);
        let fg = testing::solid_clip(16, 16, 10, (200, 10, 10));
        let comp = bg
            .composite(
                &fg,
                CompositePlacement {
                    x1: Some(8.0),
                    y1: Some(8.0),
                    ..Default::default()
                },
            )
            .unwrap();
        // Entirely inside the foreground rectangle [8,24)x[8,24).
        let cut = comp.crop_rect(10, 10, 20, 20).unwrap();
        assert!(matches!(
            cut.kind(),
            ClipKind::Cropped {
                x1: 2,
                y1: 2,
                x2: 12,
                y2: 12
            }
        ));
        let piece = cut.frame(0).unwrap();
        assert_eq!(piece.get(0, 0), (200, 10, 10));
    }

    #[test]
    fn test_crop_outside_composite_foreground() {
        let _guard = testing::isolated_session(64);
        let bg = testing::gradient_clip(32, 32, 10);
        let fg = testing::solid_clip(4, 4, 10, (200, 10, 10));
        let comp = bg
            .composite(
                &fg,
                CompositePlacement {
                    x1: Some(0.0),
                    y1: Some(0.0),
                    ..Default::default()
                },
            )
            .unwrap();
        let cut = comp.crop_rect(8, 8, 16, 16).unwrap();
        // The crop never sees the foreground; the composite is gone.
        assert!(matches!(cut.kind(), ClipKind::Cropped { .. }));
        assert_eq!(
            cut.frame(0).unwrap(),
            bg.crop_rect(8, 8, 16, 16).unwrap().frame(0).unwrap()
        );
    }
}

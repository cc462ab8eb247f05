//! Frame resizing, with the canonical-order rules that make the
//! session's fit-to-viewport resize transient.
//!
//! Enlarging and shrinking resizes behave differently: an enlarging
//! resize stays close to the display end of the pipeline, while a
//! shrinking resize sinks towards the roots so downstream effects work
//! on fewer pixels. Stacked resizes with the same interpolation fuse,
//! and a fused resize back to the source's own size annihilates.

use previz_core::raster::Interp;
use previz_core::{PrevizError, Result};

use crate::graph::transformations_enabled;
use crate::meta::ClipMeta;
use crate::node::{self, Clip, ClipKind, Source};
use crate::ops::{annihilate_wrapper, retire_if_leaf, SlideSpec, SpeedTarget};

/// The requested output size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResizeTarget {
    /// Uniform scale factor applied to both dimensions.
    Scale(f64),
    /// Explicit (width, height).
    Size(u32, u32),
    /// Width with height chosen to preserve aspect ratio.
    Width(u32),
    /// Height with width chosen to preserve aspect ratio.
    Height(u32),
}

impl Clip {
    /// Resize with pixel-area interpolation.
    pub fn resize(&self, target: ResizeTarget) -> Result<Clip> {
        self.resize_with(target, Interp::Area)
    }

    /// Resize with an explicit interpolation mode. The mode is part of
    /// the node's identity.
    pub fn resize_with(&self, target: ResizeTarget, interp: Interp) -> Result<Clip> {
        let (old_width, old_height) = self.size();
        let (width, height) = match target {
            ResizeTarget::Scale(scale) => {
                if !scale.is_finite() || scale <= 0.0 {
                    return Err(PrevizError::BadArgument(format!(
                        "resize scale must be positive, got {scale}"
                    )));
                }
                (
                    (old_width as f64 * scale).round() as u32,
                    (old_height as f64 * scale).round() as u32,
                )
            }
            ResizeTarget::Size(width, height) => (width, height),
            ResizeTarget::Width(width) => (
                width,
                (width as f64 / old_width as f64 * old_height as f64).round() as u32,
            ),
            ResizeTarget::Height(height) => (
                (height as f64 / old_height as f64 * old_width as f64).round() as u32,
                height,
            ),
        };

        if (width, height) == self.size() {
            return Ok(self.clone());
        }
        if width == 0 || height == 0 {
            return Err(PrevizError::BadArgument(
                "attempted to resize a clip to zero width or height".into(),
            ));
        }

        if transformations_enabled() {
            if let Some(rewritten) = self.push_resize(width, height, interp)? {
                return Ok(rewritten);
            }
        }

        let meta = ClipMeta::new((width, height), self.frame_count(), self.fps());
        node::register(Clip::new_node(
            ClipKind::Resized { interp },
            meta,
            Source::Parents([self.clone()].into_iter().collect()),
            false,
            self.is_constant(),
        ))
    }

    fn push_resize(&self, width: u32, height: u32, interp: Interp) -> Result<Option<Clip>> {
        let parents = self.source().parents();
        let growing = (width as u64) * (height as u64) >= self.meta().area();
        let target = ResizeTarget::Size(width, height);

        if growing {
            match self.kind() {
                ClipKind::Resized { interp: inner } => {
                    // Two enlarging resizes with the same interpolation
                    // fuse into one from the grandparent.
                    if self.meta().area() >= parents[0].meta().area() && *inner == interp {
                        retire_if_leaf(self);
                        return parents[0].resize_with(target, interp).map(Some);
                    }
                    Ok(None)
                }
                ClipKind::Concat { .. } => self.distribute_resize(width, height, interp).map(Some),
                _ => Ok(None),
            }
        } else {
            match self.kind() {
                ClipKind::Resized { interp: inner } => {
                    if *inner != interp {
                        return Ok(None);
                    }
                    if parents[0].size() == (width, height) {
                        // Shrinking back to the source's own size:
                        // both resizes annihilate.
                        return Ok(Some(annihilate_wrapper(self)));
                    }
                    retire_if_leaf(self);
                    parents[0].resize_with(target, interp).map(Some)
                }
                ClipKind::Brightened { amount } => {
                    let amount = *amount;
                    retire_if_leaf(self);
                    parents[0]
                        .resize_with(target, interp)?
                        .brighten(amount)
                        .map(Some)
                }
                ClipKind::Greyscale => {
                    retire_if_leaf(self);
                    parents[0].resize_with(target, interp)?.greyscale().map(Some)
                }
                ClipKind::Blurred {
                    width: bw,
                    height: bh,
                } => {
                    let (bw, bh) = (*bw, *bh);
                    retire_if_leaf(self);
                    parents[0]
                        .resize_with(target, interp)?
                        .blur_kernel(bw, bh)
                        .map(Some)
                }
                ClipKind::GaussianBlurred {
                    width: bw,
                    height: bh,
                    sigma,
                } => {
                    let (bw, bh, sigma) = (*bw, *bh, *sigma);
                    retire_if_leaf(self);
                    parents[0]
                        .resize_with(target, interp)?
                        .gaussian_blur_kernel(bw, bh, sigma)
                        .map(Some)
                }
                ClipKind::RateChanged => {
                    let fps = self.fps();
                    retire_if_leaf(self);
                    parents[0].resize_with(target, interp)?.rate(fps).map(Some)
                }
                ClipKind::Reversed => {
                    retire_if_leaf(self);
                    parents[0].resize_with(target, interp)?.reverse().map(Some)
                }
                ClipKind::Sped { scale } => {
                    let scale = *scale;
                    retire_if_leaf(self);
                    parents[0]
                        .resize_with(target, interp)?
                        .speed(SpeedTarget::Scale(scale))
                        .map(Some)
                }
                ClipKind::SubClip { n1, n2 } => {
                    let (n1, n2) = (*n1 as i64, *n2 as i64);
                    retire_if_leaf(self);
                    parents[0]
                        .resize_with(target, interp)?
                        .subclip_frames(n1, n2)
                        .map(Some)
                }
                ClipKind::SlideTransition {
                    origin,
                    frame_count,
                    f_values,
                } => {
                    // The easing values are fractions of the frame, so
                    // they survive a resize untouched.
                    let (origin, frame_count, f_values) =
                        (*origin, *frame_count, f_values.clone());
                    retire_if_leaf(self);
                    let a = parents[0].resize_with(target, interp)?;
                    let b = parents[1].resize_with(target, interp)?;
                    a.slide(
                        &b,
                        origin,
                        SlideSpec {
                            frame_count: Some(frame_count),
                            f_values: Some(f_values),
                            transition_only: true,
                            ..SlideSpec::default()
                        },
                    )
                    .map(Some)
                }
                ClipKind::Composite { x1, y1 } => {
                    let (x1, y1) = (*x1, *y1);
                    let bg = parents[0].clone();
                    let fg = parents[1].clone();
                    retire_if_leaf(self);
                    let fg_size = (
                        (fg.width() as f64 * width as f64 / bg.width() as f64).round() as u32,
                        (fg.height() as f64 * height as f64 / bg.height() as f64).round() as u32,
                    );
                    if fg_size.0 < 1 || fg_size.1 < 1 {
                        // The foreground shrinks away entirely.
                        return bg.resize_with(target, interp).map(Some);
                    }
                    let new_x = x1 as f64 * width as f64 / bg.width() as f64;
                    let new_y = y1 as f64 * height as f64 / bg.height() as f64;
                    let resized_bg = bg.resize_with(target, interp)?;
                    let resized_fg =
                        fg.resize_with(ResizeTarget::Size(fg_size.0, fg_size.1), interp)?;
                    resized_bg
                        .composite(
                            &resized_fg,
                            crate::ops::CompositePlacement {
                                x1: Some(new_x),
                                y1: Some(new_y),
                                ..Default::default()
                            },
                        )
                        .map(Some)
                }
                ClipKind::Concat { .. } => self.distribute_resize(width, height, interp).map(Some),
                _ => Ok(None),
            }
        }
    }

    /// Push a resize into each member of a concat.
    fn distribute_resize(&self, width: u32, height: u32, interp: Interp) -> Result<Clip> {
        let sources: Vec<Clip> = self.source().parents().to_vec();
        retire_if_leaf(self);
        let resized: Vec<Clip> = sources
            .iter()
            .map(|source| source.resize_with(ResizeTarget::Size(width, height), interp))
            .collect::<Result<_>>()?;
        resized[0].concat(&resized[1..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn test_same_size_is_identity() {
        let _guard = testing::isolated_session(64);
        let base = testing::gradient_clip(16, 16, 10);
        let same = base.resize(ResizeTarget::Size(16, 16)).unwrap();
        assert!(Clip::same_node(&base, &same));
    }

    #[test]
    fn test_scale_and_dimensions() {
        let _guard = testing::isolated_session(64);
        let base = testing::gradient_clip(32, 16, 10);
        let half = base.resize(ResizeTarget::Scale(0.5)).unwrap();
        assert_eq!(half.size(), (16, 8));

        let by_width = base.resize(ResizeTarget::Width(16)).unwrap();
        assert_eq!(by_width.size(), (16, 8));
        let by_height = base.resize(ResizeTarget::Height(8)).unwrap();
        assert_eq!(by_height.size(), (16, 8));
    }

    #[test]
    fn test_zero_size_rejected() {
        let _guard = testing::isolated_session(64);
        let base = testing::gradient_clip(16, 16, 10);
        assert!(base.resize(ResizeTarget::Size(0, 8)).is_err());
        assert!(base.resize(ResizeTarget::Scale(0.001)).is_err());
    }

    #[test]
    fn test_grow_then_restore_annihilates() {
        let _guard = testing::isolated_session(64);
        let base = testing::gradient_clip(32, 32, 10);
        let roundtrip = base
            .resize(ResizeTarget::Scale(2.0))
            .unwrap()
            .resize(ResizeTarget::Size(32, 32))
            .unwrap();
        assert!(Clip::same_node(&base, &roundtrip));
        assert_eq!(base.graph().unwrap().leaf_count(), 1);
    }

    #[test]
    fn test_shrink_then_grow_does_not_annihilate() {
        // Only a shrinking resize fuses with the resize below it;
        // growing back up from shrunk frames cannot recover the lost
        // pixels, so the stack is kept.
        let _guard = testing::isolated_session(64);
        let base = testing::gradient_clip(32, 32, 10);
        let stacked = base
            .resize(ResizeTarget::Scale(0.5))
            .unwrap()
            .resize(ResizeTarget::Size(32, 32))
            .unwrap();
        assert!(!Clip::same_node(&base, &stacked));
        assert!(matches!(
            stacked.source().parents()[0].kind(),
            ClipKind::Resized { .. }
        ));
    }

    #[test]
    fn test_stacked_shrinks_fuse() {
        let _guard = testing::isolated_session(64);
        let base = testing::gradient_clip(32, 32, 10);
        let small = base
            .resize(ResizeTarget::Scale(0.5))
            .unwrap()
            .resize(ResizeTarget::Scale(0.5))
            .unwrap();
        assert_eq!(small.size(), (8, 8));
        assert!(matches!(small.kind(), ClipKind::Resized { .. }));
        assert!(matches!(
            small.source().parents()[0].kind(),
            ClipKind::Loaded { .. }
        ));
    }

    #[test]
    fn test_different_interp_does_not_fuse() {
        let _guard = testing::isolated_session(64);
        let base = testing::gradient_clip(32, 32, 10);
        let stacked = base
            .resize_with(ResizeTarget::Scale(0.5), Interp::Area)
            .unwrap()
            .resize_with(ResizeTarget::Scale(0.5), Interp::Nearest)
            .unwrap();
        assert!(matches!(
            stacked.source().parents()[0].kind(),
            ClipKind::Resized { .. }
        ));
    }

    #[test]
    fn test_shrink_pushes_inside_brighten() {
        let _guard = testing::isolated_session(64);
        let base = testing::gradient_clip(32, 32, 10);
        let clip = base
            .brighten(0.5)
            .unwrap()
            .resize(ResizeTarget::Scale(0.5))
            .unwrap();
        // The brighten ends up outside, operating on the shrunk frames.
        assert!(matches!(clip.kind(), ClipKind::Brightened { .. }));
        assert!(matches!(
            clip.source().parents()[0].kind(),
            ClipKind::Resized { .. }
        ));
        assert_eq!(clip.size(), (16, 16));
    }

    #[test]
    fn test_grow_stays_outside_brighten() {
        let _guard = testing::isolated_session(64);
        let base = testing::gradient_clip(32, 32, 10);
        let clip = base
            .brighten(0.5)
            .unwrap()
            .resize(ResizeTarget::Scale(2.0))
            .unwrap();
        assert!(matches!(clip.kind(), ClipKind::Resized { .. }));
    }

    #[test]
    fn test_resize_distributes_over_concat() {
        let _guard = testing::isolated_session(64);
        let a = testing::gradient_clip(16, 16, 10);
        let b = testing::gradient_clip(16, 16, 10);
        let joined = a.concat(&[b]).unwrap();
        let resized = joined.resize(ResizeTarget::Scale(0.5)).unwrap();
        let ClipKind::Concat { .. } = resized.kind() else {
            panic!("expected concat on the outside");
        };
        for member in resized.source().parents() {
            assert_eq!(member.size(), (8, 8));
        }
    }
}

//! Brighten/darken, with its canonical-order rules.
//!
//! Brighten is a cheap pixelwise effect, so it sinks towards the roots:
//! past structural effects, past enlarging resizes, and into each member
//! of a concat. Two brightens of the same sign fuse into one.

use previz_core::{PrevizError, Result};

use crate::graph::transformations_enabled;
use crate::node::{self, Clip, ClipKind, Source};
use crate::ops::{retire_if_leaf, ResizeTarget, SlideSpec, SpeedTarget};

impl Clip {
    /// Brighten (`amount > 0`) or darken (`amount < 0`) every frame.
    /// `amount` is in `[-1, 1]`; `1` is pure white, `-1` pure black.
    pub fn brighten(&self, amount: f64) -> Result<Clip> {
        if !amount.is_finite() || !(-1.0..=1.0).contains(&amount) {
            return Err(PrevizError::BadArgument(format!(
                "brighten amount must be between -1 and 1 inclusive, got {amount}"
            )));
        }

        if transformations_enabled() {
            if let Some(rewritten) = self.push_brighten(amount)? {
                return Ok(rewritten);
            }
        }

        node::register(Clip::new_node(
            ClipKind::Brightened { amount },
            self.meta(),
            Source::Parents([self.clone()].into_iter().collect()),
            false,
            self.is_constant(),
        ))
    }

    /// The push/fuse table for brighten over `self`'s variant. Returns
    /// `None` when no rewrite applies and a plain node should wrap.
    fn push_brighten(&self, amount: f64) -> Result<Option<Clip>> {
        let parents = self.source().parents();
        match self.kind() {
            ClipKind::Brightened { amount: inner } => {
                let inner = *inner;
                let same_sign =
                    (amount >= 0.0 && inner >= 0.0) || (amount <= 0.0 && inner <= 0.0);
                if !same_sign {
                    return Ok(None);
                }
                // Amounts compose as a+b-ab (towards white) or a+b+ab
                // (towards black), keeping the result inside [-1, 1].
                let combined = if amount >= 0.0 && inner >= 0.0 {
                    amount + inner - amount * inner
                } else {
                    amount + inner + amount * inner
                };
                retire_if_leaf(self);
                parents[0].brighten(combined).map(Some)
            }
            ClipKind::Greyscale => {
                retire_if_leaf(self);
                parents[0].brighten(amount)?.greyscale().map(Some)
            }
            ClipKind::Blurred { width, height } => {
                let (width, height) = (*width, *height);
                retire_if_leaf(self);
                parents[0]
                    .brighten(amount)?
                    .blur_kernel(width, height)
                    .map(Some)
            }
            ClipKind::GaussianBlurred {
                width,
                height,
                sigma,
            } => {
                let (width, height, sigma) = (*width, *height, *sigma);
                retire_if_leaf(self);
                parents[0]
                    .brighten(amount)?
                    .gaussian_blur_kernel(width, height, sigma)
                    .map(Some)
            }
            ClipKind::RateChanged => {
                let fps = self.fps();
                retire_if_leaf(self);
                parents[0].brighten(amount)?.rate(fps).map(Some)
            }
            ClipKind::Reversed => {
                retire_if_leaf(self);
                parents[0].brighten(amount)?.reverse().map(Some)
            }
            ClipKind::Sped { scale } => {
                let scale = *scale;
                retire_if_leaf(self);
                parents[0]
                    .brighten(amount)?
                    .speed(SpeedTarget::Scale(scale))
                    .map(Some)
            }
            ClipKind::SubClip { n1, n2 } => {
                let (n1, n2) = (*n1 as i64, *n2 as i64);
                retire_if_leaf(self);
                parents[0]
                    .brighten(amount)?
                    .subclip_frames(n1, n2)
                    .map(Some)
            }
            ClipKind::SlideTransition {
                origin,
                frame_count,
                f_values,
            } => {
                let (origin, frame_count, f_values) =
                    (*origin, *frame_count, f_values.clone());
                retire_if_leaf(self);
                let a = parents[0].brighten(amount)?;
                let b = parents[1].brighten(amount)?;
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
                retire_if_leaf(self);
                let bg = parents[0].brighten(amount)?;
                let fg = parents[1].brighten(amount)?;
                crate::ops::composite::composite_raw(&bg, &fg, x1, y1).map(Some)
            }
            ClipKind::Concat { .. } => {
                retire_if_leaf(self);
                let brightened: Vec<Clip> = parents
                    .iter()
                    .map(|source| source.brighten(amount))
                    .collect::<Result<_>>()?;
                brightened[0].concat(&brightened[1..]).map(Some)
            }
            ClipKind::Resized { interp } => {
                // Only past an enlarging resize: brightening the smaller
                // source frame touches fewer pixels.
                if self.meta().area() >= parents[0].meta().area() {
                    let (interp, size) = (*interp, self.size());
                    retire_if_leaf(self);
                    parents[0]
                        .brighten(amount)?
                        .resize_with(ResizeTarget::Size(size.0, size.1), interp)
                        .map(Some)
                } else {
                    Ok(None)
                }
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
    fn test_same_sign_fusion() {
        let _guard = testing::isolated_session(64);
        let base = testing::gradient_clip(16, 16, 10);
        let fused = base.brighten(0.3).unwrap().brighten(0.3).unwrap();

        let ClipKind::Brightened { amount } = fused.kind() else {
            panic!("expected a single brightened node");
        };
        assert!((amount - 0.51).abs() < 1e-12);
        // The intermediate node is gone from the graph.
        assert_eq!(fused.graph().unwrap().leaf_count(), 1);
    }

    #[test]
    fn test_opposite_signs_do_not_fuse() {
        let _guard = testing::isolated_session(64);
        let base = testing::gradient_clip(16, 16, 10);
        let stacked = base.brighten(0.3).unwrap().brighten(-0.3).unwrap();
        let ClipKind::Brightened { .. } = stacked.kind() else {
            panic!("expected a brightened node");
        };
        assert!(matches!(
            stacked.source().parents()[0].kind(),
            ClipKind::Brightened { .. }
        ));
    }

    #[test]
    fn test_push_inside_greyscale() {
        let _guard = testing::isolated_session(64);
        let base = testing::gradient_clip(16, 16, 10);
        let clip = base.greyscale().unwrap().brighten(0.4).unwrap();
        assert!(matches!(clip.kind(), ClipKind::Greyscale));
        assert!(matches!(
            clip.source().parents()[0].kind(),
            ClipKind::Brightened { .. }
        ));
    }

    #[test]
    fn test_push_preserves_pixels_up_to_rounding() {
        let _guard = testing::isolated_session(64);
        let base = testing::gradient_clip(16, 16, 10);
        let pushed = base.greyscale().unwrap().brighten(0.4).unwrap();

        // Both orders compute the same affine pixel math; only the u8
        // rounding of the intermediate image can differ.
        testing::with_transformations_disabled(|| {
            let plain = base.greyscale().unwrap().brighten(0.4).unwrap();
            for n in [0, 5, 9] {
                let a = pushed.frame(n).unwrap();
                let b = plain.frame(n).unwrap();
                let delta = a
                    .data
                    .iter()
                    .zip(b.data.iter())
                    .map(|(&x, &y)| x.abs_diff(y))
                    .max()
                    .unwrap_or(0);
                assert!(delta <= 2, "frame {n} diverged by {delta}");
            }
        });
    }

    #[test]
    fn test_amount_out_of_range() {
        let _guard = testing::isolated_session(64);
        let base = testing::gradient_clip(16, 16, 10);
        assert!(base.brighten(1.5).is_err());
        assert!(base.brighten(f64::NAN).is_err());
    }
}

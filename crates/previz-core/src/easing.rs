//! Easing curves for transitions.
//!
//! Curves are compared by their tabulated output over the transition's
//! frame range, never by identity, so two scripts that pick the same curve
//! produce structurally equal transition nodes across sessions.

use serde::{Deserialize, Serialize};

/// The classic Penner easing family.
///
/// `value(t, b, c, d)` maps current time `t` of a transition lasting `d`
/// with start value `b` and total change `c`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EasingCurve {
    #[default]
    Linear,
    InQuad,
    OutQuad,
    InOutQuad,
    InCubic,
    OutCubic,
    InOutCubic,
    InQuart,
    OutQuart,
    InOutQuart,
    InQuint,
    OutQuint,
    InOutQuint,
    InSine,
    OutSine,
    InOutSine,
    InExpo,
    OutExpo,
    InOutExpo,
    InCirc,
    OutCirc,
    InOutCirc,
}

impl EasingCurve {
    /// Evaluate the curve.
    pub fn value(self, t: f64, b: f64, c: f64, d: f64) -> f64 {
        use std::f64::consts::PI;
        match self {
            Self::Linear => c * t / d + b,
            Self::InQuad => {
                let t = t / d;
                c * t * t + b
            }
            Self::OutQuad => {
                let t = t / d;
                -c * t * (t - 2.0) + b
            }
            Self::InOutQuad => {
                let t = t / (d / 2.0);
                if t < 1.0 {
                    c / 2.0 * t * t + b
                } else {
                    let t = t - 1.0;
                    -c / 2.0 * (t * (t - 2.0) - 1.0) + b
                }
            }
            Self::InCubic => {
                let t = t / d;
                c * t * t * t + b
            }
            Self::OutCubic => {
                let t = t / d - 1.0;
                c * (t * t * t + 1.0) + b
            }
            Self::InOutCubic => {
                let t = t / (d / 2.0);
                if t < 1.0 {
                    c / 2.0 * t * t * t + b
                } else {
                    let t = t - 2.0;
                    c / 2.0 * (t * t * t + 2.0) + b
                }
            }
            Self::InQuart => {
                let t = t / d;
                c * t * t * t * t + b
            }
            Self::OutQuart => {
                let t = t / d - 1.0;
                -c * (t * t * t * t - 1.0) + b
            }
            Self::InOutQuart => {
                let t = t / (d / 2.0);
                if t < 1.0 {
                    c / 2.0 * t * t * t * t + b
                } else {
                    let t = t - 2.0;
                    -c / 2.0 * (t * t * t * t - 2.0) + b
                }
            }
            Self::InQuint => {
                let t = t / d;
                c * t * t * t * t * t + b
            }
            Self::OutQuint => {
                let t = t / d - 1.0;
                c * (t * t * t * t * t + 1.0) + b
            }
            Self::InOutQuint => {
                let t = t / (d / 2.0);
                if t < 1.0 {
                    c / 2.0 * t * t * t * t * t + b
                } else {
                    let t = t - 2.0;
                    c / 2.0 * (t * t * t * t * t + 2.0) + b
                }
            }
            Self::InSine => -c * (t / d * (PI / 2.0)).cos() + c + b,
            Self::OutSine => c * (t / d * (PI / 2.0)).sin() + b,
            Self::InOutSine => -c / 2.0 * ((PI * t / d).cos() - 1.0) + b,
            Self::InExpo => c * 2f64.powf(10.0 * (t / d - 1.0)) + b,
            Self::OutExpo => c * (-(2f64.powf(-10.0 * t / d)) + 1.0) + b,
            Self::InOutExpo => {
                let t = t / (d / 2.0);
                if t < 1.0 {
                    c / 2.0 * 2f64.powf(10.0 * (t - 1.0)) + b
                } else {
                    let t = t - 1.0;
                    c / 2.0 * (-(2f64.powf(-10.0 * t)) + 2.0) + b
                }
            }
            Self::InCirc => {
                let t = t / d;
                -c * ((1.0 - t * t).sqrt() - 1.0) + b
            }
            Self::OutCirc => {
                let t = t / d - 1.0;
                c * (1.0 - t * t).sqrt() + b
            }
            Self::InOutCirc => {
                let t = t / (d / 2.0);
                if t < 1.0 {
                    -c / 2.0 * ((1.0 - t * t).sqrt() - 1.0) + b
                } else {
                    let t = t - 2.0;
                    c / 2.0 * ((1.0 - t * t).sqrt() + 1.0) + b
                }
            }
        }
    }

    /// Tabulate `value(t, 0, 1, frame_count)` for `t` in `[0, frame_count)`.
    ///
    /// This vector is what transition nodes hash and compare.
    pub fn tabulate(self, frame_count: u64) -> Vec<f64> {
        (0..frame_count)
            .map(|t| self.value(t as f64, 0.0, 1.0, frame_count as f64))
            .collect()
    }
}

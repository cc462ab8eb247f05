//! Timecode parsing and frame arithmetic.
//!
//! Timecodes are `[±][[h:]m:]s(.frac)` strings; all components may be
//! fractional. Frame numbers are what the engine actually computes with.

use crate::error::{PrevizError, Result};

/// A point in time given either as seconds or as a timecode string.
#[derive(Debug, Clone, PartialEq)]
pub enum Timecode {
    /// Seconds, possibly fractional or negative.
    Seconds(f64),
    /// A `[±][[h:]m:]s(.frac)` string.
    Text(String),
}

impl Timecode {
    /// Resolve to a signed frame number at the given fps.
    pub fn to_frame(&self, fps: f64) -> Result<i64> {
        match self {
            Timecode::Seconds(seconds) => Ok((seconds * fps) as i64),
            Timecode::Text(text) => timecode_to_frame(text, fps),
        }
    }
}

impl From<f64> for Timecode {
    fn from(seconds: f64) -> Self {
        Timecode::Seconds(seconds)
    }
}

impl From<&str> for Timecode {
    fn from(text: &str) -> Self {
        Timecode::Text(text.to_string())
    }
}

/// Convert a timecode string to a signed frame number at the given fps.
///
/// ```
/// # use previz_core::time::timecode_to_frame;
/// assert_eq!(timecode_to_frame("1:00", 30.0).unwrap(), 1800);
/// assert_eq!(timecode_to_frame("-2.5", 10.0).unwrap(), -25);
/// ```
pub fn timecode_to_frame(timecode: &str, fps: f64) -> Result<i64> {
    let bad = || PrevizError::BadTimecode(timecode.to_string());

    let (sign, rest) = match timecode.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, timecode.strip_prefix('+').unwrap_or(timecode)),
    };
    if rest.is_empty() {
        return Err(bad());
    }

    let parts: Vec<&str> = rest.split(':').collect();
    let (h, m, s) = match parts.as_slice() {
        [s] => (0.0, 0.0, s.parse::<f64>().map_err(|_| bad())?),
        [m, s] => (
            0.0,
            m.parse::<f64>().map_err(|_| bad())?,
            s.parse::<f64>().map_err(|_| bad())?,
        ),
        [h, m, s] => (
            h.parse::<f64>().map_err(|_| bad())?,
            m.parse::<f64>().map_err(|_| bad())?,
            s.parse::<f64>().map_err(|_| bad())?,
        ),
        _ => return Err(bad()),
    };

    let total_seconds = s + m * 60.0 + h * 3600.0;
    Ok((sign * (total_seconds * fps).round()) as i64)
}

/// Convert a frame number to an `h:mm:ss.ss` timecode at the given fps.
pub fn frame_to_timecode(n: i64, fps: f64) -> String {
    let (prefix, n) = if n < 0 { ("-", -n) } else { ("", n) };
    let frames_per_hour = fps * 3600.0;
    let frames_per_minute = fps * 60.0;

    let h = (n as f64 / frames_per_hour).floor();
    let rem = n as f64 - h * frames_per_hour;
    let m = (rem / frames_per_minute).floor();
    let s = (rem - m * frames_per_minute) / fps;

    format!("{prefix}{h:02.0}:{m:02.0}:{s:05.2}")
}

/// Normalise subclip bounds `(n1, n2)` against a clip of `frame_count`
/// frames. Negative values count from the end; the result is a valid
/// half-open range `[n1, n2)`.
pub fn interpret_subclip_bounds(n1: i64, n2: i64, frame_count: u64) -> Result<(u64, u64)> {
    let fc = frame_count as i64;
    let n1 = if n1 < 0 { n1 + fc } else { n1 };
    let n2 = if n2 < 0 { n2 + fc } else { n2 };
    if n1 > n2 || n1 < 0 || n1 >= fc || n2 < 1 || n2 > fc {
        return Err(PrevizError::OutOfRange(format!(
            "invalid subclip bounds: n1 = {n1}, n2 = {n2}, frame count = {frame_count}"
        )));
    }
    Ok((n1 as u64, n2 as u64))
}

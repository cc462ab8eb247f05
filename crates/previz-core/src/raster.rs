//! Naive CPU raster kernels used by the frame generators.
//!
//! These are deliberately simple single-threaded reference kernels. They
//! trade speed for being obviously correct, which is what the rewrite
//! engine's pixel-equivalence guarantees are tested against. The GUI is
//! free to substitute faster implementations for display-only paths.

use crate::frame::Frame;

/// Interpolation mode for [`resize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Interp {
    /// Nearest-neighbour sampling.
    Nearest,
    /// Bilinear sampling.
    Bilinear,
    /// Pixel-area averaging. Best for shrinking.
    #[default]
    Area,
}

/// The edge a slide transition reveals the successor from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlideOrigin {
    Top,
    Bottom,
    Left,
    Right,
}

/// Brighten or darken every pixel.
///
/// For `amount >= 0` pixels are pulled towards white: `px*(1-a) + a*255`.
/// For `amount < 0` pixels are pulled towards black: `px*(1+a)`.
pub fn brighten(src: &Frame, amount: f64) -> Frame {
    let mut out = Frame::new(src.width, src.height);
    if amount >= 0.0 {
        let offset = amount * 255.0;
        for (d, s) in out.data.iter_mut().zip(src.data.iter()) {
            *d = ((*s as f64) * (1.0 - amount) + offset).round() as u8;
        }
    } else {
        for (d, s) in out.data.iter_mut().zip(src.data.iter()) {
            *d = ((*s as f64) * (1.0 + amount)).round() as u8;
        }
    }
    out
}

/// Convert to greyscale with intensity `0.299 R + 0.587 G + 0.114 B`,
/// replicated into all three channels.
pub fn greyscale(src: &Frame) -> Frame {
    let mut out = Frame::new(src.width, src.height);
    for (d, s) in out.data.chunks_exact_mut(3).zip(src.data.chunks_exact(3)) {
        let grey =
            (0.299 * s[0] as f64 + 0.587 * s[1] as f64 + 0.114 * s[2] as f64).round() as u8;
        d[0] = grey;
        d[1] = grey;
        d[2] = grey;
    }
    out
}

/// Copy the rectangle `[x1, x2) x [y1, y2)` out of `src`.
///
/// The caller validates bounds; this slices.
pub fn crop(src: &Frame, x1: u32, y1: u32, x2: u32, y2: u32) -> Frame {
    let mut out = Frame::new(x2 - x1, y2 - y1);
    for y in y1..y2 {
        let srow = src.row(y);
        let drow = out.row_mut(y - y1);
        let a = (x1 as usize) * 3;
        let b = (x2 as usize) * 3;
        drow.copy_from_slice(&srow[a..b]);
    }
    out
}

/// Blit `fg` over `dst` with its top-left corner at `(x, y)`.
///
/// Coordinates may be negative or extend past the destination; the
/// visible intersection is copied, anything else is clipped away.
pub fn blit(dst: &mut Frame, fg: &Frame, x: i64, y: i64) {
    let x2 = x + fg.width as i64;
    let y2 = y + fg.height as i64;
    if x2 <= 0 || y2 <= 0 || x >= dst.width as i64 || y >= dst.height as i64 {
        return;
    }

    let fx1 = (-x).max(0) as u32;
    let fy1 = (-y).max(0) as u32;
    let fx2 = (fg.width as i64 - (x2 - dst.width as i64).max(0)) as u32;
    let fy2 = (fg.height as i64 - (y2 - dst.height as i64).max(0)) as u32;

    let dx = x.max(0) as u32;
    let dy = y.max(0) as u32;
    for fy in fy1..fy2 {
        let srow = fg.row(fy);
        let drow = dst.row_mut(dy + (fy - fy1));
        let src = &srow[(fx1 as usize) * 3..(fx2 as usize) * 3];
        let off = (dx as usize) * 3;
        drow[off..off + src.len()].copy_from_slice(src);
    }
}

/// Mean (box) blur with a `w x h` window and clamped borders.
pub fn box_blur(src: &Frame, w: u32, h: u32) -> Frame {
    let kx = uniform_kernel(w);
    let ky = uniform_kernel(h);
    convolve_separable(src, &kx, &ky)
}

/// Gaussian blur with an odd `w x h` kernel.
///
/// A non-positive sigma is derived from the kernel size with the usual
/// `0.3*((k-1)*0.5 - 1) + 0.8` rule.
pub fn gaussian_blur(src: &Frame, w: u32, h: u32, sigma: (f64, f64)) -> Frame {
    let kx = gaussian_kernel(w, sigma.0);
    let ky = gaussian_kernel(h, sigma.1);
    convolve_separable(src, &kx, &ky)
}

/// Resize to `(width, height)` using the given interpolation mode.
pub fn resize(src: &Frame, width: u32, height: u32, interp: Interp) -> Frame {
    if width == src.width && height == src.height {
        return src.clone();
    }
    match interp {
        Interp::Nearest => resize_nearest(src, width, height),
        Interp::Bilinear => resize_bilinear(src, width, height),
        Interp::Area => {
            // Area averaging only makes sense when shrinking; fall back to
            // bilinear when growing, matching common practice.
            if (width as u64) * (height as u64) < (src.width as u64) * (src.height as u64) {
                resize_area(src, width, height)
            } else {
                resize_bilinear(src, width, height)
            }
        }
    }
}

/// Render one frame of a slide transition: `progress` of `succ` has slid
/// in over `base` from `origin`.
pub fn slide_blit(base: &Frame, succ: &Frame, origin: SlideOrigin, progress: f64) -> Frame {
    let mut out = base.clone();
    let w = base.width;
    let h = base.height;
    match origin {
        SlideOrigin::Top => {
            let reveal = (progress * h as f64) as u32;
            if reveal > 0 {
                let part = crop(succ, 0, h - reveal, w, h);
                blit(&mut out, &part, 0, 0);
            }
        }
        SlideOrigin::Bottom => {
            let reveal = (progress * h as f64) as u32;
            if reveal > 0 {
                let part = crop(succ, 0, 0, w, reveal);
                blit(&mut out, &part, 0, (h - reveal) as i64);
            }
        }
        SlideOrigin::Left => {
            let reveal = (progress * w as f64) as u32;
            if reveal > 0 {
                let part = crop(succ, w - reveal, 0, w, h);
                blit(&mut out, &part, 0, 0);
            }
        }
        SlideOrigin::Right => {
            let reveal = (progress * w as f64) as u32;
            if reveal > 0 {
                let part = crop(succ, 0, 0, reveal, h);
                blit(&mut out, &part, (w - reveal) as i64, 0);
            }
        }
    }
    out
}

// ── Kernel helpers ──────────────────────────────────────────────

fn uniform_kernel(size: u32) -> Vec<f64> {
    let size = size.max(1) as usize;
    vec![1.0 / size as f64; size]
}

fn gaussian_kernel(size: u32, sigma: f64) -> Vec<f64> {
    let size = size.max(1) as usize;
    let sigma = if sigma > 0.0 {
        sigma
    } else {
        0.3 * ((size as f64 - 1.0) * 0.5 - 1.0) + 0.8
    };
    let centre = (size as f64 - 1.0) / 2.0;
    let mut kernel: Vec<f64> = (0..size)
        .map(|i| {
            let d = i as f64 - centre;
            (-d * d / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let total: f64 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= total;
    }
    kernel
}

/// Separable convolution with clamped borders.
fn convolve_separable(src: &Frame, kx: &[f64], ky: &[f64]) -> Frame {
    let w = src.width as i64;
    let h = src.height as i64;
    let ax = (kx.len() / 2) as i64;
    let ay = (ky.len() / 2) as i64;

    // Horizontal pass into a float buffer.
    let mut tmp = vec![0.0f64; (w * h * 3) as usize];
    for y in 0..h {
        let row = src.row(y as u32);
        for x in 0..w {
            let mut acc = [0.0f64; 3];
            for (i, kv) in kx.iter().enumerate() {
                let sx = (x + i as i64 - ax).clamp(0, w - 1) as usize;
                acc[0] += kv * row[sx * 3] as f64;
                acc[1] += kv * row[sx * 3 + 1] as f64;
                acc[2] += kv * row[sx * 3 + 2] as f64;
            }
            let o = ((y * w + x) * 3) as usize;
            tmp[o] = acc[0];
            tmp[o + 1] = acc[1];
            tmp[o + 2] = acc[2];
        }
    }

    // Vertical pass back into u8.
    let mut out = Frame::new(src.width, src.height);
    for y in 0..h {
        for x in 0..w {
            let mut acc = [0.0f64; 3];
            for (i, kv) in ky.iter().enumerate() {
                let sy = (y + i as i64 - ay).clamp(0, h - 1);
                let o = ((sy * w + x) * 3) as usize;
                acc[0] += kv * tmp[o];
                acc[1] += kv * tmp[o + 1];
                acc[2] += kv * tmp[o + 2];
            }
            out.put(
                x as u32,
                y as u32,
                (
                    acc[0].round().clamp(0.0, 255.0) as u8,
                    acc[1].round().clamp(0.0, 255.0) as u8,
                    acc[2].round().clamp(0.0, 255.0) as u8,
                ),
            );
        }
    }
    out
}

// ── Resize implementations ──────────────────────────────────────

fn resize_nearest(src: &Frame, width: u32, height: u32) -> Frame {
    let mut out = Frame::new(width, height);
    for y in 0..height {
        let sy = (y as u64 * src.height as u64 / height as u64).min(src.height as u64 - 1) as u32;
        for x in 0..width {
            let sx = (x as u64 * src.width as u64 / width as u64).min(src.width as u64 - 1) as u32;
            out.put(x, y, src.get(sx, sy));
        }
    }
    out
}

fn resize_bilinear(src: &Frame, width: u32, height: u32) -> Frame {
    let mut out = Frame::new(width, height);
    let sx_max = (src.width - 1) as f64;
    let sy_max = (src.height - 1) as f64;
    for y in 0..height {
        let fy = if height == 1 {
            0.0
        } else {
            y as f64 * sy_max / (height - 1) as f64
        };
        let y0 = fy.floor() as u32;
        let y1 = (y0 + 1).min(src.height - 1);
        let ty = fy - y0 as f64;
        for x in 0..width {
            let fx = if width == 1 {
                0.0
            } else {
                x as f64 * sx_max / (width - 1) as f64
            };
            let x0 = fx.floor() as u32;
            let x1 = (x0 + 1).min(src.width - 1);
            let tx = fx - x0 as f64;

            let p00 = src.get(x0, y0);
            let p10 = src.get(x1, y0);
            let p01 = src.get(x0, y1);
            let p11 = src.get(x1, y1);
            let lerp = |a: u8, b: u8, t: f64| a as f64 * (1.0 - t) + b as f64 * t;
            let mix = |c00, c10, c01, c11| {
                let top = lerp(c00, c10, tx);
                let bot = lerp(c01, c11, tx);
                (top * (1.0 - ty) + bot * ty).round().clamp(0.0, 255.0) as u8
            };
            out.put(
                x,
                y,
                (
                    mix(p00.0, p10.0, p01.0, p11.0),
                    mix(p00.1, p10.1, p01.1, p11.1),
                    mix(p00.2, p10.2, p01.2, p11.2),
                ),
            );
        }
    }
    out
}

fn resize_area(src: &Frame, width: u32, height: u32) -> Frame {
    let mut out = Frame::new(width, height);
    let xs = src.width as f64 / width as f64;
    let ys = src.height as f64 / height as f64;
    for y in 0..height {
        let sy0 = (y as f64 * ys).floor() as u32;
        let sy1 = (((y + 1) as f64 * ys).ceil() as u32).min(src.height).max(sy0 + 1);
        for x in 0..width {
            let sx0 = (x as f64 * xs).floor() as u32;
            let sx1 = (((x + 1) as f64 * xs).ceil() as u32).min(src.width).max(sx0 + 1);
            let mut acc = [0.0f64; 3];
            let mut count = 0.0;
            for sy in sy0..sy1 {
                for sx in sx0..sx1 {
                    let p = src.get(sx, sy);
                    acc[0] += p.0 as f64;
                    acc[1] += p.1 as f64;
                    acc[2] += p.2 as f64;
                    count += 1.0;
                }
            }
            out.put(
                x,
                y,
                (
                    (acc[0] / count).round() as u8,
                    (acc[1] / count).round() as u8,
                    (acc[2] / count).round() as u8,
                ),
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32) -> Frame {
        Frame::from_fn(w, h, |x, y| ((x * 7 % 256) as u8, (y * 11 % 256) as u8, 128))
    }

    #[test]
    fn test_brighten_full_white() {
        let out = brighten(&gradient(8, 8), 1.0);
        assert!(out.data.iter().all(|&b| b == 255));
    }

    #[test]
    fn test_brighten_full_black() {
        let out = brighten(&gradient(8, 8), -1.0);
        assert!(out.data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_brighten_zero_is_identity() {
        let src = gradient(8, 8);
        assert_eq!(brighten(&src, 0.0), src);
    }

    #[test]
    fn test_greyscale_channels_equal() {
        let out = greyscale(&gradient(8, 8));
        for px in out.data.chunks_exact(3) {
            assert_eq!(px[0], px[1]);
            assert_eq!(px[1], px[2]);
        }
    }

    #[test]
    fn test_greyscale_idempotent() {
        let once = greyscale(&gradient(8, 8));
        let twice = greyscale(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_crop_region() {
        let src = gradient(16, 16);
        let out = crop(&src, 2, 3, 10, 7);
        assert_eq!((out.width, out.height), (8, 4));
        assert_eq!(out.get(0, 0), src.get(2, 3));
        assert_eq!(out.get(7, 3), src.get(9, 6));
    }

    #[test]
    fn test_blit_clips_negative() {
        let mut dst = Frame::filled(8, 8, (0, 0, 0));
        let fg = Frame::filled(4, 4, (255, 0, 0));
        blit(&mut dst, &fg, -2, -2);
        assert_eq!(dst.get(0, 0), (255, 0, 0));
        assert_eq!(dst.get(1, 1), (255, 0, 0));
        assert_eq!(dst.get(2, 2), (0, 0, 0));
    }

    #[test]
    fn test_blit_fully_outside_is_noop() {
        let mut dst = Frame::filled(8, 8, (9, 9, 9));
        let fg = Frame::filled(4, 4, (255, 0, 0));
        blit(&mut dst, &fg, 100, 100);
        assert!(dst.data.iter().all(|&b| b == 9));
    }

    #[test]
    fn test_box_blur_constant_frame_unchanged() {
        let src = Frame::filled(8, 8, (50, 100, 150));
        let out = box_blur(&src, 3, 3);
        assert_eq!(out, src);
    }

    #[test]
    fn test_gaussian_blur_constant_frame_unchanged() {
        let src = Frame::filled(8, 8, (50, 100, 150));
        let out = gaussian_blur(&src, 5, 5, (0.0, 0.0));
        assert_eq!(out, src);
    }

    #[test]
    fn test_resize_dimensions() {
        let src = gradient(16, 8);
        for interp in [Interp::Nearest, Interp::Bilinear, Interp::Area] {
            let out = resize(&src, 8, 4, interp);
            assert_eq!((out.width, out.height), (8, 4));
        }
    }

    #[test]
    fn test_resize_same_size_is_identity() {
        let src = gradient(16, 8);
        assert_eq!(resize(&src, 16, 8, Interp::Area), src);
    }

    #[test]
    fn test_slide_progress_extremes() {
        let base = Frame::filled(8, 8, (1, 1, 1));
        let succ = Frame::filled(8, 8, (2, 2, 2));
        let none = slide_blit(&base, &succ, SlideOrigin::Right, 0.0);
        assert_eq!(none, base);
        let all = slide_blit(&base, &succ, SlideOrigin::Right, 1.0);
        assert_eq!(all, succ);
    }

    #[test]
    fn test_slide_partial_left() {
        let base = Frame::filled(8, 8, (1, 1, 1));
        let succ = Frame::filled(8, 8, (2, 2, 2));
        let half = slide_blit(&base, &succ, SlideOrigin::Left, 0.5);
        assert_eq!(half.get(0, 0), (2, 2, 2));
        assert_eq!(half.get(7, 0), (1, 1, 1));
    }
}

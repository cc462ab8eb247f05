//! Rendered text clips.
//!
//! A text clip is a constant single-frame clip whose image comes from a
//! [`GlyphRasterizer`]. Real font rendering belongs to the GUI layer;
//! the built-in rasterizer draws deterministic blocky glyph cells so the
//! engine (and its tests) never need a font stack.

use std::hash::{Hash, Hasher};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use previz_core::{Frame, Result};

use crate::meta::ClipMeta;
use crate::node::{self, Clip, ClipKind, Source};

/// Styling options for [`text`].
#[derive(Debug, Clone, PartialEq)]
pub struct TextStyle {
    /// Font name or path; `None` selects the rasterizer's default.
    pub font: Option<String>,
    /// Nominal glyph height in pixels.
    pub size: u32,
    pub color: (u8, u8, u8),
    /// `None` renders on white.
    pub background: Option<(u8, u8, u8)>,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub antialias: bool,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font: None,
            size: 12,
            color: (0, 0, 0),
            background: None,
            bold: false,
            italic: false,
            underline: false,
            antialias: true,
        }
    }
}

/// The full parameter record of a text node; part of its identity.
#[derive(Debug, Clone, PartialEq)]
pub struct TextParams {
    pub content: String,
    pub style: TextStyle,
}

impl TextParams {
    pub(crate) fn feed<H: Hasher>(&self, state: &mut H) {
        self.content.hash(state);
        self.style.font.hash(state);
        self.style.size.hash(state);
        self.style.color.hash(state);
        self.style.background.hash(state);
        (
            self.style.bold,
            self.style.italic,
            self.style.underline,
            self.style.antialias,
        )
            .hash(state);
    }
}

/// Measures and rasterizes text. The GUI installs a real font renderer;
/// the default draws placeholder glyph blocks.
pub trait GlyphRasterizer: Send {
    /// Pixel dimensions of the rendered string.
    fn measure(&self, params: &TextParams) -> (u32, u32);

    /// Render the string into a frame of exactly `measure(params)` size.
    fn rasterize(&self, params: &TextParams) -> Frame;
}

/// The built-in placeholder rasterizer: one filled cell per character,
/// with a per-character inset so different strings look different.
pub struct BlockGlyphs;

impl BlockGlyphs {
    fn cell_width(style: &TextStyle) -> u32 {
        let base = (style.size * 3).div_ceil(5).max(1);
        if style.bold {
            base + 1
        } else {
            base
        }
    }
}

impl GlyphRasterizer for BlockGlyphs {
    fn measure(&self, params: &TextParams) -> (u32, u32) {
        let chars = params.content.chars().count().max(1) as u32;
        (chars * Self::cell_width(&params.style), params.style.size.max(1))
    }

    fn rasterize(&self, params: &TextParams) -> Frame {
        let style = &params.style;
        let (width, height) = self.measure(params);
        let background = style.background.unwrap_or((255, 255, 255));
        let mut frame = Frame::filled(width, height, background);

        let cell_w = Self::cell_width(style);
        for (index, ch) in params.content.chars().enumerate() {
            if ch.is_whitespace() {
                continue;
            }
            let x0 = index as u32 * cell_w;
            let inset = (ch as u32) % 3;
            for y in inset..height.saturating_sub(inset.max(1)) {
                for x in (x0 + inset)..(x0 + cell_w).saturating_sub(inset).min(width) {
                    frame.put(x, y, style.color);
                }
            }
        }
        if style.underline && height > 0 {
            for x in 0..width {
                frame.put(x, height - 1, style.color);
            }
        }
        frame
    }
}

static RASTERIZER: Lazy<Mutex<Box<dyn GlyphRasterizer>>> =
    Lazy::new(|| Mutex::new(Box::new(BlockGlyphs)));

/// Install a glyph rasterizer globally.
pub fn set_glyph_rasterizer(rasterizer: Box<dyn GlyphRasterizer>) {
    *RASTERIZER.lock() = rasterizer;
}

pub(crate) fn rasterize(params: &TextParams) -> Frame {
    RASTERIZER.lock().rasterize(params)
}

/// Create a constant image clip with `content` rendered in `style`.
pub fn text(content: impl Into<String>, style: TextStyle) -> Result<Clip> {
    let params = TextParams {
        content: content.into(),
        style,
    };
    let size = RASTERIZER.lock().measure(&params);
    // Constant clips report a single frame; the conventional 30 fps only
    // matters when a text clip is concatenated with real footage.
    let meta = ClipMeta::new(size, 1, 30.0);
    node::register(Clip::new_node(
        ClipKind::Text(params),
        meta,
        Source::Generated,
        false,
        true,
    ))
}

//! Box blur.

use previz_core::{PrevizError, Result};

use crate::node::{self, Clip, ClipKind, Source};

/// Kernel dimensions for the blur effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelSize {
    /// Same extent in both directions.
    Square(u32),
    /// (width, height).
    Rect(u32, u32),
    /// Horizontal only.
    Width(u32),
    /// Vertical only.
    Height(u32),
}

impl KernelSize {
    pub(crate) fn resolve(self) -> (u32, u32) {
        match self {
            KernelSize::Square(size) => (size, size),
            KernelSize::Rect(width, height) => (width, height),
            KernelSize::Width(width) => (width, 1),
            KernelSize::Height(height) => (1, height),
        }
    }
}

impl Clip {
    /// Blur every frame with a mean filter of the given kernel size.
    pub fn blur(&self, size: KernelSize) -> Result<Clip> {
        let (width, height) = size.resolve();
        if width < 1 || height < 1 {
            return Err(PrevizError::BadArgument(
                "blur amounts must be integers greater than or equal to 1".into(),
            ));
        }
        self.blur_kernel(width, height)
    }

    pub(crate) fn blur_kernel(&self, width: u32, height: u32) -> Result<Clip> {
        node::register(Clip::new_node(
            ClipKind::Blurred { width, height },
            self.meta(),
            Source::Parents([self.clone()].into_iter().collect()),
            false,
            self.is_constant(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn test_blur_zero_rejected() {
        let _guard = testing::isolated_session(64);
        let base = testing::gradient_clip(16, 16, 10);
        assert!(base.blur(KernelSize::Square(0)).is_err());
    }

    #[test]
    fn test_blur_keeps_dimensions() {
        let _guard = testing::isolated_session(64);
        let base = testing::gradient_clip(16, 16, 10);
        let blurred = base.blur(KernelSize::Rect(5, 3)).unwrap();
        assert_eq!(blurred.size(), (16, 16));
        assert!(matches!(
            blurred.kind(),
            ClipKind::Blurred {
                width: 5,
                height: 3
            }
        ));
    }

    #[test]
    fn test_width_only_blur() {
        let _guard = testing::isolated_session(64);
        let base = testing::gradient_clip(16, 16, 10);
        let blurred = base.blur(KernelSize::Width(5)).unwrap();
        assert!(matches!(
            blurred.kind(),
            ClipKind::Blurred {
                width: 5,
                height: 1
            }
        ));
    }
}

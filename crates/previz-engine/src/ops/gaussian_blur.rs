//! Gaussian blur.

use previz_core::{PrevizError, Result};

use crate::node::{self, Clip, ClipKind, Source};
use crate::ops::KernelSize;

impl Clip {
    /// Gaussian-blur every frame. Kernel extents must be odd; sigma is
    /// derived from the kernel size.
    pub fn gaussian_blur(&self, size: KernelSize) -> Result<Clip> {
        self.gaussian_blur_with(size, (0.0, 0.0))
    }

    /// Gaussian blur with explicit per-axis sigma values.
    pub fn gaussian_blur_with(&self, size: KernelSize, sigma: (f64, f64)) -> Result<Clip> {
        let (width, height) = size.resolve();
        if width < 1 || height < 1 || width % 2 == 0 || height % 2 == 0 {
            return Err(PrevizError::BadArgument(
                "gaussian blur amounts must be odd integers greater than or equal to 1".into(),
            ));
        }
        self.gaussian_blur_kernel(width, height, sigma)
    }

    pub(crate) fn gaussian_blur_kernel(
        &self,
        width: u32,
        height: u32,
        sigma: (f64, f64),
    ) -> Result<Clip> {
        node::register(Clip::new_node(
            ClipKind::GaussianBlurred {
                width,
                height,
                sigma,
            },
            self.meta(),
            Source::Parents([self.clone()].into_iter().collect()),
            false,
            self.is_constant(),
        ))
    }
}

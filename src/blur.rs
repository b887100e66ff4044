//! Privacy blurring applied to crops before they leave the process.

use anyhow::{anyhow, Result};
use image::DynamicImage;

pub const DEFAULT_BLUR_SIGMA: f32 = 6.0;

/// Blur backend trait.
///
/// Implementations receive an owned crop and return the image that will be
/// uploaded. A failure aborts onboarding of that observation; the crop is
/// never uploaded unblurred in its place.
pub trait Blurrer: Send {
    fn name(&self) -> &'static str;

    fn blur(&self, image: DynamicImage) -> Result<DynamicImage>;
}

impl<B: Blurrer + ?Sized> Blurrer for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn blur(&self, image: DynamicImage) -> Result<DynamicImage> {
        (**self).blur(image)
    }
}

/// Blurs the whole crop with a Gaussian kernel.
#[derive(Clone, Copy, Debug)]
pub struct GaussianBlur {
    sigma: f32,
}

impl GaussianBlur {
    pub fn new(sigma: f32) -> Result<Self> {
        if !sigma.is_finite() || sigma <= 0.0 {
            return Err(anyhow!("blur sigma must be a positive number (got {})", sigma));
        }
        Ok(Self { sigma })
    }
}

impl Default for GaussianBlur {
    fn default() -> Self {
        Self {
            sigma: DEFAULT_BLUR_SIGMA,
        }
    }
}

impl Blurrer for GaussianBlur {
    fn name(&self) -> &'static str {
        "gaussian"
    }

    fn blur(&self, image: DynamicImage) -> Result<DynamicImage> {
        Ok(image.blur(self.sigma))
    }
}

/// Passes crops through unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoBlur;

impl Blurrer for NoBlur {
    fn name(&self) -> &'static str {
        "none"
    }

    fn blur(&self, image: DynamicImage) -> Result<DynamicImage> {
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage};

    fn checkerboard() -> DynamicImage {
        let img = RgbImage::from_fn(16, 16, |x, y| {
            if (x + y) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn gaussian_blur_smooths_and_keeps_size() {
        let blurred = GaussianBlur::default().blur(checkerboard()).unwrap();
        assert_eq!(blurred.dimensions(), (16, 16));
        let px = blurred.to_rgb8().get_pixel(8, 8).0;
        assert!(px[0] > 0 && px[0] < 255, "pixel {:?}", px);
    }

    #[test]
    fn rejects_invalid_sigma() {
        assert!(GaussianBlur::new(0.0).is_err());
        assert!(GaussianBlur::new(f32::NAN).is_err());
        assert!(GaussianBlur::new(2.5).is_ok());
    }

    #[test]
    fn no_blur_is_identity() {
        let img = checkerboard();
        assert_eq!(NoBlur.blur(img.clone()).unwrap(), img);
    }
}

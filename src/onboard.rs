//! Turning an unmatched observation into a new registry Record.
//!
//! The crop is blurred before it touches disk. The encoded crop lives in a
//! scratch temp file only for the duration of the upload; the file is removed
//! whether the upload succeeds or fails.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use image::{DynamicImage, GenericImageView, ImageFormat};

use crate::blob::{blob_name, BlobStore};
use crate::blur::Blurrer;
use crate::error::{Collaborator, EngineError};
use crate::frame::Frame;
use crate::registry::{RegistryAck, VehicleRegistry};
use crate::vehicle::{BoundingBox, Observation};

/// Crops `bbox` out of `image`, clamped to the image bounds.
///
/// A zero-area or out-of-frame box still yields a 1x1 crop at the nearest
/// valid pixel so the observation can be onboarded.
pub fn crop(image: &DynamicImage, bbox: &BoundingBox) -> DynamicImage {
    let (width, height) = image.dimensions();
    let x = bbox.left.min(width.saturating_sub(1));
    let y = bbox.top.min(height.saturating_sub(1));
    let w = bbox.width.min(width.saturating_sub(x)).max(1);
    let h = bbox.height.min(height.saturating_sub(y)).max(1);
    image.crop_imm(x, y, w, h)
}

pub struct Onboarder {
    blur: Box<dyn Blurrer>,
    blobs: Box<dyn BlobStore>,
    scratch_dir: PathBuf,
}

impl Onboarder {
    pub fn new(blur: Box<dyn Blurrer>, blobs: Box<dyn BlobStore>, scratch_dir: PathBuf) -> Self {
        Self {
            blur,
            blobs,
            scratch_dir,
        }
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Crops, blurs and uploads the observation's image, then requests a
    /// Record for it.
    pub fn onboard(
        &self,
        frame: &Frame,
        mut observation: Observation,
        registry: &mut dyn VehicleRegistry,
    ) -> Result<RegistryAck, EngineError> {
        let image_url = self.store_crop(frame, &observation)?;
        observation.annotate_for_create(image_url);
        let ack = registry
            .create(&observation)
            .map_err(|e| EngineError::unavailable(Collaborator::Registry, e))?;
        Ok(ack)
    }

    /// Stores the blurred crop and returns its durable reference.
    pub fn store_crop(&self, frame: &Frame, observation: &Observation) -> Result<String, EngineError> {
        let region = crop(&frame.image, &observation.attributes.bbox);
        let blurred = self
            .blur
            .blur(region)
            .map_err(|e| EngineError::unavailable(Collaborator::Blur, e))?;

        let mut encoded = Vec::new();
        blurred
            .write_to(&mut Cursor::new(&mut encoded), ImageFormat::Png)
            .map_err(|e| EngineError::unavailable(Collaborator::Scratch, e.into()))?;

        let camera_id = if observation.attributes.camera_id.is_empty() {
            frame.camera_id.as_str()
        } else {
            observation.attributes.camera_id.as_str()
        };
        let now_ms = crate::now_ms().map_err(|e| EngineError::unavailable(Collaborator::Scratch, e))?;
        let name = blob_name(camera_id, now_ms, &encoded);

        let mut scratch = tempfile::Builder::new()
            .prefix("crop-")
            .suffix(".png")
            .tempfile_in(&self.scratch_dir)
            .map_err(|e| EngineError::unavailable(Collaborator::Scratch, e.into()))?;
        scratch
            .write_all(&encoded)
            .and_then(|_| scratch.flush())
            .map_err(|e| EngineError::unavailable(Collaborator::Scratch, e.into()))?;

        // on error the temp file is removed when `scratch` drops
        let url = self
            .blobs
            .upload(scratch.path(), &name)
            .map_err(|e| EngineError::unavailable(Collaborator::BlobStore, e))?;

        if let Err(e) = scratch.close() {
            log::warn!("failed to remove scratch crop: {}", e);
        }
        log::debug!("stored crop {} via {}", name, self.blobs.name());
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn image(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([1, 2, 3])))
    }

    #[test]
    fn crop_takes_the_box_region() {
        let out = crop(&image(100, 80), &BoundingBox::new(10, 20, 30, 40));
        assert_eq!(out.dimensions(), (30, 40));
    }

    #[test]
    fn crop_clamps_to_image_bounds() {
        let out = crop(&image(100, 80), &BoundingBox::new(90, 70, 50, 50));
        assert_eq!(out.dimensions(), (10, 10));

        let outside = crop(&image(100, 80), &BoundingBox::new(500, 500, 5, 5));
        assert_eq!(outside.dimensions(), (1, 1));
    }

    #[test]
    fn zero_area_box_yields_single_pixel() {
        let out = crop(&image(100, 80), &BoundingBox::new(10, 10, 0, 0));
        assert_eq!(out.dimensions(), (1, 1));
    }
}

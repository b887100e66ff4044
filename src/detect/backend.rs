use anyhow::Result;
use image::DynamicImage;

use crate::frame::Frame;
use crate::vehicle::{DamageReport, Observation};

/// Vehicle detector trait.
///
/// Returns one Observation per vehicle found in the frame, with type,
/// manufacturer, colour, their confidences and the bounding box filled in.
/// Confidences are passed through as reported; scoring clamps them.
pub trait VehicleDetector: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Observation>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Damage classifier trait.
///
/// Runs on a single vehicle crop. An empty report means no damage was found.
pub trait DamageClassifier: Send {
    fn name(&self) -> &'static str;

    fn classify(&mut self, crop: &DynamicImage) -> Result<DamageReport>;
}

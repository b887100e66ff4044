use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

use crate::detect::backend::VehicleDetector;
use crate::frame::Frame;
use crate::vehicle::{Observation, VehicleList};

/// Reads detections written next to each frame by an external model.
///
/// For `frames/0001.png` the detections are expected in `frames/0001.json`
/// as `{"vehicles": [...]}` using the registry field names. A frame with no
/// sidecar is an error, not an empty scene.
#[derive(Clone, Debug, Default)]
pub struct SidecarDetector {
    extension: Option<String>,
}

impl SidecarDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a different sidecar extension than `json`.
    pub fn with_extension(extension: impl Into<String>) -> Self {
        Self {
            extension: Some(extension.into()),
        }
    }

    fn sidecar_path(&self, frame: &Frame) -> Result<PathBuf> {
        let source = frame
            .source
            .as_ref()
            .ok_or_else(|| anyhow!("sidecar detection needs a frame read from disk"))?;
        Ok(source.with_extension(self.extension.as_deref().unwrap_or("json")))
    }
}

impl VehicleDetector for SidecarDetector {
    fn name(&self) -> &'static str {
        "sidecar"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Observation>> {
        let path = self.sidecar_path(frame)?;
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("read detections {}", path.display()))?;
        let list: VehicleList<Observation> = serde_json::from_str(&raw)
            .with_context(|| format!("invalid detections {}", path.display()))?;
        Ok(list.vehicles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};

    fn frame_at(path: PathBuf) -> Frame {
        let mut frame = Frame::new("cam-1", DynamicImage::ImageRgb8(RgbImage::new(8, 8)), 0);
        frame.source = Some(path);
        frame
    }

    #[test]
    fn reads_vehicles_from_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("0001.json"),
            r#"{"vehicles": [
                {"type": "car", "typeProb": 0.9, "manufacturer": "Kia", "color": "grey",
                 "left": 1, "top": 2, "width": 3, "height": 4}
            ]}"#,
        )
        .unwrap();

        let mut detector = SidecarDetector::new();
        let found = detector.detect(&frame_at(dir.path().join("0001.png"))).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].attributes.manufacturer, "Kia");
        assert_eq!(found[0].attributes.bbox.height, 4);
    }

    #[test]
    fn missing_sidecar_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut detector = SidecarDetector::new();
        assert!(detector.detect(&frame_at(dir.path().join("0002.png"))).is_err());

        let in_memory = Frame::new("cam-1", DynamicImage::ImageRgb8(RgbImage::new(1, 1)), 0);
        assert!(detector.detect(&in_memory).is_err());
    }
}

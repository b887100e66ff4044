use crate::detect::backend::{DamageClassifier, VehicleDetector};
use crate::error::{Collaborator, EngineError};
use crate::frame::Frame;
use crate::onboard::crop;
use crate::vehicle::Observation;

/// Runs detection and damage classification for a frame.
///
/// Every Observation is stamped with the frame's camera id. The damage
/// classifier runs on each vehicle crop unless the detector already attached
/// damage classes.
pub struct FrameProcessor {
    detector: Box<dyn VehicleDetector>,
    classifier: Option<Box<dyn DamageClassifier>>,
}

impl FrameProcessor {
    pub fn new(detector: Box<dyn VehicleDetector>) -> Self {
        Self {
            detector,
            classifier: None,
        }
    }

    pub fn with_classifier(mut self, classifier: Box<dyn DamageClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn warm_up(&mut self) -> Result<(), EngineError> {
        self.detector
            .warm_up()
            .map_err(|e| EngineError::unavailable(Collaborator::Detector, e))
    }

    pub fn process(&mut self, frame: &Frame) -> Result<Vec<Observation>, EngineError> {
        let mut observations = self
            .detector
            .detect(frame)
            .map_err(|e| EngineError::unavailable(Collaborator::Detector, e))?;

        for observation in observations.iter_mut() {
            observation.attributes.camera_id = frame.camera_id.clone();

            let Some(classifier) = self.classifier.as_mut() else {
                continue;
            };
            if observation.attributes.details.has_damage() {
                continue;
            }
            let region = crop(&frame.image, &observation.attributes.bbox);
            observation.attributes.details = classifier
                .classify(&region)
                .map_err(|e| EngineError::unavailable(Collaborator::DamageClassifier, e))?;
        }

        log::debug!(
            "{} found {} vehicles on camera {}",
            self.detector.name(),
            observations.len(),
            frame.camera_id
        );
        Ok(observations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::StaticDetector;
    use crate::vehicle::{BoundingBox, DamageReport, VehicleAttributes};
    use anyhow::{anyhow, Result};
    use image::{DynamicImage, GenericImageView, RgbImage};

    struct Scratches;

    impl DamageClassifier for Scratches {
        fn name(&self) -> &'static str {
            "scratches"
        }

        fn classify(&mut self, crop: &DynamicImage) -> Result<DamageReport> {
            assert_eq!(crop.dimensions(), (4, 4));
            Ok(DamageReport {
                classes: vec!["scratch".into()],
                confidences: vec![0.7],
            })
        }
    }

    struct Broken;

    impl DamageClassifier for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn classify(&mut self, _crop: &DynamicImage) -> Result<DamageReport> {
            Err(anyhow!("model not loaded"))
        }
    }

    fn observation(details: DamageReport) -> Observation {
        Observation::new(VehicleAttributes {
            kind: "car".into(),
            manufacturer: "Opel".into(),
            color: "green".into(),
            camera_id: "other".into(),
            bbox: BoundingBox::new(2, 2, 4, 4),
            details,
            ..VehicleAttributes::default()
        })
    }

    fn frame() -> Frame {
        Frame::new("cam-7", DynamicImage::ImageRgb8(RgbImage::new(16, 16)), 10)
    }

    #[test]
    fn stamps_camera_and_classifies_missing_damage() {
        let preset = DamageReport {
            classes: vec!["dent".into()],
            confidences: vec![0.9],
        };
        let detector = StaticDetector::new(vec![
            observation(DamageReport::default()),
            observation(preset),
        ]);
        let mut processor =
            FrameProcessor::new(Box::new(detector)).with_classifier(Box::new(Scratches));

        let found = processor.process(&frame()).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|o| o.attributes.camera_id == "cam-7"));
        assert_eq!(found[0].attributes.details.classes, vec!["scratch".to_string()]);
        assert_eq!(found[1].attributes.details.classes, vec!["dent".to_string()]);
    }

    #[test]
    fn classifier_failure_is_reported() {
        let detector = StaticDetector::new(vec![observation(DamageReport::default())]);
        let mut processor =
            FrameProcessor::new(Box::new(detector)).with_classifier(Box::new(Broken));
        let err = processor.process(&frame()).unwrap_err();
        assert_eq!(err.collaborator(), Some(Collaborator::DamageClassifier));
    }
}

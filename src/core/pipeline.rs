use crate::common::{Config, Result};
use crate::core::detector::RegionDetector;
use crate::core::extractor::{self, Signature};
use crate::core::localizer::Localizer;
use crate::core::normalizer;
use image::DynamicImage;

/// Full frame-to-signature pipeline: region detection, pupil/iris
/// localization, rubber-sheet normalization, signature extraction.
///
/// Stateless over its inputs; independent frames may be processed
/// concurrently from separate requests.
pub struct IrisPipeline {
    detector: RegionDetector,
    localizer: Localizer,
}

impl IrisPipeline {
    pub fn new(config: &Config) -> Self {
        Self {
            detector: RegionDetector::new(&config.detector),
            localizer: Localizer::new(&config.localizer),
        }
    }

    /// Swap in an alternative region detector (tests, other backends).
    pub fn with_detector(detector: RegionDetector, config: &Config) -> Self {
        Self {
            detector,
            localizer: Localizer::new(&config.localizer),
        }
    }

    /// Derive a signature from one frame.
    ///
    /// Fails with `NoFaceDetected` / `NoEyeDetected` before any geometry
    /// work happens; localization onward always succeeds thanks to the
    /// heuristic fallbacks.
    pub fn extract(&self, frame: &DynamicImage) -> Result<Signature> {
        let gray = frame.to_luma8();
        let located = self.detector.locate_eye(&gray)?;

        let eye = image::imageops::crop_imm(
            &gray,
            located.eye.x,
            located.eye.y,
            located.eye.width,
            located.eye.height,
        )
        .to_image();

        let geometry = self.localizer.locate(&eye);
        tracing::debug!(
            pupil_r = geometry.pupil.radius,
            iris_r = geometry.iris.radius,
            "localized iris boundaries"
        );

        let map = normalizer::normalize_iris(&eye, &geometry);
        Ok(extractor::extract_signature(&map))
    }
}

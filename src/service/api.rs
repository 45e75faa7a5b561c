use crate::common::{Config, IrisAuthError, Result};
use crate::core::matcher;
use crate::core::pipeline::IrisPipeline;
use crate::storage::EnrollmentStore;
use image::DynamicImage;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    NoFaceFound,
    NoEyeFound,
    PersistFailed,
    IdentityUnknown,
    InvalidImage,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrollReport {
    pub success: bool,
    pub identity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthReport {
    pub authenticated: bool,
    pub identity: String,
    /// Raw similarity score, reported even on a rejected attempt so
    /// near-misses are observable. Absent only when no signature could be
    /// produced or the identity is unknown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
    pub threshold: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoveReport {
    pub success: bool,
    pub identity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub enrolled_count: usize,
    pub threshold: f32,
    pub snapshot_exists: bool,
    pub timestamp: String,
}

/// The operations exposed to the transport layer: enroll, authenticate,
/// remove, status. Pipeline stages are stateless, so a shared reference can
/// serve concurrent requests; the store handles its own locking.
pub struct IrisService {
    pipeline: IrisPipeline,
    store: EnrollmentStore,
    threshold: f32,
}

impl IrisService {
    pub fn new(config: &Config) -> Result<Self> {
        let store = EnrollmentStore::open(&config.snapshot_path()?)?;
        Ok(Self {
            pipeline: IrisPipeline::new(config),
            store,
            threshold: config.matcher.similarity_threshold,
        })
    }

    /// Assemble from pre-built parts (tests, alternative detectors).
    pub fn with_parts(pipeline: IrisPipeline, store: EnrollmentStore, threshold: f32) -> Self {
        Self {
            pipeline,
            store,
            threshold,
        }
    }

    /// Decode a transmitted image payload into a frame. Failures surface
    /// before any pipeline work.
    pub fn decode_frame(bytes: &[u8]) -> Result<DynamicImage> {
        image::load_from_memory(bytes).map_err(|e| IrisAuthError::Decode(e.to_string()))
    }

    /// Run the full pipeline and store the signature under `identity`.
    pub fn enroll(&self, identity: &str, frame: &DynamicImage) -> EnrollReport {
        let signature = match self.pipeline.extract(frame) {
            Ok(signature) => signature,
            Err(e) => {
                let reason = match e {
                    IrisAuthError::NoFaceDetected => FailureReason::NoFaceFound,
                    _ => FailureReason::NoEyeFound,
                };
                tracing::info!(identity, ?reason, "enrollment rejected");
                return EnrollReport {
                    success: false,
                    identity: identity.to_string(),
                    reason: Some(reason),
                };
            }
        };

        if let Err(e) = self.store.put(identity, signature) {
            // The in-memory record is already updated; only the snapshot
            // rewrite failed.
            tracing::warn!(identity, error = %e, "enrollment stored in memory, persist failed");
            return EnrollReport {
                success: false,
                identity: identity.to_string(),
                reason: Some(FailureReason::PersistFailed),
            };
        }

        tracing::info!(identity, "enrolled");
        EnrollReport {
            success: true,
            identity: identity.to_string(),
            reason: None,
        }
    }

    /// Compare a fresh capture against the enrolled signature.
    ///
    /// The enrollment check runs before any pixel work, so an unknown
    /// identity reports `identity-unknown` regardless of frame content.
    pub fn authenticate(&self, identity: &str, frame: &DynamicImage) -> AuthReport {
        let stored = match self.store.get(identity) {
            Some(signature) => signature,
            None => {
                return AuthReport {
                    authenticated: false,
                    identity: identity.to_string(),
                    similarity: None,
                    threshold: self.threshold,
                    reason: Some(FailureReason::IdentityUnknown),
                };
            }
        };

        let probe = match self.pipeline.extract(frame) {
            Ok(signature) => signature,
            Err(e) => {
                tracing::info!(identity, error = %e, "authentication capture rejected");
                return AuthReport {
                    authenticated: false,
                    identity: identity.to_string(),
                    similarity: None,
                    threshold: self.threshold,
                    reason: Some(FailureReason::NoEyeFound),
                };
            }
        };

        let decision = matcher::decide(&probe, &stored, self.threshold);
        tracing::info!(
            identity,
            similarity = decision.similarity,
            authenticated = decision.authenticated,
            "authentication attempt"
        );

        AuthReport {
            authenticated: decision.authenticated,
            identity: identity.to_string(),
            similarity: Some(decision.similarity),
            threshold: self.threshold,
            reason: None,
        }
    }

    pub fn remove(&self, identity: &str) -> RemoveReport {
        match self.store.remove(identity) {
            Ok(true) => {
                tracing::info!(identity, "removed enrollment");
                RemoveReport {
                    success: true,
                    identity: identity.to_string(),
                    reason: None,
                }
            }
            Ok(false) => RemoveReport {
                success: false,
                identity: identity.to_string(),
                reason: Some(FailureReason::IdentityUnknown),
            },
            Err(e) => {
                tracing::warn!(identity, error = %e, "removal persisted in memory only");
                RemoveReport {
                    success: false,
                    identity: identity.to_string(),
                    reason: Some(FailureReason::PersistFailed),
                }
            }
        }
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            enrolled_count: self.store.len(),
            threshold: self.threshold,
            snapshot_exists: self.store.snapshot_path().exists(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn identities(&self) -> Vec<String> {
        self.store.identities()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ScanConfig;
    use crate::core::detector::{Region, RegionDetector, RegionScanner};
    use image::{GrayImage, Luma};
    use imageproc::drawing::draw_filled_circle_mut;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    struct FixedScanner(Vec<Region>);

    impl RegionScanner for FixedScanner {
        fn scan(&self, _gray: &GrayImage, _params: &ScanConfig) -> Vec<Region> {
            self.0.clone()
        }
    }

    fn temp_snapshot() -> std::path::PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!(
            "irisauth-service-{}-{}.bin",
            std::process::id(),
            n
        ))
    }

    fn service(face: Vec<Region>, eye: Vec<Region>) -> IrisService {
        let config = Config::default();
        let detector = RegionDetector::with_scanners(
            Box::new(FixedScanner(face)),
            Box::new(FixedScanner(eye)),
            &config.detector,
        );
        let pipeline = IrisPipeline::with_detector(detector, &config);
        let store = EnrollmentStore::open(&temp_snapshot()).unwrap();
        IrisService::with_parts(pipeline, store, config.matcher.similarity_threshold)
    }

    fn eye_service() -> IrisService {
        service(
            vec![Region::new(60, 20, 200, 200)],
            vec![Region::new(55, 55, 90, 90)],
        )
    }

    fn synthetic_frame() -> DynamicImage {
        let mut img = GrayImage::from_pixel(320, 240, Luma([200u8]));
        draw_filled_circle_mut(&mut img, (160, 120), 28, Luma([110u8]));
        draw_filled_circle_mut(&mut img, (160, 120), 11, Luma([25u8]));
        DynamicImage::ImageLuma8(img)
    }

    #[test]
    fn enroll_then_authenticate_same_frame_succeeds() {
        let service = eye_service();
        let frame = synthetic_frame();

        let enrolled = service.enroll("alice", &frame);
        assert!(enrolled.success, "reason: {:?}", enrolled.reason);

        let auth = service.authenticate("alice", &frame);
        assert!(auth.authenticated, "similarity: {:?}", auth.similarity);
        let similarity = auth.similarity.unwrap();
        assert!((similarity - 1.0).abs() < 1e-4, "similarity = {}", similarity);

        let _ = std::fs::remove_file(service.store.snapshot_path());
    }

    #[test]
    fn unknown_identity_fails_regardless_of_frame() {
        let service = eye_service();

        let auth = service.authenticate("nobody", &synthetic_frame());
        assert!(!auth.authenticated);
        assert_eq!(auth.reason, Some(FailureReason::IdentityUnknown));
        assert!(auth.similarity.is_none());
    }

    #[test]
    fn enroll_without_face_reports_no_face() {
        let service = service(vec![], vec![Region::new(0, 0, 40, 40)]);
        let report = service.enroll("bob", &synthetic_frame());
        assert!(!report.success);
        assert_eq!(report.reason, Some(FailureReason::NoFaceFound));
        assert!(service.store.is_empty());
    }

    #[test]
    fn enroll_without_eye_reports_no_eye() {
        let service = service(vec![Region::new(0, 0, 200, 200)], vec![]);
        let report = service.enroll("bob", &synthetic_frame());
        assert!(!report.success);
        assert_eq!(report.reason, Some(FailureReason::NoEyeFound));
    }

    #[test]
    fn remove_and_status_reflect_store_contents() {
        let service = eye_service();
        let frame = synthetic_frame();

        assert!(service.enroll("carol", &frame).success);
        let status = service.status();
        assert_eq!(status.enrolled_count, 1);
        assert_eq!(status.threshold, 0.85);
        assert!(status.snapshot_exists);

        assert!(service.remove("carol").success);
        let removed_again = service.remove("carol");
        assert!(!removed_again.success);
        assert_eq!(removed_again.reason, Some(FailureReason::IdentityUnknown));
        assert_eq!(service.status().enrolled_count, 0);

        let _ = std::fs::remove_file(service.store.snapshot_path());
    }

    #[test]
    fn decode_rejects_malformed_payload() {
        let err = IrisService::decode_frame(b"not an image").unwrap_err();
        assert!(matches!(err, IrisAuthError::Decode(_)));
    }
}

// Core modules
pub mod common;
pub mod core;
pub mod service;
pub mod storage;

// Re-export commonly used types
pub use common::{Config, IrisAuthError, Result};
pub use core::{
    cosine_similarity, decide, Circle, EyeLocation, IrisGeometry, IrisPipeline, MatchDecision,
    Region, RegionDetector, RegionScanner, Signature, SIGNATURE_LEN,
};
pub use service::{AuthReport, EnrollReport, FailureReason, IrisService, RemoveReport, StatusReport};
pub use storage::EnrollmentStore;

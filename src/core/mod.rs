pub mod detector;
pub mod extractor;
pub mod localizer;
pub mod matcher;
pub mod normalizer;
pub mod pipeline;

pub use detector::{EyeLocation, Region, RegionDetector, RegionScanner};
pub use extractor::{extract_signature, Signature, SIGNATURE_LEN};
pub use localizer::{Circle, IrisGeometry, Localizer};
pub use matcher::{cosine_similarity, decide, MatchDecision};
pub use normalizer::{normalize_iris, NORM_COLS, NORM_ROWS};
pub use pipeline::IrisPipeline;

use crate::common::error::{IrisAuthError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub localizer: LocalizerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MatcherConfig {
    #[serde(default = "default_threshold")]
    pub similarity_threshold: f32,
}

fn default_threshold() -> f32 {
    0.85
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_threshold(),
        }
    }
}

/// Tuning for one scan stage (face or eye) of the region detector.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ScanConfig {
    pub scale_step: f32,
    pub min_neighbors: u32,
    pub min_size: u32,
    pub score_threshold: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DetectorConfig {
    #[serde(default = "default_face_scan")]
    pub face: ScanConfig,
    #[serde(default = "default_eye_scan")]
    pub eye: ScanConfig,
}

fn default_face_scan() -> ScanConfig {
    ScanConfig {
        scale_step: 1.1,
        min_neighbors: 5,
        min_size: 100,
        score_threshold: 0.08,
    }
}

fn default_eye_scan() -> ScanConfig {
    ScanConfig {
        scale_step: 1.1,
        min_neighbors: 3,
        min_size: 30,
        score_threshold: 0.05,
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            face: default_face_scan(),
            eye: default_eye_scan(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LocalizerConfig {
    #[serde(default = "default_pupil_radius_min")]
    pub pupil_radius_min: u32,
    #[serde(default = "default_pupil_radius_max")]
    pub pupil_radius_max: u32,
    #[serde(default = "default_iris_radius_max")]
    pub iris_radius_max: u32,
    /// Margin added to the pupil radius when masking it out of the iris search.
    #[serde(default = "default_pupil_mask_margin")]
    pub pupil_mask_margin: u32,
    /// Iris radius estimate when boundary detection fails: pupil radius + offset.
    #[serde(default = "default_iris_radius_offset")]
    pub iris_radius_offset: u32,
    /// Heuristic pupil radius when detection fails: min(w, h) / divisor.
    #[serde(default = "default_fallback_radius_divisor")]
    pub fallback_radius_divisor: u32,
}

fn default_pupil_radius_min() -> u32 {
    5
}
fn default_pupil_radius_max() -> u32 {
    20
}
fn default_iris_radius_max() -> u32 {
    40
}
fn default_pupil_mask_margin() -> u32 {
    5
}
fn default_iris_radius_offset() -> u32 {
    15
}
fn default_fallback_radius_divisor() -> u32 {
    6
}

impl Default for LocalizerConfig {
    fn default() -> Self {
        Self {
            pupil_radius_min: default_pupil_radius_min(),
            pupil_radius_max: default_pupil_radius_max(),
            iris_radius_max: default_iris_radius_max(),
            pupil_mask_margin: default_pupil_mask_margin(),
            iris_radius_offset: default_iris_radius_offset(),
            fallback_radius_divisor: default_fallback_radius_divisor(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct StorageConfig {
    /// Snapshot file path; defaults to the per-user data directory when unset.
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
}

impl Config {
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(IrisAuthError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| IrisAuthError::Config(format!("Config parse error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, otherwise fall back to built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load_from_path(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.matcher.similarity_threshold) {
            return Err(IrisAuthError::Config(format!(
                "Similarity threshold must be between 0.0 and 1.0, got {}",
                self.matcher.similarity_threshold
            )));
        }

        for (name, scan) in [("face", &self.detector.face), ("eye", &self.detector.eye)] {
            if scan.scale_step <= 1.0 {
                return Err(IrisAuthError::Config(format!(
                    "Detector {} scale_step must be > 1.0, got {}",
                    name, scan.scale_step
                )));
            }
            if scan.min_size == 0 {
                return Err(IrisAuthError::Config(format!(
                    "Detector {} min_size must be nonzero",
                    name
                )));
            }
        }

        if self.localizer.pupil_radius_min == 0
            || self.localizer.pupil_radius_min >= self.localizer.pupil_radius_max
        {
            return Err(IrisAuthError::Config(format!(
                "Pupil radius range must satisfy 0 < min < max, got {}..{}",
                self.localizer.pupil_radius_min, self.localizer.pupil_radius_max
            )));
        }
        if self.localizer.pupil_radius_max >= self.localizer.iris_radius_max {
            return Err(IrisAuthError::Config(format!(
                "Max pupil radius {} must be below max iris radius {}",
                self.localizer.pupil_radius_max, self.localizer.iris_radius_max
            )));
        }
        if self.localizer.fallback_radius_divisor == 0 {
            return Err(IrisAuthError::Config(
                "Fallback radius divisor must be nonzero".into(),
            ));
        }

        Ok(())
    }

    /// Resolved snapshot path: configured value or the per-user data directory.
    pub fn snapshot_path(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.storage.snapshot_path {
            return Ok(path.clone());
        }

        let dirs = ProjectDirs::from("com", "irisauth", "IrisAuth")
            .ok_or_else(|| IrisAuthError::Storage("Failed to get project dirs".into()))?;
        Ok(dirs.data_dir().join("enrollments.bin"))
    }
}

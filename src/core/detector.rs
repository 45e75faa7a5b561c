use crate::common::{DetectorConfig, IrisAuthError, Result, ScanConfig};
use image::GrayImage;
use ndarray::Array2;

/// Axis-aligned rectangle in the coordinate space of the scanned buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Face and eye bounding boxes, both in frame-global coordinates.
#[derive(Debug, Clone, Copy)]
pub struct EyeLocation {
    pub face: Region,
    pub eye: Region,
}

/// Pluggable region detection backend.
///
/// Any scanner that returns axis-aligned candidate regions for a learned
/// appearance pattern, honoring the scale-step / neighbor-agreement /
/// minimum-size knobs in [`ScanConfig`], can be substituted here.
pub trait RegionScanner: Send + Sync {
    fn scan(&self, gray: &GrayImage, params: &ScanConfig) -> Vec<Region>;
}

/// Appearance pattern scored by the built-in scanner.
#[derive(Debug, Clone, Copy)]
pub enum ScanPattern {
    /// Dark interior against a brighter surround (eye: pupil core).
    DarkCore,
    /// High interior intensity variance (face: feature-rich window).
    Textured,
}

/// Built-in multi-scale sliding-window scanner.
///
/// Windows are scored against the configured pattern over integral-image
/// sums, raw hits above the score threshold are grouped by overlap, and a
/// region is emitted only when at least `min_neighbors` raw hits agree.
pub struct AppearanceScanner {
    pattern: ScanPattern,
}

impl AppearanceScanner {
    pub fn new(pattern: ScanPattern) -> Self {
        Self { pattern }
    }

    fn score_window(&self, integral: &IntegralImage, region: &Region) -> f32 {
        match self.pattern {
            ScanPattern::DarkCore => {
                // Inner quarter-area core vs the full window.
                let core_w = (region.width / 2).max(1);
                let core_h = (region.height / 2).max(1);
                let core = Region::new(
                    region.x + (region.width - core_w) / 2,
                    region.y + (region.height - core_h) / 2,
                    core_w,
                    core_h,
                );
                let window_mean = integral.mean(region);
                let core_mean = integral.mean(&core);
                ((window_mean - core_mean) / 255.0) as f32
            }
            ScanPattern::Textured => {
                let std_dev = integral.std_dev(region);
                ((std_dev / 64.0) as f32).min(1.0)
            }
        }
    }
}

impl RegionScanner for AppearanceScanner {
    fn scan(&self, gray: &GrayImage, params: &ScanConfig) -> Vec<Region> {
        let (width, height) = gray.dimensions();
        let max_window = width.min(height);
        if max_window < params.min_size {
            return Vec::new();
        }

        let integral = IntegralImage::new(gray);
        let mut hits = Vec::new();

        // Bounded scale sweep: the window grows geometrically until it no
        // longer fits, so the scan always terminates.
        let mut window = params.min_size;
        while window <= max_window {
            let stride = (window / 8).max(2);
            let mut y = 0;
            while y + window <= height {
                let mut x = 0;
                while x + window <= width {
                    let region = Region::new(x, y, window, window);
                    let score = self.score_window(&integral, &region);
                    if score >= params.score_threshold {
                        hits.push((region, score));
                    }
                    x += stride;
                }
                y += stride;
            }

            let next = (window as f32 * params.scale_step).ceil() as u32;
            if next == window {
                break;
            }
            window = next;
        }

        group_hits(hits, params.min_neighbors)
    }
}

/// Cluster overlapping raw hits; emit the averaged box of each cluster with
/// at least `min_neighbors` members.
fn group_hits(mut hits: Vec<(Region, f32)>, min_neighbors: u32) -> Vec<Region> {
    const GROUP_IOU: f32 = 0.3;

    hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut grouped = Vec::new();
    let mut remaining: Vec<Region> = hits.into_iter().map(|(r, _)| r).collect();

    while let Some(seed) = remaining.first().copied() {
        let (cluster, rest): (Vec<Region>, Vec<Region>) = remaining
            .into_iter()
            .partition(|r| region_iou(&seed, r) >= GROUP_IOU);
        remaining = rest;

        if cluster.len() as u32 >= min_neighbors.max(1) {
            grouped.push(average_region(&cluster));
        }
    }

    grouped
}

fn average_region(cluster: &[Region]) -> Region {
    let n = cluster.len() as u64;
    Region::new(
        (cluster.iter().map(|r| r.x as u64).sum::<u64>() / n) as u32,
        (cluster.iter().map(|r| r.y as u64).sum::<u64>() / n) as u32,
        (cluster.iter().map(|r| r.width as u64).sum::<u64>() / n) as u32,
        (cluster.iter().map(|r| r.height as u64).sum::<u64>() / n) as u32,
    )
}

fn region_iou(a: &Region, b: &Region) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let intersection = (x2 - x1) as f32 * (y2 - y1) as f32;
    let union = a.area() as f32 + b.area() as f32 - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Integral image over a grayscale buffer for O(1) window sums.
struct IntegralImage {
    sum: Array2<f64>,
    sum_sq: Array2<f64>,
}

impl IntegralImage {
    fn new(gray: &GrayImage) -> Self {
        let (width, height) = gray.dimensions();
        let mut sum = Array2::<f64>::zeros((height as usize + 1, width as usize + 1));
        let mut sum_sq = Array2::<f64>::zeros((height as usize + 1, width as usize + 1));

        for y in 0..height as usize {
            for x in 0..width as usize {
                let v = gray.get_pixel(x as u32, y as u32)[0] as f64;
                sum[[y + 1, x + 1]] = v + sum[[y, x + 1]] + sum[[y + 1, x]] - sum[[y, x]];
                sum_sq[[y + 1, x + 1]] =
                    v * v + sum_sq[[y, x + 1]] + sum_sq[[y + 1, x]] - sum_sq[[y, x]];
            }
        }

        Self { sum, sum_sq }
    }

    fn rect_sum(table: &Array2<f64>, r: &Region) -> f64 {
        let (x1, y1) = (r.x as usize, r.y as usize);
        let (x2, y2) = ((r.x + r.width) as usize, (r.y + r.height) as usize);
        table[[y2, x2]] - table[[y1, x2]] - table[[y2, x1]] + table[[y1, x1]]
    }

    fn mean(&self, r: &Region) -> f64 {
        Self::rect_sum(&self.sum, r) / r.area() as f64
    }

    fn std_dev(&self, r: &Region) -> f64 {
        let n = r.area() as f64;
        let mean = Self::rect_sum(&self.sum, r) / n;
        let var = Self::rect_sum(&self.sum_sq, r) / n - mean * mean;
        var.max(0.0).sqrt()
    }
}

/// Two-stage face-then-eye detector.
///
/// Scanners are constructed once and never mutated afterwards; detection is
/// a pure function of the frame and the configuration.
pub struct RegionDetector {
    face_scanner: Box<dyn RegionScanner>,
    eye_scanner: Box<dyn RegionScanner>,
    config: DetectorConfig,
}

impl RegionDetector {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            face_scanner: Box::new(AppearanceScanner::new(ScanPattern::Textured)),
            eye_scanner: Box::new(AppearanceScanner::new(ScanPattern::DarkCore)),
            config: config.clone(),
        }
    }

    /// Substitute scanner backends (tests, alternative detectors).
    pub fn with_scanners(
        face_scanner: Box<dyn RegionScanner>,
        eye_scanner: Box<dyn RegionScanner>,
        config: &DetectorConfig,
    ) -> Self {
        Self {
            face_scanner,
            eye_scanner,
            config: config.clone(),
        }
    }

    /// Locate the largest face, then the largest eye inside it.
    ///
    /// The returned eye region is translated to frame-global coordinates.
    pub fn locate_eye(&self, gray: &GrayImage) -> Result<EyeLocation> {
        let faces = self.face_scanner.scan(gray, &self.config.face);
        let face = largest_region(&faces).ok_or(IrisAuthError::NoFaceDetected)?;

        let face_roi =
            image::imageops::crop_imm(gray, face.x, face.y, face.width, face.height).to_image();

        let eyes = self.eye_scanner.scan(&face_roi, &self.config.eye);
        let eye_local = largest_region(&eyes).ok_or(IrisAuthError::NoEyeDetected)?;

        let eye = Region::new(
            face.x + eye_local.x,
            face.y + eye_local.y,
            eye_local.width,
            eye_local.height,
        );

        tracing::debug!(
            face_w = face.width,
            face_h = face.height,
            eye_w = eye.width,
            eye_h = eye.height,
            "located eye region"
        );

        Ok(EyeLocation { face, eye })
    }
}

fn largest_region(regions: &[Region]) -> Option<Region> {
    regions.iter().copied().max_by_key(Region::area)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::DetectorConfig;
    use image::Luma;

    struct FixedScanner(Vec<Region>);

    impl RegionScanner for FixedScanner {
        fn scan(&self, _gray: &GrayImage, _params: &ScanConfig) -> Vec<Region> {
            self.0.clone()
        }
    }

    fn frame(width: u32, height: u32, fill: u8) -> GrayImage {
        GrayImage::from_pixel(width, height, Luma([fill]))
    }

    #[test]
    fn picks_largest_face_and_translates_eye() {
        let detector = RegionDetector::with_scanners(
            Box::new(FixedScanner(vec![
                Region::new(0, 0, 40, 40),
                Region::new(100, 80, 120, 120),
            ])),
            Box::new(FixedScanner(vec![
                Region::new(10, 20, 30, 30),
                Region::new(60, 20, 20, 20),
            ])),
            &DetectorConfig::default(),
        );

        let located = detector.locate_eye(&frame(320, 240, 128)).unwrap();
        assert_eq!(located.face, Region::new(100, 80, 120, 120));
        // Largest eye, shifted into frame coordinates
        assert_eq!(located.eye, Region::new(110, 100, 30, 30));
    }

    #[test]
    fn no_face_candidates_is_no_face() {
        let detector = RegionDetector::with_scanners(
            Box::new(FixedScanner(vec![])),
            Box::new(FixedScanner(vec![Region::new(0, 0, 10, 10)])),
            &DetectorConfig::default(),
        );
        let err = detector.locate_eye(&frame(64, 64, 128)).unwrap_err();
        assert!(matches!(err, IrisAuthError::NoFaceDetected));
    }

    #[test]
    fn no_eye_candidates_is_no_eye() {
        let detector = RegionDetector::with_scanners(
            Box::new(FixedScanner(vec![Region::new(0, 0, 64, 64)])),
            Box::new(FixedScanner(vec![])),
            &DetectorConfig::default(),
        );
        let err = detector.locate_eye(&frame(64, 64, 128)).unwrap_err();
        assert!(matches!(err, IrisAuthError::NoEyeDetected));
    }

    #[test]
    fn dark_core_scanner_finds_dark_disk() {
        let mut img = frame(120, 120, 220);
        imageproc::drawing::draw_filled_circle_mut(&mut img, (60, 60), 14, Luma([20u8]));

        let scanner = AppearanceScanner::new(ScanPattern::DarkCore);
        let params = ScanConfig {
            scale_step: 1.2,
            min_neighbors: 2,
            min_size: 30,
            score_threshold: 0.05,
        };
        let regions = scanner.scan(&img, &params);
        assert!(!regions.is_empty());

        // The strongest cluster should sit over the disk
        let r = regions.iter().max_by_key(|r| r.area()).unwrap();
        let cx = r.x + r.width / 2;
        let cy = r.y + r.height / 2;
        assert!((cx as i32 - 60).abs() < 30, "cx = {}", cx);
        assert!((cy as i32 - 60).abs() < 30, "cy = {}", cy);
    }

    #[test]
    fn iou_of_disjoint_regions_is_zero() {
        let a = Region::new(0, 0, 10, 10);
        let b = Region::new(20, 20, 10, 10);
        assert_eq!(region_iou(&a, &b), 0.0);
        assert_eq!(region_iou(&a, &a), 1.0);
    }
}

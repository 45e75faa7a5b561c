use crate::common::LocalizerConfig;
use image::GrayImage;
use imageproc::filter::gaussian_blur_f32;

/// Angular samples taken per candidate ring.
const RING_SAMPLES: usize = 64;

/// Minimum outward intensity step (0-255 scale) for a ring to count as a
/// real boundary; weaker maxima fall through to the heuristic estimates.
const MIN_BOUNDARY_STEP: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub cx: f32,
    pub cy: f32,
    pub radius: f32,
}

/// Pupil and iris boundaries within one eye region.
///
/// Invariant: `iris.radius > pupil.radius`, guaranteed by the search bounds
/// and by construction of the fallback estimates.
#[derive(Debug, Clone, Copy)]
pub struct IrisGeometry {
    pub pupil: Circle,
    pub iris: Circle,
}

pub struct Localizer {
    config: LocalizerConfig,
}

impl Localizer {
    pub fn new(config: &LocalizerConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Resolve pupil and iris circles for an eye-region buffer.
    ///
    /// Never fails: when boundary detection comes up empty the heuristic
    /// estimates stand in, so the pipeline can still produce a signature.
    pub fn locate(&self, eye: &GrayImage) -> IrisGeometry {
        let blurred = gaussian_blur_f32(eye, 2.0);

        let pupil = match self.find_pupil(&blurred) {
            Some(circle) => circle,
            None => {
                let fallback = self.fallback_pupil(eye);
                tracing::debug!(
                    radius = fallback.radius,
                    "pupil boundary not found, using centroid fallback"
                );
                fallback
            }
        };

        let iris_radius = match self.find_iris_radius(&blurred, &pupil) {
            Some(radius) => radius,
            None => self.fallback_iris_radius(&pupil),
        };

        IrisGeometry {
            pupil,
            iris: Circle {
                cx: pupil.cx,
                cy: pupil.cy,
                radius: iris_radius,
            },
        }
    }

    fn find_pupil(&self, blurred: &GrayImage) -> Option<Circle> {
        let (width, height) = blurred.dimensions();
        let r_min = self.config.pupil_radius_min;
        let r_max = self.config.pupil_radius_max;
        if width <= 2 * r_min || height <= 2 * r_min {
            return None;
        }

        // Coarse candidate-center grid over the region interior.
        let step = (width.min(height) / 24).max(2);
        let mut best: Option<(Circle, f64)> = None;

        let mut cy = r_min;
        while cy < height - r_min {
            let mut cx = r_min;
            while cx < width - r_min {
                if let Some((radius, score)) =
                    strongest_boundary(blurred, cx as f32, cy as f32, r_min, r_max, None)
                {
                    if best.map_or(true, |(_, s)| score > s) {
                        best = Some((
                            Circle {
                                cx: cx as f32,
                                cy: cy as f32,
                                radius,
                            },
                            score,
                        ));
                    }
                }
                cx += step;
            }
            cy += step;
        }

        best.filter(|&(_, score)| score >= MIN_BOUNDARY_STEP)
            .map(|(circle, _)| circle)
    }

    fn find_iris_radius(&self, blurred: &GrayImage, pupil: &Circle) -> Option<f32> {
        let r_min = pupil.radius.ceil() as u32 + self.config.pupil_mask_margin + 1;
        let r_max = self.config.iris_radius_max;
        if r_min >= r_max {
            return None;
        }

        let mask = Some((*pupil, self.config.pupil_mask_margin as f32));
        let mut best: Option<(f32, f64)> = None;

        // The iris is close to concentric with the pupil; only a small
        // neighborhood of centers needs to be examined.
        for dy in -3i32..=3 {
            for dx in -3i32..=3 {
                let cx = pupil.cx + dx as f32;
                let cy = pupil.cy + dy as f32;
                if let Some((radius, score)) =
                    strongest_boundary(blurred, cx, cy, r_min, r_max, mask)
                {
                    if best.map_or(true, |(_, s)| score > s) {
                        best = Some((radius, score));
                    }
                }
            }
        }

        best.filter(|&(_, score)| score >= MIN_BOUNDARY_STEP)
            .map(|(radius, _)| radius)
    }

    /// Heuristic pupil: eye-region centroid, radius one-sixth of the
    /// smaller dimension (clamped into the configured band).
    fn fallback_pupil(&self, eye: &GrayImage) -> Circle {
        let (width, height) = eye.dimensions();
        let radius = (width.min(height) / self.config.fallback_radius_divisor).max(1) as f32;
        Circle {
            cx: (width / 2) as f32,
            cy: (height / 2) as f32,
            radius,
        }
    }

    /// Heuristic iris radius: pupil radius plus a fixed offset, clamped to
    /// the plausible maximum but always strictly beyond the pupil.
    fn fallback_iris_radius(&self, pupil: &Circle) -> f32 {
        let estimated = pupil.radius + self.config.iris_radius_offset as f32;
        estimated
            .min(self.config.iris_radius_max as f32)
            .max(pupil.radius + 1.0)
    }
}

/// Radius in `r_min..=r_max` with the strongest outward intensity step at
/// the given center, or `None` if no ring had enough in-bounds samples.
///
/// `mask` excludes samples inside an inflated disk (the pupil, when
/// searching for the iris boundary).
fn strongest_boundary(
    img: &GrayImage,
    cx: f32,
    cy: f32,
    r_min: u32,
    r_max: u32,
    mask: Option<(Circle, f32)>,
) -> Option<(f32, f64)> {
    let mut profile = Vec::with_capacity((r_max - r_min + 2) as usize);
    for r in r_min..=r_max + 1 {
        profile.push(ring_mean(img, cx, cy, r as f32, mask)?);
    }

    let mut best_radius = r_min;
    let mut best_step = f64::MIN;
    for (i, pair) in profile.windows(2).enumerate() {
        let step = pair[1] - pair[0];
        if step > best_step {
            best_step = step;
            best_radius = r_min + i as u32;
        }
    }

    Some((best_radius as f32, best_step))
}

/// Mean intensity over a sampled ring; `None` when more than half the
/// samples land outside the buffer.
fn ring_mean(img: &GrayImage, cx: f32, cy: f32, radius: f32, mask: Option<(Circle, f32)>) -> Option<f64> {
    let (width, height) = img.dimensions();
    let mut sum = 0.0f64;
    let mut count = 0usize;

    for i in 0..RING_SAMPLES {
        let theta = 2.0 * std::f32::consts::PI * i as f32 / RING_SAMPLES as f32;
        let px = (cx + radius * theta.cos()).round() as i32;
        let py = (cy + radius * theta.sin()).round() as i32;

        if px < 0 || py < 0 || px >= width as i32 || py >= height as i32 {
            continue;
        }
        if let Some((circle, margin)) = mask {
            let dx = px as f32 - circle.cx;
            let dy = py as f32 - circle.cy;
            if (dx * dx + dy * dy).sqrt() < circle.radius + margin {
                continue;
            }
        }

        sum += img.get_pixel(px as u32, py as u32)[0] as f64;
        count += 1;
    }

    if count < RING_SAMPLES / 2 {
        None
    } else {
        Some(sum / count as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use imageproc::drawing::draw_filled_circle_mut;

    fn localizer() -> Localizer {
        Localizer::new(&LocalizerConfig::default())
    }

    /// Bright sclera, mid-gray iris annulus, dark pupil core.
    fn synthetic_eye(size: u32, cx: i32, cy: i32, pupil_r: i32, iris_r: i32) -> GrayImage {
        let mut img = GrayImage::from_pixel(size, size, Luma([220u8]));
        draw_filled_circle_mut(&mut img, (cx, cy), iris_r, Luma([110u8]));
        draw_filled_circle_mut(&mut img, (cx, cy), pupil_r, Luma([20u8]));
        img
    }

    #[test]
    fn finds_pupil_on_synthetic_eye() {
        let eye = synthetic_eye(90, 45, 45, 12, 30);
        let geometry = localizer().locate(&eye);

        assert!((geometry.pupil.cx - 45.0).abs() <= 5.0, "cx = {}", geometry.pupil.cx);
        assert!((geometry.pupil.cy - 45.0).abs() <= 5.0, "cy = {}", geometry.pupil.cy);
        assert!(
            (8.0..=16.0).contains(&geometry.pupil.radius),
            "pupil radius = {}",
            geometry.pupil.radius
        );
    }

    #[test]
    fn finds_iris_beyond_pupil() {
        let eye = synthetic_eye(90, 45, 45, 12, 30);
        let geometry = localizer().locate(&eye);

        assert!(
            (24.0..=36.0).contains(&geometry.iris.radius),
            "iris radius = {}",
            geometry.iris.radius
        );
    }

    #[test]
    fn uniform_region_falls_back_to_heuristics() {
        let eye = GrayImage::from_pixel(60, 48, Luma([128u8]));
        let geometry = localizer().locate(&eye);

        assert_eq!(geometry.pupil.cx, 30.0);
        assert_eq!(geometry.pupil.cy, 24.0);
        // min(60, 48) / 6
        assert_eq!(geometry.pupil.radius, 8.0);
        assert_eq!(geometry.iris.radius, 23.0);
    }

    #[test]
    fn iris_radius_always_exceeds_pupil_radius() {
        let cases = vec![
            synthetic_eye(90, 45, 45, 12, 30),
            synthetic_eye(60, 30, 30, 8, 20),
            GrayImage::from_pixel(40, 40, Luma([128u8])),
            GrayImage::from_pixel(12, 12, Luma([0u8])),
        ];
        for eye in cases {
            let geometry = localizer().locate(&eye);
            assert!(
                geometry.iris.radius > geometry.pupil.radius,
                "pupil {} iris {}",
                geometry.pupil.radius,
                geometry.iris.radius
            );
        }
    }

    #[test]
    fn fallback_iris_is_clamped_to_plausible_maximum() {
        let config = LocalizerConfig::default();
        let local = Localizer::new(&config);
        let wide_pupil = Circle {
            cx: 0.0,
            cy: 0.0,
            radius: 30.0,
        };
        let radius = local.fallback_iris_radius(&wide_pupil);
        assert_eq!(radius, 40.0);
        assert!(radius > wide_pupil.radius);
    }
}

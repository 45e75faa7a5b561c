use crate::core::localizer::IrisGeometry;
use image::GrayImage;
use imageproc::contrast::equalize_histogram;

/// Radial resolution of the normalized map (pupil boundary -> iris boundary).
pub const NORM_ROWS: u32 = 64;
/// Angular resolution of the normalized map (0 -> 2 pi).
pub const NORM_COLS: u32 = 512;

/// Unwrap the annular iris region onto a fixed 64x512 grid (rubber-sheet
/// model), then equalize the histogram to compensate for illumination
/// differences between captures.
pub fn normalize_iris(eye: &GrayImage, geometry: &IrisGeometry) -> GrayImage {
    equalize_histogram(&unwrap_iris(eye, geometry))
}

/// Polar-to-rectangular unwrap.
///
/// Column c maps to angle 2 pi c / 512, row r to a radial position linearly
/// interpolated between the pupil and iris radii. Source coordinates are
/// truncated to integers; samples falling outside the eye buffer leave the
/// output cell at zero. Trig terms are precomputed per column since they do
/// not vary across rows.
pub fn unwrap_iris(eye: &GrayImage, geometry: &IrisGeometry) -> GrayImage {
    let (eye_width, eye_height) = eye.dimensions();
    let pupil = geometry.pupil;
    let radial_span = geometry.iris.radius - pupil.radius;

    let mut trig = Vec::with_capacity(NORM_COLS as usize);
    for c in 0..NORM_COLS {
        let theta = 2.0 * std::f32::consts::PI * c as f32 / NORM_COLS as f32;
        trig.push((theta.cos(), theta.sin()));
    }

    let mut normalized = GrayImage::new(NORM_COLS, NORM_ROWS);
    for r in 0..NORM_ROWS {
        let distance = pupil.radius + radial_span * r as f32 / NORM_ROWS as f32;
        for c in 0..NORM_COLS {
            let (cos_t, sin_t) = trig[c as usize];
            let px = (pupil.cx + distance * cos_t) as i32;
            let py = (pupil.cy + distance * sin_t) as i32;

            if px >= 0 && py >= 0 && (px as u32) < eye_width && (py as u32) < eye_height {
                normalized.put_pixel(c, r, *eye.get_pixel(px as u32, py as u32));
            }
        }
    }

    normalized
}

use image::GrayImage;
use ndarray::Array2;

pub type Signature = Vec<f32>;

/// 12 filters x 4 statistics + 16 histogram bins.
pub const SIGNATURE_LEN: usize = 64;

/// Epsilon floor added to the norm so a degenerate all-zero vector still
/// normalizes instead of dividing by zero.
pub const NORM_EPSILON: f32 = 1e-8;

const SCALES: [usize; 3] = [4, 8, 16];
const ORIENTATION_COUNT: usize = 4;
const HISTOGRAM_BINS: usize = 16;

/// Compute the fixed-length, unit-normalized signature of an equalized
/// normalized iris map.
///
/// Band-pass texture responses at 3 scales x 4 orientations contribute
/// mean/std/max/min each; a 16-bucket intensity histogram of the map
/// itself is appended before L2 normalization.
pub fn extract_signature(map: &GrayImage) -> Signature {
    let src = to_array(map);
    let mut features = Vec::with_capacity(SIGNATURE_LEN);

    for &scale in &SCALES {
        for o in 0..ORIENTATION_COUNT {
            let theta = o as f32 * std::f32::consts::PI / ORIENTATION_COUNT as f32;
            let kernel = gabor_kernel(scale, theta);
            let response = correlate(&src, &kernel);
            let (mean, std_dev, max, min) = response_stats(&response);
            features.extend_from_slice(&[mean, std_dev, max, min]);
        }
    }

    let mut histogram = [0.0f32; HISTOGRAM_BINS];
    for p in map.pixels() {
        histogram[p[0] as usize * HISTOGRAM_BINS / 256] += 1.0;
    }
    features.extend_from_slice(&histogram);

    debug_assert_eq!(features.len(), SIGNATURE_LEN);
    l2_normalize(&mut features);
    features
}

/// Scale `v` to unit length, with an epsilon floor on the divisor.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    for x in v.iter_mut() {
        *x /= norm + NORM_EPSILON;
    }
}

fn to_array(map: &GrayImage) -> Array2<f32> {
    let (width, height) = map.dimensions();
    Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
        map.get_pixel(x as u32, y as u32)[0] as f32
    })
}

/// Gabor kernel of size (2*scale+1)^2 with sigma = scale, wavelength =
/// 2*scale, aspect ratio 0.5, zero phase offset.
fn gabor_kernel(scale: usize, theta: f32) -> Array2<f32> {
    let sigma = scale as f32;
    let lambda = 2.0 * scale as f32;
    let gamma = 0.5f32;
    let half = scale as i32;
    let size = 2 * scale + 1;

    let (sin_t, cos_t) = theta.sin_cos();
    Array2::from_shape_fn((size, size), |(row, col)| {
        let x = col as i32 - half;
        let y = row as i32 - half;
        let xr = x as f32 * cos_t + y as f32 * sin_t;
        let yr = -(x as f32) * sin_t + y as f32 * cos_t;
        let envelope = (-(xr * xr + gamma * gamma * yr * yr) / (2.0 * sigma * sigma)).exp();
        let carrier = (2.0 * std::f32::consts::PI * xr / lambda).cos();
        envelope * carrier
    })
}

/// 2D correlation with clamped borders.
fn correlate(src: &Array2<f32>, kernel: &Array2<f32>) -> Array2<f32> {
    let (rows, cols) = src.dim();
    let (k_rows, k_cols) = kernel.dim();
    let half_r = (k_rows / 2) as i32;
    let half_c = (k_cols / 2) as i32;

    Array2::from_shape_fn((rows, cols), |(y, x)| {
        let mut acc = 0.0f32;
        for ky in 0..k_rows {
            let sy = (y as i32 + ky as i32 - half_r).clamp(0, rows as i32 - 1) as usize;
            for kx in 0..k_cols {
                let sx = (x as i32 + kx as i32 - half_c).clamp(0, cols as i32 - 1) as usize;
                acc += src[[sy, sx]] * kernel[[ky, kx]];
            }
        }
        acc
    })
}

fn response_stats(response: &Array2<f32>) -> (f32, f32, f32, f32) {
    let n = response.len() as f32;
    let mean = response.sum() / n;
    let variance = response.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n;
    let max = response.iter().copied().fold(f32::MIN, f32::max);
    let min = response.iter().copied().fold(f32::MAX, f32::min);
    (mean, variance.sqrt(), max, min)
}

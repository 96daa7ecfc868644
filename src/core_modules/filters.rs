// THEORY:
// The neighbourhood filters the two selectors need before they can reason about
// colour regions. All of them work on row-major planes and replicate the border
// pixel outside the image, so every output pixel sees a full window.
//
// - median:    removes isolated noise pixels while keeping edges sharp
// - bilateral: edge-preserving smoothing, averages only over similar values
// - gaussian:  plain separable blur, merges what the bilateral pass left behind
// - rounding:  snaps values to a coarse step (round half to even)

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

/// Gaussian kernels are cut off at this many standard deviations.
const GAUSSIAN_TRUNCATE: f32 = 4.0;
/// Smallest bilateral window side.
const MIN_BILATERAL_WINDOW: usize = 5;

#[inline]
fn clamp_index(v: isize, len: usize) -> usize {
    v.clamp(0, len as isize - 1) as usize
}

/// Per-channel median over a `kernel x kernel` window. Kernels below 2 return a copy.
pub fn median_rgb(img: &RgbImage, kernel: usize) -> RgbImage {
    if kernel <= 1 {
        return img.clone();
    }
    let (width, height) = img.dimensions();
    let half = (kernel / 2) as isize;
    let mut window: [Vec<u8>; 3] = std::array::from_fn(|_| Vec::with_capacity(kernel * kernel));

    RgbImage::from_fn(width, height, |x, y| {
        for channel in window.iter_mut() {
            channel.clear();
        }
        for dy in -half..=half {
            for dx in -half..=half {
                let nx = clamp_index(x as isize + dx, width as usize) as u32;
                let ny = clamp_index(y as isize + dy, height as usize) as u32;
                let p = img.get_pixel(nx, ny);
                for (c, channel) in window.iter_mut().enumerate() {
                    channel.push(p[c]);
                }
            }
        }
        let mid = window[0].len() / 2;
        let mut out = [0u8; 3];
        for (c, channel) in window.iter_mut().enumerate() {
            let (_, median, _) = channel.select_nth_unstable(mid);
            out[c] = *median;
        }
        Rgb(out)
    })
}

/// Median over a `kernel x kernel` window of a single plane.
pub fn median_plane<T: Copy + Ord>(plane: &[T], width: usize, height: usize, kernel: usize) -> Vec<T> {
    if kernel <= 1 || plane.is_empty() {
        return plane.to_vec();
    }
    let half = (kernel / 2) as isize;
    let mut window = Vec::with_capacity(kernel * kernel);
    let mut out = Vec::with_capacity(plane.len());
    for y in 0..height {
        for x in 0..width {
            window.clear();
            for dy in -half..=half {
                let ny = clamp_index(y as isize + dy, height);
                for dx in -half..=half {
                    let nx = clamp_index(x as isize + dx, width);
                    window.push(plane[ny * width + nx]);
                }
            }
            let mid = window.len() / 2;
            let (_, median, _) = window.select_nth_unstable(mid);
            out.push(*median);
        }
    }
    out
}

/// Rounds `value` to the nearest multiple of `step`, ties to even.
#[inline]
pub fn round_to_step(value: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return value;
    }
    (value / step).round_ties_even() * step
}

fn std_dev(plane: &[f32]) -> f32 {
    if plane.is_empty() {
        return 0.0;
    }
    let n = plane.len() as f64;
    let mean = plane.iter().map(|&v| v as f64).sum::<f64>() / n;
    let variance = plane.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt() as f32
}

/// Edge-preserving bilateral smoothing of one plane.
///
/// The window side is `max(5, 2 * ceil(3 * sigma_spatial) + 1)`. Without an
/// explicit `sigma_color` the standard deviation of the plane is used.
/// Window samples outside the plane replicate the nearest border pixel instead of
/// reading as zero, so border values are not pulled towards 0.
pub fn bilateral(
    plane: &[f32],
    width: usize,
    height: usize,
    sigma_spatial: f32,
    sigma_color: Option<f32>,
) -> Vec<f32> {
    let sigma_color = sigma_color.unwrap_or_else(|| std_dev(plane));
    if plane.is_empty() || sigma_spatial <= 0.0 || sigma_color <= 0.0 {
        return plane.to_vec();
    }

    let window = MIN_BILATERAL_WINDOW.max(2 * (3.0 * sigma_spatial).ceil() as usize + 1);
    let half = (window / 2) as isize;
    let spatial_denominator = 2.0 * sigma_spatial * sigma_spatial;
    let color_denominator = 2.0 * sigma_color * sigma_color;

    let spatial: Vec<f32> = (-half..=half)
        .flat_map(|dy| (-half..=half).map(move |dx| (dy, dx)))
        .map(|(dy, dx)| (-((dy * dy + dx * dx) as f32) / spatial_denominator).exp())
        .collect();

    let mut out = Vec::with_capacity(plane.len());
    for y in 0..height {
        for x in 0..width {
            let centre = plane[y * width + x];
            let mut weighted = 0.0f32;
            let mut total = 0.0f32;
            let mut k = 0;
            for dy in -half..=half {
                let ny = clamp_index(y as isize + dy, height);
                for dx in -half..=half {
                    let nx = clamp_index(x as isize + dx, width);
                    let v = plane[ny * width + nx];
                    let diff = v - centre;
                    let w = spatial[k] * (-(diff * diff) / color_denominator).exp();
                    weighted += w * v;
                    total += w;
                    k += 1;
                }
            }
            out.push(if total > 0.0 { weighted / total } else { centre });
        }
    }
    out
}

fn gaussian_taps(sigma: f32) -> Vec<f32> {
    let radius = (GAUSSIAN_TRUNCATE * sigma + 0.5) as isize;
    let denominator = 2.0 * sigma * sigma;
    let mut taps: Vec<f32> = (-radius..=radius)
        .map(|i| (-((i * i) as f32) / denominator).exp())
        .collect();
    let sum: f32 = taps.iter().sum();
    for t in taps.iter_mut() {
        *t /= sum;
    }
    taps
}

/// Separable Gaussian blur of one plane. `sigma <= 0` returns a copy.
pub fn gaussian_blur(plane: &[f32], width: usize, height: usize, sigma: f32) -> Vec<f32> {
    if plane.is_empty() || sigma <= 0.0 {
        return plane.to_vec();
    }
    let taps = gaussian_taps(sigma);
    let half = (taps.len() / 2) as isize;

    let mut horizontal = vec![0.0f32; plane.len()];
    for y in 0..height {
        let row = &plane[y * width..(y + 1) * width];
        for x in 0..width {
            horizontal[y * width + x] = taps
                .iter()
                .enumerate()
                .map(|(k, t)| t * row[clamp_index(x as isize + k as isize - half, width)])
                .sum();
        }
    }

    let mut out = vec![0.0f32; plane.len()];
    for y in 0..height {
        for x in 0..width {
            out[y * width + x] = taps
                .iter()
                .enumerate()
                .map(|(k, t)| t * horizontal[clamp_index(y as isize + k as isize - half, height) * width + x])
                .sum();
        }
    }
    out
}

/// Shrinks an image by an integer factor (`height / factor x width / factor`, at
/// least 1x1) with an anti-aliasing triangle filter.
pub fn downscale_rgb(img: &RgbImage, factor: u32) -> RgbImage {
    if factor <= 1 {
        return img.clone();
    }
    let width = (img.width() / factor).max(1);
    let height = (img.height() / factor).max(1);
    imageops::resize(img, width, height, FilterType::Triangle)
}

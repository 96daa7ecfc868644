// THEORY:
// The `GridPointSelector` is the simplest hint strategy: it lays a regular lattice
// over the mask and takes one colour sample at every lattice point.
//
// Key architectural principles:
// 1.  **Mask-space lattice**: candidates are the cells `(y, x)` of the mask with
//     `y % grid_size == 0 && x % grid_size == 0`; each is mapped into the image to
//     find the colour it should carry. A grid size of 0 means "no hints".
// 2.  **Denoised source**: colours are read from a median-filtered copy of the
//     image, so a single noisy pixel cannot become a hint.
// 3.  **Optional redundancy exclusion**: a point whose whole neighbourhood
//     quantises to the same `(a, b)` adds nothing the colouriser could not infer
//     from its neighbours, so it is skipped. The quantised buffer behind that check
//     is a `VicinityContext` built once per image by the caller.
// 4.  **Optional jitter**: each point may be displaced by a seeded random offset.
//     Jitter and exclusion are mutually exclusive; with jitter active the exclusion
//     check is bypassed.
// 5.  **Optional palette**: with `quantize_k > 0` both chrominance channels are
//     reduced to `k` levels before sampling and before the exclusion buffer is built.

use crate::core_modules::coordinate::mask_to_image;
use crate::core_modules::filters::{median_plane, median_rgb, round_to_step};
use crate::core_modules::kmeans::{KMEANS_SEED, quantize_channel};
use crate::core_modules::lab_image::LabImage;
use crate::core_modules::sparse_mask::{AbValue, SparseColorMask};
use crate::error::{HintError, Result};
use image::RgbImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Offset added to chrominance before the vicinity buffer is built.
const VICINITY_SHIFT: f32 = 100.0;

/// Seeded random displacement of grid points, `[-radius, radius)` per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jitter {
    pub radius: usize,
    pub seed: u64,
}

/// Configuration for the `GridPointSelector`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSelectorConfig {
    /// Side length of the produced mask.
    pub size: usize,
    /// Patch radius of the produced mask.
    pub patch_radius: usize,
    /// Lattice spacing in mask cells. 0 produces an empty mask.
    pub grid_size: usize,
    /// Skip points whose neighbourhood shares one quantised colour.
    pub exclude: bool,
    /// Half-width, in mask cells, of the neighbourhood inspected by the exclusion check.
    pub vicinity_radius: usize,
    /// Quantisation step of the exclusion buffer (25 for colourful high-res, 10 for street scenes).
    pub vicinity_step: u32,
    /// Median kernel used to denoise the source image.
    pub median_kernel: usize,
    /// Number of k-means levels per chrominance channel. 0 disables quantisation.
    pub quantize_k: usize,
    pub jitter: Option<Jitter>,
}

impl Default for GridSelectorConfig {
    fn default() -> Self {
        Self {
            size: 256,
            patch_radius: 0,
            grid_size: 10,
            exclude: false,
            vicinity_radius: 1,
            vicinity_step: 25,
            median_kernel: 5,
            quantize_k: 0,
            jitter: None,
        }
    }
}

/// Denoised, quantised chrominance used by the redundancy check.
///
/// Built once per image and handed to the selector; dropping it is the only
/// invalidation there is.
#[derive(Debug, Clone)]
pub struct VicinityContext {
    width: usize,
    height: usize,
    a: Vec<i32>,
    b: Vec<i32>,
}

impl VicinityContext {
    /// Shifts both channels to non-negative values, median filters them and rounds
    /// to the nearest multiple of `step`.
    pub fn new(lab: &LabImage, step: u32, median_kernel: usize) -> Self {
        let prepare = |plane: &[f32]| -> Vec<i32> {
            let shifted: Vec<i32> = plane.iter().map(|&v| (v + VICINITY_SHIFT) as i32).collect();
            median_plane(&shifted, lab.width, lab.height, median_kernel)
                .into_iter()
                .map(|v| round_to_step(v as f64, step as f64) as i32)
                .collect()
        };
        Self {
            width: lab.width,
            height: lab.height,
            a: prepare(&lab.a),
            b: prepare(&lab.b),
        }
    }

    /// Quantised `(a, b)` at an image-space position.
    pub fn quantized(&self, row: usize, col: usize) -> (i32, i32) {
        let i = row * self.width + col;
        (self.a[i], self.b[i])
    }

    /// True when every mask cell of the square of `radius` around the mask
    /// position `(row, col)` maps to a pixel with the centre's quantised colour.
    /// Cells outside `[0, size)` are ignored.
    pub fn is_redundant(&self, row: usize, col: usize, radius: usize, size: usize) -> bool {
        let (centre_row, centre_col) = mask_to_image(self.height, self.width, row, col, size);
        let centre = self.quantized(centre_row, centre_col);
        let r = radius as isize;
        for dy in -r..=r {
            for dx in -r..=r {
                let y = row as isize + dy;
                let x = col as isize + dx;
                if y < 0 || x < 0 || y >= size as isize || x >= size as isize {
                    continue;
                }
                let (img_row, img_col) = mask_to_image(self.height, self.width, y as usize, x as usize, size);
                if self.quantized(img_row, img_col) != centre {
                    return false;
                }
            }
        }
        true
    }
}

/// Samples hints on a regular lattice.
pub struct GridPointSelector {
    config: GridSelectorConfig,
}

impl GridPointSelector {
    pub fn new(config: GridSelectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GridSelectorConfig {
        &self.config
    }

    /// Denoises `rgb`, builds the exclusion context when needed, and selects.
    pub fn select(&self, rgb: &RgbImage) -> Result<SparseColorMask> {
        if self.config.grid_size == 0 {
            return SparseColorMask::new(self.config.size, self.config.patch_radius);
        }
        let denoised = median_rgb(rgb, self.config.median_kernel);
        let mut lab = LabImage::from_rgb(&denoised);
        if self.config.quantize_k > 0 {
            lab.a = quantize_channel(&lab.a, self.config.quantize_k, KMEANS_SEED);
            lab.b = quantize_channel(&lab.b, self.config.quantize_k, KMEANS_SEED);
            debug!(k = self.config.quantize_k, "chrominance quantised");
        }
        let vicinity = (self.config.exclude && self.config.jitter.is_none())
            .then(|| VicinityContext::new(&lab, self.config.vicinity_step, self.config.median_kernel));
        self.select_lab(&lab, vicinity.as_ref())
    }

    /// Selects from an already denoised Lab image. With `vicinity` set (and no
    /// jitter configured) redundant points are skipped.
    pub fn select_lab(&self, lab: &LabImage, vicinity: Option<&VicinityContext>) -> Result<SparseColorMask> {
        let cfg = &self.config;
        let mut mask = SparseColorMask::new(cfg.size, cfg.patch_radius)?;
        if cfg.grid_size == 0 {
            debug!("grid size 0, no colour hints");
            return Ok(mask);
        }
        if lab.width == 0 || lab.height == 0 {
            return Err(HintError::invalid("image dimensions", format!("{}x{}", lab.width, lab.height)));
        }

        let mut rng = cfg.jitter.map(|j| StdRng::seed_from_u64(j.seed));
        let vicinity = if cfg.jitter.is_some() { None } else { vicinity };
        let mut skipped = 0usize;
        let mut placed = 0usize;

        for y in (0..cfg.size).step_by(cfg.grid_size) {
            for x in (0..cfg.size).step_by(cfg.grid_size) {
                let location = match (cfg.jitter, rng.as_mut()) {
                    (Some(jitter), Some(rng)) => match jittered(y, x, jitter.radius, cfg.size, rng) {
                        Some(location) => location,
                        None => continue,
                    },
                    _ => (y, x),
                };

                if let Some(context) = vicinity {
                    if context.is_redundant(location.0, location.1, cfg.vicinity_radius, cfg.size) {
                        skipped += 1;
                        continue;
                    }
                }

                let (row, col) = mask_to_image(lab.height, lab.width, location.0, location.1, cfg.size);

                let (a, b) = lab.ab(row, col);
                mask.put_point(location, AbValue::from_lab(a, b))?;
                placed += 1;
            }
        }

        debug!(placed, skipped, grid_size = cfg.grid_size, "grid selection done");
        Ok(mask)
    }
}

fn jittered(y: usize, x: usize, radius: usize, size: usize, rng: &mut StdRng) -> Option<(usize, usize)> {
    if radius == 0 {
        return Some((y, x));
    }
    let r = radius as isize;
    let ny = y as isize + rng.gen_range(-r..r);
    let nx = x as isize + rng.gen_range(-r..r);
    let in_range = |v: isize| v >= 0 && v < size as isize;
    (in_range(ny) && in_range(nx)).then_some((ny as usize, nx as usize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn halves(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, _| {
            if x < width / 2 { Rgb([200, 30, 30]) } else { Rgb([30, 30, 200]) }
        })
    }

    #[test]
    fn lattice_count_matches_ceil_squared() {
        let img = halves(300, 200);
        for (size, grid) in [(256usize, 10usize), (64, 7), (16, 1), (10, 20)] {
            let config = GridSelectorConfig {
                size,
                grid_size: grid,
                ..Default::default()
            };
            let mask = GridPointSelector::new(config).select(&img).unwrap();
            let per_axis = size.div_ceil(grid);
            assert_eq!(mask.active_count(), per_axis * per_axis, "size={size} grid={grid}");
            assert!(mask.samples().all(|s| s.row % grid == 0 && s.col % grid == 0));
        }
    }

    #[test]
    fn grid_size_zero_is_empty() {
        let config = GridSelectorConfig {
            grid_size: 0,
            ..Default::default()
        };
        let mask = GridPointSelector::new(config).select(&halves(50, 50)).unwrap();
        assert!(mask.is_empty());
        assert_eq!(mask.size(), 256);
    }

    #[test]
    fn values_come_from_the_mapped_pixel() {
        let img = halves(100, 100);
        let config = GridSelectorConfig {
            size: 100,
            grid_size: 10,
            ..Default::default()
        };
        let mask = GridPointSelector::new(config).select(&img).unwrap();
        let red = mask.value_at(50, 10).unwrap();
        let blue = mask.value_at(50, 80).unwrap();
        assert!(red.a > 40, "{red:?}");
        assert!(blue.b < -40, "{blue:?}");
    }

    #[test]
    fn uniform_image_is_fully_excluded() {
        let img = RgbImage::from_pixel(120, 90, Rgb([40, 160, 60]));
        let config = GridSelectorConfig {
            size: 64,
            grid_size: 4,
            exclude: true,
            ..Default::default()
        };
        let mask = GridPointSelector::new(config).select(&img).unwrap();
        assert!(mask.is_empty());
    }

    #[test]
    fn exclusion_keeps_points_on_colour_edges() {
        let img = halves(64, 64);
        let config = GridSelectorConfig {
            size: 64,
            grid_size: 1,
            exclude: true,
            vicinity_radius: 1,
            ..Default::default()
        };
        let mask = GridPointSelector::new(config).select(&img).unwrap();
        assert!(!mask.is_empty());
        assert!(mask.samples().all(|s| s.col == 31 || s.col == 32), "only the seam survives");
    }

    #[test]
    fn vicinity_context_quantises_to_step() {
        let img = RgbImage::from_pixel(8, 8, Rgb([200, 30, 30]));
        let lab = LabImage::from_rgb(&img);
        let ctx = VicinityContext::new(&lab, 25, 5);
        let (a, b) = ctx.quantized(3, 3);
        assert_eq!(a % 25, 0);
        assert_eq!(b % 25, 0);
        assert!(ctx.is_redundant(0, 0, 3, 8));
    }

    #[test]
    fn jitter_is_reproducible_and_in_bounds() {
        let img = halves(80, 80);
        let config = GridSelectorConfig {
            size: 40,
            grid_size: 5,
            exclude: true,
            jitter: Some(Jitter { radius: 3, seed: 7 }),
            ..Default::default()
        };
        let first = GridPointSelector::new(config.clone()).select(&img).unwrap();
        let second = GridPointSelector::new(config).select(&img).unwrap();
        assert_eq!(first, second);
        assert!(!first.is_empty());
        assert!(first.active_count() <= 64);
    }

    #[test]
    fn exclusion_neighbourhood_is_measured_in_mask_cells() {
        // Ten image pixels per mask cell; the seam at column 325 falls between
        // mask columns 32 (image 320) and 33 (image 330).
        let img = RgbImage::from_fn(640, 640, |x, _| {
            if x < 325 { Rgb([200, 30, 30]) } else { Rgb([30, 30, 200]) }
        });
        let config = GridSelectorConfig {
            size: 64,
            grid_size: 1,
            exclude: true,
            vicinity_radius: 1,
            ..Default::default()
        };
        let mask = GridPointSelector::new(config).select(&img).unwrap();
        assert_eq!(mask.active_count(), 2 * 64);
        assert!(mask.samples().all(|s| s.col == 32 || s.col == 33));
    }

    #[test]
    fn jitter_stays_within_half_open_window() {
        let (size, radius) = (40usize, 3usize);
        let r = radius as isize;
        let mut dropped = 0;
        for (y, x) in [(0usize, 0usize), (0, 39), (39, 0), (39, 39), (20, 1)] {
            for seed in 0..200u64 {
                let got = jittered(y, x, radius, size, &mut StdRng::seed_from_u64(seed));

                let mut draws = StdRng::seed_from_u64(seed);
                let ny = y as isize + draws.gen_range(-r..r);
                let nx = x as isize + draws.gen_range(-r..r);
                let inside = (0..size as isize).contains(&ny) && (0..size as isize).contains(&nx);

                match got {
                    Some((jy, jx)) => {
                        assert!(inside);
                        assert_eq!((jy as isize, jx as isize), (ny, nx));
                        assert!(y as isize - r <= jy as isize && (jy as isize) < y as isize + r);
                        assert!(x as isize - r <= jx as isize && (jx as isize) < x as isize + r);
                    }
                    None => {
                        assert!(!inside, "seed {seed} at ({y}, {x})");
                        dropped += 1;
                    }
                }
            }
        }
        assert!(dropped > 0);
        assert_eq!(jittered(5, 5, 0, size, &mut StdRng::seed_from_u64(1)), Some((5, 5)));
    }

    #[test]
    fn quantized_chrominance_limits_distinct_values() {
        let img = RgbImage::from_fn(120, 120, |x, _| Rgb([(x * 2) as u8, 90, (255 - x * 2) as u8]));
        let config = GridSelectorConfig {
            size: 30,
            grid_size: 1,
            median_kernel: 1,
            quantize_k: 2,
            ..Default::default()
        };
        let mask = GridPointSelector::new(config).select(&img).unwrap();
        let a: std::collections::BTreeSet<i16> = mask.samples().map(|s| s.value.a).collect();
        let b: std::collections::BTreeSet<i16> = mask.samples().map(|s| s.value.b).collect();
        assert_eq!(mask.active_count(), 30 * 30);
        assert!(a.len() <= 2, "{a:?}");
        assert_eq!(b.len(), 2, "{b:?}");
    }
}

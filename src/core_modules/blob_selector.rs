// THEORY:
// The `BlobSelector` places hints where the image content asks for them instead of
// on a fixed lattice. It segments a smoothed, downscaled chrominance rendition into
// colour blobs and samples one point near the middle of each blob, plus a few extra
// points inside very large blobs.
//
// Key architectural principles & algorithm steps:
// 1.  **Denoise, then shrink**: a median pass removes pixel noise at full
//     resolution; the image is then shrunk by an integer scaling factor
//     (`round(min(H, W) / 250)`, at least 1) so segmentation cost and blob sizes are
//     roughly independent of the input resolution.
// 2.  **Smooth chrominance**: `a` and `b` are shifted non-negative, run through an
//     edge-preserving bilateral filter and then a Gaussian blur. Both sigmas scale
//     with the image size, so the same photo at two resolutions segments alike.
// 3.  **Segment**: the smoothed planes are quantised into colour ids and split into
//     connected blobs by the `BlobDetector`.
// 4.  **Sample**: every blob above the size floor contributes its centroid; large
//     blobs contribute seeded supplemental points. Centres too close to the plane
//     border are dropped.
// 5.  **Project**: surviving centres are scaled back to full resolution, coloured
//     from the denoised full-resolution Lab image and mapped into mask space. With
//     `quantize_k > 0` that image's chrominance is first reduced to `k` levels.

use crate::core_modules::blob_detector::{BlobLabels, Connectivity, blob_detector};
use crate::core_modules::color_blob::Point;
use crate::core_modules::coordinate::image_to_mask;
use crate::core_modules::filters::{bilateral, downscale_rgb, gaussian_blur, median_rgb};
use crate::core_modules::kmeans::{KMEANS_SEED, quantize_channel};
use crate::core_modules::lab_image::LabImage;
use crate::core_modules::sparse_mask::{AbValue, SparseColorMask};
use crate::error::{HintError, Result};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Image side that maps to a scaling factor of 1.
const SCALE_REFERENCE: f64 = 250.0;
/// Shift applied to chrominance before smoothing.
const CHROMA_SHIFT: f32 = 100.0;

/// Configuration for the `BlobSelector`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobSelectorConfig {
    pub size: usize,
    pub patch_radius: usize,
    /// Quantisation step of the colour ids.
    pub round_to: u32,
    /// Fixed downscale factor; derived from the image size when unset.
    pub scaling_factor: Option<u32>,
    pub median_kernel: usize,
    /// Gaussian sigma is `min(h, w) / sigma_gauss_div` of the downscaled plane.
    pub sigma_gauss_div: f32,
    /// Bilateral spatial sigma is `min(H, W) / sigma_bilateral_div` of the full image.
    pub sigma_bilateral_div: f32,
    /// Blobs with at most this many pixels are ignored.
    pub min_blob_pixels: usize,
    /// Pixel count from which a blob earns supplemental points.
    pub supplemental_threshold: usize,
    pub supplemental_points: bool,
    /// Centres closer than this to the downscaled border are dropped.
    pub edge_margin: usize,
    pub connectivity: Connectivity,
    /// Require the rounded mean to be a member pixel before accepting it as centroid.
    pub strict_centroid_membership: bool,
    /// Number of k-means levels for the hint values of each chrominance channel. 0 disables it.
    pub quantize_k: usize,
}

impl Default for BlobSelectorConfig {
    fn default() -> Self {
        Self {
            size: 256,
            patch_radius: 0,
            round_to: 10,
            scaling_factor: None,
            median_kernel: 5,
            sigma_gauss_div: 250.0,
            sigma_bilateral_div: 500.0,
            min_blob_pixels: 4,
            supplemental_threshold: 1000,
            supplemental_points: true,
            edge_margin: 2,
            connectivity: Connectivity::Eight,
            strict_centroid_membership: false,
            quantize_k: 0,
        }
    }
}

/// Sample positions on the downscaled plane, before projection into the mask.
#[derive(Debug, Clone)]
pub struct BlobCentres {
    pub scaling_factor: u32,
    /// Dimensions of the downscaled plane.
    pub width: usize,
    pub height: usize,
    pub blob_count: usize,
    pub points: Vec<Point>,
}

/// `max(1, round(min(height, width) / 250))`, ties to even.
pub fn auto_scaling_factor(height: usize, width: usize) -> u32 {
    ((height.min(width) as f64 / SCALE_REFERENCE).round_ties_even() as u32).max(1)
}

/// Selects hints at the centres of colour blobs.
pub struct BlobSelector {
    config: BlobSelectorConfig,
}

impl BlobSelector {
    pub fn new(config: BlobSelectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BlobSelectorConfig {
        &self.config
    }

    pub fn select(&self, rgb: &RgbImage) -> Result<SparseColorMask> {
        let cfg = &self.config;
        let mut mask = SparseColorMask::new(cfg.size, cfg.patch_radius)?;
        let denoised = median_rgb(rgb, cfg.median_kernel);
        let centres = self.centres_of_denoised(&denoised)?;
        let mut full = LabImage::from_rgb(&denoised);
        if cfg.quantize_k > 0 {
            full.a = quantize_channel(&full.a, cfg.quantize_k, KMEANS_SEED);
            full.b = quantize_channel(&full.b, cfg.quantize_k, KMEANS_SEED);
        }
        let (height, width) = (full.height, full.width);
        let factor = centres.scaling_factor as usize;

        for point in &centres.points {
            let row = (point.row * factor).min(height - 1);
            let col = (point.col * factor).min(width - 1);
            let (a, b) = full.ab(row, col);
            let location = image_to_mask(height, width, row, col, cfg.size);
            mask.put_point(location, AbValue::from_lab(a, b))?;
        }

        debug!(
            blobs = centres.blob_count,
            centres = centres.points.len(),
            active = mask.active_count(),
            "blob selection done"
        );
        Ok(mask)
    }

    /// Runs segmentation and sampling, returning positions on the downscaled plane.
    pub fn centres(&self, rgb: &RgbImage) -> Result<BlobCentres> {
        self.centres_of_denoised(&median_rgb(rgb, self.config.median_kernel))
    }

    /// The id plane and its blobs, without sampling.
    pub fn segment(&self, rgb: &RgbImage) -> Result<(u32, BlobLabels)> {
        self.segment_denoised(&median_rgb(rgb, self.config.median_kernel))
    }

    fn segment_denoised(&self, denoised: &RgbImage) -> Result<(u32, BlobLabels)> {
        let cfg = &self.config;
        let (full_width, full_height) = (denoised.width() as usize, denoised.height() as usize);
        if full_width == 0 || full_height == 0 {
            return Err(HintError::invalid("image dimensions", format!("{full_width}x{full_height}")));
        }
        if cfg.round_to == 0 {
            return Err(HintError::invalid("round_to", cfg.round_to));
        }

        // --- 1. Downscale ---
        let factor = cfg
            .scaling_factor
            .unwrap_or_else(|| auto_scaling_factor(full_height, full_width))
            .max(1);
        let small = LabImage::from_rgb(&downscale_rgb(denoised, factor));
        let (width, height) = (small.width, small.height);
        debug!(factor, width, height, "downscaled for segmentation");

        // --- 2. Smooth ---
        let sigma_spatial = full_height.min(full_width) as f32 / cfg.sigma_bilateral_div;
        let sigma_gauss = height.min(width) as f32 / cfg.sigma_gauss_div;
        debug!(sigma_spatial, sigma_gauss, "smoothing chrominance");
        let smooth = |plane: &[f32]| -> Vec<i32> {
            let shifted: Vec<f32> = plane.iter().map(|&v| v.trunc() + CHROMA_SHIFT).collect();
            let filtered = bilateral(&shifted, width, height, sigma_spatial, None);
            gaussian_blur(&filtered, width, height, sigma_gauss)
                .into_iter()
                .map(|v| (v as i32).clamp(0, 255) - CHROMA_SHIFT as i32)
                .collect()
        };
        let a = smooth(&small.a);
        let b = smooth(&small.b);

        // --- 3. Segment ---
        let ids = blob_detector::quantize_ab(&a, &b, cfg.round_to);
        let labels = blob_detector::label_blobs(&ids, width, height, cfg.connectivity);
        debug!(blobs = labels.blobs.len(), "segmented colour blobs");
        Ok((factor, labels))
    }

    fn centres_of_denoised(&self, denoised: &RgbImage) -> Result<BlobCentres> {
        let cfg = &self.config;
        let (factor, labels) = self.segment_denoised(denoised)?;

        // --- 4. Sample ---
        let mut points = Vec::new();
        let mut skipped = 0usize;
        for blob in &labels.blobs {
            if blob.len() <= cfg.min_blob_pixels {
                skipped += 1;
                continue;
            }
            if let Some(centroid) = blob.centroid(cfg.strict_centroid_membership) {
                points.push(centroid);
            }
            if cfg.supplemental_points {
                points.extend(blob.supplemental_points(cfg.supplemental_threshold));
            }
        }

        // --- 5. Edge Trim ---
        let margin = cfg.edge_margin as isize;
        let (h, w) = (labels.height as isize, labels.width as isize);
        let before = points.len();
        points.retain(|p| {
            let (r, c) = (p.row as isize, p.col as isize);
            !(r < margin || r > h - margin || c < margin || c > w - margin)
        });
        debug!(skipped, trimmed = before - points.len(), kept = points.len(), "blob centres");

        Ok(BlobCentres {
            scaling_factor: factor,
            width: labels.width,
            height: labels.height,
            blob_count: labels.blobs.len(),
            points,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn quadrants(side: u32) -> RgbImage {
        RgbImage::from_fn(side, side, |x, y| match (x < side / 2, y < side / 2) {
            (true, true) => Rgb([200, 30, 30]),
            (false, true) => Rgb([30, 160, 40]),
            (true, false) => Rgb([30, 40, 200]),
            (false, false) => Rgb([220, 200, 40]),
        })
    }

    #[test]
    fn scaling_factor_rounds_half_to_even() {
        assert_eq!(auto_scaling_factor(100, 400), 1);
        assert_eq!(auto_scaling_factor(374, 1000), 1);
        assert_eq!(auto_scaling_factor(375, 1000), 2);
        assert_eq!(auto_scaling_factor(625, 700), 2);
        assert_eq!(auto_scaling_factor(1000, 2000), 4);
    }

    #[test]
    fn one_centroid_per_quadrant() {
        // No median pass: a per-channel median mixes colours where the four quadrants meet.
        let selector = BlobSelector::new(BlobSelectorConfig {
            median_kernel: 1,
            ..Default::default()
        });
        let centres = selector.centres(&quadrants(40)).unwrap();
        assert_eq!(centres.scaling_factor, 1);
        assert_eq!(centres.points.len(), 4, "{:?}", centres.points);
        let mask = selector.select(&quadrants(40)).unwrap();
        assert_eq!(mask.active_count(), 4);
    }

    #[test]
    fn uniform_blob_below_threshold_yields_one_point() {
        let img = RgbImage::from_pixel(30, 30, Rgb([200, 120, 40]));
        let centres = BlobSelector::new(BlobSelectorConfig::default()).centres(&img).unwrap();
        assert_eq!(centres.blob_count, 1);
        // Mean 14.5 on both axes rounds to even.
        assert_eq!(centres.points, vec![Point::new(14, 14)]);
    }

    #[test]
    fn large_blobs_earn_supplemental_points() {
        let img = RgbImage::from_pixel(60, 60, Rgb([200, 120, 40]));
        let config = BlobSelectorConfig {
            supplemental_threshold: 1000,
            ..Default::default()
        };
        let with = BlobSelector::new(config.clone()).centres(&img).unwrap();
        let without = BlobSelector::new(BlobSelectorConfig {
            supplemental_points: false,
            ..config
        })
        .centres(&img)
        .unwrap();
        assert_eq!(without.points.len(), 1);
        assert!(with.points.len() > 1);
        // 3600 pixels: round(log10(3600)) = 4 extra, minus any trimmed at the border.
        assert!(with.points.len() <= 1 + 4);
    }

    #[test]
    fn tiny_blobs_are_skipped() {
        let img = RgbImage::from_pixel(2, 2, Rgb([200, 30, 30]));
        let config = BlobSelectorConfig {
            median_kernel: 1,
            edge_margin: 0,
            ..Default::default()
        };
        let centres = BlobSelector::new(config).centres(&img).unwrap();
        assert_eq!(centres.blob_count, 1);
        assert!(centres.points.is_empty());
    }

    #[test]
    fn edge_centres_are_trimmed() {
        let img = RgbImage::from_pixel(30, 30, Rgb([200, 120, 40]));
        let config = BlobSelectorConfig {
            edge_margin: 16,
            ..Default::default()
        };
        let centres = BlobSelector::new(config).centres(&img).unwrap();
        assert!(centres.points.is_empty());
    }

    #[test]
    fn explicit_factor_shrinks_the_plane() {
        let config = BlobSelectorConfig {
            scaling_factor: Some(2),
            ..Default::default()
        };
        let centres = BlobSelector::new(config).centres(&quadrants(40)).unwrap();
        assert_eq!((centres.width, centres.height), (20, 20));
        assert!(centres.points.iter().all(|p| p.row < 20 && p.col < 20));
    }

    #[test]
    fn zero_round_to_is_rejected() {
        let config = BlobSelectorConfig {
            round_to: 0,
            ..Default::default()
        };
        let err = BlobSelector::new(config).select(&quadrants(20)).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn quantized_values_keep_positions() {
        let config = BlobSelectorConfig {
            median_kernel: 1,
            ..Default::default()
        };
        let plain = BlobSelector::new(config.clone()).select(&quadrants(40)).unwrap();
        let reduced = BlobSelector::new(BlobSelectorConfig { quantize_k: 2, ..config })
            .select(&quadrants(40))
            .unwrap();

        let cells = |m: &SparseColorMask| m.samples().map(|s| (s.row, s.col)).collect::<Vec<_>>();
        assert_eq!(cells(&plain), cells(&reduced));
        let levels = |m: &SparseColorMask| m.samples().map(|s| s.value.a).collect::<std::collections::BTreeSet<_>>();
        assert_eq!(levels(&plain).len(), 4);
        assert!(levels(&reduced).len() <= 2);
    }
}

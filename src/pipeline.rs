// THEORY:
// The `pipeline` module is the top-level API of the encoder. It turns one colour
// image into the artefacts a decoder needs: a grayscale rendition plus, depending
// on the chosen `Method`, one or two hint masks or a global colour histogram.
//
// Key architectural principles:
// 1.  **One image, one call**: `HintEncoder::encode` owns the whole flow for a single
//     file and reports every path it wrote. It keeps no state between images, so
//     one encoder can be shared by many workers.
// 2.  **Configuration first**: everything tunable lives in `EncoderConfig`, which
//     can be built in code or loaded from JSON. Invalid settings are reported
//     before any file is written.
// 3.  **External model behind a trait**: the global mode needs a trained network to
//     summarise the colour distribution. That collaborator is the
//     `ColorDistributionModel` trait; the encoder only resizes the image and
//     persists what the model returns.

use crate::core_modules::blob_selector::{BlobSelector, BlobSelectorConfig};
use crate::core_modules::global_histogram::{DEFAULT_BINS, GlobalHistogram, MAX_BINS};
use crate::core_modules::grid_selector::{GridPointSelector, GridSelectorConfig};
use crate::core_modules::sidecar;
use crate::core_modules::sparse_mask::{MAX_PATCH_RADIUS, SparseColorMask};
use crate::error::{HintError, Result};
use image::RgbImage;
use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, info_span};

/// Side length the global mode resizes images to before asking the model.
pub const GLOBAL_INPUT_SIZE: usize = 256;
/// Mask tag of the grid half of a combined encode.
pub const GRID_TAG: &str = "1";
/// Mask tag of the selective half of a combined encode.
pub const SELECTIVE_TAG: &str = "2";

/// How colour information is encoded next to the grayscale image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Method {
    /// Hints on a regular lattice.
    #[default]
    Grid,
    /// Lattice hints, skipping points inside uniformly coloured areas.
    GridExclude,
    /// Hints at colour blob centres.
    Selective,
    /// A grid mask and a selective mask, saved side by side.
    GridSelective,
    /// A global colour histogram instead of point hints.
    Global,
    /// Grayscale only.
    Stock,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Grid => "grid",
            Method::GridExclude => "grid-exclude",
            Method::Selective => "selective",
            Method::GridSelective => "grid-selective",
            Method::Global => "global",
            Method::Stock => "stock",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for the `HintEncoder`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Directory receiving the gray rendition and all sidecars. Created on demand.
    pub output_dir: PathBuf,
    pub method: Method,
    /// Mask side length; overrides the sizes of the selector configs.
    pub size: usize,
    /// Patch radius; overrides the radii of the selector configs.
    pub patch_radius: usize,
    pub grid: GridSelectorConfig,
    pub selective: BlobSelectorConfig,
    /// Expected length of histograms returned by the colour distribution model.
    pub histogram_bins: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("intermediate_representation"),
            method: Method::Grid,
            size: 256,
            patch_radius: 0,
            grid: GridSelectorConfig::default(),
            selective: BlobSelectorConfig::default(),
            histogram_bins: DEFAULT_BINS,
        }
    }
}

impl EncoderConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Mask side actually used; the global mode always works at 256.
    pub fn effective_size(&self) -> usize {
        match self.method {
            Method::Global => GLOBAL_INPUT_SIZE,
            _ => self.size,
        }
    }

    pub fn validate(&self) -> Result<()> {
        SparseColorMask::validate_size(self.effective_size())?;
        if self.patch_radius > MAX_PATCH_RADIUS {
            return Err(HintError::PatchRadiusTooLarge {
                radius: self.patch_radius,
            });
        }
        if self.histogram_bins > MAX_BINS {
            return Err(HintError::HistogramTooLong {
                len: self.histogram_bins,
                max: MAX_BINS,
            });
        }
        if self.selective.round_to == 0 {
            return Err(HintError::invalid("selective.round_to", 0));
        }
        Ok(())
    }

    pub fn grid_config(&self, exclude: bool) -> GridSelectorConfig {
        GridSelectorConfig {
            size: self.effective_size(),
            patch_radius: self.patch_radius,
            exclude,
            ..self.grid.clone()
        }
    }

    pub fn selective_config(&self, supplemental_points: bool) -> BlobSelectorConfig {
        BlobSelectorConfig {
            size: self.effective_size(),
            patch_radius: self.patch_radius,
            supplemental_points,
            ..self.selective.clone()
        }
    }
}

/// Produces a global colour histogram for an image, e.g. a trained network.
pub trait ColorDistributionModel: Send + Sync {
    /// `rgb` has already been resized to `GLOBAL_INPUT_SIZE` square.
    fn distribution(&self, rgb: &RgbImage) -> Result<GlobalHistogram>;
}

/// Everything one `encode` call wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeReport {
    pub gray_path: PathBuf,
    /// Masks and histograms, in the order they were written.
    pub sidecars: Vec<PathBuf>,
    /// Active mask cells over all masks written.
    pub hint_cells: usize,
}

/// Encodes single images into a gray rendition plus colour sidecars.
pub struct HintEncoder {
    config: EncoderConfig,
    model: Option<Box<dyn ColorDistributionModel>>,
}

impl HintEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config, model: None }
    }

    pub fn with_model(mut self, model: Box<dyn ColorDistributionModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    pub fn encode(&self, image_path: impl AsRef<Path>) -> Result<EncodeReport> {
        let image_path = image_path.as_ref();
        let span = info_span!("encode", image = %image_path.display(), method = %self.config.method);
        let _guard = span.enter();

        self.config.validate()?;
        if self.config.method == Method::Global && self.model.is_none() {
            return Err(HintError::MissingModel {
                method: self.config.method.to_string(),
            });
        }

        let decoded = image::open(image_path)?;
        fs::create_dir_all(&self.config.output_dir)?;
        let gray_path = self.config.output_dir.join(sidecar::gray_filename(image_path));
        decoded.to_luma8().save(&gray_path)?;
        debug!(path = %gray_path.display(), "gray rendition written");

        let rgb = decoded.to_rgb8();
        let mut report = EncodeReport {
            gray_path,
            sidecars: Vec::new(),
            hint_cells: 0,
        };

        match self.config.method {
            Method::Grid => {
                let mask = GridPointSelector::new(self.config.grid_config(false)).select(&rgb)?;
                self.write_mask(&mask, image_path, "", &mut report)?;
            }
            Method::GridExclude => {
                let mask = GridPointSelector::new(self.config.grid_config(true)).select(&rgb)?;
                self.write_mask(&mask, image_path, "", &mut report)?;
            }
            Method::Selective => {
                let mask = BlobSelector::new(self.config.selective_config(true)).select(&rgb)?;
                self.write_mask(&mask, image_path, "", &mut report)?;
            }
            Method::GridSelective => {
                let grid = GridPointSelector::new(self.config.grid_config(false)).select(&rgb)?;
                self.write_mask(&grid, image_path, GRID_TAG, &mut report)?;
                let selective = BlobSelector::new(self.config.selective_config(false)).select(&rgb)?;
                self.write_mask(&selective, image_path, SELECTIVE_TAG, &mut report)?;
            }
            Method::Global => {
                let path = self.write_histogram(&rgb, image_path)?;
                report.sidecars.push(path);
            }
            Method::Stock => {}
        }

        info!(
            sidecars = report.sidecars.len(),
            hint_cells = report.hint_cells,
            "image encoded"
        );
        Ok(report)
    }

    fn write_mask(&self, mask: &SparseColorMask, image_path: &Path, tag: &str, report: &mut EncodeReport) -> Result<()> {
        let path = self.config.output_dir.join(sidecar::mask_filename(image_path, tag));
        let bytes = mask.save(&path)?;
        debug!(path = %path.display(), bytes, cells = mask.active_count(), "mask written");
        report.hint_cells += mask.active_count();
        report.sidecars.push(path);
        Ok(())
    }

    fn write_histogram(&self, rgb: &RgbImage, image_path: &Path) -> Result<PathBuf> {
        let model = self.model.as_ref().ok_or_else(|| HintError::MissingModel {
            method: Method::Global.to_string(),
        })?;
        let side = GLOBAL_INPUT_SIZE as u32;
        let resized = imageops::resize(rgb, side, side, FilterType::Triangle);
        let histogram = model.distribution(&resized)?;
        if histogram.len() != self.config.histogram_bins {
            return Err(HintError::invalid("histogram length", histogram.len()));
        }

        let name = image_path.file_name().map(PathBuf::from).unwrap_or_default();
        let path = sidecar::glob_dist_path(self.config.output_dir.join(name));
        let records = histogram.encode(&path)?;
        debug!(path = %path.display(), records, "histogram written");
        Ok(path)
    }
}

// THEORY:
// This file is the main entry point for the `color_hints` library crate.
// It exposes the sparse colour-hint encoder: a grayscale image travels on its own,
// and a small sidecar file carries just enough chrominance for a colouriser to
// restore the original colours.
//
// The high-level interface is the `HintEncoder` (one image) and the `BatchEncoder`
// (many images in parallel) together with their configuration. The building
// blocks in `core_modules` stay public so the mask codec, the two point selectors
// and the histogram codec can be used on their own.

pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;

pub use core_modules::blob_selector::{BlobSelector, BlobSelectorConfig};
pub use core_modules::global_histogram::GlobalHistogram;
pub use core_modules::grid_selector::{GridPointSelector, GridSelectorConfig, Jitter};
pub use core_modules::sparse_mask::{AbValue, ColorSample, SparseColorMask};
pub use error::{HintError, Result};
pub use parallel_pipeline::BatchEncoder;
pub use pipeline::{ColorDistributionModel, EncodeReport, EncoderConfig, HintEncoder, Method};

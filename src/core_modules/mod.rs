pub mod blob_detector;
pub mod blob_selector;
pub mod color_blob;
pub mod coordinate;
pub mod filters;
pub mod global_histogram;
pub mod grid_selector;
pub mod kmeans;
pub mod lab_image;
pub mod sidecar;
pub mod sparse_mask;

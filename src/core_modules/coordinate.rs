// THEORY:
// The mask and the source image live on two different integer grids: the mask is
// always a `size x size` square, while the image keeps its native height and width.
// Every hint crosses between them exactly once, so the mapping is kept here as a
// pair of pure functions.
//
// The scaling truncates. It is NOT its own inverse: mapping a coordinate forward and
// back can land on a neighbouring cell, and callers must not rely on a round trip.

/// Scales `value` from a grid of `src_extent` cells onto a grid of `dst_extent`
/// cells: `floor(value * dst_extent / src_extent)`.
///
/// Integer arithmetic keeps the floor exact. A zero source extent maps to 0.
pub fn map_extent(src_extent: usize, dst_extent: usize, value: usize) -> usize {
    if src_extent == 0 {
        return 0;
    }
    ((value as u128 * dst_extent as u128) / src_extent as u128) as usize
}

/// Image-space `(row, col)` of an `height x width` image into a square mask of side `size`.
pub fn image_to_mask(height: usize, width: usize, row: usize, col: usize, size: usize) -> (usize, usize) {
    (map_extent(height, size, row), map_extent(width, size, col))
}

/// Mask-space `(row, col)` into an `height x width` image.
pub fn mask_to_image(height: usize, width: usize, row: usize, col: usize, size: usize) -> (usize, usize) {
    (map_extent(size, height, row), map_extent(size, width, col))
}

// THEORY:
// The `BlobDetector` is the segmentation engine behind content-adaptive hint
// selection. It turns smoothed chrominance into a quantised colour-id plane and
// then splits that plane into connected regions of identical id ("blobs").
//
// Key architectural principles & algorithm steps:
// 1.  **Quantisation**: both chrominance channels are rounded to a coarse step and
//     shifted non-negative, then fused into one id: `a' * 1000 + b'`. Two pixels
//     share an id exactly when their quantised `(a, b)` pairs match.
// 2.  **Connected Components**: a single raster scan unions every pixel with its
//     already-visited neighbours of the same id (4- or 8-connectivity) in a
//     disjoint-set forest. One pass plus path compression keeps it linear in
//     practice, with no recursion depth to worry about on large planes.
// 3.  **Stable Ordering**: blobs are numbered by (colour id, first pixel in scan
//     order). Two disjoint regions of one colour always get distinct ids, and the
//     same plane always produces the same numbering.
// 4.  **Stateless Utility**: like the rest of the per-image stages, detection keeps
//     no memory between calls.

use crate::core_modules::color_blob::{ColorBlob, Point};
use crate::core_modules::filters::round_to_step;
use serde::{Deserialize, Serialize};

/// Offset that makes rounded chrominance non-negative before ids are fused.
pub const ID_OFFSET: i64 = 100;
/// Multiplier separating the `a` and `b` parts of a colour id.
pub const ID_STRIDE: i64 = 1000;

/// Which neighbours count as adjacent during labelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Connectivity {
    Four,
    #[default]
    Eight,
}

impl Connectivity {
    /// Offsets `(dy, dx)` of the neighbours already visited by a raster scan.
    fn visited_offsets(self) -> &'static [(isize, isize)] {
        match self {
            Connectivity::Four => &[(0, -1), (-1, 0)],
            Connectivity::Eight => &[(0, -1), (-1, -1), (-1, 0), (-1, 1)],
        }
    }
}

/// Result of labelling one plane.
#[derive(Debug, Clone)]
pub struct BlobLabels {
    pub width: usize,
    pub height: usize,
    /// Blob id of every pixel, row-major.
    pub labels: Vec<u32>,
    /// Blobs indexed by their id.
    pub blobs: Vec<ColorBlob>,
}

pub mod blob_detector {
    use super::*;

    /// Fuses two chrominance planes into colour ids.
    ///
    /// Each channel is rounded half-to-even to a multiple of `round_to` and shifted
    /// by 100; the id is `a' * 1000 + b'`. Anything still negative after the shift
    /// is clamped to 0.
    pub fn quantize_ab(a: &[i32], b: &[i32], round_to: u32) -> Vec<u32> {
        let step = round_to as f64;
        let channel = |v: i32| (round_to_step(v as f64, step) as i64 + ID_OFFSET).max(0);
        a.iter()
            .zip(b)
            .map(|(&a, &b)| (channel(a) * ID_STRIDE + channel(b)).clamp(0, u32::MAX as i64) as u32)
            .collect()
    }

    /// Splits an id plane into connected regions of equal id.
    pub fn label_blobs(ids: &[u32], width: usize, height: usize, connectivity: Connectivity) -> BlobLabels {
        let n = (width * height).min(ids.len());
        let mut forest = DisjointSet::new(n);

        // --- 1. Union Pass ---
        // Every pixel is joined with the visited neighbours that carry its id.
        for y in 0..height {
            for x in 0..width {
                let i = y * width + x;
                if i >= n {
                    break;
                }
                for &(dy, dx) in connectivity.visited_offsets() {
                    let ny = y as isize + dy;
                    let nx = x as isize + dx;
                    if ny < 0 || nx < 0 || nx >= width as isize {
                        continue;
                    }
                    let j = ny as usize * width + nx as usize;
                    if ids[j] == ids[i] {
                        forest.union(i, j);
                    }
                }
            }
        }

        // --- 2. Grouping ---
        // Groups are discovered in scan order, so a group's first pixel is the first
        // pixel of its region and its pixel list comes out in scan order too.
        let mut group_of_root = vec![usize::MAX; n];
        let mut group_of_pixel = vec![0usize; n];
        let mut groups: Vec<(u32, usize, Vec<Point>)> = Vec::new();
        for i in 0..n {
            let root = forest.find(i);
            if group_of_root[root] == usize::MAX {
                group_of_root[root] = groups.len();
                groups.push((ids[i], i, Vec::new()));
            }
            let g = group_of_root[root];
            group_of_pixel[i] = g;
            groups[g].2.push(Point::new(i / width, i % width));
        }

        // --- 3. Ordering ---
        let mut order: Vec<usize> = (0..groups.len()).collect();
        order.sort_by_key(|&g| (groups[g].0, groups[g].1));
        let mut id_of_group = vec![0u32; groups.len()];
        for (id, &g) in order.iter().enumerate() {
            id_of_group[g] = id as u32;
        }

        let labels = group_of_pixel.iter().map(|&g| id_of_group[g]).collect();
        let mut slots: Vec<Option<(u32, usize, Vec<Point>)>> = groups.into_iter().map(Some).collect();
        let blobs = order
            .iter()
            .enumerate()
            .filter_map(|(id, &g)| {
                slots[g]
                    .take()
                    .map(|(color_id, _, pixels)| ColorBlob::new(id as u32, color_id, pixels))
            })
            .collect();

        BlobLabels {
            width,
            height,
            labels,
            blobs,
        }
    }
}

/// Disjoint-set forest with path halving and union by size.
struct DisjointSet {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let (mut ra, mut rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        if self.size[ra] < self.size[rb] {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb] = ra;
        self.size[ra] += self.size[rb];
    }
}

#[cfg(test)]
mod tests {
    use super::blob_detector::{label_blobs, quantize_ab};
    use super::*;

    fn plane(rows: &[&str]) -> (Vec<u32>, usize, usize) {
        let width = rows[0].len();
        let ids = rows
            .iter()
            .flat_map(|r| r.bytes().map(|c| (c - b'0') as u32))
            .collect();
        (ids, width, rows.len())
    }

    #[test]
    fn quantisation_fuses_rounded_channels() {
        let ids = quantize_ab(&[0, 14, 15, -100, 26], &[0, -6, 25, 3, -100], 10);
        assert_eq!(ids, vec![100_100, 110_090, 120_120, 100, 130_000]);
    }

    #[test]
    fn every_pixel_belongs_to_exactly_one_blob() {
        let (ids, w, h) = plane(&["1122", "1122", "3333"]);
        let result = label_blobs(&ids, w, h, Connectivity::Eight);
        let total: usize = result.blobs.iter().map(|b| b.len()).sum();
        assert_eq!(total, w * h);
        for blob in &result.blobs {
            for p in &blob.pixels {
                assert_eq!(result.labels[p.row * w + p.col], blob.id);
                assert_eq!(ids[p.row * w + p.col], blob.color_id);
            }
        }
    }

    #[test]
    fn disjoint_regions_of_one_colour_get_distinct_ids() {
        let (ids, w, h) = plane(&["101", "101", "101"]);
        let result = label_blobs(&ids, w, h, Connectivity::Eight);
        assert_eq!(result.blobs.len(), 3);
        // Ordered by colour first, then by first pixel in scan order.
        let summary: Vec<(u32, u32, Point)> = result.blobs.iter().map(|b| (b.id, b.color_id, b.pixels[0])).collect();
        assert_eq!(
            summary,
            vec![(0, 0, Point::new(0, 1)), (1, 1, Point::new(0, 0)), (2, 1, Point::new(0, 2))]
        );
    }

    #[test]
    fn diagonal_touch_depends_on_connectivity() {
        let (ids, w, h) = plane(&["10", "01"]);
        assert_eq!(label_blobs(&ids, w, h, Connectivity::Eight).blobs.len(), 2);
        assert_eq!(label_blobs(&ids, w, h, Connectivity::Four).blobs.len(), 4);
    }

    #[test]
    fn u_shape_merges_into_one_blob() {
        let (ids, w, h) = plane(&["10001", "10001", "11111"]);
        let result = label_blobs(&ids, w, h, Connectivity::Four);
        assert_eq!(result.blobs.len(), 2);
        let ones = result.blobs.iter().find(|b| b.color_id == 1).unwrap();
        assert_eq!(ones.len(), 9);
        assert_eq!(ones.pixels[0], Point::new(0, 0));
        assert_eq!(ones.bounding_box, (Point::new(0, 0), Point::new(2, 4)));
    }

    #[test]
    fn empty_plane_has_no_blobs() {
        let result = label_blobs(&[], 0, 0, Connectivity::Eight);
        assert!(result.blobs.is_empty());
        assert!(result.labels.is_empty());
    }
}

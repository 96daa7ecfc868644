// THEORY:
// A `ColorBlob` is one maximal connected region of pixels that share a single
// quantised colour id. It is the unit the content-adaptive selector reasons about:
// every blob large enough to matter contributes one hint near its middle, and very
// large blobs contribute a few more spread over their area.
//
// Key architectural principles:
// 1.  **Stateless Data Container**: like the rest of the segmentation output, a blob
//     is produced for one image and thrown away afterwards. It is never persisted.
// 2.  **Mean first, member as fallback**: the centroid is the rounded mean position
//     when it passes the membership test, and otherwise the member pixel nearest
//     to that mean.
// 3.  **Reproducible supplements**: extra points for big blobs are drawn with a
//     generator seeded by the sample index, so the same blob always yields the same
//     extra points.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A pixel position on a 2D plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Point {
    pub row: usize,
    pub col: usize,
}

impl Point {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// A connected region of one quantised colour.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorBlob {
    /// Unique per image; ordered by (colour id, first pixel in scan order).
    pub id: u32,
    /// The combined quantised `(a, b)` id every member shares.
    pub color_id: u32,
    /// Member pixels in row-major scan order.
    pub pixels: Vec<Point>,
    /// Top-left and bottom-right corners (inclusive).
    pub bounding_box: (Point, Point),
}

impl ColorBlob {
    pub fn new(id: u32, color_id: u32, pixels: Vec<Point>) -> Self {
        let mut min = Point::new(usize::MAX, usize::MAX);
        let mut max = Point::new(0, 0);
        for p in &pixels {
            min.row = min.row.min(p.row);
            min.col = min.col.min(p.col);
            max.row = max.row.max(p.row);
            max.col = max.col.max(p.col);
        }
        Self {
            id,
            color_id,
            pixels,
            bounding_box: (min, max),
        }
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Arithmetic mean of the member positions, each axis rounded half to even.
    pub fn mean_position(&self) -> Option<Point> {
        if self.pixels.is_empty() {
            return None;
        }
        let n = self.pixels.len() as f64;
        let (sum_row, sum_col) = self
            .pixels
            .iter()
            .fold((0u64, 0u64), |(r, c), p| (r + p.row as u64, c + p.col as u64));
        Some(Point::new(
            (sum_row as f64 / n).round_ties_even() as usize,
            (sum_col as f64 / n).round_ties_even() as usize,
        ))
    }

    /// Accepts the rounded mean when it passes the membership test, otherwise snaps
    /// to the member pixel closest to it (first in scan order on ties).
    ///
    /// The default test only checks that the mean row occurs among the member rows
    /// and the mean column among the member columns, independently. That can accept
    /// a mean lying outside a non-convex blob. `strict` requires the exact pixel
    /// to be a member instead.
    pub fn centroid(&self, strict: bool) -> Option<Point> {
        let mean = self.mean_position()?;
        let accepted = if strict {
            self.pixels.contains(&mean)
        } else {
            self.pixels.iter().any(|p| p.row == mean.row) && self.pixels.iter().any(|p| p.col == mean.col)
        };
        if accepted {
            return Some(mean);
        }

        let mut closest = None;
        let mut best = f64::INFINITY;
        for p in &self.pixels {
            let dr = p.row as f64 - mean.row as f64;
            let dc = p.col as f64 - mean.col as f64;
            let distance = (dr * dr + dc * dc).sqrt();
            if distance < best {
                best = distance;
                closest = Some(*p);
            }
        }
        closest
    }

    /// How many extra points a blob of this size earns: `len / threshold` below
    /// three thresholds, `round(log10(len))` from there on, none below one threshold.
    pub fn supplemental_count(&self, threshold: usize) -> usize {
        let n = self.pixels.len();
        if threshold == 0 || n < threshold {
            return 0;
        }
        if n < threshold * 3 {
            n / threshold
        } else {
            (n as f64).log10().round_ties_even() as usize
        }
    }

    /// Extra member pixels for large blobs. Sample `i` is drawn with a generator
    /// seeded with `i`.
    pub fn supplemental_points(&self, threshold: usize) -> Vec<Point> {
        let n = self.pixels.len();
        (0..self.supplemental_count(threshold))
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(i as u64);
                self.pixels[rng.gen_range(0..n)]
            })
            .collect()
    }
}

// THEORY:
// Optional palette reduction of one chrominance channel. With `k > 0` every value
// of the plane is replaced by the centre of its k-means cluster, so a hint can only
// carry one of `k` levels per channel.
//
// Key architectural principles:
// 1.  **Histogram, not pixels**: values are truncated onto the 0..=255 byte range
//     (shifted by +100 when the plane has negative values) and counted once. The
//     clustering then runs over at most 256 weighted points, whatever the image size.
// 2.  **Seeded k-means++**: initial centres are drawn with a `StdRng` seeded from a
//     caller-supplied value, so the same plane always quantises the same way.
// 3.  **Integer output**: centres are truncated to integers and shifted back, the
//     same way the plane entered.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Seed used by the selectors, so an image always gets the same palette.
pub const KMEANS_SEED: u64 = 0;

/// Offset applied to planes holding negative values before they are binned.
const NEGATIVE_SHIFT: f32 = 100.0;
/// Centre movement below which Lloyd iterations stop.
const CONVERGENCE_THRESHOLD: f64 = 0.01;
const MAX_ITER: usize = 64;
const LEVELS: usize = 256;

/// Replaces every value of `plane` by the truncated centre of its cluster.
/// `k == 0` returns the plane unchanged.
pub fn quantize_channel(plane: &[f32], k: usize, seed: u64) -> Vec<f32> {
    if k == 0 || plane.is_empty() {
        return plane.to_vec();
    }
    let shift = if plane.iter().any(|&v| v < 0.0) { NEGATIVE_SHIFT } else { 0.0 };
    let bin = |v: f32| (v + shift).clamp(0.0, (LEVELS - 1) as f32) as usize;

    let mut counts = [0u64; LEVELS];
    for &v in plane {
        counts[bin(v)] += 1;
    }

    let centres = cluster(&counts, k, seed);
    let mut lookup = [0.0f32; LEVELS];
    for (level, slot) in lookup.iter_mut().enumerate() {
        if counts[level] > 0 {
            *slot = centres[nearest(&centres, level as f64)].trunc() as f32 - shift;
        }
    }
    plane.iter().map(|&v| lookup[bin(v)]).collect()
}

fn nearest(centres: &[f64], value: f64) -> usize {
    let mut best = 0;
    for (i, &c) in centres.iter().enumerate() {
        if (c - value).abs() < (centres[best] - value).abs() {
            best = i;
        }
    }
    best
}

/// Weighted 1D k-means over byte levels.
fn cluster(counts: &[u64; LEVELS], k: usize, seed: u64) -> Vec<f64> {
    let occupied: Vec<usize> = (0..LEVELS).filter(|&l| counts[l] > 0).collect();
    let k = k.min(occupied.len());
    let mut rng = StdRng::seed_from_u64(seed);

    // --- 1. k-means++ seeding ---
    let total: u64 = occupied.iter().map(|&l| counts[l]).sum();
    let mut pick = rng.gen_range(0..total);
    let mut centres = Vec::with_capacity(k);
    for &l in &occupied {
        if pick < counts[l] {
            centres.push(l as f64);
            break;
        }
        pick -= counts[l];
    }
    while centres.len() < k {
        let weights: Vec<f64> = occupied
            .iter()
            .map(|&l| {
                let d = centres[nearest(&centres, l as f64)] - l as f64;
                d * d * counts[l] as f64
            })
            .collect();
        let sum: f64 = weights.iter().sum();
        if sum <= 0.0 {
            break;
        }
        let mut target = rng.gen_range(0.0..sum);
        let mut chosen = occupied[occupied.len() - 1];
        for (&l, &w) in occupied.iter().zip(&weights) {
            if w > 0.0 && target < w {
                chosen = l;
                break;
            }
            target -= w;
        }
        centres.push(chosen as f64);
    }

    // --- 2. Lloyd iterations ---
    for _ in 0..MAX_ITER {
        let mut sums = vec![0.0f64; centres.len()];
        let mut weights = vec![0u64; centres.len()];
        for &l in &occupied {
            let c = nearest(&centres, l as f64);
            sums[c] += l as f64 * counts[l] as f64;
            weights[c] += counts[l];
        }
        let mut moved = 0.0f64;
        for (i, centre) in centres.iter_mut().enumerate() {
            if weights[i] > 0 {
                let updated = sums[i] / weights[i] as f64;
                moved = moved.max((updated - *centre).abs());
                *centre = updated;
            }
        }
        if moved < CONVERGENCE_THRESHOLD {
            break;
        }
    }
    centres
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn distinct(plane: &[f32]) -> BTreeSet<i32> {
        plane.iter().map(|&v| v as i32).collect()
    }

    #[test]
    fn zero_clusters_is_identity() {
        let plane = vec![-12.7, 3.5, 40.0];
        assert_eq!(quantize_channel(&plane, 0, 1), plane);
    }

    #[test]
    fn two_clusters_collapse_a_gradient() {
        let plane: Vec<f32> = (0..100).map(|v| v as f32).collect();
        let out = quantize_channel(&plane, 2, 42);
        let levels = distinct(&out);
        assert_eq!(levels.len(), 2, "{levels:?}");
        // Low and high halves end up on different sides.
        assert!(out[0] < out[99]);
        assert!(out[..40].iter().all(|&v| v == out[0]));
        assert!(out[60..].iter().all(|&v| v == out[99]));
    }

    #[test]
    fn negative_planes_are_shifted_and_restored() {
        let plane: Vec<f32> = (0..60).map(|i| if i < 30 { -40.0 } else { 25.0 }).collect();
        let out = quantize_channel(&plane, 2, 7);
        assert_eq!(out, plane);
    }

    #[test]
    fn more_clusters_than_levels_keeps_values() {
        let plane = vec![10.0, 10.0, 20.0, 30.0];
        assert_eq!(quantize_channel(&plane, 8, 3), plane);
    }

    #[test]
    fn same_seed_same_result() {
        let plane: Vec<f32> = (0..500).map(|i| ((i * 37) % 200) as f32 - 100.0).collect();
        assert_eq!(quantize_channel(&plane, 5, 9), quantize_channel(&plane, 5, 9));
        assert!(distinct(&quantize_channel(&plane, 5, 9)).len() <= 5);
    }
}

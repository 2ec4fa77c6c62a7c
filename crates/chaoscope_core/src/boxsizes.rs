use crate::error::AnalysisError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Nearest-neighbour lookup over an indexed point set.
///
/// `exclusion` is a Theiler window: candidate indices within `exclusion` of
/// the query index are skipped, so 0 excludes only the query point itself.
pub trait NearestNeighbors {
    /// Number of indexed points.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Up to `n` nearest neighbours of the point at `query`, as
    /// (index, distance) pairs ordered by increasing distance.
    fn knn(&self, query: usize, n: usize, exclusion: usize) -> Vec<(usize, f64)>;
}

/// Exhaustive-scan nearest neighbours under the Euclidean metric.
pub struct BruteForceNeighbors<'a> {
    points: &'a [Vec<f64>],
}

impl<'a> BruteForceNeighbors<'a> {
    pub fn new(points: &'a [Vec<f64>]) -> Self {
        Self { points }
    }
}

impl NearestNeighbors for BruteForceNeighbors<'_> {
    fn len(&self) -> usize {
        self.points.len()
    }

    fn knn(&self, query: usize, n: usize, exclusion: usize) -> Vec<(usize, f64)> {
        let mut candidates: Vec<(usize, f64)> = self
            .points
            .iter()
            .enumerate()
            .filter(|(i, _)| i.abs_diff(query) > exclusion)
            .map(|(i, p)| (i, euclidean(&self.points[query], p)))
            .collect();
        candidates.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        candidates.truncate(n);
        candidates
    }
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(p, q)| (p - q) * (p - q))
        .sum::<f64>()
        .sqrt()
}

/// Smallest nearest-neighbour distance over every query point, skipping
/// indices within `theiler` of each query.
pub fn minimum_pairwise_distance(neighbors: &impl NearestNeighbors, theiler: usize) -> Result<f64> {
    let mut min_d = f64::INFINITY;
    for i in 0..neighbors.len() {
        if let Some(&(_, d)) = neighbors.knn(i, 1, theiler).first() {
            min_d = min_d.min(d);
        }
    }
    if !min_d.is_finite() {
        return Err(AnalysisError::InvalidArgument(
            "No neighbour pairs admissible under the exclusion window.".into(),
        )
        .into());
    }
    Ok(min_d)
}

/// Settings for [`estimate_boxsizes`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoxsizeSettings {
    /// Number of sizes to produce.
    pub k: usize,
    /// Offset added to the log-lower bound.
    pub w: f64,
    /// Offset added to the log-upper bound.
    pub z: f64,
    /// Logarithm base for the geometric spacing.
    pub base: f64,
}

impl Default for BoxsizeSettings {
    fn default() -> Self {
        Self {
            k: 20,
            w: 1.0,
            z: -1.0,
            base: std::f64::consts::E,
        }
    }
}

/// Geometrically spaced box sizes for box-counting analyses of `points`.
///
/// The scale range runs from the smallest pairwise distance up to the
/// bounding-box diagonal, offset by `w`/`z` in log space.
pub fn estimate_boxsizes(points: &[Vec<f64>], settings: BoxsizeSettings) -> Result<Vec<f64>> {
    if settings.k == 0 {
        return Err(AnalysisError::InvalidArgument(
            "At least one box size must be requested.".into(),
        )
        .into());
    }
    if !(settings.base > 1.0) {
        return Err(
            AnalysisError::InvalidArgument("Logarithm base must exceed 1.".into()).into(),
        );
    }
    if points.len() < 2 {
        return Err(AnalysisError::InvalidArgument(format!(
            "Box size estimation needs at least 2 points, got {}.",
            points.len()
        ))
        .into());
    }
    let dim = points[0].len();
    if dim == 0 || points.iter().any(|p| p.len() != dim) {
        return Err(AnalysisError::InvalidArgument(
            "All points must share one positive dimension.".into(),
        )
        .into());
    }

    let neighbors = BruteForceNeighbors::new(points);
    let min_d = minimum_pairwise_distance(&neighbors, 0)?;

    let mut mins = points[0].clone();
    let mut maxs = points[0].clone();
    for p in points.iter().skip(1) {
        for d in 0..dim {
            mins[d] = mins[d].min(p[d]);
            maxs[d] = maxs[d].max(p[d]);
        }
    }
    // Bounding-box diagonal. Deliberately not the largest single-axis
    // extent: the two differ on anisotropic clouds and the diagonal is the
    // documented upper scale.
    let max_d = mins
        .iter()
        .zip(&maxs)
        .map(|(lo, hi)| (hi - lo) * (hi - lo))
        .sum::<f64>()
        .sqrt();

    if !(min_d > 0.0) || !min_d.is_finite() {
        return Err(AnalysisError::DegenerateScales { min_d, max_d }.into());
    }
    let lower = min_d.log(settings.base);
    let upper = max_d.log(settings.base);
    if lower >= upper {
        return Err(AnalysisError::DegenerateScales { min_d, max_d }.into());
    }

    let mut lo = lower + settings.w;
    let mut hi = upper + settings.z;
    if lo >= hi {
        warn!(
            lower,
            upper,
            w = settings.w,
            z = settings.z,
            "scale offsets collapse the box size range; falling back to the raw extremes"
        );
        lo = lower;
        hi = upper;
    }

    let mut sizes = Vec::with_capacity(settings.k);
    if settings.k == 1 {
        sizes.push(settings.base.powf(lo));
    } else {
        let step = (hi - lo) / (settings.k - 1) as f64;
        for i in 0..settings.k {
            sizes.push(settings.base.powf(lo + step * i as f64));
        }
    }
    Ok(sizes)
}

#[cfg(test)]
mod tests {
    use super::{
        estimate_boxsizes, minimum_pairwise_distance, BoxsizeSettings, BruteForceNeighbors,
        NearestNeighbors,
    };
    use crate::error::AnalysisError;

    fn line_points(xs: &[f64]) -> Vec<Vec<f64>> {
        xs.iter().map(|&x| vec![x, 0.0]).collect()
    }

    #[test]
    fn brute_force_knn_respects_the_exclusion_window() {
        let points = line_points(&[0.0, 1.0, 2.0, 3.0, 4.0]);
        let neighbors = BruteForceNeighbors::new(&points);

        let hits = neighbors.knn(2, 2, 0);
        assert_eq!(hits.len(), 2);
        assert!((hits[0].1 - 1.0).abs() < 1e-12);

        // Theiler window 1 skips the immediate index neighbours.
        let hits = neighbors.knn(2, 2, 1);
        assert!(hits.iter().all(|&(i, _)| i == 0 || i == 4));
        assert!((hits[0].1 - 2.0).abs() < 1e-12);
    }

    #[test]
    fn minimum_pairwise_distance_finds_the_closest_pair() {
        let points = line_points(&[0.0, 0.25, 4.0, 10.0]);
        let neighbors = BruteForceNeighbors::new(&points);
        let min_d = minimum_pairwise_distance(&neighbors, 0).expect("pairs exist");
        assert!((min_d - 0.25).abs() < 1e-12);
    }

    #[test]
    fn boxsizes_are_strictly_increasing_with_requested_length() {
        let points = line_points(&[0.0, 0.01, 1.0, 10.0, 100.0]);
        let sizes =
            estimate_boxsizes(&points, BoxsizeSettings::default()).expect("should estimate");
        assert_eq!(sizes.len(), 20);
        assert!(sizes.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn boxsizes_use_the_bounding_box_diagonal() {
        // Axis ranges (3, 4): the diagonal is 5, the largest axis only 4.
        let points = vec![vec![0.0, 0.0], vec![0.0, 1.0], vec![3.0, 4.0]];
        let settings = BoxsizeSettings {
            k: 5,
            w: 0.0,
            z: 0.0,
            ..BoxsizeSettings::default()
        };
        let sizes = estimate_boxsizes(&points, settings).expect("should estimate");
        assert!((sizes[0] - 1.0).abs() < 1e-9);
        assert!((sizes[4] - 5.0).abs() < 1e-9);
    }

    #[test]
    fn collapsed_offsets_fall_back_to_the_raw_range() {
        // A 5x5 unit grid spans less than two log units, so the default
        // w/z offsets cross over.
        let mut points = Vec::new();
        for i in 0..5 {
            for j in 0..5 {
                points.push(vec![i as f64, j as f64]);
            }
        }
        let sizes =
            estimate_boxsizes(&points, BoxsizeSettings::default()).expect("should estimate");
        assert_eq!(sizes.len(), 20);
        assert!(sizes.windows(2).all(|w| w[1] > w[0]));
        assert!((sizes[0] - 1.0).abs() < 1e-9);
        assert!((sizes[19] - 32.0_f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn duplicate_points_are_a_range_error() {
        let points = vec![vec![1.0, 1.0], vec![1.0, 1.0], vec![2.0, 2.0]];
        let err = estimate_boxsizes(&points, BoxsizeSettings::default())
            .expect_err("duplicates must fail");
        assert!(matches!(
            err.downcast_ref::<AnalysisError>(),
            Some(AnalysisError::DegenerateScales { .. })
        ));
    }

    #[test]
    fn a_single_point_is_rejected() {
        let err = estimate_boxsizes(&[vec![1.0, 1.0]], BoxsizeSettings::default())
            .expect_err("single point must fail");
        assert!(matches!(
            err.downcast_ref::<AnalysisError>(),
            Some(AnalysisError::InvalidArgument(_))
        ));
    }
}

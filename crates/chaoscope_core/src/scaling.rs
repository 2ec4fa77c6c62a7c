use crate::error::AnalysisError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Ordinary least-squares fit of y = a + b*x. Returns (intercept, slope).
pub fn linreg(x: &[f64], y: &[f64]) -> Result<(f64, f64)> {
    if x.len() != y.len() {
        return Err(AnalysisError::SampleMismatch {
            x_len: x.len(),
            y_len: y.len(),
        }
        .into());
    }
    if x.len() < 2 {
        return Err(AnalysisError::InvalidArgument(format!(
            "Least squares needs at least 2 samples, got {}.",
            x.len()
        ))
        .into());
    }

    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;
    let mut covariance = 0.0;
    let mut variance = 0.0;
    for (&xi, &yi) in x.iter().zip(y) {
        let dx = xi - mean_x;
        covariance += dx * (yi - mean_y);
        variance += dx * dx;
    }
    if variance == 0.0 {
        return Err(AnalysisError::ZeroVariance.into());
    }

    let slope = covariance / variance;
    Ok((mean_y - slope * mean_x, slope))
}

fn slope(x: &[f64], y: &[f64]) -> Result<f64> {
    linreg(x, y).map(|(_, b)| b)
}

/// Windowing strategy for [`linear_regions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionMethod {
    /// Disjoint windows advanced `dxi` samples at a time; a boundary is
    /// recorded where the window slope leaves the tolerance band of the
    /// current region.
    Sequential,
    /// Overlapping windows of width `dxi` advanced one sample at a time.
    Overlap,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RegionSettings {
    pub method: RegionMethod,
    /// Window stride in samples.
    pub dxi: usize,
    /// Relative slope tolerance for merging adjacent windows.
    pub tol: f64,
}

impl Default for RegionSettings {
    fn default() -> Self {
        Self {
            method: RegionMethod::Sequential,
            dxi: 1,
            tol: 0.25,
        }
    }
}

impl RegionSettings {
    pub fn overlap() -> Self {
        Self {
            method: RegionMethod::Overlap,
            dxi: 3,
            tol: 0.25,
        }
    }
}

/// Segmentation of a curve into spans of similar slope.
///
/// `boundaries` are inclusive indices into the input, starting at 0 and
/// ending at the last sample; `tangents[i]` is the least-squares slope over
/// `boundaries[i]..=boundaries[i + 1]`.
#[derive(Debug, Clone, Serialize)]
pub struct LinearRegions {
    pub boundaries: Vec<usize>,
    pub tangents: Vec<f64>,
}

pub fn linear_regions(x: &[f64], y: &[f64], settings: RegionSettings) -> Result<LinearRegions> {
    if x.len() != y.len() {
        return Err(AnalysisError::SampleMismatch {
            x_len: x.len(),
            y_len: y.len(),
        }
        .into());
    }
    if settings.dxi == 0 {
        return Err(
            AnalysisError::InvalidArgument("Window stride dxi must be at least 1.".into()).into(),
        );
    }
    if settings.tol < 0.0 {
        return Err(
            AnalysisError::InvalidArgument("Slope tolerance must be non-negative.".into()).into(),
        );
    }
    let needed = (2 * settings.dxi).max(2);
    if x.len() < needed {
        return Err(AnalysisError::InvalidArgument(format!(
            "Need at least {} samples for stride {}, got {}.",
            needed,
            settings.dxi,
            x.len()
        ))
        .into());
    }

    let boundaries = match settings.method {
        RegionMethod::Sequential => sequential_boundaries(x, y, settings.dxi, settings.tol)?,
        RegionMethod::Overlap => overlap_boundaries(x, y, settings.dxi, settings.tol)?,
    };

    // Re-fit each merged span; the coarse per-window slopes that discovered
    // the regions are too noisy to report.
    let mut tangents = Vec::with_capacity(boundaries.len() - 1);
    for pair in boundaries.windows(2) {
        tangents.push(slope(&x[pair[0]..=pair[1]], &y[pair[0]..=pair[1]])?);
    }

    Ok(LinearRegions {
        boundaries,
        tangents,
    })
}

fn sequential_boundaries(x: &[f64], y: &[f64], dxi: usize, tol: f64) -> Result<Vec<usize>> {
    let n = x.len();
    let maxit = n / dxi;

    let seed = dxi.max(2).min(n);
    let mut prev_tangent = slope(&x[..seed], &y[..seed])?;
    let mut boundaries = vec![0];

    for k in 1..maxit {
        let lo = k * dxi - 1;
        let hi = (k + 1) * dxi - 1;
        let tangent = slope(&x[lo..=hi], &y[lo..=hi])?;
        if (tangent - prev_tangent).abs() <= tol * prev_tangent.abs() {
            // Same region; keep comparing against the slope that opened it.
            continue;
        }
        boundaries.push(lo);
        prev_tangent = tangent;
    }

    boundaries.push(n - 1);
    Ok(boundaries)
}

fn overlap_boundaries(x: &[f64], y: &[f64], dxi: usize, tol: f64) -> Result<Vec<usize>> {
    let n = x.len();
    let last_start = n - 1 - dxi;
    let mut prev_tangent = slope(&x[..=dxi], &y[..=dxi])?;
    let mut boundaries = vec![0];

    for i in 1..=last_start {
        let tangent = slope(&x[i..=i + dxi], &y[i..=i + dxi])?;
        if (tangent - prev_tangent).abs() > tol * prev_tangent.abs() {
            let cut = i + dxi / 2;
            if cut > *boundaries.last().unwrap() && cut < n - 1 {
                boundaries.push(cut);
            }
            prev_tangent = tangent;
        }
    }

    boundaries.push(n - 1);
    Ok(boundaries)
}

/// Largest linear region of the curve and its slope.
///
/// With `ignore_saturation`, trailing samples where `y` stopped changing are
/// trimmed before segmentation. Returns the inclusive boundary pair and the
/// re-fit slope of the widest region (first one on ties).
pub fn linear_region(
    x: &[f64],
    y: &[f64],
    settings: RegionSettings,
    ignore_saturation: bool,
) -> Result<((usize, usize), f64)> {
    if x.len() != y.len() {
        return Err(AnalysisError::SampleMismatch {
            x_len: x.len(),
            y_len: y.len(),
        }
        .into());
    }

    let mut upto = y.len();
    if ignore_saturation && y.len() >= 2 {
        // Saturated tails repeat the same value bit-for-bit; keep one sample
        // of the flat run. No trim when y never changes.
        if let Some(i) = (1..y.len()).rev().find(|&i| y[i] != y[i - 1]) {
            upto = i + 1;
        }
    }
    let x = &x[..upto];
    let y = &y[..upto];

    let regions = linear_regions(x, y, settings)?;

    let mut best = 0usize;
    let mut best_span = 0usize;
    for (j, pair) in regions.boundaries.windows(2).enumerate() {
        let span = pair[1] - pair[0];
        if span > best_span {
            best_span = span;
            best = j;
        }
    }

    let (lo, hi) = (regions.boundaries[best], regions.boundaries[best + 1]);
    let full = x[x.len() - 1] - x[0];
    if (x[hi] - x[lo]).abs() <= full.abs() / 3.0 {
        warn!(
            region_extent = x[hi] - x[lo],
            total_extent = full,
            "largest linear region covers a third of the x-range or less; \
             the fitted slope may be unreliable"
        );
    }

    Ok(((lo, hi), regions.tangents[best]))
}

#[cfg(test)]
mod tests {
    use super::{linear_region, linear_regions, linreg, RegionSettings};
    use crate::error::AnalysisError;

    /// Piecewise-linear samples built from per-index increments.
    fn from_increments(n: usize, inc: impl Fn(usize) -> f64) -> (Vec<f64>, Vec<f64>) {
        let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let mut y = vec![0.0; n];
        for i in 1..n {
            y[i] = y[i - 1] + inc(i - 1);
        }
        (x, y)
    }

    #[test]
    fn linreg_recovers_an_exact_line() {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| -2.0 + 3.0 * v).collect();
        let (a, b) = linreg(&x, &y).expect("fit should succeed");
        assert!((a + 2.0).abs() < 1e-12);
        assert!((b - 3.0).abs() < 1e-12);
    }

    #[test]
    fn linreg_rejects_mismatched_lengths() {
        let err = linreg(&[1.0, 2.0, 3.0], &[1.0, 2.0]).expect_err("mismatch must fail");
        match err.downcast_ref::<AnalysisError>() {
            Some(AnalysisError::SampleMismatch { x_len, y_len }) => {
                assert_eq!((*x_len, *y_len), (3, 2));
            }
            other => panic!("expected SampleMismatch, got {other:?}"),
        }
    }

    #[test]
    fn linreg_rejects_zero_variance() {
        let err = linreg(&[2.0, 2.0, 2.0], &[1.0, 2.0, 3.0]).expect_err("flat x must fail");
        assert!(matches!(
            err.downcast_ref::<AnalysisError>(),
            Some(AnalysisError::ZeroVariance)
        ));
    }

    #[test]
    fn linreg_rejects_single_sample() {
        let err = linreg(&[1.0], &[1.0]).expect_err("single sample must fail");
        assert!(matches!(
            err.downcast_ref::<AnalysisError>(),
            Some(AnalysisError::InvalidArgument(_))
        ));
    }

    #[test]
    fn single_slope_yields_one_region() {
        let (x, y) = from_increments(50, |_| 2.0);
        let regions = linear_regions(&x, &y, RegionSettings::default()).expect("should segment");
        assert_eq!(regions.boundaries, vec![0, 49]);
        assert_eq!(regions.tangents.len(), 1);
        assert!((regions.tangents[0] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn two_slopes_split_at_the_break() {
        // Slope 1 up to index 49, slope 10 afterwards; dxi-aligned break.
        let (x, y) = from_increments(100, |i| if i < 49 { 1.0 } else { 10.0 });
        let settings = RegionSettings {
            dxi: 5,
            ..RegionSettings::default()
        };
        let regions = linear_regions(&x, &y, settings).expect("should segment");
        assert_eq!(regions.boundaries, vec![0, 49, 99]);
        assert!((regions.tangents[0] - 1.0).abs() < 1e-9);
        assert!((regions.tangents[1] - 10.0).abs() < 1e-9);
    }

    #[test]
    fn three_slopes_yield_three_regions() {
        let (x, y) = from_increments(120, |i| {
            if i < 39 {
                1.0
            } else if i < 79 {
                20.0
            } else {
                -5.0
            }
        });
        let settings = RegionSettings {
            dxi: 5,
            ..RegionSettings::default()
        };
        let regions = linear_regions(&x, &y, settings).expect("should segment");
        assert_eq!(regions.boundaries, vec![0, 39, 79, 119]);
        assert!((regions.tangents[0] - 1.0).abs() < 1e-9);
        assert!((regions.tangents[1] - 20.0).abs() < 1e-9);
        assert!((regions.tangents[2] + 5.0).abs() < 1e-9);
    }

    #[test]
    fn overlap_method_handles_a_single_slope() {
        let (x, y) = from_increments(30, |_| 3.0);
        let regions = linear_regions(&x, &y, RegionSettings::overlap()).expect("should segment");
        assert_eq!(regions.boundaries, vec![0, 29]);
        assert!((regions.tangents[0] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn linear_regions_validates_inputs() {
        let (x, y) = from_increments(10, |_| 1.0);

        let err = linear_regions(
            &x,
            &y,
            RegionSettings {
                dxi: 0,
                ..RegionSettings::default()
            },
        )
        .expect_err("zero stride must fail");
        assert!(matches!(
            err.downcast_ref::<AnalysisError>(),
            Some(AnalysisError::InvalidArgument(_))
        ));

        let err = linear_regions(
            &x,
            &y,
            RegionSettings {
                dxi: 6,
                ..RegionSettings::default()
            },
        )
        .expect_err("oversized stride must fail");
        assert!(matches!(
            err.downcast_ref::<AnalysisError>(),
            Some(AnalysisError::InvalidArgument(_))
        ));
    }

    #[test]
    fn largest_region_wins_with_first_occurrence_ties() {
        let (x, y) = from_increments(120, |i| {
            if i < 39 {
                1.0
            } else if i < 79 {
                20.0
            } else {
                -5.0
            }
        });
        let settings = RegionSettings {
            dxi: 5,
            ..RegionSettings::default()
        };
        // Spans are 39, 40, 40; the first span of width 40 must win.
        let ((lo, hi), tangent) = linear_region(&x, &y, settings, true).expect("should run");
        assert_eq!((lo, hi), (39, 79));
        assert!((tangent - 20.0).abs() < 1e-9);
    }

    #[test]
    fn saturated_tail_is_trimmed() {
        let (x, y) = from_increments(100, |i| if i < 60 { 2.0 } else { 0.0 });
        let ((lo, hi), tangent) =
            linear_region(&x, &y, RegionSettings::default(), true).expect("should run");
        assert_eq!((lo, hi), (0, 60));
        assert!((tangent - 2.0).abs() < 1e-9);
    }

    #[test]
    fn fully_flat_curve_is_left_untrimmed() {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let y = vec![5.0; 10];
        let ((lo, hi), tangent) =
            linear_region(&x, &y, RegionSettings::default(), true).expect("should run");
        assert_eq!((lo, hi), (0, 9));
        assert!(tangent.abs() < 1e-12);
    }
}

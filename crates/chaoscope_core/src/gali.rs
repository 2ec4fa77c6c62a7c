use crate::error::AnalysisError;
use crate::tangent::{ExtendedState, TangentIntegrator, TangentStepper};
use crate::traits::Linearized;
use anyhow::{bail, Result};
use nalgebra::linalg::{QR, SVD};
use nalgebra::DMatrix;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::Serialize;
use tracing::debug;

/// Configuration for a [`gali`] run.
#[derive(Debug, Clone)]
pub struct GaliSettings {
    /// Early-stop value: the run ends once GALI_k drops below this.
    pub threshold: f64,
    /// Time between renormalizations of the deviation vectors.
    pub dt: f64,
    /// Initial deviation vectors, shape (dimension, k). Random orthonormal
    /// columns are drawn when absent.
    pub w0: Option<DMatrix<f64>>,
}

impl Default for GaliSettings {
    fn default() -> Self {
        Self {
            threshold: 1e-12,
            dt: 1.0,
            w0: None,
        }
    }
}

/// Why a [`gali`] run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GaliStatus {
    /// GALI_k fell below the configured threshold.
    Converged,
    /// The run reached t0 + tmax with GALI_k still above the threshold.
    TimedOut,
}

#[derive(Debug, Clone, Serialize)]
pub struct GaliResult {
    pub gali: Vec<f64>,
    pub times: Vec<f64>,
    pub status: GaliStatus,
}

/// Computes the Generalized Alignment Index of order k along one trajectory.
///
/// Deviation vectors are renormalized to unit length every `dt`; GALI_k at a
/// synchronization point is the product of the singular values of the
/// deviation block. The series starts at `(initial_time, 1.0)` and the run
/// stops once the value drops below `settings.threshold` (chaotic collapse)
/// or the clock passes `initial_time + tmax`.
pub fn gali<S>(
    system: S,
    stepper: TangentStepper,
    k: usize,
    initial_state: &[f64],
    initial_time: f64,
    tmax: f64,
    settings: GaliSettings,
) -> Result<GaliResult>
where
    S: Linearized<f64>,
{
    let dim = system.dimension();
    if dim == 0 {
        bail!("System has zero dimension.");
    }
    if initial_state.len() != dim {
        bail!(
            "Initial state dimension mismatch. Expected {}, got {}.",
            dim,
            initial_state.len()
        );
    }
    if k < 2 {
        return Err(AnalysisError::InvalidArgument(format!(
            "GALI order must be at least 2, got {k}."
        ))
        .into());
    }
    if k > dim {
        return Err(AnalysisError::InvalidArgument(format!(
            "GALI order {k} exceeds the state dimension {dim}; \
             that many deviation vectors cannot stay linearly independent."
        ))
        .into());
    }
    if tmax <= 0.0 {
        return Err(AnalysisError::InvalidArgument("tmax must be positive.".into()).into());
    }
    if settings.dt <= 0.0 {
        return Err(AnalysisError::InvalidArgument("dt must be positive.".into()).into());
    }
    if !(settings.threshold > 0.0) {
        return Err(AnalysisError::InvalidArgument("threshold must be positive.".into()).into());
    }

    let w0 = match settings.w0 {
        Some(w) => {
            if w.nrows() != dim || w.ncols() != k {
                return Err(AnalysisError::DeviationShape {
                    rows: w.nrows(),
                    cols: w.ncols(),
                    expected_rows: dim,
                    expected_cols: k,
                }
                .into());
            }
            w
        }
        None => random_orthonormal(dim, k),
    };

    let mut integrator = TangentIntegrator::new(system, stepper, initial_time, initial_state, &w0)?;

    let mut gali_values = vec![1.0];
    let mut times = vec![initial_time];
    let t_end = initial_time + tmax;
    let mut status = GaliStatus::TimedOut;

    while integrator.time() < t_end {
        integrator.step(settings.dt);
        normalize_deviations(integrator.state_mut());
        let singular = deviation_singular_values(integrator.state())?;
        let value: f64 = singular.iter().product();
        times.push(integrator.time());
        gali_values.push(value);
        if value < settings.threshold {
            status = GaliStatus::Converged;
            break;
        }
    }

    debug!(?status, steps = times.len() - 1, "gali run finished");

    Ok(GaliResult {
        gali: gali_values,
        times,
        status,
    })
}

/// Rescales every deviation column to unit Euclidean norm in place, leaving
/// the trajectory column untouched. Returns the pre-normalization norms.
/// Zero-norm columns are left as they are rather than divided.
pub fn normalize_deviations<E: ExtendedState + ?Sized>(state: &mut E) -> Vec<f64> {
    let n_dev = state.num_deviation_vectors();
    let mut norms = Vec::with_capacity(n_dev);
    for c in 1..=n_dev {
        let column = state.column_mut(c);
        let norm = column.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for entry in column.iter_mut() {
                *entry /= norm;
            }
        }
        norms.push(norm);
    }
    norms
}

/// Out-of-place companion of [`normalize_deviations`] for callers holding an
/// immutable snapshot: returns the normalized deviation block and the norms.
pub fn normalized_deviations<E: ExtendedState + ?Sized>(state: &E) -> (DMatrix<f64>, Vec<f64>) {
    let mut block = deviation_block(state);
    let mut norms = Vec::with_capacity(block.ncols());
    for mut column in block.column_iter_mut() {
        let norm = column.norm();
        if norm > 0.0 {
            column /= norm;
        }
        norms.push(norm);
    }
    (block, norms)
}

/// The deviation columns of an extended state as a `dim x k` matrix.
pub fn deviation_block<E: ExtendedState + ?Sized>(state: &E) -> DMatrix<f64> {
    let dim = state.dimension();
    let k = state.num_deviation_vectors();
    DMatrix::from_fn(dim, k, |i, c| state.column(c + 1)[i])
}

/// All k singular values of the deviation block.
pub fn deviation_singular_values<E: ExtendedState + ?Sized>(state: &E) -> Result<Vec<f64>> {
    let block = deviation_block(state);
    let svd = SVD::try_new(block, false, false, f64::EPSILON, 1000)
        .ok_or(AnalysisError::SvdFailed)?;
    Ok(svd.singular_values.iter().copied().collect())
}

/// Draws k random orthonormal vectors in the given dimension via QR of a
/// Gaussian matrix. Requires k <= dim.
pub fn random_orthonormal(dim: usize, k: usize) -> DMatrix<f64> {
    let mut rng = rand::thread_rng();
    let gaussian = DMatrix::from_fn(dim, k, |_, _| rng.sample::<f64, _>(StandardNormal));
    QR::new(gaussian).q()
}

use crate::solvers::{DiscreteMap, Tsit5, RK4};
use crate::traits::{DynamicalSystem, Linearized, Steppable};
use anyhow::{bail, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Access to a tangent-augmented state: column 0 is the trajectory point,
/// columns 1..=k are deviation vectors. Columns are contiguous in memory.
pub trait ExtendedState {
    /// State-space dimension (rows per column).
    fn dimension(&self) -> usize;

    /// Number of deviation columns.
    fn num_deviation_vectors(&self) -> usize;

    /// Column `i`; index 0 is the trajectory column.
    fn column(&self, i: usize) -> &[f64];

    fn column_mut(&mut self, i: usize) -> &mut [f64];
}

/// Matrix-backed extended state: a `dim x (1 + k)` snapshot whose first
/// column is the trajectory point.
impl ExtendedState for DMatrix<f64> {
    fn dimension(&self) -> usize {
        self.nrows()
    }

    fn num_deviation_vectors(&self) -> usize {
        self.ncols().saturating_sub(1)
    }

    fn column(&self, i: usize) -> &[f64] {
        let rows = self.nrows();
        &self.as_slice()[i * rows..(i + 1) * rows]
    }

    fn column_mut(&mut self, i: usize) -> &mut [f64] {
        let rows = self.nrows();
        &mut self.as_mut_slice()[i * rows..(i + 1) * rows]
    }
}

/// Flat, mutable extended-state buffer used by [`TangentIntegrator`].
/// Layout: the trajectory point first, then each deviation vector, all
/// column-contiguous.
pub struct TangentBuffer {
    data: Vec<f64>,
    dim: usize,
}

impl TangentBuffer {
    pub fn new(state: &[f64], deviations: &DMatrix<f64>) -> Self {
        let dim = state.len();
        let mut data = Vec::with_capacity(dim * (1 + deviations.ncols()));
        data.extend_from_slice(state);
        data.extend_from_slice(deviations.as_slice());
        Self { data, dim }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }
}

impl ExtendedState for TangentBuffer {
    fn dimension(&self) -> usize {
        self.dim
    }

    fn num_deviation_vectors(&self) -> usize {
        self.data.len() / self.dim - 1
    }

    fn column(&self, i: usize) -> &[f64] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }

    fn column_mut(&mut self, i: usize) -> &mut [f64] {
        &mut self.data[i * self.dim..(i + 1) * self.dim]
    }
}

/// Couples a system with its variational equations.
///
/// Over the flat extended state the trajectory evolves as x' = f(t, x) and
/// each deviation column as w' = J(t, x) w. Stepped by a [`DiscreteMap`],
/// the same evaluation yields the map variant x_{n+1} = f(x_n),
/// w_{n+1} = J(x_n) w_n.
pub struct VariationalSystem<S> {
    inner: S,
    dim: usize,
    n_dev: usize,
}

impl<S> VariationalSystem<S> {
    pub fn new(inner: S, dim: usize, n_dev: usize) -> Self {
        Self { inner, dim, n_dev }
    }
}

impl<S> DynamicalSystem<f64> for VariationalSystem<S>
where
    S: Linearized<f64>,
{
    fn dimension(&self) -> usize {
        self.dim * (1 + self.n_dev)
    }

    fn apply(&self, t: f64, x: &[f64], out: &mut [f64]) {
        let n = self.dim;

        self.inner.apply(t, &x[..n], &mut out[..n]);

        let mut jacobian = vec![0.0; n * n];
        self.inner.jacobian(t, &x[..n], &mut jacobian);

        // Deviation column c occupies x[(1 + c) * n .. (2 + c) * n].
        for c in 0..self.n_dev {
            let offset = (1 + c) * n;
            for i in 0..n {
                let mut sum = 0.0;
                for j in 0..n {
                    sum += jacobian[i * n + j] * x[offset + j];
                }
                out[offset + i] = sum;
            }
        }
    }
}

/// Stepper selection for tangent-space integration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum TangentStepper {
    Rk4,
    Tsit5,
    Discrete,
}

impl TangentStepper {
    fn build(self, dim: usize) -> InternalStepper {
        match self {
            TangentStepper::Rk4 => InternalStepper::Rk4(RK4::new(dim)),
            TangentStepper::Tsit5 => InternalStepper::Tsit5(Tsit5::new(dim)),
            TangentStepper::Discrete => InternalStepper::Discrete(DiscreteMap::new(dim)),
        }
    }
}

enum InternalStepper {
    Rk4(RK4<f64>),
    Tsit5(Tsit5<f64>),
    Discrete(DiscreteMap<f64>),
}

impl InternalStepper {
    fn step(
        &mut self,
        system: &impl DynamicalSystem<f64>,
        t: &mut f64,
        state: &mut [f64],
        dt: f64,
    ) {
        match self {
            InternalStepper::Rk4(s) => s.step(system, t, state, dt),
            InternalStepper::Tsit5(s) => s.step(system, t, state, dt),
            InternalStepper::Discrete(s) => s.step(system, t, state, dt),
        }
    }

    fn invalidate(&mut self) {
        match self {
            InternalStepper::Rk4(s) => s.invalidate(),
            InternalStepper::Tsit5(s) => s.invalidate(),
            InternalStepper::Discrete(s) => s.invalidate(),
        }
    }
}

/// Advances a trajectory and a block of deviation vectors together.
///
/// The buffer is exclusively owned for the lifetime of the integrator; one
/// integrator serves one logical series.
pub struct TangentIntegrator<S> {
    system: VariationalSystem<S>,
    stepper: InternalStepper,
    buffer: TangentBuffer,
    t: f64,
}

impl<S> std::fmt::Debug for TangentIntegrator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TangentIntegrator")
            .field("t", &self.t)
            .finish_non_exhaustive()
    }
}

impl<S: Linearized<f64>> TangentIntegrator<S> {
    pub fn new(
        system: S,
        stepper: TangentStepper,
        initial_time: f64,
        initial_state: &[f64],
        deviations: &DMatrix<f64>,
    ) -> Result<Self> {
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
        if deviations.nrows() != dim || deviations.ncols() == 0 {
            bail!(
                "Deviation matrix must have {} rows and at least one column, got {}x{}.",
                dim,
                deviations.nrows(),
                deviations.ncols()
            );
        }
        let n_dev = deviations.ncols();
        Ok(Self {
            system: VariationalSystem::new(system, dim, n_dev),
            stepper: stepper.build(dim * (1 + n_dev)),
            buffer: TangentBuffer::new(initial_state, deviations),
            t: initial_time,
        })
    }

    pub fn time(&self) -> f64 {
        self.t
    }

    pub fn state(&self) -> &TangentBuffer {
        &self.buffer
    }

    /// Mutable access to the extended state. Cached solver stage data is
    /// discarded, so the next `step` restarts from the modified buffer.
    pub fn state_mut(&mut self) -> &mut TangentBuffer {
        self.stepper.invalidate();
        &mut self.buffer
    }

    pub fn step(&mut self, dt: f64) {
        let Self {
            system,
            stepper,
            buffer,
            t,
        } = self;
        stepper.step(system, t, buffer.as_mut_slice(), dt);
    }
}

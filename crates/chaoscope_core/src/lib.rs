//! The `chaoscope_core` crate provides chaos-indicator and scaling-law
//! analysis primitives for dynamical systems research.
//!
//! Key components:
//! - **Traits**: `Scalar` (numeric type abstraction), `DynamicalSystem` /
//!   `Linearized` (ODEs/Maps with their variational equations), `Steppable`
//!   (Solvers).
//! - **Solvers**: fixed-step integrators (RK4, Tsit5) and a map iterator.
//! - **Tangent propagation**: extended states coupling one trajectory with a
//!   block of deviation vectors.
//! - **GALI**: the Generalized Alignment Index, a singular-value-based
//!   chaos/regularity indicator.
//! - **Scaling analysis**: least squares, linear-region segmentation, and
//!   box-size estimation for scaling-law fits.

pub mod boxsizes;
pub mod error;
pub mod gali;
pub mod scaling;
pub mod solvers;
pub mod tangent;
pub mod traits;

use thiserror::Error;

/// Failure classes raised by the analysis routines.
///
/// Functions in this crate return `anyhow::Result`; failures a caller may
/// want to branch on are raised as one of these variants and can be
/// recovered with `Error::downcast_ref`.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Paired sample sequences of different lengths.
    #[error("Sample length mismatch: x has {x_len} entries, y has {y_len}.")]
    SampleMismatch { x_len: usize, y_len: usize },

    /// An initial deviation-vector matrix of the wrong shape.
    #[error(
        "Deviation matrix has shape {rows}x{cols}, expected {expected_rows}x{expected_cols}."
    )]
    DeviationShape {
        rows: usize,
        cols: usize,
        expected_rows: usize,
        expected_cols: usize,
    },

    /// A malformed scalar or integer argument.
    #[error("{0}")]
    InvalidArgument(String),

    /// The point cloud admits no usable range of scales.
    #[error(
        "Degenerate scale range: minimum pairwise distance {min_d} and spread {max_d} \
         give no usable box sizes."
    )]
    DegenerateScales { min_d: f64, max_d: f64 },

    /// Least-squares input whose x samples carry no variance.
    #[error("All x samples are equal; the least-squares slope is undefined.")]
    ZeroVariance,

    /// SVD of the deviation block failed to converge.
    #[error("Singular value decomposition of the deviation block did not converge.")]
    SvdFailed,
}

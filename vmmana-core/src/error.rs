//! Error types for vmmana-core.

use thiserror::Error;

/// Result type alias for vmmana operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for vmmana operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Unknown fiducial region name.
    #[error("invalid fiducial region '{0}' (expected one of a, b, c, d, bottom-left, bottom-right)")]
    InvalidRegion(String),

    /// Plane index other than 0 or 1.
    #[error("invalid plane index: {0}")]
    InvalidPlane(u8),

    /// Column lengths disagree when assembling records.
    #[error("column '{column}' has {found} rows, expected {expected}")]
    LengthMismatch {
        column: &'static str,
        expected: usize,
        found: usize,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}

/// Reasons a peak fit is not trustworthy.
///
/// These are data-quality outcomes, not crashes: the fitter turns every one of
/// them into a failed fit result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    /// Too few samples survived outlier rejection.
    #[error("only {remaining} samples left after outlier rejection, need at least {required}")]
    InsufficientSamples { remaining: usize, required: usize },

    /// The histogram has too few populated bins to constrain the shape.
    #[error("histogram has {populated} populated bins, need at least {required}")]
    TooFewBins { populated: usize, required: usize },

    /// The minimizer ran out of iterations.
    #[error("fit did not converge within {iterations} iterations")]
    NotConverged { iterations: usize },

    /// The curvature matrix could not be inverted.
    #[error("parameter covariance is singular")]
    SingularCovariance,

    /// The location uncertainty exceeds the location itself.
    #[error("peak location {mu} has uncertainty {mu_err}, fit did not localize a peak")]
    UntrustworthyLocation { mu: f64, mu_err: f64 },
}

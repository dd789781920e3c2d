//! Error types shared by the estimation strategies.
//!
//! Variants are split along when a failure can surface:
//! - **Configuration** variants come out of option constructors and name
//!   parsing, before any numeric work.
//! - **Evaluation** variants come out of density and gradient evaluation
//!   and abort the surrounding run.
//! - **Run** variants describe how an otherwise well-configured run ended
//!   badly.
//!
//! An [`EstError`] raised inside an argmin callback round-trips through
//! the solver's boxed error type; the `From<argmin::core::Error>`
//! conversion recovers it so the fit boundary sees the original variant
//! rather than a stringified copy. Anything genuinely solver-internal is
//! wrapped as [`EstError::Solver`].
use argmin::core::Error;

/// Crate-wide result alias for estimation operations.
pub type EstResult<T> = Result<T, EstError>;

#[derive(Debug, Clone, PartialEq)]
pub enum EstError {
    // ---- Configuration ----
    /// Point-estimation option out of range.
    InvalidMapConfig {
        name: &'static str,
        reason: &'static str,
    },

    /// HMC option out of range.
    InvalidHmcConfig {
        name: &'static str,
        reason: &'static str,
    },

    /// ADVI option out of range.
    InvalidAdviConfig {
        name: &'static str,
        reason: &'static str,
    },

    /// Unknown line-search name.
    InvalidLineSearch {
        name: String,
    },

    // ---- Evaluation ----
    /// θ length disagrees with the density's declared dimension.
    ThetaDimMismatch {
        expected: usize,
        found: usize,
    },

    /// A coordinate handed to the density is NaN or infinite.
    NonFiniteCoordinate {
        index: usize,
        value: f64,
    },

    /// The density evaluated to NaN, or to ±∞ where finiteness is
    /// required.
    NonFiniteDensity {
        value: f64,
    },

    /// A gradient entry is NaN or infinite.
    NonFiniteGradient {
        index: usize,
        value: f64,
    },

    /// Gradient length disagrees with the coordinate count.
    GradientDimMismatch {
        expected: usize,
        found: usize,
    },

    /// Model composition failed while evaluating the density.
    Composition {
        text: String,
    },

    // ---- Run outcomes ----
    /// The solver finished without a usable parameter estimate.
    MissingThetaHat,

    /// The solver's best estimate contains a non-finite coordinate.
    NonFiniteEstimate {
        index: usize,
        value: f64,
    },

    /// The sampler could not leave its starting region.
    SamplerStuck {
        reason: &'static str,
    },

    /// Any other solver-internal failure, stringified.
    Solver {
        text: String,
    },
}

impl std::error::Error for EstError {}

impl std::fmt::Display for EstError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EstError::InvalidMapConfig { name, reason } => {
                write!(f, "Invalid MAP option '{name}': {reason}")
            }
            EstError::InvalidHmcConfig { name, reason } => {
                write!(f, "Invalid HMC option '{name}': {reason}")
            }
            EstError::InvalidAdviConfig { name, reason } => {
                write!(f, "Invalid ADVI option '{name}': {reason}")
            }
            EstError::InvalidLineSearch { name } => {
                write!(
                    f,
                    "Unknown line search '{name}': valid options are 'MoreThuente' or \
                     'HagerZhang'"
                )
            }
            EstError::ThetaDimMismatch { expected, found } => {
                write!(
                    f,
                    "Coordinate vector has length {found} but the density is defined over \
                     {expected} coordinate(s)"
                )
            }
            EstError::NonFiniteCoordinate { index, value } => {
                write!(f, "Coordinate {index} is {value}; coordinates must be finite")
            }
            EstError::NonFiniteDensity { value } => {
                write!(f, "Log density evaluated to {value}")
            }
            EstError::NonFiniteGradient { index, value } => {
                write!(f, "Gradient entry {index} is {value}; gradients must be finite")
            }
            EstError::GradientDimMismatch { expected, found } => {
                write!(f, "Gradient has length {found}, expected {expected}")
            }
            EstError::Composition { text } => {
                write!(f, "Model evaluation failed: {text}")
            }
            EstError::MissingThetaHat => {
                write!(f, "The solver returned no parameter estimate")
            }
            EstError::NonFiniteEstimate { index, value } => {
                write!(f, "Estimated coordinate {index} is {value}; estimates must be finite")
            }
            EstError::SamplerStuck { reason } => {
                write!(f, "Sampler failed to advance: {reason}")
            }
            EstError::Solver { text } => {
                write!(f, "Solver error: {text}")
            }
        }
    }
}

impl From<Error> for EstError {
    fn from(err: Error) -> Self {
        match err.downcast::<EstError>() {
            Ok(recovered) => recovered,
            Err(other) => EstError::Solver { text: other.to_string() },
        }
    }
}

//! model — shared error types for model declaration, composition,
//! fitting, and simulation.
//!
//! Two principles, applied crate-wide:
//! - **Configuration errors** (bad parameter declarations, arity
//!   mismatches, missing bounds, shape mismatches, unknown method names)
//!   fail immediately and synchronously, each naming the offending
//!   parameter or rule. They are never coerced or degraded.
//! - **Numerical failures** during fitting are caught only at the fit
//!   boundary, rewrapped as [`ModelError::FittingFailed`] with a
//!   diagnostic, and re-raised — never swallowed.
use crate::estimation::errors::EstError;

/// Crate-wide result alias for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    // ---- Parameter declarations ----
    /// Bounds required by the declared prior are missing.
    MissingBounds {
        name: String,
        reason: &'static str,
    },

    /// Declared prior is internally inconsistent (ordering, finiteness,
    /// missing spread).
    InvalidPrior {
        name: String,
        reason: &'static str,
    },

    /// Hierarchical priors need at least two subjects.
    HierarchicalSingleSubject {
        n_subjects: usize,
    },

    // ---- Composition ----
    /// Declared dynamic-parameter count disagrees with the learning rule's
    /// carried-output count.
    DynamicArityMismatch {
        declared: usize,
        carried: usize,
        reason: &'static str,
    },

    /// Observation rule input count disagrees with the resolved dynamic
    /// inputs.
    ObservationArityMismatch {
        declared: usize,
        resolved: usize,
    },

    /// Observation input marker does not name a dynamic learning parameter.
    ObservationInputUnknown {
        name: String,
    },

    /// Unknown objective method name.
    UnknownObjective {
        name: String,
    },

    /// Unknown fitting method name.
    UnknownFitMethod {
        name: String,
    },

    // ---- Data shapes ----
    /// Subjects disagree on the number of runs.
    UnevenRunCounts {
        expected: usize,
        found: usize,
        subject: String,
    },

    /// Response rows do not match `subjects × runs`.
    ResponseShapeMismatch {
        expected: usize,
        found: usize,
    },

    /// Responses and outcomes have different trial counts.
    LengthMismatch {
        responses: usize,
        outcomes: usize,
    },

    /// Outcome sequences cannot be tiled to the simulated-subject count.
    OutcomeTileMismatch {
        outcomes: usize,
        subjects: usize,
    },

    /// Ground-truth rows do not match the subject count.
    GroundTruthShapeMismatch {
        expected: usize,
        found: usize,
    },

    /// Input container is empty.
    EmptyData {
        what: &'static str,
    },

    // ---- Simulation ----
    /// A declared parameter has no value for simulation.
    ParameterValueMissing {
        name: String,
    },

    /// Paired parameter value lists must share one length.
    ParameterLengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// Simulation needs explicit values or a completed fit.
    NoParameterValues,

    // ---- Fitting / recovery ----
    /// Operation requires a completed fit.
    NotFitted,

    /// Recovery requires simulated ground truth alongside the responses.
    NoGroundTruth,

    /// A fitted free parameter has no simulated ground-truth column.
    GroundTruthMissingParameter {
        name: String,
    },

    /// Point estimation diverged; usually NaNs from invalid parameter
    /// ranges.
    FittingFailed {
        source: EstError,
    },

    /// Any other estimation-layer failure, propagated unchanged.
    Estimation {
        source: EstError,
    },
}

impl std::error::Error for ModelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ModelError::FittingFailed { source } | ModelError::Estimation { source } => {
                Some(source)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelError::MissingBounds { name, reason } => {
                write!(f, "Parameter '{name}' is missing bounds: {reason}")
            }
            ModelError::InvalidPrior { name, reason } => {
                write!(f, "Invalid prior for parameter '{name}': {reason}")
            }
            ModelError::HierarchicalSingleSubject { n_subjects } => {
                write!(
                    f,
                    "Hierarchical priors are only possible with more than one subject \
                     (got {n_subjects})"
                )
            }
            ModelError::DynamicArityMismatch { declared, carried, reason } => {
                write!(
                    f,
                    "Mismatch between {declared} declared dynamic parameter(s) and {carried} \
                     carried output(s): {reason}"
                )
            }
            ModelError::ObservationArityMismatch { declared, resolved } => {
                write!(
                    f,
                    "Observation rule declares {declared} dynamic input(s) but {resolved} were \
                     resolved from the learning model"
                )
            }
            ModelError::ObservationInputUnknown { name } => {
                write!(
                    f,
                    "Observation input '{name}' does not match any dynamic learning parameter"
                )
            }
            ModelError::UnknownObjective { name } => {
                write!(f, "Invalid objective '{name}': valid options are 'll' or 'r2'")
            }
            ModelError::UnknownFitMethod { name } => {
                write!(
                    f,
                    "Invalid fitting method '{name}': valid options are 'MLE', 'MAP', \
                     'Variational', or 'MCMC'"
                )
            }
            ModelError::UnevenRunCounts { expected, found, subject } => {
                write!(
                    f,
                    "All subjects must have the same number of runs: subject '{subject}' has \
                     {found}, expected {expected}"
                )
            }
            ModelError::ResponseShapeMismatch { expected, found } => {
                write!(f, "Response rows ({found}) do not match subjects × runs ({expected})")
            }
            ModelError::LengthMismatch { responses, outcomes } => {
                write!(f, "Responses ({responses}) and outcomes ({outcomes}) have unequal lengths")
            }
            ModelError::OutcomeTileMismatch { outcomes, subjects } => {
                write!(
                    f,
                    "Unable to repeat outcome arrays to match the number of subjects: \
                     {subjects} subject(s) is not divisible by {outcomes} outcome sequence(s)"
                )
            }
            ModelError::GroundTruthShapeMismatch { expected, found } => {
                write!(f, "Ground-truth rows ({found}) do not match the subject count ({expected})")
            }
            ModelError::EmptyData { what } => {
                write!(f, "{what} must not be empty")
            }
            ModelError::ParameterValueMissing { name } => {
                write!(f, "Parameter '{name}' has no value provided")
            }
            ModelError::ParameterLengthMismatch { name, expected, actual } => {
                write!(
                    f,
                    "Each parameter should have the same number of values: '{name}' has {actual}, \
                     expected {expected}"
                )
            }
            ModelError::NoParameterValues => {
                write!(
                    f,
                    "No parameter values provided and model has not been fit. Must explicitly \
                     provide parameter values for simulation or fit the model first"
                )
            }
            ModelError::NotFitted => {
                write!(f, "The model has not been fit")
            }
            ModelError::NoGroundTruth => {
                write!(
                    f,
                    "Responses do not include simulated parameter values; unable to perform \
                     parameter recovery"
                )
            }
            ModelError::GroundTruthMissingParameter { name } => {
                write!(f, "Simulated values for parameter '{name}' not found in the ground truth")
            }
            ModelError::FittingFailed { source } => {
                write!(
                    f,
                    "Fitting failed, likely NaNs from invalid parameter ranges: {source}"
                )
            }
            ModelError::Estimation { source } => {
                write!(f, "Estimation error: {source}")
            }
        }
    }
}

impl From<EstError> for ModelError {
    fn from(source: EstError) -> Self {
        ModelError::Estimation { source }
    }
}

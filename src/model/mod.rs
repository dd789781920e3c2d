//! model — trial-by-trial behavioral models.
//!
//! Purpose
//! -------
//! House the behavioral-modeling stack: declarative parameter
//! specifications, prior binding, the trial recurrence and observation
//! composition, the four-strategy fit dispatcher, forward simulation, and
//! parameter-recovery analysis.
//!
//! Key behaviors
//! -------------
//! - [`core`]: composition building blocks (specs, binding, data
//!   containers, recurrence, observation, objectives, options).
//! - [`rules`]: the learning/observation step-function contracts and the
//!   built-in rules implementing them.
//! - [`models`]: the assembled [`models::BehavioralModel`] plus the
//!   θ layout and composed density behind it.
//! - [`simulate`]: forward generation over parameter grids.
//! - [`recovery`]: simulated-vs-estimated correlation analysis.
//! - [`errors`]: the configuration/fitting error enum and result alias.
//!
//! Conventions
//! -----------
//! - All trajectories are trial-major `(trials, columns)` with one column
//!   per subject-run (fit) or simulated subject-run (simulate).
//! - Configuration errors fail eagerly and name the offending parameter;
//!   degraded-but-defined behaviors proceed with a `tracing` warning.

pub mod core;
pub mod errors;
pub mod models;
pub mod recovery;
pub mod rules;
pub mod simulate;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::core::{
    FitMethod, FitOptions, GroundTruth, ObjectiveKind, ParamSpec, PriorKind, ResponseSet,
    SimOptions,
};
pub use self::errors::{ModelError, ModelResult};
pub use self::models::{BehavioralModel, FitResult, ParamEstimate};
pub use self::recovery::{recover, RecoveryResult};
pub use self::rules::{DecayLearning, LearningRule, ObservationRule, RescorlaWagner, Softmax};
pub use self::simulate::SimulationResult;

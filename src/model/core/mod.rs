//! model::core — composition building blocks.
//!
//! Collects the pieces the model layer assembles into a fit or a
//! simulation: parameter declarations ([`spec`]), prior binding
//! ([`binding`]), validated data containers ([`data`]), the trial
//! recurrence ([`recurrence`]), observation composition ([`observation`]),
//! scalar objectives ([`objective`]), and configuration ([`options`]).
//!
//! Everything here is pure data flow over `ndarray` containers; the only
//! side effects are `tracing` warnings accompanying degraded-but-defined
//! behaviors.

pub mod binding;
pub mod data;
pub mod objective;
pub mod observation;
pub mod options;
pub mod recurrence;
pub mod spec;

pub use self::binding::{bind, BoundParam, BoundSet, ObservationBinding, GROUP_SCALE_UPPER};
pub use self::data::{broadcast_outcomes, validate_trial_lengths, GroundTruth, ResponseSet};
pub use self::objective::{log_likelihood, objective, r_squared, ObjectiveKind, R2_OBJECTIVE_SCALE};
pub use self::observation::{compose, resolve_inputs, ObservationPlan};
pub use self::options::{FitMethod, FitOptions, SimOptions};
pub use self::recurrence::{evaluate, validate_arity, Trajectory};
pub use self::spec::{ParamSpec, PriorKind};

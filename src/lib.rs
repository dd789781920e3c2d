//! trialfit — trial-by-trial behavioral model fitting and simulation.
//!
//! Purpose
//! -------
//! Fit and simulate trial-by-trial behavioral models: a learning rule
//! produces latent quantities per trial as a fold over outcomes, an
//! optional observation rule maps those quantities to response
//! probabilities, and the composite is fit to observed choice sequences
//! by one of four estimation strategies or run forward to synthesize
//! data.
//!
//! Key behaviors
//! -------------
//! - Declare parameters with [`model::ParamSpec`] (prior family, bounds,
//!   dynamic vs. static role) and rules through the
//!   [`model::rules::LearningRule`] / [`model::rules::ObservationRule`]
//!   contracts, which state their output shape as metadata rather than
//!   being introspected.
//! - Assemble a [`model::BehavioralModel`] and `fit` it by MLE, MAP,
//!   variational approximation, or MCMC — all four strategies consume the
//!   same composed log density over unconstrained coordinates.
//! - `simulate` reuses the identical recurrence machinery to generate
//!   responses over explicit parameter grids or fitted values, and
//!   recovery analysis correlates simulated against recovered parameters.
//!
//! Conventions
//! -----------
//! - `ndarray` containers everywhere; trajectories are trial-major
//!   `(trials, columns)` with one column per subject-run.
//! - Configuration errors ([`model::ModelError`]) fail eagerly and name
//!   the offending parameter or rule; numerical estimation failures are
//!   rewrapped at the fit boundary only. Degraded-but-defined behaviors
//!   (outcome tiling, hierarchical demotion, MLE prior substitution)
//!   proceed with a `tracing` warning.
//! - The crate performs no I/O: loading response files and rendering
//!   tables or plots belong to the caller.
//!
//! Downstream usage
//! ----------------
//! ```
//! use ndarray::Array2;
//! use trialfit::model::{
//!     BehavioralModel, FitMethod, FitOptions, ParamSpec, ResponseSet,
//!     rules::{RescorlaWagner, Softmax},
//! };
//!
//! let mut model = BehavioralModel::new(
//!     Box::new(RescorlaWagner),
//!     vec![
//!         ParamSpec::fixed("value", 0.5).unwrap().dynamic(),
//!         ParamSpec::bounded_normal("alpha", 0.4, 0.2, 0.0, 1.0).unwrap(),
//!     ],
//!     Some(Box::new(Softmax)),
//!     vec![ParamSpec::bounded_normal("beta", 3.0, 1.0, 0.0, 20.0).unwrap()],
//!     vec![],
//! )
//! .unwrap();
//!
//! let outcomes = Array2::from_shape_vec((4, 1), vec![1.0, 0.0, 1.0, 1.0]).unwrap();
//! let responses = Array2::from_shape_vec((1, 4), vec![1.0, 0.0, 1.0, 1.0]).unwrap();
//! let data = ResponseSet::new(vec!["s1".into()], &[1], responses, None).unwrap();
//! let result = model.fit(&data, &outcomes, &FitOptions::method(FitMethod::Map)).unwrap();
//! assert!(result.log_likelihood.is_finite());
//! ```

pub mod estimation;
pub mod model;

pub use crate::estimation::{EstError, EstResult};
pub use crate::model::{
    BehavioralModel, FitMethod, FitOptions, FitResult, GroundTruth, ModelError, ModelResult,
    ParamSpec, PriorKind, ResponseSet, SimOptions, SimulationResult,
};

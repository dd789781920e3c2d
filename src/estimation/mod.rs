//! estimation — shared numerical estimation layer.
//!
//! Purpose
//! -------
//! House the four estimation strategies the behavioral-model layer
//! dispatches to. Everything is built around one contract: a model is a
//! [`density::LogDensity`] — a scalar log density over unconstrained
//! coordinates — and each strategy decides what to do with it.
//!
//! Key behaviors
//! -------------
//! - [`map`]: argmin-backed L-BFGS maximization of the density, used by
//!   the `MAP` strategy and (under flattened priors) by `MLE`.
//! - [`hmc`]: Hamiltonian Monte Carlo with dual-averaging step-size
//!   adaptation and a diagonal mass matrix, used by the `MCMC` strategy.
//! - [`advi`]: mean-field Gaussian variational approximation with
//!   reparameterized Adam ascent, used by the `Variational` strategy.
//! - [`transforms`]: bounded ↔ unconstrained changes of variables and the
//!   guarded scalar maps they are built from.
//! - [`summary`]: per-coordinate moments of posterior draw matrices.
//! - [`errors`]: the estimation-side error enum and result alias.
//!
//! Conventions
//! -----------
//! - All parameter vectors are unconstrained; the model layer applies
//!   [`transforms::Transform`] in both directions and owns the Jacobian
//!   bookkeeping.
//! - Every strategy entry point runs [`density::check_start`] before any
//!   numeric work, so malformed starting coordinates surface as
//!   configuration errors rather than diverged runs.
//! - Failure surfaces as [`errors::EstResult`] values; the only
//!   intentional panics are on provably-infallible constructions (e.g.
//!   the unit normal).

pub mod advi;
pub mod density;
pub mod errors;
pub mod hmc;
pub mod map;
pub mod summary;
pub mod transforms;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::advi::AdviOptions;
pub use self::density::{check_start, Grad, LogDensity, Theta};
pub use self::errors::{EstError, EstResult};
pub use self::hmc::HmcOptions;
pub use self::map::{maximize, LineSearcher, MapOptions, OptimOutcome};
pub use self::summary::{summarize_draws, CoordSummary};
pub use self::transforms::Transform;

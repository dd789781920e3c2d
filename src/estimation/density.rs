//! The log-density contract shared by every estimation strategy.
//!
//! To the estimation layer, a fitted behavioral model is nothing more
//! than a scalar log density `ℓ(θ)` over unconstrained coordinates plus
//! the data it is evaluated against. [`LogDensity`] captures exactly
//! that: implementors declare their coordinate dimension, evaluate the
//! density, and may offer an analytic gradient. All four fitting
//! strategies (MAP/MLE point estimation, ADVI, HMC) consume this one
//! trait, so a single composed model definition serves every strategy.
//!
//! Conventions
//! -----------
//! - Coordinates are unconstrained; the model layer owns the bounded ↔
//!   unconstrained change of variables and its Jacobian bookkeeping.
//! - Higher is better: strategies maximize `ℓ`, flipping the sign
//!   themselves where their machinery minimizes.
//! - The samplers tolerate a `-∞` density (a rejected region is "move
//!   away", not an error); point estimation treats any non-finite value
//!   as a failure. `NaN` is always a failure.
use crate::estimation::errors::{EstError, EstResult};
use ndarray::Array1;

/// Unconstrained coordinate vector.
pub type Theta = Array1<f64>;

/// Gradient with respect to the unconstrained coordinates.
pub type Grad = Array1<f64>;

/// A scalar log density over unconstrained coordinates.
pub trait LogDensity {
    /// Per-evaluation data (trial outcomes and observed responses for the
    /// behavioral models in this crate).
    type Data;

    /// Number of coordinates the density is defined over.
    fn dim(&self) -> usize;

    /// Evaluate `ℓ(θ)` against `data`.
    fn value(&self, theta: &Theta, data: &Self::Data) -> EstResult<f64>;

    /// Analytic gradient `∇ℓ(θ)`, when the implementor has one.
    ///
    /// The default reports `None`; strategies then fall back to finite
    /// differences of [`LogDensity::value`].
    fn grad(&self, _theta: &Theta, _data: &Self::Data) -> Option<EstResult<Grad>> {
        None
    }
}

/// Reject a starting point the density cannot evaluate.
///
/// Every strategy entry point runs this once before any numeric work, so
/// dimension and finiteness mistakes surface as configuration errors
/// rather than as a diverged run.
///
/// # Errors
/// - [`EstError::ThetaDimMismatch`] when the length disagrees with
///   [`LogDensity::dim`].
/// - [`EstError::NonFiniteCoordinate`] naming the first NaN or infinite
///   entry.
pub fn check_start<F: LogDensity>(f: &F, theta0: &Theta) -> EstResult<()> {
    if theta0.len() != f.dim() {
        return Err(EstError::ThetaDimMismatch { expected: f.dim(), found: theta0.len() });
    }
    for (index, &value) in theta0.iter().enumerate() {
        if !value.is_finite() {
            return Err(EstError::NonFiniteCoordinate { index, value });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover the start-point guard and the trait's gradient
    // default. Strategy behavior against real densities lives with each
    // strategy module.
    // -------------------------------------------------------------------------

    struct Quadratic;

    impl LogDensity for Quadratic {
        type Data = ();

        fn dim(&self) -> usize {
            3
        }

        fn value(&self, theta: &Theta, _: &()) -> EstResult<f64> {
            Ok(-theta.dot(theta))
        }
    }

    #[test]
    fn matching_finite_starts_pass() {
        assert!(check_start(&Quadratic, &array![0.0, 1.0, -1.0]).is_ok());
    }

    #[test]
    fn dimension_and_finiteness_violations_are_named() {
        let err = check_start(&Quadratic, &array![0.0]).unwrap_err();
        assert!(matches!(err, EstError::ThetaDimMismatch { expected: 3, found: 1 }));
        let err = check_start(&Quadratic, &array![0.0, f64::INFINITY, 0.0]).unwrap_err();
        assert!(matches!(err, EstError::NonFiniteCoordinate { index: 1, .. }));
    }

    #[test]
    fn gradient_defaults_to_none() {
        assert!(Quadratic.grad(&array![0.0, 0.0, 0.0], &()).is_none());
    }
}

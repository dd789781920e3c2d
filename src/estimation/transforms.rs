//! Numerical stability utilities and parameter transforms.
//!
//! Provides safe implementations of common nonlinear transforms
//! that are prone to overflow/underflow in naïve form, plus the
//! [`Transform`] change of variables used to map bounded model
//! parameters into unconstrained optimizer/sampler coordinates.
//! The scalar helpers follow guarded strategies similar to those
//! in major ML libraries (e.g. PyTorch, TensorFlow), using explicit
//! cutoffs (`x > 20.0`) to keep `f64` arithmetic in a well-conditioned regime.
//!
//! # Provided items
//! - [`safe_softplus(x)`] / [`safe_softplus_inv(x)`]: stable
//!   `ln(1 + exp(x))` pair mapping ℝ ↔ (0, ∞).
//! - [`safe_logistic(x)`] / [`safe_logit(p)`]: stable sigmoid pair
//!   mapping ℝ ↔ (0, 1).
//! - [`Transform`]: per-parameter bijection with `forward`, `backward`,
//!   and `log_jacobian`, used whenever a prior constrains a parameter
//!   to an interval or half-line.
//!
//! # Conventions
//! - `forward` maps the *natural* (model) scale to the unconstrained
//!   coordinate; `backward` inverts it. Optimizers and samplers only
//!   ever see unconstrained coordinates.
//! - `log_jacobian(y)` is `ln |d backward(y) / dy|`, the change-of-variables
//!   correction added to log densities expressed in unconstrained space.

/// Numerically stable softplus: `softplus(x) = ln(1 + exp(x))`.
///
/// Computes softplus without overflow for large positive `x` and
/// with good precision for large negative `x`. This implementation
/// uses a simple piecewise guard:
///
/// - For sufficiently large `x`, `softplus(x) ≈ x + ln1p(exp(-x)) ≈ x`.
/// - Otherwise, it falls back to `ln1p(exp(x))`.
///
/// The cutoff used here (`x > 20.0`) is a practical threshold that
/// keeps the calculation in a well-conditioned regime for `f64`.
pub fn safe_softplus(x: f64) -> f64 {
    if x > 20.0 { x } else { x.exp().ln_1p() }
}

/// Stable inverse of softplus on `(0, ∞)`: solves for `t` in
/// `softplus(t) = x`, returning `t = ln(exp(x) - 1)`.
///
/// Direct evaluation of `ln(exp(x) - 1)` can overflow or lose precision.
/// This implementation mirrors the guarded strategy of `safe_softplus`:
///
/// - For sufficiently large `x`, `exp(-x)` is tiny and
///   `ln(exp(x) - 1) ≈ x + ln(1 - exp(-x)) ≈ x`.
/// - Otherwise, it uses `ln(expm1(x))`.
pub fn safe_softplus_inv(x: f64) -> f64 {
    if x > 20.0 { x } else { x.exp_m1().ln() }
}

/// Numerically stable logistic function `σ(x) = 1 / (1 + exp(-x))`.
///
/// Branches on the sign of `x` so the exponential argument is always
/// non-positive, avoiding overflow for large `|x|`.
pub fn safe_logistic(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Stable inverse of the logistic function on `(0, 1)`:
/// `logit(p) = ln(p / (1 - p))`.
///
/// Inputs are clamped a hair inside the open interval so that values
/// produced by float rounding at the boundaries (`0.0`, `1.0`) map to
/// large finite coordinates instead of `±∞`.
pub fn safe_logit(p: f64) -> f64 {
    let p = p.clamp(f64::EPSILON, 1.0 - f64::EPSILON);
    (p / (1.0 - p)).ln()
}

/// Change of variables between a parameter's natural scale and the
/// unconstrained coordinate handed to optimizers and samplers.
///
/// Variants:
/// - `Identity`: unbounded parameters; no-op.
/// - `Interval { lower, upper }`: doubly bounded parameters; the logit
///   transform scaled to `(lower, upper)`.
/// - `LowerBound { lower }`: half-line parameters; the shifted softplus
///   transform `v = lower + softplus(y)`.
///
/// The log-Jacobian follows the `backward` direction, i.e. it corrects a
/// density expressed over the natural scale into one over the
/// unconstrained coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transform {
    Identity,
    Interval { lower: f64, upper: f64 },
    LowerBound { lower: f64 },
}

impl Transform {
    /// Map a natural-scale value to its unconstrained coordinate.
    pub fn forward(&self, value: f64) -> f64 {
        match self {
            Transform::Identity => value,
            Transform::Interval { lower, upper } => safe_logit((value - lower) / (upper - lower)),
            Transform::LowerBound { lower } => {
                // Clamp to keep boundary values finite, mirroring safe_logit.
                safe_softplus_inv((value - lower).max(f64::MIN_POSITIVE))
            }
        }
    }

    /// Map an unconstrained coordinate back to the natural scale.
    pub fn backward(&self, coord: f64) -> f64 {
        match self {
            Transform::Identity => coord,
            Transform::Interval { lower, upper } => lower + (upper - lower) * safe_logistic(coord),
            Transform::LowerBound { lower } => lower + safe_softplus(coord),
        }
    }

    /// `ln |d backward(y) / dy|` evaluated at `coord`.
    ///
    /// For the interval transform this is
    /// `ln(upper - lower) + ln σ(y) + ln σ(-y)`, computed via softplus to
    /// stay finite for large `|y|`; for the shifted softplus it is
    /// `ln σ(y) = -softplus(-y)`.
    pub fn log_jacobian(&self, coord: f64) -> f64 {
        match self {
            Transform::Identity => 0.0,
            Transform::Interval { lower, upper } => {
                (upper - lower).ln() - safe_softplus(coord) - safe_softplus(-coord)
            }
            Transform::LowerBound { .. } => -safe_softplus(-coord),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Round-trip consistency of forward/backward for all transform variants.
    // - Boundary behavior of the guarded scalar helpers.
    // - Sign/shape of the log-Jacobian.
    //
    // They intentionally DO NOT cover:
    // - How transforms interact with priors (covered in the binding module).
    // -------------------------------------------------------------------------

    #[test]
    fn softplus_round_trips_across_scales() {
        for &x in &[1e-6, 0.1, 1.0, 5.0, 25.0, 1e3] {
            assert_relative_eq!(safe_softplus(safe_softplus_inv(x)), x, max_relative = 1e-10);
        }
    }

    #[test]
    fn logistic_round_trips_and_saturates() {
        for &p in &[1e-9, 0.25, 0.5, 0.75, 1.0 - 1e-9] {
            assert_relative_eq!(safe_logistic(safe_logit(p)), p, max_relative = 1e-8);
        }
        assert_eq!(safe_logistic(1e4), 1.0);
        assert_eq!(safe_logistic(-1e4), 0.0);
    }

    #[test]
    fn interval_transform_round_trips_inside_bounds() {
        let t = Transform::Interval { lower: -2.0, upper: 3.0 };
        for &v in &[-1.999, -1.0, 0.0, 0.5, 2.999] {
            assert_relative_eq!(t.backward(t.forward(v)), v, max_relative = 1e-8);
        }
        // Backward always lands strictly inside the bounds.
        assert!(t.backward(1e3) <= 3.0);
        assert!(t.backward(-1e3) >= -2.0);
    }

    #[test]
    fn lower_bound_transform_round_trips() {
        let t = Transform::LowerBound { lower: 0.5 };
        for &v in &[0.5001, 1.0, 10.0, 1e4] {
            assert_relative_eq!(t.backward(t.forward(v)), v, max_relative = 1e-10);
        }
    }

    #[test]
    // The interval Jacobian peaks at the midpoint coordinate (y = 0) and
    // decays symmetrically; the identity contributes nothing.
    fn log_jacobian_shapes() {
        let t = Transform::Interval { lower: 0.0, upper: 1.0 };
        let mid = t.log_jacobian(0.0);
        assert!(mid > t.log_jacobian(2.0));
        assert_relative_eq!(t.log_jacobian(2.0), t.log_jacobian(-2.0), max_relative = 1e-12);
        assert_eq!(Transform::Identity.log_jacobian(123.0), 0.0);
    }

    #[test]
    // ln |d backward / dy| must agree with a numerical derivative of
    // backward for every transform variant.
    fn log_jacobian_matches_backward_slope() {
        let eps = 1e-6;
        for (t, coord) in [
            (Transform::Interval { lower: -2.0, upper: 3.0 }, 0.7),
            (Transform::LowerBound { lower: 0.5 }, 1.5),
            (Transform::LowerBound { lower: 0.5 }, -4.0),
        ] {
            let slope = (t.backward(coord + eps) - t.backward(coord - eps)) / (2.0 * eps);
            assert_relative_eq!(t.log_jacobian(coord), slope.ln(), epsilon = 1e-6);
        }
    }
}

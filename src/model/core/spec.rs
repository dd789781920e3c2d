//! Declarative parameter specifications.
//!
//! A [`ParamSpec`] records everything the binder needs to turn a model
//! parameter into a concrete prior: the distribution family, bounds,
//! location/spread, and whether the parameter is *dynamic* (carried across
//! trials as state) or *static* (constant per run). Specs are immutable;
//! binding produces a separate record and never mutates the declaration.
use crate::model::errors::{ModelError, ModelResult};
use tracing::warn;

/// Prior family for a declared parameter.
///
/// - `Normal`: Gaussian prior, optionally truncated by bounds.
/// - `Uniform`: flat over a required `(lower, upper)` interval.
/// - `Flat`: improper flat prior over the whole real line.
/// - `Fixed`: not estimated; replicated at its mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorKind {
    Normal,
    Uniform,
    Flat,
    Fixed,
}

/// One declared model parameter.
///
/// Invariants (enforced by [`ParamSpec::new`]):
/// - `Uniform` requires both bounds.
/// - `Normal` requires a finite, positive `sd`.
/// - Bounds, when present, satisfy `lower < upper` and `mean` lies inside.
/// - `Fixed` ignores bounds and spread (a warning is emitted if supplied).
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub kind: PriorKind,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    pub mean: f64,
    pub sd: Option<f64>,
    pub dynamic: bool,
}

impl ParamSpec {
    /// Construct a validated parameter specification.
    ///
    /// # Errors
    /// - [`ModelError::MissingBounds`] for a uniform prior without both
    ///   bounds.
    /// - [`ModelError::InvalidPrior`] for a normal prior without a
    ///   positive finite `sd`, non-finite mean, out-of-order bounds, or a
    ///   mean outside the declared bounds.
    pub fn new(
        name: &str, kind: PriorKind, lower: Option<f64>, upper: Option<f64>, mean: f64,
        sd: Option<f64>, dynamic: bool,
    ) -> ModelResult<Self> {
        if !mean.is_finite() {
            return Err(ModelError::InvalidPrior {
                name: name.to_string(),
                reason: "Mean must be finite.",
            });
        }
        let (mut lower, mut upper, mut sd) = (lower, upper, sd);
        match kind {
            PriorKind::Uniform => {
                if lower.is_none() || upper.is_none() {
                    return Err(ModelError::MissingBounds {
                        name: name.to_string(),
                        reason: "Must specify upper and lower bounds for parameters with \
                                 uniform distribution.",
                    });
                }
            }
            PriorKind::Normal => match sd {
                Some(s) if s.is_finite() && s > 0.0 => {}
                _ => {
                    return Err(ModelError::InvalidPrior {
                        name: name.to_string(),
                        reason: "Normal priors require a finite, positive sd; make sure at \
                                 least the mean and sd are specified.",
                    });
                }
            },
            PriorKind::Fixed => {
                if lower.is_some() || upper.is_some() || sd.is_some() {
                    warn!(parameter = name, "parameter is specified as fixed, ignoring variance & bounds");
                    lower = None;
                    upper = None;
                    sd = None;
                }
            }
            PriorKind::Flat => {}
        }
        if upper.is_some() && lower.is_none() {
            return Err(ModelError::InvalidPrior {
                name: name.to_string(),
                reason: "Upper-only bounds are not supported; provide a lower bound as well.",
            });
        }
        if let (Some(lo), Some(hi)) = (lower, upper) {
            if !(lo.is_finite() && hi.is_finite() && lo < hi) {
                return Err(ModelError::InvalidPrior {
                    name: name.to_string(),
                    reason: "Bounds must be finite with lower < upper.",
                });
            }
            if mean < lo || mean > hi {
                return Err(ModelError::InvalidPrior {
                    name: name.to_string(),
                    reason: "Mean must lie inside the declared bounds.",
                });
            }
        }
        Ok(Self { name: name.to_string(), kind, lower, upper, mean, sd, dynamic })
    }

    /// Unbounded normal prior.
    pub fn normal(name: &str, mean: f64, sd: f64) -> ModelResult<Self> {
        Self::new(name, PriorKind::Normal, None, None, mean, Some(sd), false)
    }

    /// Normal prior truncated to `(lower, upper)`.
    pub fn bounded_normal(
        name: &str, mean: f64, sd: f64, lower: f64, upper: f64,
    ) -> ModelResult<Self> {
        Self::new(name, PriorKind::Normal, Some(lower), Some(upper), mean, Some(sd), false)
    }

    /// Uniform prior over `(lower, upper)`; mean defaults to the midpoint.
    pub fn uniform(name: &str, lower: f64, upper: f64) -> ModelResult<Self> {
        Self::new(name, PriorKind::Uniform, Some(lower), Some(upper), 0.5 * (lower + upper), None, false)
    }

    /// Improper flat prior centered (for initialization) at `mean`.
    pub fn flat(name: &str, mean: f64) -> ModelResult<Self> {
        Self::new(name, PriorKind::Flat, None, None, mean, None, false)
    }

    /// Fixed (non-estimated) parameter pinned at `value`.
    pub fn fixed(name: &str, value: f64) -> ModelResult<Self> {
        Self::new(name, PriorKind::Fixed, None, None, value, None, false)
    }

    /// Mark this parameter as dynamic (carried across trials as state).
    pub fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }

    /// Whether this parameter contributes free coordinates to estimation.
    pub fn is_free(&self) -> bool {
        self.kind != PriorKind::Fixed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover the declaration-time invariants of `ParamSpec::new`
    // and its convenience constructors. Binding behavior (MLE overrides,
    // hierarchical wrapping) lives in the binding module tests.
    // -------------------------------------------------------------------------

    #[test]
    fn uniform_without_bounds_is_a_configuration_error() {
        let err = ParamSpec::new("alpha", PriorKind::Uniform, None, Some(1.0), 0.5, None, false)
            .unwrap_err();
        match err {
            ModelError::MissingBounds { name, .. } => assert_eq!(name, "alpha"),
            other => panic!("expected MissingBounds, got {other:?}"),
        }
    }

    #[test]
    fn normal_without_sd_is_rejected() {
        let err = ParamSpec::new("beta", PriorKind::Normal, None, None, 0.0, None, false)
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidPrior { .. }));
    }

    #[test]
    fn fixed_ignores_bounds_and_spread() {
        let spec =
            ParamSpec::new("v", PriorKind::Fixed, Some(0.0), Some(1.0), 0.5, Some(0.1), true)
                .expect("fixed spec should construct");
        assert_eq!(spec.lower, None);
        assert_eq!(spec.upper, None);
        assert_eq!(spec.sd, None);
        assert!(!spec.is_free());
    }

    #[test]
    fn bounds_must_be_ordered_and_contain_the_mean() {
        assert!(ParamSpec::bounded_normal("a", 0.5, 0.2, 1.0, 0.0).is_err());
        assert!(ParamSpec::bounded_normal("a", 2.0, 0.2, 0.0, 1.0).is_err());
        assert!(ParamSpec::bounded_normal("a", 0.5, 0.2, 0.0, 1.0).is_ok());
    }

    #[test]
    fn dynamic_builder_flags_the_spec() {
        let spec = ParamSpec::fixed("value", 0.5).unwrap().dynamic();
        assert!(spec.dynamic);
    }
}

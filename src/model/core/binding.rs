//! Parameter binding: declarative specs → concrete priors.
//!
//! [`bind`] converts a model's [`ParamSpec`] lists into [`BoundParam`]
//! records carrying a resolved prior, a change-of-variables transform, and
//! the subject scoping, split into the dynamic/static/observation roles the
//! composition engine consumes. Binding never mutates the specs.
//!
//! Key behaviors
//! -------------
//! - Fixed parameters become constants replicated per subject; free
//!   parameters become subject-scoped priors.
//! - MLE mode rewrites any non-uniform/non-flat/non-fixed prior to uniform
//!   (both bounds present) or flat, with a warn-level notice naming the
//!   substitution.
//! - Hierarchical mode wraps each free prior with group-level hyper-priors
//!   (a group mean prior inside the same bounds, and a group scale prior
//!   `Uniform(0, GROUP_SCALE_UPPER)`); it requires at least two subjects.
//! - Observation parameters whose name matches a learning parameter are
//!   resolved to the *same* bound record by index (shared prior), not
//!   re-bound, so a parameter appearing in both roles stays coherent.
use crate::{
    estimation::transforms::Transform,
    model::{
        core::spec::{ParamSpec, PriorKind},
        errors::{ModelError, ModelResult},
    },
};
use statrs::distribution::{Continuous, Normal, Uniform};
use tracing::warn;

/// Upper bound of the hierarchical group-scale hyper-prior.
///
/// Matches the scale the group standard deviation is allowed to take
/// under `Uniform(0, GROUP_SCALE_UPPER)`.
pub const GROUP_SCALE_UPPER: f64 = 100.0;

/// A parameter with its prior and transform resolved.
///
/// Produced by [`bind`]; referenced by index from the θ-vector layout.
/// `fixed_value` is `Some` exactly when the parameter contributes no free
/// coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParam {
    pub name: String,
    pub kind: PriorKind,
    pub transform: Transform,
    pub mean: f64,
    pub sd: Option<f64>,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    pub dynamic: bool,
    pub fixed_value: Option<f64>,
    pub hierarchical: bool,
}

impl BoundParam {
    /// Map a natural-scale value to the unconstrained coordinate.
    pub fn forward(&self, value: f64) -> f64 {
        self.transform.forward(value)
    }

    /// Map an unconstrained coordinate back to the natural scale.
    pub fn backward(&self, coord: f64) -> f64 {
        self.transform.backward(coord)
    }

    /// Whether this parameter contributes free coordinates.
    pub fn is_free(&self) -> bool {
        self.fixed_value.is_none()
    }

    /// Natural-scale log prior density at `value`.
    ///
    /// Truncated normals are evaluated unnormalized (the transform keeps
    /// values inside the bounds, and normalization constants do not move
    /// the mode). Values outside a uniform's support return `-∞`.
    pub fn log_prior(&self, value: f64) -> f64 {
        match self.kind {
            PriorKind::Normal => {
                let sd = self.sd.unwrap_or(1.0);
                match Normal::new(self.mean, sd) {
                    Ok(d) => d.ln_pdf(value),
                    Err(_) => f64::NEG_INFINITY,
                }
            }
            PriorKind::Uniform => {
                let (lo, hi) = (self.lower.unwrap_or(0.0), self.upper.unwrap_or(1.0));
                match Uniform::new(lo, hi) {
                    Ok(d) => d.ln_pdf(value),
                    Err(_) => f64::NEG_INFINITY,
                }
            }
            PriorKind::Flat | PriorKind::Fixed => 0.0,
        }
    }
}

/// How one observation-model parameter is bound.
///
/// `Shared*` variants reference a learning parameter's bound record by
/// index instead of re-binding, guaranteeing one prior for a name used in
/// both roles.
#[derive(Debug, Clone, PartialEq)]
pub enum ObservationBinding {
    Free(BoundParam),
    SharedDynamic(usize),
    SharedStatic(usize),
}

/// Bound parameters split by role.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundSet {
    pub dynamic: Vec<BoundParam>,
    pub statics: Vec<BoundParam>,
    pub observation: Vec<ObservationBinding>,
}

impl BoundSet {
    /// Resolve an observation binding to its underlying bound record.
    pub fn observation_param<'a>(&'a self, binding: &'a ObservationBinding) -> &'a BoundParam {
        match binding {
            ObservationBinding::Free(p) => p,
            ObservationBinding::SharedDynamic(i) => &self.dynamic[*i],
            ObservationBinding::SharedStatic(i) => &self.statics[*i],
        }
    }
}

/// Bind learning and observation parameter specs for `n_subjects`.
///
/// # Errors
/// - [`ModelError::HierarchicalSingleSubject`] when `hierarchical` is
///   requested with fewer than two subjects.
/// - Propagates declaration errors from the specs themselves (already
///   validated at construction, re-checked defensively here).
pub fn bind(
    learning: &[ParamSpec], observation: &[ParamSpec], n_subjects: usize, mle: bool,
    hierarchical: bool,
) -> ModelResult<BoundSet> {
    if hierarchical && n_subjects < 2 {
        return Err(ModelError::HierarchicalSingleSubject { n_subjects });
    }

    let mut dynamic = Vec::new();
    let mut statics = Vec::new();
    for spec in learning {
        let bound = bind_one(spec, mle, hierarchical);
        if spec.dynamic {
            dynamic.push(bound);
        } else {
            statics.push(bound);
        }
    }

    let mut obs = Vec::with_capacity(observation.len());
    for spec in observation {
        let dynamic_pos = learning
            .iter()
            .filter(|l| l.dynamic)
            .position(|l| l.name == spec.name);
        let static_pos = learning
            .iter()
            .filter(|l| !l.dynamic)
            .position(|l| l.name == spec.name);
        let binding = if let Some(i) = dynamic_pos {
            ObservationBinding::SharedDynamic(i)
        } else if let Some(i) = static_pos {
            ObservationBinding::SharedStatic(i)
        } else {
            ObservationBinding::Free(bind_one(spec, mle, hierarchical))
        };
        obs.push(binding);
    }

    Ok(BoundSet { dynamic, statics, observation: obs })
}

// ---- Helper Methods ----

/// Bind a single spec, applying the MLE prior substitution first.
fn bind_one(spec: &ParamSpec, mle: bool, hierarchical: bool) -> BoundParam {
    let mut kind = spec.kind;
    if mle && !matches!(kind, PriorKind::Uniform | PriorKind::Flat | PriorKind::Fixed) {
        if spec.lower.is_some() && spec.upper.is_some() {
            warn!(
                parameter = %spec.name,
                lower = spec.lower.unwrap(),
                upper = spec.upper.unwrap(),
                "converting prior to uniform for MLE"
            );
            kind = PriorKind::Uniform;
        } else {
            warn!(parameter = %spec.name, "converting prior to flat for MLE");
            kind = PriorKind::Flat;
        }
    }

    let transform = match kind {
        PriorKind::Fixed => Transform::Identity,
        _ => transform_for(spec.lower, spec.upper),
    };
    let fixed_value = (kind == PriorKind::Fixed).then_some(spec.mean);

    BoundParam {
        name: spec.name.clone(),
        kind,
        transform,
        mean: spec.mean,
        sd: spec.sd,
        lower: spec.lower,
        upper: spec.upper,
        dynamic: spec.dynamic,
        fixed_value,
        hierarchical: hierarchical && fixed_value.is_none(),
    }
}

/// Pick the change of variables implied by the declared bounds.
fn transform_for(lower: Option<f64>, upper: Option<f64>) -> Transform {
    match (lower, upper) {
        (Some(lower), Some(upper)) => Transform::Interval { lower, upper },
        (Some(lower), None) => Transform::LowerBound { lower },
        _ => Transform::Identity,
    }
}

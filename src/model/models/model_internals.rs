//! Behavioral-model internals — θ-vector layout and the composed density.
//!
//! Purpose
//! -------
//! Own the mapping between the flat unconstrained coordinate vector `θ`
//! the estimation layer optimizes or samples and the natural-scale
//! parameter values the composition engine consumes. [`ThetaLayout`]
//! assigns every free parameter an explicit coordinate block (offset,
//! subject count, transform, optional hierarchical hyper-coordinates);
//! [`ModelDensity`] composes the prior, the change-of-variables Jacobian,
//! the trial recurrence, and the observation rule into one log density
//! served to all four estimation strategies through the shared
//! [`LogDensity`] trait.
//!
//! Conventions
//! -----------
//! - Coordinates are laid out block-by-block in role order (dynamic, then
//!   static, then free observation parameters); within a block, one
//!   coordinate per subject, followed by the group mean and group scale
//!   coordinates when the block is hierarchical.
//! - Fixed parameters own no coordinates; they decode to their pinned
//!   value. Shared observation parameters decode to the learning
//!   parameter they reference and likewise own no coordinates.
//! - Per-subject values broadcast to the run dimension during decoding:
//!   column `c` reads subject `c / n_runs`.
//! - The density is expressed over unconstrained coordinates: each prior
//!   term is evaluated on the natural scale and corrected by the
//!   transform's log-Jacobian.
use crate::{
    estimation::{
        density::{LogDensity, Theta},
        errors::{EstError, EstResult},
        summary::summarize_draws,
        transforms::Transform,
    },
    model::{
        core::{
            binding::{BoundParam, BoundSet, ObservationBinding, GROUP_SCALE_UPPER},
            objective::{log_likelihood, objective, ObjectiveKind},
            observation::{compose, ObservationPlan},
            recurrence::evaluate,
        },
        errors::ModelError,
        rules::{LearningRule, ObservationRule},
    },
};
use ndarray::{Array1, Array2};
use statrs::distribution::{Continuous, Normal};

/// Change of variables for the hierarchical group-scale coordinate.
const GROUP_SCALE_TRANSFORM: Transform =
    Transform::Interval { lower: 0.0, upper: GROUP_SCALE_UPPER };

/// Which bound-parameter list a coordinate block belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamRole {
    Dynamic(usize),
    Static(usize),
    Observation(usize),
}

/// Hyper-prior coordinates of a hierarchical block.
///
/// `mean` carries the group-level location (same transform as the subject
/// coordinates, same prior as the declared parameter); `scale` carries the
/// group-level spread under `Uniform(0, GROUP_SCALE_UPPER)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupCoords {
    pub mean: usize,
    pub scale: usize,
}

/// Coordinate block of one free parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordBlock {
    pub name: String,
    pub role: ParamRole,
    /// First subject coordinate; subjects occupy `offset..offset + n_subjects`.
    pub offset: usize,
    pub transform: Transform,
    pub group: Option<GroupCoords>,
}

/// Natural-scale parameter values decoded from one θ vector.
///
/// Every array has one entry per column (subject-run), in the order the
/// composition engine consumes them.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub seeds: Vec<Array1<f64>>,
    pub statics: Vec<Array1<f64>>,
    pub observation: Vec<Array1<f64>>,
}

/// Per-parameter per-subject estimate on the natural scale.
///
/// `sd` is `Some` for posterior methods (variational/MCMC) and `None` for
/// point estimates.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamEstimate {
    pub name: String,
    pub mean: Array1<f64>,
    pub sd: Option<Array1<f64>>,
}

/// Explicit layout of the unconstrained coordinate vector.
///
/// Built once per compiled model configuration from a [`BoundSet`];
/// every decode, prior evaluation, and back-transformation goes through
/// the resolved blocks rather than re-deriving positions by name.
#[derive(Debug, Clone, PartialEq)]
pub struct ThetaLayout {
    pub blocks: Vec<CoordBlock>,
    /// Total coordinate count (the `k` of BIC/AIC).
    pub dim: usize,
    pub n_subjects: usize,
    pub n_runs: usize,
    dynamic_blocks: Vec<Option<usize>>,
    static_blocks: Vec<Option<usize>>,
    observation_blocks: Vec<Option<usize>>,
}

impl ThetaLayout {
    /// Lay out coordinates for every free parameter in `bound`.
    pub fn build(bound: &BoundSet, n_subjects: usize, n_runs: usize) -> Self {
        let mut blocks = Vec::new();
        let mut dim = 0;

        let mut push_block =
            |p: &BoundParam, role: ParamRole, dim: &mut usize| -> Option<usize> {
                if !p.is_free() {
                    return None;
                }
                let offset = *dim;
                *dim += n_subjects;
                let group = p.hierarchical.then(|| {
                    let coords = GroupCoords { mean: *dim, scale: *dim + 1 };
                    *dim += 2;
                    coords
                });
                blocks.push(CoordBlock {
                    name: p.name.clone(),
                    role,
                    offset,
                    transform: p.transform,
                    group,
                });
                Some(blocks.len() - 1)
            };

        let dynamic_blocks = bound
            .dynamic
            .iter()
            .enumerate()
            .map(|(i, p)| push_block(p, ParamRole::Dynamic(i), &mut dim))
            .collect();
        let static_blocks = bound
            .statics
            .iter()
            .enumerate()
            .map(|(i, p)| push_block(p, ParamRole::Static(i), &mut dim))
            .collect();
        let observation_blocks = bound
            .observation
            .iter()
            .enumerate()
            .map(|(i, binding)| match binding {
                ObservationBinding::Free(p) => push_block(p, ParamRole::Observation(i), &mut dim),
                // Shared bindings reuse the learning parameter's coordinates.
                _ => None,
            })
            .collect();

        Self {
            blocks,
            dim,
            n_subjects,
            n_runs,
            dynamic_blocks,
            static_blocks,
            observation_blocks,
        }
    }

    /// Starting coordinates: every parameter at its declared prior mean.
    ///
    /// Group means start at the parameter mean; group scales at the
    /// declared sd (capped inside the group-scale support).
    pub fn initial_theta(&self, bound: &BoundSet) -> Theta {
        let mut theta = Array1::zeros(self.dim);
        for block in &self.blocks {
            let p = self.param(bound, block.role);
            let coord = block.transform.forward(p.mean);
            for s in 0..self.n_subjects {
                theta[block.offset + s] = coord;
            }
            if let Some(group) = block.group {
                theta[group.mean] = coord;
                let scale0 = p.sd.unwrap_or(1.0).clamp(1e-3, GROUP_SCALE_UPPER * 0.5);
                theta[group.scale] = GROUP_SCALE_TRANSFORM.forward(scale0);
            }
        }
        theta
    }

    /// Decode `θ` into natural-scale per-column values.
    pub fn decode(&self, bound: &BoundSet, theta: &Theta) -> Decoded {
        let n_cols = self.n_subjects * self.n_runs;
        let values = |block_idx: Option<usize>, p: &BoundParam| -> Array1<f64> {
            match block_idx {
                Some(b) => {
                    let block = &self.blocks[b];
                    Array1::from_shape_fn(n_cols, |c| {
                        block.transform.backward(theta[block.offset + c / self.n_runs])
                    })
                }
                None => Array1::from_elem(n_cols, p.fixed_value.unwrap_or(p.mean)),
            }
        };

        let seeds: Vec<Array1<f64>> = bound
            .dynamic
            .iter()
            .enumerate()
            .map(|(i, p)| values(self.dynamic_blocks[i], p))
            .collect();
        let statics: Vec<Array1<f64>> = bound
            .statics
            .iter()
            .enumerate()
            .map(|(i, p)| values(self.static_blocks[i], p))
            .collect();
        let observation = bound
            .observation
            .iter()
            .enumerate()
            .map(|(i, binding)| match binding {
                ObservationBinding::Free(p) => values(self.observation_blocks[i], p),
                ObservationBinding::SharedDynamic(j) => seeds[*j].clone(),
                ObservationBinding::SharedStatic(j) => statics[*j].clone(),
            })
            .collect();

        Decoded { seeds, statics, observation }
    }

    /// Log prior density plus log-Jacobian, evaluated at `θ`.
    ///
    /// Hierarchical blocks score subject values under `N(μ_g, σ_g)` with
    /// the group mean under the parameter's declared prior and the group
    /// scale under `Uniform(0, GROUP_SCALE_UPPER)`; non-hierarchical
    /// blocks score subject values under the declared prior directly.
    pub fn log_prior(&self, bound: &BoundSet, theta: &Theta) -> f64 {
        let mut lp = 0.0;
        for block in &self.blocks {
            let p = self.param(bound, block.role);
            match block.group {
                Some(group) => {
                    let mu = block.transform.backward(theta[group.mean]);
                    let sigma = GROUP_SCALE_TRANSFORM.backward(theta[group.scale]);
                    lp += p.log_prior(mu) + block.transform.log_jacobian(theta[group.mean]);
                    lp += -GROUP_SCALE_UPPER.ln()
                        + GROUP_SCALE_TRANSFORM.log_jacobian(theta[group.scale]);
                    let subject_prior = match Normal::new(mu, sigma) {
                        Ok(d) => d,
                        Err(_) => return f64::NEG_INFINITY,
                    };
                    for s in 0..self.n_subjects {
                        let coord = theta[block.offset + s];
                        let v = block.transform.backward(coord);
                        lp += subject_prior.ln_pdf(v) + block.transform.log_jacobian(coord);
                    }
                }
                None => {
                    for s in 0..self.n_subjects {
                        let coord = theta[block.offset + s];
                        let v = block.transform.backward(coord);
                        lp += p.log_prior(v) + block.transform.log_jacobian(coord);
                    }
                }
            }
        }
        lp
    }

    /// Natural-scale per-subject estimates at a single `θ̂`.
    pub fn point_estimates(&self, theta: &Theta) -> Vec<ParamEstimate> {
        self.blocks
            .iter()
            .map(|block| ParamEstimate {
                name: block.name.clone(),
                mean: Array1::from_shape_fn(self.n_subjects, |s| {
                    block.transform.backward(theta[block.offset + s])
                }),
                sd: None,
            })
            .collect()
    }

    /// Natural-scale per-subject posterior summaries of a draw matrix.
    ///
    /// Draws are mapped through the block's backward transform first, so
    /// the moments live on the scale the priors were declared on.
    pub fn posterior_estimates(&self, draws: &Array2<f64>) -> Vec<ParamEstimate> {
        self.blocks
            .iter()
            .map(|block| {
                let natural = Array2::from_shape_fn((draws.nrows(), self.n_subjects), |(d, s)| {
                    block.transform.backward(draws[[d, block.offset + s]])
                });
                let summary = summarize_draws(&natural);
                ParamEstimate {
                    name: block.name.clone(),
                    mean: summary.iter().map(|c| c.mean).collect(),
                    sd: Some(summary.iter().map(|c| c.sd).collect()),
                }
            })
            .collect()
    }

    fn param<'a>(&self, bound: &'a BoundSet, role: ParamRole) -> &'a BoundParam {
        match role {
            ParamRole::Dynamic(i) => &bound.dynamic[i],
            ParamRole::Static(i) => &bound.statics[i],
            ParamRole::Observation(i) => bound.observation_param(&bound.observation[i]),
        }
    }
}

/// Trial-major data evaluated by the composed density.
///
/// Both matrices are `(trials, columns)` with identical shapes; the fit
/// entry point validates and broadcasts before construction.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialData {
    pub outcomes: Array2<f64>,
    pub responses: Array2<f64>,
}

/// The composed log-posterior density of one compiled model.
///
/// `value` = log prior (with Jacobian) + the configured objective of the
/// recurrence/observation composition. All four estimation strategies
/// consume this through [`LogDensity`]; gradients fall back to finite
/// differences in the estimation layer.
pub struct ModelDensity<'a> {
    pub learning: &'a dyn LearningRule,
    pub observation: Option<&'a dyn ObservationRule>,
    pub bound: &'a BoundSet,
    pub layout: &'a ThetaLayout,
    pub plan: &'a ObservationPlan,
    pub objective: ObjectiveKind,
}

impl ModelDensity<'_> {
    /// Probability sequence at `θ`.
    ///
    /// Composition arity was validated when the model was declared, so
    /// the error mapping here is a formality for the estimation boundary.
    fn probabilities(&self, theta: &Theta, data: &TrialData) -> EstResult<Array2<f64>> {
        let decoded = self.layout.decode(self.bound, theta);
        let trajectory =
            evaluate(self.learning, &data.outcomes, &decoded.seeds, &decoded.statics, false)
                .map_err(invalid_composition)?;
        let (probs, _) = compose(self.observation, self.plan, &trajectory, &decoded.observation)
            .map_err(invalid_composition)?;
        Ok(probs)
    }

    /// Log-likelihood of the responses at `θ`, independent of the
    /// configured objective. Used for the fit summaries (ll/BIC/AIC).
    pub fn log_likelihood_at(&self, theta: &Theta, data: &TrialData) -> EstResult<f64> {
        let probs = self.probabilities(theta, data)?;
        Ok(log_likelihood(&data.responses, &probs))
    }
}

impl LogDensity for ModelDensity<'_> {
    type Data = TrialData;

    fn dim(&self) -> usize {
        self.layout.dim
    }

    fn value(&self, theta: &Theta, data: &TrialData) -> EstResult<f64> {
        let prior = self.layout.log_prior(self.bound, theta);
        if !prior.is_finite() {
            // Out-of-support priors reject the draw; the samplers treat a
            // -inf density as divergent rather than as an error.
            return Ok(f64::NEG_INFINITY);
        }
        let probs = self.probabilities(theta, data)?;
        Ok(prior + objective(self.objective, &data.responses, &probs))
    }
}

fn invalid_composition(e: ModelError) -> EstError {
    EstError::Composition { text: e.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        estimation::density::check_start,
        model::{
            core::{bind, spec::ParamSpec},
            rules::{RescorlaWagner, Softmax},
        },
    };
    use approx::assert_relative_eq;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Coordinate allocation (free vs fixed, hierarchical hyper-coords).
    // - Decode broadcasting from subjects to subject-run columns.
    // - The prior + Jacobian accounting of `log_prior`.
    // - The composed density against a hand-computed value.
    // -------------------------------------------------------------------------

    fn rw_bound(n_subjects: usize, hierarchical: bool) -> BoundSet {
        let learning = vec![
            ParamSpec::fixed("value", 0.5).unwrap().dynamic(),
            ParamSpec::bounded_normal("alpha", 0.4, 0.2, 0.0, 1.0).unwrap(),
        ];
        let observation = vec![ParamSpec::bounded_normal("beta", 3.0, 1.0, 0.0, 20.0).unwrap()];
        bind(&learning, &observation, n_subjects, false, hierarchical).unwrap()
    }

    #[test]
    fn fixed_parameters_own_no_coordinates() {
        let bound = rw_bound(3, false);
        let layout = ThetaLayout::build(&bound, 3, 2);
        // alpha and beta are free, value is fixed: 2 blocks × 3 subjects.
        assert_eq!(layout.blocks.len(), 2);
        assert_eq!(layout.dim, 6);
        assert_eq!(layout.blocks[0].name, "alpha");
        assert_eq!(layout.blocks[1].name, "beta");
        assert_eq!(layout.blocks[1].offset, 3);
    }

    #[test]
    fn hierarchical_blocks_carry_two_hyper_coordinates() {
        let bound = rw_bound(4, true);
        let layout = ThetaLayout::build(&bound, 4, 1);
        // (4 subjects + mean + scale) per free parameter.
        assert_eq!(layout.dim, 12);
        let group = layout.blocks[0].group.expect("free block is hierarchical");
        assert_eq!(group.mean, 4);
        assert_eq!(group.scale, 5);
    }

    #[test]
    fn decode_broadcasts_subjects_across_runs() {
        let bound = rw_bound(2, false);
        let layout = ThetaLayout::build(&bound, 2, 3);
        let mut theta = layout.initial_theta(&bound);
        // Distinct alpha per subject.
        theta[0] = bound.statics[0].forward(0.2);
        theta[1] = bound.statics[0].forward(0.8);
        let decoded = layout.decode(&bound, &theta);
        assert_eq!(decoded.seeds[0], Array1::from_elem(6, 0.5));
        let alpha = &decoded.statics[0];
        for c in 0..3 {
            assert_relative_eq!(alpha[c], 0.2, max_relative = 1e-8);
            assert_relative_eq!(alpha[c + 3], 0.8, max_relative = 1e-8);
        }
        assert_eq!(decoded.observation.len(), 1);
    }

    #[test]
    fn initial_theta_decodes_back_to_prior_means() {
        let bound = rw_bound(1, false);
        let layout = ThetaLayout::build(&bound, 1, 1);
        let decoded = layout.decode(&bound, &layout.initial_theta(&bound));
        assert_relative_eq!(decoded.statics[0][0], 0.4, max_relative = 1e-8);
        assert_relative_eq!(decoded.observation[0][0], 3.0, max_relative = 1e-8);
    }

    #[test]
    fn log_prior_includes_the_jacobian() {
        let bound = rw_bound(1, false);
        let layout = ThetaLayout::build(&bound, 1, 1);
        let theta = layout.initial_theta(&bound);
        let mut expected = 0.0;
        for block in &layout.blocks {
            let p = layout.param(&bound, block.role);
            let coord = theta[block.offset];
            expected += p.log_prior(block.transform.backward(coord))
                + block.transform.log_jacobian(coord);
        }
        assert_relative_eq!(layout.log_prior(&bound, &theta), expected, max_relative = 1e-12);
    }

    #[test]
    fn density_is_prior_plus_objective() {
        let bound = rw_bound(1, false);
        let layout = ThetaLayout::build(&bound, 1, 1);
        let plan = ObservationPlan { input_indices: vec![0] };
        let density = ModelDensity {
            learning: &RescorlaWagner,
            observation: Some(&Softmax),
            bound: &bound,
            layout: &layout,
            plan: &plan,
            objective: ObjectiveKind::LogLikelihood,
        };
        let data = TrialData {
            outcomes: array![[1.0], [1.0], [0.0]],
            responses: array![[1.0], [1.0], [0.0]],
        };
        let theta = layout.initial_theta(&bound);
        let value = density.value(&theta, &data).unwrap();
        let prior = layout.log_prior(&bound, &theta);
        let ll = density.log_likelihood_at(&theta, &data).unwrap();
        assert_relative_eq!(value, prior + ll, max_relative = 1e-12);
        assert!(ll < 0.0);
    }

    #[test]
    fn start_checks_reject_wrong_dimension_and_non_finite_coordinates() {
        let bound = rw_bound(1, false);
        let layout = ThetaLayout::build(&bound, 1, 1);
        let plan = ObservationPlan { input_indices: vec![0] };
        let density = ModelDensity {
            learning: &RescorlaWagner,
            observation: Some(&Softmax),
            bound: &bound,
            layout: &layout,
            plan: &plan,
            objective: ObjectiveKind::LogLikelihood,
        };
        let err = check_start(&density, &array![0.0]).unwrap_err();
        assert!(matches!(err, EstError::ThetaDimMismatch { expected: 2, found: 1 }));
        let err = check_start(&density, &array![0.0, f64::NAN]).unwrap_err();
        assert!(matches!(err, EstError::NonFiniteCoordinate { index: 1, .. }));
    }

    #[test]
    fn point_estimates_back_transform_each_subject() {
        let bound = rw_bound(2, false);
        let layout = ThetaLayout::build(&bound, 2, 1);
        let mut theta = layout.initial_theta(&bound);
        theta[0] = bound.statics[0].forward(0.25);
        theta[1] = bound.statics[0].forward(0.75);
        let estimates = layout.point_estimates(&theta);
        assert_eq!(estimates[0].name, "alpha");
        assert_relative_eq!(estimates[0].mean[0], 0.25, max_relative = 1e-8);
        assert_relative_eq!(estimates[0].mean[1], 0.75, max_relative = 1e-8);
        assert!(estimates[0].sd.is_none());
    }

    #[test]
    fn posterior_estimates_summarize_on_the_natural_scale() {
        let bound = rw_bound(1, false);
        let layout = ThetaLayout::build(&bound, 1, 1);
        let t = bound.statics[0].transform;
        let draws = array![
            [t.forward(0.3), 0.0],
            [t.forward(0.5), 0.0],
            [t.forward(0.7), 0.0],
        ];
        let estimates = layout.posterior_estimates(&draws);
        assert_relative_eq!(estimates[0].mean[0], 0.5, max_relative = 1e-8);
        let sd = estimates[0].sd.as_ref().unwrap();
        assert!(sd[0] > 0.0);
    }
}

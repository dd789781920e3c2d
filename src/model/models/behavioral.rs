//! BehavioralModel — fit and simulation entry points.
//!
//! Purpose
//! -------
//! Bind one learning rule, its parameter declarations, and an optional
//! observation rule into a fittable model instance. `fit` dispatches one
//! of four estimation strategies (MLE, MAP, variational, MCMC) against
//! the composed log density; `simulate` runs the same composition forward
//! to synthesize responses.
//!
//! Key behaviors
//! -------------
//! - Arity and observation-input markers are validated and resolved once,
//!   at construction; evaluation never re-resolves by name.
//! - The compiled form (bound priors + θ layout) is cached under an
//!   explicit [`CacheKey`]; re-fitting with the same method, subject
//!   count, and run count reuses it and only swaps the data arrays.
//! - MLE delegates to the MAP path under flattened priors. A diverging
//!   point optimization is rewrapped as [`ModelError::FittingFailed`];
//!   the posterior strategies propagate their errors unchanged.
//! - Every successful fit records log-likelihood, BIC and AIC at the
//!   point (or posterior-mean) estimate, and runs recovery analysis
//!   automatically when simulated ground truth is attached to the data.
use crate::{
    estimation::{
        advi,
        errors::EstError,
        hmc,
        map::maximize,
    },
    model::{
        core::{
            binding::bind,
            data::{broadcast_outcomes, validate_trial_lengths, ResponseSet},
            observation::{resolve_inputs, ObservationPlan},
            options::{FitMethod, FitOptions, SimOptions},
            recurrence::validate_arity,
            spec::ParamSpec,
        },
        errors::{ModelError, ModelResult},
        models::model_internals::{ModelDensity, ParamEstimate, ThetaLayout, TrialData},
        recovery::{recover, RecoveryResult},
        rules::{LearningRule, ObservationRule},
        simulate::{self, SimPlan, SimulationResult},
    },
};
use ndarray::{Array2, Axis};
use tracing::warn;

/// Cache key of the compiled model form.
///
/// The bound priors and θ layout depend on exactly these values; any
/// change invalidates the compiled form, anything else (new data arrays)
/// reuses it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheKey {
    pub method: FitMethod,
    pub n_subjects: usize,
    pub n_runs: usize,
    pub hierarchical: bool,
}

/// Compiled model form reused across fits with an unchanged [`CacheKey`].
#[derive(Debug, Clone, PartialEq)]
struct Compiled {
    key: CacheKey,
    bound: crate::model::core::binding::BoundSet,
    layout: ThetaLayout,
}

/// Result of one estimation call; overwritten on re-fit.
#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    pub method: FitMethod,
    /// Per-parameter per-subject estimates (free parameters only).
    pub estimates: Vec<ParamEstimate>,
    pub log_likelihood: f64,
    pub bic: f64,
    pub aic: f64,
    pub recovery: Option<RecoveryResult>,
}

impl FitResult {
    /// Estimate for a parameter, by name.
    pub fn estimate(&self, name: &str) -> Option<&ParamEstimate> {
        self.estimates.iter().find(|e| e.name == name)
    }
}

/// One learning rule + parameters + optional observation rule, bound to
/// subject/run/trial dimensions lazily on the first `fit` or `simulate`.
pub struct BehavioralModel {
    pub(crate) learning: Box<dyn LearningRule>,
    pub(crate) learning_params: Vec<ParamSpec>,
    pub(crate) observation: Option<Box<dyn ObservationRule>>,
    pub(crate) observation_params: Vec<ParamSpec>,
    pub(crate) plan: ObservationPlan,
    pub(crate) sim_plan: SimPlan,
    pub(crate) fit_result: Option<FitResult>,
    compiled: Option<Compiled>,
}

impl std::fmt::Debug for BehavioralModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BehavioralModel")
            .field("learning_params", &self.learning_params)
            .field("observation_params", &self.observation_params)
            .field("plan", &self.plan)
            .field("sim_plan", &self.sim_plan)
            .field("fit_result", &self.fit_result)
            .finish()
    }
}

impl BehavioralModel {
    /// Declare a model and resolve its wiring.
    ///
    /// `observation_inputs` are markers naming dynamic learning parameters
    /// whose carried series feed the observation rule (in addition to the
    /// primary value series, which is always included first).
    ///
    /// # Errors
    /// - [`ModelError::DynamicArityMismatch`] when the declared dynamic
    ///   parameters disagree with the rule's carried-output count.
    /// - [`ModelError::ObservationInputUnknown`] for a marker that does
    ///   not name a dynamic learning parameter.
    /// - [`ModelError::ObservationArityMismatch`] when the observation
    ///   rule consumes a different number of dynamic inputs than resolved.
    /// - [`ModelError::InvalidPrior`] for duplicate parameter names.
    pub fn new(
        learning: Box<dyn LearningRule>, learning_params: Vec<ParamSpec>,
        observation: Option<Box<dyn ObservationRule>>, observation_params: Vec<ParamSpec>,
        observation_inputs: Vec<String>,
    ) -> ModelResult<Self> {
        check_unique_names(&learning_params)?;
        check_unique_names(&observation_params)?;
        let n_dynamic = learning_params.iter().filter(|p| p.dynamic).count();
        validate_arity(learning.as_ref(), n_dynamic)?;
        let plan = resolve_inputs(&observation_inputs, &learning_params)?;
        if let Some(rule) = &observation {
            if rule.n_dynamic_inputs() != plan.input_indices.len() {
                return Err(ModelError::ObservationArityMismatch {
                    declared: rule.n_dynamic_inputs(),
                    resolved: plan.input_indices.len(),
                });
            }
        }
        let sim_plan = SimPlan::build(
            learning.as_ref(),
            &learning_params,
            observation.as_deref(),
            &observation_params,
        );
        Ok(Self {
            learning,
            learning_params,
            observation,
            observation_params,
            plan,
            sim_plan,
            fit_result: None,
            compiled: None,
        })
    }

    /// Result of the most recent fit, if any.
    pub fn fit_result(&self) -> Option<&FitResult> {
        self.fit_result.as_ref()
    }

    /// Fit the model to observed responses.
    ///
    /// `outcomes` is `(trials, sequences)`; sequences are tiled to the
    /// subject-run columns when fewer are supplied (with a warning).
    ///
    /// # Errors
    /// - Shape/configuration errors from the data containers and binder.
    /// - [`ModelError::FittingFailed`] when point estimation diverges.
    /// - [`ModelError::Estimation`] for sampler failures.
    pub fn fit(
        &mut self, data: &ResponseSet, outcomes: &Array2<f64>, opts: &FitOptions,
    ) -> ModelResult<&FitResult> {
        validate_trial_lengths(data.n_trials(), outcomes.nrows())?;

        let mut hierarchical = opts.hierarchical;
        if hierarchical && data.n_subjects() < 2 {
            warn!("hierarchical estimation is undefined for a single subject, fitting individually");
            hierarchical = false;
        }

        let key = CacheKey {
            method: opts.method,
            n_subjects: data.n_subjects(),
            n_runs: data.n_runs,
            hierarchical,
        };
        let compiled = match self.compiled.take() {
            Some(c) if c.key == key => c,
            _ => {
                let bound = bind(
                    &self.learning_params,
                    &self.observation_params,
                    key.n_subjects,
                    key.method == FitMethod::Mle,
                    hierarchical,
                )?;
                let layout = ThetaLayout::build(&bound, key.n_subjects, key.n_runs);
                Compiled { key, bound, layout }
            }
        };

        // Trial-major layout: responses arrive (subject-runs, trials).
        let trial_data = TrialData {
            outcomes: broadcast_outcomes(outcomes, data.n_cols())?,
            responses: data.responses.t().to_owned(),
        };
        let density = ModelDensity {
            learning: self.learning.as_ref(),
            observation: self.observation.as_deref(),
            bound: &compiled.bound,
            layout: &compiled.layout,
            plan: &self.plan,
            objective: opts.objective,
        };
        let theta0 = compiled.layout.initial_theta(&compiled.bound);

        let (estimates, ll) = match opts.method {
            FitMethod::Mle | FitMethod::Map => {
                let outcome = maximize(&density, theta0, &trial_data, &opts.map)
                    .map_err(|source| ModelError::FittingFailed { source })?;
                let ll = density.log_likelihood_at(&outcome.theta_hat, &trial_data)?;
                (compiled.layout.point_estimates(&outcome.theta_hat), ll)
            }
            FitMethod::Variational => {
                let draws = advi::fit(&density, &trial_data, theta0, &opts.advi)?;
                let ll = posterior_mean_ll(&density, &draws, &trial_data)?;
                (compiled.layout.posterior_estimates(&draws), ll)
            }
            FitMethod::Mcmc => {
                let draws = hmc::sample(&density, &trial_data, theta0, &opts.hmc)?;
                let ll = posterior_mean_ll(&density, &draws, &trial_data)?;
                (compiled.layout.posterior_estimates(&draws), ll)
            }
        };

        let k = compiled.layout.dim as f64;
        let n = data.n_trials() as f64;
        let bic = k * n.ln() - 2.0 * ll;
        let aic = 2.0 * (k - ll);

        let recovery = match (&data.ground_truth, opts.recovery) {
            (Some(gt), _) => recover(&estimates, gt)?,
            (None, true) => {
                warn!("parameter recovery requested but no simulated ground truth is attached");
                None
            }
            (None, false) => None,
        };

        self.compiled = Some(compiled);
        let result =
            FitResult { method: opts.method, estimates, log_likelihood: ll, bic, aic, recovery };
        Ok(self.fit_result.insert(result))
    }

    /// Run the model forward to synthesize responses.
    ///
    /// Parameter values come from the supplied lists or, when both are
    /// omitted, from the most recent fit's per-subject means (free
    /// parameters not covered by either source fall back to their
    /// declared means).
    ///
    /// # Errors
    /// - [`ModelError::NoParameterValues`] with neither values nor a fit.
    /// - [`ModelError::ParameterValueMissing`] /
    ///   [`ModelError::ParameterLengthMismatch`] for incomplete or
    ///   unpaired value lists.
    /// - [`ModelError::OutcomeTileMismatch`] when outcome sequences do
    ///   not divide the simulated-subject count.
    pub fn simulate(
        &self, outcomes: &Array2<f64>, learning_values: Option<&[(String, Vec<f64>)]>,
        observation_values: Option<&[(String, Vec<f64>)]>, opts: &SimOptions,
    ) -> ModelResult<SimulationResult> {
        simulate::run(self, outcomes, learning_values, observation_values, opts)
    }
}

fn check_unique_names(specs: &[ParamSpec]) -> ModelResult<()> {
    for (i, p) in specs.iter().enumerate() {
        if specs[..i].iter().any(|q| q.name == p.name) {
            return Err(ModelError::InvalidPrior {
                name: p.name.clone(),
                reason: "Parameter names must be unique within a model.",
            });
        }
    }
    Ok(())
}

fn posterior_mean_ll(
    density: &ModelDensity<'_>, draws: &Array2<f64>, data: &TrialData,
) -> ModelResult<f64> {
    let theta_mean = draws
        .mean_axis(Axis(0))
        .ok_or(ModelError::Estimation { source: EstError::MissingThetaHat })?;
    Ok(density.log_likelihood_at(&theta_mean, data)?)
}

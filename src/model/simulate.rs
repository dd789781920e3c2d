//! Forward simulation: parameter grids → synthesized responses.
//!
//! Purpose
//! -------
//! Run the composed recurrence + observation machinery forward under
//! explicit parameter values (or the most recent fit's means) to
//! synthesize choice data, including record-only learning outputs, a
//! Bernoulli-drawn `choices` series, and optional response noise.
//!
//! Key behaviors
//! -------------
//! - Value grids expand either as a Cartesian product (`combinations`) or
//!   as already-paired tuples (all lists sharing one length; singleton
//!   lists broadcast). Each combination is replicated `n_subjects` times,
//!   except when values came from a fit, where combinations already are
//!   per-subject.
//! - Outcome sequences are tiled to the simulated-subject columns with a
//!   warning; non-divisible counts are a configuration error.
//! - The simulation wiring (observation value sources, output-name
//!   ordering) is resolved once, at model declaration, in a [`SimPlan`]
//!   and reused by every simulate call until the model is redeclared.
//! - Each simulated subject is labeled with its concatenated parameter
//!   values and its run index, so exported response files stay traceable
//!   back to the grid.
use crate::model::{
    core::{
        data::{broadcast_outcomes, GroundTruth},
        observation::compose,
        options::SimOptions,
        recurrence::evaluate,
        spec::ParamSpec,
    },
    errors::{ModelError, ModelResult},
    models::behavioral::BehavioralModel,
    rules::{LearningRule, ObservationRule},
};
use itertools::Itertools;
use ndarray::{Array1, Array2};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use tracing::warn;

/// Where one observation parameter's simulation values come from.
///
/// Resolved once at model declaration: an observation parameter naming a
/// learning parameter reads that parameter's grid column instead of
/// carrying its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ObsSource {
    Own,
    Learning(usize),
}

/// Construction-time simulation wiring, cached on the model.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SimPlan {
    pub obs_sources: Vec<ObsSource>,
    pub output_names: Vec<String>,
}

impl SimPlan {
    pub fn build(
        learning: &dyn LearningRule, learning_params: &[ParamSpec],
        observation: Option<&dyn ObservationRule>, observation_params: &[ParamSpec],
    ) -> Self {
        let obs_sources = observation_params
            .iter()
            .map(|spec| {
                match learning_params.iter().position(|p| p.name == spec.name) {
                    Some(i) => ObsSource::Learning(i),
                    None => ObsSource::Own,
                }
            })
            .collect();
        let mut output_names: Vec<String> =
            learning.output_names().iter().map(|n| n.to_string()).collect();
        if let Some(rule) = observation {
            output_names.extend(rule.output_names().iter().skip(1).map(|n| n.to_string()));
        }
        Self { obs_sources, output_names }
    }
}

/// Everything one `simulate` call produces.
///
/// All series are `(trials, columns)` with one column per simulated
/// subject-run; grids, labels, and run indices are per column.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationResult {
    /// Learning outputs, observation outputs (minus the probability), and
    /// the optional noise-perturbed series, in declaration order.
    pub outputs: Vec<(String, Array2<f64>)>,
    pub probabilities: Array2<f64>,
    /// Bernoulli draws against the (possibly noise-perturbed) probability.
    pub choices: Array2<f64>,
    /// Per-column simulated values of each learning parameter.
    pub learning_grid: Vec<(String, Vec<f64>)>,
    /// Per-column simulated values of each non-shared observation parameter.
    pub observation_grid: Vec<(String, Vec<f64>)>,
    pub row_labels: Vec<String>,
    pub run_indices: Vec<usize>,
    pub runs_per_subject: usize,
    /// Outcomes after tiling to the simulated columns.
    pub outcomes: Array2<f64>,
}

impl SimulationResult {
    /// Output series by name.
    pub fn output(&self, name: &str) -> Option<&Array2<f64>> {
        self.outputs.iter().find(|(n, _)| n == name).map(|(_, a)| a)
    }

    pub fn n_columns(&self) -> usize {
        self.choices.ncols()
    }

    /// Choices transposed to `(rows, trials)`, row order matching
    /// `row_labels` — the layout a response-file writer consumes.
    pub fn response_rows(&self) -> Array2<f64> {
        self.choices.t().to_owned()
    }

    /// Simulated parameter values as a recovery ground-truth table, one
    /// row per simulated subject (every `runs_per_subject`-th column).
    pub fn ground_truth(&self) -> GroundTruth {
        let grid: Vec<&(String, Vec<f64>)> =
            self.learning_grid.iter().chain(self.observation_grid.iter()).collect();
        let n_subjects = self.n_columns() / self.runs_per_subject;
        let mut values = Array2::zeros((n_subjects, grid.len()));
        for (j, (_, column)) in grid.iter().enumerate() {
            for s in 0..n_subjects {
                values[[s, j]] = column[s * self.runs_per_subject];
            }
        }
        GroundTruth {
            parameters: grid.iter().map(|(n, _)| n.clone()).collect(),
            values,
        }
    }
}

/// Simulate the model forward; see [`BehavioralModel::simulate`].
pub(crate) fn run(
    model: &BehavioralModel, outcomes: &Array2<f64>,
    learning_values: Option<&[(String, Vec<f64>)]>,
    observation_values: Option<&[(String, Vec<f64>)]>, opts: &SimOptions,
) -> ModelResult<SimulationResult> {
    if !opts.noise_sd.is_finite() || opts.noise_sd < 0.0 {
        return Err(ModelError::InvalidPrior {
            name: "noise_sd".to_string(),
            reason: "Response-noise sd must be finite and non-negative.",
        });
    }

    let explicit = learning_values.is_some() || observation_values.is_some();
    if !explicit && model.fit_result.is_none() {
        return Err(ModelError::NoParameterValues);
    }

    // One value list per learning parameter, then per own observation
    // parameter, aligned with the grid columns.
    let mut names: Vec<String> = Vec::new();
    let mut lists: Vec<Vec<f64>> = Vec::new();
    for spec in &model.learning_params {
        names.push(spec.name.clone());
        lists.push(value_list(model, spec, learning_values, explicit)?);
    }
    let mut own_obs_names: Vec<String> = Vec::new();
    for (spec, source) in model.observation_params.iter().zip(&model.sim_plan.obs_sources) {
        if matches!(source, ObsSource::Own) {
            names.push(spec.name.clone());
            own_obs_names.push(spec.name.clone());
            lists.push(value_list(model, spec, observation_values, explicit)?);
        }
    }

    let combos: Vec<Vec<f64>> = if explicit && opts.combinations {
        lists.iter().map(|l| l.iter().copied()).multi_cartesian_product().collect()
    } else {
        pair_lists(&names, &lists)?
    };
    if combos.is_empty() {
        return Err(ModelError::EmptyData { what: "Parameter value lists" });
    }

    // Fit-derived combinations are already one per subject.
    let reps_subject = if explicit { opts.n_subjects.max(1) } else { 1 };
    let runs = opts.runs_per_subject.max(1);
    let cols_per_combo = reps_subject * runs;
    let n_cols = combos.len() * cols_per_combo;

    let grid_column = |g: usize| -> Vec<f64> {
        (0..n_cols).map(|c| combos[c / cols_per_combo][g]).collect()
    };
    let grid_array = |g: usize| Array1::from_vec(grid_column(g));

    // Split the grid back into the composition engine's roles.
    let mut seeds = Vec::new();
    let mut statics = Vec::new();
    for (i, spec) in model.learning_params.iter().enumerate() {
        if spec.dynamic {
            seeds.push(grid_array(i));
        } else {
            statics.push(grid_array(i));
        }
    }
    let n_learning = model.learning_params.len();
    let mut own_seen = 0;
    let obs_values: Vec<Array1<f64>> = model
        .sim_plan
        .obs_sources
        .iter()
        .map(|source| match source {
            ObsSource::Learning(i) => grid_array(*i),
            ObsSource::Own => {
                let arr = grid_array(n_learning + own_seen);
                own_seen += 1;
                arr
            }
        })
        .collect();

    let tiled = broadcast_outcomes(outcomes, n_cols)?;
    let trajectory = evaluate(model.learning.as_ref(), &tiled, &seeds, &statics, true)?;
    let (probabilities, extras) =
        compose(model.observation.as_deref(), &model.plan, &trajectory, &obs_values)?;
    if probabilities.iter().any(|p| p.is_nan()) {
        warn!("NaNs present in simulated probabilities, check parameter ranges");
    }

    let mut rng = match opts.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    // Response noise, clipped to the observed outcome range.
    let noisy = if opts.noise_sd > 0.0 {
        let (lo, hi) = outcome_range(&tiled);
        let noise = Normal::new(opts.noise_mean, opts.noise_sd).map_err(|_| {
            ModelError::InvalidPrior {
                name: "noise_mean".to_string(),
                reason: "Response-noise mean must be finite.",
            }
        })?;
        let target = if opts.perturb_value { &trajectory.carried[0] } else { &probabilities };
        let name = if opts.perturb_value { "value_noisy" } else { "prob_noisy" };
        Some((
            name.to_string(),
            target.mapv(|v| (v + noise.sample(&mut rng)).clamp(lo, hi)),
        ))
    } else {
        None
    };

    let choice_probs = match &noisy {
        Some((_, p)) if !opts.perturb_value => p,
        _ => &probabilities,
    };
    let choices =
        choice_probs.mapv(|p| if rng.gen::<f64>() < p.clamp(0.0, 1.0) { 1.0 } else { 0.0 });

    // Ordered output assembly: learning outputs, observation extras, noise.
    let n_carried = model.learning.n_carried();
    let mut outputs: Vec<(String, Array2<f64>)> = Vec::new();
    for (i, name) in model.sim_plan.output_names.iter().enumerate() {
        let series = if i < n_carried {
            trajectory.carried[i].clone()
        } else if i < model.learning.n_outputs() {
            trajectory.records[i - n_carried].clone()
        } else {
            extras[i - model.learning.n_outputs()].clone()
        };
        outputs.push((name.clone(), series));
    }
    if let Some(noisy) = noisy {
        outputs.push(noisy);
    }

    let learning_grid = model
        .learning_params
        .iter()
        .enumerate()
        .map(|(i, spec)| (spec.name.clone(), grid_column(i)))
        .collect();
    let observation_grid = own_obs_names
        .iter()
        .enumerate()
        .map(|(k, name)| (name.clone(), grid_column(n_learning + k)))
        .collect();

    let row_labels = (0..n_cols)
        .map(|c| {
            combos[c / cols_per_combo]
                .iter()
                .map(|v| format!("{v}"))
                .collect::<Vec<_>>()
                .join("_")
        })
        .collect();
    let run_indices = (0..n_cols).map(|c| c % runs).collect();

    Ok(SimulationResult {
        outputs,
        probabilities,
        choices,
        learning_grid,
        observation_grid,
        row_labels,
        run_indices,
        runs_per_subject: runs,
        outcomes: tiled,
    })
}

/// Values for one parameter: the supplied list, the fit's per-subject
/// means, or the declared mean for parameters neither source covers.
fn value_list(
    model: &BehavioralModel, spec: &ParamSpec, supplied: Option<&[(String, Vec<f64>)]>,
    explicit: bool,
) -> ModelResult<Vec<f64>> {
    if let Some(list) = supplied.and_then(|vs| {
        vs.iter().find(|(name, _)| name == &spec.name).map(|(_, list)| list)
    }) {
        if list.is_empty() {
            return Err(ModelError::ParameterValueMissing { name: spec.name.clone() });
        }
        return Ok(list.clone());
    }
    if explicit {
        // Free parameters need explicit values; fixed ones fall back to
        // their pinned value.
        if spec.is_free() {
            return Err(ModelError::ParameterValueMissing { name: spec.name.clone() });
        }
        return Ok(vec![spec.mean]);
    }
    match model.fit_result.as_ref().and_then(|fit| fit.estimate(&spec.name)) {
        Some(estimate) => Ok(estimate.mean.to_vec()),
        None => Ok(vec![spec.mean]),
    }
}

/// Pair value lists into tuples; singleton lists broadcast.
fn pair_lists(names: &[String], lists: &[Vec<f64>]) -> ModelResult<Vec<Vec<f64>>> {
    let len = lists.iter().map(|l| l.len()).max().unwrap_or(0);
    for (name, list) in names.iter().zip(lists) {
        if list.len() != len && list.len() != 1 {
            return Err(ModelError::ParameterLengthMismatch {
                name: name.clone(),
                expected: len,
                actual: list.len(),
            });
        }
    }
    Ok((0..len)
        .map(|r| {
            lists
                .iter()
                .map(|list| if list.len() == 1 { list[0] } else { list[r] })
                .collect()
        })
        .collect())
}

fn outcome_range(outcomes: &Array2<f64>) -> (f64, f64) {
    outcomes.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
        (lo.min(v), hi.max(v))
    })
}

//! Fitting and simulation configuration.
//!
//! Options are validated-by-construction where a bad value would only
//! surface deep inside a run; enumerated choices parse via `FromStr` with
//! configuration errors on unknown names, matching the estimation layer's
//! convention.
use crate::{
    estimation::{advi::AdviOptions, hmc::HmcOptions, map::MapOptions},
    model::{
        core::objective::ObjectiveKind,
        errors::ModelError,
    },
};
use std::str::FromStr;

/// Estimation strategy dispatched by `fit`.
///
/// Parsing accepts the case-insensitive names `"MLE"`, `"MAP"`,
/// `"Variational"`, and `"MCMC"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitMethod {
    Mle,
    Map,
    Variational,
    Mcmc,
}

impl FromStr for FitMethod {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mle" => Ok(FitMethod::Mle),
            "map" => Ok(FitMethod::Map),
            "variational" => Ok(FitMethod::Variational),
            "mcmc" => Ok(FitMethod::Mcmc),
            _ => Err(ModelError::UnknownFitMethod { name: s.to_string() }),
        }
    }
}

/// Configuration for one `fit` call.
///
/// - `method`: estimation strategy.
/// - `hierarchical`: estimate subject parameters under a shared
///   group-level prior (requires ≥ 2 subjects; silently demoted with a
///   warning for one subject).
/// - `objective`: scalar objective reduced from probabilities and
///   responses.
/// - `recovery`: run recovery analysis after the fit when ground truth is
///   attached; warn (not fail) when it was requested without ground truth.
/// - `map` / `advi` / `hmc`: strategy-specific knobs, each used only by
///   its own method.
#[derive(Debug, Clone, PartialEq)]
pub struct FitOptions {
    pub method: FitMethod,
    pub hierarchical: bool,
    pub objective: ObjectiveKind,
    pub recovery: bool,
    pub map: MapOptions,
    pub advi: AdviOptions,
    pub hmc: HmcOptions,
}

impl FitOptions {
    /// Options for a given method, everything else at defaults.
    pub fn method(method: FitMethod) -> Self {
        Self { method, ..Self::default() }
    }
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            method: FitMethod::Mle,
            hierarchical: false,
            objective: ObjectiveKind::LogLikelihood,
            recovery: false,
            map: MapOptions::default(),
            advi: AdviOptions::default(),
            hmc: HmcOptions::default(),
        }
    }
}

/// Configuration for one `simulate` call.
///
/// - `n_subjects`: simulated subjects per parameter combination.
/// - `runs_per_subject`: runs simulated for each subject.
/// - `combinations`: Cartesian product of parameter value lists instead of
///   paired tuples.
/// - `noise_mean` / `noise_sd`: additive Gaussian response noise, clipped
///   to the observed outcome range; `noise_sd == 0` disables it.
/// - `perturb_value`: apply the noise to (and export) the value series
///   instead of the probability series.
/// - `seed`: RNG seed for choices and noise; `None` seeds from entropy.
#[derive(Debug, Clone, PartialEq)]
pub struct SimOptions {
    pub n_subjects: usize,
    pub runs_per_subject: usize,
    pub combinations: bool,
    pub noise_mean: f64,
    pub noise_sd: f64,
    pub perturb_value: bool,
    pub seed: Option<u64>,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            n_subjects: 1,
            runs_per_subject: 1,
            combinations: false,
            noise_mean: 0.0,
            noise_sd: 0.0,
            perturb_value: false,
            seed: None,
        }
    }
}

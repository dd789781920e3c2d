//! Scalar objectives over probability and response sequences.
//!
//! Reduces the composed probability sequence and the observed responses to
//! the scalar the estimation strategies maximize. Two objectives are
//! supported, selected by [`ObjectiveKind`]:
//!
//! - `'ll'`: the Bernoulli/continuous log-likelihood (cross-entropy for
//!   responses in `[0, 1]`); higher is better.
//! - `'r2'`: the coefficient of determination scaled by
//!   [`R2_OBJECTIVE_SCALE`], a drop-in replacement whose gradient
//!   magnitudes stay comparable to the log-likelihood.
use crate::model::errors::ModelError;
use ndarray::Array2;
use std::str::FromStr;

/// Probability clamp keeping `ln(p)` and `ln(1 - p)` finite.
const PROB_FLOOR: f64 = 1e-12;

/// Scale applied to the R² objective.
///
/// Chosen so R²-based fits produce gradient magnitudes comparable to the
/// log-likelihood when swapped in as a drop-in objective. Treat as a
/// tunable constant, not a law; callers needing a different balance can
/// wrap [`r_squared`] themselves.
pub const R2_OBJECTIVE_SCALE: f64 = 10_000.0;

/// Objective selected for fitting.
///
/// Parsing: `FromStr` accepts the case-insensitive names `"ll"` and
/// `"r2"`; anything else is a configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectiveKind {
    LogLikelihood,
    RSquared,
}

impl FromStr for ObjectiveKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ll" => Ok(ObjectiveKind::LogLikelihood),
            "r2" => Ok(ObjectiveKind::RSquared),
            _ => Err(ModelError::UnknownObjective { name: s.to_string() }),
        }
    }
}

/// Evaluate the configured objective; higher is better for both kinds.
pub fn objective(kind: ObjectiveKind, responses: &Array2<f64>, probs: &Array2<f64>) -> f64 {
    match kind {
        ObjectiveKind::LogLikelihood => log_likelihood(responses, probs),
        ObjectiveKind::RSquared => {
            r_squared(responses.iter(), probs.iter()) * R2_OBJECTIVE_SCALE
        }
    }
}

/// Bernoulli/continuous log-likelihood `Σ r ln p + (1 − r) ln(1 − p)`.
///
/// Responses in `{0, 1}` give the usual Bernoulli likelihood; responses in
/// `[0, 1]` give the cross-entropy, which is maximized where `p` matches
/// `r` pointwise. Probabilities are clamped away from 0 and 1 so a hard
/// 0/1 prediction against a disagreeing response yields a very low finite
/// value rather than `-∞`.
pub fn log_likelihood(responses: &Array2<f64>, probs: &Array2<f64>) -> f64 {
    responses
        .iter()
        .zip(probs.iter())
        .map(|(&r, &p)| {
            let p = p.clamp(PROB_FLOOR, 1.0 - PROB_FLOOR);
            r * p.ln() + (1.0 - r) * (1.0 - p).ln()
        })
        .sum()
}

/// Coefficient of determination between observed and predicted values.
///
/// `1 − SS_res / SS_tot`, with `SS_tot` taken around the observed mean. A
/// constant observed series (zero total variance) returns 0.0 rather than
/// dividing by zero.
pub fn r_squared<'a, I, J>(observed: I, predicted: J) -> f64
where
    I: Iterator<Item = &'a f64> + Clone,
    J: Iterator<Item = &'a f64>,
{
    let (sum, count) = observed.clone().fold((0.0, 0usize), |(s, n), &v| (s + v, n + 1));
    if count == 0 {
        return 0.0;
    }
    let mean = sum / count as f64;
    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for (&o, &p) in observed.zip(predicted) {
        ss_res += (o - p) * (o - p);
        ss_tot += (o - mean) * (o - mean);
    }
    if ss_tot == 0.0 {
        return 0.0;
    }
    1.0 - ss_res / ss_tot
}

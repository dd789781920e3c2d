//! Observation composition: dynamic series → response probabilities.
//!
//! An observation model consumes a named subset of the learning model's
//! carried outputs. Which outputs it sees is declared as string markers in
//! the model's observation-parameter list; [`resolve_inputs`] turns those
//! markers into carried-output indices exactly once, at model
//! construction, so evaluation never re-resolves by name. Index 0 (the
//! primary value output) is always included first.
//!
//! With no observation rule configured, the probability sequence is simply
//! the primary carried output.
use crate::model::{
    core::{recurrence::Trajectory, spec::ParamSpec},
    errors::{ModelError, ModelResult},
    rules::ObservationRule,
};
use ndarray::{Array1, Array2};

/// Resolved observation wiring, computed once per model declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationPlan {
    /// Indices into the carried-output list; `[0]` plus one entry per
    /// marker, in marker order.
    pub input_indices: Vec<usize>,
}

/// Resolve observation input markers against the learning parameters.
///
/// A marker must name a *dynamic* learning parameter; its resolved index
/// is the parameter's position among the dynamic parameters, which by the
/// arity invariant equals the position of the carried output it seeds.
///
/// # Errors
/// [`ModelError::ObservationInputUnknown`] for a marker that does not
/// match any dynamic learning parameter.
pub fn resolve_inputs(markers: &[String], learning: &[ParamSpec]) -> ModelResult<ObservationPlan> {
    let mut input_indices = vec![0];
    for marker in markers {
        let position = learning
            .iter()
            .filter(|p| p.dynamic)
            .position(|p| &p.name == marker)
            .ok_or_else(|| ModelError::ObservationInputUnknown { name: marker.clone() })?;
        input_indices.push(position);
    }
    Ok(ObservationPlan { input_indices })
}

/// Apply the observation rule (or the passthrough) to a trajectory.
///
/// - `obs_values`: one array per observation parameter (free and shared
///   alike), each of length `columns`, already broadcast to the run
///   dimension.
///
/// Returns the probability sequence plus any auxiliary observation
/// outputs, all `(trials, columns)`.
///
/// # Errors
/// [`ModelError::ObservationArityMismatch`] when the rule's declared
/// dynamic-input count disagrees with the resolved indices.
pub fn compose(
    rule: Option<&dyn ObservationRule>, plan: &ObservationPlan, trajectory: &Trajectory,
    obs_values: &[Array1<f64>],
) -> ModelResult<(Array2<f64>, Vec<Array2<f64>>)> {
    let rule = match rule {
        Some(rule) => rule,
        None => return Ok((trajectory.carried[0].clone(), Vec::new())),
    };

    if rule.n_dynamic_inputs() != plan.input_indices.len() {
        return Err(ModelError::ObservationArityMismatch {
            declared: rule.n_dynamic_inputs(),
            resolved: plan.input_indices.len(),
        });
    }

    let (n_trials, n_cols) = trajectory.carried[0].dim();
    let n_outputs = rule.n_outputs();
    let mut prob = Array2::zeros((n_trials, n_cols));
    let mut extras: Vec<Array2<f64>> =
        (0..n_outputs - 1).map(|_| Array2::zeros((n_trials, n_cols))).collect();

    let mut dynamics = vec![0.0; plan.input_indices.len()];
    let mut params = vec![0.0; obs_values.len()];
    let mut out = vec![0.0; n_outputs];

    for c in 0..n_cols {
        for (j, values) in obs_values.iter().enumerate() {
            params[j] = values[c];
        }
        for t in 0..n_trials {
            for (j, &idx) in plan.input_indices.iter().enumerate() {
                dynamics[j] = trajectory.carried[idx][[t, c]];
            }
            rule.step(&dynamics, &params, &mut out);
            prob[[t, c]] = out[0];
            for (r, extra) in extras.iter_mut().enumerate() {
                extra[[t, c]] = out[r + 1];
            }
        }
    }

    Ok((prob, extras))
}

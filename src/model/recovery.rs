//! Parameter recovery: simulated ground truth vs. fitted estimates.
//!
//! Joins the per-subject means of a completed fit with the simulated
//! parameter values attached to the responses (by subject position, which
//! both tables share) and reports how well estimation recovered the
//! generating values: per-parameter R² plus two correlation matrices,
//! simulated-vs-estimated and estimated-vs-estimated. Degenerate inputs
//! (a single subject, or a parameter simulated at one constant value)
//! make correlation undefined; those warn and return `None` rather than
//! fail.
use crate::model::{
    core::data::GroundTruth,
    errors::{ModelError, ModelResult},
    models::model_internals::ParamEstimate,
};
use ndarray::{Array1, Array2};
use tracing::warn;

/// Correlation summary of one recovery analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryResult {
    pub parameters: Vec<String>,
    /// Simulated-vs-estimated R², per parameter.
    pub r_squared: Vec<f64>,
    /// `sim_vs_est[[i, j]]` correlates simulated parameter `i` with
    /// estimated parameter `j`.
    pub sim_vs_est: Array2<f64>,
    pub est_vs_est: Array2<f64>,
}

/// Correlate fitted estimates against simulated ground truth.
///
/// # Errors
/// - [`ModelError::GroundTruthMissingParameter`] when a fitted free
///   parameter has no simulated column.
/// - [`ModelError::GroundTruthShapeMismatch`] when the estimate and
///   ground-truth subject counts disagree.
pub fn recover(
    estimates: &[ParamEstimate], ground_truth: &GroundTruth,
) -> ModelResult<Option<RecoveryResult>> {
    let n_subjects = ground_truth.values.nrows();
    let mut parameters = Vec::with_capacity(estimates.len());
    let mut simulated: Vec<Array1<f64>> = Vec::with_capacity(estimates.len());
    let mut estimated: Vec<Array1<f64>> = Vec::with_capacity(estimates.len());
    for estimate in estimates {
        let sim = ground_truth.column(&estimate.name).ok_or_else(|| {
            ModelError::GroundTruthMissingParameter { name: estimate.name.clone() }
        })?;
        if estimate.mean.len() != n_subjects {
            return Err(ModelError::GroundTruthShapeMismatch {
                expected: n_subjects,
                found: estimate.mean.len(),
            });
        }
        parameters.push(estimate.name.clone());
        simulated.push(sim.to_owned());
        estimated.push(estimate.mean.clone());
    }

    if parameters.is_empty() {
        warn!("no free parameters to recover");
        return Ok(None);
    }
    if n_subjects < 2 {
        warn!(
            "cannot analyze recovery with a single simulated subject, \
             correlation is undefined"
        );
        return Ok(None);
    }
    if let Some(i) = simulated.iter().position(|col| is_constant(col)) {
        warn!(
            parameter = %parameters[i],
            "parameter was simulated at a single constant value, \
             correlation is undefined"
        );
        return Ok(None);
    }

    let k = parameters.len();
    let r_squared = (0..k).map(|i| pearson(&simulated[i], &estimated[i]).powi(2)).collect();
    let sim_vs_est =
        Array2::from_shape_fn((k, k), |(i, j)| pearson(&simulated[i], &estimated[j]));
    let est_vs_est =
        Array2::from_shape_fn((k, k), |(i, j)| pearson(&estimated[i], &estimated[j]));

    Ok(Some(RecoveryResult { parameters, r_squared, sim_vs_est, est_vs_est }))
}

fn is_constant(values: &Array1<f64>) -> bool {
    values.iter().all(|&v| v == values[0])
}

/// Pearson correlation; `NaN` when either series has zero variance.
fn pearson(x: &Array1<f64>, y: &Array1<f64>) -> f64 {
    let n = x.len() as f64;
    let mx = x.sum() / n;
    let my = y.sum() / n;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (&xi, &yi) in x.iter().zip(y.iter()) {
        sxy += (xi - mx) * (yi - my);
        sxx += (xi - mx) * (xi - mx);
        syy += (yi - my) * (yi - my);
    }
    sxy / (sxx * syy).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover the join-by-name lookup, the degenerate-input
    // `None` paths, and the correlation arithmetic on known tables.
    // -------------------------------------------------------------------------

    fn estimate(name: &str, mean: Array1<f64>) -> ParamEstimate {
        ParamEstimate { name: name.to_string(), mean, sd: None }
    }

    #[test]
    fn perfect_recovery_scores_unit_r_squared() {
        let gt = GroundTruth {
            parameters: vec!["alpha".into(), "beta".into()],
            values: array![[0.1, 1.0], [0.5, 3.0], [0.9, 5.0]],
        };
        let estimates = vec![
            estimate("alpha", array![0.1, 0.5, 0.9]),
            estimate("beta", array![1.0, 3.0, 5.0]),
        ];
        let result = recover(&estimates, &gt).unwrap().expect("non-degenerate inputs");
        assert_relative_eq!(result.r_squared[0], 1.0, max_relative = 1e-10);
        assert_relative_eq!(result.r_squared[1], 1.0, max_relative = 1e-10);
        assert_relative_eq!(result.sim_vs_est[[0, 0]], 1.0, max_relative = 1e-10);
        // alpha and beta co-vary perfectly in this table.
        assert_relative_eq!(result.est_vs_est[[0, 1]], 1.0, max_relative = 1e-10);
    }

    #[test]
    fn noisy_recovery_stays_below_unit_r_squared() {
        let gt = GroundTruth {
            parameters: vec!["alpha".into()],
            values: array![[0.1], [0.5], [0.9], [0.3]],
        };
        let estimates = vec![estimate("alpha", array![0.15, 0.42, 0.95, 0.38])];
        let result = recover(&estimates, &gt).unwrap().expect("non-degenerate inputs");
        assert!(result.r_squared[0] > 0.8);
        assert!(result.r_squared[0] < 1.0);
    }

    #[test]
    fn single_subject_returns_none() {
        let gt = GroundTruth {
            parameters: vec!["alpha".into()],
            values: array![[0.5]],
        };
        let estimates = vec![estimate("alpha", array![0.4])];
        assert_eq!(recover(&estimates, &gt).unwrap(), None);
    }

    #[test]
    fn constant_simulated_values_return_none() {
        let gt = GroundTruth {
            parameters: vec!["alpha".into()],
            values: array![[0.5], [0.5], [0.5]],
        };
        let estimates = vec![estimate("alpha", array![0.4, 0.5, 0.6])];
        assert_eq!(recover(&estimates, &gt).unwrap(), None);
    }

    #[test]
    fn missing_ground_truth_column_is_a_configuration_error() {
        let gt = GroundTruth {
            parameters: vec!["alpha".into()],
            values: array![[0.1], [0.9]],
        };
        let estimates = vec![estimate("beta", array![1.0, 2.0])];
        let err = recover(&estimates, &gt).unwrap_err();
        match err {
            ModelError::GroundTruthMissingParameter { name } => assert_eq!(name, "beta"),
            other => panic!("expected GroundTruthMissingParameter, got {other:?}"),
        }
    }

    #[test]
    fn subject_count_mismatch_is_rejected() {
        let gt = GroundTruth {
            parameters: vec!["alpha".into()],
            values: array![[0.1], [0.9]],
        };
        let estimates = vec![estimate("alpha", array![0.5, 0.5, 0.5])];
        let err = recover(&estimates, &gt).unwrap_err();
        assert!(matches!(err, ModelError::GroundTruthShapeMismatch { expected: 2, found: 3 }));
    }
}

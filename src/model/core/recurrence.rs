//! Trial recurrence: folding a learning rule over an outcome sequence.
//!
//! Runs a [`LearningRule`] as a left-fold across trials, carrying the
//! declared dynamic state forward, for every column (subject-run or
//! simulated subject) at once.
//!
//! ## Trial-0 bootstrap
//! The recorded series use the convention that row `t` is the state
//! *before* outcome `t` is applied: row 0 is the seed itself (the dynamic
//! parameters, broadcast across columns), and row `t` is the state after
//! outcomes `0..t-1`. The fold therefore produces records for trials
//! `1..n` and the seed row is prepended explicitly, which reproduces the
//! classic scan-plus-initial-step construction without a second pass.
//!
//! ## Record-only outputs
//! Outputs beyond the carried prefix are scratch/record series, not state.
//! The fit path discards them (the carried series are truncated to exactly
//! the dynamic-parameter count); the simulation path materializes them,
//! evaluated at `(outcome_t, state_t)`.
//!
//! ## Failure
//! The only failure mode is an arity mismatch between the declared
//! dynamic parameters and the rule's carried-output count, surfaced before
//! any numeric work begins.
use crate::model::{
    errors::{ModelError, ModelResult},
    rules::LearningRule,
};
use ndarray::{Array1, Array2};

/// Return convention reminder used in arity-mismatch diagnostics.
const RETURN_CONVENTION: &str =
    "Make sure the rule's outputs follow (value, outputs reused next step, other recorded \
     outputs) and that dynamic parameters are correctly set to be dynamic and static \
     parameters are set to be static.";

/// Dynamic (and optionally record-only) series produced by the fold.
///
/// Every array is `(trials, columns)`. `carried` holds exactly the
/// rule's carried outputs in declaration order; `records` holds the
/// remaining outputs and is empty unless records were requested.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    pub carried: Vec<Array2<f64>>,
    pub records: Vec<Array2<f64>>,
}

/// Validate the declared dynamic-parameter count against the rule.
///
/// # Errors
/// [`ModelError::DynamicArityMismatch`] when the counts disagree or the
/// carried prefix exceeds the rule's output count.
pub fn validate_arity(rule: &dyn LearningRule, n_dynamic: usize) -> ModelResult<()> {
    let carried = rule.n_carried();
    if carried == 0 || carried > rule.n_outputs() {
        return Err(ModelError::DynamicArityMismatch {
            declared: n_dynamic,
            carried,
            reason: "The carried prefix must be non-empty and no longer than the output list.",
        });
    }
    if n_dynamic != carried {
        return Err(ModelError::DynamicArityMismatch {
            declared: n_dynamic,
            carried,
            reason: RETURN_CONVENTION,
        });
    }
    Ok(())
}

/// Fold `rule` over `(trials, columns)` outcomes.
///
/// - `seeds`: one array per dynamic parameter, each of length `columns`,
///   providing the trial-0 state.
/// - `statics`: one array per static parameter, each of length `columns`.
/// - `with_records`: materialize record-only outputs (simulation path);
///   the fit path passes `false` and gets only the carried series.
///
/// # Errors
/// [`ModelError::DynamicArityMismatch`] via [`validate_arity`]; no other
/// failure modes exist (the fold itself is pure data flow).
pub fn evaluate(
    rule: &dyn LearningRule, outcomes: &Array2<f64>, seeds: &[Array1<f64>],
    statics: &[Array1<f64>], with_records: bool,
) -> ModelResult<Trajectory> {
    validate_arity(rule, seeds.len())?;

    let (n_trials, n_cols) = outcomes.dim();
    let n_carried = rule.n_carried();
    let n_outputs = rule.n_outputs();
    let n_records = if with_records { n_outputs - n_carried } else { 0 };

    let mut carried: Vec<Array2<f64>> =
        (0..n_carried).map(|_| Array2::zeros((n_trials, n_cols))).collect();
    let mut records: Vec<Array2<f64>> =
        (0..n_records).map(|_| Array2::zeros((n_trials, n_cols))).collect();

    // Per-column scratch reused across the whole fold.
    let mut state = vec![0.0; n_carried];
    let mut static_buf = vec![0.0; statics.len()];
    let mut out = vec![0.0; n_outputs];

    for c in 0..n_cols {
        for (j, seed) in seeds.iter().enumerate() {
            state[j] = seed[c];
        }
        for (j, s) in statics.iter().enumerate() {
            static_buf[j] = s[c];
        }
        for t in 0..n_trials {
            for j in 0..n_carried {
                carried[j][[t, c]] = state[j];
            }
            rule.step(outcomes[[t, c]], &state, &static_buf, &mut out);
            for r in 0..n_records {
                records[r][[t, c]] = out[n_carried + r];
            }
            state.copy_from_slice(&out[..n_carried]);
        }
    }

    Ok(Trajectory { carried, records })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::rules::RescorlaWagner;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - The exact trial-0 bootstrap semantics (seed row prepended, fold
    //   records shifted by one trial).
    // - Arity validation before any numeric work.
    // - Record-only output alignment on the simulation path.
    // -------------------------------------------------------------------------

    /// Minimal accumulator: one carried output, `f(state, o) = state + o`.
    struct Accumulate;

    impl LearningRule for Accumulate {
        fn output_names(&self) -> &'static [&'static str] {
            &["total"]
        }

        fn n_carried(&self) -> usize {
            1
        }

        fn step(&self, outcome: f64, carried: &[f64], _statics: &[f64], out: &mut [f64]) {
            out[0] = carried[0] + outcome;
        }
    }

    #[test]
    // For outcomes [1, 2, 3] and a zero seed the recorded series must be
    // [0, 1, 3]: trial 0 is the seed, trial t the cumulative sum through
    // t − 1.
    fn fold_reproduces_bootstrap_semantics() {
        let outcomes = array![[1.0], [2.0], [3.0]];
        let seeds = vec![array![0.0]];
        let trajectory =
            evaluate(&Accumulate, &outcomes, &seeds, &[], false).expect("arity matches");
        let total = &trajectory.carried[0];
        assert_eq!(total.column(0).to_vec(), vec![0.0, 1.0, 3.0]);
    }

    #[test]
    fn fold_runs_each_column_independently() {
        let outcomes = array![[1.0, 10.0], [1.0, 10.0]];
        let seeds = vec![array![0.0, 5.0]];
        let trajectory =
            evaluate(&Accumulate, &outcomes, &seeds, &[], false).expect("arity matches");
        let total = &trajectory.carried[0];
        assert_eq!(total.column(0).to_vec(), vec![0.0, 1.0]);
        assert_eq!(total.column(1).to_vec(), vec![5.0, 15.0]);
    }

    #[test]
    fn arity_mismatch_fails_before_any_numeric_work() {
        let outcomes = array![[1.0]];
        // Two declared dynamic parameters against a one-carried rule.
        let seeds = vec![array![0.0], array![0.0]];
        let err = evaluate(&Accumulate, &outcomes, &seeds, &[], false).unwrap_err();
        match err {
            ModelError::DynamicArityMismatch { declared: 2, carried: 1, .. } => {}
            other => panic!("expected DynamicArityMismatch, got {other:?}"),
        }
    }

    #[test]
    // Carried series hold the pre-step state; record series hold values
    // produced *at* each trial. The prediction error at trial t must use
    // the value from trial t, not t + 1.
    fn records_align_with_the_trial_they_were_produced_at() {
        let outcomes = array![[1.0], [1.0]];
        let seeds = vec![array![0.0]];
        let statics = vec![array![0.5]];
        let trajectory = evaluate(&RescorlaWagner, &outcomes, &seeds, &statics, true)
            .expect("arity matches");
        let value = &trajectory.carried[0];
        let pe = &trajectory.records[0];
        assert_eq!(value.column(0).to_vec(), vec![0.0, 0.5]);
        assert_eq!(pe.column(0).to_vec(), vec![1.0, 0.5]);
    }

    #[test]
    fn records_are_skipped_on_the_fit_path() {
        let outcomes = array![[1.0]];
        let seeds = vec![array![0.0]];
        let statics = vec![array![0.5]];
        let trajectory = evaluate(&RescorlaWagner, &outcomes, &seeds, &statics, false)
            .expect("arity matches");
        assert_eq!(trajectory.carried.len(), 1);
        assert!(trajectory.records.is_empty());
    }
}

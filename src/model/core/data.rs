//! Validated response and outcome containers.
//!
//! The engine does no file I/O; a data-loading collaborator supplies
//! subject ids, per-subject run counts, a response matrix, and (for
//! recovery analysis) the simulated ground-truth table. [`ResponseSet`]
//! validates those pieces eagerly so downstream composition can assume
//! shape-consistent inputs:
//!
//! - every subject has the same run count,
//! - the response matrix has one row per subject-run,
//! - the ground truth, when present, has one row per subject.
//!
//! Outcome matrices are kept `(trials, sequences)` and are broadcast to
//! the subject-run (column) dimension via [`broadcast_outcomes`], warning
//! when sequences are tiled and failing when the counts do not divide.
use crate::model::errors::{ModelError, ModelResult};
use ndarray::Array2;
use tracing::warn;

/// Simulated ground-truth parameter values attached to a response set.
///
/// One row per subject, one column per parameter named in `parameters`.
/// Used by recovery analysis to correlate simulated against estimated
/// values.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundTruth {
    pub parameters: Vec<String>,
    pub values: Array2<f64>,
}

impl GroundTruth {
    /// Column of simulated values for `name`, if present.
    pub fn column(&self, name: &str) -> Option<ndarray::ArrayView1<'_, f64>> {
        self.parameters.iter().position(|p| p == name).map(|i| self.values.column(i))
    }
}

/// Observed responses for a set of subjects.
///
/// `responses` is `(subjects × runs, trials)` with subject-major row
/// order: all runs of subject 0, then all runs of subject 1, and so on.
/// The engine transposes to trial-major internally.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSet {
    pub subjects: Vec<String>,
    pub n_runs: usize,
    pub responses: Array2<f64>,
    pub ground_truth: Option<GroundTruth>,
}

impl ResponseSet {
    /// Construct a validated response set.
    ///
    /// `runs_per_subject` carries one entry per subject, in the order of
    /// `subjects`; all entries must agree.
    ///
    /// # Errors
    /// - [`ModelError::EmptyData`] for an empty subject list or response
    ///   matrix.
    /// - [`ModelError::UnevenRunCounts`] when subjects disagree on runs.
    /// - [`ModelError::ResponseShapeMismatch`] when rows ≠ subjects × runs.
    /// - [`ModelError::GroundTruthShapeMismatch`] when the ground truth
    ///   does not have one row per subject.
    pub fn new(
        subjects: Vec<String>, runs_per_subject: &[usize], responses: Array2<f64>,
        ground_truth: Option<GroundTruth>,
    ) -> ModelResult<Self> {
        if subjects.is_empty() {
            return Err(ModelError::EmptyData { what: "Subject list" });
        }
        if responses.is_empty() {
            return Err(ModelError::EmptyData { what: "Response matrix" });
        }
        let n_runs = runs_per_subject.first().copied().unwrap_or(0);
        if n_runs == 0 {
            return Err(ModelError::EmptyData { what: "Run counts" });
        }
        for (subject, &runs) in subjects.iter().zip(runs_per_subject) {
            if runs != n_runs {
                return Err(ModelError::UnevenRunCounts {
                    expected: n_runs,
                    found: runs,
                    subject: subject.clone(),
                });
            }
        }
        let expected_rows = subjects.len() * n_runs;
        if responses.nrows() != expected_rows {
            return Err(ModelError::ResponseShapeMismatch {
                expected: expected_rows,
                found: responses.nrows(),
            });
        }
        if let Some(gt) = &ground_truth {
            if gt.values.nrows() != subjects.len() {
                return Err(ModelError::GroundTruthShapeMismatch {
                    expected: subjects.len(),
                    found: gt.values.nrows(),
                });
            }
        }
        Ok(Self { subjects, n_runs, responses, ground_truth })
    }

    pub fn n_subjects(&self) -> usize {
        self.subjects.len()
    }

    pub fn n_trials(&self) -> usize {
        self.responses.ncols()
    }

    /// Total subject-run columns the engine evaluates over.
    pub fn n_cols(&self) -> usize {
        self.n_subjects() * self.n_runs
    }
}

/// Check that responses and outcomes agree on the trial dimension.
///
/// # Errors
/// [`ModelError::LengthMismatch`] naming both lengths.
pub fn validate_trial_lengths(n_response_trials: usize, n_outcome_trials: usize) -> ModelResult<()> {
    if n_response_trials != n_outcome_trials {
        return Err(ModelError::LengthMismatch {
            responses: n_response_trials,
            outcomes: n_outcome_trials,
        });
    }
    Ok(())
}

/// Broadcast `(trials, sequences)` outcomes to `n_cols` columns.
///
/// A single sequence is repeated for every column; `k < n_cols` sequences
/// are tiled when `n_cols` is divisible by `k` (with a warning, since the
/// substitution changes what each column sees).
///
/// # Errors
/// [`ModelError::OutcomeTileMismatch`] when the counts do not divide, and
/// [`ModelError::EmptyData`] for an empty outcome matrix.
pub fn broadcast_outcomes(outcomes: &Array2<f64>, n_cols: usize) -> ModelResult<Array2<f64>> {
    let (n_trials, k) = outcomes.dim();
    if n_trials == 0 || k == 0 {
        return Err(ModelError::EmptyData { what: "Outcome matrix" });
    }
    if k == n_cols {
        return Ok(outcomes.clone());
    }
    if k > n_cols || n_cols % k != 0 {
        return Err(ModelError::OutcomeTileMismatch { outcomes: k, subjects: n_cols });
    }
    warn!(
        sequences = k,
        columns = n_cols,
        "fewer outcome sequences than simulated subjects, using the same outcomes for each"
    );
    let mut tiled = Array2::zeros((n_trials, n_cols));
    for c in 0..n_cols {
        tiled.column_mut(c).assign(&outcomes.column(c % k));
    }
    Ok(tiled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover construction invariants of `ResponseSet` and the
    // tiling/division behavior of `broadcast_outcomes`.
    // -------------------------------------------------------------------------

    #[test]
    fn accepts_consistent_shapes() {
        let responses = array![[1.0, 0.0, 1.0], [0.0, 0.0, 1.0]];
        let set = ResponseSet::new(
            vec!["s1".into(), "s2".into()],
            &[1, 1],
            responses,
            None,
        )
        .expect("consistent shapes should construct");
        assert_eq!(set.n_subjects(), 2);
        assert_eq!(set.n_trials(), 3);
        assert_eq!(set.n_cols(), 2);
    }

    #[test]
    fn rejects_uneven_run_counts() {
        let responses = Array2::zeros((3, 4));
        let err = ResponseSet::new(
            vec!["s1".into(), "s2".into()],
            &[1, 2],
            responses,
            None,
        )
        .unwrap_err();
        match err {
            ModelError::UnevenRunCounts { expected: 1, found: 2, subject } => {
                assert_eq!(subject, "s2");
            }
            other => panic!("expected UnevenRunCounts, got {other:?}"),
        }
    }

    #[test]
    fn rejects_row_count_mismatch() {
        let responses = Array2::zeros((3, 4));
        let err = ResponseSet::new(
            vec!["s1".into(), "s2".into()],
            &[2, 2],
            responses,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::ResponseShapeMismatch { expected: 4, found: 3 }));
    }

    #[test]
    fn ground_truth_must_have_one_row_per_subject() {
        let responses = Array2::zeros((2, 4));
        let gt = GroundTruth {
            parameters: vec!["alpha".into()],
            values: Array2::zeros((3, 1)),
        };
        let err = ResponseSet::new(
            vec!["s1".into(), "s2".into()],
            &[1, 1],
            responses,
            Some(gt),
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::GroundTruthShapeMismatch { .. }));
    }

    #[test]
    fn broadcast_tiles_divisible_counts_and_rejects_others() {
        let outcomes = array![[1.0, 2.0], [3.0, 4.0]];
        let tiled = broadcast_outcomes(&outcomes, 4).unwrap();
        assert_eq!(tiled.dim(), (2, 4));
        assert_eq!(tiled[[0, 2]], 1.0);
        assert_eq!(tiled[[1, 3]], 4.0);

        let err = broadcast_outcomes(&outcomes, 3).unwrap_err();
        assert!(matches!(err, ModelError::OutcomeTileMismatch { outcomes: 2, subjects: 3 }));
    }

    #[test]
    fn trial_length_mismatch_is_named() {
        let err = validate_trial_lengths(10, 12).unwrap_err();
        assert!(matches!(err, ModelError::LengthMismatch { responses: 10, outcomes: 12 }));
    }
}

//! Posterior draw summaries.
//!
//! Reduces a `(draws, dim)` sample matrix to per-coordinate moments. The
//! model layer maps unconstrained draws back to natural parameter scales
//! before summarizing, so the means reported to users live on the scale
//! their priors were declared on.
use ndarray::Array2;

/// First two moments of one coordinate of a draw matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordSummary {
    pub mean: f64,
    pub sd: f64,
}

/// Column-wise mean and sample standard deviation of a draw matrix.
///
/// A single-draw matrix yields `sd = 0.0` for every coordinate rather
/// than `NaN`, so degenerate sample sets stay displayable.
pub fn summarize_draws(draws: &Array2<f64>) -> Vec<CoordSummary> {
    let n = draws.nrows();
    (0..draws.ncols())
        .map(|j| {
            let col = draws.column(j);
            let mean = col.mean().unwrap_or(0.0);
            let sd = if n > 1 { col.std(1.0) } else { 0.0 };
            CoordSummary { mean, sd }
        })
        .collect()
}

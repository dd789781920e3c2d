//! Hamiltonian Monte Carlo over a [`LogDensity`].
//!
//! Implements the gradient-based sampler used by the `MCMC` fitting
//! strategy: a static-trajectory HMC transition with leapfrog integration,
//! a diagonal mass matrix estimated online during warmup, and
//! dual-averaging step-size adaptation toward a target acceptance rate.
//!
//! ## Conventions
//! - Positions `q` are unconstrained coordinates ([`Theta`]); the model
//!   layer owns the change of variables, so the sampler never sees bounds.
//! - The potential is `U(q) = -ℓ(q)`; gradients come from the analytic
//!   [`LogDensity::grad`] when implemented and central finite differences
//!   otherwise.
//! - A non-finite density or gradient during a trajectory marks the
//!   transition divergent and the proposal is rejected; a non-finite
//!   density at the *initial* position is a hard error, since no chain can
//!   start there.
use crate::estimation::{
    density::{check_start, LogDensity, Theta},
    errors::{EstError, EstResult},
};
use finitediff::FiniteDiff;
use ndarray::{Array1, Array2};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

/// Configuration for the HMC sampler.
///
/// - `draws`: number of post-warmup samples to return.
/// - `warmup`: adaptation iterations (discarded).
/// - `leapfrog_steps`: leapfrog steps per transition; the actual count is
///   jittered uniformly in `[1, leapfrog_steps]` to avoid periodicity.
/// - `target_accept`: dual-averaging target acceptance probability.
/// - `init_step_size`: starting leapfrog step size ε.
/// - `seed`: RNG seed; `None` seeds from entropy.
#[derive(Debug, Clone, PartialEq)]
pub struct HmcOptions {
    pub draws: usize,
    pub warmup: usize,
    pub leapfrog_steps: usize,
    pub target_accept: f64,
    pub init_step_size: f64,
    pub seed: Option<u64>,
}

impl HmcOptions {
    /// Construct validated sampler options.
    ///
    /// # Errors
    /// [`EstError::InvalidHmcConfig`] when any count is zero, the target
    /// acceptance rate is outside `(0, 1)`, or the initial step size is not
    /// finite and positive.
    pub fn new(
        draws: usize, warmup: usize, leapfrog_steps: usize, target_accept: f64,
        init_step_size: f64, seed: Option<u64>,
    ) -> EstResult<Self> {
        if draws == 0 {
            return Err(EstError::InvalidHmcConfig {
                name: "draws",
                reason: "Draw count must be greater than zero.",
            });
        }
        if leapfrog_steps == 0 {
            return Err(EstError::InvalidHmcConfig {
                name: "leapfrog_steps",
                reason: "Leapfrog step count must be greater than zero.",
            });
        }
        if !(0.0 < target_accept && target_accept < 1.0) {
            return Err(EstError::InvalidHmcConfig {
                name: "target_accept",
                reason: "Target acceptance rate must lie strictly between 0 and 1.",
            });
        }
        if !init_step_size.is_finite() || init_step_size <= 0.0 {
            return Err(EstError::InvalidHmcConfig {
                name: "init_step_size",
                reason: "Initial step size must be finite and positive.",
            });
        }
        Ok(Self { draws, warmup, leapfrog_steps, target_accept, init_step_size, seed })
    }
}

impl Default for HmcOptions {
    fn default() -> Self {
        Self {
            draws: 1000,
            warmup: 500,
            leapfrog_steps: 16,
            target_accept: 0.8,
            init_step_size: 0.1,
            seed: None,
        }
    }
}

/// Dual averaging for step-size adaptation (Nesterov 2009, Stan variant).
///
/// Adapts ε so the average acceptance probability approaches the target.
struct DualAveraging {
    target_accept: f64,
    log_eps: f64,
    log_eps_bar: f64,
    h_bar: f64,
    mu: f64,
    gamma: f64,
    t0: f64,
    kappa: f64,
    step: usize,
}

impl DualAveraging {
    fn new(target_accept: f64, init_eps: f64) -> Self {
        let log_eps0 = init_eps.ln();
        Self {
            target_accept,
            log_eps: log_eps0,
            log_eps_bar: log_eps0,
            h_bar: 0.0,
            mu: (10.0 * init_eps).ln(),
            gamma: 0.05,
            t0: 10.0,
            kappa: 0.75,
            step: 0,
        }
    }

    fn update(&mut self, accept_prob: f64) {
        self.step += 1;
        let m = self.step as f64;
        let w = 1.0 / (m + self.t0);
        self.h_bar = (1.0 - w) * self.h_bar + w * (self.target_accept - accept_prob);

        self.log_eps = self.mu - (m.sqrt() / self.gamma) * self.h_bar;
        let m_kappa = m.powf(-self.kappa);
        self.log_eps_bar = m_kappa * self.log_eps + (1.0 - m_kappa) * self.log_eps_bar;
    }

    /// Current step size (during warmup).
    fn current_step_size(&self) -> f64 {
        self.log_eps.exp()
    }

    /// Final adapted step size (after warmup, the smoothed version).
    fn adapted_step_size(&self) -> f64 {
        self.log_eps_bar.exp()
    }

    /// Reset for a new adaptation window, keeping the current step size.
    fn reset(&mut self, init_eps: f64) {
        self.log_eps = init_eps.ln();
        self.log_eps_bar = init_eps.ln();
        self.h_bar = 0.0;
        self.mu = (10.0 * init_eps).ln();
        self.step = 0;
    }
}

/// Online Welford variance estimator for the diagonal mass matrix.
struct WelfordVariance {
    mean: Vec<f64>,
    m2: Vec<f64>,
    count: usize,
}

impl WelfordVariance {
    fn new(dim: usize) -> Self {
        Self { mean: vec![0.0; dim], m2: vec![0.0; dim], count: 0 }
    }

    fn update(&mut self, q: &Theta) {
        self.count += 1;
        let n = self.count as f64;
        for i in 0..self.mean.len() {
            let delta = q[i] - self.mean[i];
            self.mean[i] += delta / n;
            self.m2[i] += delta * (q[i] - self.mean[i]);
        }
    }

    /// Sample variance per coordinate; `None` with fewer than 2 updates.
    fn variance(&self) -> Option<Vec<f64>> {
        if self.count < 2 {
            return None;
        }
        let n = (self.count - 1) as f64;
        Some(self.m2.iter().map(|&m| (m / n).max(1e-10)).collect())
    }
}

/// One position/potential/gradient triple along a trajectory.
struct HmcState {
    q: Theta,
    potential: f64,
    grad_potential: Theta,
}

/// Draw samples from `ℓ(θ)` with static-trajectory HMC.
///
/// Runs `opts.warmup` adaptation transitions (dual-averaging step size;
/// diagonal mass matrix re-estimated from the second warmup half) followed
/// by `opts.draws` sampling transitions at the adapted step size.
///
/// # Returns
/// A `(draws, dim)` matrix of unconstrained posterior draws.
///
/// # Errors
/// - Start-point errors from [`check_start`].
/// - [`EstError::NonFiniteDensity`] if the density is non-finite at
///   `theta0`.
/// - [`EstError::SamplerStuck`] if every warmup transition diverged.
pub fn sample<F: LogDensity>(
    f: &F, data: &F::Data, theta0: Theta, opts: &HmcOptions,
) -> EstResult<Array2<f64>> {
    check_start(f, &theta0)?;
    let dim = theta0.len();
    let mut rng = match opts.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let logp = |q: &Theta| -> f64 {
        match f.value(q, data) {
            Ok(v) => v,
            Err(_) => f64::NEG_INFINITY,
        }
    };
    let grad_potential = |q: &Theta| -> Theta {
        match f.grad(q, data) {
            Some(Ok(g)) => -g,
            // Differentiate U(q) = -logp(q) directly; errors inside the
            // closure surface as NaNs and mark the trajectory divergent.
            _ => q.central_diff(&|q: &Theta| -logp(q)),
        }
    };

    let lp0 = logp(&theta0);
    if !lp0.is_finite() {
        return Err(EstError::NonFiniteDensity { value: lp0 });
    }

    let mut state = HmcState { potential: -lp0, grad_potential: grad_potential(&theta0), q: theta0 };
    let mut inv_mass: Vec<f64> = vec![1.0; dim];
    let mut adapt = DualAveraging::new(opts.target_accept, opts.init_step_size);
    let mut welford = WelfordVariance::new(dim);
    let mut draws = Array2::zeros((opts.draws, dim));
    let mut any_accept = false;

    let mass_switch = opts.warmup / 2;
    let normal = Normal::new(0.0, 1.0).expect("unit normal is always valid");

    for iter in 0..opts.warmup + opts.draws {
        let warming = iter < opts.warmup;
        let eps =
            if warming { adapt.current_step_size() } else { adapt.adapted_step_size() };
        let n_steps = rng.gen_range(1..=opts.leapfrog_steps);

        // Momentum refresh: p ~ N(0, M), with M the inverse of `inv_mass`.
        let p0: Array1<f64> = (0..dim)
            .map(|i| normal.sample(&mut rng) / inv_mass[i].sqrt())
            .collect();

        let h0 = state.potential + kinetic_energy(&inv_mass, &p0);
        let (proposal, h1, divergent) =
            leapfrog(&state, p0, eps, n_steps, &inv_mass, &logp, &grad_potential);

        let accept_prob = if divergent { 0.0 } else { (h0 - h1).exp().min(1.0) };
        if !divergent && rng.gen::<f64>() < accept_prob {
            state = proposal;
            any_accept = true;
        }

        if warming {
            adapt.update(accept_prob);
            if iter >= mass_switch {
                welford.update(&state.q);
            }
            // Switch to the estimated metric once, mid-warmup, and restart
            // step-size adaptation against it.
            if iter + 1 == opts.warmup {
                if let Some(var) = welford.variance() {
                    inv_mass = var;
                }
                let eps_now = adapt.current_step_size();
                adapt.reset(eps_now);
                adapt.update(opts.target_accept);
                if !any_accept {
                    return Err(EstError::SamplerStuck {
                        reason: "No proposal was accepted during warmup; \
                                 check the model for invalid parameter ranges.",
                    });
                }
            }
        } else {
            draws.row_mut(iter - opts.warmup).assign(&state.q);
        }
    }

    Ok(draws)
}

/// `K(p) = 0.5 · Σ inv_mass_i · p_i²` for the diagonal metric.
fn kinetic_energy(inv_mass: &[f64], p: &Array1<f64>) -> f64 {
    0.5 * p.iter().zip(inv_mass.iter()).map(|(&pi, &mi)| mi * pi * pi).sum::<f64>()
}

/// Integrate one trajectory; returns `(end state, end Hamiltonian, divergent)`.
#[allow(clippy::too_many_arguments)]
fn leapfrog<LP, GP>(
    start: &HmcState, mut p: Array1<f64>, eps: f64, n_steps: usize, inv_mass: &[f64], logp: &LP,
    grad_potential: &GP,
) -> (HmcState, f64, bool)
where
    LP: Fn(&Theta) -> f64,
    GP: Fn(&Theta) -> Theta,
{
    let mut q = start.q.clone();
    let mut grad = start.grad_potential.clone();

    for _ in 0..n_steps {
        p = &p - &(eps / 2.0 * &grad);
        for i in 0..q.len() {
            q[i] += eps * inv_mass[i] * p[i];
        }
        grad = grad_potential(&q);
        if grad.iter().any(|g| !g.is_finite()) {
            return (
                HmcState { q: start.q.clone(), potential: start.potential, grad_potential: start.grad_potential.clone() },
                f64::INFINITY,
                true,
            );
        }
        p = &p - &(eps / 2.0 * &grad);
    }

    let lp = logp(&q);
    if !lp.is_finite() {
        return (
            HmcState { q: start.q.clone(), potential: start.potential, grad_potential: start.grad_potential.clone() },
            f64::INFINITY,
            true,
        );
    }
    let potential = -lp;
    let h = potential + kinetic_energy(inv_mass, &p);
    (HmcState { q, potential, grad_potential: grad }, h, !h.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimation::errors::EstResult;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Option validation.
    // - Recovery of the first two moments of a known Gaussian target.
    // - The hard error on a non-finite starting density.
    // -------------------------------------------------------------------------

    struct StdNormal;

    impl LogDensity for StdNormal {
        type Data = ();

        fn dim(&self) -> usize {
            2
        }

        fn value(&self, theta: &Theta, _: &()) -> EstResult<f64> {
            Ok(-0.5 * theta.dot(theta))
        }
    }

    struct NanDensity;

    impl LogDensity for NanDensity {
        type Data = ();

        fn dim(&self) -> usize {
            1
        }

        fn value(&self, _: &Theta, _: &()) -> EstResult<f64> {
            Ok(f64::NAN)
        }
    }

    #[test]
    fn options_reject_degenerate_values() {
        assert!(matches!(
            HmcOptions::new(0, 10, 8, 0.8, 0.1, None),
            Err(EstError::InvalidHmcConfig { name: "draws", .. })
        ));
        assert!(matches!(
            HmcOptions::new(10, 10, 8, 1.0, 0.1, None),
            Err(EstError::InvalidHmcConfig { name: "target_accept", .. })
        ));
        assert!(matches!(
            HmcOptions::new(10, 10, 8, 0.8, 0.0, None),
            Err(EstError::InvalidHmcConfig { name: "init_step_size", .. })
        ));
    }

    #[test]
    fn recovers_gaussian_moments() {
        let opts = HmcOptions {
            draws: 1500,
            warmup: 500,
            seed: Some(7),
            ..HmcOptions::default()
        };
        let draws = sample(&StdNormal, &(), array![2.5, -2.5], &opts)
            .expect("standard normal target should sample");
        for col in 0..2 {
            let c = draws.column(col);
            let mean = c.mean().unwrap();
            let sd = c.std(1.0);
            assert!(mean.abs() < 0.15, "mean {mean} too far from 0");
            assert!((sd - 1.0).abs() < 0.25, "sd {sd} too far from 1");
        }
    }

    #[test]
    fn non_finite_start_is_a_hard_error() {
        let err = sample(&NanDensity, &(), array![0.0], &HmcOptions::default()).unwrap_err();
        assert!(matches!(err, EstError::NonFiniteDensity { .. }));
    }
}

//! Time-domain integration of the damped oscillator.
//!
//! This module integrates the initial-value problem
//!
//! ```text
//!     ẋ = v
//!     v̇ = −(γ/m)·v − (k/m)·x,    x(t₀) = x0,  v(t₀) = v0
//! ```
//!
//! with an embedded Dormand–Prince 4(5) Runge–Kutta pair. The pair produces
//! a 5th-order solution together with a 4th-order error estimate from the
//! same stage evaluations; the estimate drives the step size:
//!
//! ```text
//!     err = rms( (y⁵ − y⁴) / (atol + rtol·|y|) )
//!     h_new = h · clamp(0.9 · err^(−1/5), 0.2, 5.0)
//! ```
//!
//! Accepted steps are typically much larger than the requested output
//! spacing, so samples are produced by the method's order-4 continuous
//! extension (dense output) rather than by constraining the step size.
//! The output grid itself is built by linspace, so the first and last
//! sample times equal `t_start` and `t_end` exactly.
//!
//! Tolerances are fixed internal constants. The system is linear and
//! non-stiff for every admissible parameter set, so a single tolerance
//! level serves all callers; it is deliberately not configurable.

use tracing::debug;

use crate::types::{ModelParameters, SimError, SimResult, Trajectory};

/// Relative error tolerance of the embedded pair. Tight enough that the
/// accumulated phase error over a 30 s window stays well below 1e-4.
const RTOL: f64 = 1e-8;
/// Absolute error tolerance of the embedded pair.
const ATOL: f64 = 1e-11;
/// Step-size safety factor.
const SAFETY: f64 = 0.9;
/// Largest allowed step shrink per rejection.
const FACTOR_MIN: f64 = 0.2;
/// Largest allowed step growth per acceptance.
const FACTOR_MAX: f64 = 5.0;
/// Total step budget (accepted + rejected) before giving up.
const MAX_STEPS: usize = 100_000;

// Dormand-Prince 4(5) tableau.
const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;
const A71: f64 = 35.0 / 384.0;
const A73: f64 = 500.0 / 1113.0;
const A74: f64 = 125.0 / 192.0;
const A75: f64 = -2187.0 / 6784.0;
const A76: f64 = 11.0 / 84.0;

// Error coefficients: difference between the 5th- and 4th-order weights.
const E1: f64 = 71.0 / 57600.0;
const E3: f64 = -71.0 / 16695.0;
const E4: f64 = 71.0 / 1920.0;
const E5: f64 = -17253.0 / 339200.0;
const E6: f64 = 22.0 / 525.0;
const E7: f64 = -1.0 / 40.0;

// Dense-output coefficients for the order-4 continuous extension.
const D1: f64 = -12715105075.0 / 11282082432.0;
const D3: f64 = 87487479700.0 / 32700410799.0;
const D4: f64 = -10690763975.0 / 1880347072.0;
const D5: f64 = 701980252875.0 / 199316789632.0;
const D6: f64 = -1453857185.0 / 822651844.0;
const D7: f64 = 69997945.0 / 29380423.0;

/// State vector [x, v]
type State = [f64; 2];

/// Counters accumulated over one integration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntegrationStats {
    /// Steps whose error estimate passed the tolerance test.
    pub accepted_steps: usize,
    /// Steps retried with a smaller h.
    pub rejected_steps: usize,
    /// Right-hand-side evaluations.
    pub rhs_evals: usize,
}

/// Adaptive-step integrator for the damped oscillator.
///
/// Stateless between calls; every [`simulate`](Self::simulate) is an
/// independent, deterministic computation. Cheap to construct, so sweep
/// workers each own one.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrajectorySimulator;

impl TrajectorySimulator {
    pub fn new() -> Self {
        Self
    }

    /// Integrate the oscillator over the parameter window, sampling at
    /// `params.samples` evenly spaced times.
    ///
    /// Returns `InvalidParameter` for precondition violations and
    /// `NumericalFailure` if the integrator produces non-finite state or
    /// exhausts its step budget.
    pub fn simulate(&self, params: &ModelParameters) -> SimResult<Trajectory> {
        self.simulate_with_stats(params).map(|(traj, _)| traj)
    }

    /// Like [`simulate`](Self::simulate), additionally returning the
    /// integrator's step counters.
    pub fn simulate_with_stats(
        &self,
        params: &ModelParameters,
    ) -> SimResult<(Trajectory, IntegrationStats)> {
        params.validate()?;

        let n = params.samples;
        let span = params.t_end - params.t_start;

        // Output grid: linspace with exact endpoints.
        let mut t_eval = Vec::with_capacity(n);
        for i in 0..n {
            t_eval.push(params.t_start + span * i as f64 / (n - 1) as f64);
        }
        t_eval[0] = params.t_start;
        t_eval[n - 1] = params.t_end;

        let mut times = Vec::with_capacity(n);
        let mut displacement = Vec::with_capacity(n);
        let mut velocity = Vec::with_capacity(n);

        let mut stats = IntegrationStats::default();
        let mut t = params.t_start;
        let mut y: State = [params.x0, params.v0];

        times.push(t_eval[0]);
        displacement.push(y[0]);
        velocity.push(y[1]);
        let mut out_idx = 1;

        let mut k1 = rhs(params, &y);
        stats.rhs_evals += 1;
        let mut h = initial_step(&y, &k1, span);
        let min_step = span * 1e-14;

        while out_idx < n {
            if stats.accepted_steps + stats.rejected_steps >= MAX_STEPS {
                return Err(SimError::NumericalFailure(format!(
                    "step budget of {MAX_STEPS} exhausted at t = {t}"
                )));
            }
            h = h.min(params.t_end - t);

            // Stage evaluations (k1 is carried over: the pair is FSAL).
            let y2 = axpy(&y, h, &[(A21, &k1)]);
            let k2 = rhs(params, &y2);
            let y3 = axpy(&y, h, &[(A31, &k1), (A32, &k2)]);
            let k3 = rhs(params, &y3);
            let y4 = axpy(&y, h, &[(A41, &k1), (A42, &k2), (A43, &k3)]);
            let k4 = rhs(params, &y4);
            let y5 = axpy(&y, h, &[(A51, &k1), (A52, &k2), (A53, &k3), (A54, &k4)]);
            let k5 = rhs(params, &y5);
            let y6 = axpy(
                &y,
                h,
                &[(A61, &k1), (A62, &k2), (A63, &k3), (A64, &k4), (A65, &k5)],
            );
            let k6 = rhs(params, &y6);
            let y_next = axpy(
                &y,
                h,
                &[(A71, &k1), (A73, &k3), (A74, &k4), (A75, &k5), (A76, &k6)],
            );
            let k7 = rhs(params, &y_next);
            stats.rhs_evals += 6;

            if !y_next.iter().all(|v| v.is_finite()) {
                return Err(SimError::NumericalFailure(format!(
                    "non-finite state at t = {t} (step {h})"
                )));
            }

            let err = error_norm(&y, &y_next, h, &k1, &k3, &k4, &k5, &k6, &k7);

            if err <= 1.0 {
                // Accepted: build the continuous extension for this interval
                // and emit every requested sample it covers.
                let mut t_next = t + h;
                if params.t_end - t_next < min_step {
                    t_next = params.t_end;
                }
                let dense = DenseInterval::new(&y, &y_next, h, &k1, &k3, &k4, &k5, &k6, &k7);
                while out_idx < n && t_eval[out_idx] <= t_next {
                    let theta = ((t_eval[out_idx] - t) / h).clamp(0.0, 1.0);
                    let yi = dense.eval(theta);
                    times.push(t_eval[out_idx]);
                    displacement.push(yi[0]);
                    velocity.push(yi[1]);
                    out_idx += 1;
                }

                t = t_next;
                y = y_next;
                k1 = k7;
                stats.accepted_steps += 1;
            } else {
                stats.rejected_steps += 1;
            }

            h *= (SAFETY * err.powf(-0.2)).clamp(FACTOR_MIN, FACTOR_MAX);
            if h < min_step && out_idx < n {
                return Err(SimError::NumericalFailure(format!(
                    "step size underflow at t = {t}"
                )));
            }
        }

        debug!(
            accepted = stats.accepted_steps,
            rejected = stats.rejected_steps,
            rhs_evals = stats.rhs_evals,
            "integration complete"
        );

        Ok((
            Trajectory {
                times,
                displacement,
                velocity,
            },
            stats,
        ))
    }
}

/// Integrate with a default simulator. Convenience for one-off calls.
pub fn simulate(params: &ModelParameters) -> SimResult<Trajectory> {
    TrajectorySimulator::new().simulate(params)
}

/// Equation of motion: ẋ = v, v̇ = −(γ/m)v − (k/m)x.
#[inline]
fn rhs(p: &ModelParameters, y: &State) -> State {
    [
        y[1],
        -(p.damping / p.mass) * y[1] - (p.stiffness / p.mass) * y[0],
    ]
}

/// y + h * Σ cᵢ·kᵢ
#[inline]
fn axpy(y: &State, h: f64, terms: &[(f64, &State)]) -> State {
    let mut out = *y;
    for (c, k) in terms {
        out[0] += h * c * k[0];
        out[1] += h * c * k[1];
    }
    out
}

/// Scaled RMS norm of the embedded error estimate. <= 1 means the step
/// satisfies the tolerances.
#[allow(clippy::too_many_arguments)]
#[inline]
fn error_norm(
    y0: &State,
    y1: &State,
    h: f64,
    k1: &State,
    k3: &State,
    k4: &State,
    k5: &State,
    k6: &State,
    k7: &State,
) -> f64 {
    let mut sum = 0.0;
    for i in 0..2 {
        let e = h * (E1 * k1[i] + E3 * k3[i] + E4 * k4[i] + E5 * k5[i] + E6 * k6[i] + E7 * k7[i]);
        let scale = ATOL + RTOL * y0[i].abs().max(y1[i].abs());
        let r = e / scale;
        sum += r * r;
    }
    let norm = (sum / 2.0).sqrt();
    // A vanishing estimate would drive the growth factor to infinity; the
    // clamp handles it, but keep the norm itself well defined.
    norm.max(1e-10)
}

/// Order-4 continuous extension over one accepted step [t, t+h].
struct DenseInterval {
    rcont1: State,
    rcont2: State,
    rcont3: State,
    rcont4: State,
    rcont5: State,
}

impl DenseInterval {
    #[allow(clippy::too_many_arguments)]
    fn new(
        y0: &State,
        y1: &State,
        h: f64,
        k1: &State,
        k3: &State,
        k4: &State,
        k5: &State,
        k6: &State,
        k7: &State,
    ) -> Self {
        let mut rcont1 = [0.0; 2];
        let mut rcont2 = [0.0; 2];
        let mut rcont3 = [0.0; 2];
        let mut rcont4 = [0.0; 2];
        let mut rcont5 = [0.0; 2];
        for i in 0..2 {
            let ydiff = y1[i] - y0[i];
            let bspl = h * k1[i] - ydiff;
            rcont1[i] = y0[i];
            rcont2[i] = ydiff;
            rcont3[i] = bspl;
            rcont4[i] = ydiff - h * k7[i] - bspl;
            rcont5[i] = h
                * (D1 * k1[i] + D3 * k3[i] + D4 * k4[i] + D5 * k5[i] + D6 * k6[i] + D7 * k7[i]);
        }
        Self {
            rcont1,
            rcont2,
            rcont3,
            rcont4,
            rcont5,
        }
    }

    /// Evaluate at θ ∈ [0, 1] within the step. θ = 0 gives y(t), θ = 1
    /// reproduces y(t+h) exactly.
    fn eval(&self, theta: f64) -> State {
        let s = theta;
        let s1 = 1.0 - theta;
        let mut out = [0.0; 2];
        for i in 0..2 {
            out[i] = self.rcont1[i]
                + s * (self.rcont2[i]
                    + s1 * (self.rcont3[i] + s * (self.rcont4[i] + s1 * self.rcont5[i])));
        }
        out
    }
}

/// Starting step size from the scaled magnitudes of the state and its
/// derivative (simplified Hairer h_init).
fn initial_step(y: &State, f: &State, span: f64) -> f64 {
    let mut d0 = 0.0;
    let mut d1 = 0.0;
    for i in 0..2 {
        let scale = ATOL + RTOL * y[i].abs();
        d0 += (y[i] / scale).powi(2);
        d1 += (f[i] / scale).powi(2);
    }
    let d0 = (d0 / 2.0).sqrt();
    let d1 = (d1 / 2.0).sqrt();
    let h0 = if d0 < 1e-5 || d1 < 1e-5 {
        1e-6 * span
    } else {
        0.01 * d0 / d1
    };
    h0.min(span)
}

//! Core types for the damped-oscillator simulation library.
//!
//! This module defines the model parameters, the sampled trajectory produced
//! by the integrator, and the crate-wide error type.
//!
//! ## The model
//!
//! The system is a second-order linear oscillator with constant coefficients:
//!
//! ```text
//!     m·ẍ + γ·ẋ + k·x = 0,    x(t₀) = x0,  ẋ(t₀) = v0
//! ```
//!
//! rewritten as the first-order system integrated by the simulator:
//!
//! ```text
//!     ẋ = v
//!     v̇ = −(γ/m)·v − (k/m)·x
//! ```
//!
//! The damping ratio ζ = γ / (2·√(m·k)) selects the response regime:
//!
//! | Regime          | Condition | Free response                       |
//! |-----------------|-----------|-------------------------------------|
//! | Undamped        | ζ = 0     | Sustained oscillation at √(k/m)     |
//! | Underdamped     | ζ < 1     | Decaying oscillation                |
//! | Critically damped | ζ = 1   | Fastest non-oscillatory decay       |
//! | Overdamped      | ζ > 1     | Slow non-oscillatory decay          |

use serde::{Deserialize, Serialize};

/// Result type for simulation and analysis operations
pub type SimResult<T> = Result<T, SimError>;

/// Errors that can occur during simulation, analysis, or sweeps
#[derive(Debug, Clone, thiserror::Error)]
pub enum SimError {
    /// A caller-supplied physical parameter violates a precondition.
    /// Never silently corrected.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The integrator produced non-finite state or exhausted its step
    /// budget. Deterministic for given inputs, so never retried.
    #[error("numerical failure: {0}")]
    NumericalFailure(String),

    /// Analysis or sweep configuration outside the supported range.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A cooperative cancellation flag was observed mid-sweep.
    #[error("sweep cancelled")]
    Cancelled,
}

/// Parameters of the damped oscillator and its sampling window.
///
/// Construct via [`ModelParameters::builder`] or start from [`Default`]
/// (m = 1, γ = 0.15, k = 1, x0 = 1, v0 = 0, t ∈ [0, 30], 3000 samples)
/// and adjust fields directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    /// Mass m. Must be strictly positive (the equation of motion divides by it).
    pub mass: f64,
    /// Viscous damping coefficient γ ≥ 0.
    pub damping: f64,
    /// Spring stiffness k ≥ 0.
    pub stiffness: f64,
    /// Initial displacement x(t_start).
    pub x0: f64,
    /// Initial velocity ẋ(t_start).
    pub v0: f64,
    /// Start of the integration window.
    pub t_start: f64,
    /// End of the integration window. Must exceed `t_start`.
    pub t_end: f64,
    /// Number of evenly spaced output samples. Must be at least 2.
    pub samples: usize,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self {
            mass: 1.0,
            damping: 0.15,
            stiffness: 1.0,
            x0: 1.0,
            v0: 0.0,
            t_start: 0.0,
            t_end: 30.0,
            samples: 3000,
        }
    }
}

impl ModelParameters {
    /// Start building a parameter set from the defaults.
    pub fn builder() -> ModelParametersBuilder {
        ModelParametersBuilder {
            params: Self::default(),
        }
    }

    /// Check every precondition, returning `InvalidParameter` on the first
    /// violation.
    pub fn validate(&self) -> SimResult<()> {
        let finite = [
            self.mass,
            self.damping,
            self.stiffness,
            self.x0,
            self.v0,
            self.t_start,
            self.t_end,
        ];
        if finite.iter().any(|v| !v.is_finite()) {
            return Err(SimError::InvalidParameter(
                "all model parameters must be finite".into(),
            ));
        }
        if self.mass <= 0.0 {
            return Err(SimError::InvalidParameter(format!(
                "mass must be > 0, got {}",
                self.mass
            )));
        }
        if self.damping < 0.0 {
            return Err(SimError::InvalidParameter(format!(
                "damping must be >= 0, got {}",
                self.damping
            )));
        }
        if self.stiffness < 0.0 {
            return Err(SimError::InvalidParameter(format!(
                "stiffness must be >= 0, got {}",
                self.stiffness
            )));
        }
        if self.t_end <= self.t_start {
            return Err(SimError::InvalidParameter(format!(
                "time window must satisfy t_end > t_start, got [{}, {}]",
                self.t_start, self.t_end
            )));
        }
        if self.samples < 2 {
            return Err(SimError::InvalidParameter(format!(
                "at least 2 samples required, got {}",
                self.samples
            )));
        }
        Ok(())
    }

    /// Undamped natural angular frequency ω₀ = √(k/m) in rad/s.
    pub fn natural_angular_frequency(&self) -> f64 {
        (self.stiffness / self.mass).sqrt()
    }

    /// Undamped natural frequency √(k/m) / 2π in Hz.
    pub fn natural_frequency(&self) -> f64 {
        self.natural_angular_frequency() / (2.0 * std::f64::consts::PI)
    }

    /// Damping ratio ζ = γ / (2·√(m·k)). Returns +∞ for k = 0 with γ > 0.
    pub fn damping_ratio(&self) -> f64 {
        let denom = 2.0 * (self.mass * self.stiffness).sqrt();
        if denom > 0.0 {
            self.damping / denom
        } else if self.damping > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    }
}

/// Builder for [`ModelParameters`]
#[derive(Debug, Clone)]
pub struct ModelParametersBuilder {
    params: ModelParameters,
}

impl ModelParametersBuilder {
    pub fn mass(mut self, mass: f64) -> Self {
        self.params.mass = mass;
        self
    }

    pub fn damping(mut self, damping: f64) -> Self {
        self.params.damping = damping;
        self
    }

    pub fn stiffness(mut self, stiffness: f64) -> Self {
        self.params.stiffness = stiffness;
        self
    }

    pub fn initial_displacement(mut self, x0: f64) -> Self {
        self.params.x0 = x0;
        self
    }

    pub fn initial_velocity(mut self, v0: f64) -> Self {
        self.params.v0 = v0;
        self
    }

    pub fn time_window(mut self, t_start: f64, t_end: f64) -> Self {
        self.params.t_start = t_start;
        self.params.t_end = t_end;
        self
    }

    pub fn samples(mut self, samples: usize) -> Self {
        self.params.samples = samples;
        self
    }

    /// Finish building, validating every precondition.
    pub fn build(self) -> SimResult<ModelParameters> {
        self.params.validate()?;
        Ok(self.params)
    }
}

/// A sampled trajectory (t, x, ẋ) produced by one simulation call.
///
/// Times are strictly increasing with `times[0] == t_start` and
/// `times[len-1] == t_end` exactly, by construction of the sampling grid.
/// Immutable after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    /// Sample times, strictly increasing.
    pub times: Vec<f64>,
    /// Displacement x at each sample time.
    pub displacement: Vec<f64>,
    /// Velocity ẋ at each sample time.
    pub velocity: Vec<f64>,
}

impl Trajectory {
    /// Number of samples.
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Time between the first pair of samples. The output grid is uniform,
    /// so this is the sample period of the whole trajectory.
    pub fn sample_step(&self) -> f64 {
        if self.times.len() < 2 {
            0.0
        } else {
            self.times[1] - self.times[0]
        }
    }

    /// Peak absolute displacement over the window. This is the reduction
    /// used by the parameter sweep.
    pub fn max_abs_displacement(&self) -> f64 {
        self.displacement.iter().fold(0.0_f64, |m, x| m.max(x.abs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn builder_accepts_valid_parameters() {
        let params = ModelParameters::builder()
            .mass(2.0)
            .damping(0.5)
            .stiffness(3.0)
            .time_window(0.0, 10.0)
            .samples(500)
            .build()
            .unwrap();
        assert_relative_eq!(params.mass, 2.0);
        assert_eq!(params.samples, 500);
    }

    #[test]
    fn builder_rejects_non_positive_mass() {
        let err = ModelParameters::builder().mass(0.0).build().unwrap_err();
        assert!(matches!(err, SimError::InvalidParameter(_)));
    }

    #[test]
    fn builder_rejects_inverted_time_window() {
        let err = ModelParameters::builder()
            .time_window(5.0, 5.0)
            .build()
            .unwrap_err();
        assert!(matches!(err, SimError::InvalidParameter(_)));
    }

    #[test]
    fn builder_rejects_too_few_samples() {
        let err = ModelParameters::builder().samples(1).build().unwrap_err();
        assert!(matches!(err, SimError::InvalidParameter(_)));
    }

    #[test]
    fn builder_rejects_non_finite_values() {
        let err = ModelParameters::builder()
            .stiffness(f64::NAN)
            .build()
            .unwrap_err();
        assert!(matches!(err, SimError::InvalidParameter(_)));
    }

    #[test]
    fn natural_frequency_matches_analytic_value() {
        let params = ModelParameters::builder()
            .mass(1.0)
            .stiffness(4.0)
            .build()
            .unwrap();
        // omega_0 = sqrt(4/1) = 2 rad/s
        assert_relative_eq!(params.natural_angular_frequency(), 2.0, epsilon = 1e-12);
        assert_relative_eq!(
            params.natural_frequency(),
            1.0 / std::f64::consts::PI,
            epsilon = 1e-12
        );
    }

    #[test]
    fn damping_ratio_regimes() {
        let critical = ModelParameters::builder()
            .mass(1.0)
            .stiffness(1.0)
            .damping(2.0)
            .build()
            .unwrap();
        assert_relative_eq!(critical.damping_ratio(), 1.0, epsilon = 1e-12);

        let undamped = ModelParameters::builder().damping(0.0).build().unwrap();
        assert_relative_eq!(undamped.damping_ratio(), 0.0);
    }

    #[test]
    fn max_abs_displacement_over_mixed_signs() {
        let traj = Trajectory {
            times: vec![0.0, 1.0, 2.0],
            displacement: vec![0.5, -1.5, 1.0],
            velocity: vec![0.0, 0.0, 0.0],
        };
        assert_relative_eq!(traj.max_abs_displacement(), 1.5);
        assert_relative_eq!(traj.sample_step(), 1.0);
    }
}

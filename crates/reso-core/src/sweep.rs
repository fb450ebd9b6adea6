//! 2D parameter sweeps over (damping, stiffness).
//!
//! The sweep engine maps peak response amplitude over a grid of damping and
//! stiffness values: every cell runs one independent simulation and reduces
//! the trajectory to max |x(t)|. The resulting matrix is what the
//! presentation layer renders as a heatmap or 3D surface.
//!
//! ```text
//!            stiffness k →
//!   damping  ┌──────────────────┐
//!      γ     │ Z[i][j] =        │      Z[i][j] from an independent
//!      ↓     │   max |x(t)|     │      simulation of (γᵢ, kⱼ)
//!            └──────────────────┘
//! ```
//!
//! Cells share nothing, so the grid is embarrassingly parallel: with the
//! `parallel` feature (default-on) rows are partitioned across rayon's
//! worker pool, each worker owning its own simulator. The reduction is
//! commutative, so evaluation order never affects the result.
//!
//! Failure policy: the sweep aborts on the first failing cell. A cell can
//! only fail through a caller configuration error or a numerical breakdown,
//! both deterministic, so a partially valid grid has no value. Cooperative
//! cancellation is available via [`SweepEngine::run_cancellable`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::simulator::TrajectorySimulator;
use crate::types::{ModelParameters, SimError, SimResult};

/// Configuration of an amplitude sweep.
///
/// The damping and stiffness axes must be non-empty and strictly
/// increasing; mass, initial conditions, and the time window are shared by
/// every cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Damping axis (rows), strictly increasing.
    pub damping_values: Vec<f64>,
    /// Stiffness axis (columns), strictly increasing.
    pub stiffness_values: Vec<f64>,
    /// Shared mass. Must be strictly positive.
    pub mass: f64,
    /// Shared initial displacement.
    pub x0: f64,
    /// Shared initial velocity.
    pub v0: f64,
    /// Shared integration window start.
    pub t_start: f64,
    /// Shared integration window end.
    pub t_end: f64,
    /// Output samples per cell. Lower than single-run resolution to bound
    /// total sweep cost.
    pub samples_per_cell: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            damping_values: Vec::new(),
            stiffness_values: Vec::new(),
            mass: 1.0,
            x0: 1.0,
            v0: 0.0,
            t_start: 0.0,
            t_end: 30.0,
            samples_per_cell: 800,
        }
    }
}

impl SweepConfig {
    /// Build an axis from an inclusive range and a positive step, the way
    /// the interactive grid controls specify sweeps.
    pub fn axis(min: f64, max: f64, step: f64) -> Vec<f64> {
        if !(step > 0.0) || max < min {
            return Vec::new();
        }
        // The epsilon keeps e.g. (3.0 - 0.0) / 0.2 from truncating to 14.
        let count = ((max - min) / step + 1e-9).floor() as usize + 1;
        (0..count).map(|i| min + step * i as f64).collect()
    }

    /// Check axis shape (`InvalidConfiguration`) and the shared physical
    /// parameters (`InvalidParameter`, via [`ModelParameters::validate`]).
    pub fn validate(&self) -> SimResult<()> {
        for (name, axis) in [
            ("damping", &self.damping_values),
            ("stiffness", &self.stiffness_values),
        ] {
            if axis.is_empty() {
                return Err(SimError::InvalidConfiguration(format!(
                    "{name} axis must not be empty"
                )));
            }
            if axis.windows(2).any(|w| !(w[1] > w[0])) {
                return Err(SimError::InvalidConfiguration(format!(
                    "{name} axis must be strictly increasing"
                )));
            }
        }
        // Validate the shared parameters once with the first cell's values;
        // per-cell damping/stiffness come from the (already checked) axes.
        self.cell_parameters(self.damping_values[0], self.stiffness_values[0])
            .validate()
    }

    fn cell_parameters(&self, damping: f64, stiffness: f64) -> ModelParameters {
        ModelParameters {
            mass: self.mass,
            damping,
            stiffness,
            x0: self.x0,
            v0: self.v0,
            t_start: self.t_start,
            t_end: self.t_end,
            samples: self.samples_per_cell,
        }
    }
}

/// Dense amplitude map produced by a sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepGrid {
    /// Damping axis (rows).
    pub damping_values: Vec<f64>,
    /// Stiffness axis (columns).
    pub stiffness_values: Vec<f64>,
    /// `max_amplitude[i][j]` = max |x(t)| for (damping_values[i], stiffness_values[j]).
    pub max_amplitude: Vec<Vec<f64>>,
}

impl SweepGrid {
    /// (rows, columns) = (damping count, stiffness count).
    pub fn dims(&self) -> (usize, usize) {
        (self.damping_values.len(), self.stiffness_values.len())
    }

    /// Amplitude at (damping index, stiffness index).
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.max_amplitude[i][j]
    }
}

/// Evaluates a [`SweepConfig`] into a [`SweepGrid`].
#[derive(Debug, Clone)]
pub struct SweepEngine {
    config: SweepConfig,
}

impl SweepEngine {
    /// Create an engine, validating the configuration up front.
    pub fn new(config: SweepConfig) -> SimResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Run the full sweep, aborting on the first failing cell.
    pub fn run(&self) -> SimResult<SweepGrid> {
        self.run_inner(None)
    }

    /// Run the sweep with a cooperative cancellation flag, checked before
    /// every cell. Returns [`SimError::Cancelled`] once the flag is seen.
    pub fn run_cancellable(&self, cancel: &AtomicBool) -> SimResult<SweepGrid> {
        self.run_inner(Some(cancel))
    }

    fn run_inner(&self, cancel: Option<&AtomicBool>) -> SimResult<SweepGrid> {
        let rows = self.config.damping_values.len();
        let cols = self.config.stiffness_values.len();
        let started = Instant::now();
        debug!(rows, cols, "starting amplitude sweep");

        let max_amplitude = self.compute_rows(cancel)?;

        info!(
            rows,
            cols,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "amplitude sweep complete"
        );

        Ok(SweepGrid {
            damping_values: self.config.damping_values.clone(),
            stiffness_values: self.config.stiffness_values.clone(),
            max_amplitude,
        })
    }

    #[cfg(feature = "parallel")]
    fn compute_rows(&self, cancel: Option<&AtomicBool>) -> SimResult<Vec<Vec<f64>>> {
        self.config
            .damping_values
            .par_iter()
            .map(|&damping| self.compute_row(damping, cancel))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn compute_rows(&self, cancel: Option<&AtomicBool>) -> SimResult<Vec<Vec<f64>>> {
        self.config
            .damping_values
            .iter()
            .map(|&damping| self.compute_row(damping, cancel))
            .collect()
    }

    /// One grid row: fixed damping, every stiffness. Each worker owns its
    /// simulator, so rows need no shared state.
    fn compute_row(&self, damping: f64, cancel: Option<&AtomicBool>) -> SimResult<Vec<f64>> {
        let simulator = TrajectorySimulator::new();
        self.config
            .stiffness_values
            .iter()
            .map(|&stiffness| {
                if let Some(flag) = cancel {
                    if flag.load(Ordering::Relaxed) {
                        return Err(SimError::Cancelled);
                    }
                }
                let params = self.config.cell_parameters(damping, stiffness);
                Ok(simulator.simulate(&params)?.max_abs_displacement())
            })
            .collect()
    }
}

/// Sweep with a fresh engine. Convenience for one-off calls.
pub fn sweep_amplitude(config: SweepConfig) -> SimResult<SweepGrid> {
    SweepEngine::new(config)?.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn small_config() -> SweepConfig {
        SweepConfig {
            damping_values: SweepConfig::axis(0.0, 1.0, 0.1),
            stiffness_values: SweepConfig::axis(0.0, 3.0, 0.2),
            samples_per_cell: 400,
            ..Default::default()
        }
    }

    #[test]
    fn axis_builder_covers_inclusive_range() {
        let axis = SweepConfig::axis(0.0, 1.0, 0.1);
        assert_eq!(axis.len(), 11);
        assert_relative_eq!(axis[0], 0.0);
        assert_relative_eq!(axis[10], 1.0, epsilon = 1e-9);
        assert!(SweepConfig::axis(1.0, 0.0, 0.1).is_empty());
        assert!(SweepConfig::axis(0.0, 1.0, 0.0).is_empty());
    }

    #[test]
    fn grid_dims_match_axes() {
        let grid = sweep_amplitude(small_config()).unwrap();
        assert_eq!(grid.dims(), (11, 16));
        assert_eq!(grid.max_amplitude.len(), 11);
        assert!(grid.max_amplitude.iter().all(|row| row.len() == 16));
    }

    #[test]
    fn amplitude_is_non_increasing_along_damping() {
        // More dissipation cannot raise the peak for x0 = 1, v0 = 0.
        let grid = sweep_amplitude(small_config()).unwrap();
        let (rows, cols) = grid.dims();
        for j in 0..cols {
            for i in 1..rows {
                assert!(
                    grid.get(i, j) <= grid.get(i - 1, j) + 1e-6,
                    "Z[{i}][{j}] = {} rose above Z[{}][{j}] = {}",
                    grid.get(i, j),
                    i - 1,
                    grid.get(i - 1, j)
                );
            }
        }
    }

    #[test]
    fn undamped_cells_peak_at_initial_amplitude() {
        let grid = sweep_amplitude(small_config()).unwrap();
        // Row 0 is gamma = 0: energy conservation caps |x| at |x0| = 1 for
        // stiffness > 0 (column 0 is k = 0, where x stays constant at x0).
        for j in 0..grid.dims().1 {
            assert_relative_eq!(grid.get(0, j), 1.0, max_relative = 1e-3);
        }
    }

    #[test]
    fn empty_axis_is_invalid_configuration() {
        let config = SweepConfig {
            damping_values: Vec::new(),
            stiffness_values: vec![1.0],
            ..Default::default()
        };
        assert!(matches!(
            SweepEngine::new(config),
            Err(SimError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn non_increasing_axis_is_invalid_configuration() {
        let config = SweepConfig {
            damping_values: vec![0.0, 0.5],
            stiffness_values: vec![1.0, 1.0],
            ..Default::default()
        };
        assert!(matches!(
            SweepEngine::new(config),
            Err(SimError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn invalid_shared_mass_is_invalid_parameter() {
        let config = SweepConfig {
            damping_values: vec![0.0, 0.5],
            stiffness_values: vec![1.0, 2.0],
            mass: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            SweepEngine::new(config),
            Err(SimError::InvalidParameter(_))
        ));
    }

    #[test]
    fn pre_set_cancel_flag_aborts_the_sweep() {
        let engine = SweepEngine::new(small_config()).unwrap();
        let cancel = AtomicBool::new(true);
        assert!(matches!(
            engine.run_cancellable(&cancel),
            Err(SimError::Cancelled)
        ));
    }

    #[test]
    fn sweep_is_deterministic() {
        let a = sweep_amplitude(small_config()).unwrap();
        let b = sweep_amplitude(small_config()).unwrap();
        assert_eq!(a, b);
    }
}

//! # Damped-Oscillator Simulation & Spectral Analysis Core
//!
//! This crate is the numerical core of a resonance-exploration application:
//! it integrates a second-order linear damped oscillator, extracts
//! frequency-domain features from the resulting trajectory, and maps peak
//! response amplitude over 2D (damping, stiffness) parameter grids.
//!
//! ## Overview
//!
//! ```text
//!                        ┌────────────────────┐
//!   ModelParameters ───▶ │ TrajectorySimulator│ ───▶ Trajectory (t, x, v)
//!                        └────────────────────┘          │
//!                                                        ├──▶ SpectralAnalyzer
//!                                                        │      f*, Q, BW,
//!                                                        │      centroid, THD
//!            (γ, k) grid ──▶ SweepEngine ── per cell ────┘
//!                               │
//!                               └──▶ SweepGrid: Z[i][j] = max |x(t)|
//! ```
//!
//! All three components are pure functions of their inputs: no shared
//! mutable state, no I/O, deterministic results. Presentation concerns
//! (plotting, export, routing) live entirely outside this crate; it only
//! consumes parameter values and produces value objects.
//!
//! ## Example
//!
//! ```rust
//! use reso_core::{simulate, analyze_spectrum, ModelParameters, SpectralConfig};
//!
//! // An undamped unit oscillator: x(t) = cos(t).
//! let params = ModelParameters::builder()
//!     .mass(1.0)
//!     .damping(0.0)
//!     .stiffness(1.0)
//!     .initial_displacement(1.0)
//!     .time_window(0.0, 30.0)
//!     .samples(3000)
//!     .build()
//!     .unwrap();
//!
//! let trajectory = simulate(&params).unwrap();
//! let spectrum = analyze_spectrum(&trajectory, SpectralConfig::default()).unwrap();
//!
//! // The dominant frequency sits at sqrt(k/m) / 2pi.
//! let f0 = params.natural_frequency();
//! assert!((spectrum.peak_frequency - f0).abs() < 0.05);
//! ```

pub mod simulator;
pub mod spectral;
pub mod sweep;
pub mod types;
pub mod window;

pub use simulator::{simulate, IntegrationStats, TrajectorySimulator};
pub use spectral::{
    analyze_spectrum, HarmonicPeak, SpectralAnalyzer, SpectralConfig, SpectralResult,
};
pub use sweep::{sweep_amplitude, SweepConfig, SweepEngine, SweepGrid};
pub use types::{ModelParameters, ModelParametersBuilder, SimError, SimResult, Trajectory};
pub use window::WindowKind;

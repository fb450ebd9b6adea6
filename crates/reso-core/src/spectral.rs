//! Frequency-domain feature extraction from a sampled trajectory.
//!
//! The analyzer turns a [`Trajectory`] into a magnitude spectrum plus the
//! scalar features a resonance study cares about:
//!
//! ```text
//!   Trajectory ──resample──▶ uniform grid ──window──▶ FFT ──▶ |bins|
//!                                                              │
//!                peak f*, −3 dB band, Q, centroid, THD  ◀──────┘
//! ```
//!
//! ## Why resample?
//!
//! The adaptive integrator is free to place its internal steps wherever the
//! local error dictates, and callers may request any output count, so the
//! displacement record is treated as an arbitrary sampling of x(t). The DFT
//! needs uniform samples; the first stage linearly interpolates the
//! displacement onto a uniform grid of `fft_size` points spanning the full
//! trajectory window. The grid length doubles as zero-padding control:
//! larger `fft_size` buys finer frequency resolution from the same window.
//!
//! ## Feature definitions
//!
//! - **Peak**: bin of maximum magnitude, DC (bin 0) always excluded.
//! - **−3 dB band**: contiguous bins around the peak with magnitude
//!   ≥ peak/√2; bandwidth is the frequency extent of that run.
//! - **Q**: peak frequency over bandwidth; +∞ for a one-bin band.
//! - **Centroid**: amplitude-weighted mean frequency.
//! - **THD**: √(Σ harmonic amplitudes²) / fundamental amplitude, counting a
//!   harmonic only when a bin lands within a relative tolerance of n·f*.

use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;
use tracing::debug;

use serde::{Deserialize, Serialize};

use crate::types::{SimError, SimResult, Trajectory};
use crate::window::WindowKind;

/// Smallest supported FFT length, 2^8.
pub const MIN_FFT_SIZE: usize = 1 << 8;
/// Largest supported FFT length, 2^16.
pub const MAX_FFT_SIZE: usize = 1 << 16;

/// Configuration of the spectral analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralConfig {
    /// FFT length. Must be a power of two in [2^8, 2^16].
    pub fft_size: usize,
    /// Window applied before the transform.
    pub window: WindowKind,
    /// Highest harmonic order included in the THD sum. Must be >= 2.
    pub harmonic_count: usize,
    /// Relative frequency offset below which a bin counts as harmonic n.
    pub harmonic_tolerance: f64,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            fft_size: 1 << 12,
            window: WindowKind::Hann,
            harmonic_count: 5,
            harmonic_tolerance: 0.03,
        }
    }
}

impl SpectralConfig {
    /// Check the supported ranges, returning `InvalidConfiguration` on the
    /// first violation.
    pub fn validate(&self) -> SimResult<()> {
        if !self.fft_size.is_power_of_two()
            || !(MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&self.fft_size)
        {
            return Err(SimError::InvalidConfiguration(format!(
                "fft_size must be a power of two in [{MIN_FFT_SIZE}, {MAX_FFT_SIZE}], got {}",
                self.fft_size
            )));
        }
        if self.harmonic_count < 2 {
            return Err(SimError::InvalidConfiguration(format!(
                "harmonic_count must be >= 2, got {}",
                self.harmonic_count
            )));
        }
        if !self.harmonic_tolerance.is_finite() || self.harmonic_tolerance <= 0.0 {
            return Err(SimError::InvalidConfiguration(format!(
                "harmonic_tolerance must be finite and > 0, got {}",
                self.harmonic_tolerance
            )));
        }
        Ok(())
    }
}

/// One accepted harmonic of the fundamental.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarmonicPeak {
    /// Harmonic order n (2 = first overtone).
    pub order: usize,
    /// Frequency of the matched bin.
    pub frequency: f64,
    /// Magnitude of the matched bin.
    pub amplitude: f64,
}

/// Magnitude spectrum and derived scalar features.
///
/// `frequencies` is strictly increasing from 0 with uniform spacing
/// 1/(fft_size · Δt); `magnitudes` are all non-negative; `bandwidth` and
/// `quality_factor` are never negative (the latter may be +∞).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralResult {
    /// Frequency of each bin, ascending from 0.
    pub frequencies: Vec<f64>,
    /// Magnitude of each bin.
    pub magnitudes: Vec<f64>,
    /// Dominant frequency f* (bin 0 excluded from the search).
    pub peak_frequency: f64,
    /// Magnitude at the dominant frequency.
    pub peak_magnitude: f64,
    /// Lower edge of the −3 dB band.
    pub band_low: f64,
    /// Upper edge of the −3 dB band.
    pub band_high: f64,
    /// band_high − band_low.
    pub bandwidth: f64,
    /// f* / bandwidth; +∞ when the band collapses to a single bin.
    pub quality_factor: f64,
    /// Amplitude-weighted mean frequency.
    pub centroid: f64,
    /// Total harmonic distortion ratio.
    pub thd: f64,
    /// Harmonics accepted by the tolerance match.
    pub harmonics: Vec<HarmonicPeak>,
}

/// Spectral analyzer with a cached FFT plan.
///
/// Reusable across trajectories of any length; the plan is tied only to the
/// configured FFT size.
pub struct SpectralAnalyzer {
    config: SpectralConfig,
    window: Vec<f64>,
    fft: Arc<dyn Fft<f64>>,
    scratch: Vec<Complex64>,
}

impl std::fmt::Debug for SpectralAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectralAnalyzer")
            .field("config", &self.config)
            .finish()
    }
}

impl SpectralAnalyzer {
    /// Create an analyzer, validating the configuration and planning the FFT.
    pub fn new(config: SpectralConfig) -> SimResult<Self> {
        config.validate()?;
        let window = config.window.generate(config.fft_size);
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(config.fft_size);
        let scratch = vec![Complex64::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        Ok(Self {
            config,
            window,
            fft,
            scratch,
        })
    }

    pub fn config(&self) -> &SpectralConfig {
        &self.config
    }

    /// Analyze the displacement record of a trajectory.
    ///
    /// The trajectory must hold at least two samples; shorter inputs are an
    /// `InvalidParameter` error.
    pub fn analyze(&mut self, trajectory: &Trajectory) -> SimResult<SpectralResult> {
        if trajectory.len() < 2 {
            return Err(SimError::InvalidParameter(format!(
                "trajectory must contain at least 2 samples, got {}",
                trajectory.len()
            )));
        }
        let span = *trajectory.times.last().unwrap() - trajectory.times[0];
        if !(span > 0.0) {
            return Err(SimError::InvalidParameter(
                "trajectory time span must be positive".into(),
            ));
        }

        let n = self.config.fft_size;
        let (resampled, dt) =
            resample_linear(&trajectory.times, &trajectory.displacement, n);

        // Window, transform, and keep the real-input half-spectrum.
        let mut buffer: Vec<Complex64> = resampled
            .iter()
            .zip(&self.window)
            .map(|(x, w)| Complex64::new(x * w, 0.0))
            .collect();
        self.fft.process_with_scratch(&mut buffer, &mut self.scratch);

        let bins = n / 2 + 1;
        let df = 1.0 / (n as f64 * dt);
        let frequencies: Vec<f64> = (0..bins).map(|i| i as f64 * df).collect();
        let magnitudes: Vec<f64> = buffer[..bins].iter().map(|c| c.norm()).collect();

        // Dominant peak, DC excluded.
        let (peak_idx, peak_magnitude) = magnitudes
            .iter()
            .enumerate()
            .skip(1)
            .fold((0, 0.0_f64), |(bi, bm), (i, &m)| {
                if m > bm {
                    (i, m)
                } else {
                    (bi, bm)
                }
            });
        let peak_frequency = if peak_magnitude > 0.0 {
            frequencies[peak_idx]
        } else {
            0.0
        };

        // Half-power band: contiguous run of bins >= peak/sqrt(2) around the peak.
        let (band_low, band_high, bandwidth) = if peak_magnitude > 0.0 {
            let threshold = peak_magnitude / std::f64::consts::SQRT_2;
            let mut lo = peak_idx;
            while lo > 0 && magnitudes[lo - 1] >= threshold {
                lo -= 1;
            }
            let mut hi = peak_idx;
            while hi + 1 < bins && magnitudes[hi + 1] >= threshold {
                hi += 1;
            }
            (
                frequencies[lo],
                frequencies[hi],
                frequencies[hi] - frequencies[lo],
            )
        } else {
            (0.0, 0.0, 0.0)
        };

        let quality_factor = if bandwidth > 0.0 {
            peak_frequency / bandwidth
        } else {
            f64::INFINITY
        };

        let total: f64 = magnitudes.iter().sum();
        let centroid = if total > 0.0 {
            frequencies
                .iter()
                .zip(&magnitudes)
                .map(|(f, m)| f * m)
                .sum::<f64>()
                / total
        } else {
            0.0
        };

        let (harmonics, thd) = if peak_magnitude > 0.0 {
            self.match_harmonics(&frequencies, &magnitudes, peak_frequency, peak_magnitude, df)
        } else {
            (Vec::new(), 0.0)
        };

        debug!(
            fft_size = n,
            peak_frequency,
            peak_magnitude,
            bandwidth,
            thd,
            "spectral analysis complete"
        );

        Ok(SpectralResult {
            frequencies,
            magnitudes,
            peak_frequency,
            peak_magnitude,
            band_low,
            band_high,
            bandwidth,
            quality_factor,
            centroid,
            thd,
            harmonics,
        })
    }

    /// Locate the spectral peak nearest to n·f* for n = 2..=H; it counts as
    /// harmonic n only when its relative offset from the target stays within
    /// the tolerance.
    ///
    /// Starting from the bin nearest the arithmetic multiple, the search
    /// climbs to the local magnitude maximum before applying the tolerance
    /// test. Harmonic energy concentrated off the exact multiple (an
    /// inharmonic overtone, or a neighbouring component masquerading as
    /// one) then fails the offset check instead of being picked up at
    /// whatever level it leaks into the target bin.
    fn match_harmonics(
        &self,
        frequencies: &[f64],
        magnitudes: &[f64],
        peak_frequency: f64,
        peak_magnitude: f64,
        df: f64,
    ) -> (Vec<HarmonicPeak>, f64) {
        let bins = frequencies.len();
        let mut harmonics = Vec::new();
        let mut energy = 0.0;
        for order in 2..=self.config.harmonic_count {
            let target = order as f64 * peak_frequency;
            let mut idx = (target / df).round() as usize;
            if idx >= bins {
                break;
            }
            // Hill-climb to the local peak; every move strictly increases
            // the magnitude, so the walk terminates.
            loop {
                if idx + 1 < bins && magnitudes[idx + 1] > magnitudes[idx] {
                    idx += 1;
                } else if idx > 0 && magnitudes[idx - 1] > magnitudes[idx] {
                    idx -= 1;
                } else {
                    break;
                }
            }
            let offset = (frequencies[idx] - target).abs() / target;
            if offset <= self.config.harmonic_tolerance {
                let amplitude = magnitudes[idx];
                energy += amplitude * amplitude;
                harmonics.push(HarmonicPeak {
                    order,
                    frequency: frequencies[idx],
                    amplitude,
                });
            }
        }
        (harmonics, energy.sqrt() / peak_magnitude)
    }
}

/// Analyze a trajectory with a fresh analyzer. Convenience for one-off calls.
pub fn analyze_spectrum(
    trajectory: &Trajectory,
    config: SpectralConfig,
) -> SimResult<SpectralResult> {
    SpectralAnalyzer::new(config)?.analyze(trajectory)
}

/// Linearly interpolate `values` onto a uniform grid of `n` points spanning
/// the full time range. Returns the resampled values and the grid spacing.
///
/// `times` must be sorted ascending with at least two entries.
fn resample_linear(times: &[f64], values: &[f64], n: usize) -> (Vec<f64>, f64) {
    let t0 = times[0];
    let t1 = *times.last().unwrap();
    let span = t1 - t0;
    let dt = span / (n - 1) as f64;

    let mut out = Vec::with_capacity(n);
    let mut seg = 0;
    for i in 0..n {
        let t = if i == n - 1 {
            t1
        } else {
            t0 + span * i as f64 / (n - 1) as f64
        };
        while seg + 2 < times.len() && times[seg + 1] < t {
            seg += 1;
        }
        let (ta, tb) = (times[seg], times[seg + 1]);
        let frac = if tb > ta {
            ((t - ta) / (tb - ta)).clamp(0.0, 1.0)
        } else {
            0.0
        };
        out.push(values[seg] + frac * (values[seg + 1] - values[seg]));
    }
    (out, dt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::simulate;
    use crate::types::ModelParameters;
    use approx::assert_relative_eq;

    fn undamped(t_end: f64, samples: usize) -> Trajectory {
        let params = ModelParameters::builder()
            .mass(1.0)
            .damping(0.0)
            .stiffness(1.0)
            .initial_displacement(1.0)
            .initial_velocity(0.0)
            .time_window(0.0, t_end)
            .samples(samples)
            .build()
            .unwrap();
        simulate(&params).unwrap()
    }

    #[test]
    fn config_rejects_non_power_of_two_fft() {
        let config = SpectralConfig {
            fft_size: 3000,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SimError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn config_rejects_out_of_range_fft_size() {
        for fft_size in [64, 1 << 17] {
            let config = SpectralConfig {
                fft_size,
                ..Default::default()
            };
            assert!(config.validate().is_err());
        }
    }

    #[test]
    fn config_rejects_harmonic_count_below_two() {
        let config = SpectralConfig {
            harmonic_count: 1,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SimError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn peak_recovers_natural_frequency_within_one_bin() {
        // omega_0 = 1 rad/s -> f0 = 1/(2 pi) Hz.
        let traj = undamped(30.0, 3000);
        let config = SpectralConfig {
            fft_size: 1 << 13,
            ..Default::default()
        };
        let result = analyze_spectrum(&traj, config).unwrap();

        let f0 = 1.0 / (2.0 * std::f64::consts::PI);
        let df = result.frequencies[1] - result.frequencies[0];
        assert!(
            (result.peak_frequency - f0).abs() <= df,
            "peak {} not within one bin ({df}) of {f0}",
            result.peak_frequency
        );
        assert!(result.peak_magnitude > 0.0);
    }

    #[test]
    fn bins_are_uniform_ascending_and_magnitudes_non_negative() {
        let traj = undamped(30.0, 1000);
        let result = analyze_spectrum(&traj, SpectralConfig::default()).unwrap();

        assert_eq!(result.frequencies.len(), (1 << 12) / 2 + 1);
        assert_eq!(result.frequencies[0], 0.0);
        let df = result.frequencies[1];
        for (i, pair) in result.frequencies.windows(2).enumerate() {
            assert!(pair[1] > pair[0], "bin {i} not increasing");
            assert_relative_eq!(pair[1] - pair[0], df, max_relative = 1e-9);
        }
        assert!(result.magnitudes.iter().all(|&m| m >= 0.0));
        assert!(result.bandwidth >= 0.0);
        assert!(result.quality_factor >= 0.0);
    }

    #[test]
    fn pure_tone_has_negligible_thd() {
        let traj = undamped(30.0, 3000);
        let result = analyze_spectrum(&traj, SpectralConfig::default()).unwrap();
        assert!(result.thd < 0.05, "THD {} for a pure tone", result.thd);
    }

    #[test]
    fn quality_factor_grows_as_damping_vanishes() {
        let analyze = |damping: f64| {
            let params = ModelParameters::builder()
                .damping(damping)
                .time_window(0.0, 120.0)
                .samples(6000)
                .build()
                .unwrap();
            let traj = simulate(&params).unwrap();
            let config = SpectralConfig {
                fft_size: 1 << 14,
                ..Default::default()
            };
            analyze_spectrum(&traj, config).unwrap().quality_factor
        };

        let q_light = analyze(0.01);
        let q_heavy = analyze(0.3);
        assert!(
            q_light > q_heavy,
            "Q should grow as damping vanishes ({q_light} vs {q_heavy})"
        );
        assert!(q_light > 4.0);
    }

    #[test]
    fn all_zero_signal_yields_empty_features() {
        let params = ModelParameters::builder()
            .initial_displacement(0.0)
            .initial_velocity(0.0)
            .samples(500)
            .build()
            .unwrap();
        let traj = simulate(&params).unwrap();
        let result = analyze_spectrum(&traj, SpectralConfig::default()).unwrap();

        assert_eq!(result.peak_frequency, 0.0);
        assert_eq!(result.peak_magnitude, 0.0);
        assert_eq!(result.bandwidth, 0.0);
        assert_eq!(result.centroid, 0.0);
        assert_eq!(result.thd, 0.0);
        assert!(result.harmonics.is_empty());
    }

    #[test]
    fn too_short_trajectory_is_rejected() {
        let traj = Trajectory {
            times: vec![0.0],
            displacement: vec![1.0],
            velocity: vec![0.0],
        };
        assert!(matches!(
            analyze_spectrum(&traj, SpectralConfig::default()),
            Err(SimError::InvalidParameter(_))
        ));
    }

    /// Two sinusoids placed on exact DFT bins of a 4096-point frame. The
    /// sample times coincide with the analyzer's resample grid, so the
    /// values pass through interpolation unchanged.
    fn two_tone(fundamental_bin: usize, second_bin: usize, ratio: f64) -> Trajectory {
        let n = 1 << 12;
        let t_end = 30.0;
        let times: Vec<f64> = (0..n)
            .map(|i| t_end * i as f64 / (n - 1) as f64)
            .collect();
        let displacement: Vec<f64> = (0..n)
            .map(|i| {
                let phase = 2.0 * std::f64::consts::PI * i as f64 / n as f64;
                (fundamental_bin as f64 * phase).sin() + ratio * (second_bin as f64 * phase).sin()
            })
            .collect();
        let velocity = vec![0.0; n];
        Trajectory {
            times,
            displacement,
            velocity,
        }
    }

    #[test]
    fn exact_third_harmonic_is_matched_and_sets_thd() {
        // Fundamental on bin 6, third harmonic on bin 18 at a tenth of the
        // amplitude: both tones see the same window gain, so the harmonic's
        // spectral amplitude is a tenth of the fundamental's.
        let traj = two_tone(6, 18, 0.1);
        let result = analyze_spectrum(&traj, SpectralConfig::default()).unwrap();

        let df = result.frequencies[1];
        assert_relative_eq!(result.peak_frequency, 6.0 * df, max_relative = 1e-9);

        let third = result
            .harmonics
            .iter()
            .find(|h| h.order == 3)
            .expect("third harmonic should be matched");
        assert_relative_eq!(
            third.frequency,
            3.0 * result.peak_frequency,
            max_relative = 1e-9
        );
        assert_relative_eq!(
            third.amplitude / result.peak_magnitude,
            0.1,
            max_relative = 0.01
        );
        assert_relative_eq!(result.thd, 0.1, max_relative = 0.01);
    }

    #[test]
    fn off_target_component_is_rejected_by_the_tolerance() {
        // A strong component on bin 13 sits 8.3% away from twice the
        // fundamental (bin 12), well outside the 3% default tolerance. The
        // matcher must not book its mainlobe leakage as an order-2 harmonic.
        let traj = two_tone(6, 13, 0.3);
        let result = analyze_spectrum(&traj, SpectralConfig::default()).unwrap();

        assert!(
            !result.harmonics.iter().any(|h| h.order == 2),
            "bin-13 component accepted as order-2 harmonic"
        );
        assert!(result.thd < 0.01, "THD {} from a rejected component", result.thd);
    }

    #[test]
    fn resample_reproduces_endpoints_and_linear_segments() {
        let times = vec![0.0, 1.0, 3.0];
        let values = vec![0.0, 2.0, -2.0];
        let (out, dt) = resample_linear(&times, &values, 7);
        assert_relative_eq!(dt, 0.5, epsilon = 1e-12);
        assert_relative_eq!(out[0], 0.0);
        assert_relative_eq!(out[1], 1.0); // t = 0.5 on the first segment
        assert_relative_eq!(out[2], 2.0); // t = 1.0, the knot
        assert_relative_eq!(out[6], -2.0); // exact right endpoint
    }
}

//! End-to-end tour of the core: simulate, analyze, sweep.
//!
//! Run with:
//!   cargo run --example damped_oscillator

use reso_core::{
    analyze_spectrum, sweep_amplitude, ModelParameters, SpectralConfig, SweepConfig,
    TrajectorySimulator,
};

fn main() {
    let params = ModelParameters::builder()
        .mass(1.0)
        .damping(0.15)
        .stiffness(1.0)
        .initial_displacement(1.0)
        .initial_velocity(0.0)
        .time_window(0.0, 30.0)
        .samples(3000)
        .build()
        .expect("valid parameters");

    let simulator = TrajectorySimulator::new();
    let (trajectory, stats) = simulator.simulate_with_stats(&params).expect("integration");
    println!("Damped oscillator (m = {}, γ = {}, k = {})", params.mass, params.damping, params.stiffness);
    println!("  Samples:        {}", trajectory.len());
    println!("  Peak |x|:       {:.6}", trajectory.max_abs_displacement());
    println!("  Final x:        {:.6}", trajectory.displacement.last().unwrap());
    println!("  Accepted steps: {}", stats.accepted_steps);
    println!("  Rejected steps: {}", stats.rejected_steps);
    println!("  RHS evals:      {}", stats.rhs_evals);

    let spectrum = analyze_spectrum(&trajectory, SpectralConfig::default()).expect("analysis");
    println!();
    println!("Spectral features (N = {} bins)", spectrum.frequencies.len());
    println!("  f*:             {:.4} Hz (natural: {:.4} Hz)", spectrum.peak_frequency, params.natural_frequency());
    println!("  −3 dB band:     [{:.4}, {:.4}] Hz", spectrum.band_low, spectrum.band_high);
    println!("  Q:              {:.2}", spectrum.quality_factor);
    println!("  Centroid:       {:.4} Hz", spectrum.centroid);
    println!("  THD:            {:.4}", spectrum.thd);

    let grid = sweep_amplitude(SweepConfig {
        damping_values: SweepConfig::axis(0.0, 1.0, 0.1),
        stiffness_values: SweepConfig::axis(0.0, 3.0, 0.2),
        ..Default::default()
    })
    .expect("sweep");
    let (rows, cols) = grid.dims();
    println!();
    println!("Amplitude sweep: {rows} × {cols} cells");
    println!("  Z[0][0]  (γ=0, k=0):   {:.4}", grid.get(0, 0));
    println!("  Z[{}][{}] (γ=1, k=3):   {:.4}", rows - 1, cols - 1, grid.get(rows - 1, cols - 1));
}

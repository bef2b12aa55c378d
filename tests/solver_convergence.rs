//! Convergence behavior of the nonlinear loop and the time weighting
//!
//! Verifies that tightening the nonlinear tolerance on a Freundlich
//! configuration makes successive solutions converge to each other, and
//! that the two time weightings agree on smooth problems.

use sedtran_rs::prelude::*;

mod common;
use common::tracer_config;

/// Freundlich cap loaded from a fixed surface concentration.
fn freundlich_config(tolerance: f64) -> SimulationConfig {
    let mut config = tracer_config();
    config.sorption = vec![SorptionRelation {
        component: 0,
        chemical: 0,
        isotherm: Isotherm::Freundlich { kf: 5.0, n: 0.7 },
        kinetics: Kinetics::Equilibrium,
    }];
    config.options.final_time = 10.0;
    config.options.time_steps = 100;
    config.options.nonlinear_tolerance = tolerance;
    config
}

/// Final porewater profile for a given nonlinear tolerance.
fn final_profile(tolerance: f64) -> Vec<f64> {
    let outcome = run(&freundlich_config(tolerance), &CancelToken::new()).unwrap();
    let series = outcome.series().unwrap();
    series.porewater_profile(series.len() - 1, 0)
}

fn max_difference(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

#[test]
fn test_profiles_converge_as_tolerance_shrinks() {
    let coarse = final_profile(1.0e-1);
    let medium = final_profile(1.0e-4);
    let fine = final_profile(1.0e-8);
    let finest = final_profile(1.0e-10);

    let gap_coarse = max_difference(&coarse, &finest);
    let gap_medium = max_difference(&medium, &finest);
    let gap_fine = max_difference(&fine, &finest);

    // Tightening the tolerance never moves the solution further from
    // the tightest run, and the tight runs agree closely.
    assert!(
        gap_medium <= gap_coarse + 1.0e-12,
        "medium gap {gap_medium:e} exceeds coarse gap {gap_coarse:e}"
    );
    assert!(
        gap_fine <= gap_medium + 1.0e-12,
        "fine gap {gap_fine:e} exceeds medium gap {gap_medium:e}"
    );
    assert!(gap_fine < 1.0e-6, "fine gap {gap_fine:e} too large");
}

#[test]
fn test_crank_nicolson_agrees_with_implicit() {
    let mut implicit = tracer_config();
    implicit.options.final_time = 10.0;
    implicit.options.time_steps = 400;

    let mut crank = implicit.clone();
    crank.options.weighting = TimeWeighting::CrankNicolson;

    let a = run(&implicit, &CancelToken::new()).unwrap();
    let b = run(&crank, &CancelToken::new()).unwrap();

    let series_a = a.series().unwrap();
    let series_b = b.series().unwrap();
    let last = series_a.len() - 1;

    for z in 0..series_a.depths.len() {
        let ca = series_a.porewater[[last, z, 0]];
        let cb = series_b.porewater[[last, z, 0]];
        assert!(
            (ca - cb).abs() < 0.02,
            "weightings disagree at row {z}: {ca} vs {cb}"
        );
    }
}

#[test]
fn test_crank_nicolson_refines_toward_implicit_limit() {
    // Both weightings must converge to the same solution as the step
    // count grows; Crank–Nicolson should be at least as close to the
    // refined limit as backward Euler at equal steps.
    let reference = {
        let mut config = tracer_config();
        config.options.final_time = 10.0;
        config.options.time_steps = 6400;
        let outcome = run(&config, &CancelToken::new()).unwrap();
        let series = outcome.series().unwrap();
        series.porewater_profile(series.len() - 1, 0)
    };

    let profile_for = |weighting: TimeWeighting| {
        let mut config = tracer_config();
        config.options.final_time = 10.0;
        config.options.time_steps = 100;
        config.options.weighting = weighting;
        let outcome = run(&config, &CancelToken::new()).unwrap();
        let series = outcome.series().unwrap();
        series.porewater_profile(series.len() - 1, 0)
    };

    let implicit_gap = max_difference(&profile_for(TimeWeighting::Implicit), &reference);
    let crank_gap = max_difference(&profile_for(TimeWeighting::CrankNicolson), &reference);

    assert!(
        crank_gap <= implicit_gap,
        "Crank-Nicolson gap {crank_gap:e} worse than implicit gap {implicit_gap:e}"
    );
}

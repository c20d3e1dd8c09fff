use approx::assert_relative_eq;
use bmns::prelude::*;
use shared_test_code::*;

const PLANTED_POPULATION: f64 = 0.04;

/// pB swept over 0.02, 0.04, 0.06 and 0.08, everything else fixed. The data
/// is simulated at the second grid point.
fn population_sweep() -> FitProblem {
    let truth = PhysicalParameters {
        pb: PLANTED_POPULATION,
        ..two_state_truth()
    };
    let dataset = simulated_dataset(
        "planted",
        LARMOR,
        &truth,
        &dispersion_conditions(),
        RATE_ERROR,
    );
    let parameters = ParameterSet::new()
        .with(ParameterSpec::free(ParameterName::Pb, 0.05, 0.02, 0.08).with_sweep(Sweep::linear(4)))
        .with(ParameterSpec::fixed(ParameterName::DwB, truth.dwb))
        .with(ParameterSpec::fixed(ParameterName::KexAB, truth.kex_ab))
        .with(ParameterSpec::fixed(ParameterName::R1, truth.r1))
        .with(ParameterSpec::fixed(ParameterName::R2, truth.r2));
    FitProblem::new(vec![dataset], vec![parameters], FitEquation::BlochMcConnell).unwrap()
}

#[test]
fn planted_grid_point_seeds_the_refinement() {
    let problem = population_sweep();
    let settings = FitSettings::default()
        .with_mode(FitMode::Brute)
        .with_threads(2);

    let outcome = Fitter::new(&problem, settings).unwrap().run().unwrap();

    let grid: Vec<_> = outcome.log.stage(Stage::Grid).collect();
    assert_eq!(grid.len(), 4);
    for (record, index) in grid.iter().zip(1..) {
        assert_eq!(record.index, index);
        assert!(!record.plot);
    }
    let expected = [0.02, 0.04, 0.06, 0.08];
    for (record, pb) in grid.iter().zip(expected) {
        assert_relative_eq!(record.parameters.pb, pb, epsilon = 1e-12);
    }
    let best = grid
        .iter()
        .min_by(|a, b| a.reduced_chi_square.total_cmp(&b.reduced_chi_square))
        .unwrap();
    assert_eq!(best.index, 2);

    let refined: Vec<_> = outcome.log.stage(Stage::Local).collect();
    assert_eq!(refined.len(), 1);
    assert_eq!(refined[0].index, 5);
    assert_relative_eq!(refined[0].parameters.pb, PLANTED_POPULATION, max_relative = 1e-2);
    assert!(refined[0].reduced_chi_square <= best.reduced_chi_square + 1e-9);
}

#[test]
fn plotting_brute_force_flags_every_grid_record() {
    let problem = population_sweep();
    let settings = FitSettings::default()
        .with_mode(FitMode::BrutePlot)
        .with_threads(1)
        .with_loops(3);

    let outcome = Fitter::new(&problem, settings).unwrap().run().unwrap();

    assert!(outcome.log.stage(Stage::Grid).all(|record| record.plot));
    // the search runs once regardless of the loops
    assert_eq!(outcome.log.stage(Stage::Grid).count(), 4);
    assert_eq!(outcome.log.stage(Stage::Local).count(), 1);
    assert!(outcome.log.stage(Stage::Local).all(|record| !record.plot));
}

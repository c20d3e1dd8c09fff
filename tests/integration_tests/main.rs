use approx::assert_relative_eq;
use bmns::prelude::*;
use shared_test_code::*;

mod brute_force;
mod error_estimation;

#[test]
fn local_fit_recovers_the_exchange_rate_from_twice_its_value() {
    let truth = two_state_truth();
    let problem = FitProblem::new(
        vec![two_state_dataset()],
        vec![exchange_rate_parameters(2. * truth.kex_ab)],
        FitEquation::BlochMcConnell,
    )
    .expect("Building a valid problem must not fail");
    assert_eq!(problem.degrees_of_freedom(), 4);

    let outcome = Fitter::new(&problem, FitSettings::default())
        .unwrap()
        .run()
        .unwrap();

    let local: Vec<_> = outcome.log.stage(Stage::Local).collect();
    assert_eq!(local.len(), 1);
    let record = local[0];
    assert_relative_eq!(record.parameters.kex_ab, truth.kex_ab, max_relative = 1e-2);
    assert!(record.reduced_chi_square < 1.);
    // fixed parameters are reported as given
    assert_eq!(record.parameters.pb, truth.pb);
    assert_eq!(record.parameters.r2, truth.r2);

    let bundle = outcome.final_bundle().expect("a local fit leaves a bundle");
    assert_eq!(bundle.jacobian.shape(), (5, 1));
    assert!(bundle.statistics.is_some());
}

#[test]
fn global_fit_is_polished_to_the_exchange_rate() {
    let truth = two_state_truth();
    let problem = FitProblem::new(
        vec![two_state_dataset()],
        vec![exchange_rate_parameters(5000.)],
        FitEquation::BlochMcConnell,
    )
    .unwrap();
    let defaults = FitSettings::default();
    let settings = defaults.with_mode(FitMode::Global).with_seed(3).with_global(
        defaults
            .global
            .with_total_iterations(2)
            .with_max_function_evaluations(400),
    );

    let outcome = Fitter::new(&problem, settings).unwrap().run().unwrap();

    let global: Vec<_> = outcome.log.stage(Stage::Global).collect();
    assert_eq!(global.len(), 1);
    assert!(global[0].errors.is_none());
    assert!(global[0].evaluations <= 400);

    let polish: Vec<_> = outcome.log.stage(Stage::Polish).collect();
    assert_eq!(polish.len(), 1);
    assert_relative_eq!(polish[0].parameters.kex_ab, truth.kex_ab, max_relative = 1e-2);
    assert!(polish[0].reduced_chi_square <= global[0].reduced_chi_square + 1e-9);
}

#[test]
fn shared_exchange_rate_is_fitted_across_two_fields() {
    let truth = two_state_truth();
    let conditions = dispersion_conditions();
    let datasets = vec![
        simulated_dataset("600 MHz", LARMOR, &truth, &conditions, RATE_ERROR),
        simulated_dataset("400 MHz", 100.6, &truth, &conditions, RATE_ERROR),
    ];
    let parameters = |r2: f64| {
        ParameterSet::new()
            .with(ParameterSpec::fixed(ParameterName::Pb, truth.pb))
            .with(ParameterSpec::fixed(ParameterName::DwB, truth.dwb))
            .with(ParameterSpec::shared(ParameterName::KexAB, 1500., 10., 1e5))
            .with(ParameterSpec::fixed(ParameterName::R1, truth.r1))
            .with(ParameterSpec::free(ParameterName::R2, r2, 1., 60.))
    };
    let problem = FitProblem::new(
        datasets,
        vec![parameters(15.), parameters(17.)],
        FitEquation::BlochMcConnell,
    )
    .unwrap();
    // ten rates, one shared and two free parameters
    assert_eq!(problem.layout().len(), 3);
    assert_eq!(problem.degrees_of_freedom(), 7);

    let outcome = Fitter::new(&problem, FitSettings::default())
        .unwrap()
        .run()
        .unwrap();

    let local: Vec<_> = outcome.log.stage(Stage::Local).collect();
    assert_eq!(local.len(), 2);
    for record in local {
        assert_relative_eq!(record.parameters.kex_ab, truth.kex_ab, max_relative = 1e-2);
        assert_relative_eq!(record.parameters.r2, truth.r2, max_relative = 1e-2);
        // R2b fixed at zero follows R2
        assert_eq!(record.parameters.r2b, record.parameters.r2);
    }
}

#[test]
fn random_starts_stay_within_the_bounds() {
    let problem = FitProblem::new(
        vec![two_state_dataset()],
        vec![exchange_rate_parameters(2000.)],
        FitEquation::BlochMcConnell,
    )
    .unwrap();
    let settings = FitSettings::default()
        .with_random_start(true)
        .with_loops(4)
        .with_seed(17);

    let outcome = Fitter::new(&problem, settings).unwrap().run().unwrap();

    let local: Vec<_> = outcome.log.stage(Stage::Local).collect();
    assert_eq!(local.len(), 4);
    for (record, loop_index) in local.iter().zip(1..) {
        assert_eq!(record.loop_index, loop_index);
        assert!((10. ..=1e5).contains(&record.parameters.kex_ab));
        assert!(record.reduced_chi_square.is_finite());
    }
    for bundle in &outcome.bundles {
        assert!((10. ..=1e5).contains(&bundle.params[0]));
    }
}

#[test]
fn exported_rows_match_the_header() {
    let problem = FitProblem::new(
        vec![two_state_dataset()],
        vec![exchange_rate_parameters(1200.)],
        FitEquation::BlochMcConnell,
    )
    .unwrap();
    let outcome = Fitter::new(&problem, FitSettings::default())
        .unwrap()
        .run()
        .unwrap();
    let header = FitRecord::header();
    for record in outcome.log.sorted() {
        let values = record.values();
        assert_eq!(values.len(), header.len());
        assert!(values.iter().all(|value| value.is_finite()));
    }
}

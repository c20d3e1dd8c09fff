use approx::assert_relative_eq;
use bmns::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared_test_code::*;

const SIGMA: f64 = 0.3;
const ITERATIONS: usize = 300;

/// Without exchange R1rho is a weighted sum of R1 and R2, which keeps the
/// problem close to linear in the two free rates.
fn relaxation_only_dataset() -> Dataset {
    let truth = PhysicalParameters {
        r1: 2.5,
        r2: 16.,
        ..Default::default()
    };
    let conditions: Vec<_> = [0., 500., 1000., 1500., 2000.]
        .into_iter()
        .flat_map(|offset| [500., 1500.].map(|power| SpinlockCondition::new(offset, power)))
        .collect();
    simulated_dataset("no exchange", LARMOR, &truth, &conditions, SIGMA)
}

fn relaxation_problem(dataset: Dataset) -> FitProblem {
    let parameters = ParameterSet::new()
        .with(ParameterSpec::free(ParameterName::R1, 2.5, 0.01, 20.))
        .with(ParameterSpec::free(ParameterName::R2, 16., 1., 60.));
    FitProblem::new(vec![dataset], vec![parameters], FitEquation::BlochMcConnell).unwrap()
}

fn relaxation_only() -> FitProblem {
    relaxation_problem(relaxation_only_dataset())
}

/// The refits scatter the noise-free rates by their known uncertainty, so
/// their spread estimates the covariance `(JᵀJ)⁻¹` of the weighted Jacobian
/// without the scaling by the fit quality.
#[test]
fn monte_carlo_errors_match_the_known_sigma_covariance() {
    let problem = relaxation_only();
    let settings = FitSettings::default()
        .with_monte_carlo(ITERATIONS)
        .with_seed(2024);

    let outcome = Fitter::new(&problem, settings).unwrap().run().unwrap();

    assert_eq!(outcome.log.stage(Stage::MonteCarlo).count(), ITERATIONS);
    let local: Vec<_> = outcome.log.stage(Stage::Local).collect();
    assert_eq!(local.len(), 1);
    let monte_carlo = local[0].errors.expect("Monte-Carlo errors are recorded");

    let statistics = outcome
        .final_bundle()
        .and_then(|bundle| bundle.statistics.as_ref())
        .expect("the local fit has statistics");
    let analytic = problem
        .layout()
        .unpack_errors(&statistics.unscaled_standard_errors(), 0);

    assert!(monte_carlo.r1 > 0. && monte_carlo.r2 > 0.);
    assert_relative_eq!(monte_carlo.r1, analytic.r1, max_relative = 0.2);
    assert_relative_eq!(monte_carlo.r2, analytic.r2, max_relative = 0.2);
}

#[test]
fn analytic_errors_are_scaled_by_the_fit_quality() {
    let problem = relaxation_only();
    let outcome = Fitter::new(&problem, FitSettings::default())
        .unwrap()
        .run()
        .unwrap();

    let statistics = outcome
        .final_bundle()
        .and_then(|bundle| bundle.statistics.as_ref())
        .unwrap();
    assert_eq!(statistics.degrees_of_freedom(), 8);
    // noise-free data fits perfectly, so the scaled errors vanish
    let record = outcome.log.stage(Stage::Local).next().unwrap();
    let errors = record.errors.unwrap();
    assert!(errors.r1 < 1e-3);
    assert!(errors.r2 < 1e-3);
    assert!(statistics.unscaled_standard_errors().iter().all(|e| *e > 0.));
}

#[test]
fn reported_errors_of_noisy_data_are_the_scaled_covariance() {
    let noisy = relaxation_only_dataset().corrupted(&mut StdRng::seed_from_u64(31));
    let problem = relaxation_problem(noisy);
    let outcome = Fitter::new(&problem, FitSettings::default())
        .unwrap()
        .run()
        .unwrap();

    let statistics = outcome
        .final_bundle()
        .and_then(|bundle| bundle.statistics.as_ref())
        .unwrap();
    let record = outcome.log.stage(Stage::Local).next().unwrap();
    let reported = record.errors.unwrap();
    let unscaled = problem
        .layout()
        .unpack_errors(&statistics.unscaled_standard_errors(), 0);

    // observations scattered by SIGMA fit with a reduced chi-square near one
    assert!(statistics.sigma() > 0.);
    assert!(record.reduced_chi_square > 0.05 && record.reduced_chi_square < 5.);
    assert_relative_eq!(reported.r1, statistics.sigma() * unscaled.r1, max_relative = 1e-9);
    assert_relative_eq!(reported.r2, statistics.sigma() * unscaled.r2, max_relative = 1e-9);
    assert!(reported.r1 > 0. && reported.r2 > 0.);
}

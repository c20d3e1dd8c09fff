use super::*;
use crate::data::{DecayCurve, RelaxationPoint};
use crate::parameters::{ParameterName, ParameterSet, ParameterSpec};
use approx::assert_relative_eq;

const LARMOR: f64 = 150.8;

fn parameter_set(pb_upper: f64) -> ParameterSet {
    ParameterSet::new()
        .with(ParameterSpec::free(ParameterName::Pb, 0.05, 1e-6, pb_upper))
        .with(ParameterSpec::fixed(ParameterName::DwB, 3.))
        .with(ParameterSpec::free(ParameterName::KexAB, 1000., 1., 1e5))
        .with(ParameterSpec::fixed(ParameterName::R1, 2.5))
        .with(ParameterSpec::fixed(ParameterName::R2, 16.))
}

fn observed_at(x: &DVector<f64>, layout: &ParameterLayout, errors: &[f64]) -> Dataset {
    let template = Dataset::relaxation(
        "synthetic",
        LARMOR,
        errors
            .iter()
            .enumerate()
            .map(|(i, &error)| RelaxationPoint::new(-200. * i as f64, 300. + 200. * i as f64, 20., error))
            .collect(),
    );
    let objective = GlobalObjective::new(
        layout,
        std::slice::from_ref(&template),
        BlochMcConnell::new(),
        FitEquation::BlochMcConnell,
    );
    let parameters = layout.pack(x, 0);
    let Observations::Relaxation(points) = template.observations() else {
        unreachable!()
    };
    let points = points
        .iter()
        .map(|point| RelaxationPoint {
            r1rho: objective.predict_rate(&parameters, &template, &point.condition),
            ..*point
        })
        .collect();
    Dataset::relaxation("synthetic", LARMOR, points)
        .with_delays(crate::data::RelaxationDelays::Linear { max: 0.05, count: 51 })
}

#[test]
fn chi_square_and_residuals_vanish_at_the_truth() {
    let layout = ParameterLayout::build(&[parameter_set(0.5)]).unwrap();
    let truth = layout.initial().clone();
    let datasets = [observed_at(&truth, &layout, &[0.3, 0.3, 0.3, 0.3])];
    let objective = GlobalObjective::new(&layout, &datasets, BlochMcConnell::new(), FitEquation::BlochMcConnell);
    assert!(objective.chi_square(&truth) < 1e-3);
    assert!(objective.residuals(&truth).amax() < 1e-2);
}

#[test]
fn weighted_residuals_are_signed_and_scaled_by_the_errors() {
    let layout = ParameterLayout::build(&[parameter_set(0.5)]).unwrap();
    let truth = layout.initial().clone();
    let datasets = [observed_at(&truth, &layout, &[0.5, 0.25, 0.5, 0.5])];
    let objective = GlobalObjective::new(&layout, &datasets, BlochMcConnell::new(), FitEquation::BlochMcConnell);

    let mut more_exchange = truth.clone();
    more_exchange[0] = 0.1;
    let residuals = objective.residuals(&more_exchange);
    let parameters = layout.pack(&more_exchange, 0);
    let Observations::Relaxation(points) = datasets[0].observations() else {
        unreachable!()
    };
    let mut chi_square = 0.;
    for (residual, point) in residuals.iter().zip(points.iter()) {
        let predicted = objective.predict_rate(&parameters, &datasets[0], &point.condition);
        assert!(*residual > 0., "doubling pB must raise R1rho");
        assert_relative_eq!(*residual, (predicted - point.r1rho) / point.error, max_relative = 1e-10);
        chi_square += residual * residual;
    }
    assert_relative_eq!(objective.chi_square(&more_exchange), chi_square, max_relative = 1e-10);
}

#[test]
fn unweighted_chi_square_is_scaled_by_the_observations() {
    let layout = ParameterLayout::build(&[parameter_set(0.5)]).unwrap();
    let truth = layout.initial().clone();
    let datasets = [observed_at(&truth, &layout, &[0., 0., 0.])];
    let objective = GlobalObjective::new(&layout, &datasets, BlochMcConnell::new(), FitEquation::BlochMcConnell);

    let mut off = truth.clone();
    off[1] = 2000.;
    let residuals = objective.residuals(&off);
    let Observations::Relaxation(points) = datasets[0].observations() else {
        unreachable!()
    };
    let expected: f64 = residuals
        .iter()
        .zip(points.iter())
        .map(|(r, point)| r * r / point.r1rho)
        .sum();
    assert_relative_eq!(objective.chi_square(&off), expected, max_relative = 1e-10);
}

#[test]
fn failed_simulations_are_penalized_not_propagated() {
    let two_state = ParameterLayout::build(&[parameter_set(0.9)]).unwrap();
    let datasets = [observed_at(two_state.initial(), &two_state, &[0.3, 0.3, 0.3])];
    let layout = ParameterLayout::build(&[parameter_set(0.9).with(ParameterSpec::fixed(ParameterName::Pc, 0.5))]).unwrap();
    let objective = GlobalObjective::new(&layout, &datasets, BlochMcConnell::new(), FitEquation::BlochMcConnell);

    let mut overpopulated = layout.initial().clone();
    overpopulated[0] = 0.8;
    assert_eq!(objective.chi_square(&overpopulated), INVALID_CHI_SQUARE);
    let residuals = objective.residuals(&overpopulated);
    assert_eq!(residuals.len(), 3);
    assert!(residuals.iter().all(|r| *r == 0.));
    assert!(objective.chi_square(layout.initial()).is_finite());
}

#[test]
fn sanitizing_bounds_non_finite_values() {
    assert_eq!(sanitize_chi_square(f64::NAN), INVALID_CHI_SQUARE);
    assert_eq!(sanitize_chi_square(f64::INFINITY), INVALID_CHI_SQUARE);
    assert_eq!(sanitize_chi_square(3.5), 3.5);
    let sanitized = sanitize_residuals(DVector::from_vec(vec![f64::NAN, f64::NEG_INFINITY, 1.5, f64::INFINITY]));
    assert_eq!(sanitized, DVector::from_vec(vec![0., -RESIDUAL_CEILING, 1.5, RESIDUAL_CEILING]));
}

#[test]
fn intensity_residuals_are_flattened_curve_by_curve() {
    let layout = ParameterLayout::build(&[parameter_set(0.5)]).unwrap();
    let truth = layout.initial().clone();
    let parameters = layout.pack(&truth, 0);
    let simulator = BlochMcConnell::new();
    let curve = |offset: f64, delays: Vec<f64>| {
        let intensities = simulator
            .intensities(
                &parameters,
                &SpinlockCondition::new(offset, 500.),
                LARMOR,
                &DVector::from_column_slice(&delays),
                crate::model::Alignment::Auto,
            )
            .unwrap();
        DecayCurve {
            condition: SpinlockCondition::new(offset, 500.),
            errors: vec![0.; delays.len()],
            intensities: intensities.iter().copied().collect(),
            delays,
        }
    };
    let mut second = curve(-400., vec![0., 0.02, 0.04]);
    let exact_last = second.intensities[2];
    second.intensities[2] = 0.;
    let datasets = [Dataset::intensity("decays", LARMOR, vec![curve(0., vec![0., 0.03]), second])];
    let objective = GlobalObjective::new(&layout, &datasets, simulator, FitEquation::BlochMcConnell);

    let residuals = objective.residuals(&truth);
    assert_eq!(residuals.len(), 5);
    assert!(residuals.rows(0, 4).amax() < 1e-12);
    assert_relative_eq!(residuals[4], exact_last, max_relative = 1e-12);
    assert_relative_eq!(objective.chi_square(&truth), exact_last * exact_last, max_relative = 1e-10);
}

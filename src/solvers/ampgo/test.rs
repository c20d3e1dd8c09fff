use super::*;
use approx::assert_relative_eq;
use assert_matches::assert_matches;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// tilted double well with a shallow minimum near `x = 1` and the global
/// minimum near `x = -1`
fn double_well(x: &DVector<f64>) -> f64 {
    (x[0] * x[0] - 1.).powi(2) + 0.3 * x[0]
}

/// global minimum of the double well from Newton's method on its derivative
fn double_well_minimum() -> (f64, f64) {
    let mut x: f64 = -1.;
    for _ in 0..50 {
        let derivative = 4. * x * (x * x - 1.) + 0.3;
        let curvature = 12. * x * x - 4.;
        x -= derivative / curvature;
    }
    (x, double_well(&DVector::from_element(1, x)))
}

fn interval(lower: f64, upper: f64) -> Bounds {
    Bounds::new(DVector::from_element(1, lower), DVector::from_element(1, upper)).unwrap()
}

#[test]
fn tunnelling_escapes_the_shallow_minimum() {
    let (x_min, f_min) = double_well_minimum();
    let settings = AmpgoSettings::default()
        .with_eps(0.02, 1.5)
        .with_total_iterations(20)
        .with_tunnelling_iterations(5)
        .with_max_function_evaluations(20_000)
        .with_known_minimum(f_min);
    let report = Ampgo::new(settings)
        .unwrap()
        .minimize(
            &double_well,
            &DVector::from_element(1, 1.),
            &interval(-2., 2.),
            &mut StdRng::seed_from_u64(7),
        )
        .unwrap();
    assert_eq!(report.termination, AmpgoTermination::Converged);
    assert!(report.best_f < f_min + settings.glbtol);
    assert_relative_eq!(report.best_x[0], x_min, epsilon = 1e-2);
    assert!(report.tunnelling.successful >= 1);
    assert!(report.tunnelling.successful <= report.tunnelling.attempted);
}

#[test]
fn evaluation_budget_is_respected() {
    let settings = AmpgoSettings::default().with_max_function_evaluations(150);
    let report = Ampgo::new(settings)
        .unwrap()
        .minimize(
            &double_well,
            &DVector::from_element(1, 1.),
            &interval(-2., 2.),
            &mut StdRng::seed_from_u64(3),
        )
        .unwrap();
    assert!(report.evaluations <= 150);
    assert!(interval(-2., 2.).contains(&report.best_x));
    assert_eq!(report.termination.message(), report.termination.to_string());
}

#[test]
fn global_iteration_limit_ends_the_search() {
    let settings = AmpgoSettings::default()
        .with_total_iterations(1)
        .with_tunnelling_iterations(1)
        .with_max_function_evaluations(100_000);
    let report = Ampgo::new(settings)
        .unwrap()
        .minimize(
            &double_well,
            &DVector::from_element(1, 1.),
            &interval(-2., 2.),
            &mut StdRng::seed_from_u64(3),
        )
        .unwrap();
    assert_eq!(report.termination, AmpgoTermination::GlobalIterations);
    assert_eq!(report.tunnelling.attempted, 1);
    assert_eq!(
        report.termination.message(),
        "Maximum number of global iterations exceeded"
    );
}

#[test]
fn tunnel_value_decreases_away_from_tabu_points() {
    let mut tabu = TabuList::new(3, TabuStrategy::Farthest);
    tabu.insert(DVector::from_vec(vec![0., 0.]));
    let near = DVector::from_vec(vec![0.5, 0.]);
    let far = DVector::from_vec(vec![2., 1.]);
    assert!(tunnel_value(1., 0., &tabu, &near) > tunnel_value(1., 0., &tabu, &far));
}

#[test]
fn inverse_tunnel_recovers_values_above_the_aspiration() {
    let mut tabu = TabuList::new(3, TabuStrategy::Oldest);
    tabu.insert(DVector::from_vec(vec![1., 1.]));
    tabu.insert(DVector::from_vec(vec![-1., 2.]));
    let x = DVector::from_vec(vec![0.3, -0.7]);
    let tunnel = tunnel_value(4.25, 3.5, &tabu, &x);
    assert_relative_eq!(inverse_tunnel(tunnel, 3.5, &tabu, &x), 4.25, max_relative = 1e-12);
}

#[test]
fn empty_tabu_list_does_not_repel() {
    let tabu = TabuList::new(2, TabuStrategy::Oldest);
    assert_eq!(tabu.repulsion(&DVector::from_vec(vec![3., 4.])), 1.);
}

#[test]
fn full_tabu_list_evicts_by_strategy() {
    let points = [0., 10., 1.].map(|x| DVector::from_element(1, x));

    let mut oldest = TabuList::new(3, TabuStrategy::Oldest);
    points.iter().for_each(|p| oldest.insert(p.clone()));
    oldest.insert(DVector::from_element(1, 2.));
    let kept: Vec<f64> = oldest.points().map(|p| p[0]).collect();
    assert_eq!(kept, vec![10., 1., 2.]);

    let mut farthest = TabuList::new(3, TabuStrategy::Farthest);
    points.iter().for_each(|p| farthest.insert(p.clone()));
    farthest.insert(DVector::from_element(1, 2.));
    let kept: Vec<f64> = farthest.points().map(|p| p[0]).collect();
    assert_eq!(kept, vec![0., 1., 2.]);
    assert_eq!(farthest.len(), 3);
}

#[test]
fn invalid_settings_are_rejected() {
    assert_matches!(
        Ampgo::new(AmpgoSettings::default().with_tabu_list(0, TabuStrategy::Oldest)),
        Err(AmpgoError::InvalidSetting(_))
    );
    assert_matches!(
        Ampgo::new(AmpgoSettings::default().with_eps(0.02, 0.)),
        Err(AmpgoError::InvalidSetting(_))
    );
    let ampgo = Ampgo::new(AmpgoSettings::default()).unwrap();
    assert_matches!(
        ampgo.minimize(
            &double_well,
            &DVector::from_vec(vec![1., 2.]),
            &interval(-2., 2.),
            &mut StdRng::seed_from_u64(0)
        ),
        Err(AmpgoError::Bounds(BoundsError::DimensionMismatch { .. }))
    );
}

fn square(lower: f64, upper: f64) -> Bounds {
    Bounds::new(DVector::from_element(2, lower), DVector::from_element(2, upper)).unwrap()
}

#[test]
fn perturbation_moves_a_minimum_at_the_origin() {
    let origin = DVector::zeros(2);
    let mut tabu = TabuList::new(5, TabuStrategy::Farthest);
    tabu.insert(origin.clone());
    let bounds = square(-1., 1.);
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..20 {
        let start = perturbed_start(&origin, &tabu, &bounds, 0.1, &mut rng);
        assert!(start.norm() > 0.);
        assert!(start.amax() < 0.1);
        assert!(tabu.repulsion(&start) > 0.);
    }
}

#[test]
fn perturbation_avoids_a_tabu_point_on_a_bound_corner() {
    let corner = DVector::zeros(2);
    let mut tabu = TabuList::new(5, TabuStrategy::Farthest);
    tabu.insert(corner.clone());
    let bounds = square(0., 1.);
    for seed in 0..50 {
        let start = perturbed_start(&corner, &tabu, &bounds, 0.1, &mut StdRng::seed_from_u64(seed));
        assert!(bounds.contains(&start));
        assert!(tabu.repulsion(&start) > 0., "seed {seed} started on the tabu point");
    }
}

#[test]
fn tunnelling_runs_from_a_minimum_at_the_origin() {
    let bowl = |x: &DVector<f64>| x.norm_squared();
    let bounds = square(-1., 1.);
    let settings = AmpgoSettings::default()
        .with_total_iterations(3)
        .with_tunnelling_iterations(2)
        .with_max_function_evaluations(2000);
    let report = Ampgo::new(settings)
        .unwrap()
        .minimize(&bowl, &DVector::zeros(2), &bounds, &mut StdRng::seed_from_u64(5))
        .unwrap();
    assert!(report.tunnelling.attempted > 0);
    assert!(report.best_f.is_finite());
    assert!(report.best_f < 1e-8);
    assert!(bounds.contains(&report.best_x));
    assert!(report.evaluations <= 2000);
}

#[test]
fn random_bounds_and_starts_keep_the_result_feasible() {
    let tilted_well = |x: &DVector<f64>| (x[0] * x[0] - 1.).powi(2) + 0.3 * x[0] + x[1] * x[1];
    let mut rng = StdRng::seed_from_u64(99);
    for draw in 0..20 {
        let lower = DVector::from_fn(2, |_, _| rng.gen_range(-3.0..0.));
        let upper = DVector::from_fn(2, |i, _| lower[i] + rng.gen_range(0.5..4.));
        // starts reach up to two units beyond the box
        let start = DVector::from_fn(2, |i, _| rng.gen_range(lower[i] - 2.0..upper[i] + 2.));
        let budget = rng.gen_range(50..300);
        let bounds = Bounds::new(lower, upper).unwrap();
        let settings = AmpgoSettings::default()
            .with_total_iterations(5)
            .with_max_function_evaluations(budget);
        let report = Ampgo::new(settings)
            .unwrap()
            .minimize(&tilted_well, &start, &bounds, &mut rng)
            .unwrap();
        assert!(bounds.contains(&report.best_x), "draw {draw}: {} outside bounds", report.best_x);
        assert!(report.evaluations <= budget, "draw {draw}: {} evaluations", report.evaluations);
        assert!(report.best_f.is_finite());
    }
}

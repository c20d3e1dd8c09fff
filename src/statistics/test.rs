use super::*;
use approx::assert_relative_eq;
use assert_matches::assert_matches;
use nalgebra::{dmatrix, dvector};

/// jacobian of the residuals of a straight line `a + b*x` at `x = 0,...,4`
fn straight_line_jacobian() -> DMatrix<f64> {
    dmatrix![
        1., 0.;
        1., 1.;
        1., 2.;
        1., 3.;
        1., 4.
    ]
}

#[test]
fn covariance_of_a_straight_line_fit_matches_the_closed_form() {
    let residuals = dvector![0.1, -0.2, 0.1, 0., 0.];
    let statistics = FitStatistics::try_calculate(&straight_line_jacobian(), &residuals, 3).unwrap();

    let unscaled = dmatrix![0.6, -0.2; -0.2, 0.1];
    assert_relative_eq!(statistics.unscaled_covariance_matrix(), &unscaled, epsilon = 1e-12);
    assert_relative_eq!(statistics.chi_square(), 0.06, epsilon = 1e-12);
    assert_relative_eq!(statistics.reduced_chi_square(), 0.02, epsilon = 1e-12);
    assert_relative_eq!(statistics.sigma(), 0.02f64.sqrt(), epsilon = 1e-12);
    assert_relative_eq!(statistics.covariance_matrix(), unscaled * 0.02, epsilon = 1e-12);
    assert_relative_eq!(
        statistics.standard_errors(),
        dvector![(0.6f64 * 0.02).sqrt(), (0.1f64 * 0.02).sqrt()],
        epsilon = 1e-12
    );
    assert_relative_eq!(
        statistics.unscaled_standard_errors(),
        dvector![0.6f64.sqrt(), 0.1f64.sqrt()],
        epsilon = 1e-12
    );
    assert_eq!(statistics.degrees_of_freedom(), 3);
    assert_eq!(statistics.weighted_residuals(), &residuals);
}

#[test]
fn correlation_matrix_is_calculated_correctly_from_a_covariance_matrix() {
    let cov = DMatrix::from_row_slice(2, 2, &[2., 3., 4., 5.]);
    let corr = DMatrix::from_row_slice(2, 2, &[1.0, 3. / f64::sqrt(10.), 4. / f64::sqrt(10.), 1.0]);
    assert_relative_eq!(corr, calc_correlation_matrix(&cov));
}

#[test]
fn correlation_of_a_parameter_without_variance_is_zero() {
    let cov = dmatrix![0., 0.; 0., 4.];
    assert_relative_eq!(calc_correlation_matrix(&cov), dmatrix![0., 0.; 0., 1.]);
}

#[test]
fn information_criteria_penalize_parameters() {
    let residuals = dvector![0.1, -0.2, 0.1, 0., 0.];
    let statistics = FitStatistics::try_calculate(&straight_line_jacobian(), &residuals, 3).unwrap();
    let log_likelihood_term = 5. * (0.06f64 / 5.).ln();
    assert_relative_eq!(statistics.aic(), log_likelihood_term + 4., epsilon = 1e-12);
    assert_relative_eq!(statistics.bic(), log_likelihood_term + 2. * 5f64.ln(), epsilon = 1e-12);
}

#[test]
fn confidence_intervals_use_student_t_quantiles() {
    // 12 residuals and 2 parameters leave 10 degrees of freedom
    let jacobian = DMatrix::from_fn(12, 2, |i, j| if j == 0 { 1. } else { i as f64 });
    let residuals = DVector::from_fn(12, |i, _| if i % 2 == 0 { 0.5 } else { -0.5 });
    let statistics = FitStatistics::try_calculate(&jacobian, &residuals, 10).unwrap();
    let half_widths = statistics.confidence_half_widths(0.95).unwrap();
    assert_relative_eq!(
        half_widths,
        statistics.standard_errors() * 2.228139,
        max_relative = 1e-4
    );
    assert!(statistics.confidence_half_widths(1.).is_none());
    assert!(statistics.confidence_half_widths(0.).is_none());
}

#[test]
fn singular_normal_matrix_falls_back_to_the_pseudo_inverse() {
    let jacobian = dmatrix![1., 1.; 1., 1.; 1., 1.];
    let statistics = FitStatistics::try_calculate(&jacobian, &dvector![0.1, 0.1, -0.1], 1).unwrap();
    assert_relative_eq!(
        statistics.unscaled_covariance_matrix(),
        &DMatrix::from_element(2, 2, 1. / 12.),
        epsilon = 1e-10
    );
}

#[test]
fn invalid_inputs_are_rejected() {
    assert_matches!(
        FitStatistics::try_calculate(&straight_line_jacobian(), &dvector![0., 0., 0., 0., 0.], 0),
        Err(StatisticsError::Underdetermined)
    );
    assert_matches!(
        FitStatistics::try_calculate(&straight_line_jacobian(), &dvector![0., 0.], 3),
        Err(StatisticsError::DimensionMismatch {
            jacobian_rows: 5,
            residuals: 2
        })
    );
}

#[test]
fn monte_carlo_errors_are_sample_standard_deviations() {
    let samples = vec![dvector![1., 10.], dvector![2., 10.], dvector![3., 10.]];
    assert_relative_eq!(monte_carlo_standard_errors(&samples, 2), dvector![1., 0.], epsilon = 1e-12);
    assert_eq!(monte_carlo_standard_errors(&samples[..1], 2), dvector![0., 0.]);
    assert_eq!(monte_carlo_standard_errors(&[], 3), DVector::zeros(3));
}

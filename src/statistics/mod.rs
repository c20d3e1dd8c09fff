//! Error estimates and goodness of fit measures for converged fits.
//!
//! The analytic errors follow from the linearization of the residuals around
//! the best fit: with the Jacobian `$J$` of the residuals and the residual
//! variance `$\sigma^2 = \chi^2/\nu$`, the covariance of the estimates is
//! `$C = \sigma^2 (J^T J)^{-1}$`. Monte-Carlo errors are the sample standard
//! deviations of refits against corrupted data.
use nalgebra::{DMatrix, DVector};
use thiserror::Error as ThisError;

#[cfg(test)]
mod test;

/// singular values below this are treated as zero by the pseudo-inverse fallback
const PSEUDO_INVERSE_EPSILON: f64 = 1e-12;

/// Information about an error that occurred during calculation
/// of the fit statistics.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum StatisticsError {
    /// Fit is underdetermined
    #[error("fit has no degrees of freedom")]
    Underdetermined,
    /// Jacobian and residuals do not belong together
    #[error("jacobian with {jacobian_rows} rows does not match {residuals} residuals")]
    DimensionMismatch {
        /// rows of the jacobian
        jacobian_rows: usize,
        /// number of residuals
        residuals: usize,
    },
    /// neither the inverse nor the pseudo-inverse of `$J^T J$` exists
    #[error("normal matrix could not be inverted")]
    Singular,
}

/// this structure contains some additional statistical information
/// about the fit, such as errors on the parameters and other useful
/// information to assess the quality of the fit.
#[derive(Debug, Clone)]
pub struct FitStatistics {
    /// `$(J^T J)^{-1}$`, the covariance matrix if the data errors
    /// were exact.
    unscaled_covariance_matrix: DMatrix<f64>,
    /// the weighted residuals at the best fit
    weighted_residuals: DVector<f64>,
    degrees_of_freedom: usize,
    /// the _weighted residual mean square_ or _regression standard error_.
    sigma: f64,
}

impl FitStatistics {
    /// Calculate the fit statistics from the Jacobian of the weighted
    /// residuals and the residuals themselves, both taken at the best fit,
    /// and the number of degrees of freedom of the fit.
    #[allow(non_snake_case)]
    pub fn try_calculate(
        jacobian: &DMatrix<f64>,
        weighted_residuals: &DVector<f64>,
        degrees_of_freedom: usize,
    ) -> Result<Self, StatisticsError> {
        if jacobian.nrows() != weighted_residuals.len() {
            return Err(StatisticsError::DimensionMismatch {
                jacobian_rows: jacobian.nrows(),
                residuals: weighted_residuals.len(),
            });
        }
        if degrees_of_freedom == 0 {
            return Err(StatisticsError::Underdetermined);
        }
        let sigma = weighted_residuals.norm() / (degrees_of_freedom as f64).sqrt();

        let HTH = jacobian.transpose() * jacobian;
        let unscaled_covariance_matrix = match HTH.clone().try_inverse() {
            Some(inverse) if inverse.iter().all(|v| v.is_finite()) => inverse,
            _ => HTH
                .pseudo_inverse(PSEUDO_INVERSE_EPSILON)
                .map_err(|_| StatisticsError::Singular)?,
        };

        Ok(Self {
            unscaled_covariance_matrix,
            weighted_residuals: weighted_residuals.clone(),
            degrees_of_freedom,
            sigma,
        })
    }

    /// The covariance matrix of the parameter estimates, `$\sigma^2 (J^T J)^{-1}$`.
    /// # Correlation
    /// Note that we can calculate the estimated correlation matrix from
    /// the covariance matrix by dividing each element `$c_{ij}$` by
    /// `$\sqrt{c_{ii} c_{jj}}$`. See [FitStatistics::correlation_matrix].
    pub fn covariance_matrix(&self) -> DMatrix<f64> {
        &self.unscaled_covariance_matrix * (self.sigma * self.sigma)
    }

    /// The covariance matrix without the scaling by the residual variance.
    /// This is the appropriate covariance if the uncertainties of the data
    /// are known exactly.
    pub fn unscaled_covariance_matrix(&self) -> &DMatrix<f64> {
        &self.unscaled_covariance_matrix
    }

    /// the standard errors of the parameters, the square roots of the
    /// diagonal of the covariance matrix.
    pub fn standard_errors(&self) -> DVector<f64> {
        self.unscaled_standard_errors() * self.sigma
    }

    /// standard errors from the unscaled covariance matrix
    pub fn unscaled_standard_errors(&self) -> DVector<f64> {
        self.unscaled_covariance_matrix
            .diagonal()
            .map(|variance| variance.max(0.).sqrt())
    }

    /// the estimated correlation matrix of the parameters. Entries belonging
    /// to a parameter with zero variance are zero.
    pub fn correlation_matrix(&self) -> DMatrix<f64> {
        calc_correlation_matrix(&self.unscaled_covariance_matrix)
    }

    /// the weighted residuals at the best fit
    pub fn weighted_residuals(&self) -> &DVector<f64> {
        &self.weighted_residuals
    }

    /// the regression standard error `$\sigma = \sqrt{\chi^2/\nu}$`
    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// the number of degrees of freedom `$\nu$`
    pub fn degrees_of_freedom(&self) -> usize {
        self.degrees_of_freedom
    }

    /// the sum of the squared weighted residuals
    pub fn chi_square(&self) -> f64 {
        self.weighted_residuals.norm_squared()
    }

    /// `$\chi^2/\nu$`
    pub fn reduced_chi_square(&self) -> f64 {
        self.sigma * self.sigma
    }

    /// Akaike information criterion `$n \ln(\chi^2/n) + 2k$` for `$n$`
    /// residuals and `$k$` parameters.
    pub fn aic(&self) -> f64 {
        let (n, k) = self.sizes();
        n * (self.chi_square() / n).ln() + 2. * k
    }

    /// Bayesian information criterion `$n \ln(\chi^2/n) + k \ln n$`.
    pub fn bic(&self) -> f64 {
        let (n, k) = self.sizes();
        n * (self.chi_square() / n).ln() + k * n.ln()
    }

    /// Half widths of the confidence intervals of the parameters at the given
    /// probability (e.g. `0.95`), using the quantiles of Student's t
    /// distribution with the degrees of freedom of the fit. Returns `None`
    /// unless the probability lies in the open interval `(0, 1)`.
    pub fn confidence_half_widths(&self, probability: f64) -> Option<DVector<f64>> {
        if !(probability > 0. && probability < 1.) {
            return None;
        }
        let t = distrs::StudentsT::ppf(0.5 * (1. + probability), self.degrees_of_freedom as f64);
        Some(self.standard_errors() * t)
    }

    fn sizes(&self) -> (f64, f64) {
        (
            self.weighted_residuals.len() as f64,
            self.unscaled_covariance_matrix.ncols() as f64,
        )
    }
}

/// Per-parameter sample standard deviation (with `$n-1$` in the denominator)
/// of the parameter vectors from Monte-Carlo refits. Fewer than two samples
/// give zero errors for every parameter of length `parameters`.
pub fn monte_carlo_standard_errors(samples: &[DVector<f64>], parameters: usize) -> DVector<f64> {
    if samples.len() < 2 {
        return DVector::zeros(parameters);
    }
    let count = samples.len() as f64;
    let mean = samples
        .iter()
        .fold(DVector::<f64>::zeros(parameters), |acc, s| acc + s)
        / count;
    let squares = samples.iter().fold(DVector::<f64>::zeros(parameters), |acc, s| {
        let deviation = s - &mean;
        acc + deviation.component_mul(&deviation)
    });
    (squares / (count - 1.)).map(f64::sqrt)
}

/// divide each element `$c_{ij}$` of the covariance matrix by
/// `$\sqrt{c_{ii} c_{jj}}$`
fn calc_correlation_matrix(covariance_matrix: &DMatrix<f64>) -> DMatrix<f64> {
    let diagonal = covariance_matrix.diagonal();
    DMatrix::from_fn(covariance_matrix.nrows(), covariance_matrix.ncols(), |i, j| {
        let norm = (diagonal[i] * diagonal[j]).sqrt();
        if norm > 0. && norm.is_finite() {
            covariance_matrix[(i, j)] / norm
        } else {
            0.
        }
    })
}

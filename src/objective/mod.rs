//! The goodness-of-fit functions minimized by the solvers.
//!
//! A [GlobalObjective] compares the predictions for all datasets with their
//! observations. Predictions that cannot be simulated become NaN, which the
//! objective turns into a fixed penalty for the chi-square and into bounded
//! values for the residuals, so a failed simulation never aborts a fit.
use crate::data::{Dataset, Observations};
use crate::model::{laguerre_r1rho, BlochMcConnell, FitEquation, PhysicalParameters, SpinlockCondition};
use crate::parameters::ParameterLayout;
use nalgebra::DVector;

#[cfg(test)]
mod test;

/// The chi-square reported for parameters whose chi-square is not finite.
pub const INVALID_CHI_SQUARE: f64 = 1e4;

/// The magnitude that infinite residuals are replaced with.
pub const RESIDUAL_CEILING: f64 = 1e8;

/// An objective function mapping a parameter vector to a scalar to be
/// minimized.
pub trait ScalarObjective {
    /// the value at `x`
    fn value(&self, x: &DVector<f64>) -> f64;
}

impl<F> ScalarObjective for F
where
    F: Fn(&DVector<f64>) -> f64,
{
    fn value(&self, x: &DVector<f64>) -> f64 {
        self(x)
    }
}

/// An objective given as a vector of residuals whose sum of squares is
/// minimized.
pub trait LeastSquaresObjective {
    /// the residuals at `x`
    fn residuals(&self, x: &DVector<f64>) -> DVector<f64>;
}

/// Replace a non-finite chi-square by [INVALID_CHI_SQUARE].
pub fn sanitize_chi_square(chi_square: f64) -> f64 {
    if chi_square.is_finite() {
        chi_square
    } else {
        INVALID_CHI_SQUARE
    }
}

/// Replace NaN residuals by zero and infinite ones by [RESIDUAL_CEILING] of
/// the same sign.
pub fn sanitize_residuals(mut residuals: DVector<f64>) -> DVector<f64> {
    residuals.apply(|r| {
        if r.is_nan() {
            *r = 0.;
        } else if r.is_infinite() {
            *r = RESIDUAL_CEILING.copysign(*r);
        }
    });
    residuals
}

/// The objective over all datasets of a fit.
#[derive(Debug, Clone, Copy)]
pub struct GlobalObjective<'a> {
    layout: &'a ParameterLayout,
    datasets: &'a [Dataset],
    simulator: BlochMcConnell,
    equation: FitEquation,
}

impl<'a> GlobalObjective<'a> {
    /// Create the objective. The layout must have been built for the datasets.
    pub fn new(
        layout: &'a ParameterLayout,
        datasets: &'a [Dataset],
        simulator: BlochMcConnell,
        equation: FitEquation,
    ) -> Self {
        Self {
            layout,
            datasets,
            simulator,
            equation,
        }
    }

    /// The same objective evaluated against other datasets of identical
    /// shape, e.g. corrupted copies for Monte-Carlo error estimation.
    pub fn with_datasets<'b>(&self, datasets: &'b [Dataset]) -> GlobalObjective<'b>
    where
        'a: 'b,
    {
        GlobalObjective {
            layout: self.layout,
            datasets,
            simulator: self.simulator,
            equation: self.equation,
        }
    }

    /// the datasets the objective compares with
    pub fn datasets(&self) -> &'a [Dataset] {
        self.datasets
    }

    /// The predicted R1rho of a rate observation, NaN if it cannot be
    /// simulated.
    pub fn predict_rate(
        &self,
        parameters: &PhysicalParameters,
        dataset: &Dataset,
        condition: &SpinlockCondition,
    ) -> f64 {
        let prediction = match self.equation {
            FitEquation::BlochMcConnell => self.simulator.r1rho(
                parameters,
                condition,
                dataset.larmor(),
                dataset.delays(),
                dataset.alignment(),
            ),
            FitEquation::Laguerre => laguerre_r1rho(parameters, condition, dataset.larmor()),
        };
        prediction.unwrap_or(f64::NAN)
    }

    /// The predicted intensities at `delays`, NaN if they cannot be
    /// simulated.
    pub fn predict_intensities(
        &self,
        parameters: &PhysicalParameters,
        dataset: &Dataset,
        condition: &SpinlockCondition,
        delays: &[f64],
    ) -> DVector<f64> {
        let delays = DVector::from_column_slice(delays);
        self.simulator
            .intensities(parameters, condition, dataset.larmor(), &delays, dataset.alignment())
            .unwrap_or_else(|_| DVector::from_element(delays.len(), f64::NAN))
    }

    /// Chi-square of the predictions at `x`. Weighted datasets use their
    /// uncertainties; unweighted rates are scaled by the observed value and
    /// unweighted intensities by one. Non-finite results are replaced by
    /// [INVALID_CHI_SQUARE].
    pub fn chi_square(&self, x: &DVector<f64>) -> f64 {
        let total: f64 = self
            .datasets
            .iter()
            .enumerate()
            .map(|(index, dataset)| {
                let parameters = self.layout.pack(x, index);
                let weighted = dataset.is_weighted();
                match dataset.observations() {
                    Observations::Relaxation(points) => points
                        .iter()
                        .map(|point| {
                            let predicted = self.predict_rate(&parameters, dataset, &point.condition);
                            let difference = predicted - point.r1rho;
                            if weighted {
                                (difference / point.error).powi(2)
                            } else {
                                difference * difference / point.r1rho
                            }
                        })
                        .sum::<f64>(),
                    Observations::Intensity(curves) => curves
                        .iter()
                        .map(|curve| {
                            let predicted =
                                self.predict_intensities(&parameters, dataset, &curve.condition, &curve.delays);
                            predicted
                                .iter()
                                .zip(curve.intensities.iter().zip(curve.errors.iter()))
                                .map(|(p, (i, e))| {
                                    let sigma = if weighted { *e } else { 1. };
                                    ((p - i) / sigma).powi(2)
                                })
                                .sum::<f64>()
                        })
                        .sum::<f64>(),
                }
            })
            .sum();
        sanitize_chi_square(total)
    }

    /// Signed residuals at `x`: `(predicted - observed) / error` for weighted
    /// datasets and `predicted - observed` otherwise. Intensity residuals are
    /// ordered by dataset, then curve, then delay.
    pub fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
        let mut residuals = Vec::new();
        for (index, dataset) in self.datasets.iter().enumerate() {
            let parameters = self.layout.pack(x, index);
            let weighted = dataset.is_weighted();
            match dataset.observations() {
                Observations::Relaxation(points) => {
                    residuals.extend(points.iter().map(|point| {
                        let predicted = self.predict_rate(&parameters, dataset, &point.condition);
                        let sigma = if weighted { point.error } else { 1. };
                        (predicted - point.r1rho) / sigma
                    }));
                }
                Observations::Intensity(curves) => {
                    for curve in curves {
                        let predicted =
                            self.predict_intensities(&parameters, dataset, &curve.condition, &curve.delays);
                        residuals.extend(
                            predicted
                                .iter()
                                .zip(curve.intensities.iter().zip(curve.errors.iter()))
                                .map(|(p, (i, e))| {
                                    let sigma = if weighted { *e } else { 1. };
                                    (p - i) / sigma
                                }),
                        );
                    }
                }
            }
        }
        sanitize_residuals(DVector::from_vec(residuals))
    }
}

impl ScalarObjective for GlobalObjective<'_> {
    fn value(&self, x: &DVector<f64>) -> f64 {
        self.chi_square(x)
    }
}

impl LeastSquaresObjective for GlobalObjective<'_> {
    fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
        GlobalObjective::residuals(self, x)
    }
}

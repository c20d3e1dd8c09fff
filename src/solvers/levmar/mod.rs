use super::bounds::Bounds;
use crate::objective::LeastSquaresObjective;
use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, TerminationReason};
use nalgebra::storage::Owned;
use nalgebra::{DMatrix, DVector, Dyn, Matrix, Vector};
use serde::{Deserialize, Serialize};
use tracing::debug;


/// Step size of the finite difference Jacobians, relative to the magnitude
/// of the parameter.
const DIFFERENCE_STEP: f64 = 1.4901161193847656e-8;

/// Settings of the bounded Levenberg-Marquardt solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalSettings {
    /// maximum number of residual evaluations, not counting the evaluations
    /// for finite difference Jacobians
    pub max_evaluations: usize,
    /// relative tolerance on the change of the sum of squares
    pub ftol: f64,
    /// relative tolerance on the change of the parameters
    pub xtol: f64,
    /// tolerance on the orthogonality of residuals and Jacobian
    pub gtol: f64,
}

impl Default for LocalSettings {
    fn default() -> Self {
        Self {
            max_evaluations: 10_000,
            ftol: 1e-8,
            xtol: 1e-8,
            gtol: 1e-8,
        }
    }
}

impl LocalSettings {
    /// set the evaluation budget
    pub fn with_max_evaluations(self, max_evaluations: usize) -> Self {
        Self {
            max_evaluations,
            ..self
        }
    }

    /// set all three tolerances
    pub fn with_tolerance(self, tolerance: f64) -> Self {
        Self {
            ftol: tolerance,
            xtol: tolerance,
            gtol: tolerance,
            ..self
        }
    }
}

/// Why a local minimization stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalTermination {
    /// a convergence criterion was met
    Converged,
    /// the evaluation budget was used up
    BudgetExhausted,
    /// the solver gave up for another reason
    Stalled(String),
    /// the point was evaluated but not optimized
    SingleEvaluation,
}

/// The result of a local minimization or evaluation.
#[derive(Debug, Clone)]
pub struct LocalFit {
    /// the best parameters found, always within the bounds
    pub params: DVector<f64>,
    /// residuals at `params`
    pub residuals: DVector<f64>,
    /// Jacobian of the residuals at `params` with respect to the external
    /// parameters
    pub jacobian: DMatrix<f64>,
    /// number of residual evaluations
    pub evaluations: usize,
    /// the reason the solver stopped
    pub termination: LocalTermination,
}

impl LocalFit {
    /// the sum of squared residuals
    pub fn sum_of_squares(&self) -> f64 {
        self.residuals.norm_squared()
    }

    /// true if the solver converged
    pub fn was_successful(&self) -> bool {
        self.termination == LocalTermination::Converged
    }
}

/// A least squares problem with box constraints, expressed in the
/// unconstrained internal coordinates of [Bounds::to_internal] so that the
/// Levenberg-Marquardt solver can work on it.
///
/// The problem counts residual evaluations and refuses to evaluate beyond
/// its budget, which makes the solver stop. It remembers the external point
/// with the smallest finite sum of squares it has seen.
pub struct BoundedProblem<'a, O: ?Sized> {
    objective: &'a O,
    bounds: &'a Bounds,
    internal: DVector<f64>,
    external: DVector<f64>,
    residuals: Option<DVector<f64>>,
    budget: usize,
    evaluations: usize,
    best: Option<(DVector<f64>, DVector<f64>, f64)>,
}

impl<'a, O> BoundedProblem<'a, O>
where
    O: LeastSquaresObjective + ?Sized,
{
    /// Create the problem and evaluate it at `start`, which is clamped into
    /// the bounds.
    pub fn new(objective: &'a O, bounds: &'a Bounds, start: &DVector<f64>, budget: usize) -> Self {
        let external = bounds.clamp(start);
        let internal = bounds.to_internal(&external);
        let mut problem = Self {
            objective,
            bounds,
            internal: internal.clone(),
            external,
            residuals: None,
            budget: budget.max(1),
            evaluations: 0,
            best: None,
        };
        problem.set_params(&internal);
        problem
    }

    /// number of residual evaluations so far
    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    /// the current point in external coordinates
    pub fn external_params(&self) -> &DVector<f64> {
        &self.external
    }

    /// the best external point and its residuals, if any evaluation gave a
    /// finite sum of squares
    pub fn best(&self) -> Option<(&DVector<f64>, &DVector<f64>)> {
        self.best.as_ref().map(|(x, r, _)| (x, r))
    }
}

impl<'a, O> LeastSquaresProblem<f64, Dyn, Dyn> for BoundedProblem<'a, O>
where
    O: LeastSquaresObjective + ?Sized,
{
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, z: &Vector<f64, Dyn, Self::ParameterStorage>) {
        self.internal = z.clone();
        self.external = self.bounds.to_external(z);
        if self.evaluations >= self.budget {
            self.residuals = None;
            return;
        }
        self.evaluations += 1;
        let residuals = self.objective.residuals(&self.external);
        let cost = residuals.norm_squared();
        let improves = self.best.as_ref().map_or(true, |(_, _, best)| cost < *best);
        if cost.is_finite() && improves {
            self.best = Some((self.external.clone(), residuals.clone(), cost));
        }
        self.residuals = Some(residuals);
    }

    fn params(&self) -> Vector<f64, Dyn, Self::ParameterStorage> {
        self.internal.clone()
    }

    fn residuals(&self) -> Option<Vector<f64, Dyn, Self::ResidualStorage>> {
        self.residuals.clone()
    }

    fn jacobian(&self) -> Option<Matrix<f64, Dyn, Dyn, Self::JacobianStorage>> {
        let residuals = self.residuals.as_ref()?;
        let mut jacobian = DMatrix::zeros(residuals.len(), self.internal.len());
        for (k, mut column) in jacobian.column_iter_mut().enumerate() {
            let step = DIFFERENCE_STEP * self.internal[k].abs().max(1.);
            let mut shifted = self.internal.clone();
            shifted[k] += step;
            let displaced = self.objective.residuals(&self.bounds.to_external(&shifted));
            column.copy_from(&((displaced - residuals) / step));
        }
        Some(jacobian)
    }
}

/// A Levenberg-Marquardt solver for box-constrained least squares problems.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LocalSolver {
    settings: LocalSettings,
}

impl LocalSolver {
    /// create a solver with the given settings
    pub fn new(settings: LocalSettings) -> Self {
        Self { settings }
    }

    /// the settings of the solver
    pub fn settings(&self) -> &LocalSettings {
        &self.settings
    }

    /// Minimize the sum of squared residuals of `objective` within `bounds`,
    /// starting from `start`. The start is clamped into the bounds.
    pub fn minimize<O>(&self, objective: &O, start: &DVector<f64>, bounds: &Bounds) -> LocalFit
    where
        O: LeastSquaresObjective + ?Sized,
    {
        let budget = self.settings.max_evaluations.max(1);
        let patience = (budget / (start.len() + 1)).max(1);
        let solver = LevenbergMarquardt::new()
            .with_ftol(self.settings.ftol)
            .with_xtol(self.settings.xtol)
            .with_gtol(self.settings.gtol)
            .with_patience(patience);
        let problem = BoundedProblem::new(objective, bounds, start, budget);
        let (problem, report) = solver.minimize(problem);

        let evaluations = problem.evaluations();
        let termination = if report.termination.was_successful() {
            LocalTermination::Converged
        } else if evaluations >= budget || matches!(report.termination, TerminationReason::LostPatience) {
            LocalTermination::BudgetExhausted
        } else {
            LocalTermination::Stalled(format!("{:?}", report.termination))
        };
        debug!(
            evaluations,
            termination = ?report.termination,
            "local minimization finished"
        );

        let (params, residuals) = match problem.best() {
            Some((params, residuals)) => (params.clone(), residuals.clone()),
            None => {
                let params = problem.external_params().clone();
                let residuals = objective.residuals(&params);
                (params, residuals)
            }
        };
        let jacobian = external_jacobian(objective, &params, &residuals, bounds);
        LocalFit {
            params,
            residuals,
            jacobian,
            evaluations,
            termination,
        }
    }

    /// Evaluate residuals and Jacobian at `point` without moving it. This is
    /// a single residual evaluation.
    pub fn evaluate<O>(&self, objective: &O, point: &DVector<f64>, bounds: &Bounds) -> LocalFit
    where
        O: LeastSquaresObjective + ?Sized,
    {
        let params = bounds.clamp(point);
        let residuals = objective.residuals(&params);
        let jacobian = external_jacobian(objective, &params, &residuals, bounds);
        LocalFit {
            params,
            residuals,
            jacobian,
            evaluations: 1,
            termination: LocalTermination::SingleEvaluation,
        }
    }
}

/// Forward difference Jacobian with respect to the external parameters.
/// Steps go towards the interior where a parameter sits on its upper bound.
fn external_jacobian<O>(
    objective: &O,
    x: &DVector<f64>,
    residuals: &DVector<f64>,
    bounds: &Bounds,
) -> DMatrix<f64>
where
    O: LeastSquaresObjective + ?Sized,
{
    let mut jacobian = DMatrix::zeros(residuals.len(), x.len());
    for (k, mut column) in jacobian.column_iter_mut().enumerate() {
        let (lower, upper) = (bounds.lower()[k], bounds.upper()[k]);
        if lower == upper {
            continue;
        }
        let mut step = DIFFERENCE_STEP * x[k].abs().max(1.);
        if x[k] + step > upper {
            step = -step;
        }
        let mut shifted = x.clone();
        shifted[k] = (x[k] + step).clamp(lower, upper);
        let actual = shifted[k] - x[k];
        if actual == 0. {
            continue;
        }
        let displaced = objective.residuals(&shifted);
        column.copy_from(&((displaced - residuals) / actual));
    }
    jacobian
}

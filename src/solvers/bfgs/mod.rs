//! A quasi-Newton minimizer for box-constrained scalar objectives with a
//! hard limit on the number of objective evaluations.
//!
//! The minimizer works in the internal coordinates of [Bounds], uses central
//! difference gradients and a backtracking line search with the Armijo
//! condition. The inverse Hessian approximation is scaled after the first
//! step and only updated when the curvature information is reliable.
use super::bounds::Bounds;
use crate::objective::ScalarObjective;
use nalgebra::{DMatrix, DVector};


const ARMIJO: f64 = 1e-4;
const MAX_BACKTRACKS: usize = 40;

/// The outcome of a bounded BFGS minimization.
#[derive(Debug, Clone)]
pub struct BfgsOutcome {
    /// the best point found, within the bounds
    pub x: DVector<f64>,
    /// objective value at `x`
    pub value: f64,
    /// number of objective evaluations, including those for gradients
    pub evaluations: usize,
}

/// Bounded BFGS minimizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundedBfgs {
    max_evaluations: usize,
    tolerance: f64,
}

impl BoundedBfgs {
    /// A minimizer that evaluates the objective at most `max_evaluations`
    /// times and stops when the relative decrease of the objective falls
    /// below `tolerance`.
    pub fn new(max_evaluations: usize, tolerance: f64) -> Self {
        Self {
            max_evaluations: max_evaluations.max(1),
            tolerance,
        }
    }

    /// Minimize `objective` within `bounds` starting from `start`, which is
    /// clamped into the bounds.
    pub fn minimize<O>(&self, objective: &O, start: &DVector<f64>, bounds: &Bounds) -> BfgsOutcome
    where
        O: ScalarObjective + ?Sized,
    {
        let mut counter = CountingObjective {
            objective,
            bounds,
            budget: self.max_evaluations,
            evaluations: 0,
            best: None,
        };
        let z0 = bounds.to_internal(&bounds.clamp(start));
        self.iterate(&mut counter, z0);

        let evaluations = counter.evaluations;
        match counter.best {
            Some((x, value)) => BfgsOutcome {
                x,
                value,
                evaluations,
            },
            None => {
                let x = bounds.clamp(start);
                BfgsOutcome {
                    value: f64::INFINITY,
                    x,
                    evaluations,
                }
            }
        }
    }

    fn iterate<O>(&self, counter: &mut CountingObjective<'_, O>, mut z: DVector<f64>)
    where
        O: ScalarObjective + ?Sized,
    {
        let n = z.len();
        let Some(mut f) = counter.value(&z) else {
            return;
        };
        if !f.is_finite() {
            return;
        }
        let Some(mut g) = counter.gradient(&z) else {
            return;
        };
        let mut inverse_hessian = DMatrix::identity(n, n);
        let mut first_step = true;

        loop {
            if !g.iter().all(|v| v.is_finite()) || g.amax() == 0. {
                return;
            }
            let mut direction = -(&inverse_hessian * &g);
            let mut slope = g.dot(&direction);
            if slope >= 0. {
                inverse_hessian = DMatrix::identity(n, n);
                direction = -g.clone();
                slope = -g.norm_squared();
            }

            let mut step = 1.;
            let mut accepted = None;
            for _ in 0..MAX_BACKTRACKS {
                let candidate = &z + &direction * step;
                let Some(value) = counter.value(&candidate) else {
                    return;
                };
                if value.is_finite() && value <= f + ARMIJO * step * slope {
                    accepted = Some((candidate, value));
                    break;
                }
                step *= 0.5;
            }
            let Some((z_next, f_next)) = accepted else {
                return;
            };
            let Some(g_next) = counter.gradient(&z_next) else {
                return;
            };

            let s = &z_next - &z;
            let y = &g_next - &g;
            let sy = s.dot(&y);
            let ss = s.norm_squared();
            if first_step && sy > 0. {
                inverse_hessian = DMatrix::identity(n, n) * (sy / y.norm_squared());
                first_step = false;
            }
            if ss > 1e-16 && sy / ss >= 1e-6 * g.norm() {
                let rho = 1. / sy;
                let hy = &inverse_hessian * &y;
                let yhy = y.dot(&hy);
                inverse_hessian -= (&hy * s.transpose() + &s * hy.transpose()) * rho;
                inverse_hessian += (&s * s.transpose()) * (rho * rho * yhy + rho);
            }

            let decrease = f - f_next;
            z = z_next;
            g = g_next;
            let scale = f.abs().max(f_next.abs()).max(1.);
            f = f_next;
            if decrease <= self.tolerance * scale {
                return;
            }
        }
    }
}

/// Wraps the objective to count evaluations, enforce the budget and track
/// the best point seen.
struct CountingObjective<'a, O: ?Sized> {
    objective: &'a O,
    bounds: &'a Bounds,
    budget: usize,
    evaluations: usize,
    best: Option<(DVector<f64>, f64)>,
}

impl<O> CountingObjective<'_, O>
where
    O: ScalarObjective + ?Sized,
{
    fn value(&mut self, z: &DVector<f64>) -> Option<f64> {
        if self.evaluations >= self.budget {
            return None;
        }
        self.evaluations += 1;
        let x = self.bounds.to_external(z);
        let value = self.objective.value(&x);
        if value.is_finite() && self.best.as_ref().map_or(true, |(_, best)| value < *best) {
            self.best = Some((x, value));
        }
        Some(value)
    }

    fn gradient(&mut self, z: &DVector<f64>) -> Option<DVector<f64>> {
        let mut gradient = DVector::zeros(z.len());
        for k in 0..z.len() {
            let step = 6.0554544523933395e-6 * z[k].abs().max(1.);
            let mut forward = z.clone();
            forward[k] += step;
            let mut backward = z.clone();
            backward[k] -= step;
            let ahead = self.value(&forward)?;
            let behind = self.value(&backward)?;
            gradient[k] = (ahead - behind) / (2. * step);
        }
        Some(gradient)
    }
}

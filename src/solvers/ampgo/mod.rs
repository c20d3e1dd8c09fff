//! Adaptive Memory Programming for Global Optimization (AMPGO).
//!
//! AMPGO alternates between a local minimization and a series of tunnelling
//! phases. After each local minimum is found it is put on a tabu list. A
//! tunnelling phase then minimizes the tunnel function
//!
//! ```math
//! T(\vec{x}) = \frac{(f(\vec{x}) - a)^2}{\prod_{t} \lVert \vec{x} - \vec{t} \rVert}
//! ```
//!
//! where `$a$` is an aspiration level slightly below the best value found so
//! far and the product runs over the tabu points. The poles at the tabu
//! points push the search away from known minima, while the numerator pulls
//! it towards points that are at least as good as the aspiration. A
//! tunnelling phase succeeds when the value recovered from the tunnel
//! function does not exceed the best value by more than the global tolerance.
//!
//! # References
//! L. Lasdon, A. Duarte, F. Glover, M. Laguna and R. Martí, "Adaptive memory
//! programming for constrained global optimization", Computers & Operations
//! Research 37 (2010).
use super::bfgs::BoundedBfgs;
use super::bounds::{Bounds, BoundsError};
use crate::objective::ScalarObjective;
use nalgebra::DVector;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use thiserror::Error as ThisError;
use tracing::debug;

#[cfg(test)]
mod test;

/// Errors pertaining to the use of [Ampgo].
#[derive(Debug, Clone, ThisError, PartialEq)]
pub enum AmpgoError {
    /// a setting is outside its valid range
    #[error("Invalid AMPGO setting: {0}")]
    InvalidSetting(&'static str),
    /// the bounds do not fit the starting point
    #[error(transparent)]
    Bounds(#[from] BoundsError),
}

/// Which tabu point is evicted when the tabu list is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabuStrategy {
    /// the point that was added first
    Oldest,
    /// the point farthest from the point being added
    #[default]
    Farthest,
}

/// Settings of the AMPGO optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmpgoSettings {
    /// maximum number of objective evaluations; `max(100, 10 n)` if unset
    pub max_function_evaluations: Option<usize>,
    /// maximum number of global iterations
    pub total_iterations: usize,
    /// maximum number of tunnelling phases per global iteration
    pub tunnelling_iterations: usize,
    /// tolerance on the objective value
    pub glbtol: f64,
    /// relative depth of the aspiration level below the best value
    pub eps1: f64,
    /// relative size of the perturbation that starts a tunnelling phase
    pub eps2: f64,
    /// number of points kept on the tabu list
    pub tabu_capacity: usize,
    /// eviction strategy for a full tabu list
    pub tabu_strategy: TabuStrategy,
    /// the global minimum, if known
    pub known_minimum: Option<f64>,
}

impl Default for AmpgoSettings {
    fn default() -> Self {
        Self {
            max_function_evaluations: None,
            total_iterations: 20,
            tunnelling_iterations: 5,
            glbtol: 1e-5,
            eps1: 0.02,
            eps2: 0.1,
            tabu_capacity: 5,
            tabu_strategy: TabuStrategy::Farthest,
            known_minimum: None,
        }
    }
}

impl AmpgoSettings {
    /// set the evaluation budget
    pub fn with_max_function_evaluations(self, max_function_evaluations: usize) -> Self {
        Self {
            max_function_evaluations: Some(max_function_evaluations),
            ..self
        }
    }

    /// set the number of global iterations
    pub fn with_total_iterations(self, total_iterations: usize) -> Self {
        Self {
            total_iterations,
            ..self
        }
    }

    /// set the number of tunnelling phases per global iteration
    pub fn with_tunnelling_iterations(self, tunnelling_iterations: usize) -> Self {
        Self {
            tunnelling_iterations,
            ..self
        }
    }

    /// set the size and eviction strategy of the tabu list
    pub fn with_tabu_list(self, tabu_capacity: usize, tabu_strategy: TabuStrategy) -> Self {
        Self {
            tabu_capacity,
            tabu_strategy,
            ..self
        }
    }

    /// set the aspiration depth and the perturbation size
    pub fn with_eps(self, eps1: f64, eps2: f64) -> Self {
        Self { eps1, eps2, ..self }
    }

    /// set the global tolerance
    pub fn with_glbtol(self, glbtol: f64) -> Self {
        Self { glbtol, ..self }
    }

    /// stop as soon as the best value comes within the tolerance of `minimum`
    pub fn with_known_minimum(self, minimum: f64) -> Self {
        Self {
            known_minimum: Some(minimum),
            ..self
        }
    }

    /// check that the settings can be used
    pub fn validate(&self) -> Result<(), AmpgoError> {
        if self.tabu_capacity == 0 {
            return Err(AmpgoError::InvalidSetting("the tabu list needs room for at least one point"));
        }
        if self.total_iterations == 0 {
            return Err(AmpgoError::InvalidSetting("at least one global iteration is required"));
        }
        if !(self.glbtol >= 0. && self.glbtol.is_finite()) {
            return Err(AmpgoError::InvalidSetting("glbtol must be finite and non-negative"));
        }
        if !(self.eps1 >= 0. && self.eps1.is_finite() && self.eps2 > 0. && self.eps2.is_finite()) {
            return Err(AmpgoError::InvalidSetting("eps1 must be non-negative and eps2 positive"));
        }
        if self.max_function_evaluations == Some(0) {
            return Err(AmpgoError::InvalidSetting("the evaluation budget must be positive"));
        }
        Ok(())
    }
}

/// The list of recent minima that tunnelling is steered away from.
#[derive(Debug, Clone, PartialEq)]
pub struct TabuList {
    points: VecDeque<DVector<f64>>,
    capacity: usize,
    strategy: TabuStrategy,
}

impl TabuList {
    /// an empty list holding at most `capacity` points
    pub fn new(capacity: usize, strategy: TabuStrategy) -> Self {
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
            strategy,
        }
    }

    /// number of points on the list
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// true if the list holds no points
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// the points, oldest first
    pub fn points(&self) -> impl Iterator<Item = &DVector<f64>> {
        self.points.iter()
    }

    /// Add `point`, first evicting a point according to the strategy if the
    /// list is full.
    pub fn insert(&mut self, point: DVector<f64>) {
        if self.points.len() >= self.capacity {
            let evicted = match self.strategy {
                TabuStrategy::Oldest => Some(0),
                TabuStrategy::Farthest => self
                    .points
                    .iter()
                    .map(|tabu| (tabu - &point).norm())
                    .enumerate()
                    .fold(None, |farthest: Option<(usize, f64)>, (index, distance)| match farthest {
                        Some((_, max)) if max >= distance => farthest,
                        _ => Some((index, distance)),
                    })
                    .map(|(index, _)| index),
            };
            if let Some(index) = evicted {
                self.points.remove(index);
            }
        }
        self.points.push_back(point);
    }

    /// product of the distances from `x` to all tabu points, one if empty
    pub fn repulsion(&self, x: &DVector<f64>) -> f64 {
        self.points.iter().map(|tabu| (x - tabu).norm()).product()
    }
}

/// the tunnel function `$(f - a)^2 / \prod_t \lVert x - t \rVert$`
pub fn tunnel_value(value: f64, aspiration: f64, tabu: &TabuList, x: &DVector<f64>) -> f64 {
    (value - aspiration).powi(2) / tabu.repulsion(x)
}

/// recover an objective value from the value of the tunnel function at `x`
pub fn inverse_tunnel(tunnel: f64, aspiration: f64, tabu: &TabuList, x: &DVector<f64>) -> f64 {
    aspiration + (tunnel * tabu.repulsion(x)).sqrt()
}

struct Tunnel<'a, O: ?Sized> {
    objective: &'a O,
    aspiration: f64,
    tabu: &'a TabuList,
}

impl<O> ScalarObjective for Tunnel<'_, O>
where
    O: ScalarObjective + ?Sized,
{
    fn value(&self, x: &DVector<f64>) -> f64 {
        tunnel_value(self.objective.value(x), self.aspiration, self.tabu, x)
    }
}

/// Why AMPGO stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmpgoTermination {
    /// the known global minimum was reached
    Converged,
    /// the evaluation budget was used up
    EvaluationBudget,
    /// the maximum number of global iterations was reached
    GlobalIterations,
}

impl AmpgoTermination {
    /// a human readable description
    pub fn message(&self) -> &'static str {
        match self {
            AmpgoTermination::Converged => "Optimization terminated successfully",
            AmpgoTermination::EvaluationBudget => "Maximum number of function evaluations exceeded",
            AmpgoTermination::GlobalIterations => "Maximum number of global iterations exceeded",
        }
    }
}

impl fmt::Display for AmpgoTermination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Counts of tunnelling phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TunnellingStats {
    /// phases started
    pub attempted: usize,
    /// phases that improved on the best value
    pub successful: usize,
}

/// The outcome of an AMPGO run.
#[derive(Debug, Clone)]
pub struct AmpgoReport {
    /// the best point found
    pub best_x: DVector<f64>,
    /// the best value found
    pub best_f: f64,
    /// total number of objective evaluations
    pub evaluations: usize,
    /// why the optimizer stopped
    pub termination: AmpgoTermination,
    /// tunnelling statistics
    pub tunnelling: TunnellingStats,
}

/// The AMPGO global optimizer for box-constrained problems.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ampgo {
    settings: AmpgoSettings,
}

impl Ampgo {
    /// create an optimizer after validating the settings
    pub fn new(settings: AmpgoSettings) -> Result<Self, AmpgoError> {
        settings.validate()?;
        Ok(Self { settings })
    }

    /// the settings of the optimizer
    pub fn settings(&self) -> &AmpgoSettings {
        &self.settings
    }

    /// Minimize `objective` within `bounds` starting from `x0`. Perturbations
    /// for the tunnelling phases are drawn from `rng`.
    pub fn minimize<O, R>(
        &self,
        objective: &O,
        x0: &DVector<f64>,
        bounds: &Bounds,
        rng: &mut R,
    ) -> Result<AmpgoReport, AmpgoError>
    where
        O: ScalarObjective + ?Sized,
        R: Rng + ?Sized,
    {
        bounds.check_dimension(x0)?;
        let settings = &self.settings;
        let n = x0.len();
        let max_evaluations = settings
            .max_function_evaluations
            .unwrap_or_else(|| (10 * n).max(100));
        let local_tolerance = settings.glbtol.min(1e-8);
        let fmin = settings.known_minimum.unwrap_or(f64::NEG_INFINITY);
        let local_solver = |remaining: i64| BoundedBfgs::new(remaining.max(1) as usize, local_tolerance);

        let mut remaining = max_evaluations as i64;
        let mut state = SearchState {
            best_x: bounds.clamp(x0),
            best_f: f64::INFINITY,
            evaluations: 0,
            tunnelling: TunnellingStats::default(),
        };
        let mut tabu = TabuList::new(settings.tabu_capacity, settings.tabu_strategy);
        let mut start = bounds.clamp(x0);
        let mut global_iteration = 0;

        loop {
            debug!(phase = global_iteration + 1, "AMPGO minimization phase");
            let local = local_solver(remaining).minimize(objective, &start, bounds);
            remaining -= local.evaluations as i64;
            state.evaluations += local.evaluations;
            if local.value < state.best_f {
                state.best_f = local.value;
                state.best_x = local.x.clone();
            }
            debug!(value = local.value, best = state.best_f, "reached local minimum");

            if state.best_f < fmin + settings.glbtol {
                return Ok(state.finish(AmpgoTermination::Converged));
            }
            if remaining <= 0 {
                return Ok(state.finish(AmpgoTermination::EvaluationBudget));
            }

            let mut xf = local.x;
            tabu.insert(xf.clone());

            let mut attempt = 0;
            let mut improved = false;
            while attempt < settings.tunnelling_iterations && !improved {
                state.tunnelling.attempted += 1;
                let tunnel_start = perturbed_start(&xf, &tabu, bounds, settings.eps2, rng);
                let aspiration = state.best_f - settings.eps1 * (1. + state.best_f.abs());
                let tunnel = Tunnel {
                    objective,
                    aspiration,
                    tabu: &tabu,
                };
                let outcome = local_solver(remaining).minimize(&tunnel, &tunnel_start, bounds);
                remaining -= outcome.evaluations as i64;
                state.evaluations += outcome.evaluations;

                let value = inverse_tunnel(outcome.value, aspiration, &tabu, &outcome.x);
                xf = outcome.x;
                if value <= state.best_f + settings.glbtol {
                    debug!(value, previous = state.best_f, "successful tunnelling phase");
                    state.best_f = value;
                    state.best_x = xf.clone();
                    state.tunnelling.successful += 1;
                    improved = true;
                }
                if state.best_f < fmin + settings.glbtol {
                    return Ok(state.finish(AmpgoTermination::Converged));
                }
                attempt += 1;
                if remaining <= 0 {
                    return Ok(state.finish(AmpgoTermination::EvaluationBudget));
                }
                tabu.insert(xf.clone());
            }

            global_iteration += 1;
            start = xf;
            if global_iteration >= settings.total_iterations {
                return Ok(state.finish(AmpgoTermination::GlobalIterations));
            }
            if state.best_f < fmin + settings.glbtol {
                return Ok(state.finish(AmpgoTermination::Converged));
            }
        }
    }
}

/// Number of perturbations drawn before a tunnelling phase starts on a tabu
/// point anyway.
const PERTURBATION_DRAWS: usize = 16;

/// The start of a tunnelling phase: `xf` displaced by a random direction
/// scaled to `eps2 |xf|`, or to `eps2` if `xf` is (nearly) the origin. Draws
/// again while clamping puts the start on a tabu point, where the tunnel
/// function has a pole.
fn perturbed_start<R: Rng + ?Sized>(
    xf: &DVector<f64>,
    tabu: &TabuList,
    bounds: &Bounds,
    eps2: f64,
    rng: &mut R,
) -> DVector<f64> {
    let mut start = xf.clone();
    for _ in 0..PERTURBATION_DRAWS {
        let r: DVector<f64> = DVector::from_fn(xf.len(), |_, _| rng.gen_range(-1.0..1.0));
        let mut beta = eps2 * xf.norm() / r.norm();
        if !beta.is_finite() || beta.abs() < 1e-8 {
            beta = eps2;
        }
        start = bounds.clamp(&(xf + r * beta));
        if tabu.repulsion(&start) > 0. {
            break;
        }
    }
    start
}

struct SearchState {
    best_x: DVector<f64>,
    best_f: f64,
    evaluations: usize,
    tunnelling: TunnellingStats,
}

impl SearchState {
    fn finish(self, termination: AmpgoTermination) -> AmpgoReport {
        debug!(%termination, evaluations = self.evaluations, best = self.best_f, "AMPGO finished");
        AmpgoReport {
            best_x: self.best_x,
            best_f: self.best_f,
            evaluations: self.evaluations,
            termination,
            tunnelling: self.tunnelling,
        }
    }
}

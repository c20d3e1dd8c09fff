use crate::objective::GlobalObjective;
use crate::parameters::BruteGrid;
use crate::solvers::bounds::Bounds;
use crate::solvers::levmar::{LocalFit, LocalSolver};
use rayon::prelude::*;
use rayon::ThreadPool;
use tracing::debug;

/// The evaluation of one grid point.
#[derive(Debug, Clone)]
pub(super) struct GridScore {
    /// position of the point in the grid, starting at zero
    pub index: usize,
    /// residuals and Jacobian at the point
    pub fit: LocalFit,
    pub reduced_chi_square: f64,
}

/// Evaluate every grid point once on the worker pool. The scores are
/// returned in grid order, whatever order the workers finish in.
pub(super) fn score_grid(
    pool: &ThreadPool,
    grid: &BruteGrid,
    objective: &GlobalObjective<'_>,
    solver: &LocalSolver,
    bounds: &Bounds,
    degrees_of_freedom: usize,
) -> Vec<GridScore> {
    let total = grid.len();
    let mut scores: Vec<GridScore> = pool.install(|| {
        grid.points()
            .par_iter()
            .enumerate()
            .map(|(index, point)| {
                let fit = solver.evaluate(objective, point, bounds);
                let reduced_chi_square = objective.chi_square(&fit.params) / degrees_of_freedom as f64;
                debug!(point = index + 1, total, reduced_chi_square, "scored grid point");
                GridScore {
                    index,
                    fit,
                    reduced_chi_square,
                }
            })
            .collect()
    });
    scores.sort_by_key(|score| score.index);
    scores
}

/// The score with the lowest reduced chi-square. Of equal scores the one
/// with the lowest grid index wins.
pub(super) fn select_best(scores: &[GridScore]) -> Option<&GridScore> {
    scores.iter().fold(None::<&GridScore>, |best, score| match best {
        Some(best) if !(score.reduced_chi_square < best.reduced_chi_square) => Some(best),
        _ => Some(score),
    })
}

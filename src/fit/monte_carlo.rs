use crate::data::Dataset;
use crate::objective::GlobalObjective;
use crate::solvers::bounds::Bounds;
use crate::solvers::levmar::{LocalFit, LocalSolver};
use nalgebra::DVector;
use rand::Rng;
use tracing::info;

/// Refit `iterations` corrupted copies of the data, each starting from
/// `start`. Every copy draws fresh noise for every observation.
pub(super) fn corrupted_refits<R: Rng + ?Sized>(
    objective: &GlobalObjective<'_>,
    solver: &LocalSolver,
    start: &DVector<f64>,
    bounds: &Bounds,
    iterations: usize,
    rng: &mut R,
) -> Vec<LocalFit> {
    let mut refits = Vec::with_capacity(iterations);
    for iteration in 1..=iterations {
        info!("Monte-Carlo error estimation ({iteration} of {iterations})");
        let corrupted: Vec<Dataset> = objective
            .datasets()
            .iter()
            .map(|dataset| dataset.corrupted(&mut *rng))
            .collect();
        refits.push(solver.minimize(&objective.with_datasets(&corrupted), start, bounds));
    }
    refits
}

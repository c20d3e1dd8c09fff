use super::brute::{score_grid, select_best};
use super::monte_carlo::corrupted_refits;
use super::{FitBundle, FitError, FitLog, FitMode, FitProblem, FitRecord, FitSettings, Stage};
use crate::model::PhysicalParameters;
use crate::objective::GlobalObjective;
use crate::parameters::BruteGrid;
use crate::solvers::ampgo::Ampgo;
use crate::solvers::levmar::{LocalFit, LocalSolver};
use crate::statistics::{monte_carlo_standard_errors, FitStatistics};
use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info, warn};

/// Everything a fit run produced.
#[derive(Debug, Clone, Default)]
pub struct FitOutcome {
    /// one record per stage, loop and dataset
    pub log: FitLog,
    /// the residuals and Jacobians of the least squares fits
    pub bundles: Vec<FitBundle>,
}

impl FitOutcome {
    /// The bundle of the last least squares fit that produced the reported
    /// parameters, i.e. the last polish or local fit.
    pub fn final_bundle(&self) -> Option<&FitBundle> {
        self.bundles
            .iter()
            .rev()
            .find(|bundle| matches!(bundle.stage, Stage::Polish | Stage::Local))
    }
}

/// How the uncertainties of a fit were estimated.
enum ErrorEstimate {
    None,
    /// standard errors from the Jacobian
    Analytic(DVector<f64>),
    /// sample standard deviations of corrupted refits
    MonteCarlo(DVector<f64>),
}

/// The optimizers prepared for the chosen fit mode.
#[derive(Debug)]
enum Strategy {
    Local,
    Global(Ampgo),
    Brute { grid: BruteGrid, pool: ThreadPool },
}

/// Runs the fit stages of a [FitMode] on a [FitProblem].
///
/// # Example
/// ```no_run
/// # use bmns::prelude::*;
/// # fn example(problem: &FitProblem) -> Result<(), FitError> {
/// let settings = FitSettings::default()
///     .with_mode(FitMode::Local)
///     .with_monte_carlo(100)
///     .with_seed(42);
/// let outcome = Fitter::new(problem, settings)?.run()?;
/// for record in outcome.log.sorted() {
///     println!("{} {:?}", record.stage, record.values());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Fitter<'a> {
    problem: &'a FitProblem,
    objective: GlobalObjective<'a>,
    settings: FitSettings,
    solver: LocalSolver,
    strategy: Strategy,
}

impl<'a> Fitter<'a> {
    /// Prepare a fit. Fails if the data of the problem does not fit the
    /// mode, if the global optimizer settings are invalid, if the problem
    /// has no sweep for a brute-force mode or if the worker pool cannot be
    /// created.
    pub fn new(problem: &'a FitProblem, settings: FitSettings) -> Result<Self, FitError> {
        problem.check_mode(settings.mode)?;
        let strategy = match settings.mode {
            FitMode::Local | FitMode::LocalIntensity => Strategy::Local,
            FitMode::Global => Strategy::Global(Ampgo::new(settings.global)?),
            FitMode::Brute | FitMode::BrutePlot => {
                let grid = BruteGrid::generate(problem.layout())?;
                let pool = ThreadPoolBuilder::new()
                    .num_threads(settings.threads.unwrap_or(0))
                    .build()?;
                Strategy::Brute { grid, pool }
            }
        };
        Ok(Self {
            problem,
            objective: problem.objective(),
            settings,
            solver: LocalSolver::new(settings.local),
            strategy,
        })
    }

    /// the settings of the run
    pub fn settings(&self) -> &FitSettings {
        &self.settings
    }

    /// Run all loops of the fit. With a seed the run is reproducible.
    pub fn run(&self) -> Result<FitOutcome, FitError> {
        let mut rng = match self.settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut outcome = FitOutcome::default();
        let loops = self.settings.loops.max(1);

        match &self.strategy {
            Strategy::Local => {
                for loop_index in 1..=loops {
                    info!(
                        "{} fit start ({loop_index} of {loops})",
                        self.settings.mode
                    );
                    let start = self.start(&mut rng);
                    self.local_loop(loop_index, &start, &mut rng, &mut outcome);
                }
            }
            Strategy::Global(ampgo) => {
                if self.settings.monte_carlo.is_some() {
                    warn!("Monte-Carlo errors are not estimated for global fits");
                }
                for loop_index in 1..=loops {
                    info!("global fit start ({loop_index} of {loops})");
                    let start = self.start(&mut rng);
                    self.global_loop(ampgo, loop_index, &start, &mut rng, &mut outcome)?;
                }
            }
            Strategy::Brute { grid, pool } => {
                if loops > 1 {
                    warn!("the brute-force search runs once, ignoring {} loops", loops - 1);
                }
                if self.settings.monte_carlo.is_some() {
                    warn!("Monte-Carlo errors are not estimated for brute-force searches");
                }
                self.brute_force(grid, pool, &mut outcome);
            }
        }
        Ok(outcome)
    }

    fn start(&self, rng: &mut StdRng) -> DVector<f64> {
        let layout = self.problem.layout();
        if self.settings.random_start {
            layout.random_start(rng)
        } else {
            layout.initial().clone()
        }
    }

    fn global_loop(
        &self,
        ampgo: &Ampgo,
        loop_index: usize,
        start: &DVector<f64>,
        rng: &mut StdRng,
        outcome: &mut FitOutcome,
    ) -> Result<(), FitError> {
        let bounds = self.problem.layout().bounds();
        let report = ampgo.minimize(&self.objective, start, bounds, rng)?;
        info!(
            best = report.best_f,
            evaluations = report.evaluations,
            attempted = report.tunnelling.attempted,
            successful = report.tunnelling.successful,
            "{}",
            report.termination
        );
        let reduced_chi_square = report.best_f / self.degrees_of_freedom();
        self.record(
            &mut outcome.log,
            Stage::Global,
            loop_index,
            loop_index,
            &report.best_x,
            &ErrorEstimate::None,
            reduced_chi_square,
            report.evaluations,
        );

        info!("polish global fit with Levenberg-Marquardt");
        let polished = self.solver.minimize(&self.objective, &report.best_x, bounds);
        self.finish_least_squares(Stage::Polish, loop_index, loop_index, polished, None, outcome);
        Ok(())
    }

    fn local_loop(&self, loop_index: usize, start: &DVector<f64>, rng: &mut StdRng, outcome: &mut FitOutcome) {
        let bounds = self.problem.layout().bounds();
        let fit = self.solver.minimize(&self.objective, start, bounds);
        debug!(termination = ?fit.termination, evaluations = fit.evaluations, "local fit finished");

        let monte_carlo = self.settings.monte_carlo.map(|iterations| {
            let refits = corrupted_refits(&self.objective, &self.solver, &fit.params, bounds, iterations, rng);
            let samples: Vec<DVector<f64>> = refits.iter().map(|refit| refit.params.clone()).collect();
            let errors = monte_carlo_standard_errors(&samples, fit.params.len());
            for (number, refit) in refits.iter().enumerate() {
                self.record(
                    &mut outcome.log,
                    Stage::MonteCarlo,
                    loop_index,
                    number + 1,
                    &refit.params,
                    &ErrorEstimate::MonteCarlo(errors.clone()),
                    self.reduced_chi_square(&refit.params),
                    refit.evaluations,
                );
            }
            errors
        });
        self.finish_least_squares(Stage::Local, loop_index, loop_index, fit, monte_carlo, outcome);
    }

    fn brute_force(&self, grid: &BruteGrid, pool: &ThreadPool, outcome: &mut FitOutcome) {
        info!(points = grid.len(), "brute-force search of the parameter space");
        let bounds = self.problem.layout().bounds();
        let scores = score_grid(
            pool,
            grid,
            &self.objective,
            &self.solver,
            bounds,
            self.problem.degrees_of_freedom(),
        );
        let plot = self.settings.mode == FitMode::BrutePlot;
        for score in &scores {
            let errors = match self.statistics(&score.fit) {
                Some(statistics) => ErrorEstimate::Analytic(statistics.standard_errors()),
                None => ErrorEstimate::None,
            };
            for dataset in 0..self.problem.datasets().len() {
                outcome.log.push(FitRecord {
                    plot,
                    ..self.dataset_record(
                        Stage::Grid,
                        1,
                        score.index + 1,
                        dataset,
                        &score.fit.params,
                        &errors,
                        score.reduced_chi_square,
                        score.fit.evaluations,
                    )
                });
            }
        }

        let Some(best) = select_best(&scores) else {
            return;
        };
        info!(
            point = best.index + 1,
            reduced_chi_square = best.reduced_chi_square,
            "lowest reduced chi-square found, refining within the bounds"
        );
        let refined = self.solver.minimize(&self.objective, &best.fit.params, bounds);
        self.finish_least_squares(Stage::Local, 1, grid.len() + 1, refined, None, outcome);
    }

    /// Record the result of a least squares stage for every dataset and keep
    /// its bundle. Without Monte-Carlo errors, the analytic errors are used.
    #[allow(clippy::too_many_arguments)]
    fn finish_least_squares(
        &self,
        stage: Stage,
        loop_index: usize,
        index: usize,
        fit: LocalFit,
        monte_carlo: Option<DVector<f64>>,
        outcome: &mut FitOutcome,
    ) {
        let statistics = self.statistics(&fit);
        let errors = match (monte_carlo, &statistics) {
            (Some(errors), _) => ErrorEstimate::MonteCarlo(errors),
            (None, Some(statistics)) => ErrorEstimate::Analytic(statistics.standard_errors()),
            (None, None) => ErrorEstimate::None,
        };
        let reduced_chi_square = self.reduced_chi_square(&fit.params);
        info!(
            %stage,
            reduced_chi_square,
            evaluations = fit.evaluations,
            termination = ?fit.termination,
            "fit finished"
        );
        self.record(
            &mut outcome.log,
            stage,
            loop_index,
            index,
            &fit.params,
            &errors,
            reduced_chi_square,
            fit.evaluations,
        );
        outcome.bundles.push(FitBundle {
            stage,
            loop_index,
            index,
            params: fit.params,
            residuals: fit.residuals,
            jacobian: fit.jacobian,
            statistics,
        });
    }

    fn statistics(&self, fit: &LocalFit) -> Option<FitStatistics> {
        FitStatistics::try_calculate(&fit.jacobian, &fit.residuals, self.problem.degrees_of_freedom())
            .map_err(|error| warn!("no analytic errors: {error}"))
            .ok()
    }

    fn degrees_of_freedom(&self) -> f64 {
        self.problem.degrees_of_freedom() as f64
    }

    fn reduced_chi_square(&self, params: &DVector<f64>) -> f64 {
        self.objective.chi_square(params) / self.degrees_of_freedom()
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        log: &mut FitLog,
        stage: Stage,
        loop_index: usize,
        index: usize,
        params: &DVector<f64>,
        errors: &ErrorEstimate,
        reduced_chi_square: f64,
        evaluations: usize,
    ) {
        for dataset in 0..self.problem.datasets().len() {
            log.push(self.dataset_record(
                stage,
                loop_index,
                index,
                dataset,
                params,
                errors,
                reduced_chi_square,
                evaluations,
            ));
        }
    }

    /// The record of one dataset. Analytic errors are zero for datasets
    /// without uncertainties.
    #[allow(clippy::too_many_arguments)]
    fn dataset_record(
        &self,
        stage: Stage,
        loop_index: usize,
        index: usize,
        dataset: usize,
        params: &DVector<f64>,
        errors: &ErrorEstimate,
        reduced_chi_square: f64,
        evaluations: usize,
    ) -> FitRecord {
        let layout = self.problem.layout();
        let errors = match errors {
            ErrorEstimate::None => None,
            ErrorEstimate::Analytic(_) if self.problem.datasets()[dataset].error_sum() == 0. => {
                Some(PhysicalParameters::default())
            }
            ErrorEstimate::Analytic(errors) | ErrorEstimate::MonteCarlo(errors) => {
                Some(layout.unpack_errors(errors, dataset))
            }
        };
        FitRecord {
            loop_index,
            index,
            stage,
            dataset,
            parameters: layout.pack(params, dataset),
            errors,
            reduced_chi_square,
            evaluations,
            plot: false,
        }
    }
}

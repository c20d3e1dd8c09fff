//! The fit pipeline.
//!
//! A [FitProblem] holds the validated datasets and parameter layout. A
//! [Fitter] runs the stages of the chosen [FitMode] on it:
//!
//! * `local` and `localint` fit the rates or the decay intensities with the
//!   bounded Levenberg-Marquardt solver and estimate the errors either
//!   analytically or from Monte-Carlo refits against corrupted data.
//! * `global` searches with AMPGO and polishes its best point with a local fit.
//! * `brute` and `brutep` score every point of the brute-force grid on a
//!   worker pool and refine the best one with a local fit.
//!
//! Every stage appends one [FitRecord] per dataset to the [FitLog] of the
//! [FitOutcome]. Each least squares fit also leaves a [FitBundle] with its
//! residuals and Jacobian.
use crate::parameters::SetupError;
use crate::solvers::ampgo::AmpgoError;
use thiserror::Error as ThisError;

mod brute;
mod monte_carlo;
mod problem;
mod record;
mod runner;
mod settings;


pub use problem::FitProblem;
pub use record::{FitBundle, FitLog, FitRecord, Stage};
pub use runner::{FitOutcome, Fitter};
pub use settings::{FitMode, FitSettings};

/// Errors that prevent a fit from running.
#[derive(Debug, ThisError)]
pub enum FitError {
    /// the problem does not fit the settings
    #[error(transparent)]
    Setup(#[from] SetupError),
    /// the settings of the global optimizer are invalid
    #[error(transparent)]
    Ampgo(#[from] AmpgoError),
    /// the worker pool of the brute-force search could not be built
    #[error("Could not create the worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

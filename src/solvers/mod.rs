//! Optimizers for box-constrained problems: a bounded Levenberg-Marquardt
//! solver for local least squares fits and the AMPGO global optimizer with
//! its bounded BFGS inner minimizer.

/// global optimization by tabu tunnelling
pub mod ampgo;
/// quasi-Newton minimization of scalar objectives
pub mod bfgs;
/// box constraints and their variable transforms
pub mod bounds;
/// local least squares fits with the Levenberg-Marquardt algorithm
pub mod levmar;

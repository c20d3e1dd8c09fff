#![warn(missing_docs)]
//!
//! # Introduction
//!
//! This crate fits R1rho relaxation dispersion data to the Bloch-McConnell
//! equations of a spin exchanging between a ground state A and up to two
//! excited states B and C. It recovers the populations `$p_B, p_C$`, the
//! chemical shift differences `$\Delta\omega_B, \Delta\omega_C$`, the exchange
//! rates `$k_{ex}$` and the intrinsic relaxation rates of the states.
//!
//! ## The Model
//!
//! Under a spinlock of power `$\omega_1$` applied at an offset `$\Omega$`, the
//! magnetization `$\vec{M}$` of all states evolves as
//!
//! ```math
//! \frac{d}{dt}\vec{M}(t) = \mathbf{L}\,\vec{M}(t),
//! ```
//!
//! where the rate matrix `$\mathbf{L}$` contains the precession about the
//! effective field, the relaxation and the exchange between the states. The
//! magnetization starts along the effective field of the ground state or of
//! the population averaged resonance and is propagated over a series of
//! relaxation delays with the matrix exponential. R1rho is the decay rate of a
//! monoexponential fit to the projected intensities. For two-state exchange the
//! closed-form Laguerre equation is available as well.
//!
//! ## What Is Fitted
//!
//! Each dataset holds the rates (or the decay intensities) of one spin at one
//! field strength. Its parameters are specified as *free* (fitted for this
//! dataset), *shared* (fitted once for all datasets sharing it) or *fixed*.
//! The [parameters::ParameterLayout] maps all of them onto one vector of
//! fitted values, which the optimizers work on. The fit minimizes
//!
//! ```math
//! \chi^2 = \sum_i \left(\frac{R_{1\rho,i}^{pred} - R_{1\rho,i}^{obs}}{\sigma_i}\right)^2
//! ```
//!
//! over all datasets.
//!
//! ## Fit Modes
//!
//! * **local**: a bounded Levenberg-Marquardt fit of the rates.
//! * **localint**: the same for decay intensities.
//! * **global**: the AMPGO tabu-tunnelling global optimizer, polished with a
//!   local fit.
//! * **brute** and **brutep**: a parallel scan of a parameter grid, refined from
//!   the best grid point.
//!
//! Errors of the fitted values are estimated from the Jacobian of the
//! residuals or from Monte-Carlo refits against data corrupted with their
//! uncertainties.
//!
//! # Usage
//!
//! ```no_run
//! use bmns::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // 1. the measured rates: offset (Hz), spinlock power (Hz), R1rho and its error (1/s)
//! let points = vec![
//!     RelaxationPoint::new(0., 150., 24.1, 0.5),
//!     RelaxationPoint::new(0., 300., 22.3, 0.5),
//!     RelaxationPoint::new(0., 500., 20.2, 0.5),
//!     RelaxationPoint::new(0., 1000., 18.0, 0.5),
//!     RelaxationPoint::new(-400., 150., 16.9, 0.5),
//! ];
//! let dataset = Dataset::relaxation("residue 12", 150.8, points);
//!
//! // 2. which parameters are fitted
//! let parameters = ParameterSet::new()
//!     .with(ParameterSpec::free(ParameterName::Pb, 0.05, 1e-3, 0.3))
//!     .with(ParameterSpec::fixed(ParameterName::DwB, 3.))
//!     .with(ParameterSpec::free(ParameterName::KexAB, 2000., 10., 1e5))
//!     .with(ParameterSpec::fixed(ParameterName::R1, 2.5))
//!     .with(ParameterSpec::free(ParameterName::R2, 15., 1., 100.));
//!
//! // 3. validate the setup
//! let problem = FitProblem::new(vec![dataset], vec![parameters], FitEquation::BlochMcConnell)?;
//!
//! // 4. run the fit and look at the records
//! let outcome = Fitter::new(&problem, FitSettings::default())?.run()?;
//! for record in outcome.log.sorted() {
//!     println!("{} {:?}", record.stage, record.values());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # References
//! H. M. McConnell, Reaction rates by nuclear magnetic resonance, *J. Chem. Phys.* **28**, 430 (1958).
//!
//! V. Z. Miloushev and A. G. Palmer, R1rho relaxation for two-site chemical exchange: general approximations
//! and some exact solutions, *J. Magn. Reson.* **177**, 221 (2005).
//!
//! L. Lasdon et al., Adaptive memory programming for constrained global optimization,
//! *Computers & Operations Research* **37**, 1500 (2010).

/// datasets, observations and relaxation delays
pub mod data;
/// the fit pipeline
pub mod fit;
/// the Bloch-McConnell simulator and the Laguerre equation
pub mod model;
/// chi-square and residual objectives
pub mod objective;
/// parameter specifications and their mapping onto the fitted vector
pub mod parameters;
/// commonly useful imports
pub mod prelude;
/// the local and global optimizers
pub mod solvers;
/// analytic and Monte-Carlo error estimates
pub mod statistics;

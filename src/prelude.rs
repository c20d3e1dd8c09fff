pub use crate::data::{Dataset, DecayCurve, Observations, RelaxationDelays, RelaxationPoint};
pub use crate::fit::{FitError, FitLog, FitMode, FitOutcome, FitProblem, FitRecord, FitSettings, Fitter, Stage};
pub use crate::model::{Alignment, BlochMcConnell, FitEquation, PhysicalParameters, SpinlockCondition};
pub use crate::parameters::{ParameterName, ParameterSet, ParameterSpec, SetupError, Sweep};
pub use crate::statistics::FitStatistics;

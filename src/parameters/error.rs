use super::ParameterName;
use crate::solvers::bounds::BoundsError;
use thiserror::Error as ThisError;

/// A keyword (parameter name, fit mode, alignment, ...) could not be parsed.
#[derive(Debug, Clone, ThisError, PartialEq, Eq)]
#[error("Unknown {kind} '{value}'")]
pub struct KeywordError {
    kind: &'static str,
    value: String,
}

impl KeywordError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }

    /// the text that failed to parse
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Errors in the setup of a fit. These are fatal and are reported before any
/// optimization starts.
#[derive(Debug, Clone, ThisError, PartialEq)]
pub enum SetupError {
    /// no datasets were given
    #[error("At least one dataset is required")]
    NoDatasets,

    /// every parameter of every dataset is fixed
    #[error("The fit has no free parameters")]
    NoFreeParameters,

    /// there must be exactly one parameter set per dataset
    #[error("Got {datasets} datasets but {parameter_sets} parameter sets")]
    DatasetCountMismatch {
        /// number of datasets
        datasets: usize,
        /// number of parameter sets
        parameter_sets: usize,
    },

    /// the same parameter was specified twice for a dataset
    #[error("Parameter {name} is specified more than once for dataset {dataset}")]
    DuplicateParameter {
        /// index of the dataset
        dataset: usize,
        /// the repeated parameter
        name: ParameterName,
    },

    /// a value or bound is NaN, or a value is infinite
    #[error("Parameter {name} of dataset {dataset} has a non-finite value or bound")]
    NonFiniteValue {
        /// index of the dataset
        dataset: usize,
        /// the offending parameter
        name: ParameterName,
    },

    /// lower bound above upper bound
    #[error("Parameter {name} of dataset {dataset} has lower bound {lower} above upper bound {upper}")]
    InvalidBounds {
        /// index of the dataset
        dataset: usize,
        /// the offending parameter
        name: ParameterName,
        /// the given lower bound
        lower: f64,
        /// the given upper bound
        upper: f64,
    },

    /// the starting value violates its own bounds
    #[error("Parameter {name} of dataset {dataset}: value {value} outside of [{lower}, {upper}]")]
    ValueOutOfBounds {
        /// index of the dataset
        dataset: usize,
        /// the offending parameter
        name: ParameterName,
        /// the starting value
        value: f64,
        /// lower bound
        lower: f64,
        /// upper bound
        upper: f64,
    },

    /// a free parameter whose bounds leave no room to move
    #[error("Free parameter {name} of dataset {dataset} has identical lower and upper bounds")]
    DegenerateBounds {
        /// index of the dataset
        dataset: usize,
        /// the offending parameter
        name: ParameterName,
    },

    /// a brute-force sweep that cannot be generated
    #[error("Invalid sweep for parameter {name} of dataset {dataset}: {reason}")]
    InvalidSweep {
        /// index of the dataset
        dataset: usize,
        /// the swept parameter
        name: ParameterName,
        /// what is wrong with the sweep
        reason: &'static str,
    },

    /// a shared parameter with different bounds or sweeps across datasets
    #[error("Shared parameter {name} has inconsistent bounds or sweeps across datasets")]
    InconsistentShared {
        /// the shared parameter
        name: ParameterName,
    },

    /// bound vectors do not fit the parameter vector
    #[error(transparent)]
    Bounds(#[from] BoundsError),

    /// fewer data points than free parameters plus one
    #[error("{data_points} data points cannot determine {free_parameters} free parameters")]
    Underdetermined {
        /// total number of observations
        data_points: usize,
        /// length of the fitted vector
        free_parameters: usize,
    },

    /// a dataset failed validation
    #[error("Dataset {dataset}: {reason}")]
    InvalidData {
        /// index of the dataset
        dataset: usize,
        /// what is wrong with the data
        reason: String,
    },

    /// the data kind of a dataset does not fit the requested fit mode
    #[error("Dataset {dataset} does not carry the data kind required by fit mode {mode}")]
    ModeMismatch {
        /// index of the dataset
        dataset: usize,
        /// keyword of the fit mode
        mode: &'static str,
    },

    /// the analytic equation cannot describe the requested model
    #[error("Dataset {dataset}: {reason}")]
    UnsupportedEquation {
        /// index of the dataset
        dataset: usize,
        /// why the equation does not apply
        reason: &'static str,
    },

    /// brute-force modes need at least one swept free parameter
    #[error("Brute-force search requires at least one swept free parameter")]
    NoSweep,
}

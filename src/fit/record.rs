use crate::model::PhysicalParameters;
use crate::parameters::ParameterName;
use crate::statistics::FitStatistics;
use nalgebra::{DMatrix, DVector};
use std::fmt;

/// The stage of a fit a record belongs to. Records are ordered by stage in
/// the order of declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// the best point of the global optimizer
    Global,
    /// the local fit polishing a global result
    Polish,
    /// a local fit, including the refinement of a brute-force search
    Local,
    /// a refit against Monte-Carlo corrupted data
    MonteCarlo,
    /// the score of a brute-force grid point
    Grid,
}

impl Stage {
    /// the label of the stage in exported records
    pub fn label(self) -> &'static str {
        match self {
            Stage::Global => "global",
            Stage::Polish => "polish",
            Stage::Local => "local",
            Stage::MonteCarlo => "mcerr",
            Stage::Grid => "grid",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The result of one fit stage for one dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct FitRecord {
    /// the fit loop, starting at one
    pub loop_index: usize,
    /// the number of the record within its loop and stage, starting at one.
    /// This is the loop for global, polish and local records, the refit for
    /// Monte-Carlo records and the grid point for brute-force records. The
    /// refinement of a brute-force search is numbered one past the last grid
    /// point.
    pub index: usize,
    /// the stage that produced the record
    pub stage: Stage,
    /// the dataset the record describes
    pub dataset: usize,
    /// the physical parameters of the dataset
    pub parameters: PhysicalParameters,
    /// the uncertainties of the parameters, if they were estimated
    pub errors: Option<PhysicalParameters>,
    /// chi-square over all datasets divided by the degrees of freedom
    pub reduced_chi_square: f64,
    /// number of objective evaluations spent by the stage
    pub evaluations: usize,
    /// whether the external plotting collaborator should plot this record
    pub plot: bool,
}

impl FitRecord {
    /// The column names of [FitRecord::values].
    pub fn header() -> Vec<String> {
        let mut header: Vec<String> = ["loop", "index", "dataset"].map(String::from).to_vec();
        header.extend(ParameterName::ALL.iter().map(|name| name.to_string()));
        header.extend(ParameterName::ALL.iter().map(|name| format!("{name}_err")));
        header.push("red_chi_sq".into());
        header.push("nfev".into());
        header
    }

    /// The record as one row of numbers: the indices, the parameters, their
    /// errors, the reduced chi-square and the number of evaluations. Errors
    /// that were not estimated are written as zero.
    pub fn values(&self) -> Vec<f64> {
        let errors = self.errors.unwrap_or_default();
        let mut values = vec![self.loop_index as f64, self.index as f64, self.dataset as f64];
        values.extend(self.parameters.to_array());
        values.extend(errors.to_array());
        values.push(self.reduced_chi_square);
        values.push(self.evaluations as f64);
        values
    }
}

/// An append-only store of fit records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitLog {
    records: Vec<FitRecord>,
}

impl FitLog {
    /// an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// append a record
    pub fn push(&mut self, record: FitRecord) {
        self.records.push(record);
    }

    /// the records in the order they were added
    pub fn records(&self) -> &[FitRecord] {
        &self.records
    }

    /// the records of one stage in the order they were added
    pub fn stage(&self, stage: Stage) -> impl Iterator<Item = &FitRecord> {
        self.records.iter().filter(move |record| record.stage == stage)
    }

    /// The records ordered by stage, loop, index and dataset.
    pub fn sorted(&self) -> Vec<&FitRecord> {
        let mut sorted: Vec<&FitRecord> = self.records.iter().collect();
        sorted.sort_by_key(|record| (record.stage, record.loop_index, record.index, record.dataset));
        sorted
    }

    /// number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// true if no record was added
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// The residuals and the Jacobian of a least squares fit at its result,
/// for downstream statistics.
#[derive(Debug, Clone)]
pub struct FitBundle {
    /// the stage of the fit
    pub stage: Stage,
    /// the fit loop, starting at one
    pub loop_index: usize,
    /// the record index of the fit, see [FitRecord::index]
    pub index: usize,
    /// the fitted values
    pub params: DVector<f64>,
    /// residuals at `params`
    pub residuals: DVector<f64>,
    /// Jacobian of the residuals at `params`
    pub jacobian: DMatrix<f64>,
    /// the analytic statistics, unless they could not be calculated
    pub statistics: Option<FitStatistics>,
}

use super::FitMode;
use crate::data::Dataset;
use crate::model::{BlochMcConnell, FitEquation};
use crate::objective::GlobalObjective;
use crate::parameters::{ParameterLayout, ParameterName, ParameterSet, SetupError, Slot};

/// The validated inputs of a fit: the datasets, the parameter layout built
/// from one parameter set per dataset and the equation predicting the rates.
///
/// Everything that can be wrong with a fit configuration is reported by
/// [FitProblem::new], before any optimization starts.
#[derive(Debug, Clone)]
pub struct FitProblem {
    datasets: Vec<Dataset>,
    layout: ParameterLayout,
    equation: FitEquation,
    simulator: BlochMcConnell,
    degrees_of_freedom: usize,
}

impl FitProblem {
    /// Validate the datasets and the parameter sets and build the layout.
    pub fn new(
        datasets: Vec<Dataset>,
        parameters: Vec<ParameterSet>,
        equation: FitEquation,
    ) -> Result<Self, SetupError> {
        if datasets.is_empty() {
            return Err(SetupError::NoDatasets);
        }
        if datasets.len() != parameters.len() {
            return Err(SetupError::DatasetCountMismatch {
                datasets: datasets.len(),
                parameter_sets: parameters.len(),
            });
        }
        for (index, dataset) in datasets.iter().enumerate() {
            dataset.validate(index)?;
        }
        let layout = ParameterLayout::build(&parameters)?;
        if equation == FitEquation::Laguerre {
            check_laguerre(&datasets, &layout)?;
        }

        let data_points: usize = datasets.iter().map(Dataset::data_point_count).sum();
        if data_points <= layout.len() {
            return Err(SetupError::Underdetermined {
                data_points,
                free_parameters: layout.len(),
            });
        }
        Ok(Self {
            degrees_of_freedom: data_points - layout.len(),
            datasets,
            layout,
            equation,
            simulator: BlochMcConnell::default(),
        })
    }

    /// use another simulator, e.g. one with a custom exchange regime
    /// classifier for the automatic alignment
    pub fn with_simulator(self, simulator: BlochMcConnell) -> Self {
        Self { simulator, ..self }
    }

    /// the datasets of the fit
    pub fn datasets(&self) -> &[Dataset] {
        &self.datasets
    }

    /// the mapping of the fitted values
    pub fn layout(&self) -> &ParameterLayout {
        &self.layout
    }

    /// the equation predicting the rates
    pub fn equation(&self) -> FitEquation {
        self.equation
    }

    /// total number of data points minus the number of fitted values
    pub fn degrees_of_freedom(&self) -> usize {
        self.degrees_of_freedom
    }

    /// the objective over all datasets
    pub fn objective(&self) -> GlobalObjective<'_> {
        GlobalObjective::new(&self.layout, &self.datasets, self.simulator, self.equation)
    }

    /// Check that every dataset carries the kind of data `mode` fits.
    pub fn check_mode(&self, mode: FitMode) -> Result<(), SetupError> {
        let wrong_kind = self
            .datasets
            .iter()
            .position(|dataset| dataset.is_intensity() != mode.fits_intensities());
        match wrong_kind {
            Some(dataset) => Err(SetupError::ModeMismatch {
                dataset,
                mode: mode.as_str(),
            }),
            None => Ok(()),
        }
    }
}

/// The analytic equation only predicts rates of two-state exchange.
fn check_laguerre(datasets: &[Dataset], layout: &ParameterLayout) -> Result<(), SetupError> {
    for (index, dataset) in datasets.iter().enumerate() {
        if dataset.is_intensity() {
            return Err(SetupError::UnsupportedEquation {
                dataset: index,
                reason: "the Laguerre equation cannot predict decay intensities",
            });
        }
        let third_state = [ParameterName::Pc, ParameterName::KexAC, ParameterName::KexBC]
            .into_iter()
            .any(|name| match layout.slot(index, name) {
                Slot::Vector(_) => true,
                Slot::Fixed(value) => value != 0.,
                Slot::Alias(_) => false,
            });
        if third_state {
            return Err(SetupError::UnsupportedEquation {
                dataset: index,
                reason: "the Laguerre equation only describes two-state exchange",
            });
        }
    }
    Ok(())
}

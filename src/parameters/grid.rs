use super::{ParameterLayout, SetupError};
use nalgebra::DVector;

/// The points of a brute-force search.
///
/// The grid is the cartesian product of the sweeps of all swept elements of
/// the parameter vector. Elements without a sweep stay at their initial
/// value. The first swept element varies slowest.
#[derive(Debug, Clone, PartialEq)]
pub struct BruteGrid {
    points: Vec<DVector<f64>>,
}

impl BruteGrid {
    /// Generate the grid for a layout. Fails if no element is swept.
    pub fn generate(layout: &ParameterLayout) -> Result<Self, SetupError> {
        let lower = layout.bounds().lower();
        let upper = layout.bounds().upper();
        let axes: Vec<(usize, Vec<f64>)> = layout
            .entries()
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| {
                entry
                    .sweep
                    .map(|sweep| (index, sweep.values(lower[index], upper[index])))
            })
            .collect();
        if axes.is_empty() {
            return Err(SetupError::NoSweep);
        }

        let mut points = vec![layout.initial().clone()];
        for (index, values) in axes {
            points = points
                .iter()
                .flat_map(|point| {
                    values.iter().map(move |&value| {
                        let mut next = point.clone();
                        next[index] = value;
                        next
                    })
                })
                .collect();
        }
        Ok(Self { points })
    }

    /// number of grid points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// never true for a generated grid
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// the grid points in grid index order
    pub fn points(&self) -> &[DVector<f64>] {
        &self.points
    }
}

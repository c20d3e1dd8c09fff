use super::{ParameterName, ParameterSet, ParameterSpec, Role, SetupError, Sweep, SweepScale};
use crate::model::PhysicalParameters;
use crate::solvers::bounds::Bounds;
use nalgebra::DVector;
use rand::Rng;

/// Where a dataset takes the value of one of its parameters from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Slot {
    /// an element of the global parameter vector
    Vector(usize),
    /// a constant
    Fixed(f64),
    /// the value of another parameter of the same dataset
    Alias(ParameterName),
}

/// Static information about an element of the global parameter vector.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorEntry {
    /// the parameter this element represents
    pub name: ParameterName,
    /// the first dataset using the element
    pub dataset: usize,
    /// whether several datasets may use the element
    pub shared: bool,
    /// brute-force sweep of the element, if any
    pub sweep: Option<Sweep>,
}

impl VectorEntry {
    /// a readable label, e.g. `kexAB` for a shared element or `R2[1]` for the
    /// free `R2` of the second dataset
    pub fn label(&self) -> String {
        if self.shared {
            self.name.to_string()
        } else {
            format!("{}[{}]", self.name, self.dataset)
        }
    }
}

/// The mapping between the per-dataset physical parameters and the single
/// vector of fitted values.
///
/// The layout is built once during setup and is immutable afterwards. Free
/// parameters get one vector element per dataset, shared parameters one
/// element in total, allocated at the dataset where they first appear.
#[derive(Debug, Clone)]
pub struct ParameterLayout {
    initial: DVector<f64>,
    bounds: Bounds,
    entries: Vec<VectorEntry>,
    slots: Vec<[Slot; ParameterName::COUNT]>,
}

impl ParameterLayout {
    /// Build the layout from one parameter set per dataset.
    pub fn build(sets: &[ParameterSet]) -> Result<Self, SetupError> {
        if sets.is_empty() {
            return Err(SetupError::NoDatasets);
        }
        let mut initial = Vec::new();
        let mut lower = Vec::new();
        let mut upper = Vec::new();
        let mut entries: Vec<VectorEntry> = Vec::new();
        let mut slots = Vec::with_capacity(sets.len());

        for (dataset, set) in sets.iter().enumerate() {
            let mut dataset_slots = [Slot::Fixed(0.); ParameterName::COUNT];
            let mut seen = [false; ParameterName::COUNT];
            for spec in set.specs() {
                if std::mem::replace(&mut seen[spec.name.index()], true) {
                    return Err(SetupError::DuplicateParameter {
                        dataset,
                        name: spec.name,
                    });
                }
                validate_spec(dataset, spec)?;
                dataset_slots[spec.name.index()] = match spec.role {
                    Role::Fixed => Slot::Fixed(spec.value),
                    Role::Shared => {
                        let existing = entries
                            .iter()
                            .position(|entry| entry.shared && entry.name == spec.name);
                        match existing {
                            Some(index) => {
                                let same_sweep = entries[index].sweep == spec.sweep;
                                if lower[index] != spec.lower || upper[index] != spec.upper || !same_sweep
                                {
                                    return Err(SetupError::InconsistentShared { name: spec.name });
                                }
                                Slot::Vector(index)
                            }
                            None => {
                                initial.push(spec.value);
                                lower.push(spec.lower);
                                upper.push(spec.upper);
                                entries.push(VectorEntry {
                                    name: spec.name,
                                    dataset,
                                    shared: true,
                                    sweep: spec.sweep,
                                });
                                Slot::Vector(entries.len() - 1)
                            }
                        }
                    }
                    Role::Free => {
                        initial.push(spec.value);
                        lower.push(spec.lower);
                        upper.push(spec.upper);
                        entries.push(VectorEntry {
                            name: spec.name,
                            dataset,
                            shared: false,
                            sweep: spec.sweep,
                        });
                        Slot::Vector(entries.len() - 1)
                    }
                };
            }
            for name in ParameterName::ALL {
                if let (Some(primary), Slot::Fixed(value)) = (name.primary(), dataset_slots[name.index()]) {
                    if value == 0. {
                        dataset_slots[name.index()] = Slot::Alias(primary);
                    }
                }
            }
            slots.push(dataset_slots);
        }

        if entries.is_empty() {
            return Err(SetupError::NoFreeParameters);
        }
        let bounds = Bounds::new(DVector::from_vec(lower), DVector::from_vec(upper))?;
        Ok(Self {
            initial: DVector::from_vec(initial),
            bounds,
            entries,
            slots,
        })
    }

    /// number of fitted values
    pub fn len(&self) -> usize {
        self.initial.len()
    }

    /// always false for a successfully built layout
    pub fn is_empty(&self) -> bool {
        self.initial.is_empty()
    }

    /// number of datasets the layout was built for
    pub fn dataset_count(&self) -> usize {
        self.slots.len()
    }

    /// the starting vector given by the specifications
    pub fn initial(&self) -> &DVector<f64> {
        &self.initial
    }

    /// the bounds of the fitted values
    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// static information about each fitted value
    pub fn entries(&self) -> &[VectorEntry] {
        &self.entries
    }

    /// the slot of `name` in `dataset`
    pub fn slot(&self, dataset: usize, name: ParameterName) -> Slot {
        self.slots[dataset][name.index()]
    }

    /// Assemble the physical parameters of `dataset` from the vector `values`.
    pub fn pack(&self, values: &DVector<f64>, dataset: usize) -> PhysicalParameters {
        let slots = &self.slots[dataset];
        let mut parameters = PhysicalParameters::default();
        for name in ParameterName::ALL {
            match slots[name.index()] {
                Slot::Vector(index) => parameters.set(name, values[index]),
                Slot::Fixed(value) => parameters.set(name, value),
                Slot::Alias(_) => {}
            }
        }
        for name in ParameterName::ALL {
            if let Slot::Alias(primary) = slots[name.index()] {
                parameters.set(name, parameters.get(primary));
            }
        }
        parameters
    }

    /// Distribute the uncertainties of the fitted values onto the parameters
    /// of `dataset`. Parameters that are not fitted get zero uncertainty.
    pub fn unpack_errors(&self, errors: &DVector<f64>, dataset: usize) -> PhysicalParameters {
        let mut unpacked = PhysicalParameters::default();
        for name in ParameterName::ALL {
            if let Slot::Vector(index) = self.slots[dataset][name.index()] {
                unpacked.set(name, errors[index]);
            }
        }
        unpacked
    }

    /// Collect the fitted values from per-dataset physical parameters. The
    /// value of a shared element is taken from the first dataset using it.
    pub fn extract(&self, parameters: &[PhysicalParameters]) -> DVector<f64> {
        let mut values = self.initial.clone();
        for (dataset, slots) in self.slots.iter().enumerate().rev() {
            for name in ParameterName::ALL {
                if let Slot::Vector(index) = slots[name.index()] {
                    values[index] = parameters[dataset].get(name);
                }
            }
        }
        values
    }

    /// A starting vector drawn uniformly from within the bounds. Elements
    /// without finite bounds keep their initial value.
    pub fn random_start<R: Rng + ?Sized>(&self, rng: &mut R) -> DVector<f64> {
        let lower = self.bounds.lower();
        let upper = self.bounds.upper();
        DVector::from_iterator(
            self.len(),
            (0..self.len()).map(|i| {
                if lower[i].is_finite() && upper[i].is_finite() && lower[i] < upper[i] {
                    rng.gen_range(lower[i]..=upper[i])
                } else {
                    self.initial[i]
                }
            }),
        )
    }
}

fn validate_spec(dataset: usize, spec: &ParameterSpec) -> Result<(), SetupError> {
    let name = spec.name;
    if !spec.value.is_finite() || spec.lower.is_nan() || spec.upper.is_nan() {
        return Err(SetupError::NonFiniteValue { dataset, name });
    }
    if spec.role == Role::Fixed {
        return match spec.sweep {
            Some(_) => Err(SetupError::InvalidSweep {
                dataset,
                name,
                reason: "fixed parameters cannot be swept",
            }),
            None => Ok(()),
        };
    }
    if spec.lower > spec.upper {
        return Err(SetupError::InvalidBounds {
            dataset,
            name,
            lower: spec.lower,
            upper: spec.upper,
        });
    }
    if spec.lower == spec.upper {
        return Err(SetupError::DegenerateBounds { dataset, name });
    }
    if spec.value < spec.lower || spec.value > spec.upper {
        return Err(SetupError::ValueOutOfBounds {
            dataset,
            name,
            value: spec.value,
            lower: spec.lower,
            upper: spec.upper,
        });
    }
    if let Some(sweep) = spec.sweep {
        let reason = if sweep.steps < 2 {
            Some("a sweep needs at least two steps")
        } else if !spec.lower.is_finite() || !spec.upper.is_finite() {
            Some("a sweep needs finite bounds")
        } else if sweep.scale == SweepScale::Log && spec.lower <= 0. {
            Some("a logarithmic sweep needs a positive lower bound")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(SetupError::InvalidSweep {
                dataset,
                name,
                reason,
            });
        }
    }
    Ok(())
}

use super::ParameterName;
use serde::{Deserialize, Serialize};

/// How a parameter takes part in the fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// fitted independently for each dataset
    Free,
    /// fitted once and used by every dataset that marks it shared
    Shared,
    /// held at its value
    Fixed,
}

/// Spacing of the values of a brute-force sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepScale {
    /// evenly spaced values
    Linear,
    /// values evenly spaced in the logarithm
    Log,
}

/// A brute-force sweep of a parameter across its bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sweep {
    /// spacing of the values
    pub scale: SweepScale,
    /// number of values, including both bounds
    pub steps: usize,
}

impl Sweep {
    /// a linearly spaced sweep with `steps` values
    pub fn linear(steps: usize) -> Self {
        Self {
            scale: SweepScale::Linear,
            steps,
        }
    }

    /// a logarithmically spaced sweep with `steps` values
    pub fn log(steps: usize) -> Self {
        Self {
            scale: SweepScale::Log,
            steps,
        }
    }

    /// The values of the sweep from `lower` to `upper`, both inclusive.
    pub fn values(&self, lower: f64, upper: f64) -> Vec<f64> {
        if self.steps < 2 {
            return vec![lower];
        }
        let last = (self.steps - 1) as f64;
        match self.scale {
            SweepScale::Linear => (0..self.steps)
                .map(|i| lower + (upper - lower) * i as f64 / last)
                .collect(),
            SweepScale::Log => {
                let (log_lower, log_upper) = (lower.ln(), upper.ln());
                (0..self.steps)
                    .map(|i| (log_lower + (log_upper - log_lower) * i as f64 / last).exp())
                    .collect()
            }
        }
    }
}

/// The specification of one parameter of one dataset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// which parameter
    pub name: ParameterName,
    /// starting value, or the value of a fixed parameter
    pub value: f64,
    /// lower bound
    pub lower: f64,
    /// upper bound
    pub upper: f64,
    /// participation in the fit
    pub role: Role,
    /// optional brute-force sweep
    #[serde(default)]
    pub sweep: Option<Sweep>,
}

impl ParameterSpec {
    /// a parameter fitted per dataset
    pub fn free(name: ParameterName, value: f64, lower: f64, upper: f64) -> Self {
        Self {
            name,
            value,
            lower,
            upper,
            role: Role::Free,
            sweep: None,
        }
    }

    /// a parameter fitted jointly across the datasets that share it
    pub fn shared(name: ParameterName, value: f64, lower: f64, upper: f64) -> Self {
        Self {
            role: Role::Shared,
            ..Self::free(name, value, lower, upper)
        }
    }

    /// a parameter held at `value`
    pub fn fixed(name: ParameterName, value: f64) -> Self {
        Self {
            role: Role::Fixed,
            ..Self::free(name, value, value, value)
        }
    }

    /// mark the parameter for a brute-force sweep
    pub fn with_sweep(self, sweep: Sweep) -> Self {
        Self {
            sweep: Some(sweep),
            ..self
        }
    }
}

/// All parameter specifications of a single dataset.
///
/// Parameters that are not mentioned are fixed at zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    specs: Vec<ParameterSpec>,
}

impl ParameterSet {
    /// an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// add a specification
    pub fn with(mut self, spec: ParameterSpec) -> Self {
        self.specs.push(spec);
        self
    }

    /// add a specification in place
    pub fn push(&mut self, spec: ParameterSpec) {
        self.specs.push(spec);
    }

    /// the specifications in insertion order
    pub fn specs(&self) -> &[ParameterSpec] {
        &self.specs
    }

    /// the specification of `name`, if given
    pub fn get(&self, name: ParameterName) -> Option<&ParameterSpec> {
        self.specs.iter().find(|spec| spec.name == name)
    }
}

impl FromIterator<ParameterSpec> for ParameterSet {
    fn from_iter<T: IntoIterator<Item = ParameterSpec>>(iter: T) -> Self {
        Self {
            specs: iter.into_iter().collect(),
        }
    }
}

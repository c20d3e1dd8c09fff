//! Experimental data: R1rho rates or the decay intensities they are derived
//! from, together with the conditions under which they were measured.
use crate::model::{Alignment, SpinlockCondition};
use crate::parameters::SetupError;
use nalgebra::DVector;
use rand::seq::index::sample;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};


/// Number of delays of an automatic relaxation delay schedule.
pub const AUTOMATIC_DELAY_COUNT: usize = 51;
/// Bounds for the longest delay of an automatic schedule, in seconds.
pub const AUTOMATIC_DELAY_RANGE: (f64, f64) = (1e-3, 1.);
const FALLBACK_MAX_DELAY: f64 = 0.1;

/// A measured R1rho rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelaxationPoint {
    /// the spinlock under which the rate was measured
    pub condition: SpinlockCondition,
    /// R1rho in 1/s
    pub r1rho: f64,
    /// uncertainty of the rate; zero or non-finite for unweighted data
    pub error: f64,
}

impl RelaxationPoint {
    /// a rate measured at `offset` Hz with a `power` Hz spinlock
    pub fn new(offset: f64, power: f64, r1rho: f64, error: f64) -> Self {
        Self {
            condition: SpinlockCondition::new(offset, power),
            r1rho,
            error,
        }
    }
}

/// The intensities of one decay measured at a series of delays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecayCurve {
    /// the spinlock under which the decay was measured
    pub condition: SpinlockCondition,
    /// relaxation delays in seconds
    pub delays: Vec<f64>,
    /// intensities normalized to the initial magnetization
    pub intensities: Vec<f64>,
    /// uncertainties of the intensities
    pub errors: Vec<f64>,
}

/// The observations of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Observations {
    /// R1rho rates
    Relaxation(Vec<RelaxationPoint>),
    /// decay intensities
    Intensity(Vec<DecayCurve>),
}

/// How the relaxation delays for simulating R1rho rates are chosen.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum RelaxationDelays {
    /// 51 delays from zero to the inverse of the smallest observed rate,
    /// limited to between 1 ms and 1 s
    #[default]
    Automatic,
    /// `count` evenly spaced delays from zero to `max` seconds
    Linear {
        /// the longest delay
        max: f64,
        /// number of delays
        count: usize,
    },
}

impl RelaxationDelays {
    /// The schedule from zero to `max` in steps of `increment` seconds.
    pub fn from_increment(increment: f64, max: f64) -> Self {
        let count = if increment > 0. && max > 0. {
            (max / increment).round() as usize + 1
        } else {
            0
        };
        RelaxationDelays::Linear { max, count }
    }

    fn resolve(&self, observations: &Observations) -> DVector<f64> {
        match self {
            RelaxationDelays::Linear { max, count } => linear_delays(*max, *count),
            RelaxationDelays::Automatic => {
                let slowest = match observations {
                    Observations::Relaxation(points) => points
                        .iter()
                        .map(|point| point.r1rho)
                        .filter(|r| r.is_finite() && *r > 0.)
                        .fold(f64::INFINITY, f64::min),
                    Observations::Intensity(_) => f64::INFINITY,
                };
                let max = if slowest.is_finite() {
                    (1. / slowest).clamp(AUTOMATIC_DELAY_RANGE.0, AUTOMATIC_DELAY_RANGE.1)
                } else {
                    FALLBACK_MAX_DELAY
                };
                linear_delays(max, AUTOMATIC_DELAY_COUNT)
            }
        }
    }
}

fn linear_delays(max: f64, count: usize) -> DVector<f64> {
    match count {
        0 => DVector::zeros(0),
        1 => DVector::from_element(1, 0.),
        _ => DVector::from_iterator(count, (0..count).map(|i| max * i as f64 / (count - 1) as f64)),
    }
}

/// One dataset: the observations of one spin at one field strength.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    name: String,
    larmor: f64,
    alignment: Alignment,
    observations: Observations,
    schedule: RelaxationDelays,
    delays: DVector<f64>,
}

impl Dataset {
    /// A dataset of R1rho rates measured at a Larmor frequency of `larmor`
    /// MHz. Uses automatic relaxation delays and alignment.
    pub fn relaxation(name: impl Into<String>, larmor: f64, points: Vec<RelaxationPoint>) -> Self {
        Self::with_observations(name, larmor, Observations::Relaxation(points))
    }

    /// A dataset of decay intensities measured at a Larmor frequency of
    /// `larmor` MHz.
    pub fn intensity(name: impl Into<String>, larmor: f64, curves: Vec<DecayCurve>) -> Self {
        Self::with_observations(name, larmor, Observations::Intensity(curves))
    }

    fn with_observations(name: impl Into<String>, larmor: f64, observations: Observations) -> Self {
        let schedule = RelaxationDelays::Automatic;
        let delays = schedule.resolve(&observations);
        Self {
            name: name.into(),
            larmor,
            alignment: Alignment::Auto,
            observations,
            schedule,
            delays,
        }
    }

    /// set the magnetization alignment
    pub fn with_alignment(self, alignment: Alignment) -> Self {
        Self { alignment, ..self }
    }

    /// set the relaxation delay schedule used to simulate rates
    pub fn with_delays(self, schedule: RelaxationDelays) -> Self {
        let delays = schedule.resolve(&self.observations);
        Self {
            schedule,
            delays,
            ..self
        }
    }

    /// name used in the fit records
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Larmor frequency in MHz
    pub fn larmor(&self) -> f64 {
        self.larmor
    }

    /// the magnetization alignment
    pub fn alignment(&self) -> Alignment {
        self.alignment
    }

    /// the observations
    pub fn observations(&self) -> &Observations {
        &self.observations
    }

    /// the delay schedule used to simulate rates
    pub fn schedule(&self) -> &RelaxationDelays {
        &self.schedule
    }

    /// the resolved delays used to simulate rates
    pub fn delays(&self) -> &DVector<f64> {
        &self.delays
    }

    /// true for decay intensities
    pub fn is_intensity(&self) -> bool {
        matches!(self.observations, Observations::Intensity(_))
    }

    fn errors(&self) -> Box<dyn Iterator<Item = f64> + '_> {
        match &self.observations {
            Observations::Relaxation(points) => Box::new(points.iter().map(|point| point.error)),
            Observations::Intensity(curves) => {
                Box::new(curves.iter().flat_map(|curve| curve.errors.iter().copied()))
            }
        }
    }

    /// Weighted fits need a finite, positive uncertainty for every data point.
    pub fn is_weighted(&self) -> bool {
        let mut errors = self.errors().peekable();
        errors.peek().is_some() && errors.all(|e| e.is_finite() && e > 0.)
    }

    /// sum of all finite uncertainties
    pub fn error_sum(&self) -> f64 {
        self.errors().filter(|e| e.is_finite()).sum()
    }

    /// number of rates, or total number of intensities
    pub fn data_point_count(&self) -> usize {
        match &self.observations {
            Observations::Relaxation(points) => points.len(),
            Observations::Intensity(curves) => curves.iter().map(|curve| curve.delays.len()).sum(),
        }
    }

    /// Check the dataset for use in a fit. `index` is only used for the error.
    pub fn validate(&self, index: usize) -> Result<(), SetupError> {
        let invalid = |reason: String| SetupError::InvalidData {
            dataset: index,
            reason,
        };
        if !(self.larmor.is_finite() && self.larmor > 0.) {
            return Err(invalid(format!("invalid Larmor frequency {}", self.larmor)));
        }
        if self.data_point_count() == 0 {
            return Err(invalid("no observations".into()));
        }
        match &self.observations {
            Observations::Relaxation(points) => {
                if let Some(point) = points.iter().find(|p| {
                    !(p.r1rho.is_finite() && p.condition.offset.is_finite() && p.condition.power.is_finite())
                }) {
                    return Err(invalid(format!("non-finite observation {point:?}")));
                }
                // the unweighted chi-square divides by the observed rate
                if !self.is_weighted() {
                    if let Some(point) = points.iter().find(|p| p.r1rho <= 0.) {
                        return Err(invalid(format!(
                            "unweighted rates must be positive, got {} 1/s",
                            point.r1rho
                        )));
                    }
                }
                let distinct = self.delays.iter().any(|t| *t != self.delays[0]);
                if self.delays.len() < 2 || !distinct {
                    return Err(invalid("at least two distinct relaxation delays are required".into()));
                }
                if self.delays.iter().any(|t| !t.is_finite() || *t < 0.) {
                    return Err(invalid("relaxation delays must be finite and non-negative".into()));
                }
            }
            Observations::Intensity(curves) => {
                for (number, curve) in curves.iter().enumerate() {
                    let n = curve.delays.len();
                    if curve.intensities.len() != n || curve.errors.len() != n {
                        return Err(invalid(format!(
                            "decay curve {number} has {n} delays, {} intensities and {} errors",
                            curve.intensities.len(),
                            curve.errors.len()
                        )));
                    }
                    let finite = curve.intensities.iter().all(|v| v.is_finite())
                        && curve.delays.iter().all(|t| t.is_finite() && *t >= 0.);
                    if !finite {
                        return Err(invalid(format!("decay curve {number} has invalid values")));
                    }
                }
            }
        }
        Ok(())
    }

    /// A copy in which every observation with a finite, non-negative
    /// uncertainty is replaced by a draw from a normal distribution centered
    /// on it. The relaxation delays stay those of the original.
    pub fn corrupted<R: Rng + ?Sized>(&self, rng: &mut R) -> Dataset {
        let mut draw = |value: f64, error: f64| match Normal::new(value, error) {
            Ok(normal) if error.is_finite() && error >= 0. => normal.sample(&mut *rng),
            _ => value,
        };
        let observations = match &self.observations {
            Observations::Relaxation(points) => Observations::Relaxation(
                points
                    .iter()
                    .map(|point| RelaxationPoint {
                        r1rho: draw(point.r1rho, point.error),
                        ..*point
                    })
                    .collect(),
            ),
            Observations::Intensity(curves) => Observations::Intensity(
                curves
                    .iter()
                    .map(|curve| DecayCurve {
                        intensities: curve
                            .intensities
                            .iter()
                            .zip(curve.errors.iter())
                            .map(|(&value, &error)| draw(value, error))
                            .collect(),
                        ..curve.clone()
                    })
                    .collect(),
            ),
        };
        Dataset {
            observations,
            ..self.clone()
        }
    }

    /// A copy with a randomly chosen `fraction` of the rates (or of the decay
    /// curves) removed. The relaxation delays are resolved again for the
    /// remaining data.
    pub fn thinned<R: Rng + ?Sized>(&self, fraction: f64, rng: &mut R) -> Dataset {
        fn keep<T: Clone, R: Rng + ?Sized>(items: &[T], fraction: f64, rng: &mut R) -> Vec<T> {
            let remove = ((items.len() as f64) * fraction.clamp(0., 1.)).round() as usize;
            let mut kept: Vec<usize> = sample(rng, items.len(), items.len() - remove).into_vec();
            kept.sort_unstable();
            kept.into_iter().map(|i| items[i].clone()).collect()
        }
        let observations = match &self.observations {
            Observations::Relaxation(points) => Observations::Relaxation(keep(points, fraction, rng)),
            Observations::Intensity(curves) => Observations::Intensity(keep(curves, fraction, rng)),
        };
        let delays = self.schedule.resolve(&observations);
        Dataset {
            observations,
            delays,
            ..self.clone()
        }
    }
}

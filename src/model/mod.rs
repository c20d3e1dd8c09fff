//! Simulation of R1rho relaxation under a spinlock for a spin exchanging
//! between two or three states.
//!
//! The [BlochMcConnell] simulator builds the rate matrix of the coupled Bloch
//! equations for the ground state A and the excited states B and C, prepares
//! the magnetization along the effective field, propagates it over a series
//! of relaxation delays and either reports the projected intensities or the
//! decay rate of a monoexponential fit to them.
//!
//! The closed-form [laguerre_r1rho] equation is an alternative for two-state
//! exchange.
use crate::parameters::{KeywordError, ParameterName};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::str::FromStr;
use thiserror::Error as ThisError;

mod laguerre;
mod propagation;
mod rate_matrix;


pub use laguerre::laguerre_r1rho;
pub use rate_matrix::ExchangeRates;

use propagation::{monoexponential_rate, propagate};
use rate_matrix::{rate_matrix, StateFrame};

/// Errors of a single simulation. They invalidate the prediction for one
/// observation but never abort a fit.
#[derive(Debug, Clone, ThisError, PartialEq)]
pub enum SimulationError {
    /// the ground state population `1 - pB - pC` is not positive, or a
    /// population is negative
    #[error("Invalid populations: pA = {pa}, pB = {pb}, pC = {pc}")]
    InvalidPopulation {
        /// ground state population
        pa: f64,
        /// population of B
        pb: f64,
        /// population of C
        pc: f64,
    },

    /// an input or intermediate value is not finite
    #[error("Simulation produced a non-finite value")]
    NonFinite,

    /// the magnetization decayed to zero or below, so no logarithm exists
    #[error("Non-positive magnetization {intensity} at delay {delay} s")]
    NonPositiveMagnetization {
        /// the delay in seconds
        delay: f64,
        /// the simulated intensity
        intensity: f64,
    },

    /// the decay rate needs at least two distinct delays
    #[error("At least two distinct relaxation delays are required")]
    TooFewDelays,

    /// delays must be finite and non-negative
    #[error("Invalid relaxation delay {0}")]
    InvalidDelay(f64),

    /// the closed-form equation only describes two-state exchange
    #[error("The Laguerre equation cannot describe a populated third state")]
    UnsupportedThirdState,
}

/// The parameters of the exchange model for a single dataset.
///
/// Populations are fractions of the total, `dwb` and `dwc` are the chemical
/// shift differences of B and C relative to A in ppm, exchange and relaxation
/// rates are given in 1/s.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct PhysicalParameters {
    pub pb: f64,
    pub pc: f64,
    pub dwb: f64,
    pub dwc: f64,
    pub kex_ab: f64,
    pub kex_ac: f64,
    pub kex_bc: f64,
    pub r1: f64,
    pub r1b: f64,
    pub r1c: f64,
    pub r2: f64,
    pub r2b: f64,
    pub r2c: f64,
}

impl PhysicalParameters {
    /// the value of the parameter `name`
    pub fn get(&self, name: ParameterName) -> f64 {
        match name {
            ParameterName::Pb => self.pb,
            ParameterName::Pc => self.pc,
            ParameterName::DwB => self.dwb,
            ParameterName::DwC => self.dwc,
            ParameterName::KexAB => self.kex_ab,
            ParameterName::KexAC => self.kex_ac,
            ParameterName::KexBC => self.kex_bc,
            ParameterName::R1 => self.r1,
            ParameterName::R1b => self.r1b,
            ParameterName::R1c => self.r1c,
            ParameterName::R2 => self.r2,
            ParameterName::R2b => self.r2b,
            ParameterName::R2c => self.r2c,
        }
    }

    /// set the parameter `name` to `value`
    pub fn set(&mut self, name: ParameterName, value: f64) {
        let field = match name {
            ParameterName::Pb => &mut self.pb,
            ParameterName::Pc => &mut self.pc,
            ParameterName::DwB => &mut self.dwb,
            ParameterName::DwC => &mut self.dwc,
            ParameterName::KexAB => &mut self.kex_ab,
            ParameterName::KexAC => &mut self.kex_ac,
            ParameterName::KexBC => &mut self.kex_bc,
            ParameterName::R1 => &mut self.r1,
            ParameterName::R1b => &mut self.r1b,
            ParameterName::R1c => &mut self.r1c,
            ParameterName::R2 => &mut self.r2,
            ParameterName::R2b => &mut self.r2b,
            ParameterName::R2c => &mut self.r2c,
        };
        *field = value;
    }

    /// the ground state population `1 - pB - pC`
    pub fn pa(&self) -> f64 {
        1. - self.pb - self.pc
    }

    /// true if the third state takes part in the exchange
    pub fn has_third_state(&self) -> bool {
        self.pc != 0. || self.kex_ac != 0. || self.kex_bc != 0.
    }

    /// the parameters in [ParameterName::ALL] order
    pub fn to_array(&self) -> [f64; ParameterName::COUNT] {
        ParameterName::ALL.map(|name| self.get(name))
    }

    pub(crate) fn populations(&self) -> Result<[f64; 3], SimulationError> {
        let pa = self.pa();
        let all_finite = self.to_array().iter().all(|v| v.is_finite());
        if !all_finite {
            return Err(SimulationError::NonFinite);
        }
        if pa <= 0. || self.pb < 0. || self.pc < 0. {
            return Err(SimulationError::InvalidPopulation {
                pa,
                pb: self.pb,
                pc: self.pc,
            });
        }
        Ok([pa, self.pb, self.pc])
    }
}

/// The experimental conditions of one R1rho measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpinlockCondition {
    /// carrier offset from the ground state resonance in Hz
    pub offset: f64,
    /// spinlock field strength `$\omega_1/2\pi$` in Hz
    pub power: f64,
}

impl SpinlockCondition {
    /// a spinlock of `power` Hz placed `offset` Hz from the ground state
    pub fn new(offset: f64, power: f64) -> Self {
        Self { offset, power }
    }
}

/// How the magnetization is aligned before the spinlock and which direction
/// is observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    /// along the effective field of the ground state
    Ground,
    /// along the effective field of the population-weighted average resonance
    Average,
    /// chosen per simulation from the exchange regime
    #[default]
    Auto,
}

impl FromStr for Alignment {
    type Err = KeywordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gs" | "ground" => Ok(Alignment::Ground),
            "avg" | "average" => Ok(Alignment::Average),
            "auto" => Ok(Alignment::Auto),
            other => Err(KeywordError::new("alignment", other)),
        }
    }
}

/// Exchange regime relative to the chemical shift differences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeRegime {
    /// exchange slower than the shift difference
    Slow,
    /// exchange faster than the shift difference
    Fast,
}

/// Decides the exchange regime for [Alignment::Auto]. The arguments are the
/// parameters and the Larmor frequency in MHz.
pub type RegimeClassifier = fn(&PhysicalParameters, f64) -> ExchangeRegime;

/// The default [RegimeClassifier]: exchange is fast if for any populated
/// excited state the exchange rate with A exceeds the shift difference to A
/// in rad/s.
pub fn classify_by_exchange_ratio(parameters: &PhysicalParameters, larmor: f64) -> ExchangeRegime {
    let excited = [
        (parameters.pb, parameters.kex_ab, parameters.dwb),
        (parameters.pc, parameters.kex_ac, parameters.dwc),
    ];
    let ratio = excited
        .iter()
        .filter(|(population, _, _)| *population > 0.)
        .map(|&(_, kex, dw)| {
            let shift = (2. * PI * dw * larmor).abs();
            if shift == 0. {
                f64::INFINITY
            } else {
                kex / shift
            }
        })
        .fold(0., f64::max);
    if ratio > 1. {
        ExchangeRegime::Fast
    } else {
        ExchangeRegime::Slow
    }
}

/// The equation used to predict R1rho values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitEquation {
    /// numerical propagation of the Bloch-McConnell equations
    #[default]
    BlochMcConnell,
    /// the closed-form two-state approximation of [laguerre_r1rho]
    Laguerre,
}

impl FromStr for FitEquation {
    type Err = KeywordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bm" | "blochmcconnell" => Ok(FitEquation::BlochMcConnell),
            "lag" | "laguerre" => Ok(FitEquation::Laguerre),
            other => Err(KeywordError::new("fit equation", other)),
        }
    }
}

/// Numerical simulator of spinlock relaxation.
#[derive(Debug, Clone, Copy)]
pub struct BlochMcConnell {
    classifier: RegimeClassifier,
}

impl Default for BlochMcConnell {
    fn default() -> Self {
        Self::new()
    }
}

impl BlochMcConnell {
    /// a simulator using [classify_by_exchange_ratio] for [Alignment::Auto]
    pub fn new() -> Self {
        Self {
            classifier: classify_by_exchange_ratio,
        }
    }

    /// replace the classifier used for [Alignment::Auto]
    pub fn with_regime_classifier(self, classifier: RegimeClassifier) -> Self {
        Self { classifier }
    }

    /// The tilt angle of the effective field the magnetization is aligned
    /// with and projected onto.
    pub fn alignment_angle(
        &self,
        parameters: &PhysicalParameters,
        condition: &SpinlockCondition,
        larmor: f64,
        alignment: Alignment,
    ) -> Result<f64, SimulationError> {
        let frame = StateFrame::new(parameters, condition, larmor)?;
        Ok(self.angle_in_frame(&frame, parameters, larmor, alignment))
    }

    fn angle_in_frame(
        &self,
        frame: &StateFrame,
        parameters: &PhysicalParameters,
        larmor: f64,
        alignment: Alignment,
    ) -> f64 {
        let alignment = match alignment {
            Alignment::Auto => match (self.classifier)(parameters, larmor) {
                ExchangeRegime::Slow => Alignment::Ground,
                ExchangeRegime::Fast => Alignment::Average,
            },
            other => other,
        };
        match alignment {
            Alignment::Average => frame.omega1.atan2(frame.average_offset()),
            _ => frame.omega1.atan2(frame.offsets[0]),
        }
    }

    /// Simulate the observed intensity at each of the `delays` (in seconds),
    /// relative to a unit initial magnetization. The delays need not be
    /// sorted; the intensities are returned in the order of the delays.
    pub fn intensities(
        &self,
        parameters: &PhysicalParameters,
        condition: &SpinlockCondition,
        larmor: f64,
        delays: &DVector<f64>,
        alignment: Alignment,
    ) -> Result<DVector<f64>, SimulationError> {
        if let Some(&delay) = delays.iter().find(|t| !t.is_finite() || **t < 0.) {
            return Err(SimulationError::InvalidDelay(delay));
        }
        let frame = StateFrame::new(parameters, condition, larmor)?;
        let theta = self.angle_in_frame(&frame, parameters, larmor, alignment);
        let states = frame.state_count();
        let (sin, cos) = theta.sin_cos();

        let mut initial = DVector::zeros(3 * states);
        let mut projection = DVector::zeros(3 * states);
        for state in 0..states {
            initial[3 * state] = frame.populations[state] * sin;
            initial[3 * state + 2] = frame.populations[state] * cos;
            projection[3 * state] = sin;
            projection[3 * state + 2] = cos;
        }

        let rates = ExchangeRates::from_parameters(parameters, &frame.populations);
        let matrix = rate_matrix(parameters, &frame, &rates);
        let trace = propagate(&matrix, &initial, &projection, delays);
        if trace.iter().all(|v| v.is_finite()) {
            Ok(trace)
        } else {
            Err(SimulationError::NonFinite)
        }
    }

    /// Simulate the R1rho rate as the negative slope of a straight line fit
    /// to the logarithm of the intensities at the given delays.
    pub fn r1rho(
        &self,
        parameters: &PhysicalParameters,
        condition: &SpinlockCondition,
        larmor: f64,
        delays: &DVector<f64>,
        alignment: Alignment,
    ) -> Result<f64, SimulationError> {
        let trace = self.intensities(parameters, condition, larmor, delays, alignment)?;
        monoexponential_rate(delays, &trace)
    }
}

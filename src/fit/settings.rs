use crate::parameters::KeywordError;
use crate::solvers::ampgo::{AmpgoSettings, TabuStrategy};
use crate::solvers::levmar::LocalSettings;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What kind of fit to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FitMode {
    /// a bounded least squares fit of relaxation rates
    #[default]
    #[serde(rename = "local")]
    Local,
    /// a global search with AMPGO, polished by a local fit
    #[serde(rename = "global")]
    Global,
    /// a local fit of decay intensities
    #[serde(rename = "localint")]
    LocalIntensity,
    /// scoring of a parameter grid, refined from its best point
    #[serde(rename = "brute")]
    Brute,
    /// like [FitMode::Brute], flagging every grid point for plotting
    #[serde(rename = "brutep")]
    BrutePlot,
}

impl FitMode {
    /// the keyword of the mode
    pub fn as_str(self) -> &'static str {
        match self {
            FitMode::Local => "local",
            FitMode::Global => "global",
            FitMode::LocalIntensity => "localint",
            FitMode::Brute => "brute",
            FitMode::BrutePlot => "brutep",
        }
    }

    /// true for the modes fitting decay intensities
    pub fn fits_intensities(self) -> bool {
        self == FitMode::LocalIntensity
    }

    /// true for the brute-force modes
    pub fn is_brute(self) -> bool {
        matches!(self, FitMode::Brute | FitMode::BrutePlot)
    }
}

impl fmt::Display for FitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FitMode {
    type Err = KeywordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(FitMode::Local),
            "global" => Ok(FitMode::Global),
            "localint" => Ok(FitMode::LocalIntensity),
            "brute" => Ok(FitMode::Brute),
            "brutep" => Ok(FitMode::BrutePlot),
            _ => Err(KeywordError::new("fit mode", s.trim())),
        }
    }
}

/// Settings of a fit run.
///
/// All fields have defaults, so a configuration only needs to name what it
/// changes. The global optimizer defaults to 10 global iterations of at
/// most 5 tunnelling phases, a tabu list of 8 points and a budget of 2000
/// evaluations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitSettings {
    /// the kind of fit
    pub mode: FitMode,
    /// how often the fit is repeated
    pub loops: usize,
    /// start every loop from a point drawn uniformly within the bounds
    pub random_start: bool,
    /// number of Monte-Carlo refits for the error estimation; analytic errors
    /// are reported if unset
    pub monte_carlo: Option<usize>,
    /// seed of the random number generator; drawn from the operating system
    /// if unset
    pub seed: Option<u64>,
    /// size of the worker pool of the brute-force modes; all available
    /// cores if unset
    pub threads: Option<usize>,
    /// settings of every local least squares fit
    pub local: LocalSettings,
    /// settings of the global optimizer
    pub global: AmpgoSettings,
}

impl Default for FitSettings {
    fn default() -> Self {
        Self {
            mode: FitMode::default(),
            loops: 1,
            random_start: false,
            monte_carlo: None,
            seed: None,
            threads: None,
            local: LocalSettings::default(),
            global: AmpgoSettings::default()
                .with_total_iterations(10)
                .with_tunnelling_iterations(5)
                .with_tabu_list(8, TabuStrategy::Farthest)
                .with_max_function_evaluations(2000),
        }
    }
}

impl FitSettings {
    /// set the kind of fit
    pub fn with_mode(self, mode: FitMode) -> Self {
        Self { mode, ..self }
    }

    /// set the number of repetitions
    pub fn with_loops(self, loops: usize) -> Self {
        Self { loops, ..self }
    }

    /// start each loop from a random point
    pub fn with_random_start(self, random_start: bool) -> Self {
        Self {
            random_start,
            ..self
        }
    }

    /// estimate errors from `iterations` Monte-Carlo refits
    pub fn with_monte_carlo(self, iterations: usize) -> Self {
        Self {
            monte_carlo: Some(iterations),
            ..self
        }
    }

    /// seed the random number generator
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..self
        }
    }

    /// set the size of the brute-force worker pool
    pub fn with_threads(self, threads: usize) -> Self {
        Self {
            threads: Some(threads),
            ..self
        }
    }

    /// set the settings of the local fits
    pub fn with_local(self, local: LocalSettings) -> Self {
        Self { local, ..self }
    }

    /// set the settings of the global optimizer
    pub fn with_global(self, global: AmpgoSettings) -> Self {
        Self { global, ..self }
    }
}

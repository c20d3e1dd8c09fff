use super::KeywordError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The physical parameters of the three-state exchange model.
///
/// Populations are fractions, chemical shift differences are given in ppm
/// relative to the ground state A, exchange rates and relaxation rates in
/// 1/s. The order of the variants is the order in which parameters appear in
/// exported records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ParameterName {
    /// population of the excited state B
    #[serde(rename = "pB")]
    Pb,
    /// population of the excited state C
    #[serde(rename = "pC")]
    Pc,
    /// shift difference of B relative to A in ppm
    #[serde(rename = "dwB")]
    DwB,
    /// shift difference of C relative to A in ppm
    #[serde(rename = "dwC")]
    DwC,
    /// exchange rate between A and B
    #[serde(rename = "kexAB")]
    KexAB,
    /// exchange rate between A and C
    #[serde(rename = "kexAC")]
    KexAC,
    /// exchange rate between B and C
    #[serde(rename = "kexBC")]
    KexBC,
    /// longitudinal relaxation rate of A
    R1,
    /// longitudinal relaxation rate of B
    R1b,
    /// longitudinal relaxation rate of C
    R1c,
    /// transverse relaxation rate of A
    R2,
    /// transverse relaxation rate of B
    R2b,
    /// transverse relaxation rate of C
    R2c,
}

impl ParameterName {
    /// number of distinct parameter names
    pub const COUNT: usize = 13;

    /// all names in record order
    pub const ALL: [ParameterName; Self::COUNT] = [
        ParameterName::Pb,
        ParameterName::Pc,
        ParameterName::DwB,
        ParameterName::DwC,
        ParameterName::KexAB,
        ParameterName::KexAC,
        ParameterName::KexBC,
        ParameterName::R1,
        ParameterName::R1b,
        ParameterName::R1c,
        ParameterName::R2,
        ParameterName::R2b,
        ParameterName::R2c,
    ];

    /// the conventional spelling of the name, e.g. `kexAB`
    pub fn as_str(self) -> &'static str {
        match self {
            ParameterName::Pb => "pB",
            ParameterName::Pc => "pC",
            ParameterName::DwB => "dwB",
            ParameterName::DwC => "dwC",
            ParameterName::KexAB => "kexAB",
            ParameterName::KexAC => "kexAC",
            ParameterName::KexBC => "kexBC",
            ParameterName::R1 => "R1",
            ParameterName::R1b => "R1b",
            ParameterName::R1c => "R1c",
            ParameterName::R2 => "R2",
            ParameterName::R2b => "R2b",
            ParameterName::R2c => "R2c",
        }
    }

    /// position of the name in [ParameterName::ALL]
    pub fn index(self) -> usize {
        self as usize
    }

    /// For the relaxation rates of the excited states, the ground state rate
    /// they fall back to when they are fixed at zero.
    pub fn primary(self) -> Option<ParameterName> {
        match self {
            ParameterName::R1b | ParameterName::R1c => Some(ParameterName::R1),
            ParameterName::R2b | ParameterName::R2c => Some(ParameterName::R2),
            _ => None,
        }
    }
}

impl fmt::Display for ParameterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParameterName {
    type Err = KeywordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        ParameterName::ALL
            .into_iter()
            .find(|name| name.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| KeywordError::new("parameter name", trimmed))
    }
}

use super::{PhysicalParameters, SimulationError, SpinlockCondition};
use nalgebra::DMatrix;
use std::f64::consts::PI;

/// Resonance offsets and the spinlock field of each state, in rad/s.
#[derive(Debug, Clone)]
pub(crate) struct StateFrame {
    /// `[pA, pB, pC]`
    pub populations: [f64; 3],
    /// offsets of the carrier from the resonances of A, B and C
    pub offsets: [f64; 3],
    pub omega1: f64,
    three_state: bool,
}

impl StateFrame {
    pub fn new(
        parameters: &PhysicalParameters,
        condition: &SpinlockCondition,
        larmor: f64,
    ) -> Result<Self, SimulationError> {
        let populations = parameters.populations()?;
        if !(condition.offset.is_finite() && condition.power.is_finite() && larmor.is_finite()) {
            return Err(SimulationError::NonFinite);
        }
        let offset = |dw: f64| 2. * PI * (condition.offset - dw * larmor);
        Ok(Self {
            populations,
            offsets: [offset(0.), offset(parameters.dwb), offset(parameters.dwc)],
            omega1: 2. * PI * condition.power,
            three_state: parameters.has_third_state(),
        })
    }

    pub fn state_count(&self) -> usize {
        if self.three_state {
            3
        } else {
            2
        }
    }

    /// population weighted offset of all states
    pub fn average_offset(&self) -> f64 {
        self.populations
            .iter()
            .zip(self.offsets.iter())
            .map(|(p, omega)| p * omega)
            .sum()
    }
}

/// Unidirectional exchange rates between the states, in 1/s.
///
/// The rates satisfy detailed balance: `k12 pA = k21 pB` and likewise for the
/// other pairs.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[allow(missing_docs)]
pub struct ExchangeRates {
    pub k12: f64,
    pub k21: f64,
    pub k13: f64,
    pub k31: f64,
    pub k23: f64,
    pub k32: f64,
}

impl ExchangeRates {
    /// Split the exchange rates of `parameters` into forward and backward
    /// rates using the populations `[pA, pB, pC]`.
    pub fn from_parameters(parameters: &PhysicalParameters, populations: &[f64; 3]) -> Self {
        let [pa, pb, pc] = *populations;
        Self {
            k12: directional_rate(parameters.kex_ab, pb, pa),
            k21: directional_rate(parameters.kex_ab, pa, pb),
            k13: directional_rate(parameters.kex_ac, pc, pa),
            k31: directional_rate(parameters.kex_ac, pa, pc),
            k23: directional_rate(parameters.kex_bc, pc, pb),
            k32: directional_rate(parameters.kex_bc, pb, pc),
        }
    }

    /// `rates[i][j]` is the rate from state `i` to state `j`
    fn as_table(&self) -> [[f64; 3]; 3] {
        [
            [0., self.k12, self.k13],
            [self.k21, 0., self.k23],
            [self.k31, self.k32, 0.],
        ]
    }
}

/// The rate towards the state with population `target` out of the pair
/// exchanging at `kex`. Zero if the pair is unpopulated.
fn directional_rate(kex: f64, target: f64, source: f64) -> f64 {
    let total = target + source;
    if total == 0. {
        0.
    } else {
        kex * target / total
    }
}

/// The Bloch-McConnell rate matrix `L` with `dM/dt = L M`, where the
/// magnetization is ordered `(x, y, z)` per state.
pub(crate) fn rate_matrix(
    parameters: &PhysicalParameters,
    frame: &StateFrame,
    rates: &ExchangeRates,
) -> DMatrix<f64> {
    let states = frame.state_count();
    let r1 = [parameters.r1, parameters.r1b, parameters.r1c];
    let r2 = [parameters.r2, parameters.r2b, parameters.r2c];
    let table = rates.as_table();
    let mut matrix = DMatrix::zeros(3 * states, 3 * states);

    for state in 0..states {
        let base = 3 * state;
        let omega = frame.offsets[state];
        matrix[(base, base)] = -r2[state];
        matrix[(base, base + 1)] = -omega;
        matrix[(base + 1, base)] = omega;
        matrix[(base + 1, base + 1)] = -r2[state];
        matrix[(base + 1, base + 2)] = -frame.omega1;
        matrix[(base + 2, base + 1)] = frame.omega1;
        matrix[(base + 2, base + 2)] = -r1[state];

        let outgoing: f64 = (0..states).map(|target| table[state][target]).sum();
        for component in 0..3 {
            matrix[(base + component, base + component)] -= outgoing;
            for source in (0..states).filter(|&source| source != state) {
                matrix[(base + component, 3 * source + component)] += table[source][state];
            }
        }
    }
    matrix
}

use super::{PhysicalParameters, SimulationError, SpinlockCondition};
use std::f64::consts::PI;

/// R1rho of two-state exchange from the closed-form equation of Miloushev and
/// Palmer (J. Magn. Reson. 177, 2005).
///
/// Uses the ground state rates `R1` and `R2` for both states and is aligned
/// with the population-weighted effective field. Fails for parameters with a
/// third state.
pub fn laguerre_r1rho(
    parameters: &PhysicalParameters,
    condition: &SpinlockCondition,
    larmor: f64,
) -> Result<f64, SimulationError> {
    if parameters.has_third_state() {
        return Err(SimulationError::UnsupportedThirdState);
    }
    let [pa, pb, _] = parameters.populations()?;

    let dw = 2. * PI * parameters.dwb * larmor;
    let w1 = 2. * PI * condition.power;
    let omega_a = 2. * PI * condition.offset;
    let omega_b = omega_a - dw;
    let omega_avg = pa * omega_a + pb * omega_b;

    let wa2 = omega_a * omega_a + w1 * w1;
    let wb2 = omega_b * omega_b + w1 * w1;
    let we2 = omega_avg * omega_avg + w1 * w1;
    let sin2 = w1 * w1 / we2;
    let cos2 = omega_avg * omega_avg / we2;

    let kex = parameters.kex_ab;
    let kex2 = kex * kex;
    let pp_dw2 = pa * pb * dw * dw;

    let correction = 1. + 2. * kex2 * (pa * wa2 + pb * wb2) / (wa2 * wb2 + we2 * kex2);
    let denominator = wa2 * wb2 / we2 + kex2 - sin2 * pp_dw2 * correction;
    let exchange = sin2 * pp_dw2 * kex / denominator;

    let r1rho = parameters.r1 * cos2 + parameters.r2 * sin2 + exchange;
    if r1rho.is_finite() {
        Ok(r1rho)
    } else {
        Err(SimulationError::NonFinite)
    }
}

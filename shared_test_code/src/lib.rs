#![warn(missing_docs)]
//! a helper crate which carries common code used by the benchtests and the
//! integration tests.
use bmns::prelude::*;
use nalgebra::{DVector, Scalar};
use num_traits::Float;

/// Larmor frequency of the synthetic datasets in MHz
pub const LARMOR: f64 = 150.8;

/// uncertainty assigned to every synthetic rate
pub const RATE_ERROR: f64 = 0.5;

/// create holding `count` the elements from range [first,last] with linear spacing. (equivalent to matlabs linspace)
pub fn linspace<ScalarType: Float + Scalar>(
    first: ScalarType,
    last: ScalarType,
    count: usize,
) -> DVector<ScalarType> {
    if count < 2 {
        return DVector::from_element(count, first);
    }
    let n_minus_one = ScalarType::from(count - 1).expect("Could not convert usize to Float");
    let lin: Vec<ScalarType> = (0..count)
        .map(|n| {
            first
                + (last - first) / (n_minus_one)
                    * ScalarType::from(n).expect("Could not convert usize to Float")
        })
        .collect();
    DVector::from(lin)
}

/// the relaxation delays the synthetic rates are simulated with
pub fn delay_schedule() -> RelaxationDelays {
    RelaxationDelays::Linear {
        max: 0.1,
        count: 21,
    }
}

/// two-state exchange in the slow regime:
/// pB = 0.05, dwB = 3 ppm, kexAB = 1000/s, R1 = 2.5/s, R2 = 16/s
pub fn two_state_truth() -> PhysicalParameters {
    PhysicalParameters {
        pb: 0.05,
        dwb: 3.,
        kex_ab: 1000.,
        r1: 2.5,
        r2: 16.,
        ..Default::default()
    }
}

/// four on-resonance spinlocks of increasing power and one off-resonance spinlock
pub fn dispersion_conditions() -> Vec<SpinlockCondition> {
    [(0., 150.), (0., 300.), (0., 500.), (0., 1000.), (-400., 150.)]
        .into_iter()
        .map(|(offset, power)| SpinlockCondition::new(offset, power))
        .collect()
}

/// Simulate noise-free R1rho rates at the given conditions and wrap them in a
/// dataset which uses the same delays, so that fitting with the same
/// simulator reproduces `truth` exactly.
pub fn simulated_dataset(
    name: &str,
    larmor: f64,
    truth: &PhysicalParameters,
    conditions: &[SpinlockCondition],
    error: f64,
) -> Dataset {
    let template = Dataset::relaxation(name, larmor, Vec::new()).with_delays(delay_schedule());
    let simulator = BlochMcConnell::new();
    let points = conditions
        .iter()
        .map(|condition| {
            let r1rho = simulator
                .r1rho(truth, condition, larmor, template.delays(), Alignment::Auto)
                .expect("Simulating valid parameters must not fail");
            RelaxationPoint::new(condition.offset, condition.power, r1rho, error)
        })
        .collect();
    Dataset::relaxation(name, larmor, points).with_delays(delay_schedule())
}

/// five rates of [two_state_truth] at [dispersion_conditions]
pub fn two_state_dataset() -> Dataset {
    simulated_dataset(
        "two-state",
        LARMOR,
        &two_state_truth(),
        &dispersion_conditions(),
        RATE_ERROR,
    )
}

/// everything of [two_state_truth] fixed except kexAB, which starts at `kex`
pub fn exchange_rate_parameters(kex: f64) -> ParameterSet {
    let truth = two_state_truth();
    ParameterSet::new()
        .with(ParameterSpec::fixed(ParameterName::Pb, truth.pb))
        .with(ParameterSpec::fixed(ParameterName::DwB, truth.dwb))
        .with(ParameterSpec::free(ParameterName::KexAB, kex, 10., 1e5))
        .with(ParameterSpec::fixed(ParameterName::R1, truth.r1))
        .with(ParameterSpec::fixed(ParameterName::R2, truth.r2))
}

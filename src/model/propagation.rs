use super::SimulationError;
use nalgebra::{DMatrix, DVector};

/// Propagate `initial` under `dM/dt = L M` and return the projection of the
/// magnetization onto `projection` at each delay.
///
/// The delays are visited in ascending order so that each step only
/// propagates over the increment to the previous delay. Equal increments
/// reuse the previous propagator.
pub(super) fn propagate(
    matrix: &DMatrix<f64>,
    initial: &DVector<f64>,
    projection: &DVector<f64>,
    delays: &DVector<f64>,
) -> DVector<f64> {
    let mut order: Vec<usize> = (0..delays.len()).collect();
    order.sort_by(|&a, &b| delays[a].total_cmp(&delays[b]));

    let mut trace = DVector::zeros(delays.len());
    let mut magnetization = initial.clone();
    let mut elapsed = 0.;
    let mut cached: Option<(f64, DMatrix<f64>)> = None;

    for index in order {
        let step = delays[index] - elapsed;
        if step > 0. {
            let reusable = matches!(&cached, Some((cached_step, _)) if same_step(*cached_step, step));
            if !reusable {
                cached = Some((step, (matrix * step).exp()));
            }
            if let Some((_, propagator)) = &cached {
                magnetization = propagator * &magnetization;
            }
            elapsed = delays[index];
        }
        trace[index] = projection.dot(&magnetization);
    }
    trace
}

fn same_step(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-12 * a.abs().max(b.abs()).max(1e-300)
}

/// The rate `$R$` of `$I(t) = I_0 e^{-Rt}$` from an ordinary least squares
/// fit of `$\ln I$` against `$t$`.
pub(super) fn monoexponential_rate(
    delays: &DVector<f64>,
    intensities: &DVector<f64>,
) -> Result<f64, SimulationError> {
    if let Some((delay, intensity)) = delays
        .iter()
        .zip(intensities.iter())
        .find(|(_, intensity)| !(intensity.is_finite() && **intensity > 0.))
    {
        return Err(SimulationError::NonPositiveMagnetization {
            delay: *delay,
            intensity: *intensity,
        });
    }
    let n = delays.len() as f64;
    if delays.len() < 2 {
        return Err(SimulationError::TooFewDelays);
    }
    let logs = intensities.map(f64::ln);
    let mean_t = delays.sum() / n;
    let mean_log = logs.sum() / n;
    let (covariance, variance) = delays
        .iter()
        .zip(logs.iter())
        .fold((0., 0.), |(cov, var), (t, y)| {
            let dt = t - mean_t;
            (cov + dt * (y - mean_log), var + dt * dt)
        });
    if variance <= 0. {
        return Err(SimulationError::TooFewDelays);
    }
    let rate = -covariance / variance;
    if rate.is_finite() {
        Ok(rate)
    } else {
        Err(SimulationError::NonFinite)
    }
}

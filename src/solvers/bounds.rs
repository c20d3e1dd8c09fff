//! Box constraints and the variable transforms that let unconstrained
//! minimizers respect them.
//!
//! A bounded parameter `$x$` is expressed through an unconstrained internal
//! parameter `$z$`:
//!
//! * both bounds: `$x = l + (u-l)(\sin z + 1)/2$`
//! * lower bound only: `$x = l - 1 + \sqrt{z^2 + 1}$`
//! * upper bound only: `$x = u + 1 - \sqrt{z^2 + 1}$`
//!
//! Every internal point maps into the feasible box, so an optimizer working
//! on `$z$` never proposes an infeasible parameter.
use nalgebra::DVector;
use thiserror::Error as ThisError;

/// Invalid box constraints.
#[derive(Debug, Clone, ThisError, PartialEq)]
pub enum BoundsError {
    /// lower and upper bound vectors differ in length
    #[error("Lower bounds have length {lower} but upper bounds have length {upper}")]
    LengthMismatch { lower: usize, upper: usize },

    /// bounds do not match the dimension of a parameter vector
    #[error("Bounds have dimension {bounds} but the parameters have dimension {parameters}")]
    DimensionMismatch { bounds: usize, parameters: usize },

    /// NaN bound or lower bound above upper bound
    #[error("Invalid bounds [{lower}, {upper}] at index {index}")]
    Inverted {
        index: usize,
        lower: f64,
        upper: f64,
    },
}

/// Relative distance from a bound at which internal coordinates are placed
/// when a point lies exactly on it. The sine transform has a vanishing
/// derivative on the bounds.
const BOUNDARY_NUDGE: f64 = 1e-9;

/// Lower and upper bounds of a parameter vector. Infinite bounds are allowed.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    lower: DVector<f64>,
    upper: DVector<f64>,
}

impl Bounds {
    /// Create bounds, checking that both vectors have the same length and that
    /// `lower[i] <= upper[i]` for all elements.
    pub fn new(lower: DVector<f64>, upper: DVector<f64>) -> Result<Self, BoundsError> {
        if lower.len() != upper.len() {
            return Err(BoundsError::LengthMismatch {
                lower: lower.len(),
                upper: upper.len(),
            });
        }
        if let Some(index) = lower
            .iter()
            .zip(upper.iter())
            .position(|(l, u)| l.is_nan() || u.is_nan() || l > u)
        {
            return Err(BoundsError::Inverted {
                index,
                lower: lower[index],
                upper: upper[index],
            });
        }
        Ok(Self { lower, upper })
    }

    /// no constraints on `n` parameters
    pub fn unbounded(n: usize) -> Self {
        Self {
            lower: DVector::from_element(n, f64::NEG_INFINITY),
            upper: DVector::from_element(n, f64::INFINITY),
        }
    }

    /// number of parameters
    pub fn len(&self) -> usize {
        self.lower.len()
    }

    /// true for bounds on zero parameters
    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    /// lower bounds
    pub fn lower(&self) -> &DVector<f64> {
        &self.lower
    }

    /// upper bounds
    pub fn upper(&self) -> &DVector<f64> {
        &self.upper
    }

    /// check that a parameter vector has the dimension of the bounds
    pub fn check_dimension(&self, parameters: &DVector<f64>) -> Result<(), BoundsError> {
        if parameters.len() == self.len() {
            Ok(())
        } else {
            Err(BoundsError::DimensionMismatch {
                bounds: self.len(),
                parameters: parameters.len(),
            })
        }
    }

    /// true if every element lies within its bounds
    pub fn contains(&self, x: &DVector<f64>) -> bool {
        x.len() == self.len()
            && x
                .iter()
                .zip(self.lower.iter().zip(self.upper.iter()))
                .all(|(x, (l, u))| *l <= *x && *x <= *u)
    }

    /// project `x` into the box
    pub fn clamp(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(
            x.len(),
            x.iter()
                .zip(self.lower.iter().zip(self.upper.iter()))
                .map(|(x, (l, u))| x.max(*l).min(*u)),
        )
    }

    /// map a feasible point to internal (unconstrained) coordinates
    pub fn to_internal(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(
            x.len(),
            x.iter()
                .zip(self.lower.iter().zip(self.upper.iter()))
                .map(|(&x, (&l, &u))| internal_coordinate(x, l, u)),
        )
    }

    /// map internal coordinates back to a feasible point
    pub fn to_external(&self, z: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(
            z.len(),
            z.iter()
                .zip(self.lower.iter().zip(self.upper.iter()))
                .map(|(&z, (&l, &u))| external_coordinate(z, l, u)),
        )
    }
}

fn internal_coordinate(x: f64, l: f64, u: f64) -> f64 {
    let x = x.max(l).min(u);
    match (l.is_finite(), u.is_finite()) {
        (true, true) if u > l => {
            let s = (2. * (x - l) / (u - l) - 1.).clamp(-1. + BOUNDARY_NUDGE, 1. - BOUNDARY_NUDGE);
            s.asin()
        }
        (true, true) => 0.,
        (true, false) => {
            let shifted = (x - l + 1.).max(1. + BOUNDARY_NUDGE);
            (shifted * shifted - 1.).sqrt()
        }
        (false, true) => {
            let shifted = (u - x + 1.).max(1. + BOUNDARY_NUDGE);
            (shifted * shifted - 1.).sqrt()
        }
        (false, false) => x,
    }
}

fn external_coordinate(z: f64, l: f64, u: f64) -> f64 {
    let x = match (l.is_finite(), u.is_finite()) {
        (true, true) => l + (u - l) * (z.sin() + 1.) / 2.,
        (true, false) => l - 1. + (z * z + 1.).sqrt(),
        (false, true) => u + 1. - (z * z + 1.).sqrt(),
        (false, false) => z,
    };
    x.max(l).min(u)
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;
    use assert_matches::assert_matches;

    #[test]
    fn construction_rejects_mismatched_or_inverted_bounds() {
        assert_matches!(
            Bounds::new(DVector::from_vec(vec![0., 1.]), DVector::from_vec(vec![1.])),
            Err(BoundsError::LengthMismatch { lower: 2, upper: 1 })
        );
        assert_matches!(
            Bounds::new(DVector::from_vec(vec![0., 2.]), DVector::from_vec(vec![1., 1.])),
            Err(BoundsError::Inverted { index: 1, .. })
        );
    }

    #[test]
    fn transforms_invert_each_other_for_interior_points() {
        let bounds = Bounds::new(
            DVector::from_vec(vec![-1., 0., f64::NEG_INFINITY, f64::NEG_INFINITY]),
            DVector::from_vec(vec![3., f64::INFINITY, 5., f64::INFINITY]),
        )
        .unwrap();
        let x = DVector::from_vec(vec![0.7, 12.5, -3.25, 42.]);
        let back = bounds.to_external(&bounds.to_internal(&x));
        assert_relative_eq!(back, x, epsilon = 1e-10);
    }

    #[test]
    fn every_internal_point_maps_into_the_box() {
        let bounds = Bounds::new(
            DVector::from_vec(vec![-1., 0., f64::NEG_INFINITY, 2.]),
            DVector::from_vec(vec![3., f64::INFINITY, 5., 2.]),
        )
        .unwrap();
        for z in [-1e6, -3.3, -0.1, 0., 0.4, 7.9, 1e9] {
            let external = bounds.to_external(&DVector::from_element(4, z));
            assert!(bounds.contains(&external), "{external} violates the bounds");
        }
    }

    #[test]
    fn points_on_a_bound_stay_movable() {
        let bounds = Bounds::new(DVector::from_vec(vec![0.]), DVector::from_vec(vec![1.])).unwrap();
        let z = bounds.to_internal(&DVector::from_vec(vec![1.]));
        assert!(z[0].cos().abs() > 0.);
        assert_relative_eq!(bounds.to_external(&z)[0], 1., epsilon = 1e-8);
    }
}

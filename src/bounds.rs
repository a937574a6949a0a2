#![allow(clippy::module_name_repetitions)]
use crate::{NNFloat, UNBOUNDED};
use ndarray::iter::Lanes;
use ndarray::{stack, Array1, Array2, ArrayView1, ArrayViewMut1, Axis, Ix1, Zip};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Per-neuron interval bounds for one layer, stored as a `[2, n]` array
/// (row 0 lower, row 1 upper) so a lane iterator yields `(lb, ub)` pairs.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Bounds1 {
    data: Array2<NNFloat>,
}

impl Bounds1 {
    /// # Panics
    /// If `lower` and `upper` have different lengths.
    pub fn new<'a>(lower: ArrayView1<'a, NNFloat>, upper: ArrayView1<'a, NNFloat>) -> Self {
        let data = stack(Axis(0), &[lower, upper]).unwrap();
        Self { data }
    }

    /// The default bound state of a ReLU decomposition variable: lower 0,
    /// upper at the untightened sentinel.
    pub fn nonneg(dim: usize) -> Self {
        Self::new(
            Array1::zeros(dim).view(),
            Array1::from_elem(dim, UNBOUNDED).view(),
        )
    }

    /// Bounds for a `[0, 1]` input domain (e.g. pixel intensities).
    pub fn unit(dim: usize) -> Self {
        Self::new(
            Array1::zeros(dim).view(),
            Array1::ones(dim).view(),
        )
    }

    pub fn ndim(&self) -> usize {
        self.data.ncols()
    }

    pub fn lower(&self) -> ArrayView1<NNFloat> {
        self.data.index_axis(Axis(0), 0)
    }

    pub fn lower_mut(&mut self) -> ArrayViewMut1<NNFloat> {
        self.data.index_axis_mut(Axis(0), 0)
    }

    pub fn upper(&self) -> ArrayView1<NNFloat> {
        self.data.index_axis(Axis(0), 1)
    }

    pub fn upper_mut(&mut self) -> ArrayViewMut1<NNFloat> {
        self.data.index_axis_mut(Axis(0), 1)
    }

    pub fn get(&self, i: usize) -> (NNFloat, NNFloat) {
        (self.data[[0, i]], self.data[[1, i]])
    }

    pub fn bounds_iter(&self) -> Lanes<NNFloat, Ix1> {
        self.data.lanes(Axis(0))
    }

    pub fn is_member(&self, x: &ArrayView1<NNFloat>) -> bool {
        let eps = 1e-5;
        Zip::from(x)
            .and(self.bounds_iter())
            .all(|&x, b| b[0] - eps <= x && x <= b[1] + eps)
    }

    /// Lower an upper bound in place, never raising it and never letting it
    /// drop below the (non-negative) lower bound.
    pub fn clamp_upper(&mut self, i: usize, candidate: NNFloat) {
        let lb = self.data[[0, i]];
        let ub = self.data[[1, i]];
        self.data[[1, i]] = candidate.min(ub).max(lb);
    }
}

impl Display for Bounds1 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Lower: {}\nUpper: {}", self.lower(), self.upper())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::*;
    use ndarray::array;
    use proptest::proptest;

    #[test]
    fn test_nonneg_defaults() {
        let b = Bounds1::nonneg(3);
        assert_eq!(b.lower(), array![0., 0., 0.].view());
        assert_eq!(b.upper(), array![UNBOUNDED, UNBOUNDED, UNBOUNDED].view());
    }

    #[test]
    fn test_clamp_upper_only_lowers() {
        let mut b = Bounds1::nonneg(2);
        b.clamp_upper(0, 5.);
        assert_eq!(b.get(0), (0., 5.));
        // a looser candidate must not raise the bound again
        b.clamp_upper(0, 10.);
        assert_eq!(b.get(0), (0., 5.));
        // a negative candidate saturates at the lower bound
        b.clamp_upper(1, -3.);
        assert_eq!(b.get(1), (0., 0.));
    }

    proptest! {
        #[test]
        fn test_membership_of_midpoint(bounds in bounds1(8)) {
            let mid = (&bounds.lower() + &bounds.upper()) / 2.;
            assert!(bounds.is_member(&mid.view()));
        }
    }
}

use crate::bounds::Bounds1;
use crate::NNFloat;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One layer of a ReLU network together with its mutable bound state.
///
/// Layer 0 is the input layer and carries no weights or bias. For computed
/// layers, `weights[[j, i]]` is the weight from neuron `i` of layer `k - 1`
/// to neuron `j` of this layer. The `x` bounds scope the activated part of
/// each neuron's ReLU decomposition and the `s` bounds the suppressed part;
/// both lower bounds are 0 by construction and upper bounds start at the
/// untightened sentinel.
///
/// `Clone` is a deep copy: the arrays own their data, so a cloned layer can
/// be mutated without the original ever observing it. Bound-tightening
/// snapshots rely on this.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Layer {
    k: usize,
    n: usize,
    weights: Option<Array2<NNFloat>>,
    bias: Option<Array1<NNFloat>>,
    x_bounds: Bounds1,
    s_bounds: Bounds1,
}

impl Layer {
    /// A computed layer (`k >= 1`).
    ///
    /// # Panics
    /// If the weight row count or bias length disagree with each other.
    pub fn new(k: usize, weights: Array2<NNFloat>, bias: Array1<NNFloat>) -> Self {
        assert!(k >= 1, "computed layers start at index 1");
        assert_eq!(weights.nrows(), bias.len());
        let n = bias.len();
        Self {
            k,
            n,
            weights: Some(weights),
            bias: Some(bias),
            x_bounds: Bounds1::nonneg(n),
            s_bounds: Bounds1::nonneg(n),
        }
    }

    /// The input layer. Domain bounds default to the untightened sentinel
    /// interval and are usually overridden via [`Layer::set_x_bounds`].
    pub fn input(n: usize) -> Self {
        Self {
            k: 0,
            n,
            weights: None,
            bias: None,
            x_bounds: Bounds1::nonneg(n),
            s_bounds: Bounds1::nonneg(n),
        }
    }

    /// A single-neuron layer built from row `j` of this layer, used as the
    /// synthetic last layer of a bound-tightening snapshot.
    ///
    /// # Panics
    /// If called on the input layer.
    pub fn isolate_neuron(&self, j: usize) -> Self {
        let w = self
            .weights
            .as_ref()
            .expect("cannot isolate a neuron of the input layer");
        let b = self.bias.as_ref().unwrap();
        Self::new(
            self.k,
            w.row(j).to_owned().insert_axis(ndarray::Axis(0)),
            Array1::from_elem(1, b[j]),
        )
    }

    pub fn index(&self) -> usize {
        self.k
    }

    pub fn num_neurons(&self) -> usize {
        self.n
    }

    pub fn is_input(&self) -> bool {
        self.k == 0
    }

    /// # Panics
    /// If called on the input layer.
    pub fn weights(&self) -> &Array2<NNFloat> {
        self.weights.as_ref().expect("input layer has no weights")
    }

    /// # Panics
    /// If called on the input layer.
    pub fn bias(&self) -> &Array1<NNFloat> {
        self.bias.as_ref().expect("input layer has no bias")
    }

    pub fn x_bounds(&self) -> &Bounds1 {
        &self.x_bounds
    }

    pub fn s_bounds(&self) -> &Bounds1 {
        &self.s_bounds
    }

    /// # Panics
    /// If the dimension differs from the layer width.
    pub fn set_x_bounds(&mut self, bounds: Bounds1) {
        assert_eq!(bounds.ndim(), self.n);
        self.x_bounds = bounds;
    }

    /// # Panics
    /// If the dimension differs from the layer width.
    pub fn set_s_bounds(&mut self, bounds: Bounds1) {
        assert_eq!(bounds.ndim(), self.n);
        self.s_bounds = bounds;
    }

    /// Install tightened upper bounds, clamping so an upper bound can only
    /// ever decrease.
    pub fn tighten_upper(&mut self, x_upper: &Array1<NNFloat>, s_upper: &Array1<NNFloat>) {
        for j in 0..self.n {
            self.x_bounds.clamp_upper(j, x_upper[j]);
            self.s_bounds.clamp_upper(j, s_upper[j]);
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_input() {
            write!(f, "Input {}", self.n)
        } else {
            write!(f, "Dense {}", self.n)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::{array, Array1};

    #[test]
    fn test_clone_does_not_alias_bounds() {
        let mut layer = Layer::new(1, array![[1., 2.], [3., 4.]], array![0.5, -0.5]);
        let snapshot = layer.clone();
        layer.tighten_upper(&Array1::from_elem(2, 1.0), &Array1::from_elem(2, 2.0));
        assert_eq!(snapshot.x_bounds().get(0).1, crate::UNBOUNDED);
        assert_eq!(layer.x_bounds().get(0).1, 1.0);
    }

    #[test]
    fn test_isolate_neuron() {
        let layer = Layer::new(2, array![[1., 2.], [3., 4.], [5., 6.]], array![7., 8., 9.]);
        let one = layer.isolate_neuron(1);
        assert_eq!(one.num_neurons(), 1);
        assert_eq!(one.weights(), &array![[3., 4.]]);
        assert_eq!(one.bias(), &array![8.]);
        assert_eq!(one.index(), 2);
    }
}

use crate::bounds::Bounds1;
use crate::dnn::Layer;
use crate::error::{ModelError, Result};
use crate::NNFloat;
use ndarray::{Array1, ArrayView1};
use ordered_float::NotNan;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A feed-forward ReLU network: an input layer followed by `K` computed
/// layers, owned exclusively. All queries read the weights together with
/// the layers' current bound state.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Network {
    layers: Vec<Layer>,
}

impl Network {
    /// Builds a network from an ordered layer sequence, validating the
    /// dimension chain. This is the only place malformed weight data can
    /// surface, before any optimization work begins.
    pub fn new(layers: Vec<Layer>) -> Result<Self> {
        if layers.len() < 2 {
            return Err(ModelError::EmptyNetwork);
        }
        for (prev, layer) in layers.iter().zip(layers.iter().skip(1)) {
            let w = layer.weights();
            if w.ncols() != prev.num_neurons() {
                return Err(ModelError::Dimension {
                    layer: layer.index(),
                    rows: w.nrows(),
                    cols: w.ncols(),
                    prev: prev.num_neurons(),
                });
            }
        }
        Ok(Self { layers })
    }

    /// Number of computed layers (`K`; the input layer is not counted).
    pub fn num_layers(&self) -> usize {
        self.layers.len() - 1
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, k: usize) -> &Layer {
        &self.layers[k]
    }

    pub fn layer_mut(&mut self, k: usize) -> &mut Layer {
        &mut self.layers[k]
    }

    pub fn input_dim(&self) -> usize {
        self.layers[0].num_neurons()
    }

    pub fn output_dim(&self) -> usize {
        self.layers[self.layers.len() - 1].num_neurons()
    }

    pub fn output_layer(&self) -> &Layer {
        &self.layers[self.layers.len() - 1]
    }

    /// Overrides the input-domain bounds, e.g. widening the lower bound to
    /// -1 before searching for a transform that may darken pixels.
    pub fn set_input_bounds(&mut self, bounds: Bounds1) {
        self.layers[0].set_x_bounds(bounds);
    }

    /// Plain (non-MILP) forward evaluation, returning the `(x, s)` ReLU
    /// decomposition of every computed layer. `x - s` is the
    /// pre-activation, `x` the activation.
    ///
    /// # Panics
    /// If `input` does not match the input dimension.
    pub fn forward(&self, input: ArrayView1<NNFloat>) -> Vec<(Array1<NNFloat>, Array1<NNFloat>)> {
        assert_eq!(input.len(), self.input_dim());
        let mut activations = input.to_owned();
        let mut trace = Vec::with_capacity(self.num_layers());
        for layer in self.layers.iter().skip(1) {
            let pre = layer.weights().dot(&activations) + layer.bias();
            let x = pre.mapv(|v| if v > 0. { v } else { 0. });
            let s = pre.mapv(|v| if v < 0. { -v } else { 0. });
            activations = x.clone();
            trace.push((x, s));
        }
        trace
    }

    /// Output-layer activations for `input`.
    pub fn output(&self, input: ArrayView1<NNFloat>) -> Array1<NNFloat> {
        self.forward(input).pop().unwrap().0
    }

    /// Index of the most activated output neuron.
    ///
    /// # Panics
    /// If an output activation is NaN.
    pub fn classify(&self, input: ArrayView1<NNFloat>) -> usize {
        self.output(input)
            .iter()
            .enumerate()
            .max_by_key(|(_, &v)| NotNan::new(v).unwrap())
            .map(|(i, _)| i)
            .unwrap()
    }

    /// The bound-tightening sub-network for neuron `j` of layer `k`: deep
    /// copies of layers `0..k` (carrying their finalized bounds) plus a
    /// synthetic single-neuron layer isolating the target neuron. The
    /// snapshot never aliases this network's bound arrays.
    ///
    /// # Panics
    /// If `k` is 0 or out of range.
    pub fn bound_snapshot(&self, k: usize, j: usize) -> Self {
        assert!(k >= 1 && k < self.layers.len());
        let mut layers: Vec<Layer> = self.layers[..k].to_vec();
        layers.push(self.layers[k].isolate_neuron(j));
        Self { layers }
    }

    /// JSON round trip, mirroring how trained weights move between tools.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let layers: Vec<String> = self.layers.iter().map(|l| format!("{}", l)).collect();
        write!(f, "{}", layers.join(" => "))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use proptest::prelude::*;

    #[test]
    fn test_dimension_chain_is_checked() {
        let layers = vec![
            Layer::input(2),
            Layer::new(1, array![[1., 0., 0.]], array![0.]),
        ];
        assert!(matches!(
            Network::new(layers),
            Err(crate::ModelError::Dimension { .. })
        ));
    }

    #[test]
    fn test_forward_decomposition() {
        // one neuron active, one suppressed
        let net = Network::new(vec![
            Layer::input(2),
            Layer::new(1, array![[1., -1.], [-1., 1.]], array![0., 0.]),
        ])
        .unwrap();
        let trace = net.forward(array![1., 0.].view());
        let (x, s) = &trace[0];
        assert_eq!(x, &array![1., 0.]);
        assert_eq!(s, &array![0., 1.]);
    }

    #[test]
    fn test_snapshot_is_independent() {
        let mut net = fixed_network();
        let snap = net.bound_snapshot(2, 0);
        assert_eq!(snap.num_layers(), 2);
        assert_eq!(snap.output_dim(), 1);
        net.layer_mut(1)
            .tighten_upper(&array![1., 1., 1.], &array![1., 1., 1.]);
        // the snapshot took its copy before the mutation
        assert_eq!(snap.layer(1).x_bounds().get(0).1, crate::UNBOUNDED);
    }

    proptest! {
        #[test]
        fn test_xs_complementarity(net in fc_network(3, 2, 2, 5), input in array1(3)) {
            for (x, s) in net.forward(input.view()) {
                for (xv, sv) in x.iter().zip(s.iter()) {
                    prop_assert!(*xv >= 0. && *sv >= 0.);
                    prop_assert!(xv * sv == 0.);
                }
            }
        }

        #[test]
        fn test_json_round_trip(net in fc_network(3, 2, 2, 4)) {
            let json = net.to_json().unwrap();
            let back = Network::from_json(&json).unwrap();
            prop_assert_eq!(net, back);
        }
    }

    #[test]
    fn test_classify_matches_output() {
        let net = fixed_network();
        let out = net.output(array![0.5, 0.5].view());
        let class = net.classify(array![0.5, 0.5].view());
        for v in out.iter() {
            assert!(out[class] >= *v);
        }
        assert_relative_eq!(out[class], out.fold(f64::MIN, |a, &b| a.max(b)));
    }
}

#![cfg(test)]
use crate::bounds::Bounds1;
use crate::dnn::{Layer, Network};
use crate::NNFloat;
use ndarray::{array, Array1, Array2, ArrayView1, Axis, Zip};
use proptest::arbitrary::functor::ArbitraryF1;
use proptest::prelude::*;
use proptest::sample::SizeRange;
use std::mem;

prop_compose! {
    pub fn array1(len: usize)(v in Vec::lift1_with(-10. .. 10., SizeRange::new(len..=len))) -> Array1<NNFloat> {
        Array1::from_vec(v)
    }
}

prop_compose! {
    pub fn array2(rows: usize, cols: usize)(v in Vec::lift1_with(array1(cols), SizeRange::new(rows..=rows))) -> Array2<NNFloat> {
        assert!(rows > 0);
        ndarray::stack(Axis(0), &v.iter().map(|x| x.view()).collect::<Vec<ArrayView1<NNFloat>>>()).unwrap()
    }
}

prop_compose! {
    pub fn bounds1(len: usize)(mut lower in array1(len), mut upper in array1(len)) -> Bounds1 {
        Zip::from(&mut lower).and(&mut upper).for_each(|l, u| if *l > *u {mem::swap(l, u)});
        Bounds1::new(lower.view(), upper.view())
    }
}

prop_compose! {
    pub fn layer(k: usize, in_dim: usize, out_dim: usize)(weights in array2(out_dim, in_dim), bias in array1(out_dim)) -> Layer {
        Layer::new(k, weights, bias)
    }
}

/// A random fully connected network with `nlayers` computed layers, hidden
/// widths in `1..max_layer_width`, and a unit input box.
pub fn fc_network(
    input_dim: usize,
    output_dim: usize,
    nlayers: usize,
    max_layer_width: usize,
) -> impl Strategy<Value = Network> {
    Vec::lift1_with(1..max_layer_width, SizeRange::new(nlayers - 1..=nlayers - 1))
        .prop_flat_map(move |mut widths| {
            widths.push(output_dim);
            let mut prev = input_dim;
            let layers: Vec<_> = widths
                .into_iter()
                .enumerate()
                .map(|(i, n)| {
                    let strat = layer(i + 1, prev, n);
                    prev = n;
                    strat
                })
                .collect();
            layers
        })
        .prop_map(move |layers| {
            let mut all = vec![Layer::input(input_dim)];
            all.extend(layers);
            let mut net = Network::new(all).unwrap();
            net.set_input_bounds(Bounds1::unit(input_dim));
            net
        })
}

/// The small hand-built 2 -> 3 -> 2 network most unit tests run queries
/// against: integer-ish weights on a unit input box, classifying
/// `[0.5, 0.5]` as class 0, with class 1 reachable within deviation 1.
pub fn fixed_network() -> Network {
    let mut net = Network::new(vec![
        Layer::input(2),
        Layer::new(
            1,
            array![[1., 1.], [1., -1.], [-1., 1.]],
            array![0., 0.5, -0.5],
        ),
        Layer::new(2, array![[1., -1., 1.], [-1., 1., 1.]], array![0.5, 0.]),
    ])
    .unwrap();
    net.set_input_bounds(Bounds1::unit(2));
    net
}

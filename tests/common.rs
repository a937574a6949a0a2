use ndarray::array;
use relumilp::{Bounds1, Layer, Network};

/// A small hand-built classifier on a unit input box. `[0.5, 0.5]` scores
/// as class 0, and class 1 is reachable within a per-pixel deviation of 1.
pub fn scenario_network() -> Network {
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

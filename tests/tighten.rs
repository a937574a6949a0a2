use approx::assert_relative_eq;
use ndarray::array;
use relumilp::{tighten_bounds, AdversarialQuery, TightenMode, UNBOUNDED};

mod common;

#[test]
fn test_tightening_preserves_the_adversarial_optimum() {
    let input = array![0.5, 0.5];

    let loose = common::scenario_network();
    let target = 1 - loose.classify(input.view());
    let before = AdversarialQuery::new(&loose, input.clone(), target, 1.).solve();

    let mut tight = common::scenario_network();
    tighten_bounds(&mut tight, TightenMode::Certified);
    let after = AdversarialQuery::new(&tight, input, target, 1.).solve();

    // tightening shrinks the relaxation but never cuts off a feasible point
    assert!(before.solved() && after.solved());
    assert_relative_eq!(
        before.total_disturbance().unwrap(),
        after.total_disturbance().unwrap(),
        epsilon = 1e-5
    );
}

#[test]
fn test_time_budgeted_mode_is_sound() {
    let mut certified = common::scenario_network();
    tighten_bounds(&mut certified, TightenMode::Certified);

    let mut fast = common::scenario_network();
    tighten_bounds(&mut fast, TightenMode::TimeBudgeted(std::time::Duration::from_secs(1)));

    // truncated solves may leave looser bounds, never tighter-than-true ones
    for k in 1..=certified.num_layers() {
        for j in 0..certified.layer(k).num_neurons() {
            let (_, exact) = certified.layer(k).x_bounds().get(j);
            let (_, budgeted) = fast.layer(k).x_bounds().get(j);
            assert!(budgeted >= exact - 1e-6);
            assert!(budgeted <= UNBOUNDED);
        }
    }
}

use approx::assert_relative_eq;
use ndarray::array;
use relumilp::{tighten_bounds, AdversarialQuery, SolveStatus, TightenMode, DOMINANCE_MARGIN};

mod common;

#[test]
fn test_minimal_adversarial_example() {
    let mut net = common::scenario_network();
    tighten_bounds(&mut net, TightenMode::Certified);

    let input = array![0.5, 0.5];
    let source = net.classify(input.view());
    let target = 1 - source;
    let result = AdversarialQuery::new(&net, input.clone(), target, 1.).solve();
    assert_eq!(result.status(), SolveStatus::Optimal);

    // the objective is the l1 distance of the incumbent
    let disturbance = result.total_disturbance().unwrap();
    assert!(disturbance <= 2. + 1e-6);
    let adversarial = result.recovered_input().unwrap();
    let l1: f64 = adversarial
        .iter()
        .zip(input.iter())
        .map(|(a, b)| (a - b).abs())
        .sum();
    assert_relative_eq!(disturbance, l1, epsilon = 1e-5);

    // the solved activations agree with a plain forward pass, and the
    // replayed output honors the dominance margin
    let replayed = net.output(adversarial.view());
    let solved = result.output_activations().unwrap();
    for (r, s) in replayed.iter().zip(solved.iter()) {
        assert_relative_eq!(*r, *s, epsilon = 1e-4);
    }
    assert!(replayed[target] >= DOMINANCE_MARGIN * replayed[source] - 1e-4);
}

#[test]
fn test_gap_tolerance_stays_near_the_optimum() {
    let mut net = common::scenario_network();
    tighten_bounds(&mut net, TightenMode::Certified);

    let input = array![0.5, 0.5];
    let target = 1 - net.classify(input.view());
    let certified = AdversarialQuery::new(&net, input.clone(), target, 1.).solve();
    let relaxed = AdversarialQuery::new(&net, input, target, 1.)
        .with_gap_tolerance(0.01)
        .solve();
    assert!(certified.solved() && relaxed.solved());
    let exact = certified.total_disturbance().unwrap();
    assert!(relaxed.total_disturbance().unwrap() <= exact * 1.01 + 1e-6);
}

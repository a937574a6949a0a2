//! Universal-perturbation synthesis.
//!
//! One shared affine input transform `(p, q)` is optimized against a batch
//! of `H` examples at once: each example gets its own full network
//! encoding over the *fixed* example pixels, and the transform variables
//! are the only coupling between the `H` sub-networks. The objective
//! maximizes the per-example/per-class counters `t[h,c]`, each of which
//! can only reach 1 when `y_h`, an upper envelope of the scaled output
//! activations, fits under `x_K[h,c]`. Only the true class's counter may
//! be set; see DESIGN.md for the counter structure.
//!
//! This is by far the largest formulation in the crate; default time
//! budgets are hours, not seconds.

use crate::dnn::Network;
use crate::encode::NetworkEncoding;
use crate::formulations::adversarial::InputTransform;
use crate::milp::{
    self, CmpOp, LinConstraint, LinExpr, MilpOutcome, MilpProblem, Sense, SolveConfig,
    SolveStatus, VarId,
};
use crate::{NNFloat, DOMINANCE_MARGIN, UNBOUNDED};
use log::info;
use ndarray::{Array1, ArrayView1};
use std::time::Duration;

/// Floor below which no `y_h` may fall, keeping the envelope meaningful
/// when all activations are zero.
const Y_FLOOR: NNFloat = 0.01;

/// Weight of the minimum-distance regularizer pulling `p` toward 1 and `q`
/// toward 0.
const MIN_DISTANCE_WEIGHT: NNFloat = 0.001;

#[derive(Clone, Debug)]
pub struct PerturbationQuery<'a> {
    network: &'a Network,
    inputs: Vec<Array1<NNFloat>>,
    labels: Vec<usize>,
    scale: bool,
    shift: bool,
    min_distance: bool,
    time_limit: Option<Duration>,
}

impl<'a> PerturbationQuery<'a> {
    /// # Panics
    /// If the batch is empty, dimensions are inconsistent, or a label is
    /// out of range.
    pub fn new(network: &'a Network, inputs: Vec<Array1<NNFloat>>, labels: Vec<usize>) -> Self {
        assert!(!inputs.is_empty());
        assert_eq!(inputs.len(), labels.len());
        for input in &inputs {
            assert_eq!(input.len(), network.input_dim());
        }
        for &label in &labels {
            assert!(label < network.output_dim());
        }
        Self {
            network,
            inputs,
            labels,
            scale: true,
            shift: true,
            min_distance: false,
            time_limit: Some(Duration::from_secs(12 * 60 * 60)),
        }
    }

    /// Choose which transform components to search over. At least one must
    /// remain enabled.
    ///
    /// # Panics
    /// If both are disabled.
    pub fn with_components(mut self, scale: bool, shift: bool) -> Self {
        assert!(scale || shift, "the transform needs at least one component");
        self.scale = scale;
        self.shift = shift;
        self
    }

    /// Penalize transform distance from the identity in the objective.
    pub fn with_min_distance(mut self) -> Self {
        self.min_distance = true;
        self
    }

    pub fn with_time_limit(mut self, limit: Option<Duration>) -> Self {
        self.time_limit = limit;
        self
    }

    /// Input expressions for example `h`: `a_i = p_i * input_i + q_i`,
    /// with each component present only when enabled.
    fn input_exprs(
        &self,
        input: ArrayView1<NNFloat>,
        p: &[VarId],
        q: &[VarId],
    ) -> Vec<LinExpr> {
        input
            .iter()
            .enumerate()
            .map(|(i, &pixel)| {
                let mut e = LinExpr::new();
                if self.scale {
                    e.add_term(p[i], pixel);
                } else {
                    e.add_constant(pixel);
                }
                if self.shift {
                    e.add_term(q[i], 1.);
                }
                e
            })
            .collect()
    }

    pub fn solve(&self) -> PerturbationResult {
        let mut problem = MilpProblem::new();
        let dim = self.network.input_dim();
        let classes = self.network.output_dim();

        let p: Vec<VarId> = (0..dim).map(|_| problem.add_var(0., UNBOUNDED)).collect();
        let q: Vec<VarId> = (0..dim)
            .map(|_| problem.add_var(-UNBOUNDED, UNBOUNDED))
            .collect();

        // the y envelope is bounded by the loosest output-layer x bound
        let y_ub = self
            .network
            .output_layer()
            .x_bounds()
            .upper()
            .fold(0., |a: NNFloat, &b| a.max(b));

        let mut encodings = Vec::with_capacity(self.inputs.len());
        let mut y_vars = Vec::with_capacity(self.inputs.len());
        let mut t_vars: Vec<Vec<VarId>> = Vec::with_capacity(self.inputs.len());

        for (input, &label) in self.inputs.iter().zip(self.labels.iter()) {
            let exprs = self.input_exprs(input.view(), &p, &q);
            let encoding = NetworkEncoding::encode(&mut problem, self.network, &exprs);

            // y_h >= 1.2 * x_K[c] for c != label, y_h >= x_K[label],
            // y_h >= floor
            let y = problem.add_var(0., y_ub);
            for (c, &xc) in encoding.output().iter().enumerate() {
                let factor = if c == label { 1. } else { DOMINANCE_MARGIN };
                let mut envelope = LinExpr::term(y, 1.);
                envelope.add_term(xc, -factor);
                problem.add_constraint(envelope, CmpOp::Ge, 0.);
            }
            problem.add_constraint(LinExpr::term(y, 1.), CmpOp::Ge, Y_FLOOR);

            // t[h,c] <= 1 only for the true class; t[h,c] = 1 forces the
            // envelope under x_K[h,c]
            let ts: Vec<VarId> = (0..classes)
                .map(|c| {
                    let t = problem.add_binary();
                    let cap = if c == label { 1. } else { 0. };
                    problem.add_constraint(LinExpr::term(t, 1.), CmpOp::Le, cap);
                    let mut under = LinExpr::term(y, 1.);
                    under.add_term(encoding.output()[c], -1.);
                    problem.add_indicator(
                        t,
                        true,
                        LinConstraint {
                            expr: under,
                            op: CmpOp::Le,
                            rhs: 0.,
                        },
                    );
                    t
                })
                .collect();

            encodings.push(encoding);
            y_vars.push(y);
            t_vars.push(ts);
        }

        let mut objective = LinExpr::new();
        for ts in &t_vars {
            for &t in ts {
                objective.add_term(t, 1.);
            }
        }
        if self.min_distance {
            // |q_i| and |1 - p_i| via auxiliary variables
            for &qi in &q {
                let abs = problem.add_var(0., UNBOUNDED);
                let mut ge_pos = LinExpr::term(abs, 1.);
                ge_pos.add_term(qi, -1.);
                problem.add_constraint(ge_pos, CmpOp::Ge, 0.);
                let mut ge_neg = LinExpr::term(abs, 1.);
                ge_neg.add_term(qi, 1.);
                problem.add_constraint(ge_neg, CmpOp::Ge, 0.);
                objective.add_term(abs, -MIN_DISTANCE_WEIGHT);
            }
            for &pi in &p {
                let abs = problem.add_var(0., UNBOUNDED);
                let mut ge_pos = LinExpr::term(abs, 1.);
                ge_pos.add_term(pi, 1.);
                problem.add_constraint(ge_pos, CmpOp::Ge, 1.);
                let mut ge_neg = LinExpr::term(abs, 1.);
                ge_neg.add_term(pi, -1.);
                problem.add_constraint(ge_neg, CmpOp::Ge, -1.);
                objective.add_term(abs, -MIN_DISTANCE_WEIGHT);
            }
        }
        problem.set_objective(Sense::Maximize, objective);

        let config = SolveConfig {
            time_limit: self.time_limit,
            relative_gap: None,
        };
        let outcome = milp::solve(&problem, &config);
        info!(
            "perturbation over {} examples: {:?}, objective {:?}",
            self.inputs.len(),
            outcome.status,
            outcome.objective
        );

        PerturbationResult {
            outcome,
            encodings,
            p,
            q,
            y_vars,
            t_vars,
            scale: self.scale,
            shift: self.shift,
        }
    }
}

/// Outcome of a perturbation synthesis run.
#[derive(Clone, Debug)]
pub struct PerturbationResult {
    outcome: MilpOutcome,
    encodings: Vec<NetworkEncoding>,
    p: Vec<VarId>,
    q: Vec<VarId>,
    y_vars: Vec<VarId>,
    t_vars: Vec<Vec<VarId>>,
    scale: bool,
    shift: bool,
}

impl PerturbationResult {
    pub fn status(&self) -> SolveStatus {
        self.outcome.status
    }

    pub fn solved(&self) -> bool {
        self.outcome.status.is_solved()
    }

    pub fn relative_gap(&self) -> Option<NNFloat> {
        self.outcome.relative_gap
    }

    pub fn nodes(&self) -> u64 {
        self.outcome.nodes
    }

    /// The synthesized transform; disabled components come back as the
    /// identity.
    pub fn transform(&self) -> Option<InputTransform> {
        self.outcome.status.has_solution().then(|| {
            let dim = self.p.len();
            let scale = if self.scale {
                Array1::from_vec(self.outcome.values_of(&self.p))
            } else {
                Array1::ones(dim)
            };
            let shift = if self.shift {
                Array1::from_vec(self.outcome.values_of(&self.q))
            } else {
                Array1::zeros(dim)
            };
            InputTransform { scale, shift }
        })
    }

    /// Number of `t` counters set, i.e. the objective without the
    /// min-distance penalty.
    pub fn hit_count(&self) -> Option<usize> {
        self.outcome.status.has_solution().then(|| {
            self.t_vars
                .iter()
                .flatten()
                .filter(|&&t| self.outcome.value(t) > 0.5)
                .count()
        })
    }

    /// Solved `y` envelope for example `h`.
    pub fn envelope(&self, h: usize) -> Option<NNFloat> {
        self.outcome
            .status
            .has_solution()
            .then(|| self.outcome.value(self.y_vars[h]))
    }

    /// Solved `t` pattern for example `h`.
    pub fn counters(&self, h: usize) -> Option<Vec<bool>> {
        self.outcome
            .status
            .has_solution()
            .then(|| {
                self.t_vars[h]
                    .iter()
                    .map(|&t| self.outcome.value(t) > 0.5)
                    .collect()
            })
    }

    /// Solved output activations of example `h`.
    pub fn output_activations(&self, h: usize) -> Option<Array1<NNFloat>> {
        self.outcome
            .status
            .has_solution()
            .then(|| Array1::from_vec(self.outcome.values_of(self.encodings[h].output())))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::*;
    use crate::tighten::{tighten_bounds, TightenMode};
    use approx::assert_relative_eq;
    use ndarray::array;

    fn tightened_network() -> crate::Network {
        let mut net = fixed_network();
        // allow the shifted input to go negative
        net.set_input_bounds(crate::Bounds1::new(
            array![-1., -1.].view(),
            array![1., 1.].view(),
        ));
        tighten_bounds(&mut net, TightenMode::Certified);
        net
    }

    #[test]
    fn test_replay_matches_forward_eval() {
        let net = tightened_network();
        let inputs = vec![array![0.5, 0.5], array![0.2, 0.8]];
        let labels: Vec<usize> = inputs.iter().map(|i| net.classify(i.view())).collect();

        let result = PerturbationQuery::new(&net, inputs.clone(), labels.clone())
            .with_time_limit(Some(Duration::from_secs(60)))
            .solve();
        assert!(result.status().has_solution());
        let transform = result.transform().unwrap();

        for (h, input) in inputs.iter().enumerate() {
            let replayed = net.output(transform.apply(input).view());
            let solved = result.output_activations(h).unwrap();
            for (a, b) in replayed.iter().zip(solved.iter()) {
                assert_relative_eq!(a, b, epsilon = 1e-4);
            }
            // the envelope really is an upper bound on the scaled outputs
            let y = result.envelope(h).unwrap();
            for (c, &out) in replayed.iter().enumerate() {
                let factor = if c == labels[h] { 1. } else { DOMINANCE_MARGIN };
                assert!(y >= factor * out - 1e-4);
            }
        }
    }

    #[test]
    fn test_min_distance_pulls_toward_identity() {
        let net = tightened_network();
        let inputs = vec![array![0.5, 0.5]];
        let labels = vec![net.classify(inputs[0].view())];

        let plain = PerturbationQuery::new(&net, inputs.clone(), labels.clone())
            .with_time_limit(Some(Duration::from_secs(60)))
            .solve();
        let regularized = PerturbationQuery::new(&net, inputs, labels)
            .with_min_distance()
            .with_time_limit(Some(Duration::from_secs(60)))
            .solve();
        assert!(plain.solved() && regularized.solved());
        assert_eq!(plain.hit_count(), regularized.hit_count());

        let distance = |t: &InputTransform| {
            t.shift.iter().map(|q| q.abs()).sum::<NNFloat>()
                + t.scale.iter().map(|p| (1. - p).abs()).sum::<NNFloat>()
        };
        let plain_d = distance(&plain.transform().unwrap());
        let regularized_d = distance(&regularized.transform().unwrap());
        assert!(regularized_d <= plain_d + 1e-6);
        // the identity already attains the maximal hit count here, so the
        // penalty must drive the transform onto it
        assert!(regularized_d <= 1e-4);
    }

    #[test]
    fn test_only_true_class_counter_can_fire() {
        let net = tightened_network();
        let inputs = vec![array![0.5, 0.5]];
        let labels = vec![net.classify(inputs[0].view())];
        let result = PerturbationQuery::new(&net, inputs, labels.clone())
            .with_components(false, true)
            .with_time_limit(Some(Duration::from_secs(60)))
            .solve();
        assert!(result.status().has_solution());
        let counters = result.counters(0).unwrap();
        for (c, &fired) in counters.iter().enumerate() {
            if c != labels[0] {
                assert!(!fired);
            }
        }
    }
}

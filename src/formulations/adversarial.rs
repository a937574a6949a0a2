//! Minimal-perturbation adversarial example search.
//!
//! Given a source input and a target class, find the input of smallest
//! total absolute deviation that the network scores for the target class
//! with at least a 20% margin over every other class. An optional fixed
//! affine input transform replays a previously synthesized perturbation in
//! front of the first hidden layer, which is how the defense produced by
//! the perturbation-synthesis formulation gets re-attacked.

use crate::dnn::Network;
use crate::encode::{free_input_vars, NetworkEncoding};
use crate::milp::{
    self, CmpOp, LinExpr, MilpOutcome, MilpProblem, Sense, SolveConfig, SolveStatus, VarId,
};
use crate::{NNFloat, DOMINANCE_MARGIN, UNBOUNDED};
use log::info;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A fixed per-input-dimension affine transform `a_i = scale_i * x_i +
/// shift_i` applied in front of the first hidden layer.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct InputTransform {
    pub scale: Array1<NNFloat>,
    pub shift: Array1<NNFloat>,
}

impl InputTransform {
    pub fn identity(dim: usize) -> Self {
        Self {
            scale: Array1::ones(dim),
            shift: Array1::zeros(dim),
        }
    }

    pub fn apply(&self, input: &Array1<NNFloat>) -> Array1<NNFloat> {
        &self.scale * input + &self.shift
    }
}

/// One adversarial-example query. Build with [`AdversarialQuery::new`],
/// adjust, then [`AdversarialQuery::solve`].
#[derive(Clone, Debug)]
pub struct AdversarialQuery<'a> {
    network: &'a Network,
    input: Array1<NNFloat>,
    target_class: usize,
    max_deviation: NNFloat,
    gap_tolerance: Option<NNFloat>,
    time_limit: Option<Duration>,
    transform: Option<InputTransform>,
}

impl<'a> AdversarialQuery<'a> {
    /// # Panics
    /// If `input` does not match the network or `target_class` the output
    /// dimension.
    pub fn new(
        network: &'a Network,
        input: Array1<NNFloat>,
        target_class: usize,
        max_deviation: NNFloat,
    ) -> Self {
        assert_eq!(input.len(), network.input_dim());
        assert!(target_class < network.output_dim());
        Self {
            network,
            input,
            target_class,
            max_deviation,
            gap_tolerance: None,
            time_limit: Some(Duration::from_secs(300)),
            transform: None,
        }
    }

    /// Accept any incumbent within this relative optimality gap (the
    /// original experiments used 1%).
    pub fn with_gap_tolerance(mut self, gap: NNFloat) -> Self {
        self.gap_tolerance = Some(gap);
        self
    }

    pub fn with_time_limit(mut self, limit: Option<Duration>) -> Self {
        self.time_limit = limit;
        self
    }

    /// Replay a fixed input transform in front of the first hidden layer.
    ///
    /// # Panics
    /// If the transform dimension does not match the input.
    pub fn with_transform(mut self, transform: InputTransform) -> Self {
        assert_eq!(transform.scale.len(), self.input.len());
        assert_eq!(transform.shift.len(), self.input.len());
        self.transform = Some(transform);
        self
    }

    /// Builds and solves the MILP. Infeasibility and truncation are
    /// reported through the result's status, never as errors.
    pub fn solve(&self) -> AdversarialResult {
        let mut problem = MilpProblem::new();
        let (input_vars, mut input_exprs) = free_input_vars(&mut problem, self.network);

        // the transform rewrites each input expression to scale*x + shift
        if let Some(ref transform) = self.transform {
            input_exprs = input_vars
                .iter()
                .enumerate()
                .map(|(i, &v)| {
                    let mut e = LinExpr::term(v, transform.scale[i]);
                    e.add_constant(transform.shift[i]);
                    e
                })
                .collect();
        }

        let encoding = NetworkEncoding::encode(&mut problem, self.network, &input_exprs);

        // disturbance variables and their two-sided absolute-value
        // linearization: d_i >= x0_i - input_i and -d_i <= x0_i - input_i,
        // so d_i = |x0_i - input_i| at any minimizing optimum
        let d_vars: Vec<VarId> = input_vars
            .iter()
            .enumerate()
            .map(|(i, &x0)| {
                let d = problem.add_var(0., UNBOUNDED);
                let mut upper = LinExpr::term(d, 1.);
                upper.add_term(x0, -1.);
                problem.add_constraint(upper, CmpOp::Ge, -self.input[i]);
                let mut lower = LinExpr::term(d, -1.);
                lower.add_term(x0, -1.);
                problem.add_constraint(lower, CmpOp::Le, -self.input[i]);
                problem.add_constraint(LinExpr::term(d, 1.), CmpOp::Le, self.max_deviation);
                d
            })
            .collect();

        // target dominance: x_K[t] >= 1.2 * x_K[c] for every c != t
        let output = encoding.output();
        for (c, &xc) in output.iter().enumerate() {
            if c != self.target_class {
                let mut dom = LinExpr::term(output[self.target_class], 1.);
                dom.add_term(xc, -DOMINANCE_MARGIN);
                problem.add_constraint(dom, CmpOp::Ge, 0.);
            }
        }

        let mut objective = LinExpr::new();
        for &d in &d_vars {
            objective.add_term(d, 1.);
        }
        problem.set_objective(Sense::Minimize, objective);

        let config = SolveConfig {
            time_limit: self.time_limit,
            relative_gap: self.gap_tolerance,
        };
        let outcome = milp::solve(&problem, &config);
        info!(
            "adversarial target {}: {:?}, objective {:?}",
            self.target_class, outcome.status, outcome.objective
        );

        AdversarialResult {
            outcome,
            encoding,
            input_vars,
            original: self.input.clone(),
        }
    }
}

/// Outcome of an adversarial query, with the variable table needed to read
/// back the recovered input and any layer's activations.
#[derive(Clone, Debug)]
pub struct AdversarialResult {
    outcome: MilpOutcome,
    encoding: NetworkEncoding,
    input_vars: Vec<VarId>,
    original: Array1<NNFloat>,
}

impl AdversarialResult {
    pub fn status(&self) -> SolveStatus {
        self.outcome.status
    }

    /// Whether the search certified an optimum (the original experiments
    /// also counted gap-tolerance hits, which report as `Optimal`).
    pub fn solved(&self) -> bool {
        self.outcome.status.is_solved()
    }

    /// Total disturbance `sum d_i` of the incumbent, if any.
    pub fn total_disturbance(&self) -> Option<NNFloat> {
        self.outcome.objective
    }

    pub fn relative_gap(&self) -> Option<NNFloat> {
        self.outcome.relative_gap
    }

    pub fn nodes(&self) -> u64 {
        self.outcome.nodes
    }

    /// The adversarial input, when an incumbent exists.
    pub fn recovered_input(&self) -> Option<Array1<NNFloat>> {
        self.outcome
            .status
            .has_solution()
            .then(|| Array1::from_vec(self.outcome.values_of(&self.input_vars)))
    }

    pub fn original_input(&self) -> &Array1<NNFloat> {
        &self.original
    }

    /// Solved `(x, s)` activations of computed layer `k`.
    pub fn layer_activations(&self, k: usize) -> Option<(Array1<NNFloat>, Array1<NNFloat>)> {
        self.outcome.status.has_solution().then(|| {
            let vars = self.encoding.layer(k);
            (
                Array1::from_vec(self.outcome.values_of(&vars.x)),
                Array1::from_vec(self.outcome.values_of(&vars.s)),
            )
        })
    }

    /// Solved output-layer activations.
    pub fn output_activations(&self) -> Option<Array1<NNFloat>> {
        self.outcome
            .status
            .has_solution()
            .then(|| Array1::from_vec(self.outcome.values_of(self.encoding.output())))
    }
}

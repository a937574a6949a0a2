//! Feature visualization: the input, free within the domain bounds, that
//! maximally activates one output class. No disturbance machinery, no
//! dominance constraints; the recovered input is the network's canonical
//! pattern for the class.

use crate::dnn::Network;
use crate::encode::{free_input_vars, NetworkEncoding};
use crate::milp::{self, LinExpr, MilpOutcome, MilpProblem, Sense, SolveConfig, SolveStatus, VarId};
use crate::NNFloat;
use log::info;
use ndarray::Array1;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct VisualizeQuery<'a> {
    network: &'a Network,
    target_class: usize,
    time_limit: Option<Duration>,
}

impl<'a> VisualizeQuery<'a> {
    /// # Panics
    /// If `target_class` is out of range.
    pub fn new(network: &'a Network, target_class: usize) -> Self {
        assert!(target_class < network.output_dim());
        Self {
            network,
            target_class,
            time_limit: None,
        }
    }

    pub fn with_time_limit(mut self, limit: Option<Duration>) -> Self {
        self.time_limit = limit;
        self
    }

    pub fn solve(&self) -> VisualizeResult {
        let mut problem = MilpProblem::new();
        let (input_vars, input_exprs) = free_input_vars(&mut problem, self.network);
        let encoding = NetworkEncoding::encode(&mut problem, self.network, &input_exprs);
        problem.set_objective(
            Sense::Maximize,
            LinExpr::term(encoding.output()[self.target_class], 1.),
        );

        let config = SolveConfig {
            time_limit: self.time_limit,
            relative_gap: None,
        };
        let outcome = milp::solve(&problem, &config);
        info!(
            "visualization of class {}: {:?}, activation {:?}",
            self.target_class, outcome.status, outcome.objective
        );

        VisualizeResult {
            outcome,
            input_vars,
        }
    }
}

#[derive(Clone, Debug)]
pub struct VisualizeResult {
    outcome: MilpOutcome,
    input_vars: Vec<VarId>,
}

impl VisualizeResult {
    pub fn status(&self) -> SolveStatus {
        self.outcome.status
    }

    pub fn solved(&self) -> bool {
        self.outcome.status.is_solved()
    }

    /// The attained target-class activation.
    pub fn activation(&self) -> Option<NNFloat> {
        self.outcome.objective
    }

    /// The canonical class-preferred input.
    pub fn canonical_input(&self) -> Option<Array1<NNFloat>> {
        self.outcome
            .status
            .has_solution()
            .then(|| Array1::from_vec(self.outcome.values_of(&self.input_vars)))
    }
}

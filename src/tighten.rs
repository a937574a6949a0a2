//! Optimization-based bound tightening.
//!
//! For every neuron, in strictly ascending layer order, a sub-network MILP
//! is solved twice: maximize the neuron's `x` part, then its `s` part. The
//! solver's best proven bound is a valid upper bound on the relaxation even
//! when the solve is truncated, which is the soundness property the fast
//! mode relies on. Within one layer the per-neuron sub-problems are
//! independent (they read only finalized earlier bounds and write disjoint
//! slots), so they run in parallel; across layers the order is mandatory.

use crate::dnn::Network;
use crate::encode::{free_input_vars, NetworkEncoding};
use crate::milp::{self, LinExpr, MilpProblem, Sense, SolveConfig};
use crate::{NNFloat, UNBOUNDED};
use log::{debug, info};
use ndarray::Array1;
use rayon::prelude::*;
use std::time::{Duration, Instant};

/// How hard to push each per-neuron solve.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TightenMode {
    /// Run every solve to certified optimality.
    Certified,
    /// Cap each solve; the best bound reported at truncation is still a
    /// sound upper bound, just possibly loose.
    TimeBudgeted(Duration),
}

impl TightenMode {
    fn solve_config(self) -> SolveConfig {
        match self {
            Self::Certified => SolveConfig::default(),
            Self::TimeBudgeted(limit) => SolveConfig::with_time_limit(limit),
        }
    }
}

/// Per-layer accounting returned by [`tighten_bounds`].
#[derive(Clone, Debug, Default)]
pub struct TightenStats {
    pub neurons: usize,
    pub solves: usize,
    pub elapsed: Duration,
}

impl std::fmt::Display for TightenStats {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} neurons, {} solves, {:.2}s",
            self.neurons,
            self.solves,
            self.elapsed.as_secs_f64()
        )
    }
}

/// Tightens the `x`/`s` upper bounds of every computed layer in place.
/// Lower bounds stay at their non-negativity default; upper bounds only
/// ever decrease.
pub fn tighten_bounds(network: &mut Network, mode: TightenMode) -> Vec<TightenStats> {
    let config = mode.solve_config();
    let mut stats = Vec::with_capacity(network.num_layers());

    for k in 1..=network.num_layers() {
        let start = Instant::now();
        let n = network.layer(k).num_neurons();

        let bounds: Vec<(NNFloat, NNFloat)> = (0..n)
            .into_par_iter()
            .map(|j| {
                let snapshot = network.bound_snapshot(k, j);
                tighten_neuron(&snapshot, &config)
            })
            .collect();

        let x_upper = Array1::from_iter(bounds.iter().map(|b| b.0));
        let s_upper = Array1::from_iter(bounds.iter().map(|b| b.1));
        network.layer_mut(k).tighten_upper(&x_upper, &s_upper);

        let layer_stats = TightenStats {
            neurons: n,
            solves: 2 * n,
            elapsed: start.elapsed(),
        };
        info!(
            "layer {}: tightened {} neurons in {:.2}s",
            k,
            n,
            layer_stats.elapsed.as_secs_f64()
        );
        debug!("layer {} xUB: {}", k, x_upper);
        debug!("layer {} sUB: {}", k, s_upper);
        stats.push(layer_stats);
    }
    stats
}

/// Upper bounds on the `x` and `s` parts of the snapshot's single output
/// neuron.
fn tighten_neuron(snapshot: &Network, config: &SolveConfig) -> (NNFloat, NNFloat) {
    let k = snapshot.num_layers();
    let x_ub = maximize_part(snapshot, config, Part::Active);
    let s_ub = maximize_part(snapshot, config, Part::Suppressed);
    debug!("layer {} neuron bounds: x <= {}, s <= {}", k, x_ub, s_ub);
    (x_ub, s_ub)
}

#[derive(Clone, Copy)]
enum Part {
    Active,
    Suppressed,
}

fn maximize_part(snapshot: &Network, config: &SolveConfig, part: Part) -> NNFloat {
    let mut problem = MilpProblem::new();
    let (_, inputs) = free_input_vars(&mut problem, snapshot);
    let encoding = NetworkEncoding::encode(&mut problem, snapshot, &inputs);
    let last = encoding.layer(snapshot.num_layers());
    let var = match part {
        Part::Active => last.x[0],
        Part::Suppressed => last.s[0],
    };
    problem.set_objective(Sense::Maximize, LinExpr::term(var, 1.));

    let outcome = milp::solve(&problem, config);
    // The dual bound, not the incumbent: valid even when truncated. A solve
    // that produced no bound at all leaves the sentinel in place.
    match outcome.best_bound {
        Some(bound) if bound.is_finite() => bound.max(0.),
        _ => UNBOUNDED,
    }
}

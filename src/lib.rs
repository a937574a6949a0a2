#![allow(clippy::must_use_candidate)]
//! MILP encodings of feed-forward ReLU networks.
//!
//! A trained network is modeled as a mixed-integer linear program in which
//! every neuron's pre-activation is split into a non-negative active part
//! `x` and a non-negative suppressed part `s`, tied together by a binary
//! complementarity indicator. On top of this one encoding primitive the
//! crate builds four query formulations: minimal-perturbation adversarial
//! examples, optimization-based bound tightening, synthesis of a single
//! input transform that fools many examples at once, and class-maximizing
//! feature visualization.

pub mod bounds;
pub mod dnn;
pub mod encode;
pub mod error;
pub mod formulations;
pub mod io;
pub mod milp;
pub mod tighten;

mod test_util;

pub use crate::bounds::Bounds1;
pub use crate::dnn::{Layer, Network};
pub use crate::encode::NetworkEncoding;
pub use crate::error::{ModelError, Result};
pub use crate::formulations::adversarial::{AdversarialQuery, AdversarialResult, InputTransform};
pub use crate::formulations::perturbation::{PerturbationQuery, PerturbationResult};
pub use crate::formulations::visualize::{VisualizeQuery, VisualizeResult};
pub use crate::milp::{MilpOutcome, MilpProblem, SolveConfig, SolveStatus};
pub use crate::tighten::{tighten_bounds, TightenMode, TightenStats};

/// Scalar type used throughout the crate.
pub type NNFloat = f64;

/// Sentinel upper bound for activations that have not been tightened yet.
/// Large enough to be inactive for any network this crate is pointed at,
/// small enough to keep the lowered indicator constraints numerically sane.
pub const UNBOUNDED: NNFloat = 1e6;

/// Relative margin by which a target class activation must dominate every
/// other class for a query to count as a misclassification.
pub const DOMINANCE_MARGIN: NNFloat = 1.2;

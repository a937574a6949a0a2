//! Query formulations built on the shared network encoding: adversarial
//! example search, universal-perturbation synthesis, and feature
//! visualization. Each builds one [`crate::milp::MilpProblem`] per query
//! against the network's current bound state, solves it, and keeps the
//! outcome alongside the variable table so any encoded quantity can be
//! read back afterwards.

pub mod adversarial;
pub mod perturbation;
pub mod visualize;

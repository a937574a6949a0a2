//! Solver-neutral MILP problem model and outcome types.
//!
//! Formulations build a [`MilpProblem`] value (variables, linear
//! constraints, indicator constraints, one objective) and hand it to the
//! backend's `solve` entry point. The backend is chosen at compile time;
//! the native solver session is created and released inside `solve`, so a
//! batch of hundreds of short-lived queries cannot leak solver resources.
//!
//! Indicator constraints are first-class here: the ReLU complementarity
//! encoding states `z = 1 => x = 0` directly instead of multiplying by a
//! big-M constant. A backend with native indicator support passes them
//! through; the CBC backend lowers each one to a linear constraint whose
//! slack is scoped by the stored variable bounds, which is why tightened
//! bounds shrink the branch-and-bound search without changing correctness.

use crate::NNFloat;
use std::time::Duration;

cfg_if::cfg_if! {
    if #[cfg(feature = "milp_gurobi")] {
        mod gurobi;
        pub use gurobi::solve;
    } else if #[cfg(feature = "milp_coincbc")] {
        mod coincbc;
        pub use coincbc::solve;
    } else {
        compile_error!("Must enable one of \"milp_{{gurobi,coincbc}}\"");
    }
}

/// Arena index of a variable within one [`MilpProblem`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VarId(pub(crate) usize);

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum VarKind {
    Continuous { lb: NNFloat, ub: NNFloat },
    Binary,
}

/// A linear expression: `sum(coeff * var) + constant`.
#[derive(Clone, Debug, Default)]
pub struct LinExpr {
    pub(crate) terms: Vec<(VarId, NNFloat)>,
    pub(crate) constant: NNFloat,
}

impl LinExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn constant(value: NNFloat) -> Self {
        Self {
            terms: Vec::new(),
            constant: value,
        }
    }

    pub fn term(var: VarId, coeff: NNFloat) -> Self {
        Self {
            terms: vec![(var, coeff)],
            constant: 0.,
        }
    }

    pub fn add_term(&mut self, var: VarId, coeff: NNFloat) -> &mut Self {
        self.terms.push((var, coeff));
        self
    }

    pub fn add_constant(&mut self, value: NNFloat) -> &mut Self {
        self.constant += value;
        self
    }

    /// Evaluates the expression against a solved variable assignment.
    pub fn eval(&self, values: &[NNFloat]) -> NNFloat {
        self.constant
            + self
                .terms
                .iter()
                .map(|&(v, c)| c * values[v.0])
                .sum::<NNFloat>()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Le,
    Ge,
    Eq,
}

#[derive(Clone, Debug)]
pub struct LinConstraint {
    pub expr: LinExpr,
    pub op: CmpOp,
    pub rhs: NNFloat,
}

/// `trigger == active_value  =>  implied`.
#[derive(Clone, Debug)]
pub struct Indicator {
    pub trigger: VarId,
    pub active_value: bool,
    pub implied: LinConstraint,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sense {
    Minimize,
    Maximize,
}

/// An in-memory MILP, independent of any solver.
#[derive(Clone, Debug, Default)]
pub struct MilpProblem {
    pub(crate) vars: Vec<VarKind>,
    pub(crate) constraints: Vec<LinConstraint>,
    pub(crate) indicators: Vec<Indicator>,
    pub(crate) objective: Option<(Sense, LinExpr)>,
}

impl MilpProblem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_var(&mut self, lb: NNFloat, ub: NNFloat) -> VarId {
        self.vars.push(VarKind::Continuous { lb, ub });
        VarId(self.vars.len() - 1)
    }

    pub fn add_binary(&mut self) -> VarId {
        self.vars.push(VarKind::Binary);
        VarId(self.vars.len() - 1)
    }

    pub fn add_constraint(&mut self, expr: LinExpr, op: CmpOp, rhs: NNFloat) {
        self.constraints.push(LinConstraint { expr, op, rhs });
    }

    pub fn add_indicator(&mut self, trigger: VarId, active_value: bool, implied: LinConstraint) {
        self.indicators.push(Indicator {
            trigger,
            active_value,
            implied,
        });
    }

    pub fn set_objective(&mut self, sense: Sense, expr: LinExpr) {
        self.objective = Some((sense, expr));
    }

    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    pub fn bounds_of(&self, var: VarId) -> (NNFloat, NNFloat) {
        match self.vars[var.0] {
            VarKind::Continuous { lb, ub } => (lb, ub),
            VarKind::Binary => (0., 1.),
        }
    }

    /// Interval of values `expr` can take under the variable bounds.
    fn expr_range(&self, expr: &LinExpr) -> (NNFloat, NNFloat) {
        let mut lo = expr.constant;
        let mut hi = expr.constant;
        for &(var, coeff) in &expr.terms {
            let (lb, ub) = self.bounds_of(var);
            if coeff >= 0. {
                lo += coeff * lb;
                hi += coeff * ub;
            } else {
                lo += coeff * ub;
                hi += coeff * lb;
            }
        }
        (lo, hi)
    }

    /// Rewrites an indicator as linear constraints whose slack is derived
    /// from the stored variable bounds, for backends without native
    /// indicator support. The trigger relaxes the constraint completely at
    /// the inactive value and restores it exactly at the active one.
    ///
    /// # Panics
    /// If the implied expression is unbounded in the constrained direction;
    /// every variable this crate places inside an indicator carries finite
    /// bounds.
    pub(crate) fn lower_indicator(&self, ind: &Indicator) -> Vec<LinConstraint> {
        match ind.implied.op {
            CmpOp::Le => vec![self.lower_indicator_le(ind, &ind.implied.expr, ind.implied.rhs)],
            CmpOp::Ge => {
                // E >= r  <=>  -E <= -r
                let mut neg = ind.implied.expr.clone();
                neg.terms.iter_mut().for_each(|t| t.1 = -t.1);
                neg.constant = -neg.constant;
                vec![self.lower_indicator_le(ind, &neg, -ind.implied.rhs)]
            }
            CmpOp::Eq => {
                let le = Indicator {
                    trigger: ind.trigger,
                    active_value: ind.active_value,
                    implied: LinConstraint {
                        expr: ind.implied.expr.clone(),
                        op: CmpOp::Le,
                        rhs: ind.implied.rhs,
                    },
                };
                let ge = Indicator {
                    trigger: ind.trigger,
                    active_value: ind.active_value,
                    implied: LinConstraint {
                        expr: ind.implied.expr.clone(),
                        op: CmpOp::Ge,
                        rhs: ind.implied.rhs,
                    },
                };
                let mut out = self.lower_indicator(&le);
                out.extend(self.lower_indicator(&ge));
                out
            }
        }
    }

    fn lower_indicator_le(&self, ind: &Indicator, expr: &LinExpr, rhs: NNFloat) -> LinConstraint {
        let (_, hi) = self.expr_range(expr);
        assert!(
            hi.is_finite(),
            "indicator over an expression with unbounded variables"
        );
        let slack = (hi - rhs).max(0.);
        let mut expr = expr.clone();
        if ind.active_value {
            // E + slack*z <= rhs + slack
            expr.add_term(ind.trigger, slack);
            LinConstraint {
                expr,
                op: CmpOp::Le,
                rhs: rhs + slack,
            }
        } else {
            // E - slack*z <= rhs
            expr.add_term(ind.trigger, -slack);
            LinConstraint {
                expr,
                op: CmpOp::Le,
                rhs,
            }
        }
    }
}

/// Per-solve limits handed to the oracle. `None` means run to certified
/// optimality.
#[derive(Clone, Copy, Debug, Default)]
pub struct SolveConfig {
    pub time_limit: Option<Duration>,
    pub relative_gap: Option<NNFloat>,
}

impl SolveConfig {
    pub fn with_time_limit(limit: Duration) -> Self {
        Self {
            time_limit: Some(limit),
            ..Self::default()
        }
    }
}

/// The three-way (plus unknown) outcome every caller must distinguish.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolveStatus {
    /// Certified optimal (or within the requested relative gap).
    Optimal,
    /// Truncated with an incumbent: best values retrievable, not certified.
    Feasible,
    /// Proven infeasible; no assignment exists.
    Infeasible,
    /// Truncated with no incumbent; nothing is known either way.
    Unknown,
}

impl SolveStatus {
    /// Did the search certify an optimum?
    pub fn is_solved(self) -> bool {
        matches!(self, Self::Optimal)
    }

    /// Is a variable assignment available?
    pub fn has_solution(self) -> bool {
        matches!(self, Self::Optimal | Self::Feasible)
    }
}

/// Everything a solve reports: status, incumbent objective, best proven
/// bound, diagnostics, and the full variable assignment when one exists.
#[derive(Clone, Debug)]
pub struct MilpOutcome {
    pub status: SolveStatus,
    pub objective: Option<NNFloat>,
    pub best_bound: Option<NNFloat>,
    pub relative_gap: Option<NNFloat>,
    pub nodes: u64,
    pub(crate) values: Vec<NNFloat>,
}

impl MilpOutcome {
    /// Solved value of `var`.
    ///
    /// # Panics
    /// If no incumbent is available.
    pub fn value(&self, var: VarId) -> NNFloat {
        assert!(self.status.has_solution(), "no incumbent to read");
        self.values[var.0]
    }

    pub fn values_of(&self, vars: &[VarId]) -> Vec<NNFloat> {
        vars.iter().map(|&v| self.value(v)).collect()
    }

    pub(crate) fn no_solution(status: SolveStatus, best_bound: Option<NNFloat>) -> Self {
        Self {
            status,
            objective: None,
            best_bound,
            relative_gap: None,
            nodes: 0,
            values: Vec::new(),
        }
    }
}

pub(crate) fn relative_gap(objective: NNFloat, best_bound: NNFloat) -> NNFloat {
    (objective - best_bound).abs() / objective.abs().max(1e-10)
}

#[cfg(test)]
mod test {
    use super::*;

    fn toy_problem() -> (MilpProblem, VarId, VarId) {
        let mut problem = MilpProblem::new();
        let x = problem.add_var(0., 10.);
        let z = problem.add_binary();
        (problem, x, z)
    }

    #[test]
    fn test_lowering_eq_active() {
        // z = 1 => x = 0 over x in [0, 10]
        let (problem, x, z) = toy_problem();
        let ind = Indicator {
            trigger: z,
            active_value: true,
            implied: LinConstraint {
                expr: LinExpr::term(x, 1.),
                op: CmpOp::Eq,
                rhs: 0.,
            },
        };
        let lowered = problem.lower_indicator(&ind);
        assert_eq!(lowered.len(), 2);
        // x + 10z <= 10: binds x to 0 at z = 1, vacuous at z = 0
        let le = &lowered[0];
        assert_eq!(le.op, CmpOp::Le);
        assert_eq!(le.rhs, 10.);
        assert_eq!(le.expr.terms, vec![(x, 1.), (z, 10.)]);
        // -x + 0z <= 0: the Ge side is already implied by the lower bound
        let ge = &lowered[1];
        assert_eq!(ge.rhs, 0.);
        assert_eq!(ge.expr.terms, vec![(x, -1.), (z, 0.)]);
    }

    #[test]
    fn test_lowering_inactive_trigger() {
        // z = 0 => x <= 2
        let (problem, x, z) = toy_problem();
        let ind = Indicator {
            trigger: z,
            active_value: false,
            implied: LinConstraint {
                expr: LinExpr::term(x, 1.),
                op: CmpOp::Le,
                rhs: 2.,
            },
        };
        let lowered = problem.lower_indicator(&ind);
        assert_eq!(lowered.len(), 1);
        // x - 8z <= 2: binds at z = 0, allows x = 10 at z = 1
        assert_eq!(lowered[0].rhs, 2.);
        assert_eq!(lowered[0].expr.terms, vec![(x, 1.), (z, -8.)]);
    }

    #[test]
    fn test_expr_eval() {
        let mut e = LinExpr::constant(1.);
        e.add_term(VarId(0), 2.).add_term(VarId(1), -1.);
        assert_eq!(e.eval(&[3., 4.]), 3.);
    }
}

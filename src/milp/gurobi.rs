use crate::milp::{
    relative_gap, CmpOp, LinConstraint, MilpOutcome, MilpProblem, Sense, SolveConfig, SolveStatus,
    VarKind,
};
use grb::constr::IneqExpr;
use grb::expr::{Expr, LinExpr};
use grb::prelude::{add_var, attr, param, ConstrSense, Model, ModelSense, Status};
use grb::Env;
use grb::VarType::{Binary, Continuous};

/// Solves `problem` with Gurobi. Indicators are lowered with the shared
/// bound-scoped rewrite so both backends solve the identical model.
///
/// # Panics
/// If the Gurobi environment cannot be created or an attribute query fails.
pub fn solve(problem: &MilpProblem, config: &SolveConfig) -> MilpOutcome {
    let mut env = Env::empty().unwrap();
    env.set(param::OutputFlag, 0).unwrap();
    env.set(param::LogFile, String::new()).unwrap();
    let env = env.start().unwrap();
    let mut model = Model::with_env("", &env).unwrap();

    if let Some(limit) = config.time_limit {
        model.set_param(param::TimeLimit, limit.as_secs_f64()).unwrap();
    }
    if let Some(gap) = config.relative_gap {
        model.set_param(param::MIPGap, gap).unwrap();
    }

    let vars: Vec<_> = problem
        .vars
        .iter()
        .enumerate()
        .map(|(i, kind)| match *kind {
            VarKind::Continuous { lb, ub } => {
                add_var!(model, Continuous, obj: 0.0, name: &format!("v{}", i), bounds: lb..ub)
                    .unwrap()
            }
            VarKind::Binary => {
                add_var!(model, Binary, obj: 0.0, name: &format!("v{}", i)).unwrap()
            }
        })
        .collect();

    let to_ineq = |constraint: &LinConstraint| {
        let mut lhs = LinExpr::new();
        for &(var, coeff) in &constraint.expr.terms {
            lhs.add_term(coeff, vars[var.0]);
        }
        let sense = match constraint.op {
            CmpOp::Le => ConstrSense::Less,
            CmpOp::Ge => ConstrSense::Greater,
            CmpOp::Eq => ConstrSense::Equal,
        };
        IneqExpr {
            lhs: Expr::Linear(lhs),
            sense,
            rhs: Expr::Constant(constraint.rhs - constraint.expr.constant),
        }
    };
    for (i, constraint) in problem.constraints.iter().enumerate() {
        model.add_constr(&format!("c{}", i), to_ineq(constraint)).unwrap();
    }
    for (i, indicator) in problem.indicators.iter().enumerate() {
        for (h, lowered) in problem.lower_indicator(indicator).into_iter().enumerate() {
            model
                .add_constr(&format!("i{}_{}", i, h), to_ineq(&lowered))
                .unwrap();
        }
    }

    let mut objective_offset = 0.;
    if let Some((sense, ref expr)) = problem.objective {
        objective_offset = expr.constant;
        let mut obj = LinExpr::new();
        for &(var, coeff) in &expr.terms {
            obj.add_term(coeff, vars[var.0]);
        }
        let sense = match sense {
            Sense::Minimize => ModelSense::Minimize,
            Sense::Maximize => ModelSense::Maximize,
        };
        model.set_objective(Expr::Linear(obj), sense).unwrap();
    }

    model.optimize().unwrap();
    let status = model.status().unwrap();
    let nodes = model.get_attr(attr::NodeCount).unwrap_or(0.) as u64;
    let sol_count = model.get_attr(attr::SolCount).unwrap_or(0);

    let status = match status {
        Status::Optimal => SolveStatus::Optimal,
        Status::Infeasible | Status::InfOrUnbd => SolveStatus::Infeasible,
        _ if sol_count > 0 => SolveStatus::Feasible,
        _ => SolveStatus::Unknown,
    };
    if !status.has_solution() {
        let bound = if status == SolveStatus::Infeasible {
            None
        } else {
            model
                .get_attr(attr::ObjBound)
                .ok()
                .map(|b| b + objective_offset)
        };
        let mut outcome = MilpOutcome::no_solution(status, bound);
        outcome.nodes = nodes;
        return outcome;
    }

    let objective = model.get_attr(attr::ObjVal).unwrap() + objective_offset;
    let best_bound = model
        .get_attr(attr::ObjBound)
        .ok()
        .map(|b| b + objective_offset);
    MilpOutcome {
        status,
        objective: Some(objective),
        best_bound,
        relative_gap: best_bound.map(|b| relative_gap(objective, b)),
        nodes,
        values: model.get_obj_attr_batch(attr::X, vars).unwrap(),
    }
}

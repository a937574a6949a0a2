use crate::milp::{
    relative_gap, CmpOp, LinConstraint, MilpOutcome, MilpProblem, Sense, SolveConfig, SolveStatus,
    VarKind,
};
use coin_cbc::{Col, Model};

/// Solves `problem` with COIN-OR CBC. The native model is created, solved
/// and dropped inside this call; indicator constraints are lowered to
/// bound-scoped linear constraints since CBC has no native indicator
/// support.
pub fn solve(problem: &MilpProblem, config: &SolveConfig) -> MilpOutcome {
    let mut _shh_out;
    let mut _shh_err;
    if !cfg!(test) {
        _shh_out = shh::stdout().unwrap();
        _shh_err = shh::stderr().unwrap();
    }

    let mut model = Model::default();
    model.set_parameter("logLevel", "0");
    if let Some(limit) = config.time_limit {
        model.set_parameter("seconds", &format!("{}", limit.as_secs_f64()));
    }
    if let Some(gap) = config.relative_gap {
        model.set_parameter("ratioGap", &format!("{}", gap));
    }

    let cols: Vec<Col> = problem
        .vars
        .iter()
        .map(|kind| {
            let col = model.add_col();
            match *kind {
                VarKind::Continuous { lb, ub } => {
                    model.set_col_lower(col, lb);
                    model.set_col_upper(col, ub);
                }
                VarKind::Binary => {
                    model.set_integer(col);
                    model.set_col_lower(col, 0.);
                    model.set_col_upper(col, 1.);
                }
            }
            col
        })
        .collect();

    let add_row = |model: &mut Model, constraint: &LinConstraint| {
        let row = model.add_row();
        for &(var, coeff) in &constraint.expr.terms {
            model.set_weight(row, cols[var.0], coeff);
        }
        // fold the expression constant into the right-hand side
        let rhs = constraint.rhs - constraint.expr.constant;
        match constraint.op {
            CmpOp::Le => model.set_row_upper(row, rhs),
            CmpOp::Ge => model.set_row_lower(row, rhs),
            CmpOp::Eq => {
                model.set_row_lower(row, rhs);
                model.set_row_upper(row, rhs);
            }
        }
    };
    for constraint in &problem.constraints {
        add_row(&mut model, constraint);
    }
    for indicator in &problem.indicators {
        for lowered in problem.lower_indicator(indicator) {
            add_row(&mut model, &lowered);
        }
    }

    let mut objective_offset = 0.;
    if let Some((sense, ref expr)) = problem.objective {
        model.set_obj_sense(match sense {
            Sense::Minimize => coin_cbc::Sense::Minimize,
            Sense::Maximize => coin_cbc::Sense::Maximize,
        });
        objective_offset = expr.constant;
        // accumulate: the same variable may appear in several terms
        let mut coeffs = vec![0.; problem.vars.len()];
        for &(var, coeff) in &expr.terms {
            coeffs[var.0] += coeff;
        }
        for (i, &coeff) in coeffs.iter().enumerate() {
            if coeff != 0. {
                model.set_obj_coeff(cols[i], coeff);
            }
        }
    }

    let solution = model.solve();
    let raw = solution.raw();

    let best_bound = Some(raw.best_possible_value() + objective_offset);
    let status = if raw.is_proven_optimal() {
        SolveStatus::Optimal
    } else if raw.is_proven_infeasible() {
        SolveStatus::Infeasible
    } else if raw.secondary_status() == coin_cbc::raw::SecondaryStatus::HasSolution {
        SolveStatus::Feasible
    } else {
        SolveStatus::Unknown
    };

    if !status.has_solution() {
        let bound = if status == SolveStatus::Infeasible {
            None
        } else {
            best_bound
        };
        return MilpOutcome::no_solution(status, bound);
    }

    let objective = raw.obj_value() + objective_offset;
    let gap = best_bound.map(|b| relative_gap(objective, b));
    MilpOutcome {
        status,
        objective: Some(objective),
        best_bound,
        relative_gap: gap,
        // not exposed through the Cbc C bindings
        nodes: 0,
        values: cols.iter().map(|&c| solution.col(c)).collect(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::milp::{LinExpr, Sense};
    use approx::assert_relative_eq;

    #[test]
    fn test_lp_corner() {
        // max x + y s.t. x + 2y <= 4, x,y in [0, 3]
        let mut problem = MilpProblem::new();
        let x = problem.add_var(0., 3.);
        let y = problem.add_var(0., 3.);
        let mut lhs = LinExpr::new();
        lhs.add_term(x, 1.).add_term(y, 2.);
        problem.add_constraint(lhs, CmpOp::Le, 4.);
        let mut obj = LinExpr::new();
        obj.add_term(x, 1.).add_term(y, 1.);
        problem.set_objective(Sense::Maximize, obj);

        let outcome = solve(&problem, &SolveConfig::default());
        assert_eq!(outcome.status, SolveStatus::Optimal);
        assert_relative_eq!(outcome.objective.unwrap(), 3.5, epsilon = 1e-6);
        assert_relative_eq!(outcome.value(x), 3., epsilon = 1e-6);
        assert_relative_eq!(outcome.value(y), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_indicator_forces_zero() {
        // z = 1 => x = 0; maximize x + 2z prefers z but must then zero x
        let mut problem = MilpProblem::new();
        let x = problem.add_var(0., 1.);
        let z = problem.add_binary();
        problem.add_indicator(
            z,
            true,
            LinConstraint {
                expr: LinExpr::term(x, 1.),
                op: CmpOp::Eq,
                rhs: 0.,
            },
        );
        let mut obj = LinExpr::new();
        obj.add_term(x, 1.).add_term(z, 2.);
        problem.set_objective(Sense::Maximize, obj);

        let outcome = solve(&problem, &SolveConfig::default());
        assert_eq!(outcome.status, SolveStatus::Optimal);
        assert_relative_eq!(outcome.value(z), 1., epsilon = 1e-6);
        assert_relative_eq!(outcome.value(x), 0., epsilon = 1e-6);
    }

    #[test]
    fn test_infeasible_is_reported_not_panicked() {
        let mut problem = MilpProblem::new();
        let x = problem.add_var(0., 1.);
        problem.add_constraint(LinExpr::term(x, 1.), CmpOp::Ge, 2.);
        problem.set_objective(Sense::Minimize, LinExpr::term(x, 1.));
        let outcome = solve(&problem, &SolveConfig::default());
        assert_eq!(outcome.status, SolveStatus::Infeasible);
        assert!(outcome.objective.is_none());
    }
}

// src/solver/backend.rs

//! [`LpSolver`] on top of `good_lp`.
//!
//! Continuous programs go to Clarabel, which reports row duals. Programs with
//! integer columns go to microlp's branch and bound and come back without
//! duals.

use crate::solver::lp::{LinearProgram, LpSolution, Sense, SolveStatus};
use crate::solver::traits::LpSolver;
use good_lp::solvers::clarabel::clarabel;
use good_lp::solvers::microlp::microlp;
use good_lp::solvers::{DualValues, SolutionWithDual};
use good_lp::{
    constraint, variable, Constraint, Expression, ProblemVariables, ResolutionError, Solution, SolverModel,
    Variable,
};

/// Primal-dual gap and feasibility tolerance handed to Clarabel.
const GAP_TOLERANCE: f64 = 1e-10;

#[derive(Debug, Clone, Copy, Default)]
pub struct GoodLpBackend;

/// A program in good_lp's terms. Every `>=` row is negated into a `<=` row;
/// `signs` records which.
struct Translated {
    variables: ProblemVariables,
    objective: Expression,
    columns: Vec<Variable>,
    rows: Vec<Constraint>,
    signs: Vec<f64>,
}

fn translate(program: &LinearProgram) -> Translated {
    let mut variables = ProblemVariables::new();
    let columns: Vec<Variable> = program
        .variables
        .iter()
        .map(|var| {
            let mut definition = variable();
            if !var.free {
                definition = definition.min(0.0);
            }
            if var.integer {
                definition = definition.integer();
            }
            variables.add(definition)
        })
        .collect();

    let mut objective = Expression::from(0.0);
    for (var, &column) in program.variables.iter().zip(&columns) {
        if var.cost != 0.0 {
            objective += var.cost * column;
        }
    }

    let mut rows = Vec::with_capacity(program.num_constraints());
    let mut signs = Vec::with_capacity(program.num_constraints());
    for row in &program.constraints {
        let sign = if row.sense == Sense::GreaterEq { -1.0 } else { 1.0 };
        let mut lhs = Expression::from(0.0);
        for &(j, a) in &row.terms {
            lhs += (sign * a) * columns[j];
        }
        let rhs = sign * row.rhs;
        rows.push(match row.sense {
            Sense::Equal => constraint!(lhs == rhs),
            Sense::LessEq | Sense::GreaterEq => constraint!(lhs <= rhs),
        });
        signs.push(sign);
    }

    Translated {
        variables,
        objective,
        columns,
        rows,
        signs,
    }
}

fn failure(error: ResolutionError) -> LpSolution {
    match error {
        ResolutionError::Infeasible => LpSolution::failed(SolveStatus::Infeasible),
        ResolutionError::Unbounded => LpSolution::failed(SolveStatus::Unbounded),
        other => {
            log::warn!("backend gave up: {}", other);
            LpSolution::failed(SolveStatus::Failed)
        }
    }
}

impl GoodLpBackend {
    fn solve_continuous(&self, program: &LinearProgram) -> LpSolution {
        let Translated {
            variables,
            objective,
            columns,
            rows,
            signs,
        } = translate(program);
        let mut model = variables.minimise(objective).using(clarabel);
        // Objectives of order 1e4 are compared against an absolute epsilon.
        model
            .settings()
            .tol_gap_abs(GAP_TOLERANCE)
            .tol_gap_rel(GAP_TOLERANCE)
            .tol_feas(GAP_TOLERANCE);
        let references: Vec<_> = rows.into_iter().map(|row| model.add_constraint(row)).collect();
        let mut solution = match model.solve() {
            Ok(solution) => solution,
            Err(error) => return failure(error),
        };

        let values: Vec<f64> = columns.iter().map(|&column| solution.value(column)).collect();
        let objective = program.objective_value(&values);
        let mut duals: Vec<f64> = {
            let reported = solution.compute_dual();
            references
                .iter()
                .zip(&signs)
                .map(|(reference, sign)| -sign * reported.dual(reference.clone()))
                .collect()
        };

        // Clarabel's cone multipliers are `-d objective / d rhs`. Every column
        // is free or `>= 0`, so `c·x = Σ y·b` confirms the orientation when
        // the objective is away from zero.
        let strong: f64 = duals
            .iter()
            .zip(&program.constraints)
            .map(|(y, row)| y * row.rhs)
            .sum();
        if (objective + strong).abs() < (objective - strong).abs() {
            for y in &mut duals {
                *y = -*y;
            }
        }

        LpSolution {
            status: SolveStatus::Optimal,
            objective,
            values,
            duals: Some(duals),
        }
    }

    fn solve_integer(&self, program: &LinearProgram) -> LpSolution {
        let Translated {
            variables,
            objective,
            columns,
            rows,
            ..
        } = translate(program);
        let mut model = variables.minimise(objective).using(microlp);
        for row in rows {
            model = model.with(row);
        }
        let solution = match model.solve() {
            Ok(solution) => solution,
            Err(error) => return failure(error),
        };

        let values: Vec<f64> = program
            .variables
            .iter()
            .zip(&columns)
            .map(|(var, &column)| {
                let value = solution.value(column);
                if var.integer {
                    value.round()
                } else {
                    value
                }
            })
            .collect();
        LpSolution {
            status: SolveStatus::Optimal,
            objective: program.objective_value(&values),
            values,
            duals: None,
        }
    }
}

impl LpSolver for GoodLpBackend {
    fn solve(&self, program: &LinearProgram) -> LpSolution {
        if program.has_integers() {
            self.solve_integer(program)
        } else {
            self.solve_continuous(program)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn duals_are_rhs_sensitivities() {
        // min 2x + 3y  s.t. x + y >= 4, x <= 3
        let mut lp = LinearProgram::new();
        let x = lp.add_variable(2.0, false);
        let y = lp.add_variable(3.0, false);
        lp.add_constraint(vec![(x, 1.0), (y, 1.0)], Sense::GreaterEq, 4.0);
        lp.add_constraint(vec![(x, 1.0)], Sense::LessEq, 3.0);

        let sol = GoodLpBackend.solve(&lp);
        assert_eq!(sol.status, SolveStatus::Optimal);
        assert!(close(sol.values[x], 3.0));
        assert!(close(sol.values[y], 1.0));
        assert!(close(sol.objective, 9.0));

        let duals = sol.duals.unwrap();
        assert!(close(duals[0], 3.0));
        assert!(close(duals[1], -1.0));
    }

    #[test]
    fn equality_and_free_column_duals() {
        // min x + 10 s + t  s.t.  x - s = -2,  t >= 5 with t free
        let mut lp = LinearProgram::new();
        let x = lp.add_variable(1.0, false);
        let s = lp.add_variable(10.0, false);
        let t = lp.add_free_variable(1.0);
        lp.add_constraint(vec![(x, 1.0), (s, -1.0)], Sense::Equal, -2.0);
        lp.add_constraint(vec![(t, 1.0)], Sense::GreaterEq, 5.0);

        let sol = GoodLpBackend.solve(&lp);
        assert!(close(sol.objective, 25.0));
        assert!(close(sol.values[t], 5.0));
        let duals = sol.duals.unwrap();
        // Raising the first rhs by one lowers s by one.
        assert!(close(duals[0], -10.0));
        assert!(close(duals[1], 1.0));
    }

    #[test]
    fn binary_knapsack_has_no_duals() {
        // max 5a + 4b + 3c  s.t. 2a + 3b + c <= 5, binaries (as a minimisation).
        let mut lp = LinearProgram::new();
        let a = lp.add_variable(-5.0, true);
        let b = lp.add_variable(-4.0, true);
        let c = lp.add_variable(-3.0, true);
        lp.add_constraint(vec![(a, 2.0), (b, 3.0), (c, 1.0)], Sense::LessEq, 5.0);
        for j in [a, b, c] {
            lp.add_constraint(vec![(j, 1.0)], Sense::LessEq, 1.0);
        }

        let sol = GoodLpBackend.solve(&lp);
        assert_eq!(sol.status, SolveStatus::Optimal);
        assert_eq!(sol.values, vec![1.0, 1.0, 0.0]);
        assert!(close(sol.objective, -9.0));
        assert!(sol.duals.is_none());
    }

    #[test]
    fn infeasible_program_is_not_optimal() {
        let mut lp = LinearProgram::new();
        let x = lp.add_variable(1.0, false);
        lp.add_constraint(vec![(x, 1.0)], Sense::GreaterEq, 5.0);
        lp.add_constraint(vec![(x, 1.0)], Sense::LessEq, 3.0);
        let sol = GoodLpBackend.solve(&lp);
        assert_ne!(sol.status, SolveStatus::Optimal);
        assert!(sol.duals.is_none());
    }
}

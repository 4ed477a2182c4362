// src/solver/lp.rs

use serde::Serialize;

/// Direction of a linear row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    LessEq,
    GreaterEq,
    Equal,
}

/// A column. Non-free columns are `>= 0`; any other bound is written as a
/// row so that it carries a dual.
#[derive(Debug, Clone)]
pub struct Variable {
    pub cost: f64,
    pub free: bool,
    pub integer: bool,
}

#[derive(Debug, Clone)]
pub struct Constraint {
    pub terms: Vec<(usize, f64)>,
    pub sense: Sense,
    pub rhs: f64,
}

/// A minimisation problem `min c·x  s.t.  rows`, handed to a backend as is.
#[derive(Debug, Clone, Default)]
pub struct LinearProgram {
    pub variables: Vec<Variable>,
    pub constraints: Vec<Constraint>,
}

impl LinearProgram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a column `x >= 0`.
    pub fn add_variable(&mut self, cost: f64, integer: bool) -> usize {
        self.variables.push(Variable {
            cost,
            free: false,
            integer,
        });
        self.variables.len() - 1
    }

    /// Adds an unbounded continuous column.
    pub fn add_free_variable(&mut self, cost: f64) -> usize {
        self.variables.push(Variable {
            cost,
            free: true,
            integer: false,
        });
        self.variables.len() - 1
    }

    pub fn add_constraint(&mut self, terms: Vec<(usize, f64)>, sense: Sense, rhs: f64) -> usize {
        self.constraints.push(Constraint { terms, sense, rhs });
        self.constraints.len() - 1
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn has_integers(&self) -> bool {
        self.variables.iter().any(|v| v.integer)
    }

    /// Copy of the program with every integrality restriction dropped.
    pub fn relaxed(&self) -> Self {
        let mut copy = self.clone();
        for var in &mut copy.variables {
            var.integer = false;
        }
        copy
    }

    /// Evaluates the objective at `values`.
    pub fn objective_value(&self, values: &[f64]) -> f64 {
        self.variables
            .iter()
            .zip(values)
            .map(|(var, x)| var.cost * x)
            .sum()
    }
}

/// Termination condition reported by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SolveStatus {
    Optimal,
    Infeasible,
    Unbounded,
    /// The backend stopped for any other reason (numerical trouble, limits).
    Failed,
}

#[derive(Debug, Clone)]
pub struct LpSolution {
    pub status: SolveStatus,
    pub objective: f64,
    pub values: Vec<f64>,
    /// Row duals as `d objective / d rhs`, one per constraint. Only continuous
    /// solves report them.
    pub duals: Option<Vec<f64>>,
}

impl LpSolution {
    pub fn failed(status: SolveStatus) -> Self {
        Self {
            status,
            objective: f64::NAN,
            values: Vec::new(),
            duals: None,
        }
    }
}

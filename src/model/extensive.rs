// src/model/extensive.rs

//! Deterministic equivalent over the whole scenario tree.
//!
//! Every tree node gets its own copy of its stage's template. Values the
//! template reads from the previous stage become the parent node's columns,
//! and the node's costs are weighted by its unconditional probability. Used
//! to check the decomposition on small trees.

use crate::error::{Result, SddpError};
use crate::model::instance::Instance;
use crate::model::stage::{LinkParam, StageModel};
use crate::model::state::StageState;
use crate::simulation::config::ModelParams;
use crate::solver::lp::{LinearProgram, SolveStatus};
use crate::solver::traits::LpSolver;
use serde::Serialize;

#[derive(Debug, Clone)]
struct TreeNode {
    stage: usize,
    probability: f64,
    /// First column of this node's copy.
    offset: usize,
}

#[derive(Debug, Clone)]
pub struct ExtensiveForm {
    pub program: LinearProgram,
    stages: Vec<StageModel>,
    nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtensiveSolution {
    /// Expected total cost of the optimal policy.
    pub objective: f64,
    pub first_stage: StageState,
    pub nodes: usize,
}

impl ExtensiveForm {
    pub fn build(instance: &Instance, params: &ModelParams) -> Result<Self> {
        instance.validate_for(params)?;
        let stages = StageModel::build_all(instance, params);
        let mut program = LinearProgram::new();
        let mut nodes: Vec<TreeNode> = Vec::new();
        let mut frontier: Vec<Option<usize>> = vec![None];

        for (t, stage) in stages.iter().enumerate() {
            let template = &stage.exact;
            let mut next = Vec::with_capacity(frontier.len() * stage.scenarios.len());
            for &parent in &frontier {
                for scenario in &stage.scenarios {
                    let probability = parent.map_or(1.0, |p| nodes[p].probability) * scenario.probability;
                    let offset = program.num_variables();
                    for (j, var) in template.program.variables.iter().enumerate() {
                        let cost = if Some(j) == template.layout.proxy { 0.0 } else { probability * var.cost };
                        if var.free {
                            program.add_free_variable(cost);
                        } else {
                            program.add_variable(cost, var.integer);
                        }
                    }

                    let first_row = program.num_constraints();
                    for row in &template.program.constraints {
                        let terms = row.terms.iter().map(|&(j, a)| (j + offset, a)).collect();
                        program.add_constraint(terms, row.sense, row.rhs);
                    }
                    for link in &template.links {
                        let constraint = &mut program.constraints[first_row + link.row];
                        match link.param {
                            LinkParam::Demand => constraint.rhs += link.coefficient * scenario.demand,
                            LinkParam::Previous(component) => {
                                let parent = parent.ok_or(SddpError::MissingState { stage: t })?;
                                let parent_node = &nodes[parent];
                                let column = parent_node.offset
                                    + stages[parent_node.stage].exact.layout.state_variable(component);
                                constraint.terms.push((column, -link.coefficient));
                            }
                        }
                    }

                    nodes.push(TreeNode {
                        stage: t,
                        probability,
                        offset,
                    });
                    next.push(Some(nodes.len() - 1));
                }
            }
            frontier = next;
        }

        log::debug!(
            "deterministic equivalent: {} nodes, {} columns, {} rows",
            nodes.len(),
            program.num_variables(),
            program.num_constraints()
        );
        Ok(Self {
            program,
            stages,
            nodes,
        })
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn solve<S: LpSolver + ?Sized>(&self, backend: &S) -> Result<ExtensiveSolution> {
        let solution = backend.solve(&self.program);
        match solution.status {
            SolveStatus::Optimal => {}
            SolveStatus::Infeasible => return Err(SddpError::Infeasible { stage: 0, scenario: 0 }),
            status => return Err(SddpError::SolverFailure { stage: 0, status }),
        }
        let first_stage = self.stages[0].exact.extract_state(&solution.values);
        Ok(ExtensiveSolution {
            objective: solution.objective,
            first_stage,
            nodes: self.nodes.len(),
        })
    }
}

/// Builds and solves the deterministic equivalent in one call.
pub fn solve_extensive<S: LpSolver + ?Sized>(
    instance: &Instance,
    params: &ModelParams,
    backend: &S,
) -> Result<ExtensiveSolution> {
    ExtensiveForm::build(instance, params)?.solve(backend)
}

// src/error.rs

use crate::solver::lp::SolveStatus;
use std::time::Duration;
use thiserror::Error;

/// Everything that can abort a decomposition run.
///
/// There is no recovery path: a run either completes or reports one of these
/// and stops.
#[derive(Debug, Error)]
pub enum SddpError {
    #[error("invalid instance: {0}")]
    InvalidInstance(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Every subproblem carries slack variables, so this means the model was
    /// built wrong.
    #[error("stage {stage} subproblem is infeasible for scenario {scenario}")]
    Infeasible { stage: usize, scenario: usize },

    #[error("stage {stage} subproblem needs the previous stage's state")]
    MissingState { stage: usize },

    #[error("stage {stage} solver returned no duals for a continuous subproblem")]
    MissingDuals { stage: usize },

    #[error("stage {stage} subproblem ended with status {status:?}")]
    SolverFailure { stage: usize, status: SolveStatus },

    #[error("time budget exhausted after {elapsed:?} ({iterations} iterations)")]
    TimeBudgetExceeded { elapsed: Duration, iterations: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SddpError>;

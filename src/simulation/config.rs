// src/simulation/config.rs

use serde::Serialize;
use std::time::Duration;

/// Domain of the acquisition / cancellation / postponement decisions in the
/// exact stage templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CommitmentDomain {
    /// Fractions in [0, 1] (SDDP).
    Continuous,
    /// Whole lots only (SDDiP); duals still come from the relaxation.
    Binary,
}

/// Parameters the stage template builder needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelParams {
    pub proxy_floor: f64,
    pub slack_penalty: f64,
    pub commitments: CommitmentDomain,
}

#[derive(Debug, Clone)]
pub struct SddpConfig {
    /// Paths per iteration; `0` enumerates the whole tree.
    pub sample_size: usize,
    pub resample_each_iteration: bool,
    /// Tolerance for every "equal" test: bound stabilisation, the exact gap,
    /// cut deduplication.
    pub epsilon: f64,
    /// Confidence level of the sampled upper bound.
    pub confidence: f64,
    /// Global lower bound `L` on every future-cost proxy.
    pub proxy_floor: f64,
    /// Per-unit penalty on the artificial balance slacks.
    pub slack_penalty: f64,
    pub commitments: CommitmentDomain,
    pub max_iterations: usize,
    pub time_budget: Option<Duration>,
    pub seed: Option<u64>,
    /// Duplicate-rejection draws allowed per requested path before sampling
    /// gives up and enumerates.
    pub sample_attempts_per_path: usize,
    /// Re-simulate the whole tree at the end to get an exact upper bound.
    pub final_exhaustive_pass: bool,
    /// Path whose decisions end up in the trajectory report.
    pub report_path: usize,
}

impl Default for SddpConfig {
    fn default() -> Self {
        Self {
            sample_size: 0,
            resample_each_iteration: true,
            epsilon: 1e-5,
            confidence: 0.98,
            proxy_floor: 0.0,
            slack_penalty: 1e6,
            commitments: CommitmentDomain::Continuous,
            max_iterations: 1000,
            time_budget: None,
            seed: None,
            sample_attempts_per_path: 1000,
            final_exhaustive_pass: true,
            report_path: 0,
        }
    }
}

impl SddpConfig {
    pub fn model_params(&self) -> ModelParams {
        ModelParams {
            proxy_floor: self.proxy_floor,
            slack_penalty: self.slack_penalty,
            commitments: self.commitments,
        }
    }
}

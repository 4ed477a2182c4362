// src/simulation/forward.rs

use crate::error::Result;
use crate::model::stage::StageModel;
use crate::model::state::StageState;
use crate::simulation::sampler::SampleSet;
use crate::simulation::statistics::CostEstimate;
use crate::solver::adapter::{DualBundle, StageSolution, SubproblemSolver};
use crate::solver::traits::LpSolver;

/// What one stage of one path produced.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome {
    pub state: StageState,
    /// Stage objective without the future-cost proxy.
    pub immediate_cost: f64,
    pub slack: f64,
}

impl From<&StageSolution> for StageOutcome {
    fn from(solution: &StageSolution) -> Self {
        Self {
            state: solution.state.clone(),
            immediate_cost: solution.immediate_cost(),
            slack: solution.slack,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ForwardPass {
    /// `outcomes[m][t]`
    pub outcomes: Vec<Vec<StageOutcome>>,
    /// Realised cost of every path.
    pub path_costs: Vec<f64>,
    /// Last-stage duals of every path, kept for the backward pass.
    pub last_duals: Vec<Option<DualBundle>>,
    pub estimate: CostEstimate,
    /// Subproblems actually solved, the root excluded.
    pub solves: usize,
}

impl ForwardPass {
    /// Simulates every path of `samples` under the current cuts.
    ///
    /// `root` is the stage-0 solution the controller already computed for the
    /// lower bound; every path starts from it. A stage whose scenario prefix
    /// matches an earlier path's is copied from that path, cost included,
    /// instead of being solved again.
    pub fn run<S: LpSolver + ?Sized>(
        solver: &SubproblemSolver<'_, S>,
        stages: &[StageModel],
        samples: &SampleSet,
        root: &StageSolution,
        z: f64,
    ) -> Result<Self> {
        let horizon = stages.len();
        let last = horizon - 1;
        let root_outcome = StageOutcome::from(root);

        let mut outcomes: Vec<Vec<StageOutcome>> = Vec::with_capacity(samples.len());
        let mut last_duals: Vec<Option<DualBundle>> = Vec::with_capacity(samples.len());
        let mut path_costs = Vec::with_capacity(samples.len());
        let mut solves = 0;

        for (m, path) in samples.paths.iter().enumerate() {
            let mut row = Vec::with_capacity(horizon);
            row.push(root_outcome.clone());
            let mut duals = None;

            for t in 1..horizon {
                let owner = samples.owner(m, t);
                if owner < m {
                    row.push(outcomes[owner][t].clone());
                    if t == last {
                        duals = last_duals[owner].clone();
                    }
                    continue;
                }
                let incoming = &row[t - 1].state;
                let solution = solver.solve(&stages[t], Some(incoming), path[t], false)?;
                solves += 1;
                if t == last {
                    duals = solution.duals.clone();
                }
                row.push(StageOutcome::from(&solution));
            }

            let cost: f64 = row.iter().map(|o| o.immediate_cost).sum();
            log::trace!("path {} {:?}: cost {:.4}", m, path, cost);
            path_costs.push(cost);
            outcomes.push(row);
            last_duals.push(duals);
        }

        let estimate = CostEstimate::from_paths(&path_costs, &samples.probabilities, samples.exhaustive, z);
        log::debug!(
            "forward pass: {} paths, {} solves, mean {:.4}, bound {:.4}",
            samples.len(),
            solves,
            estimate.mean,
            estimate.bound
        );

        Ok(Self {
            outcomes,
            path_costs,
            last_duals,
            estimate,
            solves,
        })
    }

    /// State path `m` left stage `t` with.
    pub fn state(&self, m: usize, t: usize) -> &StageState {
        &self.outcomes[m][t].state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::instance::fixtures::small_instance;
    use crate::simulation::config::SddpConfig;
    use crate::simulation::sampler::ScenarioTree;
    use crate::solver::backend::GoodLpBackend;

    #[test]
    fn shared_prefixes_are_copied_bit_for_bit() {
        let instance = small_instance();
        let stages = StageModel::build_all(&instance, &SddpConfig::default().model_params());
        let tree = ScenarioTree::from_instance(&instance);
        let samples = SampleSet::new(&tree, tree.enumerate(), true);
        let backend = GoodLpBackend;
        let solver = SubproblemSolver::new(&backend);
        let root = solver.solve(&stages[0], None, 0, false).unwrap();

        let pass = ForwardPass::run(&solver, &stages, &samples, &root, 2.326).unwrap();
        // Two distinct stage-1 nodes plus four leaves.
        assert_eq!(pass.solves, 6);
        assert_eq!(pass.outcomes[1][1], pass.outcomes[0][1]);
        assert_eq!(pass.outcomes[3][1], pass.outcomes[2][1]);
        assert_eq!(pass.outcomes[3][0], pass.outcomes[0][0]);
        assert!(pass.last_duals.iter().all(Option::is_some));

        let expected: f64 = pass
            .path_costs
            .iter()
            .zip(&samples.probabilities)
            .map(|(c, p)| c * p)
            .sum();
        assert!((pass.estimate.bound - expected).abs() < 1e-9 * expected.abs().max(1.0));
    }

    #[test]
    fn repeated_paths_reuse_every_stage() {
        let instance = small_instance();
        let stages = StageModel::build_all(&instance, &SddpConfig::default().model_params());
        let tree = ScenarioTree::from_instance(&instance);
        let samples = SampleSet::new(&tree, vec![vec![0, 1, 0], vec![0, 1, 0]], false);
        let backend = GoodLpBackend;
        let solver = SubproblemSolver::new(&backend);
        let root = solver.solve(&stages[0], None, 0, false).unwrap();

        let pass = ForwardPass::run(&solver, &stages, &samples, &root, 2.326).unwrap();
        assert_eq!(pass.solves, 2);
        assert_eq!(pass.outcomes[0], pass.outcomes[1]);
        assert_eq!(pass.path_costs[0], pass.path_costs[1]);
        assert_eq!(pass.last_duals[0], pass.last_duals[1]);
    }
}

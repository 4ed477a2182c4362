// src/simulation/engine.rs

use crate::error::{Result, SddpError};
use crate::model::instance::Instance;
use crate::model::stage::StageModel;
use crate::model::state::StageState;
use crate::simulation::backward::{self, BackwardStats};
use crate::simulation::config::SddpConfig;
use crate::simulation::forward::ForwardPass;
use crate::simulation::sampler::{SampleSet, ScenarioTree};
use crate::simulation::statistics::confidence_z;
use crate::solver::adapter::{StageSolution, SubproblemSolver};
use crate::solver::backend::GoodLpBackend;
use crate::solver::traits::LpSolver;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TerminationReason {
    /// The stopping rule of the current mode held.
    Converged,
    /// A backward sweep found nothing new, so further iterations repeat.
    Stalled,
    IterationLimit,
}

/// One row of the iteration log.
#[derive(Debug, Clone, Serialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub mean_cost: f64,
    pub std_error: f64,
    pub paths: usize,
    pub cuts_installed: usize,
    pub duplicate_cuts: usize,
    pub solves: usize,
    pub elapsed_secs: f64,
}

/// Decisions of the representative path at one stage.
#[derive(Debug, Clone, Serialize)]
pub struct TrajectoryRecord {
    pub stage: usize,
    pub scenario: usize,
    pub demand: f64,
    pub inventory: f64,
    pub acquired_volume: f64,
    pub cancelled_volume: f64,
    pub postponed_volume: f64,
    pub slack: f64,
    pub stage_cost: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub iterations: usize,
    pub termination: TerminationReason,
    pub lower_bound: f64,
    /// Exact when `upper_bound_exact`, the confidence bound otherwise.
    pub upper_bound: f64,
    pub upper_bound_exact: bool,
    /// Last sampled bound, when the run sampled.
    pub statistical_upper_bound: Option<f64>,
    pub cuts_per_stage: Vec<usize>,
    pub duplicate_cuts: usize,
    pub elapsed: Duration,
    /// Root decisions under the final cuts.
    pub first_stage: StageState,
    pub first_stage_cost: f64,
    pub history: Vec<IterationRecord>,
    pub trajectory: Vec<TrajectoryRecord>,
}

impl RunSummary {
    pub fn gap(&self) -> f64 {
        self.upper_bound - self.lower_bound
    }

    /// Gap relative to `|LB|`, `None` when LB is zero.
    pub fn relative_gap(&self) -> Option<f64> {
        (self.lower_bound != 0.0).then(|| self.gap() / self.lower_bound.abs())
    }

    pub fn total_cuts(&self) -> usize {
        self.cuts_per_stage.iter().sum()
    }
}

/// Everything a run mutates, created at the start and dropped with it.
#[derive(Debug)]
pub struct DecompositionState {
    pub stages: Vec<StageModel>,
    pub samples: SampleSet,
    pub iteration: usize,
    pub lower_bound: f64,
    previous_lower_bound: Option<f64>,
    /// Best exact bound in exhaustive mode, latest confidence bound when sampling.
    pub upper_bound: f64,
    pub root: Option<StageSolution>,
    pub last_forward: Option<ForwardPass>,
    pub duplicate_cuts: usize,
    pub history: Vec<IterationRecord>,
}

/// The SDDP / SDDiP iteration loop for one instance.
#[derive(Debug)]
pub struct Decomposition {
    config: SddpConfig,
    backend: Box<dyn LpSolver>,
    tree: ScenarioTree,
    rng: StdRng,
    z: f64,
    pub state: DecompositionState,
}

impl Decomposition {
    /// Validates `instance` and builds every stage template.
    pub fn new(instance: &Instance, config: SddpConfig, backend: Box<dyn LpSolver>) -> Result<Self> {
        instance.validate_for(&config.model_params())?;
        if !(config.epsilon > 0.0) {
            return Err(SddpError::InvalidConfig(format!(
                "epsilon must be positive, got {}",
                config.epsilon
            )));
        }
        if !(config.confidence > 0.0 && config.confidence < 1.0) {
            return Err(SddpError::InvalidConfig(format!(
                "confidence must lie in (0, 1), got {}",
                config.confidence
            )));
        }

        let tree = ScenarioTree::from_instance(instance);
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let samples = tree.sample(config.sample_size, config.sample_attempts_per_path, &mut rng);
        let stages = StageModel::build_all(instance, &config.model_params());
        log::info!(
            "{} stages, {} lots, {} paths per iteration ({})",
            instance.horizon(),
            instance.lots.len(),
            samples.len(),
            if samples.exhaustive { "exhaustive" } else { "sampled" }
        );

        Ok(Self {
            z: confidence_z(config.confidence),
            config,
            backend,
            tree,
            rng,
            state: DecompositionState {
                stages,
                samples,
                iteration: 0,
                lower_bound: f64::NEG_INFINITY,
                previous_lower_bound: None,
                upper_bound: f64::INFINITY,
                root: None,
                last_forward: None,
                duplicate_cuts: 0,
                history: Vec::new(),
            },
        })
    }

    pub fn with_default_solver(instance: &Instance, config: SddpConfig) -> Result<Self> {
        Self::new(instance, config, Box::new(GoodLpBackend))
    }

    /// Iterates until a stopping rule holds, then recovers an exact upper
    /// bound from the whole tree if the run sampled.
    ///
    /// # Errors
    /// Any subproblem failure, or [`SddpError::TimeBudgetExceeded`] when the
    /// budget runs out before the loop stops.
    pub fn run(mut self) -> Result<RunSummary> {
        let started = Instant::now();
        let termination = loop {
            if let Some(budget) = self.config.time_budget {
                let elapsed = started.elapsed();
                if elapsed >= budget {
                    return Err(SddpError::TimeBudgetExceeded {
                        elapsed,
                        iterations: self.state.iteration,
                    });
                }
            }
            if let Some(reason) = self.step(started)? {
                break reason;
            }
        };

        let statistical_upper_bound = (!self.state.samples.exhaustive).then_some(self.state.upper_bound);
        if !self.state.samples.exhaustive && self.config.final_exhaustive_pass {
            self.final_exhaustive_pass()?;
        }
        let upper_bound_exact = self.state.samples.exhaustive;

        let summary = self.summarise(termination, started.elapsed(), statistical_upper_bound, upper_bound_exact);
        log::info!(
            "finished after {} iterations ({:?}): LB {:.6}, UB {:.6}",
            summary.iterations,
            summary.termination,
            summary.lower_bound,
            summary.upper_bound
        );
        Ok(summary)
    }

    /// One iteration: lower bound from the root, stopping checks, forward
    /// pass, backward pass.
    fn step(&mut self, started: Instant) -> Result<Option<TerminationReason>> {
        let epsilon = self.config.epsilon;
        let solver = SubproblemSolver::new(self.backend.as_ref());
        let state = &mut self.state;

        let root = solver.solve(&state.stages[0], None, 0, false)?;
        let lower_bound = root.objective;
        if let Some(previous) = state.previous_lower_bound {
            if lower_bound < previous - epsilon {
                log::warn!("lower bound dropped from {:.6} to {:.6}", previous, lower_bound);
            }
        }
        state.lower_bound = lower_bound;
        let root: &StageSolution = state.root.insert(root);

        let stabilised = state
            .previous_lower_bound
            .map_or(false, |previous| lower_bound - previous < epsilon);
        if !state.samples.exhaustive && stabilised {
            return Ok(Some(TerminationReason::Converged));
        }
        if state.iteration >= self.config.max_iterations {
            log::warn!("iteration limit ({}) reached", self.config.max_iterations);
            return Ok(Some(TerminationReason::IterationLimit));
        }
        state.iteration += 1;

        if state.iteration > 1 && self.config.resample_each_iteration && !state.samples.exhaustive {
            state.samples = self.tree.sample(
                self.config.sample_size,
                self.config.sample_attempts_per_path,
                &mut self.rng,
            );
        }

        let forward = ForwardPass::run(&solver, &state.stages, &state.samples, root, self.z)?;
        state.upper_bound = if state.samples.exhaustive {
            state.upper_bound.min(forward.estimate.bound)
        } else {
            forward.estimate.bound
        };
        let converged = state.samples.exhaustive && state.upper_bound - lower_bound < epsilon;

        let backward = if converged {
            BackwardStats::default()
        } else {
            backward::run(&solver, &mut state.stages, &state.samples, &forward, epsilon)?
        };
        state.duplicate_cuts += backward.duplicates;

        log::info!(
            "iteration {}: LB {:.6}, UB {:.6}, {} new cuts, {} repeated",
            state.iteration,
            lower_bound,
            state.upper_bound,
            backward.installed_total(),
            backward.duplicates
        );
        state.history.push(IterationRecord {
            iteration: state.iteration,
            lower_bound,
            upper_bound: state.upper_bound,
            mean_cost: forward.estimate.mean,
            std_error: forward.estimate.std_error,
            paths: state.samples.len(),
            cuts_installed: backward.installed_total(),
            duplicate_cuts: backward.duplicates,
            solves: 1 + forward.solves + backward.solves,
            elapsed_secs: started.elapsed().as_secs_f64(),
        });
        state.last_forward = Some(forward);

        if converged {
            return Ok(Some(TerminationReason::Converged));
        }
        if backward.installed_total() == 0 {
            log::warn!("backward pass produced no new cut, stopping");
            return Ok(Some(TerminationReason::Stalled));
        }
        state.previous_lower_bound = Some(lower_bound);
        Ok(None)
    }

    /// Simulates the whole tree under the final cuts; its mean is the exact
    /// expected cost of the resulting policy.
    fn final_exhaustive_pass(&mut self) -> Result<()> {
        let solver = SubproblemSolver::new(self.backend.as_ref());
        let state = &mut self.state;
        let root = match state.root.as_ref() {
            Some(root) => root,
            None => return Ok(()),
        };
        let samples = SampleSet::new(&self.tree, self.tree.enumerate(), true);
        log::info!("final pass over all {} paths", samples.len());
        let forward = ForwardPass::run(&solver, &state.stages, &samples, root, self.z)?;
        state.upper_bound = forward.estimate.mean;
        state.samples = samples;
        state.last_forward = Some(forward);
        Ok(())
    }

    fn trajectory(&self) -> Vec<TrajectoryRecord> {
        let state = &self.state;
        let Some(forward) = &state.last_forward else {
            return Vec::new();
        };
        if state.samples.is_empty() {
            return Vec::new();
        }
        let m = self.config.report_path.min(state.samples.len() - 1);
        state.stages
            .iter()
            .zip(&forward.outcomes[m])
            .zip(&state.samples.paths[m])
            .map(|((stage, outcome), &scenario)| {
                let decisions = &outcome.state;
                let postponed = StageState::weighted(&decisions.postpone, &stage.cancel_volumes);
                TrajectoryRecord {
                    stage: stage.descriptor.index,
                    scenario,
                    demand: stage.scenarios[scenario].demand,
                    inventory: decisions.inventory,
                    acquired_volume: StageState::weighted(&decisions.acquire, &stage.acquire_volumes),
                    cancelled_volume: StageState::weighted(&decisions.cancel, &stage.cancel_volumes) - postponed,
                    postponed_volume: postponed,
                    slack: outcome.slack,
                    stage_cost: outcome.immediate_cost,
                }
            })
            .collect()
    }

    fn summarise(
        &self,
        termination: TerminationReason,
        elapsed: Duration,
        statistical_upper_bound: Option<f64>,
        upper_bound_exact: bool,
    ) -> RunSummary {
        let state = &self.state;
        let (first_stage, first_stage_cost) = match &state.root {
            Some(root) => (root.state.clone(), root.immediate_cost()),
            None => (StageState::default(), 0.0),
        };
        RunSummary {
            iterations: state.iteration,
            termination,
            lower_bound: state.lower_bound,
            upper_bound: state.upper_bound,
            upper_bound_exact,
            statistical_upper_bound,
            cuts_per_stage: state.stages.iter().map(|s| s.cuts.len()).collect(),
            duplicate_cuts: state.duplicate_cuts,
            elapsed,
            first_stage,
            first_stage_cost,
            history: state.history.clone(),
            trajectory: self.trajectory(),
        }
    }
}

/// Runs the decomposition with the built-in solver.
pub fn solve(instance: &Instance, config: SddpConfig) -> Result<RunSummary> {
    Decomposition::with_default_solver(instance, config)?.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::instance::fixtures::small_instance;

    #[test]
    fn exhaustive_run_closes_the_gap() {
        let instance = small_instance();
        let summary = solve(&instance, SddpConfig::default()).unwrap();
        assert_eq!(summary.termination, TerminationReason::Converged);
        assert!(summary.upper_bound_exact);
        assert!(summary.gap() < 1e-5);
        assert!(summary.statistical_upper_bound.is_none());
        assert_eq!(summary.trajectory.len(), 3);
    }

    #[test]
    fn lower_bound_never_decreases() {
        let instance = small_instance();
        let summary = solve(&instance, SddpConfig::default()).unwrap();
        for pair in summary.history.windows(2) {
            assert!(pair[1].lower_bound >= pair[0].lower_bound - 1e-7 * pair[0].lower_bound.abs().max(1.0));
        }
    }

    #[test]
    fn iteration_limit_is_reported() {
        let instance = small_instance();
        let config = SddpConfig {
            max_iterations: 1,
            ..SddpConfig::default()
        };
        let summary = solve(&instance, config).unwrap();
        assert_eq!(summary.iterations, 1);
        assert!(matches!(
            summary.termination,
            TerminationReason::IterationLimit | TerminationReason::Converged
        ));
    }

    #[test]
    fn zero_time_budget_aborts() {
        let instance = small_instance();
        let config = SddpConfig {
            time_budget: Some(Duration::ZERO),
            ..SddpConfig::default()
        };
        assert!(matches!(
            solve(&instance, config),
            Err(SddpError::TimeBudgetExceeded { iterations: 0, .. })
        ));
    }

    #[test]
    fn non_positive_epsilon_is_rejected() {
        let instance = small_instance();
        let config = SddpConfig {
            epsilon: 0.0,
            ..SddpConfig::default()
        };
        assert!(matches!(solve(&instance, config), Err(SddpError::InvalidConfig(_))));
    }

    #[test]
    fn certain_confidence_is_rejected() {
        let config = SddpConfig {
            confidence: 1.0,
            ..SddpConfig::default()
        };
        assert!(matches!(solve(&small_instance(), config), Err(SddpError::InvalidConfig(_))));
    }
}

// src/simulation/backward.rs

use crate::error::{Result, SddpError};
use crate::model::cut::Cut;
use crate::model::stage::StageModel;
use crate::model::state::StageState;
use crate::simulation::forward::ForwardPass;
use crate::simulation::sampler::SampleSet;
use crate::solver::adapter::{DualBundle, SubproblemSolver};
use crate::solver::traits::LpSolver;

/// Counters of one backward sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackwardStats {
    /// New cuts per stage.
    pub installed: Vec<usize>,
    /// Candidates discarded as equal to an installed cut.
    pub duplicates: usize,
    pub solves: usize,
}

impl BackwardStats {
    pub fn installed_total(&self) -> usize {
        self.installed.iter().sum()
    }
}

/// Adds one child scenario's contribution, weighted by `probability`, to
/// `cut` on the parent stage.
fn accumulate(cut: &mut Cut, parent: &StageModel, child: &StageModel, demand: f64, probability: f64, duals: &DualBundle) {
    let (inventory_min, inventory_max) = child.inventory_bounds;
    let cut_constants: f64 = duals
        .cuts
        .iter()
        .zip(child.cuts.cuts())
        .map(|(price, installed)| price * installed.constant)
        .sum();
    let floor = duals.proxy_floor.unwrap_or(0.0) * child.proxy_floor;

    cut.constant += probability
        * (duals.balance * (demand - child.fixed_arrival)
            + duals.inventory_min * inventory_min
            + duals.inventory_max * inventory_max
            + duals.caps_total()
            + cut_constants
            + floor);
    cut.inventory += probability * duals.balance;

    let acquisition = duals.acquisition.unwrap_or(0.0);
    for (coefficient, volume) in cut.acquire.iter_mut().zip(&parent.acquire_volumes) {
        *coefficient -= probability * volume * acquisition;
    }
    let cancellation = duals.cancellation.unwrap_or(0.0);
    for (coefficient, volume) in cut.cancel.iter_mut().zip(&parent.cancel_volumes) {
        *coefficient -= probability * volume * cancellation;
    }
    for (coefficient, price) in cut.postpone.iter_mut().zip(&duals.carry) {
        *coefficient -= probability * price;
    }
    let postponed = duals.postponed_arrival.unwrap_or(0.0);
    for (coefficient, volume) in cut.carry.iter_mut().zip(&parent.carry_volumes) {
        *coefficient -= probability * volume * postponed;
    }
}

/// Builds the aggregated cut for stage `t` at `state` by solving every
/// child scenario's relaxation.
///
/// `cached` holds duals already known for one child scenario and is used
/// instead of solving it again.
pub fn generate_cut<S: LpSolver + ?Sized>(
    solver: &SubproblemSolver<'_, S>,
    stages: &[StageModel],
    t: usize,
    state: &StageState,
    cached: Option<(usize, &DualBundle)>,
    solves: &mut usize,
) -> Result<Cut> {
    let parent = &stages[t];
    let child = &stages[t + 1];
    let mut cut = Cut::shaped_like(state);

    for (s, scenario) in child.scenarios.iter().enumerate() {
        let solved;
        let duals = match cached {
            Some((cached_scenario, duals)) if cached_scenario == s => duals,
            _ => {
                let solution = solver.solve(child, Some(state), s, true)?;
                *solves += 1;
                solved = solution.duals.ok_or(SddpError::MissingDuals { stage: t + 1 })?;
                &solved
            }
        };
        accumulate(&mut cut, parent, child, scenario.demand, scenario.probability, duals);
    }
    Ok(cut)
}

/// Sweeps stages `H - 2` down to `0`, installing one cut per distinct
/// visited state.
pub fn run<S: LpSolver + ?Sized>(
    solver: &SubproblemSolver<'_, S>,
    stages: &mut [StageModel],
    samples: &SampleSet,
    forward: &ForwardPass,
    epsilon: f64,
) -> Result<BackwardStats> {
    let horizon = stages.len();
    let mut stats = BackwardStats {
        installed: vec![0; horizon],
        ..BackwardStats::default()
    };

    for t in (0..horizon - 1).rev() {
        for (m, path) in samples.paths.iter().enumerate() {
            if !samples.is_first_visit(m, t) {
                continue;
            }
            let cached = if t + 2 == horizon {
                forward.last_duals[m].as_ref().map(|duals| (path[t + 1], duals))
            } else {
                None
            };
            let cut = generate_cut(solver, stages, t, forward.state(m, t), cached, &mut stats.solves)?;
            log::trace!("stage {} path {}: candidate cut {:?}", t, m, cut);

            if stages[t].install_cut(cut, epsilon) {
                stats.installed[t] += 1;
            } else {
                stats.duplicates += 1;
            }
        }
    }

    log::debug!(
        "backward pass: {} cuts installed, {} duplicates, {} solves",
        stats.installed_total(),
        stats.duplicates,
        stats.solves
    );
    Ok(stats)
}

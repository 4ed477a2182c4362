// src/solver/adapter.rs

use crate::error::{Result, SddpError};
use crate::model::stage::{StageLayout, StageModel};
use crate::model::state::StageState;
use crate::solver::lp::SolveStatus;
use crate::solver::traits::LpSolver;

/// Dual prices of one stage solve, grouped by constraint family.
///
/// Scalar rows a stage does not have are `None`; indexed families are empty.
/// Every price is `d objective / d rhs`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DualBundle {
    pub balance: f64,
    pub inventory_min: f64,
    pub inventory_max: f64,
    pub acquisition: Option<f64>,
    pub cancellation: Option<f64>,
    pub postponed_arrival: Option<f64>,
    /// One per lot carried over from the previous stage's postponements.
    pub carry: Vec<f64>,
    pub postpone_within_cancel: Vec<f64>,
    pub acquire_cap: Vec<f64>,
    pub cancel_cap: Vec<f64>,
    pub postpone_cap: Vec<f64>,
    /// Price of the `proxy >= floor` row.
    pub proxy_floor: Option<f64>,
    /// One per installed cut, in pool order.
    pub cuts: Vec<f64>,
}

impl DualBundle {
    fn collect(layout: &StageLayout, duals: &[f64]) -> Self {
        let rows = |indices: &[usize]| indices.iter().map(|&i| duals[i]).collect::<Vec<f64>>();
        Self {
            balance: duals[layout.balance_row],
            inventory_min: duals[layout.inventory_min_row],
            inventory_max: duals[layout.inventory_max_row],
            acquisition: layout.acquisition_row.map(|i| duals[i]),
            cancellation: layout.cancellation_row.map(|i| duals[i]),
            postponed_arrival: layout.postponed_arrival_row.map(|i| duals[i]),
            carry: rows(&layout.carry_rows),
            postpone_within_cancel: rows(&layout.postpone_within_cancel_rows),
            acquire_cap: rows(&layout.acquire_cap_rows),
            cancel_cap: rows(&layout.cancel_cap_rows),
            postpone_cap: rows(&layout.postpone_cap_rows),
            proxy_floor: layout.proxy_floor_row.map(|i| duals[i]),
            cuts: rows(&layout.cut_rows),
        }
    }

    /// Sum of the prices of every `<= 1` cap row.
    pub fn caps_total(&self) -> f64 {
        self.acquire_cap
            .iter()
            .chain(&self.cancel_cap)
            .chain(&self.postpone_cap)
            .sum()
    }
}

/// What one subproblem solve hands back to the passes.
#[derive(Debug, Clone)]
pub struct StageSolution {
    pub objective: f64,
    /// Value of the future-cost proxy, `0.0` at the last stage.
    pub proxy: f64,
    /// Total volume absorbed by the balance slacks.
    pub slack: f64,
    pub state: StageState,
    /// Present for continuous solves only.
    pub duals: Option<DualBundle>,
}

impl StageSolution {
    /// The stage's own cost, without the future-cost approximation.
    pub fn immediate_cost(&self) -> f64 {
        self.objective - self.proxy
    }
}

/// Binds a stage template to an incoming state and a scenario and runs the
/// backend on it.
#[derive(Debug, Clone, Copy)]
pub struct SubproblemSolver<'a, S: LpSolver + ?Sized> {
    backend: &'a S,
}

impl<'a, S: LpSolver + ?Sized> SubproblemSolver<'a, S> {
    pub fn new(backend: &'a S) -> Self {
        Self { backend }
    }

    /// Solves `stage` for its scenario `scenario`.
    ///
    /// `incoming` is ignored at the root, which starts from the instance's
    /// initial inventory. With `relaxed` set the continuous template is used
    /// and duals are always returned.
    ///
    /// # Errors
    /// An infeasible subproblem is a modelling defect and is reported as
    /// [`SddpError::Infeasible`]; any other non-optimal status as
    /// [`SddpError::SolverFailure`].
    pub fn solve(
        &self,
        stage: &StageModel,
        incoming: Option<&StageState>,
        scenario: usize,
        relaxed: bool,
    ) -> Result<StageSolution> {
        let t = stage.descriptor.index;
        let template = stage.template(relaxed);
        let incoming = if stage.descriptor.is_root() { None } else { incoming };
        let demand = stage.scenarios[scenario].demand;
        let program = template.bind(t, incoming, demand)?;

        let solution = self.backend.solve(&program);
        match solution.status {
            SolveStatus::Optimal => {}
            SolveStatus::Infeasible => return Err(SddpError::Infeasible { stage: t, scenario }),
            status => return Err(SddpError::SolverFailure { stage: t, status }),
        }

        let layout = &template.layout;
        let values = &solution.values;
        let proxy = layout.proxy.map_or(0.0, |j| values[j]);
        let slack: f64 = [layout.shortfall, layout.excess]
            .iter()
            .flatten()
            .map(|&j| values[j])
            .sum();
        let duals = solution.duals.as_deref().map(|duals| DualBundle::collect(layout, duals));
        log::trace!(
            "stage {} scenario {}: objective {:.6}, proxy {:.6}",
            t,
            scenario,
            solution.objective,
            proxy
        );

        Ok(StageSolution {
            objective: solution.objective,
            proxy,
            slack,
            state: template.extract_state(values),
            duals,
        })
    }
}

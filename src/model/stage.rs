// src/model/stage.rs

//! Per-stage subproblem templates.
//!
//! A single builder reads a [`StageDescriptor`] and lays out the variables and
//! rows that stage index implies. Values that change from one solve to the
//! next (previous stage's decisions, the scenario's demand) enter only through
//! row right-hand sides, recorded as [`LinkTerm`]s and filled in by
//! [`StageTemplate::bind`].

use crate::error::{Result, SddpError};
use crate::model::cut::{Cut, CutPool};
use crate::model::instance::{Instance, Scenario};
use crate::model::state::{StageState, StateComponent};
use crate::simulation::config::{CommitmentDomain, ModelParams};
use crate::solver::lp::{LinearProgram, Sense};

/// Which pieces a stage's subproblem has, derived from its position in the
/// horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageDescriptor {
    pub index: usize,
    pub horizon: usize,
    /// Future-cost proxy and cut pool (every stage but the last).
    pub has_proxy: bool,
    /// Acquisition and cancellation decisions (every stage but the last).
    pub has_commitments: bool,
    /// Postponement decisions; a postponed lot arrives two stages later.
    pub has_postponement: bool,
    /// Copies of the previous stage's postponements.
    pub has_carry: bool,
    /// Reads the previous stage's state (every stage but the first).
    pub has_links: bool,
    /// Receives lots postponed two stages earlier.
    pub has_postponed_arrivals: bool,
}

impl StageDescriptor {
    pub fn new(index: usize, horizon: usize) -> Self {
        let last = index + 1 == horizon;
        Self {
            index,
            horizon,
            has_proxy: !last,
            has_commitments: !last,
            has_postponement: index + 2 < horizon,
            has_carry: index > 0 && !last,
            has_links: index > 0,
            has_postponed_arrivals: index > 1,
        }
    }

    pub fn is_root(&self) -> bool {
        self.index == 0
    }

    pub fn is_last(&self) -> bool {
        self.index + 1 == self.horizon
    }
}

/// A value substituted into a row's right-hand side at bind time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkParam {
    Demand,
    Previous(StateComponent),
}

/// `rhs[row] += coefficient * value(param)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkTerm {
    pub row: usize,
    pub param: LinkParam,
    pub coefficient: f64,
}

/// Column and row indices of one stage template.
#[derive(Debug, Clone, Default)]
pub struct StageLayout {
    pub inventory: usize,
    pub arrivals: Option<usize>,
    pub cancelled_arrivals: Option<usize>,
    pub postponed_arrivals: Option<usize>,
    pub shortfall: Option<usize>,
    pub excess: Option<usize>,
    pub acquire: Vec<usize>,
    pub cancel: Vec<usize>,
    pub postpone: Vec<usize>,
    pub carry: Vec<usize>,
    pub proxy: Option<usize>,

    pub balance_row: usize,
    pub inventory_min_row: usize,
    pub inventory_max_row: usize,
    pub acquisition_row: Option<usize>,
    pub cancellation_row: Option<usize>,
    pub postponed_arrival_row: Option<usize>,
    pub carry_rows: Vec<usize>,
    pub postpone_within_cancel_rows: Vec<usize>,
    pub acquire_cap_rows: Vec<usize>,
    pub cancel_cap_rows: Vec<usize>,
    pub postpone_cap_rows: Vec<usize>,
    /// `proxy >= proxy_floor`
    pub proxy_floor_row: Option<usize>,
    pub cut_rows: Vec<usize>,
}

impl StageLayout {
    /// Column holding `component` of this stage's outgoing state.
    pub fn state_variable(&self, component: StateComponent) -> usize {
        match component {
            StateComponent::Inventory => self.inventory,
            StateComponent::Acquire(k) => self.acquire[k],
            StateComponent::Cancel(k) => self.cancel[k],
            StateComponent::Postpone(k) => self.postpone[k],
            StateComponent::Carry(k) => self.carry[k],
        }
    }
}

#[derive(Debug, Clone)]
pub struct StageTemplate {
    pub program: LinearProgram,
    pub layout: StageLayout,
    pub links: Vec<LinkTerm>,
}

impl StageTemplate {
    /// Lays out the subproblem of stage `descriptor.index`.
    pub fn build(instance: &Instance, descriptor: StageDescriptor, params: &ModelParams) -> Self {
        let t = descriptor.index;
        let stage = &instance.stages[t];
        let lots = &instance.lots;
        let integer = params.commitments == CommitmentDomain::Binary;

        let mut lp = LinearProgram::new();
        let mut layout = StageLayout {
            inventory: lp.add_variable(stage.holding_cost, false),
            ..StageLayout::default()
        };

        if descriptor.has_links {
            layout.arrivals = Some(lp.add_variable(0.0, false));
            layout.cancelled_arrivals = Some(lp.add_variable(0.0, false));
            layout.shortfall = Some(lp.add_variable(params.slack_penalty, false));
            layout.excess = Some(lp.add_variable(params.slack_penalty, false));
        }
        if descriptor.has_postponed_arrivals {
            layout.postponed_arrivals = Some(lp.add_variable(0.0, false));
        }
        if descriptor.has_commitments {
            layout.acquire = stage
                .purchasable
                .iter()
                .map(|&c| lp.add_variable(lots[c].acquisition_cost * lots[c].volume, integer))
                .collect();
            layout.cancel = stage
                .committed
                .iter()
                .map(|&c| lp.add_variable(lots[c].cancellation_cost * lots[c].volume, integer))
                .collect();
        }
        if descriptor.has_postponement {
            // Postponing is modelled as cancelling plus a correction, so the
            // net price of a postponed lot is its postponement cost.
            layout.postpone = stage
                .committed
                .iter()
                .map(|&c| {
                    let lot = &lots[c];
                    lp.add_variable((lot.postponement_cost - lot.cancellation_cost) * lot.volume, integer)
                })
                .collect();
        }
        if descriptor.has_carry {
            layout.carry = instance
                .arriving(t)
                .iter()
                .map(|_| lp.add_variable(0.0, integer))
                .collect();
        }
        if descriptor.has_proxy {
            layout.proxy = Some(lp.add_free_variable(1.0));
        }

        let mut links = Vec::new();

        // inflow - outflow = demand - fixed arrivals - previous inventory
        let mut balance = vec![(layout.inventory, -1.0)];
        let inflows = [layout.arrivals, layout.postponed_arrivals, layout.shortfall];
        balance.extend(inflows.iter().flatten().map(|&j| (j, 1.0)));
        let outflows = [layout.cancelled_arrivals, layout.excess];
        balance.extend(outflows.iter().flatten().map(|&j| (j, -1.0)));
        let mut base = -instance.fixed_arrival(t);
        if descriptor.is_root() {
            base -= instance.initial_inventory;
        }
        layout.balance_row = lp.add_constraint(balance, Sense::Equal, base);
        links.push(LinkTerm {
            row: layout.balance_row,
            param: LinkParam::Demand,
            coefficient: 1.0,
        });
        if descriptor.has_links {
            links.push(LinkTerm {
                row: layout.balance_row,
                param: LinkParam::Previous(StateComponent::Inventory),
                coefficient: -1.0,
            });
        }

        layout.inventory_min_row =
            lp.add_constraint(vec![(layout.inventory, 1.0)], Sense::GreaterEq, instance.inventory_min);
        layout.inventory_max_row =
            lp.add_constraint(vec![(layout.inventory, 1.0)], Sense::LessEq, instance.inventory_max);

        // Arrival volumes are pinned to what the previous stage decided.
        let volume_link = |lp: &mut LinearProgram,
                               links: &mut Vec<LinkTerm>,
                               column: usize,
                               lots_in: &[usize],
                               component: fn(usize) -> StateComponent| {
            let row = lp.add_constraint(vec![(column, 1.0)], Sense::Equal, 0.0);
            for (k, &c) in lots_in.iter().enumerate() {
                links.push(LinkTerm {
                    row,
                    param: LinkParam::Previous(component(k)),
                    coefficient: lots[c].volume,
                });
            }
            row
        };
        if let (Some(arrivals), Some(cancelled)) = (layout.arrivals, layout.cancelled_arrivals) {
            layout.acquisition_row = Some(volume_link(
                &mut lp,
                &mut links,
                arrivals,
                instance.previously_purchasable(t),
                StateComponent::Acquire,
            ));
            layout.cancellation_row = Some(volume_link(
                &mut lp,
                &mut links,
                cancelled,
                instance.arriving(t),
                StateComponent::Cancel,
            ));
        }
        if let Some(postponed) = layout.postponed_arrivals {
            layout.postponed_arrival_row = Some(volume_link(
                &mut lp,
                &mut links,
                postponed,
                instance.postponable_into(t),
                StateComponent::Carry,
            ));
        }

        for (k, &column) in layout.carry.iter().enumerate() {
            let row = lp.add_constraint(vec![(column, 1.0)], Sense::Equal, 0.0);
            links.push(LinkTerm {
                row,
                param: LinkParam::Previous(StateComponent::Postpone(k)),
                coefficient: 1.0,
            });
            layout.carry_rows.push(row);
        }

        for (&z2, &x) in layout.postpone.iter().zip(&layout.cancel) {
            let row = lp.add_constraint(vec![(z2, 1.0), (x, -1.0)], Sense::LessEq, 0.0);
            layout.postpone_within_cancel_rows.push(row);
        }

        let cap = |lp: &mut LinearProgram, columns: &[usize]| -> Vec<usize> {
            columns
                .iter()
                .map(|&j| lp.add_constraint(vec![(j, 1.0)], Sense::LessEq, 1.0))
                .collect()
        };
        layout.acquire_cap_rows = cap(&mut lp, &layout.acquire);
        layout.cancel_cap_rows = cap(&mut lp, &layout.cancel);
        layout.postpone_cap_rows = cap(&mut lp, &layout.postpone);
        layout.proxy_floor_row = layout
            .proxy
            .map(|proxy| lp.add_constraint(vec![(proxy, 1.0)], Sense::GreaterEq, params.proxy_floor));

        Self {
            program: lp,
            layout,
            links,
        }
    }

    /// Copy of the program with this solve's linking values substituted.
    pub fn bind(&self, stage: usize, previous: Option<&StageState>, demand: f64) -> Result<LinearProgram> {
        let mut program = self.program.clone();
        for link in &self.links {
            let value = match link.param {
                LinkParam::Demand => demand,
                LinkParam::Previous(component) => previous
                    .ok_or(SddpError::MissingState { stage })?
                    .component(component),
            };
            program.constraints[link.row].rhs += link.coefficient * value;
        }
        Ok(program)
    }

    /// Reads this stage's outgoing state from a solution vector.
    pub fn extract_state(&self, values: &[f64]) -> StageState {
        let pick = |columns: &[usize]| columns.iter().map(|&j| values[j]).collect();
        StageState {
            inventory: values[self.layout.inventory],
            acquire: pick(&self.layout.acquire),
            cancel: pick(&self.layout.cancel),
            postpone: pick(&self.layout.postpone),
            carry: pick(&self.layout.carry),
        }
    }

    /// Appends `cut` as the row `Es·s + Σ E·decision + proxy >= e`.
    fn add_cut(&mut self, cut: &Cut) {
        let Some(proxy) = self.layout.proxy else {
            return;
        };
        let layout = &self.layout;
        let mut terms = vec![(layout.inventory, cut.inventory), (proxy, 1.0)];
        let groups = [
            (&layout.acquire, &cut.acquire),
            (&layout.cancel, &cut.cancel),
            (&layout.postpone, &cut.postpone),
            (&layout.carry, &cut.carry),
        ];
        for (columns, coefficients) in groups {
            terms.extend(columns.iter().copied().zip(coefficients.iter().copied()));
        }
        let row = self.program.add_constraint(terms, Sense::GreaterEq, cut.constant);
        self.layout.cut_rows.push(row);
    }
}

/// Everything the decomposition keeps per stage: both templates, the cut pool
/// they share, and the data cut generation reads when this stage is the child.
#[derive(Debug, Clone)]
pub struct StageModel {
    pub descriptor: StageDescriptor,
    pub exact: StageTemplate,
    pub relaxed: StageTemplate,
    pub cuts: CutPool,
    pub scenarios: Vec<Scenario>,
    pub fixed_arrival: f64,
    pub inventory_bounds: (f64, f64),
    pub proxy_floor: f64,
    /// Lot volumes behind `acquire`, `cancel` and `carry` of the outgoing state.
    pub acquire_volumes: Vec<f64>,
    pub cancel_volumes: Vec<f64>,
    pub carry_volumes: Vec<f64>,
}

impl StageModel {
    pub fn build(instance: &Instance, t: usize, params: &ModelParams) -> Self {
        let descriptor = StageDescriptor::new(t, instance.horizon());
        let exact = StageTemplate::build(instance, descriptor, params);
        let mut relaxed = exact.clone();
        relaxed.program = relaxed.program.relaxed();
        let stage = &instance.stages[t];
        Self {
            descriptor,
            exact,
            relaxed,
            cuts: CutPool::new(),
            scenarios: stage.scenarios.clone(),
            fixed_arrival: instance.fixed_arrival(t),
            inventory_bounds: (instance.inventory_min, instance.inventory_max),
            proxy_floor: params.proxy_floor,
            acquire_volumes: if descriptor.has_commitments { instance.volumes(&stage.purchasable) } else { Vec::new() },
            cancel_volumes: if descriptor.has_commitments { instance.volumes(&stage.committed) } else { Vec::new() },
            carry_volumes: if descriptor.has_carry { instance.volumes(instance.arriving(t)) } else { Vec::new() },
        }
    }

    pub fn build_all(instance: &Instance, params: &ModelParams) -> Vec<Self> {
        (0..instance.horizon())
            .map(|t| Self::build(instance, t, params))
            .collect()
    }

    pub fn template(&self, relaxed: bool) -> &StageTemplate {
        if relaxed {
            &self.relaxed
        } else {
            &self.exact
        }
    }

    /// Installs `cut` into the pool and both templates unless an equal cut
    /// is already there. Returns whether it was installed.
    pub fn install_cut(&mut self, cut: Cut, epsilon: f64) -> bool {
        if !self.descriptor.has_proxy || self.cuts.contains(&cut, epsilon) {
            return false;
        }
        self.exact.add_cut(&cut);
        self.relaxed.add_cut(&cut);
        self.cuts.push(cut);
        true
    }
}

// src/model/state.rs

use serde::Serialize;

/// Addresses one value of a [`StageState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateComponent {
    Inventory,
    Acquire(usize),
    Cancel(usize),
    Postpone(usize),
    Carry(usize),
}

/// What stage `t` hands to stage `t + 1` along one scenario path.
///
/// Positions follow the producing stage's lot lists: `acquire` over its
/// purchasable lots, `cancel` and `postpone` over its committed lots, `carry`
/// over the lots that were due at that stage and got postponed. Once stored a
/// state is never changed; shared prefixes copy it.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct StageState {
    /// End-of-stage inventory.
    pub inventory: f64,
    pub acquire: Vec<f64>,
    pub cancel: Vec<f64>,
    pub postpone: Vec<f64>,
    pub carry: Vec<f64>,
}

impl StageState {
    pub fn component(&self, component: StateComponent) -> f64 {
        match component {
            StateComponent::Inventory => self.inventory,
            StateComponent::Acquire(k) => self.acquire[k],
            StateComponent::Cancel(k) => self.cancel[k],
            StateComponent::Postpone(k) => self.postpone[k],
            StateComponent::Carry(k) => self.carry[k],
        }
    }

    /// Every component paired with its value, inventory first.
    pub fn components(&self) -> Vec<(StateComponent, f64)> {
        let mut out = vec![(StateComponent::Inventory, self.inventory)];
        out.extend(self.acquire.iter().enumerate().map(|(k, &v)| (StateComponent::Acquire(k), v)));
        out.extend(self.cancel.iter().enumerate().map(|(k, &v)| (StateComponent::Cancel(k), v)));
        out.extend(self.postpone.iter().enumerate().map(|(k, &v)| (StateComponent::Postpone(k), v)));
        out.extend(self.carry.iter().enumerate().map(|(k, &v)| (StateComponent::Carry(k), v)));
        out
    }

    /// Sum of `volumes[k] * values[k]`.
    pub fn weighted(values: &[f64], volumes: &[f64]) -> f64 {
        values.iter().zip(volumes).map(|(v, q)| v * q).sum()
    }
}

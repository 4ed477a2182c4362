// src/model/cut.rs

use crate::model::state::{StageState, StateComponent};
use serde::Serialize;

/// An aggregated Benders cut on a stage's future-cost proxy:
///
/// `proxy >= constant - inventory·s - Σ acquire·v - Σ cancel·x - Σ postpone·z2 - Σ carry·z1`
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Cut {
    pub constant: f64,
    pub inventory: f64,
    pub acquire: Vec<f64>,
    pub cancel: Vec<f64>,
    pub postpone: Vec<f64>,
    pub carry: Vec<f64>,
}

impl Cut {
    /// An all-zero cut with the same shape as `state`.
    pub fn shaped_like(state: &StageState) -> Self {
        Self {
            constant: 0.0,
            inventory: 0.0,
            acquire: vec![0.0; state.acquire.len()],
            cancel: vec![0.0; state.cancel.len()],
            postpone: vec![0.0; state.postpone.len()],
            carry: vec![0.0; state.carry.len()],
        }
    }

    pub fn coefficient(&self, component: StateComponent) -> f64 {
        match component {
            StateComponent::Inventory => self.inventory,
            StateComponent::Acquire(k) => self.acquire[k],
            StateComponent::Cancel(k) => self.cancel[k],
            StateComponent::Postpone(k) => self.postpone[k],
            StateComponent::Carry(k) => self.carry[k],
        }
    }

    /// The lower bound this cut puts on the proxy at `state`.
    pub fn bound_at(&self, state: &StageState) -> f64 {
        state
            .components()
            .into_iter()
            .fold(self.constant, |acc, (component, value)| {
                acc - self.coefficient(component) * value
            })
    }

    /// True when every coefficient and the constant agree within `epsilon`.
    pub fn matches(&self, other: &Cut, epsilon: f64) -> bool {
        let close = |a: f64, b: f64| (a - b).abs() < epsilon;
        let all_close =
            |a: &[f64], b: &[f64]| a.len() == b.len() && a.iter().zip(b).all(|(x, y)| close(*x, *y));
        close(self.constant, other.constant)
            && close(self.inventory, other.inventory)
            && all_close(&self.acquire, &other.acquire)
            && all_close(&self.cancel, &other.cancel)
            && all_close(&self.postpone, &other.postpone)
            && all_close(&self.carry, &other.carry)
    }
}

/// Append-only list of the cuts installed on one stage.
#[derive(Debug, Clone, Default)]
pub struct CutPool {
    cuts: Vec<Cut>,
}

impl CutPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cuts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cuts.is_empty()
    }

    pub fn cuts(&self) -> &[Cut] {
        &self.cuts
    }

    /// Newest cuts are checked first; repeats usually come from the state
    /// visited most recently.
    pub fn contains(&self, candidate: &Cut, epsilon: f64) -> bool {
        self.cuts.iter().rev().any(|cut| cut.matches(candidate, epsilon))
    }

    pub(crate) fn push(&mut self, cut: Cut) {
        self.cuts.push(cut);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> StageState {
        StageState {
            inventory: 10.0,
            acquire: vec![1.0],
            cancel: vec![0.0],
            postpone: vec![],
            carry: vec![1.0],
        }
    }

    #[test]
    fn bound_subtracts_every_weighted_component() {
        let cut = Cut {
            constant: 100.0,
            inventory: 2.0,
            acquire: vec![5.0],
            cancel: vec![7.0],
            postpone: vec![],
            carry: vec![-3.0],
        };
        assert_eq!(cut.bound_at(&state()), 100.0 - 20.0 - 5.0 - 0.0 + 3.0);
    }

    #[test]
    fn near_identical_cuts_are_duplicates() {
        let mut pool = CutPool::new();
        let mut cut = Cut::shaped_like(&state());
        cut.constant = 50.0;
        cut.inventory = 1.5;
        pool.push(cut.clone());

        let mut nudged = cut.clone();
        nudged.inventory += 1e-7;
        assert!(pool.contains(&nudged, 1e-5));

        nudged.acquire[0] = 1e-3;
        assert!(!pool.contains(&nudged, 1e-5));
    }
}

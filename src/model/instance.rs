// src/model/instance.rs

use crate::error::{Result, SddpError};
use crate::simulation::config::ModelParams;
use serde::{Deserialize, Serialize};

/// Conditional probabilities of a stage must sum to one within this.
pub const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// A discrete supply unit with fixed volume and per-unit-volume costs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lot {
    /// Label used in instance files.
    pub id: u32,
    pub volume: f64,
    pub acquisition_cost: f64,
    pub cancellation_cost: f64,
    pub postponement_cost: f64,
}

/// One demand realisation of a stage and its conditional probability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub probability: f64,
    pub demand: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageData {
    pub holding_cost: f64,
    /// Lots that can be bought now and arrive next stage (indices into `lots`).
    #[serde(default)]
    pub purchasable: Vec<usize>,
    /// Lots already bought that arrive next stage and may be cancelled or
    /// postponed now.
    #[serde(default)]
    pub committed: Vec<usize>,
    pub scenarios: Vec<Scenario>,
}

/// Static input of the lot-sizing problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub lots: Vec<Lot>,
    pub inventory_min: f64,
    pub inventory_max: f64,
    pub initial_inventory: f64,
    /// Lots arriving in the first stage, committed before the horizon.
    #[serde(default)]
    pub initial_arrivals: Vec<usize>,
    pub stages: Vec<StageData>,
}

impl Instance {
    pub fn horizon(&self) -> usize {
        self.stages.len()
    }

    /// Lots whose arrival at stage `t` was fixed one stage earlier.
    pub fn arriving(&self, t: usize) -> &[usize] {
        if t == 0 {
            &self.initial_arrivals
        } else {
            &self.stages[t - 1].committed
        }
    }

    /// Lots bought at stage `t - 1`.
    pub fn previously_purchasable(&self, t: usize) -> &[usize] {
        if t == 0 {
            &[]
        } else {
            &self.stages[t - 1].purchasable
        }
    }

    /// Lots committed two stages before `t`, the only ones that may arrive
    /// at `t` after a postponement.
    pub fn postponable_into(&self, t: usize) -> &[usize] {
        if t < 2 {
            &[]
        } else {
            &self.stages[t - 2].committed
        }
    }

    /// Volume arriving at stage `t` from prior commitments, before any
    /// cancellation.
    pub fn fixed_arrival(&self, t: usize) -> f64 {
        self.arriving(t).iter().map(|&c| self.lots[c].volume).sum()
    }

    pub fn volumes(&self, lots: &[usize]) -> Vec<f64> {
        lots.iter().map(|&c| self.lots[c].volume).collect()
    }

    /// Number of root-to-leaf scenario paths, `None` on overflow.
    pub fn total_paths(&self) -> Option<usize> {
        self.stages
            .iter()
            .try_fold(1usize, |acc, stage| acc.checked_mul(stage.scenarios.len()))
    }

    /// Rejects instances the decomposition cannot be run on. Called before
    /// any subproblem is built.
    pub fn validate(&self) -> Result<()> {
        let horizon = self.horizon();
        if horizon < 2 {
            return Err(invalid(format!("need at least two stages, got {}", horizon)));
        }
        if self.inventory_min > self.inventory_max {
            return Err(invalid(format!(
                "inventory bounds are inverted ({} > {})",
                self.inventory_min, self.inventory_max
            )));
        }
        for (c, lot) in self.lots.iter().enumerate() {
            if lot.volume < 0.0 {
                return Err(invalid(format!("lot {} has negative volume", lot.id)));
            }
            if lot.costs().into_iter().chain([lot.volume]).any(|value| !value.is_finite()) {
                return Err(invalid(format!("lot at index {} has non-finite data", c)));
            }
        }

        let lot_count = self.lots.len();
        let check_lots = |what: &str, t: usize, lots: &[usize]| -> Result<()> {
            match lots.iter().find(|&&c| c >= lot_count) {
                Some(c) => Err(invalid(format!(
                    "stage {}: {} references unknown lot index {}",
                    t, what, c
                ))),
                None => Ok(()),
            }
        };
        check_lots("initial arrivals", 0, &self.initial_arrivals)?;

        for (t, stage) in self.stages.iter().enumerate() {
            check_lots("purchasable set", t, &stage.purchasable)?;
            check_lots("committed set", t, &stage.committed)?;

            if !stage.holding_cost.is_finite() {
                return Err(invalid(format!("stage {} has holding cost {}", t, stage.holding_cost)));
            }
            if stage.scenarios.is_empty() {
                return Err(invalid(format!("stage {} has no scenarios", t)));
            }
            if t == 0 && stage.scenarios.len() != 1 {
                return Err(invalid(format!(
                    "the first stage must have exactly one scenario, got {}",
                    stage.scenarios.len()
                )));
            }
            if t == horizon - 1 && (!stage.purchasable.is_empty() || !stage.committed.is_empty()) {
                return Err(invalid(
                    "the last stage cannot buy or hold commitments beyond the horizon".to_string(),
                ));
            }

            let mut total = 0.0;
            for (s, scenario) in stage.scenarios.iter().enumerate() {
                if !(scenario.probability >= 0.0) {
                    return Err(invalid(format!(
                        "stage {} scenario {} has probability {}",
                        t, s, scenario.probability
                    )));
                }
                if !(scenario.demand >= 0.0) {
                    return Err(invalid(format!(
                        "stage {} scenario {} has demand {}",
                        t, s, scenario.demand
                    )));
                }
                total += scenario.probability;
            }
            if (total - 1.0).abs() > PROBABILITY_TOLERANCE {
                return Err(invalid(format!(
                    "stage {} probabilities sum to {} instead of 1",
                    t, total
                )));
            }
        }

        // The first stage carries no slack, so its balance must close inside
        // the inventory bounds.
        let closing = self.initial_inventory + self.fixed_arrival(0) - self.stages[0].scenarios[0].demand;
        if closing < self.inventory_min || closing > self.inventory_max {
            return Err(invalid(format!(
                "first stage closes with inventory {:.4}, outside [{}, {}]",
                closing, self.inventory_min, self.inventory_max
            )));
        }
        Ok(())
    }

    /// [`Instance::validate`] plus the checks that depend on the model
    /// parameters. A non-negative proxy floor is only a valid bound on the
    /// future cost when no cost can be negative.
    pub fn validate_for(&self, params: &ModelParams) -> Result<()> {
        self.validate()?;
        if params.proxy_floor < 0.0 {
            return Ok(());
        }
        for lot in &self.lots {
            if lot.costs().iter().any(|&cost| cost < 0.0) {
                return Err(invalid(format!(
                    "lot {} has a negative cost but the proxy floor is {}",
                    lot.id, params.proxy_floor
                )));
            }
        }
        if let Some(t) = self.stages.iter().position(|stage| stage.holding_cost < 0.0) {
            return Err(invalid(format!(
                "stage {} has a negative holding cost but the proxy floor is {}",
                t, params.proxy_floor
            )));
        }
        Ok(())
    }
}

impl Lot {
    /// Acquisition, cancellation and postponement cost per unit of volume.
    pub fn costs(&self) -> [f64; 3] {
        [self.acquisition_cost, self.cancellation_cost, self.postponement_cost]
    }
}

fn invalid(message: String) -> SddpError {
    SddpError::InvalidInstance(message)
}


#[cfg(test)]
mod tests {
    use super::fixtures::small_instance;
    use super::*;
    use crate::simulation::config::SddpConfig;

    #[test]
    fn small_instance_is_valid() {
        let instance = small_instance();
        assert!(instance.validate().is_ok());
        assert_eq!(instance.total_paths(), Some(4));
        assert_eq!(instance.fixed_arrival(0), 25.0);
        assert_eq!(instance.fixed_arrival(1), 30.0);
        assert_eq!(instance.postponable_into(2), &[1]);
    }

    #[test]
    fn rejects_probabilities_that_do_not_sum_to_one() {
        let mut instance = small_instance();
        instance.stages[1].scenarios[0].probability = 0.5;
        let err = instance.validate().unwrap_err();
        assert!(matches!(err, SddpError::InvalidInstance(ref m) if m.contains("stage 1")));
    }

    #[test]
    fn rejects_infeasible_first_stage() {
        let mut instance = small_instance();
        instance.stages[0].scenarios[0].demand = 100.0;
        assert!(instance.validate().is_err());
    }

    #[test]
    fn rejects_commitments_in_last_stage() {
        let mut instance = small_instance();
        instance.stages[2].purchasable = vec![2];
        assert!(instance.validate().is_err());
    }

    #[test]
    fn rejects_non_finite_costs() {
        let mut instance = small_instance();
        instance.lots[2].postponement_cost = f64::NAN;
        assert!(instance.validate().is_err());

        let mut instance = small_instance();
        instance.stages[1].holding_cost = f64::INFINITY;
        assert!(instance.validate().is_err());
    }

    #[test]
    fn negative_costs_need_a_negative_proxy_floor() {
        let mut instance = small_instance();
        instance.lots[1].cancellation_cost = -5.0;
        let mut params = SddpConfig::default().model_params();
        assert!(instance.validate().is_ok());
        let err = instance.validate_for(&params).unwrap_err();
        assert!(matches!(err, SddpError::InvalidInstance(ref m) if m.contains("lot 2")));

        params.proxy_floor = -1e6;
        assert!(instance.validate_for(&params).is_ok());

        let mut instance = small_instance();
        instance.stages[2].holding_cost = -0.5;
        assert!(instance.validate_for(&SddpConfig::default().model_params()).is_err());
    }

    #[test]
    fn rejects_unknown_lot_reference() {
        let mut instance = small_instance();
        instance.stages[0].committed = vec![9];
        assert!(instance.validate().is_err());
    }
}

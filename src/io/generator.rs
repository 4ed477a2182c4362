// src/io/generator.rs

use crate::error::{Result, SddpError};
use crate::model::instance::{Instance, Lot, Scenario, StageData};
use rand::Rng;
use rand_distr::{Beta, Distribution, Uniform};

/// Redraws allowed for the feasibility and probability loops.
const MAX_REDRAWS: usize = 10_000;

/// Ranges and tree shape of a synthetic instance.
#[derive(Debug, Clone)]
pub struct GeneratorParams {
    /// Number of stages (H).
    pub horizon: usize,
    /// Scenarios per stage after the first (g).
    pub branching: usize,
    /// Lots bought before the horizon, split between stage 0 and stage 1 arrivals.
    pub pre_acquired: usize,
    /// Lots that can be bought at every stage but the last.
    pub purchasable: usize,

    pub initial_inventory: f64,
    pub inventory_min: f64,
    pub inventory_max: f64,
    pub holding_cost: f64,
    pub volume: (f64, f64),
    pub acquisition_cost: (f64, f64),
    pub cancellation_cost: (f64, f64),
    pub postponement_cost: (f64, f64),
    pub demand: (f64, f64),
}

impl Default for GeneratorParams {
    fn default() -> Self {
        Self {
            horizon: 3,
            branching: 2,
            pre_acquired: 2,
            purchasable: 3,
            initial_inventory: 20.0,
            inventory_min: 0.0,
            inventory_max: 80.0,
            holding_cost: 1.0,
            volume: (10.0, 50.0),
            acquisition_cost: (150.0, 250.0),
            cancellation_cost: (30.0, 50.0),
            postponement_cost: (5.0, 12.0),
            demand: (10.0, 50.0),
        }
    }
}

fn uniform((low, high): (f64, f64), what: &str) -> Result<Uniform<f64>> {
    if low < high {
        Ok(Uniform::new(low, high))
    } else {
        Err(SddpError::InvalidConfig(format!("{} range [{}, {}) is empty", what, low, high)))
    }
}

/// Conditional probabilities of one stage with `branching` scenarios.
///
/// The first `g - 1` come from `Beta(4/g, 4 - 4/g)`; the last takes the
/// remainder and must stay positive.
fn stage_probabilities<R: Rng + ?Sized>(branching: usize, rng: &mut R) -> Result<Vec<f64>> {
    if branching == 1 {
        return Ok(vec![1.0]);
    }
    let alpha = 4.0 / branching as f64;
    let beta = Beta::new(alpha, 4.0 - alpha)
        .map_err(|e| SddpError::InvalidConfig(format!("probability distribution: {}", e)))?;
    for _ in 0..MAX_REDRAWS {
        let mut probabilities: Vec<f64> = (0..branching - 1).map(|_| beta.sample(rng)).collect();
        let remainder = 1.0 - probabilities.iter().sum::<f64>();
        if remainder > 0.0 {
            probabilities.push(remainder);
            return Ok(probabilities);
        }
        log::debug!("redrawing probabilities {:?}", probabilities);
    }
    Err(SddpError::InvalidConfig(format!(
        "no positive probability vector for {} scenarios after {} draws",
        branching, MAX_REDRAWS
    )))
}

/// Draws a random instance.
///
/// Pre-acquired lots are split at random between stage 0 arrivals and stage
/// 0 commitments (arriving at stage 1); volumes and demands are redrawn until
/// stage 0 closes inside the inventory bounds.
pub fn generate<R: Rng + ?Sized>(params: &GeneratorParams, rng: &mut R) -> Result<Instance> {
    let horizon = params.horizon;
    let branching = params.branching;
    if horizon < 2 || branching == 0 {
        return Err(SddpError::InvalidConfig(format!(
            "need at least two stages and one scenario per stage, got H = {}, g = {}",
            horizon, branching
        )));
    }
    let lot_count = params.pre_acquired + params.purchasable;
    let volume = uniform(params.volume, "volume")?;
    let demand = uniform(params.demand, "demand")?;

    let mut attempt = 0;
    let (initial_arrivals, committed, volumes, demands) = loop {
        attempt += 1;
        if attempt > MAX_REDRAWS {
            return Err(SddpError::InvalidConfig(
                "could not draw a feasible first stage; check the volume and demand ranges".to_string(),
            ));
        }
        let (initial, later): (Vec<usize>, Vec<usize>) = (0..params.pre_acquired).partition(|_| rng.gen_bool(0.5));
        let volumes: Vec<f64> = (0..lot_count).map(|_| volume.sample(rng)).collect();
        let demands: Vec<Vec<f64>> = (0..horizon)
            .map(|t| {
                let count = if t == 0 { 1 } else { branching };
                (0..count).map(|_| demand.sample(rng)).collect()
            })
            .collect();

        let arriving: f64 = initial.iter().map(|&c| volumes[c]).sum();
        let closing = params.initial_inventory + arriving - demands[0][0];
        if closing >= params.inventory_min && closing <= params.inventory_max {
            break (initial, later, volumes, demands);
        }
    };

    let acquisition = uniform(params.acquisition_cost, "acquisition cost")?;
    let cancellation = uniform(params.cancellation_cost, "cancellation cost")?;
    let postponement = uniform(params.postponement_cost, "postponement cost")?;
    let lots = volumes
        .iter()
        .enumerate()
        .map(|(c, &volume)| Lot {
            id: c as u32 + 1,
            volume,
            acquisition_cost: acquisition.sample(rng),
            cancellation_cost: cancellation.sample(rng),
            postponement_cost: postponement.sample(rng),
        })
        .collect();

    let buyable: Vec<usize> = (params.pre_acquired..lot_count).collect();
    let mut stages = Vec::with_capacity(horizon);
    for (t, stage_demands) in demands.into_iter().enumerate() {
        let probabilities = if t == 0 {
            vec![1.0]
        } else {
            stage_probabilities(branching, rng)?
        };
        stages.push(StageData {
            holding_cost: params.holding_cost,
            purchasable: if t + 1 < horizon { buyable.clone() } else { Vec::new() },
            committed: if t == 0 { committed.clone() } else { Vec::new() },
            scenarios: probabilities
                .into_iter()
                .zip(stage_demands)
                .map(|(probability, demand)| Scenario { probability, demand })
                .collect(),
        });
    }

    let instance = Instance {
        lots,
        inventory_min: params.inventory_min,
        inventory_max: params.inventory_max,
        initial_inventory: params.initial_inventory,
        initial_arrivals,
        stages,
    };
    instance.validate()?;
    log::info!(
        "generated instance: H = {}, g = {}, {} lots, {} paths",
        horizon,
        branching,
        lot_count,
        instance.total_paths().map_or_else(|| "too many".to_string(), |n| n.to_string())
    );
    Ok(instance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn generated_instance_is_valid() {
        let mut rng = StdRng::seed_from_u64(42);
        let params = GeneratorParams {
            horizon: 4,
            branching: 3,
            ..GeneratorParams::default()
        };
        let instance = generate(&params, &mut rng).unwrap();
        assert_eq!(instance.horizon(), 4);
        assert_eq!(instance.lots.len(), 5);
        assert_eq!(instance.total_paths(), Some(27));
        assert!(instance.stages[3].purchasable.is_empty());
        assert_eq!(
            instance.initial_arrivals.len() + instance.stages[0].committed.len(),
            2
        );
        for lot in &instance.lots {
            assert!(lot.volume >= 10.0 && lot.volume < 50.0);
        }
    }

    #[test]
    fn same_seed_same_instance() {
        let params = GeneratorParams::default();
        let a = generate(&params, &mut StdRng::seed_from_u64(9)).unwrap();
        let b = generate(&params, &mut StdRng::seed_from_u64(9)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn single_branch_has_certain_scenarios() {
        let params = GeneratorParams {
            branching: 1,
            ..GeneratorParams::default()
        };
        let instance = generate(&params, &mut StdRng::seed_from_u64(1)).unwrap();
        assert!(instance.stages.iter().all(|s| s.scenarios.len() == 1 && s.scenarios[0].probability == 1.0));
    }

    #[test]
    fn rejects_single_stage() {
        let params = GeneratorParams {
            horizon: 1,
            ..GeneratorParams::default()
        };
        assert!(generate(&params, &mut StdRng::seed_from_u64(1)).is_err());
    }
}

use rand::rngs::StdRng;
use rand::SeedableRng;
use sddip_lot_sizing::io::generator::{generate, GeneratorParams};
use sddip_lot_sizing::io::instance_file::{load_instance, parse_dat, save_instance, to_dat};
use sddip_lot_sizing::model::extensive::solve_extensive;
use sddip_lot_sizing::model::instance::{Lot, Scenario, StageData};
use sddip_lot_sizing::model::state::StageState;
use sddip_lot_sizing::solver::backend::GoodLpBackend;
use sddip_lot_sizing::{solve, CommitmentDomain, Instance, SddpConfig, SddpError, TerminationReason};
use std::env;
use std::fs;

fn lot(id: u32, volume: f64, acquisition_cost: f64) -> Lot {
    Lot {
        id,
        volume,
        acquisition_cost,
        cancellation_cost: 35.0,
        postponement_cost: 6.0,
    }
}

fn two_way(demands: [f64; 2], first: f64) -> Vec<Scenario> {
    vec![
        Scenario {
            probability: first,
            demand: demands[0],
        },
        Scenario {
            probability: 1.0 - first,
            demand: demands[1],
        },
    ]
}

/// Four stages, eight paths. Lot 2 is due at stage 1 and can be cancelled
/// or pushed back to stage 2.
fn four_stage_instance() -> Instance {
    Instance {
        lots: vec![
            lot(1, 20.0, 160.0),
            lot(2, 30.0, 190.0),
            lot(3, 25.0, 175.0),
            lot(4, 15.0, 210.0),
        ],
        inventory_min: 0.0,
        inventory_max: 70.0,
        initial_inventory: 15.0,
        initial_arrivals: vec![0],
        stages: vec![
            StageData {
                holding_cost: 1.0,
                purchasable: vec![2, 3],
                committed: vec![1],
                scenarios: vec![Scenario {
                    probability: 1.0,
                    demand: 25.0,
                }],
            },
            StageData {
                holding_cost: 1.5,
                purchasable: vec![2, 3],
                committed: vec![],
                scenarios: two_way([15.0, 40.0], 0.5),
            },
            StageData {
                holding_cost: 1.0,
                purchasable: vec![2, 3],
                committed: vec![],
                scenarios: two_way([20.0, 35.0], 0.3),
            },
            StageData {
                holding_cost: 1.0,
                purchasable: vec![],
                committed: vec![],
                scenarios: two_way([10.0, 30.0], 0.6),
            },
        ],
    }
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-4 * a.abs().max(b.abs()).max(1.0)
}

fn same_decisions(a: &StageState, b: &StageState) -> bool {
    let pairs = |x: &[f64], y: &[f64]| x.len() == y.len() && x.iter().zip(y).all(|(p, q)| (p - q).abs() < 1e-4);
    close(a.inventory, b.inventory)
        && pairs(&a.acquire, &b.acquire)
        && pairs(&a.cancel, &b.cancel)
        && pairs(&a.postpone, &b.postpone)
        && pairs(&a.carry, &b.carry)
}

#[test]
fn exhaustive_run_matches_the_deterministic_equivalent() {
    let instance = four_stage_instance();
    let config = SddpConfig::default();
    let summary = solve(&instance, config.clone()).unwrap();
    let reference = solve_extensive(&instance, &config.model_params(), &GoodLpBackend).unwrap();

    assert_eq!(summary.termination, TerminationReason::Converged);
    assert!(summary.upper_bound_exact);
    assert!(summary.gap() < 1e-4);
    assert!(close(summary.lower_bound, reference.objective));
    assert!(close(summary.upper_bound, reference.objective));
    assert!(
        same_decisions(&summary.first_stage, &reference.first_stage),
        "root decisions {:?}, deterministic equivalent {:?}",
        summary.first_stage,
        reference.first_stage
    );
    assert_eq!(reference.nodes, 15);
}

#[test]
fn lower_bounds_are_monotone_and_below_upper_bounds() {
    let instance = four_stage_instance();
    let summary = solve(&instance, SddpConfig::default()).unwrap();
    assert!(!summary.history.is_empty());
    for pair in summary.history.windows(2) {
        assert!(pair[1].lower_bound >= pair[0].lower_bound - 1e-7 * pair[0].lower_bound.abs().max(1.0));
    }
    for record in &summary.history {
        assert!(record.lower_bound <= record.upper_bound + 1e-6 * record.upper_bound.abs().max(1.0));
        assert_eq!(record.paths, 8);
    }
}

#[test]
fn oversized_sample_runs_exhaustively() {
    let instance = four_stage_instance();
    let exhaustive = solve(&instance, SddpConfig::default()).unwrap();
    let oversized = solve(
        &instance,
        SddpConfig {
            sample_size: 50,
            seed: Some(3),
            ..SddpConfig::default()
        },
    )
    .unwrap();

    assert!(oversized.upper_bound_exact);
    assert!(oversized.statistical_upper_bound.is_none());
    assert_eq!(oversized.iterations, exhaustive.iterations);
    assert!(close(oversized.lower_bound, exhaustive.lower_bound));
    assert_eq!(oversized.cuts_per_stage, exhaustive.cuts_per_stage);
}

#[test]
fn sampled_run_ends_with_an_exact_bound() {
    let instance = four_stage_instance();
    let config = SddpConfig {
        sample_size: 3,
        seed: Some(11),
        ..SddpConfig::default()
    };
    let summary = solve(&instance, config.clone()).unwrap();
    let reference = solve_extensive(&instance, &config.model_params(), &GoodLpBackend).unwrap();

    assert!(summary.upper_bound_exact);
    assert!(summary.statistical_upper_bound.is_some());
    let slack = 1e-6 * reference.objective.abs().max(1.0);
    assert!(summary.lower_bound <= reference.objective + slack);
    assert!(summary.upper_bound >= reference.objective - slack);
    assert_eq!(summary.trajectory.len(), instance.horizon());
}

#[test]
fn same_seed_same_run() {
    let instance = four_stage_instance();
    let config = SddpConfig {
        sample_size: 2,
        seed: Some(5),
        final_exhaustive_pass: false,
        ..SddpConfig::default()
    };
    let a = solve(&instance, config.clone()).unwrap();
    let b = solve(&instance, config).unwrap();
    assert!(!a.upper_bound_exact);
    assert_eq!(a.iterations, b.iterations);
    assert_eq!(a.lower_bound, b.lower_bound);
    assert_eq!(a.upper_bound, b.upper_bound);
}

#[test]
fn every_cut_is_new_when_installed() {
    let instance = four_stage_instance();
    let summary = solve(&instance, SddpConfig::default()).unwrap();
    let installed: usize = summary.history.iter().map(|r| r.cuts_installed).sum();
    assert_eq!(installed, summary.total_cuts());
    assert_eq!(*summary.cuts_per_stage.last().unwrap(), 0);
}

#[test]
fn shared_prefixes_are_solved_once() {
    let instance = four_stage_instance();
    let summary = solve(&instance, SddpConfig::default()).unwrap();
    let first = &summary.history[0];
    // Root, 2 + 4 + 8 distinct forward nodes, then 2 + 4 children backward
    // plus one per stage-2 node whose sibling's duals came from the forward pass.
    assert_eq!(first.solves, 1 + 14 + 10);
    assert!(first.cuts_installed > 0);
}

#[test]
fn invalid_probabilities_are_rejected_before_solving() {
    let mut instance = four_stage_instance();
    instance.stages[2].scenarios[1].probability = 0.2;
    match solve(&instance, SddpConfig::default()) {
        Err(SddpError::InvalidInstance(message)) => assert!(message.contains("stage 2")),
        other => panic!("expected an invalid instance, got {:?}", other.map(|s| s.iterations)),
    }
}

#[test]
fn binary_commitments_stay_integral_at_the_root() {
    let instance = four_stage_instance();
    let summary = solve(
        &instance,
        SddpConfig {
            commitments: CommitmentDomain::Binary,
            max_iterations: 20,
            ..SddpConfig::default()
        },
    )
    .unwrap();
    let first = &summary.first_stage;
    for value in first.acquire.iter().chain(&first.cancel).chain(&first.postpone) {
        assert!(value.abs() < 1e-6 || (value - 1.0).abs() < 1e-6);
    }
}

#[test]
fn generated_instance_survives_the_text_format() {
    let params = GeneratorParams::default();
    let instance = generate(&params, &mut StdRng::seed_from_u64(2024)).unwrap();
    let parsed = parse_dat(&to_dat(&instance)).unwrap();
    assert_eq!(parsed, instance);

    let path = env::temp_dir().join(format!("sddip-generated-{}.json", std::process::id()));
    save_instance(&path, &instance).unwrap();
    let loaded = load_instance(&path).unwrap();
    fs::remove_file(&path).unwrap();
    assert_eq!(loaded, instance);
}

#[test]
fn generated_instance_is_solved_to_optimality() {
    let params = GeneratorParams::default();
    for seed in [4, 7] {
        let instance = generate(&params, &mut StdRng::seed_from_u64(seed)).unwrap();
        let config = SddpConfig::default();
        let summary = solve(&instance, config.clone()).unwrap();
        let reference = solve_extensive(&instance, &config.model_params(), &GoodLpBackend).unwrap();
        assert!(close(summary.lower_bound, reference.objective), "seed {}", seed);
        assert!(
            same_decisions(&summary.first_stage, &reference.first_stage),
            "seed {}: root decisions {:?}, deterministic equivalent {:?}",
            seed,
            summary.first_stage,
            reference.first_stage
        );
    }
}

#[test]
fn binary_lower_bound_stays_below_the_integer_optimum() {
    let params = GeneratorParams::default();
    let config = SddpConfig {
        commitments: CommitmentDomain::Binary,
        max_iterations: 50,
        ..SddpConfig::default()
    };
    let instances = [
        four_stage_instance(),
        generate(&params, &mut StdRng::seed_from_u64(3)).unwrap(),
    ];
    for instance in &instances {
        let summary = solve(instance, config.clone()).unwrap();
        let integer = solve_extensive(instance, &config.model_params(), &GoodLpBackend).unwrap();
        let slack = 1e-6 * integer.objective.abs().max(1.0);
        assert!(
            summary.lower_bound <= integer.objective + slack,
            "LB {} above the integer optimum {}",
            summary.lower_bound,
            integer.objective
        );
        // The exact upper bound is the cost of an integer policy.
        assert!(summary.upper_bound >= integer.objective - slack);
        for record in &summary.history {
            assert!(record.lower_bound <= integer.objective + slack);
        }
    }
}

#[test]
fn negative_costs_are_rejected_under_a_zero_proxy_floor() {
    let mut instance = four_stage_instance();
    instance.lots[3].postponement_cost = -2.0;
    match solve(&instance, SddpConfig::default()) {
        Err(SddpError::InvalidInstance(message)) => assert!(message.contains("lot 4")),
        other => panic!("expected an invalid instance, got {:?}", other.map(|s| s.iterations)),
    }
    assert!(solve_extensive(&instance, &SddpConfig::default().model_params(), &GoodLpBackend).is_err());

    let relaxed_floor = SddpConfig {
        proxy_floor: -1e7,
        max_iterations: 3,
        ..SddpConfig::default()
    };
    assert!(solve(&instance, relaxed_floor).is_ok());
}

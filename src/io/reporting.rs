// src/io/reporting.rs

use crate::error::Result;
use crate::model::extensive::ExtensiveSolution;
use crate::model::state::StageState;
use crate::simulation::engine::RunSummary;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Writes `rows` to a CSV file, one record per row with a header line.
///
/// # Arguments
/// * `file_path` - Destination, e.g. "results/history.csv".
/// * `rows` - Any serialisable records, such as the iteration history.
pub fn write_csv<T: Serialize>(file_path: impl AsRef<Path>, rows: &[T]) -> Result<()> {
    let path = file_path.as_ref();
    let mut wtr = csv::Writer::from_path(path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    log::info!("wrote {} rows to '{}'", rows.len(), path.display());
    Ok(())
}

/// Writes the whole run summary as pretty-printed JSON.
pub fn write_summary_json(file_path: impl AsRef<Path>, summary: &RunSummary) -> Result<()> {
    fs::write(file_path.as_ref(), serde_json::to_string_pretty(summary)?)?;
    Ok(())
}

fn format_values(values: &[f64]) -> String {
    let parts: Vec<String> = values.iter().map(|v| format!("{:.3}", v)).collect();
    format!("[{}]", parts.join(", "))
}

fn print_stage_state(state: &StageState) {
    println!("  inventory   : {:.4}", state.inventory);
    println!("  acquire     : {}", format_values(&state.acquire));
    println!("  cancel      : {}", format_values(&state.cancel));
    println!("  postpone    : {}", format_values(&state.postpone));
}

/// Prints the human-readable run report.
pub fn print_summary(summary: &RunSummary) {
    println!("\n=== Decomposition Result ===");
    println!("Iterations      : {}", summary.iterations);
    println!("Termination     : {:?}", summary.termination);
    println!("Lower bound     : {:.6}", summary.lower_bound);
    println!(
        "Upper bound     : {:.6} ({})",
        summary.upper_bound,
        if summary.upper_bound_exact { "exact" } else { "statistical" }
    );
    if let (Some(statistical), true) = (summary.statistical_upper_bound, summary.upper_bound_exact) {
        println!("Sampled bound   : {:.6}", statistical);
    }
    match summary.relative_gap() {
        Some(relative) => println!("Gap             : {:.6} ({:.4}%)", summary.gap(), relative * 100.0),
        None => println!("Gap             : {:.6}", summary.gap()),
    }
    println!(
        "Cuts            : {} installed {:?}, {} repeated",
        summary.total_cuts(),
        summary.cuts_per_stage,
        summary.duplicate_cuts
    );
    println!("Elapsed         : {:.3}s", summary.elapsed.as_secs_f64());

    println!("\n=== First Stage ===");
    println!("  cost        : {:.4}", summary.first_stage_cost);
    print_stage_state(&summary.first_stage);

    if !summary.trajectory.is_empty() {
        println!("\n=== Representative Path ===");
        println!(
            "{:>5} {:>8} {:>10} {:>10} {:>10} {:>10} {:>10} {:>12}",
            "stage", "scenario", "demand", "inventory", "acquired", "cancelled", "postponed", "cost"
        );
        for row in &summary.trajectory {
            println!(
                "{:>5} {:>8} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>12.2}",
                row.stage,
                row.scenario,
                row.demand,
                row.inventory,
                row.acquired_volume,
                row.cancelled_volume,
                row.postponed_volume,
                row.stage_cost
            );
        }
    }
}

pub fn print_extensive(solution: &ExtensiveSolution) {
    println!("\n=== Deterministic Equivalent ===");
    println!("Tree nodes      : {}", solution.nodes);
    println!("Optimal value   : {:.6}", solution.objective);
    println!("\n=== First Stage ===");
    print_stage_state(&solution.first_stage);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::engine::IterationRecord;
    use std::env;

    #[test]
    fn csv_has_header_and_rows() {
        let path = env::temp_dir().join(format!("sddip-history-{}.csv", std::process::id()));
        let rows = vec![
            IterationRecord {
                iteration: 1,
                lower_bound: 10.0,
                upper_bound: 12.5,
                mean_cost: 12.5,
                std_error: 0.0,
                paths: 4,
                cuts_installed: 3,
                duplicate_cuts: 0,
                solves: 13,
                elapsed_secs: 0.01,
            };
            2
        ];
        write_csv(&path, &rows).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        fs::remove_file(&path).unwrap();

        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("iteration,lower_bound,upper_bound"));
        assert_eq!(lines.count(), 2);
    }
}

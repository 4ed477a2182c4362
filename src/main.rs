use clap::{Parser, Subcommand, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;
use sddip_lot_sizing::io::generator::{self, GeneratorParams};
use sddip_lot_sizing::io::instance_file;
use sddip_lot_sizing::io::reporting;
use sddip_lot_sizing::model::extensive;
use sddip_lot_sizing::solver::backend::GoodLpBackend;
use sddip_lot_sizing::{CommitmentDomain, Decomposition, Result, SddpConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "sddip-lot-sizing")]
#[command(version)]
#[command(about = "Multistage stochastic lot sizing with SDDP / SDDiP")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    /// Commitments are fractions of a lot (SDDP).
    Sddp,
    /// Commitments are whole lots (SDDiP).
    Sddip,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the decomposition on an instance file (.dat or .json)
    Solve {
        instance: PathBuf,
        /// Paths per iteration; 0 enumerates the tree
        #[arg(short = 'm', long, default_value_t = 0)]
        samples: usize,
        #[arg(long, value_enum, default_value_t = Mode::Sddp)]
        mode: Mode,
        #[arg(long, default_value_t = 1e-5)]
        epsilon: f64,
        #[arg(long, default_value_t = 0.98)]
        confidence: f64,
        /// Lower bound on every future-cost proxy
        #[arg(long, default_value_t = 0.0)]
        proxy_floor: f64,
        #[arg(long, default_value_t = 1000)]
        max_iterations: usize,
        /// Abort after this many seconds
        #[arg(long)]
        time_budget: Option<f64>,
        #[arg(long)]
        seed: Option<u64>,
        /// Keep the first sample for the whole run
        #[arg(long)]
        fixed_sample: bool,
        /// Skip the exact pass over the whole tree after a sampled run
        #[arg(long)]
        no_final_pass: bool,
        /// Path whose decisions are reported
        #[arg(long, default_value_t = 0)]
        report_path: usize,
        /// Write the iteration history here
        #[arg(long)]
        history_csv: Option<PathBuf>,
        /// Write the representative path's decisions here
        #[arg(long)]
        trajectory_csv: Option<PathBuf>,
        /// Write the full summary as JSON here
        #[arg(long)]
        summary_json: Option<PathBuf>,
    },
    /// Draw a random instance
    Generate {
        /// Output file (.dat or .json)
        output: PathBuf,
        #[arg(long, default_value_t = 3)]
        horizon: usize,
        #[arg(long, default_value_t = 2)]
        branching: usize,
        /// Lots bought before the first stage
        #[arg(long, default_value_t = 2)]
        pre_acquired: usize,
        /// Lots on offer at every stage
        #[arg(long, default_value_t = 3)]
        purchasable: usize,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Solve the deterministic equivalent over the whole tree
    Extensive {
        instance: PathBuf,
        #[arg(long, value_enum, default_value_t = Mode::Sddp)]
        mode: Mode,
    },
}

fn commitments(mode: Mode) -> CommitmentDomain {
    match mode {
        Mode::Sddp => CommitmentDomain::Continuous,
        Mode::Sddip => CommitmentDomain::Binary,
    }
}

fn rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Solve {
            instance,
            samples,
            mode,
            epsilon,
            confidence,
            proxy_floor,
            max_iterations,
            time_budget,
            seed,
            fixed_sample,
            no_final_pass,
            report_path,
            history_csv,
            trajectory_csv,
            summary_json,
        } => {
            // 1. LOAD INSTANCE
            let data = instance_file::load_instance(&instance)?;

            // 2. SETUP CONFIGURATION
            let config = SddpConfig {
                sample_size: samples,
                resample_each_iteration: !fixed_sample,
                epsilon,
                confidence,
                proxy_floor,
                commitments: commitments(mode),
                max_iterations,
                time_budget: time_budget.map(Duration::from_secs_f64),
                seed,
                final_exhaustive_pass: !no_final_pass,
                report_path,
                ..SddpConfig::default()
            };

            // 3. RUN DECOMPOSITION
            let summary = Decomposition::new(&data, config, Box::new(GoodLpBackend))?.run()?;

            // 4. REPORT
            reporting::print_summary(&summary);
            if let Some(path) = history_csv {
                reporting::write_csv(path, &summary.history)?;
            }
            if let Some(path) = trajectory_csv {
                reporting::write_csv(path, &summary.trajectory)?;
            }
            if let Some(path) = summary_json {
                reporting::write_summary_json(path, &summary)?;
            }
        }
        Command::Generate {
            output,
            horizon,
            branching,
            pre_acquired,
            purchasable,
            seed,
        } => {
            let params = GeneratorParams {
                horizon,
                branching,
                pre_acquired,
                purchasable,
                ..GeneratorParams::default()
            };
            let data = generator::generate(&params, &mut rng(seed))?;
            instance_file::save_instance(&output, &data)?;
            println!("Instance written to {}", output.display());
        }
        Command::Extensive { instance, mode } => {
            let data = instance_file::load_instance(&instance)?;
            let params = SddpConfig {
                commitments: commitments(mode),
                ..SddpConfig::default()
            }
            .model_params();
            let solution = extensive::solve_extensive(&data, &params, &GoodLpBackend)?;
            reporting::print_extensive(&solution);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match run(args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

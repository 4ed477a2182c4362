//! Multistage stochastic lot sizing solved by SDDP / SDDiP.
//!
//! Lots can be bought, cancelled or postponed against a demand that unfolds
//! over a scenario tree. [`simulation::engine::Decomposition`] runs the nested
//! Benders iteration; [`model::extensive`] solves the same problem in one shot
//! for comparison.

pub mod error;
pub mod io;
pub mod model;
pub mod simulation;
pub mod solver;

pub use error::{Result, SddpError};
pub use model::instance::Instance;
pub use simulation::config::{CommitmentDomain, SddpConfig};
pub use simulation::engine::{solve, Decomposition, RunSummary, TerminationReason};

// src/solver/traits.rs

use crate::solver::lp::{LinearProgram, LpSolution};
use std::fmt::Debug;

/// The external solver seam.
///
/// The decomposition only ever hands a fully parameterised program to the
/// backend and reads the result back; a backend must not keep state between
/// calls. `Send + Sync` lets independent solves be dispatched concurrently.
pub trait LpSolver: Debug + Send + Sync {
    /// Solves `program`, honouring integrality flags.
    ///
    /// # Returns
    /// Primal values for every variable. Row duals are filled in only when
    /// the program has no integer variables.
    fn solve(&self, program: &LinearProgram) -> LpSolution;
}

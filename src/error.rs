use crate::solver::SolveStatus;
use thiserror::Error;

/// Errors produced while building, solving or decoding a line ordering run.
#[derive(Error, Debug)]
pub enum OptimError {
    /// The optimization graph is inconsistent (e.g. the segments of a merged
    /// chain disagree on their line sets, or a node front is missing).
    #[error("inconsistent optimization graph: {0}")]
    ModelConstruction(String),

    /// The MIP backend itself failed. Fatal to the run.
    #[error("solver error: {0}")]
    Solver(String),

    /// The solver finished without a proven optimal solution (infeasible,
    /// unbounded, or time limit hit). The ordering is left unchanged.
    #[error("solver finished non-optimal ({status:?})")]
    NonOptimal { status: SolveStatus },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The returned solution violates the uniqueness constraints. This
    /// indicates a solver bug, not bad input.
    #[error("solution violates assignment uniqueness: {0}")]
    DecoderAssertion(String),
}

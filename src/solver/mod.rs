//! Narrow MIP backend interface. The in-process CBC backend and the
//! external-command pre-solve are behaviorally interchangeable: both consume
//! a [`MipModel`](crate::ilp::model::MipModel) and yield named column values.

pub mod cbc;
pub mod external;

use crate::error::OptimError;
use crate::ilp::model::MipModel;
use ahash::AHashMap;
use std::time::Duration;

/// Historical in-process default; the configured limit takes precedence.
pub const DEFAULT_TIME_LIMIT: Duration = Duration::from_secs(60 * 10);

#[derive(Debug, Clone)]
pub struct SolveParams {
    pub time_limit: Duration,
    pub presolve_time_limit: Option<Duration>,
    pub use_feasibility_pump: bool,
    pub use_proximity_search: bool,
    pub threads: usize,
}

impl Default for SolveParams {
    fn default() -> Self {
        SolveParams {
            time_limit: DEFAULT_TIME_LIMIT,
            presolve_time_limit: None,
            use_feasibility_pump: false,
            use_proximity_search: false,
            // single-threaded keeps repeated runs bit-identical; the
            // external solver gets the full hardware concurrency instead
            threads: 1,
        }
    }
}

pub fn hardware_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// Proven optimal integer solution.
    Optimal,
    /// Proven infeasible or unbounded.
    Infeasible,
    /// Stopped without proof (time limit or solver gave up).
    NonOptimal,
}

/// Read side of a solved model: values by variable name.
pub trait SolutionValues {
    fn value(&self, name: &str) -> Option<f64>;
}

/// Solved column values keyed by name.
#[derive(Debug, Clone)]
pub struct MipSolution {
    values: AHashMap<String, f64>,
    objective: f64,
    status: SolveStatus,
}

impl MipSolution {
    pub fn new(values: AHashMap<String, f64>, objective: f64, status: SolveStatus) -> Self {
        MipSolution {
            values,
            objective,
            status,
        }
    }

    pub fn objective(&self) -> f64 {
        self.objective
    }

    pub fn status(&self) -> SolveStatus {
        self.status
    }
}

impl SolutionValues for MipSolution {
    fn value(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }
}

pub trait MipBackend {
    fn solve(&mut self, model: &MipModel, params: &SolveParams) -> Result<MipSolution, OptimError>;
}

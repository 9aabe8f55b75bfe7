use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Run the chain-collapsing simplification pass before building the ILP.
    pub create_core_optim_graph: bool,

    /// External solver command template with `{INPUT}`, `{OUTPUT}` and
    /// `{THREADS}` placeholders. `None` solves in-process only.
    pub external_solver: Option<String>,

    /// Optional dump of the model as MPS.
    pub mps_output_path: Option<PathBuf>,

    /// Optional human readable dump of objective and constraints.
    pub human_readable_output_path: Option<PathBuf>,

    /// Optional dump of the full MIP solution.
    pub solution_output_path: Option<PathBuf>,

    /// Overall solve time limit in milliseconds. `None` uses
    /// [`crate::solver::DEFAULT_TIME_LIMIT`].
    pub time_limit_ms: Option<u64>,

    /// Time limit for the pre-solve heuristics in milliseconds.
    pub presolve_time_limit_ms: Option<u64>,

    pub use_feasibility_pump: bool,
    pub use_proximity_search: bool,

    pub output_stats: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            create_core_optim_graph: true,
            external_solver: None,
            mps_output_path: None,
            human_readable_output_path: None,
            solution_output_path: None,
            time_limit_ms: None,
            presolve_time_limit_ms: None,
            use_feasibility_pump: false,
            use_proximity_search: false,
            output_stats: false,
        }
    }
}

//! speedwell decides, for every edge of a transit network on which several
//! lines run in parallel, the left-to-right order of those lines. The
//! ordering problem is encoded as a 0/1 integer linear program (assignment
//! matrix per segment plus crossing decision variables), solved through CBC
//! or an external MIP solver, and decoded back into a per-edge ordering.

pub mod config;
pub mod crossing;
pub mod decoder;
pub mod error;
pub mod formats;
pub mod graph;
pub mod ilp;
pub mod optgraph;
pub mod optimizer;
pub mod scorer;
pub mod solver;

pub use config::Config;
pub use error::OptimError;
pub use graph::{OrderingConfig, TransitGraph};
pub use optimizer::Optimizer;
pub use scorer::{DefaultScorer, Scorer};

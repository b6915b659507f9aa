//! DTA - distance-to-target analyzer for directed fuzzing.
//!
//! Consumes the interprocedural control-flow graph emitted by an external
//! pointer-analysis step plus a list of source-level targets, computes
//! per-basic-block distance vectors toward every target, and summarizes
//! the per-target distance distributions for seed prioritization.

// Re-export from sub-crates
pub use dta_analysis::{
    AnalysisError, CallDistMap, CallRecord, DistVec, FinalDistances, LineTable, NodeDistMap,
    PathNormalizer, SimpleCallGraph, TargetLocation, Targets, EXTERN_CALL_DIST, MAX_TARGETS,
    RECURSIVE_CALL_DIST,
};
pub use dta_icfg::{Icfg, IcfgError, Location, NodeId, NodeKind};
pub use dta_pool::WorkerPool;
pub use dta_stats::{GammaDistrib, StatsError};

mod output;
mod pipeline;

pub use output::*;
pub use pipeline::*;

use thiserror::Error;

/// Environment variable naming the project root directory.
pub const PROJECT_ROOT_ENV: &str = "DTA_PROJECT_ROOT";

/// Fixed artifact file names under the output directory.
pub const SIMPLE_CG_FILE: &str = "callgraph.simple.dot";
pub const CALL_DIST_FILE: &str = "calls.distance.json";
pub const PRE_BLOCK_DIST_FILE: &str = "blocks.distance.pre.json";
pub const DF_BB_DIST_FILE: &str = "bb.distance.df.json";
pub const BT_BB_DIST_FILE: &str = "bb.distance.bt.json";
pub const FINAL_BB_DIST_FILE: &str = "bb.distance.final.json";
pub const TARGET_INFO_FILE: &str = "target.info.json";

/// Analyzer errors.
#[derive(Error, Debug)]
pub enum Error {
    #[error("graph error: {0}")]
    Icfg(#[from] IcfgError),
    #[error("analysis error: {0}")]
    Analysis(#[from] AnalysisError),
    #[error("statistics error: {0}")]
    Stats(#[from] StatsError),
    #[error("failed to write '{}': {source}", path.display())]
    Write {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("{0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

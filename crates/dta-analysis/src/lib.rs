//! Target-distance analysis over the interprocedural control-flow graph.
//!
//! Two passes compute per-node distance vectors toward every target: a
//! forward pass (intra-procedural BFS composing memoized callee records)
//! and a back-propagation pass that pushes distances from callers back
//! into function bodies. A projector then collapses node distances onto
//! source lines.

mod backprop;
mod blocks;
mod callgraph;
mod distvec;
mod forward;
mod project;
mod targets;

use std::path::PathBuf;

use thiserror::Error;

pub use backprop::*;
pub use blocks::*;
pub use callgraph::*;
pub use distvec::*;
pub use forward::*;
pub use project::*;
pub use targets::*;

/// Maximum number of targets per run.
pub const MAX_TARGETS: usize = 64;

/// Edge-distance charged for a call that resolves to an external or
/// intrinsic function.
pub const EXTERN_CALL_DIST: i32 = 30;

/// Edge-distance charged for a call whose record is unavailable because a
/// recursion cycle was broken at this call site.
pub const RECURSIVE_CALL_DIST: i32 = 25;

/// Analysis errors.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{}: invalid target line '{text}'", path.display())]
    InvalidTargetLine { path: PathBuf, text: String },
    #[error("{}: invalid target file: {detail}", path.display())]
    InvalidTargetFile { path: PathBuf, detail: String },
    #[error("no targets found in '{}'", path.display())]
    NoTargets { path: PathBuf },
    #[error("{count} targets in '{}' exceed the limit of {max}", path.display())]
    TooManyTargets {
        path: PathBuf,
        count: usize,
        max: usize,
    },
    #[error("source file '{}' of target {index} does not exist", path.display())]
    TargetSourceMissing { index: usize, path: PathBuf },
    #[error("no ICFG node matches target {index} ({target})")]
    TargetUnresolved { index: usize, target: String },
    #[error("internal invariant broken: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

//! Interprocedural control-flow graph for the distance analyzer.
//!
//! The graph is produced by an external pointer-analysis step and consumed
//! read-only here: typed nodes, unlabeled edges, explicit call/return
//! pairing, and per-node source locations in the upstream string format.

mod graph;
mod loader;
mod location;

use std::path::PathBuf;

use thiserror::Error;

pub use graph::*;
pub use loader::*;
pub use location::*;

/// Node identifier, dense 32-bit.
pub type NodeId = u32;

/// ICFG errors.
#[derive(Error, Debug)]
pub enum IcfgError {
    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{}:{line}: malformed graph line: {text}", path.display())]
    MalformedLine {
        path: PathBuf,
        line: usize,
        text: String,
    },
    #[error("{}:{line}: unknown node kind '{kind}'", path.display())]
    UnknownKind {
        path: PathBuf,
        line: usize,
        kind: String,
    },
    #[error("duplicate node {0}")]
    DuplicateNode(NodeId),
    #[error("edge references unknown node {0}")]
    UnknownEdgeNode(NodeId),
    #[error("graph has {0} global nodes, expected exactly one")]
    GlobalCount(usize),
    #[error("node {0} has no owning function")]
    MissingFunction(NodeId),
    #[error("function '{function}' has more than one {kind:?} node")]
    DuplicateFunctionNode { function: String, kind: NodeKind },
    #[error("call node {0} has no paired return node")]
    MissingPairedRet(NodeId),
    #[error("call node {call} pairs with node {paired}, which is not a return node")]
    BadPairedRet { call: NodeId, paired: NodeId },
}

pub type Result<T> = std::result::Result<T, IcfgError>;

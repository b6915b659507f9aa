//! Forward distance engine: per-function call records.
//!
//! For every analyzable function this computes the minimum intra-procedural
//! distance from entry to exit and a vector of forward distances from the
//! entry to each target, composing memoized callee records at call sites.
//! Callees are processed first (DFS); recursion cycles are broken with a
//! fixed distance.

use std::collections::{BTreeSet, VecDeque};

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info};

use dta_icfg::{Icfg, NodeId, NodeKind};

use crate::{
    AnalysisError, DistVec, Result, SimpleCallGraph, Targets, EXTERN_CALL_DIST, MAX_TARGETS,
    RECURSIVE_CALL_DIST,
};

/// "No exit reachable" sentinel for [`CallRecord::intra_exit`].
pub const NO_EXIT: u32 = u32::MAX;

/// Memoized forward result of one function.
#[derive(Clone, Debug)]
pub struct CallRecord {
    /// Minimum forward distance from the entry to the function's exit.
    pub intra_exit: u32,
    /// Forward distance from the entry to each target.
    pub dists: DistVec,
}

/// Function name -> record. Keyed by name so the same function reached
/// through different call sites reuses its record.
pub type CallDistMap = FxHashMap<String, CallRecord>;

/// Clamp an intra-exit distance for composition into an `i32` queue
/// distance; the no-exit sentinel saturates and never wins a merge.
pub(crate) fn intra_exit_step(intra_exit: u32) -> i32 {
    i32::try_from(intra_exit).unwrap_or(i32::MAX)
}

pub struct ForwardPass<'a> {
    icfg: &'a Icfg,
    targets: &'a Targets,
    graph: &'a SimpleCallGraph,
    records: CallDistMap,
    /// Entries not yet reached from the global node.
    dynamic: BTreeSet<NodeId>,
    /// Entries currently on the DFS stack, for cycle breaking.
    in_progress: FxHashSet<NodeId>,
}

impl<'a> ForwardPass<'a> {
    /// Compute records for every function in the simplified call graph.
    ///
    /// Functions reachable from the global node are processed callees-first;
    /// the remaining ("dynamic") entries drain in ascending id order so
    /// identical inputs produce identical records.
    pub fn run(
        icfg: &'a Icfg,
        targets: &'a Targets,
        graph: &'a SimpleCallGraph,
    ) -> Result<CallDistMap> {
        if targets.count() == 0 || targets.count() > MAX_TARGETS {
            return Err(AnalysisError::Invariant(format!(
                "forward pass entered with {} targets",
                targets.count()
            )));
        }

        let mut pass = Self {
            icfg,
            targets,
            graph,
            records: CallDistMap::default(),
            dynamic: graph.entries_sorted().into_iter().collect(),
            in_progress: FxHashSet::default(),
        };

        let mut roots: Vec<NodeId> = icfg.out_edges(icfg.global()).to_vec();
        roots.sort_unstable();
        for root in roots {
            if icfg.kind(root) == Some(NodeKind::FunEntry) {
                pass.process(root)?;
            }
        }
        while let Some(&entry) = pass.dynamic.iter().next() {
            pass.process(entry)?;
        }

        info!(functions = pass.records.len(), "forward records computed");
        Ok(pass.records)
    }

    /// DFS wrapper around the per-function BFS.
    fn process(&mut self, entry: NodeId) -> Result<()> {
        self.dynamic.remove(&entry);
        if self.in_progress.contains(&entry) {
            return Ok(());
        }
        let node = self.icfg.node(entry).ok_or_else(|| {
            AnalysisError::Invariant(format!("unknown function entry node {entry}"))
        })?;
        if node.kind != NodeKind::FunEntry {
            return Err(AnalysisError::Invariant(format!(
                "node {entry} scheduled as a function entry but has kind {:?}",
                node.kind
            )));
        }
        // External and intrinsic functions have no record.
        if !self.graph.contains(entry) {
            return Ok(());
        }
        let function = node.function.clone();
        if self.records.contains_key(&function) {
            return Ok(());
        }

        self.in_progress.insert(entry);
        for callee in self.graph.callees_sorted(entry) {
            if callee == entry || !self.graph.contains(callee) {
                continue;
            }
            let callee_name = &self
                .icfg
                .node(callee)
                .expect("call graph nodes exist")
                .function;
            if !self.records.contains_key(callee_name) {
                self.process(callee)?;
            }
        }

        let record = self.function_bfs(entry, &function)?;
        debug!(
            function = %function,
            intra_exit = record.intra_exit,
            "forward record"
        );
        self.records.insert(function, record);
        self.in_progress.remove(&entry);
        Ok(())
    }

    /// Intra-procedural BFS from the entry, composing callee records at
    /// call sites. Never crosses a function boundary: a call site enqueues
    /// its paired return node with a composite distance.
    fn function_bfs(&self, entry: NodeId, function: &str) -> Result<CallRecord> {
        let target_count = self.targets.count();
        let exit = self.icfg.exit_of(function);

        let mut intra_exit = NO_EXIT;
        let mut dists = DistVec::unreached(target_count);
        let mut queue: VecDeque<(NodeId, i32)> = VecDeque::new();
        let mut visited: FxHashSet<NodeId> = FxHashSet::default();
        queue.push_back((entry, 1));

        while let Some((id, dist)) = queue.pop_front() {
            let node = self
                .icfg
                .node(id)
                .ok_or_else(|| AnalysisError::Invariant(format!("unknown node {id} in BFS")))?;
            if node.kind == NodeKind::Global {
                return Err(AnalysisError::Invariant(format!(
                    "global node {id} reached inside function '{function}'"
                )));
            }
            if !visited.insert(id) {
                continue;
            }
            if self.targets.location_of(id).is_none() {
                return Err(AnalysisError::Invariant(format!(
                    "node {id} has no location during BFS of '{function}'"
                )));
            }

            for index in 0..target_count {
                if self.targets.is_target_node(index, id) {
                    dists.observe(index, dist);
                }
            }

            match node.kind {
                NodeKind::FunExit => {
                    // The exit's successors belong to callers, not to this
                    // function's body.
                    if Some(id) == exit {
                        intra_exit = intra_exit.min(dist as u32);
                    }
                }
                NodeKind::FunCall => {
                    let ret = self.icfg.ret_of_call(id).ok_or_else(|| {
                        AnalysisError::Invariant(format!("call node {id} lost its return node"))
                    })?;
                    for &succ in self.icfg.out_edges(id) {
                        let step = match self.icfg.kind(succ) {
                            Some(NodeKind::FunRet) => dist.saturating_add(EXTERN_CALL_DIST),
                            Some(NodeKind::FunEntry) => {
                                let callee = &self
                                    .icfg
                                    .node(succ)
                                    .expect("edge endpoints validated")
                                    .function;
                                match self.records.get(callee) {
                                    Some(record) => {
                                        dists.merge_min(&record.dists, dist);
                                        dist.saturating_add(intra_exit_step(record.intra_exit))
                                    }
                                    // Recursion broken at this call site.
                                    None => dist.saturating_add(RECURSIVE_CALL_DIST),
                                }
                            }
                            _ => dist,
                        };
                        queue.push_back((ret, step));
                    }
                }
                _ => {
                    for &succ in self.icfg.out_edges(id) {
                        queue.push_back((succ, dist.saturating_add(1)));
                    }
                }
            }
        }

        Ok(CallRecord { intra_exit, dists })
    }
}

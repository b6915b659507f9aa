//! Forward block distances, computed per function on the worker pool.
//!
//! Every node reachable in a function body gets a forward distance vector
//! by BFS from that node, reusing the memoized call records. Straight-line
//! runs are back-filled from the end of the run instead of re-running the
//! BFS per node. Results from all functions merge into one shared map.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info};

use dta_icfg::{Icfg, NodeId, NodeKind};

use dta_pool::WorkerPool;

use crate::{
    AnalysisError, CallDistMap, DistVec, Result, SimpleCallGraph, Targets, EXTERN_CALL_DIST,
    RECURSIVE_CALL_DIST,
};
use crate::forward::intra_exit_step;

/// Node -> distance vector.
pub type NodeDistMap = FxHashMap<NodeId, DistVec>;

/// Compute forward distances for every node of every analyzable function.
///
/// One pool task per function entry; tasks only share the result map, and
/// entries merge with the element-wise minimum, so task order is
/// irrelevant to the outcome.
pub fn compute_block_distances(
    icfg: &Arc<Icfg>,
    targets: &Arc<Targets>,
    records: &Arc<CallDistMap>,
    graph: &SimpleCallGraph,
    pool: &WorkerPool,
) -> Result<NodeDistMap> {
    let shared: Arc<Mutex<NodeDistMap>> = Arc::new(Mutex::new(NodeDistMap::default()));

    let handles: Vec<_> = graph
        .entries_sorted()
        .into_iter()
        .map(|entry| {
            let icfg = Arc::clone(icfg);
            let targets = Arc::clone(targets);
            let records = Arc::clone(records);
            let shared = Arc::clone(&shared);
            pool.submit(move || function_blocks(&icfg, &targets, &records, &shared, entry))
        })
        .collect();

    let mut first_error = None;
    for handle in handles {
        if let Err(err) = handle.wait() {
            first_error.get_or_insert(err);
        }
    }
    if let Some(err) = first_error {
        return Err(err);
    }

    let map = Arc::try_unwrap(shared)
        .map_err(|_| AnalysisError::Invariant("block distance map still shared".into()))?
        .into_inner();
    info!(nodes = map.len(), "forward block distances computed");
    Ok(map)
}

/// Merge a vector into the shared map under its lock.
fn store(shared: &Mutex<NodeDistMap>, id: NodeId, dists: &DistVec) {
    let mut map = shared.lock();
    match map.entry(id) {
        std::collections::hash_map::Entry::Occupied(mut slot) => {
            slot.get_mut().merge_min(dists, 0);
        }
        std::collections::hash_map::Entry::Vacant(slot) => {
            slot.insert(dists.clone());
        }
    }
}

/// BFS over one function body, computing per-node forward distances.
fn function_blocks(
    icfg: &Icfg,
    targets: &Targets,
    records: &CallDistMap,
    shared: &Mutex<NodeDistMap>,
    entry: NodeId,
) -> Result<()> {
    let target_count = targets.count();
    let mut queue: VecDeque<NodeId> = VecDeque::new();
    let mut visited: FxHashSet<NodeId> = FxHashSet::default();
    queue.push_back(entry);

    while let Some(popped) = queue.pop_front() {
        if !visited.insert(popped) {
            continue;
        }

        // Collapse a straight-line run: walk forward while each node has a
        // single successor with a single predecessor, then back-fill the
        // run from the distance at its end.
        let mut run: Vec<NodeId> = Vec::new();
        let mut current = popped;
        if icfg.out_edges(current).len() == 1 {
            let mut cursor = current;
            loop {
                let kind = icfg.kind(cursor).ok_or_else(|| {
                    AnalysisError::Invariant(format!("unknown node {cursor} in block pass"))
                })?;
                if kind == NodeKind::FunExit || kind == NodeKind::FunCall {
                    break;
                }
                run.push(cursor);
                cursor = icfg.out_edges(cursor)[0];
                visited.insert(cursor);
                if icfg.out_edges(cursor).len() != 1 || icfg.in_edges(cursor).len() != 1 {
                    break;
                }
            }
            current = cursor;
        }

        let cached = shared.lock().get(&current).cloned();
        let mut dists = match cached {
            Some(dists) => dists,
            None => single_block_bfs(icfg, targets, records, current, target_count)?,
        };
        store(shared, current, &dists);

        for &run_node in run.iter().rev() {
            dists.shift(1);
            for index in 0..target_count {
                // A target on the run scores zero regardless of what lies
                // beyond it.
                if targets.is_target_node(index, run_node) {
                    dists.set(index, 0);
                }
            }
            store(shared, run_node, &dists);
        }

        match icfg.kind(current) {
            Some(NodeKind::FunExit) => {}
            Some(NodeKind::FunCall) => {
                let ret = icfg.ret_of_call(current).ok_or_else(|| {
                    AnalysisError::Invariant(format!("call node {current} lost its return node"))
                })?;
                queue.push_back(ret);
            }
            _ => {
                for &succ in icfg.out_edges(current) {
                    queue.push_back(succ);
                }
            }
        }
    }

    debug!(entry, "function block distances done");
    Ok(())
}

/// Forward BFS from a single node, composing call records exactly like the
/// per-function pass; target hits on return nodes do not count here.
fn single_block_bfs(
    icfg: &Icfg,
    targets: &Targets,
    records: &CallDistMap,
    start: NodeId,
    target_count: usize,
) -> Result<DistVec> {
    let mut result = DistVec::unreached(target_count);
    let mut queue: VecDeque<(NodeId, i32)> = VecDeque::new();
    let mut visited: FxHashSet<NodeId> = FxHashSet::default();
    queue.push_back((start, 1));

    while let Some((id, dist)) = queue.pop_front() {
        if !visited.insert(id) {
            continue;
        }
        let node = icfg
            .node(id)
            .ok_or_else(|| AnalysisError::Invariant(format!("unknown node {id} in block BFS")))?;

        if node.kind != NodeKind::FunRet {
            for index in 0..target_count {
                if targets.is_target_node(index, id) {
                    result.observe(index, dist);
                }
            }
        }

        match node.kind {
            NodeKind::FunExit => {}
            NodeKind::FunCall => {
                let ret = icfg.ret_of_call(id).ok_or_else(|| {
                    AnalysisError::Invariant(format!("call node {id} lost its return node"))
                })?;
                for &succ in icfg.out_edges(id) {
                    let step = match icfg.kind(succ) {
                        Some(NodeKind::FunRet) => dist.saturating_add(EXTERN_CALL_DIST),
                        Some(NodeKind::FunEntry) => {
                            let callee =
                                &icfg.node(succ).expect("edge endpoints validated").function;
                            match records.get(callee) {
                                Some(record) => {
                                    result.merge_min(&record.dists, dist);
                                    dist.saturating_add(intra_exit_step(record.intra_exit))
                                }
                                None => dist.saturating_add(RECURSIVE_CALL_DIST),
                            }
                        }
                        _ => dist,
                    };
                    queue.push_back((ret, step));
                }
            }
            _ => {
                for &succ in icfg.out_edges(id) {
                    queue.push_back((succ, dist.saturating_add(1)));
                }
            }
        }
    }

    Ok(result)
}

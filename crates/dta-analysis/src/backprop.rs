//! Back-propagation engine: final block distances.
//!
//! Distances known at the successors of a function's exit (i.e. at its
//! callers) are pushed backward through the function body. Two maps come
//! out: `df`, refined only when the exit has a single successor, and `bt`,
//! the backtrace map, tightened unconditionally and defined for nodes the
//! forward pass never reached.

use std::collections::{BTreeSet, VecDeque};

use rustc_hash::FxHashSet;
use tracing::{debug, info};

use dta_icfg::{Icfg, NodeId, NodeKind};

use crate::forward::intra_exit_step;
use crate::{
    AnalysisError, CallDistMap, DistVec, NodeDistMap, Result, SimpleCallGraph, Targets,
    EXTERN_CALL_DIST,
};

/// The two node-distance maps produced by back-propagation.
pub struct FinalDistances {
    /// Forward distances, back-filled through single-successor exits only.
    pub df: NodeDistMap,
    /// Backtrace distances, back-propagated without that restriction.
    pub bt: NodeDistMap,
}

/// Run back-propagation over every function.
///
/// Functions reachable from the global node go first (BFS over the
/// simplified call graph); leftovers drain from the dynamic set, functions
/// marked uncalled first. Each function is processed once.
pub fn back_propagate(
    icfg: &Icfg,
    targets: &Targets,
    graph: &SimpleCallGraph,
    records: &CallDistMap,
    mut df: NodeDistMap,
) -> Result<FinalDistances> {
    let mut bt = NodeDistMap::default();
    let mut dynamic: BTreeSet<NodeId> = graph.entries_sorted().into_iter().collect();
    let mut visited: FxHashSet<NodeId> = FxHashSet::default();
    let mut queue: VecDeque<NodeId> = VecDeque::new();

    let mut roots: Vec<NodeId> = icfg.out_edges(icfg.global()).to_vec();
    roots.sort_unstable();
    for root in roots {
        if icfg.kind(root) == Some(NodeKind::FunEntry) {
            queue.push_back(root);
        }
    }

    while !dynamic.is_empty() {
        if queue.is_empty() {
            // Nothing reachable left; pull an unprocessed function,
            // preferring ones with no call sites.
            let pick = dynamic
                .iter()
                .copied()
                .find(|&id| icfg.node(id).is_some_and(|n| n.is_uncalled))
                .or_else(|| dynamic.iter().next().copied())
                .expect("dynamic set checked non-empty");
            queue.push_back(pick);
        }

        while let Some(entry) = queue.pop_front() {
            if !visited.insert(entry) {
                continue;
            }
            function_backprop(icfg, targets, records, entry, &mut df, &mut bt)?;
            dynamic.remove(&entry);
            for callee in graph.callees_sorted(entry) {
                queue.push_back(callee);
            }
        }
    }

    info!(df = df.len(), bt = bt.len(), "back-propagation done");
    Ok(FinalDistances { df, bt })
}

/// Reverse-BFS from one function's exit over incoming edges.
fn function_backprop(
    icfg: &Icfg,
    targets: &Targets,
    records: &CallDistMap,
    entry: NodeId,
    df: &mut NodeDistMap,
    bt: &mut NodeDistMap,
) -> Result<()> {
    let function = &icfg
        .node(entry)
        .ok_or_else(|| AnalysisError::Invariant(format!("unknown entry node {entry}")))?
        .function;
    let Some(exit) = icfg.exit_of(function) else {
        return Ok(());
    };
    let exit_succs = icfg.out_edges(exit);
    if exit_succs.is_empty() {
        return Ok(());
    }
    // With several distinct call sites a single summary vector would lose
    // call-site identity, so `df` is only refined in the unambiguous case;
    // `bt` is the fallback for the ambiguous one.
    let single_successor = exit_succs.len() == 1;

    let target_count = targets.count();
    let mut succ_df = DistVec::unreached(target_count);
    let mut succ_bt = DistVec::unreached(target_count);
    for &succ in exit_succs {
        if let Some(dists) = df.get(&succ) {
            succ_df.merge_min(dists, 0);
            succ_bt.merge_min(dists, 0);
        }
        if let Some(dists) = bt.get(&succ) {
            succ_bt.merge_min(dists, 0);
        }
    }

    let mut queue: VecDeque<(NodeId, i32)> = VecDeque::new();
    let mut visited: FxHashSet<NodeId> = FxHashSet::default();
    queue.push_back((exit, 1));

    while let Some((id, dist)) = queue.pop_front() {
        if !visited.insert(id) {
            continue;
        }
        let kind = icfg.kind(id).ok_or_else(|| {
            AnalysisError::Invariant(format!("unknown node {id} in back-propagation"))
        })?;
        // The entry bounds the walk; it receives no update.
        if kind == NodeKind::FunEntry {
            continue;
        }

        if single_successor {
            let mut filled = succ_df.clone();
            filled.shift(dist);
            match df.entry(id) {
                std::collections::hash_map::Entry::Occupied(mut slot) => {
                    slot.get_mut().fill_unreached(&filled);
                }
                std::collections::hash_map::Entry::Vacant(slot) => {
                    slot.insert(filled);
                }
            }
        }
        let mut tightened = succ_bt.clone();
        tightened.shift(dist);
        match bt.entry(id) {
            std::collections::hash_map::Entry::Occupied(mut slot) => {
                slot.get_mut().merge_min(&tightened, 0);
            }
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(tightened);
            }
        }

        if kind == NodeKind::FunRet {
            // Collapse the call: continue from the paired call node instead
            // of crossing into the callee.
            let call = icfg.call_of_ret(id).ok_or_else(|| {
                AnalysisError::Invariant(format!("return node {id} lost its call node"))
            })?;
            for &src in icfg.in_edges(id) {
                let step = match icfg.kind(src) {
                    Some(NodeKind::FunCall) => EXTERN_CALL_DIST,
                    Some(NodeKind::FunExit) => {
                        let callee = &icfg.node(src).expect("edge endpoints validated").function;
                        match records.get(callee) {
                            Some(record) => intra_exit_step(record.intra_exit),
                            None => 1,
                        }
                    }
                    _ => 1,
                };
                queue.push_back((call, dist.saturating_add(step)));
            }
        } else {
            for &src in icfg.in_edges(id) {
                queue.push_back((src, dist.saturating_add(1)));
            }
        }
    }

    debug!(function = %function, "back-propagated");
    Ok(())
}

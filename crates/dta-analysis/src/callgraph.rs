//! Simplified call graph derived from the ICFG.
//!
//! Keys are function-entry nodes; external and intrinsic callees are
//! absent from the map, which is how later passes detect them.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use dta_icfg::{Icfg, NodeId, NodeKind};

use crate::{AnalysisError, Result};

/// Function entry -> set of callee entries.
pub struct SimpleCallGraph {
    callees: FxHashMap<NodeId, FxHashSet<NodeId>>,
}

impl SimpleCallGraph {
    /// Build the map from the graph's call edges.
    ///
    /// Every non-external, non-intrinsic entry gets a key. For each call
    /// edge into such an entry, the calling function's entry gains it as a
    /// callee.
    pub fn build(icfg: &Icfg) -> Result<Self> {
        let mut callees: FxHashMap<NodeId, FxHashSet<NodeId>> = FxHashMap::default();

        for id in icfg.node_ids() {
            let node = icfg.node(id).expect("iterating known ids");
            if node.kind != NodeKind::FunEntry || node.is_intrinsic || node.is_extern {
                continue;
            }
            callees.entry(id).or_default();
            for &pred in icfg.in_edges(id) {
                let pred_node = icfg.node(pred).expect("edge endpoints validated");
                if pred_node.kind != NodeKind::FunCall {
                    continue;
                }
                let caller = icfg.entry_of(&pred_node.function).ok_or_else(|| {
                    AnalysisError::Invariant(format!(
                        "call node {pred} belongs to function '{}' which has no entry node",
                        pred_node.function
                    ))
                })?;
                callees.entry(caller).or_default().insert(id);
            }
        }

        debug!(functions = callees.len(), "simple call graph built");
        Ok(Self { callees })
    }

    /// Whether `entry` is a key, i.e. an analyzable (non-external) function.
    pub fn contains(&self, entry: NodeId) -> bool {
        self.callees.contains_key(&entry)
    }

    pub fn len(&self) -> usize {
        self.callees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callees.is_empty()
    }

    /// All keys, ascending.
    pub fn entries_sorted(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.callees.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Callees of `entry`, ascending; empty for unknown keys.
    pub fn callees_sorted(&self, entry: NodeId) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .callees
            .get(&entry)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use dta_icfg::{node, IcfgBuilder, NodeKind};

    use super::*;

    #[test]
    fn test_build_excludes_extern_and_intrinsic() {
        let mut b = IcfgBuilder::new();
        b.add_node(node(0, NodeKind::Global, "")).unwrap();
        b.add_node(node(1, NodeKind::FunEntry, "main")).unwrap();
        let mut call = node(2, NodeKind::FunCall, "main");
        call.corres = Some(3);
        b.add_node(call).unwrap();
        b.add_node(node(3, NodeKind::FunRet, "main")).unwrap();
        b.add_node(node(4, NodeKind::FunEntry, "helper")).unwrap();
        let mut ext = node(5, NodeKind::FunEntry, "read");
        ext.is_extern = true;
        b.add_node(ext).unwrap();
        let mut intr = node(6, NodeKind::FunEntry, "llvm.dbg");
        intr.is_intrinsic = true;
        b.add_node(intr).unwrap();
        b.add_edge(0, 1);
        b.add_edge(1, 2);
        b.add_edge(2, 4);
        b.add_edge(2, 5);
        b.add_edge(2, 3);
        let icfg = b.finish().unwrap();

        let cg = SimpleCallGraph::build(&icfg).unwrap();
        assert!(cg.contains(1));
        assert!(cg.contains(4));
        assert!(!cg.contains(5));
        assert!(!cg.contains(6));
        assert_eq!(cg.callees_sorted(1), vec![4]);
        assert_eq!(cg.callees_sorted(4), Vec::<NodeId>::new());
        assert_eq!(cg.entries_sorted(), vec![1, 4]);
    }
}

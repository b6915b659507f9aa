//! Graph model: typed nodes, adjacency, call/return pairing.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{IcfgError, NodeId, Result};

/// Node kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// The unique root node; out-edges lead to entries of starting functions.
    Global,
    FunEntry,
    FunExit,
    FunCall,
    FunRet,
    Intra,
}

/// A single ICFG node.
#[derive(Clone, Debug)]
pub struct IcfgNode {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Owning function name; empty only for the global node.
    pub function: String,
    /// Raw upstream source-location string, parsed lazily.
    pub loc: Option<String>,
    /// Paired node: the exit for an entry, the return for a call.
    pub corres: Option<NodeId>,
    /// Function resolves to an external definition (entries only).
    pub is_extern: bool,
    /// Function is a compiler intrinsic (entries only).
    pub is_intrinsic: bool,
    /// Function has no call sites in the module set (entries only).
    pub is_uncalled: bool,
}

/// Read-only interprocedural control-flow graph.
///
/// Built once by [`IcfgBuilder`] (or the dot loader), then only queried.
#[derive(Debug)]
pub struct Icfg {
    nodes: FxHashMap<NodeId, IcfgNode>,
    /// Node ids in ascending order, for deterministic iteration.
    order: Vec<NodeId>,
    succs: FxHashMap<NodeId, Vec<NodeId>>,
    preds: FxHashMap<NodeId, Vec<NodeId>>,
    global: NodeId,
    entries: FxHashMap<String, NodeId>,
    exits: FxHashMap<String, NodeId>,
    /// Return node -> its call node (reverse of `corres` on calls).
    ret_to_call: FxHashMap<NodeId, NodeId>,
}

impl Icfg {
    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node ids in ascending order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.order.iter().copied()
    }

    pub fn node(&self, id: NodeId) -> Option<&IcfgNode> {
        self.nodes.get(&id)
    }

    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.nodes.get(&id).map(|n| n.kind)
    }

    /// The unique global node.
    pub fn global(&self) -> NodeId {
        self.global
    }

    pub fn out_edges(&self, id: NodeId) -> &[NodeId] {
        self.succs.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn in_edges(&self, id: NodeId) -> &[NodeId] {
        self.preds.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Entry node of a function, if the graph has one.
    pub fn entry_of(&self, function: &str) -> Option<NodeId> {
        self.entries.get(function).copied()
    }

    /// Exit node of a function, if the graph has one.
    pub fn exit_of(&self, function: &str) -> Option<NodeId> {
        self.exits.get(function).copied()
    }

    /// The return node paired with a call node.
    pub fn ret_of_call(&self, call: NodeId) -> Option<NodeId> {
        self.nodes.get(&call).and_then(|n| match n.kind {
            NodeKind::FunCall => n.corres,
            _ => None,
        })
    }

    /// The call node paired with a return node.
    pub fn call_of_ret(&self, ret: NodeId) -> Option<NodeId> {
        self.ret_to_call.get(&ret).copied()
    }
}

/// Incremental graph builder; validates pairing and uniqueness on `finish`.
#[derive(Default)]
pub struct IcfgBuilder {
    nodes: FxHashMap<NodeId, IcfgNode>,
    edges: Vec<(NodeId, NodeId)>,
    edge_seen: FxHashSet<(NodeId, NodeId)>,
}

impl IcfgBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node; duplicate ids are rejected.
    pub fn add_node(&mut self, node: IcfgNode) -> Result<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(IcfgError::DuplicateNode(node.id));
        }
        self.nodes.insert(node.id, node);
        Ok(())
    }

    /// Add a directed edge; duplicates are dropped silently.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) {
        if self.edge_seen.insert((from, to)) {
            self.edges.push((from, to));
        }
    }

    /// Validate the graph and freeze it.
    pub fn finish(self) -> Result<Icfg> {
        let mut order: Vec<NodeId> = self.nodes.keys().copied().collect();
        order.sort_unstable();

        let mut global = None;
        let mut global_count = 0usize;
        let mut entries: FxHashMap<String, NodeId> = FxHashMap::default();
        let mut exits: FxHashMap<String, NodeId> = FxHashMap::default();
        let mut ret_to_call: FxHashMap<NodeId, NodeId> = FxHashMap::default();

        for &id in &order {
            let node = &self.nodes[&id];
            match node.kind {
                NodeKind::Global => {
                    global_count += 1;
                    global = Some(id);
                }
                kind => {
                    if node.function.is_empty() {
                        return Err(IcfgError::MissingFunction(id));
                    }
                    match kind {
                        NodeKind::FunEntry => {
                            if entries.insert(node.function.clone(), id).is_some() {
                                return Err(IcfgError::DuplicateFunctionNode {
                                    function: node.function.clone(),
                                    kind,
                                });
                            }
                        }
                        NodeKind::FunExit => {
                            if exits.insert(node.function.clone(), id).is_some() {
                                return Err(IcfgError::DuplicateFunctionNode {
                                    function: node.function.clone(),
                                    kind,
                                });
                            }
                        }
                        NodeKind::FunCall => {
                            let paired =
                                node.corres.ok_or(IcfgError::MissingPairedRet(id))?;
                            match self.nodes.get(&paired).map(|n| n.kind) {
                                Some(NodeKind::FunRet) => {
                                    ret_to_call.insert(paired, id);
                                }
                                _ => {
                                    return Err(IcfgError::BadPairedRet { call: id, paired });
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
        if global_count != 1 {
            return Err(IcfgError::GlobalCount(global_count));
        }

        let mut succs: FxHashMap<NodeId, Vec<NodeId>> = FxHashMap::default();
        let mut preds: FxHashMap<NodeId, Vec<NodeId>> = FxHashMap::default();
        for (from, to) in self.edges {
            if !self.nodes.contains_key(&from) {
                return Err(IcfgError::UnknownEdgeNode(from));
            }
            if !self.nodes.contains_key(&to) {
                return Err(IcfgError::UnknownEdgeNode(to));
            }
            succs.entry(from).or_default().push(to);
            preds.entry(to).or_default().push(from);
        }

        Ok(Icfg {
            nodes: self.nodes,
            order,
            succs,
            preds,
            global: global.expect("global node checked above"),
            entries,
            exits,
            ret_to_call,
        })
    }
}

/// Convenience constructor used by the loader and by tests.
pub fn node(id: NodeId, kind: NodeKind, function: &str) -> IcfgNode {
    IcfgNode {
        id,
        kind,
        function: function.to_string(),
        loc: None,
        corres: None,
        is_extern: false,
        is_intrinsic: false,
        is_uncalled: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_loc(mut n: IcfgNode, loc: &str) -> IcfgNode {
        n.loc = Some(loc.to_string());
        n
    }

    #[test]
    fn test_build_and_query() {
        let mut b = IcfgBuilder::new();
        b.add_node(node(0, NodeKind::Global, "")).unwrap();
        b.add_node(node(1, NodeKind::FunEntry, "main")).unwrap();
        b.add_node(with_loc(
            node(2, NodeKind::Intra, "main"),
            r#"{ "ln": 4, "fl": "src/main.c" }"#,
        ))
        .unwrap();
        b.add_node(node(3, NodeKind::FunExit, "main")).unwrap();
        b.add_edge(0, 1);
        b.add_edge(1, 2);
        b.add_edge(2, 3);
        let g = b.finish().unwrap();

        assert_eq!(g.len(), 4);
        assert_eq!(g.global(), 0);
        assert_eq!(g.entry_of("main"), Some(1));
        assert_eq!(g.exit_of("main"), Some(3));
        assert_eq!(g.out_edges(1), &[2]);
        assert_eq!(g.in_edges(3), &[2]);
        assert_eq!(g.node_ids().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_call_ret_pairing() {
        let mut b = IcfgBuilder::new();
        b.add_node(node(0, NodeKind::Global, "")).unwrap();
        b.add_node(node(1, NodeKind::FunEntry, "f")).unwrap();
        let mut call = node(2, NodeKind::FunCall, "f");
        call.corres = Some(3);
        b.add_node(call).unwrap();
        b.add_node(node(3, NodeKind::FunRet, "f")).unwrap();
        b.add_node(node(4, NodeKind::FunExit, "f")).unwrap();
        b.add_edge(0, 1);
        b.add_edge(1, 2);
        b.add_edge(2, 3);
        b.add_edge(3, 4);
        let g = b.finish().unwrap();

        assert_eq!(g.ret_of_call(2), Some(3));
        assert_eq!(g.call_of_ret(3), Some(2));
        assert_eq!(g.ret_of_call(3), None);
    }

    #[test]
    fn test_call_without_ret_rejected() {
        let mut b = IcfgBuilder::new();
        b.add_node(node(0, NodeKind::Global, "")).unwrap();
        b.add_node(node(1, NodeKind::FunCall, "f")).unwrap();
        assert!(matches!(
            b.finish(),
            Err(IcfgError::MissingPairedRet(1))
        ));
    }

    #[test]
    fn test_two_globals_rejected() {
        let mut b = IcfgBuilder::new();
        b.add_node(node(0, NodeKind::Global, "")).unwrap();
        b.add_node(node(1, NodeKind::Global, "")).unwrap();
        assert!(matches!(b.finish(), Err(IcfgError::GlobalCount(2))));
    }

    #[test]
    fn test_duplicate_edge_dropped() {
        let mut b = IcfgBuilder::new();
        b.add_node(node(0, NodeKind::Global, "")).unwrap();
        b.add_node(node(1, NodeKind::FunEntry, "f")).unwrap();
        b.add_edge(0, 1);
        b.add_edge(0, 1);
        let g = b.finish().unwrap();
        assert_eq!(g.out_edges(0), &[1]);
    }
}

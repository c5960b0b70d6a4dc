//! The concrete control-flow-graph model (§3 in the design notes) and the
//! graph primitives built directly on it (DFS pre/post order, predecessor
//! inversion, graph reversal).
//!
//! Grounded on `examples/original_source/src/lib/graph_utils.py`.

use core::fmt;

use error_stack::Report;

use crate::{
    common::IndexMap,
    error::{GraphError, OffendingNode, Result},
};

/// An opaque node identifier. Equality and hashing are the only operations
/// this crate relies on; ordering exists only so callers can put ids in a
/// `BTreeSet` if they want to, not because any algorithm here depends on it.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Construct a node id from a raw integer.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw integer behind this id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A directed control-flow graph: an ordered mapping from node id to ordered
/// successor list, with a distinguished entry node that is always the first
/// key.
#[derive(Debug, Clone)]
pub struct Cfg {
    entry: NodeId,
    succs: IndexMap<NodeId, Vec<NodeId>>,
}

impl Cfg {
    /// Build a CFG from an ordered sequence of `(node, successors)` pairs.
    /// The first pair's node becomes the entry. Fails if the result is
    /// empty, references an unknown node, or has a node with a duplicate
    /// entry in its own successor list.
    pub fn from_ordered<I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (NodeId, Vec<NodeId>)>,
    {
        let mut succs = IndexMap::default();
        let mut entry = None;
        for (node, children) in pairs {
            if entry.is_none() {
                entry = Some(node);
            }
            succs.insert(node, children);
        }

        let entry = entry.ok_or_else(|| Report::new(GraphError::NoEntry))?;
        let cfg = Self { entry, succs };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build a CFG from an explicit entry plus an edge list, without relying
    /// on iteration order to name the entry. The entry is always placed
    /// first regardless of where it appears in `edges`.
    pub fn try_from_edges<I, J>(entry: NodeId, edges: I) -> Result<Self>
    where
        I: IntoIterator<Item = (NodeId, J)>,
        J: IntoIterator<Item = NodeId>,
    {
        let mut succs = IndexMap::default();
        succs.insert(entry, Vec::new());
        for (node, children) in edges {
            succs.insert(node, children.into_iter().collect());
        }

        let cfg = Self { entry, succs };
        cfg.validate()?;
        Ok(cfg)
    }

    pub(crate) fn from_parts_unchecked(entry: NodeId, succs: IndexMap<NodeId, Vec<NodeId>>) -> Self {
        Self { entry, succs }
    }

    /// Check the invariants from the data-model section: non-empty, entry
    /// first, every successor reference resolves to a known node, and no
    /// node's successor list contains the same node twice.
    pub fn validate(&self) -> Result<()> {
        if self.succs.is_empty() {
            return Err(Report::new(GraphError::NoEntry));
        }
        let first_key = self.succs.get_index(0).map(|(node, _)| *node);
        if first_key != Some(self.entry) {
            return Err(Report::new(GraphError::MalformedGraph)
                .attach_printable("entry node must be the first key"));
        }

        for (&node, list) in &self.succs {
            let mut seen = crate::common::IndexSet::default();
            for &succ in list {
                if !seen.insert(succ) {
                    return Err(Report::new(GraphError::MalformedGraph)
                        .attach_printable("duplicate successor entry")
                        .attach_printable(OffendingNode(node)));
                }
                if !self.succs.contains_key(&succ) {
                    return Err(Report::new(GraphError::MalformedGraph)
                        .attach_printable("successor references an unknown node")
                        .attach_printable(OffendingNode(succ)));
                }
            }
        }

        Ok(())
    }

    /// The distinguished entry node. Always the first key.
    #[must_use]
    pub fn entry(&self) -> NodeId {
        self.entry
    }

    /// Number of nodes in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.succs.len()
    }

    /// Whether the graph has no nodes (never true for a validated `Cfg`).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.succs.is_empty()
    }

    /// Whether `node` is present in this graph.
    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        self.succs.contains_key(&node)
    }

    /// Iterate over node ids in insertion order (entry first).
    pub fn nodes(&self) -> impl ExactSizeIterator<Item = NodeId> + '_ {
        self.succs.keys().copied()
    }

    /// The successor list of `node`, in recorded order. Empty for an
    /// unknown node.
    #[must_use]
    pub fn successors(&self, node: NodeId) -> &[NodeId] {
        self.succs.get(&node).map_or(&[], Vec::as_slice)
    }

    pub(crate) fn succs_map(&self) -> &IndexMap<NodeId, Vec<NodeId>> {
        &self.succs
    }
}

/// A [`Cfg`] plus a positive integer weight per node.
#[derive(Debug, Clone)]
pub struct WeightedCfg {
    cfg: Cfg,
    weights: IndexMap<NodeId, u64>,
}

impl WeightedCfg {
    /// Pair a CFG with an explicit weight map. Every node must have a
    /// strictly positive weight, and the weight map's key set must exactly
    /// match the CFG's node set.
    pub fn new(cfg: Cfg, weights: IndexMap<NodeId, u64>) -> Result<Self> {
        for node in cfg.nodes() {
            match weights.get(&node) {
                Some(0) | None => {
                    return Err(Report::new(GraphError::MalformedGraph)
                        .attach_printable("missing or non-positive weight")
                        .attach_printable(OffendingNode(node)));
                }
                Some(_) => {}
            }
        }
        for &node in weights.keys() {
            if !cfg.contains(node) {
                return Err(Report::new(GraphError::MalformedGraph)
                    .attach_printable("weight given for an unknown node")
                    .attach_printable(OffendingNode(node)));
            }
        }
        Ok(Self { cfg, weights })
    }

    /// Assign every node a weight of 1.
    #[must_use]
    pub fn unit(cfg: Cfg) -> Self {
        let weights = cfg.nodes().map(|node| (node, 1)).collect();
        Self { cfg, weights }
    }

    #[must_use]
    pub fn cfg(&self) -> &Cfg {
        &self.cfg
    }

    #[must_use]
    pub fn weight(&self, node: NodeId) -> u64 {
        self.weights.get(&node).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn weights(&self) -> &IndexMap<NodeId, u64> {
        &self.weights
    }
}

/// Depth-first pre-order traversal from the entry, iterative with an
/// explicit stack. Ties are broken by successor-list order: children are
/// pushed in reverse so the first successor is visited first.
#[must_use]
pub fn preorder(cfg: &Cfg) -> Vec<NodeId> {
    let mut visited = crate::common::IndexSet::default();
    let mut order = Vec::with_capacity(cfg.len());
    let mut stack = vec![cfg.entry()];

    while let Some(node) = stack.pop() {
        if visited.insert(node) {
            order.push(node);
            for &child in cfg.successors(node).iter().rev() {
                if !visited.contains(&child) {
                    stack.push(child);
                }
            }
        }
    }

    order
}

/// Depth-first post-order traversal from the entry, iterative with an
/// explicit stack and a per-node "next child to process" cursor.
#[must_use]
pub fn postorder(cfg: &Cfg) -> Vec<NodeId> {
    let mut processing: IndexMap<NodeId, usize> =
        cfg.nodes().map(|node| (node, 0usize)).collect();
    let mut on_stack = crate::common::IndexSet::default();
    let mut visited = crate::common::IndexSet::default();
    let mut order = Vec::with_capacity(cfg.len());

    let mut stack = vec![cfg.entry()];
    on_stack.insert(cfg.entry());

    while let Some(&curr) = stack.last() {
        let children = cfg.successors(curr);
        let idx = processing[&curr];
        if idx < children.len() {
            let child = children[idx];
            processing.insert(curr, idx + 1);
            if on_stack.insert(child) {
                stack.push(child);
            }
        } else {
            if visited.insert(curr) {
                order.push(curr);
            }
            stack.pop();
            on_stack.swap_remove(&curr);
        }
    }

    order
}

/// Invert every edge to build the predecessor map. The entry's predecessor
/// list is always empty, even if a back edge targets it, and the entry
/// remains the first key.
#[must_use]
pub fn predecessors(cfg: &Cfg) -> IndexMap<NodeId, Vec<NodeId>> {
    let mut preds: IndexMap<NodeId, Vec<NodeId>> =
        cfg.nodes().map(|node| (node, Vec::new())).collect();

    for node in cfg.nodes() {
        for &succ in cfg.successors(node) {
            if succ != cfg.entry() {
                if let Some(list) = preds.get_mut(&succ) {
                    list.push(node);
                }
            }
        }
    }

    preds
}

/// Reverse every edge in the graph. The unique sink (a node with no
/// successors) becomes the new entry. Fails with
/// [`GraphError::AmbiguousReversal`] if more than one sink exists. If no
/// sink exists, the original entry is kept as the new entry (there is no
/// better candidate).
pub fn reverse(cfg: &Cfg) -> Result<Cfg> {
    let mut raw: IndexMap<NodeId, Vec<NodeId>> =
        cfg.nodes().map(|node| (node, Vec::new())).collect();
    let mut sink = None;

    for node in cfg.nodes() {
        let succs = cfg.successors(node);
        if succs.is_empty() {
            if sink.is_some() {
                return Err(Report::new(GraphError::AmbiguousReversal)
                    .attach_printable(OffendingNode(node)));
            }
            sink = Some(node);
        } else {
            for &s in succs {
                if let Some(list) = raw.get_mut(&s) {
                    list.push(node);
                }
            }
        }
    }

    let root = sink.unwrap_or_else(|| cfg.entry());

    let mut ordered = IndexMap::default();
    ordered.insert(
        root,
        raw.get_mut(&root).map(core::mem::take).unwrap_or_default(),
    );
    for node in cfg.nodes() {
        if node != root {
            ordered.insert(node, raw.get_mut(&node).map(core::mem::take).unwrap_or_default());
        }
    }

    Ok(Cfg::from_parts_unchecked(root, ordered))
}

/// Check that every node in `cfg` is reachable from the entry.
///
/// [`Cfg::validate`] deliberately does not require this -- plain graph
/// primitives and Tarjan SCC are well-defined on a disconnected graph -- but
/// it is the data-model invariant ("every node is reachable") the
/// preorder-indexed Lengauer-Tarjan graph relies on: [`crate::dominators`],
/// [`crate::cns`], and [`crate::ons`] all build on it, and silently
/// operating on only the reachable slice there would either drop nodes from
/// the result or make a driver loop mistake "no splittable node among the
/// reachable ones" for the internal-bug case it actually is. Callers that
/// need full-graph coverage call this before doing any other work.
pub(crate) fn require_fully_reachable(cfg: &Cfg) -> Result<()> {
    let reachable: crate::common::IndexSet<NodeId> = preorder(cfg).into_iter().collect();
    for node in cfg.nodes() {
        if !reachable.contains(&node) {
            return Err(Report::new(GraphError::MalformedGraph)
                .attach_printable("node is unreachable from the entry")
                .attach_printable(OffendingNode(node)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(id: u64) -> NodeId {
        NodeId::new(id)
    }

    fn cfg(pairs: &[(u64, &[u64])]) -> Cfg {
        Cfg::from_ordered(
            pairs
                .iter()
                .map(|(node, succs)| (n(*node), succs.iter().copied().map(n).collect())),
        )
        .expect("valid test graph")
    }

    #[test]
    fn entry_is_first_and_preserved() {
        let g = cfg(&[(0, &[1, 2]), (1, &[]), (2, &[])]);
        assert_eq!(g.entry(), n(0));
        assert_eq!(g.nodes().collect::<Vec<_>>(), vec![n(0), n(1), n(2)]);
    }

    #[test]
    fn rejects_unknown_successor() {
        let err = Cfg::from_ordered([(n(0), vec![n(1)])]);
        assert!(err.is_err());
    }

    #[test]
    fn rejects_duplicate_successor() {
        let err = Cfg::from_ordered([(n(0), vec![n(0), n(0)])]);
        assert!(err.is_err());
    }

    #[test]
    fn preorder_linear_chain() {
        let g = cfg(&[(0, &[1]), (1, &[2]), (2, &[])]);
        assert_eq!(preorder(&g), vec![n(0), n(1), n(2)]);
    }

    #[test]
    fn preorder_prefers_first_successor() {
        let g = cfg(&[(0, &[1, 2]), (1, &[]), (2, &[])]);
        assert_eq!(preorder(&g), vec![n(0), n(1), n(2)]);
    }

    #[test]
    fn postorder_linear_chain() {
        let g = cfg(&[(0, &[1]), (1, &[2]), (2, &[])]);
        assert_eq!(postorder(&g), vec![n(2), n(1), n(0)]);
    }

    #[test]
    fn postorder_diamond() {
        let g = cfg(&[(0, &[1, 2]), (1, &[3]), (2, &[3]), (3, &[])]);
        // 0 -> 1 -> 3 (processed), back to 0 -> 2 -> 3 already on stack skipped
        assert_eq!(postorder(&g), vec![n(3), n(1), n(2), n(0)]);
    }

    #[test]
    fn predecessors_entry_always_empty() {
        let g = cfg(&[(0, &[1]), (1, &[0])]);
        let preds = predecessors(&g);
        assert!(preds[&n(0)].is_empty());
        assert_eq!(preds[&n(1)], vec![n(0)]);
    }

    #[test]
    fn reverse_picks_unique_sink_as_new_entry() {
        let g = cfg(&[(0, &[1]), (1, &[2]), (2, &[])]);
        let r = reverse(&g).expect("single sink");
        assert_eq!(r.entry(), n(2));
        assert_eq!(r.successors(n(2)), &[n(1)]);
        assert_eq!(r.successors(n(1)), &[n(0)]);
        assert!(r.successors(n(0)).is_empty());
    }

    #[test]
    fn reverse_rejects_two_sinks() {
        let g = cfg(&[(0, &[1, 2]), (1, &[]), (2, &[])]);
        assert!(reverse(&g).is_err());
    }

    #[test]
    fn require_fully_reachable_accepts_a_connected_graph() {
        let g = cfg(&[(0, &[1]), (1, &[2]), (2, &[])]);
        assert!(require_fully_reachable(&g).is_ok());
    }

    #[test]
    fn require_fully_reachable_rejects_an_unreachable_node() {
        let g = Cfg::try_from_edges(n(0), [(n(0), vec![]), (n(1), vec![n(1)])])
            .expect("structurally valid even though node 1 is unreachable");
        assert!(require_fully_reachable(&g).is_err());
    }
}

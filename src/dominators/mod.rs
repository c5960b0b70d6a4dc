//! Dominator tree construction via the Lengauer-Tarjan algorithm.
//!
//! Grounded on `examples/original_source/src/lib/lengauer_tarjan.py`
//! (`init_lt`, `lt_eval`, `gen_lt_graph`) and
//! `examples/original_source/src/lib/dominator.py` (`get_dominator_tree`).
//! The semi-dominator forest here is a disjoint-set-union over preorder
//! indices with path compression (`eval`), built iteratively by collecting
//! the ancestor path into a `Vec` and compressing it top-down, exactly as
//! the original does -- not the classical recursive formulation used
//! elsewhere (`examples/petgraph-petgraph/src/algo/dominators.rs`'s
//! `compress`).

pub mod frontier;

use crate::{
    common::IndexMap,
    error::{GraphError, Result},
    graph::{Cfg, NodeId},
};

/// A node in the Lengauer-Tarjan working graph, indexed by DFS preorder
/// number rather than by [`NodeId`] directly.
#[derive(Debug, Clone)]
pub(crate) struct LtNode {
    pub(crate) preds: Vec<usize>,
    pub(crate) parent: Option<usize>,
    pub(crate) semi: usize,
    pub(crate) best: usize,
    pub(crate) bucket: Vec<usize>,
    pub(crate) idom: Option<usize>,
    pub(crate) anc: Option<usize>,
}

/// Iterative find/compress over the semi-dominator forest. Returns the
/// preorder index of the node with the smallest semi-dominator number on
/// `start`'s path to its DSU root, compressing the path it walks.
fn eval(start: usize, nodes: &mut [LtNode]) -> usize {
    if nodes[start].anc.is_none() {
        return start;
    }

    let mut path = vec![start];
    let mut curr = start;
    while let Some(a) = nodes[curr].anc {
        path.push(a);
        curr = a;
    }

    if path.len() >= 3 {
        for i in (0..=path.len() - 3).rev() {
            let curr_idx = path[i];
            let parent_idx = path[i + 1];
            if nodes[nodes[parent_idx].best].semi < nodes[nodes[curr_idx].best].semi {
                nodes[curr_idx].best = nodes[parent_idx].best;
            }
            nodes[curr_idx].anc = nodes[parent_idx].anc;
        }
    }

    nodes[start].best
}

/// Build the preorder-indexed working graph: a DFS from the entry that
/// records, for every node, its DFS-tree parent and its full predecessor
/// set (not just tree edges).
fn init_lt(cfg: &Cfg) -> (Vec<LtNode>, IndexMap<NodeId, usize>, Vec<NodeId>) {
    let start = cfg.entry();

    let mut raw_preds: IndexMap<NodeId, crate::common::IndexSet<NodeId>> =
        cfg.nodes().map(|node| (node, crate::common::IndexSet::default())).collect();
    let mut dfs_parent: IndexMap<NodeId, Option<NodeId>> = IndexMap::default();
    dfs_parent.insert(start, None);

    let mut visited_set = crate::common::IndexSet::default();
    let mut visited = Vec::with_capacity(cfg.len());
    let mut stack = vec![start];

    while let Some(node) = stack.pop() {
        if visited_set.insert(node) {
            visited.push(node);
            for &child in cfg.successors(node).iter().rev() {
                raw_preds.get_mut(&child).expect("known node").insert(node);
                if !visited_set.contains(&child) {
                    dfs_parent.insert(child, Some(node));
                    stack.push(child);
                }
            }
        }
    }

    let pre: IndexMap<NodeId, usize> =
        visited.iter().copied().enumerate().map(|(i, node)| (node, i)).collect();

    let nodes = visited
        .iter()
        .map(|&orig| {
            let preds: Vec<usize> = raw_preds[&orig]
                .iter()
                .filter_map(|u| pre.get(u).copied())
                .collect();
            let parent = dfs_parent
                .get(&orig)
                .copied()
                .flatten()
                .and_then(|p| pre.get(&p).copied());
            let idx = pre[&orig];
            LtNode {
                preds,
                parent,
                semi: idx,
                best: idx,
                bucket: Vec::new(),
                idom: None,
                anc: None,
            }
        })
        .collect::<Vec<_>>();

    (nodes, pre, visited)
}

/// Run the two-pass Lengauer-Tarjan algorithm and return the working graph
/// alongside the node <-> preorder-index mappings.
pub(crate) fn gen_lt_graph(cfg: &Cfg) -> (Vec<LtNode>, IndexMap<NodeId, usize>, Vec<NodeId>) {
    let (mut nodes, pre, rev) = init_lt(cfg);
    let n = nodes.len();

    for i in (1..n).rev() {
        let parent_idx = nodes[i].parent.expect("non-root node has a DFS parent");
        let preds_i = nodes[i].preds.clone();
        for j in preds_i {
            let best = eval(j, &mut nodes);
            if nodes[best].semi < nodes[i].semi {
                nodes[i].semi = nodes[best].semi;
            }
        }
        let semi_i = nodes[i].semi;
        nodes[semi_i].bucket.push(i);
        nodes[i].anc = Some(parent_idx);

        while let Some(b_idx) = nodes[parent_idx].bucket.pop() {
            let best_b = eval(b_idx, &mut nodes);
            nodes[b_idx].idom = Some(if nodes[best_b].semi < nodes[b_idx].semi {
                best_b
            } else {
                parent_idx
            });
        }
    }

    for i in 1..n {
        if nodes[i].idom != Some(nodes[i].semi) {
            let idom_i = nodes[i].idom.expect("idom assigned in the first pass");
            nodes[i].idom = nodes[idom_i].idom;
        }
    }
    nodes[0].idom = None;

    (nodes, pre, rev)
}

/// The dominator relation computed for a [`Cfg`]: every node's immediate
/// dominator, with the entry as root.
#[derive(Debug, Clone)]
pub struct Dominators {
    root: NodeId,
    idom: IndexMap<NodeId, NodeId>,
}

impl Dominators {
    /// The entry node, which dominates every reachable node.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// `node`'s immediate dominator, or `None` for the root.
    #[must_use]
    pub fn immediate_dominator(&self, node: NodeId) -> Option<NodeId> {
        self.idom.get(&node).copied()
    }

    /// All strict dominators of `node`, nearest first, root last.
    pub fn strict_dominators(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        core::iter::successors(self.immediate_dominator(node), move |&n| {
            self.immediate_dominator(n)
        })
    }

    /// `node` itself followed by all of its strict dominators.
    pub fn dominators(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        core::iter::once(node).chain(self.strict_dominators(node))
    }

    /// Every node immediately dominated by `node`.
    pub fn immediately_dominated_by(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.idom
            .iter()
            .filter(move |(_, &idom)| idom == node)
            .map(|(&n, _)| n)
    }
}

/// Compute the dominator relation for `cfg`.
pub fn compute_dominators(cfg: &Cfg) -> Result<Dominators> {
    cfg.validate()?;
    crate::graph::require_fully_reachable(cfg)?;
    let (nodes, _pre, rev) = gen_lt_graph(cfg);
    let mut idom = IndexMap::default();
    for (i, node) in nodes.iter().enumerate().skip(1) {
        let idom_idx = node.idom.ok_or_else(|| {
            error_stack::Report::new(GraphError::InvariantBroken)
                .attach_printable("reachable node missing an immediate dominator")
        })?;
        idom.insert(rev[i], rev[idom_idx]);
    }
    Ok(Dominators { root: cfg.entry(), idom })
}

/// Build the dominator tree of `cfg` as a map from node to its immediately
/// dominated children, in preorder.
pub fn dominator_tree(cfg: &Cfg) -> Result<IndexMap<NodeId, Vec<NodeId>>> {
    cfg.validate()?;
    crate::graph::require_fully_reachable(cfg)?;
    let (nodes, _pre, rev) = gen_lt_graph(cfg);
    let mut tree: IndexMap<NodeId, Vec<NodeId>> =
        rev.iter().map(|&node| (node, Vec::new())).collect();

    for (i, node) in nodes.iter().enumerate() {
        if let Some(idom_idx) = node.idom {
            tree.entry(rev[idom_idx]).or_default().push(rev[i]);
        }
    }

    Ok(tree)
}

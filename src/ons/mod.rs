//! Optimised Node Splitting (Unger), the structural alternative to
//! [`crate::cns`] that targets MSED-maximal loops within dominator-tree
//! regions directly instead of scoring individual nodes.
//!
//! Grounded on `examples/original_source/src/lib/ons_reduction.py` (graph
//! construction: `_build_ons_graph_from_lt`, `populate_pointers`,
//! `mark_back_edges`) and `examples/original_source/src/lib/notes.py`, which
//! carries the full pseudocode the partial `ons_reduction.py` never wires up
//! (`split_loops`, `handle_ir_children`, `handle_scc`, `SplitSCC`,
//! `SCC1`/`SCC2`, `GetWeight`, `ChooseNode`, `search_sp_back`, `set_level`,
//! `mark_undone`). `notes.py` is treated as
//! authoritative for anything `ons_reduction.py` left unfinished.
//!
//! # Departure from the pseudocode's control flow
//!
//! `notes.py`'s `handle_scc` rebuilds the *entire* dominator tree in place
//! and then keeps recursing with the old call stack still holding indices
//! into the graph that rebuild just invalidated. That is only sound in the
//! original's mutable-node-with-pointers representation, where a node
//! reference stays valid across a rebuild; it does not translate to an
//! arena of indices, where a global rebuild can repoint `succs_dom`/`idom`
//! out from under an in-flight traversal.
//!
//! This implementation instead matches the driver-level description of the
//! driver at the outer level: "C7 repeatedly invokes C3→C4→C2 ... picks a
//! header, splits, and recurses." Each outer iteration ([`run_pass`]) builds
//! a fresh dominator tree and back-edge set, walks the whole tree bottom-up
//! looking for the first (innermost) irreducible loop, performs exactly one
//! [`split::split_scc`], and hands the rewired graph back to [`ons_reduce`]
//! to rebuild from scratch. This is the "full rebuild" that
//! `notes.py`'s own comment call out as acceptable, just hoisted to be the
//! whole loop body rather than an in-recursion side effect. It converges for
//! the same reason Unger's algorithm terminates at all: every split either
//! makes an SCC reducible or shrinks the region still needing one.
//!
//! One consequence: since the dominator tree built by [`OnsGraph::build`]
//! is discarded and rebuilt after every single split, the `idom`/`succs_dom`
//! patch-up `notes.py`'s `SplitSCC` performs on the *old* tree is moot work
//! here -- only the CFG edges (`succs`/`preds`) and the returned split
//! records need to survive into the next iteration, so [`split::split_scc`]
//! only rewires those.

mod split;

use fixedbitset::FixedBitSet;

use crate::{
    common::IndexSet,
    dominators::gen_lt_graph,
    error::Result,
    graph::{Cfg, NodeId},
};

/// One duplication performed by an ONS split: `duplicate` is a fresh copy
/// of `original` that now carries the edges of every non-header member of
/// a resolved strongly connected component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitRecord {
    pub duplicate: NodeId,
    pub original: NodeId,
}

/// The outcome of [`ons_reduce`]: a fully reducible control-flow graph,
/// plus every split performed to get there, in the order they were applied.
#[derive(Debug, Clone)]
pub struct OnsResult {
    pub cfg: Cfg,
    pub splits: Vec<SplitRecord>,
}

/// A node in the working graph Optimised Node Splitting operates over:
/// an [`crate::dominators::LtNode`] enriched with dominator-tree children,
/// dominator depth, and the domain-weight/header bookkeeping `handle_scc`
/// needs while a single strongly connected component is being resolved.
#[derive(Debug, Clone)]
pub(crate) struct OnsNode {
    pub(crate) id: NodeId,
    pub(crate) succs: Vec<usize>,
    pub(crate) preds: Vec<usize>,
    pub(crate) idom: Option<usize>,
    pub(crate) succs_dom: Vec<usize>,
    pub(crate) level: usize,
    pub(crate) weight: u64,
    pub(crate) header: Option<usize>,
}

/// The working graph for one outer iteration: an arena of [`OnsNode`]s
/// indexed by DFS preorder, plus the `sp_back` edges found in it. Rebuilt
/// wholesale by [`ons_reduce`] after every split.
pub(crate) struct OnsGraph {
    pub(crate) nodes: Vec<OnsNode>,
    pub(crate) entry_idx: usize,
    pub(crate) back_edges: IndexSet<(usize, usize)>,
}

impl OnsGraph {
    /// Build the working graph from `cfg`: run Lengauer-Tarjan, populate
    /// dominator-tree children and depth, and mark every `sp_back` edge.
    pub(crate) fn build(cfg: &Cfg) -> Result<Self> {
        let (lt_nodes, pre, rev) = gen_lt_graph(cfg);
        let n = lt_nodes.len();

        let mut nodes: Vec<OnsNode> = Vec::with_capacity(n);
        for (idx, &id) in rev.iter().enumerate() {
            let succs = cfg.successors(id).iter().map(|s| pre[s]).collect();
            nodes.push(OnsNode {
                id,
                succs,
                preds: lt_nodes[idx].preds.clone(),
                idom: lt_nodes[idx].idom,
                succs_dom: Vec::new(),
                level: 0,
                weight: 1,
                header: None,
            });
        }
        for idx in 0..n {
            if let Some(idom_idx) = nodes[idx].idom {
                nodes[idom_idx].succs_dom.push(idx);
            }
        }

        let mut graph = Self {
            nodes,
            entry_idx: 0,
            back_edges: IndexSet::default(),
        };
        graph.set_levels();
        graph.back_edges = graph.mark_back_edges();
        Ok(graph)
    }

    /// Assign every node its dominator-tree depth, entry at level 1.
    /// Iterative preorder over `succs_dom`; no node is visited twice
    /// because the dominator tree is a tree.
    fn set_levels(&mut self) {
        let mut stack = vec![(self.entry_idx, 1usize)];
        while let Some((idx, level)) = stack.pop() {
            self.nodes[idx].level = level;
            for &child in &self.nodes[idx].succs_dom {
                stack.push((child, level + 1));
            }
        }
    }

    /// Find every `sp_back` edge: `(u, v)` such that `v` is still on the
    /// active DFS path when `u` is visited. Iterative DFS with an explicit
    /// work stack and an `active` set, the same shape as
    /// [`crate::scc::tarjan_scc`]'s frame stack.
    fn mark_back_edges(&self) -> IndexSet<(usize, usize)> {
        struct Frame {
            node: usize,
            next_child: usize,
        }

        let mut active = FixedBitSet::with_capacity(self.nodes.len());
        let mut visited = FixedBitSet::with_capacity(self.nodes.len());
        let mut back_edges = IndexSet::default();
        let mut stack = vec![Frame {
            node: self.entry_idx,
            next_child: 0,
        }];
        active.insert(self.entry_idx);
        visited.insert(self.entry_idx);

        while let Some(frame) = stack.last_mut() {
            let node = frame.node;
            let succs = &self.nodes[node].succs;

            if frame.next_child < succs.len() {
                let child = succs[frame.next_child];
                frame.next_child += 1;
                if active[child] {
                    back_edges.insert((node, child));
                } else if !visited[child] {
                    visited.insert(child);
                    active.insert(child);
                    stack.push(Frame {
                        node: child,
                        next_child: 0,
                    });
                }
            } else {
                active.set(node, false);
                stack.pop();
            }
        }

        back_edges
    }

    /// Whether `a` dominates `b` (reflexively: every node dominates itself).
    fn dominates(&self, a: usize, b: usize) -> bool {
        let mut curr = Some(b);
        while let Some(c) = curr {
            if c == a {
                return true;
            }
            curr = self.nodes[c].idom;
        }
        false
    }

    /// Postorder over the whole dominator tree rooted at `root`: children
    /// before parents, matching `split_loops`'s recursion order (every
    /// child is resolved before its own irreducibility is checked).
    fn dom_postorder(&self, root: usize) -> Vec<usize> {
        struct Frame {
            node: usize,
            next_child: usize,
        }

        let mut order = Vec::new();
        let mut stack = vec![Frame {
            node: root,
            next_child: 0,
        }];

        while let Some(frame) = stack.last_mut() {
            let node = frame.node;
            let children = &self.nodes[node].succs_dom;
            if frame.next_child < children.len() {
                let child = children[frame.next_child];
                frame.next_child += 1;
                stack.push(Frame {
                    node: child,
                    next_child: 0,
                });
            } else {
                order.push(node);
                stack.pop();
            }
        }

        order
    }

    /// Rebuild a [`Cfg`] from the current arena. The entry is always index
    /// 0 (splits only ever append clones), so insertion order already puts
    /// it first.
    pub(crate) fn to_cfg(&self) -> Result<Cfg> {
        let pairs = self
            .nodes
            .iter()
            .map(|node| (node.id, node.succs.iter().map(|&i| self.nodes[i].id).collect()));
        Cfg::from_ordered(pairs)
    }
}

/// Monotonic fresh-id allocator for node duplication, per the
/// REDESIGN FLAGS note: tracked explicitly rather than derived from
/// `graph.len()`, which is only safe when ids are dense.
pub(crate) struct FreshIds {
    next: u64,
}

impl FreshIds {
    fn new(cfg: &Cfg) -> Self {
        let max = cfg.nodes().map(NodeId::get).max().unwrap_or(0);
        Self { next: max + 1 }
    }

    pub(crate) fn alloc(&mut self) -> NodeId {
        let id = NodeId::new(self.next);
        self.next += 1;
        id
    }
}

/// One outer pass: walk the dominator tree bottom-up looking for the first
/// node with an irreducible back edge entering it, resolve the innermost
/// irreducible loop found along the way with exactly one
/// [`split::handle_ir_children`] call, and stop. `Some` carries that split's
/// records; `None` means the whole graph is already reducible.
fn run_pass(graph: &mut OnsGraph, fresh: &mut FreshIds) -> Option<Vec<SplitRecord>> {
    let order = graph.dom_postorder(graph.entry_idx);
    let mut irreducible = vec![false; graph.nodes.len()];

    for idx in order {
        let cross = graph.nodes[idx].succs_dom.iter().any(|&c| irreducible[c]);

        if cross {
            if let Some(records) = split::handle_ir_children(graph, idx, fresh) {
                return Some(records);
            }
        }

        irreducible[idx] = graph.nodes[idx]
            .preds
            .iter()
            .any(|&p| graph.back_edges.contains(&(p, idx)) && !graph.dominates(idx, p));
    }

    None
}

/// Make `cfg` reducible via Optimised Node Splitting: repeatedly rebuild
/// the dominator tree and back-edge set, resolve one irreducible loop, and
/// start over, until a full pass finds nothing left to split.
pub fn ons_reduce(cfg: &Cfg) -> Result<OnsResult> {
    cfg.validate()?;
    crate::graph::require_fully_reachable(cfg)?;
    let mut current = cfg.clone();
    let mut all_splits = Vec::new();

    loop {
        let mut graph = OnsGraph::build(&current)?;
        let mut fresh = FreshIds::new(&current);

        match run_pass(&mut graph, &mut fresh) {
            Some(mut records) => {
                all_splits.append(&mut records);
                current = graph.to_cfg()?;
            }
            None => {
                current = graph.to_cfg()?;
                break;
            }
        }
    }

    Ok(OnsResult {
        cfg: current,
        splits: all_splits,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reduce;
    use crate::graph::WeightedCfg;

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

    fn is_reducible(cfg: &Cfg) -> bool {
        let wcfg = WeightedCfg::unit(cfg.clone());
        let state = reduce::reduce(&wcfg).expect("reduce never fails on a valid graph");
        state.cfg().expect("valid reducer state").cfg().len() == 1
    }

    #[test]
    fn already_reducible_graph_needs_no_split() {
        let g = cfg(&[(0, &[1, 2]), (1, &[3]), (2, &[3]), (3, &[])]);
        let result = ons_reduce(&g).unwrap();
        assert!(result.splits.is_empty());
        assert_eq!(result.cfg.len(), g.len());
        assert!(is_reducible(&result.cfg));
    }

    #[test]
    fn irreducible_diamond_is_split_into_a_reducible_graph() {
        // 0 -> 1, 0 -> 2, 1 -> 2, 1 -> 3, 2 -> 1, 2 -> 3, 3 -> []
        let g = cfg(&[(0, &[1, 2]), (1, &[2, 3]), (2, &[1, 3]), (3, &[])]);
        let result = ons_reduce(&g).unwrap();
        assert!(!result.splits.is_empty());
        assert!(is_reducible(&result.cfg));
        assert_eq!(result.cfg.len(), g.len() + result.splits.len());
    }

    #[test]
    fn split_records_name_only_nodes_that_existed_at_the_time() {
        let g = cfg(&[(0, &[1, 2]), (1, &[2, 3]), (2, &[1, 3]), (3, &[])]);
        let result = ons_reduce(&g).unwrap();
        let mut seen: IndexSet<NodeId> = g.nodes().collect();
        for split in &result.splits {
            assert!(seen.contains(&split.original));
            assert!(!seen.contains(&split.duplicate), "duplicate ids must be fresh");
            seen.insert(split.duplicate);
        }
    }

    #[test]
    fn trivial_single_node_graph_is_left_alone() {
        let g = cfg(&[(0, &[])]);
        let result = ons_reduce(&g).unwrap();
        assert!(result.splits.is_empty());
        assert_eq!(result.cfg.len(), 1);
    }

    #[test]
    fn self_loop_alone_is_already_reducible() {
        let g = cfg(&[(0, &[0])]);
        let result = ons_reduce(&g).unwrap();
        assert!(result.splits.is_empty());
        assert!(is_reducible(&result.cfg));
    }

    mod proptests {
        use proptest::{collection::vec, prelude::*};

        use super::*;

        /// A random connected CFG on `2..=max_n` nodes, built the way
        /// `examples/original_source/tests/helper.py::gen_random_graph` does:
        /// every node past the entry is attached as a child of some
        /// already-reachable node, so the result is connected by
        /// construction. Extra edges (forward, self, or back) are then
        /// layered on top for branching and cycles.
        fn random_cfg_strategy(max_n: usize) -> impl Strategy<Value = Cfg> {
            (2..=max_n).prop_flat_map(|n| {
                (vec(0..n, n - 1), vec(vec(0..n, 0..3), n)).prop_map(move |(parents, raw)| {
                    let mut succs: Vec<IndexSet<usize>> = vec![IndexSet::default(); n];
                    for (i, parent_pick) in parents.into_iter().enumerate() {
                        let child = i + 1;
                        succs[parent_pick % child].insert(child);
                    }
                    for (i, extra) in raw.into_iter().enumerate() {
                        succs[i].extend(extra);
                    }
                    let pairs = succs.into_iter().enumerate().map(|(i, set)| {
                        let targets: Vec<NodeId> = set.into_iter().map(|s| NodeId::new(s as u64)).collect();
                        (NodeId::new(i as u64), targets)
                    });
                    Cfg::from_ordered(pairs).expect("every successor is within 0..n")
                })
            })
        }

        proptest! {
            /// Whatever `ons_reduce` hands back is always reducible by
            /// plain T1/T2 -- the whole point of Optimised Node Splitting.
            #[test]
            fn ons_reduce_output_is_always_reducible(cfg in random_cfg_strategy(7)) {
                let result = ons_reduce(&cfg).expect("ons_reduce is total on valid input");
                prop_assert!(is_reducible(&result.cfg));
            }

            /// Every split record names an id that was fresh at the moment
            /// it was introduced, and the resulting graph grows by exactly
            /// one node per split.
            #[test]
            fn ons_split_records_are_consistent_with_graph_growth(cfg in random_cfg_strategy(7)) {
                let original_len = cfg.len();
                let result = ons_reduce(&cfg).expect("ons_reduce is total on valid input");
                prop_assert_eq!(result.cfg.len(), original_len + result.splits.len());

                let mut seen: IndexSet<NodeId> = cfg.nodes().collect();
                for split in &result.splits {
                    prop_assert!(seen.contains(&split.original));
                    prop_assert!(!seen.contains(&split.duplicate));
                    seen.insert(split.duplicate);
                }
            }
        }
    }
}

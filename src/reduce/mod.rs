//! Hecht-Ullman T1/T2 reduction with a reversible log.
//!
//! Grounded on `examples/original_source/src/lib/hecht_ullman_reduction.py`
//! (`_reduce_t1`, `_reduce_t2`, `reduce_t1t2_data`, `recover_orig_data`).
//!
//! Ref: Matthew S. Hecht and Jeffrey D. Ullman. 1972. Flow graph
//! reducibility. In Proceedings of the fourth annual ACM symposium on
//! Theory of computing (STOC '72).

mod log;

pub use log::LogEntry;

use error_stack::Report;

use crate::{
    common::IndexMap,
    error::{GraphError, OffendingNode, Result},
    graph::{predecessors, Cfg, NodeId, WeightedCfg},
};

/// The mutable state threaded through a T1/T2 reduction: the graph being
/// reduced, its predecessor mirror, per-node weights, and the log needed to
/// undo every step taken so far.
#[derive(Debug, Clone)]
pub struct ReducerState {
    entry: NodeId,
    graph: IndexMap<NodeId, Vec<NodeId>>,
    preds: IndexMap<NodeId, Vec<NodeId>>,
    weights: IndexMap<NodeId, u64>,
    log: Vec<LogEntry>,
}

impl ReducerState {
    /// The entry node. Never touched by T1/T2: it is the one node exempt
    /// from absorption.
    #[must_use]
    pub fn entry(&self) -> NodeId {
        self.entry
    }

    /// The reduction log so far, oldest first.
    #[must_use]
    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    /// The current (possibly reduced) graph as a [`WeightedCfg`].
    pub fn cfg(&self) -> Result<WeightedCfg> {
        let cfg = Cfg::from_parts_unchecked(self.entry, self.graph.clone());
        cfg.validate()?;
        WeightedCfg::new(cfg, self.weights.clone())
    }
}

fn reduce_t1(
    graph: &mut IndexMap<NodeId, Vec<NodeId>>,
    preds: &mut IndexMap<NodeId, Vec<NodeId>>,
    weights: &IndexMap<NodeId, u64>,
    log: &mut Vec<LogEntry>,
) {
    let nodes: Vec<NodeId> = graph.keys().copied().collect();

    for node in nodes {
        let has_self_loop = graph[&node].contains(&node);
        if !has_self_loop {
            continue;
        }

        let node_succs = graph[&node].clone();
        let node_preds = graph[&node].clone();
        let weight = weights[&node];

        log.push(LogEntry::T1 {
            node,
            node_succs,
            node_preds,
            weight,
        });

        graph.get_mut(&node).expect("just indexed").retain(|&x| x != node);
        if let Some(p) = preds.get_mut(&node) {
            p.retain(|&x| x != node);
        }
    }
}

fn reduce_t2(
    graph: &mut IndexMap<NodeId, Vec<NodeId>>,
    preds: &mut IndexMap<NodeId, Vec<NodeId>>,
    weights: &mut IndexMap<NodeId, u64>,
    log: &mut Vec<LogEntry>,
    start: NodeId,
) {
    let to_traverse: Vec<NodeId> = graph.keys().copied().collect();

    for node in to_traverse {
        if node == start {
            continue;
        }

        let Some(pred_list) = preds.get(&node) else {
            continue;
        };
        if pred_list.len() != 1 || pred_list[0] == node {
            continue;
        }
        let u = pred_list[0];

        let u_preds = preds[&u].clone();
        let u_succs = graph[&u].clone();
        let node_preds = preds[&node].clone();
        let node_succs = graph[&node].clone();
        let weight = weights[&node];

        log.push(LogEntry::T2 {
            node,
            parent: u,
            parent_succs: u_succs,
            parent_preds: u_preds,
            node_succs: node_succs.clone(),
            node_preds,
            weight,
        });

        // delete node as a child of u, then add node's children back to u
        let u_list = graph.get_mut(&u).expect("u has an entry");
        u_list.retain(|&x| x != node);
        for &child in &node_succs {
            if !u_list.contains(&child) {
                u_list.push(child);
            }
        }

        // every child of node now has u as a predecessor instead
        for &child in &node_succs {
            let child_preds = preds.get_mut(&child).expect("child has an entry");
            if !child_preds.contains(&u) {
                child_preds.push(u);
            }
            child_preds.retain(|&x| x != node);
        }

        preds.shift_remove(&node);
        graph.shift_remove(&node);
        *weights.get_mut(&u).expect("u has a weight") += weight;
        weights.shift_remove(&node);
    }
}

/// Reduce `input` by repeatedly applying T1 (self-loop removal) then T2
/// (unique-predecessor absorption) until a full pass leaves the log
/// unchanged.
pub fn reduce(input: &WeightedCfg) -> Result<ReducerState> {
    input.cfg().validate()?;
    let entry = input.cfg().entry();

    let mut graph: IndexMap<NodeId, Vec<NodeId>> = input
        .cfg()
        .nodes()
        .map(|node| (node, input.cfg().successors(node).to_vec()))
        .collect();
    let mut preds = predecessors(input.cfg());
    let mut weights = input.weights().clone();
    let mut log = Vec::new();

    loop {
        let ops_before = log.len();
        reduce_t1(&mut graph, &mut preds, &weights, &mut log);
        reduce_t2(&mut graph, &mut preds, &mut weights, &mut log, entry);
        let ops_after = log.len();
        if ops_before == ops_after {
            break;
        }
    }

    Ok(ReducerState {
        entry,
        graph,
        preds,
        weights,
        log,
    })
}

/// Unwind `state`'s log, LIFO, restoring the graph it started from.
/// Drains the log; calling this twice on the same state is a no-op the
/// second time (an empty log just returns the current graph).
pub fn recover(state: &mut ReducerState) -> Result<WeightedCfg> {
    while let Some(entry) = state.log.pop() {
        match entry {
            LogEntry::T1 { node, .. } => {
                state
                    .graph
                    .get_mut(&node)
                    .ok_or_else(|| {
                        Report::new(GraphError::InvariantBroken).attach_printable(OffendingNode(node))
                    })?
                    .push(node);
                state
                    .preds
                    .get_mut(&node)
                    .ok_or_else(|| {
                        Report::new(GraphError::InvariantBroken).attach_printable(OffendingNode(node))
                    })?
                    .push(node);
            }
            LogEntry::T2 {
                node,
                parent,
                parent_succs,
                parent_preds,
                node_succs,
                weight,
                ..
            } => {
                state.graph.insert(parent, parent_succs);
                state.preds.insert(parent, parent_preds);

                state.graph.insert(node, node_succs);
                state.preds.insert(node, vec![parent]);

                // descendants of node get the right predecessors
                for &child in &state.graph[&node] {
                    let parent_has_child = state.graph[&parent].contains(&child);
                    let child_preds = state.preds.get_mut(&child).expect("known node");
                    if !child_preds.contains(&node) {
                        child_preds.push(node);
                    }
                    if child_preds.contains(&parent) && !parent_has_child {
                        child_preds.retain(|&x| x != parent);
                    }
                }

                // descendants of parent get the right predecessors
                for &child in &state.graph[&parent] {
                    let node_has_child = state.graph[&node].contains(&child);
                    let child_preds = state.preds.get_mut(&child).expect("known node");
                    if !child_preds.contains(&parent) {
                        child_preds.push(parent);
                    }
                    if child_preds.contains(&node) && !node_has_child {
                        child_preds.retain(|&x| x != node);
                    }
                }

                // predecessors of node point back to it
                for &x in &state.preds[&node] {
                    let parent_in_preds = state.preds[&parent].contains(&x);
                    let x_succs = state.graph.get_mut(&x).expect("known node");
                    if !x_succs.contains(&node) {
                        x_succs.push(node);
                    }
                    if x_succs.contains(&parent) && !parent_in_preds {
                        x_succs.retain(|&y| y != parent);
                    }
                }

                *state.weights.get_mut(&parent).expect("known node") -= weight;
                state.weights.insert(node, weight);
            }
        }
    }

    state.cfg()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Cfg;

    fn n(id: u64) -> NodeId {
        NodeId::new(id)
    }

    fn wcfg(pairs: &[(u64, &[u64])]) -> WeightedCfg {
        let cfg = Cfg::from_ordered(
            pairs
                .iter()
                .map(|(node, succs)| (n(*node), succs.iter().copied().map(n).collect())),
        )
        .expect("valid test graph");
        WeightedCfg::unit(cfg)
    }

    #[test]
    fn self_loop_is_stripped_and_logged() {
        // 0 -> 1, 0 -> 2, 1 -> 1 (self loop), 1 -> 2, 2 -> 1: an irreducible
        // pair (1 and 2 both have two predecessors, so T2 never fires) with
        // a self-loop on 1 that T1 alone must remove.
        let g = wcfg(&[(0, &[1, 2]), (1, &[1, 2]), (2, &[1])]);
        let state = reduce(&g).unwrap();
        let reduced = state.cfg().unwrap();
        assert!(!reduced.cfg().successors(n(1)).contains(&n(1)));
        assert_eq!(reduced.cfg().len(), 3);
        assert_eq!(state.log().len(), 1);
        assert!(matches!(state.log()[0], LogEntry::T1 { node, .. } if node == n(1)));
    }

    #[test]
    fn chain_of_single_preds_collapses_to_entry() {
        // 0 -> 1 -> 2 -> 3, each of 1,2,3 has a single predecessor
        let g = wcfg(&[(0, &[1]), (1, &[2]), (2, &[3]), (3, &[])]);
        let state = reduce(&g).unwrap();
        let reduced = state.cfg().unwrap();
        assert_eq!(reduced.cfg().len(), 1);
        assert_eq!(reduced.cfg().entry(), n(0));
        assert_eq!(reduced.weight(n(0)), 4);
    }

    /// Linear-chain scenario: checks the log's exact shape, not
    /// just the final graph, since §8 gives the literal tuples.
    #[test]
    fn s1_linear_chain_log_matches_spec_literal() {
        let g = wcfg(&[(0, &[1]), (1, &[2]), (2, &[])]);
        let state = reduce(&g).unwrap();
        let reduced = state.cfg().unwrap();

        assert!(reduced.cfg().successors(n(0)).is_empty());
        assert!(reduced.cfg().nodes().eq([n(0)]));
        assert_eq!(reduced.weight(n(0)), 3);

        assert_eq!(
            state.log(),
            &[
                LogEntry::T2 {
                    node: n(1),
                    parent: n(0),
                    parent_succs: vec![n(1)],
                    parent_preds: vec![],
                    node_succs: vec![n(2)],
                    node_preds: vec![n(0)],
                    weight: 1,
                },
                LogEntry::T2 {
                    node: n(2),
                    parent: n(0),
                    parent_succs: vec![n(2)],
                    parent_preds: vec![],
                    node_succs: vec![],
                    node_preds: vec![n(0)],
                    weight: 1,
                },
            ]
        );
    }

    #[test]
    fn irreducible_pair_is_left_alone() {
        // 0 -> 1, 0 -> 2, 1 -> 2, 2 -> 1: both 1 and 2 have two predecessors,
        // so neither can ever be absorbed.
        let g = wcfg(&[(0, &[1, 2]), (1, &[2]), (2, &[1])]);
        let state = reduce(&g).unwrap();
        let reduced = state.cfg().unwrap();
        assert_eq!(reduced.cfg().len(), 3);
        assert!(state.log().is_empty());
    }

    #[test]
    fn recover_restores_original_graph_and_weights() {
        let g = wcfg(&[(0, &[1]), (1, &[2]), (2, &[3]), (3, &[])]);
        let mut state = reduce(&g).unwrap();
        let recovered = recover(&mut state).unwrap();
        assert!(state.log().is_empty());
        assert_eq!(recovered.cfg().len(), 4);
        for node in g.cfg().nodes() {
            assert_eq!(recovered.weight(node), 1);
            let mut expected = g.cfg().successors(node).to_vec();
            let mut actual = recovered.cfg().successors(node).to_vec();
            expected.sort_by_key(NodeId::get);
            actual.sort_by_key(NodeId::get);
            assert_eq!(expected, actual);
        }
    }

    #[test]
    fn recover_restores_self_loop() {
        let g = wcfg(&[(0, &[1, 2]), (1, &[1, 2]), (2, &[1])]);
        let mut state = reduce(&g).unwrap();
        let recovered = recover(&mut state).unwrap();
        let mut succs = recovered.cfg().successors(n(1)).to_vec();
        succs.sort_by_key(NodeId::get);
        assert_eq!(succs, vec![n(1), n(2)]);
    }

    /// A seeded stress test in the spirit of
    /// `examples/original_source/tests/helper.py::gen_random_graph`: reduce
    /// and then fully recover a batch of random graphs, and check that
    /// recovery always lands back on the exact original structure and
    /// weights, not just a graph of the same size.
    #[test]
    fn reduce_then_recover_roundtrips_on_random_graphs() {
        use rand::{rngs::StdRng, Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(0xC5_FEED);

        for _ in 0..200 {
            let node_count = rng.gen_range(1..12);
            let pairs = (0..node_count).map(|i| {
                let out_degree = rng.gen_range(0..4.min(node_count));
                let mut succs: crate::common::IndexSet<NodeId> = crate::common::IndexSet::default();
                for _ in 0..out_degree {
                    succs.insert(n(rng.gen_range(0..node_count) as u64));
                }
                (n(i as u64), succs.into_iter().collect())
            });
            let cfg = Cfg::from_ordered(pairs).expect("every successor is within range");
            let g = WeightedCfg::unit(cfg.clone());

            let mut state = reduce(&g).unwrap();
            let recovered = recover(&mut state).unwrap();

            assert!(state.log().is_empty());
            assert_eq!(recovered.cfg().len(), cfg.len());
            for node in cfg.nodes() {
                assert_eq!(recovered.weight(node), 1);
                let mut expected = cfg.successors(node).to_vec();
                let mut actual = recovered.cfg().successors(node).to_vec();
                expected.sort_by_key(NodeId::get);
                actual.sort_by_key(NodeId::get);
                assert_eq!(expected, actual);
            }
        }
    }
}

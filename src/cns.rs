//! Controlled Node Splitting (Janssen & Corporaal).
//!
//! Grounded on `examples/original_source/src/lib/cns_reduction.py`
//! (`build_strategy`, `get_split`, `split_graph`, `cns_reduce`).
//!
//! Ref: Johan Janssen and Henk Corporaal. 1997. Making graphs reducible with
//! controlled node splitting. ACM Transactions on Programming Languages and
//! Systems, Vol. 19, No. 6.

use error_stack::Report;

use crate::{
    common::{IndexMap, IndexSet},
    dominators::{gen_lt_graph, LtNode},
    error::{GraphError, Result},
    graph::{Cfg, NodeId, WeightedCfg},
    reduce,
};

/// Which nodes Controlled Node Splitting is allowed to duplicate.
///
/// A node that does not immediately dominate any other node is always
/// splittable, under either strategy. These strategies differ only in how
/// they treat a node that *does* dominate something.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Never split a node that immediately dominates something -- only
    /// ordinary, non-header nodes are candidates. The usual choice.
    #[default]
    NormalNode,
    /// Allow splitting a node that dominates something, as long as none of
    /// its own predecessors is itself an immediate dominator of anything
    /// (i.e. none of its predecessors is a loop header).
    BackEdge,
}

impl Strategy {
    /// Parse a strategy by name, for a textual front end. The typed
    /// variants above are the normal way to select a strategy; this exists
    /// only so a name can round-trip through [`GraphError::UnknownStrategy`].
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "normal_node" => Ok(Self::NormalNode),
            "back_edge" => Ok(Self::BackEdge),
            _ => Err(Report::new(GraphError::UnknownStrategy)),
        }
    }
}

/// One duplication performed by a CNS step: `duplicate` is a fresh copy of
/// `original` serving one of its former predecessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitRecord {
    pub duplicate: NodeId,
    pub original: NodeId,
}

/// One round of Controlled Node Splitting: the T1/T2-reduced graph after
/// this round, and the splits that produced it (empty for the first entry,
/// which is just the initial reduction before any splitting).
#[derive(Debug, Clone)]
pub struct CnsStep {
    pub cfg: WeightedCfg,
    pub splits: Vec<SplitRecord>,
}

struct FreshIds {
    next: u64,
}

impl FreshIds {
    fn new(cfg: &Cfg) -> Self {
        let max = cfg.nodes().map(NodeId::get).max().unwrap_or(0);
        Self { next: max + 1 }
    }

    fn alloc(&mut self) -> NodeId {
        let id = NodeId::new(self.next);
        self.next += 1;
        id
    }
}

fn get_split(
    nodes: &[LtNode],
    rev: &[NodeId],
    weights: &IndexMap<NodeId, u64>,
    strategy: Strategy,
) -> Option<usize> {
    let idoms: IndexSet<usize> = nodes.iter().filter_map(|node| node.idom).collect();
    let mut best: Option<(usize, u64)> = None;

    for idx in 1..nodes.len() {
        let weight = weights[&rev[idx]];
        let score = weight * (nodes[idx].preds.len() as u64 - 1);

        if let Some((_, best_score)) = best {
            if score >= best_score {
                continue;
            }
        }

        let splittable = if !idoms.contains(&idx) {
            true
        } else {
            match strategy {
                Strategy::NormalNode => false,
                Strategy::BackEdge => {
                    !nodes[idx].preds.iter().any(|pred| idoms.contains(pred))
                }
            }
        };

        if splittable {
            best = Some((idx, score));
        }
    }

    best.map(|(idx, _)| idx)
}

/// Replace `node_to_split` with one duplicate per predecessor. The first
/// predecessor's duplicate reuses `node_to_split`'s own id (and its
/// original weight); every other duplicate gets a fresh id, the same
/// successor list, and the split node's original weight, and its sole
/// former predecessor is redirected to point at it instead of the
/// original.
fn split_graph(
    graph: &IndexMap<NodeId, Vec<NodeId>>,
    weights: &IndexMap<NodeId, u64>,
    node_to_split: NodeId,
    preds_of_split: &[NodeId],
    fresh: &mut FreshIds,
) -> (IndexMap<NodeId, Vec<NodeId>>, IndexMap<NodeId, u64>, Vec<SplitRecord>) {
    let split_succs = graph[&node_to_split].clone();
    let old_weight = weights[&node_to_split];

    let mut new_graph: IndexMap<NodeId, Vec<NodeId>> = graph
        .iter()
        .filter(|(&k, _)| k != node_to_split)
        .map(|(&k, v)| (k, v.clone()))
        .collect();
    // Unlike `new_graph`, the first duplicate reuses `node_to_split`'s own
    // id and keeps its original weight unchanged, so `node_to_split`'s
    // entry is kept rather than filtered out.
    let mut new_weights: IndexMap<NodeId, u64> = weights.clone();

    let mut records = Vec::with_capacity(preds_of_split.len());

    for (i, &pred) in preds_of_split.iter().enumerate() {
        let new_idx = if i == 0 { node_to_split } else { fresh.alloc() };
        new_graph.insert(new_idx, split_succs.clone());

        if i != 0 {
            let pred_succs = new_graph.get_mut(&pred).expect("predecessor is in the graph");
            pred_succs.retain(|&x| x != node_to_split);
            pred_succs.push(new_idx);
            new_weights.insert(new_idx, old_weight);
        }

        records.push(SplitRecord {
            duplicate: new_idx,
            original: node_to_split,
        });
    }

    (new_graph, new_weights, records)
}

/// Make `input` reducible via Controlled Node Splitting: T1/T2-reduce,
/// then, while more than one node remains, split one node and reduce
/// again, until the graph collapses to a single node.
pub fn cns_reduce(input: &WeightedCfg, strategy: Strategy) -> Result<Vec<CnsStep>> {
    crate::graph::require_fully_reachable(input.cfg())?;
    let initial = reduce::reduce(input)?;
    let mut current = initial.cfg()?;
    let mut fresh = FreshIds::new(input.cfg());
    let mut steps = vec![CnsStep {
        cfg: current.clone(),
        splits: Vec::new(),
    }];

    while current.cfg().len() > 1 {
        let (nodes, _pre, rev) = gen_lt_graph(current.cfg());
        let split_idx = get_split(&nodes, &rev, current.weights(), strategy).ok_or_else(|| {
            Report::new(GraphError::InvariantBroken)
                .attach_printable("no splittable node in an irreducible graph with more than one node")
        })?;

        let node_to_split = rev[split_idx];
        let preds_of_split: Vec<NodeId> =
            nodes[split_idx].preds.iter().map(|&p| rev[p]).collect();

        let (new_graph, new_weights, records) = split_graph(
            current.cfg().succs_map(),
            current.weights(),
            node_to_split,
            &preds_of_split,
            &mut fresh,
        );

        let split_cfg = Cfg::from_ordered(new_graph)?;
        let split_wcfg = WeightedCfg::new(split_cfg, new_weights)?;

        let reduced = reduce::reduce(&split_wcfg)?;
        current = reduced.cfg()?;
        steps.push(CnsStep {
            cfg: current.clone(),
            splits: records,
        });
    }

    Ok(steps)
}

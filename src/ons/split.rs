//! Per-level resolution of one irreducible region: finding the strongly
//! connected components below an external dominator, choosing an MSED
//! header, and splitting every other member.
//!
//! Grounded on `examples/original_source/src/lib/notes.py`'s
//! `handle_ir_children`, `handle_scc`, `GetWeight`, `ChooseNode`, and
//! `SplitSCC`. The restricted SCC search below replaces `notes.py`'s
//! `SCC1`/`SCC2` pair (a two-pass Kosaraju sketch that iterates its
//! postorder list forward rather than in reverse-finish order, which does
//! not actually recover SCCs correctly) with the same iterative Tarjan
//! shape already used in `crate::scc`, restricted to the candidate set.
//! This computes the region-restricted SCC partition without carrying
//! the original's bug forward.

use fixedbitset::FixedBitSet;

use crate::common::{IndexMap, IndexSet};

use super::{FreshIds, OnsGraph, OnsNode, SplitRecord};

/// Real-edge reachability from `top`'s dominator children, stopping at
/// `top`'s own level and never leaving it: the candidate set
/// `handle_ir_children` restricts its SCC search to.
fn candidates_below(graph: &OnsGraph, top: usize) -> IndexSet<usize> {
    let top_level = graph.nodes[top].level;
    let mut candidates = IndexSet::default();
    let mut stack: Vec<usize> = graph.nodes[top].succs_dom.clone();

    while let Some(idx) = stack.pop() {
        if candidates.contains(&idx) || graph.nodes[idx].level <= top_level {
            continue;
        }
        candidates.insert(idx);
        for &s in &graph.nodes[idx].succs {
            if !candidates.contains(&s) && graph.nodes[s].level > top_level {
                stack.push(s);
            }
        }
    }

    candidates
}

/// Iterative Tarjan SCC restricted to `candidates`: an edge to a node
/// outside the set is treated as not existing.
fn restricted_scc(graph: &OnsGraph, candidates: &IndexSet<usize>) -> Vec<Vec<usize>> {
    struct Frame {
        node: usize,
        next_child: usize,
    }

    let mut ids: IndexMap<usize, usize> = IndexMap::default();
    let mut low: IndexMap<usize, usize> = IndexMap::default();
    let mut on_stack = FixedBitSet::with_capacity(graph.nodes.len());
    let mut stack: Vec<usize> = Vec::new();
    let mut work_stack: Vec<Frame> = Vec::new();
    let mut id_counter = 0usize;
    let mut results = Vec::new();

    for &start in candidates {
        if ids.contains_key(&start) {
            continue;
        }

        work_stack.push(Frame {
            node: start,
            next_child: 0,
        });
        ids.insert(start, id_counter);
        low.insert(start, id_counter);
        id_counter += 1;
        stack.push(start);
        on_stack.insert(start);

        while let Some(frame) = work_stack.last_mut() {
            let parent = frame.node;
            let children: Vec<usize> = graph.nodes[parent]
                .succs
                .iter()
                .copied()
                .filter(|c| candidates.contains(c))
                .collect();

            if frame.next_child < children.len() {
                let child = children[frame.next_child];
                frame.next_child += 1;

                if !ids.contains_key(&child) {
                    ids.insert(child, id_counter);
                    low.insert(child, id_counter);
                    id_counter += 1;
                    stack.push(child);
                    on_stack.insert(child);
                    work_stack.push(Frame {
                        node: child,
                        next_child: 0,
                    });
                } else if on_stack[child] {
                    let child_id = ids[&child];
                    let parent_low = low.get_mut(&parent).expect("parent has a low-link");
                    *parent_low = (*parent_low).min(child_id);
                }
            } else {
                work_stack.pop();

                if low[&parent] == ids[&parent] {
                    let mut scc = Vec::new();
                    loop {
                        let node = stack.pop().expect("scc root is still on the stack");
                        on_stack.set(node, false);
                        scc.push(node);
                        if node == parent {
                            break;
                        }
                    }
                    results.push(scc);
                }

                if let Some(caller) = work_stack.last() {
                    let parent_low = low[&parent];
                    let caller_low = low.get_mut(&caller.node).expect("caller has a low-link");
                    *caller_low = (*caller_low).min(parent_low);
                }
            }
        }
    }

    results
}

/// Postorder over `succs_dom`, restricted to `scc`, rooted at `root`. Used
/// by [`get_weight`] to sum a domain bottom-up.
fn restricted_dom_postorder(graph: &OnsGraph, root: usize, scc: &IndexSet<usize>) -> Vec<usize> {
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
        let children: Vec<usize> = graph.nodes[node]
            .succs_dom
            .iter()
            .copied()
            .filter(|c| scc.contains(c))
            .collect();
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

/// Sum `header`'s domain weight bottom-up (base weight 1 per node) and tag
/// every node in it with `header`, restricted to `scc`.
fn get_weight(graph: &mut OnsGraph, header: usize, scc: &IndexSet<usize>) {
    let order = restricted_dom_postorder(graph, header, scc);
    for idx in order {
        let mut total = 1u64;
        for &child in &graph.nodes[idx].succs_dom.clone() {
            if scc.contains(&child) {
                total += graph.nodes[child].weight;
            }
        }
        graph.nodes[idx].weight = total;
        graph.nodes[idx].header = Some(header);
    }
}

/// Find the strongly connected components below `top` (real edges,
/// restricted to `top`'s level and below), resolve the first one that is
/// both non-trivial and genuinely irreducible (more than one MSED member),
/// and split it. Returns `None` if every candidate SCC is either a
/// singleton or already reducible (MSED of size 1).
pub(super) fn handle_ir_children(
    graph: &mut OnsGraph,
    top: usize,
    fresh: &mut FreshIds,
) -> Option<Vec<SplitRecord>> {
    let top_level = graph.nodes[top].level;
    let candidates = candidates_below(graph, top);
    let sccs = restricted_scc(graph, &candidates);

    for scc in sccs {
        if scc.len() <= 1 {
            continue;
        }

        let scc_set: IndexSet<usize> = scc.iter().copied().collect();
        let msed: Vec<usize> = scc
            .iter()
            .copied()
            .filter(|&idx| graph.nodes[idx].level == top_level + 1)
            .collect();

        for &m in &msed {
            get_weight(graph, m, &scc_set);
        }

        if msed.len() <= 1 {
            // A single external-dominator-level member means this SCC is
            // already a reducible loop; nothing to split.
            continue;
        }

        let mut header = msed[0];
        let mut header_weight = graph.nodes[header].weight;
        for &m in &msed[1..] {
            if graph.nodes[m].weight > header_weight {
                header = m;
                header_weight = graph.nodes[m].weight;
            }
        }

        return Some(split_scc(graph, header, &scc, fresh));
    }

    None
}

/// Duplicate every member of `scc` whose domain header is not `header`,
/// then rewire successor and predecessor edges so each clone carries the
/// edges its original had within the component.
///
/// `notes.py`'s `SplitSCC` also patches `idom`/`succs_dom` on the old
/// dominator tree so the copied regions become independent subtrees; that
/// tree is about to be discarded and rebuilt from scratch by the caller
/// (see the module docs), so only the CFG edges are rewired here.
pub(super) fn split_scc(
    graph: &mut OnsGraph,
    header: usize,
    scc: &[usize],
    fresh: &mut FreshIds,
) -> Vec<SplitRecord> {
    let mut copy: IndexMap<usize, usize> = IndexMap::default();
    let mut records = Vec::with_capacity(scc.len());

    for &tmp in scc {
        if graph.nodes[tmp].header == Some(header) {
            continue;
        }
        let original = &graph.nodes[tmp];
        let clone_idx = graph.nodes.len();
        let clone = OnsNode {
            id: fresh.alloc(),
            succs: original.succs.clone(),
            preds: original.preds.clone(),
            idom: None,
            succs_dom: Vec::new(),
            level: original.level,
            weight: original.weight,
            header: None,
        };
        records.push(SplitRecord {
            duplicate: clone.id,
            original: graph.nodes[tmp].id,
        });
        graph.nodes.push(clone);
        copy.insert(tmp, clone_idx);
    }

    let scc_set: IndexSet<usize> = scc.iter().copied().collect();

    for &tmp in scc {
        let Some(&tmp_copy) = copy.get(&tmp) else {
            continue;
        };

        for s in graph.nodes[tmp].succs.clone() {
            if let Some(&s_copy) = copy.get(&s) {
                if let Some(pos) = graph.nodes[tmp_copy].succs.iter().position(|&x| x == s) {
                    graph.nodes[tmp_copy].succs[pos] = s_copy;
                }
                if !graph.nodes[s_copy].preds.contains(&tmp_copy) {
                    graph.nodes[s_copy].preds.push(tmp_copy);
                }
            } else if !graph.nodes[s].preds.contains(&tmp_copy) {
                graph.nodes[s].preds.push(tmp_copy);
            }
        }

        for p in graph.nodes[tmp].preds.clone() {
            if copy.contains_key(&p) {
                continue;
            }
            if scc_set.contains(&p) {
                graph.nodes[tmp].preds.retain(|&x| x != p);
                if let Some(pos) = graph.nodes[p].succs.iter().position(|&x| x == tmp) {
                    graph.nodes[p].succs[pos] = tmp_copy;
                }
            } else {
                graph.nodes[tmp_copy].preds.retain(|&x| x != p);
            }
        }
    }

    records
}

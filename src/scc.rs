//! Strongly connected components via Tarjan's algorithm, iterative.
//!
//! Grounded on `examples/original_source/src/lib/tarjan_scc.py`, which
//! simulates the recursive algorithm's call stack with an explicit
//! `work_stack` of `(node, child_iterator)` frames. Here the iterator is a
//! cursor index into the node's successor slice.

use crate::{
    common::{IndexMap, IndexSet},
    graph::{Cfg, NodeId},
};

struct Frame {
    node: NodeId,
    next_child: usize,
}

/// Find the strongly connected components of `cfg`.
///
/// Returns one `Vec<NodeId>` per component, in the order each component's
/// root was popped off the recursion stack (the order `get_tarjan_scc`
/// returns them in). A node with a self-loop and no other cycle forms its
/// own singleton component.
#[must_use]
pub fn tarjan_scc(cfg: &Cfg) -> Vec<Vec<NodeId>> {
    let mut ids: IndexMap<NodeId, usize> = IndexMap::default();
    let mut low: IndexMap<NodeId, usize> = IndexMap::default();
    let mut on_stack: IndexSet<NodeId> = IndexSet::default();
    let mut stack: Vec<NodeId> = Vec::new();
    let mut work_stack: Vec<Frame> = Vec::new();

    let mut id_counter = 0usize;
    let mut results = Vec::new();

    for start in cfg.nodes() {
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
            let children = cfg.successors(parent);

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
                } else if on_stack.contains(&child) {
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
                        on_stack.swap_remove(&node);
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

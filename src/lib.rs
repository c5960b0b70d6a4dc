//! Transform an arbitrary control-flow graph into an equivalent reducible
//! one, exposing the classical analyses a compiler front end needs along the
//! way: dominator tree, dominance frontier, strongly connected components,
//! and Hecht-Ullman T1/T2 reduction with a reversible log.
//!
//! The headline operations are two node-splitting strategies that make an
//! irreducible graph reducible while duplicating as little weight as
//! possible: Janssen & Corporaal's Controlled Node Splitting ([`cns_reduce`])
//! and, as a structural alternative targeting irreducible loops directly,
//! Unger's Optimised Node Splitting ([`ons_reduce`]).
//!
//! The crate is single-threaded and synchronous throughout: every operation
//! is a pure, total transformation of an in-memory [`Cfg`], deterministic
//! given the same input and the same [`cns::Strategy`].

mod common;

pub mod cns;
pub mod dominators;
pub mod error;
pub mod graph;
pub mod ons;
pub mod reduce;
pub mod scc;

pub use crate::{
    cns::{cns_reduce, CnsStep, Strategy},
    dominators::{dominator_tree, Dominators},
    error::{GraphError, Result},
    graph::{Cfg, NodeId, WeightedCfg},
    ons::{ons_reduce, OnsResult},
    reduce::{recover, reduce, LogEntry, ReducerState},
    scc::tarjan_scc,
};

pub use crate::dominators::frontier::{dominance_frontier, post_dominance_frontier};

//! The shared error taxonomy for every operation in this crate.
//!
//! All algorithms are total on inputs that satisfy the invariants of
//! [`crate::graph::Cfg`]; violations fail fast, before any mutation is
//! observable, with one of the variants below.

use core::fmt::{self, Display, Formatter};

use error_stack::Context;

use crate::graph::NodeId;

/// An error produced by a graph operation in this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// A CFG is missing a neighbour list for some node, references an
    /// unknown node, or has a node with a duplicate entry in its successor
    /// list.
    MalformedGraph,
    /// An operation that requires an entry node was given an empty graph.
    NoEntry,
    /// [`crate::graph::reverse`] was asked to reverse a graph with more than
    /// one sink (a node with no successors).
    AmbiguousReversal,
    /// A [`crate::cns::Strategy`] name did not match any enumerated
    /// strategy. Unreachable through the typed [`crate::cns::Strategy`] API;
    /// kept for a hypothetical textual front end that parses strategy names.
    UnknownStrategy,
    /// An assertion failed during reduction or recovery: the
    /// `preds` \<-\> `succs` invariant was violated after a mutation step.
    /// Indicates a bug in this crate, not a malformed input.
    InvariantBroken,
}

impl Display for GraphError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedGraph => f.write_str("malformed control-flow graph"),
            Self::NoEntry => f.write_str("graph has no entry node"),
            Self::AmbiguousReversal => {
                f.write_str("cannot reverse a graph with more than one sink")
            }
            Self::UnknownStrategy => f.write_str("unknown node-splitting strategy"),
            Self::InvariantBroken => f.write_str("internal invariant violated"),
        }
    }
}

impl Context for GraphError {}

/// A node id attached to a [`GraphError::MalformedGraph`] report, naming the
/// node that triggered the failure (an unknown reference, a node missing a
/// successor list, and so on).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct OffendingNode(pub NodeId);

impl Display for OffendingNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "offending node: {}", self.0)
    }
}

/// This crate's result alias: every fallible operation returns a
/// [`GraphError`] wrapped in an [`error_stack::Report`].
pub type Result<T, E = GraphError> = error_stack::Result<T, E>;

//! Spek State Space: the exploration and reduction kernel built on top of
//! the task machine. Turns a machine state and a scheduling policy into a
//! labelled transition system, and reduces that system under strong
//! bisimulation, weak bisimulation, or observational congruence.
//!
//! # Modules
//!
//! - `lts`: the labelled transition system graph and its `state_space` builder.
//! - `explorer`: the DFS exploration loop driving the task machine.
//! - `equivalence`: reachability predicates, partition refinement, reduction,
//!   and isomorphism checking.

pub mod equivalence;
pub mod explorer;
pub mod lts;

pub use equivalence::{bisimulation, isomorphic, reduce, reduce_with, refine, Cached, ObservationalCongruence, Partition, Reachable, Strong, Weak};
pub use explorer::{explore, Scheduler};
pub use lts::{from_parts, state_space, Label, Lts, StateNode, Transition};

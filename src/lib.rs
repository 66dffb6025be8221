// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! A worklist-driven, concurrent IFDS tabulation solver.
//!
//! This crate implements the core of the Naeem/Lhotak/Rodriguez tabulation
//! algorithm for interprocedural, finite, distributive subset (IFDS)
//! data-flow problems: path-edge propagation over the exploded super-graph
//! of an ICFG, with summary reuse across callers via the end-summary and
//! incoming tables. It does not define data-flow facts, flow functions, or
//! an ICFG itself; those are supplied by the embedding application through
//! the traits in [`icfg`].

pub mod config;
pub mod domain;
pub mod error;
pub mod executor;
pub mod flow_cache;
pub mod icfg;
pub mod listener;
pub mod mem_watch;
pub mod path_edge;
pub mod propagation;
pub mod solver;
pub mod stats;
pub mod tables;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use config::{PredecessorShorteningMode, SolverConfig};
pub use domain::Fact;
pub use error::{SolverError, SolverResult};
pub use icfg::{FlowFunction, FlowFunctions, IfdsTabulationProblem, Icfg, MemoryManager};
pub use listener::{SolverEvent, StatusListener};
pub use solver::{IfdsSolver, SolverPhase};
pub use stats::SolverStats;

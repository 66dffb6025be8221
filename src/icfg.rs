// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! External interfaces the solver consumes: the ICFG, flow functions, the
//! tabulation problem, and the optional memory manager hook. None of these
//! are defined by this crate; the embedding application supplies them.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use crate::domain::Fact;

/// A node in the interprocedural control-flow graph. Opaque to the solver.
pub trait NodeId: Copy + Eq + Hash + Send + Sync + Debug {}
impl<T: Copy + Eq + Hash + Send + Sync + Debug> NodeId for T {}

/// A procedure identifier. Opaque to the solver.
pub trait MethodId: Copy + Eq + Hash + Send + Sync + Debug {}
impl<T: Copy + Eq + Hash + Send + Sync + Debug> MethodId for T {}

/// Interprocedural control-flow graph queries.
pub trait Icfg<N, M>: Send + Sync
where
    N: NodeId,
    M: MethodId,
{
    fn succs_of(&self, n: &N) -> Vec<N>;
    fn is_call_stmt(&self, n: &N) -> bool;
    fn is_exit_stmt(&self, n: &N) -> bool;
    fn callees_of_call_at(&self, n: &N) -> Vec<M>;
    fn return_sites_of_call_at(&self, n: &N) -> Vec<N>;
    fn start_points_of(&self, m: &M) -> Vec<N>;
    /// Call-site nodes that may invoke `m`.
    fn callers_of(&self, m: &M) -> Vec<N>;
    fn method_of(&self, n: &N) -> M;
}

/// A single flow function: `computeTargets` in the Heros/FlowDroid
/// vocabulary.
pub trait FlowFunction<D: Fact>: Send + Sync {
    fn compute_targets(&self, fact: &D) -> Vec<D>;
}

/// An identity flow function, useful for call-to-return edges and tests.
pub struct IdentityFlowFunction;

impl<D: Fact> FlowFunction<D> for IdentityFlowFunction {
    fn compute_targets(&self, fact: &D) -> Vec<D> {
        vec![fact.clone()]
    }
}

/// The flow-function provider. Every query returns a reference-counted
/// flow function so the solver's flow-function cache can memoize by key
/// without re-deriving the function from the provider on every hit.
pub trait FlowFunctions<N, D, M>: Send + Sync
where
    N: NodeId,
    D: Fact,
    M: MethodId,
{
    fn get_normal_flow_function(&self, curr: &N, succ: &N) -> Arc<dyn FlowFunction<D>>;
    fn get_call_flow_function(&self, call_site: &N, callee: &M) -> Arc<dyn FlowFunction<D>>;
    fn get_return_flow_function(
        &self,
        call_site: &N,
        callee: &M,
        exit_stmt: &N,
        return_site: &N,
    ) -> Arc<dyn FlowFunction<D>>;
    fn get_call_to_return_flow_function(
        &self,
        call_site: &N,
        return_site: &N,
    ) -> Arc<dyn FlowFunction<D>>;
}

/// Optional rewrite hook applied to freshly derived facts. Returning
/// `None` is a normal request to drop the derivation.
pub trait MemoryManager<D: Fact>: Send + Sync {
    fn handle_memory_object(&self, d: &D) -> Option<D>;
    fn handle_generated_memory_object(&self, parent: &D, child: &D) -> Option<D>;
}

/// The tabulation problem definition: zero value, ICFG, flow functions,
/// and initial seeds.
pub trait IfdsTabulationProblem<N, D, M>: Send + Sync
where
    N: NodeId,
    D: Fact,
    M: MethodId,
{
    fn zero_value(&self) -> D {
        D::zero()
    }

    fn icfg(&self) -> &dyn Icfg<N, M>;

    fn flow_functions(&self) -> &dyn FlowFunctions<N, D, M>;

    /// Node -> set of facts holding at that node before the analysis runs.
    fn initial_seeds(&self) -> HashMap<N, HashSet<D>>;

    /// Whether returns should be propagated past a seed when the returning
    /// method has no recorded incoming caller context.
    fn follow_returns_past_seeds(&self) -> bool {
        false
    }
}

// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The propagation engine: `processNormalFlow`, `processCall`,
//! `applyEndSummaryOnCall`, `processExit`, and `propagate`.
//!
//! Grounded on `pta/propagator/propagator.rs`'s `solve_worklist`
//! dispatch-by-node-kind structure and its call/return edge handling,
//! generalized from pointer-assignment-graph edges to ICFG flow-function
//! application. These free functions operate on the solver's tables
//! directly so [`crate::solver::IfdsSolver`] can call them from within a
//! `rayon::Scope` task without holding a `&mut self` borrow across the
//! recursive `scope.spawn` calls that schedule further work.

use log::{trace, warn};
use rayon::Scope;

use crate::domain::Fact;
use crate::executor::WorklistExecutor;
use crate::icfg::{IfdsTabulationProblem, MemoryManager, MethodId, NodeId};
use crate::path_edge::SolverState;
use crate::solver::SolverPhase;
use crate::tables::{EndSummaryTable, IncomingTable, JumpFunctionTable};

use crate::flow_cache::FlowFunctionCache;

/// Everything a propagation step needs; bundled so task closures spawned
/// into a `rayon::Scope` can borrow it as a single `'scope` reference.
pub struct PropagationContext<'a, N, D, M> {
    pub problem: &'a dyn IfdsTabulationProblem<N, D, M>,
    pub flow_cache: &'a FlowFunctionCache<N, D, M>,
    pub jump_functions: &'a JumpFunctionTable<N, D>,
    pub end_summary: &'a EndSummaryTable<M, N, D>,
    pub incoming: &'a IncomingTable<M, N, D>,
    pub memory_manager: Option<&'a dyn MemoryManager<D>>,
    pub executor: &'a WorklistExecutor,
    pub max_callees_per_call_site: i64,
    pub max_abstraction_path_length: i64,
    pub follow_returns_past_seeds: bool,
    /// Which propagation pass is running. Call-flow results are tagged with
    /// a source context only during [`SolverPhase::SecondPhase`].
    pub phase: SolverPhase,
}

impl<'a, N, D, M> PropagationContext<'a, N, D, M>
where
    N: NodeId,
    D: Fact,
    M: MethodId,
{
    fn rewrite(&self, d: &D) -> Option<D> {
        match self.memory_manager {
            Some(mm) => mm.handle_memory_object(d),
            None => Some(d.clone()),
        }
    }

    fn rewrite_generated(&self, parent: &D, child: &D) -> Option<D> {
        match self.memory_manager {
            // Rewriting a fact that is unchanged from its parent cannot
            // change the final tables, only the cost of the call, so an
            // unchanged fact skips the hook entirely.
            Some(_) if parent == child => Some(child.clone()),
            Some(mm) => mm.handle_generated_memory_object(parent, child),
            None => Some(child.clone()),
        }
    }

    /// Inserts the edge if absent and, only then, schedules a processing
    /// task for it.
    pub fn propagate<'scope>(&'scope self, scope: &Scope<'scope>, state: SolverState<N, D>) {
        let Some(d1) = self.rewrite(&state.d1) else {
            return;
        };
        let Some(d2) = self.rewrite(&state.d2) else {
            return;
        };
        if self.max_abstraction_path_length >= 0
            && d2.path_length() as i64 > self.max_abstraction_path_length
        {
            return;
        }
        let state = SolverState {
            d1,
            n: state.n,
            d2,
            related_call_site: state.related_call_site,
            is_unbalanced_return: state.is_unbalanced_return,
        };
        if !self.jump_functions.insert_if_absent(&state) {
            return;
        }
        if state.is_unbalanced_return {
            self.executor.record_unbalanced_return();
        }
        trace!("scheduling edge ⟨{:?}, {:?}, {:?}⟩", state.d1, state.n, state.d2);
        self.executor.submit(scope, move || {
            process_edge(self, scope, state);
        });
    }
}

/// Dispatches a scheduled edge by the kind of node it lands on.
fn process_edge<'scope, N, D, M>(
    ctx: &'scope PropagationContext<'scope, N, D, M>,
    scope: &Scope<'scope>,
    state: SolverState<N, D>,
) where
    N: NodeId,
    D: Fact,
    M: MethodId,
{
    let icfg = ctx.problem.icfg();
    if icfg.is_call_stmt(&state.n) {
        process_call(ctx, scope, &state);
    } else if icfg.is_exit_stmt(&state.n) {
        process_exit(ctx, scope, &state);
        if !icfg.succs_of(&state.n).is_empty() {
            process_normal_flow(ctx, scope, &state);
        }
    } else if !icfg.succs_of(&state.n).is_empty() {
        process_normal_flow(ctx, scope, &state);
    }
}

/// Applies the normal-flow function along every outgoing edge of a
/// non-call, non-exit node.
fn process_normal_flow<'scope, N, D, M>(
    ctx: &'scope PropagationContext<'scope, N, D, M>,
    scope: &Scope<'scope>,
    state: &SolverState<N, D>,
) where
    N: NodeId,
    D: Fact,
    M: MethodId,
{
    let icfg = ctx.problem.icfg();
    for succ in icfg.succs_of(&state.n) {
        let flow_fn = ctx.flow_cache.normal_flow_function(state.n, succ);
        for d3 in flow_fn.compute_targets(&state.d2) {
            let Some(d3) = ctx.rewrite_generated(&state.d2, &d3) else {
                continue;
            };
            ctx.propagate(scope, state.derive(succ, d3));
        }
    }
}

/// Applies the call-flow function to every callee of a call statement,
/// wiring up the incoming table and (when a summary already exists) the
/// return edge, and separately applies the call-to-return flow function to
/// every return site.
fn process_call<'scope, N, D, M>(
    ctx: &'scope PropagationContext<'scope, N, D, M>,
    scope: &Scope<'scope>,
    state: &SolverState<N, D>,
) where
    N: NodeId,
    D: Fact,
    M: MethodId,
{
    let icfg = ctx.problem.icfg();
    let n = state.n;
    let return_sites = icfg.return_sites_of_call_at(&n);
    let callees = icfg.callees_of_call_at(&n);

    if ctx.max_callees_per_call_site < 0 || (callees.len() as i64) <= ctx.max_callees_per_call_site
    {
        for callee in callees {
            if ctx.executor.is_killed() {
                return;
            }
            let call_flow_fn = ctx.flow_cache.call_flow_function(n, callee);
            for d3 in call_flow_fn.compute_targets(&state.d2) {
                let Some(mut d3) = ctx.rewrite_generated(&state.d2, &d3) else {
                    continue;
                };
                if ctx.phase == SolverPhase::SecondPhase {
                    d3.derive_source_context(&state.d2);
                }
                let insert = ctx.incoming.add(
                    callee,
                    d3.clone(),
                    n,
                    state.d1.clone(),
                    state.d2.clone(),
                );
                if !insert.new_incoming {
                    continue;
                }
                let summary_applied =
                    apply_end_summary_on_call(ctx, scope, state, &return_sites, callee, &d3);
                if summary_applied {
                    continue;
                }
                if !insert.new_callee {
                    continue;
                }
                for sp in icfg.start_points_of(&callee) {
                    ctx.propagate(scope, SolverState::new(d3.clone(), sp, d3.clone()));
                }
            }
        }
    } else {
        warn!(
            "call site {:?} has {} callees, exceeding the configured cap of {}; skipping call-flow and end-summary propagation",
            n,
            callees.len(),
            ctx.max_callees_per_call_site
        );
    }

    for r in &return_sites {
        if ctx.executor.is_killed() {
            return;
        }
        let call_to_return_fn = ctx.flow_cache.call_to_return_flow_function(n, *r);
        for d3 in call_to_return_fn.compute_targets(&state.d2) {
            let Some(d3) = ctx.rewrite_generated(&state.d2, &d3) else {
                continue;
            };
            ctx.propagate(scope, state.derive(*r, d3));
        }
    }
}

/// Checks whether a summary already exists for `(callee, d3)` and, if so,
/// propagates a return edge for each of its exits. Returns whether any
/// summary was found.
fn apply_end_summary_on_call<'scope, N, D, M>(
    ctx: &'scope PropagationContext<'scope, N, D, M>,
    scope: &Scope<'scope>,
    state: &SolverState<N, D>,
    return_sites: &[N],
    callee: M,
    d3: &D,
) -> bool
where
    N: NodeId,
    D: Fact,
    M: MethodId,
{
    let summaries = ctx.end_summary.get(callee, d3);
    if summaries.is_empty() {
        return false;
    }
    for (exit_point, d4) in summaries {
        for r in return_sites {
            if ctx.executor.is_killed() {
                return true;
            }
            let return_fn = ctx
                .flow_cache
                .return_flow_function(state.n, callee, exit_point, *r);
            for d5 in return_fn.compute_targets(&d4) {
                let Some(d5) = ctx.rewrite_generated(&d4, &d5) else {
                    continue;
                };
                ctx.propagate(scope, SolverState::at_return_site(state.d1.clone(), *r, d5, state.n));
            }
        }
    }
    true
}

/// Records a discovered exit of the containing method, then propagates a
/// return edge to every recorded caller -- or, when none were recorded and
/// unbalanced returns are enabled, to every statically known caller.
fn process_exit<'scope, N, D, M>(
    ctx: &'scope PropagationContext<'scope, N, D, M>,
    scope: &Scope<'scope>,
    state: &SolverState<N, D>,
) where
    N: NodeId,
    D: Fact,
    M: MethodId,
{
    let icfg = ctx.problem.icfg();
    let method = icfg.method_of(&state.n);
    if !ctx
        .end_summary
        .add(method, state.d1.clone(), state.n, state.d2.clone())
    {
        return;
    }

    let incoming = ctx.incoming.get(method, &state.d1);
    for (call_site, caller_d1, _caller_d2) in &incoming {
        if ctx.executor.is_killed() {
            return;
        }
        for r in icfg.return_sites_of_call_at(call_site) {
            let return_fn = ctx
                .flow_cache
                .return_flow_function(*call_site, method, state.n, r);
            for d5 in return_fn.compute_targets(&state.d2) {
                let Some(d5) = ctx.rewrite_generated(&state.d2, &d5) else {
                    continue;
                };
                ctx.propagate(scope, SolverState::at_return_site(caller_d1.clone(), r, d5, *call_site));
            }
        }
    }

    if ctx.follow_returns_past_seeds && state.d1 == D::zero() && incoming.is_empty() {
        let callers = icfg.callers_of(&method);
        if callers.is_empty() {
            // No callers at all: still invoke the return-flow function once
            // so side-effecting return-flow functions fire.
            let return_fn = ctx
                .flow_cache
                .return_flow_function(state.n, method, state.n, state.n);
            let _ = return_fn.compute_targets(&state.d2);
            return;
        }
        for call_site in callers {
            if ctx.executor.is_killed() {
                return;
            }
            for r in icfg.return_sites_of_call_at(&call_site) {
                let return_fn = ctx
                    .flow_cache
                    .return_flow_function(call_site, method, state.n, r);
                for d5 in return_fn.compute_targets(&state.d2) {
                    let Some(d5) = ctx.rewrite_generated(&state.d2, &d5) else {
                        continue;
                    };
                    ctx.propagate(scope, SolverState::unbalanced_return(r, d5, call_site));
                }
            }
        }
    }
}

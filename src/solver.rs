// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The solver driver.
//!
//! Grounded on `pta/context_sensitive.rs`'s
//! `pre_analysis`/`initialize`/`propagate`/`finalize` four-step driver
//! shape and its `log::info!`/`humantime::format_duration` logging
//! texture, generalized from a single-phase pointer analysis to the
//! two-phase (source-agnostic, then source-context-tagged) IFDS driver.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use log::{debug, info, trace};

use crate::config::SolverConfig;
use crate::domain::Fact;
use crate::error::{SolverError, SolverResult};
use crate::executor::WorklistExecutor;
use crate::flow_cache::FlowFunctionCache;
use crate::icfg::{IfdsTabulationProblem, MemoryManager, MethodId, NodeId};
use crate::listener::{SolverEvent, StatusListener};
use crate::path_edge::SolverState;
use crate::propagation::PropagationContext;
use crate::stats::SolverStats;
use crate::tables::{EndSummaryTable, IncomingTable, JumpFunctionTable};

/// Which of the two propagation passes a solver instance is running.
/// `FirstPhase` ignores source identity; `SecondPhase` re-propagates with
/// source contexts attached.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolverPhase {
    FirstPhase,
    SecondPhase,
}

pub struct IfdsSolver<N, D, M>
where
    N: NodeId,
    D: Fact,
    M: MethodId,
{
    problem: Arc<dyn IfdsTabulationProblem<N, D, M>>,
    config: SolverConfig,
    jump_functions: JumpFunctionTable<N, D>,
    end_summary: EndSummaryTable<M, N, D>,
    incoming: IncomingTable<M, N, D>,
    flow_cache: FlowFunctionCache<N, D, M>,
    executor: Arc<WorklistExecutor>,
    owns_executor: bool,
    memory_manager: Option<Arc<dyn MemoryManager<D>>>,
    listeners: Mutex<Vec<Arc<dyn StatusListener>>>,
    phase: Mutex<SolverPhase>,
    last_elapsed: Mutex<std::time::Duration>,
}

impl<N, D, M> IfdsSolver<N, D, M>
where
    N: NodeId,
    D: Fact,
    M: MethodId,
{
    pub fn new(
        problem: Arc<dyn IfdsTabulationProblem<N, D, M>>,
        config: SolverConfig,
    ) -> SolverResult<Self> {
        config.validate()?;
        let num_threads = config.resolved_num_threads();
        let (executor, owns_executor) = match &config.executor {
            Some(shared) => {
                info!(
                    "constructing solver '{}' on a shared worklist executor",
                    config.solver_id
                );
                (shared.clone(), false)
            }
            None => {
                info!(
                    "constructing solver '{}' with {} worker thread(s)",
                    config.solver_id, num_threads
                );
                (Arc::new(WorklistExecutor::new(num_threads)), true)
            }
        };
        Ok(IfdsSolver {
            flow_cache: FlowFunctionCache::new(problem.clone()),
            problem,
            executor,
            owns_executor,
            config,
            jump_functions: JumpFunctionTable::new(),
            end_summary: EndSummaryTable::new(),
            incoming: IncomingTable::new(),
            memory_manager: None,
            listeners: Mutex::new(Vec::new()),
            phase: Mutex::new(SolverPhase::FirstPhase),
            last_elapsed: Mutex::new(std::time::Duration::ZERO),
        })
    }

    pub fn with_memory_manager(mut self, mm: Arc<dyn MemoryManager<D>>) -> Self {
        self.memory_manager = Some(mm);
        self
    }

    pub fn set_solver_phase(&self, phase: SolverPhase) {
        *self.phase.lock().unwrap() = phase;
    }

    pub fn solver_phase(&self) -> SolverPhase {
        *self.phase.lock().unwrap()
    }

    pub fn add_status_listener(&self, listener: Arc<dyn StatusListener>) {
        self.listeners.lock().unwrap().push(listener);
    }

    fn notify(&self, event: SolverEvent) {
        for listener in self.listeners.lock().unwrap().iter() {
            listener.on_event(event.clone());
        }
    }

    pub fn is_killed(&self) -> bool {
        self.executor.is_killed()
    }

    pub fn is_terminated(&self) -> bool {
        self.executor.in_flight() == 0
    }

    pub fn termination_reason(&self) -> Option<String> {
        self.executor.termination_reason()
    }

    /// Forced termination: not an error, logged, tasks drain, partial
    /// results remain in the tables.
    pub fn force_terminate(&self, reason: impl Into<String>) {
        self.executor.force_terminate(reason);
    }

    /// Clears the kill flag so the solver can be reused for another phase.
    /// Accumulated tables are preserved.
    pub fn reset(&self) {
        self.executor.reset();
    }

    pub fn propagation_count(&self) -> usize {
        self.executor.propagation_count()
    }

    pub fn unbalanced_return_count(&self) -> usize {
        self.executor.unbalanced_return_count()
    }

    pub fn stats(&self) -> SolverStats {
        SolverStats {
            propagation_count: self.executor.propagation_count(),
            jump_function_table_size: self.jump_functions.len(),
            end_summary_table_size: self.end_summary.len(),
            incoming_table_size: self.incoming.len(),
            flow_function_cache_size: self.flow_cache.len(),
            elapsed: *self.last_elapsed.lock().unwrap(),
            peak_resident_kb: None,
        }
    }

    pub fn jump_functions(&self) -> &JumpFunctionTable<N, D> {
        &self.jump_functions
    }

    pub fn end_summary(&self) -> &EndSummaryTable<M, N, D> {
        &self.end_summary
    }

    pub fn incoming(&self) -> &IncomingTable<M, N, D> {
        &self.incoming
    }

    /// Runs worklist propagation to quiescence, then returns once every
    /// scheduled edge has been processed.
    pub fn solve(&self) -> SolverResult<()> {
        let started = Instant::now();
        let phase = self.solver_phase();
        trace!("solver '{}' solve() entered, phase {:?}", self.config.solver_id, phase);

        self.executor.reset();

        if phase == SolverPhase::SecondPhase {
            debug!(
                "solver '{}' purging phase-one end summaries before second phase",
                self.config.solver_id
            );
            self.end_summary.purge_source_tagged(|d| d.has_source_context());
        }

        self.notify(SolverEvent::Started {
            solver_id: self.config.solver_id.clone(),
            phase,
        });

        let ctx = PropagationContext {
            problem: self.problem.as_ref(),
            flow_cache: &self.flow_cache,
            jump_functions: &self.jump_functions,
            end_summary: &self.end_summary,
            incoming: &self.incoming,
            memory_manager: self.memory_manager.as_deref(),
            executor: &self.executor,
            max_callees_per_call_site: self.config.max_callees_per_call_site,
            max_abstraction_path_length: self.config.max_abstraction_path_length,
            follow_returns_past_seeds: self.config.follow_returns_past_seeds
                || self.problem.follow_returns_past_seeds(),
            phase,
        };

        self.executor.run_to_quiescence(|scope| {
            self.submit_seeds(scope, &ctx);
        });

        let elapsed = started.elapsed();
        *self.last_elapsed.lock().unwrap() = elapsed;
        info!(
            "solver '{}' reached quiescence after {} propagations in {}",
            self.config.solver_id,
            self.executor.propagation_count(),
            humantime::format_duration(elapsed)
        );

        self.notify(SolverEvent::Terminated {
            solver_id: self.config.solver_id.clone(),
            phase,
            killed: self.executor.is_killed(),
        });

        if self.owns_executor {
            debug!(
                "solver '{}' shutting down its privately owned worklist executor",
                self.config.solver_id
            );
            self.executor
                .shutdown(self.config.resolved_num_threads());
        }

        if let Some(msg) = self.executor.first_failure() {
            return Err(SolverError::flow_function_failure(msg));
        }

        Ok(())
    }

    /// Seed submission. Each seed `(n, d)` becomes `⟨Z, n, d⟩` with no
    /// related call site and `is_unbalanced_return = false`.
    fn submit_seeds<'scope>(&'scope self, scope: &rayon::Scope<'scope>, ctx: &'scope PropagationContext<'scope, N, D, M>) {
        let zero = self.problem.zero_value();
        for (n, facts) in self.problem.initial_seeds() {
            for d in facts {
                let state = SolverState::new(zero.clone(), n, d);
                ctx.propagate(scope, state);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    #[test]
    fn straight_line_propagates_every_node() {
        // S1: s -> n1 -> n2 -> e, identity flow, seed {s: {a}}.
        let problem = ChainIcfgProblem::straight_line();
        let solver = IfdsSolver::new(Arc::new(problem), SolverConfig::default()).unwrap();
        solver.solve().unwrap();
        assert_eq!(solver.jump_functions().len(), 4);
    }

    #[test]
    fn branch_join_deduplicates_into_a_single_edge() {
        // S2: s -> {b1, b2} -> j -> e.
        let problem = BranchJoinProblem::new();
        let solver = IfdsSolver::new(Arc::new(problem), SolverConfig::default()).unwrap();
        solver.solve().unwrap();
        let joins = solver
            .jump_functions()
            .len();
        // s, b1, b2, j, e: one edge each, j reached exactly once.
        assert_eq!(joins, 5);
    }

    #[test]
    fn simple_call_wires_incoming_and_end_summary() {
        // S3.
        let problem = SimpleCallProblem::new();
        let solver = IfdsSolver::new(Arc::new(problem), SolverConfig::default()).unwrap();
        solver.solve().unwrap();
        assert!(!solver.incoming().is_empty());
        assert!(!solver.end_summary().is_empty());
    }

    #[test]
    fn two_callers_share_a_single_summary() {
        // S4.
        let problem = TwoCallersProblem::new();
        let solver = IfdsSolver::new(Arc::new(problem), SolverConfig::default()).unwrap();
        solver.solve().unwrap();
        // The callee body's self-loop is inserted once; two incoming
        // entries point at the single end summary.
        assert_eq!(solver.end_summary().len(), 1);
    }

    #[test]
    fn callee_cap_skips_call_flow_but_not_call_to_return() {
        // S5.
        let problem = ManyCalleesProblem::new(100);
        let config = SolverConfig::default().with_max_callees_per_call_site(75);
        let solver = IfdsSolver::new(Arc::new(problem), config).unwrap();
        solver.solve().unwrap();
        assert!(solver.incoming().is_empty());
        assert!(solver
            .jump_functions()
            .contains(&SolverState::new(TestFact::zero(), 2, TestFact(7))));
    }

    #[test]
    fn unbalanced_return_reaches_every_caller() {
        // S6.
        let problem = UnbalancedReturnProblem::new();
        let config = SolverConfig::default().with_follow_returns_past_seeds(true);
        let solver = IfdsSolver::new(Arc::new(problem), config).unwrap();
        solver.solve().unwrap();
        assert!(solver.jump_functions().len() > 0);
        assert!(solver.unbalanced_return_count() > 0);
    }

    #[test]
    fn force_terminate_is_reported_and_is_not_an_error() {
        let problem = ChainIcfgProblem::straight_line();
        let solver = IfdsSolver::new(Arc::new(problem), SolverConfig::default()).unwrap();
        let result = solver.solve();
        assert!(result.is_ok());
        solver.force_terminate("test");
        assert!(solver.is_killed());
        assert_eq!(solver.termination_reason(), Some("test".to_string()));
    }
}

// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Programmatic solver configuration.
//!
//! There is no CLI, environment variable, or file-based configuration
//! surface here: an embedder builds a [`SolverConfig`] in process and
//! passes it to [`crate::solver::IfdsSolver::new`].

use std::sync::Arc;

use crate::error::{SolverError, SolverResult};
use crate::executor::WorklistExecutor;

/// Reserved for a future path-reconstruction subsystem. Carried for parity
/// with the tuning surface this lineage exposes elsewhere, but has no
/// effect on this core's propagation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PredecessorShorteningMode {
    #[default]
    Never,
    AlwaysShorten,
    ShortenIfEqual,
}

#[derive(Clone, Debug)]
pub struct SolverConfig {
    /// Call sites with more callees than this are skipped for call-flow and
    /// end-summary purposes; call-to-return flow is unaffected. Negative
    /// values disable the cap.
    pub max_callees_per_call_site: i64,
    /// Reserved, no effect in this core.
    pub max_join_point_abstractions: i64,
    /// Path edges whose fact exceeds this length are dropped before being
    /// scheduled. Negative values disable the bound.
    pub max_abstraction_path_length: i64,
    /// Reserved, no effect in this core.
    pub predecessor_shortening_mode: PredecessorShorteningMode,
    /// Diagnostic label distinguishing solver instances (e.g. forward vs.
    /// backward) in logs.
    pub solver_id: String,
    /// Whether returns should be propagated past a seed when no incoming
    /// caller context was recorded for the returning method.
    pub follow_returns_past_seeds: bool,
    /// Worker thread count for the worklist executor. `None` means
    /// `max(1, available_parallelism - 1)`.
    pub num_threads: Option<usize>,
    /// An externally supplied worklist executor to run on, letting an
    /// embedder share one thread pool across several concurrently running
    /// solver instances instead of each building its own. `None` means the
    /// solver builds and privately owns its pool.
    pub executor: Option<Arc<WorklistExecutor>>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            max_callees_per_call_site: 75,
            max_join_point_abstractions: -1,
            max_abstraction_path_length: 100,
            predecessor_shortening_mode: PredecessorShorteningMode::default(),
            solver_id: String::from("default"),
            follow_returns_past_seeds: false,
            num_threads: None,
            executor: None,
        }
    }
}

impl SolverConfig {
    pub fn with_max_callees_per_call_site(mut self, n: i64) -> Self {
        self.max_callees_per_call_site = n;
        self
    }

    pub fn with_max_abstraction_path_length(mut self, n: i64) -> Self {
        self.max_abstraction_path_length = n;
        self
    }

    pub fn with_predecessor_shortening_mode(mut self, mode: PredecessorShorteningMode) -> Self {
        self.predecessor_shortening_mode = mode;
        self
    }

    pub fn with_solver_id(mut self, id: impl Into<String>) -> Self {
        self.solver_id = id.into();
        self
    }

    pub fn with_follow_returns_past_seeds(mut self, follow: bool) -> Self {
        self.follow_returns_past_seeds = follow;
        self
    }

    pub fn with_num_threads(mut self, n: usize) -> Self {
        self.num_threads = Some(n);
        self
    }

    /// Supplies a thread pool for the solver to run on instead of building
    /// its own. The solver will not shut this pool down when it finishes
    /// solving, since other solvers may still depend on it.
    pub fn with_executor(mut self, executor: Arc<WorklistExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Resolves the configured (or default) worker thread count.
    pub fn resolved_num_threads(&self) -> usize {
        self.num_threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get().saturating_sub(1).max(1))
                .unwrap_or(1)
        })
    }

    /// Rejects configurations that cannot be acted on, e.g. an explicit
    /// zero thread count.
    pub fn validate(&self) -> SolverResult<()> {
        if let Some(n) = self.num_threads {
            if n == 0 {
                return Err(SolverError::configuration(
                    "num_threads must be at least 1",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_values() {
        let cfg = SolverConfig::default();
        assert_eq!(cfg.max_callees_per_call_site, 75);
        assert_eq!(cfg.max_abstraction_path_length, 100);
        assert!(!cfg.follow_returns_past_seeds);
    }

    #[test]
    fn zero_explicit_threads_is_a_configuration_error() {
        let cfg = SolverConfig::default().with_num_threads(0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn resolved_threads_defaults_to_at_least_one() {
        let cfg = SolverConfig::default();
        assert!(cfg.resolved_num_threads() >= 1);
    }
}

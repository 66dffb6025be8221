// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The bounded-thread-pool worklist executor.
//!
//! Built on `rayon::Scope`: a task that spawns further tasks does so
//! within the same scope, so "no queued or active tasks" is a structural
//! property of scope exit rather than a hand-rolled counter. The executor
//! still keeps an explicit atomic in-flight counter alongside this, since
//! tests and [`crate::stats::SolverStats`] want to observe "tasks
//! submitted" independent of pool internals, and because the kill flag
//! must be checked without borrowing the scope.
//!
//! Grounded on `util/mem_watcher.rs`'s `Arc<Mutex<_>>`-shared background
//! thread pattern for the counter/flag plumbing, and on the
//! `Arc<AtomicBool>` cooperative-termination design of the `Solver` type
//! in the wider example pack.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use log::{debug, error, warn};
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::SolverError;

/// Scheduled-task count between consecutive milestone log lines.
const PROPAGATION_MILESTONE: usize = 1000;

/// Cooperative-cancellation and quiescence-tracking state shared between
/// the driver and every in-flight task.
pub struct WorklistExecutor {
    pool: RwLock<ThreadPool>,
    killed: Arc<AtomicBool>,
    termination_reason: Mutex<Option<String>>,
    in_flight: Arc<AtomicUsize>,
    total_scheduled: AtomicUsize,
    unbalanced_returns: AtomicUsize,
    first_failure: Mutex<Option<SolverError>>,
}

impl WorklistExecutor {
    pub fn new(num_threads: usize) -> Self {
        WorklistExecutor {
            pool: RwLock::new(build_pool(num_threads)),
            killed: Arc::new(AtomicBool::new(false)),
            termination_reason: Mutex::new(None),
            in_flight: Arc::new(AtomicUsize::new(0)),
            total_scheduled: AtomicUsize::new(0),
            unbalanced_returns: AtomicUsize::new(0),
            first_failure: Mutex::new(None),
        }
    }

    /// Clears cancellation state so the executor can be reused across a
    /// phase transition.
    pub fn reset(&self) {
        self.killed.store(false, Ordering::SeqCst);
        *self.termination_reason.lock().unwrap() = None;
        *self.first_failure.lock().unwrap() = None;
    }

    /// Replaces the worker pool with a freshly built one of `num_threads`
    /// threads, dropping the old pool first. `rayon::ThreadPool`'s `Drop`
    /// blocks until every one of its worker threads has exited, so this is
    /// a genuine shutdown-and-rebuild rather than a cosmetic swap; it
    /// leaves the executor ready for another `run_to_quiescence` call.
    pub fn shutdown(&self, num_threads: usize) {
        let mut pool = self.pool.write().unwrap();
        *pool = build_pool(num_threads);
    }

    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    pub fn termination_reason(&self) -> Option<String> {
        self.termination_reason.lock().unwrap().clone()
    }

    pub fn force_terminate(&self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!("worklist executor force-terminated: {reason}");
        self.killed.store(true, Ordering::SeqCst);
        *self.termination_reason.lock().unwrap() = Some(reason);
    }

    pub fn propagation_count(&self) -> usize {
        self.total_scheduled.load(Ordering::SeqCst)
    }

    /// The first panic captured from a task, if any. Once set it is never
    /// overwritten: the first failure wins.
    pub fn first_failure(&self) -> Option<String> {
        self.first_failure
            .lock()
            .unwrap()
            .as_ref()
            .map(|e| e.to_string())
    }

    /// Number of propagations recorded as unbalanced returns so far.
    pub fn unbalanced_return_count(&self) -> usize {
        self.unbalanced_returns.load(Ordering::SeqCst)
    }

    pub(crate) fn record_unbalanced_return(&self) {
        self.unbalanced_returns.fetch_add(1, Ordering::SeqCst);
    }

    /// Runs `body`, which is expected to submit the initial seed tasks via
    /// [`WorklistExecutor::submit`], and blocks until the scope -- and
    /// therefore every task it (transitively) spawned -- has drained. This
    /// is quiescence detection by construction: `rayon::scope` does not
    /// return until all spawned work, including work spawned by other
    /// spawned work, has finished.
    pub fn run_to_quiescence<'scope, F>(&'scope self, body: F)
    where
        F: FnOnce(&rayon::Scope<'scope>) + Send + 'scope,
    {
        let pool = self.pool.read().unwrap();
        pool.scope(body);
    }

    /// Schedules `task` onto the pool within `scope`. A no-op if the
    /// executor has been killed: new edges stop being scheduled the moment
    /// termination is requested, though tasks already in flight still run
    /// to completion (or their own next kill-flag check).
    pub fn submit<'scope, F>(&'scope self, scope: &rayon::Scope<'scope>, task: F)
    where
        F: FnOnce() + Send + 'scope,
    {
        if self.is_killed() {
            return;
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let scheduled = self.total_scheduled.fetch_add(1, Ordering::SeqCst) + 1;
        if scheduled % PROPAGATION_MILESTONE == 0 {
            debug!("worklist executor has scheduled {scheduled} propagations");
        }
        let in_flight = self.in_flight.clone();
        let killed = self.killed.clone();
        let first_failure = &self.first_failure;
        scope.spawn(move |_| {
            if !killed.load(Ordering::SeqCst) {
                let result = panic::catch_unwind(AssertUnwindSafe(task));
                if let Err(payload) = result {
                    let msg = panic_message(&payload);
                    error!("flow function panicked: {msg}");
                    let mut slot = first_failure.lock().unwrap();
                    if slot.is_none() {
                        *slot = Some(SolverError::flow_function_failure(msg));
                    }
                }
            }
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

fn build_pool(num_threads: usize) -> ThreadPool {
    ThreadPoolBuilder::new()
        .num_threads(num_threads.max(1))
        .build()
        .expect("failed to build worklist thread pool")
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "flow function panicked with a non-string payload".to_string()
    }
}

impl std::fmt::Debug for WorklistExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorklistExecutor")
            .field("in_flight", &self.in_flight())
            .field("propagation_count", &self.propagation_count())
            .field("killed", &self.is_killed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn quiescence_waits_for_transitively_spawned_tasks() {
        let executor = WorklistExecutor::new(2);
        let counter = Arc::new(AtomicU32::new(0));
        executor.run_to_quiescence(|scope| {
            let counter = counter.clone();
            executor.submit(scope, move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        });
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(executor.in_flight(), 0);
        debug!("propagation count after run: {}", executor.propagation_count());
    }

    #[test]
    fn force_terminate_sets_kill_flag_and_reason() {
        let executor = WorklistExecutor::new(1);
        executor.force_terminate("memory limit exceeded");
        assert!(executor.is_killed());
        assert_eq!(
            executor.termination_reason(),
            Some("memory limit exceeded".to_string())
        );
    }

    #[test]
    fn killed_executor_drops_new_submissions() {
        let executor = WorklistExecutor::new(1);
        executor.force_terminate("stop");
        let ran = Arc::new(AtomicBool::new(false));
        executor.run_to_quiescence(|scope| {
            let ran = ran.clone();
            executor.submit(scope, move || {
                ran.store(true, Ordering::SeqCst);
            });
        });
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn first_panic_wins_under_concurrent_failures() {
        let executor = WorklistExecutor::new(4);
        executor.run_to_quiescence(|scope| {
            for i in 0..8 {
                executor.submit(scope, move || {
                    panic!("failure {i}");
                });
            }
        });
        assert!(executor.first_failure().is_some());
    }
}

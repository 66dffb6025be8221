// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The solver's error hierarchy.

use thiserror::Error;

/// Result alias used throughout the solver.
pub type SolverResult<T> = Result<T, SolverError>;

/// Everything that can keep a solver from producing a complete fixed point.
#[derive(Error, Debug)]
pub enum SolverError {
    /// The supplied problem or [`crate::config::SolverConfig`] is invalid.
    /// Fatal: raised at construction, before any propagation has run.
    #[error("invalid solver configuration: {0}")]
    Configuration(String),

    /// A flow-function callback panicked while a task was being processed.
    /// The first one observed wins; later ones are logged and discarded.
    #[error("flow function failed: {0}")]
    FlowFunctionFailure(String),

    /// The worklist executor was interrupted while waiting for quiescence.
    /// Logged and swallowed at the driver; not normally returned to callers.
    #[error("solver wait was interrupted: {0}")]
    Interrupted(String),
}

impl SolverError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        SolverError::Configuration(msg.into())
    }

    pub fn flow_function_failure(msg: impl Into<String>) -> Self {
        SolverError::FlowFunctionFailure(msg.into())
    }
}

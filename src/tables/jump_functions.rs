// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The jump-function table: the set of path edges already propagated for
//! one solver direction (I1).

use std::fmt::Debug;
use std::hash::Hash;

use dashmap::DashSet;

use crate::icfg::NodeId;
use crate::path_edge::{PathEdgeKey, SolverState};

pub struct JumpFunctionTable<N, D> {
    edges: DashSet<PathEdgeKey<N, D>>,
}

impl<N, D> Default for JumpFunctionTable<N, D>
where
    N: NodeId,
    D: Clone + Eq + Hash + Send + Sync + Debug,
{
    fn default() -> Self {
        JumpFunctionTable {
            edges: DashSet::new(),
        }
    }
}

impl<N, D> JumpFunctionTable<N, D>
where
    N: NodeId,
    D: Clone + Eq + Hash + Send + Sync + Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts the path edge carried by `state` if it is not already
    /// present. Returns `true` if this was the first insertion -- the
    /// caller should enqueue a processing task exactly when this is `true`
    /// (I1).
    pub fn insert_if_absent(&self, state: &SolverState<N, D>) -> bool {
        self.edges.insert(PathEdgeKey::from(state))
    }

    pub fn contains(&self, state: &SolverState<N, D>) -> bool {
        self.edges.contains(&PathEdgeKey::from(state))
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_idempotent() {
        let table: JumpFunctionTable<u32, u32> = JumpFunctionTable::new();
        let s = SolverState::new(0u32, 1u32, 2u32);
        assert!(table.insert_if_absent(&s));
        assert!(!table.insert_if_absent(&s));
        assert_eq!(table.len(), 1);
    }
}

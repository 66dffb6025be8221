// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The end-summary table: `(M, d1) => {(exitNode, d2), ...}` (I3).

use std::fmt::Debug;
use std::hash::Hash;

use dashmap::{DashMap, DashSet};

use crate::icfg::{MethodId, NodeId};

pub struct EndSummaryTable<M, N, D> {
    map: DashMap<(M, D), DashSet<(N, D)>>,
}

impl<M, N, D> Default for EndSummaryTable<M, N, D>
where
    M: MethodId,
    N: NodeId,
    D: Clone + Eq + Hash + Send + Sync + Debug,
{
    fn default() -> Self {
        EndSummaryTable {
            map: DashMap::new(),
        }
    }
}

impl<M, N, D> EndSummaryTable<M, N, D>
where
    M: MethodId,
    N: NodeId,
    D: Clone + Eq + Hash + Send + Sync + Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `(exit_node, d2)` as a discovered exit of `method` reached
    /// with entry fact `d1`. Returns `true` if this is a new entry.
    pub fn add(&self, method: M, d1: D, exit_node: N, d2: D) -> bool {
        let set = self
            .map
            .entry((method, d1))
            .or_insert_with(DashSet::new);
        set.insert((exit_node, d2))
    }

    /// All `(exitNode, d2)` pairs recorded for `(method, d1)`, snapshotted
    /// at call time (later `add`s are not reflected).
    pub fn get(&self, method: M, d1: &D) -> Vec<(N, D)> {
        self.map
            .get(&(method, d1.clone()))
            .map(|set| set.iter().map(|e| e.clone()).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.map.iter().map(|e| e.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Removes every `(exitNode, d2)` entry whose `d2` carries a non-null
    /// source context, used by the driver before the second phase.
    /// Phase-one entries were computed ignoring source identity and must
    /// be recomputed once sources are attached.
    pub fn purge_source_tagged(&self, has_source_context: impl Fn(&D) -> bool) {
        for entry in self.map.iter() {
            entry.value().retain(|(_, d2)| !has_source_context(d2));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_idempotent_and_queryable() {
        let table: EndSummaryTable<u32, u32, u32> = EndSummaryTable::new();
        assert!(table.add(1, 10, 2, 20));
        assert!(!table.add(1, 10, 2, 20));
        assert_eq!(table.get(1, &10), vec![(2, 20)]);
        assert_eq!(table.len(), 1);
    }
}

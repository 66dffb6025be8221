// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The incoming-call table: `(M, d3) => callSite => callerEntry => d2` (I2).

use std::fmt::Debug;
use std::hash::Hash;

use dashmap::DashMap;

use crate::icfg::{MethodId, NodeId};

/// Result of [`IncomingTable::add`]: which parts of the insert, if any,
/// were new.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IncomingInsert {
    /// This exact `(callSite, callerEntry) -> d2` mapping is new.
    pub new_incoming: bool,
    /// `(M, d3)` had never been seen as a callee entry before this call,
    /// regardless of which caller introduced it.
    pub new_callee: bool,
}

type CallSiteMap<N, D> = DashMap<N, DashMap<D, D>>;

pub struct IncomingTable<M, N, D> {
    map: DashMap<(M, D), CallSiteMap<N, D>>,
}

impl<M, N, D> Default for IncomingTable<M, N, D>
where
    M: MethodId,
    N: NodeId,
    D: Clone + Eq + Hash + Send + Sync + Debug,
{
    fn default() -> Self {
        IncomingTable {
            map: DashMap::new(),
        }
    }
}

impl<M, N, D> IncomingTable<M, N, D>
where
    M: MethodId,
    N: NodeId,
    D: Clone + Eq + Hash + Send + Sync + Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `call_site`, entered with caller-entry fact
    /// `caller_d1`, produced `d3` as the callee-entry fact for `callee`.
    pub fn add(
        &self,
        callee: M,
        d3: D,
        call_site: N,
        caller_d1: D,
        call_site_fact: D,
    ) -> IncomingInsert {
        let mut result = IncomingInsert::default();
        let new_callee = !self.map.contains_key(&(callee, d3.clone()));
        result.new_callee = new_callee;
        let callsite_map = self.map.entry((callee, d3)).or_insert_with(DashMap::new);
        let caller_entries = callsite_map.entry(call_site).or_insert_with(DashMap::new);
        result.new_incoming = caller_entries.insert(caller_d1, call_site_fact).is_none();
        result
    }

    /// All `(callSite, callerEntry, callSiteFact)` triples recorded for
    /// `(callee, d3)`, snapshotted at call time.
    pub fn get(&self, callee: M, d3: &D) -> Vec<(N, D, D)> {
        let Some(callsite_map) = self.map.get(&(callee, d3.clone())) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for entry in callsite_map.iter() {
            let call_site = *entry.key();
            for caller_entry in entry.value().iter() {
                out.push((call_site, caller_entry.key().clone(), caller_entry.value().clone()));
            }
        }
        out
    }

    pub fn is_empty_for(&self, callee: M, d3: &D) -> bool {
        match self.map.get(&(callee, d3.clone())) {
            Some(callsite_map) => callsite_map.is_empty(),
            None => true,
        }
    }

    pub fn len(&self) -> usize {
        self.map
            .iter()
            .map(|e| e.value().iter().map(|cs| cs.value().len()).sum::<usize>())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_insertion_sets_both_new_bits() {
        let table: IncomingTable<u32, u32, u32> = IncomingTable::new();
        let r = table.add(1, 100, 2, 10, 20);
        assert!(r.new_incoming);
        assert!(r.new_callee);
    }

    #[test]
    fn second_distinct_caller_sets_only_new_incoming() {
        let table: IncomingTable<u32, u32, u32> = IncomingTable::new();
        table.add(1, 100, 2, 10, 20);
        let r = table.add(1, 100, 3, 11, 21);
        assert!(r.new_incoming);
        assert!(!r.new_callee);
    }

    #[test]
    fn repeating_the_same_triple_is_not_new() {
        let table: IncomingTable<u32, u32, u32> = IncomingTable::new();
        table.add(1, 100, 2, 10, 20);
        let r = table.add(1, 100, 2, 10, 20);
        assert!(!r.new_incoming);
        assert!(!r.new_callee);
    }
}

// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Flow-function memoization.
//!
//! Wraps a [`FlowFunctions`] provider so repeated queries for the same
//! `(node, node)` / `(node, method)` / ... key return the same `Arc`
//! rather than re-deriving it from the provider. The cache has no
//! soft/weak-reference GC hook (none exists in Rust the way one does in a
//! garbage-collected host), so shedding is an explicit, embedder-triggered
//! operation; a shed entry is simply recomputed from the provider on its
//! next miss, so shedding never changes results, only recomputation cost.

use dashmap::DashMap;

use crate::domain::Fact;
use crate::icfg::{FlowFunction, IfdsTabulationProblem, MethodId, NodeId};
use std::sync::Arc;

#[derive(Clone, PartialEq, Eq, Hash)]
enum CacheKey<N, M> {
    Normal(N, N),
    Call(N, M),
    Return(N, M, N, N),
    CallToReturn(N, N),
}

pub struct FlowFunctionCache<N, D, M> {
    problem: Arc<dyn IfdsTabulationProblem<N, D, M>>,
    cache: DashMap<CacheKey<N, M>, Arc<dyn FlowFunction<D>>>,
}

impl<N, D, M> FlowFunctionCache<N, D, M>
where
    N: NodeId,
    D: Fact,
    M: MethodId,
{
    pub fn new(problem: Arc<dyn IfdsTabulationProblem<N, D, M>>) -> Self {
        FlowFunctionCache {
            problem,
            cache: DashMap::new(),
        }
    }

    pub fn normal_flow_function(&self, curr: N, succ: N) -> Arc<dyn FlowFunction<D>> {
        let key = CacheKey::Normal(curr, succ);
        self.cache
            .entry(key)
            .or_insert_with(|| {
                self.problem
                    .flow_functions()
                    .get_normal_flow_function(&curr, &succ)
            })
            .clone()
    }

    pub fn call_flow_function(&self, call_site: N, callee: M) -> Arc<dyn FlowFunction<D>> {
        let key = CacheKey::Call(call_site, callee);
        self.cache
            .entry(key)
            .or_insert_with(|| {
                self.problem
                    .flow_functions()
                    .get_call_flow_function(&call_site, &callee)
            })
            .clone()
    }

    pub fn return_flow_function(
        &self,
        call_site: N,
        callee: M,
        exit_stmt: N,
        return_site: N,
    ) -> Arc<dyn FlowFunction<D>> {
        let key = CacheKey::Return(call_site, callee, exit_stmt, return_site);
        self.cache
            .entry(key)
            .or_insert_with(|| {
                self.problem.flow_functions().get_return_flow_function(
                    &call_site,
                    &callee,
                    &exit_stmt,
                    &return_site,
                )
            })
            .clone()
    }

    pub fn call_to_return_flow_function(
        &self,
        call_site: N,
        return_site: N,
    ) -> Arc<dyn FlowFunction<D>> {
        let key = CacheKey::CallToReturn(call_site, return_site);
        self.cache
            .entry(key)
            .or_insert_with(|| {
                self.problem
                    .flow_functions()
                    .get_call_to_return_flow_function(&call_site, &return_site)
            })
            .clone()
    }

    /// Clears every memoized entry. Safe to call at any time; the next
    /// query for a shed key simply recomputes it from the provider.
    pub fn shed(&self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icfg::{FlowFunctions, Icfg, IdentityFlowFunction};
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Eq, PartialEq, Hash, Debug)]
    struct TestFact(u32);

    impl Fact for TestFact {
        fn zero() -> Self {
            TestFact(0)
        }
    }

    struct CountingProvider {
        calls: AtomicUsize,
    }

    impl FlowFunctions<u32, TestFact, u32> for CountingProvider {
        fn get_normal_flow_function(&self, _: &u32, _: &u32) -> Arc<dyn FlowFunction<TestFact>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Arc::new(IdentityFlowFunction)
        }
        fn get_call_flow_function(&self, _: &u32, _: &u32) -> Arc<dyn FlowFunction<TestFact>> {
            Arc::new(IdentityFlowFunction)
        }
        fn get_return_flow_function(
            &self,
            _: &u32,
            _: &u32,
            _: &u32,
            _: &u32,
        ) -> Arc<dyn FlowFunction<TestFact>> {
            Arc::new(IdentityFlowFunction)
        }
        fn get_call_to_return_flow_function(
            &self,
            _: &u32,
            _: &u32,
        ) -> Arc<dyn FlowFunction<TestFact>> {
            Arc::new(IdentityFlowFunction)
        }
    }

    struct EmptyIcfg;

    impl Icfg<u32, u32> for EmptyIcfg {
        fn succs_of(&self, _: &u32) -> Vec<u32> {
            Vec::new()
        }
        fn is_call_stmt(&self, _: &u32) -> bool {
            false
        }
        fn is_exit_stmt(&self, _: &u32) -> bool {
            false
        }
        fn callees_of_call_at(&self, _: &u32) -> Vec<u32> {
            Vec::new()
        }
        fn return_sites_of_call_at(&self, _: &u32) -> Vec<u32> {
            Vec::new()
        }
        fn start_points_of(&self, _: &u32) -> Vec<u32> {
            Vec::new()
        }
        fn callers_of(&self, _: &u32) -> Vec<u32> {
            Vec::new()
        }
        fn method_of(&self, _: &u32) -> u32 {
            0
        }
    }

    struct TestProblem {
        icfg: EmptyIcfg,
        flow_functions: CountingProvider,
    }

    impl IfdsTabulationProblem<u32, TestFact, u32> for TestProblem {
        fn icfg(&self) -> &dyn Icfg<u32, u32> {
            &self.icfg
        }
        fn flow_functions(&self) -> &dyn FlowFunctions<u32, TestFact, u32> {
            &self.flow_functions
        }
        fn initial_seeds(&self) -> HashMap<u32, HashSet<TestFact>> {
            HashMap::new()
        }
    }

    fn test_problem() -> Arc<dyn IfdsTabulationProblem<u32, TestFact, u32>> {
        Arc::new(TestProblem {
            icfg: EmptyIcfg,
            flow_functions: CountingProvider {
                calls: AtomicUsize::new(0),
            },
        })
    }

    #[test]
    fn repeated_queries_hit_the_provider_once() {
        let cache = FlowFunctionCache::new(test_problem());
        let _ = cache.normal_flow_function(1, 2);
        let _ = cache.normal_flow_function(1, 2);
        let _ = cache.normal_flow_function(1, 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn shed_clears_without_changing_results() {
        let cache = FlowFunctionCache::new(test_problem());
        let f1 = cache.normal_flow_function(1, 2);
        cache.shed();
        assert!(cache.is_empty());
        let f2 = cache.normal_flow_function(1, 2);
        let d = TestFact(7);
        assert_eq!(f1.compute_targets(&d), f2.compute_targets(&d));
    }
}

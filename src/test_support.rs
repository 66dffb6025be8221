// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! A small concrete ICFG/problem built over `petgraph::Graph`, used to
//! build the S1-S6 scenario graphs in the solver's own tests and in
//! `tests/scenarios.rs`. Grounded on rupta's own use of `petgraph` for
//! `graph/call_graph.rs`; this crate carries no comparable production
//! ICFG implementation of its own since building one is left to the
//! embedding application.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use petgraph::graph::{DiGraph, NodeIndex};

use crate::domain::Fact;
use crate::icfg::{FlowFunction, FlowFunctions, IdentityFlowFunction, IfdsTabulationProblem, Icfg};

/// The sole fact used by the scenario tests: an opaque tag. `0` plays the
/// role of the zero fact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TestFact(pub u32);

impl Fact for TestFact {
    fn zero() -> Self {
        TestFact(0)
    }
}

/// `n` / `m` are both plain `u32`s in these scenarios; a call-site node
/// and a method id never need to be distinguished by type since the
/// graph is built by hand.
#[derive(Default)]
pub struct GraphIcfg {
    graph: DiGraph<u32, ()>,
    index_of: HashMap<u32, NodeIndex>,
    call_stmts: HashSet<u32>,
    exit_stmts: HashSet<u32>,
    callees: HashMap<u32, Vec<u32>>,
    return_sites: HashMap<u32, Vec<u32>>,
    start_points: HashMap<u32, Vec<u32>>,
    callers: HashMap<u32, Vec<u32>>,
    method_of: HashMap<u32, u32>,
}

impl GraphIcfg {
    pub fn new() -> Self {
        Self::default()
    }

    fn node_index(&mut self, n: u32) -> NodeIndex {
        *self
            .index_of
            .entry(n)
            .or_insert_with(|| self.graph.add_node(n))
    }

    pub fn edge(&mut self, from: u32, to: u32) -> &mut Self {
        let a = self.node_index(from);
        let b = self.node_index(to);
        self.graph.add_edge(a, b, ());
        self
    }

    pub fn node(&mut self, n: u32) -> &mut Self {
        self.node_index(n);
        self
    }

    pub fn mark_call(&mut self, call_site: u32, callees: Vec<u32>, return_sites: Vec<u32>) -> &mut Self {
        self.node(call_site);
        self.call_stmts.insert(call_site);
        for callee in &callees {
            self.callers.entry(*callee).or_default().push(call_site);
        }
        self.callees.insert(call_site, callees);
        self.return_sites.insert(call_site, return_sites);
        self
    }

    pub fn mark_exit(&mut self, n: u32, method: u32) -> &mut Self {
        self.node(n);
        self.exit_stmts.insert(n);
        self.method_of.insert(n, method);
        self
    }

    pub fn set_method_of(&mut self, n: u32, method: u32) -> &mut Self {
        self.method_of.insert(n, method);
        self
    }

    pub fn set_start_points(&mut self, method: u32, starts: Vec<u32>) -> &mut Self {
        self.start_points.insert(method, starts);
        self
    }
}

impl Icfg<u32, u32> for GraphIcfg {
    fn succs_of(&self, n: &u32) -> Vec<u32> {
        let Some(idx) = self.index_of.get(n) else {
            return Vec::new();
        };
        self.graph
            .neighbors(*idx)
            .map(|neighbor| self.graph[neighbor])
            .collect()
    }

    fn is_call_stmt(&self, n: &u32) -> bool {
        self.call_stmts.contains(n)
    }

    fn is_exit_stmt(&self, n: &u32) -> bool {
        self.exit_stmts.contains(n)
    }

    fn callees_of_call_at(&self, n: &u32) -> Vec<u32> {
        self.callees.get(n).cloned().unwrap_or_default()
    }

    fn return_sites_of_call_at(&self, n: &u32) -> Vec<u32> {
        self.return_sites.get(n).cloned().unwrap_or_default()
    }

    fn start_points_of(&self, m: &u32) -> Vec<u32> {
        self.start_points.get(m).cloned().unwrap_or_default()
    }

    fn callers_of(&self, m: &u32) -> Vec<u32> {
        self.callers.get(m).cloned().unwrap_or_default()
    }

    fn method_of(&self, n: &u32) -> u32 {
        *self.method_of.get(n).unwrap_or(&0)
    }
}

/// Identity everywhere except call-to-return, which is empty: the
/// scenarios that have calls always reach their return sites through
/// `applyEndSummaryOnCall` instead, matching S3's "call-to-return empty".
struct EmptyFlowFunction;

impl<D: Fact> FlowFunction<D> for EmptyFlowFunction {
    fn compute_targets(&self, _fact: &D) -> Vec<D> {
        Vec::new()
    }
}

pub struct IdentityFlowFunctions;

impl FlowFunctions<u32, TestFact, u32> for IdentityFlowFunctions {
    fn get_normal_flow_function(&self, _curr: &u32, _succ: &u32) -> Arc<dyn FlowFunction<TestFact>> {
        Arc::new(IdentityFlowFunction)
    }

    fn get_call_flow_function(&self, _call_site: &u32, _callee: &u32) -> Arc<dyn FlowFunction<TestFact>> {
        Arc::new(IdentityFlowFunction)
    }

    fn get_return_flow_function(
        &self,
        _call_site: &u32,
        _callee: &u32,
        _exit_stmt: &u32,
        _return_site: &u32,
    ) -> Arc<dyn FlowFunction<TestFact>> {
        Arc::new(IdentityFlowFunction)
    }

    fn get_call_to_return_flow_function(
        &self,
        _call_site: &u32,
        _return_site: &u32,
    ) -> Arc<dyn FlowFunction<TestFact>> {
        Arc::new(EmptyFlowFunction)
    }
}

/// Identity for every flow-function kind, including call-to-return. Used by
/// scenarios that need to observe a call-to-return edge actually firing
/// (e.g. S5, which asserts on the return-site edge left behind when the
/// callee cap skips call-flow entirely).
pub struct IdentityEverywhereFlowFunctions;

impl FlowFunctions<u32, TestFact, u32> for IdentityEverywhereFlowFunctions {
    fn get_normal_flow_function(&self, _curr: &u32, _succ: &u32) -> Arc<dyn FlowFunction<TestFact>> {
        Arc::new(IdentityFlowFunction)
    }

    fn get_call_flow_function(&self, _call_site: &u32, _callee: &u32) -> Arc<dyn FlowFunction<TestFact>> {
        Arc::new(IdentityFlowFunction)
    }

    fn get_return_flow_function(
        &self,
        _call_site: &u32,
        _callee: &u32,
        _exit_stmt: &u32,
        _return_site: &u32,
    ) -> Arc<dyn FlowFunction<TestFact>> {
        Arc::new(IdentityFlowFunction)
    }

    fn get_call_to_return_flow_function(
        &self,
        _call_site: &u32,
        _return_site: &u32,
    ) -> Arc<dyn FlowFunction<TestFact>> {
        Arc::new(IdentityFlowFunction)
    }
}

pub struct GraphProblem {
    pub icfg: GraphIcfg,
    pub flow_functions: Arc<dyn FlowFunctions<u32, TestFact, u32>>,
    pub seeds: HashMap<u32, HashSet<TestFact>>,
    pub follow_returns_past_seeds: bool,
}

impl IfdsTabulationProblem<u32, TestFact, u32> for GraphProblem {
    fn icfg(&self) -> &dyn Icfg<u32, u32> {
        &self.icfg
    }

    fn flow_functions(&self) -> &dyn FlowFunctions<u32, TestFact, u32> {
        self.flow_functions.as_ref()
    }

    fn initial_seeds(&self) -> HashMap<u32, HashSet<TestFact>> {
        self.seeds.clone()
    }

    fn follow_returns_past_seeds(&self) -> bool {
        self.follow_returns_past_seeds
    }
}

fn seed(n: u32, fact: u32) -> HashMap<u32, HashSet<TestFact>> {
    let mut seeds = HashMap::new();
    let mut set = HashSet::new();
    set.insert(TestFact(fact));
    seeds.insert(n, set);
    seeds
}

pub type ChainIcfgProblem = GraphProblem;

impl ChainIcfgProblem {
    /// S1: `s -> n1 -> n2 -> e`, identity flow, seed `{s: {a}}`.
    pub fn straight_line() -> Self {
        let mut icfg = GraphIcfg::new();
        icfg.edge(1, 2).edge(2, 3).edge(3, 4);
        GraphProblem {
            icfg,
            flow_functions: Arc::new(IdentityFlowFunctions),
            seeds: seed(1, 7),
            follow_returns_past_seeds: false,
        }
    }
}

pub type BranchJoinProblem = GraphProblem;

impl BranchJoinProblem {
    /// S2: `s -> {b1, b2} -> j -> e`.
    pub fn new() -> Self {
        let mut icfg = GraphIcfg::new();
        icfg.edge(1, 2).edge(1, 3).edge(2, 4).edge(3, 4).edge(4, 5);
        GraphProblem {
            icfg,
            flow_functions: Arc::new(IdentityFlowFunctions),
            seeds: seed(1, 7),
            follow_returns_past_seeds: false,
        }
    }
}

pub type SimpleCallProblem = GraphProblem;

impl SimpleCallProblem {
    /// S3: caller `c=1` calls method `100` (entry `sp=10`, exit `ep=11`);
    /// return site `r=2`.
    pub fn new() -> Self {
        let mut icfg = GraphIcfg::new();
        icfg.mark_call(1, vec![100], vec![2]);
        icfg.node(2);
        icfg.edge(10, 11);
        icfg.set_method_of(10, 100);
        icfg.mark_exit(11, 100);
        icfg.set_start_points(100, vec![10]);
        GraphProblem {
            icfg,
            flow_functions: Arc::new(IdentityFlowFunctions),
            seeds: seed(1, 7),
            follow_returns_past_seeds: false,
        }
    }
}

pub type TwoCallersProblem = GraphProblem;

impl TwoCallersProblem {
    /// S4: callers `c1=1` (return site `2`) and `c2=3` (return site `4`)
    /// both call method `100`.
    pub fn new() -> Self {
        let mut icfg = GraphIcfg::new();
        icfg.mark_call(1, vec![100], vec![2]);
        icfg.mark_call(3, vec![100], vec![4]);
        icfg.node(2);
        icfg.node(4);
        icfg.edge(10, 11);
        icfg.set_method_of(10, 100);
        icfg.mark_exit(11, 100);
        icfg.set_start_points(100, vec![10]);
        let mut seeds = seed(1, 7);
        seeds.insert(3, std::iter::once(TestFact(7)).collect());
        GraphProblem {
            icfg,
            flow_functions: Arc::new(IdentityFlowFunctions),
            seeds,
            follow_returns_past_seeds: false,
        }
    }
}

pub type ManyCalleesProblem = GraphProblem;

impl ManyCalleesProblem {
    /// S5: call site `1` with `count` distinct callees, cap default 75.
    pub fn new(count: u32) -> Self {
        let mut icfg = GraphIcfg::new();
        let callees: Vec<u32> = (1000..1000 + count).collect();
        icfg.mark_call(1, callees, vec![2]);
        icfg.node(2);
        GraphProblem {
            icfg,
            flow_functions: Arc::new(IdentityEverywhereFlowFunctions),
            seeds: seed(1, 7),
            follow_returns_past_seeds: false,
        }
    }
}

pub type UnbalancedReturnProblem = GraphProblem;

impl UnbalancedReturnProblem {
    /// S6: method `100` (`sp=10 -> ep=11`) is seeded directly, with no
    /// caller ever having recorded an incoming entry. Caller `c=1` (return
    /// site `2`) exists in the call graph so the unbalanced return has
    /// somewhere to land.
    pub fn new() -> Self {
        let mut icfg = GraphIcfg::new();
        icfg.edge(10, 11);
        icfg.set_method_of(10, 100);
        icfg.mark_exit(11, 100);
        icfg.set_start_points(100, vec![10]);
        icfg.mark_call(1, vec![100], vec![2]);
        icfg.node(2);
        GraphProblem {
            icfg,
            flow_functions: Arc::new(IdentityFlowFunctions),
            seeds: seed(10, 7),
            follow_returns_past_seeds: true,
        }
    }
}

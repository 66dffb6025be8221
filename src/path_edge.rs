// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The path edge `⟨d1, n, d2⟩`, the fundamental unit of propagation.

use std::fmt::Debug;
use std::hash::Hash;

use crate::domain::Fact;
use crate::icfg::NodeId;

/// `⟨d1, n, d2⟩`: fact `d2` holds at `n` along a path that entered the
/// containing method with fact `d1`. `related_call_site` and
/// `is_unbalanced_return` are opaque diagnostic passengers carried
/// alongside the edge rather than part of its identity: they are never
/// consulted for de-duplication (see [`PathEdgeKey`]), only read back by an
/// embedder or test that wants to know how an edge was produced.
#[derive(Clone, Debug)]
pub struct SolverState<N, D> {
    pub d1: D,
    pub n: N,
    pub d2: D,
    /// The call site this edge is a return from, if any.
    pub related_call_site: Option<N>,
    /// Set when this edge is a return propagated past a method with no
    /// recorded caller context, rather than a balanced call/return pair.
    pub is_unbalanced_return: bool,
}

impl<N: NodeId, D: Fact> SolverState<N, D> {
    pub fn new(d1: D, n: N, d2: D) -> Self {
        SolverState {
            d1,
            n,
            d2,
            related_call_site: None,
            is_unbalanced_return: false,
        }
    }

    /// A return edge reached through a call/return pair at `call_site`.
    pub fn at_return_site(d1: D, n: N, d2: D, call_site: N) -> Self {
        SolverState {
            d1,
            n,
            d2,
            related_call_site: Some(call_site),
            is_unbalanced_return: false,
        }
    }

    /// A return edge propagated to `call_site` despite no caller context
    /// having been recorded for the returning method.
    pub fn unbalanced_return(n: N, d2: D, call_site: N) -> Self {
        SolverState {
            d1: D::zero(),
            n,
            d2,
            related_call_site: Some(call_site),
            is_unbalanced_return: true,
        }
    }

    /// `s.derive(m, d3) = ⟨d1, m, d3⟩`: preserves the method-entry fact and
    /// the call-site/unbalanced-return passengers while moving to a new
    /// node and fact.
    pub fn derive(&self, m: N, d3: D) -> Self {
        SolverState {
            d1: self.d1.clone(),
            n: m,
            d2: d3,
            related_call_site: self.related_call_site,
            is_unbalanced_return: self.is_unbalanced_return,
        }
    }
}

/// The key half of a path edge, used for de-duplication in the
/// jump-function table. The value half is always `d2` again (a path edge
/// maps to itself), so only the key is stored.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PathEdgeKey<N, D> {
    pub d1: D,
    pub n: N,
    pub d2: D,
}

impl<N, D> From<&SolverState<N, D>> for PathEdgeKey<N, D>
where
    N: NodeId,
    D: Clone + Eq + Hash + Send + Sync + Debug,
{
    fn from(s: &SolverState<N, D>) -> Self {
        PathEdgeKey {
            d1: s.d1.clone(),
            n: s.n,
            d2: s.d2.clone(),
        }
    }
}

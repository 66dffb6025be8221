// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The three concurrent tables at the heart of the tabulation algorithm:
//! the jump-function table (`PathEdge`), the end-summary table, and the
//! incoming-call table. Each supports atomic insert-if-absent; no
//! table is ever read-modify-written under a caller-held lock spanning
//! more than one of `dashmap`'s own internal shard locks.
//!
//! Grounded on `pts_set/pt_data.rs`'s `DiffPTData`/`BasePTData`
//! (key -> dataset, insert-if-absent), re-based on `dashmap` because this
//! core's tables must be safe under concurrent writers, unlike the
//! teacher's single-threaded points-to tables.

pub mod end_summary;
pub mod incoming;
pub mod jump_functions;

pub use end_summary::EndSummaryTable;
pub use incoming::IncomingTable;
pub use jump_functions::JumpFunctionTable;

// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Solver observability surface: propagation count and table sizes,
//! plus a human-readable dump helper for interactive debugging. No
//! persistence format is defined here; this is a debug aid, grounded on
//! `util/pta_statistics.rs`'s stats-struct-with-`dump_stats` convention.

use std::time::Duration;

#[derive(Clone, Debug, Default)]
pub struct SolverStats {
    pub propagation_count: usize,
    pub jump_function_table_size: usize,
    pub end_summary_table_size: usize,
    pub incoming_table_size: usize,
    pub flow_function_cache_size: usize,
    pub elapsed: Duration,
    pub peak_resident_kb: Option<u64>,
}

impl SolverStats {
    pub fn dump(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "propagations: {}\n",
            self.propagation_count
        ));
        out.push_str(&format!(
            "jump function edges: {}\n",
            self.jump_function_table_size
        ));
        out.push_str(&format!(
            "end summaries: {}\n",
            self.end_summary_table_size
        ));
        out.push_str(&format!(
            "incoming entries: {}\n",
            self.incoming_table_size
        ));
        out.push_str(&format!(
            "flow function cache entries: {}\n",
            self.flow_function_cache_size
        ));
        out.push_str(&format!(
            "elapsed: {}\n",
            humantime::format_duration(self.elapsed)
        ));
        if let Some(peak) = self.peak_resident_kb {
            out.push_str(&format!("peak resident memory: {} KB\n", peak));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_includes_propagation_count() {
        let stats = SolverStats {
            propagation_count: 42,
            ..Default::default()
        };
        assert!(stats.dump().contains("42"));
    }
}

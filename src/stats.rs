use std::fmt;
use std::fmt::{Display, Formatter};
use std::time::Duration;

use crate::table::TableCounters;

/// One bucket per possible f, g or h value.
pub const HISTOGRAM_LEN: usize = 256;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Histogram {
    counts: Vec<u64>,
}

impl Default for Histogram {
    fn default() -> Self {
        Histogram {
            counts: vec![0; HISTOGRAM_LEN],
        }
    }
}

impl Histogram {
    #[inline(always)]
    pub fn add(&mut self, value: u32) {
        self.counts[(value as usize).min(HISTOGRAM_LEN - 1)] += 1;
    }

    pub fn get(&self, value: usize) -> u64 {
        self.counts[value]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Non-empty buckets as `(value, count)`.
    pub fn entries(&self) -> impl Iterator<Item = (usize, u64)> + '_ {
        self.counts.iter().copied().enumerate().filter(|&(_, c)| c != 0)
    }

    fn write(&self, f: &mut Formatter<'_>, header: &str) -> fmt::Result {
        let total = self.total().max(1) as f64;
        for (value, count) in self.entries() {
            writeln!(
                f,
                "{header}{value:>3}: {count:>12} ({:>6.2}%)",
                100.0 * count as f64 / total
            )?;
        }
        Ok(())
    }
}

/// Counters of one solver run, accumulated over every search iteration.
#[derive(Clone, Debug, Default)]
pub struct SearchStats {
    pub generated: u64,
    pub expanded: u64,
    pub reopened: u64,
    pub deferred: u64,
    pub heuristic_calls: u64,
    pub hash_finds: u64,
    pub hash_probes: u64,
    pub lower_bound: u8,
    pub initial_h: u32,
    /// Moves of the solution found, if any.
    pub solution_length: Option<usize>,
    pub generated_f: Histogram,
    pub expanded_f: Histogram,
    pub generated_g: Histogram,
    pub expanded_g: Histogram,
    pub generated_h: Histogram,
    pub expanded_h: Histogram,
    /// Nodes generated at each bound of a layered search.
    pub generated_at_depth: Vec<u64>,
    /// How often each static grouping supplied the pattern estimate.
    pub pdb_usage: Vec<u64>,
    /// Dynamic PDB estimates that hit the matching search limit.
    pub matchings_truncated: u64,
    pub peak_states: usize,
    pub elapsed: Duration,
}

impl SearchStats {
    #[inline(always)]
    pub fn record_generated(&mut self, g: u8, h: u32) {
        self.generated += 1;
        self.generated_f.add(g as u32 + h);
        self.generated_g.add(g as u32);
        self.generated_h.add(h);
    }

    #[inline(always)]
    pub fn record_expanded(&mut self, g: u8, h: u8) {
        self.expanded += 1;
        self.expanded_f.add(g as u32 + h as u32);
        self.expanded_g.add(g as u32);
        self.expanded_h.add(h as u32);
    }

    pub fn record_depth(&mut self, depth: u8, generated: u64) {
        let depth = depth as usize;
        if self.generated_at_depth.len() <= depth {
            self.generated_at_depth.resize(depth + 1, 0);
        }
        self.generated_at_depth[depth] += generated;
    }

    /// Folds in the hash counters of a states table.
    pub fn absorb(&mut self, counters: TableCounters) {
        self.hash_finds = counters.finds;
        self.hash_probes = counters.probes;
        self.reopened = counters.reopened;
    }

    pub fn average_probes(&self) -> f64 {
        if self.hash_finds == 0 {
            0.0
        } else {
            self.hash_probes as f64 / self.hash_finds as f64
        }
    }
}

impl Display for SearchStats {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (depth, &count) in self.generated_at_depth.iter().enumerate() {
            if count != 0 {
                writeln!(f, "Nodes generated at depth {depth:>3}: {count:>12}")?;
            }
        }
        self.generated_f.write(f, "Nodes generated with f-value ")?;
        self.expanded_f.write(f, "Nodes expanded with f-value ")?;
        self.generated_g.write(f, "Nodes generated with g-value ")?;
        self.expanded_g.write(f, "Nodes expanded with g-value ")?;
        self.generated_h.write(f, "Nodes generated with h-value ")?;
        self.expanded_h.write(f, "Nodes expanded with h-value ")?;
        for (i, &count) in self.pdb_usage.iter().enumerate() {
            writeln!(f, "Usage of pdb {i:>3}: {count:>12}")?;
        }

        writeln!(f, "Time: {:.5} seconds.", self.elapsed.as_secs_f64())?;
        writeln!(f, "Nodes generated: {}", self.generated)?;
        writeln!(f, "Nodes expanded: {}", self.expanded)?;
        writeln!(f, "Nodes deferred: {}", self.deferred)?;
        writeln!(f, "Calls to heuristic: {}", self.heuristic_calls)?;
        writeln!(f, "Calls to hash find: {}", self.hash_finds)?;
        writeln!(f, "Average hash probes: {:.2}", self.average_probes())?;
        writeln!(f, "Peak stored states: {}", self.peak_states)?;
        writeln!(f, "Initial heuristic: {}", self.initial_h)?;
        writeln!(f, "Solution length: {}", self.solution_length.unwrap_or(0))?;
        writeln!(f, "Lower bound: {}", self.lower_bound)?;
        writeln!(f, "Truncated matchings: {}", self.matchings_truncated)?;
        write!(f, "Num reopened states: {}", self.reopened)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histograms_clamp_and_report_only_used_buckets() {
        let mut stats = SearchStats::default();
        stats.record_generated(3, 4);
        stats.record_generated(3, 400);
        stats.record_expanded(3, 4);
        assert_eq!(stats.generated_f.get(7), 1);
        assert_eq!(stats.generated_h.get(HISTOGRAM_LEN - 1), 1);
        assert_eq!(stats.generated_g.entries().collect::<Vec<_>>(), vec![(3, 2)]);
        assert_eq!(stats.expanded, 1);

        stats.record_depth(5, 10);
        stats.record_depth(5, 2);
        assert_eq!(stats.generated_at_depth[5], 12);

        let report = stats.to_string();
        assert!(report.contains("Nodes generated: 2"));
        assert!(report.contains("Truncated matchings: 0"));
        assert!(report.contains("Nodes generated at depth   5:           12"));
        assert!(report.ends_with("Num reopened states: 0"));
    }

    #[test]
    fn test_average_probes_handles_no_finds() {
        let mut stats = SearchStats::default();
        assert_eq!(stats.average_probes(), 0.0);
        stats.absorb(TableCounters {
            finds: 4,
            probes: 6,
            reopened: 1,
        });
        assert_eq!(stats.average_probes(), 1.5);
        assert_eq!(stats.reopened, 1);
    }
}

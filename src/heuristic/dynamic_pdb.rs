//! Pairwise pattern databases combined per state through a maximum-weight
//! perfect matching of the atoms.

use rayon::prelude::*;
use smallvec::SmallVec;

use crate::board::{Board, Cell, RelaxedDistances};
use crate::heuristic::matching::PerfectMatching;
use crate::heuristic::pattern::{goal_assignments, pattern_table, FreeIndex};
use crate::state::AtomGroups;

/// Relaxed move counts for every pair of atom groups, seeded from one or more
/// goal placements.
#[derive(Clone, Debug)]
pub struct PairTables {
    free: FreeIndex,
    group_count: usize,
    // Indexed `ga * group_count + gb` for `ga <= gb`; the lower half is empty.
    tables: Vec<Vec<u8>>,
    // Goal cells of each group over every seed, for the odd atom out.
    targets: Vec<SmallVec<[Cell; 8]>>,
}

impl PairTables {
    pub fn build(board: &Board, groups: &AtomGroups, seeds: &[&[Cell]]) -> Self {
        let free = FreeIndex::new(board);
        let group_count = groups.group_count();

        let tables = (0..group_count * group_count)
            .into_par_iter()
            .map(|i| {
                let (ga, gb) = (i / group_count, i % group_count);
                if ga > gb || (ga == gb && groups.group_size(ga) < 2) {
                    return Vec::new();
                }
                let a = groups.range(ga).start;
                let b = if ga == gb { a + 1 } else { groups.range(gb).start };
                let seeds = goal_assignments(groups, &[a, b], seeds);
                pattern_table(board, &free, 2, &seeds)
            })
            .collect();

        let targets = (0..group_count)
            .map(|g| {
                let mut cells: SmallVec<[Cell; 8]> =
                    seeds.iter().flat_map(|s| s[groups.range(g)].iter().copied()).collect();
                cells.sort_unstable();
                cells.dedup();
                cells
            })
            .collect();

        PairTables {
            free,
            group_count,
            tables,
            targets,
        }
    }

    /// Moves atoms of groups `ga <= gb` standing on `pa` and `pb` need.
    #[inline(always)]
    pub fn lookup(&self, ga: usize, gb: usize, pa: Cell, pb: Cell) -> u8 {
        self.tables[ga * self.group_count + gb][self.free.key(&[pa, pb])]
    }

    pub fn targets(&self, group: usize) -> &[Cell] {
        &self.targets[group]
    }

    pub fn memory_bytes(&self) -> usize {
        self.tables.iter().map(Vec::len).sum()
    }
}

/// Matching over the atoms, one node each plus a dummy when their count is
/// odd. The edge between two atoms costs minus their pair value, the edge to
/// the dummy minus the atom's distance to its nearest goal cell.
#[derive(Clone, Debug)]
pub struct MatchingEstimator {
    atoms: usize,
    matcher: PerfectMatching,
}

impl MatchingEstimator {
    pub fn new(atoms: usize) -> Self {
        let nodes = atoms + atoms % 2;
        MatchingEstimator {
            atoms,
            matcher: PerfectMatching::new(nodes),
        }
    }

    pub fn estimate(
        &mut self,
        tables: &PairTables,
        dist: &RelaxedDistances,
        groups: &AtomGroups,
        positions: &[Cell],
    ) -> u32 {
        for a in 0..self.atoms {
            let ga = groups.group_of(a);
            for b in a + 1..self.atoms {
                let gb = groups.group_of(b);
                let v = tables.lookup(ga, gb, positions[a], positions[b]);
                self.matcher.set_cost(a, b, -(v as i32));
            }
            if self.atoms % 2 == 1 {
                let d = dist.nearest(positions[a], tables.targets(ga));
                self.matcher.set_cost(a, self.atoms, -(d as i32));
            }
        }
        (-self.matcher.solve()) as u32
    }

    pub fn truncated(&self) -> u64 {
        self.matcher.truncated()
    }
}

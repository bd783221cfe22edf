//! Additive pattern databases over a fixed split of the atoms into triples
//! (plus one pair or single for the remainder).

use std::collections::BTreeSet;

use log::debug;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use smallvec::SmallVec;

use crate::board::{Board, Cell, RelaxedDistances};
use crate::config::PdbSelection;
use crate::error::SolveError;
use crate::heuristic::pattern::{goal_assignments, pattern_table, FreeIndex, MAX_PATTERN};
use crate::state::{AtomGroups, Placement};

/// Random partitions sampled before local search when choosing groupings.
const GREEDY_SAMPLES: usize = 200;
const LOCAL_SEARCH_ROUNDS: usize = 500;
/// Groupings taken from the greedy pool when the rest are random.
const GREEDY_HEAD: usize = 2;
/// Static tables never take more than this, nor more than half the budget.
const MAX_STATIC_BYTES: usize = 2000 * 1024 * 1024;

pub type Pattern = SmallVec<[usize; MAX_PATTERN]>;
pub type Partition = Vec<Pattern>;

/// Tables of one partition for one goal placement.
#[derive(Clone, Debug)]
struct StaticPdb {
    tables: Vec<(Pattern, Vec<u8>)>,
}

impl StaticPdb {
    fn build(board: &Board, free: &FreeIndex, groups: &AtomGroups, partition: &Partition, goal: &[Cell]) -> Self {
        let tables = partition
            .iter()
            .map(|pattern| {
                let seeds = goal_assignments(groups, pattern, &[goal]);
                (pattern.clone(), pattern_table(board, free, pattern.len(), &seeds))
            })
            .collect();
        StaticPdb { tables }
    }

    #[inline]
    fn estimate(&self, free: &FreeIndex, positions: &[Cell]) -> u32 {
        let mut cells = [0 as Cell; MAX_PATTERN];
        self.tables
            .iter()
            .map(|(pattern, table)| {
                for (slot, &atom) in pattern.iter().enumerate() {
                    cells[slot] = positions[atom];
                }
                table[free.key(&cells[..pattern.len()])] as u32
            })
            .sum()
    }

    fn memory_bytes(&self) -> usize {
        self.tables.iter().map(|(_, t)| t.len()).sum()
    }
}

/// Every static database of a puzzle: `tables[goal][grouping]`.
#[derive(Clone, Debug)]
pub struct StaticPdbSet {
    free: FreeIndex,
    partitions: Vec<Partition>,
    tables: Vec<Vec<StaticPdb>>,
}

impl StaticPdbSet {
    pub fn build(
        board: &Board,
        dist: &RelaxedDistances,
        groups: &AtomGroups,
        goals: &[Placement],
        requested: usize,
        selection: PdbSelection,
        budget_bytes: usize,
        rng: &mut SmallRng,
    ) -> Result<Self, SolveError> {
        let free = FreeIndex::new(board);
        let atoms = groups.atom_count();
        let shape = split_sizes(atoms);
        let single_bytes: usize = goals.len() * shape.iter().map(|&k| free.table_len(k)).sum::<usize>();
        let cap = MAX_STATIC_BYTES.min(budget_bytes / 2);
        let fit = cap / single_bytes.max(1);
        if fit == 0 {
            return Err(SolveError::ConfigurationOverflow {
                what: "static pattern database bytes",
                value: single_bytes as u64,
                limit: cap as u64,
            });
        }
        let count = requested.max(1).min(fit);
        if count < requested {
            debug!("static pdb: only {} of {} groupings fit in {} bytes", count, requested, cap);
        }

        let partitions = match selection {
            PdbSelection::Greedy => greedy_partitions(atoms, count, dist, &goals[0], rng),
            PdbSelection::Random => {
                let mut p = greedy_partitions(atoms, count.min(GREEDY_HEAD), dist, &goals[0], rng);
                while p.len() < count {
                    p.push(random_partition(atoms, rng));
                }
                p
            }
        };
        for (i, p) in partitions.iter().enumerate() {
            debug!("static pdb grouping {}: {:?} (fitness {})", i, p, fitness(p, dist, &goals[0]));
        }

        let built: Vec<StaticPdb> = (0..goals.len() * partitions.len())
            .into_par_iter()
            .map(|i| {
                let (goal, grouping) = (i / partitions.len(), i % partitions.len());
                StaticPdb::build(board, &free, groups, &partitions[grouping], &goals[goal])
            })
            .collect();
        let tables = built.chunks(partitions.len()).map(|c| c.to_vec()).collect();

        Ok(StaticPdbSet {
            free,
            partitions,
            tables,
        })
    }

    pub fn grouping_count(&self) -> usize {
        self.partitions.len()
    }

    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    /// Maximum over all groupings for goal `goal`; `usage` counts which
    /// grouping supplied it.
    pub fn estimate(&self, positions: &[Cell], goal: usize, usage: &mut [u64]) -> u32 {
        let mut best = 0;
        let mut best_at = 0;
        for (k, pdb) in self.tables[goal].iter().enumerate() {
            let h = pdb.estimate(&self.free, positions);
            if h > best {
                best = h;
                best_at = k;
            }
        }
        if let Some(slot) = usage.get_mut(best_at) {
            *slot += 1;
        }
        best
    }

    pub fn memory_bytes(&self) -> usize {
        self.tables.iter().flatten().map(StaticPdb::memory_bytes).sum()
    }
}

/// Pattern sizes of a split of `atoms`: triples, then a pair or a single.
fn split_sizes(atoms: usize) -> SmallVec<[usize; 16]> {
    let mut sizes: SmallVec<[usize; 16]> = SmallVec::from_elem(3, atoms / 3);
    if atoms % 3 != 0 {
        sizes.push(atoms % 3);
    }
    sizes
}

fn normalize(partition: &mut Partition) {
    for pattern in partition.iter_mut() {
        pattern.sort_unstable();
    }
    partition.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
}

fn random_partition(atoms: usize, rng: &mut SmallRng) -> Partition {
    let mut order: Vec<usize> = (0..atoms).collect();
    order.shuffle(rng);
    let mut partition: Partition = order.chunks(3).map(Pattern::from_slice).collect();
    normalize(&mut partition);
    partition
}

/// Sum of goal distances between atoms sharing a pattern. Atoms whose goals
/// lie close together interact most, so low fitness is better.
fn fitness(partition: &Partition, dist: &RelaxedDistances, goal: &[Cell]) -> u32 {
    partition
        .iter()
        .map(|p| {
            let mut sum = 0u32;
            for i in 0..p.len() {
                for j in i + 1..p.len() {
                    sum += dist.get(goal[p[i]], goal[p[j]]) as u32;
                }
            }
            sum
        })
        .sum()
}

fn local_search(mut partition: Partition, dist: &RelaxedDistances, goal: &[Cell]) -> (u32, Partition) {
    let mut best = fitness(&partition, dist, goal);
    'rounds: for _ in 0..LOCAL_SEARCH_ROUNDS {
        for g1 in 0..partition.len() {
            for g2 in g1 + 1..partition.len() {
                for a in 0..partition[g1].len() {
                    for b in 0..partition[g2].len() {
                        let mut candidate = partition.clone();
                        let tmp = candidate[g1][a];
                        candidate[g1][a] = candidate[g2][b];
                        candidate[g2][b] = tmp;
                        normalize(&mut candidate);
                        let f = fitness(&candidate, dist, goal);
                        if f < best {
                            best = f;
                            partition = candidate;
                            continue 'rounds;
                        }
                    }
                }
            }
        }
        break;
    }
    (best, partition)
}

/// `count` best distinct partitions after local search, best first. When the
/// pool is smaller than `count` the best one is repeated.
fn greedy_partitions(
    atoms: usize,
    count: usize,
    dist: &RelaxedDistances,
    goal: &[Cell],
    rng: &mut SmallRng,
) -> Vec<Partition> {
    let starts: BTreeSet<Partition> = (0..GREEDY_SAMPLES).map(|_| random_partition(atoms, rng)).collect();
    let ranked: BTreeSet<(u32, Partition)> = starts
        .into_iter()
        .map(|p| local_search(p, dist, goal))
        .collect();

    let mut chosen: Vec<Partition> = ranked.into_iter().take(count).map(|(_, p)| p).collect();
    while chosen.len() < count {
        chosen.push(chosen[0].clone());
    }
    chosen
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn goal_and_board() -> (Board, Placement) {
        let board = Board::from_rows(&["#......", "..#....", ".......", "...#..#", "......."]).unwrap();
        let goal: Placement = [
            board.cell_at(2, 2).unwrap(),
            board.cell_at(2, 3).unwrap(),
            board.cell_at(2, 4).unwrap(),
            board.cell_at(1, 3).unwrap(),
            board.cell_at(3, 2).unwrap(),
        ]
        .into_iter()
        .collect();
        (board, goal)
    }

    #[test]
    fn test_split_covers_every_atom() {
        assert_eq!(split_sizes(7).as_slice(), &[3, 3, 1]);
        assert_eq!(split_sizes(8).as_slice(), &[3, 3, 2]);
        assert_eq!(split_sizes(2).as_slice(), &[2]);
        let mut rng = SmallRng::seed_from_u64(5);
        for atoms in 1..=10 {
            let p = random_partition(atoms, &mut rng);
            let mut all: Vec<usize> = p.iter().flatten().copied().collect();
            all.sort_unstable();
            assert_eq!(all, (0..atoms).collect::<Vec<_>>());
            assert!(p.windows(2).all(|w| w[0].len() >= w[1].len()));
        }
    }

    #[test]
    fn test_local_search_never_worsens_fitness() {
        let (board, goal) = goal_and_board();
        let dist = RelaxedDistances::compute(&board);
        let mut rng = SmallRng::seed_from_u64(9);
        for _ in 0..10 {
            let p = random_partition(goal.len(), &mut rng);
            let before = fitness(&p, &dist, &goal);
            let (after, q) = local_search(p, &dist, &goal);
            assert!(after <= before);
            assert_eq!(after, fitness(&q, &dist, &goal));
        }
    }

    #[test]
    fn test_static_pdb_is_zero_on_goal_and_bounds_single_atoms() {
        let (board, goal) = goal_and_board();
        let dist = RelaxedDistances::compute(&board);
        let groups = AtomGroups::new(&[1, 2, 2]).unwrap();
        let mut rng = SmallRng::seed_from_u64(1);
        let set = StaticPdbSet::build(
            &board,
            &dist,
            &groups,
            std::slice::from_ref(&goal),
            3,
            PdbSelection::Random,
            usize::MAX / 4,
            &mut rng,
        )
        .unwrap();
        assert_eq!(set.grouping_count(), 3);
        let mut usage = vec![0u64; 3];
        assert_eq!(set.estimate(&goal, 0, &mut usage), 0);

        // Each pattern needs at least the relaxed moves of its atoms.
        let free: Vec<Cell> = board.free_cells().collect();
        for _ in 0..200 {
            let mut cells = free.clone();
            cells.shuffle(&mut rng);
            let mut positions: Placement = cells[..goal.len()].iter().copied().collect();
            groups.canonicalize(&mut positions);
            let pdb = set.estimate(&positions, 0, &mut usage);
            let single: u32 = (0..goal.len())
                .map(|a| dist.nearest(positions[a], &goal[groups.range_of_atom(a)]) as u32)
                .sum();
            assert!(pdb >= single.min(255));
        }
        assert!(usage.iter().sum::<u64>() > 0);
    }

    #[test]
    fn test_static_pdb_memory_cap_is_enforced() {
        let (board, goal) = goal_and_board();
        let dist = RelaxedDistances::compute(&board);
        let groups = AtomGroups::singletons(goal.len()).unwrap();
        let mut rng = SmallRng::seed_from_u64(2);
        let result = StaticPdbSet::build(
            &board,
            &dist,
            &groups,
            std::slice::from_ref(&goal),
            4,
            PdbSelection::Greedy,
            1024,
            &mut rng,
        );
        assert!(matches!(result, Err(SolveError::ConfigurationOverflow { .. })));
    }
}

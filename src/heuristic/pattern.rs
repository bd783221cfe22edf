//! Shared machinery of the pattern databases: a dense numbering of the free
//! squares and the backward breadth-first search that fills a table.

use std::collections::VecDeque;

use arrayvec::ArrayVec;

use crate::board::{Board, Cell, NUM_DIRECTIONS};
use crate::state::AtomGroups;

/// Most atoms a single table covers.
pub const MAX_PATTERN: usize = 3;

/// Table entry of a pattern that can never reach its goal cells.
pub const UNSEEN: u8 = u8::MAX;

pub type PatternCells = ArrayVec<Cell, MAX_PATTERN>;

/// Numbers the free squares `0..len()` so tables stay as small as possible.
#[derive(Clone, Debug)]
pub struct FreeIndex {
    dense: Vec<u32>,
    cells: Vec<Cell>,
}

impl FreeIndex {
    pub fn new(board: &Board) -> Self {
        let cells: Vec<Cell> = board.free_cells().collect();
        let mut dense = vec![u32::MAX; board.size()];
        for (i, &c) in cells.iter().enumerate() {
            dense[c as usize] = i as u32;
        }
        FreeIndex { dense, cells }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[inline(always)]
    pub fn of(&self, cell: Cell) -> usize {
        self.dense[cell as usize] as usize
    }

    /// Number of entries of a table over `k` pieces.
    pub fn table_len(&self, k: usize) -> usize {
        self.len().pow(k as u32)
    }

    #[inline(always)]
    pub fn key(&self, cells: &[Cell]) -> usize {
        cells.iter().fold(0, |acc, &c| acc * self.len() + self.of(c))
    }

    fn decode(&self, mut key: usize, k: usize) -> PatternCells {
        let mut out = PatternCells::new();
        for _ in 0..k {
            out.push(0);
        }
        for slot in (0..k).rev() {
            out[slot] = self.cells[key % self.len()];
            key /= self.len();
        }
        out
    }
}

/// Every way of putting `atoms` onto distinct goal atoms of their own groups,
/// over all `goals`.
pub fn goal_assignments(groups: &AtomGroups, atoms: &[usize], goals: &[&[Cell]]) -> Vec<PatternCells> {
    fn fill(
        groups: &AtomGroups,
        atoms: &[usize],
        goal: &[Cell],
        chosen: &mut ArrayVec<usize, MAX_PATTERN>,
        out: &mut Vec<PatternCells>,
    ) {
        if chosen.len() == atoms.len() {
            out.push(chosen.iter().map(|&j| goal[j]).collect());
            return;
        }
        for j in groups.range_of_atom(atoms[chosen.len()]) {
            if !chosen.contains(&j) {
                chosen.push(j);
                fill(groups, atoms, goal, chosen, out);
                chosen.pop();
            }
        }
    }

    let mut out = Vec::new();
    for goal in goals {
        fill(groups, atoms, goal, &mut ArrayVec::new(), &mut out);
    }
    out.sort_unstable();
    out.dedup();
    out
}

/// Relaxed move counts for `k` pieces to reach any of `seeds`. A piece slides
/// any distance in one direction per move and is stopped by walls and by the
/// other pieces of the pattern only.
pub fn pattern_table(board: &Board, free: &FreeIndex, k: usize, seeds: &[PatternCells]) -> Vec<u8> {
    debug_assert!((1..=MAX_PATTERN).contains(&k));
    let mut table = vec![UNSEEN; free.table_len(k)];
    let mut queue = VecDeque::with_capacity(seeds.len() * 4);
    for seed in seeds {
        let key = free.key(seed);
        if table[key] != 0 {
            table[key] = 0;
            queue.push_back(key);
        }
    }

    let stride: ArrayVec<usize, MAX_PATTERN> = (0..k).map(|i| free.len().pow((k - 1 - i) as u32)).collect();
    while let Some(key) = queue.pop_front() {
        let next_dist = (table[key] + 1).min(UNSEEN - 1);
        let cells = free.decode(key, k);
        for (i, &from) in cells.iter().enumerate() {
            let base = key - free.of(from) * stride[i];
            for dir in 0..NUM_DIRECTIONS {
                let mut pos = from;
                while let Some(next) = board.step(pos, dir) {
                    if cells.iter().enumerate().any(|(j, &c)| j != i && c == next) {
                        break;
                    }
                    let moved = base + free.of(next) * stride[i];
                    if table[moved] > next_dist {
                        table[moved] = next_dist;
                        queue.push_back(moved);
                    }
                    pos = next;
                }
            }
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::RelaxedDistances;

    #[test]
    fn test_single_piece_table_is_nearest_relaxed_distance() {
        let board = Board::from_rows(&["#.....", "..#...", "......", "...#.."]).unwrap();
        let free = FreeIndex::new(&board);
        let dist = RelaxedDistances::compute(&board);
        let targets = [board.cell_at(0, 3).unwrap(), board.cell_at(3, 0).unwrap()];
        let seeds: Vec<PatternCells> = targets.iter().map(|&t| [t].into_iter().collect()).collect();
        let table = pattern_table(&board, &free, 1, &seeds);
        for cell in board.free_cells() {
            assert_eq!(table[free.key(&[cell])] as u16, dist.nearest(cell, &targets));
        }
    }

    #[test]
    fn test_pair_table_respects_blocking_and_lower_bounds_singles() {
        let board = Board::from_rows(&["....", "....", "...."]).unwrap();
        let free = FreeIndex::new(&board);
        let dist = RelaxedDistances::compute(&board);
        let a = board.cell_at(0, 0).unwrap();
        let b = board.cell_at(0, 1).unwrap();
        let seeds = vec![[a, b].into_iter().collect::<PatternCells>()];
        let table = pattern_table(&board, &free, 2, &seeds);
        assert_eq!(table[free.key(&[a, b])], 0);

        for p in board.free_cells() {
            for q in board.free_cells() {
                if p == q {
                    continue;
                }
                let v = table[free.key(&[p, q])];
                assert!(v as u16 >= dist.get(p, a) + dist.get(q, b));
            }
        }
        // Swapping the two pieces on a single row needs a detour.
        assert!(table[free.key(&[b, a])] > 2);
    }

    #[test]
    fn test_goal_assignments_use_distinct_goal_atoms() {
        let groups = AtomGroups::new(&[1, 2]).unwrap();
        let goal: [Cell; 3] = [4, 7, 9];
        let seeds = goal_assignments(&groups, &[1, 2], &[&goal[..]]);
        assert_eq!(seeds.len(), 2);
        assert!(seeds.iter().all(|s| s[0] != s[1]));
        let seeds = goal_assignments(&groups, &[0, 1], &[&goal[..]]);
        assert_eq!(seeds.len(), 2);
        assert!(seeds.iter().all(|s| s[0] == 4));
    }
}

//! Sum of relaxed distances with an optimal assignment inside every group of
//! interchangeable atoms.

use pathfinding::kuhn_munkres::kuhn_munkres_min;
use pathfinding::matrix::Matrix;

use crate::board::{Cell, RelaxedDistances};
use crate::state::AtomGroups;

/// Cheapest way to send the atoms of `group` onto that group's goal cells.
pub fn group_cost(
    dist: &RelaxedDistances,
    groups: &AtomGroups,
    positions: &[Cell],
    goal: &[Cell],
    group: usize,
) -> u32 {
    let range = groups.range(group);
    let p = &positions[range.clone()];
    let q = &goal[range];
    let d = |i: usize, j: usize| dist.get(p[i], q[j]) as u32;

    match p.len() {
        1 => d(0, 0),
        2 => (d(0, 0) + d(1, 1)).min(d(0, 1) + d(1, 0)),
        3 => [
            d(0, 0) + d(1, 1) + d(2, 2),
            d(0, 0) + d(1, 2) + d(2, 1),
            d(0, 1) + d(1, 0) + d(2, 2),
            d(0, 1) + d(1, 2) + d(2, 0),
            d(0, 2) + d(1, 0) + d(2, 1),
            d(0, 2) + d(1, 1) + d(2, 0),
        ]
        .into_iter()
        .min()
        .unwrap_or(0),
        n => {
            let mut weights = Matrix::new(n, n, 0i64);
            for i in 0..n {
                for j in 0..n {
                    weights[(i, j)] = d(i, j) as i64;
                }
            }
            let (total, _) = kuhn_munkres_min(&weights);
            total as u32
        }
    }
}

pub fn standard(dist: &RelaxedDistances, groups: &AtomGroups, positions: &[Cell], goal: &[Cell]) -> u32 {
    (0..groups.group_count())
        .map(|g| group_cost(dist, groups, positions, goal, g))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Board;
    use rand::rngs::SmallRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    fn brute_force(dist: &RelaxedDistances, p: &[Cell], q: &[Cell]) -> u32 {
        let mut idx: Vec<usize> = (0..q.len()).collect();
        let mut best = u32::MAX;
        permute(&mut idx, 0, &mut |perm| {
            let cost: u32 = perm.iter().enumerate().map(|(i, &j)| dist.get(p[i], q[j]) as u32).sum();
            best = best.min(cost);
        });
        best
    }

    fn permute(idx: &mut Vec<usize>, k: usize, f: &mut dyn FnMut(&[usize])) {
        if k == idx.len() {
            f(idx);
            return;
        }
        for i in k..idx.len() {
            idx.swap(k, i);
            permute(idx, k + 1, f);
            idx.swap(k, i);
        }
    }

    #[test]
    fn test_interchangeable_atoms_swapped_cost_nothing() {
        let board = Board::from_rows(&["..", ".."]).unwrap();
        let dist = RelaxedDistances::compute(&board);
        let groups = AtomGroups::new(&[2]).unwrap();
        // Goal {(0,0),(0,1)}, pieces sit on {(0,1),(0,0)}.
        assert_eq!(standard(&dist, &groups, &[1, 0], &[0, 1]), 0);
    }

    #[test]
    fn test_group_cost_matches_brute_force() {
        let board = Board::from_rows(&["......", ".#..#.", "......", "..#...", "......"]).unwrap();
        let dist = RelaxedDistances::compute(&board);
        let free: Vec<Cell> = board.free_cells().collect();
        let mut rng = SmallRng::seed_from_u64(3);
        for size in 1..=5 {
            let groups = AtomGroups::new(&[size]).unwrap();
            for _ in 0..20 {
                let mut cells = free.clone();
                cells.shuffle(&mut rng);
                let p = &cells[..size];
                let q = &cells[size..2 * size];
                assert_eq!(group_cost(&dist, &groups, p, q, 0), brute_force(&dist, p, q));
            }
        }
    }

    #[test]
    fn test_standard_sums_groups() {
        let board = Board::from_rows(&["....", "....", "...."]).unwrap();
        let dist = RelaxedDistances::compute(&board);
        let groups = AtomGroups::new(&[1, 2]).unwrap();
        let goal = [0, 5, 6];
        let positions = [11, 6, 5];
        let expected = dist.get(11, 0) + group_cost(&dist, &groups, &positions, &goal, 1) as u16;
        assert_eq!(standard(&dist, &groups, &positions, &goal), expected as u32);
        assert_eq!(group_cost(&dist, &groups, &positions, &goal, 1), 0);
    }
}

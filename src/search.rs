//! Best-first search over placements, bounded by a maximum number of moves.
//!
//! Standard mode queues every successor that fits under the bound and
//! re-opens stored placements reached by a cheaper path. Partial expansion
//! queues only the successors whose f equals the node's current f and puts
//! the node back with the smallest f still held back, so it is expanded
//! again when the queue reaches that value.

use arrayvec::ArrayVec;

use crate::board::{Cell, Occupancy, NUM_DIRECTIONS};
use crate::context::PuzzleContext;
use crate::error::SolveError;
use crate::heuristic::{Evaluator, GoalSelection};
use crate::state::{Placement, MAX_ATOMS};
use crate::stats::SearchStats;
use crate::table::{Index, Node, StatesTable, NIL};
use crate::watchdog::CancelToken;

/// Most successors one placement can have.
const MAX_CHILDREN: usize = NUM_DIRECTIONS * MAX_ATOMS;

type Scratch = ArrayVec<Cell, MAX_ATOMS>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchMode {
    Standard,
    PartialExpansion,
}

/// A successor held in scratch while partial expansion decides its fate.
struct Pending {
    positions: Scratch,
    h: u8,
    std_h: u8,
    tie: u32,
    f: u32,
}

pub struct Searcher<'a> {
    ctx: &'a PuzzleContext,
    table: StatesTable,
    eval: Evaluator<'a>,
    cancel: CancelToken,
    mode: SearchMode,
    /// End a search as soon as a solved successor is generated. Only sound
    /// when every smaller bound is known to have no solution.
    stop_on_generated: bool,
    occupied: Occupancy,
    pending: ArrayVec<Pending, MAX_CHILDREN>,
    stats: SearchStats,
}

impl<'a> Searcher<'a> {
    pub fn new(
        ctx: &'a PuzzleContext,
        table: StatesTable,
        eval: Evaluator<'a>,
        mode: SearchMode,
        cancel: CancelToken,
    ) -> Self {
        Searcher {
            ctx,
            table,
            eval,
            cancel,
            mode,
            stop_on_generated: false,
            occupied: Occupancy::new(ctx.board().size()),
            pending: ArrayVec::new(),
            stats: SearchStats::default(),
        }
    }

    pub fn set_stop_on_generated(&mut self, stop: bool) {
        self.stop_on_generated = stop;
    }

    pub fn select_goal(&mut self, selection: GoalSelection) {
        self.eval.select_goal(selection);
    }

    pub fn evaluator(&mut self) -> &mut Evaluator<'a> {
        &mut self.eval
    }

    /// Counters so far, hash and heuristic counters included.
    pub fn stats(&mut self) -> &SearchStats {
        self.stats.absorb(self.table.counters());
        self.stats.heuristic_calls = self.eval.heuristic_calls();
        self.stats.pdb_usage = self.eval.pattern_usage();
        self.stats.matchings_truncated = self.eval.matchings_truncated();
        &self.stats
    }

    pub fn into_stats(mut self) -> SearchStats {
        self.stats();
        self.stats
    }

    /// Searches for a placement with `h == 0` reachable in at most `bound`
    /// moves. Returns the placements from the initial one to the solved one.
    pub fn run(&mut self, bound: u8) -> Result<Vec<Placement>, SolveError> {
        if bound > self.table.max_f() {
            return Err(SolveError::ConfigurationOverflow {
                what: "search bound",
                value: bound as u64,
                limit: self.table.max_f() as u64,
            });
        }
        self.table.reset();
        let result = self.search(bound);
        self.stats.peak_states = self.stats.peak_states.max(self.table.len());
        result
    }

    fn search(&mut self, bound: u8) -> Result<Vec<Placement>, SolveError> {
        let ctx = self.ctx;
        let root = self.eval.evaluate(ctx.initial(), 0);
        if root.h > bound as u32 {
            return Err(SolveError::NoSolutionAtBound { bound });
        }
        let index = self.table.insert(
            ctx.initial(),
            Node::new(NIL, 0, root.h as u8, root.std_h as u8, root.tie),
        )?;
        self.table.push(index);
        self.stats.record_generated(0, root.h);

        let mut limit = bound;
        while let Some(cur) = self.table.pop() {
            if self.cancel.is_cancelled() {
                return Err(SolveError::Cancelled);
            }
            let node = *self.table.node(cur);
            self.stats.lower_bound = self.stats.lower_bound.max(node.f());
            if node.h == 0 {
                return Ok(self.table.path(cur));
            }
            if node.pea_f == 0 {
                self.stats.record_expanded(node.g, node.h);
            }
            let found = match self.mode {
                SearchMode::Standard => self.expand(cur, &mut limit)?,
                SearchMode::PartialExpansion => self.expand_partial(cur, &mut limit)?,
            };
            if let Some(path) = found {
                return Ok(path);
            }
        }
        Err(SolveError::NoSolutionAtBound { bound })
    }

    /// Path through `cur` to its successor `child`.
    fn path_to(&self, cur: Index, child: &[Cell]) -> Vec<Placement> {
        let mut path = self.table.path(cur);
        path.push(Placement::from_slice(child));
        path
    }

    /// Calls `visit` with every successor of `parent`, canonicalized, and the
    /// atom that moved.
    fn for_each_child(
        ctx: &PuzzleContext,
        occupied: &mut Occupancy,
        parent: &[Cell],
        mut visit: impl FnMut(&[Cell], usize) -> Result<bool, SolveError>,
    ) -> Result<(), SolveError> {
        occupied.fill(parent);
        let mut child: Scratch = parent.iter().copied().collect();
        for atom in 0..parent.len() {
            for dir in 0..NUM_DIRECTIONS {
                let Some(to) = ctx.board().slide(occupied, parent[atom], dir) else {
                    continue;
                };
                child.clear();
                child.extend(parent.iter().copied());
                child[atom] = to;
                ctx.groups().canonicalize_atom(&mut child, atom);
                debug_assert!(ctx.groups().is_canonical(&child));
                if !visit(&child[..], atom)? {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    fn expand(&mut self, cur: Index, limit: &mut u8) -> Result<Option<Vec<Placement>>, SolveError> {
        let ctx = self.ctx;
        let parent = *self.table.node(cur);
        let parent_positions: Scratch = self.table.positions(cur).iter().copied().collect();
        let g = parent.g + 1;
        let mut solved = None;

        let Searcher {
            table,
            eval,
            stats,
            occupied,
            stop_on_generated,
            ..
        } = self;
        Self::for_each_child(ctx, occupied, &parent_positions, |child, atom| {
            match table.find(child) {
                None => {
                    let s = eval.evaluate_child(&parent, &parent_positions, child, atom, g);
                    if s.h == 0 && g <= *limit {
                        *limit = g;
                        if *stop_on_generated {
                            solved = Some(Placement::from_slice(child));
                            return Ok(false);
                        }
                    }
                    if g as u32 + s.h > *limit as u32 {
                        return Ok(true);
                    }
                    let i = table.insert(child, Node::new(cur, g, s.h as u8, s.std_h as u8, s.tie))?;
                    table.push(i);
                    stats.record_generated(g, s.h);
                }
                Some(i) => {
                    let existing = *table.node(i);
                    if g >= existing.g || g as u32 + existing.h as u32 > *limit as u32 {
                        return Ok(true);
                    }
                    if existing.h == 0 {
                        *limit = g;
                        if *stop_on_generated {
                            solved = Some(Placement::from_slice(child));
                            return Ok(false);
                        }
                    }
                    let tie = if eval.tie_depends_on_g() {
                        eval.retie(child, g)
                    } else {
                        existing.tie
                    };
                    table.reopen(i, g, tie, cur);
                }
            }
            Ok(true)
        })?;

        Ok(solved.map(|child| self.path_to(cur, &child)))
    }

    fn expand_partial(&mut self, cur: Index, limit: &mut u8) -> Result<Option<Vec<Placement>>, SolveError> {
        let ctx = self.ctx;
        let parent = *self.table.node(cur);
        let parent_positions: Scratch = self.table.positions(cur).iter().copied().collect();
        let g = parent.g + 1;
        let released_up_to = parent.f() as u32;
        let held_back_from = parent.pea_f as u32;

        let Searcher {
            table,
            eval,
            occupied,
            pending,
            ..
        } = self;
        pending.clear();
        Self::for_each_child(ctx, occupied, &parent_positions, |child, atom| {
            let (h, std_h, tie) = match table.find(child) {
                Some(i) => {
                    let existing = *table.node(i);
                    if g >= existing.g {
                        return Ok(true);
                    }
                    let tie = if eval.tie_depends_on_g() {
                        eval.retie(child, g)
                    } else {
                        existing.tie
                    };
                    (existing.h as u32, existing.std_h as u32, tie)
                }
                None => {
                    let s = eval.evaluate_child(&parent, &parent_positions, child, atom, g);
                    (s.h, s.std_h, s.tie)
                }
            };
            let f = g as u32 + h;
            if h == 0 && g <= *limit {
                *limit = g;
            }
            if f < held_back_from || f > *limit as u32 {
                return Ok(true);
            }
            pending.push(Pending {
                positions: child.iter().copied().collect(),
                h: h as u8,
                std_h: std_h as u8,
                tie,
                f,
            });
            Ok(true)
        })?;

        let mut next = u32::MAX;
        for k in 0..self.pending.len() {
            let child = &self.pending[k];
            if child.f > released_up_to {
                next = next.min(child.f);
                continue;
            }
            if child.h == 0 {
                let positions = child.positions.clone();
                return Ok(Some(self.path_to(cur, &positions)));
            }
            match self.table.find(&child.positions) {
                None => {
                    let i = self.table.insert(
                        &child.positions,
                        Node::new(cur, g, child.h, child.std_h, child.tie),
                    )?;
                    self.table.push(i);
                    self.stats.record_generated(g, child.h as u32);
                }
                Some(i) => {
                    if g < self.table.node(i).g {
                        self.table.reopen(i, g, child.tie, cur);
                    }
                }
            }
        }

        if next <= *limit as u32 {
            self.table.defer(cur, next as u8);
            self.stats.deferred += 1;
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Board;
    use crate::config::SolverConfig;
    use crate::context::Puzzle;

    fn ctx(rows: &[&str], initial: &[(usize, usize)], goal: &[(usize, usize)], groups: &[usize]) -> PuzzleContext {
        let board = Board::from_rows(rows).unwrap();
        let at = |&(r, c): &(usize, usize)| board.cell_at(r, c).unwrap();
        let puzzle = Puzzle {
            initial: initial.iter().map(at).collect(),
            goals: vec![goal.iter().map(at).collect()],
            group_sizes: groups.to_vec(),
            board: board.clone(),
        };
        PuzzleContext::new(puzzle, &SolverConfig::default()).unwrap()
    }

    fn searcher<'a>(ctx: &'a PuzzleContext, mode: SearchMode, capacity: usize) -> Searcher<'a> {
        let config = SolverConfig::default();
        let eval = Evaluator::new(ctx, &config).unwrap();
        let table =
            StatesTable::with_capacity(ctx.atom_count(), capacity, 2.5, config.max_f, eval.max_tie()).unwrap();
        Searcher::new(ctx, table, eval, mode, CancelToken::new())
    }

    #[test]
    fn test_corner_to_corner_takes_two_moves() {
        let ctx = ctx(&["..", ".."], &[(0, 0)], &[(1, 1)], &[1]);
        for mode in [SearchMode::Standard, SearchMode::PartialExpansion] {
            let mut s = searcher(&ctx, mode, 100);
            let path = s.run(10).unwrap();
            assert_eq!(path.len(), 3);
            assert_eq!(path[2].as_slice(), ctx.goal(0));
        }
    }

    #[test]
    fn test_bound_below_solution_reports_no_solution() {
        let ctx = ctx(&["..", ".."], &[(0, 0)], &[(1, 1)], &[1]);
        for mode in [SearchMode::Standard, SearchMode::PartialExpansion] {
            let mut s = searcher(&ctx, mode, 100);
            assert_eq!(s.run(1), Err(SolveError::NoSolutionAtBound { bound: 1 }));
        }
    }

    #[test]
    fn test_tiny_arena_reports_capacity() {
        let ctx = ctx(
            &[".....", ".....", ".....", "....."],
            &[(0, 0), (3, 4), (0, 4)],
            &[(1, 2), (2, 2), (2, 1)],
            &[1, 1, 1],
        );
        let mut s = searcher(&ctx, SearchMode::Standard, 10);
        assert_eq!(s.run(40), Err(SolveError::CapacityExceeded { capacity: 10 }));
    }

    #[test]
    fn test_cancelled_token_stops_at_first_pop() {
        let ctx = ctx(&["...", "..."], &[(0, 0)], &[(1, 2)], &[1]);
        let mut s = searcher(&ctx, SearchMode::Standard, 100);
        s.cancel.cancel();
        assert_eq!(s.run(10), Err(SolveError::Cancelled));
    }

    #[test]
    fn test_partial_expansion_defers_and_finds_the_same_length() {
        let ctx = ctx(
            &["......", "..#...", "......", "...#..", "......"],
            &[(0, 0), (4, 5), (2, 2)],
            &[(1, 3), (2, 3), (2, 4)],
            &[1, 2],
        );
        let mut full = searcher(&ctx, SearchMode::Standard, 100_000);
        let mut partial = searcher(&ctx, SearchMode::PartialExpansion, 100_000);
        let a = full.run(40).unwrap();
        let b = partial.run(40).unwrap();
        assert_eq!(a.len(), b.len());
        assert!(partial.stats().deferred > 0);
        assert_eq!(full.stats().deferred, 0);
    }

    #[test]
    fn test_shorter_path_to_a_stored_solution_tightens_the_bound() {
        let ctx = ctx(&["...."], &[(0, 0)], &[(0, 3)], &[1]);
        let mut s = searcher(&ctx, SearchMode::Standard, 100);
        let root = s.table.insert(ctx.initial(), Node::new(NIL, 0, 1, 1, 0)).unwrap();
        let solved = s.table.insert(ctx.goal(0), Node::new(root, 5, 0, 0, 0)).unwrap();
        s.table.push(solved);

        let mut limit = 10;
        assert_eq!(s.expand(root, &mut limit), Ok(None));
        assert_eq!(limit, 1);
        assert_eq!(s.table.node(solved).g, 1);
        assert_eq!(s.table.node(solved).parent, root);
        assert_eq!(s.table.pop(), Some(solved));
    }

    #[test]
    fn test_bound_past_the_open_list_is_rejected() {
        let ctx = ctx(&["..", ".."], &[(0, 0)], &[(1, 1)], &[1]);
        let mut s = searcher(&ctx, SearchMode::Standard, 100);
        let max_f = s.table.max_f();
        assert!(matches!(
            s.run(max_f + 1),
            Err(SolveError::ConfigurationOverflow { what: "search bound", .. })
        ));
        assert_eq!(s.run(max_f).map(|p| p.len()), Ok(3));
    }

    #[test]
    fn test_stop_on_generated_returns_as_soon_as_a_solution_appears() {
        let ctx = ctx(&["...", "...", "..."], &[(0, 0)], &[(2, 2)], &[1]);
        let mut s = searcher(&ctx, SearchMode::Standard, 100);
        s.set_stop_on_generated(true);
        let path = s.run(2).unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(s.stats().expanded, 2);
    }
}

//! Admissible estimates of the moves left. `h` is the larger of the standard
//! heuristic and the configured pattern database.

pub mod dynamic_pdb;
pub mod matching;
pub mod pattern;
pub mod standard;
pub mod static_pdb;

use log::info;
use rand::rngs::SmallRng;

use crate::board::{Board, Cell, RelaxedDistances};
use crate::config::{PdbKind, SolverConfig};
use crate::context::PuzzleContext;
use crate::error::SolveError;
use crate::state::{AtomGroups, Placement};
use crate::table::Node;
use crate::tie_break::{tie_breaker, Move, TieBreaker};

use self::dynamic_pdb::{MatchingEstimator, PairTables};
use self::standard::{group_cost, standard};
use self::static_pdb::StaticPdbSet;

/// Pattern databases built once per puzzle.
#[derive(Clone, Debug)]
pub enum PatternTables {
    None,
    Static(StaticPdbSet),
    /// Pairwise tables for every goal placement.
    PerGoal(Vec<PairTables>),
    /// One pairwise table seeded from all goal placements at once.
    MultiGoal(PairTables),
}

impl PatternTables {
    pub fn build(
        config: &SolverConfig,
        board: &Board,
        dist: &RelaxedDistances,
        groups: &AtomGroups,
        goals: &[Placement],
        rng: &mut SmallRng,
    ) -> Result<Self, SolveError> {
        let tables = match config.pdb {
            PdbKind::None => PatternTables::None,
            PdbKind::Static => PatternTables::Static(StaticPdbSet::build(
                board,
                dist,
                groups,
                goals,
                config.static_pdbs,
                config.pdb_selection,
                config.memory_budget_bytes,
                rng,
            )?),
            PdbKind::Dynamic => PatternTables::PerGoal(
                goals
                    .iter()
                    .map(|goal| PairTables::build(board, groups, &[&goal[..]]))
                    .collect(),
            ),
            PdbKind::MultiGoal => {
                let seeds: Vec<&[Cell]> = goals.iter().map(|g| &g[..]).collect();
                PatternTables::MultiGoal(PairTables::build(board, groups, &seeds))
            }
        };
        if !matches!(tables, PatternTables::None) {
            info!("pattern databases ready: {} bytes", tables.memory_bytes());
        }
        Ok(tables)
    }

    pub fn memory_bytes(&self) -> usize {
        match self {
            PatternTables::None => 0,
            PatternTables::Static(set) => set.memory_bytes(),
            PatternTables::PerGoal(tables) => tables.iter().map(PairTables::memory_bytes).sum(),
            PatternTables::MultiGoal(tables) => tables.memory_bytes(),
        }
    }

    fn estimator<'a>(&'a self, ctx: &'a PuzzleContext) -> Option<Box<dyn PatternHeuristic + 'a>> {
        match self {
            PatternTables::None => None,
            PatternTables::Static(set) => Some(Box::new(StaticEstimator {
                set,
                usage: vec![0; set.grouping_count()],
            })),
            PatternTables::PerGoal(tables) => Some(Box::new(DynamicEstimator {
                ctx,
                tables,
                matcher: MatchingEstimator::new(ctx.atom_count()),
            })),
            PatternTables::MultiGoal(tables) => Some(Box::new(DynamicEstimator {
                ctx,
                tables: std::slice::from_ref(tables),
                matcher: MatchingEstimator::new(ctx.atom_count()),
            })),
        }
    }
}

/// Query side of a pattern database.
pub trait PatternHeuristic {
    fn estimate(&mut self, positions: &[Cell], goal: usize) -> u32;

    /// Whether the estimate depends on the goal placement asked for.
    fn per_goal(&self) -> bool;

    /// How often each table family supplied the estimate.
    fn usage(&self) -> &[u64] {
        &[]
    }

    /// Estimates that settled for a non-optimal matching.
    fn truncated(&self) -> u64 {
        0
    }
}

struct StaticEstimator<'a> {
    set: &'a StaticPdbSet,
    usage: Vec<u64>,
}

impl PatternHeuristic for StaticEstimator<'_> {
    fn estimate(&mut self, positions: &[Cell], goal: usize) -> u32 {
        self.set.estimate(positions, goal, &mut self.usage)
    }

    fn per_goal(&self) -> bool {
        true
    }

    fn usage(&self) -> &[u64] {
        &self.usage
    }
}

struct DynamicEstimator<'a> {
    ctx: &'a PuzzleContext,
    tables: &'a [PairTables],
    matcher: MatchingEstimator,
}

impl PatternHeuristic for DynamicEstimator<'_> {
    fn estimate(&mut self, positions: &[Cell], goal: usize) -> u32 {
        let tables = &self.tables[goal.min(self.tables.len() - 1)];
        self.matcher
            .estimate(tables, self.ctx.distances(), self.ctx.groups(), positions)
    }

    fn per_goal(&self) -> bool {
        self.tables.len() > 1
    }

    fn truncated(&self) -> u64 {
        self.matcher.truncated()
    }
}

/// Which goal placements a search aims for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GoalSelection {
    Any,
    Single(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Scores {
    pub h: u32,
    pub std_h: u32,
    pub tie: u32,
}

/// Scores placements for the search: heuristic plus tie-break value.
pub struct Evaluator<'a> {
    ctx: &'a PuzzleContext,
    pattern: Option<Box<dyn PatternHeuristic + 'a>>,
    tie: Box<dyn TieBreaker>,
    selection: GoalSelection,
    calls: u64,
}

impl<'a> Evaluator<'a> {
    pub fn new(ctx: &'a PuzzleContext, config: &SolverConfig) -> Result<Self, SolveError> {
        Ok(Evaluator {
            ctx,
            pattern: ctx.patterns().estimator(ctx),
            tie: tie_breaker(config.tie_breaking, ctx, config.max_f, config.seed)?,
            selection: GoalSelection::Any,
            calls: 0,
        })
    }

    pub fn select_goal(&mut self, selection: GoalSelection) {
        debug_assert!(match selection {
            GoalSelection::Single(k) => k < self.ctx.goals().len(),
            GoalSelection::Any => true,
        });
        self.selection = selection;
    }

    pub fn max_tie(&self) -> u32 {
        self.tie.max_value()
    }

    pub fn tie_depends_on_g(&self) -> bool {
        self.tie.depends_on_g()
    }

    pub fn heuristic_calls(&self) -> u64 {
        self.calls
    }

    pub fn matchings_truncated(&self) -> u64 {
        self.pattern.as_ref().map_or(0, |p| p.truncated())
    }

    pub fn pattern_usage(&self) -> Vec<u64> {
        self.pattern.as_ref().map(|p| p.usage().to_vec()).unwrap_or_default()
    }

    /// The goal an incremental update may be computed against, if any.
    fn delta_goal(&self) -> Option<usize> {
        match self.selection {
            GoalSelection::Single(k) => Some(k),
            GoalSelection::Any if self.ctx.goals().len() == 1 => Some(0),
            GoalSelection::Any => None,
        }
    }

    /// Standard heuristic and the goal it was measured against.
    fn standard(&self, positions: &[Cell]) -> (u32, usize) {
        let ctx = self.ctx;
        let of = |k: usize| standard(ctx.distances(), ctx.groups(), positions, ctx.goal(k));
        match self.selection {
            GoalSelection::Single(k) => (of(k), k),
            GoalSelection::Any => (0..ctx.goals().len())
                .map(|k| (of(k), k))
                .min()
                .unwrap_or((0, 0)),
        }
    }

    fn pattern_estimate(&mut self, positions: &[Cell], goal: usize) -> u32 {
        let Some(pattern) = self.pattern.as_mut() else {
            return 0;
        };
        match self.selection {
            GoalSelection::Any if pattern.per_goal() => (0..self.ctx.goals().len())
                .map(|k| pattern.estimate(positions, k))
                .min()
                .unwrap_or(0),
            _ => pattern.estimate(positions, goal),
        }
    }

    /// Scores computed from scratch.
    pub fn evaluate(&mut self, positions: &[Cell], g: u8) -> Scores {
        self.calls += 1;
        let (std_h, goal) = self.standard(positions);
        let pdb = self.pattern_estimate(positions, goal);
        Scores {
            h: std_h.max(pdb),
            std_h,
            tie: self.tie.score(self.ctx, positions, goal, g),
        }
    }

    /// Scores of `child`, which differs from the stored `parent` by the move
    /// of `atom`. Equal to `evaluate(child, g)`.
    pub fn evaluate_child(
        &mut self,
        parent: &Node,
        parent_positions: &[Cell],
        child: &[Cell],
        atom: usize,
        g: u8,
    ) -> Scores {
        let Some(goal) = self.delta_goal() else {
            return self.evaluate(child, g);
        };
        self.calls += 1;
        let ctx = self.ctx;
        let target = ctx.goal(goal);
        let group = ctx.groups().group_of(atom);
        let before = group_cost(ctx.distances(), ctx.groups(), parent_positions, target, group);
        let after = group_cost(ctx.distances(), ctx.groups(), child, target, group);
        let std_h = parent.std_h as u32 - before + after;
        let pdb = self.pattern_estimate(child, goal);
        let mv = Move {
            parent: parent_positions,
            parent_tie: parent.tie,
            child,
            atom,
        };
        Scores {
            h: std_h.max(pdb),
            std_h,
            tie: self.tie.delta(ctx, &mv, goal, g),
        }
    }

    /// Tie-break value of an already scored placement reached with a new g.
    pub fn retie(&mut self, positions: &[Cell], g: u8) -> u32 {
        let (_, goal) = self.standard(positions);
        self.tie.score(self.ctx, positions, goal, g)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Occupancy;
    use crate::config::TieBreaking;
    use crate::context::Puzzle;
    use crate::table::NIL;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn puzzle() -> Puzzle {
        let board = Board::from_rows(&["......", ".#..#.", "......", "..#...", "......"]).unwrap();
        let at = |r, c| board.cell_at(r, c).unwrap();
        let initial = vec![at(0, 0), at(4, 5), at(0, 5), at(4, 0), at(2, 3)];
        let goals = vec![
            vec![at(2, 1), at(1, 2), at(1, 3), at(2, 2), at(3, 1)],
            vec![at(2, 2), at(1, 3), at(2, 3), at(2, 4), at(3, 3)],
        ];
        Puzzle {
            board,
            initial,
            goals,
            group_sizes: vec![1, 2, 2],
        }
    }

    /// Random walk of single-atom slides from the initial placement.
    fn walk(ctx: &PuzzleContext, steps: usize, seed: u64) -> Vec<(Placement, Placement, usize)> {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut occupied = Occupancy::new(ctx.board().size());
        let mut cur = Placement::from_slice(ctx.initial());
        let mut out = Vec::new();
        while out.len() < steps {
            let atom = rng.gen_range(0..ctx.atom_count());
            let dir = rng.gen_range(0..4);
            occupied.fill(&cur);
            let Some(to) = ctx.board().slide(&occupied, cur[atom], dir) else {
                continue;
            };
            let mut next = cur.clone();
            next[atom] = to;
            ctx.groups().canonicalize_atom(&mut next, atom);
            out.push((cur, next.clone(), atom));
            cur = next;
        }
        out
    }

    fn check_delta(config: SolverConfig, selection: GoalSelection) {
        let ctx = PuzzleContext::new(puzzle(), &config).unwrap();
        let mut inc = Evaluator::new(&ctx, &config).unwrap();
        let mut full = Evaluator::new(&ctx, &config).unwrap();
        inc.select_goal(selection);
        full.select_goal(selection);
        for (parent, child, atom) in walk(&ctx, 300, 5) {
            let p = full.evaluate(&parent, 3);
            let node = Node::new(NIL, 3, p.h.min(254) as u8, p.std_h as u8, p.tie);
            let d = inc.evaluate_child(&node, &parent, &child, atom, 4);
            assert_eq!(d, full.evaluate(&child, 4), "after moving atom {atom}");
        }
    }

    #[test]
    fn test_child_scores_match_full_evaluation() {
        for tie_breaking in [
            TieBreaking::None,
            TieBreaking::GoalCount,
            TieBreaking::FillOrder,
            TieBreaking::FillOrderReverse,
            TieBreaking::RealizablePaths,
            TieBreaking::H,
            TieBreaking::HGoalCount,
            TieBreaking::GoalCountH,
        ] {
            for selection in [GoalSelection::Single(0), GoalSelection::Single(1), GoalSelection::Any] {
                let config = SolverConfig {
                    tie_breaking,
                    ..SolverConfig::default()
                };
                check_delta(config, selection);
            }
        }
    }

    #[test]
    fn test_child_scores_match_with_pattern_databases() {
        for pdb in [PdbKind::Static, PdbKind::Dynamic, PdbKind::MultiGoal] {
            let config = SolverConfig {
                pdb,
                static_pdbs: 2,
                seed: Some(3),
                memory_budget_bytes: 64 * 1024 * 1024,
                ..SolverConfig::default()
            };
            check_delta(config.clone(), GoalSelection::Single(1));
            check_delta(config, GoalSelection::Any);
        }
    }

    #[test]
    fn test_any_goal_takes_the_minimum() {
        let config = SolverConfig::default();
        let ctx = PuzzleContext::new(puzzle(), &config).unwrap();
        let mut eval = Evaluator::new(&ctx, &config).unwrap();
        let any = eval.evaluate(ctx.goal(1), 0);
        assert_eq!(any.h, 0);
        eval.select_goal(GoalSelection::Single(0));
        assert!(eval.evaluate(ctx.goal(1), 0).h > 0);
        assert_eq!(eval.heuristic_calls(), 2);
    }

    #[test]
    fn test_pattern_heuristics_are_zero_on_goals_and_never_below_standard() {
        for pdb in [PdbKind::Static, PdbKind::Dynamic, PdbKind::MultiGoal] {
            let config = SolverConfig {
                pdb,
                seed: Some(9),
                memory_budget_bytes: 64 * 1024 * 1024,
                ..SolverConfig::default()
            };
            let ctx = PuzzleContext::new(puzzle(), &config).unwrap();
            let mut eval = Evaluator::new(&ctx, &config).unwrap();
            for k in 0..ctx.goals().len() {
                eval.select_goal(GoalSelection::Single(k));
                assert_eq!(eval.evaluate(ctx.goal(k), 0).h, 0);
            }
            eval.select_goal(GoalSelection::Any);
            let s = eval.evaluate(ctx.initial(), 0);
            assert!(s.h >= s.std_h);
            assert_eq!(eval.matchings_truncated(), 0);
        }
    }
}

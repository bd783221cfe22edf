use std::time::Duration;

use clap::ValueEnum;

use crate::context::PuzzleContext;
use crate::error::SolveError;
use crate::heuristic::standard::standard;
use crate::state::MAX_ATOMS;
use crate::table::MAX_BUCKETS;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Algorithm {
    /// Best-first search, re-opening nodes reached by a cheaper path.
    AStar,
    /// Releases only the cheapest successors of a node per expansion.
    PartialExpansion,
    /// Repeats the search with an increasing move bound.
    Layered,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum GoalMode {
    /// One search; the heuristic takes the minimum over all goal placements.
    AllGoals,
    /// For every move bound, one search per goal placement.
    EachGoal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum TieBreaking {
    None,
    GoalCount,
    FillOrder,
    FillOrderReverse,
    RealizablePaths,
    Random,
    /// Prefers deeper nodes.
    H,
    HGoalCount,
    GoalCountH,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum PdbKind {
    None,
    Static,
    Dynamic,
    MultiGoal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum PdbSelection {
    Greedy,
    Random,
}

/// Largest f value any node may have unless configured otherwise.
pub const DEFAULT_MAX_F: u8 = 150;
pub const DEFAULT_MEMORY_BUDGET: usize = 3500 * 1024 * 1024;
pub const DEFAULT_HASH_LOAD_FACTOR: f64 = 2.5;

#[derive(Clone, Debug)]
pub struct SolverConfig {
    pub algorithm: Algorithm,
    pub goal_mode: GoalMode,
    pub tie_breaking: TieBreaking,
    pub pdb: PdbKind,
    pub static_pdbs: usize,
    pub pdb_selection: PdbSelection,
    pub memory_budget_bytes: usize,
    pub time_limit: Option<Duration>,
    pub move_bound: Option<u8>,
    pub max_f: u8,
    pub hash_load_factor: f64,
    pub seed: Option<u64>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            algorithm: Algorithm::AStar,
            goal_mode: GoalMode::AllGoals,
            tie_breaking: TieBreaking::GoalCount,
            pdb: PdbKind::None,
            static_pdbs: 1,
            pdb_selection: PdbSelection::Greedy,
            memory_budget_bytes: DEFAULT_MEMORY_BUDGET,
            time_limit: None,
            move_bound: None,
            max_f: DEFAULT_MAX_F,
            hash_load_factor: DEFAULT_HASH_LOAD_FACTOR,
            seed: None,
        }
    }
}

impl SolverConfig {
    /// The move bound searches start with.
    pub fn bound(&self) -> u8 {
        self.move_bound.unwrap_or(self.max_f)
    }

    /// Checks every numeric width against the puzzle before any search runs.
    pub fn validate(&self, ctx: &PuzzleContext) -> Result<(), SolveError> {
        if self.max_f == 0 || self.max_f > u8::MAX - 1 {
            return Err(SolveError::ConfigurationOverflow {
                what: "maximum f value",
                value: self.max_f as u64,
                limit: (u8::MAX - 1) as u64,
            });
        }
        if let Some(bound) = self.move_bound {
            if bound > self.max_f {
                return Err(SolveError::ConfigurationOverflow {
                    what: "move bound",
                    value: bound as u64,
                    limit: self.max_f as u64,
                });
            }
        }
        if ctx.atom_count() > MAX_ATOMS {
            return Err(SolveError::ConfigurationOverflow {
                what: "atom count",
                value: ctx.atom_count() as u64,
                limit: MAX_ATOMS as u64,
            });
        }
        if ctx.board().size() >= u16::MAX as usize {
            return Err(SolveError::ConfigurationOverflow {
                what: "board size",
                value: ctx.board().size() as u64,
                limit: u16::MAX as u64 - 1,
            });
        }
        let max_tie = self.max_tie_estimate(ctx);
        let buckets = (self.max_f as u64 + 1) * (max_tie + 1);
        if buckets > MAX_BUCKETS as u64 {
            return Err(SolveError::ConfigurationOverflow {
                what: "open list buckets",
                value: buckets,
                limit: MAX_BUCKETS as u64,
            });
        }

        let initial = ctx
            .goals()
            .iter()
            .map(|goal| standard(ctx.distances(), ctx.groups(), ctx.initial(), goal))
            .min()
            .unwrap_or(0);
        if initial > self.max_f as u32 {
            return Err(SolveError::ConfigurationOverflow {
                what: "initial heuristic",
                value: initial as u64,
                limit: self.max_f as u64,
            });
        }
        Ok(())
    }

    /// Tie-break range known without building the tie-breaker. Fill order
    /// ranges are checked when their ranks are computed.
    fn max_tie_estimate(&self, ctx: &PuzzleContext) -> u64 {
        let atoms = ctx.atom_count() as u64;
        let max_f = self.max_f as u64;
        match self.tie_breaking {
            TieBreaking::None | TieBreaking::FillOrder | TieBreaking::FillOrderReverse => 0,
            TieBreaking::GoalCount | TieBreaking::RealizablePaths => atoms,
            TieBreaking::Random => 249,
            TieBreaking::H => max_f,
            TieBreaking::HGoalCount | TieBreaking::GoalCountH => (1 + max_f) * (1 + atoms),
        }
    }
}

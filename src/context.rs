use log::{info, warn};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rustc_hash::FxHashSet;

use crate::board::{Board, Cell, RelaxedDistances};
use crate::config::SolverConfig;
use crate::error::SolveError;
use crate::heuristic::PatternTables;
use crate::state::{AtomGroups, Placement};

/// Raw puzzle description: atoms are listed group by group, and every goal
/// lists the cells of the same atoms in the same order.
#[derive(Clone, Debug)]
pub struct Puzzle {
    pub board: Board,
    pub initial: Vec<Cell>,
    pub goals: Vec<Vec<Cell>>,
    pub group_sizes: Vec<usize>,
}

/// Everything the search reads and never writes: the flooded board, relaxed
/// distances, atom groups, canonical initial and goal placements, and the
/// pattern databases.
#[derive(Debug)]
pub struct PuzzleContext {
    board: Board,
    distances: RelaxedDistances,
    groups: AtomGroups,
    initial: Placement,
    goals: Vec<Placement>,
    patterns: PatternTables,
}

impl PuzzleContext {
    pub fn new(puzzle: Puzzle, config: &SolverConfig) -> Result<Self, SolveError> {
        let groups = AtomGroups::new(&puzzle.group_sizes)?;
        let atoms = groups.atom_count();
        check_placement(&puzzle.board, &puzzle.initial, atoms, "initial placement")?;
        if puzzle.goals.is_empty() {
            return Err(SolveError::InvalidPuzzle("no goal placement".into()));
        }
        for goal in &puzzle.goals {
            check_placement(&puzzle.board, goal, atoms, "goal placement")?;
        }

        let board = puzzle.board.flood(&puzzle.initial);
        let mut initial = Placement::from_slice(&puzzle.initial);
        groups.canonicalize(&mut initial);

        let mut seen = FxHashSet::default();
        let mut goals = Vec::with_capacity(puzzle.goals.len());
        let mut unreachable = 0;
        for goal in &puzzle.goals {
            if !goal.iter().all(|&c| board.is_free(c)) {
                unreachable += 1;
                continue;
            }
            let mut goal = Placement::from_slice(goal);
            groups.canonicalize(&mut goal);
            if seen.insert(goal.clone()) {
                goals.push(goal);
            }
        }
        if unreachable > 0 {
            warn!("dropped {} goal placements outside the reachable area", unreachable);
        }
        if goals.is_empty() {
            return Err(SolveError::InvalidPuzzle(
                "no goal placement lies in the area the atoms can reach".into(),
            ));
        }

        let distances = RelaxedDistances::compute(&board);
        let mut ctx = PuzzleContext {
            board,
            distances,
            groups,
            initial,
            goals,
            patterns: PatternTables::None,
        };
        config.validate(&ctx)?;

        let mut rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        ctx.patterns = PatternTables::build(config, &ctx.board, &ctx.distances, &ctx.groups, &ctx.goals, &mut rng)?;
        info!(
            "preprocessing done: {} atoms in {} groups, {} goal placements, {} free cells",
            atoms,
            ctx.groups.group_count(),
            ctx.goals.len(),
            ctx.board.free_cells().count()
        );
        Ok(ctx)
    }

    #[inline(always)]
    pub fn board(&self) -> &Board {
        &self.board
    }

    #[inline(always)]
    pub fn distances(&self) -> &RelaxedDistances {
        &self.distances
    }

    #[inline(always)]
    pub fn groups(&self) -> &AtomGroups {
        &self.groups
    }

    pub fn initial(&self) -> &[Cell] {
        &self.initial
    }

    pub fn goals(&self) -> &[Placement] {
        &self.goals
    }

    #[inline(always)]
    pub fn goal(&self, i: usize) -> &[Cell] {
        &self.goals[i]
    }

    #[inline(always)]
    pub fn atom_count(&self) -> usize {
        self.groups.atom_count()
    }

    pub fn patterns(&self) -> &PatternTables {
        &self.patterns
    }

    /// Bytes held by precomputed tables; the states arena gets what is left.
    pub fn memory_bytes(&self) -> usize {
        self.distances.memory_bytes() + self.patterns.memory_bytes()
    }
}

fn check_placement(board: &Board, cells: &[Cell], atoms: usize, what: &str) -> Result<(), SolveError> {
    if cells.len() != atoms {
        return Err(SolveError::InvalidPuzzle(format!(
            "{} has {} atoms, expected {}",
            what,
            cells.len(),
            atoms
        )));
    }
    if let Some(&c) = cells.iter().find(|&&c| !board.is_free(c)) {
        return Err(SolveError::InvalidPuzzle(format!("{} puts an atom on blocked square {}", what, c)));
    }
    let distinct: FxHashSet<Cell> = cells.iter().copied().collect();
    if distinct.len() != cells.len() {
        return Err(SolveError::InvalidPuzzle(format!("{} stacks two atoms on one square", what)));
    }
    Ok(())
}

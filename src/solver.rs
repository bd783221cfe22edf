use std::time::Instant;

use log::{debug, info};

use crate::config::{Algorithm, GoalMode, SolverConfig};
use crate::context::PuzzleContext;
use crate::error::SolveError;
use crate::heuristic::{Evaluator, GoalSelection};
use crate::search::{SearchMode, Searcher};
use crate::state::Placement;
use crate::stats::SearchStats;
use crate::table::StatesTable;
use crate::watchdog::CancelToken;

/// Outcome of a solver run together with its counters.
#[derive(Debug)]
pub struct SolveReport {
    pub result: Result<Vec<Placement>, SolveError>,
    pub stats: SearchStats,
}

impl SolveReport {
    /// Moves of the solution, if one was found.
    pub fn moves(&self) -> Option<usize> {
        self.result.as_ref().ok().map(|path| path.len().saturating_sub(1))
    }
}

fn searcher<'a>(ctx: &'a PuzzleContext, config: &SolverConfig, cancel: &CancelToken) -> Result<Searcher<'a>, SolveError> {
    config.validate(ctx)?;
    let eval = Evaluator::new(ctx, config)?;
    let budget = config.memory_budget_bytes.saturating_sub(ctx.memory_bytes());
    let table = StatesTable::with_budget(
        ctx.atom_count(),
        budget,
        config.hash_load_factor,
        config.max_f,
        eval.max_tie(),
    )?;
    debug!("states arena: {} states in {} bytes", table.capacity(), budget);
    let mode = match config.algorithm {
        Algorithm::PartialExpansion => SearchMode::PartialExpansion,
        Algorithm::AStar | Algorithm::Layered => SearchMode::Standard,
    };
    Ok(Searcher::new(ctx, table, eval, mode, cancel.clone()))
}

/// Heuristic value of the initial placement over all goals.
pub fn initial_heuristic(ctx: &PuzzleContext, config: &SolverConfig) -> Result<u32, SolveError> {
    let mut eval = Evaluator::new(ctx, config)?;
    Ok(eval.evaluate(ctx.initial(), 0).h)
}

/// Finds a shortest sequence of slides from the initial placement to any goal
/// placement, within the configured move bound.
pub fn solve(ctx: &PuzzleContext, config: &SolverConfig, cancel: &CancelToken) -> SolveReport {
    let start = Instant::now();
    let mut searcher = match searcher(ctx, config, cancel) {
        Ok(s) => s,
        Err(e) => {
            return SolveReport {
                result: Err(e),
                stats: SearchStats {
                    elapsed: start.elapsed(),
                    ..SearchStats::default()
                },
            }
        }
    };

    let initial_h = searcher.evaluator().evaluate(ctx.initial(), 0).h;
    let bound = config.bound();
    let mut depths = Vec::new();

    let result = match (config.goal_mode, config.algorithm) {
        (GoalMode::AllGoals, Algorithm::AStar | Algorithm::PartialExpansion) => {
            searcher.select_goal(GoalSelection::Any);
            searcher.run(bound)
        }
        (GoalMode::AllGoals, Algorithm::Layered) => {
            searcher.select_goal(GoalSelection::Any);
            searcher.set_stop_on_generated(true);
            increasing_bounds(&mut searcher, initial_h, bound, &[GoalSelection::Any], &mut depths)
        }
        (GoalMode::EachGoal, algorithm) => {
            searcher.set_stop_on_generated(algorithm == Algorithm::Layered);
            let goals: Vec<GoalSelection> = (0..ctx.goals().len()).map(GoalSelection::Single).collect();
            increasing_bounds(&mut searcher, initial_h, bound, &goals, &mut depths)
        }
    };

    let mut stats = searcher.into_stats();
    for (depth, generated) in depths {
        stats.record_depth(depth, generated);
    }
    stats.initial_h = initial_h;
    stats.elapsed = start.elapsed();

    match &result {
        Ok(path) => {
            stats.solution_length = Some(path.len() - 1);
            info!("solution of {} moves found in {:?}", path.len() - 1, stats.elapsed);
        }
        Err(e) => info!("no solution: {}", e),
    }
    SolveReport { result, stats }
}

/// Tries every bound from the initial heuristic up, and every selection per
/// bound. The first solution found is a shortest one.
fn increasing_bounds(
    searcher: &mut Searcher<'_>,
    initial_h: u32,
    max_bound: u8,
    selections: &[GoalSelection],
    depths: &mut Vec<(u8, u64)>,
) -> Result<Vec<Placement>, SolveError> {
    for b in initial_h..=max_bound as u32 {
        let b = b as u8;
        info!("searching with bound {}", b);
        let before = searcher.stats().generated;
        for &selection in selections {
            searcher.select_goal(selection);
            let result = searcher.run(b);
            match result {
                Ok(path) => {
                    depths.push((b, searcher.stats().generated - before));
                    return Ok(path);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(SolveError::NoSolutionAtBound { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        depths.push((b, searcher.stats().generated - before));
    }
    Err(SolveError::NoSolutionAtBound { bound: max_bound })
}

//! Secondary ordering among nodes of equal f. Scores never influence which
//! solution length is found, only how soon.

use std::collections::VecDeque;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::board::{Cell, Occupancy, NUM_DIRECTIONS, UNREACHABLE};
use crate::config::TieBreaking;
use crate::context::PuzzleContext;
use crate::error::SolveError;

/// Range of the random tie-breaker.
const RANDOM_RANGE: u32 = 250;

/// A successor that differs from its parent by the move of one atom.
pub struct Move<'a> {
    pub parent: &'a [Cell],
    pub parent_tie: u32,
    pub child: &'a [Cell],
    /// Any atom of the group that moved.
    pub atom: usize,
}

pub trait TieBreaker: Send {
    /// Largest score `score` or `delta` can return.
    fn max_value(&self) -> u32;

    fn score(&mut self, ctx: &PuzzleContext, positions: &[Cell], goal: usize, g: u8) -> u32;

    /// Score of `mv.child`, equal to `score` on it.
    fn delta(&mut self, ctx: &PuzzleContext, mv: &Move<'_>, goal: usize, g: u8) -> u32 {
        self.score(ctx, mv.child, goal, g)
    }

    /// Whether the score must be recomputed when a node gets a new g.
    fn depends_on_g(&self) -> bool {
        false
    }
}

pub fn tie_breaker(
    kind: TieBreaking,
    ctx: &PuzzleContext,
    max_f: u8,
    seed: Option<u64>,
) -> Result<Box<dyn TieBreaker>, SolveError> {
    let atoms = ctx.atom_count() as u32;
    let composite = (1 + max_f as u32) * (1 + atoms);
    Ok(match kind {
        TieBreaking::None => Box::new(NoTieBreak),
        TieBreaking::GoalCount => Box::new(GoalCount {
            ranks: None,
            max: atoms,
        }),
        TieBreaking::FillOrder | TieBreaking::FillOrderReverse => {
            let ranks = FillOrderRanks::compute(ctx, kind == TieBreaking::FillOrderReverse)?;
            let max = ranks.max_value;
            Box::new(GoalCount {
                ranks: Some(ranks),
                max,
            })
        }
        TieBreaking::RealizablePaths => Box::new(RealizablePaths {
            max: atoms,
            occupied: Occupancy::new(ctx.board().size()),
            dist: vec![UNREACHABLE; ctx.board().size()],
            queue: VecDeque::new(),
        }),
        TieBreaking::Random => Box::new(RandomTieBreak {
            rng: match seed {
                Some(s) => SmallRng::seed_from_u64(s),
                None => SmallRng::from_entropy(),
            },
        }),
        TieBreaking::H => Box::new(GScore {
            order: GOrder::G,
            max: max_f as u32,
        }),
        TieBreaking::HGoalCount => Box::new(GScore {
            order: GOrder::GThenGoalCount,
            max: composite,
        }),
        TieBreaking::GoalCountH => Box::new(GScore {
            order: GOrder::GoalCountThenG { max_f },
            max: composite,
        }),
    })
}

struct NoTieBreak;

impl TieBreaker for NoTieBreak {
    fn max_value(&self) -> u32 {
        0
    }

    fn score(&mut self, _: &PuzzleContext, _: &[Cell], _: usize, _: u8) -> u32 {
        0
    }

    fn delta(&mut self, _: &PuzzleContext, _: &Move<'_>, _: usize, _: u8) -> u32 {
        0
    }
}

/// Atoms of `group` standing on a goal cell of their group, each counted
/// with `weight(cell)`.
#[inline]
fn group_goal_score(
    ctx: &PuzzleContext,
    positions: &[Cell],
    goal: usize,
    group: usize,
    weight: impl Fn(Cell) -> u32,
) -> u32 {
    let range = ctx.groups().range(group);
    let targets = &ctx.goal(goal)[range.clone()];
    positions[range]
        .iter()
        .filter(|p| targets.contains(p))
        .map(|&p| weight(p))
        .sum()
}

pub fn goal_count(ctx: &PuzzleContext, positions: &[Cell], goal: usize) -> u32 {
    (0..ctx.groups().group_count())
        .map(|group| group_goal_score(ctx, positions, goal, group, |_| 1))
        .sum()
}

/// Goal count, optionally weighted by fill-order rank.
struct GoalCount {
    ranks: Option<FillOrderRanks>,
    max: u32,
}

impl GoalCount {
    fn group_score(&self, ctx: &PuzzleContext, positions: &[Cell], goal: usize, group: usize) -> u32 {
        match &self.ranks {
            None => group_goal_score(ctx, positions, goal, group, |_| 1),
            Some(ranks) => group_goal_score(ctx, positions, goal, group, |c| ranks.weight(goal, c)),
        }
    }
}

impl TieBreaker for GoalCount {
    fn max_value(&self) -> u32 {
        self.max
    }

    fn score(&mut self, ctx: &PuzzleContext, positions: &[Cell], goal: usize, _: u8) -> u32 {
        (0..ctx.groups().group_count())
            .map(|group| self.group_score(ctx, positions, goal, group))
            .sum()
    }

    fn delta(&mut self, ctx: &PuzzleContext, mv: &Move<'_>, goal: usize, _: u8) -> u32 {
        let group = ctx.groups().group_of(mv.atom);
        mv.parent_tie - self.group_score(ctx, mv.parent, goal, group) + self.group_score(ctx, mv.child, goal, group)
    }
}

/// Per goal placement, the weight an atom earns on each goal cell. Cells are
/// ranked by the round in which an atom there could first be taken back out
/// by a reverse slide.
#[derive(Clone, Debug)]
pub struct FillOrderRanks {
    weights: Vec<Vec<u32>>,
    max_value: u32,
}

impl FillOrderRanks {
    pub fn compute(ctx: &PuzzleContext, reverse: bool) -> Result<Self, SolveError> {
        let board = ctx.board();
        let mut weights = Vec::with_capacity(ctx.goals().len());
        let mut max_value = 1u64;

        for goal in ctx.goals() {
            let mut is_goal = vec![false; board.size()];
            for &c in goal.iter() {
                is_goal[c as usize] = true;
            }
            let mut removed = vec![0u32; board.size()];
            let mut level = 1u32;
            let mut removed_count = 0;

            while removed_count < goal.len() {
                let mut progress = false;
                for &a in goal.iter() {
                    if removed[a as usize] != 0 {
                        continue;
                    }
                    let possible = (0..NUM_DIRECTIONS).any(|dir| {
                        let (Some(behind), Some(ahead)) = (board.neighbour(a, dir ^ 1), board.neighbour(a, dir)) else {
                            return false;
                        };
                        let blocks = board.is_wall(behind) || is_goal[behind as usize];
                        let r = removed[ahead as usize];
                        let open = !board.is_wall(ahead) && (!is_goal[ahead as usize] || (r != 0 && r != level));
                        blocks && open
                    });
                    if possible {
                        removed[a as usize] = level;
                        removed_count += 1;
                        progress = true;
                    }
                }
                if !progress {
                    break;
                }
                level += 1;
            }

            let mut per_cell = vec![0u32; board.size()];
            let mut total = 1u64;
            for &a in goal.iter() {
                let rank = match removed[a as usize] {
                    0 => level,
                    r => r,
                };
                let exponent = if reverse { level - rank } else { rank };
                let w = 1u64.checked_shl(exponent).filter(|&w| w <= u32::MAX as u64);
                let Some(w) = w else {
                    return Err(SolveError::ConfigurationOverflow {
                        what: "fill order weight exponent",
                        value: exponent as u64,
                        limit: 31,
                    });
                };
                per_cell[a as usize] = w as u32;
                total += w;
            }
            max_value = max_value.max(total);
            weights.push(per_cell);
        }

        if max_value > u32::MAX as u64 {
            return Err(SolveError::ConfigurationOverflow {
                what: "fill order tie-breaking range",
                value: max_value,
                limit: u32::MAX as u64,
            });
        }
        Ok(FillOrderRanks {
            weights,
            max_value: max_value as u32,
        })
    }

    #[inline(always)]
    pub fn weight(&self, goal: usize, cell: Cell) -> u32 {
        self.weights[goal][cell as usize]
    }

    pub fn max_value(&self) -> u32 {
        self.max_value
    }
}

/// Atoms whose relaxed distance to their goal cells is still achievable with
/// the other atoms in the way. No cheap delta exists: one move can open or
/// close the paths of every other atom.
struct RealizablePaths {
    max: u32,
    occupied: Occupancy,
    dist: Vec<u16>,
    queue: VecDeque<Cell>,
}

impl RealizablePaths {
    /// Whether a piece on `from` reaches one of `targets` within `limit` moves
    /// with the other atoms as obstacles.
    fn reachable_within(&mut self, ctx: &PuzzleContext, from: Cell, targets: &[Cell], limit: u16) -> bool {
        let board = ctx.board();
        self.dist.iter_mut().for_each(|d| *d = UNREACHABLE);
        self.queue.clear();
        self.dist[from as usize] = 0;
        self.queue.push_back(from);

        while let Some(cur) = self.queue.pop_front() {
            let d = self.dist[cur as usize];
            if targets.contains(&cur) {
                return d <= limit;
            }
            if d >= limit {
                continue;
            }
            for dir in 0..NUM_DIRECTIONS {
                let mut pos = cur;
                while let Some(next) = board.step(pos, dir) {
                    if self.occupied.contains(next) {
                        break;
                    }
                    if self.dist[next as usize] == UNREACHABLE {
                        self.dist[next as usize] = d + 1;
                        self.queue.push_back(next);
                    }
                    pos = next;
                }
            }
        }
        false
    }
}

impl TieBreaker for RealizablePaths {
    fn max_value(&self) -> u32 {
        self.max
    }

    fn score(&mut self, ctx: &PuzzleContext, positions: &[Cell], goal: usize, _: u8) -> u32 {
        self.occupied.fill(positions);
        let mut score = 0;
        for (atom, &from) in positions.iter().enumerate() {
            let targets = &ctx.goal(goal)[ctx.groups().range_of_atom(atom)];
            let relaxed = ctx.distances().nearest(from, targets);
            if relaxed == UNREACHABLE {
                continue;
            }
            self.occupied.remove(from);
            if self.reachable_within(ctx, from, targets, relaxed) {
                score += 1;
            }
            self.occupied.insert(from);
        }
        score
    }
}

struct RandomTieBreak {
    rng: SmallRng,
}

impl TieBreaker for RandomTieBreak {
    fn max_value(&self) -> u32 {
        RANDOM_RANGE - 1
    }

    fn score(&mut self, _: &PuzzleContext, _: &[Cell], _: usize, _: u8) -> u32 {
        self.rng.gen_range(0..RANDOM_RANGE)
    }
}

#[derive(Clone, Copy, Debug)]
enum GOrder {
    G,
    GThenGoalCount,
    GoalCountThenG { max_f: u8 },
}

/// Scores built from the path cost, alone or combined with the goal count.
struct GScore {
    order: GOrder,
    max: u32,
}

impl TieBreaker for GScore {
    fn max_value(&self) -> u32 {
        self.max
    }

    fn score(&mut self, ctx: &PuzzleContext, positions: &[Cell], goal: usize, g: u8) -> u32 {
        let g = g as u32;
        match self.order {
            GOrder::G => g,
            GOrder::GThenGoalCount => g * ctx.atom_count() as u32 + goal_count(ctx, positions, goal),
            GOrder::GoalCountThenG { max_f } => goal_count(ctx, positions, goal) * max_f as u32 + g,
        }
    }

    fn depends_on_g(&self) -> bool {
        true
    }
}

//! Minimum-cost perfect matching on the small complete graphs the dynamic
//! pattern databases produce (one node per atom, plus a dummy when the atom
//! count is odd).
//!
//! Costs are updated in place between queries and the previous solution seeds
//! the next search, so consecutive states that differ by one move are cheap to
//! re-solve. The solver is an exact branch and bound with an expansion limit;
//! when the limit is hit the best matching found so far is kept, which is
//! still a valid perfect matching.

use arrayvec::ArrayVec;

/// Largest supported node count.
pub const MAX_NODES: usize = 64;

/// Search nodes explored per `solve` before settling for the incumbent.
const SEARCH_LIMIT: u64 = 200_000;

#[derive(Clone, Debug)]
pub struct PerfectMatching {
    nodes: usize,
    cost: Vec<i32>,
    mate: Vec<usize>,
    limit: u64,
    truncated: u64,
}

impl PerfectMatching {
    pub fn new(nodes: usize) -> Self {
        Self::with_limit(nodes, SEARCH_LIMIT)
    }

    /// A matcher that explores at most `limit` search nodes per solve.
    pub fn with_limit(nodes: usize, limit: u64) -> Self {
        debug_assert!(nodes % 2 == 0 && nodes <= MAX_NODES);
        let mate = (0..nodes).map(|v| v ^ 1).collect();
        PerfectMatching {
            nodes,
            cost: vec![0; nodes * nodes],
            mate,
            limit,
            truncated: 0,
        }
    }

    #[inline(always)]
    pub fn set_cost(&mut self, a: usize, b: usize, cost: i32) {
        self.cost[a * self.nodes + b] = cost;
        self.cost[b * self.nodes + a] = cost;
    }

    #[inline(always)]
    pub fn cost(&self, a: usize, b: usize) -> i32 {
        self.cost[a * self.nodes + b]
    }

    pub fn mate(&self, v: usize) -> usize {
        self.mate[v]
    }

    /// Number of solves that stopped at the expansion limit.
    pub fn truncated(&self) -> u64 {
        self.truncated
    }

    fn total(&self, mate: &[usize]) -> i32 {
        (0..self.nodes)
            .filter(|&v| v < mate[v])
            .map(|v| self.cost(v, mate[v]))
            .sum()
    }

    fn greedy(&self) -> Vec<usize> {
        let mut mate = vec![usize::MAX; self.nodes];
        for v in 0..self.nodes {
            if mate[v] != usize::MAX {
                continue;
            }
            let u = (v + 1..self.nodes)
                .filter(|&u| mate[u] == usize::MAX)
                .min_by_key(|&u| self.cost(v, u));
            if let Some(u) = u {
                mate[v] = u;
                mate[u] = v;
            }
        }
        mate
    }

    /// Solves for the current costs and returns the total cost of the matching.
    pub fn solve(&mut self) -> i32 {
        if self.nodes == 0 {
            return 0;
        }
        let mut best = self.total(&self.mate);
        let greedy = self.greedy();
        let greedy_total = self.total(&greedy);
        if greedy_total < best {
            best = greedy_total;
            self.mate = greedy;
        }

        let mut search = BranchAndBound {
            nodes: self.nodes,
            cost: &self.cost,
            current: vec![usize::MAX; self.nodes],
            best,
            best_mate: self.mate.clone(),
            expanded: 0,
            limit: self.limit,
            stopped: false,
        };
        let all = if self.nodes == 64 { u64::MAX } else { (1u64 << self.nodes) - 1 };
        search.run(all, 0);

        if search.stopped {
            self.truncated += 1;
        }
        let best = search.best;
        self.mate = search.best_mate;
        best
    }
}

struct BranchAndBound<'a> {
    nodes: usize,
    cost: &'a [i32],
    current: Vec<usize>,
    best: i32,
    best_mate: Vec<usize>,
    expanded: u64,
    limit: u64,
    stopped: bool,
}

impl BranchAndBound<'_> {
    #[inline(always)]
    fn cost(&self, a: usize, b: usize) -> i32 {
        self.cost[a * self.nodes + b]
    }

    /// Half the sum of every free node's cheapest free edge, rounded up.
    fn lower_bound(&self, free: u64) -> i32 {
        let mut sum = 0i64;
        let mut rest = free;
        while rest != 0 {
            let r = rest.trailing_zeros() as usize;
            rest &= rest - 1;
            let mut others = free & !(1u64 << r);
            let mut cheapest = i32::MAX;
            while others != 0 {
                let s = others.trailing_zeros() as usize;
                others &= others - 1;
                cheapest = cheapest.min(self.cost(r, s));
            }
            sum += cheapest as i64;
        }
        (sum + 1).div_euclid(2) as i32
    }

    fn run(&mut self, free: u64, acc: i32) {
        if free == 0 {
            if acc < self.best {
                self.best = acc;
                self.best_mate.copy_from_slice(&self.current);
            }
            return;
        }
        if self.expanded >= self.limit {
            self.stopped = true;
            return;
        }
        self.expanded += 1;
        if acc + self.lower_bound(free) >= self.best {
            return;
        }

        let v = free.trailing_zeros() as usize;
        let rest = free & !(1u64 << v);
        let mut candidates: ArrayVec<(i32, usize), MAX_NODES> = ArrayVec::new();
        let mut bits = rest;
        while bits != 0 {
            let u = bits.trailing_zeros() as usize;
            bits &= bits - 1;
            candidates.push((self.cost(v, u), u));
        }
        candidates.sort_unstable();

        for (c, u) in candidates {
            self.current[v] = u;
            self.current[u] = v;
            self.run(rest & !(1u64 << u), acc + c);
        }
    }
}

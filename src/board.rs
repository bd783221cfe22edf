use std::collections::VecDeque;

use rayon::prelude::*;

use crate::error::SolveError;

/// Linear index of a board square (`row * width + col`).
pub type Cell = u16;

/// Relaxed distance between squares that cannot reach each other.
pub const UNREACHABLE: u16 = u16::MAX;

const NO_CELL: Cell = Cell::MAX;

// Direction constants
pub const DIR_UP: usize = 0;
pub const DIR_DOWN: usize = 1;
pub const DIR_LEFT: usize = 2;
pub const DIR_RIGHT: usize = 3;
pub const NUM_DIRECTIONS: usize = 4;

pub const DIR_OFFSETS: [(i8, i8); NUM_DIRECTIONS] = [(-1, 0), (1, 0), (0, -1), (0, 1)];
pub const DIR_CHARS: [char; NUM_DIRECTIONS] = ['u', 'd', 'l', 'r'];

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Point {
    pub row: i16,
    pub col: i16,
}

impl Point {
    #[inline(always)]
    pub const fn new(row: i16, col: i16) -> Self {
        Point { row, col }
    }
}

/// Static grid of walls and free squares with precomputed neighbour links.
#[derive(Clone, Debug)]
pub struct Board {
    width: i16,
    height: i16,
    walls: Vec<u64>,
    neighbours: Vec<[Cell; NUM_DIRECTIONS]>,
}

impl Board {
    pub fn new(width: usize, height: usize, walls: &[bool]) -> Result<Self, SolveError> {
        let size = width * height;
        if width == 0 || height == 0 {
            return Err(SolveError::InvalidPuzzle("board has no squares".into()));
        }
        if size >= NO_CELL as usize || width > i16::MAX as usize || height > i16::MAX as usize {
            return Err(SolveError::ConfigurationOverflow {
                what: "board size",
                value: size as u64,
                limit: NO_CELL as u64 - 1,
            });
        }
        if walls.len() != size {
            return Err(SolveError::InvalidPuzzle(format!(
                "wall mask has {} squares, expected {}",
                walls.len(),
                size
            )));
        }

        let mut board = Board {
            width: width as i16,
            height: height as i16,
            walls: vec![0u64; (size + 63) / 64],
            neighbours: vec![[NO_CELL; NUM_DIRECTIONS]; size],
        };
        for (idx, &wall) in walls.iter().enumerate() {
            if wall {
                board.walls[idx / 64] |= 1u64 << (idx % 64);
            }
        }
        board.link_neighbours();
        Ok(board)
    }

    /// Builds a board from text rows where `#` is a wall and anything else is free.
    /// Short rows are padded with walls.
    pub fn from_rows(rows: &[&str]) -> Result<Self, SolveError> {
        let height = rows.len();
        let width = rows.iter().map(|r| r.chars().count()).max().unwrap_or(0);
        let mut walls = vec![true; width * height];
        for (row, line) in rows.iter().enumerate() {
            for (col, ch) in line.chars().enumerate() {
                walls[row * width + col] = ch == '#';
            }
        }
        Board::new(width, height, &walls)
    }

    fn link_neighbours(&mut self) {
        for row in 0..self.height {
            for col in 0..self.width {
                let idx = self.to_idx(row, col);
                for (dir, &(drow, dcol)) in DIR_OFFSETS.iter().enumerate() {
                    let new_row = row + drow as i16;
                    let new_col = col + dcol as i16;
                    if self.is_valid(new_row, new_col) {
                        let new_idx = self.to_idx(new_row, new_col);
                        if !self.is_wall(new_idx as Cell) {
                            self.neighbours[idx][dir] = new_idx as Cell;
                        }
                    }
                }
            }
        }
    }

    #[inline(always)]
    pub fn width(&self) -> usize {
        self.width as usize
    }

    #[inline(always)]
    pub fn height(&self) -> usize {
        self.height as usize
    }

    #[inline(always)]
    pub fn size(&self) -> usize {
        self.neighbours.len()
    }

    #[inline(always)]
    fn is_valid(&self, row: i16, col: i16) -> bool {
        row >= 0 && row < self.height && col >= 0 && col < self.width
    }

    #[inline(always)]
    fn to_idx(&self, row: i16, col: i16) -> usize {
        (row as usize) * self.width as usize + col as usize
    }

    #[inline(always)]
    pub fn is_wall(&self, cell: Cell) -> bool {
        let idx = cell as usize;
        (self.walls[idx / 64] & (1u64 << (idx % 64))) != 0
    }

    #[inline(always)]
    pub fn is_free(&self, cell: Cell) -> bool {
        (cell as usize) < self.size() && !self.is_wall(cell)
    }

    pub fn point(&self, cell: Cell) -> Point {
        let idx = cell as i32;
        let width = self.width as i32;
        Point::new((idx / width) as i16, (idx % width) as i16)
    }

    pub fn cell_at(&self, row: usize, col: usize) -> Option<Cell> {
        if row < self.height() && col < self.width() {
            Some(self.to_idx(row as i16, col as i16) as Cell)
        } else {
            None
        }
    }

    /// The free neighbour of `cell` in direction `dir`, if any.
    #[inline(always)]
    pub fn step(&self, cell: Cell, dir: usize) -> Option<Cell> {
        let next = self.neighbours[cell as usize][dir];
        (next != NO_CELL).then_some(next)
    }

    /// Square next to `cell` in direction `dir`, walls included.
    pub fn neighbour(&self, cell: Cell, dir: usize) -> Option<Cell> {
        let p = self.point(cell);
        let (drow, dcol) = DIR_OFFSETS[dir];
        let (row, col) = (p.row + drow as i16, p.col + dcol as i16);
        self.is_valid(row, col).then(|| self.to_idx(row, col) as Cell)
    }

    /// Where a piece standing on `from` stops when pushed in `dir`, or `None`
    /// if it cannot move at all.
    #[inline]
    pub fn slide(&self, occupied: &Occupancy, from: Cell, dir: usize) -> Option<Cell> {
        let mut pos = from;
        while let Some(next) = self.step(pos, dir) {
            if occupied.contains(next) {
                break;
            }
            pos = next;
        }
        (pos != from).then_some(pos)
    }

    pub fn free_cells(&self) -> impl Iterator<Item = Cell> + '_ {
        (0..self.size() as Cell).filter(move |&c| !self.is_wall(c))
    }

    /// Returns a copy of the board where every square that is not
    /// 4-connected to one of `seeds` has become a wall.
    pub fn flood(&self, seeds: &[Cell]) -> Board {
        let size = self.size();
        let mut visited = vec![false; size];
        let mut queue = VecDeque::with_capacity(size);
        for &seed in seeds {
            if self.is_free(seed) && !visited[seed as usize] {
                visited[seed as usize] = true;
                queue.push_back(seed);
            }
        }
        while let Some(current) = queue.pop_front() {
            for dir in 0..NUM_DIRECTIONS {
                if let Some(next) = self.step(current, dir) {
                    if !visited[next as usize] {
                        visited[next as usize] = true;
                        queue.push_back(next);
                    }
                }
            }
        }

        let walls: Vec<bool> = (0..size).map(|i| !visited[i]).collect();
        let mut flooded = Board {
            width: self.width,
            height: self.height,
            walls: vec![0u64; self.walls.len()],
            neighbours: vec![[NO_CELL; NUM_DIRECTIONS]; size],
        };
        for (idx, &wall) in walls.iter().enumerate() {
            if wall {
                flooded.walls[idx / 64] |= 1u64 << (idx % 64);
            }
        }
        flooded.link_neighbours();
        flooded
    }
}

/// Bitset of squares covered by pieces, rebuilt once per expanded node.
#[derive(Clone, Debug)]
pub struct Occupancy {
    words: Vec<u64>,
}

impl Occupancy {
    pub fn new(size: usize) -> Self {
        Occupancy {
            words: vec![0u64; (size + 63) / 64],
        }
    }

    #[inline(always)]
    pub fn contains(&self, cell: Cell) -> bool {
        let idx = cell as usize;
        (self.words[idx / 64] & (1u64 << (idx % 64))) != 0
    }

    #[inline(always)]
    pub fn insert(&mut self, cell: Cell) {
        let idx = cell as usize;
        self.words[idx / 64] |= 1u64 << (idx % 64);
    }

    #[inline(always)]
    pub fn remove(&mut self, cell: Cell) {
        let idx = cell as usize;
        self.words[idx / 64] &= !(1u64 << (idx % 64));
    }

    pub fn fill(&mut self, cells: &[Cell]) {
        self.words.iter_mut().for_each(|w| *w = 0);
        for &c in cells {
            self.insert(c);
        }
    }
}

/// All-pairs distances in the relaxed move model: one move carries a piece
/// any number of free squares in a straight line, other pieces ignored.
#[derive(Clone, Debug)]
pub struct RelaxedDistances {
    cells: usize,
    table: Vec<u16>,
}

impl RelaxedDistances {
    pub fn compute(board: &Board) -> Self {
        let cells = board.size();
        let mut table = vec![UNREACHABLE; cells * cells];
        table
            .par_chunks_mut(cells)
            .enumerate()
            .for_each(|(source, row)| bfs_from(board, source as Cell, row));
        RelaxedDistances { cells, table }
    }

    #[inline(always)]
    pub fn get(&self, a: Cell, b: Cell) -> u16 {
        self.table[a as usize * self.cells + b as usize]
    }

    /// Distance from `a` to the nearest of `targets`.
    #[inline]
    pub fn nearest(&self, a: Cell, targets: &[Cell]) -> u16 {
        targets
            .iter()
            .map(|&t| self.get(a, t))
            .min()
            .unwrap_or(UNREACHABLE)
    }

    pub fn memory_bytes(&self) -> usize {
        self.table.len() * std::mem::size_of::<u16>()
    }
}

fn bfs_from(board: &Board, source: Cell, dist: &mut [u16]) {
    if board.is_wall(source) {
        return;
    }
    let mut queue = VecDeque::with_capacity(64);
    dist[source as usize] = 0;
    queue.push_back(source);

    while let Some(current) = queue.pop_front() {
        let next_dist = dist[current as usize] + 1;
        for dir in 0..NUM_DIRECTIONS {
            let mut pos = current;
            while let Some(next) = board.step(pos, dir) {
                if dist[next as usize] > next_dist {
                    dist[next as usize] = next_dist;
                    queue.push_back(next);
                }
                pos = next;
            }
        }
    }
}

//! Level files: instance name, atom count, `W H`, the board rows, `MW MH`,
//! the molecule rows, then the number of goal placements and of free cells.
//! On the board `#` is a wall and alphanumeric characters are atoms; in the
//! molecule alphanumeric characters are atoms and anything else is empty.

use std::path::Path;

use log::warn;
use memchr::memchr_iter;

use crate::board::{Board, Cell, DIR_CHARS, DIR_OFFSETS};
use crate::context::Puzzle;
use crate::error::LevelError;
use crate::state::Placement;

#[derive(Clone, Debug)]
pub struct Level {
    pub name: String,
    pub puzzle: Puzzle,
    /// Label of every atom, in atom order.
    pub labels: Vec<u8>,
    pub expected_goals: usize,
    pub free_cells: usize,
}

impl Level {
    pub fn load(path: &Path) -> Result<Self, LevelError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, LevelError> {
        let mut lines = Lines::new(text);
        let name = lines.next("instance name")?.trim().to_string();
        let atom_count: usize = lines.number("atom count")?;
        let (width, height) = lines.pair("board size")?;

        let mut walls = vec![false; width * height];
        let mut atoms: Vec<(u8, Cell)> = Vec::new();
        for row in 0..height {
            let line = lines.next("board row")?.as_bytes();
            if line.len() < width {
                return Err(lines.malformed(format!("board row has {} squares, expected {}", line.len(), width)));
            }
            for (col, &ch) in line[..width].iter().enumerate() {
                let cell = (row * width + col) as Cell;
                match ch {
                    b'#' => walls[cell as usize] = true,
                    ch if ch.is_ascii_alphanumeric() => atoms.push((ch, cell)),
                    _ => {}
                }
            }
        }
        if atoms.len() != atom_count {
            return Err(LevelError::LabelMismatch(format!(
                "board holds {} atoms, header says {}",
                atoms.len(),
                atom_count
            )));
        }

        let (mole_width, mole_height) = lines.pair("molecule size")?;
        if mole_width > width || mole_height > height {
            return Err(lines.malformed("molecule is larger than the board".into()));
        }
        let mut molecule: Vec<(u8, usize, usize)> = Vec::new();
        for mr in 0..mole_height {
            let line = lines.next("molecule row")?.as_bytes();
            for (mc, &ch) in line.iter().take(mole_width).enumerate() {
                if ch.is_ascii_alphanumeric() {
                    molecule.push((ch, mr, mc));
                }
            }
        }
        let expected_goals: usize = lines.number("goal placement count")?;
        let free_cells: usize = lines.number("free cell count")?;

        // Groups ordered by size, singletons first.
        let mut kinds: Vec<(usize, u8)> = Vec::new();
        for &(label, _) in &atoms {
            match kinds.iter_mut().find(|(_, l)| *l == label) {
                Some((count, _)) => *count += 1,
                None => kinds.push((1, label)),
            }
        }
        kinds.sort_unstable();

        let mut labels = Vec::with_capacity(atom_count);
        let mut initial = Vec::with_capacity(atom_count);
        for &(count, label) in &kinds {
            let in_molecule = molecule.iter().filter(|(l, _, _)| *l == label).count();
            if in_molecule != count {
                return Err(LevelError::LabelMismatch(format!(
                    "label '{}' appears {} times on the board and {} times in the molecule",
                    label as char, count, in_molecule
                )));
            }
            labels.extend(std::iter::repeat(label).take(count));
            initial.extend(atoms.iter().filter(|(l, _)| *l == label).map(|&(_, c)| c));
        }
        if molecule.len() != atom_count {
            return Err(LevelError::LabelMismatch("molecule has atoms the board does not".into()));
        }

        let mut goals = Vec::new();
        for r in 0..=height - mole_height {
            for c in 0..=width - mole_width {
                let fits = molecule
                    .iter()
                    .all(|&(_, mr, mc)| !walls[(r + mr) * width + c + mc]);
                if !fits {
                    continue;
                }
                let mut goal = Vec::with_capacity(atom_count);
                for &(_, label) in &kinds {
                    goal.extend(
                        molecule
                            .iter()
                            .filter(|(l, _, _)| *l == label)
                            .map(|&(_, mr, mc)| ((r + mr) * width + c + mc) as Cell),
                    );
                }
                goals.push(goal);
            }
        }
        if goals.len() != expected_goals {
            warn!(
                "{}: {} goal placements fit the board, the level file says {}",
                name,
                goals.len(),
                expected_goals
            );
        }

        let board = Board::new(width, height, &walls)
            .map_err(|e| LevelError::Malformed { line: 3, reason: e.to_string() })?;
        Ok(Level {
            name,
            puzzle: Puzzle {
                board,
                initial,
                goals,
                group_sizes: kinds.iter().map(|&(count, _)| count).collect(),
            },
            labels,
            expected_goals,
            free_cells,
        })
    }

    pub fn render(&self, placement: &[Cell]) -> String {
        render(&self.puzzle.board, &self.labels, placement)
    }
}

/// Text picture of `placement` on `board`, one line per row.
pub fn render(board: &Board, labels: &[u8], placement: &[Cell]) -> String {
    let mut grid: Vec<u8> = (0..board.size() as Cell)
        .map(|c| if board.is_wall(c) { b'#' } else { b'.' })
        .collect();
    for (&cell, &label) in placement.iter().zip(labels) {
        grid[cell as usize] = label;
    }
    grid.chunks(board.width())
        .map(|row| String::from_utf8_lossy(row).into_owned())
        .collect::<Vec<_>>()
        .join("\n")
}

/// One `label (row, col) direction` entry per move along `path`.
pub fn describe_moves(board: &Board, labels: &[u8], path: &[Placement]) -> Vec<String> {
    path.windows(2)
        .filter_map(|step| {
            let (before, after) = (&step[0], &step[1]);
            let atom = before.iter().position(|c| !after.contains(c))?;
            let from = board.point(before[atom]);
            let to = board.point(*after.iter().find(|c| !before.contains(c))?);
            let delta = ((to.row - from.row).signum() as i8, (to.col - from.col).signum() as i8);
            let dir = DIR_OFFSETS.iter().position(|&d| d == delta)?;
            Some(format!(
                "{} ({}, {}) {}",
                labels[atom] as char, from.row, from.col, DIR_CHARS[dir]
            ))
        })
        .collect()
}

/// Line cursor that remembers where it is for error messages.
struct Lines<'a> {
    text: &'a str,
    ends: Vec<usize>,
    index: usize,
}

impl<'a> Lines<'a> {
    fn new(text: &'a str) -> Self {
        let mut ends: Vec<usize> = memchr_iter(b'\n', text.as_bytes()).collect();
        if !text.ends_with('\n') {
            ends.push(text.len());
        }
        Lines { text, ends, index: 0 }
    }

    fn malformed(&self, reason: String) -> LevelError {
        LevelError::Malformed {
            line: self.index,
            reason,
        }
    }

    fn next(&mut self, what: &str) -> Result<&'a str, LevelError> {
        let Some(&end) = self.ends.get(self.index) else {
            self.index += 1;
            return Err(self.malformed(format!("missing {}", what)));
        };
        let start = if self.index == 0 { 0 } else { self.ends[self.index - 1] + 1 };
        self.index += 1;
        Ok(self.text[start..end].trim_end_matches('\r'))
    }

    fn number(&mut self, what: &str) -> Result<usize, LevelError> {
        let line = self.next(what)?;
        line.trim()
            .parse()
            .map_err(|_| self.malformed(format!("{} '{}' is not a number", what, line.trim())))
    }

    fn pair(&mut self, what: &str) -> Result<(usize, usize), LevelError> {
        let line = self.next(what)?;
        let mut parts = line.split_whitespace().map(str::parse::<usize>);
        match (parts.next(), parts.next()) {
            (Some(Ok(a)), Some(Ok(b))) if a > 0 && b > 0 => Ok((a, b)),
            _ => Err(self.malformed(format!("{} '{}' is not two positive numbers", what, line))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TINY: &str = "tiny\n3\n5 4\n#####\n#H.O#\n#..H#\n#####\n2 2\nHO\nH.\n2\n6\n";

    #[test]
    fn test_parses_groups_and_goal_placements() {
        let level = Level::parse(TINY).unwrap();
        let board = &level.puzzle.board;
        let at = |r, c| board.cell_at(r, c).unwrap();
        assert_eq!(level.name, "tiny");
        assert_eq!(level.labels, b"OHH".to_vec());
        assert_eq!(level.puzzle.group_sizes, vec![1, 2]);
        assert_eq!(level.puzzle.initial, vec![at(1, 3), at(1, 1), at(2, 3)]);
        assert_eq!(
            level.puzzle.goals,
            vec![vec![at(1, 2), at(1, 1), at(2, 1)], vec![at(1, 3), at(1, 2), at(2, 2)]]
        );
        assert_eq!(level.expected_goals, 2);
        assert_eq!(level.free_cells, 6);
    }

    #[test]
    fn test_render_draws_walls_and_labels() {
        let level = Level::parse(TINY.replace('\n', "\r\n").as_str()).unwrap();
        assert_eq!(level.render(&level.puzzle.initial), "#####\n#H.O#\n#..H#\n#####");
    }

    #[test]
    fn test_describes_each_slide() {
        let level = Level::parse(TINY).unwrap();
        let board = &level.puzzle.board;
        let at = |r, c| board.cell_at(r, c).unwrap();
        let path: Vec<Placement> = vec![
            Placement::from_slice(&[at(1, 3), at(1, 1), at(2, 3)]),
            Placement::from_slice(&[at(1, 3), at(1, 1), at(2, 1)]),
            Placement::from_slice(&[at(1, 2), at(1, 1), at(2, 1)]),
        ];
        assert_eq!(describe_moves(board, &level.labels, &path), vec!["H (2, 3) l", "O (1, 3) l"]);
    }

    #[test]
    fn test_reports_line_of_malformed_input() {
        let err = Level::parse("tiny\n3\nfive 4\n").unwrap_err();
        assert!(matches!(err, LevelError::Malformed { line: 3, .. }), "{err}");
        let err = Level::parse("tiny\n3\n5 4\n#####\n").unwrap_err();
        assert!(matches!(err, LevelError::Malformed { line: 5, .. }), "{err}");
    }

    #[test]
    fn test_molecule_must_match_board_labels() {
        let text = TINY.replace("HO\nH.", "HO\nO.");
        assert!(matches!(Level::parse(&text), Err(LevelError::LabelMismatch(_))));
    }
}

use std::error::Error;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::io;

/// Failure modes of a search invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolveError {
    /// The states arena ran out of room for the configured memory budget.
    CapacityExceeded { capacity: usize },
    /// The cancellation token was observed while popping a node.
    Cancelled,
    /// The open list emptied without reaching a solved configuration.
    NoSolutionAtBound { bound: u8 },
    /// A value does not fit the numeric widths chosen for this puzzle.
    ConfigurationOverflow {
        what: &'static str,
        value: u64,
        limit: u64,
    },
    /// Board, goals and atom groups do not describe a consistent puzzle.
    InvalidPuzzle(String),
}

impl SolveError {
    /// Errors that end a whole run instead of a single bound iteration.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SolveError::CapacityExceeded { .. } | SolveError::Cancelled
        )
    }
}

impl Display for SolveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SolveError::CapacityExceeded { capacity } => {
                write!(f, "Maximum number of states reached ({capacity})")
            }
            SolveError::Cancelled => write!(f, "Search cancelled"),
            SolveError::NoSolutionAtBound { bound } => {
                write!(f, "No solution with at most {bound} moves")
            }
            SolveError::ConfigurationOverflow { what, value, limit } => {
                write!(f, "{what} is {value}, which exceeds the limit of {limit}")
            }
            SolveError::InvalidPuzzle(reason) => write!(f, "Invalid puzzle: {reason}"),
        }
    }
}

impl Error for SolveError {}

/// Failure modes of reading a level file.
#[derive(Debug)]
pub enum LevelError {
    Io(io::Error),
    Malformed { line: usize, reason: String },
    LabelMismatch(String),
}

impl Display for LevelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LevelError::Io(e) => write!(f, "Failed to read level: {e}"),
            LevelError::Malformed { line, reason } => {
                write!(f, "Malformed level at line {line}: {reason}")
            }
            LevelError::LabelMismatch(reason) => {
                write!(f, "Molecule does not match the atoms on the board: {reason}")
            }
        }
    }
}

impl Error for LevelError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LevelError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for LevelError {
    fn from(e: io::Error) -> Self {
        LevelError::Io(e)
    }
}

//! Optimal solver for Atomix-style sliding puzzles: atoms slide until blocked
//! and have to be assembled into a molecule somewhere on the board.

pub mod board;
pub mod config;
pub mod context;
pub mod error;
pub mod heuristic;
pub mod level;
pub mod search;
pub mod solver;
pub mod state;
pub mod stats;
pub mod table;
pub mod tie_break;
pub mod watchdog;

pub use config::SolverConfig;
pub use context::{Puzzle, PuzzleContext};
pub use error::{LevelError, SolveError};
pub use solver::{initial_heuristic, solve, SolveReport};
pub use watchdog::{CancelToken, Watchdog};

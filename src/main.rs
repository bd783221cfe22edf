use std::error::Error;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use log::info;

use atomix_solver::config::{Algorithm, GoalMode, PdbKind, PdbSelection, TieBreaking};
use atomix_solver::config::{DEFAULT_HASH_LOAD_FACTOR, DEFAULT_MAX_F};
use atomix_solver::level::{describe_moves, Level};
use atomix_solver::{initial_heuristic, solve, CancelToken, PuzzleContext, SolveReport, SolverConfig, Watchdog};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the level file
    level: PathBuf,

    #[arg(long, value_enum, default_value_t = Algorithm::AStar)]
    algorithm: Algorithm,

    #[arg(long, value_enum, default_value_t = GoalMode::AllGoals)]
    goal_mode: GoalMode,

    #[arg(long, value_enum, default_value_t = TieBreaking::GoalCount)]
    tie_breaking: TieBreaking,

    #[arg(long, value_enum, default_value_t = PdbKind::None)]
    pdb: PdbKind,

    /// Number of static pattern database groupings
    #[arg(long, default_value_t = 1)]
    static_pdbs: usize,

    #[arg(long, value_enum, default_value_t = PdbSelection::Greedy)]
    pdb_selection: PdbSelection,

    /// Memory budget in MiB for tables and stored states
    #[arg(long, default_value_t = 3500)]
    memory: usize,

    /// Time limit in seconds
    #[arg(long)]
    time: Option<u64>,

    /// Largest number of moves to search
    #[arg(long)]
    move_bound: Option<u8>,

    /// Largest f value a node may have
    #[arg(long, default_value_t = DEFAULT_MAX_F)]
    max_f: u8,

    /// Hash slots per stored state
    #[arg(long, default_value_t = DEFAULT_HASH_LOAD_FACTOR)]
    load_factor: f64,

    /// Seed for random tie-breaking and pattern database selection
    #[arg(long)]
    seed: Option<u64>,

    /// Write a report file here
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the heuristic value of the initial placement and exit
    #[arg(long)]
    initial_heuristic: bool,
}

impl Args {
    fn config(&self) -> SolverConfig {
        SolverConfig {
            algorithm: self.algorithm,
            goal_mode: self.goal_mode,
            tie_breaking: self.tie_breaking,
            pdb: self.pdb,
            static_pdbs: self.static_pdbs,
            pdb_selection: self.pdb_selection,
            memory_budget_bytes: self.memory.saturating_mul(1024 * 1024),
            time_limit: self.time.map(Duration::from_secs),
            move_bound: self.move_bound,
            max_f: self.max_f,
            hash_load_factor: self.load_factor,
            seed: self.seed,
        }
    }
}

fn report_text(level: &Level, config: &SolverConfig, report: &SolveReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Instance: {}", level.name);
    let _ = writeln!(out, "Atoms: {}", level.labels.len());
    let _ = writeln!(out, "Goal placements: {}", level.puzzle.goals.len());
    let _ = writeln!(out, "Configuration: {:?}", config);
    match &report.result {
        Ok(path) => {
            let _ = writeln!(out, "Solution ({} moves):", path.len() - 1);
            for (i, mv) in describe_moves(&level.puzzle.board, &level.labels, path).iter().enumerate() {
                let _ = writeln!(out, "  Move {}: {}", i + 1, mv);
            }
            if let Some(last) = path.last() {
                let _ = writeln!(out, "{}", level.render(last));
            }
        }
        Err(e) => {
            let _ = writeln!(out, "No solution: {}", e);
        }
    }
    let _ = writeln!(out, "{}", report.stats);
    out
}

fn run(args: &Args) -> Result<ExitCode, Box<dyn Error>> {
    let level = Level::load(&args.level)?;
    let config = args.config();
    info!("loaded {} with {} atoms", level.name, level.labels.len());
    println!("{}\n", level.render(&level.puzzle.initial));

    let ctx = PuzzleContext::new(level.puzzle.clone(), &config)?;
    if args.initial_heuristic {
        println!("Initial heuristic: {}", initial_heuristic(&ctx, &config)?);
        return Ok(ExitCode::SUCCESS);
    }

    let cancel = CancelToken::new();
    let report = {
        let _watchdog = Watchdog::start(&cancel, config.time_limit, Some(config.memory_budget_bytes));
        solve(&ctx, &config, &cancel)
    };

    let text = report_text(&level, &config, &report);
    print!("{}", text);
    if let Some(path) = &args.output {
        std::fs::write(path, &text)?;
        info!("report written to {}", path.display());
    }
    Ok(if report.result.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(&args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

//! Tic-Tac-Toe against the device, in a terminal.
//!
//! Cells are numbered 1-9. Commands: `n` new game, `d <level>` change
//! difficulty, `q` quit. With `--save`, the game is restored from and
//! written back to a JSON file.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use tictactoe::{
    DeterministicRng,
    game::{DifficultyLevel, LocalMoveError, LocalSession, SavedSession},
};

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "tictactoe-local", version, about = "Play tic-tac-toe against the device")]
struct Cli {
    /// Opponent difficulty for a fresh game.
    #[arg(short, long, value_enum, default_value_t = Level::Expert)]
    difficulty: Level,

    /// Restore from and save to this file.
    #[arg(long)]
    save: Option<PathBuf>,

    /// Pause before showing the device's reply, in milliseconds.
    #[arg(long, default_value_t = 500)]
    delay_ms: u64,

    /// Seed the device's random choices.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Level {
    Easy,
    Harder,
    Expert,
}

impl From<Level> for DifficultyLevel {
    fn from(level: Level) -> Self {
        match level {
            Level::Easy => DifficultyLevel::Easy,
            Level::Harder => DifficultyLevel::Harder,
            Level::Expert => DifficultyLevel::Expert,
        }
    }
}

fn parse_level(s: &str) -> Option<DifficultyLevel> {
    match s.trim().to_ascii_lowercase().as_str() {
        "easy" | "0" => Some(DifficultyLevel::Easy),
        "harder" | "1" => Some(DifficultyLevel::Harder),
        "expert" | "2" => Some(DifficultyLevel::Expert),
        _ => None,
    }
}

fn load(path: &Path) -> Result<Option<SavedSession>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let saved = SavedSession::from_json(&text)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(saved))
}

fn store(path: &Path, session: &LocalSession) -> Result<()> {
    let json = session.save().to_json()?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    debug!(path = %path.display(), "session saved");
    Ok(())
}

fn show(session: &LocalSession) {
    println!();
    print!("{}", session.board());
    println!("[{}] {}", session.difficulty().label(), session.status_text());
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let rng = match cli.seed {
        Some(seed) => DeterministicRng::new(seed),
        None => DeterministicRng::from_entropy(),
    };

    let saved = match &cli.save {
        Some(path) => load(path)?,
        None => None,
    };
    let mut session = match saved {
        Some(saved) => {
            info!("restored saved game");
            LocalSession::restore(&saved, rng)
        }
        None => LocalSession::with_rng(cli.difficulty.into(), rng),
    };
    let delay = Duration::from_millis(cli.delay_ms);

    show(&session);
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("> ");
        io::stdout().flush()?;
        let Some(line) = lines.next() else { break };
        let line = line?;
        let input = line.trim();

        match input {
            "" => continue,
            "q" | "quit" => break,
            "n" | "new" => {
                session.new_game();
                show(&session);
                continue;
            }
            _ => {}
        }

        if let Some(level) = input.strip_prefix("d ") {
            match parse_level(level) {
                Some(level) => {
                    session.set_difficulty(level);
                    println!("Difficulty: {}", level.label());
                }
                None => println!("Levels: easy, harder, expert"),
            }
            continue;
        }

        let Ok(cell) = input.parse::<usize>() else {
            println!("Enter a cell 1-9, n, d <level> or q");
            continue;
        };
        if !(1..=9).contains(&cell) {
            println!("Cells are numbered 1-9");
            continue;
        }

        match session.human_move(cell - 1) {
            Ok(report) => {
                if report.device_move.is_some() && !delay.is_zero() {
                    println!("Device's turn.");
                    thread::sleep(delay);
                }
                show(&session);
            }
            Err(LocalMoveError::GameOver) => println!("Game over. Press n for a new game."),
            Err(e) => println!("{}", e),
        }
    }

    if let Some(path) = &cli.save {
        if let Err(e) = store(path, &session) {
            warn!("could not save game: {:#}", e);
        }
    }
    Ok(())
}

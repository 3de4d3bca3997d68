//! Configuration for Stockfish Studio.
//!
//! Every value has a compile-time default and can be overridden at runtime
//! via a dedicated environment variable. Command-line flags take precedence
//! over both (see `main.rs`).

use std::path::PathBuf;

use crate::clock::TimeControl;

/// Default directory for the rolling log file.
const DEFAULT_LOG_DIR: &str = "logs";

/// Default engine strength (Stockfish `Skill Level`, 0-20).
const DEFAULT_SKILL_LEVEL: u8 = 10;

const MAX_SKILL_LEVEL: u8 = 20;

/// Get an explicit path to the bundled engine binary.
///
/// Priority:
/// 1. `STOCKFISH_STUDIO_ENGINE` env variable if set
/// 2. `None`: the engine is looked up in well-known locations and `PATH`
pub fn get_engine_path() -> Option<PathBuf> {
    std::env::var_os("STOCKFISH_STUDIO_ENGINE")
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
}

/// Get the directory the log file is written to.
///
/// Priority:
/// 1. `STOCKFISH_STUDIO_LOG_DIR` env variable if set
/// 2. `./logs` as fallback
pub fn get_log_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("STOCKFISH_STUDIO_LOG_DIR") {
        return PathBuf::from(dir);
    }

    PathBuf::from(DEFAULT_LOG_DIR)
}

/// Get the initial engine skill level.
///
/// Priority:
/// 1. `STOCKFISH_STUDIO_SKILL` env variable if set (falls back to the default
///    if it is not a number, clamped to 20)
/// 2. `10` as fallback
pub fn get_skill_level() -> u8 {
    parse_skill_level(std::env::var("STOCKFISH_STUDIO_SKILL").ok().as_deref())
}

fn parse_skill_level(value: Option<&str>) -> u8 {
    value
        .and_then(|v| v.trim().parse::<u8>().ok())
        .unwrap_or(DEFAULT_SKILL_LEVEL)
        .min(MAX_SKILL_LEVEL)
}

/// Get the initial time control.
///
/// Priority:
/// 1. `STOCKFISH_STUDIO_TIME_CONTROL` env variable if set and valid
/// 2. unlimited
pub fn get_time_control() -> TimeControl {
    parse_time_control(std::env::var("STOCKFISH_STUDIO_TIME_CONTROL").ok().as_deref())
}

fn parse_time_control(value: Option<&str>) -> TimeControl {
    match value.map(str::parse::<TimeControl>) {
        Some(Ok(control)) => control,
        Some(Err(e)) => {
            tracing::warn!("Ignoring STOCKFISH_STUDIO_TIME_CONTROL: {}", e);
            TimeControl::Unlimited
        }
        None => TimeControl::Unlimited,
    }
}

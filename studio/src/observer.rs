//! Callbacks through which the studio reports to its front-end.

use std::time::Duration;

use chess::{PieceKind, PlayerSide};
use engine::AnalysisLine;
use serde::Serialize;

use crate::evaluation::Evaluation;

/// A move that was applied to the game.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedMove {
    pub uci: String,
    pub san: String,
    pub side: PlayerSide,
    pub by_engine: bool,
    pub captured: Option<PieceKind>,
    /// Position after the move.
    pub fen: String,
    /// Opponent pieces the human has taken, most valuable first.
    pub captured_by_player: Vec<PieceKind>,
    /// Human pieces the engine has taken, most valuable first.
    pub captured_by_engine: Vec<PieceKind>,
}

/// Suggested move for the human.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hint {
    pub from: String,
    pub to: String,
    pub san: Option<String>,
}

/// Receives studio notifications. Every method defaults to a no-op.
pub trait StudioObserver {
    fn on_evaluation_updated(&mut self, _evaluation: &Evaluation) {}
    fn on_analysis_line_updated(&mut self, _rank: u8, _line: &AnalysisLine) {}
    fn on_hint_ready(&mut self, _hint: &Hint) {}
    fn on_move_applied(&mut self, _applied: &AppliedMove) {}
    fn on_status_message(&mut self, _message: &str) {}
    fn on_engine_error(&mut self, _message: &str) {}
    fn on_clock_updated(&mut self, _white: Option<Duration>, _black: Option<Duration>) {}
}

/// Observer that ignores everything.
impl StudioObserver for () {}

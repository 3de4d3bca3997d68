use engine::TransportError;

use crate::clock::ClockError;

#[derive(Debug, thiserror::Error)]
pub enum StudioError {
    #[error("Invalid position: {0}")]
    InvalidPositionNotation(String),
    #[error(transparent)]
    Clock(#[from] ClockError),
    #[error(transparent)]
    Engine(#[from] TransportError),
    #[error("Illegal move: {0}")]
    IllegalMove(String),
    #[error("Invalid move notation: {0}")]
    InvalidMoveNotation(#[from] chess::UciMoveError),
    #[error("{0}")]
    MoveNotAllowed(&'static str),
}

//! Chess rules adapter for Stockfish Studio.
//!
//! Wraps `cozy-chess` with the operations the studio needs from a rules
//! collaborator: FEN load/save, legal move application, SAN, UCI notation,
//! capture accounting and PGN movetext.

pub mod fen;
pub mod game;
pub mod material;
pub mod pgn;
pub mod san;
pub mod types;
pub mod uci;

pub use fen::FenError;
pub use game::{Game, GameError, HistoryEntry};
pub use material::missing_pieces;
pub use san::{format_san, pv_to_san};
pub use types::{PieceKind, PlayerSide};
pub use uci::{
    convert_uci_castling_to_cozy, format_square, format_uci_move, parse_square, parse_uci_move,
    UciMoveError,
};

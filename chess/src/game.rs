use cozy_chess::{Board, GameStatus, Move, Piece, Square};

use crate::fen::{format_fen, parse_fen, FenError};
use crate::san::format_san;
use crate::types::{PieceKind, PlayerSide};
use crate::uci::convert_uci_castling_to_cozy;

/// Authoritative game state wrapper around a cozy-chess Board
#[derive(Debug, Clone)]
pub struct Game {
    position: Board,
    history: Vec<HistoryEntry>,
    start_fen: Option<String>,
    /// Hash of the starting position and of the position after every move.
    hashes: Vec<u64>,
}

/// A move as it was played, with the details the studio reports.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub mv: Move,
    pub piece: PieceKind,
    pub side: PlayerSide,
    pub captured: Option<PieceKind>,
    pub san: String,
    /// FEN after this move
    pub fen: String,
}

impl Game {
    /// Create a new game from the standard starting position
    pub fn new() -> Self {
        let position = Board::default();
        Self {
            hashes: vec![position.hash()],
            position,
            history: Vec::new(),
            start_fen: None,
        }
    }

    /// Create a game from a FEN string
    pub fn from_fen(fen: &str) -> Result<Self, GameError> {
        let position = parse_fen(fen)?;
        Ok(Self {
            hashes: vec![position.hash()],
            position,
            history: Vec::new(),
            start_fen: Some(fen.trim().to_string()),
        })
    }

    /// Get the current board position
    pub fn position(&self) -> &Board {
        &self.position
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// FEN the game started from, `None` for the standard position.
    pub fn start_fen(&self) -> Option<&str> {
        self.start_fen.as_deref()
    }

    /// Make a move on the board.
    ///
    /// Castling may be given either in UCI form (e1g1) or in cozy-chess
    /// form (e1h1).
    pub fn make_move(&mut self, mv: Move) -> Result<HistoryEntry, GameError> {
        let legal = self.legal_moves();
        let mv = convert_uci_castling_to_cozy(mv, &legal);
        if !legal.contains(&mv) {
            return Err(GameError::IllegalMove);
        }

        let piece = self
            .position
            .piece_on(mv.from)
            .ok_or(GameError::IllegalMove)?;
        let side = PlayerSide::from(self.position.side_to_move());
        let captured = self.captured_piece(mv, piece);
        let san = format_san(&self.position, mv);

        self.position.play_unchecked(mv);
        self.hashes.push(self.position.hash());

        let entry = HistoryEntry {
            mv,
            piece: piece.into(),
            side,
            captured,
            san,
            fen: self.to_fen(),
        };
        self.history.push(entry.clone());

        Ok(entry)
    }

    fn captured_piece(&self, mv: Move, piece: Piece) -> Option<PieceKind> {
        let mover = self.position.side_to_move();
        match self.position.color_on(mv.to) {
            Some(color) if color != mover => self.position.piece_on(mv.to).map(PieceKind::from),
            Some(_) => None, // castling, king onto own rook
            None if piece == Piece::Pawn && mv.from.file() != mv.to.file() => {
                Some(PieceKind::Pawn)
            }
            None => None,
        }
    }

    /// Undo the last move
    pub fn undo(&mut self) -> Result<HistoryEntry, GameError> {
        let entry = self.history.pop().ok_or(GameError::NothingToUndo)?;
        self.hashes.pop();
        self.rebuild_position()?;
        Ok(entry)
    }

    /// Get all legal moves for the current position
    pub fn legal_moves(&self) -> Vec<Move> {
        let mut moves = Vec::new();
        self.position.generate_moves(|mvs| {
            moves.extend(mvs);
            false
        });
        moves
    }

    pub fn status(&self) -> GameStatus {
        self.position.status()
    }

    pub fn side_to_move(&self) -> PlayerSide {
        self.position.side_to_move().into()
    }

    pub fn in_check(&self) -> bool {
        !self.position.checkers().is_empty()
    }

    pub fn is_checkmate(&self) -> bool {
        self.status() == GameStatus::Won
    }

    pub fn is_stalemate(&self) -> bool {
        self.status() == GameStatus::Drawn && !self.in_check() && self.legal_moves().is_empty()
    }

    /// Stalemate, the fifty-move rule, insufficient material or threefold
    /// repetition.
    pub fn is_draw(&self) -> bool {
        self.status() == GameStatus::Drawn
            || self.is_insufficient_material()
            || self.is_threefold_repetition()
    }

    /// Neither side can mate: bare kings, a single minor piece, or only
    /// bishops that all stand on squares of one colour.
    pub fn is_insufficient_material(&self) -> bool {
        let board = &self.position;
        let heavy =
            board.pieces(Piece::Pawn) | board.pieces(Piece::Rook) | board.pieces(Piece::Queen);
        if !heavy.is_empty() {
            return false;
        }
        let knights = board.pieces(Piece::Knight);
        let bishops = board.pieces(Piece::Bishop);
        if knights.len() + bishops.len() <= 1 {
            return true;
        }
        if !knights.is_empty() {
            return false;
        }
        let mut colours = bishops.into_iter().map(is_light_square);
        let first = colours.next();
        colours.all(|light| Some(light) == first)
    }

    /// The current position has occurred at least three times.
    pub fn is_threefold_repetition(&self) -> bool {
        let Some(current) = self.hashes.last() else {
            return false;
        };
        self.hashes.iter().filter(|hash| *hash == current).count() >= 3
    }

    pub fn is_game_over(&self) -> bool {
        self.status() != GameStatus::Ongoing || self.is_draw()
    }

    /// Export position to FEN string
    pub fn to_fen(&self) -> String {
        format_fen(&self.position)
    }

    /// Rebuild position from start + history (for undo)
    fn rebuild_position(&mut self) -> Result<(), GameError> {
        let mut board = match &self.start_fen {
            None => Board::default(),
            Some(fen) => parse_fen(fen)?,
        };

        for entry in &self.history {
            board
                .try_play(entry.mv)
                .map_err(|_| GameError::IllegalMove)?;
        }

        self.position = board;
        Ok(())
    }
}

fn is_light_square(square: Square) -> bool {
    (square.file() as usize + square.rank() as usize) % 2 == 1
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("Illegal move")]
    IllegalMove,
    #[error("Nothing to undo")]
    NothingToUndo,
    #[error("FEN parse error: {0}")]
    FenError(#[from] FenError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uci::parse_uci_move;

    fn play(game: &mut Game, uci: &str) -> HistoryEntry {
        game.make_move(parse_uci_move(uci).unwrap()).unwrap()
    }

    #[test]
    fn test_make_move_records_san_and_fen() {
        let mut game = Game::new();
        let entry = play(&mut game, "e2e4");
        assert_eq!(entry.san, "e4");
        assert_eq!(entry.side, PlayerSide::White);
        assert_eq!(game.side_to_move(), PlayerSide::Black);
        assert!(entry
            .fen
            .starts_with("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq"));
    }

    #[test]
    fn test_illegal_move_rejected() {
        let mut game = Game::new();
        let result = game.make_move(parse_uci_move("e2e5").unwrap());
        assert!(matches!(result, Err(GameError::IllegalMove)));
        assert!(game.history().is_empty());
    }

    #[test]
    fn test_uci_castling_accepted() {
        let mut game = Game::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
        let entry = play(&mut game, "e1g1");
        assert_eq!(entry.san, "O-O");
        assert_eq!(entry.captured, None);
    }

    #[test]
    fn test_capture_recorded() {
        let mut game = Game::new();
        for mv in ["e2e4", "d7d5"] {
            play(&mut game, mv);
        }
        let entry = play(&mut game, "e4d5");
        assert_eq!(entry.captured, Some(PieceKind::Pawn));
        assert_eq!(entry.san, "exd5");
    }

    #[test]
    fn test_undo_restores_position() {
        let mut game = Game::from_fen("4k3/8/8/8/8/8/4P3/4K3 w - - 0 1").unwrap();
        let before = game.to_fen();
        play(&mut game, "e2e4");
        game.undo().unwrap();
        assert_eq!(game.to_fen(), before);
        assert!(matches!(game.undo(), Err(GameError::NothingToUndo)));
    }

    #[test]
    fn test_fools_mate_is_checkmate() {
        let mut game = Game::new();
        for mv in ["f2f3", "e7e5", "g2g4"] {
            play(&mut game, mv);
        }
        let entry = play(&mut game, "d8h4");
        assert_eq!(entry.san, "Qh4#");
        assert!(game.is_checkmate());
        assert!(game.is_game_over());
        assert!(!game.is_stalemate());
    }

    #[test]
    fn test_insufficient_material_is_draw() {
        for fen in [
            "8/8/8/4k3/8/8/8/4K3 w - - 0 1",
            "8/8/8/4k3/8/8/8/4KN2 w - - 0 1",
            "8/8/8/4k3/8/8/8/4KB2 b - - 0 1",
            // Both bishops on light squares.
            "8/8/8/4kb2/8/8/8/3BK3 w - - 0 1",
        ] {
            let game = Game::from_fen(fen).unwrap();
            assert!(game.is_insufficient_material(), "{fen}");
            assert!(game.is_draw(), "{fen}");
            assert!(game.is_game_over(), "{fen}");
            assert!(!game.is_stalemate(), "{fen}");
        }
    }

    #[test]
    fn test_mating_material_is_not_draw() {
        for fen in [
            "8/8/8/4k3/8/8/4P3/4K3 w - - 0 1",
            "8/8/8/4k3/8/8/8/3NKN2 w - - 0 1",
            "8/8/8/4k3/8/8/8/2B1KB2 w - - 0 1",
        ] {
            let game = Game::from_fen(fen).unwrap();
            assert!(!game.is_insufficient_material(), "{fen}");
            assert!(!game.is_game_over(), "{fen}");
        }
    }

    #[test]
    fn test_threefold_repetition_is_draw() {
        let mut game = Game::new();
        for _ in 0..2 {
            for mv in ["g1f3", "g8f6", "f3g1", "f6g8"] {
                assert!(!game.is_game_over());
                play(&mut game, mv);
            }
        }
        assert!(game.is_threefold_repetition());
        assert!(game.is_draw());
        assert!(game.is_game_over());

        game.undo().unwrap();
        assert!(!game.is_threefold_repetition());
    }

    #[test]
    fn test_stalemate_detected() {
        let game = Game::from_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").unwrap();
        assert!(game.is_stalemate());
        assert!(game.is_draw());
    }
}

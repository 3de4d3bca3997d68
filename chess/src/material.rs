//! Capture accounting: which pieces a side has lost compared to the
//! starting set.

use cozy_chess::Board;

use crate::types::{PieceKind, PlayerSide};

/// Starting counts, in display order (most valuable first).
const STARTING_COUNTS: [(PieceKind, u32); 5] = [
    (PieceKind::Queen, 1),
    (PieceKind::Rook, 2),
    (PieceKind::Bishop, 2),
    (PieceKind::Knight, 2),
    (PieceKind::Pawn, 8),
];

/// Pieces of `side` no longer on the board, most valuable first.
///
/// Promotions can leave a side with more pieces of a kind than it started
/// with; such surpluses count as zero missing.
pub fn missing_pieces(board: &Board, side: PlayerSide) -> Vec<PieceKind> {
    let color: cozy_chess::Color = side.into();
    STARTING_COUNTS
        .iter()
        .flat_map(|&(kind, start)| {
            let present = board.colored_pieces(color, kind.into()).len();
            std::iter::repeat(kind).take(start.saturating_sub(present) as usize)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nothing_missing_at_start() {
        let board = Board::default();
        assert!(missing_pieces(&board, PlayerSide::White).is_empty());
        assert!(missing_pieces(&board, PlayerSide::Black).is_empty());
    }

    #[test]
    fn test_missing_pieces_ordered() {
        // White is missing the queen, one knight and two pawns.
        let board: Board = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPP2/RNB1KB1R w KQkq - 0 1"
            .parse()
            .unwrap();
        assert_eq!(
            missing_pieces(&board, PlayerSide::White),
            vec![
                PieceKind::Queen,
                PieceKind::Knight,
                PieceKind::Pawn,
                PieceKind::Pawn
            ]
        );
    }

    #[test]
    fn test_promotion_surplus_is_not_negative() {
        // White has two queens and seven pawns.
        let board: Board = "rnbqkbn1/pppppppp/8/8/8/8/PPPPPPP1/RNBQKBNQ w Qq - 0 1"
            .parse()
            .unwrap();
        assert_eq!(
            missing_pieces(&board, PlayerSide::White),
            vec![PieceKind::Rook, PieceKind::Pawn]
        );
    }
}

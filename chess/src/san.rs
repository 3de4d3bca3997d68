//! Standard Algebraic Notation.

use cozy_chess::{Board, GameStatus, Move, Piece};

use crate::types::PieceKind;
use crate::uci::{convert_uci_castling_to_cozy, file_char, format_square, parse_uci_move, rank_char};

/// Format a legal move as SAN, including check and mate suffixes.
///
/// `mv` must be legal in `board` and use cozy-chess castling notation
/// (king captures own rook).
pub fn format_san(board: &Board, mv: Move) -> String {
    let mut san = String::new();
    let piece = board.piece_on(mv.from).unwrap_or(Piece::Pawn);
    let mover = board.side_to_move();

    if piece == Piece::King && board.color_on(mv.to) == Some(mover) {
        san.push_str(if mv.to.file() as usize > mv.from.file() as usize {
            "O-O"
        } else {
            "O-O-O"
        });
    } else {
        let is_capture = board.color_on(mv.to).is_some()
            || (piece == Piece::Pawn && mv.from.file() != mv.to.file());

        if piece == Piece::Pawn {
            if is_capture {
                san.push(file_char(mv.from.file()));
            }
        } else {
            san.push(PieceKind::from(piece).to_char_upper());
            san.push_str(&disambiguation(board, mv, piece));
        }

        if is_capture {
            san.push('x');
        }
        san.push_str(&format_square(mv.to));

        if let Some(promo) = mv.promotion {
            san.push('=');
            san.push(PieceKind::from(promo).to_char_upper());
        }
    }

    let mut after = board.clone();
    after.play_unchecked(mv);
    if !after.checkers().is_empty() {
        san.push(if after.status() == GameStatus::Won {
            '#'
        } else {
            '+'
        });
    }

    san
}

/// File, rank or full square prefix needed when another piece of the same
/// kind can reach the same destination.
fn disambiguation(board: &Board, mv: Move, piece: Piece) -> String {
    let mut rivals = Vec::new();
    board.generate_moves(|moves| {
        if moves.piece == piece {
            rivals.extend(moves.into_iter().filter(|m| m.to == mv.to && m.from != mv.from));
        }
        false
    });

    if rivals.is_empty() {
        return String::new();
    }

    let shares_file = rivals.iter().any(|m| m.from.file() == mv.from.file());
    let shares_rank = rivals.iter().any(|m| m.from.rank() == mv.from.rank());

    match (shares_file, shares_rank) {
        (false, _) => file_char(mv.from.file()).to_string(),
        (true, false) => rank_char(mv.from.rank()).to_string(),
        (true, true) => format_square(mv.from),
    }
}

/// Replay a principal variation given in engine notation against a copy of
/// `board` and return the SAN of every move up to the first one that cannot
/// be parsed or is illegal.
pub fn pv_to_san<S: AsRef<str>>(board: &Board, pv: &[S]) -> Vec<String> {
    let mut position = board.clone();
    let mut sans = Vec::with_capacity(pv.len());

    for token in pv {
        let Ok(raw) = parse_uci_move(token.as_ref()) else {
            break;
        };
        let mut legal = Vec::new();
        position.generate_moves(|moves| {
            legal.extend(moves);
            false
        });
        let mv = convert_uci_castling_to_cozy(raw, &legal);
        if !legal.contains(&mv) {
            break;
        }
        sans.push(format_san(&position, mv));
        position.play_unchecked(mv);
    }

    sans
}

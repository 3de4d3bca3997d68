//! PGN export of a played game.

use crate::game::Game;
use crate::types::PlayerSide;

/// Result token for the PGN header and movetext terminator.
pub fn result_token(game: &Game) -> &'static str {
    if game.is_checkmate() {
        match game.side_to_move() {
            PlayerSide::White => "0-1",
            PlayerSide::Black => "1-0",
        }
    } else if game.is_draw() {
        "1/2-1/2"
    } else {
        "*"
    }
}

/// Render the game as PGN with the given seven-tag-roster style headers.
///
/// Games that started from a custom position carry `SetUp`/`FEN` tags and
/// number their moves from that position's fullmove counter.
pub fn format_pgn(game: &Game, tags: &[(&str, &str)]) -> String {
    let result = result_token(game);
    let mut out = String::new();

    for (name, value) in tags {
        out.push_str(&format!("[{} \"{}\"]\n", name, value.replace('"', "'")));
    }
    if let Some(fen) = game.start_fen() {
        out.push_str("[SetUp \"1\"]\n");
        out.push_str(&format!("[FEN \"{}\"]\n", fen));
    }
    out.push_str(&format!("[Result \"{}\"]\n\n", result));

    let (mut number, mut black_to_move) = match game.start_fen() {
        Some(fen) => start_counters(fen),
        None => (1, false),
    };

    let mut tokens = Vec::new();
    for (index, entry) in game.history().iter().enumerate() {
        if !black_to_move {
            tokens.push(format!("{}.", number));
        } else if index == 0 {
            tokens.push(format!("{}...", number));
        }
        tokens.push(entry.san.clone());
        if black_to_move {
            number += 1;
        }
        black_to_move = !black_to_move;
    }
    tokens.push(result.to_string());

    out.push_str(&tokens.join(" "));
    out.push('\n');
    out
}

fn start_counters(fen: &str) -> (u32, bool) {
    let fields: Vec<&str> = fen.split_whitespace().collect();
    let black_to_move = fields.get(1) == Some(&"b");
    let number = fields.get(5).and_then(|n| n.parse().ok()).unwrap_or(1);
    (number, black_to_move)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uci::parse_uci_move;

    #[test]
    fn test_fools_mate_pgn() {
        let mut game = Game::new();
        for mv in ["f2f3", "e7e5", "g2g4", "d8h4"] {
            game.make_move(parse_uci_move(mv).unwrap()).unwrap();
        }
        let pgn = format_pgn(&game, &[("Event", "Casual game")]);
        assert!(pgn.starts_with("[Event \"Casual game\"]\n[Result \"0-1\"]\n\n"));
        assert!(pgn.ends_with("1. f3 e5 2. g4 Qh4# 0-1\n"));
    }

    #[test]
    fn test_custom_start_with_black_to_move() {
        let fen = "4k3/8/8/8/8/8/4P3/4K3 b - - 0 12";
        let mut game = Game::from_fen(fen).unwrap();
        game.make_move(parse_uci_move("e8d7").unwrap()).unwrap();
        game.make_move(parse_uci_move("e2e4").unwrap()).unwrap();
        let pgn = format_pgn(&game, &[]);
        assert!(pgn.contains("[FEN \"4k3/8/8/8/8/8/4P3/4K3 b - - 0 12\"]"));
        assert!(pgn.ends_with("12... Kd7 13. e4 *\n"));
    }
}

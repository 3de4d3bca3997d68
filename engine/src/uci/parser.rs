use crate::{EngineInfo, Score, ScoreBound, Wdl};
use chess::parse_uci_move;
use cozy_chess::Move;

/// Incoming message from UCI engine
#[derive(Debug, Clone)]
pub enum UciMessage {
    Id { name: String, value: String },
    UciOk,
    ReadyOk,
    /// `mv` is `None` for the `(none)` sentinel (no legal move), the `0000`
    /// null move, or a move token that cannot be read.
    BestMove {
        mv: Option<Move>,
        ponder: Option<Move>,
    },
    Info(EngineInfo),
}

/// Sentinel engines send when there is no move to play.
const NO_MOVE: &str = "(none)";

/// Null move some engines send instead of `(none)`.
const NULL_MOVE: &str = "0000";

/// Parse a UCI message line
pub fn parse_uci_message(line: &str) -> Result<UciMessage, crate::UciError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();

    match tokens.first() {
        Some(&"uciok") => Ok(UciMessage::UciOk),
        Some(&"readyok") => Ok(UciMessage::ReadyOk),

        Some(&"id") => {
            if tokens.len() < 3 {
                return Err(crate::UciError::MalformedMessage(line.to_string()));
            }
            let name = tokens[1].to_string();
            let value = tokens[2..].join(" ");
            Ok(UciMessage::Id { name, value })
        }

        Some(&"bestmove") => {
            // Every `bestmove` completes a search, so an unreadable move
            // (including the `0000` null move) is reported as no move.
            let mv = match tokens.get(1) {
                None | Some(&NO_MOVE) | Some(&NULL_MOVE) => None,
                Some(token) => parse_uci_move(token).ok(),
            };
            let ponder = match (tokens.get(2), tokens.get(3)) {
                (Some(&"ponder"), Some(token)) if *token != NO_MOVE => {
                    parse_uci_move(token).ok()
                }
                _ => None,
            };
            Ok(UciMessage::BestMove { mv, ponder })
        }

        Some(&"info") => Ok(UciMessage::Info(parse_info_line(&tokens[1..]))),

        _ => Err(crate::UciError::UnknownMessage(line.to_string())),
    }
}

/// Parse an "info" line from the engine. Unknown keywords and malformed
/// values are skipped.
fn parse_info_line(tokens: &[&str]) -> EngineInfo {
    let mut info = EngineInfo::default();
    let mut i = 0;

    while i < tokens.len() {
        match tokens[i] {
            "depth" => {
                i += 1;
                info.depth = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "seldepth" => {
                i += 1;
                info.seldepth = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "time" => {
                i += 1;
                info.time_ms = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "nodes" => {
                i += 1;
                info.nodes = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "nps" => {
                i += 1;
                info.nps = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "score" => {
                i += 1;
                if let Some(&score_type) = tokens.get(i) {
                    i += 1;
                    if let Some(value_str) = tokens.get(i) {
                        info.score = match score_type {
                            "cp" => value_str.parse().ok().map(Score::Centipawns),
                            "mate" => value_str.parse().ok().map(Score::Mate),
                            _ => None,
                        };
                    }
                }
                // Optional bound marker directly after the value
                match tokens.get(i + 1) {
                    Some(&"lowerbound") => {
                        info.bound = Some(ScoreBound::Lower);
                        i += 1;
                    }
                    Some(&"upperbound") => {
                        info.bound = Some(ScoreBound::Upper);
                        i += 1;
                    }
                    _ => {}
                }
            }
            "wdl" => {
                let values: Vec<u16> = tokens
                    .iter()
                    .skip(i + 1)
                    .take(3)
                    .map_while(|s| s.parse().ok())
                    .collect();
                if let [win, draw, loss] = values[..] {
                    info.wdl = Some(Wdl { win, draw, loss });
                }
                i += values.len();
            }
            "pv" => {
                // Collect all moves until next keyword
                i += 1;
                while i < tokens.len() && !is_keyword(tokens[i]) {
                    info.pv.push(tokens[i].to_string());
                    i += 1;
                }
                continue; // Don't increment i again
            }
            "multipv" => {
                i += 1;
                info.multipv = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "currmove" => {
                i += 1;
                info.currmove = tokens.get(i).and_then(|s| parse_uci_move(s).ok());
            }
            "hashfull" => {
                i += 1;
                info.hashfull = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "string" => {
                // Free text runs to the end of the line
                info.string = Some(tokens[i + 1..].join(" "));
                break;
            }
            _ => {
                // Unknown keyword, skip
            }
        }
        i += 1;
    }

    info
}

fn is_keyword(token: &str) -> bool {
    matches!(
        token,
        "depth"
            | "seldepth"
            | "time"
            | "nodes"
            | "score"
            | "pv"
            | "multipv"
            | "currmove"
            | "currmovenumber"
            | "hashfull"
            | "nps"
            | "tbhits"
            | "sbhits"
            | "cpuload"
            | "wdl"
            | "refutation"
            | "currline"
            | "string"
    )
}

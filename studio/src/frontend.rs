//! Line-oriented terminal front-end: command parsing, board rendering and
//! the text/JSON observers.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use chess::{PieceKind, PlayerSide};
use cozy_chess::{File, Rank, Square};
use engine::AnalysisLine;
use serde::Serialize;
use tokio::sync::oneshot;

use crate::actor::StudioCommand;
use crate::clock::{format_clock, TimeControl};
use crate::evaluation::{format_score, Evaluation};
use crate::observer::{AppliedMove, Hint, StudioObserver};
use crate::studio::{ColorChoice, Studio};

pub const HELP: &str = "\
Commands:
  move <uci> | <uci>          play a move, e.g. e2e4 or e7e8q
  hint                        ask the engine for a suggestion
  new [white|black|random] [preset]
                              start a new game (preset: unlimited or minutes|increment)
  undo                        take back the last move
  analysis                    toggle analysis mode
  autoplay on|off             let the engine answer automatically
  resign                      resign the current game
  skill <0-20>                set engine strength
  time <preset>               set the time control
  fen <FEN>                   load a custom position
  engine load <path>          use a custom engine executable
  engine reset                go back to the bundled engine
  board                       show the board
  position                    print the current FEN
  pgn                         print the game as PGN
  quit                        exit";

/// A parsed line of user input.
#[derive(Debug)]
pub enum Input {
    Command(StudioCommand),
    Query(Query),
    Help,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    Pgn,
    Board,
    Fen,
}

impl Query {
    pub fn into_command(self, reply: oneshot::Sender<String>) -> StudioCommand {
        match self {
            Self::Pgn => StudioCommand::Pgn { reply },
            Self::Board => StudioCommand::Board { reply },
            Self::Fen => StudioCommand::Fen { reply },
        }
    }
}

/// Parse one line of input. Blank lines yield `Ok(None)`.
pub fn parse_input(line: &str) -> Result<Option<Input>, String> {
    let line = line.trim();
    let Some((word, rest)) = split_word(line) else {
        return Ok(None);
    };

    let input = match word.to_ascii_lowercase().as_str() {
        "move" | "m" => {
            let (mv, _) = split_word(rest).ok_or("usage: move <uci>")?;
            Input::Command(StudioCommand::PlayMove(mv.to_string()))
        }
        "hint" => Input::Command(StudioCommand::Hint),
        "new" => {
            let mut color = ColorChoice::White;
            let mut preset = None;
            for arg in rest.split_whitespace() {
                match arg.parse::<ColorChoice>() {
                    Ok(choice) => color = choice,
                    Err(_) => {
                        preset = Some(arg.parse::<TimeControl>().map_err(|e| e.to_string())?)
                    }
                }
            }
            Input::Command(StudioCommand::NewGame { color, preset })
        }
        "undo" => Input::Command(StudioCommand::Undo),
        "analysis" => Input::Command(StudioCommand::ToggleAnalysis),
        "autoplay" => match rest.to_ascii_lowercase().as_str() {
            "on" => Input::Command(StudioCommand::AutoPlay(true)),
            "off" => Input::Command(StudioCommand::AutoPlay(false)),
            _ => return Err("usage: autoplay on|off".to_string()),
        },
        "resign" => Input::Command(StudioCommand::Resign),
        "skill" => {
            let level = rest
                .parse::<u8>()
                .ok()
                .filter(|level| *level <= 20)
                .ok_or("usage: skill <0-20>")?;
            Input::Command(StudioCommand::SetSkill(level))
        }
        "time" => {
            let control = rest.parse::<TimeControl>().map_err(|e| e.to_string())?;
            Input::Command(StudioCommand::SetTimeControl(control))
        }
        "fen" => {
            if rest.is_empty() {
                return Err("usage: fen <FEN>".to_string());
            }
            Input::Command(StudioCommand::LoadPosition(rest.to_string()))
        }
        "engine" => match split_word(rest) {
            Some(("load", path)) if !path.is_empty() => {
                Input::Command(StudioCommand::LoadEngine(PathBuf::from(path)))
            }
            Some(("reset", _)) => Input::Command(StudioCommand::ResetEngine),
            _ => return Err("usage: engine load <path> | engine reset".to_string()),
        },
        "pgn" => Input::Query(Query::Pgn),
        "board" => Input::Query(Query::Board),
        "position" => Input::Query(Query::Fen),
        "help" | "?" => Input::Help,
        "quit" | "exit" => Input::Quit,
        other if chess::parse_uci_move(other).is_ok() => {
            Input::Command(StudioCommand::PlayMove(other.to_string()))
        }
        other => return Err(format!("Unknown command '{other}'. Type 'help' for a list.")),
    };
    Ok(Some(input))
}

fn split_word(s: &str) -> Option<(&str, &str)> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    match s.split_once(char::is_whitespace) {
        Some((word, rest)) => Some((word, rest.trim())),
        None => Some((s, "")),
    }
}

/// Board from the human's side with clocks, evaluation and analysis lines.
pub fn render_board<O: StudioObserver>(studio: &Studio<O>) -> String {
    let board = studio.game().position();
    let human = studio.human();

    let mut ranks = Rank::ALL.to_vec();
    let mut files = File::ALL.to_vec();
    match human {
        PlayerSide::White => ranks.reverse(),
        PlayerSide::Black => files.reverse(),
    }

    let mut out = String::new();
    for rank in &ranks {
        out.push_str(&format!("{} |", *rank as usize + 1));
        for file in &files {
            let square = Square::new(*file, *rank);
            let symbol = match (board.piece_on(square), board.color_on(square)) {
                (Some(piece), Some(color)) => {
                    let kind = PieceKind::from(piece);
                    match PlayerSide::from(color) {
                        PlayerSide::White => kind.to_char_upper(),
                        PlayerSide::Black => kind.to_char_lower(),
                    }
                }
                _ => '.',
            };
            out.push(' ');
            out.push(symbol);
        }
        out.push('\n');
    }
    out.push_str("   ");
    for _ in &files {
        out.push_str("--");
    }
    out.push_str("\n   ");
    for file in &files {
        out.push(' ');
        out.push((b'a' + *file as u8) as char);
    }
    out.push('\n');

    out.push_str(&format!(
        "\nWhite {}  Black {}\n",
        format_clock(studio.clock().remaining(PlayerSide::White)),
        format_clock(studio.clock().remaining(PlayerSide::Black)),
    ));
    out.push_str(&format!("Evaluation: {}\n", studio.evaluation().label));
    for (rank, line) in studio.analysis_lines() {
        out.push_str(&format!("{}\n", format_analysis_line(rank, line)));
    }
    if let Some(hint) = studio.hint() {
        out.push_str(&format!("Hint: {} → {}\n", hint.from, hint.to));
    }
    out.push_str(studio.status());
    out
}

/// `#1 • Depth 14  +0.31  e4 e5 Nf3`
pub fn format_analysis_line(rank: u8, line: &AnalysisLine) -> String {
    let depth = line
        .depth
        .map(|depth| format!("Depth {depth}"))
        .unwrap_or_else(|| "Depth —".to_string());
    format!(
        "#{} • {}  {}  {}",
        rank,
        depth,
        format_score(line.score),
        line.moves.join(" ")
    )
}

/// Human-readable notifications for the interactive terminal.
pub struct TextObserver<W: Write> {
    out: W,
}

impl<W: Write> TextObserver<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    fn line(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{text}") {
            tracing::warn!("Failed to write to terminal: {}", e);
        }
    }
}

impl<W: Write> StudioObserver for TextObserver<W> {
    fn on_move_applied(&mut self, applied: &AppliedMove) {
        if applied.by_engine {
            self.line(&format!("Stockfish plays {}", applied.san));
        }
    }

    fn on_hint_ready(&mut self, hint: &Hint) {
        if let Some(san) = &hint.san {
            self.line(&format!("Suggested move: {san}"));
        }
    }

    fn on_status_message(&mut self, message: &str) {
        self.line(message);
    }
}

/// One JSON object per line on the writer, tagged by `event`.
pub struct JsonObserver<W: Write> {
    out: W,
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum Notification<'a> {
    Evaluation {
        evaluation: &'a Evaluation,
    },
    AnalysisLine {
        rank: u8,
        line: &'a AnalysisLine,
    },
    Hint {
        hint: &'a Hint,
    },
    Move {
        #[serde(flatten)]
        applied: &'a AppliedMove,
    },
    Status {
        message: &'a str,
    },
    EngineError {
        message: &'a str,
    },
    Clock {
        white_ms: Option<u128>,
        black_ms: Option<u128>,
    },
}

impl<W: Write> JsonObserver<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    fn emit(&mut self, notification: &Notification<'_>) {
        let written = serde_json::to_writer(&mut self.out, notification)
            .map_err(std::io::Error::from)
            .and_then(|()| writeln!(self.out));
        if let Err(e) = written {
            tracing::warn!("Failed to write notification: {}", e);
        }
    }
}

impl<W: Write> StudioObserver for JsonObserver<W> {
    fn on_evaluation_updated(&mut self, evaluation: &Evaluation) {
        self.emit(&Notification::Evaluation { evaluation });
    }

    fn on_analysis_line_updated(&mut self, rank: u8, line: &AnalysisLine) {
        self.emit(&Notification::AnalysisLine { rank, line });
    }

    fn on_hint_ready(&mut self, hint: &Hint) {
        self.emit(&Notification::Hint { hint });
    }

    fn on_move_applied(&mut self, applied: &AppliedMove) {
        self.emit(&Notification::Move { applied });
    }

    fn on_status_message(&mut self, message: &str) {
        self.emit(&Notification::Status { message });
    }

    fn on_engine_error(&mut self, message: &str) {
        self.emit(&Notification::EngineError { message });
    }

    fn on_clock_updated(&mut self, white: Option<Duration>, black: Option<Duration>) {
        self.emit(&Notification::Clock {
            white_ms: white.map(|d| d.as_millis()),
            black_ms: black.map(|d| d.as_millis()),
        });
    }
}

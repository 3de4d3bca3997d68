//! The studio orchestrator: owns the game, the engine session, the clock and
//! the evaluation, and routes engine results by the intent of the search that
//! produced them.

use std::path::Path;
use std::str::FromStr;

use chess::{
    convert_uci_castling_to_cozy, format_san, format_square, format_uci_move, missing_pieces,
    parse_uci_move, Game, HistoryEntry, PlayerSide,
};
use cozy_chess::{Move, Piece, Rank, Square};
use engine::{
    AnalysisLine, EngineLauncher, EngineSource, SearchBudget, SearchIntent, SearchRequest,
    SearchSpec, SessionEvent, SessionOptions, SourceRequest, TransportEvent, UciSession,
};
use tokio::sync::mpsc;

use crate::clock::{ChessClock, ClockTick, TimeControl};
use crate::error::StudioError;
use crate::evaluation::Evaluation;
use crate::observer::{AppliedMove, Hint, StudioObserver};

pub const BUNDLED_ENGINE_LABEL: &str = "Bundled Stockfish";

const MIN_ENGINE_MOVE_TIME_MS: u64 = 600;
const ENGINE_MOVE_TIME_PER_SKILL_MS: u64 = 160;
const EVALUATION_MOVE_TIME_MS: u64 = 700;
const BASE_HINT_DEPTH: u8 = 10;
const MAX_HINT_DEPTH: u8 = 20;
const MAX_SKILL_LEVEL: u8 = 20;

/// Thinking time for the engine's own moves at a given skill level.
pub fn engine_move_time(skill_level: u8) -> u64 {
    (MIN_ENGINE_MOVE_TIME_MS + u64::from(skill_level) * ENGINE_MOVE_TIME_PER_SKILL_MS)
        .max(MIN_ENGINE_MOVE_TIME_MS)
}

/// Search depth for hints: half the skill level (rounded up) on top of a base.
pub fn hint_depth(skill_level: u8) -> u8 {
    (BASE_HINT_DEPTH + skill_level.div_ceil(2)).min(MAX_HINT_DEPTH)
}

/// Which side the human takes in a new game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorChoice {
    White,
    Black,
    Random,
}

impl FromStr for ColorChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "w" | "white" => Ok(Self::White),
            "b" | "black" => Ok(Self::Black),
            "random" | "auto" => Ok(Self::Random),
            other => Err(format!("unknown color '{other}', expected white, black or random")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StudioOptions {
    pub human: PlayerSide,
    pub skill_level: u8,
    pub time_control: TimeControl,
    pub auto_play: bool,
}

impl Default for StudioOptions {
    fn default() -> Self {
        Self {
            human: PlayerSide::White,
            skill_level: 10,
            time_control: TimeControl::Unlimited,
            auto_play: true,
        }
    }
}

pub struct Studio<O: StudioObserver> {
    observer: O,
    session: UciSession,
    game: Game,
    clock: ChessClock,
    evaluation: Evaluation,
    human: PlayerSide,
    skill_level: u8,
    time_control: TimeControl,
    auto_play: bool,
    analysis_mode: bool,
    resigned: bool,
    flagged: Option<PlayerSide>,
    hint: Option<Hint>,
    last_move: Option<Move>,
    status: String,
}

impl<O: StudioObserver> Studio<O> {
    /// Create a studio with no engine attached. Clock ticks for the returned
    /// receiver must be fed back through [`Studio::handle_clock_tick`].
    pub fn new(
        observer: O,
        launcher: Box<dyn EngineLauncher>,
        options: StudioOptions,
    ) -> (Self, mpsc::UnboundedReceiver<ClockTick>) {
        let skill_level = options.skill_level.min(MAX_SKILL_LEVEL);
        let session = UciSession::new(
            launcher,
            SessionOptions {
                skill_level,
                ..SessionOptions::default()
            },
        );
        let (clock, ticks) = ChessClock::new(options.time_control);
        let studio = Self {
            observer,
            session,
            game: Game::new(),
            clock,
            evaluation: Evaluation::neutral(),
            human: options.human,
            skill_level,
            time_control: options.time_control,
            auto_play: options.auto_play,
            analysis_mode: false,
            resigned: false,
            flagged: None,
            hint: None,
            last_move: None,
            status: "Welcome! Start a game to play Stockfish.".to_string(),
        };
        (studio, ticks)
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    pub fn human(&self) -> PlayerSide {
        self.human
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn evaluation(&self) -> &Evaluation {
        &self.evaluation
    }

    pub fn analysis_lines(&self) -> impl Iterator<Item = (u8, &AnalysisLine)> {
        self.session
            .analysis_lines()
            .iter()
            .map(|(rank, line)| (*rank, line))
    }

    pub fn hint(&self) -> Option<&Hint> {
        self.hint.as_ref()
    }

    pub fn last_move(&self) -> Option<Move> {
        self.last_move
    }

    pub fn skill_level(&self) -> u8 {
        self.skill_level
    }

    pub fn time_control(&self) -> TimeControl {
        self.time_control
    }

    pub fn auto_play(&self) -> bool {
        self.auto_play
    }

    pub fn analysis_mode(&self) -> bool {
        self.analysis_mode
    }

    pub fn is_resigned(&self) -> bool {
        self.resigned
    }

    pub fn flagged(&self) -> Option<PlayerSide> {
        self.flagged
    }

    pub fn clock(&self) -> &ChessClock {
        &self.clock
    }

    pub fn session(&self) -> &UciSession {
        &self.session
    }

    pub fn engine_source(&self) -> Option<&EngineSource> {
        self.session.source()
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    /// Checkmate, draw or a fallen flag.
    pub fn is_game_over(&self) -> bool {
        self.game.is_game_over() || self.flagged.is_some()
    }

    // --- Engine sources ---

    pub fn load_bundled_engine(&mut self, announce: bool) -> Result<EngineSource, StudioError> {
        let request = SourceRequest::Bundled {
            label: BUNDLED_ENGINE_LABEL.to_string(),
        };
        match self.session.activate(request) {
            Ok(source) => {
                let status = if announce {
                    "Bundled Stockfish engine selected. Initialising..."
                } else {
                    "Loading bundled Stockfish engine..."
                };
                self.prepare_engine(status.to_string());
                Ok(source)
            }
            Err(e) => {
                tracing::error!("Failed to load bundled engine: {}", e);
                self.set_status("Failed to load bundled Stockfish engine.".to_string());
                Err(e.into())
            }
        }
    }

    pub fn load_custom_engine(&mut self, path: &Path) -> Result<EngineSource, StudioError> {
        let request = SourceRequest::Custom {
            path: path.to_path_buf(),
        };
        match self.session.activate(request) {
            Ok(source) => {
                self.prepare_engine(format!("Loaded {}. Initialising...", source.label));
                Ok(source)
            }
            Err(e) => {
                tracing::error!("Failed to import engine {:?}: {}", path, e);
                self.set_status(format!("Failed to import engine: {e}"));
                Err(e.into())
            }
        }
    }

    fn prepare_engine(&mut self, status: String) {
        self.evaluation = Evaluation::neutral();
        self.observer.on_evaluation_updated(&self.evaluation);
        self.set_status(status);
        self.request_evaluation();
    }

    // --- Player actions ---

    /// Parse and play a move in engine notation, e.g. `e2e4` or `e7e8q`.
    pub fn play_uci(&mut self, text: &str) -> Result<AppliedMove, StudioError> {
        let mv = parse_uci_move(text)?;
        self.play_move(mv.from, mv.to, mv.promotion)
    }

    /// Play a human move. Pawns reaching the last rank promote to a queen
    /// unless another piece is given.
    pub fn play_move(
        &mut self,
        from: Square,
        to: Square,
        promotion: Option<Piece>,
    ) -> Result<AppliedMove, StudioError> {
        if self.is_game_over() {
            return Err(StudioError::MoveNotAllowed("The game is over."));
        }
        if self.analysis_mode {
            return Err(StudioError::MoveNotAllowed(
                "Analysis mode is active. Resume play to move.",
            ));
        }
        if self.resigned {
            return Err(StudioError::MoveNotAllowed("You resigned this game."));
        }
        if self.auto_play && self.game.side_to_move() != self.human {
            return Err(StudioError::MoveNotAllowed("It is not your turn."));
        }

        let promotion = promotion.or_else(|| self.needs_promotion(from, to).then_some(Piece::Queen));
        let mv = Move {
            from,
            to,
            promotion,
        };
        let uci = format_uci_move(mv);
        let entry = self
            .game
            .make_move(mv)
            .map_err(|_| StudioError::IllegalMove(uci.clone()))?;
        tracing::info!("Player played {} ({})", uci, entry.san);

        let applied = self.after_move(entry, uci, false);
        if !self.is_game_over() && self.auto_play && !self.analysis_mode {
            self.request_engine_move();
        }
        Ok(applied)
    }

    fn needs_promotion(&self, from: Square, to: Square) -> bool {
        self.game.position().piece_on(from) == Some(Piece::Pawn)
            && matches!(to.rank(), Rank::First | Rank::Eighth)
    }

    /// Bookkeeping shared by human and engine moves.
    fn after_move(&mut self, entry: HistoryEntry, uci: String, by_engine: bool) -> AppliedMove {
        self.last_move = Some(entry.mv);
        self.hint = None;

        self.clock.apply_increment(entry.side);
        self.switch_clock();

        let board = self.game.position();
        let applied = AppliedMove {
            uci,
            san: entry.san,
            side: entry.side,
            by_engine,
            captured: entry.captured,
            fen: entry.fen,
            captured_by_player: missing_pieces(board, self.human.opposite()),
            captured_by_engine: missing_pieces(board, self.human),
        };
        self.observer.on_move_applied(&applied);
        self.emit_clock();
        self.set_status(self.game_status_message());
        self.request_evaluation();

        if self.game.is_game_over() {
            self.finalize_game();
        }
        applied
    }

    /// Ask the engine for its move. Only when the engine is ready, it is the
    /// engine's turn and the game is still being played.
    pub fn request_engine_move(&mut self) -> bool {
        if !self.session.is_ready()
            || self.game.side_to_move() == self.human
            || self.is_game_over()
            || self.resigned
        {
            return false;
        }
        let spec = SearchSpec {
            intent: SearchIntent::Move,
            fen: self.game.to_fen(),
            budget: SearchBudget::MoveTime(engine_move_time(self.skill_level)),
            skill_level: Some(self.skill_level),
        };
        self.session.start_search(spec);
        true
    }

    pub fn request_hint(&mut self) -> bool {
        if !self.session.is_ready() || self.is_game_over() {
            return false;
        }
        let spec = SearchSpec {
            intent: SearchIntent::Hint,
            fen: self.game.to_fen(),
            budget: SearchBudget::Depth(hint_depth(self.skill_level)),
            skill_level: None,
        };
        self.session.start_search(spec);
        self.set_status("Requesting best move hint...".to_string());
        true
    }

    /// Refresh the evaluation of the current position. Never interrupts the
    /// engine while it is choosing its own move.
    pub fn request_evaluation(&mut self) {
        let spec = SearchSpec {
            intent: SearchIntent::Analysis,
            fen: self.game.to_fen(),
            budget: SearchBudget::MoveTime(EVALUATION_MOVE_TIME_MS),
            skill_level: None,
        };
        self.session.start_search(spec);
    }

    pub fn toggle_analysis_mode(&mut self) -> bool {
        self.analysis_mode = !self.analysis_mode;
        if self.analysis_mode {
            self.auto_play = false;
            self.clock.stop();
            self.session.stop();
            self.set_status("Analysis mode enabled. Engine will not move automatically.".to_string());
        } else {
            self.auto_play = true;
            self.set_status("Play mode restored. Stockfish will respond automatically.".to_string());
            self.switch_clock();
            if self.game.side_to_move() != self.human {
                self.request_engine_move();
            }
        }
        self.analysis_mode
    }

    pub fn set_auto_play(&mut self, enabled: bool) {
        self.auto_play = enabled;
        if enabled
            && !self.analysis_mode
            && self.game.side_to_move() != self.human
            && !self.is_game_over()
        {
            self.request_engine_move();
        }
    }

    pub fn resign(&mut self) -> bool {
        if self.is_game_over() || self.resigned {
            return false;
        }
        self.resigned = true;
        self.clock.stop();
        self.set_status("You resigned. Stockfish wins.".to_string());
        true
    }

    /// Take back the last move, or the last full move pair when the engine
    /// plays automatically. Returns whether anything was undone.
    pub fn undo(&mut self) -> bool {
        self.session.stop();
        if self.game.undo().is_err() {
            return false;
        }
        if self.auto_play && !self.analysis_mode {
            if let Err(e) = self.game.undo() {
                tracing::debug!("Only one ply to take back: {}", e);
            }
        }
        self.last_move = None;
        self.hint = None;
        self.resigned = false;
        self.set_status("Moves undone.".to_string());
        self.request_evaluation();
        true
    }

    pub fn new_game(&mut self, color: ColorChoice, preset: Option<TimeControl>) -> PlayerSide {
        self.human = match color {
            ColorChoice::White => PlayerSide::White,
            ColorChoice::Black => PlayerSide::Black,
            ColorChoice::Random => {
                if rand::random::<bool>() {
                    PlayerSide::White
                } else {
                    PlayerSide::Black
                }
            }
        };
        tracing::info!("New game, human plays {}", self.human);

        self.session.stop();
        self.game = Game::new();
        self.last_move = None;
        self.hint = None;
        self.resigned = false;
        self.clock.stop();
        self.set_time_control(preset.unwrap_or(self.time_control));
        self.set_status(format!(
            "New game started. You play as {}.",
            self.human.title()
        ));
        self.session.new_game();
        if self.human == PlayerSide::Black {
            self.request_engine_move();
        }
        self.request_evaluation();
        self.human
    }

    /// Reset both clocks to `control`; a timed clock starts for the side to
    /// move.
    pub fn set_time_control(&mut self, control: TimeControl) {
        self.time_control = control;
        self.flagged = None;
        self.clock.configure(control);
        if !self.is_game_over() && !self.resigned && !self.analysis_mode {
            self.switch_clock();
        }
        self.emit_clock();
    }

    pub fn set_skill_level(&mut self, level: u8) {
        self.skill_level = level.min(MAX_SKILL_LEVEL);
        tracing::info!("Skill level set to {}", self.skill_level);
        self.session.set_skill_level(self.skill_level);
    }

    /// Replace the game with a custom position; the human takes the side to
    /// move.
    pub fn load_position(&mut self, fen: &str) -> Result<(), StudioError> {
        let game =
            Game::from_fen(fen).map_err(|e| StudioError::InvalidPositionNotation(e.to_string()))?;
        self.session.stop();
        self.game = game;
        self.human = self.game.side_to_move();
        self.last_move = None;
        self.hint = None;
        self.resigned = false;
        self.flagged = None;
        self.clock.stop();
        self.emit_clock();
        self.set_status("Custom position loaded.".to_string());
        self.request_evaluation();
        Ok(())
    }

    pub fn pgn(&self) -> String {
        let engine = self
            .engine_source()
            .map(|source| source.label.as_str())
            .unwrap_or("Stockfish");
        let (white, black) = match self.human {
            PlayerSide::White => ("Player", engine),
            PlayerSide::Black => (engine, "Player"),
        };
        chess::pgn::format_pgn(
            &self.game,
            &[
                ("Event", "Stockfish Studio game"),
                ("Site", "Local"),
                ("White", white),
                ("Black", black),
            ],
        )
    }

    // --- Event handling ---

    pub async fn next_engine_event(&mut self) -> Option<TransportEvent> {
        self.session.next_event().await
    }

    pub fn handle_engine_event(&mut self, event: TransportEvent) {
        for event in self.session.handle_event(event) {
            self.handle_session_event(event);
        }
    }

    /// Process all engine output that is already available without waiting.
    /// Returns the number of transport events handled.
    pub fn drain_engine_events(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.session.try_next_event() {
            self.handle_engine_event(event);
            handled += 1;
        }
        handled
    }

    fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Ready => {
                self.set_status("Engine ready. Play a move to begin.".to_string());
                if self.auto_play && !self.analysis_mode {
                    self.request_engine_move();
                }
            }
            SessionEvent::Evaluation {
                sample,
                side_to_move,
                ..
            } => {
                self.evaluation = Evaluation::from_sample(sample, side_to_move, self.human);
                self.observer.on_evaluation_updated(&self.evaluation);
            }
            SessionEvent::AnalysisLineUpdated { rank, line, .. } => {
                self.observer.on_analysis_line_updated(rank, &line);
            }
            SessionEvent::SearchCompleted { request, best_move } => {
                self.handle_search_completed(request, best_move);
            }
            SessionEvent::EngineError(message) => {
                self.observer.on_engine_error(&message);
                self.set_status(format!("Engine error: {message}"));
            }
        }
    }

    fn handle_search_completed(&mut self, request: SearchRequest, best_move: Option<Move>) {
        let Some(mv) = best_move else {
            tracing::debug!("{:?} search found no move", request.intent);
            return;
        };
        let current = request.fen == self.game.to_fen();

        match request.intent {
            SearchIntent::Hint if current => {
                let legal = self.game.legal_moves();
                let cozy = convert_uci_castling_to_cozy(mv, &legal);
                let san = legal
                    .contains(&cozy)
                    .then(|| format_san(self.game.position(), cozy));
                let hint = Hint {
                    from: format_square(mv.from),
                    to: format_square(mv.to),
                    san,
                };
                self.set_status(format!("Hint: {} → {}", hint.from, hint.to));
                self.observer.on_hint_ready(&hint);
                self.hint = Some(hint);
                self.request_evaluation();
            }
            SearchIntent::Move if current => {
                if !self.auto_play || self.analysis_mode || self.is_game_over() || self.resigned {
                    tracing::debug!("Discarding engine move {}", format_uci_move(mv));
                    return;
                }
                let uci = format_uci_move(mv);
                match self.game.make_move(mv) {
                    Ok(entry) => {
                        tracing::info!("Engine played {} ({})", uci, entry.san);
                        self.after_move(entry, uci, true);
                    }
                    Err(e) => tracing::warn!("Engine suggested {}: {}", uci, e),
                }
            }
            intent => {
                tracing::debug!(
                    "Ignoring {:?} result for {}",
                    intent,
                    if current { "current position" } else { "stale position" }
                );
            }
        }
    }

    pub fn handle_clock_tick(&mut self) {
        if let Some(side) = self.clock.tick() {
            self.flagged = Some(side);
            self.set_status(format!("{} ran out of time.", side.title()));
        }
        self.emit_clock();
    }

    pub fn shutdown(&mut self) {
        self.clock.stop();
        self.session.dispose();
    }

    // --- Helpers ---

    fn switch_clock(&mut self) {
        if self.flagged.is_none() {
            self.clock.switch_to(self.game.side_to_move());
        }
    }

    fn emit_clock(&mut self) {
        self.observer.on_clock_updated(
            self.clock.remaining(PlayerSide::White),
            self.clock.remaining(PlayerSide::Black),
        );
    }

    fn set_status(&mut self, message: String) {
        tracing::debug!("Status: {}", message);
        self.observer.on_status_message(&message);
        self.status = message;
    }

    fn game_status_message(&self) -> String {
        let to_move = self.game.side_to_move();
        if self.game.is_checkmate() {
            format!("{} wins by checkmate.", to_move.opposite().title())
        } else if self.game.is_draw() {
            "Drawn position.".to_string()
        } else if self.game.in_check() {
            format!("{} to move • Check!", to_move.title())
        } else {
            format!("{} to move.", to_move.title())
        }
    }

    fn finalize_game(&mut self) {
        self.clock.stop();
        let to_move = self.game.side_to_move();
        if self.game.is_checkmate() {
            self.set_status(format!("{} wins by checkmate.", to_move.opposite().title()));
        } else if self.game.is_stalemate() {
            self.set_status("Stalemate! Drawn game.".to_string());
        } else if self.game.is_draw() {
            self.set_status("Game drawn.".to_string());
        }
    }
}

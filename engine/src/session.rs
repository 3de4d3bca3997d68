//! UCI session: handshake, option configuration and search sequencing on top
//! of a [`UciTransport`].
//!
//! Every `go` the session sends gets a generation number. Engines answer
//! searches strictly in order, so counting `bestmove` lines tells the session
//! which search the output it is reading belongs to, and output from a
//! superseded search is dropped before it reaches any consumer.

use std::collections::BTreeMap;

use cozy_chess::{Board, Move};
use serde::Serialize;

use chess::{pv_to_san, PlayerSide};

use crate::transport::{
    EngineLauncher, EngineSource, SourceRequest, TransportError, TransportEvent, UciTransport,
};
use crate::uci::{parse_uci_message, UciMessage};
use crate::{
    EngineInfo, EvaluationSample, Score, SearchBudget, SearchIntent, SearchRequest, SearchSpec,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Uninitialized,
    AwaitingHandshake,
    ConfiguringOptions,
    Ready,
}

/// Options applied after every handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub threads: u32,
    pub skill_level: u8,
    pub multipv: u8,
    pub show_wdl: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            threads: 1,
            skill_level: 10,
            multipv: 3,
            show_wdl: true,
        }
    }
}

/// One ranked line of multi-PV analysis, moves already in SAN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisLine {
    pub depth: Option<u8>,
    pub score: Option<Score>,
    pub moves: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Handshake and option configuration finished.
    Ready,
    /// New reading from the top-ranked line of the current search.
    Evaluation {
        request: SearchRequest,
        sample: EvaluationSample,
        side_to_move: PlayerSide,
    },
    AnalysisLineUpdated {
        request: SearchRequest,
        rank: u8,
        line: AnalysisLine,
    },
    /// `best_move` is `None` when the engine had no legal move.
    SearchCompleted {
        request: SearchRequest,
        best_move: Option<Move>,
    },
    EngineError(String),
}

/// Outcome of [`UciSession::start_search`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchStart {
    Started(SearchRequest),
    /// Queued until the engine is ready. A later request replaces it.
    Deferred,
    /// Analysis never preempts a search for the engine's own move.
    Rejected,
}

struct InFlight {
    request: SearchRequest,
    position: Option<Board>,
}

pub struct UciSession {
    transport: UciTransport,
    phase: SessionPhase,
    options: SessionOptions,
    in_flight: Option<InFlight>,
    pending: Option<SearchSpec>,
    /// `go` commands sent to the current engine.
    issued: u64,
    /// `bestmove` lines received from the current engine.
    completed: u64,
    lines: BTreeMap<u8, AnalysisLine>,
}

impl UciSession {
    pub fn new(launcher: Box<dyn EngineLauncher>, options: SessionOptions) -> Self {
        Self {
            transport: UciTransport::new(launcher),
            phase: SessionPhase::Uninitialized,
            options,
            in_flight: None,
            pending: None,
            issued: 0,
            completed: 0,
            lines: BTreeMap::new(),
        }
    }

    /// Attach a new engine and start the handshake. On failure the previous
    /// engine and session state are left untouched.
    pub fn activate(&mut self, request: SourceRequest) -> Result<EngineSource, TransportError> {
        let source = self.transport.activate(request)?;
        self.reset();
        self.phase = SessionPhase::AwaitingHandshake;
        self.transport.send("uci");
        Ok(source)
    }

    pub fn dispose(&mut self) {
        self.transport.dispose();
        self.reset();
    }

    fn reset(&mut self) {
        self.phase = SessionPhase::Uninitialized;
        self.in_flight = None;
        self.pending = None;
        self.issued = 0;
        self.completed = 0;
        self.lines.clear();
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_ready(&self) -> bool {
        self.phase == SessionPhase::Ready
    }

    pub fn source(&self) -> Option<&EngineSource> {
        self.transport.source()
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// The search whose output is currently being delivered.
    pub fn in_flight(&self) -> Option<&SearchRequest> {
        self.in_flight.as_ref().map(|search| &search.request)
    }

    pub fn pending(&self) -> Option<&SearchSpec> {
        self.pending.as_ref()
    }

    /// Latest analysis lines of the current search, keyed by rank.
    pub fn analysis_lines(&self) -> &BTreeMap<u8, AnalysisLine> {
        &self.lines
    }

    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        self.transport.next_event().await
    }

    pub fn try_next_event(&mut self) -> Option<TransportEvent> {
        self.transport.try_next_event()
    }

    /// Start a search, superseding whatever is running.
    pub fn start_search(&mut self, spec: SearchSpec) -> SearchStart {
        if spec.intent == SearchIntent::Analysis && self.move_search_outstanding() {
            tracing::debug!("Analysis request ignored while the engine is choosing a move");
            return SearchStart::Rejected;
        }

        if !self.is_ready() {
            tracing::debug!("Engine not ready, deferring {:?} search", spec.intent);
            self.pending = Some(spec);
            return SearchStart::Deferred;
        }

        self.transport.send("stop");
        if let Some(previous) = self.in_flight.take() {
            tracing::debug!(
                "Superseding {:?} search (generation {})",
                previous.request.intent,
                previous.request.generation
            );
        }
        self.lines.clear();

        self.transport.send(&format!("position fen {}", spec.fen));
        if let Some(level) = spec.skill_level {
            self.options.skill_level = level;
            self.send_skill_level();
        }
        let go = match spec.budget {
            SearchBudget::MoveTime(ms) => format!("go movetime {ms}"),
            SearchBudget::Depth(depth) => format!("go depth {depth}"),
        };
        self.transport.send(&go);

        self.issued += 1;
        let request = SearchRequest {
            intent: spec.intent,
            generation: self.issued,
            fen: spec.fen,
            budget: spec.budget,
        };
        tracing::info!(
            "Started {:?} search (generation {}): {}",
            request.intent,
            request.generation,
            go
        );
        let position = chess::fen::parse_fen(&request.fen).ok();
        if position.is_none() {
            tracing::warn!("Search position is not valid FEN: {}", request.fen);
        }
        self.in_flight = Some(InFlight {
            request: request.clone(),
            position,
        });
        SearchStart::Started(request)
    }

    fn move_search_outstanding(&self) -> bool {
        let in_flight = self
            .in_flight
            .as_ref()
            .is_some_and(|search| search.request.intent == SearchIntent::Move);
        let pending = self
            .pending
            .as_ref()
            .is_some_and(|spec| spec.intent == SearchIntent::Move);
        in_flight || pending
    }

    /// Stop the current search and forget any deferred one.
    pub fn stop(&mut self) {
        self.transport.send("stop");
        self.in_flight = None;
        self.pending = None;
    }

    /// Tell the engine a new game starts and reapply the skill level.
    pub fn new_game(&mut self) {
        self.lines.clear();
        if !self.is_ready() {
            return;
        }
        self.transport.send("ucinewgame");
        self.send_skill_level();
    }

    pub fn set_skill_level(&mut self, level: u8) {
        self.options.skill_level = level.min(20);
        if self.is_ready() {
            self.send_skill_level();
        }
    }

    fn send_skill_level(&mut self) {
        let command = format!(
            "setoption name Skill Level value {}",
            self.options.skill_level
        );
        self.transport.send(&command);
    }

    /// Advance the state machine with one transport event.
    pub fn handle_event(&mut self, event: TransportEvent) -> Vec<SessionEvent> {
        match event {
            TransportEvent::Line(line) => self.handle_line(&line),
            TransportEvent::Fault(err) => {
                tracing::error!("Engine transport fault: {}", err);
                self.phase = SessionPhase::Uninitialized;
                self.in_flight = None;
                self.pending = None;
                vec![SessionEvent::EngineError(err.to_string())]
            }
        }
    }

    fn handle_line(&mut self, line: &str) -> Vec<SessionEvent> {
        let message = match parse_uci_message(line) {
            Ok(message) => message,
            Err(e) => {
                tracing::trace!("Ignoring engine output: {}", e);
                return Vec::new();
            }
        };

        match message {
            UciMessage::Id { name, value } => {
                tracing::debug!("Engine {}: {}", name, value);
                Vec::new()
            }
            UciMessage::UciOk => {
                self.phase = SessionPhase::ConfiguringOptions;
                self.configure();
                Vec::new()
            }
            UciMessage::ReadyOk => {
                if self.is_ready() {
                    return Vec::new();
                }
                self.phase = SessionPhase::Ready;
                tracing::info!("Engine ready");
                if let Some(spec) = self.pending.take() {
                    self.start_search(spec);
                }
                vec![SessionEvent::Ready]
            }
            UciMessage::Info(info) => self.handle_info(info),
            UciMessage::BestMove { mv, .. } => self.handle_best_move(mv),
        }
    }

    fn configure(&mut self) {
        let options = self.options.clone();
        self.transport
            .send(&format!("setoption name Threads value {}", options.threads));
        self.transport.send(&format!(
            "setoption name Skill Level value {}",
            options.skill_level
        ));
        self.transport
            .send(&format!("setoption name MultiPV value {}", options.multipv));
        self.transport.send(&format!(
            "setoption name UCI_ShowWDL value {}",
            options.show_wdl
        ));
        self.transport.send("isready");
    }

    fn handle_info(&mut self, info: EngineInfo) -> Vec<SessionEvent> {
        let Some(search) = &self.in_flight else {
            return Vec::new();
        };
        if search.request.generation != self.completed + 1 {
            tracing::trace!("Dropping info from superseded search");
            return Vec::new();
        }

        let rank = info.multipv.unwrap_or(1);
        let mut events = Vec::new();

        if let (Some(score), 1) = (info.score, rank) {
            events.push(SessionEvent::Evaluation {
                request: search.request.clone(),
                sample: EvaluationSample {
                    score: Some(score),
                    primary: true,
                },
                side_to_move: side_to_move(&search.request.fen),
            });
        }

        if !info.pv.is_empty() {
            let moves = search
                .position
                .as_ref()
                .map(|board| pv_to_san(board, &info.pv))
                .unwrap_or_default();
            let line = AnalysisLine {
                depth: info.depth,
                score: info.score,
                moves,
            };
            events.push(SessionEvent::AnalysisLineUpdated {
                request: search.request.clone(),
                rank,
                line: line.clone(),
            });
            self.lines.insert(rank, line);
        }

        events
    }

    fn handle_best_move(&mut self, mv: Option<Move>) -> Vec<SessionEvent> {
        self.completed += 1;
        match self.in_flight.take() {
            Some(search) if search.request.generation == self.completed => {
                tracing::info!(
                    "Search {} ({:?}) completed: {:?}",
                    search.request.generation,
                    search.request.intent,
                    mv
                );
                vec![SessionEvent::SearchCompleted {
                    request: search.request,
                    best_move: mv,
                }]
            }
            other => {
                tracing::debug!("Discarding bestmove from superseded search");
                self.in_flight = other;
                Vec::new()
            }
        }
    }
}

fn side_to_move(fen: &str) -> PlayerSide {
    match fen.split_whitespace().nth(1) {
        Some("b") => PlayerSide::Black,
        _ => PlayerSide::White,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockEngine, MockLauncher};
    use chess::fen::STARTING_FEN;
    use chess::format_uci_move;

    fn session() -> (UciSession, MockEngine) {
        let (launcher, mut engines) = MockLauncher::new();
        let mut session = UciSession::new(Box::new(launcher), SessionOptions::default());
        session
            .activate(SourceRequest::Bundled {
                label: "Bundled".into(),
            })
            .unwrap();
        let engine = engines.next().unwrap();
        (session, engine)
    }

    fn pump(session: &mut UciSession) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Some(event) = session.try_next_event() {
            events.extend(session.handle_event(event));
        }
        events
    }

    fn ready_session() -> (UciSession, MockEngine) {
        let (mut session, mut engine) = session();
        engine.complete_handshake();
        pump(&mut session);
        engine.sent();
        (session, engine)
    }

    fn spec(intent: SearchIntent) -> SearchSpec {
        SearchSpec {
            intent,
            fen: STARTING_FEN.to_string(),
            budget: SearchBudget::MoveTime(700),
            skill_level: None,
        }
    }

    #[tokio::test]
    async fn test_handshake_sequence() {
        let (mut session, mut engine) = session();
        assert_eq!(engine.sent(), vec!["uci"]);
        assert_eq!(session.phase(), SessionPhase::AwaitingHandshake);

        engine.emit("id name Stockfish 16");
        engine.emit("uciok");
        assert!(pump(&mut session).is_empty());
        assert_eq!(session.phase(), SessionPhase::ConfiguringOptions);
        assert_eq!(
            engine.sent(),
            vec![
                "setoption name Threads value 1",
                "setoption name Skill Level value 10",
                "setoption name MultiPV value 3",
                "setoption name UCI_ShowWDL value true",
                "isready",
            ]
        );

        engine.emit("readyok");
        assert_eq!(pump(&mut session), vec![SessionEvent::Ready]);
        assert!(session.is_ready());
    }

    #[tokio::test]
    async fn test_search_before_ready_is_deferred_latest_wins() {
        let (mut session, mut engine) = session();
        engine.sent();

        assert_eq!(session.start_search(spec(SearchIntent::Hint)), SearchStart::Deferred);
        assert_eq!(session.start_search(spec(SearchIntent::Move)), SearchStart::Deferred);
        assert!(engine.sent().is_empty());

        engine.complete_handshake();
        pump(&mut session);
        let sent = engine.sent();
        assert_eq!(
            &sent[sent.len() - 3..],
            &[
                "stop".to_string(),
                format!("position fen {STARTING_FEN}"),
                "go movetime 700".to_string(),
            ]
        );
        assert_eq!(session.in_flight().unwrap().intent, SearchIntent::Move);
        assert!(session.pending().is_none());
    }

    #[tokio::test]
    async fn test_search_command_order() {
        let (mut session, mut engine) = ready_session();
        let started = session.start_search(SearchSpec {
            intent: SearchIntent::Move,
            fen: STARTING_FEN.to_string(),
            budget: SearchBudget::MoveTime(2200),
            skill_level: Some(10),
        });
        assert!(matches!(started, SearchStart::Started(ref r) if r.generation == 1));
        assert_eq!(
            engine.sent(),
            vec![
                "stop".to_string(),
                format!("position fen {STARTING_FEN}"),
                "setoption name Skill Level value 10".to_string(),
                "go movetime 2200".to_string(),
            ]
        );

        let hint = session.start_search(SearchSpec {
            budget: SearchBudget::Depth(15),
            ..spec(SearchIntent::Hint)
        });
        assert!(matches!(hint, SearchStart::Started(ref r) if r.generation == 2));
        assert_eq!(engine.sent().last().unwrap(), "go depth 15");
    }

    #[tokio::test]
    async fn test_analysis_never_preempts_move_search() {
        let (mut session, mut engine) = ready_session();
        session.start_search(spec(SearchIntent::Move));
        engine.sent();

        assert_eq!(session.start_search(spec(SearchIntent::Analysis)), SearchStart::Rejected);
        assert!(engine.sent().is_empty());
        assert_eq!(session.in_flight().unwrap().intent, SearchIntent::Move);
    }

    #[tokio::test]
    async fn test_top_line_updates_evaluation_and_lines() {
        let (mut session, engine) = ready_session();
        session.start_search(spec(SearchIntent::Analysis));

        engine.emit("info depth 14 multipv 1 score cp 31 wdl 60 900 40 pv e2e4 e7e5 g1f3");
        engine.emit("info depth 14 multipv 2 score cp 25 pv d2d4 d7d5");
        let events = pump(&mut session);

        assert_eq!(events.len(), 3);
        match &events[0] {
            SessionEvent::Evaluation {
                sample,
                side_to_move,
                ..
            } => {
                assert_eq!(sample.score, Some(Score::Centipawns(31)));
                assert_eq!(*side_to_move, PlayerSide::White);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(
            &events[2],
            SessionEvent::AnalysisLineUpdated { rank: 2, line, .. } if line.moves == vec!["d4", "d5"]
        ));
        let lines = session.analysis_lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[&1].moves, vec!["e4", "e5", "Nf3"]);
        assert_eq!(lines[&1].depth, Some(14));
    }

    #[tokio::test]
    async fn test_secondary_line_does_not_update_evaluation() {
        let (mut session, engine) = ready_session();
        session.start_search(spec(SearchIntent::Analysis));
        engine.emit("info depth 9 multipv 3 score cp -80 pv a2a3");
        let events = pump(&mut session);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            SessionEvent::AnalysisLineUpdated { rank: 3, .. }
        ));
    }

    #[tokio::test]
    async fn test_superseded_search_output_is_dropped() {
        let (mut session, engine) = ready_session();
        session.start_search(spec(SearchIntent::Hint));
        session.start_search(spec(SearchIntent::Move));

        // Output of the hint search, answered after the new `go` was sent.
        engine.emit("info depth 20 score cp 500 pv a2a3");
        engine.emit("bestmove a2a3");
        assert!(pump(&mut session).is_empty());
        assert_eq!(session.in_flight().unwrap().intent, SearchIntent::Move);

        engine.emit("info depth 5 score cp 20 pv e2e4");
        engine.emit("bestmove e2e4 ponder e7e5");
        let events = pump(&mut session);
        match events.last() {
            Some(SessionEvent::SearchCompleted { request, best_move }) => {
                assert_eq!(request.intent, SearchIntent::Move);
                assert_eq!(request.generation, 2);
                assert_eq!(format_uci_move(best_move.unwrap()), "e2e4");
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(session.in_flight().is_none());
    }

    #[tokio::test]
    async fn test_bestmove_after_stop_is_discarded() {
        let (mut session, engine) = ready_session();
        session.start_search(spec(SearchIntent::Move));
        session.stop();
        engine.emit("bestmove e2e4");
        assert!(pump(&mut session).is_empty());

        session.start_search(spec(SearchIntent::Hint));
        engine.emit("bestmove d2d4");
        assert!(matches!(
            pump(&mut session).as_slice(),
            [SessionEvent::SearchCompleted { request, .. }] if request.intent == SearchIntent::Hint
        ));
    }

    #[tokio::test]
    async fn test_bestmove_none() {
        let (mut session, engine) = ready_session();
        session.start_search(spec(SearchIntent::Move));
        engine.emit("bestmove (none)");
        assert!(matches!(
            pump(&mut session).as_slice(),
            [SessionEvent::SearchCompleted {
                best_move: None,
                ..
            }]
        ));
    }

    #[tokio::test]
    async fn test_null_bestmove_completes_search() {
        let (mut session, engine) = ready_session();
        session.start_search(spec(SearchIntent::Hint));
        engine.emit("bestmove 0000");
        assert!(matches!(
            pump(&mut session).as_slice(),
            [SessionEvent::SearchCompleted {
                best_move: None,
                ..
            }]
        ));
        assert!(session.in_flight().is_none());

        // The next search is still correlated with its own output.
        session.start_search(spec(SearchIntent::Hint));
        engine.emit("info depth 5 multipv 1 score cp 20 pv e2e4");
        engine.emit("bestmove e2e4");
        let events = pump(&mut session);
        assert!(events
            .iter()
            .any(|event| matches!(event, SessionEvent::Evaluation { .. })));
        assert!(matches!(
            events.last(),
            Some(SessionEvent::SearchCompleted {
                best_move: Some(mv),
                ..
            }) if format_uci_move(*mv) == "e2e4"
        ));
    }

    #[tokio::test]
    async fn test_fault_clears_readiness() {
        let (mut session, engine) = ready_session();
        session.start_search(spec(SearchIntent::Move));
        engine.fault("worker crashed");

        let events = pump(&mut session);
        assert_eq!(
            events,
            vec![SessionEvent::EngineError("worker crashed".to_string())]
        );
        assert!(!session.is_ready());
        assert!(session.in_flight().is_none());
        assert_eq!(session.start_search(spec(SearchIntent::Hint)), SearchStart::Deferred);
    }

    #[tokio::test]
    async fn test_new_game_and_skill() {
        let (mut session, mut engine) = ready_session();
        session.set_skill_level(25);
        session.new_game();
        assert_eq!(
            engine.sent(),
            vec![
                "setoption name Skill Level value 20",
                "ucinewgame",
                "setoption name Skill Level value 20",
            ]
        );
    }

    #[tokio::test]
    async fn test_reactivation_restarts_handshake() {
        let (launcher, mut engines) = MockLauncher::new();
        let mut session = UciSession::new(Box::new(launcher), SessionOptions::default());
        let request = SourceRequest::Bundled {
            label: "Bundled".into(),
        };
        session.activate(request.clone()).unwrap();
        let first = engines.next().unwrap();
        first.complete_handshake();
        pump(&mut session);
        assert!(session.is_ready());

        session.activate(request).unwrap();
        let mut second = engines.next().unwrap();
        assert!(first.is_detached());
        assert_eq!(session.phase(), SessionPhase::AwaitingHandshake);
        assert_eq!(second.sent(), vec!["uci"]);
    }
}

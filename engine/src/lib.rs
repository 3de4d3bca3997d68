//! UCI engine coordination for Stockfish Studio.
//!
//! [`transport`] owns the engine process handle, [`uci`] parses the wire
//! protocol and [`session`] sequences handshake, option configuration and
//! searches on top of both.

#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod session;
pub mod stockfish;
pub mod transport;
pub mod uci;

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockEngine, MockEngines, MockLauncher};
pub use session::{
    AnalysisLine, SearchStart, SessionEvent, SessionOptions, SessionPhase, UciSession,
};
pub use stockfish::{ProcessLauncher, ProcessLauncherConfig};
pub use transport::{
    EngineCapability, EngineIo, EngineLauncher, EngineMessage, EngineSource, SourceKind,
    SourceRequest, TransportError, TransportEvent, UciTransport,
};
pub use uci::{UciError, UciMessage};

use cozy_chess::Move;
use serde::Serialize;

/// What a search was started for. Results are routed by this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchIntent {
    None,
    Move,
    Hint,
    Analysis,
}

/// Budget for the "go" command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchBudget {
    /// Think for a fixed number of milliseconds
    MoveTime(u64),
    /// Search to a fixed depth
    Depth(u8),
}

/// A search the caller wants started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSpec {
    pub intent: SearchIntent,
    pub fen: String,
    pub budget: SearchBudget,
    /// Skill level to (re)apply right before searching.
    pub skill_level: Option<u8>,
}

/// A search in flight, tagged with the generation of its `go` command.
///
/// Every result the session emits carries the request it belongs to so that
/// consumers never route on shared state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub intent: SearchIntent,
    pub generation: u64,
    pub fen: String,
    pub budget: SearchBudget,
}

/// Engine analysis information
#[derive(Debug, Clone, Default)]
pub struct EngineInfo {
    pub depth: Option<u8>,
    pub seldepth: Option<u8>,
    pub time_ms: Option<u64>,
    pub nodes: Option<u64>,
    pub score: Option<Score>,
    pub bound: Option<ScoreBound>,
    pub wdl: Option<Wdl>,
    /// Principal variation in engine notation
    pub pv: Vec<String>,
    pub multipv: Option<u8>,
    pub currmove: Option<Move>,
    pub hashfull: Option<u16>,
    pub nps: Option<u64>,
    pub string: Option<String>,
}

/// Engine evaluation score.
///
/// Always relative to the side to move: positive centipawns favour the side
/// to move, `Mate(n)` with n > 0 means the side to move mates in n.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Score {
    Centipawns(i32),
    Mate(i32),
}

impl Score {
    /// Negate the score (flip perspective).
    pub fn negate(self) -> Self {
        match self {
            Self::Centipawns(cp) => Self::Centipawns(-cp),
            Self::Mate(m) => Self::Mate(-m),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBound {
    Lower,
    Upper,
}

/// Win/draw/loss statistics in permille, reported with `UCI_ShowWDL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Wdl {
    pub win: u16,
    pub draw: u16,
    pub loss: u16,
}

/// One evaluation reading from the engine.
///
/// `score == None` means no evaluation has been received yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EvaluationSample {
    pub score: Option<Score>,
    /// Whether the reading came from the principal (rank 1) line.
    pub primary: bool,
}

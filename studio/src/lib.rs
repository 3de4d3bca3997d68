//! Stockfish Studio: play and analyse chess against a UCI engine.
//!
//! The [`Studio`] ties the rules adapter, the engine session, the chess
//! clock and the evaluation display together. [`run_studio_actor`] drives it
//! from a single task.

pub mod actor;
pub mod clock;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod frontend;
pub mod observer;
pub mod studio;

pub use actor::{run_studio_actor, StudioCommand};
pub use clock::{format_clock, ChessClock, ClockError, ClockState, ClockTick, TimeControl};
pub use error::StudioError;
pub use evaluation::Evaluation;
pub use observer::{AppliedMove, Hint, StudioObserver};
pub use studio::{ColorChoice, Studio, StudioOptions, BUNDLED_ENGINE_LABEL};

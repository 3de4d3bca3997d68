use std::path::PathBuf;

use tokio::sync::{mpsc, oneshot};
use tracing::Instrument;

use crate::clock::{ClockTick, TimeControl};
use crate::frontend;
use crate::observer::StudioObserver;
use crate::studio::{ColorChoice, Studio};

/// Commands accepted by the studio actor.
#[derive(Debug)]
pub enum StudioCommand {
    PlayMove(String),
    Hint,
    NewGame {
        color: ColorChoice,
        preset: Option<TimeControl>,
    },
    Undo,
    ToggleAnalysis,
    AutoPlay(bool),
    Resign,
    SetSkill(u8),
    SetTimeControl(TimeControl),
    LoadPosition(String),
    LoadEngine(PathBuf),
    ResetEngine,
    Pgn {
        reply: oneshot::Sender<String>,
    },
    Board {
        reply: oneshot::Sender<String>,
    },
    Fen {
        reply: oneshot::Sender<String>,
    },
    Shutdown,
}

/// The studio event loop. Owns the studio and processes commands, engine
/// output and clock ticks one at a time.
pub async fn run_studio_actor<O: StudioObserver>(
    studio: Studio<O>,
    cmd_rx: mpsc::Receiver<StudioCommand>,
    ticks: mpsc::UnboundedReceiver<ClockTick>,
) {
    run_studio_actor_inner(studio, cmd_rx, ticks)
        .instrument(tracing::info_span!("studio"))
        .await;
}

async fn run_studio_actor_inner<O: StudioObserver>(
    mut studio: Studio<O>,
    mut cmd_rx: mpsc::Receiver<StudioCommand>,
    mut ticks: mpsc::UnboundedReceiver<ClockTick>,
) {
    tracing::info!("Studio actor started");

    loop {
        tokio::select! {
            biased;

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(StudioCommand::Shutdown) | None => {
                        tracing::info!("Studio actor shutting down");
                        break;
                    }
                    Some(cmd) => handle_command(&mut studio, cmd),
                }
            }

            Some(event) = studio.next_engine_event() => {
                studio.handle_engine_event(event);
            }

            Some(ClockTick) = ticks.recv() => {
                studio.handle_clock_tick();
            }
        }
    }

    studio.shutdown();
    tracing::info!("Studio actor exited");
}

pub(crate) fn handle_command<O: StudioObserver>(studio: &mut Studio<O>, cmd: StudioCommand) {
    tracing::debug!("Handling command: {:?}", cmd);
    match cmd {
        StudioCommand::PlayMove(text) => {
            if let Err(e) = studio.play_uci(&text) {
                tracing::info!("Move {} rejected: {}", text, e);
                studio.observer_mut().on_status_message(&e.to_string());
            }
        }
        StudioCommand::Hint => {
            if !studio.request_hint() {
                studio
                    .observer_mut()
                    .on_status_message("No hint available right now.");
            }
        }
        StudioCommand::NewGame { color, preset } => {
            studio.new_game(color, preset);
        }
        StudioCommand::Undo => {
            if !studio.undo() {
                studio.observer_mut().on_status_message("Nothing to undo.");
            }
        }
        StudioCommand::ToggleAnalysis => {
            studio.toggle_analysis_mode();
        }
        StudioCommand::AutoPlay(enabled) => studio.set_auto_play(enabled),
        StudioCommand::Resign => {
            studio.resign();
        }
        StudioCommand::SetSkill(level) => studio.set_skill_level(level),
        StudioCommand::SetTimeControl(control) => studio.set_time_control(control),
        StudioCommand::LoadPosition(fen) => {
            if let Err(e) = studio.load_position(&fen) {
                studio.observer_mut().on_status_message(&e.to_string());
            }
        }
        StudioCommand::LoadEngine(path) => {
            // Failures are reported as status messages by the studio itself.
            let _ = studio.load_custom_engine(&path);
        }
        StudioCommand::ResetEngine => {
            let _ = studio.load_bundled_engine(true);
        }
        StudioCommand::Pgn { reply } => {
            let _ = reply.send(studio.pgn());
        }
        StudioCommand::Board { reply } => {
            let _ = reply.send(frontend::render_board(studio));
        }
        StudioCommand::Fen { reply } => {
            let _ = reply.send(studio.game().to_fen());
        }
        // Handled by the actor loop.
        StudioCommand::Shutdown => {}
    }
}

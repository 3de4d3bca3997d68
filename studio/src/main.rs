use std::path::PathBuf;

use clap::Parser;
use engine::{ProcessLauncher, ProcessLauncherConfig};
use studio::frontend::{self, Input, HELP};
use studio::{config, run_studio_actor, ColorChoice, Studio, StudioCommand, StudioObserver};
use studio::{StudioOptions, TimeControl};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "stockfish-studio", version, about = "Play chess against Stockfish")]
struct Cli {
    /// Use this engine executable instead of the bundled Stockfish
    #[arg(long, value_name = "PATH")]
    engine: Option<PathBuf>,

    /// Side to play: white, black or random
    #[arg(long, default_value = "white")]
    color: ColorChoice,

    /// Time control: `unlimited` or `minutes|increment`, e.g. `5|3`
    #[arg(long, value_name = "PRESET")]
    time_control: Option<TimeControl>,

    /// Engine strength
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=20))]
    skill: Option<u8>,

    /// Directory for the rolling log file
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Emit notifications as JSON lines instead of text
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_dir = cli.log_dir.clone().unwrap_or_else(config::get_log_dir);
    std::fs::create_dir_all(&log_dir).ok();
    let file_appender = tracing_appender::rolling::daily(&log_dir, "stockfish-studio");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_line_number(true),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("Stockfish Studio starting up");

    let launcher = ProcessLauncher::new(ProcessLauncherConfig {
        bundled_path: config::get_engine_path(),
        ..ProcessLauncherConfig::default()
    });

    if cli.json {
        run(frontend::JsonObserver::new(std::io::stdout()), &cli, launcher).await?;
    } else {
        println!("Stockfish Studio - type 'help' for commands");
        println!("Debug logs: {}/stockfish-studio.YYYY-MM-DD", log_dir.display());
        run(frontend::TextObserver::new(std::io::stdout()), &cli, launcher).await?;
    }

    tracing::info!("Stockfish Studio shutting down");
    Ok(())
}

async fn run<O>(observer: O, cli: &Cli, launcher: ProcessLauncher) -> anyhow::Result<()>
where
    O: StudioObserver + Send + 'static,
{
    let options = StudioOptions {
        skill_level: cli.skill.unwrap_or_else(config::get_skill_level),
        time_control: cli.time_control.unwrap_or_else(config::get_time_control),
        ..StudioOptions::default()
    };
    let (mut studio, ticks) = Studio::new(observer, Box::new(launcher), options);

    let loaded = match &cli.engine {
        Some(path) => studio.load_custom_engine(path).is_ok(),
        None => false,
    };
    if !loaded {
        if let Err(e) = studio.load_bundled_engine(false) {
            tracing::warn!("Continuing without an engine: {}", e);
        }
    }
    studio.new_game(cli.color, None);
    if !cli.json {
        println!("{}", frontend::render_board(&studio));
    }

    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let actor = tokio::spawn(run_studio_actor(studio, cmd_rx, ticks));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let input = match frontend::parse_input(&line) {
            Ok(Some(input)) => input,
            Ok(None) => continue,
            Err(message) => {
                print_reply(cli.json, &message);
                continue;
            }
        };
        match input {
            Input::Help => print_reply(cli.json, HELP),
            Input::Quit => break,
            Input::Query(query) => {
                let (reply_tx, reply_rx) = oneshot::channel();
                if cmd_tx.send(query.into_command(reply_tx)).await.is_err() {
                    break;
                }
                match reply_rx.await {
                    Ok(text) => print_reply(cli.json, &text),
                    Err(_) => break,
                }
            }
            Input::Command(cmd) => {
                if cmd_tx.send(cmd).await.is_err() {
                    break;
                }
            }
        }
    }

    let _ = cmd_tx.send(StudioCommand::Shutdown).await;
    actor.await?;
    Ok(())
}

fn print_reply(json: bool, text: &str) {
    if json {
        println!("{}", serde_json::json!({ "event": "reply", "text": text }));
    } else {
        println!("{text}");
    }
}

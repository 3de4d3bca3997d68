//! UCI transport: owns exactly one engine handle at a time.
//!
//! The transport only moves text. Handshake and search sequencing live in
//! [`crate::session`].

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tempfile::TempDir;
use tokio::process::Child;
use tokio::sync::mpsc;

/// Extensions accepted for user-supplied engine files (lowercase, "" means
/// no extension).
pub const SUPPORTED_EXTENSIONS: &[&str] = &["", "exe", "bin", "sh"];

/// How long a replaced engine gets to honour `quit` before it is killed.
const QUIT_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Bundled,
    Custom,
}

/// How the active engine is reached, fixed when it is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineCapability {
    /// Child process spoken to over stdin/stdout.
    Process { pid: Option<u32> },
    /// Engine living in this process behind a pair of channels.
    InProcess,
}

/// The engine currently attached to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineSource {
    pub kind: SourceKind,
    pub label: String,
    /// Staged copy of a custom engine file, released on teardown.
    pub resource: Option<PathBuf>,
    pub capability: EngineCapability,
}

/// Which engine the caller wants attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRequest {
    Bundled { label: String },
    Custom { path: PathBuf },
}

/// Raw output of a launched engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineMessage {
    Line(String),
    Fault(String),
}

/// Everything a launcher hands over for one engine instance.
pub struct EngineIo {
    pub capability: EngineCapability,
    pub commands: mpsc::UnboundedSender<String>,
    pub messages: mpsc::UnboundedReceiver<EngineMessage>,
    pub process: Option<Child>,
    pub staging: Option<TempDir>,
    pub resource: Option<PathBuf>,
}

/// Creates engine instances. Implemented for real child processes and, in
/// tests, for channel-backed mocks.
pub trait EngineLauncher: Send {
    fn launch_bundled(&mut self) -> Result<EngineIo, TransportError>;
    fn launch_file(&mut self, path: &Path) -> Result<EngineIo, TransportError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Bundled Stockfish engine is unavailable.")]
    EngineUnavailable,
    #[error(
        "Unsupported engine file type: {name}. Provide an engine executable (no extension, .exe, .bin or .sh)."
    )]
    UnsupportedEngineFile { name: String },
    #[error("Failed to send '{command}' to the engine")]
    WriteFailure { command: String },
    #[error("{0}")]
    Fault(String),
    #[error("Failed to launch engine: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug)]
pub enum TransportEvent {
    Line(String),
    Fault(TransportError),
}

struct ActiveEngine {
    source: EngineSource,
    commands: mpsc::UnboundedSender<String>,
    messages: mpsc::UnboundedReceiver<EngineMessage>,
    process: Option<Child>,
    staging: Option<TempDir>,
}

pub struct UciTransport {
    launcher: Box<dyn EngineLauncher>,
    active: Option<ActiveEngine>,
    faults: VecDeque<TransportError>,
}

impl UciTransport {
    pub fn new(launcher: Box<dyn EngineLauncher>) -> Self {
        Self {
            launcher,
            active: None,
            faults: VecDeque::new(),
        }
    }

    /// Launch the requested engine and make it the only active one.
    ///
    /// The new engine is launched before the old one is torn down, so a
    /// failed activation leaves the previous engine attached. Both engine
    /// processes are alive until the old one has exited on `quit`.
    #[tracing::instrument(level = "info", skip(self))]
    pub fn activate(&mut self, request: SourceRequest) -> Result<EngineSource, TransportError> {
        let (kind, label, io) = match &request {
            SourceRequest::Bundled { label } => {
                let io = self.launcher.launch_bundled()?;
                (SourceKind::Bundled, label.clone(), io)
            }
            SourceRequest::Custom { path } => {
                check_extension(path)?;
                let io = self.launcher.launch_file(path)?;
                let label = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                (SourceKind::Custom, label, io)
            }
        };

        self.teardown();

        let source = EngineSource {
            kind,
            label,
            resource: io.resource,
            capability: io.capability,
        };
        tracing::info!("Attached engine {:?} ({:?})", source.label, source.capability);

        self.active = Some(ActiveEngine {
            source: source.clone(),
            commands: io.commands,
            messages: io.messages,
            process: io.process,
            staging: io.staging,
        });
        Ok(source)
    }

    /// Best-effort delivery of one command line. Without an active engine
    /// this does nothing; a failed write is reported through
    /// [`UciTransport::next_event`].
    pub fn send(&mut self, command: &str) {
        let Some(engine) = &self.active else {
            tracing::trace!("No engine attached, dropping {:?}", command);
            return;
        };
        tracing::trace!("UCI >> {}", command);
        if engine.commands.send(command.to_string()).is_err() {
            tracing::warn!("Engine input closed, could not send {:?}", command);
            self.faults.push_back(TransportError::WriteFailure {
                command: command.to_string(),
            });
        }
    }

    /// Wait for the next line or fault from the active engine.
    /// Pends forever while no engine is attached.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        if let Some(fault) = self.faults.pop_front() {
            return Some(TransportEvent::Fault(fault));
        }
        let received = match self.active.as_mut() {
            Some(engine) => engine.messages.recv().await,
            None => std::future::pending().await,
        };
        Some(self.translate(received))
    }

    /// Non-blocking variant of [`UciTransport::next_event`].
    pub fn try_next_event(&mut self) -> Option<TransportEvent> {
        if let Some(fault) = self.faults.pop_front() {
            return Some(TransportEvent::Fault(fault));
        }
        let received = match self.active.as_mut()?.messages.try_recv() {
            Ok(message) => Some(message),
            Err(mpsc::error::TryRecvError::Empty) => return None,
            Err(mpsc::error::TryRecvError::Disconnected) => None,
        };
        Some(self.translate(received))
    }

    fn translate(&mut self, received: Option<EngineMessage>) -> TransportEvent {
        match received {
            Some(EngineMessage::Line(line)) => {
                tracing::trace!("UCI << {}", line);
                TransportEvent::Line(line)
            }
            Some(EngineMessage::Fault(reason)) => {
                tracing::error!("Engine fault: {}", reason);
                TransportEvent::Fault(TransportError::Fault(reason))
            }
            None => {
                tracing::warn!("Engine output closed");
                self.teardown();
                TransportEvent::Fault(TransportError::Fault(
                    "Engine stopped responding.".to_string(),
                ))
            }
        }
    }

    pub fn source(&self) -> Option<&EngineSource> {
        self.active.as_ref().map(|engine| &engine.source)
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Tear down the active engine, if any. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        // Faults belong to the engine being detached.
        self.faults.clear();
        let Some(engine) = self.active.take() else {
            return;
        };
        tracing::info!("Detaching engine {:?}", engine.source.label);

        let ActiveEngine {
            commands,
            messages,
            process,
            staging,
            ..
        } = engine;

        let _ = commands.send("quit".to_string());
        // Dropping both channel ends detaches us from the engine's output and
        // lets its writer finish once `quit` is flushed.
        drop(messages);
        drop(commands);

        match process {
            Some(child) => reap(child, staging),
            None => drop(staging),
        }
    }
}

impl Drop for UciTransport {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Give a replaced process a moment to exit on `quit`, then kill it. The
/// staged engine file is only released once the process is gone.
fn reap(mut child: Child, staging: Option<TempDir>) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                if tokio::time::timeout(QUIT_GRACE, child.wait()).await.is_err() {
                    tracing::warn!("Engine ignored quit, killing it");
                    let _ = child.kill().await;
                }
                drop(staging);
            });
        }
        Err(_) => {
            let _ = child.start_kill();
            drop(staging);
        }
    }
}

fn check_extension(path: &Path) -> Result<(), TransportError> {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        Ok(())
    } else {
        Err(TransportError::UnsupportedEngineFile {
            name: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockLauncher;

    #[test]
    fn test_extension_allow_list() {
        assert!(check_extension(Path::new("/opt/engines/stockfish")).is_ok());
        assert!(check_extension(Path::new("C:/engines/Stockfish.EXE")).is_ok());
        assert!(check_extension(Path::new("run-engine.sh")).is_ok());
        let err = check_extension(Path::new("/tmp/stockfish.js")).unwrap_err();
        assert!(err.to_string().contains("stockfish.js"));
    }

    #[tokio::test]
    async fn test_repeated_activation_keeps_one_engine() {
        let (launcher, mut engines) = MockLauncher::new();
        let mut transport = UciTransport::new(Box::new(launcher));

        for _ in 0..3 {
            transport
                .activate(SourceRequest::Bundled {
                    label: "Bundled".into(),
                })
                .unwrap();
        }

        let mut first = engines.next().unwrap();
        let mut second = engines.next().unwrap();
        let third = engines.next().unwrap();
        assert!(engines.next().is_none());

        // Replaced engines were told to quit and detached.
        assert_eq!(first.sent(), vec!["quit"]);
        assert_eq!(second.sent(), vec!["quit"]);
        assert!(first.is_detached());
        assert!(second.is_detached());
        assert!(!third.is_detached());
        assert!(transport.is_active());
    }

    #[tokio::test]
    async fn test_failed_activation_keeps_previous_engine() {
        let (launcher, mut engines) = MockLauncher::new();
        let mut transport = UciTransport::new(Box::new(launcher));
        transport
            .activate(SourceRequest::Bundled {
                label: "Bundled".into(),
            })
            .unwrap();

        let err = transport
            .activate(SourceRequest::Custom {
                path: "engine.js".into(),
            })
            .unwrap_err();
        assert!(matches!(err, TransportError::UnsupportedEngineFile { .. }));

        let engine = engines.next().unwrap();
        assert!(!engine.is_detached());
        assert_eq!(transport.source().unwrap().kind, SourceKind::Bundled);
    }

    #[tokio::test]
    async fn test_bundled_unavailable() {
        let (launcher, _engines) = MockLauncher::without_bundled();
        let mut transport = UciTransport::new(Box::new(launcher));
        let err = transport
            .activate(SourceRequest::Bundled {
                label: "Bundled".into(),
            })
            .unwrap_err();
        assert!(matches!(err, TransportError::EngineUnavailable));
        assert!(!transport.is_active());
    }

    #[tokio::test]
    async fn test_send_without_engine_is_noop() {
        let (launcher, _engines) = MockLauncher::new();
        let mut transport = UciTransport::new(Box::new(launcher));
        transport.send("uci");
        assert!(transport.try_next_event().is_none());
        transport.dispose();
        transport.dispose();
    }

    #[tokio::test]
    async fn test_lines_and_faults_are_delivered_in_order() {
        let (launcher, mut engines) = MockLauncher::new();
        let mut transport = UciTransport::new(Box::new(launcher));
        transport
            .activate(SourceRequest::Bundled {
                label: "Bundled".into(),
            })
            .unwrap();
        let engine = engines.next().unwrap();
        engine.emit("uciok");
        engine.fault("worker crashed");

        assert!(matches!(
            transport.next_event().await,
            Some(TransportEvent::Line(line)) if line == "uciok"
        ));
        assert!(matches!(
            transport.next_event().await,
            Some(TransportEvent::Fault(TransportError::Fault(reason))) if reason == "worker crashed"
        ));
    }

    #[tokio::test]
    async fn test_write_failure_is_reported_not_returned() {
        let (launcher, mut engines) = MockLauncher::new();
        let mut transport = UciTransport::new(Box::new(launcher));
        transport
            .activate(SourceRequest::Bundled {
                label: "Bundled".into(),
            })
            .unwrap();
        // Dropping the mock closes the engine's input side.
        drop(engines.next().unwrap());

        transport.send("isready");
        assert!(matches!(
            transport.try_next_event(),
            Some(TransportEvent::Fault(TransportError::WriteFailure { command })) if command == "isready"
        ));
    }

    #[tokio::test]
    async fn test_reactivation_discards_faults_of_replaced_engine() {
        let (launcher, mut engines) = MockLauncher::new();
        let mut transport = UciTransport::new(Box::new(launcher));
        transport
            .activate(SourceRequest::Bundled {
                label: "Bundled".into(),
            })
            .unwrap();
        drop(engines.next().unwrap());
        transport.send("isready");

        transport
            .activate(SourceRequest::Bundled {
                label: "Bundled".into(),
            })
            .unwrap();
        let engine = engines.next().unwrap();
        engine.emit("uciok");

        assert!(matches!(
            transport.try_next_event(),
            Some(TransportEvent::Line(line)) if line == "uciok"
        ));
        assert!(transport.try_next_event().is_none());
    }

    #[tokio::test]
    async fn test_closed_output_detaches_engine() {
        let (launcher, mut engines) = MockLauncher::new();
        let mut transport = UciTransport::new(Box::new(launcher));
        transport
            .activate(SourceRequest::Bundled {
                label: "Bundled".into(),
            })
            .unwrap();
        drop(engines.next().unwrap());

        assert!(matches!(
            transport.try_next_event(),
            Some(TransportEvent::Fault(TransportError::Fault(_)))
        ));
        assert!(!transport.is_active());
    }
}

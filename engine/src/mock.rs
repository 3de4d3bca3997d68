//! Channel-backed engine launcher for tests.
//!
//! Every launch hands a [`MockEngine`] to the test through [`MockEngines`],
//! which can then script engine output and inspect what was sent.

use std::path::Path;

use tokio::sync::mpsc;

use crate::transport::{EngineCapability, EngineIo, EngineLauncher, EngineMessage, TransportError};

pub struct MockLauncher {
    engines: mpsc::UnboundedSender<MockEngine>,
    bundled_available: bool,
}

/// Receives each engine the [`MockLauncher`] creates, in launch order.
pub struct MockEngines {
    rx: mpsc::UnboundedReceiver<MockEngine>,
}

impl MockEngines {
    /// The next launched engine that has not been taken yet.
    pub fn next(&mut self) -> Option<MockEngine> {
        self.rx.try_recv().ok()
    }
}

/// The test-side end of one mocked engine.
pub struct MockEngine {
    commands: mpsc::UnboundedReceiver<String>,
    messages: mpsc::UnboundedSender<EngineMessage>,
}

impl MockEngine {
    /// Emit one line of engine output.
    pub fn emit(&self, line: &str) {
        let _ = self.messages.send(EngineMessage::Line(line.to_string()));
    }

    /// Simulate the engine crashing.
    pub fn fault(&self, reason: &str) {
        let _ = self.messages.send(EngineMessage::Fault(reason.to_string()));
    }

    /// Drain every command the transport has sent so far.
    pub fn sent(&mut self) -> Vec<String> {
        let mut sent = Vec::new();
        while let Ok(command) = self.commands.try_recv() {
            sent.push(command);
        }
        sent
    }

    /// Whether the transport has dropped its end of the engine output.
    pub fn is_detached(&self) -> bool {
        self.messages.is_closed()
    }

    /// Answer the handshake the way Stockfish does.
    pub fn complete_handshake(&self) {
        self.emit("id name Stockfish 16");
        self.emit("uciok");
        self.emit("readyok");
    }
}

impl MockLauncher {
    pub fn new() -> (Self, MockEngines) {
        Self::with_bundled(true)
    }

    /// A launcher whose bundled engine fails to load.
    pub fn without_bundled() -> (Self, MockEngines) {
        Self::with_bundled(false)
    }

    fn with_bundled(bundled_available: bool) -> (Self, MockEngines) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                engines: tx,
                bundled_available,
            },
            MockEngines { rx },
        )
    }

    fn launch(&mut self, resource: Option<&Path>) -> EngineIo {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        let _ = self.engines.send(MockEngine {
            commands: command_rx,
            messages: message_tx,
        });
        EngineIo {
            capability: EngineCapability::InProcess,
            commands: command_tx,
            messages: message_rx,
            process: None,
            staging: None,
            resource: resource.map(Path::to_path_buf),
        }
    }
}

impl EngineLauncher for MockLauncher {
    fn launch_bundled(&mut self) -> Result<EngineIo, TransportError> {
        if !self.bundled_available {
            return Err(TransportError::EngineUnavailable);
        }
        Ok(self.launch(None))
    }

    fn launch_file(&mut self, path: &Path) -> Result<EngineIo, TransportError> {
        Ok(self.launch(Some(path)))
    }
}

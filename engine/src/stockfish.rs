use crate::transport::{EngineCapability, EngineIo, EngineLauncher, EngineMessage, TransportError};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

/// Where to look for the bundled engine.
#[derive(Debug, Clone)]
pub struct ProcessLauncherConfig {
    /// Explicit engine binary, checked before anything else.
    pub bundled_path: Option<PathBuf>,
    /// Well-known install locations, checked before `PATH`.
    pub search_paths: Vec<PathBuf>,
}

impl Default for ProcessLauncherConfig {
    fn default() -> Self {
        Self {
            bundled_path: None,
            search_paths: [
                "/usr/local/bin/stockfish",
                "/usr/bin/stockfish",
                "/opt/homebrew/bin/stockfish",
                "/usr/games/stockfish",
            ]
            .into_iter()
            .map(PathBuf::from)
            .collect(),
        }
    }
}

/// Launches engines as child processes speaking UCI over stdin/stdout.
#[derive(Debug, Clone, Default)]
pub struct ProcessLauncher {
    config: ProcessLauncherConfig,
}

impl ProcessLauncher {
    pub fn new(config: ProcessLauncherConfig) -> Self {
        Self { config }
    }

    /// Resolve the bundled engine binary, if one is installed.
    pub fn find_bundled(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config.bundled_path {
            return path.is_file().then(|| path.clone());
        }
        self.config
            .search_paths
            .iter()
            .find(|path| path.is_file())
            .cloned()
            .or_else(|| find_in_path("stockfish"))
    }
}

impl EngineLauncher for ProcessLauncher {
    fn launch_bundled(&mut self) -> Result<EngineIo, TransportError> {
        let path = self.find_bundled().ok_or(TransportError::EngineUnavailable)?;
        tracing::info!("Found Stockfish at: {:?}", path);
        spawn_engine(&path, None)
    }

    fn launch_file(&mut self, path: &Path) -> Result<EngineIo, TransportError> {
        let (staging, staged) = stage_engine_file(path)?;
        tracing::info!("Staged custom engine {:?} at {:?}", path, staged);
        spawn_engine(&staged, Some(staging))
    }
}

fn find_in_path(binary: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .flat_map(|dir| {
            let plain = dir.join(binary);
            let windows = dir.join(format!("{binary}.exe"));
            [plain, windows]
        })
        .find(|candidate| candidate.is_file())
}

/// Copy a user-supplied engine into a private temporary directory so the
/// original can be moved or deleted while the engine runs.
fn stage_engine_file(path: &Path) -> Result<(TempDir, PathBuf), TransportError> {
    let name = path.file_name().ok_or_else(|| {
        TransportError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} is not a file", path.display()),
        ))
    })?;
    let staging = tempfile::Builder::new()
        .prefix("stockfish-studio-")
        .tempdir()?;
    let staged = staging.path().join(name);
    std::fs::copy(path, &staged)?;
    make_executable(&staged)?;
    Ok((staging, staged))
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = std::fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o700);
    std::fs::set_permissions(path, permissions)
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Spawn the engine with a writer task draining the command channel into
/// stdin and a reader task forwarding stdout lines.
#[tracing::instrument(level = "debug", skip(staging))]
fn spawn_engine(path: &Path, staging: Option<TempDir>) -> Result<EngineIo, TransportError> {
    let mut process = tokio::process::Command::new(path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            tracing::error!("Failed to spawn engine: {}", e);
            TransportError::Io(e)
        })?;

    let mut stdin = process
        .stdin
        .take()
        .ok_or_else(|| TransportError::Fault("Failed to get engine stdin".to_string()))?;
    let stdout = process
        .stdout
        .take()
        .ok_or_else(|| TransportError::Fault("Failed to get engine stdout".to_string()))?;

    let (command_tx, mut command_rx) = mpsc::unbounded_channel::<String>();
    let (message_tx, message_rx) = mpsc::unbounded_channel::<EngineMessage>();

    let reader_tx = message_tx.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if reader_tx.send(EngineMessage::Line(line)).is_err() {
                        // Transport detached.
                        break;
                    }
                }
                Ok(None) => {
                    tracing::warn!("Engine stdout EOF - engine closed");
                    let _ = reader_tx.send(EngineMessage::Fault(
                        "Engine process exited.".to_string(),
                    ));
                    break;
                }
                Err(e) => {
                    tracing::error!("Error reading from engine stdout: {}", e);
                    let _ = reader_tx.send(EngineMessage::Fault(format!(
                        "Failed to read engine output: {e}"
                    )));
                    break;
                }
            }
        }
        tracing::debug!("Output reader task exiting");
    });

    tokio::spawn(async move {
        while let Some(command) = command_rx.recv().await {
            let mut line = command.into_bytes();
            line.push(b'\n');
            let written = match stdin.write_all(&line).await {
                Ok(()) => stdin.flush().await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                tracing::error!("Failed to write to engine stdin: {}", e);
                let _ = message_tx.send(EngineMessage::Fault(format!(
                    "Failed to write to engine: {e}"
                )));
                break;
            }
        }
        tracing::debug!("Stdin writer task exiting");
    });

    let resource = staging.as_ref().map(|_| path.to_path_buf());
    Ok(EngineIo {
        capability: EngineCapability::Process { pid: process.id() },
        commands: command_tx,
        messages: message_rx,
        process: Some(process),
        staging,
        resource,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_explicit_engine_is_unavailable() {
        let mut launcher = ProcessLauncher::new(ProcessLauncherConfig {
            bundled_path: Some(PathBuf::from("/nonexistent/stockfish")),
            search_paths: vec![],
        });
        assert!(launcher.find_bundled().is_none());
        assert!(matches!(
            launcher.launch_bundled(),
            Err(TransportError::EngineUnavailable)
        ));
    }

    #[test]
    fn test_staging_copies_into_private_dir() {
        let source_dir = tempfile::tempdir().unwrap();
        let source = source_dir.path().join("my-engine");
        std::fs::write(&source, b"#!/bin/sh\n").unwrap();

        let (staging, staged) = stage_engine_file(&source).unwrap();
        assert!(staged.starts_with(staging.path()));
        assert_eq!(std::fs::read(&staged).unwrap(), b"#!/bin/sh\n");

        let dir = staging.path().to_path_buf();
        drop(staging);
        assert!(!dir.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_script_engine_round_trip() {
        let source_dir = tempfile::tempdir().unwrap();
        let script = source_dir.path().join("echo-engine.sh");
        std::fs::write(
            &script,
            "#!/bin/sh\nwhile read line; do\n  [ \"$line\" = uci ] && echo uciok\n  [ \"$line\" = quit ] && exit 0\ndone\n",
        )
        .unwrap();

        let mut launcher = ProcessLauncher::default();
        let mut io = launcher.launch_file(&script).unwrap();
        assert!(matches!(io.capability, EngineCapability::Process { .. }));
        assert!(io.resource.is_some());

        io.commands.send("uci".to_string()).unwrap();
        let reply = tokio::time::timeout(std::time::Duration::from_secs(5), io.messages.recv())
            .await
            .unwrap();
        assert_eq!(reply, Some(EngineMessage::Line("uciok".to_string())));

        io.commands.send("quit".to_string()).unwrap();
        let mut child = io.process.take().unwrap();
        let status = tokio::time::timeout(std::time::Duration::from_secs(5), child.wait())
            .await
            .unwrap()
            .unwrap();
        assert!(status.success());
    }
}

//! Child worker process lifecycle and message passing
//!
//! The supervisor owns the discovery and playback worker processes. Each one
//! gets a writer task (commands in, one JSON line per command) and a reader
//! task (events out, parsed per line and forwarded into one shared channel).
//! Sends are fire-and-forget: a command for a worker that is not running is
//! dropped with a log line, never queued or retried. Workers are never
//! restarted; an exit is terminal until the orchestrator itself restarts.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::WorkerError;
use crate::worker::manual_streams_hash;

/// The two supervised workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerKind {
    Discovery,
    Playback,
}

impl WorkerKind {
    pub fn label(self) -> &'static str {
        match self {
            WorkerKind::Discovery => "discovery",
            WorkerKind::Playback => "playback",
        }
    }
}

/// An asynchronous message from a worker.
#[derive(Debug)]
pub struct WorkerEvent {
    pub worker: WorkerKind,
    pub payload: Value,
}

/// How to launch one worker process.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
}

const STATE_STARTING: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_EXITED: u8 = 2;

#[derive(Debug)]
struct WorkerHandle {
    kind: WorkerKind,
    child: Child,
    command_tx: mpsc::UnboundedSender<String>,
    state: Arc<AtomicU8>,
}

impl WorkerHandle {
    fn spawn(
        kind: WorkerKind,
        config: &WorkerConfig,
        event_tx: mpsc::UnboundedSender<WorkerEvent>,
    ) -> Result<Self, WorkerError> {
        let state = Arc::new(AtomicU8::new(STATE_STARTING));

        let mut child = Command::new(&config.program)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| WorkerError::Spawn {
                worker: kind.label(),
                source,
            })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let (Some(mut stdin), Some(stdout)) = (stdin, stdout) else {
            return Err(WorkerError::MissingPipes {
                worker: kind.label(),
            });
        };

        let (command_tx, mut command_rx) = mpsc::unbounded_channel::<String>();

        // Writer: one JSON line per command.
        let writer_state = state.clone();
        tokio::spawn(async move {
            while let Some(line) = command_rx.recv().await {
                if let Err(err) = stdin.write_all(line.as_bytes()).await {
                    warn!(%err, "worker stdin closed, dropping commands");
                    writer_state.store(STATE_EXITED, Ordering::SeqCst);
                    break;
                }
                if stdin.write_all(b"\n").await.is_err() || stdin.flush().await.is_err() {
                    writer_state.store(STATE_EXITED, Ordering::SeqCst);
                    break;
                }
            }
        });

        // Reader: parse each stdout line as an event; EOF means the worker
        // is gone.
        let reader_state = state.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match serde_json::from_str::<Value>(&line) {
                        Ok(payload) => {
                            if event_tx.send(WorkerEvent { worker: kind, payload }).is_err() {
                                break;
                            }
                        }
                        Err(err) => {
                            warn!(worker = kind.label(), %err, "unparseable worker message")
                        }
                    },
                    Ok(None) => {
                        info!(worker = kind.label(), "worker exited");
                        reader_state.store(STATE_EXITED, Ordering::SeqCst);
                        break;
                    }
                    Err(err) => {
                        warn!(worker = kind.label(), %err, "worker read failed");
                        reader_state.store(STATE_EXITED, Ordering::SeqCst);
                        break;
                    }
                }
            }
        });

        state.store(STATE_RUNNING, Ordering::SeqCst);
        info!(worker = kind.label(), program = %config.program.display(), "worker spawned");

        Ok(Self {
            kind,
            child,
            command_tx,
            state,
        })
    }

    fn is_running(&self) -> bool {
        self.state.load(Ordering::SeqCst) == STATE_RUNNING
    }

    fn send(&self, line: String) {
        if !self.is_running() {
            warn!(worker = self.kind.label(), "worker not running, command dropped");
            return;
        }
        if self.command_tx.send(line).is_err() {
            warn!(worker = self.kind.label(), "worker writer gone, command dropped");
        }
    }

    fn kill(&mut self) {
        self.state.store(STATE_EXITED, Ordering::SeqCst);
        if let Err(err) = self.child.start_kill() {
            debug!(worker = self.kind.label(), %err, "worker already gone");
        }
    }
}

/// Owns both worker processes and the event channel out of them.
#[derive(Debug)]
pub struct WorkerSupervisor {
    discovery: WorkerHandle,
    playback: WorkerHandle,
    streams_hash: Option<u64>,
    shut_down: bool,
}

impl WorkerSupervisor {
    /// Spawn both workers. The returned receiver carries every event either
    /// worker emits.
    pub fn spawn(
        discovery: &WorkerConfig,
        playback: &WorkerConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<WorkerEvent>), WorkerError> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let discovery = WorkerHandle::spawn(WorkerKind::Discovery, discovery, event_tx.clone())?;
        let playback = WorkerHandle::spawn(WorkerKind::Playback, playback, event_tx)?;
        Ok((
            Self {
                discovery,
                playback,
                streams_hash: None,
                shut_down: false,
            },
            event_rx,
        ))
    }

    /// Fire-and-forget command send.
    pub fn send<C: Serialize>(&self, worker: WorkerKind, command: &C) {
        if self.shut_down {
            warn!(worker = worker.label(), "supervisor shut down, command dropped");
            return;
        }
        let line = match serde_json::to_string(command) {
            Ok(line) => line,
            Err(err) => {
                warn!(worker = worker.label(), %err, "unserializable command dropped");
                return;
            }
        };
        debug!(worker = worker.label(), %line, "sending command");
        match worker {
            WorkerKind::Discovery => self.discovery.send(line),
            WorkerKind::Playback => self.playback.send(line),
        }
    }

    /// Track the manual-entry hash of a discovery stream list. True when the
    /// hash moved since the last list (including the first one), meaning the
    /// manually-added streams deserve a persistence save.
    pub fn streams_changed(&mut self, streams: &Value) -> bool {
        let hash = manual_streams_hash(streams);
        if self.streams_hash == Some(hash) {
            return false;
        }
        self.streams_hash = Some(hash);
        true
    }

    /// Kill both workers. No further commands are accepted.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.discovery.kill();
        self.playback.kill();
        info!("workers terminated");
    }
}

impl Drop for WorkerSupervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

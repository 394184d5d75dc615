//! Stream Monitor Orchestrator
//!
//! Owns the discovery and playback worker processes, reconciles live system
//! state against persisted configuration, and bridges the client protocol
//! over stdin/stdout NDJSON (the UI shell connects here).

use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stream_monitor::{
    config::ConfigPaths,
    orchestrator::{bootstrap, Bootstrap, NoWindow, Orchestrator},
    protocol::ClientMessage,
    system::{CpalEnumerator, DeviceReconciler, IfAddrsEnumerator, InterfaceReconciler},
    worker::WorkerConfig,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting Stream Monitor orchestrator");

    // Nowhere to persist anything without the config directories.
    let paths = ConfigPaths::resolve().context("no usable config location")?;
    tracing::info!(
        persistent = %paths.persistent_dir.display(),
        user = %paths.user_dir.display(),
        "configuration locations resolved"
    );

    let (discovery_cmd, playback_cmd) = worker_commands();
    let Bootstrap {
        persistent,
        user,
        supervisor,
        worker_events,
    } = bootstrap(&paths, &discovery_cmd, &playback_cmd).context("startup failed")?;

    let (client_tx, client_events) = mpsc::unbounded_channel();
    let (client_cmd_tx, client_rx) = mpsc::unbounded_channel();

    spawn_client_bridge(client_cmd_tx, client_events);

    let orchestrator = Orchestrator::new(
        persistent,
        user,
        DeviceReconciler::new(Box::new(CpalEnumerator)),
        InterfaceReconciler::new(Box::new(IfAddrsEnumerator)),
        supervisor,
        client_tx,
        Box::new(NoWindow),
    );

    orchestrator.run(client_rx, worker_events).await;
    tracing::info!("orchestrator stopped");
    Ok(())
}

fn worker_commands() -> (WorkerConfig, WorkerConfig) {
    let mut args = std::env::args().skip(1);
    let discovery = args.next().unwrap_or_else(|| "sdp-worker".into());
    let playback = args.next().unwrap_or_else(|| "audio-worker".into());
    (
        WorkerConfig {
            program: PathBuf::from(discovery),
            args: vec![],
        },
        WorkerConfig {
            program: PathBuf::from(playback),
            args: vec![],
        },
    )
}

/// Bridge the client protocol over this process's stdin/stdout.
fn spawn_client_bridge(
    commands: mpsc::UnboundedSender<ClientMessage>,
    mut events: mpsc::UnboundedReceiver<stream_monitor::protocol::ServerEvent>,
) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ClientMessage>(&line) {
                Ok(message) => {
                    if commands.send(message).is_err() {
                        break;
                    }
                }
                Err(err) => tracing::warn!(%err, "unknown client message dropped"),
            }
        }
        // stdin EOF: dropping the sender shuts the orchestrator down.
    });

    tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(event) = events.recv().await {
            let Ok(mut line) = serde_json::to_string(&event) else {
                continue;
            };
            line.push('\n');
            if stdout.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            let _ = stdout.flush().await;
        }
    });
}

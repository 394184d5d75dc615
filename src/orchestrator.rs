//! Message router and reconciliation loop
//!
//! The orchestrator is the sole mutator of the two configuration documents.
//! Everything it does is a discrete, non-overlapping unit of work: an inbound
//! client message, a worker event, a reconciliation tick, or a due debounce
//! flush. `run` multiplexes those through one `select!` loop on one task, so
//! the documents need no locking.

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{ConfigPaths, PersistentConfig, UserConfig, WindowState};
use crate::constants::RECONCILE_INTERVAL;
use crate::protocol::{ClientMessage, ServerEvent};
use crate::store::ConfigStore;
use crate::system::audio::DeviceResolution;
use crate::system::{DeviceReconciler, InterfaceReconciler};
use crate::worker::{
    DiscoveryCommand, PlaybackCommand, RestartArgs, WorkerConfig, WorkerEvent, WorkerKind,
    WorkerSupervisor,
};

/// External collaborator that knows the current window bounds (the UI shell
/// owns the window; the orchestrator only persists what it reports).
pub trait WindowStateSource: Send {
    fn current_window(&self) -> Option<WindowState>;
}

/// No-window environments (headless runs, tests).
pub struct NoWindow;

impl WindowStateSource for NoWindow {
    fn current_window(&self) -> Option<WindowState> {
        None
    }
}

/// Everything `main` needs before constructing an [`Orchestrator`]: both
/// documents loaded from disk and the worker pair running.
#[derive(Debug)]
pub struct Bootstrap {
    pub persistent: ConfigStore<PersistentConfig>,
    pub user: ConfigStore<UserConfig>,
    pub supervisor: WorkerSupervisor,
    pub worker_events: mpsc::UnboundedReceiver<WorkerEvent>,
}

/// Create the config directories, load both documents, and spawn both
/// workers. Any failure here is fatal to startup.
pub fn bootstrap(
    paths: &ConfigPaths,
    discovery: &WorkerConfig,
    playback: &WorkerConfig,
) -> crate::Result<Bootstrap> {
    paths.ensure_dirs()?;

    let mut persistent = ConfigStore::new(
        paths.persistent_dir.clone(),
        paths.persistent_file.clone(),
    );
    persistent.load()?;
    let mut user = ConfigStore::new(paths.user_dir.clone(), paths.user_file.clone());
    user.load()?;

    let (supervisor, worker_events) = WorkerSupervisor::spawn(discovery, playback)?;
    Ok(Bootstrap {
        persistent,
        user,
        supervisor,
        worker_events,
    })
}

pub struct Orchestrator {
    persistent: ConfigStore<PersistentConfig>,
    user: ConfigStore<UserConfig>,
    devices: DeviceReconciler,
    interfaces: InterfaceReconciler,
    supervisor: WorkerSupervisor,
    client_tx: mpsc::UnboundedSender<ServerEvent>,
    window_source: Box<dyn WindowStateSource>,
    is_playing: bool,
    discovery_initialized: bool,
}

impl Orchestrator {
    pub fn new(
        persistent: ConfigStore<PersistentConfig>,
        user: ConfigStore<UserConfig>,
        devices: DeviceReconciler,
        interfaces: InterfaceReconciler,
        supervisor: WorkerSupervisor,
        client_tx: mpsc::UnboundedSender<ServerEvent>,
        window_source: Box<dyn WindowStateSource>,
    ) -> Self {
        Self {
            persistent,
            user,
            devices,
            interfaces,
            supervisor,
            client_tx,
            window_source,
            is_playing: false,
            discovery_initialized: false,
        }
    }

    pub fn persistent(&self) -> &ConfigStore<PersistentConfig> {
        &self.persistent
    }

    pub fn user(&self) -> &ConfigStore<UserConfig> {
        &self.user
    }

    /// Restore the persisted audio selection against the live device set.
    /// Called once before the first tick.
    pub fn startup(&mut self) {
        let persisted = self.persistent.doc().settings.audio_interface.clone();
        let policy = self.persistent.doc().settings.clone();
        let resolution = self.devices.restore(persisted.as_ref(), &policy);
        self.apply_device_resolution(resolution);
    }

    /// One reconciliation pass: interfaces, device refresh, lazy discovery
    /// initialization.
    pub fn tick(&mut self) {
        let state_changed = self.reconcile_network();
        if state_changed && self.discovery_initialized {
            if let Some(current) = self.interfaces.current() {
                self.supervisor.send(
                    WorkerKind::Discovery,
                    &DiscoveryCommand::Interface {
                        data: current.address.clone(),
                    },
                );
            }
        }

        let policy = self.persistent.doc().settings.clone();
        let resolution = self.devices.refresh(&policy);
        self.apply_device_resolution(resolution);

        // One-time discovery init, once a usable interface exists.
        // Re-initializing a live session would lose in-flight discovery
        // state, hence the guard.
        if !self.discovery_initialized {
            if let Some(current) = self.interfaces.current() {
                info!(address = %current.address, "initializing discovery worker");
                self.discovery_initialized = true;
                self.supervisor.send(
                    WorkerKind::Discovery,
                    &DiscoveryCommand::Init {
                        data: current.address.clone(),
                    },
                );
                self.supervisor.send(
                    WorkerKind::Discovery,
                    &DiscoveryCommand::DeleteTimeout {
                        data: self.persistent.doc().settings.sdp_delete_timeout,
                    },
                );
            }
        }
    }

    /// Single inbound entry point for client messages.
    pub fn handle_message(&mut self, message: ClientMessage) {
        match message {
            ClientMessage::Update => {
                self.push(ServerEvent::UpdatePersistentData {
                    data: self.persistent.doc().clone(),
                });
                self.supervisor
                    .send(WorkerKind::Discovery, &DiscoveryCommand::Update);
            }

            ClientMessage::SetAudioInterface { data } => {
                let policy = self.persistent.doc().settings.clone();
                let resolution = self.devices.resolve(data.as_ref(), &policy);
                self.apply_device_resolution(resolution);
            }

            ClientMessage::Restart => {
                let policy = self.persistent.doc().settings.clone();
                let resolution = self.devices.refresh(&policy);
                self.apply_device_resolution(resolution);
                self.supervisor.send(
                    WorkerKind::Playback,
                    &PlaybackCommand::Restart {
                        data: RestartArgs {
                            network_interface: self.current_address(),
                            selected: self.devices.current().cloned(),
                        },
                    },
                );
            }

            ClientMessage::Play { data } => {
                let policy = self.persistent.doc().settings.clone();
                let resolution = self.devices.refresh(&policy);
                self.apply_device_resolution(resolution);

                let mut args = match data {
                    Value::Object(map) => map,
                    other => {
                        debug!(?other, "non-object play args, ignoring payload");
                        serde_json::Map::new()
                    }
                };
                args.insert("networkInterface".into(), self.current_address().into());
                args.insert(
                    "selected".into(),
                    serde_json::to_value(self.devices.current()).unwrap_or(Value::Null),
                );
                self.supervisor.send(
                    WorkerKind::Playback,
                    &PlaybackCommand::Start {
                        data: Value::Object(args),
                    },
                );
            }

            ClientMessage::Stop => {
                self.supervisor
                    .send(WorkerKind::Playback, &PlaybackCommand::Stop);
            }

            ClientMessage::AddStream { data } => {
                self.supervisor
                    .send(WorkerKind::Discovery, &DiscoveryCommand::Add { data });
            }

            ClientMessage::Delete { data } => {
                self.supervisor
                    .send(WorkerKind::Discovery, &DiscoveryCommand::Delete { data });
            }

            ClientMessage::SetNetwork { data: address } => self.set_network(address),

            ClientMessage::Save { key, data } => {
                if self.apply_save(true, &key, &data) {
                    // A settings overwrite may carry a new delete timeout.
                    if key == "settings" {
                        self.supervisor.send(
                            WorkerKind::Discovery,
                            &DiscoveryCommand::DeleteTimeout {
                                data: self.persistent.doc().settings.sdp_delete_timeout,
                            },
                        );
                    }
                }
            }

            ClientMessage::SavePersistent { key, data } => {
                self.apply_save(true, &key, &data);
            }

            ClientMessage::SaveUser { key, data } => {
                self.apply_save(false, &key, &data);
            }

            ClientMessage::SaveWindow => {
                if let Some(window) = self.window_source.current_window() {
                    self.user.doc_mut().settings.window = window;
                    self.user.schedule_save();
                }
            }

            ClientMessage::PlayingStatus { data } => {
                self.is_playing = data.is_playing;
            }
        }
    }

    /// Asynchronous worker events.
    pub fn handle_worker_event(&mut self, event: WorkerEvent) {
        match event.worker {
            WorkerKind::Discovery => {
                // Forwarded verbatim; only the manual-entry hash decides
                // whether the list is worth persisting.
                if self.supervisor.streams_changed(&event.payload) {
                    self.persistent.schedule_save();
                }
                self.push(ServerEvent::Streams {
                    data: event.payload,
                });
            }
            WorkerKind::Playback => {
                debug!(payload = %event.payload, "playback worker event");
            }
        }
    }

    /// Flush whichever stores have a due debounce deadline.
    pub fn flush_due_stores(&mut self) {
        let now = Instant::now();
        self.persistent.flush_if_due(now);
        self.user.flush_if_due(now);
    }

    fn next_flush_deadline(&self) -> Option<Instant> {
        match (self.persistent.deadline(), self.user.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Drive the orchestrator until the client disconnects or the process
    /// is interrupted.
    pub async fn run(
        mut self,
        mut client_rx: mpsc::UnboundedReceiver<ClientMessage>,
        mut worker_events: mpsc::UnboundedReceiver<WorkerEvent>,
    ) {
        self.startup();

        let mut tick = tokio::time::interval(RECONCILE_INTERVAL);
        // A slow pass must skip the ticks it missed, never queue them.
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut workers_alive = true;
        loop {
            let next_flush = self.next_flush_deadline();
            tokio::select! {
                _ = tick.tick() => self.tick(),

                message = client_rx.recv() => match message {
                    Some(message) => self.handle_message(message),
                    None => {
                        info!("client disconnected, shutting down");
                        break;
                    }
                },

                event = worker_events.recv(), if workers_alive => match event {
                    Some(event) => self.handle_worker_event(event),
                    None => workers_alive = false,
                },

                _ = sleep_until_or_forever(next_flush) => self.flush_due_stores(),

                _ = tokio::signal::ctrl_c() => {
                    info!("interrupt received, shutting down");
                    break;
                }
            }
        }

        self.shutdown();
    }

    /// Cancel pending debounce timers by flushing both stores synchronously,
    /// then terminate the workers. A failed flush here loses at most the
    /// last debounce window; the failure is logged inside the store.
    pub fn shutdown(&mut self) {
        self.persistent.flush_now();
        self.user.flush_now();
        self.supervisor.shutdown();
    }

    fn set_network(&mut self, address: String) {
        if self.interfaces.current().map(|i| i.address.as_str()) == Some(address.as_str()) {
            return;
        }
        if !self
            .interfaces
            .enumerate()
            .iter()
            .any(|i| i.address == address)
        {
            warn!(%address, "setNetwork rejected: address not among live interfaces");
            return;
        }

        self.persistent.doc_mut().network.current_interface = address.clone();
        self.reconcile_network();
        self.supervisor
            .send(WorkerKind::Playback, &PlaybackCommand::Stop);
        self.supervisor.send(
            WorkerKind::Discovery,
            &DiscoveryCommand::Interface { data: address },
        );
    }

    /// Re-run the interface reconciler, sync the result into the persistent
    /// document, and push the list to the client. Returns whether the live
    /// state moved since the previous pass.
    fn reconcile_network(&mut self) -> bool {
        let preference = self.persistent.doc().network.current_interface.clone();
        let state = self.interfaces.resolve(&preference);

        let doc = self.persistent.doc_mut();
        doc.network.interfaces = state.interfaces.clone();
        doc.network.current_interface = state
            .current
            .as_ref()
            .map(|i| i.address.clone())
            .unwrap_or_default();
        if state.changed {
            self.persistent.schedule_save();
        }

        self.push(ServerEvent::Interfaces {
            data: state.interfaces,
        });
        state.changed
    }

    fn apply_device_resolution(&mut self, resolution: DeviceResolution) {
        // Persist the selection keyed on identity, never on the volatile id:
        // an id-only churn must not dirty the document.
        let stored_identity = self
            .persistent
            .doc()
            .settings
            .audio_interface
            .as_ref()
            .map(|d| d.identity());
        let new_identity = resolution.selected.as_ref().map(|d| d.identity());
        if stored_identity != new_identity {
            self.persistent.doc_mut().settings.audio_interface = resolution.selected.clone();
            self.persistent.schedule_save();
        }

        if resolution.changed {
            if self.is_playing {
                self.supervisor
                    .send(WorkerKind::Playback, &PlaybackCommand::Stop);
            }
            self.push(ServerEvent::RefreshAfterDeviceChange);
        }

        self.push(ServerEvent::AudioDevices {
            data: resolution.devices,
        });
    }

    fn current_address(&self) -> String {
        self.interfaces
            .current()
            .map(|i| i.address.clone())
            .unwrap_or_default()
    }

    fn apply_save(&mut self, persistent: bool, key: &str, data: &str) -> bool {
        let payload: Value = match serde_json::from_str(data) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(%key, %err, "save rejected: invalid JSON payload");
                return false;
            }
        };
        let result = if persistent {
            self.persistent.apply_key(key, &payload)
        } else {
            self.user.apply_key(key, &payload)
        };
        match result {
            Ok(()) => {
                if persistent {
                    self.persistent.schedule_save();
                } else {
                    self.user.schedule_save();
                }
                true
            }
            Err(err) => {
                warn!(%key, %err, "save rejected");
                false
            }
        }
    }

    fn push(&self, event: ServerEvent) {
        if self.client_tx.send(event).is_err() {
            debug!("client channel closed, event dropped");
        }
    }
}

async fn sleep_until_or_forever(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

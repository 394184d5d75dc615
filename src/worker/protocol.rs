//! Orchestrator → worker command protocol
//!
//! Both workers speak NDJSON over stdin/stdout with the same
//! `{ "type": ..., "data": ... }` shape as the client protocol. The
//! orchestrator never interprets worker payloads beyond the discovery
//! worker's stream list.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::DeviceRef;

/// Commands understood by the stream-discovery worker.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum DiscoveryCommand {
    /// One-time session initialization with the interface address to listen
    /// on. Sent at most once per process lifetime.
    #[serde(rename = "init")]
    Init { data: String },
    /// Ask for a fresh stream-list announcement.
    #[serde(rename = "update")]
    Update,
    #[serde(rename = "add")]
    Add { data: Value },
    #[serde(rename = "delete")]
    Delete { data: Value },
    /// The selected interface changed.
    #[serde(rename = "interface")]
    Interface { data: String },
    /// Seconds after which a silent stream announcement is dropped.
    #[serde(rename = "deleteTimeout")]
    DeleteTimeout { data: u64 },
}

/// Commands understood by the audio-playback worker.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum PlaybackCommand {
    #[serde(rename = "start")]
    Start { data: Value },
    #[serde(rename = "stop")]
    Stop,
    #[serde(rename = "restart")]
    Restart { data: RestartArgs },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartArgs {
    pub network_interface: String,
    pub selected: Option<DeviceRef>,
}

#[derive(Deserialize)]
struct StreamEntry {
    #[serde(default)]
    manual: bool,
    #[serde(default)]
    raw: String,
}

/// Hash of the user-entered raw definitions in a discovery stream list.
///
/// Only manually-added streams contribute: auto-discovered entries churn on
/// every announcement tick and must not cause persistence writes. The hash
/// is compared in-process only, never persisted.
pub fn manual_streams_hash(streams: &Value) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    if let Value::Array(entries) = streams {
        for entry in entries {
            if let Ok(stream) = serde_json::from_value::<StreamEntry>(entry.clone()) {
                if stream.manual {
                    stream.raw.hash(&mut hasher);
                }
            }
        }
    }
    hasher.finish()
}

//! Client ↔ orchestrator message protocol
//!
//! Wire shape is `{ "type": ..., "data": ... }` (plus `key` on the save
//! family), with camelCase tags. This is the vocabulary the UI already
//! speaks; it is preserved verbatim.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{DeviceRef, InterfaceRef, PersistentConfig};
use crate::system::AudioDevice;

/// Messages from the UI client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Request a full-state resync.
    #[serde(rename = "update")]
    Update,
    /// Select an audio output device (null clears the request).
    #[serde(rename = "setAudioInterface")]
    SetAudioInterface { data: Option<DeviceRef> },
    /// Re-send the current selection to the playback worker.
    #[serde(rename = "restart")]
    Restart,
    /// Start playback; `data` carries the stream selection and channel
    /// mapping, forwarded to the playback worker with the current interface
    /// and device merged in.
    #[serde(rename = "play")]
    Play { data: Value },
    #[serde(rename = "stop")]
    Stop,
    /// Add a stream from a raw session description; forwarded verbatim to
    /// the discovery worker.
    #[serde(rename = "addStream")]
    AddStream { data: Value },
    /// Delete a stream by id; forwarded verbatim to the discovery worker.
    #[serde(rename = "delete")]
    Delete { data: Value },
    /// Select a network interface by address.
    #[serde(rename = "setNetwork")]
    SetNetwork { data: String },
    /// Overwrite one top-level field of the machine-wide document. `data` is
    /// a JSON-encoded value.
    #[serde(rename = "save")]
    Save { key: String, data: String },
    /// Overwrite the whole machine-wide document or one of its fields.
    #[serde(rename = "savePersistent")]
    SavePersistent { key: String, data: String },
    /// Overwrite the whole per-user document or one of its fields.
    #[serde(rename = "saveUser")]
    SaveUser { key: String, data: String },
    /// Persist the current window bounds.
    #[serde(rename = "saveWindow")]
    SaveWindow,
    /// Client-reported playback state; gates whether a device change forces
    /// a stop or only a passive notification.
    #[serde(rename = "playingStatus")]
    PlayingStatus { data: PlayingStatus },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayingStatus {
    pub is_playing: bool,
}

/// Events pushed to the UI client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "updatePersistentData")]
    UpdatePersistentData { data: PersistentConfig },
    /// Discovery worker's current stream list, forwarded verbatim.
    #[serde(rename = "streams")]
    Streams { data: Value },
    #[serde(rename = "audioDevices")]
    AudioDevices { data: Vec<AudioDevice> },
    #[serde(rename = "interfaces")]
    Interfaces { data: Vec<InterfaceRef> },
    /// The output device changed; re-issue playback for the active stream.
    #[serde(rename = "refreshAfterDeviceChange")]
    RefreshAfterDeviceChange,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tagged_parse_of_plain_messages() {
        let msg: ClientMessage = serde_json::from_value(json!({ "type": "update" })).unwrap();
        assert!(matches!(msg, ClientMessage::Update));

        let msg: ClientMessage =
            serde_json::from_value(json!({ "type": "setNetwork", "data": "192.168.1.50" }))
                .unwrap();
        match msg {
            ClientMessage::SetNetwork { data } => assert_eq!(data, "192.168.1.50"),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_save_carries_key_and_encoded_data() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "save",
            "key": "settings",
            "data": "{\"bufferSize\": 32}"
        }))
        .unwrap();
        match msg {
            ClientMessage::Save { key, data } => {
                assert_eq!(key, "settings");
                let inner: Value = serde_json::from_str(&data).unwrap();
                assert_eq!(inner["bufferSize"], 32);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_is_a_parse_error() {
        let result: Result<ClientMessage, _> =
            serde_json::from_value(json!({ "type": "launchMissiles" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_server_event_wire_tags() {
        let event = ServerEvent::RefreshAfterDeviceChange;
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "refreshAfterDeviceChange");

        let event = ServerEvent::Streams { data: json!([]) };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "streams");
        assert!(value["data"].is_array());
    }
}

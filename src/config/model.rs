//! Configuration document model
//!
//! Two independently persisted documents: [`PersistentConfig`] is machine-wide
//! (shared by every user of the host), [`UserConfig`] is per-user. Field names
//! on the wire stay camelCase to match the documents already on disk.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reference to an audio device.
///
/// The numeric `id` is assigned by the OS per session and is only valid as a
/// live handle; matching across enumerations always goes through
/// [`DeviceRef::identity`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRef {
    pub name: String,
    pub input_channels: u16,
    pub output_channels: u16,
    pub id: u32,
}

/// Durable equality key for an audio device, independent of the volatile id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    pub name: String,
    pub input_channels: u16,
    pub output_channels: u16,
}

impl DeviceRef {
    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity {
            name: self.name.clone(),
            input_channels: self.input_channels,
            output_channels: self.output_channels,
        }
    }
}

/// A usable (IPv4, non-loopback) network interface.
///
/// `is_current` is derived at enumeration time and carries no meaning on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceRef {
    pub name: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_current: bool,
}

/// `settings` section of the machine-wide document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistentSettings {
    pub buffer_size: u32,
    pub buffer_enabled: bool,
    pub hide_unsupported: bool,
    pub sdp_delete_timeout: u64,
    pub follow_system_audio: bool,
    pub audio_interface: Option<DeviceRef>,
    pub stored_audio_interface: Option<DeviceRef>,
}

impl Default for PersistentSettings {
    fn default() -> Self {
        Self {
            buffer_size: 16,
            buffer_enabled: true,
            hide_unsupported: true,
            sdp_delete_timeout: 300,
            follow_system_audio: true,
            audio_interface: None,
            stored_audio_interface: None,
        }
    }
}

/// `network` section of the machine-wide document.
///
/// Invariant: `current_interface` is either empty or equal to the address of
/// one of `interfaces`. The interface reconciler restores this each tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkConfig {
    pub interfaces: Vec<InterfaceRef>,
    pub current_interface: String,
}

/// Machine-wide configuration document (`config.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PersistentConfig {
    pub settings: PersistentSettings,
    pub network: NetworkConfig,
    pub devices: Vec<Value>,
    pub favorites: Vec<String>,
}

/// Last-known window bounds, restored at next launch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowState {
    pub width: u32,
    pub height: u32,
    pub x: Option<i32>,
    pub y: Option<i32>,
    pub maximized: bool,
}

impl Default for WindowState {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 800,
            x: None,
            y: None,
            maximized: true,
        }
    }
}

/// `settings` section of the per-user document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSettings {
    pub sidebar_collapsed: bool,
    pub window: WindowState,
    pub favorites_order: Vec<String>,
}

/// Per-user configuration document (`user.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UserConfig {
    pub settings: UserSettings,
}

/// Overlay a loaded JSON value onto a defaults value.
///
/// Merge rules, applied per top-level key of `defaults`:
/// - object onto object: merged key-by-key one level (loaded keys win,
///   missing keys keep their default); a non-object where an object is
///   expected keeps the default section,
/// - array fields: replaced wholesale only when the loaded value is itself
///   an array, otherwise the default array is retained,
/// - anything else: the loaded value wins.
///
/// Keys present on disk but absent from the defaults are dropped, so every
/// field of the typed document is guaranteed present after a load.
pub fn merge_into_defaults(defaults: Value, loaded: &Value) -> Value {
    let Value::Object(default_map) = defaults else {
        return defaults;
    };
    let Value::Object(loaded_map) = loaded else {
        return Value::Object(default_map);
    };

    let mut out = serde_json::Map::with_capacity(default_map.len());
    for (key, default_val) in default_map {
        let merged = match (loaded_map.get(&key), default_val) {
            (Some(Value::Object(l)), Value::Object(mut d)) => {
                for (k, v) in l {
                    d.insert(k.clone(), v.clone());
                }
                Value::Object(d)
            }
            (Some(l @ Value::Array(_)), Value::Array(_)) => l.clone(),
            (Some(_), d @ Value::Array(_)) => d,
            (Some(_), d @ Value::Object(_)) => d,
            (Some(l), _) => l.clone(),
            (None, d) => d,
        };
        out.insert(key, merged);
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_fill_missing_keys() {
        let loaded = json!({ "settings": { "bufferSize": 64 } });
        let defaults = serde_json::to_value(PersistentConfig::default()).unwrap();
        let merged = merge_into_defaults(defaults, &loaded);
        let config: PersistentConfig = serde_json::from_value(merged).unwrap();

        assert_eq!(config.settings.buffer_size, 64);
        assert!(config.settings.buffer_enabled);
        assert_eq!(config.settings.sdp_delete_timeout, 300);
        assert_eq!(config.network.current_interface, "");
        assert!(config.favorites.is_empty());
    }

    #[test]
    fn test_non_array_field_keeps_default_array() {
        let loaded = json!({ "favorites": "corrupt", "devices": [{"foo": 1}] });
        let defaults = serde_json::to_value(PersistentConfig::default()).unwrap();
        let merged = merge_into_defaults(defaults, &loaded);
        let config: PersistentConfig = serde_json::from_value(merged).unwrap();

        assert!(config.favorites.is_empty());
        assert_eq!(config.devices.len(), 1);
    }

    #[test]
    fn test_unknown_top_level_keys_dropped() {
        let loaded = json!({ "bogus": true, "settings": {} });
        let defaults = serde_json::to_value(PersistentConfig::default()).unwrap();
        let merged = merge_into_defaults(defaults, &loaded);

        assert!(merged.get("bogus").is_none());
        assert!(merged.get("settings").is_some());
    }

    #[test]
    fn test_device_identity_ignores_id() {
        let a = DeviceRef {
            name: "Speakers".into(),
            input_channels: 0,
            output_channels: 2,
            id: 3,
        };
        let b = DeviceRef {
            name: "Speakers".into(),
            input_channels: 0,
            output_channels: 2,
            id: 7,
        };
        assert_eq!(a.identity(), b.identity());
        assert_ne!(a, b);
    }

    #[test]
    fn test_wire_names_are_camel_case() {
        let settings = PersistentSettings::default();
        let value = serde_json::to_value(&settings).unwrap();
        assert!(value.get("sdpDeleteTimeout").is_some());
        assert!(value.get("followSystemAudio").is_some());
        assert!(value.get("storedAudioInterface").is_some());
    }
}

//! Audio device enumeration and reconciliation
//!
//! Devices are matched across enumerations by their identity triple (name,
//! input channels, output channels). The numeric id the OS hands out changes
//! between sessions and even between enumerations, so it is never used for
//! equality, only as a live-session handle.

use cpal::traits::{DeviceTrait, HostTrait};
use serde::Serialize;
use tracing::debug;

use crate::config::{DeviceIdentity, DeviceRef, PersistentSettings};

/// A live audio device as seen by the current enumeration pass.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AudioDevice {
    pub name: String,
    pub input_channels: u16,
    pub output_channels: u16,
    pub id: u32,
    pub is_default_output: bool,
    /// Whether this is the orchestrator's current selection. Filled in just
    /// before the list is pushed to the client.
    pub is_current: bool,
}

impl AudioDevice {
    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity {
            name: self.name.clone(),
            input_channels: self.input_channels,
            output_channels: self.output_channels,
        }
    }

    pub fn to_ref(&self) -> DeviceRef {
        DeviceRef {
            name: self.name.clone(),
            input_channels: self.input_channels,
            output_channels: self.output_channels,
            id: self.id,
        }
    }
}

/// Source of live device enumerations. Swappable so reconciler tests can
/// replay device sets with churned ids.
pub trait DeviceEnumerator: Send {
    fn devices(&self) -> Vec<AudioDevice>;
}

/// Real enumerator backed by the platform's default cpal host.
pub struct CpalEnumerator;

impl DeviceEnumerator for CpalEnumerator {
    fn devices(&self) -> Vec<AudioDevice> {
        let host = cpal::default_host();
        let default_output_name = host.default_output_device().and_then(|d| d.name().ok());

        let mut devices = Vec::new();
        let Ok(iter) = host.devices() else {
            return devices;
        };
        for (index, device) in iter.enumerate() {
            let name = device
                .name()
                .unwrap_or_else(|_| "Unknown".to_string());
            let input_channels = max_channels(device.supported_input_configs().ok());
            let output_channels = max_channels(device.supported_output_configs().ok());
            if input_channels == 0 && output_channels == 0 {
                continue;
            }
            let is_default_output = default_output_name.as_deref() == Some(name.as_str());
            devices.push(AudioDevice {
                name,
                input_channels,
                output_channels,
                id: index as u32,
                is_default_output,
                is_current: false,
            });
        }
        devices
    }
}

fn max_channels<I>(configs: Option<I>) -> u16
where
    I: Iterator<Item = cpal::SupportedStreamConfigRange>,
{
    configs
        .map(|iter| iter.map(|c| c.channels()).max().unwrap_or(0))
        .unwrap_or(0)
}

/// Outcome of one resolution pass.
#[derive(Debug)]
pub struct DeviceResolution {
    /// Live enumeration, with `is_current` flagged on the selection.
    pub devices: Vec<AudioDevice>,
    /// The resolved output device, if any candidate exists.
    pub selected: Option<DeviceRef>,
    /// The selection's identity differs from the previous pass; downstream
    /// playback must restart on the new device.
    pub changed: bool,
}

/// Resolves "the current audio output device" from policy, live enumeration,
/// and the previous selection.
pub struct DeviceReconciler {
    enumerator: Box<dyn DeviceEnumerator>,
    current: Option<DeviceRef>,
    previous_identity: Option<DeviceIdentity>,
}

impl DeviceReconciler {
    pub fn new(enumerator: Box<dyn DeviceEnumerator>) -> Self {
        Self {
            enumerator,
            current: None,
            previous_identity: None,
        }
    }

    pub fn current(&self) -> Option<&DeviceRef> {
        self.current.as_ref()
    }

    /// Resolve the current device. First match wins:
    /// 1. stored preference, when not following system audio;
    /// 2. the requested device, when not following system audio;
    /// 3. the OS default output.
    ///
    /// `changed` is keyed on the identity triple, so a refresh against an
    /// unchanged hardware set never reports a change regardless of id churn.
    pub fn resolve(
        &mut self,
        requested: Option<&DeviceRef>,
        policy: &PersistentSettings,
    ) -> DeviceResolution {
        let mut devices = self.enumerator.devices();

        let mut selected: Option<&AudioDevice> = None;
        if !policy.follow_system_audio {
            if let Some(stored) = &policy.stored_audio_interface {
                selected = find_by_identity(&devices, &stored.identity());
            }
            if selected.is_none() {
                if let Some(requested) = requested {
                    selected = find_by_identity(&devices, &requested.identity());
                }
            }
        }
        if selected.is_none() {
            selected = devices.iter().find(|d| d.is_default_output);
        }

        let selected = selected.map(AudioDevice::to_ref);
        let identity = selected.as_ref().map(DeviceRef::identity);
        let changed = self.previous_identity.is_some() && identity != self.previous_identity;
        if changed {
            debug!(
                from = ?self.previous_identity,
                to = ?identity,
                "audio device selection changed"
            );
        }
        self.previous_identity = identity;
        self.current = selected.clone();

        if let Some(current) = &self.current {
            let current_identity = current.identity();
            for device in &mut devices {
                device.is_current = device.identity() == current_identity;
            }
        }

        DeviceResolution {
            devices,
            selected,
            changed,
        }
    }

    /// Re-run resolution with the current selection as the request. Safe to
    /// call every tick.
    pub fn refresh(&mut self, policy: &PersistentSettings) -> DeviceResolution {
        let current = self.current.clone();
        self.resolve(current.as_ref(), policy)
    }

    /// Startup restore: prefer the persisted selection when it still exists,
    /// else the default output, then resolve normally.
    pub fn restore(
        &mut self,
        persisted: Option<&DeviceRef>,
        policy: &PersistentSettings,
    ) -> DeviceResolution {
        let devices = self.enumerator.devices();
        let saved = persisted
            .and_then(|p| find_by_identity(&devices, &p.identity()))
            .or_else(|| devices.iter().find(|d| d.is_default_output))
            .map(AudioDevice::to_ref);
        self.resolve(saved.as_ref(), policy)
    }
}

fn find_by_identity<'a>(
    devices: &'a [AudioDevice],
    identity: &DeviceIdentity,
) -> Option<&'a AudioDevice> {
    devices.iter().find(|d| &d.identity() == identity)
}

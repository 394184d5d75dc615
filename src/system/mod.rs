//! Live system state: audio devices and network interfaces

pub mod audio;
pub mod network;

pub use audio::{AudioDevice, CpalEnumerator, DeviceEnumerator, DeviceReconciler};
pub use network::{IfAddrsEnumerator, InterfaceEnumerator, InterfaceReconciler};

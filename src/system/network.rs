//! Network interface enumeration and reconciliation
//!
//! The reconciler keeps a deterministic signature of the live interface list
//! plus the selection. Downstream work (persistence, discovery-worker
//! notification) runs only when that signature moves, so a poll on an
//! unchanged host is free.

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::InterfaceRef;

/// Source of live interface enumerations (IPv4, non-loopback only).
pub trait InterfaceEnumerator: Send {
    fn interfaces(&self) -> Vec<InterfaceRef>;
}

/// Real enumerator backed by the host's interface table.
pub struct IfAddrsEnumerator;

impl InterfaceEnumerator for IfAddrsEnumerator {
    fn interfaces(&self) -> Vec<InterfaceRef> {
        match if_addrs::get_if_addrs() {
            Ok(addrs) => addrs
                .into_iter()
                .filter(|iface| iface.ip().is_ipv4() && !iface.is_loopback())
                .map(|iface| InterfaceRef {
                    address: iface.ip().to_string(),
                    name: iface.name,
                    is_current: false,
                })
                .collect(),
            Err(err) => {
                warn!(%err, "interface enumeration failed");
                Vec::new()
            }
        }
    }
}

/// Result of one reconciliation pass.
#[derive(Debug)]
pub struct InterfaceState {
    /// Live interfaces, with `is_current` flagged on the selection.
    pub interfaces: Vec<InterfaceRef>,
    /// The selected interface, if the host has any usable one.
    pub current: Option<InterfaceRef>,
    /// The list or the selection differs from the previous pass.
    pub changed: bool,
}

/// Resolves "the current network interface" from live enumeration and the
/// persisted preference.
pub struct InterfaceReconciler {
    enumerator: Box<dyn InterfaceEnumerator>,
    last_signature: Option<String>,
    current: Option<InterfaceRef>,
}

#[derive(Serialize)]
struct Signature<'a> {
    interfaces: &'a [InterfaceRef],
    current: &'a str,
}

impl InterfaceReconciler {
    pub fn new(enumerator: Box<dyn InterfaceEnumerator>) -> Self {
        Self {
            enumerator,
            last_signature: None,
            current: None,
        }
    }

    pub fn current(&self) -> Option<&InterfaceRef> {
        self.current.as_ref()
    }

    /// A fresh enumeration, without touching the reconciliation state. Used
    /// to validate client-requested addresses.
    pub fn enumerate(&self) -> Vec<InterfaceRef> {
        self.enumerator.interfaces()
    }

    /// Keep the preferred address when it is live, else fall back to the
    /// first enumerated interface, else none.
    pub fn resolve(&mut self, preference: &str) -> InterfaceState {
        let mut interfaces = self.enumerator.interfaces();

        let selected_address = if !preference.is_empty()
            && interfaces.iter().any(|i| i.address == preference)
        {
            Some(preference.to_string())
        } else {
            interfaces.first().map(|i| i.address.clone())
        };

        let mut current = None;
        for iface in &mut interfaces {
            iface.is_current = Some(&iface.address) == selected_address.as_ref();
            if iface.is_current {
                current = Some(iface.clone());
            }
        }

        let signature = serde_json::to_string(&Signature {
            interfaces: &interfaces,
            current: selected_address.as_deref().unwrap_or(""),
        })
        .unwrap_or_default();
        let changed = self.last_signature.as_ref() != Some(&signature);
        if changed {
            debug!(current = ?selected_address, count = interfaces.len(), "interface state changed");
            self.last_signature = Some(signature);
        }
        self.current = current.clone();

        InterfaceState {
            interfaces,
            current,
            changed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn iface(name: &str, address: &str) -> InterfaceRef {
        InterfaceRef {
            name: name.to_string(),
            address: address.to_string(),
            is_current: false,
        }
    }

    fn shared(
        interfaces: Vec<InterfaceRef>,
    ) -> (Arc<Mutex<Vec<InterfaceRef>>>, Box<dyn InterfaceEnumerator>) {
        let shared = Arc::new(Mutex::new(interfaces));
        struct SharedEnumerator(Arc<Mutex<Vec<InterfaceRef>>>);
        impl InterfaceEnumerator for SharedEnumerator {
            fn interfaces(&self) -> Vec<InterfaceRef> {
                self.0.lock().unwrap().clone()
            }
        }
        (shared.clone(), Box::new(SharedEnumerator(shared)))
    }

    #[test]
    fn test_preference_kept_when_live() {
        let (_, enumerator) = shared(vec![
            iface("eth0", "192.168.1.10"),
            iface("wlan0", "192.168.1.50"),
        ]);
        let mut reconciler = InterfaceReconciler::new(enumerator);
        let state = reconciler.resolve("192.168.1.50");
        assert_eq!(state.current.unwrap().address, "192.168.1.50");
    }

    #[test]
    fn test_stale_preference_falls_back_to_first() {
        let (_, enumerator) = shared(vec![iface("eth0", "192.168.1.10")]);
        let mut reconciler = InterfaceReconciler::new(enumerator);
        let state = reconciler.resolve("10.0.0.1");
        let current = state.current.unwrap();
        assert_eq!(current.address, "192.168.1.10");
        assert!(current.is_current);
    }

    #[test]
    fn test_no_interfaces_resolves_to_none() {
        let (_, enumerator) = shared(vec![]);
        let mut reconciler = InterfaceReconciler::new(enumerator);
        let state = reconciler.resolve("");
        assert!(state.current.is_none());
        assert!(state.interfaces.is_empty());
    }

    #[test]
    fn test_unchanged_state_reports_no_change() {
        let (_, enumerator) = shared(vec![iface("eth0", "192.168.1.10")]);
        let mut reconciler = InterfaceReconciler::new(enumerator);
        assert!(reconciler.resolve("192.168.1.10").changed);
        assert!(!reconciler.resolve("192.168.1.10").changed);
        assert!(!reconciler.resolve("192.168.1.10").changed);
    }

    #[test]
    fn test_new_interface_reports_change() {
        let (interfaces, enumerator) = shared(vec![iface("eth0", "192.168.1.10")]);
        let mut reconciler = InterfaceReconciler::new(enumerator);
        reconciler.resolve("");

        interfaces
            .lock()
            .unwrap()
            .push(iface("wlan0", "192.168.1.50"));
        let state = reconciler.resolve("");
        assert!(state.changed);
        // Selection sticks to the first interface.
        assert_eq!(state.current.unwrap().address, "192.168.1.10");
    }

    #[test]
    fn test_preference_switch_reports_change() {
        let (_, enumerator) = shared(vec![
            iface("eth0", "192.168.1.10"),
            iface("wlan0", "192.168.1.50"),
        ]);
        let mut reconciler = InterfaceReconciler::new(enumerator);
        reconciler.resolve("192.168.1.10");
        let state = reconciler.resolve("192.168.1.50");
        assert!(state.changed);
        assert_eq!(state.current.unwrap().address, "192.168.1.50");
    }
}

// ── Device/port state cache ──
//
// One mutex guards the whole device map, so every read sees a
// consistent device + port tree. The mutex is never held across an
// `.await`. Command sequences additionally hold the async port gate so
// a port refresh cannot land between their steps.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::watch;

use crate::model::{Device, Port};

/// A device together with its ports.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceEntry {
    pub device: Device,
    pub ports: BTreeMap<u32, Port>,
}

/// Key and MAC of a cached switch, as needed to poll its ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchRef {
    pub key: String,
    pub mac: Option<String>,
    pub poe_capable: bool,
}

/// Held while a command sequence mutates a port.
pub type PortGate<'a> = tokio::sync::MutexGuard<'a, ()>;

/// In-memory map of normalized device key to device and port state.
///
/// Shared as `Arc<StateCache>` between the poller and the executor;
/// callers only ever receive owned copies of the data.
#[derive(Debug)]
pub struct StateCache {
    entries: Mutex<BTreeMap<String, DeviceEntry>>,
    port_gate: tokio::sync::Mutex<()>,
    /// Bumped on every mutation.
    version: watch::Sender<u64>,
}

impl Default for StateCache {
    fn default() -> Self {
        Self::new()
    }
}

impl StateCache {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        Self {
            entries: Mutex::new(BTreeMap::new()),
            port_gate: tokio::sync::Mutex::new(()),
            version,
        }
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Insert or replace a device record, keeping its existing ports.
    pub fn replace_device(&self, device: Device) {
        {
            let mut entries = self.lock();
            match entries.get_mut(&device.key) {
                Some(entry) => entry.device = device,
                None => {
                    entries.insert(
                        device.key.clone(),
                        DeviceEntry {
                            device,
                            ports: BTreeMap::new(),
                        },
                    );
                }
            }
        }
        self.bump_version();
    }

    /// Replace every port of one device. Returns `false` (and changes
    /// nothing) if the device is not cached.
    pub fn replace_ports(&self, key: &str, ports: impl IntoIterator<Item = Port>) -> bool {
        let replaced = {
            let mut entries = self.lock();
            match entries.get_mut(key) {
                Some(entry) => {
                    entry.ports = ports.into_iter().map(|p| (p.number, p)).collect();
                    true
                }
                None => false,
            }
        };
        if replaced {
            self.bump_version();
        }
        replaced
    }

    /// Read-modify-write one port under the cache lock.
    ///
    /// Returns `None` if the device or port is not cached.
    pub fn update_port<R>(
        &self,
        key: &str,
        number: u32,
        f: impl FnOnce(&mut Port) -> R,
    ) -> Option<R> {
        let result = {
            let mut entries = self.lock();
            entries
                .get_mut(key)
                .and_then(|entry| entry.ports.get_mut(&number))
                .map(f)
        };
        if result.is_some() {
            self.bump_version();
        }
        result
    }

    /// Drop every device whose key is not in `keep`. Returns the removed keys.
    pub fn retain_devices(&self, keep: &HashSet<String>) -> Vec<String> {
        let mut removed = Vec::new();
        {
            let mut entries = self.lock();
            entries.retain(|key, _| {
                let kept = keep.contains(key);
                if !kept {
                    removed.push(key.clone());
                }
                kept
            });
        }
        if !removed.is_empty() {
            self.bump_version();
        }
        removed
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Owned snapshot of every device and its ports, ordered by key.
    pub fn get_all(&self) -> Vec<DeviceEntry> {
        self.lock().values().cloned().collect()
    }

    pub fn device(&self, key: &str) -> Option<Device> {
        self.lock().get(key).map(|entry| entry.device.clone())
    }

    pub fn port(&self, key: &str, number: u32) -> Option<Port> {
        self.lock()
            .get(key)
            .and_then(|entry| entry.ports.get(&number))
            .cloned()
    }

    /// Every cached switch, ordered by key.
    pub fn switches(&self) -> Vec<SwitchRef> {
        self.lock()
            .values()
            .filter(|entry| entry.device.is_switch())
            .map(|entry| SwitchRef {
                key: entry.device.key.clone(),
                mac: entry.device.mac.clone(),
                poe_capable: entry.device.is_poe_capable(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // ── Coordination ─────────────────────────────────────────────────

    /// Wait for exclusive use of port state across `.await` points.
    pub async fn port_gate(&self) -> PortGate<'_> {
        self.port_gate.lock().await
    }

    /// Watch the mutation counter.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, DeviceEntry>> {
        // Mutations are single inserts/assigns; a poisoned map is still consistent.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump_version(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;

    use pretty_assertions::assert_eq;

    use super::{StateCache, SwitchRef};
    use crate::model::{Device, DeviceType, PoeState, Port};

    fn device(key: &str, device_type: DeviceType, mac: Option<&str>) -> Device {
        Device {
            key: key.into(),
            name: key.into(),
            device_type,
            serial: None,
            mac: mac.map(Into::into),
            ip: None,
            model: None,
            firmware_version: None,
            uptime: None,
            cpu_util: None,
            mem_util: None,
            last_seen: None,
            status: Some(1),
            raw: serde_json::json!({ "name": key }),
        }
    }

    fn port(number: u32, poe_state: PoeState) -> Port {
        Port {
            number,
            name: Some(format!("Port{number}")),
            poe_capable: true,
            profile_name: Some("All".into()),
            profile_override_enable: false,
            poe_state,
        }
    }

    #[test]
    fn replace_device_keeps_ports() {
        let cache = StateCache::new();
        cache.replace_device(device("sw", DeviceType::Switch, Some("AA")));
        assert!(cache.replace_ports("sw", [port(1, PoeState::On)]));

        let mut updated = device("sw", DeviceType::Switch, Some("AA"));
        updated.ip = Some("10.0.0.5".into());
        cache.replace_device(updated);

        assert_eq!(cache.device("sw").unwrap().ip.as_deref(), Some("10.0.0.5"));
        assert_eq!(cache.port("sw", 1).unwrap().poe_state, PoeState::On);
    }

    #[test]
    fn replace_ports_keeps_device_and_replaces_wholesale() {
        let cache = StateCache::new();
        cache.replace_device(device("sw", DeviceType::Switch, Some("AA")));
        cache.replace_ports("sw", [port(1, PoeState::On), port(2, PoeState::Off)]);
        cache.replace_ports("sw", [port(3, PoeState::Off)]);

        let all = cache.get_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].device.mac.as_deref(), Some("AA"));
        assert_eq!(all[0].ports.keys().copied().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn replace_ports_for_unknown_device_is_noop() {
        let cache = StateCache::new();
        assert!(!cache.replace_ports("ghost", [port(1, PoeState::On)]));
        assert!(cache.is_empty());
    }

    #[test]
    fn update_port_is_scoped_to_existing_ports() {
        let cache = StateCache::new();
        cache.replace_device(device("sw", DeviceType::Switch, Some("AA")));
        cache.replace_ports("sw", [port(1, PoeState::Off)]);

        let result = cache.update_port("sw", 1, |p| {
            p.poe_state = PoeState::On;
            p.number
        });
        assert_eq!(result, Some(1));
        assert_eq!(cache.port("sw", 1).unwrap().poe_state, PoeState::On);

        assert!(cache.update_port("sw", 9, |_| ()).is_none());
        assert!(cache.update_port("ghost", 1, |_| ()).is_none());
    }

    #[test]
    fn switches_lists_only_switch_devices() {
        let cache = StateCache::new();
        cache.replace_device(device("sw_poe", DeviceType::Switch, None));
        cache.replace_device(device("ap", DeviceType::Ap, Some("BB")));
        cache.replace_device(device("sw_a", DeviceType::Switch, Some("AA")));

        assert_eq!(
            cache.switches(),
            vec![
                SwitchRef {
                    key: "sw_a".into(),
                    mac: Some("AA".into()),
                    poe_capable: false,
                },
                SwitchRef {
                    key: "sw_poe".into(),
                    mac: None,
                    poe_capable: true,
                },
            ]
        );
    }

    #[test]
    fn retain_devices_prunes_missing_keys() {
        let cache = StateCache::new();
        cache.replace_device(device("keep", DeviceType::Ap, None));
        cache.replace_device(device("gone", DeviceType::Gateway, None));

        let keep: HashSet<String> = ["keep".to_string()].into_iter().collect();
        assert_eq!(cache.retain_devices(&keep), vec!["gone".to_string()]);
        assert_eq!(cache.len(), 1);
        assert!(cache.device("gone").is_none());
    }

    #[test]
    fn mutations_bump_version() {
        let cache = StateCache::new();
        let rx = cache.subscribe();
        cache.replace_device(device("sw", DeviceType::Switch, None));
        cache.replace_ports("ghost", Vec::<Port>::new());
        assert_eq!(*rx.borrow(), 1);
    }
}

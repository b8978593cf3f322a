//! Correlation of peers with the menu entries created for them.
//!
//! Both registries are owned by the reconciler and only touched from inside a
//! reconciliation cycle.

use std::collections::HashMap;

use log::info;
use tokio::sync::watch;

use crate::tray::MenuItem;

/// A device entry and the state its listener reads.
#[derive(Debug)]
pub struct DeviceEntry {
    item: MenuItem,
    last_seen: u64,
    address: watch::Sender<String>,
}

/// Device entries keyed by display key.
///
/// Entries not seen during a pass are evicted at the end of it.  Removing an
/// entry removes its menu item, which closes the item's activation channel
/// and ends its listener.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    entries: HashMap<String, DeviceEntry>,
    generation: u64,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new pass and return its generation.
    pub fn begin_pass(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Mark `key` as seen in the current pass.  Returns false if the key is
    /// not registered.
    pub fn touch(&mut self, key: &str, address: &str) -> bool {
        let Some(entry) = self.entries.get_mut(key) else {
            return false;
        };
        entry.last_seen = self.generation;
        entry.address.send_if_modified(|current| {
            if current == address {
                false
            } else {
                *current = address.to_string();
                true
            }
        });
        true
    }

    /// Register a freshly created entry as seen in the current pass.  Returns
    /// the receiver its listener reads the address from.
    pub fn insert(&mut self, key: &str, item: MenuItem, address: &str) -> watch::Receiver<String> {
        let (tx, rx) = watch::channel(address.to_string());
        self.entries.insert(
            key.to_string(),
            DeviceEntry {
                item,
                last_seen: self.generation,
                address: tx,
            },
        );
        rx
    }

    /// Hide and drop every entry not seen in the current pass.
    pub fn evict_stale(&mut self) -> Vec<String> {
        let generation = self.generation;
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.last_seen != generation)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &stale {
            if let Some(entry) = self.entries.remove(key) {
                info!("Device {} left the network", key);
                entry.item.hide();
                entry.item.remove();
            }
        }
        stale
    }

    #[cfg(test)]
    pub fn item(&self, key: &str) -> Option<&MenuItem> {
        self.entries.get(key).map(|e| &e.item)
    }

    #[cfg(test)]
    pub fn address(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|e| e.address.borrow().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Exit-node entries keyed by display key.  Never evicted, only hidden.
#[derive(Debug, Default)]
pub struct ExitNodeRegistry {
    entries: HashMap<String, MenuItem>,
}

impl ExitNodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&MenuItem> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: &str, item: MenuItem) {
        self.entries.insert(key.to_string(), item);
    }

    /// Hide every entry whose key is not in `present`.
    pub fn hide_absent(&self, present: impl Fn(&str) -> bool) {
        for (key, item) in &self.entries {
            if !present(key) {
                item.hide();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

//! Learning table storage.

use dashmap::DashMap;
use sdn_types::{MacAddress, PortNumber, SwitchId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// What a call to [`AddressLearningStore::learn`] changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearnOutcome {
    /// First sighting of this MAC on this switch.
    New,
    /// MAC already known on the same port.
    Refreshed,
    /// MAC moved from another port.
    Moved { from: PortNumber },
}

#[derive(Debug, Default)]
pub struct FdbStats {
    pub entries_added: AtomicU64,
    pub entries_moved: AtomicU64,
    pub lookups: AtomicU64,
    pub lookup_misses: AtomicU64,
}

/// Learning table keyed by switch, then by MAC.
///
/// Switches are independent shards so learning on one switch never contends
/// with another. For a fixed switch a MAC maps to at most one port.
#[derive(Debug, Default)]
pub struct AddressLearningStore {
    tables: DashMap<SwitchId, HashMap<MacAddress, PortNumber>>,
    stats: FdbStats,
}

impl AddressLearningStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `mac` was last seen on `port` of `switch`, overwriting
    /// any previous port.
    pub fn learn(&self, switch: SwitchId, mac: MacAddress, port: PortNumber) -> LearnOutcome {
        let previous = self.tables.entry(switch).or_default().insert(mac, port);
        match previous {
            None => {
                self.stats.entries_added.fetch_add(1, Ordering::Relaxed);
                debug!(%switch, %mac, %port, "Learned address");
                LearnOutcome::New
            }
            Some(p) if p == port => LearnOutcome::Refreshed,
            Some(from) => {
                self.stats.entries_moved.fetch_add(1, Ordering::Relaxed);
                debug!(%switch, %mac, %from, to = %port, "Address moved");
                LearnOutcome::Moved { from }
            }
        }
    }

    pub fn lookup(&self, switch: SwitchId, mac: MacAddress) -> Option<PortNumber> {
        self.stats.lookups.fetch_add(1, Ordering::Relaxed);
        let port = self
            .tables
            .get(&switch)
            .and_then(|table| table.get(&mac).copied());
        if port.is_none() {
            self.stats.lookup_misses.fetch_add(1, Ordering::Relaxed);
        }
        port
    }

    /// Number of addresses known on `switch`.
    pub fn len(&self, switch: SwitchId) -> usize {
        self.tables.get(&switch).map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.iter().all(|t| t.is_empty())
    }

    /// Entries learned on `switch`, ordered by MAC.
    pub fn entries(&self, switch: SwitchId) -> Vec<(MacAddress, PortNumber)> {
        let mut entries: Vec<_> = self
            .tables
            .get(&switch)
            .map(|t| t.iter().map(|(m, p)| (*m, *p)).collect())
            .unwrap_or_default();
        entries.sort();
        entries
    }

    pub fn stats(&self) -> &FdbStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SW1: SwitchId = SwitchId::new(1);
    const SW2: SwitchId = SwitchId::new(2);

    fn mac(last: u8) -> MacAddress {
        MacAddress::new([0, 0, 0, 0, 0, last])
    }

    #[test]
    fn test_lookup_unseen_returns_none() {
        let store = AddressLearningStore::new();
        assert_eq!(store.lookup(SW1, mac(1)), None);
        assert_eq!(store.stats().lookup_misses.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_learn_then_lookup() {
        let store = AddressLearningStore::new();
        assert_eq!(store.learn(SW1, mac(1), PortNumber::new(1)), LearnOutcome::New);
        assert_eq!(store.lookup(SW1, mac(1)), Some(PortNumber::new(1)));
    }

    #[test]
    fn test_last_seen_wins() {
        let store = AddressLearningStore::new();
        store.learn(SW1, mac(1), PortNumber::new(1));
        assert_eq!(
            store.learn(SW1, mac(1), PortNumber::new(1)),
            LearnOutcome::Refreshed
        );
        assert_eq!(
            store.learn(SW1, mac(1), PortNumber::new(3)),
            LearnOutcome::Moved {
                from: PortNumber::new(1)
            }
        );
        assert_eq!(store.lookup(SW1, mac(1)), Some(PortNumber::new(3)));
        assert_eq!(store.len(SW1), 1);
    }

    #[test]
    fn test_switches_are_independent() {
        let store = AddressLearningStore::new();
        store.learn(SW1, mac(1), PortNumber::new(1));
        store.learn(SW2, mac(1), PortNumber::new(7));

        assert_eq!(store.lookup(SW1, mac(1)), Some(PortNumber::new(1)));
        assert_eq!(store.lookup(SW2, mac(1)), Some(PortNumber::new(7)));
        assert_eq!(store.lookup(SW2, mac(2)), None);
    }

    #[test]
    fn test_entries_sorted() {
        let store = AddressLearningStore::new();
        assert!(store.is_empty());
        store.learn(SW1, mac(3), PortNumber::new(3));
        store.learn(SW1, mac(1), PortNumber::new(1));
        assert_eq!(
            store.entries(SW1),
            vec![(mac(1), PortNumber::new(1)), (mac(3), PortNumber::new(3))]
        );
        assert!(!store.is_empty());
    }
}

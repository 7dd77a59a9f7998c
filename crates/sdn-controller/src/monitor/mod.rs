//! Per-source packet monitor.
//!
//! Counts packet-ins from a configured set of watched source MACs, per
//! switch. Learned forwarding rules for watched sources also copy traffic to
//! the controller so counting continues after the rule is in place.

use dashmap::DashMap;
use sdn_types::{MacAddress, SwitchId};
use std::collections::HashSet;
use tracing::trace;

#[derive(Debug, Default)]
pub struct PacketMonitor {
    watched: HashSet<MacAddress>,
    counters: DashMap<(SwitchId, MacAddress), u64>,
}

impl PacketMonitor {
    pub fn new(watched: impl IntoIterator<Item = MacAddress>) -> Self {
        Self {
            watched: watched.into_iter().collect(),
            counters: DashMap::new(),
        }
    }

    pub fn is_watched(&self, src: MacAddress) -> bool {
        self.watched.contains(&src)
    }

    /// Counts one packet if `src` is watched; returns the new count.
    pub fn observe(&self, switch: SwitchId, src: MacAddress) -> Option<u64> {
        if !self.is_watched(src) {
            return None;
        }
        let mut count = self.counters.entry((switch, src)).or_insert(0);
        *count += 1;
        trace!(%switch, %src, count = *count, "Monitored packet");
        Some(*count)
    }

    pub fn count(&self, switch: SwitchId, src: MacAddress) -> u64 {
        self.counters.get(&(switch, src)).map(|c| *c).unwrap_or(0)
    }

    /// Packets seen from `src` across all switches.
    pub fn total(&self, src: MacAddress) -> u64 {
        self.counters
            .iter()
            .filter(|e| e.key().1 == src)
            .map(|e| *e.value())
            .sum()
    }

    /// All non-zero counters ordered by (switch, source).
    pub fn snapshot(&self) -> Vec<(SwitchId, MacAddress, u64)> {
        let mut rows: Vec<_> = self
            .counters
            .iter()
            .map(|e| (e.key().0, e.key().1, *e.value()))
            .collect();
        rows.sort();
        rows
    }

    pub fn watched_count(&self) -> usize {
        self.watched.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn mac(last: u8) -> MacAddress {
        MacAddress::new([0, 0, 0, 0, 0, last])
    }

    #[test]
    fn test_only_watched_sources_counted() {
        let monitor = PacketMonitor::new([mac(3)]);
        let sw = SwitchId::new(1);

        assert_eq!(monitor.observe(sw, mac(1)), None);
        assert_eq!(monitor.observe(sw, mac(3)), Some(1));
        assert_eq!(monitor.observe(sw, mac(3)), Some(2));
        assert_eq!(monitor.count(sw, mac(3)), 2);
        assert_eq!(monitor.count(sw, mac(1)), 0);
    }

    #[test]
    fn test_counters_are_per_switch() {
        let monitor = PacketMonitor::new([mac(3)]);
        monitor.observe(SwitchId::new(1), mac(3));
        monitor.observe(SwitchId::new(2), mac(3));
        monitor.observe(SwitchId::new(2), mac(3));

        assert_eq!(monitor.total(mac(3)), 3);
        assert_eq!(
            monitor.snapshot(),
            vec![(SwitchId::new(1), mac(3), 1), (SwitchId::new(2), mac(3), 2)]
        );
    }
}

//! Blocked-pair set.

use sdn_types::MacAddress;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// A (source, destination) pair that must never be forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FirewallRule {
    pub src: MacAddress,
    pub dst: MacAddress,
}

impl FirewallRule {
    pub fn new(src: MacAddress, dst: MacAddress) -> Self {
        Self { src, dst }
    }

    pub fn reversed(&self) -> Self {
        Self {
            src: self.dst,
            dst: self.src,
        }
    }
}

impl fmt::Display for FirewallRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.src, self.dst)
    }
}

/// Set of blocked pairs keyed on the ordered pair.
///
/// Directional by default: blocking (a, b) leaves (b, a) open. When built
/// symmetric every configured pair is also blocked in reverse.
#[derive(Debug, Default)]
pub struct FirewallTable {
    blocked: HashSet<FirewallRule>,
    symmetric: bool,
    hits: AtomicU64,
}

impl FirewallTable {
    pub fn new(rules: impl IntoIterator<Item = FirewallRule>, symmetric: bool) -> Self {
        let mut blocked = HashSet::new();
        for rule in rules {
            blocked.insert(rule);
            if symmetric {
                blocked.insert(rule.reversed());
            }
        }
        Self {
            blocked,
            symmetric,
            hits: AtomicU64::new(0),
        }
    }

    pub fn is_blocked(&self, src: MacAddress, dst: MacAddress) -> bool {
        let blocked = self.blocked.contains(&FirewallRule { src, dst });
        if blocked {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        blocked
    }

    /// Every directional pair enforced by this table, in a stable order.
    pub fn rules(&self) -> Vec<FirewallRule> {
        let mut rules: Vec<_> = self.blocked.iter().copied().collect();
        rules.sort();
        rules
    }

    pub fn is_symmetric(&self) -> bool {
        self.symmetric
    }

    pub fn len(&self) -> usize {
        self.blocked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocked.is_empty()
    }

    /// Number of `is_blocked` calls that matched.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
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
    fn test_directional_by_default() {
        let table = FirewallTable::new([FirewallRule::new(mac(2), mac(3))], false);

        assert!(table.is_blocked(mac(2), mac(3)));
        assert!(!table.is_blocked(mac(3), mac(2)));
        assert!(!table.is_blocked(mac(1), mac(3)));
        assert_eq!(table.hits(), 1);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_symmetric_blocks_both_directions() {
        let table = FirewallTable::new([FirewallRule::new(mac(2), mac(3))], true);

        assert!(table.is_symmetric());
        assert!(table.is_blocked(mac(2), mac(3)));
        assert!(table.is_blocked(mac(3), mac(2)));
        assert_eq!(
            table.rules(),
            vec![
                FirewallRule::new(mac(2), mac(3)),
                FirewallRule::new(mac(3), mac(2))
            ]
        );
    }

    #[test]
    fn test_duplicate_rules_collapse() {
        let table = FirewallTable::new(
            [
                FirewallRule::new(mac(1), mac(4)),
                FirewallRule::new(mac(1), mac(4)),
            ],
            false,
        );
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_empty_table_blocks_nothing() {
        let table = FirewallTable::default();
        assert!(table.is_empty());
        assert!(!table.is_blocked(mac(1), mac(2)));
    }

    #[test]
    fn test_rule_from_json_strings() {
        let rule: FirewallRule =
            serde_json::from_str(r#"{"src":"00:00:00:00:00:02","dst":"00:00:00:00:00:03"}"#)
                .unwrap();
        assert_eq!(rule, FirewallRule::new(mac(2), mac(3)));
        assert_eq!(rule.to_string(), "00:00:00:00:00:02 -> 00:00:00:00:00:03");
    }
}

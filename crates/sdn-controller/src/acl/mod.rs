//! Firewall Policy Table - blocked (source, destination) MAC pairs.
//!
//! The table is static: built once from configuration and read-only
//! afterwards. It is consulted before any learning or forwarding decision.

mod table;

pub use table::{FirewallRule, FirewallTable};

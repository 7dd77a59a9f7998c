//! Policy Engine - the per-packet decision function.
//!
//! For every packet-in the engine decides between drop, flood, unicast,
//! direct ARP reply and virtual-IP rewrite, and installs the rules that keep
//! later packets of the same flow in the data plane.
//!
//! Decision order:
//!
//! ```text
//! parse ──> LLDP? ──> monitor copy? ──> firewall ──> learn src
//!                                                      │
//!            ┌─────────────────────────────────────────┤
//!            ▼                    ▼                    ▼
//!     ARP req for VIP      IPv4 to VIP          anything else
//!     (reply directly)     (rewrite rules)      (learning switch)
//! ```

mod engine;
mod types;

pub use engine::{EngineOptions, EngineStats, EngineStatsSnapshot, PolicyEngine};
pub use types::{Decision, PacketIn, PacketInReason, SwitchFeatures};

//! Reactive OpenFlow controller core
//!
//! Receives switch-connect and packet-in events, keeps per-switch forwarding
//! state, and installs the flow rules that implement three layered
//! behaviours:
//!
//! - a transparent learning switch,
//! - a source/destination MAC firewall,
//! - a virtual-IP load balancer that answers ARP for the virtual address and
//!   spreads clients over its backends round-robin.
//!
//! # Architecture
//!
//! ```text
//!  protocol stack                       sdn-controller
//! ┌──────────────┐  ControllerEvent  ┌────────────────────────────────────┐
//! │ switch conn. │──────────────────▶│ daemon::Controller (per-switch     │
//! │  packet-in   │                   │   workers)                         │
//! │              │                   │        │                           │
//! │              │                   │        ▼                           │
//! │              │                   │ policy::PolicyEngine               │
//! │              │                   │   ├── acl::FirewallTable           │
//! │              │                   │   ├── fdb::AddressLearningStore    │
//! │              │                   │   ├── vip::VirtualServiceDirectory │
//! │              │                   │   └── monitor::PacketMonitor       │
//! │              │  FlowMod/PacketOut│        │                           │
//! │              │◀──────────────────│ flow::FlowTableClient              │
//! └──────────────┘   SwitchChannel   └────────────────────────────────────┘
//! ```
//!
//! The OpenFlow wire codec and the secure channel belong to the protocol
//! stack and are reached only through [`flow::SwitchChannel`].

pub mod acl;
pub mod config;
pub mod daemon;
pub mod error;
pub mod fdb;
pub mod flow;
pub mod monitor;
pub mod packet;
pub mod policy;
pub mod vip;

pub use config::{ConfigError, ControllerConfig, DEFAULT_CONFIG_PATH};
pub use daemon::{run_replay, Controller, ControllerEvent, ReplayEvent, ReplayReport};
pub use error::{ControllerError, Result};
pub use flow::{
    FlowTableClient, InstallError, MpscSwitchChannel, RecordingSwitchChannel, SwitchChannel,
    SwitchMessage,
};
pub use policy::{Decision, PacketIn, PacketInReason, PolicyEngine, SwitchFeatures};

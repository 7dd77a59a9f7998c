//! Inputs and outcomes of the decision engine.

use sdn_types::{BufferId, Ipv4Address, PortNumber, SwitchId};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::acl::FirewallRule;
use crate::vip::Backend;

/// Why the switch sent a packet to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketInReason {
    /// No flow rule matched (the table-miss rule fired).
    #[default]
    NoMatch,
    /// A flow rule explicitly output the packet to the controller.
    Action,
}

/// A packet-in event as delivered by the protocol stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketIn {
    pub switch: SwitchId,
    pub in_port: PortNumber,
    #[serde(default)]
    pub reason: PacketInReason,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "BufferId::deserialize_wire"
    )]
    pub buffer_id: Option<BufferId>,
    #[serde(with = "hex")]
    pub data: Vec<u8>,
}

impl PacketIn {
    /// An unbuffered, fully captured table-miss packet-in.
    pub fn new(switch: SwitchId, in_port: PortNumber, data: Vec<u8>) -> Self {
        Self {
            switch,
            in_port,
            reason: PacketInReason::NoMatch,
            buffer_id: None,
            data,
        }
    }

    pub fn with_buffer(mut self, buffer_id: BufferId) -> Self {
        self.buffer_id = Some(buffer_id);
        self
    }

    pub fn with_reason(mut self, reason: PacketInReason) -> Self {
        self.reason = reason;
        self
    }
}

/// Capabilities a switch advertises in its features reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SwitchFeatures {
    #[serde(default)]
    pub n_buffers: u32,
    #[serde(default)]
    pub n_tables: u8,
    #[serde(default)]
    pub capabilities: u32,
}

/// Outcome of one packet-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Link-layer discovery frame, silently discarded.
    Suppressed,
    /// Copy produced by a monitoring rule; counted and otherwise ignored.
    Counted,
    /// Blocked pair; a drop rule was installed.
    Blocked(FirewallRule),
    /// ARP request for a virtual IP answered directly.
    ArpReply {
        virtual_ip: Ipv4Address,
        backend: Backend,
    },
    /// Traffic to a virtual IP rewritten towards `backend`. `out_port` is
    /// `None` when the backend's port is not yet known on this switch and
    /// the rewritten packet was flooded without rules.
    VirtualService {
        virtual_ip: Ipv4Address,
        backend: Backend,
        out_port: Option<PortNumber>,
    },
    /// Destination known; a unicast rule was installed.
    Unicast { out_port: PortNumber },
    /// Destination unknown; flooded without installing a rule.
    Flood,
    /// Destination learned on the ingress port; dropped.
    Hairpin,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Suppressed => write!(f, "suppressed"),
            Self::Counted => write!(f, "counted"),
            Self::Blocked(rule) => write!(f, "blocked {}", rule),
            Self::ArpReply {
                virtual_ip,
                backend,
            } => write!(f, "arp-reply {} is-at {}", virtual_ip, backend.mac),
            Self::VirtualService {
                virtual_ip,
                backend,
                out_port: Some(port),
            } => write!(f, "vip {} -> {} via {}", virtual_ip, backend.ip, port),
            Self::VirtualService {
                virtual_ip,
                backend,
                out_port: None,
            } => write!(f, "vip {} -> {} flooded", virtual_ip, backend.ip),
            Self::Unicast { out_port } => write!(f, "unicast via {}", out_port),
            Self::Flood => write!(f, "flood"),
            Self::Hairpin => write!(f, "hairpin"),
        }
    }
}

//! Flow rule types: match predicates, actions and switch-bound messages.

use sdn_types::{BufferId, Ipv4Address, MacAddress, PortNumber, SwitchId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Flow priority; higher wins.
pub type Priority = u16;

/// The priority ladder shared by all policies.
///
/// Firewall drops outrank virtual-service rewrites, which outrank learned
/// unicast forwarding, which outranks the table-miss rule. Rules with the
/// same match are never layered at equal priority.
pub mod priority {
    use super::Priority;

    pub const FIREWALL_DROP: Priority = 1000;
    pub const VIRTUAL_SERVICE: Priority = 500;
    pub const LEARNED_UNICAST: Priority = 100;
    pub const TABLE_MISS: Priority = 0;
}

/// Match predicate over the header fields the OpenFlow 1.3 dialect supports.
///
/// Unset fields are wildcards; [`FlowMatch::any`] matches every packet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowMatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_port: Option<PortNumber>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eth_src: Option<MacAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eth_dst: Option<MacAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eth_type: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4_src: Option<Ipv4Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4_dst: Option<Ipv4Address>,
}

impl FlowMatch {
    /// The match-everything predicate.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn in_port(mut self, port: PortNumber) -> Self {
        self.in_port = Some(port);
        self
    }

    pub fn eth_src(mut self, mac: MacAddress) -> Self {
        self.eth_src = Some(mac);
        self
    }

    pub fn eth_dst(mut self, mac: MacAddress) -> Self {
        self.eth_dst = Some(mac);
        self
    }

    /// Matches IPv4 source. OpenFlow requires the ether-type prerequisite, so
    /// it is set as well.
    pub fn ipv4_src(mut self, addr: Ipv4Address) -> Self {
        self.eth_type = Some(crate::packet::ether_type::IPV4);
        self.ipv4_src = Some(addr);
        self
    }

    /// Matches IPv4 destination, setting the ether-type prerequisite.
    pub fn ipv4_dst(mut self, addr: Ipv4Address) -> Self {
        self.eth_type = Some(crate::packet::ether_type::IPV4);
        self.ipv4_dst = Some(addr);
        self
    }

    pub fn is_any(&self) -> bool {
        *self == Self::default()
    }
}

impl fmt::Display for FlowMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_any() {
            return write!(f, "*");
        }
        let mut parts = Vec::new();
        if let Some(p) = self.in_port {
            parts.push(format!("in_port={}", p));
        }
        if let Some(m) = self.eth_src {
            parts.push(format!("eth_src={}", m));
        }
        if let Some(m) = self.eth_dst {
            parts.push(format!("eth_dst={}", m));
        }
        if let Some(t) = self.eth_type {
            parts.push(format!("eth_type=0x{:04x}", t));
        }
        if let Some(a) = self.ipv4_src {
            parts.push(format!("ipv4_src={}", a));
        }
        if let Some(a) = self.ipv4_dst {
            parts.push(format!("ipv4_dst={}", a));
        }
        write!(f, "{}", parts.join(","))
    }
}

/// A single action. Action lists are ordered and the order is preserved on
/// the wire: set-field actions must precede the output they apply to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FlowAction {
    Output(PortNumber),
    SetEthDst(MacAddress),
    SetIpv4Src(Ipv4Address),
    SetIpv4Dst(Ipv4Address),
}

impl FlowAction {
    /// Output to every port except the ingress port.
    pub const fn flood() -> Self {
        Self::Output(PortNumber::FLOOD)
    }

    pub const fn to_controller() -> Self {
        Self::Output(PortNumber::CONTROLLER)
    }
}

impl fmt::Display for FlowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Output(port) => write!(f, "output:{}", port),
            Self::SetEthDst(mac) => write!(f, "set_eth_dst:{}", mac),
            Self::SetIpv4Src(ip) => write!(f, "set_ipv4_src:{}", ip),
            Self::SetIpv4Dst(ip) => write!(f, "set_ipv4_dst:{}", ip),
        }
    }
}

/// Formats an action list; an empty list is a drop.
pub fn format_actions(actions: &[FlowAction]) -> String {
    if actions.is_empty() {
        return "drop".to_string();
    }
    actions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// A flow rule as sent to a switch in a flow-modification message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRule {
    pub switch: SwitchId,
    pub priority: Priority,
    #[serde(rename = "match")]
    pub flow_match: FlowMatch,
    pub actions: Vec<FlowAction>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "BufferId::deserialize_wire"
    )]
    pub buffer_id: Option<BufferId>,
}

impl FlowRule {
    pub fn is_drop(&self) -> bool {
        self.actions.is_empty()
    }

    /// Key under which the switch stores this rule: same key means overwrite.
    pub fn key(&self) -> RuleKey {
        RuleKey {
            priority: self.priority,
            flow_match: self.flow_match.clone(),
        }
    }
}

impl fmt::Display for FlowRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "switch={} priority={} match=[{}] actions=[{}]",
            self.switch,
            self.priority,
            self.flow_match,
            format_actions(&self.actions)
        )
    }
}

/// Identity of a rule inside one switch's flow table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleKey {
    pub priority: Priority,
    pub flow_match: FlowMatch,
}

/// Instruction to emit a packet on specific ports without a standing rule.
///
/// Exactly one of `buffer_id` and `data` identifies the packet: a buffered
/// packet is released by id, otherwise the frame bytes travel with the message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketOut {
    pub switch: SwitchId,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "BufferId::deserialize_wire"
    )]
    pub buffer_id: Option<BufferId>,
    pub in_port: PortNumber,
    pub actions: Vec<FlowAction>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "hex_bytes")]
    pub data: Option<Vec<u8>>,
}

impl PacketOut {
    /// Releases `buffer_id` when present, otherwise carries `data`.
    pub fn release(
        switch: SwitchId,
        in_port: PortNumber,
        buffer_id: Option<BufferId>,
        data: &[u8],
        actions: Vec<FlowAction>,
    ) -> Self {
        Self {
            switch,
            buffer_id,
            in_port,
            actions,
            data: if buffer_id.is_some() {
                None
            } else {
                Some(data.to_vec())
            },
        }
    }
}

/// A message the controller emits towards a switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "message", rename_all = "snake_case")]
pub enum SwitchMessage {
    FlowMod(FlowRule),
    PacketOut(PacketOut),
}

impl SwitchMessage {
    pub fn switch(&self) -> SwitchId {
        match self {
            Self::FlowMod(rule) => rule.switch,
            Self::PacketOut(out) => out.switch,
        }
    }
}

/// Serde adapter writing optional frame bytes as a hex string.
pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => s.serialize_str(&hex::encode(b)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        raw.map(|s| hex::decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_ipv4_match_sets_ether_type() {
        let m = FlowMatch::any().ipv4_dst(Ipv4Address::new(10, 0, 0, 42));
        assert_eq!(m.eth_type, Some(0x0800));
        assert!(!m.is_any());
        assert!(FlowMatch::any().is_any());
    }

    #[test]
    fn test_match_display() {
        let m = FlowMatch::any()
            .in_port(PortNumber::new(1))
            .eth_src(MacAddress::new([0, 0, 0, 0, 0, 1]));
        assert_eq!(m.to_string(), "in_port=1,eth_src=00:00:00:00:00:01");
        assert_eq!(FlowMatch::any().to_string(), "*");
    }

    #[test]
    fn test_format_actions() {
        assert_eq!(format_actions(&[]), "drop");
        assert_eq!(
            format_actions(&[
                FlowAction::SetIpv4Dst(Ipv4Address::new(10, 0, 0, 4)),
                FlowAction::Output(PortNumber::new(4)),
            ]),
            "set_ipv4_dst:10.0.0.4,output:4"
        );
        assert_eq!(format_actions(&[FlowAction::flood()]), "output:FLOOD");
    }

    #[test]
    fn test_packet_out_release_prefers_buffer() {
        let buffered = PacketOut::release(
            SwitchId::new(1),
            PortNumber::new(2),
            BufferId::from_raw(7),
            &[1, 2, 3],
            vec![FlowAction::flood()],
        );
        assert_eq!(buffered.data, None);

        let unbuffered = PacketOut::release(
            SwitchId::new(1),
            PortNumber::new(2),
            None,
            &[1, 2, 3],
            vec![FlowAction::flood()],
        );
        assert_eq!(unbuffered.data, Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_packet_out_json_uses_hex() {
        let out = PacketOut::release(
            SwitchId::new(1),
            PortNumber::new(2),
            None,
            &[0xde, 0xad],
            vec![FlowAction::Output(PortNumber::IN_PORT)],
        );
        let json = serde_json::to_value(SwitchMessage::PacketOut(out.clone())).unwrap();
        assert_eq!(json["message"], "packet_out");
        assert_eq!(json["data"], "dead");

        let back: SwitchMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back, SwitchMessage::PacketOut(out));
    }
}

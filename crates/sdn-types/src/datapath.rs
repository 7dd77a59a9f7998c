//! Datapath, port and buffer identifiers (OpenFlow 1.3 numbering).

use crate::ParseError;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a connected switch (OpenFlow datapath id).
///
/// Stable for the lifetime of the switch's connection and used as the outer
/// key of all per-switch controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SwitchId(u64);

impl SwitchId {
    pub const fn new(dpid: u64) -> Self {
        SwitchId(dpid)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SwitchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for SwitchId {
    type Err = ParseError;

    /// Accepts a decimal datapath id or a `0x`-prefixed hexadecimal one.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => s.parse::<u64>(),
        };
        parsed
            .map(SwitchId)
            .map_err(|_| ParseError::InvalidSwitchId(s.to_string()))
    }
}

impl From<u64> for SwitchId {
    fn from(dpid: u64) -> Self {
        SwitchId(dpid)
    }
}

/// A switch port number.
///
/// Values above [`PortNumber::MAX`] are reserved pseudo-ports; the controller
/// uses [`PortNumber::FLOOD`] ("all ports except ingress"),
/// [`PortNumber::CONTROLLER`] ("deliver to controller") and
/// [`PortNumber::IN_PORT`] ("back out of the ingress port").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortNumber(u32);

impl PortNumber {
    /// Highest number usable by a physical or logical port.
    pub const MAX: PortNumber = PortNumber(0xffff_ff00);
    pub const IN_PORT: PortNumber = PortNumber(0xffff_fff8);
    pub const FLOOD: PortNumber = PortNumber(0xffff_fffb);
    pub const ALL: PortNumber = PortNumber(0xffff_fffc);
    pub const CONTROLLER: PortNumber = PortNumber(0xffff_fffd);
    pub const LOCAL: PortNumber = PortNumber(0xffff_fffe);
    pub const ANY: PortNumber = PortNumber(0xffff_ffff);

    pub const fn new(port: u32) -> Self {
        PortNumber(port)
    }

    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    /// Returns true for the reserved pseudo-port range.
    pub const fn is_reserved(&self) -> bool {
        self.0 > Self::MAX.0
    }
}

impl fmt::Display for PortNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::IN_PORT => write!(f, "IN_PORT"),
            Self::FLOOD => write!(f, "FLOOD"),
            Self::ALL => write!(f, "ALL"),
            Self::CONTROLLER => write!(f, "CONTROLLER"),
            Self::LOCAL => write!(f, "LOCAL"),
            Self::ANY => write!(f, "ANY"),
            PortNumber(n) => write!(f, "{}", n),
        }
    }
}

impl FromStr for PortNumber {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "IN_PORT" => Ok(Self::IN_PORT),
            "FLOOD" => Ok(Self::FLOOD),
            "ALL" => Ok(Self::ALL),
            "CONTROLLER" => Ok(Self::CONTROLLER),
            "LOCAL" => Ok(Self::LOCAL),
            "ANY" => Ok(Self::ANY),
            _ => s
                .parse::<u32>()
                .map(PortNumber)
                .map_err(|_| ParseError::InvalidPortNumber(s.to_string())),
        }
    }
}

impl From<u32> for PortNumber {
    fn from(port: u32) -> Self {
        PortNumber(port)
    }
}

/// Identifier of a packet held in a switch buffer awaiting a controller decision.
///
/// Never holds [`BufferId::NO_BUFFER`]. Optional wire fields should
/// deserialize through [`BufferId::deserialize_wire`] so the marker reads as
/// `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct BufferId(u32);

impl BufferId {
    /// Wire value meaning "the packet was not buffered".
    pub const NO_BUFFER: u32 = 0xffff_ffff;

    /// Converts a wire value, mapping `NO_BUFFER` to `None`.
    pub const fn from_raw(raw: u32) -> Option<Self> {
        if raw == Self::NO_BUFFER {
            None
        } else {
            Some(BufferId(raw))
        }
    }

    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    /// Reads an optional wire buffer id; both an absent value and
    /// `NO_BUFFER` become `None`.
    pub fn deserialize_wire<'de, D>(deserializer: D) -> Result<Option<Self>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<u32>::deserialize(deserializer)?;
        Ok(raw.and_then(Self::from_raw))
    }
}

impl TryFrom<u32> for BufferId {
    type Error = ParseError;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        Self::from_raw(raw).ok_or(ParseError::NoBuffer(raw))
    }
}

impl From<BufferId> for u32 {
    fn from(id: BufferId) -> Self {
        id.0
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_switch_id_parse() {
        assert_eq!("1".parse::<SwitchId>().unwrap(), SwitchId::new(1));
        assert_eq!("0x1f".parse::<SwitchId>().unwrap(), SwitchId::new(31));
        assert!("s1".parse::<SwitchId>().is_err());
    }

    #[test]
    fn test_switch_id_display() {
        assert_eq!(SwitchId::new(1).to_string(), "0000000000000001");
    }

    #[test]
    fn test_reserved_ports() {
        assert!(PortNumber::FLOOD.is_reserved());
        assert!(PortNumber::CONTROLLER.is_reserved());
        assert!(PortNumber::IN_PORT.is_reserved());
        assert!(!PortNumber::new(4).is_reserved());
        assert!(!PortNumber::MAX.is_reserved());
    }

    #[test]
    fn test_port_display_and_parse() {
        assert_eq!(PortNumber::FLOOD.to_string(), "FLOOD");
        assert_eq!(PortNumber::new(3).to_string(), "3");
        assert_eq!("controller".parse::<PortNumber>().unwrap(), PortNumber::CONTROLLER);
        assert_eq!("7".parse::<PortNumber>().unwrap(), PortNumber::new(7));
        assert!("eth0".parse::<PortNumber>().is_err());
    }

    #[test]
    fn test_buffer_id_from_raw() {
        assert_eq!(BufferId::from_raw(BufferId::NO_BUFFER), None);
        assert_eq!(BufferId::from_raw(17).map(|b| b.as_u32()), Some(17));
    }

    #[derive(Debug, Deserialize)]
    struct Wire {
        #[serde(default, deserialize_with = "BufferId::deserialize_wire")]
        buffer_id: Option<BufferId>,
    }

    #[test]
    fn test_buffer_id_no_buffer_marker_from_json() {
        let wire: Wire = serde_json::from_str(r#"{"buffer_id":4294967295}"#).unwrap();
        assert_eq!(wire.buffer_id, None);

        let wire: Wire = serde_json::from_str(r#"{"buffer_id":9}"#).unwrap();
        assert_eq!(wire.buffer_id, BufferId::from_raw(9));

        let wire: Wire = serde_json::from_str("{}").unwrap();
        assert_eq!(wire.buffer_id, None);

        // A bare buffer id can never carry the marker.
        assert!(serde_json::from_str::<BufferId>("4294967295").is_err());
        assert_eq!(serde_json::to_string(&BufferId::from_raw(9)).unwrap(), "9");
    }
}

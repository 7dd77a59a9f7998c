//! Header types.

use sdn_types::{Ipv4Address, MacAddress};
use std::fmt;

/// Ether-type values the controller dispatches on.
pub mod ether_type {
    pub const IPV4: u16 = 0x0800;
    pub const ARP: u16 = 0x0806;
    pub const LLDP: u16 = 0x88cc;
}

pub const ETHERNET_HEADER_LEN: usize = 14;
/// Minimum Ethernet frame length on the wire, without FCS.
pub const ETHERNET_MIN_FRAME_LEN: usize = 60;
/// Length of an Ethernet/IPv4 ARP body.
pub const ARP_LEN: usize = 28;
/// ARP hardware type for Ethernet.
pub(crate) const ARP_HTYPE_ETHERNET: u16 = 1;
pub const IPV4_MIN_HEADER_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetHeader {
    pub dst: MacAddress,
    pub src: MacAddress,
    pub ether_type: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArpOperation {
    Request,
    Reply,
    Other(u16),
}

impl ArpOperation {
    pub const fn from_wire(op: u16) -> Self {
        match op {
            1 => Self::Request,
            2 => Self::Reply,
            other => Self::Other(other),
        }
    }

    pub const fn to_wire(self) -> u16 {
        match self {
            Self::Request => 1,
            Self::Reply => 2,
            Self::Other(op) => op,
        }
    }
}

impl fmt::Display for ArpOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => write!(f, "request"),
            Self::Reply => write!(f, "reply"),
            Self::Other(op) => write!(f, "op{}", op),
        }
    }
}

/// ARP body for Ethernet hardware and IPv4 protocol addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpHeader {
    pub operation: ArpOperation,
    pub sender_mac: MacAddress,
    pub sender_ip: Ipv4Address,
    pub target_mac: MacAddress,
    pub target_ip: Ipv4Address,
}

impl ArpHeader {
    pub fn is_request(&self) -> bool {
        self.operation == ArpOperation::Request
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    /// Header length in bytes (IHL * 4).
    pub header_len: usize,
    pub total_len: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub src: Ipv4Address,
    pub dst: Ipv4Address,
}

/// What follows the Ethernet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    Arp(ArpHeader),
    Ipv4(Ipv4Header),
    /// Link-layer discovery; never learned from, never forwarded.
    Lldp,
    /// Any other ether-type, forwarded on the learning-switch path.
    Other(u16),
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Arp(_) => "arp",
            Self::Ipv4(_) => "ipv4",
            Self::Lldp => "lldp",
            Self::Other(_) => "other",
        }
    }
}

/// A fully parsed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedFrame {
    pub ethernet: EthernetHeader,
    pub payload: Payload,
}

impl ParsedFrame {
    pub fn src(&self) -> MacAddress {
        self.ethernet.src
    }

    pub fn dst(&self) -> MacAddress {
        self.ethernet.dst
    }
}

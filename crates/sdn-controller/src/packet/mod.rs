//! Typed packet headers for frames delivered in packet-in events.
//!
//! Frames are parsed once, up front, into a [`ParsedFrame`]: an
//! [`EthernetHeader`] plus a tagged [`Payload`] (ARP, IPv4, LLDP or an
//! opaque ether-type). Any truncation or inconsistent header field yields a
//! [`PacketError`], which the policy engine treats as a malformed packet and
//! discards without touching controller state.
//!
//! The only frame the controller ever synthesizes is an ARP reply for a
//! virtual IP; see [`build_arp_reply`].

mod build;
mod parse;
mod types;

pub use build::build_arp_reply;
pub use parse::{parse_frame, PacketError};
pub use types::{
    ether_type, ArpHeader, ArpOperation, EthernetHeader, Ipv4Header, ParsedFrame, Payload,
    ARP_LEN, ETHERNET_HEADER_LEN, ETHERNET_MIN_FRAME_LEN, IPV4_MIN_HEADER_LEN,
};

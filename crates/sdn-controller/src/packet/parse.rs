//! Frame parser.

use byteorder::{BigEndian, ByteOrder};
use sdn_types::{Ipv4Address, MacAddress};
use thiserror::Error;

use super::types::{
    ether_type, ArpHeader, ArpOperation, EthernetHeader, Ipv4Header, ParsedFrame, Payload,
    ARP_HTYPE_ETHERNET, ARP_LEN, ETHERNET_HEADER_LEN, IPV4_MIN_HEADER_LEN,
};

/// Reasons a frame is considered malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("truncated {layer} header: need {needed} bytes, have {available}")]
    Truncated {
        layer: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("unsupported ARP encoding (htype {htype}, ptype 0x{ptype:04x}, hlen {hlen}, plen {plen})")]
    UnsupportedArp {
        htype: u16,
        ptype: u16,
        hlen: u8,
        plen: u8,
    },

    #[error("not an IPv4 header (version {0})")]
    BadIpVersion(u8),

    #[error("invalid IPv4 header length {0}")]
    BadIpHeaderLength(usize),
}

fn need(layer: &'static str, bytes: &[u8], needed: usize) -> Result<(), PacketError> {
    if bytes.len() < needed {
        return Err(PacketError::Truncated {
            layer,
            needed,
            available: bytes.len(),
        });
    }
    Ok(())
}

fn mac_at(bytes: &[u8], offset: usize) -> MacAddress {
    let mut raw = [0u8; 6];
    raw.copy_from_slice(&bytes[offset..offset + 6]);
    MacAddress::new(raw)
}

fn ipv4_at(bytes: &[u8], offset: usize) -> Ipv4Address {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[offset..offset + 4]);
    Ipv4Address::from_octets(raw)
}

/// Parses a raw Ethernet frame as captured in a packet-in.
///
/// The captured data may be shorter than the original frame (switches send
/// only the first `miss_send_len` bytes), so only the headers themselves must
/// be complete; payload beyond them is not inspected.
pub fn parse_frame(data: &[u8]) -> Result<ParsedFrame, PacketError> {
    need("ethernet", data, ETHERNET_HEADER_LEN)?;

    let ethernet = EthernetHeader {
        dst: mac_at(data, 0),
        src: mac_at(data, 6),
        ether_type: BigEndian::read_u16(&data[12..14]),
    };
    let rest = &data[ETHERNET_HEADER_LEN..];

    let payload = match ethernet.ether_type {
        ether_type::ARP => Payload::Arp(parse_arp(rest)?),
        ether_type::IPV4 => Payload::Ipv4(parse_ipv4(rest)?),
        ether_type::LLDP => Payload::Lldp,
        other => Payload::Other(other),
    };

    Ok(ParsedFrame { ethernet, payload })
}

fn parse_arp(bytes: &[u8]) -> Result<ArpHeader, PacketError> {
    need("arp", bytes, ARP_LEN)?;

    let htype = BigEndian::read_u16(&bytes[0..2]);
    let ptype = BigEndian::read_u16(&bytes[2..4]);
    let hlen = bytes[4];
    let plen = bytes[5];
    if htype != ARP_HTYPE_ETHERNET || ptype != ether_type::IPV4 || hlen != 6 || plen != 4 {
        return Err(PacketError::UnsupportedArp {
            htype,
            ptype,
            hlen,
            plen,
        });
    }

    Ok(ArpHeader {
        operation: ArpOperation::from_wire(BigEndian::read_u16(&bytes[6..8])),
        sender_mac: mac_at(bytes, 8),
        sender_ip: ipv4_at(bytes, 14),
        target_mac: mac_at(bytes, 18),
        target_ip: ipv4_at(bytes, 24),
    })
}

fn parse_ipv4(bytes: &[u8]) -> Result<Ipv4Header, PacketError> {
    need("ipv4", bytes, IPV4_MIN_HEADER_LEN)?;

    let version = bytes[0] >> 4;
    if version != 4 {
        return Err(PacketError::BadIpVersion(version));
    }
    let header_len = usize::from(bytes[0] & 0x0f) * 4;
    if header_len < IPV4_MIN_HEADER_LEN {
        return Err(PacketError::BadIpHeaderLength(header_len));
    }
    need("ipv4", bytes, header_len)?;

    let total_len = BigEndian::read_u16(&bytes[2..4]);
    if usize::from(total_len) < header_len {
        return Err(PacketError::BadIpHeaderLength(header_len));
    }

    Ok(Ipv4Header {
        header_len,
        total_len,
        ttl: bytes[8],
        protocol: bytes[9],
        src: ipv4_at(bytes, 12),
        dst: ipv4_at(bytes, 16),
    })
}

//! ARP reply synthesis.

use byteorder::{BigEndian, ByteOrder};
use sdn_types::{Ipv4Address, MacAddress};

use super::types::{
    ether_type, ArpOperation, ARP_HTYPE_ETHERNET, ARP_LEN, ETHERNET_HEADER_LEN, ETHERNET_MIN_FRAME_LEN,
};

/// Builds an Ethernet/ARP reply frame answering `requester`'s request.
///
/// The reply claims that `answer_ip` lives at `answer_mac` and is addressed
/// to the requester's MAC only. The frame is padded to the Ethernet minimum.
pub fn build_arp_reply(
    requester_mac: MacAddress,
    requester_ip: Ipv4Address,
    answer_mac: MacAddress,
    answer_ip: Ipv4Address,
) -> Vec<u8> {
    let mut frame = vec![0u8; ETHERNET_MIN_FRAME_LEN];

    frame[0..6].copy_from_slice(requester_mac.as_bytes());
    frame[6..12].copy_from_slice(answer_mac.as_bytes());
    BigEndian::write_u16(&mut frame[12..14], ether_type::ARP);

    let arp = &mut frame[ETHERNET_HEADER_LEN..ETHERNET_HEADER_LEN + ARP_LEN];
    BigEndian::write_u16(&mut arp[0..2], ARP_HTYPE_ETHERNET);
    BigEndian::write_u16(&mut arp[2..4], ether_type::IPV4);
    arp[4] = 6;
    arp[5] = 4;
    BigEndian::write_u16(&mut arp[6..8], ArpOperation::Reply.to_wire());
    arp[8..14].copy_from_slice(answer_mac.as_bytes());
    arp[14..18].copy_from_slice(&answer_ip.octets());
    arp[18..24].copy_from_slice(requester_mac.as_bytes());
    arp[24..28].copy_from_slice(&requester_ip.octets());

    frame
}

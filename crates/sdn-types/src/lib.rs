//! Shared network primitives for the reactive SDN controller.
//!
//! This crate provides type-safe representations of the identifiers that
//! flow through every layer of the controller:
//!
//! - [`MacAddress`]: 48-bit Ethernet hardware addresses
//! - [`Ipv4Address`]: IPv4 addresses
//! - [`SwitchId`]: OpenFlow datapath identifiers
//! - [`PortNumber`]: switch port numbers, including the reserved
//!   `FLOOD`, `CONTROLLER` and `IN_PORT` sentinels
//! - [`BufferId`]: identifiers of packets buffered on a switch

mod datapath;
mod ip;
mod mac;

pub use datapath::{BufferId, PortNumber, SwitchId};
pub use ip::Ipv4Address;
pub use mac::MacAddress;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid IPv4 address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid switch identifier: {0}")]
    InvalidSwitchId(String),

    #[error("invalid port number: {0}")]
    InvalidPortNumber(String),

    #[error("{0:#x} is the no-buffer marker, not a buffer id")]
    NoBuffer(u32),
}

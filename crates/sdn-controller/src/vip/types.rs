//! Backend and service types.

use sdn_types::{Ipv4Address, MacAddress, PortNumber, SwitchId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use thiserror::Error;

/// A real server behind a virtual IP, with its attachment point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Backend {
    pub ip: Ipv4Address,
    pub mac: MacAddress,
    pub switch: SwitchId,
    pub port: PortNumber,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) at {}:{}", self.ip, self.mac, self.switch, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VirtualServiceError {
    #[error("virtual service {0} has no backends")]
    NoBackends(Ipv4Address),

    #[error("virtual IP {0} is configured more than once")]
    DuplicateVirtualIp(Ipv4Address),

    #[error("backend MAC {mac} belongs to both {first} and {second}")]
    DuplicateBackendMac {
        mac: MacAddress,
        first: Ipv4Address,
        second: Ipv4Address,
    },
}

/// A virtual IP with its ordered, non-empty backend pool.
#[derive(Debug)]
pub struct VirtualService {
    virtual_ip: Ipv4Address,
    backends: Vec<Backend>,
    /// Index of the next backend; always below `backends.len()`.
    cursor: AtomicUsize,
    selections: AtomicU64,
}

impl VirtualService {
    pub fn new(virtual_ip: Ipv4Address, backends: Vec<Backend>) -> Result<Self, VirtualServiceError> {
        if backends.is_empty() {
            return Err(VirtualServiceError::NoBackends(virtual_ip));
        }
        Ok(Self {
            virtual_ip,
            backends,
            cursor: AtomicUsize::new(0),
            selections: AtomicU64::new(0),
        })
    }

    pub fn virtual_ip(&self) -> Ipv4Address {
        self.virtual_ip
    }

    pub fn backends(&self) -> &[Backend] {
        &self.backends
    }

    /// Returns the next backend in cyclic order.
    pub fn select(&self) -> Backend {
        let len = self.backends.len();
        let index = match self
            .cursor
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| Some((n + 1) % len))
        {
            Ok(n) | Err(n) => n,
        };
        self.selections.fetch_add(1, Ordering::Relaxed);
        self.backends[index]
    }

    pub fn backend_by_mac(&self, mac: MacAddress) -> Option<Backend> {
        self.backends.iter().find(|b| b.mac == mac).copied()
    }

    /// Total selections made so far.
    pub fn selections(&self) -> u64 {
        self.selections.load(Ordering::Relaxed)
    }
}

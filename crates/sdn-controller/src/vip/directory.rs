//! Lookup of services by virtual IP and of backends by MAC.

use sdn_types::{Ipv4Address, MacAddress};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::types::{Backend, VirtualService, VirtualServiceError};

/// Read-only after construction apart from each service's cursor.
#[derive(Debug, Default)]
pub struct VirtualServiceDirectory {
    services: HashMap<Ipv4Address, Arc<VirtualService>>,
    by_mac: HashMap<MacAddress, (Ipv4Address, Backend)>,
}

impl VirtualServiceDirectory {
    pub fn new(
        services: impl IntoIterator<Item = VirtualService>,
    ) -> Result<Self, VirtualServiceError> {
        let mut directory = Self::default();
        for service in services {
            let vip = service.virtual_ip();
            if directory.services.contains_key(&vip) {
                return Err(VirtualServiceError::DuplicateVirtualIp(vip));
            }
            for backend in service.backends() {
                match directory.by_mac.get(&backend.mac) {
                    Some((owner, _)) if *owner != vip => {
                        return Err(VirtualServiceError::DuplicateBackendMac {
                            mac: backend.mac,
                            first: *owner,
                            second: vip,
                        });
                    }
                    Some(_) => {}
                    None => {
                        directory.by_mac.insert(backend.mac, (vip, *backend));
                    }
                }
            }
            directory.services.insert(vip, Arc::new(service));
        }
        Ok(directory)
    }

    pub fn is_virtual_ip(&self, ip: Ipv4Address) -> bool {
        self.services.contains_key(&ip)
    }

    pub fn service(&self, virtual_ip: Ipv4Address) -> Option<Arc<VirtualService>> {
        self.services.get(&virtual_ip).cloned()
    }

    /// Round-robin selection; `None` if `virtual_ip` is not a service.
    pub fn select_backend(&self, virtual_ip: Ipv4Address) -> Option<Backend> {
        let backend = self.services.get(&virtual_ip)?.select();
        debug!(vip = %virtual_ip, backend = %backend.ip, "Selected backend");
        Some(backend)
    }

    /// Reverse lookup of a backend by hardware address.
    pub fn resolve_by_mac(&self, mac: MacAddress) -> Option<Backend> {
        self.by_mac.get(&mac).map(|(_, backend)| *backend)
    }

    /// Reverse lookup returning the owning virtual IP as well.
    pub fn resolve_service_by_mac(&self, mac: MacAddress) -> Option<(Ipv4Address, Backend)> {
        self.by_mac.get(&mac).copied()
    }

    /// Services ordered by virtual IP.
    pub fn services(&self) -> Vec<Arc<VirtualService>> {
        let mut services: Vec<_> = self.services.values().cloned().collect();
        services.sort_by_key(|s| s.virtual_ip());
        services
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sdn_types::{PortNumber, SwitchId};

    const VIP: Ipv4Address = Ipv4Address::new(10, 0, 0, 42);

    fn backend(n: u8) -> Backend {
        Backend {
            ip: Ipv4Address::new(10, 0, 0, n),
            mac: MacAddress::new([0, 0, 0, 0, 0, n]),
            switch: SwitchId::new(1),
            port: PortNumber::new(u32::from(n)),
        }
    }

    fn directory(count: u8) -> VirtualServiceDirectory {
        let backends = (0..count).map(|i| backend(4 + i)).collect();
        VirtualServiceDirectory::new([VirtualService::new(VIP, backends).unwrap()]).unwrap()
    }

    #[test]
    fn test_round_robin_cycles_in_order() {
        let dir = directory(2);
        let picks: Vec<_> = (0..5)
            .map(|_| dir.select_backend(VIP).unwrap().ip)
            .collect();
        assert_eq!(
            picks,
            vec![
                Ipv4Address::new(10, 0, 0, 4),
                Ipv4Address::new(10, 0, 0, 5),
                Ipv4Address::new(10, 0, 0, 4),
                Ipv4Address::new(10, 0, 0, 5),
                Ipv4Address::new(10, 0, 0, 4),
            ]
        );
    }

    #[test]
    fn test_round_robin_fair_within_one() {
        let dir = directory(3);
        let mut counts: HashMap<Ipv4Address, usize> = HashMap::new();
        for _ in 0..10 {
            *counts.entry(dir.select_backend(VIP).unwrap().ip).or_default() += 1;
        }
        let min = counts.values().min().copied().unwrap();
        let max = counts.values().max().copied().unwrap();
        assert_eq!(counts.len(), 3);
        assert!(max - min <= 1);
    }

    #[test]
    fn test_round_robin_fair_across_threads() {
        let dir = Arc::new(directory(4));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let dir = Arc::clone(&dir);
                std::thread::spawn(move || {
                    (0..100)
                        .map(|_| dir.select_backend(VIP).unwrap().ip)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut counts: HashMap<Ipv4Address, usize> = HashMap::new();
        for h in handles {
            for ip in h.join().unwrap() {
                *counts.entry(ip).or_default() += 1;
            }
        }
        assert!(counts.values().all(|c| *c == 100));
    }

    #[test]
    fn test_resolve_by_mac() {
        let dir = directory(2);
        assert_eq!(dir.resolve_by_mac(backend(5).mac), Some(backend(5)));
        assert_eq!(dir.resolve_service_by_mac(backend(4).mac), Some((VIP, backend(4))));
        assert_eq!(dir.resolve_by_mac(MacAddress::new([0, 0, 0, 0, 0, 1])), None);
    }

    #[test]
    fn test_unknown_vip() {
        let dir = directory(2);
        assert!(dir.is_virtual_ip(VIP));
        assert!(!dir.is_virtual_ip(Ipv4Address::new(10, 0, 0, 4)));
        assert_eq!(dir.select_backend(Ipv4Address::new(10, 0, 0, 4)), None);
    }

    #[test]
    fn test_empty_backend_list_rejected() {
        assert_eq!(
            VirtualService::new(VIP, vec![]).unwrap_err(),
            VirtualServiceError::NoBackends(VIP)
        );
    }

    #[test]
    fn test_duplicate_vip_rejected() {
        let err = VirtualServiceDirectory::new([
            VirtualService::new(VIP, vec![backend(4)]).unwrap(),
            VirtualService::new(VIP, vec![backend(5)]).unwrap(),
        ])
        .unwrap_err();
        assert_eq!(err, VirtualServiceError::DuplicateVirtualIp(VIP));
    }

    #[test]
    fn test_backend_mac_shared_between_services_rejected() {
        let other = Ipv4Address::new(10, 0, 0, 43);
        let err = VirtualServiceDirectory::new([
            VirtualService::new(VIP, vec![backend(4)]).unwrap(),
            VirtualService::new(other, vec![backend(4)]).unwrap(),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            VirtualServiceError::DuplicateBackendMac {
                mac: backend(4).mac,
                first: VIP,
                second: other
            }
        );
    }
}

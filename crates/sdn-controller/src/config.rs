//! Configuration file support for sdnctld
//!
//! Loads and validates the static controller tables from TOML.
//! Default location: /etc/sdn/controller.toml
//!
//! Everything here is read once at startup; validation failures are fatal
//! before the event loop starts.

use sdn_types::{Ipv4Address, MacAddress};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::acl::{FirewallRule, FirewallTable};
use crate::monitor::PacketMonitor;
use crate::policy::{EngineOptions, PolicyEngine};
use crate::vip::{Backend, VirtualService, VirtualServiceDirectory, VirtualServiceError};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/sdn/controller.toml";

/// Invalid or unreadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid virtual service: {0}")]
    VirtualService(#[from] VirtualServiceError),

    #[error("Backend {backend} of {virtual_ip} is itself a virtual IP")]
    BackendIsVirtualIp {
        virtual_ip: Ipv4Address,
        backend: Ipv4Address,
    },

    #[error("Backend {backend} of {virtual_ip} is attached to reserved port {port}")]
    ReservedBackendPort {
        virtual_ip: Ipv4Address,
        backend: Ipv4Address,
        port: sdn_types::PortNumber,
    },

    #[error("Firewall rule blocks {0} from itself")]
    SelfBlockingRule(MacAddress),

    #[error("event_queue_depth must be > 0")]
    ZeroQueueDepth,
}

/// Event loop settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerSection {
    /// Per-switch worker queue depth
    #[serde(default = "default_event_queue_depth")]
    pub event_queue_depth: usize,
}

/// Firewall settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallConfig {
    /// Also block each pair in the reverse direction
    #[serde(default)]
    pub symmetric: bool,

    /// Install drop rules when a switch connects instead of on first contact
    #[serde(default)]
    pub proactive: bool,

    #[serde(default)]
    pub rules: Vec<FirewallRule>,
}

/// One virtual IP and its backend pool, in selection order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualServiceConfig {
    pub virtual_ip: Ipv4Address,
    #[serde(default)]
    pub backends: Vec<Backend>,
}

/// Packet monitor settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Source MACs whose packets are counted
    #[serde(default)]
    pub sources: Vec<MacAddress>,
}

/// Complete controller configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    #[serde(default)]
    pub controller: ControllerSection,

    #[serde(default)]
    pub firewall: FirewallConfig,

    #[serde(default)]
    pub virtual_services: Vec<VirtualServiceConfig>,

    #[serde(default)]
    pub monitor: MonitorConfig,
}

fn default_event_queue_depth() -> usize {
    1024
}

impl Default for ControllerSection {
    fn default() -> Self {
        Self {
            event_queue_depth: default_event_queue_depth(),
        }
    }
}

impl ControllerConfig {
    /// Load and validate configuration from file, falling back to defaults
    /// (a plain learning switch) if the file does not exist
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Load and validate configuration from file; the file must exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.controller.event_queue_depth == 0 {
            return Err(ConfigError::ZeroQueueDepth);
        }

        if let Some(rule) = self.firewall.rules.iter().find(|r| r.src == r.dst) {
            return Err(ConfigError::SelfBlockingRule(rule.src));
        }

        let virtual_ips: HashSet<Ipv4Address> =
            self.virtual_services.iter().map(|s| s.virtual_ip).collect();
        for service in &self.virtual_services {
            for backend in &service.backends {
                if virtual_ips.contains(&backend.ip) {
                    return Err(ConfigError::BackendIsVirtualIp {
                        virtual_ip: service.virtual_ip,
                        backend: backend.ip,
                    });
                }
                if backend.port.is_reserved() {
                    return Err(ConfigError::ReservedBackendPort {
                        virtual_ip: service.virtual_ip,
                        backend: backend.ip,
                        port: backend.port,
                    });
                }
            }
        }

        // Empty pools, duplicate VIPs and shared backend MACs are rejected
        // by the directory itself.
        self.service_directory().map(|_| ())
    }

    fn service_directory(&self) -> Result<VirtualServiceDirectory, ConfigError> {
        let services = self
            .virtual_services
            .iter()
            .map(|s| VirtualService::new(s.virtual_ip, s.backends.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(VirtualServiceDirectory::new(services)?)
    }

    /// Build the policy engine described by this configuration
    pub fn build_engine(&self) -> Result<PolicyEngine, ConfigError> {
        self.validate()?;
        Ok(PolicyEngine::new(
            FirewallTable::new(self.firewall.rules.iter().copied(), self.firewall.symmetric),
            self.service_directory()?,
            PacketMonitor::new(self.monitor.sources.iter().copied()),
            EngineOptions {
                proactive_firewall: self.firewall.proactive,
            },
        ))
    }

    /// Log a one-line summary of the loaded tables
    pub fn log_summary(&self) {
        let backends: usize = self.virtual_services.iter().map(|s| s.backends.len()).sum();
        info!(
            firewall_rules = self.firewall.rules.len(),
            symmetric = self.firewall.symmetric,
            proactive = self.firewall.proactive,
            virtual_services = self.virtual_services.len(),
            backends,
            monitored_sources = self.monitor.sources.len(),
            event_queue_depth = self.controller.event_queue_depth,
            "Configuration loaded"
        );
    }
}

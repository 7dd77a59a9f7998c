//! Error types for the controller.

use sdn_types::SwitchId;
use thiserror::Error;

use crate::config::ConfigError;
use crate::flow::InstallError;
use crate::packet::PacketError;

/// Errors surfaced by the controller.
///
/// Everything except `Config` and `Io` is per-packet: it is contained in the
/// handling of one event and never affects shared state.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Header parsing failed; the frame is discarded.
    #[error("Malformed packet: {0}")]
    MalformedPacket(#[from] PacketError),

    /// Event referenced a switch that is not connected.
    #[error("Unknown switch: {0}")]
    UnknownSwitch(SwitchId),

    /// A rule install or packet-out could not be delivered.
    #[error("Install error: {0}")]
    Install(#[from] InstallError),

    /// Invalid configuration; fatal at startup.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ControllerError {
    /// True for errors that only affect a single event.
    pub fn is_per_packet(&self) -> bool {
        matches!(
            self,
            Self::MalformedPacket(_) | Self::UnknownSwitch(_) | Self::Install(_)
        )
    }
}

/// Result type alias for controller operations.
pub type Result<T> = std::result::Result<T, ControllerError>;

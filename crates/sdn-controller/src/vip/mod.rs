//! Virtual Service Directory - virtual IPs fronting pools of backends.
//!
//! Each service owns its round-robin cursor. Selection is an atomic
//! increment, so it stays fair when packet-ins from several switches race.

mod directory;
mod types;

pub use directory::VirtualServiceDirectory;
pub use types::{Backend, VirtualService, VirtualServiceError};

//! Address Learning Store - per-switch MAC to ingress-port table.
//!
//! Entries are created or overwritten on every frame observed with a given
//! source MAC. They never expire: the most recently observed port wins.

mod store;

pub use store::{AddressLearningStore, FdbStats, LearnOutcome};

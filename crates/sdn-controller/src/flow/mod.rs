//! Flow Table Client - installs forwarding rules and emits packets on switches.
//!
//! Every policy goes through [`FlowTableClient`]; nothing else talks to a
//! switch. Rules are identified by (switch, match, priority) and a repeated
//! install overwrites the previous rule with that identity.

mod client;
mod types;

pub use client::{
    FlowTableClient, FlowTableStats, InstallAck, InstallError, MpscSwitchChannel,
    RecordingSwitchChannel, SwitchChannel,
};
pub use types::{
    format_actions, priority, FlowAction, FlowMatch, FlowRule, PacketOut, Priority, RuleKey,
    SwitchMessage,
};

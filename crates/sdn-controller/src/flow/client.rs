//! Flow Table Client: the single rule-install primitive used by all policies.

use dashmap::DashMap;
use parking_lot::Mutex;
use sdn_types::{BufferId, SwitchId};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::types::{FlowAction, FlowMatch, FlowRule, PacketOut, Priority, RuleKey, SwitchMessage};

/// Failure to deliver a message to a switch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstallError {
    #[error("switch {0} is not connected")]
    UnknownSwitch(SwitchId),

    #[error("channel to switch {0} is closed")]
    ChannelClosed(SwitchId),
}

/// Outbound half of the secure channel to one switch.
///
/// Implemented by the external protocol stack. Sends are fire-and-forget:
/// they enqueue the message and return without awaiting an acknowledgment,
/// and messages sent through one channel reach the switch in send order.
pub trait SwitchChannel: Send + Sync + fmt::Debug {
    fn send_flow_mod(&self, rule: FlowRule) -> Result<(), InstallError>;

    fn send_packet_out(&self, packet_out: PacketOut) -> Result<(), InstallError>;
}

/// [`SwitchChannel`] backed by an unbounded tokio channel of [`SwitchMessage`]s.
#[derive(Debug, Clone)]
pub struct MpscSwitchChannel {
    switch: SwitchId,
    tx: mpsc::UnboundedSender<SwitchMessage>,
}

impl MpscSwitchChannel {
    pub fn new(switch: SwitchId, tx: mpsc::UnboundedSender<SwitchMessage>) -> Self {
        Self { switch, tx }
    }

    fn send(&self, msg: SwitchMessage) -> Result<(), InstallError> {
        self.tx
            .send(msg)
            .map_err(|_| InstallError::ChannelClosed(self.switch))
    }
}

impl SwitchChannel for MpscSwitchChannel {
    fn send_flow_mod(&self, rule: FlowRule) -> Result<(), InstallError> {
        self.send(SwitchMessage::FlowMod(rule))
    }

    fn send_packet_out(&self, packet_out: PacketOut) -> Result<(), InstallError> {
        self.send(SwitchMessage::PacketOut(packet_out))
    }
}

/// [`SwitchChannel`] that keeps every message in memory, in send order.
///
/// Clones share the same log. Can be closed to simulate a lost connection.
#[derive(Debug, Clone)]
pub struct RecordingSwitchChannel {
    switch: SwitchId,
    log: Arc<Mutex<Vec<SwitchMessage>>>,
    closed: Arc<AtomicBool>,
}

impl RecordingSwitchChannel {
    pub fn new(switch: SwitchId) -> Self {
        Self {
            switch,
            log: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Removes and returns everything recorded so far.
    pub fn take(&self) -> Vec<SwitchMessage> {
        std::mem::take(&mut *self.log.lock())
    }

    pub fn messages(&self) -> Vec<SwitchMessage> {
        self.log.lock().clone()
    }

    pub fn flow_mods(&self) -> Vec<FlowRule> {
        self.log
            .lock()
            .iter()
            .filter_map(|m| match m {
                SwitchMessage::FlowMod(rule) => Some(rule.clone()),
                SwitchMessage::PacketOut(_) => None,
            })
            .collect()
    }

    pub fn packet_outs(&self) -> Vec<PacketOut> {
        self.log
            .lock()
            .iter()
            .filter_map(|m| match m {
                SwitchMessage::PacketOut(out) => Some(out.clone()),
                SwitchMessage::FlowMod(_) => None,
            })
            .collect()
    }

    /// Makes every further send fail with [`InstallError::ChannelClosed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }

    fn record(&self, msg: SwitchMessage) -> Result<(), InstallError> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(InstallError::ChannelClosed(self.switch));
        }
        self.log.lock().push(msg);
        Ok(())
    }
}

impl SwitchChannel for RecordingSwitchChannel {
    fn send_flow_mod(&self, rule: FlowRule) -> Result<(), InstallError> {
        self.record(SwitchMessage::FlowMod(rule))
    }

    fn send_packet_out(&self, packet_out: PacketOut) -> Result<(), InstallError> {
        self.record(SwitchMessage::PacketOut(packet_out))
    }
}

/// Acknowledgment of a successful rule installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallAck {
    /// True if a rule with the same (match, priority) was overwritten.
    pub replaced: bool,
}

#[derive(Debug, Default)]
pub struct FlowTableStats {
    pub rules_installed: AtomicU64,
    pub rules_replaced: AtomicU64,
    pub packet_outs: AtomicU64,
    pub send_failures: AtomicU64,
}

/// Owns the switch connection table and the per-switch record of installed
/// rules.
///
/// Installing the same (switch, match, priority) twice replaces the prior
/// rule: the bookkeeping is keyed exactly as the switch keys its flow table,
/// so it never accumulates duplicates. Failures are reported, never retried.
#[derive(Debug, Default)]
pub struct FlowTableClient {
    connections: DashMap<SwitchId, Arc<dyn SwitchChannel>>,
    installed: DashMap<SwitchId, HashMap<RuleKey, FlowRule>>,
    stats: FlowTableStats,
}

impl FlowTableClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a switch connection, replacing any previous channel.
    pub fn connect(&self, switch: SwitchId, channel: Arc<dyn SwitchChannel>) {
        if self.connections.insert(switch, channel).is_some() {
            info!(%switch, "Switch reconnected, flow bookkeeping reset");
        }
        self.installed.insert(switch, HashMap::new());
    }

    /// Forgets a switch; its installed-rule bookkeeping goes with it.
    pub fn disconnect(&self, switch: SwitchId) -> bool {
        self.installed.remove(&switch);
        self.connections.remove(&switch).is_some()
    }

    pub fn is_connected(&self, switch: SwitchId) -> bool {
        self.connections.contains_key(&switch)
    }

    pub fn connected_switches(&self) -> Vec<SwitchId> {
        let mut switches: Vec<_> = self.connections.iter().map(|e| *e.key()).collect();
        switches.sort();
        switches
    }

    fn channel(&self, switch: SwitchId) -> Result<Arc<dyn SwitchChannel>, InstallError> {
        self.connections
            .get(&switch)
            .map(|c| Arc::clone(c.value()))
            .ok_or(InstallError::UnknownSwitch(switch))
    }

    /// Installs `flow_match -> actions` at `priority` on `switch`.
    ///
    /// When `buffer_id` is given the switch applies the new rule to the
    /// buffered packet as well, so no separate packet-out is needed.
    pub fn install_rule(
        &self,
        switch: SwitchId,
        priority: Priority,
        flow_match: FlowMatch,
        actions: Vec<FlowAction>,
        buffer_id: Option<BufferId>,
    ) -> Result<InstallAck, InstallError> {
        let channel = self.channel(switch)?;
        let rule = FlowRule {
            switch,
            priority,
            flow_match,
            actions,
            buffer_id,
        };

        debug!(%rule, "Installing flow rule");
        if let Err(e) = channel.send_flow_mod(rule.clone()) {
            self.stats.send_failures.fetch_add(1, Ordering::Relaxed);
            return Err(e);
        }

        // A disconnect may have raced the send; its bookkeeping stays gone.
        let replaced = match self.installed.get_mut(&switch) {
            Some(mut table) => table.insert(rule.key(), rule).is_some(),
            None => false,
        };

        self.stats.rules_installed.fetch_add(1, Ordering::Relaxed);
        if replaced {
            self.stats.rules_replaced.fetch_add(1, Ordering::Relaxed);
        }
        Ok(InstallAck { replaced })
    }

    pub fn send_packet_out(&self, packet_out: PacketOut) -> Result<(), InstallError> {
        let channel = self.channel(packet_out.switch)?;
        match channel.send_packet_out(packet_out) {
            Ok(()) => {
                self.stats.packet_outs.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.stats.send_failures.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Returns the active rule for (match, priority) on a switch, if any.
    pub fn lookup(
        &self,
        switch: SwitchId,
        priority: Priority,
        flow_match: &FlowMatch,
    ) -> Option<FlowRule> {
        let key = RuleKey {
            priority,
            flow_match: flow_match.clone(),
        };
        self.installed
            .get(&switch)
            .and_then(|rules| rules.get(&key).cloned())
    }

    /// Snapshot of all rules on a switch, highest priority first.
    pub fn installed_rules(&self, switch: SwitchId) -> Vec<FlowRule> {
        let mut rules: Vec<FlowRule> = self
            .installed
            .get(&switch)
            .map(|r| r.values().cloned().collect())
            .unwrap_or_default();
        rules.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.flow_match.to_string().cmp(&b.flow_match.to_string()))
        });
        rules
    }

    pub fn rule_count(&self, switch: SwitchId) -> usize {
        self.installed.get(&switch).map(|r| r.len()).unwrap_or(0)
    }

    pub fn stats(&self) -> &FlowTableStats {
        &self.stats
    }
}

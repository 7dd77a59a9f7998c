//! The packet-in decision function.

use sdn_types::{BufferId, Ipv4Address, MacAddress, PortNumber, SwitchId};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, trace};

use super::types::{Decision, PacketIn, PacketInReason, SwitchFeatures};
use crate::acl::{FirewallRule, FirewallTable};
use crate::error::{ControllerError, Result};
use crate::fdb::AddressLearningStore;
use crate::flow::{
    priority, FlowAction, FlowMatch, FlowTableClient, InstallError, PacketOut, SwitchChannel,
};
use crate::monitor::PacketMonitor;
use crate::packet::{build_arp_reply, parse_frame, ArpHeader, Ipv4Header, ParsedFrame, Payload};
use crate::vip::{Backend, VirtualServiceDirectory};

#[derive(Debug, Default)]
pub struct EngineStats {
    pub packets_handled: AtomicU64,
    pub floods: AtomicU64,
    pub unicast_rules: AtomicU64,
    pub drops: AtomicU64,
    pub arp_replies: AtomicU64,
    pub vip_flows: AtomicU64,
    pub malformed: AtomicU64,
    pub install_failures: AtomicU64,
}

/// Point-in-time copy of [`EngineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStatsSnapshot {
    pub packets_handled: u64,
    pub floods: u64,
    pub unicast_rules: u64,
    pub drops: u64,
    pub arp_replies: u64,
    pub vip_flows: u64,
    pub malformed: u64,
    pub install_failures: u64,
}

impl EngineStats {
    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            packets_handled: self.packets_handled.load(Ordering::Relaxed),
            floods: self.floods.load(Ordering::Relaxed),
            unicast_rules: self.unicast_rules.load(Ordering::Relaxed),
            drops: self.drops.load(Ordering::Relaxed),
            arp_replies: self.arp_replies.load(Ordering::Relaxed),
            vip_flows: self.vip_flows.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            install_failures: self.install_failures.load(Ordering::Relaxed),
        }
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Policy engine options beyond the static tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineOptions {
    /// Install every firewall pair as a drop rule when a switch connects.
    pub proactive_firewall: bool,
}

/// Decides the fate of every packet-in and synthesizes the rules that keep
/// the rest of the flow off the controller.
///
/// All state is owned here and shared across switch workers through `&self`:
/// learning is sharded per switch, the round-robin cursors are atomic, and
/// the firewall and service tables are read-only.
#[derive(Debug)]
pub struct PolicyEngine {
    client: Arc<FlowTableClient>,
    learning: AddressLearningStore,
    firewall: FirewallTable,
    services: VirtualServiceDirectory,
    monitor: PacketMonitor,
    options: EngineOptions,
    stats: EngineStats,
}

impl PolicyEngine {
    pub fn new(
        firewall: FirewallTable,
        services: VirtualServiceDirectory,
        monitor: PacketMonitor,
        options: EngineOptions,
    ) -> Self {
        Self {
            client: Arc::new(FlowTableClient::new()),
            learning: AddressLearningStore::new(),
            firewall,
            services,
            monitor,
            options,
            stats: EngineStats::default(),
        }
    }

    /// A plain learning switch: no firewall, no services, no monitoring.
    pub fn learning_switch() -> Self {
        Self::new(
            FirewallTable::default(),
            VirtualServiceDirectory::default(),
            PacketMonitor::default(),
            EngineOptions::default(),
        )
    }

    /// Registers the switch and installs its table-miss rule, plus the
    /// firewall drop rules when proactive installation is enabled.
    #[instrument(skip_all, fields(switch = %switch))]
    pub fn on_switch_connected(
        &self,
        switch: SwitchId,
        features: SwitchFeatures,
        channel: Arc<dyn SwitchChannel>,
    ) -> std::result::Result<(), InstallError> {
        self.client.connect(switch, channel);
        info!(
            n_buffers = features.n_buffers,
            n_tables = features.n_tables,
            "Switch connected"
        );

        self.client.install_rule(
            switch,
            priority::TABLE_MISS,
            FlowMatch::any(),
            vec![FlowAction::to_controller()],
            None,
        )?;

        if self.options.proactive_firewall {
            for rule in self.firewall.rules() {
                self.install_drop(switch, rule, None)?;
            }
            debug!(count = self.firewall.len(), "Installed firewall rules");
        }
        Ok(())
    }

    /// Forgets the switch connection. Learned addresses are kept.
    pub fn on_switch_disconnected(&self, switch: SwitchId) -> bool {
        let known = self.client.disconnect(switch);
        if known {
            info!(%switch, "Switch disconnected");
        }
        known
    }

    /// Handles one packet-in to completion.
    ///
    /// Errors are per-packet: the frame is dropped and nothing is retried.
    #[instrument(skip(self, pkt), fields(switch = %pkt.switch, in_port = %pkt.in_port))]
    pub fn handle_packet_in(&self, pkt: &PacketIn) -> Result<Decision> {
        if !self.client.is_connected(pkt.switch) {
            return Err(ControllerError::UnknownSwitch(pkt.switch));
        }

        let frame = match parse_frame(&pkt.data) {
            Ok(frame) => frame,
            Err(e) => {
                bump(&self.stats.malformed);
                trace!(error = %e, "Discarding malformed frame");
                return Err(e.into());
            }
        };
        bump(&self.stats.packets_handled);

        if frame.payload == Payload::Lldp {
            return Ok(Decision::Suppressed);
        }

        self.monitor.observe(pkt.switch, frame.src());
        if pkt.reason == PacketInReason::Action {
            return Ok(Decision::Counted);
        }

        let result = self.decide(pkt, &frame);
        match &result {
            Ok(decision) => {
                debug!(src = %frame.src(), dst = %frame.dst(), kind = frame.payload.kind(), %decision, "Packet handled");
            }
            Err(ControllerError::Install(_)) => bump(&self.stats.install_failures),
            Err(_) => {}
        }
        result
    }

    fn decide(&self, pkt: &PacketIn, frame: &ParsedFrame) -> Result<Decision> {
        let (src, dst) = (frame.src(), frame.dst());

        if self.firewall.is_blocked(src, dst) {
            let rule = FirewallRule::new(src, dst);
            self.install_drop(pkt.switch, rule, pkt.buffer_id)?;
            bump(&self.stats.drops);
            return Ok(Decision::Blocked(rule));
        }

        // Multicast sources are bogus; learning them would let a unicast rule
        // capture broadcast traffic.
        if src.is_unicast() {
            self.learning.learn(pkt.switch, src, pkt.in_port);
        }

        match &frame.payload {
            Payload::Arp(arp) if arp.is_request() && self.services.is_virtual_ip(arp.target_ip) => {
                self.answer_virtual_arp(pkt, arp)
            }
            Payload::Ipv4(ip) if self.services.is_virtual_ip(ip.dst) => {
                self.forward_to_backend(pkt, frame, ip)
            }
            _ => self.forward_learned(pkt, src, dst),
        }
    }

    fn install_drop(
        &self,
        switch: SwitchId,
        rule: FirewallRule,
        buffer_id: Option<BufferId>,
    ) -> std::result::Result<(), InstallError> {
        self.client
            .install_rule(
                switch,
                priority::FIREWALL_DROP,
                FlowMatch::any().eth_src(rule.src).eth_dst(rule.dst),
                Vec::new(),
                buffer_id,
            )
            .map(|_| ())
    }

    /// Replies to an ARP request for a virtual IP on behalf of a backend.
    ///
    /// A backend asking for its own service's address is answered with its
    /// own MAC; any other requester advances the round-robin cursor.
    fn answer_virtual_arp(&self, pkt: &PacketIn, arp: &ArpHeader) -> Result<Decision> {
        let virtual_ip = arp.target_ip;
        let own = self
            .services
            .resolve_service_by_mac(arp.sender_mac)
            .filter(|(vip, b)| *vip == virtual_ip && b.ip == arp.sender_ip)
            .map(|(_, b)| b);
        let backend = match own.or_else(|| self.services.select_backend(virtual_ip)) {
            Some(b) => b,
            None => return Ok(Decision::Flood),
        };

        let reply = build_arp_reply(arp.sender_mac, arp.sender_ip, backend.mac, virtual_ip);
        self.client.send_packet_out(PacketOut {
            switch: pkt.switch,
            buffer_id: None,
            in_port: pkt.in_port,
            actions: vec![FlowAction::Output(PortNumber::IN_PORT)],
            data: Some(reply),
        })?;

        bump(&self.stats.arp_replies);
        Ok(Decision::ArpReply {
            virtual_ip,
            backend,
        })
    }

    /// Binds a client to a backend and installs both directions of the
    /// rewrite before releasing the packet.
    fn forward_to_backend(
        &self,
        pkt: &PacketIn,
        frame: &ParsedFrame,
        ip: &Ipv4Header,
    ) -> Result<Decision> {
        let virtual_ip = ip.dst;
        let client_mac = frame.src();
        let client_ip = ip.src;

        let backend = match self.bind_backend(virtual_ip, frame.dst()) {
            Some(b) => b,
            None => return Ok(Decision::Flood),
        };

        let rewrite = vec![
            FlowAction::SetEthDst(backend.mac),
            FlowAction::SetIpv4Dst(backend.ip),
        ];
        let out_port = self.backend_port(pkt.switch, &backend);

        let out_port = match out_port {
            Some(port) if port == pkt.in_port => {
                bump(&self.stats.drops);
                return Ok(Decision::Hairpin);
            }
            Some(port) => port,
            None => {
                let mut actions = rewrite;
                actions.push(FlowAction::flood());
                self.client.send_packet_out(PacketOut::release(
                    pkt.switch,
                    pkt.in_port,
                    pkt.buffer_id,
                    &pkt.data,
                    actions,
                ))?;
                bump(&self.stats.floods);
                return Ok(Decision::VirtualService {
                    virtual_ip,
                    backend,
                    out_port: None,
                });
            }
        };

        let mut forward = rewrite;
        forward.push(FlowAction::Output(out_port));
        self.client.install_rule(
            pkt.switch,
            priority::VIRTUAL_SERVICE,
            FlowMatch::any()
                .in_port(pkt.in_port)
                .ipv4_src(client_ip)
                .ipv4_dst(virtual_ip),
            forward.clone(),
            None,
        )?;

        self.client.install_rule(
            pkt.switch,
            priority::VIRTUAL_SERVICE,
            FlowMatch::any()
                .in_port(out_port)
                .eth_dst(client_mac)
                .ipv4_src(backend.ip)
                .ipv4_dst(client_ip),
            vec![
                FlowAction::SetIpv4Src(virtual_ip),
                FlowAction::Output(pkt.in_port),
            ],
            None,
        )?;

        self.client.send_packet_out(PacketOut::release(
            pkt.switch,
            pkt.in_port,
            pkt.buffer_id,
            &pkt.data,
            forward,
        ))?;

        bump(&self.stats.vip_flows);
        Ok(Decision::VirtualService {
            virtual_ip,
            backend,
            out_port: Some(out_port),
        })
    }

    /// Reuses the backend the client already addressed (the MAC from our ARP
    /// reply); otherwise selects the next one.
    fn bind_backend(&self, virtual_ip: Ipv4Address, dst: MacAddress) -> Option<Backend> {
        match self.services.resolve_service_by_mac(dst) {
            Some((vip, backend)) if vip == virtual_ip => Some(backend),
            _ => self.services.select_backend(virtual_ip),
        }
    }

    fn backend_port(&self, switch: SwitchId, backend: &Backend) -> Option<PortNumber> {
        if backend.switch == switch {
            Some(backend.port)
        } else {
            self.learning.lookup(switch, backend.mac)
        }
    }

    /// Plain learning-switch forwarding.
    fn forward_learned(&self, pkt: &PacketIn, src: MacAddress, dst: MacAddress) -> Result<Decision> {
        let out_port = match self.learning.lookup(pkt.switch, dst) {
            Some(port) => port,
            None => {
                self.client.send_packet_out(PacketOut::release(
                    pkt.switch,
                    pkt.in_port,
                    pkt.buffer_id,
                    &pkt.data,
                    vec![FlowAction::flood()],
                ))?;
                bump(&self.stats.floods);
                return Ok(Decision::Flood);
            }
        };

        if out_port == pkt.in_port {
            bump(&self.stats.drops);
            return Ok(Decision::Hairpin);
        }

        let flow_match = FlowMatch::any()
            .in_port(pkt.in_port)
            .eth_src(src)
            .eth_dst(dst);
        let output = vec![FlowAction::Output(out_port)];

        if self.monitor.is_watched(src) {
            // The switch would apply the copy-to-controller action to a
            // buffered packet too, counting it twice; release it separately.
            let mut actions = output.clone();
            actions.push(FlowAction::to_controller());
            self.client.install_rule(
                pkt.switch,
                priority::LEARNED_UNICAST,
                flow_match,
                actions,
                None,
            )?;
            self.client.send_packet_out(PacketOut::release(
                pkt.switch,
                pkt.in_port,
                pkt.buffer_id,
                &pkt.data,
                output,
            ))?;
        } else if pkt.buffer_id.is_some() {
            self.client.install_rule(
                pkt.switch,
                priority::LEARNED_UNICAST,
                flow_match,
                output,
                pkt.buffer_id,
            )?;
        } else {
            self.client.install_rule(
                pkt.switch,
                priority::LEARNED_UNICAST,
                flow_match,
                output.clone(),
                None,
            )?;
            self.client.send_packet_out(PacketOut::release(
                pkt.switch,
                pkt.in_port,
                None,
                &pkt.data,
                output,
            ))?;
        }

        bump(&self.stats.unicast_rules);
        Ok(Decision::Unicast { out_port })
    }

    pub fn client(&self) -> &Arc<FlowTableClient> {
        &self.client
    }

    pub fn learning(&self) -> &AddressLearningStore {
        &self.learning
    }

    pub fn firewall(&self) -> &FirewallTable {
        &self.firewall
    }

    pub fn services(&self) -> &VirtualServiceDirectory {
        &self.services
    }

    pub fn monitor(&self) -> &PacketMonitor {
        &self.monitor
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }
}

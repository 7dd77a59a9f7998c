//! Controller event loop: fans switch events out to per-switch workers.

use sdn_types::SwitchId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::ControllerError;
use crate::flow::SwitchChannel;
use crate::policy::{EngineStatsSnapshot, PacketIn, PolicyEngine, SwitchFeatures};

/// An asynchronous event from the protocol stack.
pub enum ControllerEvent {
    SwitchConnected {
        switch: SwitchId,
        features: SwitchFeatures,
        channel: Arc<dyn SwitchChannel>,
    },
    SwitchDisconnected {
        switch: SwitchId,
    },
    PacketIn(PacketIn),
}

impl ControllerEvent {
    pub fn switch(&self) -> SwitchId {
        match self {
            Self::SwitchConnected { switch, .. } | Self::SwitchDisconnected { switch } => *switch,
            Self::PacketIn(pkt) => pkt.switch,
        }
    }
}

impl fmt::Debug for ControllerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SwitchConnected {
                switch, features, ..
            } => f
                .debug_struct("SwitchConnected")
                .field("switch", switch)
                .field("features", features)
                .finish_non_exhaustive(),
            Self::SwitchDisconnected { switch } => f
                .debug_struct("SwitchDisconnected")
                .field("switch", switch)
                .finish(),
            Self::PacketIn(pkt) => f.debug_tuple("PacketIn").field(pkt).finish(),
        }
    }
}

/// Applies one event to the engine, containing per-packet errors.
pub fn dispatch(engine: &PolicyEngine, event: ControllerEvent) {
    match event {
        ControllerEvent::SwitchConnected {
            switch,
            features,
            channel,
        } => {
            if let Err(e) = engine.on_switch_connected(switch, features, channel) {
                warn!(%switch, error = %e, "Failed to initialise switch");
            }
        }
        ControllerEvent::SwitchDisconnected { switch } => {
            if !engine.on_switch_disconnected(switch) {
                debug!(%switch, "Disconnect for unknown switch");
            }
        }
        ControllerEvent::PacketIn(pkt) => match engine.handle_packet_in(&pkt) {
            Ok(_) => {}
            Err(ControllerError::MalformedPacket(e)) => {
                trace!(switch = %pkt.switch, error = %e, "Malformed packet discarded");
            }
            Err(e) => {
                warn!(switch = %pkt.switch, in_port = %pkt.in_port, error = %e, "Packet dropped");
            }
        },
    }
}

struct Worker {
    tx: mpsc::Sender<ControllerEvent>,
    handle: JoinHandle<()>,
}

/// Drives a [`PolicyEngine`] from a stream of [`ControllerEvent`]s.
///
/// Each switch gets its own worker task and bounded queue: switches are
/// handled concurrently while one switch's events are applied strictly in
/// arrival order. A worker outlives disconnects so a quick reconnect cannot
/// overtake the disconnect that preceded it.
pub struct Controller {
    engine: Arc<PolicyEngine>,
    queue_depth: usize,
}

impl Controller {
    pub fn new(engine: Arc<PolicyEngine>, queue_depth: usize) -> Self {
        Self {
            engine,
            queue_depth: queue_depth.max(1),
        }
    }

    pub fn engine(&self) -> &Arc<PolicyEngine> {
        &self.engine
    }

    /// Runs until `events` is closed and every worker has drained.
    pub async fn run(self, mut events: mpsc::Receiver<ControllerEvent>) -> EngineStatsSnapshot {
        let mut workers: HashMap<SwitchId, Worker> = HashMap::new();

        while let Some(event) = events.recv().await {
            let switch = event.switch();

            if !workers.contains_key(&switch) {
                if !matches!(event, ControllerEvent::SwitchConnected { .. }) {
                    // Nothing to order against; the engine reports the
                    // unknown switch.
                    dispatch(&self.engine, event);
                    continue;
                }
                workers.insert(switch, self.spawn_worker(switch));
            }

            let Some(worker) = workers.get(&switch) else {
                continue;
            };
            if let Err(mpsc::error::SendError(event)) = worker.tx.send(event).await {
                warn!(%switch, "Worker exited, handling event inline");
                dispatch(&self.engine, event);
            }
        }

        info!(switches = workers.len(), "Event stream closed, draining workers");
        for (switch, worker) in workers {
            drop(worker.tx);
            if let Err(e) = worker.handle.await {
                warn!(%switch, error = %e, "Worker task failed");
            }
        }

        self.engine.stats().snapshot()
    }

    fn spawn_worker(&self, switch: SwitchId) -> Worker {
        let (tx, mut rx) = mpsc::channel::<ControllerEvent>(self.queue_depth);
        let engine = Arc::clone(&self.engine);
        let handle = tokio::spawn(async move {
            debug!(%switch, "Worker started");
            while let Some(event) = rx.recv().await {
                dispatch(&engine, event);
            }
            debug!(%switch, "Worker stopped");
        });
        Worker { tx, handle }
    }
}

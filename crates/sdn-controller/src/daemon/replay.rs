//! JSON-lines front end: reads switch events, writes switch messages.
//!
//! Input, one event per line (blank lines and `#` comments are skipped):
//!
//! ```text
//! {"event":"switch_connected","switch":1}
//! {"event":"packet_in","switch":1,"in_port":1,"data":"ffffffffffff0000..."}
//! {"event":"switch_disconnected","switch":1}
//! ```
//!
//! Every flow-mod and packet-out the controller emits is written as one JSON
//! object per line.

use sdn_types::SwitchId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::controller::{Controller, ControllerEvent};
use crate::error::Result;
use crate::flow::{MpscSwitchChannel, SwitchMessage};
use crate::policy::{EngineStatsSnapshot, PacketIn, PolicyEngine, SwitchFeatures};

/// One line of replay input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ReplayEvent {
    SwitchConnected {
        switch: SwitchId,
        #[serde(default)]
        features: SwitchFeatures,
    },
    SwitchDisconnected {
        switch: SwitchId,
    },
    PacketIn(PacketIn),
}

/// Summary of a replay run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub events: u64,
    pub skipped_lines: u64,
    pub messages: u64,
    pub engine: EngineStatsSnapshot,
}

/// Replays `input` through a controller built around `engine`, writing the
/// resulting switch messages to `output`.
pub async fn run_replay<R, W>(
    engine: Arc<PolicyEngine>,
    queue_depth: usize,
    input: R,
    mut output: W,
) -> Result<ReplayReport>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (event_tx, event_rx) = mpsc::channel(queue_depth.max(1));
    let (msg_tx, mut msg_rx) = mpsc::unbounded_channel::<SwitchMessage>();

    let controller = tokio::spawn(Controller::new(Arc::clone(&engine), queue_depth).run(event_rx));

    let writer = tokio::spawn(async move {
        let mut written = 0u64;
        while let Some(msg) = msg_rx.recv().await {
            let mut line = serde_json::to_vec(&msg).map_err(std::io::Error::from)?;
            line.push(b'\n');
            output.write_all(&line).await?;
            written += 1;
        }
        output.flush().await?;
        Ok::<u64, std::io::Error>(written)
    });

    let mut report = ReplayReport::default();
    let mut lines = input.lines();
    let mut line_no = 0u64;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let event = match serde_json::from_str::<ReplayEvent>(trimmed) {
            Ok(event) => event,
            Err(e) => {
                warn!(line = line_no, error = %e, "Skipping unparsable event");
                report.skipped_lines += 1;
                continue;
            }
        };
        debug!(line = line_no, ?event, "Replaying event");

        let event = match event {
            ReplayEvent::SwitchConnected { switch, features } => ControllerEvent::SwitchConnected {
                switch,
                features,
                channel: Arc::new(MpscSwitchChannel::new(switch, msg_tx.clone())),
            },
            ReplayEvent::SwitchDisconnected { switch } => {
                ControllerEvent::SwitchDisconnected { switch }
            }
            ReplayEvent::PacketIn(pkt) => ControllerEvent::PacketIn(pkt),
        };
        report.events += 1;
        if event_tx.send(event).await.is_err() {
            warn!("Controller stopped early");
            break;
        }
    }

    drop(event_tx);
    report.engine = controller
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    // Switches still connected hold message senders; release them so the
    // writer can finish.
    for switch in engine.client().connected_switches() {
        engine.on_switch_disconnected(switch);
    }
    drop(msg_tx);

    report.messages = writer
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))??;

    info!(
        events = report.events,
        skipped = report.skipped_lines,
        messages = report.messages,
        "Replay complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sdn_types::PortNumber;

    #[test]
    fn test_parse_events() {
        let connected: ReplayEvent =
            serde_json::from_str(r#"{"event":"switch_connected","switch":1}"#).unwrap();
        assert_eq!(
            connected,
            ReplayEvent::SwitchConnected {
                switch: SwitchId::new(1),
                features: SwitchFeatures::default()
            }
        );

        let pkt: ReplayEvent = serde_json::from_str(
            r#"{"event":"packet_in","switch":1,"in_port":2,"buffer_id":7,"data":"0000000000020000000000019000"}"#,
        )
        .unwrap();
        match pkt {
            ReplayEvent::PacketIn(p) => {
                assert_eq!(p.in_port, PortNumber::new(2));
                assert_eq!(p.buffer_id.map(|b| b.as_u32()), Some(7));
                assert_eq!(p.data.len(), 14);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_replay_writes_messages() {
        let input = concat!(
            "# two hosts on one switch\n",
            "{\"event\":\"switch_connected\",\"switch\":1}\n",
            "\n",
            "{\"event\":\"packet_in\",\"switch\":1,\"in_port\":1,\"data\":\"0000000000020000000000019000\"}\n",
            "not json\n",
        );
        let engine = Arc::new(PolicyEngine::learning_switch());
        let (client, mut server) = tokio::io::duplex(64 * 1024);

        let report = run_replay(Arc::clone(&engine), 8, input.as_bytes(), client)
            .await
            .unwrap();
        assert_eq!(report.events, 2);
        assert_eq!(report.skipped_lines, 1);
        assert_eq!(report.messages, 2);

        let mut out = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut server, &mut out)
            .await
            .unwrap();
        let lines: Vec<serde_json::Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines[0]["message"], "flow_mod");
        assert_eq!(lines[1]["message"], "packet_out");
        assert_eq!(lines[1]["actions"][0]["value"], u64::from(PortNumber::FLOOD.as_u32()));
    }

    #[tokio::test]
    async fn test_no_buffer_marker_releases_frame_bytes() {
        // Host 1 floods towards 2, host 2 answers; both unbuffered.
        let input = concat!(
            "{\"event\":\"switch_connected\",\"switch\":1}\n",
            "{\"event\":\"packet_in\",\"switch\":1,\"in_port\":1,\"buffer_id\":4294967295,\"data\":\"0000000000020000000000019000\"}\n",
            "{\"event\":\"packet_in\",\"switch\":1,\"in_port\":2,\"buffer_id\":4294967295,\"data\":\"0000000000010000000000029000\"}\n",
        );
        let engine = Arc::new(PolicyEngine::learning_switch());
        let (client, mut server) = tokio::io::duplex(64 * 1024);

        let report = run_replay(Arc::clone(&engine), 8, input.as_bytes(), client)
            .await
            .unwrap();
        assert_eq!(report.skipped_lines, 0);
        assert_eq!(report.engine.floods, 1);
        assert_eq!(report.engine.unicast_rules, 1);

        let mut out = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut server, &mut out)
            .await
            .unwrap();
        let msgs: Vec<SwitchMessage> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        // table-miss, flood, unicast rule, unicast release
        assert_eq!(msgs.len(), 4);
        let outs: Vec<_> = msgs
            .iter()
            .filter_map(|m| match m {
                SwitchMessage::PacketOut(out) => Some(out.clone()),
                SwitchMessage::FlowMod(_) => None,
            })
            .collect();
        assert_eq!(outs.len(), 2);
        assert_eq!(outs[0].buffer_id, None);
        assert_eq!(
            outs[0].data.as_deref(),
            Some(&hex::decode("0000000000020000000000019000").unwrap()[..])
        );
        assert_eq!(outs[1].buffer_id, None);
        assert_eq!(
            outs[1].data.as_deref(),
            Some(&hex::decode("0000000000010000000000029000").unwrap()[..])
        );
        assert!(msgs.iter().all(|m| match m {
            SwitchMessage::FlowMod(rule) => rule.buffer_id.is_none(),
            SwitchMessage::PacketOut(_) => true,
        }));
    }

    #[test]
    fn test_no_buffer_marker_parses_as_unbuffered() {
        let event: ReplayEvent = serde_json::from_str(
            r#"{"event":"packet_in","switch":1,"in_port":1,"buffer_id":4294967295,"data":"0000000000020000000000019000"}"#,
        )
        .unwrap();
        match event {
            ReplayEvent::PacketIn(p) => assert_eq!(p.buffer_id, None),
            other => panic!("unexpected {:?}", other),
        }
    }
}

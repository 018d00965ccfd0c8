//! Line-delimited JSON bus on stdio.
//!
//! stdin carries [`HostCommand`]s, stdout carries [`HostEvent`]s, one JSON
//! object per line.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use zb_bridge::{Bridge, BusMessage, ChannelInfo, InboundMessage, OutboundMessage};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostCommand {
    Join(ChannelInfo),
    Message(BusMessage),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    Inbound(InboundMessage),
    Sent { channel: String, remote_id: String },
    Failed { channel: String, error: String },
}

/// Forwards adapter output to the event writer until the adapter drops its sender.
pub async fn forward_inbound(
    mut rx: mpsc::Receiver<InboundMessage>,
    events: mpsc::Sender<HostEvent>,
) {
    while let Some(message) = rx.recv().await {
        if events.send(HostEvent::Inbound(message)).await.is_err() {
            break;
        }
    }
}

pub async fn write_events<W>(
    mut rx: mpsc::Receiver<HostEvent>,
    mut writer: W,
) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(event) = rx.recv().await {
        let mut line = serde_json::to_string(&event)?;
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}

/// Applies commands from `reader` until EOF or shutdown.
pub async fn read_commands<R>(
    bridge: &dyn Bridge,
    reader: R,
    events: &mpsc::Sender<HostEvent>,
    shutdown: &CancellationToken,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            tracing::info!("bus input closed");
            return Ok(());
        };
        if line.trim().is_empty() {
            continue;
        }

        let command: HostCommand = match serde_json::from_str(&line) {
            Ok(command) => command,
            Err(error) => {
                tracing::warn!(%error, "dropping unparseable bus line");
                continue;
            }
        };
        if let Some(event) = apply(bridge, command).await {
            if events.send(event).await.is_err() {
                return Ok(());
            }
        }
    }
}

async fn apply(bridge: &dyn Bridge, command: HostCommand) -> Option<HostEvent> {
    match command {
        HostCommand::Join(channel) => {
            if let Err(error) = bridge.join_channel(channel.clone()).await {
                tracing::warn!(%error, channel = %channel.name, "join failed");
            }
            None
        }
        HostCommand::Message(message) => {
            let channel = message.channel.clone();
            match bridge.send(OutboundMessage::from(message)).await {
                Ok(remote_id) => Some(HostEvent::Sent { channel, remote_id }),
                Err(error) => {
                    tracing::warn!(%error, channel = %channel, "outbound message failed");
                    Some(HostEvent::Failed {
                        channel,
                        error: error.to_string(),
                    })
                }
            }
        }
    }
}

use crate::config::BridgeConfig;
use crate::host;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use zb_api::ZulipApi;
use zb_bridge::{Bridge, InlineStaging, OutboundMessage, Post, ZulipBridge};

const INBOUND_QUEUE_CAPACITY: usize = 256;
const EVENT_QUEUE_CAPACITY: usize = 256;

pub async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    let (cfg, path) = BridgeConfig::load_with_path(config_path).await?;
    tracing::info!(
        config_path = %path.display(),
        server = %cfg.zulip.server,
        account = %cfg.zulip.account,
        channels = cfg.channels.len(),
        "config loaded"
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let bridge = build_bridge(&cfg)?.with_shutdown(shutdown.clone());
    join_configured_channels(&bridge, &cfg).await?;

    let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    let writer = tokio::spawn(host::write_events(event_rx, tokio::io::stdout()));
    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_CAPACITY);
    let forwarder = tokio::spawn(host::forward_inbound(inbound_rx, event_tx.clone()));

    bridge.connect(inbound_tx).await?;
    tracing::info!(account = %bridge.account(), "zulipbridge relaying");

    let read_result = host::read_commands(&bridge, tokio::io::stdin(), &event_tx, &shutdown).await;
    if let Err(error) = &read_result {
        tracing::error!(%error, "bus input failed");
    }

    tracing::info!("zulipbridge shutting down");
    shutdown.cancel();
    bridge.disconnect().await?;
    drop(event_tx);
    if let Err(error) = forwarder.await {
        tracing::error!(%error, "inbound forwarder panicked");
    }
    match writer.await {
        Ok(Err(error)) => tracing::error!(%error, "bus output failed"),
        Err(error) => tracing::error!(%error, "bus writer panicked"),
        Ok(Ok(())) => {}
    }
    read_result
}

pub async fn doctor(config_path: Option<PathBuf>) -> Result<()> {
    let (cfg, path) = BridgeConfig::load_with_path(config_path).await?;
    let client = cfg.client()?;
    let streams = client.get_streams().await?;
    tracing::info!(
        config_path = %path.display(),
        server = %client.base_url(),
        login = %client.email(),
        streams = streams.len(),
        "config ok"
    );
    Ok(())
}

pub async fn send_one_shot(
    config_path: Option<PathBuf>,
    channel: &str,
    message: &str,
) -> Result<()> {
    let cfg = BridgeConfig::load(config_path).await?;
    let bridge = build_bridge(&cfg)?;
    join_configured_channels(&bridge, &cfg).await?;

    let remote_id = bridge
        .send(OutboundMessage::Post(Post {
            channel: channel.to_string(),
            username: String::new(),
            text: message.to_string(),
        }))
        .await?;
    tracing::info!(channel = %channel, remote_id = %remote_id, "one-shot send ok");
    println!("{remote_id}");
    Ok(())
}

fn build_bridge(cfg: &BridgeConfig) -> Result<ZulipBridge> {
    let client = cfg.client()?;
    let staging = InlineStaging::new(cfg.zulip.media_max_size);
    Ok(ZulipBridge::new(Arc::new(client), cfg.settings()).with_staging(Arc::new(staging)))
}

async fn join_configured_channels(bridge: &ZulipBridge, cfg: &BridgeConfig) -> Result<()> {
    for channel in cfg.channel_infos() {
        bridge.join_channel(channel).await?;
    }
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler; falling back to ctrl_c only");
                if let Err(ctrlc_err) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %ctrlc_err, "failed to await ctrl-c signal");
                }
                shutdown.cancel();
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("received ctrl-c; beginning graceful shutdown");
            }
            _ = terminate.recv() => {
                tracing::warn!("received SIGTERM; beginning graceful shutdown");
            }
            _ = shutdown.cancelled() => return,
        }
    }
    #[cfg(not(unix))]
    {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "failed to await ctrl-c signal");
                } else {
                    tracing::warn!("received ctrl-c; beginning graceful shutdown");
                }
            }
            _ = shutdown.cancelled() => return,
        }
    }
    shutdown.cancel();
}

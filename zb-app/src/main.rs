//! zulipbridge main binary.
//!
//! Relays between a Zulip server and a line-delimited JSON bus on stdio.

mod config;
mod host;
mod server;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Debug, Parser)]
#[command(name = "zulipbridge", version, about = "Zulip adapter for the relay bus")]
struct Cli {
    /// Config file; defaults to ~/.zulipbridge/config.toml.
    #[arg(long, global = true, env = "ZULIPBRIDGE_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Relay between Zulip and the stdio bus (default).
    Serve,
    /// Validate config and check that the server accepts our credentials.
    Doctor,
    /// One-shot post to a stream.
    Send { channel: String, message: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is the normal case.
    dotenvy::dotenv().ok();
    init_tracing()?;
    install_panic_hook();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let result = server::serve(cli.config).await;
            // A pending stdin read would hold runtime shutdown open.
            if let Err(error) = result {
                tracing::error!(error = %format!("{error:#}"), "zulipbridge exited with error");
                std::process::exit(1);
            }
            std::process::exit(0);
        }
        Command::Doctor => server::doctor(cli.config).await,
        Command::Send { channel, message } => {
            server::send_one_shot(cli.config, &channel, &message).await
        }
    }
}

// stdout carries the bus, so logs always go to stderr.
fn init_tracing() -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(v) => v,
        Err(_) => {
            EnvFilter::new("info,zulipbridge=debug,zb_app=debug,zb_bridge=debug,zb_api=debug")
        }
    };
    let log_format = std::env::var("ZULIPBRIDGE_LOG_FORMAT")
        .unwrap_or_else(|_| "json".to_string())
        .to_ascii_lowercase();

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .init();
        }
        "pretty" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .pretty()
                .init();
        }
        "compact" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .compact()
                .init();
        }
        other => {
            return Err(anyhow::anyhow!(
                "unsupported ZULIPBRIDGE_LOG_FORMAT={other:?}; expected one of: json, pretty, compact"
            ));
        }
    }

    tracing::info!(
        log_format = %log_format,
        env_filter = ?std::env::var("RUST_LOG").ok(),
        "tracing initialized"
    );
    Ok(())
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = panic_payload(panic_info.payload());
        tracing::error!(
            panic_location = %location,
            panic_payload = %payload,
            "panic captured"
        );
        default_hook(panic_info);
    }));
}

fn panic_payload(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        return msg.to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command, panic_payload};
    use clap::Parser;

    #[test]
    fn no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["zulipbridge"]).expect("parse");
        assert!(cli.command.is_none());
    }

    #[test]
    fn send_takes_channel_and_message() {
        let cli = Cli::try_parse_from([
            "zulipbridge",
            "--config",
            "/tmp/zb.toml",
            "send",
            "general",
            "hello there",
        ])
        .expect("parse");
        assert_eq!(
            cli.config.as_deref(),
            Some(std::path::Path::new("/tmp/zb.toml"))
        );
        match cli.command {
            Some(Command::Send { channel, message }) => {
                assert_eq!(channel, "general");
                assert_eq!(message, "hello there");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn panic_payloads_are_stringified() {
        assert_eq!(panic_payload(&"boom"), "boom");
        assert_eq!(panic_payload(&"boom".to_string()), "boom");
        assert_eq!(panic_payload(&42_u8), "non-string panic payload");
    }
}

//! Mount status monitor
//!
//! Connects to an AM-series mount, prints what the handshake learned and then
//! streams poll events for a while.
//!
//! Usage:
//!   cargo run --example mount_status -- [OPTIONS]
//!
//! Options:
//!   --port PORT       Serial device, or asi://host[:port] / tcp://host[:port]
//!                     for the network interface (overrides the config)
//!   --config FILE     JSON mount configuration
//!   --seconds N       How long to watch events (default: 10)

use anyhow::{bail, Context, Result};
use asi_mount_core::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "asi_mount_core=info".into()),
        )
        .init();

    let mut config = MountConfig::default();
    let mut port = None;
    let mut seconds = 10u64;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--port" | "-p" => port = args.next(),
            "--config" | "-c" => {
                let path = args.next().context("--config needs a path")?;
                config = MountConfig::load(&path)
                    .with_context(|| format!("loading {}", path))?;
            }
            "--seconds" | "-s" => {
                seconds = args
                    .next()
                    .context("--seconds needs a value")?
                    .parse()
                    .context("--seconds must be a number")?;
            }
            other => bail!("unknown option {}", other),
        }
    }
    if let Some(port) = port {
        config.port = port;
    }
    if config.port.is_empty() {
        bail!("no port given; use --port or a config file");
    }

    let session = Arc::new(Session::new(config));
    let mut events = session.subscribe();
    let mut role = session.mount_role();

    let info = tokio::task::block_in_place(|| role.connect())
        .context("connecting to mount")?;
    println!("Connected to {}", role.product().unwrap_or("unknown mount"));
    println!("{}", serde_json::to_string_pretty(&info)?);

    let watch = tokio::time::sleep(Duration::from_secs(seconds));
    tokio::pin!(watch);
    loop {
        tokio::select! {
            _ = &mut watch => break,
            event = events.recv() => match event {
                Ok(event) => println!("{}", serde_json::to_string(&event)?),
                Err(RecvError::Lagged(n)) => println!("(skipped {} events)", n),
                Err(RecvError::Closed) => break,
            },
        }
    }

    tokio::task::block_in_place(|| role.disconnect());
    Ok(())
}

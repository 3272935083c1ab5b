//! Daemon that keeps dialing every configured host and unlocks its disks.

use anyhow::{Context, Result};
use luks_unlock_core::{logging, Credentials, Dispatcher, UnlockConfig};
use luks_unlock_ssh::SshUnlocker;
use log::{error, info};
use std::sync::Arc;
use tokio::{select, signal};

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    if let Err(err) = run().await {
        error!("luks-unlock exit: {err:?}");
        std::process::exit(1);
    }
}

/// Load configuration, decode the key, and dispatch until interrupted.
async fn run() -> Result<()> {
    logging::init("info");

    let config_path = UnlockConfig::resolve_path();
    let config = UnlockConfig::load(&config_path)
        .with_context(|| format!("load config {}", config_path.display()))?;
    let credentials = Credentials::from_config(&config).context("decode private-key")?;

    info!(
        "luks-unlock starting (config: {}, hosts: {}, key: {})",
        config.path.display(),
        config.hosts.len(),
        credentials.fingerprint()
    );

    let unlocker = SshUnlocker::new(Arc::new(credentials), config.session.clone());
    let dispatcher = Dispatcher::new(&config, unlocker);
    info!("dispatching with up to {} concurrent attempts", dispatcher.capacity());

    select! {
        res = dispatcher.run() => res.context("dispatch loop")?,
        _ = signal::ctrl_c() => {
            info!("received shutdown signal");
        }
    }

    Ok(())
}

//! mirror-daemon: Unattended one-way mirror of a local directory onto a
//! cloud-storage folder.
//!
//! The local directory is the source of truth. The daemon polls on a
//! fixed interval; each pass uploads new files, overwrites changed ones,
//! and deletes remote copies of files removed locally. Connectivity
//! failures abort only the current pass.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use mirror_core::{Mirror, RemoteStore};
use mirror_daemon::config::{Args, Settings};
use mirror_daemon::disk_client::DiskClient;
use mirror_daemon::local_fs::DirReader;

fn init_logging(log_file: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("failed to open log file {}", log_file.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Arc::new(file))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_file)?;

    info!("starting mirror-daemon");
    info!("sync dir: {}", args.sync_dir.display());
    info!("remote folder: {}", args.remote_dir);
    info!("poll period: {}s", args.period_secs);

    let settings = Settings::from(&args);
    if settings.write_once(Path::new("config.json"))? {
        info!("config record written");
    } else {
        info!("config record already exists");
    }

    let local = DirReader::new(args.sync_dir.clone());
    let remote = DiskClient::new(&args.token, &args.remote_dir)?;

    remote
        .ensure_folder()
        .await
        .context("failed to prepare the remote folder")?;

    let mut mirror = Mirror::new(local, remote);
    let swept = mirror
        .bootstrap()
        .await
        .context("initial reconciliation failed")?;
    if !swept.is_empty() {
        info!("startup sweep removed {} remote orphan(s)", swept.len());
    }

    let period = Duration::from_secs(args.period_secs);
    loop {
        match mirror.run_tick().await {
            Ok(actions) if !actions.is_empty() => {
                info!("pass complete, {} action(s)", actions.len());
            }
            Ok(_) => debug!("pass complete, no changes"),
            // A failed pass is retried in full after the normal delay.
            Err(e) => error!("pass failed: {}", e),
        }
        tokio::time::sleep(period).await;
    }
}

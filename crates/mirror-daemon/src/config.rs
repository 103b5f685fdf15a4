//! Startup configuration.
//!
//! Every setting is a CLI flag with a matching environment variable; all
//! five are required, and a missing one is a fatal startup error (clap
//! exits before the loop starts). The resolved settings are also written
//! once to `config.json` as a human-inspectable record of what this agent
//! is running with.

use anyhow::Result;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "mirror-daemon")]
#[command(about = "One-way mirror of a local directory onto a cloud-storage folder")]
pub struct Args {
    /// Local directory treated as the source of truth
    #[arg(long, env = "MIRROR_SYNC_DIR")]
    pub sync_dir: PathBuf,

    /// Name of the remote folder to mirror into
    #[arg(long, env = "MIRROR_REMOTE_DIR")]
    pub remote_dir: String,

    /// OAuth token for the storage API
    #[arg(long, env = "MIRROR_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Seconds between reconciliation passes
    #[arg(long, env = "MIRROR_PERIOD_SECS")]
    pub period_secs: u64,

    /// File the daemon logs to
    #[arg(long, env = "MIRROR_LOG_FILE")]
    pub log_file: PathBuf,
}

/// Persisted record of the five settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    pub sync_dir: PathBuf,
    pub remote_dir: String,
    pub token: String,
    pub period_secs: u64,
    pub log_file: PathBuf,
}

impl From<&Args> for Settings {
    fn from(args: &Args) -> Self {
        Self {
            sync_dir: args.sync_dir.clone(),
            remote_dir: args.remote_dir.clone(),
            token: args.token.clone(),
            period_secs: args.period_secs,
            log_file: args.log_file.clone(),
        }
    }
}

impl Settings {
    /// Write the record to `path` unless one already exists.
    ///
    /// Returns whether a record was written. An existing record is never
    /// overwritten, so operator edits survive restarts.
    pub fn write_once(&self, path: &Path) -> Result<bool> {
        if path.exists() {
            return Ok(false);
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(true)
    }

    /// Load a previously written record.
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn settings() -> Settings {
        Settings {
            sync_dir: PathBuf::from("/data/out"),
            remote_dir: "backup".to_string(),
            token: "secret".to_string(),
            period_secs: 30,
            log_file: PathBuf::from("/var/log/mirror.log"),
        }
    }

    #[test]
    fn record_written_once_and_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        assert!(settings().write_once(&path).unwrap());
        assert_eq!(Settings::load(&path).unwrap(), settings());
    }

    #[test]
    fn existing_record_is_never_overwritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        settings().write_once(&path).unwrap();

        let mut changed = settings();
        changed.period_secs = 999;
        assert!(!changed.write_once(&path).unwrap());

        // Still the original content.
        assert_eq!(Settings::load(&path).unwrap().period_secs, 30);
    }
}

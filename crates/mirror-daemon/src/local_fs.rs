//! Local snapshot reader over tokio::fs.
//!
//! Flat listing only: regular files directly inside the sync directory,
//! no recursion into subdirectories.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mirror_core::store::{LocalStore, Result, StoreError};
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;

/// LocalStore implementation for the daemon.
pub struct DirReader {
    base_path: PathBuf,
}

impl DirReader {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn full_path(&self, name: &str) -> PathBuf {
        self.base_path.join(name)
    }

    fn map_io(name: &str, e: std::io::Error) -> StoreError {
        if e.kind() == ErrorKind::NotFound {
            StoreError::NotFound(name.to_string())
        } else {
            StoreError::Io(e.to_string())
        }
    }
}

#[async_trait]
impl LocalStore for DirReader {
    async fn list_files(&self) -> Result<Vec<String>> {
        let mut dir = fs::read_dir(&self.base_path)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;

        let mut names = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| StoreError::Io(e.to_string()))?;
            if file_type.is_file() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        Ok(names)
    }

    async fn modified_time(&self, name: &str) -> Result<DateTime<Utc>> {
        let metadata = fs::metadata(self.full_path(name))
            .await
            .map_err(|e| Self::map_io(name, e))?;
        let mtime = metadata
            .modified()
            .map_err(|e| StoreError::Io(e.to_string()))?;

        // Second resolution: the remote side only reports whole seconds.
        let mtime: DateTime<Utc> = mtime.into();
        Ok(DateTime::from_timestamp(mtime.timestamp(), 0).unwrap_or(mtime))
    }

    async fn read(&self, name: &str) -> Result<Vec<u8>> {
        fs::read(self.full_path(name))
            .await
            .map_err(|e| Self::map_io(name, e))
    }
}

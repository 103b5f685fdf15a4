//! LocalStore / RemoteStore trait abstractions for the two sides of the
//! mirror.
//!
//! Implementations:
//! - `InMemoryLocal` / `InMemoryRemote` - For testing
//! - `DirReader` (in mirror-daemon) - Uses tokio::fs
//! - `DiskClient` (in mirror-daemon) - Talks to the cloud storage REST API
//!
//! All timestamps crossing these traits are already normalized to UTC at
//! second resolution; clock-offset correction is an adapter concern.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Network-layer failure. Aborts the current tick; the poll interval
    /// serves as the retry delay.
    #[error("connection failed: {0}")]
    Transport(String),

    /// File not found. For local files this is an expected race (deleted
    /// between listing and use), never a fatal condition.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Opaque write target returned by the remote when an object may be
/// created. Its presence doubles as the "does not exist yet" signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget(pub String);

/// The local side: a flat directory of regular files.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// List regular files directly inside the sync directory. No recursion.
    async fn list_files(&self) -> Result<Vec<String>>;

    /// Last-modified time of a file, at second resolution.
    ///
    /// Fails with `NotFound` when the file vanished since it was listed.
    async fn modified_time(&self, name: &str) -> Result<DateTime<Utc>>;

    /// Read file contents. Fails with `NotFound` on the same race.
    async fn read(&self, name: &str) -> Result<Vec<u8>>;
}

/// The remote side: a flat cloud-storage folder.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// List file names directly inside the remote folder.
    async fn list_files(&self) -> Result<Vec<String>>;

    /// Resolve a write target for `name`.
    ///
    /// `None` means the object already exists and overwrite was not
    /// requested - the sole existence signal the engine relies on.
    async fn resolve_upload_target(&self, name: &str) -> Result<Option<UploadTarget>>;

    /// Upload bytes to a previously resolved target.
    async fn upload(&self, target: &UploadTarget, bytes: Vec<u8>) -> Result<()>;

    /// Delete an object. Idempotent: deleting an absent path is not an
    /// error.
    async fn delete(&self, name: &str) -> Result<()>;

    /// Last-modified time of a remote object, normalized to UTC at second
    /// resolution (the adapter applies any fixed clock-offset correction).
    async fn modified_time(&self, name: &str) -> Result<DateTime<Utc>>;

    /// Create the remote folder if absent. Idempotent, startup only.
    async fn ensure_folder(&self) -> Result<()>;
}

/// In-memory local directory for testing.
pub struct InMemoryLocal {
    files: RwLock<BTreeMap<String, (Vec<u8>, DateTime<Utc>)>>,
}

impl InMemoryLocal {
    pub fn new() -> Self {
        Self {
            files: RwLock::new(BTreeMap::new()),
        }
    }

    /// Add or rewrite a file with an explicit mtime.
    pub fn put(&self, name: &str, bytes: &[u8], mtime: DateTime<Utc>) {
        let mut files = self.files.write().unwrap();
        files.insert(name.to_string(), (bytes.to_vec(), mtime));
    }

    /// Simulate local deletion (including mid-tick races).
    pub fn remove(&self, name: &str) {
        let mut files = self.files.write().unwrap();
        files.remove(name);
    }
}

impl Default for InMemoryLocal {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocalStore for InMemoryLocal {
    async fn list_files(&self) -> Result<Vec<String>> {
        let files = self.files.read().unwrap();
        Ok(files.keys().cloned().collect())
    }

    async fn modified_time(&self, name: &str) -> Result<DateTime<Utc>> {
        let files = self.files.read().unwrap();
        files
            .get(name)
            .map(|(_, mtime)| *mtime)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn read(&self, name: &str) -> Result<Vec<u8>> {
        let files = self.files.read().unwrap();
        files
            .get(name)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }
}

/// In-memory remote folder for testing.
///
/// `set_offline(true)` makes every call fail with `Transport`, for
/// connectivity-failure tests.
pub struct InMemoryRemote {
    files: RwLock<BTreeMap<String, DateTime<Utc>>>,
    offline: RwLock<bool>,
    /// Mtime stamped onto the next uploads (a real remote stamps its own
    /// clock; tests control it explicitly).
    upload_mtime: RwLock<DateTime<Utc>>,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self {
            files: RwLock::new(BTreeMap::new()),
            offline: RwLock::new(false),
            upload_mtime: RwLock::new(DateTime::<Utc>::UNIX_EPOCH),
        }
    }

    /// Seed a remote object with an explicit mtime.
    pub fn put(&self, name: &str, mtime: DateTime<Utc>) {
        let mut files = self.files.write().unwrap();
        files.insert(name.to_string(), mtime);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.read().unwrap().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.files.read().unwrap().keys().cloned().collect()
    }

    pub fn mtime(&self, name: &str) -> Option<DateTime<Utc>> {
        self.files.read().unwrap().get(name).copied()
    }

    pub fn set_offline(&self, offline: bool) {
        *self.offline.write().unwrap() = offline;
    }

    pub fn set_upload_mtime(&self, mtime: DateTime<Utc>) {
        *self.upload_mtime.write().unwrap() = mtime;
    }

    fn check_online(&self) -> Result<()> {
        if *self.offline.read().unwrap() {
            Err(StoreError::Transport("offline".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemote {
    async fn list_files(&self) -> Result<Vec<String>> {
        self.check_online()?;
        Ok(self.names())
    }

    async fn resolve_upload_target(&self, name: &str) -> Result<Option<UploadTarget>> {
        self.check_online()?;
        let files = self.files.read().unwrap();
        if files.contains_key(name) {
            Ok(None)
        } else {
            Ok(Some(UploadTarget(name.to_string())))
        }
    }

    async fn upload(&self, target: &UploadTarget, _bytes: Vec<u8>) -> Result<()> {
        self.check_online()?;
        let mtime = *self.upload_mtime.read().unwrap();
        let mut files = self.files.write().unwrap();
        files.insert(target.0.clone(), mtime);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.check_online()?;
        let mut files = self.files.write().unwrap();
        // Absent path is fine, delete is idempotent.
        files.remove(name);
        Ok(())
    }

    async fn modified_time(&self, name: &str) -> Result<DateTime<Utc>> {
        self.check_online()?;
        let files = self.files.read().unwrap();
        files
            .get(name)
            .copied()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn ensure_folder(&self) -> Result<()> {
        self.check_online()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[tokio::test]
    async fn local_listing_and_vanish() {
        let local = InMemoryLocal::new();
        local.put("a.txt", b"hello", ts(100));

        assert_eq!(local.list_files().await.unwrap(), vec!["a.txt"]);
        assert_eq!(local.modified_time("a.txt").await.unwrap(), ts(100));

        local.remove("a.txt");
        let err = local.modified_time("a.txt").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn remote_upload_target_signals_existence() {
        let remote = InMemoryRemote::new();

        let target = remote.resolve_upload_target("a.txt").await.unwrap();
        assert!(target.is_some());

        remote.upload(&target.unwrap(), b"hello".to_vec()).await.unwrap();
        assert!(remote.contains("a.txt"));

        // Existing object resolves to no target.
        assert!(remote.resolve_upload_target("a.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remote_delete_is_idempotent() {
        let remote = InMemoryRemote::new();
        remote.put("a.txt", ts(50));

        remote.delete("a.txt").await.unwrap();
        assert!(!remote.contains("a.txt"));

        // Second delete of the same name is not an error.
        remote.delete("a.txt").await.unwrap();
    }

    #[tokio::test]
    async fn offline_remote_fails_with_transport() {
        let remote = InMemoryRemote::new();
        remote.set_offline(true);

        let err = remote.list_files().await.unwrap_err();
        assert!(matches!(err, StoreError::Transport(_)));
    }
}

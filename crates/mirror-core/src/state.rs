//! Tracked file-name sets carried across reconciliation ticks.
//!
//! The state is an explicit value owned by the sync loop and threaded
//! through the engine, so the diff logic stays testable as plain functions
//! over (state, snapshots).

use std::collections::BTreeSet;

/// An intent the engine wants executed against the remote store.
///
/// Overwrite is deliberately composite (delete, then re-upload): the
/// remote API has no atomic update primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Upload(String),
    Overwrite(String),
    DeleteRemote(String),
}

impl Action {
    pub fn name(&self) -> &str {
        match self {
            Action::Upload(name) | Action::Overwrite(name) | Action::DeleteRemote(name) => name,
        }
    }
}

/// The two tracked file-name sets.
///
/// `local` is the union of every listing seen so far; a name only leaves
/// it when a local read fails with NotFound. This is what propagates local
/// deletions to the remote: the name stays tracked until the engine
/// notices the file is gone and issues the remote delete.
///
/// `remote` is refreshed from the remote listing each tick and updated
/// after each confirmed upload or delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncState {
    local: BTreeSet<String>,
    remote: BTreeSet<String>,
}

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a fresh local listing into the tracked set.
    pub fn merge_local_listing(&mut self, names: impl IntoIterator<Item = String>) {
        self.local.extend(names);
    }

    /// Replace the tracked remote set with a fresh listing.
    pub fn replace_remote_listing(&mut self, names: impl IntoIterator<Item = String>) {
        self.remote = names.into_iter().collect();
    }

    /// Remote names with no local counterpart (the startup sweep input).
    pub fn orphans(&self) -> Vec<String> {
        self.remote.difference(&self.local).cloned().collect()
    }

    pub fn record_upload(&mut self, name: &str) {
        self.remote.insert(name.to_string());
    }

    pub fn record_remote_delete(&mut self, name: &str) {
        self.remote.remove(name);
    }

    pub fn drop_local(&mut self, name: &str) {
        self.local.remove(name);
    }

    pub fn local_names(&self) -> Vec<String> {
        self.local.iter().cloned().collect()
    }

    pub fn remote_names(&self) -> Vec<String> {
        self.remote.iter().cloned().collect()
    }

    /// The mirror invariant: after an error-free tick both sides hold
    /// exactly the same names.
    pub fn is_mirrored(&self) -> bool {
        self.local == self.remote
    }
}

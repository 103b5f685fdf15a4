//! The reconciliation engine.
//!
//! One tick works as follows:
//!
//! 1. Refresh both snapshots (remote listing replaces the tracked remote
//!    set, local listing merges into the tracked local set)
//! 2. For every tracked local name, decide and execute:
//!    - no remote counterpart: upload
//!    - local file vanished since listing: delete the remote copy and stop
//!      tracking the name
//!    - local strictly newer than remote: overwrite (delete, then upload)
//!    - otherwise: nothing
//!
//! A transport failure anywhere aborts the tick and propagates to the
//! caller; the next tick re-derives everything from fresh snapshots, which
//! re-establishes the mirror invariant from scratch.

use crate::state::{Action, SyncState};
use crate::store::{LocalStore, RemoteStore, Result, UploadTarget};
use tracing::{debug, info, warn};

/// One-directional mirror of a local directory onto a remote folder.
pub struct Mirror<L: LocalStore, R: RemoteStore> {
    local: L,
    remote: R,
    state: SyncState,
}

impl<L: LocalStore, R: RemoteStore> Mirror<L, R> {
    pub fn new(local: L, remote: R) -> Self {
        Self {
            local,
            remote,
            state: SyncState::new(),
        }
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    /// Refresh both tracked sets from fresh listings.
    async fn refresh_snapshots(&mut self) -> Result<()> {
        let remote_names = self.remote.list_files().await?;
        self.state.replace_remote_listing(remote_names);

        let local_names = self.local.list_files().await?;
        self.state.merge_local_listing(local_names);
        Ok(())
    }

    /// First-run orphan sweep: every remote object with no local
    /// counterpart is stale content from before this run and gets deleted.
    pub async fn bootstrap(&mut self) -> Result<Vec<Action>> {
        self.refresh_snapshots().await?;

        let mut actions = Vec::new();
        for name in self.state.orphans() {
            self.remote.delete(&name).await?;
            self.state.record_remote_delete(&name);
            info!("deleted remote orphan {}", name);
            actions.push(Action::DeleteRemote(name));
        }
        Ok(actions)
    }

    /// One full reconciliation pass. Returns the actions that were
    /// executed.
    pub async fn run_tick(&mut self) -> Result<Vec<Action>> {
        self.refresh_snapshots().await?;

        let mut actions = Vec::new();
        for name in self.state.local_names() {
            self.sync_file(&name, &mut actions).await?;
        }
        Ok(actions)
    }

    /// Decide and execute for a single tracked name.
    async fn sync_file(&mut self, name: &str, actions: &mut Vec<Action>) -> Result<()> {
        // No remote counterpart yet: upload. An existing object resolves
        // to no target, which is the benign-duplicate case at this step.
        if let Some(target) = self.remote.resolve_upload_target(name).await? {
            match self.upload_bytes(name, &target).await {
                Ok(()) => {
                    self.state.record_upload(name);
                    info!("uploaded {}", name);
                    actions.push(Action::Upload(name.to_string()));
                }
                Err(e) if e.is_not_found() => {
                    // Deleted right after it was listed.
                    return self.forget_vanished(name, actions).await;
                }
                Err(e) => return Err(e),
            }
        }

        // The local mtime read doubles as the deletion probe: NotFound
        // here means the file is gone and the remote copy must follow.
        let local_mtime = match self.local.modified_time(name).await {
            Ok(t) => t,
            Err(e) if e.is_not_found() => return self.forget_vanished(name, actions).await,
            Err(e) => return Err(e),
        };

        let remote_mtime = self.remote.modified_time(name).await?;
        if local_mtime > remote_mtime {
            debug!(
                "{} changed locally ({} > {})",
                name, local_mtime, remote_mtime
            );
            self.overwrite(name, actions).await?;
        }
        Ok(())
    }

    /// Overwrite = delete, then re-upload. The remote API has no atomic
    /// update, so the composite stays explicit.
    async fn overwrite(&mut self, name: &str, actions: &mut Vec<Action>) -> Result<()> {
        self.remote.delete(name).await?;
        self.state.record_remote_delete(name);

        let Some(target) = self.remote.resolve_upload_target(name).await? else {
            // Just deleted, yet still reported present. Trust the signal
            // and let the next tick reconcile from fresh snapshots.
            warn!("no upload target for {} after delete, skipping", name);
            return Ok(());
        };
        match self.upload_bytes(name, &target).await {
            Ok(()) => {
                self.state.record_upload(name);
                info!("overwrote {}", name);
                actions.push(Action::Overwrite(name.to_string()));
                Ok(())
            }
            Err(e) if e.is_not_found() => self.forget_vanished(name, actions).await,
            Err(e) => Err(e),
        }
    }

    async fn upload_bytes(&mut self, name: &str, target: &UploadTarget) -> Result<()> {
        let bytes = self.local.read(name).await?;
        self.remote.upload(target, bytes).await
    }

    /// The file disappeared locally between listing and use. Not an error:
    /// delete the remote copy and stop tracking the name.
    async fn forget_vanished(&mut self, name: &str, actions: &mut Vec<Action>) -> Result<()> {
        self.remote.delete(name).await?;
        self.state.record_remote_delete(name);
        self.state.drop_local(name);
        info!("{} deleted locally, removed remote copy", name);
        actions.push(Action::DeleteRemote(name.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryLocal, InMemoryRemote, StoreError};
    use chrono::{DateTime, Utc};

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn mirror() -> Mirror<InMemoryLocal, InMemoryRemote> {
        Mirror::new(InMemoryLocal::new(), InMemoryRemote::new())
    }

    #[tokio::test]
    async fn startup_orphan_sweep() {
        let m = mirror();
        m.local.put("a", b"a", ts(100));
        m.remote.put("a", ts(100));
        m.remote.put("b", ts(100));
        m.remote.put("c", ts(100));

        let mut m = m;
        let actions = m.bootstrap().await.unwrap();

        assert_eq!(
            actions,
            vec![
                Action::DeleteRemote("b".to_string()),
                Action::DeleteRemote("c".to_string()),
            ]
        );
        assert_eq!(m.remote.names(), vec!["a".to_string()]);
        assert!(m.state().is_mirrored());
    }

    #[tokio::test]
    async fn mirror_convergence() {
        let mut m = mirror();
        m.local.put("a.txt", b"a", ts(100));
        m.local.put("b.txt", b"b", ts(200));
        m.remote.set_upload_mtime(ts(300));

        let actions = m.run_tick().await.unwrap();

        assert_eq!(actions.len(), 2);
        assert!(m.state().is_mirrored());
        assert_eq!(
            m.remote.names(),
            vec!["a.txt".to_string(), "b.txt".to_string()]
        );
        // Remote stamps its own clock at upload time, never earlier than
        // the local mtime at action time.
        assert!(m.remote.mtime("a.txt").unwrap() >= ts(100));
        assert!(m.remote.mtime("b.txt").unwrap() >= ts(200));
    }

    #[tokio::test]
    async fn no_redundant_overwrite_on_equal_mtimes() {
        let mut m = mirror();
        m.local.put("a.txt", b"a", ts(500));
        m.remote.put("a.txt", ts(500));

        let actions = m.run_tick().await.unwrap();

        assert!(actions.is_empty());
        assert_eq!(m.remote.mtime("a.txt"), Some(ts(500)));
    }

    #[tokio::test]
    async fn overwrite_when_local_is_newer() {
        let mut m = mirror();
        m.local.put("a.txt", b"v2", ts(600));
        m.remote.put("a.txt", ts(500));
        m.remote.set_upload_mtime(ts(601));

        let actions = m.run_tick().await.unwrap();

        assert_eq!(actions, vec![Action::Overwrite("a.txt".to_string())]);
        assert_eq!(m.remote.mtime("a.txt"), Some(ts(601)));
        assert!(m.state().is_mirrored());
    }

    #[tokio::test]
    async fn race_tolerance_for_vanished_file() {
        let mut m = mirror();
        m.remote.put("ghost.txt", ts(100));
        // Listed in an earlier tick, deleted from disk since: still
        // tracked, but every local access now fails NotFound.
        m.state.merge_local_listing(["ghost.txt".to_string()]);

        let actions = m.run_tick().await.unwrap();

        assert_eq!(actions, vec![Action::DeleteRemote("ghost.txt".to_string())]);
        assert!(!m.remote.contains("ghost.txt"));
        assert!(m.state().local_names().is_empty());
        assert!(m.state().is_mirrored());
    }

    #[tokio::test]
    async fn vanish_between_listing_and_upload() {
        let mut m = mirror();
        // Tracked from a previous listing, absent both locally and
        // remotely now: the upload target resolves, the read fails.
        m.state.merge_local_listing(["flash.txt".to_string()]);

        let actions = m.run_tick().await.unwrap();

        assert_eq!(actions, vec![Action::DeleteRemote("flash.txt".to_string())]);
        assert!(m.state().local_names().is_empty());
    }

    #[tokio::test]
    async fn local_deletion_propagates_across_ticks() {
        let mut m = mirror();
        m.local.put("a.txt", b"a", ts(100));
        m.remote.set_upload_mtime(ts(150));

        m.run_tick().await.unwrap();
        assert!(m.remote.contains("a.txt"));

        m.local.remove("a.txt");
        let actions = m.run_tick().await.unwrap();

        assert_eq!(actions, vec![Action::DeleteRemote("a.txt".to_string())]);
        assert!(!m.remote.contains("a.txt"));
        assert!(m.state().is_mirrored());
    }

    #[tokio::test]
    async fn transport_failure_aborts_tick_only() {
        let mut m = mirror();
        m.local.put("a.txt", b"a", ts(100));
        m.remote.set_upload_mtime(ts(150));

        m.remote.set_offline(true);
        let err = m.run_tick().await.unwrap_err();
        assert!(matches!(err, StoreError::Transport(_)));

        // Next tick starts from fresh snapshots and converges.
        m.remote.set_offline(false);
        m.run_tick().await.unwrap();
        assert!(m.state().is_mirrored());
        assert!(m.remote.contains("a.txt"));
    }

    #[tokio::test]
    async fn end_to_end_scenario() {
        let mut m = mirror();
        m.local.put("a.txt", b"v1", ts(1000));
        m.remote.set_upload_mtime(ts(1010));

        let actions = m.run_tick().await.unwrap();
        assert_eq!(actions, vec![Action::Upload("a.txt".to_string())]);
        assert_eq!(m.remote.names(), vec!["a.txt".to_string()]);

        // Rewritten locally after the remote copy's stamp.
        m.local.put("a.txt", b"v2", ts(2000));
        m.remote.set_upload_mtime(ts(2010));

        let actions = m.run_tick().await.unwrap();
        assert_eq!(actions, vec![Action::Overwrite("a.txt".to_string())]);
        assert_eq!(m.remote.names(), vec!["a.txt".to_string()]);
        assert_eq!(m.remote.mtime("a.txt"), Some(ts(2010)));
    }
}

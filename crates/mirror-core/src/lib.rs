//! mirror-core: One-directional mirror of a flat local directory onto a
//! remote cloud-storage folder.
//!
//! This crate provides the core functionality for:
//! - LocalStore and RemoteStore trait abstractions over the two sides
//! - Tracked file-name sets carried across reconciliation ticks
//! - The reconciliation engine (diff + timestamp comparison + actions)
//!
//! The local filesystem is the source of truth; the engine only ever
//! creates, overwrites, or deletes remote objects.

pub mod engine;
pub mod state;
pub mod store;

pub use engine::Mirror;
pub use state::{Action, SyncState};
pub use store::{InMemoryLocal, InMemoryRemote, LocalStore, RemoteStore, StoreError, UploadTarget};

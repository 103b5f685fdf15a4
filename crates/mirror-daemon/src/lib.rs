//! mirror-daemon library: Exposes internal modules for testing.
//!
//! This is a thin library layer over the daemon components,
//! allowing integration tests to access internal types.

pub mod config;
pub mod disk_client;
pub mod local_fs;

// Re-export key types for convenience
pub use config::{Args, Settings};
pub use disk_client::DiskClient;
pub use local_fs::DirReader;

// Library module for bucketsync
// Re-exports modules for use in integration tests and the CLI

pub mod config;
pub mod error;
pub mod store;
pub mod sync;

pub use config::{BackendKind, Credentials, UploaderConfig};
pub use error::SyncError;
pub use sync::{LocalFile, SyncStats, Uploader};

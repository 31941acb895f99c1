//! Change detection and upload scheduling.
//!
//! Selection, fingerprinting, the existence check, single-file transfer and
//! the batch driver that ties them together.

pub mod check;
pub mod engine;
pub mod filter;
pub mod hash;
pub mod select;
pub mod transfer;

pub use check::is_up_to_date;
pub use engine::{SyncPhase, SyncProgress, SyncStats, SyncStatus, Uploader};
pub use filter::{FilterDecision, FilterSet, PatternList};
pub use hash::{fingerprint, fingerprint_bytes, Fingerprint};
pub use select::{destination_key, select_files, select_files_with_rng, LocalFile};
pub use transfer::{guess_content_type, StaticPolicy, Transfer, TransferOutcome, UploadPolicy};

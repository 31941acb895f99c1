pub mod backend;
pub mod gcs;
pub mod memory;
pub mod s3;

pub use backend::{
    normalize_key, BackendType, ObjectMetadata, ObjectRef, ObjectStore, ObjectWriter, StoreError,
    Visibility, WriteOptions,
};
pub use gcs::GcsStore;
pub use memory::MemoryStore;
pub use s3::S3Store;

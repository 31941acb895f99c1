//! In-process object store.
//!
//! Keeps objects in a map and records every write attempt and abort, with
//! hooks for injecting metadata, chunk and commit failures per key.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::store::backend::{
    BackendType, ObjectMetadata, ObjectStore, ObjectWriter, StoreError, Visibility, WriteOptions,
};
use crate::sync::hash::{fingerprint_bytes, Fingerprint};

/// An object held by [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_md5: Option<Fingerprint>,
    pub content_type: String,
    pub visibility: Visibility,
}

#[derive(Debug, Default)]
struct State {
    objects: HashMap<String, StoredObject>,
    /// Keys in the order `open_writer` was called.
    write_attempts: Vec<String>,
    /// Keys whose writes committed, in order.
    committed: Vec<String>,
    /// Keys whose writers were aborted, in order.
    aborted: Vec<String>,
    fail_writes: HashSet<String>,
    fail_chunks: HashSet<String>,
    stall_chunks: HashSet<String>,
    fail_metadata: HashSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means another test thread panicked
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seed an object as if it had been uploaded earlier.
    pub fn insert(&self, key: &str, data: impl Into<Bytes>) {
        let data = data.into();
        let object = StoredObject {
            content_md5: Some(fingerprint_bytes(&data)),
            data,
            content_type: "application/octet-stream".to_string(),
            visibility: Visibility::Private,
        };
        self.lock().objects.insert(key.to_string(), object);
    }

    /// Seed an object whose metadata carries no MD5 (composite uploads).
    pub fn insert_without_md5(&self, key: &str, data: impl Into<Bytes>) {
        let object = StoredObject {
            data: data.into(),
            content_md5: None,
            content_type: "application/octet-stream".to_string(),
            visibility: Visibility::Private,
        };
        self.lock().objects.insert(key.to_string(), object);
    }

    /// Make every write to `key` fail when it is committed.
    pub fn fail_writes_for(&self, key: &str) {
        self.lock().fail_writes.insert(key.to_string());
    }

    /// Make every chunk written to `key` fail.
    pub fn fail_chunks_for(&self, key: &str) {
        self.lock().fail_chunks.insert(key.to_string());
    }

    /// Make chunk writes to `key` hang forever.
    pub fn stall_chunks_for(&self, key: &str) {
        self.lock().stall_chunks.insert(key.to_string());
    }

    /// Make metadata lookups for `key` fail with a backend error.
    pub fn fail_metadata_for(&self, key: &str) {
        self.lock().fail_metadata.insert(key.to_string());
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.lock().objects.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().objects.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn write_attempts(&self) -> Vec<String> {
        self.lock().write_attempts.clone()
    }

    /// Number of writes that reached the store.
    pub fn write_count(&self) -> usize {
        self.lock().committed.len()
    }

    /// Keys whose writers were aborted.
    pub fn aborts(&self) -> Vec<String> {
        self.lock().aborted.clone()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn metadata(&self, key: &str) -> Result<ObjectMetadata, StoreError> {
        let state = self.lock();
        if state.fail_metadata.contains(key) {
            return Err(StoreError::Backend(format!("injected metadata failure for {}", key)));
        }

        state
            .objects
            .get(key)
            .map(|object| ObjectMetadata {
                content_md5: object.content_md5.clone(),
            })
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn open_writer(
        &self,
        key: &str,
        options: &WriteOptions,
    ) -> Result<Box<dyn ObjectWriter>, StoreError> {
        self.lock().write_attempts.push(key.to_string());

        Ok(Box::new(MemoryWriter {
            store: self.clone(),
            key: key.to_string(),
            options: options.clone(),
            buffer: BytesMut::new(),
            finished: false,
        }))
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Memory
    }

    fn display_path(&self, key: &str) -> String {
        format!("memory://{}", key)
    }
}

struct MemoryWriter {
    store: MemoryStore,
    key: String,
    options: WriteOptions,
    buffer: BytesMut,
    finished: bool,
}

#[async_trait]
impl ObjectWriter for MemoryWriter {
    async fn write(&mut self, chunk: Bytes) -> Result<(), StoreError> {
        if self.finished {
            return Err(StoreError::Backend("writer already finished".to_string()));
        }

        let (fail, stall) = {
            let state = self.store.lock();
            (
                state.fail_chunks.contains(&self.key),
                state.stall_chunks.contains(&self.key),
            )
        };
        if stall {
            std::future::pending::<()>().await;
        }
        if fail {
            return Err(StoreError::Backend(format!("injected chunk failure for {}", self.key)));
        }

        self.buffer.extend_from_slice(&chunk);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        if self.finished {
            return Err(StoreError::Backend("writer already finished".to_string()));
        }
        self.finished = true;

        let mut state = self.store.lock();
        if state.fail_writes.contains(&self.key) {
            return Err(StoreError::Backend(format!("injected write failure for {}", self.key)));
        }

        let data = std::mem::take(&mut self.buffer).freeze();
        let object = StoredObject {
            content_md5: Some(fingerprint_bytes(&data)),
            data,
            content_type: self.options.content_type.clone(),
            visibility: self.options.visibility,
        };
        state.objects.insert(self.key.clone(), object);
        state.committed.push(self.key.clone());
        Ok(())
    }

    async fn abort(&mut self) -> Result<(), StoreError> {
        self.finished = true;
        self.buffer.clear();
        self.store.lock().aborted.push(self.key.clone());
        Ok(())
    }
}

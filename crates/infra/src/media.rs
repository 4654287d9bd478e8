//! Blob storage for media attachments.
//!
//! Uploads land under a staging key; the media job reads the staged original,
//! derives a display variant, and publishes both under final keys. The store
//! is keyed by opaque string, so an S3-compatible backend can slot in behind
//! the same trait.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::txn::StoreError;

#[async_trait::async_trait]
pub trait MediaStorage: Send + Sync {
    /// Read the staged original for `key`; [`StoreError::NotFound`] if the
    /// upload never happened or was already cleaned up.
    async fn fetch_staged(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Write a processed object under `key`, overwriting any previous object.
    async fn publish(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError>;

    /// Delete the object under `key`. Deleting a missing object is not an
    /// error; removal runs on failure paths that may have partially published.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Map-backed storage for tests and local development.
#[derive(Default)]
pub struct InMemoryMediaStorage {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryMediaStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a staged upload, as the upload endpoint would.
    pub fn stage(&self, key: impl Into<String>, bytes: Vec<u8>) {
        self.objects
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.into(), bytes);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key)
    }
}

#[async_trait::async_trait]
impl MediaStorage for InMemoryMediaStorage {
    async fn fetch_staged(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.objects
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn publish(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        self.objects
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_owned(), bytes);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.objects
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        Ok(())
    }
}

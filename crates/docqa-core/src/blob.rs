//! Raw upload storage.
//!
//! Blobs are keyed by the document's content fingerprint, so identical
//! uploads share one blob. The filesystem implementation lives in the app
//! crate; [`MemoryBlobStore`] serves tests.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key`, overwriting any previous blob.
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Remove the blob. Missing keys are not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.blobs
            .write()
            .map_err(|_| anyhow!("blob store lock poisoned"))?
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .blobs
            .read()
            .map_err(|_| anyhow!("blob store lock poisoned"))?
            .get(key)
            .cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.blobs
            .write()
            .map_err(|_| anyhow!("blob store lock poisoned"))?
            .remove(key);
        Ok(())
    }
}

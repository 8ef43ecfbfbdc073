//! Filesystem blob storage and the text source built on it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

use docqa_core::blob::BlobStore;
use docqa_core::ingest::TextSource;
use docqa_core::models::Document;

use crate::extract;

/// Stores each blob as `<files_dir>/<ab>/<fingerprint>`, fanned out by the
/// first two characters of the key.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.len() < 2 || !key.chars().all(|c| c.is_ascii_alphanumeric()) {
            bail!("invalid blob key: {:?}", key);
        }
        Ok(self.root.join(&key[..2]).join(key))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        // Write to a sibling temp file first so readers never see a torn blob.
        let tmp = path.with_extension("partial");
        tokio::fs::write(&tmp, bytes)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to move blob into {}", path.display()))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete {}", path.display())),
        }
    }
}

/// Reads a document's blob and extracts its text.
pub struct BlobTextSource {
    blobs: Arc<dyn BlobStore>,
}

impl BlobTextSource {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }
}

#[async_trait]
impl TextSource for BlobTextSource {
    async fn extract_text(&self, document: &Document) -> docqa_core::Result<String> {
        let bytes = self.blobs.get(&document.content_hash).await?.ok_or_else(|| {
            docqa_core::Error::Parsing(format!(
                "stored file for document {} is missing",
                document.id
            ))
        })?;

        // PDF parsing is CPU-bound; keep it off the async workers.
        let mime_type = document.mime_type.clone();
        let text = tokio::task::spawn_blocking(move || extract::extract_text(&bytes, &mime_type))
            .await
            .map_err(|e| anyhow::anyhow!("extraction task failed: {e}"))??;
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_core::upload::{fingerprint, MIME_TEXT};
    use tempfile::TempDir;

    fn document(hash: &str, mime_type: &str) -> Document {
        Document {
            id: "doc-1".to_string(),
            owner_id: "u1".to_string(),
            title: "Notes".to_string(),
            filename: "notes.txt".to_string(),
            mime_type: mime_type.to_string(),
            byte_size: 0,
            content_hash: hash.to_string(),
            shareable: false,
            classification: "unclassified".to_string(),
            status: docqa_core::models::DocumentStatus::Pending,
            created_at: 0,
            updated_at: 0,
            processed_at: None,
        }
    }

    #[tokio::test]
    async fn put_get_delete() {
        let tmp = TempDir::new().unwrap();
        let store = FsBlobStore::new(tmp.path());
        let key = fingerprint(b"hello");

        assert!(store.get(&key).await.unwrap().is_none());
        store.put(&key, b"hello").await.unwrap();
        assert_eq!(store.get(&key).await.unwrap().unwrap(), b"hello");
        assert!(tmp.path().join(&key[..2]).join(&key).exists());

        store.delete(&key).await.unwrap();
        assert!(store.get(&key).await.unwrap().is_none());
        store.delete(&key).await.unwrap();
    }

    #[tokio::test]
    async fn keys_cannot_escape_the_root() {
        let tmp = TempDir::new().unwrap();
        let store = FsBlobStore::new(tmp.path());
        assert!(store.put("../etc", b"x").await.is_err());
        assert!(store.get("a").await.is_err());
    }

    #[tokio::test]
    async fn text_source_reads_and_cleans_blob() {
        let tmp = TempDir::new().unwrap();
        let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(tmp.path()));
        let bytes = b"First  paragraph.\r\n\r\n\r\nSecond.";
        let key = fingerprint(bytes);
        blobs.put(&key, bytes).await.unwrap();

        let source = BlobTextSource::new(blobs);
        let text = source
            .extract_text(&document(&key, MIME_TEXT))
            .await
            .unwrap();
        assert_eq!(text, "First paragraph.\n\nSecond.");
    }

    #[tokio::test]
    async fn missing_blob_is_a_parsing_error() {
        let tmp = TempDir::new().unwrap();
        let source = BlobTextSource::new(Arc::new(FsBlobStore::new(tmp.path())));
        let err = source
            .extract_text(&document(&fingerprint(b"gone"), MIME_TEXT))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "parsing");
    }

    #[tokio::test]
    async fn unknown_mime_is_unsupported_format() {
        let tmp = TempDir::new().unwrap();
        let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(tmp.path()));
        let key = fingerprint(b"img");
        blobs.put(&key, b"img").await.unwrap();
        let err = BlobTextSource::new(blobs)
            .extract_text(&document(&key, "image/png"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "unsupported_format");
    }
}

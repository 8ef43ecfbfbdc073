//! Upload intake: validation, fingerprinting and deduplication.
//!
//! An upload is accepted when the requester's role may upload, the bytes are
//! non-empty and at most [`MAX_UPLOAD_BYTES`], the MIME type is one of
//! [`SUPPORTED_MIME_TYPES`], and the title fits [`MAX_TITLE_CHARS`].
//!
//! The SHA-256 of the raw bytes is the document's fingerprint. Uploading
//! content that is already stored is a success that returns the existing
//! document ([`UploadOutcome::Duplicate`]); no second row is created, even
//! when two identical uploads race.

use std::path::Path;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::access::{Requester, Role};
use crate::audit::{AuditAction, AuditEvent, AuditSink};
use crate::blob::BlobStore;
use crate::error::{Error, Result};
use crate::models::{now_ts, Document, DocumentStatus};
use crate::store::Store;

pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
pub const MAX_TITLE_CHARS: usize = 255;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_TEXT: &str = "text/plain";
pub const SUPPORTED_MIME_TYPES: [&str; 3] = [MIME_PDF, MIME_DOCX, MIME_TEXT];

pub const DEFAULT_CLASSIFICATION: &str = "unclassified";

/// A file handed in by a requester.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    /// Defaults to the filename without its extension.
    pub title: Option<String>,
    pub shareable: bool,
    pub classification: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    Created(Document),
    /// The content was already stored; this is the existing document.
    Duplicate(Document),
}

impl UploadOutcome {
    pub fn document(&self) -> &Document {
        match self {
            UploadOutcome::Created(doc) | UploadOutcome::Duplicate(doc) => doc,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, UploadOutcome::Duplicate(_))
    }
}

/// SHA-256 of `bytes`, lowercase hex.
pub fn fingerprint(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Creates and deletes documents together with their raw blobs.
pub struct DocumentIntake {
    store: Arc<dyn Store>,
    blobs: Arc<dyn BlobStore>,
    audit: Arc<dyn AuditSink>,
}

impl DocumentIntake {
    pub fn new(
        store: Arc<dyn Store>,
        blobs: Arc<dyn BlobStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            store,
            blobs,
            audit,
        }
    }

    #[tracing::instrument(skip_all, fields(owner = %requester.id, filename = %request.filename))]
    pub async fn upload(
        &self,
        requester: &Requester,
        request: UploadRequest,
    ) -> Result<UploadOutcome> {
        let title = validate(requester, &request)?;
        let content_hash = fingerprint(&request.bytes);

        if let Some(existing) = self.store.find_document_by_hash(&content_hash).await? {
            tracing::info!(
                document_id = %existing.id,
                "duplicate upload, returning existing document"
            );
            return Ok(UploadOutcome::Duplicate(existing));
        }

        self.blobs.put(&content_hash, &request.bytes).await?;

        let now = now_ts();
        let doc = Document {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: requester.id.clone(),
            title,
            filename: request.filename,
            mime_type: request.mime_type,
            byte_size: request.bytes.len() as i64,
            content_hash,
            shareable: request.shareable,
            classification: request
                .classification
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| DEFAULT_CLASSIFICATION.to_string()),
            status: DocumentStatus::Pending,
            created_at: now,
            updated_at: now,
            processed_at: None,
        };

        let stored = self.store.insert_document(&doc).await?;
        if stored.id != doc.id {
            tracing::info!(
                document_id = %stored.id,
                "concurrent duplicate upload, returning existing document"
            );
            return Ok(UploadOutcome::Duplicate(stored));
        }

        self.audit
            .record(AuditEvent::new(&requester.id, AuditAction::DocumentUpload, &stored.id));
        tracing::info!(document_id = %stored.id, bytes = stored.byte_size, "document uploaded");
        Ok(UploadOutcome::Created(stored))
    }

    /// Delete a document, its passages, the citations pointing at it and its
    /// blob. Only the owner or an admin may delete.
    #[tracing::instrument(skip_all, fields(document_id = %document_id))]
    pub async fn delete(&self, requester: &Requester, document_id: &str) -> Result<Document> {
        let doc = self
            .store
            .get_document(document_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("document {document_id}")))?;

        if doc.owner_id != requester.id && requester.role != Role::Admin {
            return Err(Error::Validation(
                "only the owner or an admin may delete a document".to_string(),
            ));
        }

        if !self.store.delete_document(&doc.id).await? {
            return Err(Error::NotFound(format!("document {document_id}")));
        }
        self.blobs.delete(&doc.content_hash).await?;

        self.audit
            .record(AuditEvent::new(&requester.id, AuditAction::DocumentDelete, &doc.id));
        tracing::info!("document deleted");
        Ok(doc)
    }
}

/// Check an upload and return the title it will be stored under.
fn validate(requester: &Requester, request: &UploadRequest) -> Result<String> {
    if !requester.role.can_upload() {
        return Err(Error::Validation(format!(
            "role {} may not upload documents",
            requester.role
        )));
    }
    if request.filename.trim().is_empty() {
        return Err(Error::Validation("filename is required".to_string()));
    }
    if request.bytes.is_empty() {
        return Err(Error::Validation("file is empty".to_string()));
    }
    if request.bytes.len() > MAX_UPLOAD_BYTES {
        return Err(Error::Validation(format!(
            "file is {} bytes, the limit is {} bytes",
            request.bytes.len(),
            MAX_UPLOAD_BYTES
        )));
    }
    if !SUPPORTED_MIME_TYPES.contains(&request.mime_type.as_str()) {
        return Err(Error::UnsupportedFormat(request.mime_type.clone()));
    }

    let title = match request.title.as_deref().map(str::trim) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => default_title(&request.filename),
    };
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(Error::Validation(format!(
            "title is longer than {MAX_TITLE_CHARS} characters"
        )));
    }
    Ok(title)
}

fn default_title(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(filename)
        .to_string()
}

//! Storage abstraction for docqa.
//!
//! [`VectorIndex`] holds passages and answers nearest-neighbor queries;
//! [`Store`] extends it with the document, query and citation tables the
//! pipelines need. Backends: [`memory::InMemoryStore`] here, and the SQLite
//! store in the `docqa` app crate.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! # Rules every backend enforces
//!
//! - `content_hash` is unique across documents; [`Store::insert_document`]
//!   returns the existing row instead of inserting a second one.
//! - `(document_id, chunk_index)` is unique across passages.
//! - Status changes are compare-and-set: the row changes only if its current
//!   status is one of [`DocumentStatus::sources_for`] the event, so two
//!   concurrent triggers cannot both claim a document.
//! - An ingestion run holds its document through a claim token. Heartbeats,
//!   completion and failure only apply while the token matches, so a run
//!   whose document was reclaimed cannot overwrite the next run's work.
//! - Deleting a document removes its passages and every citation pointing
//!   at it. Deleting nothing else cascades into documents.
//! - Passage and citation batches are written atomically.

pub mod memory;

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    Citation, Document, DocumentAccess, DocumentEvent, DocumentStatus, Passage, Query,
    ScoredPassage,
};

/// Per-passage vector storage with exact k-NN search.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Discard every passage of `document_id`, then store `passages`, as one
    /// atomic write.
    async fn replace_passages(&self, document_id: &str, passages: &[Passage]) -> Result<()>;

    /// Insert a passage, replacing any passage with the same document and
    /// chunk index.
    async fn upsert_passage(&self, passage: &Passage) -> Result<()>;

    /// Passages of one document in `chunk_index` order.
    async fn passages_for_document(&self, document_id: &str) -> Result<Vec<Passage>>;

    /// At most `k` passages by descending cosine similarity, restricted to
    /// `allowed` documents when given.
    async fn find_similar(
        &self,
        query_vec: &[f32],
        k: usize,
        allowed: Option<&HashSet<String>>,
    ) -> Result<Vec<ScoredPassage>>;
}

/// Persistent CRUD for documents, queries and citations.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_document`](Store::insert_document) | Insert unless the fingerprint exists |
/// | [`transition_document`](Store::transition_document) | Compare-and-set status change |
/// | [`claim_document`](Store::claim_document) | Claim a document for one ingestion run |
/// | [`complete_claimed`](Store::complete_claimed) | Passages and completion in one write |
/// | [`stale_processing_documents`](Store::stale_processing_documents) | Find stuck ingestions |
/// | [`start_query`](Store::start_query) | `pending → processing` |
/// | [`complete_query`](Store::complete_query) | Answer, status and citations in one write |
/// | [`fail_query`](Store::fail_query) | `processing → failed` |
#[async_trait]
pub trait Store: VectorIndex {
    /// Insert `doc` unless a document with the same `content_hash` exists.
    ///
    /// Returns the stored row: `doc` itself, or the existing document. The
    /// caller detects a duplicate by comparing ids.
    async fn insert_document(&self, doc: &Document) -> Result<Document>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    async fn find_document_by_hash(&self, content_hash: &str) -> Result<Option<Document>>;

    /// Documents, newest first, optionally restricted to one status.
    async fn list_documents(&self, status: Option<DocumentStatus>) -> Result<Vec<Document>>;

    /// Owner and shareability of every document.
    async fn document_access_facts(&self) -> Result<Vec<DocumentAccess>>;

    /// Apply `event` if the current status allows it. Returns whether the
    /// row changed. `Complete` also stamps `processed_at`. Any ingestion
    /// claim on the document is dropped.
    async fn transition_document(
        &self,
        id: &str,
        event: DocumentEvent,
        at: i64,
    ) -> Result<bool>;

    /// `Begin` for one ingestion run: move a `pending` or `failed` document
    /// to `processing` and record `claim` as its holder.
    async fn claim_document(&self, id: &str, claim: &str, at: i64) -> Result<bool>;

    /// Bump `updated_at` if `claim` still holds the document. `false` means
    /// the run lost the document to a reclaim.
    async fn refresh_claim(&self, id: &str, claim: &str, at: i64) -> Result<bool>;

    /// Replace the document's passages and mark it completed in one write,
    /// only if `claim` still holds it.
    async fn complete_claimed(
        &self,
        id: &str,
        claim: &str,
        passages: &[Passage],
        at: i64,
    ) -> Result<bool>;

    /// Mark the document failed, only if `claim` still holds it.
    async fn fail_claimed(&self, id: &str, claim: &str, at: i64) -> Result<bool>;

    async fn delete_document(&self, id: &str) -> Result<bool>;

    /// Ids of documents in `processing` whose `updated_at` is before
    /// `updated_before`.
    async fn stale_processing_documents(&self, updated_before: i64) -> Result<Vec<String>>;

    async fn insert_query(&self, query: &Query) -> Result<()>;

    async fn get_query(&self, id: &str) -> Result<Option<Query>>;

    /// Queries of one owner, newest first.
    async fn queries_for_owner(&self, owner_id: &str) -> Result<Vec<Query>>;

    async fn start_query(&self, id: &str) -> Result<bool>;

    /// Set the answer, mark the query completed and insert its citations,
    /// atomically. Returns `false` without writing if the query is not
    /// `processing`.
    async fn complete_query(
        &self,
        id: &str,
        answer: &str,
        processing_time: f64,
        citations: &[Citation],
    ) -> Result<bool>;

    async fn fail_query(&self, id: &str) -> Result<bool>;

    /// Citations of one query in rank order.
    async fn citations_for_query(&self, query_id: &str) -> Result<Vec<Citation>>;
}

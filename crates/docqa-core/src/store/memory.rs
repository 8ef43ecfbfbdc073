//! In-memory [`Store`] implementation for tests and embedding.
//!
//! All tables live behind a single `std::sync::RwLock`, so every trait
//! method observes and mutates a consistent snapshot. Vector search is a
//! brute-force scan through [`rank_passages`].

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::index::rank_passages;
use crate::models::{
    Citation, Document, DocumentAccess, DocumentEvent, DocumentStatus, Passage, Query,
    QueryEvent, ScoredPassage,
};

use super::{Store, VectorIndex};

#[derive(Default)]
struct Tables {
    documents: HashMap<String, Document>,
    passages: Vec<Passage>,
    queries: HashMap<String, Query>,
    citations: Vec<Citation>,
    /// Ingestion claim token per document in `processing`.
    claims: HashMap<String, String>,
}

impl Tables {
    fn processing_under(&self, id: &str, claim: &str) -> bool {
        self.claims.get(id).map(String::as_str) == Some(claim)
            && self
                .documents
                .get(id)
                .is_some_and(|d| d.status == DocumentStatus::Processing)
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

fn newest_first<T>(rows: &mut [T], created_at: impl Fn(&T) -> i64) {
    rows.sort_by_key(|row| std::cmp::Reverse(created_at(row)));
}

#[async_trait]
impl VectorIndex for InMemoryStore {
    async fn replace_passages(&self, document_id: &str, passages: &[Passage]) -> Result<()> {
        let mut tables = self.write()?;
        tables.passages.retain(|p| p.document_id != document_id);
        tables.passages.extend(passages.iter().cloned());
        Ok(())
    }

    async fn upsert_passage(&self, passage: &Passage) -> Result<()> {
        let mut tables = self.write()?;
        tables.passages.retain(|p| {
            !(p.document_id == passage.document_id && p.chunk_index == passage.chunk_index)
        });
        tables.passages.push(passage.clone());
        Ok(())
    }

    async fn passages_for_document(&self, document_id: &str) -> Result<Vec<Passage>> {
        let tables = self.read()?;
        let mut passages: Vec<Passage> = tables
            .passages
            .iter()
            .filter(|p| p.document_id == document_id)
            .cloned()
            .collect();
        passages.sort_by_key(|p| p.chunk_index);
        Ok(passages)
    }

    async fn find_similar(
        &self,
        query_vec: &[f32],
        k: usize,
        allowed: Option<&HashSet<String>>,
    ) -> Result<Vec<ScoredPassage>> {
        let tables = self.read()?;
        Ok(rank_passages(
            tables.passages.iter().cloned(),
            query_vec,
            k,
            allowed,
        ))
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_document(&self, doc: &Document) -> Result<Document> {
        let mut tables = self.write()?;
        if let Some(existing) = tables
            .documents
            .values()
            .find(|d| d.content_hash == doc.content_hash)
        {
            return Ok(existing.clone());
        }
        if tables.documents.contains_key(&doc.id) {
            return Err(anyhow!("document id {} already exists", doc.id));
        }
        tables.documents.insert(doc.id.clone(), doc.clone());
        Ok(doc.clone())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.read()?.documents.get(id).cloned())
    }

    async fn find_document_by_hash(&self, content_hash: &str) -> Result<Option<Document>> {
        Ok(self
            .read()?
            .documents
            .values()
            .find(|d| d.content_hash == content_hash)
            .cloned())
    }

    async fn list_documents(&self, status: Option<DocumentStatus>) -> Result<Vec<Document>> {
        let tables = self.read()?;
        let mut docs: Vec<Document> = tables
            .documents
            .values()
            .filter(|d| status.map_or(true, |s| d.status == s))
            .cloned()
            .collect();
        newest_first(&mut docs, |d| d.created_at);
        Ok(docs)
    }

    async fn document_access_facts(&self) -> Result<Vec<DocumentAccess>> {
        Ok(self
            .read()?
            .documents
            .values()
            .map(|d| DocumentAccess {
                document_id: d.id.clone(),
                owner_id: d.owner_id.clone(),
                shareable: d.shareable,
            })
            .collect())
    }

    async fn transition_document(
        &self,
        id: &str,
        event: DocumentEvent,
        at: i64,
    ) -> Result<bool> {
        let mut tables = self.write()?;
        let Some(doc) = tables.documents.get_mut(id) else {
            return Ok(false);
        };
        let Some(next) = doc.status.apply(event) else {
            return Ok(false);
        };
        doc.status = next;
        doc.updated_at = at;
        if event == DocumentEvent::Complete {
            doc.processed_at = Some(at);
        }
        tables.claims.remove(id);
        Ok(true)
    }

    async fn claim_document(&self, id: &str, claim: &str, at: i64) -> Result<bool> {
        let mut tables = self.write()?;
        let Some(doc) = tables.documents.get_mut(id) else {
            return Ok(false);
        };
        let Some(next) = doc.status.apply(DocumentEvent::Begin) else {
            return Ok(false);
        };
        doc.status = next;
        doc.updated_at = at;
        tables.claims.insert(id.to_string(), claim.to_string());
        Ok(true)
    }

    async fn refresh_claim(&self, id: &str, claim: &str, at: i64) -> Result<bool> {
        let mut tables = self.write()?;
        if !tables.processing_under(id, claim) {
            return Ok(false);
        }
        if let Some(doc) = tables.documents.get_mut(id) {
            doc.updated_at = at;
        }
        Ok(true)
    }

    async fn complete_claimed(
        &self,
        id: &str,
        claim: &str,
        passages: &[Passage],
        at: i64,
    ) -> Result<bool> {
        let mut tables = self.write()?;
        if !tables.processing_under(id, claim) {
            return Ok(false);
        }
        if let Some(doc) = tables.documents.get_mut(id) {
            doc.status = DocumentStatus::Completed;
            doc.updated_at = at;
            doc.processed_at = Some(at);
        }
        tables.claims.remove(id);
        tables.passages.retain(|p| p.document_id != id);
        tables.passages.extend(passages.iter().cloned());
        Ok(true)
    }

    async fn fail_claimed(&self, id: &str, claim: &str, at: i64) -> Result<bool> {
        let mut tables = self.write()?;
        if !tables.processing_under(id, claim) {
            return Ok(false);
        }
        if let Some(doc) = tables.documents.get_mut(id) {
            doc.status = DocumentStatus::Failed;
            doc.updated_at = at;
        }
        tables.claims.remove(id);
        Ok(true)
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let mut tables = self.write()?;
        if tables.documents.remove(id).is_none() {
            return Ok(false);
        }
        tables.claims.remove(id);
        tables.passages.retain(|p| p.document_id != id);
        tables.citations.retain(|c| c.document_id != id);
        Ok(true)
    }

    async fn stale_processing_documents(&self, updated_before: i64) -> Result<Vec<String>> {
        Ok(self
            .read()?
            .documents
            .values()
            .filter(|d| d.status == DocumentStatus::Processing && d.updated_at < updated_before)
            .map(|d| d.id.clone())
            .collect())
    }

    async fn insert_query(&self, query: &Query) -> Result<()> {
        let mut tables = self.write()?;
        if tables.queries.contains_key(&query.id) {
            return Err(anyhow!("query id {} already exists", query.id));
        }
        tables.queries.insert(query.id.clone(), query.clone());
        Ok(())
    }

    async fn get_query(&self, id: &str) -> Result<Option<Query>> {
        Ok(self.read()?.queries.get(id).cloned())
    }

    async fn queries_for_owner(&self, owner_id: &str) -> Result<Vec<Query>> {
        let tables = self.read()?;
        let mut queries: Vec<Query> = tables
            .queries
            .values()
            .filter(|q| q.owner_id == owner_id)
            .cloned()
            .collect();
        newest_first(&mut queries, |q| q.created_at);
        Ok(queries)
    }

    async fn start_query(&self, id: &str) -> Result<bool> {
        self.apply_query_event(id, QueryEvent::Start)
    }

    async fn complete_query(
        &self,
        id: &str,
        answer: &str,
        processing_time: f64,
        citations: &[Citation],
    ) -> Result<bool> {
        let mut tables = self.write()?;
        let Some(query) = tables.queries.get_mut(id) else {
            return Ok(false);
        };
        let Some(next) = query.status.apply(QueryEvent::Complete) else {
            return Ok(false);
        };
        query.status = next;
        query.answer = Some(answer.to_string());
        query.processing_time = Some(processing_time);
        tables.citations.extend(citations.iter().cloned());
        Ok(true)
    }

    async fn fail_query(&self, id: &str) -> Result<bool> {
        self.apply_query_event(id, QueryEvent::Fail)
    }

    async fn citations_for_query(&self, query_id: &str) -> Result<Vec<Citation>> {
        let tables = self.read()?;
        let mut citations: Vec<Citation> = tables
            .citations
            .iter()
            .filter(|c| c.query_id == query_id)
            .cloned()
            .collect();
        citations.sort_by_key(|c| c.rank);
        Ok(citations)
    }
}

impl InMemoryStore {
    fn apply_query_event(&self, id: &str, event: QueryEvent) -> Result<bool> {
        let mut tables = self.write()?;
        let Some(query) = tables.queries.get_mut(id) else {
            return Ok(false);
        };
        match query.status.apply(event) {
            Some(next) => {
                query.status = next;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    #[cfg(test)]
    pub(crate) fn citation_count(&self) -> Result<usize> {
        Ok(self.read()?.citations.len())
    }

    #[cfg(test)]
    pub(crate) fn query_status(&self, id: &str) -> Result<Option<crate::models::QueryStatus>> {
        Ok(self.read()?.queries.get(id).map(|q| q.status))
    }
}

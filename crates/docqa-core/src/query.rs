//! Question answering with citations.
//!
//! [`QueryOrchestrator::answer`] drives one question through:
//!
//! 1. Validation (trimmed length 3..=1000). Invalid questions create nothing.
//! 2. A new query row in `pending`, an audit event, then `processing`.
//! 3. Embedding the question.
//! 4. Computing the requester's [`AccessScope`] and retrieving the top-k
//!    passages inside it. No passages means `NotFound`.
//! 5. Joining passage texts, most similar first, into one context block.
//! 6. Asking the [`AnswerGenerator`].
//! 7. Storing answer, elapsed time, `completed` and one citation per
//!    retrieved passage (in retrieval order) in a single write.
//!
//! Any failure after step 2 leaves the query `failed` and returns the error.
//! Nothing is retried here.

use std::sync::Arc;
use std::time::Instant;

use crate::access::{accessible_document_ids, AccessScope, Requester};
use crate::audit::{AuditAction, AuditEvent, AuditSink};
use crate::embedding::{ensure_non_empty, AnswerGenerator, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::models::{now_ts, Citation, Query, QueryStatus, ScoredPassage};
use crate::store::{Store, VectorIndex};

pub const MIN_QUESTION_CHARS: usize = 3;
pub const MAX_QUESTION_CHARS: usize = 1000;
pub const DEFAULT_TOP_K: usize = 5;
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// A completed query and its citations in rank order.
#[derive(Debug, Clone, PartialEq)]
pub struct AnsweredQuery {
    pub query: Query,
    pub citations: Vec<Citation>,
}

pub struct QueryOrchestrator {
    store: Arc<dyn Store>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn AnswerGenerator>,
    audit: Arc<dyn AuditSink>,
    top_k: usize,
}

impl QueryOrchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn AnswerGenerator>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            store,
            embedder,
            generator,
            audit,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    #[tracing::instrument(skip_all, fields(requester = %requester.id, query_id))]
    pub async fn answer(&self, question: &str, requester: &Requester) -> Result<AnsweredQuery> {
        let question = validate_question(question)?;

        let query = Query {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: requester.id.clone(),
            question: question.to_string(),
            status: QueryStatus::Pending,
            answer: None,
            processing_time: None,
            created_at: now_ts(),
        };
        self.store.insert_query(&query).await?;
        tracing::Span::current().record("query_id", query.id.as_str());
        self.audit
            .record(AuditEvent::new(&requester.id, AuditAction::QueryCreate, &query.id));

        if !self.store.start_query(&query.id).await? {
            return Err(Error::Internal(anyhow::anyhow!(
                "query {} could not be started",
                query.id
            )));
        }

        match self.run(&query.id, question, requester).await {
            Ok(answered) => {
                tracing::info!(
                    citations = answered.citations.len(),
                    processing_time = answered.query.processing_time.unwrap_or_default(),
                    "query answered"
                );
                Ok(answered)
            }
            Err(err) => {
                if let Err(mark_err) = self.store.fail_query(&query.id).await {
                    tracing::error!(error = %mark_err, "could not mark query failed");
                }
                tracing::warn!(error = %err, kind = err.kind(), "query failed");
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        query_id: &str,
        question: &str,
        requester: &Requester,
    ) -> Result<AnsweredQuery> {
        let started = Instant::now();

        let query_vec = ensure_non_empty(self.embedder.embed(question).await?)?;

        let facts = self.store.document_access_facts().await?;
        let scope = accessible_document_ids(requester, &facts);
        if let AccessScope::Only(ids) = &scope {
            tracing::debug!(accessible = ids.len(), "access scope computed");
        }

        let retrieved = self
            .store
            .find_similar(&query_vec, self.top_k, scope.as_filter())
            .await?;
        if retrieved.is_empty() {
            return Err(Error::NotFound("no relevant documents found".to_string()));
        }

        let context = build_context(&retrieved);
        let answer = self.generator.generate_answer(question, &context).await?;
        let processing_time = started.elapsed().as_secs_f64();

        let citations = citations_for(query_id, &retrieved);
        if !self
            .store
            .complete_query(query_id, &answer, processing_time, &citations)
            .await?
        {
            return Err(Error::Internal(anyhow::anyhow!(
                "query {query_id} left processing before completion"
            )));
        }

        let query = self
            .store
            .get_query(query_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("query {query_id}")))?;
        Ok(AnsweredQuery { query, citations })
    }

    pub async fn get_query(&self, id: &str) -> Result<Option<Query>> {
        Ok(self.store.get_query(id).await?)
    }

    pub async fn citations_for_query(&self, id: &str) -> Result<Vec<Citation>> {
        Ok(self.store.citations_for_query(id).await?)
    }

    pub async fn queries_for_owner(&self, owner_id: &str) -> Result<Vec<Query>> {
        Ok(self.store.queries_for_owner(owner_id).await?)
    }
}

/// Trim and length-check a question.
pub fn validate_question(question: &str) -> Result<&str> {
    let trimmed = question.trim();
    let len = trimmed.chars().count();
    if len < MIN_QUESTION_CHARS {
        return Err(Error::Validation(format!(
            "question must be at least {MIN_QUESTION_CHARS} characters"
        )));
    }
    if len > MAX_QUESTION_CHARS {
        return Err(Error::Validation(format!(
            "question must be at most {MAX_QUESTION_CHARS} characters"
        )));
    }
    Ok(trimmed)
}

/// Passage texts in retrieval order, separated by [`CONTEXT_SEPARATOR`].
pub fn build_context(retrieved: &[ScoredPassage]) -> String {
    retrieved
        .iter()
        .map(|s| s.passage.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

fn citations_for(query_id: &str, retrieved: &[ScoredPassage]) -> Vec<Citation> {
    retrieved
        .iter()
        .enumerate()
        .map(|(rank, scored)| Citation {
            id: uuid::Uuid::new_v4().to_string(),
            query_id: query_id.to_string(),
            document_id: scored.passage.document_id.clone(),
            passage_id: scored.passage.id.clone(),
            chunk_index: scored.passage.chunk_index,
            passage_text: scored.passage.text.clone(),
            rank: rank as i64,
            relevance_score: f64::from(scored.similarity).clamp(0.0, 1.0),
        })
        .collect()
}

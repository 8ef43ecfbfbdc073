//! Document ingestion pipeline.
//!
//! Drives one document from raw bytes to searchable passages:
//!
//! ```text
//! pending/failed ──Begin (CAS)──▶ processing ──▶ completed
//!                                     │
//!                                     └──any failure──▶ failed
//! ```
//!
//! 1. Claim the document with a compare-and-set `Begin`. If another run
//!    holds it, or it is already completed, the call is a no-op.
//! 2. Ask the [`TextSource`] for the document's plain text.
//! 3. Chunk it with the document parameters (800/100 unless configured).
//! 4. Embed chunks concurrently, at most `embed_concurrency` in flight,
//!    keeping results in chunk order.
//! 5. Replace every passage of the document and mark it completed in one
//!    write, so a retried run never leaves duplicate or stale chunk indices.
//!
//! The claim carries a per-run token. Each embedded chunk refreshes it, and
//! completion only lands while the token still holds, so a run whose
//! document was reclaimed stops instead of racing its successor.
//!
//! A failure in steps 2 to 5 marks the document failed and returns the
//! error; retry policy belongs to the caller.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};

use crate::chunk::ChunkingParams;
use crate::embedding::{ensure_non_empty, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::models::{now_ts, Document, DocumentStatus, Passage};
use crate::store::Store;

/// Source of a document's extracted plain text.
#[async_trait]
pub trait TextSource: Send + Sync {
    async fn extract_text(&self, document: &Document) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Completed { passages: usize },
    /// The document could not be claimed; `status` is what it was in.
    Skipped { status: DocumentStatus },
}

pub struct IngestionPipeline {
    store: Arc<dyn Store>,
    text: Arc<dyn TextSource>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunking: ChunkingParams,
    embed_concurrency: usize,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<dyn Store>,
        text: Arc<dyn TextSource>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            store,
            text,
            embedder,
            chunking: ChunkingParams::DOCUMENT,
            embed_concurrency: 4,
        }
    }

    pub fn with_chunking(mut self, chunking: ChunkingParams) -> Self {
        self.chunking = chunking;
        self
    }

    pub fn with_embed_concurrency(mut self, embed_concurrency: usize) -> Self {
        self.embed_concurrency = embed_concurrency.max(1);
        self
    }

    #[tracing::instrument(skip(self))]
    pub async fn ingest(&self, document_id: &str) -> Result<IngestOutcome> {
        let claim = uuid::Uuid::new_v4().to_string();
        if !self
            .store
            .claim_document(document_id, &claim, now_ts())
            .await?
        {
            let status = self
                .store
                .get_document(document_id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("document {document_id}")))?
                .status;
            tracing::debug!(%status, "document not claimable, skipping");
            return Ok(IngestOutcome::Skipped { status });
        }

        let started = std::time::Instant::now();
        match self.process(document_id, &claim).await {
            Ok(passages) => {
                tracing::info!(
                    passages,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "document ingested"
                );
                Ok(IngestOutcome::Completed { passages })
            }
            Err(err) => {
                match self.store.fail_claimed(document_id, &claim, now_ts()).await {
                    Ok(true) => {}
                    Ok(false) => tracing::debug!("claim already lost, status left alone"),
                    Err(mark_err) => {
                        tracing::error!(error = %mark_err, "could not mark document failed")
                    }
                }
                tracing::warn!(error = %err, kind = err.kind(), "ingestion failed");
                Err(err)
            }
        }
    }

    async fn process(&self, document_id: &str, claim: &str) -> Result<usize> {
        let document = self
            .store
            .get_document(document_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("document {document_id}")))?;

        let text = self.text.extract_text(&document).await?;
        let chunks = self.chunking.chunk(&text);
        if chunks.is_empty() {
            return Err(Error::Parsing("document contains no text".to_string()));
        }

        // Every embedded chunk refreshes the claim, so a long run is not
        // mistaken for a dead one by the reconciler.
        let embeds: Vec<_> = chunks
            .iter()
            .map(|chunk| async move {
                let vector = ensure_non_empty(self.embedder.embed(&chunk.text).await?)?;
                self.heartbeat(document_id, claim).await?;
                Ok::<_, Error>(vector)
            })
            .collect();
        let vectors: Vec<Vec<f32>> = stream::iter(embeds)
        .buffered(self.embed_concurrency)
        .try_collect()
        .await?;

        let model = self.embedder.model_name().to_string();
        let passages: Vec<Passage> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| Passage {
                id: uuid::Uuid::new_v4().to_string(),
                document_id: document.id.clone(),
                chunk_index: chunk.index as i64,
                text: chunk.text,
                vector,
                model: model.clone(),
            })
            .collect();

        if !self
            .store
            .complete_claimed(&document.id, claim, &passages, now_ts())
            .await?
        {
            return Err(lost_claim(document_id));
        }
        Ok(passages.len())
    }

    async fn heartbeat(&self, document_id: &str, claim: &str) -> Result<()> {
        if self
            .store
            .refresh_claim(document_id, claim, now_ts())
            .await?
        {
            Ok(())
        } else {
            Err(lost_claim(document_id))
        }
    }
}

fn lost_claim(document_id: &str) -> Error {
    Error::Internal(anyhow::anyhow!(
        "document {document_id} was reclaimed during ingestion"
    ))
}

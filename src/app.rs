//! Wiring: builds the core pipelines on top of the SQLite store, the
//! filesystem blob store and the Ollama providers described by a [`Config`].
//!
//! Providers are constructed on demand so commands that never call the
//! embedding or generation service (upload, listing, deletion) work with
//! `[embedding] provider = "disabled"`.

use std::sync::Arc;

use anyhow::Result;

use docqa_core::audit::AuditSink;
use docqa_core::blob::BlobStore;
use docqa_core::ingest::IngestionPipeline;
use docqa_core::query::QueryOrchestrator;
use docqa_core::store::Store;
use docqa_core::upload::DocumentIntake;

use crate::audit::TracingAuditSink;
use crate::blobs::{BlobTextSource, FsBlobStore};
use crate::config::Config;
use crate::db;
use crate::ollama;
use crate::sqlite_store::SqliteStore;
use crate::worker::Worker;

pub struct App {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub blobs: Arc<dyn BlobStore>,
    audit: Arc<dyn AuditSink>,
}

impl App {
    /// Connect to the configured database. The schema must already exist
    /// (`docqa init`).
    pub async fn open(config: Config) -> Result<Self> {
        let pool = db::connect(&config).await?;
        let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));
        let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(&config.storage.files_dir));
        Ok(Self {
            config,
            store,
            blobs,
            audit: Arc::new(TracingAuditSink),
        })
    }

    pub fn intake(&self) -> DocumentIntake {
        DocumentIntake::new(self.store.clone(), self.blobs.clone(), self.audit.clone())
    }

    pub fn pipeline(&self) -> Result<IngestionPipeline> {
        let embedder = ollama::create_embedder(&self.config.embedding)?;
        let text = Arc::new(BlobTextSource::new(self.blobs.clone()));
        Ok(IngestionPipeline::new(self.store.clone(), text, embedder)
            .with_chunking(self.config.chunking.document())
            .with_embed_concurrency(self.config.embedding.concurrency))
    }

    pub fn orchestrator(&self) -> Result<QueryOrchestrator> {
        let embedder = ollama::create_embedder(&self.config.embedding)?;
        let generator = ollama::create_generator(&self.config.generation)?;
        Ok(
            QueryOrchestrator::new(self.store.clone(), embedder, generator, self.audit.clone())
                .with_top_k(self.config.retrieval.top_k),
        )
    }

    pub fn worker(&self) -> Result<Worker> {
        Ok(Worker::new(
            self.store.clone(),
            Arc::new(self.pipeline()?),
            self.config.ingestion.clone(),
        ))
    }
}

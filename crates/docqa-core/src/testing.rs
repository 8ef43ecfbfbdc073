//! Scripted collaborators shared by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::audit::{AuditAction, AuditEvent, AuditSink};
use crate::embedding::{AnswerGenerator, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::ingest::TextSource;
use crate::models::{Document, DocumentStatus};

/// Keeps audit events in memory.
#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<AuditEvent>>,
}

impl RecordingSink {
    pub fn actions(&self) -> Vec<AuditAction> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.action)
            .collect()
    }
}

impl AuditSink for RecordingSink {
    fn record(&self, event: AuditEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Embeds text by looking it up in a table, falling back to a vector
/// derived from the text length. Optionally delays longer texts less, so
/// that concurrent calls complete out of order.
#[derive(Default)]
pub struct FakeEmbedder {
    pub table: HashMap<String, Vec<f32>>,
    pub fail_with: Option<fn() -> Error>,
    pub reverse_latency: bool,
    pub calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.table.insert(text.to_string(), vector);
        self
    }

    pub fn failing(fail_with: fn() -> Error) -> Self {
        Self {
            fail_with: Some(fail_with),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbedder {
    fn model_name(&self) -> &str {
        "fake-embed"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(make_err) = self.fail_with {
            return Err(make_err());
        }
        if self.reverse_latency {
            let delay = 40u64.saturating_sub(text.len() as u64 / 10);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(self
            .table
            .get(text)
            .cloned()
            .unwrap_or_else(|| vec![text.len() as f32, 1.0, 0.0]))
    }
}

/// Answers with a fixed string and remembers the context it was given.
#[derive(Default)]
pub struct FakeGenerator {
    pub fail_with: Option<fn() -> Error>,
    pub contexts: Mutex<Vec<String>>,
}

impl FakeGenerator {
    pub fn failing(fail_with: fn() -> Error) -> Self {
        Self {
            fail_with: Some(fail_with),
            ..Self::default()
        }
    }

    pub fn last_context(&self) -> Option<String> {
        self.contexts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl AnswerGenerator for FakeGenerator {
    fn model_name(&self) -> &str {
        "fake-llm"
    }

    async fn generate_answer(&self, question: &str, context: &str) -> Result<String> {
        self.contexts.lock().unwrap().push(context.to_string());
        if let Some(make_err) = self.fail_with {
            return Err(make_err());
        }
        Ok(format!("Answer to: {question}"))
    }
}

/// Serves document text from a table keyed by document id.
#[derive(Default)]
pub struct StaticText {
    pub texts: HashMap<String, String>,
}

impl StaticText {
    pub fn with(mut self, document_id: &str, text: &str) -> Self {
        self.texts.insert(document_id.to_string(), text.to_string());
        self
    }
}

#[async_trait]
impl TextSource for StaticText {
    async fn extract_text(&self, document: &Document) -> Result<String> {
        self.texts
            .get(&document.id)
            .cloned()
            .ok_or_else(|| Error::Parsing(format!("no text for {}", document.id)))
    }
}

pub fn sample_document(id: &str, owner: &str) -> Document {
    Document {
        id: id.to_string(),
        owner_id: owner.to_string(),
        title: format!("Document {id}"),
        filename: format!("{id}.txt"),
        mime_type: "text/plain".to_string(),
        byte_size: 100,
        content_hash: format!("hash-{id}"),
        shareable: false,
        classification: "unclassified".to_string(),
        status: DocumentStatus::Pending,
        created_at: 1,
        updated_at: 1,
        processed_at: None,
    }
}

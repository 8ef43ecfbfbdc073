//! Core data models used throughout docqa.
//!
//! These types represent the documents, passages, queries and citations
//! that flow through the ingestion and query pipelines. Timestamps are
//! Unix seconds.

use serde::Serialize;

/// Lifecycle of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Events that move a document through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentEvent {
    /// An ingestion run claims the document.
    Begin,
    Complete,
    Fail,
}

impl DocumentEvent {
    /// The state every legal application of this event lands in.
    pub fn target(self) -> DocumentStatus {
        match self {
            DocumentEvent::Begin => DocumentStatus::Processing,
            DocumentEvent::Complete => DocumentStatus::Completed,
            DocumentEvent::Fail => DocumentStatus::Failed,
        }
    }
}

impl DocumentStatus {
    pub const ALL: [DocumentStatus; 4] = [
        DocumentStatus::Pending,
        DocumentStatus::Processing,
        DocumentStatus::Completed,
        DocumentStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    /// The state reached by applying `event`, or `None` if the transition
    /// is illegal.
    pub fn apply(self, event: DocumentEvent) -> Option<DocumentStatus> {
        use DocumentEvent as E;
        use DocumentStatus as S;
        match (self, event) {
            (S::Pending, E::Begin) | (S::Failed, E::Begin) => Some(S::Processing),
            (S::Processing, E::Complete) => Some(S::Completed),
            (S::Processing, E::Fail) => Some(S::Failed),
            (S::Processing, E::Begin)
            | (S::Completed, E::Begin)
            | (S::Pending, E::Complete)
            | (S::Completed, E::Complete)
            | (S::Failed, E::Complete)
            | (S::Pending, E::Fail)
            | (S::Completed, E::Fail)
            | (S::Failed, E::Fail) => None,
        }
    }

    /// Every state from which `event` is legal.
    ///
    /// Stores use this to build their compare-and-set predicate.
    pub fn sources_for(event: DocumentEvent) -> Vec<DocumentStatus> {
        Self::ALL
            .into_iter()
            .filter(|status| status.apply(event).is_some())
            .collect()
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An uploaded document and its processing state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub filename: String,
    pub mime_type: String,
    pub byte_size: i64,
    /// SHA-256 of the raw upload, hex encoded. Globally unique.
    pub content_hash: String,
    /// Generally shareable reference material, visible to every requester.
    pub shareable: bool,
    pub classification: String,
    pub status: DocumentStatus,
    pub created_at: i64,
    pub updated_at: i64,
    pub processed_at: Option<i64>,
}

/// A chunk of document text stored with its embedding vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Passage {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    #[serde(skip)]
    pub vector: Vec<f32>,
    /// Identifier of the embedding model that produced `vector`.
    pub model: String,
}

/// A passage returned from similarity search, with its cosine similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPassage {
    pub passage: Passage,
    pub similarity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryEvent {
    Start,
    Complete,
    Fail,
}

impl QueryEvent {
    pub fn target(self) -> QueryStatus {
        match self {
            QueryEvent::Start => QueryStatus::Processing,
            QueryEvent::Complete => QueryStatus::Completed,
            QueryEvent::Fail => QueryStatus::Failed,
        }
    }
}

impl QueryStatus {
    pub const ALL: [QueryStatus; 4] = [
        QueryStatus::Pending,
        QueryStatus::Processing,
        QueryStatus::Completed,
        QueryStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryStatus::Pending => "pending",
            QueryStatus::Processing => "processing",
            QueryStatus::Completed => "completed",
            QueryStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, QueryStatus::Completed | QueryStatus::Failed)
    }

    /// Transitions are monotonic: nothing leaves a terminal state.
    pub fn apply(self, event: QueryEvent) -> Option<QueryStatus> {
        use QueryEvent as E;
        use QueryStatus as S;
        match (self, event) {
            (S::Pending, E::Start) => Some(S::Processing),
            (S::Processing, E::Complete) => Some(S::Completed),
            (S::Processing, E::Fail) => Some(S::Failed),
            (S::Processing, E::Start)
            | (S::Completed, _)
            | (S::Failed, _)
            | (S::Pending, E::Complete)
            | (S::Pending, E::Fail) => None,
        }
    }

    pub fn sources_for(event: QueryEvent) -> Vec<QueryStatus> {
        Self::ALL
            .into_iter()
            .filter(|status| status.apply(event).is_some())
            .collect()
    }
}

impl std::fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A question asked by a requester and, once completed, its answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Query {
    pub id: String,
    pub owner_id: String,
    pub question: String,
    pub status: QueryStatus,
    pub answer: Option<String>,
    /// Wall-clock seconds spent answering.
    pub processing_time: Option<f64>,
    pub created_at: i64,
}

/// Provenance record linking a query's answer to one retrieved passage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    pub id: String,
    pub query_id: String,
    pub document_id: String,
    pub passage_id: String,
    pub chunk_index: i64,
    /// Text of the cited passage as retrieved. Kept on the citation so it
    /// survives re-ingestion replacing the passage row.
    pub passage_text: String,
    /// Position in similarity-descending retrieval order, starting at 0.
    pub rank: i64,
    /// Cosine similarity at retrieval time, clamped to `[0, 1]`.
    pub relevance_score: f64,
}

/// Access facts about one document, as needed by the access filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentAccess {
    pub document_id: String,
    pub owner_id: String,
    pub shareable: bool,
}

/// Current Unix time in seconds.
pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Format a Unix timestamp as ISO 8601.
pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}

//! SQLite store and the pipelines running on top of it, against a real
//! database file in a temporary directory.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use docqa::blobs::{BlobTextSource, FsBlobStore};
use docqa::config::{load_config, Config};
use docqa::sqlite_store::SqliteStore;
use docqa::stats::collect_stats;
use docqa::{db, migrate};
use docqa_core::access::{Requester, Role};
use docqa_core::audit::NoopAuditSink;
use docqa_core::blob::BlobStore;
use docqa_core::embedding::{AnswerGenerator, EmbeddingProvider};
use docqa_core::ingest::{IngestOutcome, IngestionPipeline};
use docqa_core::models::{
    Citation, Document, DocumentEvent, DocumentStatus, Passage, Query, QueryStatus,
};
use docqa_core::query::QueryOrchestrator;
use docqa_core::store::{Store, VectorIndex};
use docqa_core::upload::{DocumentIntake, UploadRequest, MIME_TEXT};

fn test_config(root: &std::path::Path) -> Config {
    let config_path = root.join("docqa.toml");
    fs::write(
        &config_path,
        format!(
            r#"[db]
path = "{root}/data/docqa.sqlite"

[storage]
files_dir = "{root}/files"

[embedding]
provider = "disabled"
"#,
            root = root.display()
        ),
    )
    .unwrap();
    load_config(&config_path).unwrap()
}

async fn open_store() -> (TempDir, Config, Arc<SqliteStore>) {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let pool = db::connect(&config).await.unwrap();
    migrate::apply(&pool).await.unwrap();
    (tmp, config, Arc::new(SqliteStore::new(pool)))
}

fn document(id: &str, hash: &str, owner: &str, created_at: i64) -> Document {
    Document {
        id: id.to_string(),
        owner_id: owner.to_string(),
        title: format!("Doc {id}"),
        filename: format!("{id}.txt"),
        mime_type: MIME_TEXT.to_string(),
        byte_size: 42,
        content_hash: hash.to_string(),
        shareable: false,
        classification: "unclassified".to_string(),
        status: DocumentStatus::Pending,
        created_at,
        updated_at: created_at,
        processed_at: None,
    }
}

fn passage(doc: &str, index: i64, vector: Vec<f32>) -> Passage {
    Passage {
        id: format!("{doc}-p{index}"),
        document_id: doc.to_string(),
        chunk_index: index,
        text: format!("passage {index} of {doc}"),
        vector,
        model: "test".to_string(),
    }
}

fn query(id: &str, owner: &str) -> Query {
    Query {
        id: id.to_string(),
        owner_id: owner.to_string(),
        question: "What is in the documents?".to_string(),
        status: QueryStatus::Pending,
        answer: None,
        processing_time: None,
        created_at: 10,
    }
}

fn citation(query_id: &str, doc: &str, rank: i64) -> Citation {
    Citation {
        id: format!("{query_id}-c{rank}"),
        query_id: query_id.to_string(),
        document_id: doc.to_string(),
        passage_id: format!("{doc}-p0"),
        chunk_index: 0,
        passage_text: format!("{doc} passage 0"),
        rank,
        relevance_score: 0.5,
    }
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let (_tmp, _config, store) = open_store().await;
    migrate::apply(store.pool()).await.unwrap();
    assert!(store.list_documents(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_fingerprint_returns_existing_row() {
    let (_tmp, _config, store) = open_store().await;
    let first = store.insert_document(&document("a", "h1", "alice", 1)).await.unwrap();
    assert_eq!(first.id, "a");

    let second = store.insert_document(&document("b", "h1", "bob", 2)).await.unwrap();
    assert_eq!(second.id, "a");
    assert_eq!(second.owner_id, "alice");
    assert_eq!(store.list_documents(None).await.unwrap().len(), 1);
    assert!(store.get_document("b").await.unwrap().is_none());
}

#[tokio::test]
async fn documents_round_trip_and_list_newest_first() {
    let (_tmp, _config, store) = open_store().await;
    let mut shared = document("old", "h1", "alice", 1);
    shared.shareable = true;
    store.insert_document(&shared).await.unwrap();
    store.insert_document(&document("new", "h2", "bob", 5)).await.unwrap();

    let listed: Vec<String> = store
        .list_documents(None)
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.id)
        .collect();
    assert_eq!(listed, vec!["new", "old"]);

    let fetched = store.get_document("old").await.unwrap().unwrap();
    assert_eq!(fetched, shared);
    assert_eq!(
        store.find_document_by_hash("h2").await.unwrap().unwrap().id,
        "new"
    );

    let facts = store.document_access_facts().await.unwrap();
    assert_eq!(facts.len(), 2);
    assert!(facts.iter().any(|f| f.document_id == "old" && f.shareable));
}

#[tokio::test]
async fn status_transitions_are_compare_and_set() {
    let (_tmp, _config, store) = open_store().await;
    store.insert_document(&document("a", "h1", "alice", 1)).await.unwrap();

    assert!(store.transition_document("a", DocumentEvent::Begin, 10).await.unwrap());
    assert!(!store.transition_document("a", DocumentEvent::Begin, 11).await.unwrap());
    assert_eq!(
        store.list_documents(Some(DocumentStatus::Processing)).await.unwrap().len(),
        1
    );

    assert!(store.transition_document("a", DocumentEvent::Complete, 20).await.unwrap());
    let doc = store.get_document("a").await.unwrap().unwrap();
    assert_eq!(doc.status, DocumentStatus::Completed);
    assert_eq!(doc.processed_at, Some(20));
    assert_eq!(doc.updated_at, 20);

    assert!(!store.transition_document("a", DocumentEvent::Begin, 30).await.unwrap());
    assert!(!store.transition_document("missing", DocumentEvent::Begin, 30).await.unwrap());
}

#[tokio::test]
async fn claimed_runs_only_complete_while_holding_the_claim() {
    let (_tmp, _config, store) = open_store().await;
    store.insert_document(&document("a", "h1", "alice", 1)).await.unwrap();

    assert!(store.claim_document("a", "run-1", 10).await.unwrap());
    assert!(!store.claim_document("a", "run-2", 11).await.unwrap());
    assert!(store.refresh_claim("a", "run-1", 12).await.unwrap());
    assert_eq!(store.get_document("a").await.unwrap().unwrap().updated_at, 12);

    // Reclaimed and picked up by a second run.
    assert!(store.transition_document("a", DocumentEvent::Fail, 20).await.unwrap());
    assert!(store.claim_document("a", "run-2", 21).await.unwrap());

    assert!(!store.refresh_claim("a", "run-1", 22).await.unwrap());
    assert!(!store
        .complete_claimed("a", "run-1", &[passage("a", 0, vec![1.0])], 23)
        .await
        .unwrap());
    assert!(!store.fail_claimed("a", "run-1", 23).await.unwrap());
    assert!(store.passages_for_document("a").await.unwrap().is_empty());

    let passages = vec![passage("a", 0, vec![1.0]), passage("a", 1, vec![0.5])];
    assert!(store.complete_claimed("a", "run-2", &passages, 30).await.unwrap());
    let doc = store.get_document("a").await.unwrap().unwrap();
    assert_eq!(doc.status, DocumentStatus::Completed);
    assert_eq!(doc.processed_at, Some(30));
    assert_eq!(store.passages_for_document("a").await.unwrap().len(), 2);
}

#[tokio::test]
async fn stale_processing_documents_by_age() {
    let (_tmp, _config, store) = open_store().await;
    store.insert_document(&document("stuck", "h1", "alice", 1)).await.unwrap();
    store.insert_document(&document("fresh", "h2", "alice", 1)).await.unwrap();
    store.transition_document("stuck", DocumentEvent::Begin, 100).await.unwrap();
    store.transition_document("fresh", DocumentEvent::Begin, 900).await.unwrap();

    assert_eq!(
        store.stale_processing_documents(500).await.unwrap(),
        vec!["stuck".to_string()]
    );
}

#[tokio::test]
async fn replace_passages_swaps_the_whole_set() {
    let (_tmp, _config, store) = open_store().await;
    store.insert_document(&document("a", "h1", "alice", 1)).await.unwrap();
    store
        .replace_passages(
            "a",
            &[
                passage("a", 0, vec![1.0, 0.0]),
                passage("a", 1, vec![0.0, 1.0]),
                passage("a", 2, vec![1.0, 1.0]),
            ],
        )
        .await
        .unwrap();
    assert_eq!(store.passages_for_document("a").await.unwrap().len(), 3);

    let mut replacement = passage("a", 0, vec![0.5, 0.5]);
    replacement.id = "a-new".to_string();
    store.replace_passages("a", &[replacement]).await.unwrap();

    let passages = store.passages_for_document("a").await.unwrap();
    assert_eq!(passages.len(), 1);
    assert_eq!(passages[0].id, "a-new");
    assert_eq!(passages[0].vector, vec![0.5, 0.5]);
}

#[tokio::test]
async fn find_similar_filters_before_ranking() {
    let (_tmp, _config, store) = open_store().await;
    store.insert_document(&document("mine", "h1", "alice", 1)).await.unwrap();
    store.insert_document(&document("theirs", "h2", "bob", 1)).await.unwrap();
    store
        .replace_passages("mine", &[passage("mine", 0, vec![0.6, 0.8])])
        .await
        .unwrap();
    store
        .replace_passages(
            "theirs",
            &[
                passage("theirs", 0, vec![1.0, 0.0]),
                passage("theirs", 1, vec![0.99, 0.1]),
            ],
        )
        .await
        .unwrap();

    let everything = store.find_similar(&[1.0, 0.0], 2, None).await.unwrap();
    assert_eq!(everything.len(), 2);
    assert!(everything.iter().all(|s| s.passage.document_id == "theirs"));
    assert!(everything[0].similarity >= everything[1].similarity);

    let allowed: HashSet<String> = ["mine".to_string()].into_iter().collect();
    let filtered = store.find_similar(&[1.0, 0.0], 2, Some(&allowed)).await.unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].passage.document_id, "mine");
    assert!((filtered[0].similarity - 0.6).abs() < 1e-5);

    let nothing: HashSet<String> = HashSet::new();
    assert!(store
        .find_similar(&[1.0, 0.0], 2, Some(&nothing))
        .await
        .unwrap()
        .is_empty());
    assert!(store.find_similar(&[1.0, 0.0], 0, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn query_lifecycle_and_citations() {
    let (_tmp, _config, store) = open_store().await;
    store.insert_document(&document("a", "h1", "alice", 1)).await.unwrap();
    store.insert_query(&query("q1", "alice")).await.unwrap();

    // Completing before starting is refused and writes nothing.
    assert!(!store
        .complete_query("q1", "early", 0.1, &[citation("q1", "a", 0)])
        .await
        .unwrap());
    assert!(store.citations_for_query("q1").await.unwrap().is_empty());

    assert!(store.start_query("q1").await.unwrap());
    assert!(!store.start_query("q1").await.unwrap());
    assert!(store
        .complete_query(
            "q1",
            "The answer.",
            1.25,
            &[citation("q1", "a", 1), citation("q1", "a", 0)]
        )
        .await
        .unwrap());

    let stored = store.get_query("q1").await.unwrap().unwrap();
    assert_eq!(stored.status, QueryStatus::Completed);
    assert_eq!(stored.answer.as_deref(), Some("The answer."));
    assert_eq!(stored.processing_time, Some(1.25));

    let ranks: Vec<i64> = store
        .citations_for_query("q1")
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.rank)
        .collect();
    assert_eq!(ranks, vec![0, 1]);

    assert!(!store.fail_query("q1").await.unwrap());
    assert_eq!(store.queries_for_owner("alice").await.unwrap().len(), 1);
    assert!(store.queries_for_owner("bob").await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_query_keeps_no_answer() {
    let (_tmp, _config, store) = open_store().await;
    store.insert_query(&query("q1", "alice")).await.unwrap();
    assert!(store.start_query("q1").await.unwrap());
    assert!(store.fail_query("q1").await.unwrap());
    let stored = store.get_query("q1").await.unwrap().unwrap();
    assert_eq!(stored.status, QueryStatus::Failed);
    assert!(stored.answer.is_none());
}

#[tokio::test]
async fn deleting_a_document_cascades_to_passages_and_citations() {
    let (_tmp, _config, store) = open_store().await;
    store.insert_document(&document("a", "h1", "alice", 1)).await.unwrap();
    store.insert_document(&document("b", "h2", "alice", 1)).await.unwrap();
    store
        .replace_passages("a", &[passage("a", 0, vec![1.0])])
        .await
        .unwrap();
    store.insert_query(&query("q1", "alice")).await.unwrap();
    store.start_query("q1").await.unwrap();
    store
        .complete_query(
            "q1",
            "answer",
            0.5,
            &[citation("q1", "a", 0), citation("q1", "b", 1)],
        )
        .await
        .unwrap();

    assert!(store.delete_document("a").await.unwrap());
    assert!(!store.delete_document("a").await.unwrap());
    assert!(store.passages_for_document("a").await.unwrap().is_empty());

    let remaining = store.citations_for_query("q1").await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].document_id, "b");
    assert!(store.get_query("q1").await.unwrap().is_some());
}

/// Embeds by keyword: texts mentioning "dose" point one way, the rest another.
struct KeywordEmbedder;

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword"
    }

    async fn embed(&self, text: &str) -> docqa_core::Result<Vec<f32>> {
        if text.to_lowercase().contains("dose") {
            Ok(vec![1.0, 0.1])
        } else {
            Ok(vec![0.1, 1.0])
        }
    }
}

struct EchoGenerator;

#[async_trait]
impl AnswerGenerator for EchoGenerator {
    fn model_name(&self) -> &str {
        "echo"
    }

    async fn generate_answer(&self, question: &str, context: &str) -> docqa_core::Result<String> {
        Ok(format!("{question} => {} context chars", context.len()))
    }
}

#[tokio::test]
async fn upload_ingest_ask_delete_end_to_end() {
    let (_tmp, config, store) = open_store().await;
    let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(&config.storage.files_dir));
    let intake = DocumentIntake::new(store.clone(), blobs.clone(), Arc::new(NoopAuditSink));
    let alice = Requester::new("alice", Role::Doctor);

    let upload = |name: &str, body: &str, shareable: bool| UploadRequest {
        filename: name.to_string(),
        mime_type: MIME_TEXT.to_string(),
        bytes: body.as_bytes().to_vec(),
        title: None,
        shareable,
        classification: None,
    };

    let dosing = intake
        .upload(
            &alice,
            upload(
                "dosing.txt",
                "The recommended dose is 5mg daily.\n\nDo not exceed the dose.",
                false,
            ),
        )
        .await
        .unwrap();
    assert!(!dosing.is_duplicate());
    let dosing_id = dosing.document().id.clone();
    assert_eq!(dosing.document().title, "dosing");

    let again = intake
        .upload(
            &alice,
            upload(
                "copy.txt",
                "The recommended dose is 5mg daily.\n\nDo not exceed the dose.",
                false,
            ),
        )
        .await
        .unwrap();
    assert!(again.is_duplicate());
    assert_eq!(again.document().id, dosing_id);

    let pipeline = IngestionPipeline::new(
        store.clone(),
        Arc::new(BlobTextSource::new(blobs.clone())),
        Arc::new(KeywordEmbedder),
    );
    let outcome = pipeline.ingest(&dosing_id).await.unwrap();
    assert_eq!(outcome, IngestOutcome::Completed { passages: 1 });
    assert_eq!(
        store.get_document(&dosing_id).await.unwrap().unwrap().status,
        DocumentStatus::Completed
    );

    let orchestrator = QueryOrchestrator::new(
        store.clone(),
        Arc::new(KeywordEmbedder),
        Arc::new(EchoGenerator),
        Arc::new(NoopAuditSink),
    );
    let answered = orchestrator
        .answer("What dose should be taken?", &alice)
        .await
        .unwrap();
    assert_eq!(answered.query.status, QueryStatus::Completed);
    assert_eq!(answered.citations.len(), 1);
    assert_eq!(answered.citations[0].document_id, dosing_id);
    let passages = store.passages_for_document(&dosing_id).await.unwrap();
    let persisted = store
        .citations_for_query(&answered.query.id)
        .await
        .unwrap();
    assert_eq!(persisted[0].passage_text, passages[0].text);

    // Bob cannot see Alice's private document.
    let bob = Requester::new("bob", Role::Researcher);
    let err = orchestrator
        .answer("What dose should be taken?", &bob)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "not_found");

    let deleted = intake.delete(&alice, &dosing_id).await.unwrap();
    assert_eq!(deleted.id, dosing_id);
    assert!(store
        .citations_for_query(&answered.query.id)
        .await
        .unwrap()
        .is_empty());
    assert!(blobs
        .get(&deleted.content_hash)
        .await
        .unwrap()
        .is_none());
}

#[test]
fn config_paths_come_from_file() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    assert_eq!(
        config.storage.files_dir,
        PathBuf::from(format!("{}/files", tmp.path().display()))
    );
    assert!(!config.embedding.is_enabled());
}

#[tokio::test]
async fn stats_group_documents_passages_and_queries() {
    let (_tmp, _config, store) = open_store().await;
    store.insert_document(&document("a", "h1", "alice", 1)).await.unwrap();
    store.insert_document(&document("b", "h2", "alice", 2)).await.unwrap();
    store.insert_document(&document("c", "h3", "bob", 3)).await.unwrap();
    store
        .replace_passages("a", &[passage("a", 0, vec![1.0]), passage("a", 1, vec![0.5])])
        .await
        .unwrap();
    store.upsert_passage(&passage("b", 0, vec![1.0])).await.unwrap();
    assert!(store.transition_document("a", DocumentEvent::Begin, 5).await.unwrap());

    for (id, time) in [("q1", 1.0), ("q2", 2.0)] {
        store.insert_query(&query(id, "alice")).await.unwrap();
        store.start_query(id).await.unwrap();
        assert!(store
            .complete_query(id, "answer", time, &[citation(id, "a", 0)])
            .await
            .unwrap());
    }
    store.insert_query(&query("q3", "bob")).await.unwrap();
    store.start_query("q3").await.unwrap();
    store.fail_query("q3").await.unwrap();

    let stats = collect_stats(store.pool()).await.unwrap();
    assert_eq!(stats.documents, 3);
    assert_eq!(
        stats.documents_by_status,
        vec![("pending".to_string(), 2), ("processing".to_string(), 1)]
    );
    assert_eq!(stats.top_uploaders[0], ("alice".to_string(), 2));
    assert_eq!(stats.passages, 3);
    assert_eq!(stats.passages_by_model, vec![("test".to_string(), 3)]);
    assert_eq!(stats.documents_with_passages, 2);
    assert_eq!(stats.avg_passages_per_document(), 1.0);
    assert_eq!(stats.queries, 3);
    assert_eq!(
        stats.queries_by_status,
        vec![("completed".to_string(), 2), ("failed".to_string(), 1)]
    );
    assert_eq!(stats.queries_with_citations, 2);
    assert_eq!(stats.avg_processing_time, Some(1.5));
}

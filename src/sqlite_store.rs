//! SQLite-backed [`Store`] implementation.
//!
//! Vectors are stored as little-endian f32 BLOBs in `passages.embedding`.
//! Similarity search loads candidate rows and ranks them with
//! [`rank_passages`], the same function the in-memory store uses.
//!
//! Status changes are single `UPDATE … WHERE status IN (…)` statements, so
//! SQLite's write lock makes them compare-and-set. An ingestion run's
//! claim token is matched in the same `WHERE` clause. Passage replacement,
//! document deletion and query completion each run in one transaction.

use std::collections::HashSet;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use docqa_core::embedding::{blob_to_vec, vec_to_blob};
use docqa_core::index::rank_passages;
use docqa_core::models::{
    Citation, Document, DocumentAccess, DocumentEvent, DocumentStatus, Passage, Query,
    QueryEvent, QueryStatus, ScoredPassage,
};
use docqa_core::store::{Store, VectorIndex};

const DOCUMENT_COLUMNS: &str = "id, owner_id, title, filename, mime_type, byte_size, content_hash, \
     shareable, classification, status, created_at, updated_at, processed_at";

const QUERY_COLUMNS: &str =
    "id, owner_id, question, status, answer, processing_time, created_at";

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Delete every passage of `document_id` and insert `passages`, inside `tx`.
async fn write_passages(
    tx: &mut Transaction<'_, Sqlite>,
    document_id: &str,
    passages: &[Passage],
) -> Result<()> {
    sqlx::query("DELETE FROM passages WHERE document_id = ?")
        .bind(document_id)
        .execute(&mut **tx)
        .await?;

    for passage in passages {
        sqlx::query(
            "INSERT INTO passages (id, document_id, chunk_index, text, embedding, model) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&passage.id)
        .bind(document_id)
        .bind(passage.chunk_index)
        .bind(&passage.text)
        .bind(vec_to_blob(&passage.vector))
        .bind(&passage.model)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

fn document_from_row(row: &SqliteRow) -> Result<Document> {
    let status: String = row.try_get("status")?;
    Ok(Document {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        title: row.try_get("title")?,
        filename: row.try_get("filename")?,
        mime_type: row.try_get("mime_type")?,
        byte_size: row.try_get("byte_size")?,
        content_hash: row.try_get("content_hash")?,
        shareable: row.try_get("shareable")?,
        classification: row.try_get("classification")?,
        status: DocumentStatus::parse(&status)
            .ok_or_else(|| anyhow!("unknown document status in database: {status}"))?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        processed_at: row.try_get("processed_at")?,
    })
}

fn passage_from_row(row: &SqliteRow) -> Result<Passage> {
    let blob: Vec<u8> = row.try_get("embedding")?;
    Ok(Passage {
        id: row.try_get("id")?,
        document_id: row.try_get("document_id")?,
        chunk_index: row.try_get("chunk_index")?,
        text: row.try_get("text")?,
        vector: blob_to_vec(&blob),
        model: row.try_get("model")?,
    })
}

fn query_from_row(row: &SqliteRow) -> Result<Query> {
    let status: String = row.try_get("status")?;
    Ok(Query {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        question: row.try_get("question")?,
        status: QueryStatus::parse(&status)
            .ok_or_else(|| anyhow!("unknown query status in database: {status}"))?,
        answer: row.try_get("answer")?,
        processing_time: row.try_get("processing_time")?,
        created_at: row.try_get("created_at")?,
    })
}

fn citation_from_row(row: &SqliteRow) -> Result<Citation> {
    Ok(Citation {
        id: row.try_get("id")?,
        query_id: row.try_get("query_id")?,
        document_id: row.try_get("document_id")?,
        passage_id: row.try_get("passage_id")?,
        chunk_index: row.try_get("chunk_index")?,
        passage_text: row.try_get("passage_text")?,
        rank: row.try_get("rank")?,
        relevance_score: row.try_get("relevance_score")?,
    })
}

#[async_trait]
impl VectorIndex for SqliteStore {
    async fn replace_passages(&self, document_id: &str, passages: &[Passage]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        write_passages(&mut tx, document_id, passages).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn upsert_passage(&self, passage: &Passage) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO passages (id, document_id, chunk_index, text, embedding, model)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(document_id, chunk_index) DO UPDATE SET
                id = excluded.id,
                text = excluded.text,
                embedding = excluded.embedding,
                model = excluded.model
            "#,
        )
        .bind(&passage.id)
        .bind(&passage.document_id)
        .bind(passage.chunk_index)
        .bind(&passage.text)
        .bind(vec_to_blob(&passage.vector))
        .bind(&passage.model)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn passages_for_document(&self, document_id: &str) -> Result<Vec<Passage>> {
        let rows = sqlx::query(
            "SELECT id, document_id, chunk_index, text, embedding, model FROM passages \
             WHERE document_id = ? ORDER BY chunk_index",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(passage_from_row).collect()
    }

    async fn find_similar(
        &self,
        query_vec: &[f32],
        k: usize,
        allowed: Option<&HashSet<String>>,
    ) -> Result<Vec<ScoredPassage>> {
        if k == 0 || allowed.is_some_and(|ids| ids.is_empty()) {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT id, document_id, chunk_index, text, embedding, model FROM passages",
        )
        .fetch_all(&self.pool)
        .await?;
        let passages = rows
            .iter()
            .map(passage_from_row)
            .collect::<Result<Vec<_>>>()?;

        Ok(rank_passages(passages, query_vec, k, allowed))
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_document(&self, doc: &Document) -> Result<Document> {
        sqlx::query(&format!(
            "INSERT INTO documents ({DOCUMENT_COLUMNS}) \
             VALUES ({}) ON CONFLICT(content_hash) DO NOTHING",
            placeholders(13)
        ))
        .bind(&doc.id)
        .bind(&doc.owner_id)
        .bind(&doc.title)
        .bind(&doc.filename)
        .bind(&doc.mime_type)
        .bind(doc.byte_size)
        .bind(&doc.content_hash)
        .bind(doc.shareable)
        .bind(&doc.classification)
        .bind(doc.status.as_str())
        .bind(doc.created_at)
        .bind(doc.updated_at)
        .bind(doc.processed_at)
        .execute(&self.pool)
        .await?;

        self.find_document_by_hash(&doc.content_hash)
            .await?
            .ok_or_else(|| anyhow!("document {} vanished after insert", doc.id))
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(document_from_row).transpose()
    }

    async fn find_document_by_hash(&self, content_hash: &str) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE content_hash = ?"
        ))
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(document_from_row).transpose()
    }

    async fn list_documents(&self, status: Option<DocumentStatus>) -> Result<Vec<Document>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE status = ? \
                     ORDER BY created_at DESC, id"
                ))
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {DOCUMENT_COLUMNS} FROM documents ORDER BY created_at DESC, id"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(document_from_row).collect()
    }

    async fn document_access_facts(&self) -> Result<Vec<DocumentAccess>> {
        let rows = sqlx::query("SELECT id, owner_id, shareable FROM documents")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                Ok(DocumentAccess {
                    document_id: row.try_get("id")?,
                    owner_id: row.try_get("owner_id")?,
                    shareable: row.try_get("shareable")?,
                })
            })
            .collect()
    }

    async fn transition_document(
        &self,
        id: &str,
        event: DocumentEvent,
        at: i64,
    ) -> Result<bool> {
        let sources = DocumentStatus::sources_for(event);
        let sql = format!(
            "UPDATE documents SET status = ?, updated_at = ?, claim = NULL, \
             processed_at = CASE WHEN ? THEN ? ELSE processed_at END \
             WHERE id = ? AND status IN ({})",
            placeholders(sources.len())
        );

        let mut query = sqlx::query(&sql)
            .bind(event.target().as_str())
            .bind(at)
            .bind(event == DocumentEvent::Complete)
            .bind(at)
            .bind(id);
        for source in &sources {
            query = query.bind(source.as_str());
        }

        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }

    async fn claim_document(&self, id: &str, claim: &str, at: i64) -> Result<bool> {
        let sources = DocumentStatus::sources_for(DocumentEvent::Begin);
        let sql = format!(
            "UPDATE documents SET status = ?, updated_at = ?, claim = ? \
             WHERE id = ? AND status IN ({})",
            placeholders(sources.len())
        );

        let mut query = sqlx::query(&sql)
            .bind(DocumentStatus::Processing.as_str())
            .bind(at)
            .bind(claim)
            .bind(id);
        for source in &sources {
            query = query.bind(source.as_str());
        }

        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }

    async fn refresh_claim(&self, id: &str, claim: &str, at: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE documents SET updated_at = ? WHERE id = ? AND status = ? AND claim = ?",
        )
        .bind(at)
        .bind(id)
        .bind(DocumentStatus::Processing.as_str())
        .bind(claim)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn complete_claimed(
        &self,
        id: &str,
        claim: &str,
        passages: &[Passage],
        at: i64,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE documents SET status = ?, updated_at = ?, processed_at = ?, claim = NULL \
             WHERE id = ? AND status = ? AND claim = ?",
        )
        .bind(DocumentStatus::Completed.as_str())
        .bind(at)
        .bind(at)
        .bind(id)
        .bind(DocumentStatus::Processing.as_str())
        .bind(claim)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        write_passages(&mut tx, id, passages).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn fail_claimed(&self, id: &str, claim: &str, at: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE documents SET status = ?, updated_at = ?, claim = NULL \
             WHERE id = ? AND status = ? AND claim = ?",
        )
        .bind(DocumentStatus::Failed.as_str())
        .bind(at)
        .bind(id)
        .bind(DocumentStatus::Processing.as_str())
        .bind(claim)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM citations WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM passages WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() == 1)
    }

    async fn stale_processing_documents(&self, updated_before: i64) -> Result<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT id FROM documents WHERE status = ? AND updated_at < ? ORDER BY updated_at",
        )
        .bind(DocumentStatus::Processing.as_str())
        .bind(updated_before)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn insert_query(&self, query: &Query) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO queries ({QUERY_COLUMNS}) VALUES ({})",
            placeholders(7)
        ))
        .bind(&query.id)
        .bind(&query.owner_id)
        .bind(&query.question)
        .bind(query.status.as_str())
        .bind(&query.answer)
        .bind(query.processing_time)
        .bind(query.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_query(&self, id: &str) -> Result<Option<Query>> {
        let row = sqlx::query(&format!("SELECT {QUERY_COLUMNS} FROM queries WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(query_from_row).transpose()
    }

    async fn queries_for_owner(&self, owner_id: &str) -> Result<Vec<Query>> {
        let rows = sqlx::query(&format!(
            "SELECT {QUERY_COLUMNS} FROM queries WHERE owner_id = ? ORDER BY created_at DESC, id"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(query_from_row).collect()
    }

    async fn start_query(&self, id: &str) -> Result<bool> {
        self.apply_query_event(id, QueryEvent::Start).await
    }

    async fn complete_query(
        &self,
        id: &str,
        answer: &str,
        processing_time: f64,
        citations: &[Citation],
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE queries SET status = ?, answer = ?, processing_time = ? \
             WHERE id = ? AND status = ?",
        )
        .bind(QueryEvent::Complete.target().as_str())
        .bind(answer)
        .bind(processing_time)
        .bind(id)
        .bind(QueryStatus::Processing.as_str())
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        for citation in citations {
            sqlx::query(
                "INSERT INTO citations (id, query_id, document_id, passage_id, chunk_index, \
                 passage_text, rank, relevance_score) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&citation.id)
            .bind(&citation.query_id)
            .bind(&citation.document_id)
            .bind(&citation.passage_id)
            .bind(citation.chunk_index)
            .bind(&citation.passage_text)
            .bind(citation.rank)
            .bind(citation.relevance_score)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn fail_query(&self, id: &str) -> Result<bool> {
        self.apply_query_event(id, QueryEvent::Fail).await
    }

    async fn citations_for_query(&self, query_id: &str) -> Result<Vec<Citation>> {
        let rows = sqlx::query(
            "SELECT id, query_id, document_id, passage_id, chunk_index, passage_text, rank, \
             relevance_score FROM citations WHERE query_id = ? ORDER BY rank",
        )
        .bind(query_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(citation_from_row).collect()
    }
}

impl SqliteStore {
    async fn apply_query_event(&self, id: &str, event: QueryEvent) -> Result<bool> {
        let sources = QueryStatus::sources_for(event);
        let sql = format!(
            "UPDATE queries SET status = ? WHERE id = ? AND status IN ({})",
            placeholders(sources.len())
        );
        let mut query = sqlx::query(&sql).bind(event.target().as_str()).bind(id);
        for source in &sources {
            query = query.bind(source.as_str());
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }
}

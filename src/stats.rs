//! Corpus and query statistics.
//!
//! Summarizes what is stored: documents by status and type, passages by
//! embedding model, queries by status and how long completed ones took.
//! Used by `docqa stats` to check that ingestion and answering are working.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;

/// Snapshot of the database, gathered by [`collect_stats`].
#[derive(Debug, Default, PartialEq)]
pub struct Stats {
    pub documents: i64,
    pub storage_bytes: i64,
    pub documents_by_status: Vec<(String, i64)>,
    pub documents_by_type: Vec<(String, i64)>,
    pub top_uploaders: Vec<(String, i64)>,
    pub passages: i64,
    pub passages_by_model: Vec<(String, i64)>,
    pub documents_with_passages: i64,
    pub queries: i64,
    pub queries_by_status: Vec<(String, i64)>,
    pub queries_with_citations: i64,
    /// Mean `processing_time` of completed queries, in seconds.
    pub avg_processing_time: Option<f64>,
}

impl Stats {
    pub fn avg_passages_per_document(&self) -> f64 {
        if self.documents == 0 {
            0.0
        } else {
            self.passages as f64 / self.documents as f64
        }
    }

    pub fn avg_document_size(&self) -> i64 {
        if self.documents == 0 {
            0
        } else {
            self.storage_bytes / self.documents
        }
    }
}

async fn grouped(pool: &SqlitePool, sql: &str) -> Result<Vec<(String, i64)>> {
    let rows = sqlx::query(sql).fetch_all(pool).await?;
    rows.iter()
        .map(|row| Ok((row.try_get("key")?, row.try_get("n")?)))
        .collect()
}

async fn count(pool: &SqlitePool, sql: &str) -> Result<i64> {
    Ok(sqlx::query_scalar(sql).fetch_one(pool).await?)
}

pub async fn collect_stats(pool: &SqlitePool) -> Result<Stats> {
    let avg_processing_time: Option<f64> = sqlx::query_scalar(
        "SELECT AVG(processing_time) FROM queries WHERE status = 'completed'",
    )
    .fetch_one(pool)
    .await?;

    Ok(Stats {
        documents: count(pool, "SELECT COUNT(*) FROM documents").await?,
        storage_bytes: count(pool, "SELECT COALESCE(SUM(byte_size), 0) FROM documents").await?,
        documents_by_status: grouped(
            pool,
            "SELECT status AS key, COUNT(*) AS n FROM documents GROUP BY status ORDER BY status",
        )
        .await?,
        documents_by_type: grouped(
            pool,
            "SELECT mime_type AS key, COUNT(*) AS n FROM documents \
             GROUP BY mime_type ORDER BY n DESC, mime_type",
        )
        .await?,
        top_uploaders: grouped(
            pool,
            "SELECT owner_id AS key, COUNT(*) AS n FROM documents \
             GROUP BY owner_id ORDER BY n DESC, owner_id LIMIT 5",
        )
        .await?,
        passages: count(pool, "SELECT COUNT(*) FROM passages").await?,
        passages_by_model: grouped(
            pool,
            "SELECT model AS key, COUNT(*) AS n FROM passages GROUP BY model ORDER BY model",
        )
        .await?,
        documents_with_passages: count(pool, "SELECT COUNT(DISTINCT document_id) FROM passages")
            .await?,
        queries: count(pool, "SELECT COUNT(*) FROM queries").await?,
        queries_by_status: grouped(
            pool,
            "SELECT status AS key, COUNT(*) AS n FROM queries GROUP BY status ORDER BY status",
        )
        .await?,
        queries_with_citations: count(pool, "SELECT COUNT(DISTINCT query_id) FROM citations")
            .await?,
        avg_processing_time,
    })
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let stats = collect_stats(&pool).await?;
    pool.close().await;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("docqa statistics");
    println!("================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Documents:   {}", stats.documents);
    println!(
        "  Stored:      {} (avg {})",
        format_bytes(stats.storage_bytes.max(0) as u64),
        format_bytes(stats.avg_document_size().max(0) as u64)
    );
    print_breakdown("By status", &stats.documents_by_status);
    print_breakdown("By type", &stats.documents_by_type);
    print_breakdown("Top uploaders", &stats.top_uploaders);

    println!();
    println!("  Passages:    {}", stats.passages);
    println!(
        "  Embedded:    {} / {} documents ({:.2} passages per document)",
        stats.documents_with_passages,
        stats.documents,
        stats.avg_passages_per_document()
    );
    print_breakdown("By model", &stats.passages_by_model);

    println!();
    println!("  Queries:     {}", stats.queries);
    println!("  Cited:       {}", stats.queries_with_citations);
    match stats.avg_processing_time {
        Some(secs) => println!("  Avg time:    {secs:.2}s"),
        None => println!("  Avg time:    n/a"),
    }
    print_breakdown("By status", &stats.queries_by_status);
    println!();

    Ok(())
}

fn print_breakdown(label: &str, rows: &[(String, i64)]) {
    if rows.is_empty() {
        return;
    }
    println!("  {label}:");
    for (key, n) in rows {
        println!("    {:<40} {:>6}", key, n);
    }
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

//! CLI command implementations. Each `run_*` function prints its result to
//! stdout; diagnostics go through `tracing` to stderr.

use std::path::Path;

use anyhow::{bail, Context, Result};

use docqa_core::access::Requester;
use docqa_core::chunk::ChunkingParams;
use docqa_core::ingest::IngestOutcome;
use docqa_core::models::{format_ts_iso, Citation, DocumentStatus};
use docqa_core::reconcile::reclaim_stale;
use docqa_core::store::Store;
use docqa_core::upload::{UploadRequest, MIME_DOCX, MIME_PDF, MIME_TEXT};

use crate::app::App;
use crate::config::Config;
use crate::extract;

/// Options for `docqa upload` beyond the file itself.
#[derive(Debug, Default)]
pub struct UploadOptions {
    pub title: Option<String>,
    pub mime: Option<String>,
    pub shareable: bool,
    pub classification: Option<String>,
}

pub async fn run_upload(
    config: &Config,
    path: &Path,
    requester: &Requester,
    options: UploadOptions,
) -> Result<()> {
    let app = App::open(config.clone()).await?;
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let mime_type = options.mime.unwrap_or_else(|| {
        mime_guess::from_path(path)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string()
    });

    let outcome = app
        .intake()
        .upload(
            requester,
            UploadRequest {
                filename,
                mime_type,
                bytes,
                title: options.title,
                shareable: options.shareable,
                classification: options.classification,
            },
        )
        .await?;

    let doc = outcome.document();
    if outcome.is_duplicate() {
        println!("Duplicate of existing document {} ({})", doc.id, doc.status);
    } else {
        println!("Uploaded document {} ({})", doc.id, doc.status);
    }
    Ok(())
}

pub async fn run_documents(config: &Config, status: Option<&str>) -> Result<()> {
    let app = App::open(config.clone()).await?;
    let status = match status {
        Some(s) => Some(DocumentStatus::parse(s).with_context(|| {
            format!("Unknown status '{s}'. Use pending, processing, completed or failed.")
        })?),
        None => None,
    };

    let documents = app.store.list_documents(status).await?;
    if documents.is_empty() {
        println!("No documents.");
        return Ok(());
    }

    for doc in documents {
        println!("{}  {:<10}  {}", doc.id, doc.status.as_str(), doc.title);
        println!(
            "    owner: {}  type: {}  size: {}  uploaded: {}",
            doc.owner_id,
            doc.mime_type,
            doc.byte_size,
            format_ts_iso(doc.created_at)
        );
    }
    Ok(())
}

pub async fn run_ingest(config: &Config, id: Option<&str>, pending: bool) -> Result<()> {
    let app = App::open(config.clone()).await?;
    match (id, pending) {
        (Some(id), false) => match app.pipeline()?.ingest(id).await? {
            IngestOutcome::Completed { passages } => {
                println!("Ingested {id}: {passages} passages.");
            }
            IngestOutcome::Skipped { status } => {
                println!("Skipped {id}: document is {status}.");
            }
        },
        (None, true) => {
            let report = app.worker()?.run_once().await?;
            println!("ingest pending");
            println!("  reclaimed: {}", report.reclaimed);
            println!("  completed: {}", report.completed);
            println!("  failed:    {}", report.failed);
            println!("  skipped:   {}", report.skipped);
        }
        _ => bail!("Pass either a document id or --pending."),
    }
    Ok(())
}

pub async fn run_worker(config: &Config, once: bool) -> Result<()> {
    let app = App::open(config.clone()).await?;
    let worker = app.worker()?;
    if once {
        let report = worker.run_once().await?;
        println!(
            "Worker cycle: {} completed, {} failed, {} reclaimed.",
            report.completed, report.failed, report.reclaimed
        );
        return Ok(());
    }
    worker.run().await
}

pub async fn run_reconcile(config: &Config) -> Result<()> {
    let app = App::open(config.clone()).await?;
    let reclaimed = reclaim_stale(
        app.store.as_ref(),
        app.config.ingestion.stale_after_secs,
    )
    .await?;
    if reclaimed.is_empty() {
        println!("No stale documents.");
    } else {
        for id in &reclaimed {
            println!("reclaimed {id}");
        }
    }
    Ok(())
}

pub async fn run_ask(config: &Config, question: &str, requester: &Requester) -> Result<()> {
    let app = App::open(config.clone()).await?;
    let answered = app.orchestrator()?.answer(question, requester).await?;
    let query = &answered.query;

    println!("--- Answer ---");
    println!("{}", query.answer.as_deref().unwrap_or_default());
    println!();
    print_citations(&app, &answered.citations).await?;
    println!(
        "query {}  ({:.2}s)",
        query.id,
        query.processing_time.unwrap_or_default()
    );
    Ok(())
}

pub async fn run_query(config: &Config, id: &str) -> Result<()> {
    let app = App::open(config.clone()).await?;
    let query = app
        .store
        .get_query(id)
        .await?
        .with_context(|| format!("Query not found: {id}"))?;
    let citations = app.store.citations_for_query(id).await?;

    println!("--- Query ---");
    println!("id:         {}", query.id);
    println!("owner:      {}", query.owner_id);
    println!("status:     {}", query.status);
    println!("asked_at:   {}", format_ts_iso(query.created_at));
    if let Some(secs) = query.processing_time {
        println!("time:       {secs:.2}s");
    }
    println!("question:   {}", query.question);
    println!();
    if let Some(answer) = &query.answer {
        println!("--- Answer ---");
        println!("{answer}");
        println!();
    }
    print_citations(&app, &citations).await
}

async fn print_citations(app: &App, citations: &[Citation]) -> Result<()> {
    println!("--- Citations ({}) ---", citations.len());
    for citation in citations {
        let title = app
            .store
            .get_document(&citation.document_id)
            .await?
            .map(|d| d.title)
            .unwrap_or_else(|| "(deleted)".to_string());
        println!(
            "{}. [{:.3}] {} (chunk {})",
            citation.rank + 1,
            citation.relevance_score,
            title,
            citation.chunk_index
        );
        println!("    document: {}", citation.document_id);
        println!("    {}", excerpt(&citation.passage_text, EXCERPT_CHARS));
    }
    println!();
    Ok(())
}

const EXCERPT_CHARS: usize = 240;

/// First `max` characters of `text` on one line, with an ellipsis when cut.
fn excerpt(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        return flat;
    }
    let cut: String = flat.chars().take(max).collect();
    format!("{}...", cut.trim_end())
}

pub async fn run_delete(config: &Config, id: &str, requester: &Requester) -> Result<()> {
    let app = App::open(config.clone()).await?;
    let doc = app.intake().delete(requester, id).await?;
    println!("Deleted document {} ({})", doc.id, doc.title);
    Ok(())
}

/// Chunk a local file without touching the database and print the chunks
/// as JSON. Defaults to the ad-hoc chunking parameters.
pub async fn run_chunk(
    config: &Config,
    path: &Path,
    size: Option<usize>,
    overlap: Option<usize>,
) -> Result<()> {
    let defaults = config.chunking.adhoc();
    let params = ChunkingParams {
        chunk_size: size.unwrap_or(defaults.chunk_size),
        overlap: overlap.unwrap_or(defaults.overlap),
    };
    if params.chunk_size == 0 || params.overlap >= params.chunk_size {
        bail!("--overlap must be smaller than --size, and --size must be > 0");
    }

    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    // Anything that is not PDF or DOCX is read as plain text.
    let mime_type = match mime_guess::from_path(path).first_raw() {
        Some(MIME_PDF) => MIME_PDF,
        Some(MIME_DOCX) => MIME_DOCX,
        _ => MIME_TEXT,
    };
    let chunks = tokio::task::spawn_blocking(move || {
        extract::extract_text(&bytes, mime_type).map(|text| params.chunk(&text))
    })
    .await
    .context("extraction task panicked")??;

    println!("{}", serde_json::to_string_pretty(&chunks)?);
    Ok(())
}

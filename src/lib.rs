//! # docqa
//!
//! Grounded question answering with citations over a private document corpus.
//!
//! Uploaded files are fingerprinted and stored, then an ingestion worker
//! extracts their text, chunks it, embeds every chunk through Ollama and
//! stores the passages in SQLite. A question is embedded the same way,
//! matched against the passages the requester may see, and answered by a
//! generation model from the best matches. Every answer records which
//! passages it was drawn from.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐
//! │  upload  │──▶│ blob store   │──▶│   worker     │
//! │ (intake) │   │ files_dir/   │   │ extract →    │
//! └────┬─────┘   └──────────────┘   │ chunk → embed│
//!      │                            └──────┬───────┘
//!      ▼                                   ▼
//! ┌──────────────────────────────────────────────┐
//! │   SQLite: documents, passages, queries,      │
//! │           citations                          │
//! └──────────────────────┬───────────────────────┘
//!                        ▼
//!                 ┌──────────────┐   ┌──────────┐
//!                 │ ask: embed → │──▶│  Ollama  │
//!                 │ filter → k-NN│   │ generate │
//!                 └──────────────┘   └──────────┘
//! ```
//!
//! The pipelines themselves live in `docqa-core`; this crate supplies the
//! storage, provider and CLI layers around them.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite implementation of the core store |
//! | [`blobs`] | Filesystem blob store and text source |
//! | [`extract`] | PDF, DOCX and plain-text extraction |
//! | [`ollama`] | Ollama embedding and generation providers |
//! | [`audit`] | Audit events through `tracing` |
//! | [`worker`] | Background ingestion with retry and reclaim |
//! | [`stats`] | Corpus and query statistics |
//! | [`app`] | Wiring from config to pipelines |
//! | [`commands`] | CLI command implementations |

pub mod app;
pub mod audit;
pub mod blobs;
pub mod commands;
pub mod config;
pub mod db;
pub mod extract;
pub mod migrate;
pub mod ollama;
pub mod sqlite_store;
pub mod stats;
pub mod worker;

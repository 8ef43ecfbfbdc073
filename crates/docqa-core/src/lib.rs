//! # docqa core
//!
//! Runtime-agnostic logic for docqa: data models, the paragraph chunker,
//! vector ranking, the access filter, the store abstraction, and the
//! ingestion and query pipelines that tie them together.
//!
//! This crate contains no tokio, sqlx, HTTP clients or filesystem I/O.
//! Everything that talks to the outside world is injected through the
//! traits in [`embedding`], [`blob`], [`ingest`], [`audit`] and [`store`].
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | `Document`, `Passage`, `Query`, `Citation` and their status machines |
//! | [`chunk`] | Paragraph-boundary chunker with sentence and word overlap |
//! | [`embedding`] | Provider traits, cosine similarity, vector BLOB codec |
//! | [`index`] | Filter-then-rank top-k selection shared by every store |
//! | [`access`] | Requester roles and the accessible-document policy |
//! | [`store`] | `VectorIndex` and `Store` traits, in-memory implementation |
//! | [`blob`] | Raw upload storage trait, in-memory implementation |
//! | [`upload`] | Upload validation, fingerprinting and deduplication |
//! | [`ingest`] | Document ingestion pipeline |
//! | [`query`] | Question answering orchestrator |
//! | [`reconcile`] | Reclaiming documents stuck in `processing` |
//! | [`audit`] | Audit events handed to an external collaborator |
//! | [`error`] | Typed error taxonomy |

pub mod access;
pub mod audit;
pub mod blob;
pub mod chunk;
pub mod embedding;
pub mod error;
pub mod index;
pub mod ingest;
pub mod models;
pub mod query;
pub mod reconcile;
pub mod store;
pub mod upload;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};

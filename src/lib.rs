//! # manifold-vecstore
//!
//! An embedded vector store built on [redb](https://docs.rs/redb).
//!
//! A [`StoreDatabase`] is one file holding any number of named stores. Each store
//! keeps records of `(title, description, embedding)` with a fixed embedding
//! dimensionality, and answers top-K cosine similarity queries through an HNSW
//! index that is rebuilt from the stored records when the database is reopened.
//!
//! - **Schema**: [`StoreDatabase::ensure_store`], [`StoreDatabase::reset_store`] and
//!   [`StoreDatabase::drop_store`], driven at startup by [`StoreConfig`]
//! - **Writes**: [`WriteBatch`] stages records and commits them all or none
//! - **Queries**: [`Store::query_top_k`] and the request-level [`Store::search`]
//! - **Ingestion**: [`IngestPipeline`] loads a row source as one unit of work
//!
//! Records without an embedding get one from the database's [`Embedder`]. The
//! default [`DeterministicEmbedder`] is a reproducible placeholder; supply a real
//! model through [`StoreDatabaseBuilder::embedder`].
//!
//! ## Quick Start
//!
//! ```rust
//! use manifold_vecstore::{Record, SimilarityQuery, StoreDatabase};
//!
//! # fn main() -> Result<(), manifold_vecstore::StoreError> {
//! let db = StoreDatabase::open_in_memory()?;
//! let store = db.ensure_store("design", 2)?;
//!
//! let mut batch = store.begin_write()?;
//! batch.stage(&Record::new("Oak door", "solid oak").with_embedding("[1.0, 0.0]"))?;
//! batch.stage(&Record::new("Steel door", "brushed steel").with_embedding("[0.0, 1.0]"))?;
//! let ids = batch.commit()?;
//!
//! let hits = store.search(&SimilarityQuery::vector(vec![0.9, 0.1], 1))?;
//! assert_eq!(hits[0].id, ids[0]);
//! assert_eq!(hits[0].title, "Oak door");
//! # Ok(())
//! # }
//! ```
//!
//! ## Logging
//!
//! With the default `logging` feature the crate reports schema changes, index
//! rebuilds, rollbacks and ingestion outcomes through the [`log`](https://docs.rs/log)
//! facade.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod api;
mod builder;
mod catalog;
mod config;
mod database;
mod error;
mod ingest;
mod record;
mod state;
mod store;
mod writer;

pub use api::{
    IngestReport, RegisterRecord, RegisteredRecord, RowFailure, SearchHit, SimilarityQuery,
};
pub use builder::StoreDatabaseBuilder;
pub use catalog::{FORMAT_VERSION, MAGIC_NUMBER, StoreMetadata};
pub use config::{
    DEFAULT_VECTOR_DIMENSION, ENV_INDEX_CONSTRUCTION_BREADTH, ENV_INDEX_MAX_CONNECTIVITY,
    ENV_INDEX_SEARCH_BREADTH, ENV_RESET_ON_STARTUP, ENV_VECTOR_DIMENSION, ResetPolicy,
    StoreConfig,
};
pub use database::StoreDatabase;
pub use error::{ErrorKind, IngestError, StoreError};
pub use ingest::{
    DEFAULT_INGEST_DIMENSION, DEFAULT_INGEST_STORE, IngestConfig, IngestPipeline, IngestRow,
};
pub use record::{Record, StoredRecord};
pub use store::Store;
pub use writer::WriteBatch;

pub use manifold_vectors::{
    DeterministicEmbedder, Embedder, HnswConfig, IndexStats, Neighbor, RawVector, VectorError,
};

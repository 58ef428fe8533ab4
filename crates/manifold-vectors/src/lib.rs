//! # manifold-vectors
//!
//! Vector primitives for the Manifold vector store.
//!
//! This crate has no storage of its own. It provides the pieces the store layers on
//! top of its tables:
//!
//! - **Codec**: dimension validation, a strict parser for `[v1,...,vD]` literals and
//!   the six-digit serialized form ([`codec`])
//! - **Embedding seam**: the [`Embedder`] trait and a reproducible placeholder
//!   ([`DeterministicEmbedder`])
//! - **Similarity**: cosine primitives ([`distance`]) and an in-memory HNSW index with
//!   rollback-able staging ([`HnswIndex`])
//!
//! ## Quick Start
//!
//! ```rust
//! use manifold_vectors::{HnswConfig, HnswIndex, codec};
//!
//! # fn main() -> Result<(), manifold_vectors::VectorError> {
//! let mut index = HnswIndex::new(2, HnswConfig::default());
//! index.insert(1, &codec::validate(&[1.0f64, 0.0], 2)?)?;
//! index.insert(2, &codec::validate(&[0.0f64, 1.0], 2)?)?;
//!
//! let query = codec::parse_literal("[0.9, 0.1]")?.unwrap_or_default();
//! let hits = index.search(&codec::validate(&query, 2)?, 1, 40)?;
//! assert_eq!(hits[0].id, 1);
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(clippy::all, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod codec;
pub mod distance;
pub mod embed;
pub mod error;
pub mod hnsw;

pub use codec::RawVector;
pub use embed::{DeterministicEmbedder, Embedder};
pub use error::VectorError;
pub use hnsw::{HnswConfig, HnswIndex, IndexStats, Neighbor};

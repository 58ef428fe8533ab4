//! Request and response types for the store's external interfaces.
//!
//! These are plain serde types. Transport (HTTP, forms, queues) is left to the
//! caller; field names serialize in camelCase.

use manifold_vectors::RawVector;
use serde::{Deserialize, Serialize};

use crate::record::Record;

/// Record-insert request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRecord {
    /// Record title. Required.
    pub title: String,
    /// Record description. Required; the embedding is derived from it when absent.
    pub description: String,
    /// Optional embedding; its length must equal the store dimensionality.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f64>>,
}

impl From<RegisterRecord> for Record {
    fn from(request: RegisterRecord) -> Self {
        Record {
            title: request.title,
            description: request.description,
            embedding: RawVector::from(request.embedding),
        }
    }
}

/// Successful record-insert response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredRecord {
    /// Assigned id.
    pub id: u64,
    /// Stored title.
    pub title: String,
    /// Stored description.
    pub description: String,
    /// Store dimensionality.
    pub dim: usize,
}

/// Similarity query request: exactly one of `query_text` and `query_vector`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarityQuery {
    /// Text to embed and search for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_text: Option<String>,
    /// Vector to search for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_vector: Option<Vec<f64>>,
    /// Maximum number of hits. Must be positive.
    pub k: i64,
}

impl SimilarityQuery {
    /// Query by text.
    pub fn text(text: impl Into<String>, k: i64) -> Self {
        Self {
            query_text: Some(text.into()),
            query_vector: None,
            k,
        }
    }

    /// Query by vector.
    pub fn vector(vector: impl Into<Vec<f64>>, k: i64) -> Self {
        Self {
            query_text: None,
            query_vector: Some(vector.into()),
            k,
        }
    }
}

/// One similarity query hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    /// Record id.
    pub id: u64,
    /// Record title.
    pub title: String,
    /// Record description.
    pub text: String,
    /// Cosine similarity to the query.
    pub similarity: f32,
}

/// The row that stopped an ingestion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowFailure {
    /// One-based row number, or `None` when the failure was not tied to a row.
    pub row: Option<usize>,
    /// Title of the row, if it had one.
    pub title: Option<String>,
    /// Why the row failed.
    pub reason: String,
}

/// Outcome of an ingestion run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    /// Rows read from the source.
    pub total_rows: usize,
    /// Rows committed. All of them on success, none on failure.
    pub committed_rows: usize,
    /// Rows that failed; at most one, since the run stops at the first failure.
    pub error_rows: usize,
    /// Details of the failing row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_error: Option<RowFailure>,
    /// Dimensionality used for the run.
    pub dimension: usize,
    /// Ids assigned to the committed rows, in source order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<u64>,
}

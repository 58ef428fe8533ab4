use std::fmt;

use manifold_vectors::VectorError;

use crate::api::IngestReport;

/// Broad classification of a [`StoreError`].
///
/// [`StoreError::Rejected`] wraps another error with batch context; its kind is the
/// kind of the wrapped error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A vector length differs from the store dimensionality.
    DimensionMismatch,
    /// A supplied vector literal is malformed.
    Parse,
    /// A record fails a structural requirement.
    Validation,
    /// An existing store was configured differently.
    SchemaConflict,
    /// The store does not exist.
    NotFound,
    /// An argument is outside its accepted range.
    InvalidArgument,
    /// The storage engine rejected or failed the unit of work.
    Storage,
    /// Persisted data could not be decoded.
    Corrupted,
}

/// Errors returned by the vector store.
#[derive(Debug)]
pub enum StoreError {
    /// A vector length differs from the store dimensionality.
    DimensionMismatch {
        /// The store dimensionality.
        expected: usize,
        /// Length of the offending vector.
        actual: usize,
    },
    /// A supplied vector literal is malformed.
    Parse {
        /// The offending input, possibly truncated.
        input: String,
        /// What was wrong with it.
        reason: String,
    },
    /// A record fails a structural requirement.
    Validation {
        /// The field that failed.
        field: &'static str,
        /// Why it failed.
        reason: String,
    },
    /// The store exists with a different dimensionality.
    SchemaConflict {
        /// Store name.
        store: String,
        /// Dimensionality the store was created with.
        existing: usize,
        /// Dimensionality the caller asked for.
        requested: usize,
    },
    /// No store with this name exists.
    StoreNotFound(String),
    /// An argument is outside its accepted range.
    InvalidArgument(String),
    /// Persisted data could not be decoded.
    Corrupted(String),
    /// The storage engine failed.
    Storage(redb::Error),
    /// A lock was poisoned by a panicking thread.
    Poisoned,
    /// The write batch was already rolled back after an earlier failure.
    RolledBack,
    /// A record in a batch was rejected; the whole batch was rolled back.
    Rejected {
        /// Zero-based position of the record in the batch.
        index: usize,
        /// Title of the record, if it had one.
        title: Option<String>,
        /// Why the record was rejected.
        source: Box<StoreError>,
    },
}

impl StoreError {
    /// Returns the broad classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            StoreError::Parse { .. } => ErrorKind::Parse,
            StoreError::Validation { .. } => ErrorKind::Validation,
            StoreError::SchemaConflict { .. } => ErrorKind::SchemaConflict,
            StoreError::StoreNotFound(_) => ErrorKind::NotFound,
            StoreError::InvalidArgument(_) | StoreError::RolledBack => ErrorKind::InvalidArgument,
            StoreError::Corrupted(_) => ErrorKind::Corrupted,
            StoreError::Storage(_) | StoreError::Poisoned => ErrorKind::Storage,
            StoreError::Rejected { source, .. } => source.kind(),
        }
    }

    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        StoreError::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn rejected(index: usize, title: Option<&str>, source: StoreError) -> Self {
        StoreError::Rejected {
            index,
            title: title.map(str::to_string),
            source: Box::new(source),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::DimensionMismatch { expected, actual } => {
                write!(f, "dimension mismatch: expected {expected}, got {actual}")
            }
            StoreError::Parse { input, reason } => {
                write!(f, "malformed vector literal '{input}': {reason}")
            }
            StoreError::Validation { field, reason } => {
                write!(f, "invalid {field}: {reason}")
            }
            StoreError::SchemaConflict {
                store,
                existing,
                requested,
            } => write!(
                f,
                "store '{store}' exists with dimension {existing}, requested {requested}"
            ),
            StoreError::StoreNotFound(name) => write!(f, "store '{name}' not found"),
            StoreError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            StoreError::Corrupted(msg) => write!(f, "corrupted store data: {msg}"),
            StoreError::Storage(e) => write!(f, "storage error: {e}"),
            StoreError::Poisoned => write!(f, "store lock poisoned by a panicked thread"),
            StoreError::RolledBack => {
                write!(f, "write batch was rolled back after an earlier failure")
            }
            StoreError::Rejected {
                index,
                title: Some(title),
                source,
            } => write!(
                f,
                "record {index} ('{title}') rejected, batch rolled back: {source}"
            ),
            StoreError::Rejected {
                index,
                title: None,
                source,
            } => write!(f, "record {index} rejected, batch rolled back: {source}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Storage(e) => Some(e),
            StoreError::Rejected { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<VectorError> for StoreError {
    fn from(err: VectorError) -> Self {
        match err {
            VectorError::DimensionMismatch { expected, actual } => {
                StoreError::DimensionMismatch { expected, actual }
            }
            VectorError::Parse { input, reason } => StoreError::Parse { input, reason },
            VectorError::NonFinite { position } => StoreError::validation(
                "embedding",
                format!("element {position} is not a finite number"),
            ),
            VectorError::InvalidArgument(msg) => StoreError::InvalidArgument(msg),
            VectorError::DuplicateId(id) => {
                StoreError::Corrupted(format!("record id {id} is already indexed"))
            }
        }
    }
}

impl From<redb::Error> for StoreError {
    fn from(err: redb::Error) -> Self {
        StoreError::Storage(err)
    }
}

impl From<redb::DatabaseError> for StoreError {
    fn from(err: redb::DatabaseError) -> Self {
        StoreError::Storage(err.into())
    }
}

impl From<redb::TransactionError> for StoreError {
    fn from(err: redb::TransactionError) -> Self {
        StoreError::Storage(err.into())
    }
}

impl From<redb::TableError> for StoreError {
    fn from(err: redb::TableError) -> Self {
        StoreError::Storage(err.into())
    }
}

impl From<redb::StorageError> for StoreError {
    fn from(err: redb::StorageError) -> Self {
        StoreError::Storage(err.into())
    }
}

impl From<redb::CommitError> for StoreError {
    fn from(err: redb::CommitError) -> Self {
        StoreError::Storage(err.into())
    }
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        StoreError::Poisoned
    }
}

/// A failed ingestion run.
///
/// Nothing from the run was committed. `report` carries the row counts up to and
/// including the failing row.
#[derive(Debug)]
pub struct IngestError {
    /// Outcome of the run.
    pub report: IngestReport,
    /// The error that stopped it.
    pub source: StoreError,
}

impl IngestError {
    /// Returns the broad classification of the underlying error.
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.report.first_error.as_ref().and_then(|e| e.row) {
            Some(row) => write!(
                f,
                "ingestion failed at row {row}, nothing committed: {}",
                self.source
            ),
            None => write!(f, "ingestion failed, nothing committed: {}", self.source),
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_reports_inner_kind() {
        let err = StoreError::rejected(
            3,
            Some("door"),
            StoreError::DimensionMismatch {
                expected: 2,
                actual: 3,
            },
        );
        assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
        let display = err.to_string();
        assert!(display.contains("record 3"));
        assert!(display.contains("door"));
        assert!(display.contains("expected 2, got 3"));
    }

    #[test]
    fn test_vector_error_conversion() {
        let err: StoreError = VectorError::NonFinite { position: 4 }.into();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err: StoreError = VectorError::InvalidArgument("k must be at least 1".into()).into();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err: StoreError = VectorError::DuplicateId(9).into();
        assert_eq!(err.kind(), ErrorKind::Corrupted);
    }

    #[test]
    fn test_error_source_chain() {
        use std::error::Error;

        let err = StoreError::rejected(0, None, StoreError::StoreNotFound("design".into()));
        let source = err.source().unwrap();
        assert_eq!(source.to_string(), "store 'design' not found");
    }

    #[test]
    fn test_schema_conflict_display() {
        let err = StoreError::SchemaConflict {
            store: "design".to_string(),
            existing: 384,
            requested: 1536,
        };
        assert_eq!(err.kind(), ErrorKind::SchemaConflict);
        assert!(err.to_string().contains("384"));
        assert!(err.to_string().contains("1536"));
    }
}

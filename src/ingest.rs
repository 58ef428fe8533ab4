//! Batch ingestion of `(title, description, optional embedding)` rows.
//!
//! A run is one unit of work: every row from the source is committed, or none is.
//! Rows are pulled from the source one at a time and staged as they arrive; the
//! first bad row rolls the run back and stops reading.
//!
//! When no dimension is configured, the run adopts the length of the first usable
//! embedding in the source. Only the rows before that one are held in memory while
//! detecting. A source with no usable embedding falls back to the configured default
//! dimension and generates every vector.

use manifold_vectors::RawVector;

use crate::api::{IngestReport, RowFailure};
use crate::database::StoreDatabase;
use crate::error::{IngestError, StoreError};
use crate::record::Record;
use crate::store::Store;
use crate::writer::WriteBatch;

/// Dimension used when none is configured and the source carries no embeddings.
pub const DEFAULT_INGEST_DIMENSION: usize = 1536;

/// Store written by default.
pub const DEFAULT_INGEST_STORE: &str = "design";

/// One input row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IngestRow {
    /// Row title; required.
    pub title: Option<String>,
    /// Row description; required.
    pub description: Option<String>,
    /// Supplied embedding, if any.
    pub embedding: RawVector,
}

impl IngestRow {
    /// A row without an embedding.
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            description: Some(description.into()),
            embedding: RawVector::Missing,
        }
    }

    /// Supplies the embedding.
    #[must_use]
    pub fn with_embedding(mut self, embedding: impl Into<RawVector>) -> Self {
        self.embedding = embedding.into();
        self
    }

    fn into_record(self) -> Record {
        Record {
            title: self.title.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            embedding: self.embedding,
        }
    }
}

/// Options for an ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    /// Target store; created if absent.
    pub store: String,
    /// Fixed dimension. `None` detects it from the source.
    pub dimension: Option<usize>,
    /// Dimension used when detection finds no embedding.
    pub default_dimension: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            store: DEFAULT_INGEST_STORE.to_string(),
            dimension: None,
            default_dimension: DEFAULT_INGEST_DIMENSION,
        }
    }
}

impl IngestConfig {
    /// Default options writing into `store`.
    pub fn for_store(store: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            ..Self::default()
        }
    }
}

/// Loads rows from a source into a store as a single unit of work.
pub struct IngestPipeline<'a> {
    db: &'a StoreDatabase,
    config: IngestConfig,
}

impl<'a> IngestPipeline<'a> {
    /// Creates a pipeline writing into `db`.
    pub fn new(db: &'a StoreDatabase, config: IngestConfig) -> Self {
        Self { db, config }
    }

    /// Returns the run options.
    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Reads `source` to the end and commits every row, or commits nothing.
    ///
    /// Rows are numbered from 1 in reports. On failure the returned error carries a
    /// report naming the failing row and why.
    pub fn run<I>(&self, source: I) -> Result<IngestReport, IngestError>
    where
        I: IntoIterator<Item = IngestRow>,
    {
        let mut rows = source.into_iter();
        let mut report = IngestReport::default();

        let mut pending = Vec::new();
        let dimension = match self.config.dimension {
            Some(dimension) => dimension,
            None => {
                let mut detected = None;
                for mut row in rows.by_ref() {
                    report.total_rows += 1;
                    let values = match row.embedding.parse() {
                        Ok(values) => values,
                        Err(err) => {
                            let row_number = report.total_rows;
                            return Err(failure(
                                &mut report,
                                Some(row_number),
                                row.title,
                                err.into(),
                            ));
                        }
                    };
                    match values {
                        Some(values) if !values.is_empty() => {
                            detected = Some(values.len());
                            row.embedding = RawVector::Values(values);
                            pending.push(row);
                            break;
                        }
                        _ => pending.push(row),
                    }
                }
                detected.unwrap_or(self.config.default_dimension)
            }
        };
        report.dimension = dimension;

        #[cfg(feature = "logging")]
        log::info!(
            "ingesting into store '{}' with dimension {dimension}",
            self.config.store
        );

        let (store, created) = match self.db.ensure_store_tracked(&self.config.store, dimension)
        {
            Ok(outcome) => outcome,
            Err(err) => return Err(failure(&mut report, None, None, err)),
        };

        let ids = match load(&store, pending, rows, &mut report) {
            Ok(ids) => ids,
            Err(err) => {
                if created {
                    self.discard_store();
                }
                return Err(err);
            }
        };
        report.committed_rows = ids.len();
        report.ids = ids;

        #[cfg(feature = "logging")]
        log::info!(
            "ingested {} rows into store '{}'",
            report.committed_rows,
            self.config.store
        );

        Ok(report)
    }
}

impl IngestPipeline<'_> {
    /// Removes the store this run created, unless something else committed to it.
    fn discard_store(&self) {
        match self.db.drop_store_if_unused(&self.config.store) {
            Ok(true) => {
                #[cfg(feature = "logging")]
                log::info!(
                    "removed store '{}' created by the failed run",
                    self.config.store
                );
            }
            Ok(false) => {}
            Err(_e) => {
                #[cfg(feature = "logging")]
                log::warn!(
                    "could not remove store '{}' created by the failed run: {_e}",
                    self.config.store
                );
            }
        }
    }
}

impl StoreDatabase {
    /// Runs an [`IngestPipeline`] with `config` over `source`.
    pub fn ingest<I>(&self, config: IngestConfig, source: I) -> Result<IngestReport, IngestError>
    where
        I: IntoIterator<Item = IngestRow>,
    {
        IngestPipeline::new(self, config).run(source)
    }
}

/// Stages the buffered rows and then the rest of the source in one batch.
fn load<I>(
    store: &Store,
    pending: Vec<IngestRow>,
    rows: I,
    report: &mut IngestReport,
) -> Result<Vec<u64>, IngestError>
where
    I: Iterator<Item = IngestRow>,
{
    let mut batch = match store.begin_write() {
        Ok(batch) => batch,
        Err(err) => return Err(failure(report, None, None, err)),
    };

    for (i, row) in pending.into_iter().enumerate() {
        stage_row(&mut batch, report, i + 1, row)?;
    }
    for row in rows {
        report.total_rows += 1;
        let row_number = report.total_rows;
        stage_row(&mut batch, report, row_number, row)?;
    }

    batch
        .commit()
        .map_err(|err| failure(report, None, None, err))
}

fn stage_row(
    batch: &mut WriteBatch<'_>,
    report: &mut IngestReport,
    row_number: usize,
    row: IngestRow,
) -> Result<(), IngestError> {
    let title = row.title.clone();
    match batch.stage(&row.into_record()) {
        Ok(_) => Ok(()),
        Err(err) => Err(failure(report, Some(row_number), title, err)),
    }
}

/// Turns the running report into the failed-run report.
fn failure(
    report: &mut IngestReport,
    row: Option<usize>,
    title: Option<String>,
    source: StoreError,
) -> IngestError {
    let mut report = std::mem::take(report);
    report.committed_rows = 0;
    report.error_rows = 1;
    report.ids.clear();
    report.first_error = Some(RowFailure {
        row,
        title,
        reason: source.to_string(),
    });

    #[cfg(feature = "logging")]
    {
        match row {
            Some(row) => log::error!("ingestion failed at row {row}, nothing committed: {source}"),
            None => log::error!("ingestion failed, nothing committed: {source}"),
        }
    }

    IngestError { report, source }
}

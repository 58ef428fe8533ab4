use std::fmt;
use std::sync::Arc;

use manifold_vectors::{Embedder, IndexStats, Neighbor, codec};
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};

use crate::api::{RegisterRecord, RegisteredRecord, SearchHit, SimilarityQuery};
use crate::catalog::{StoreMetadata, records_table_name};
use crate::error::StoreError;
use crate::record::{Record, StoredRecord};
use crate::state::StoreState;
use crate::writer::WriteBatch;

/// A handle to a store within a [`StoreDatabase`](crate::StoreDatabase).
///
/// This is a lightweight structure that can be cheaply cloned and passed between
/// threads. The similarity index is built from the stored records the first time
/// it is needed after the database is opened.
///
/// If the store is dropped, every handle to it returns [`StoreError::StoreNotFound`]
/// until a store with the same name is created again.
#[derive(Clone)]
pub struct Store {
    pub(crate) state: Arc<StoreState>,
    pub(crate) db: Arc<Database>,
    pub(crate) embedder: Arc<dyn Embedder>,
    search_breadth: usize,
}

impl Store {
    pub(crate) fn new(
        state: Arc<StoreState>,
        db: Arc<Database>,
        embedder: Arc<dyn Embedder>,
        search_breadth: usize,
    ) -> Self {
        Self {
            state,
            db,
            embedder,
            search_breadth,
        }
    }

    /// Returns the name of this store.
    pub fn name(&self) -> &str {
        &self.state.name
    }

    /// Returns the query beam width used by this handle.
    pub fn search_breadth(&self) -> usize {
        self.search_breadth
    }

    /// Returns a handle that queries with beam width `breadth` (at least 1).
    ///
    /// Wider beams improve recall at the cost of latency. Other handles to the same
    /// store are unaffected.
    #[must_use]
    pub fn with_search_breadth(mut self, breadth: usize) -> Self {
        self.search_breadth = breadth.max(1);
        self
    }

    /// Returns the persisted metadata.
    pub fn metadata(&self) -> Result<StoreMetadata, StoreError> {
        let guard = self.state.read()?;
        guard
            .as_ref()
            .map(|inner| inner.meta.clone())
            .ok_or_else(|| self.state.not_found())
    }

    /// Returns the vector dimensionality.
    pub fn dimension(&self) -> Result<usize, StoreError> {
        Ok(self.metadata()?.dimension)
    }

    /// Returns the number of committed records.
    pub fn len(&self) -> Result<u64, StoreError> {
        let guard = self.state.read()?;
        if guard.is_none() {
            return Err(self.state.not_found());
        }
        let name = records_table_name(self.name());
        let definition: TableDefinition<u64, &[u8]> = TableDefinition::new(&name);
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(definition)?;
        Ok(table.len()?)
    }

    /// Returns `true` if the store holds no records.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Reads one record.
    pub fn get(&self, id: u64) -> Result<Option<StoredRecord>, StoreError> {
        let guard = self.state.read()?;
        if guard.is_none() {
            return Err(self.state.not_found());
        }
        self.read_record(id)
    }

    fn read_record(&self, id: u64) -> Result<Option<StoredRecord>, StoreError> {
        let name = records_table_name(self.name());
        let definition: TableDefinition<u64, &[u8]> = TableDefinition::new(&name);
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(definition)?;
        match table.get(id)? {
            Some(value) => Ok(Some(StoredRecord::from_bytes(id, value.value())?)),
            None => Ok(None),
        }
    }

    /// Builds the similarity index if it is not built yet and returns its stats.
    pub fn ensure_index(&self) -> Result<IndexStats, StoreError> {
        self.state.ensure_index(&self.db, self.search_breadth)
    }

    /// Begins an all-or-nothing unit of work. See [`WriteBatch`].
    ///
    /// The storage engine admits one writer at a time, so this blocks while any other
    /// batch in the same database is open.
    pub fn begin_write(&self) -> Result<WriteBatch<'_>, StoreError> {
        WriteBatch::begin(self)
    }

    /// Inserts one record and returns its id.
    pub fn insert_one(&self, record: &Record) -> Result<u64, StoreError> {
        let mut batch = self.begin_write()?;
        let id = batch.stage(record)?;
        batch.commit()?;
        Ok(id)
    }

    /// Inserts `records` as one unit of work and returns their ids in order.
    ///
    /// Every record is validated before anything is written. If any record fails,
    /// validation or otherwise, nothing is committed and the error is
    /// [`StoreError::Rejected`] naming the record's zero-based position.
    pub fn insert_batch(&self, records: &[Record]) -> Result<Vec<u64>, StoreError> {
        let dimension = self.dimension()?;
        let prepared = records
            .iter()
            .enumerate()
            .map(|(i, record)| {
                record
                    .prepare(dimension, self.embedder.as_ref())
                    .map_err(|err| StoreError::rejected(i, Some(&record.title), err))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut batch = self.begin_write()?;
        for (i, record) in prepared.iter().enumerate() {
            batch
                .stage_prepared(record)
                .map_err(|err| StoreError::rejected(i, Some(&record.title), err))?;
        }
        batch.commit()
    }

    /// Handles a record-insert request.
    pub fn register(&self, request: RegisterRecord) -> Result<RegisteredRecord, StoreError> {
        let record = Record::from(request);
        let id = self.insert_one(&record)?;
        Ok(RegisteredRecord {
            id,
            title: record.title,
            description: record.description,
            dim: self.dimension()?,
        })
    }

    /// Returns up to `k` `(id, similarity)` pairs ordered by descending cosine
    /// similarity, ties by ascending id.
    ///
    /// Queries wait while a [`WriteBatch`] on this store is open. An ingestion run
    /// holds its batch while it reads the whole source, so a long run stalls
    /// readers until it commits or rolls back.
    pub fn query_top_k(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>, StoreError> {
        self.state
            .with_index(&self.db, self.search_breadth, |meta, index| {
                let query = codec::validate(vector, meta.dimension)?;
                Ok(index.search(&query, k, self.search_breadth)?)
            })
    }

    /// Handles a similarity query request.
    ///
    /// Exactly one of `query_text` and `query_vector` must be set; text is embedded
    /// with the store's embedder. Hit texts are read from the same committed state
    /// the index reflects. Like [`Store::query_top_k`], this waits for any open
    /// [`WriteBatch`] on the store.
    pub fn search(&self, query: &SimilarityQuery) -> Result<Vec<SearchHit>, StoreError> {
        let k = usize::try_from(query.k)
            .ok()
            .filter(|k| *k > 0)
            .ok_or_else(|| {
                StoreError::InvalidArgument(format!("k must be at least 1, got {}", query.k))
            })?;

        self.state
            .with_index(&self.db, self.search_breadth, |meta, index| {
                let vector = match (&query.query_text, &query.query_vector) {
                    (Some(text), None) => {
                        codec::validate(&self.embedder.embed(text, meta.dimension), meta.dimension)?
                    }
                    (None, Some(values)) => codec::validate(values.as_slice(), meta.dimension)?,
                    _ => {
                        return Err(StoreError::InvalidArgument(
                            "exactly one of queryText and queryVector is required".to_string(),
                        ));
                    }
                };

                let neighbors = index.search(&vector, k, self.search_breadth)?;
                neighbors
                    .into_iter()
                    .map(|neighbor| {
                        let record = self.read_record(neighbor.id)?.ok_or_else(|| {
                            StoreError::Corrupted(format!(
                                "indexed record {} is missing from store '{}'",
                                neighbor.id,
                                self.name()
                            ))
                        })?;
                        Ok(SearchHit {
                            id: neighbor.id,
                            title: record.title,
                            text: record.description,
                            similarity: neighbor.similarity,
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.name())
            .field("search_breadth", &self.search_breadth)
            .finish_non_exhaustive()
    }
}

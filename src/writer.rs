use std::fmt;
use std::sync::RwLockWriteGuard;

use redb::{TableDefinition, WriteTransaction};

use crate::catalog::{CATALOG_TABLE, records_table_name};
use crate::error::StoreError;
use crate::record::{PreparedRecord, Record};
use crate::state::{StoreInner, loaded_index};
use crate::store::Store;

/// An all-or-nothing unit of work against one store.
///
/// Created by [`Store::begin_write`]. The batch holds the store's exclusive lock, a
/// storage write transaction and an index staging session until it is committed or
/// dropped. Readers of the store wait until then, so they only ever see the state
/// before the batch or the state after it. Keep batches short: a batch fed from a
/// slow source blocks every query on the store for as long as it is open.
///
/// Dropping the batch without calling [`WriteBatch::commit`] rolls back everything
/// staged so far. A [`WriteBatch::stage`] that fails rolls back immediately; every
/// later call returns [`StoreError::RolledBack`].
pub struct WriteBatch<'a> {
    store: &'a Store,
    guard: RwLockWriteGuard<'a, Option<StoreInner>>,
    txn: Option<WriteTransaction>,
    table_name: String,
    dimension: usize,
    next_id: u64,
    staged: Vec<u64>,
}

impl<'a> WriteBatch<'a> {
    pub(crate) fn begin(store: &'a Store) -> Result<Self, StoreError> {
        let mut guard = store.state.write()?;
        let inner = guard.as_mut().ok_or_else(|| store.state.not_found())?;

        let txn = store.db.begin_write()?;
        let index = loaded_index(
            &store.db,
            store.name(),
            &inner.meta,
            &mut inner.index,
            store.search_breadth(),
        )?;
        index.begin_staging()?;

        let dimension = inner.meta.dimension;
        let next_id = inner.meta.next_id;
        Ok(Self {
            store,
            guard,
            txn: Some(txn),
            table_name: records_table_name(store.name()),
            dimension,
            next_id,
            staged: Vec::new(),
        })
    }

    /// Returns the dimensionality every staged vector must have.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Returns the number of records staged so far.
    pub fn len(&self) -> usize {
        self.staged.len()
    }

    /// Returns `true` if nothing has been staged.
    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Validates `record`, writes it and adds it to the index.
    ///
    /// Returns the id the record will have once the batch commits. On failure the
    /// whole batch is rolled back.
    pub fn stage(&mut self, record: &Record) -> Result<u64, StoreError> {
        if self.txn.is_none() {
            return Err(StoreError::RolledBack);
        }
        let prepared = match record.prepare(self.dimension, self.store.embedder.as_ref()) {
            Ok(prepared) => prepared,
            Err(err) => {
                self.roll_back(&err);
                return Err(err);
            }
        };
        self.stage_prepared(&prepared)
    }

    pub(crate) fn stage_prepared(&mut self, record: &PreparedRecord) -> Result<u64, StoreError> {
        match self.try_stage(record) {
            Ok(id) => Ok(id),
            Err(err) => {
                self.roll_back(&err);
                Err(err)
            }
        }
    }

    fn try_stage(&mut self, record: &PreparedRecord) -> Result<u64, StoreError> {
        let txn = self.txn.as_ref().ok_or(StoreError::RolledBack)?;
        if record.vector.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: record.vector.len(),
            });
        }

        let id = self.next_id;
        let bytes = record.to_bytes()?;
        {
            let definition: TableDefinition<u64, &[u8]> = TableDefinition::new(&self.table_name);
            let mut table = txn.open_table(definition)?;
            table.insert(id, bytes.as_slice())?;
        }

        let inner = self
            .guard
            .as_mut()
            .ok_or_else(|| self.store.state.not_found())?;
        let index = inner
            .index
            .as_mut()
            .ok_or_else(|| StoreError::Corrupted("index unloaded during a batch".to_string()))?;
        index.insert(id, &record.vector)?;

        self.next_id += 1;
        self.staged.push(id);
        Ok(id)
    }

    /// Makes every staged record visible and searchable. Returns their ids in order.
    pub fn commit(mut self) -> Result<Vec<u64>, StoreError> {
        if self.txn.is_none() {
            return Err(StoreError::RolledBack);
        }
        match self.try_commit() {
            Ok(()) => {
                #[cfg(feature = "logging")]
                log::debug!(
                    "committed {} records to store '{}'",
                    self.staged.len(),
                    self.store.name()
                );
                Ok(std::mem::take(&mut self.staged))
            }
            Err(err) => {
                self.roll_back(&err);
                Err(err)
            }
        }
    }

    fn try_commit(&mut self) -> Result<(), StoreError> {
        let txn = self.txn.take().ok_or(StoreError::RolledBack)?;
        let inner = self
            .guard
            .as_mut()
            .ok_or_else(|| self.store.state.not_found())?;

        let mut meta = inner.meta.clone();
        meta.next_id = self.next_id;
        {
            let mut catalog = txn.open_table(CATALOG_TABLE)?;
            catalog.insert(self.store.name(), meta.to_bytes()?.as_slice())?;
        }
        txn.commit()?;

        if let Some(index) = inner.index.as_mut() {
            index.commit_staged();
        }
        inner.meta = meta;
        Ok(())
    }

    /// Discards everything staged so far and ends the batch.
    pub fn abort(mut self) {
        self.roll_back(&"aborted by caller");
    }

    fn roll_back(&mut self, reason: &dyn fmt::Display) {
        if let Some(txn) = self.txn.take() {
            if let Err(_e) = txn.abort() {
                #[cfg(feature = "logging")]
                log::warn!(
                    "aborting write transaction on store '{}' failed: {_e}",
                    self.store.name()
                );
            }
        }

        let mut _removed = 0;
        if let Some(inner) = self.guard.as_mut() {
            if let Some(index) = inner.index.as_mut() {
                _removed = index.rollback_staged();
            }
            self.next_id = inner.meta.next_id;
        }
        self.staged.clear();

        #[cfg(feature = "logging")]
        log::warn!(
            "rolled back {_removed} staged records in store '{}': {reason}",
            self.store.name()
        );
        #[cfg(not(feature = "logging"))]
        let _ = reason;
    }
}

impl Drop for WriteBatch<'_> {
    fn drop(&mut self) {
        if self.txn.is_some() {
            self.roll_back(&"batch dropped before commit");
        }
    }
}

impl fmt::Debug for WriteBatch<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteBatch")
            .field("store", &self.store.name())
            .field("staged", &self.staged.len())
            .field("open", &self.txn.is_some())
            .finish_non_exhaustive()
    }
}

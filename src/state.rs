use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use manifold_vectors::{HnswIndex, IndexStats};
use redb::{Database, ReadableTable, TableDefinition};

use crate::catalog::{StoreMetadata, records_table_name};
use crate::error::StoreError;
use crate::record::StoredRecord;

/// Loaded state of one existing store.
pub(crate) struct StoreInner {
    pub meta: StoreMetadata,
    /// Built on first use after open, then kept in step with every commit.
    pub index: Option<HnswIndex>,
}

impl StoreInner {
    /// State for a store that was just created or reset: empty, index ready.
    pub fn empty(meta: StoreMetadata, search_breadth: usize) -> Self {
        let index = HnswIndex::new(meta.dimension, meta.index_config(search_breadth));
        Self {
            meta,
            index: Some(index),
        }
    }

    /// State for a store found in the catalog; the index is rebuilt lazily.
    pub fn unloaded(meta: StoreMetadata) -> Self {
        Self { meta, index: None }
    }
}

/// Shared state for a store, supporting lazy index construction.
///
/// `inner` is `None` while the store does not exist (never created, or dropped).
/// Holding the write lock excludes every other writer and reader of the store, so a
/// unit of work that keeps it until commit is never observed half-applied.
pub(crate) struct StoreState {
    /// Name of this store.
    pub name: String,
    inner: RwLock<Option<StoreInner>>,
}

impl StoreState {
    pub fn new(name: String, inner: Option<StoreInner>) -> Self {
        Self {
            name,
            inner: RwLock::new(inner),
        }
    }

    pub fn read(&self) -> Result<RwLockReadGuard<'_, Option<StoreInner>>, StoreError> {
        if self.inner.is_poisoned() {
            drop(self.write()?);
        }
        Ok(self.inner.read()?)
    }

    /// Takes the exclusive lock.
    ///
    /// A lock poisoned by a panic inside a unit of work is recovered: the batch
    /// rolled back its storage transaction while unwinding, and the index is
    /// discarded so it is rebuilt from committed records on next use.
    pub fn write(&self) -> Result<RwLockWriteGuard<'_, Option<StoreInner>>, StoreError> {
        match self.inner.write() {
            Ok(guard) => Ok(guard),
            Err(poisoned) => {
                let mut guard = poisoned.into_inner();
                self.inner.clear_poison();
                if let Some(inner) = guard.as_mut() {
                    inner.index = None;
                }

                #[cfg(feature = "logging")]
                log::warn!(
                    "recovered store '{}' after a panic; index will be rebuilt",
                    self.name
                );

                Ok(guard)
            }
        }
    }

    pub fn exists(&self) -> Result<bool, StoreError> {
        Ok(self.read()?.is_some())
    }

    pub fn not_found(&self) -> StoreError {
        StoreError::StoreNotFound(self.name.clone())
    }

    /// Runs `f` against the loaded index, building it first if necessary.
    ///
    /// The common case holds only the read lock. Building takes the write lock and
    /// re-checks, so concurrent callers build at most once.
    pub fn with_index<R>(
        &self,
        db: &Database,
        search_breadth: usize,
        f: impl FnOnce(&StoreMetadata, &HnswIndex) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        {
            let guard = self.read()?;
            let inner = guard.as_ref().ok_or_else(|| self.not_found())?;
            if let Some(index) = inner.index.as_ref() {
                return f(&inner.meta, index);
            }
        }

        let mut guard = self.write()?;
        let StoreInner { meta, index } = guard.as_mut().ok_or_else(|| self.not_found())?;
        let index = loaded_index(db, &self.name, meta, index, search_breadth)?;
        f(meta, index)
    }

    /// Builds the index if it is not built yet and returns its stats.
    pub fn ensure_index(
        &self,
        db: &Database,
        search_breadth: usize,
    ) -> Result<IndexStats, StoreError> {
        self.with_index(db, search_breadth, |_, index| Ok(index.stats()))
    }
}

/// Returns the store's index, rebuilding it from the records table if needed.
pub(crate) fn loaded_index<'a>(
    db: &Database,
    name: &str,
    meta: &StoreMetadata,
    slot: &'a mut Option<HnswIndex>,
    search_breadth: usize,
) -> Result<&'a mut HnswIndex, StoreError> {
    let index = match slot.take() {
        Some(index) => index,
        None => rebuild_index(db, name, meta, search_breadth)?,
    };
    Ok(slot.insert(index))
}

/// Reads every record in ascending id order and indexes it.
fn rebuild_index(
    db: &Database,
    name: &str,
    meta: &StoreMetadata,
    search_breadth: usize,
) -> Result<HnswIndex, StoreError> {
    let table_name = records_table_name(name);
    let definition: TableDefinition<u64, &[u8]> = TableDefinition::new(&table_name);

    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(definition)?;

    let mut index = HnswIndex::new(meta.dimension, meta.index_config(search_breadth));
    for entry in table.iter()? {
        let (id, value) = entry?;
        let record = StoredRecord::from_bytes(id.value(), value.value())?;
        if record.embedding.len() != meta.dimension {
            return Err(StoreError::Corrupted(format!(
                "record {} in store '{name}' has {} elements, store dimension is {}",
                record.id,
                record.embedding.len(),
                meta.dimension
            )));
        }
        index.insert(record.id, &record.embedding)?;
    }

    #[cfg(feature = "logging")]
    log::info!(
        "rebuilt index for store '{name}': {} records, dimension {}",
        index.len(),
        meta.dimension
    );

    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use manifold_vectors::HnswConfig;

    #[test]
    fn test_state_creation() {
        let meta = StoreMetadata::new(3, &HnswConfig::default());
        let state = StoreState::new("design".to_string(), Some(StoreInner::unloaded(meta)));

        assert_eq!(state.name, "design");
        assert!(state.exists().unwrap());
        assert!(state.read().unwrap().as_ref().unwrap().index.is_none());
    }

    #[test]
    fn test_absent_state() {
        let state = StoreState::new("gone".to_string(), None);
        assert!(!state.exists().unwrap());
        assert!(matches!(state.not_found(), StoreError::StoreNotFound(name) if name == "gone"));
    }

    #[test]
    fn test_empty_inner_has_index() {
        let meta = StoreMetadata::new(4, &HnswConfig::default());
        let inner = StoreInner::empty(meta, 12);
        let index = inner.index.unwrap();
        assert_eq!(index.dimension(), 4);
        assert_eq!(index.config().search_breadth, 12);
        assert!(index.is_empty());
    }

    #[test]
    fn test_poisoned_lock_is_recovered() {
        let meta = StoreMetadata::new(2, &HnswConfig::default());
        let state = std::sync::Arc::new(StoreState::new(
            "design".to_string(),
            Some(StoreInner::empty(meta, 40)),
        ));

        let panicking = std::sync::Arc::clone(&state);
        let result = std::thread::spawn(move || {
            let guard = panicking.write().unwrap();
            assert!(guard.is_none(), "writer panicked while holding the lock");
        })
        .join();
        assert!(result.is_err());

        let guard = state.read().unwrap();
        let inner = guard.as_ref().unwrap();
        assert_eq!(inner.meta.dimension, 2);
        assert!(inner.index.is_none());
    }
}

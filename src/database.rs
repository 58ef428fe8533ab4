use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use manifold_vectors::Embedder;
use redb::{Database, ReadableTable, TableDefinition};

use crate::builder::StoreDatabaseBuilder;
use crate::catalog::{CATALOG_TABLE, StoreMetadata, records_table_name};
use crate::config::{ResetPolicy, StoreConfig, validate_dimension};
use crate::error::StoreError;
use crate::state::{StoreInner, StoreState};
use crate::store::Store;

/// Longest accepted store name, in bytes.
const MAX_STORE_NAME_LEN: usize = 128;

/// A database holding any number of named vector stores.
///
/// Each store has a fixed vector dimensionality, an append-only set of records and
/// an in-memory similarity index kept in step with every commit. Stores are created,
/// reset and dropped here; records are written and queried through [`Store`]
/// handles.
///
/// Schema changes to a store hold that store's exclusive lock for their whole
/// duration, so writers see either no store or a complete one.
///
/// # Example
///
/// ```
/// use manifold_vecstore::{Record, StoreDatabase};
///
/// # fn main() -> Result<(), manifold_vecstore::StoreError> {
/// let db = StoreDatabase::open_in_memory()?;
/// let store = db.ensure_store("design", 2)?;
///
/// let a = store.insert_one(&Record::new("A", "x").with_embedding(vec![1.0f32, 0.0]))?;
/// store.insert_one(&Record::new("B", "y").with_embedding(vec![0.0f32, 1.0]))?;
///
/// let hits = store.query_top_k(&[1.0, 0.0], 1)?;
/// assert_eq!(hits[0].id, a);
/// # Ok(())
/// # }
/// ```
pub struct StoreDatabase {
    db: Arc<Database>,
    config: StoreConfig,
    embedder: Arc<dyn Embedder>,
    stores: RwLock<HashMap<String, Arc<StoreState>>>,
}

impl StoreDatabase {
    /// Returns a builder for configuring and opening a database.
    pub fn builder() -> StoreDatabaseBuilder {
        StoreDatabaseBuilder::new()
    }

    /// Opens or creates a database file at `path` with default settings.
    ///
    /// This is equivalent to `StoreDatabase::builder().open(path)`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::builder().open(path)
    }

    /// Creates an empty in-memory database with default settings.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::builder().open_in_memory()
    }

    /// Loads the catalog into per-store states. Called by the builder.
    pub(crate) fn from_parts(
        db: Database,
        config: StoreConfig,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, StoreError> {
        {
            let txn = db.begin_write()?;
            txn.open_table(CATALOG_TABLE)?;
            txn.commit()?;
        }

        let mut stores = HashMap::new();
        {
            let read_txn = db.begin_read()?;
            let catalog = read_txn.open_table(CATALOG_TABLE)?;
            for entry in catalog.iter()? {
                let (name, value) = entry?;
                let name = name.value().to_string();
                let meta = StoreMetadata::from_bytes(value.value())?;
                let state = StoreState::new(name.clone(), Some(StoreInner::unloaded(meta)));
                stores.insert(name, Arc::new(state));
            }
        }

        #[cfg(feature = "logging")]
        log::info!("opened vector database with {} stores", stores.len());

        Ok(Self {
            db: Arc::new(db),
            config,
            embedder,
            stores: RwLock::new(stores),
        })
    }

    /// Returns the startup configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Opens the store `name` as the startup configuration says.
    ///
    /// With reset enabled the store is dropped and recreated empty with the
    /// configured dimension; otherwise it is created if absent and checked against
    /// the configured dimension if present. Intended to run once per store at
    /// process start.
    pub fn open_store(&self, name: &str) -> Result<Store, StoreError> {
        let dimension = self.config.vector_dimension;
        match self.config.reset_policy() {
            ResetPolicy::Reset => self.reset_store(name, dimension),
            ResetPolicy::NoReset => self.ensure_store(name, dimension),
        }
    }

    /// Ensures a store named `name` exists with `dimension`, creating it if absent.
    ///
    /// Idempotent. A store that already exists with another dimensionality is a
    /// [`StoreError::SchemaConflict`]; it is never altered.
    pub fn ensure_store(&self, name: &str, dimension: usize) -> Result<Store, StoreError> {
        self.ensure_store_tracked(name, dimension)
            .map(|(store, _)| store)
    }

    /// Like [`StoreDatabase::ensure_store`], also reporting whether this call
    /// created the store.
    pub(crate) fn ensure_store_tracked(
        &self,
        name: &str,
        dimension: usize,
    ) -> Result<(Store, bool), StoreError> {
        validate_store_name(name)?;
        validate_dimension(dimension)?;

        let state = self.state_for(name)?;
        let mut created = false;
        {
            let mut guard = state.write()?;
            match guard.as_ref() {
                Some(existing) if existing.meta.dimension != dimension => {
                    return Err(StoreError::SchemaConflict {
                        store: name.to_string(),
                        existing: existing.meta.dimension,
                        requested: dimension,
                    });
                }
                Some(existing) => {
                    self.check_index_parameters(name, &existing.meta);
                }
                None => {
                    let meta = StoreMetadata::new(dimension, &self.config.index_config());
                    self.write_store(name, &meta)?;
                    *guard = Some(StoreInner::empty(meta, self.config.index_search_breadth));
                    created = true;

                    #[cfg(feature = "logging")]
                    log::info!("created store '{name}' with dimension {dimension}");
                }
            }
        }
        Ok((self.handle(state), created))
    }

    /// Drops any existing store named `name` and recreates it empty with
    /// `dimension` and the configured index parameters.
    ///
    /// Destructive: every record is lost.
    pub fn reset_store(&self, name: &str, dimension: usize) -> Result<Store, StoreError> {
        validate_store_name(name)?;
        validate_dimension(dimension)?;

        let state = self.state_for(name)?;
        {
            let mut guard = state.write()?;
            let meta = StoreMetadata::new(dimension, &self.config.index_config());
            self.write_store(name, &meta)?;
            *guard = Some(StoreInner::empty(meta, self.config.index_search_breadth));
        }

        #[cfg(feature = "logging")]
        log::warn!("reset store '{name}': all records dropped, dimension {dimension}");

        Ok(self.handle(state))
    }

    /// Drops the store `name` with all of its records and its index.
    pub fn drop_store(&self, name: &str) -> Result<(), StoreError> {
        let state = {
            let stores = self.stores.read()?;
            stores
                .get(name)
                .cloned()
                .ok_or_else(|| StoreError::StoreNotFound(name.to_string()))?
        };

        let mut guard = state.write()?;
        if guard.is_none() {
            return Err(StoreError::StoreNotFound(name.to_string()));
        }
        self.delete_store(name, &mut guard)?;

        #[cfg(feature = "logging")]
        log::info!("dropped store '{name}'");

        Ok(())
    }

    /// Drops the store `name` only if no record was ever committed to it.
    ///
    /// Returns whether the store was dropped. The check and the drop happen under
    /// the store's exclusive lock, so a concurrent commit is never lost.
    pub(crate) fn drop_store_if_unused(&self, name: &str) -> Result<bool, StoreError> {
        let Some(state) = self.stores.read()?.get(name).cloned() else {
            return Ok(false);
        };

        let mut guard = state.write()?;
        match guard.as_ref() {
            Some(inner) if inner.meta.committed() == 0 => {}
            _ => return Ok(false),
        }
        self.delete_store(name, &mut guard)?;
        Ok(true)
    }

    /// Returns a handle to an existing store.
    pub fn store(&self, name: &str) -> Result<Store, StoreError> {
        let state = {
            let stores = self.stores.read()?;
            stores.get(name).cloned()
        };
        match state {
            Some(state) if state.exists()? => Ok(self.handle(state)),
            _ => Err(StoreError::StoreNotFound(name.to_string())),
        }
    }

    /// Returns the names of all existing stores, sorted.
    pub fn list_stores(&self) -> Result<Vec<String>, StoreError> {
        let stores = self.stores.read()?;
        let mut names = Vec::with_capacity(stores.len());
        for (name, state) in stores.iter() {
            if state.exists()? {
                names.push(name.clone());
            }
        }
        names.sort();
        Ok(names)
    }

    fn handle(&self, state: Arc<StoreState>) -> Store {
        Store::new(
            state,
            Arc::clone(&self.db),
            Arc::clone(&self.embedder),
            self.config.index_search_breadth,
        )
    }

    /// Returns the state for `name`, registering an absent one if unknown.
    fn state_for(&self, name: &str) -> Result<Arc<StoreState>, StoreError> {
        {
            let stores = self.stores.read()?;
            if let Some(state) = stores.get(name) {
                return Ok(Arc::clone(state));
            }
        }

        let mut stores = self.stores.write()?;
        let state = stores
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(StoreState::new(name.to_string(), None)));
        Ok(Arc::clone(state))
    }

    /// Removes the store's records table and catalog entry in one transaction, then
    /// marks the state absent.
    fn delete_store(
        &self,
        name: &str,
        inner: &mut Option<StoreInner>,
    ) -> Result<(), StoreError> {
        let table_name = records_table_name(name);
        let records: TableDefinition<u64, &[u8]> = TableDefinition::new(&table_name);
        let txn = self.db.begin_write()?;
        txn.delete_table(records)?;
        {
            let mut catalog = txn.open_table(CATALOG_TABLE)?;
            catalog.remove(name)?;
        }
        txn.commit()?;
        *inner = None;
        Ok(())
    }

    /// Replaces the store's records table and catalog entry in one transaction.
    fn write_store(&self, name: &str, meta: &StoreMetadata) -> Result<(), StoreError> {
        let table_name = records_table_name(name);
        let records: TableDefinition<u64, &[u8]> = TableDefinition::new(&table_name);

        let txn = self.db.begin_write()?;
        txn.delete_table(records)?;
        txn.open_table(records)?;
        {
            let mut catalog = txn.open_table(CATALOG_TABLE)?;
            catalog.insert(name, meta.to_bytes()?.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Build-time index parameters are fixed when a store is created; a differing
    /// configuration only takes effect after a reset.
    fn check_index_parameters(&self, _name: &str, meta: &StoreMetadata) {
        if meta.max_connectivity != self.config.index_max_connectivity
            || meta.construction_breadth != self.config.index_construction_breadth
        {
            #[cfg(feature = "logging")]
            log::warn!(
                "store '{_name}' keeps its persisted index parameters (max connectivity {}, construction breadth {}); configured values ({}, {}) apply only after a reset",
                meta.max_connectivity,
                meta.construction_breadth,
                self.config.index_max_connectivity,
                self.config.index_construction_breadth
            );
        }
    }
}

fn validate_store_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() || name.len() > MAX_STORE_NAME_LEN {
        return Err(StoreError::InvalidArgument(format!(
            "store name must be 1 to {MAX_STORE_NAME_LEN} bytes long"
        )));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(StoreError::InvalidArgument(format!(
            "store name '{name}' may only contain ASCII letters, digits, '_' and '-'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_store_name_rules() {
        assert!(validate_store_name("design").is_ok());
        assert!(validate_store_name("design_v2-final").is_ok());
        assert!(validate_store_name("").is_err());
        assert!(validate_store_name("manifold.stores").is_err());
        assert!(validate_store_name(&"a".repeat(MAX_STORE_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn test_ensure_store_is_idempotent() {
        let db = StoreDatabase::open_in_memory().unwrap();
        db.ensure_store("design", 4).unwrap();
        let store = db.ensure_store("design", 4).unwrap();
        assert_eq!(store.dimension().unwrap(), 4);
        assert_eq!(db.list_stores().unwrap(), vec!["design".to_string()]);
    }

    #[test]
    fn test_ensure_store_dimension_conflict() {
        let db = StoreDatabase::open_in_memory().unwrap();
        db.ensure_store("design", 4).unwrap();
        let err = db.ensure_store("design", 8).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaConflict);
        assert_eq!(db.store("design").unwrap().dimension().unwrap(), 4);
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let db = StoreDatabase::open_in_memory().unwrap();
        let err = db.ensure_store("design", 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(db.list_stores().unwrap().is_empty());
    }

    #[test]
    fn test_store_not_found() {
        let db = StoreDatabase::open_in_memory().unwrap();
        assert_eq!(db.store("missing").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(db.drop_store("missing").unwrap_err().kind(), ErrorKind::NotFound);
    }
}

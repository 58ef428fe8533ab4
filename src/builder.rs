use std::path::Path;
use std::sync::Arc;

use manifold_vectors::{DeterministicEmbedder, Embedder};
use redb::Database;
use redb::backends::InMemoryBackend;

use crate::config::StoreConfig;
use crate::database::StoreDatabase;
use crate::error::StoreError;

/// Builder for configuring and opening a [`StoreDatabase`].
///
/// # Example
///
/// ```no_run
/// use manifold_vecstore::{StoreConfig, StoreDatabase};
///
/// # fn main() -> Result<(), manifold_vecstore::StoreError> {
/// let db = StoreDatabase::builder()
///     .config(StoreConfig::from_env()?)
///     .open("designs.manifold")?;
/// let store = db.open_store("design")?;
/// # Ok(())
/// # }
/// ```
pub struct StoreDatabaseBuilder {
    config: StoreConfig,
    embedder: Arc<dyn Embedder>,
}

impl StoreDatabaseBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: StoreConfig::default(),
            embedder: Arc::new(DeterministicEmbedder),
        }
    }

    /// Sets the startup configuration.
    ///
    /// Default: [`StoreConfig::default`] (no reset, dimension 384)
    #[must_use]
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the embedder used for records without an embedding and for text queries.
    ///
    /// Default: [`DeterministicEmbedder`], a reproducible placeholder with no semantic
    /// meaning.
    #[must_use]
    pub fn embedder(mut self, embedder: impl Embedder + 'static) -> Self {
        self.embedder = Arc::new(embedder);
        self
    }

    /// Opens or creates a database file at `path`.
    ///
    /// Stores recorded in the file's catalog are available immediately; their
    /// indexes are rebuilt lazily on first use.
    pub fn open(self, path: impl AsRef<Path>) -> Result<StoreDatabase, StoreError> {
        self.config.validate()?;
        let db = Database::create(path.as_ref())?;
        StoreDatabase::from_parts(db, self.config, self.embedder)
    }

    /// Creates an empty database held entirely in memory.
    pub fn open_in_memory(self) -> Result<StoreDatabase, StoreError> {
        self.config.validate()?;
        let db = Database::builder().create_with_backend(InMemoryBackend::new())?;
        StoreDatabase::from_parts(db, self.config, self.embedder)
    }
}

impl Default for StoreDatabaseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

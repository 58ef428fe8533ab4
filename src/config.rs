use std::fmt;
use std::str::FromStr;

use manifold_vectors::HnswConfig;
use manifold_vectors::hnsw::{
    DEFAULT_CONSTRUCTION_BREADTH, DEFAULT_MAX_CONNECTIVITY, DEFAULT_SEARCH_BREADTH,
};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Environment variable selecting [`ResetPolicy`].
pub const ENV_RESET_ON_STARTUP: &str = "MANIFOLD_RESET_ON_STARTUP";
/// Environment variable for [`StoreConfig::vector_dimension`].
pub const ENV_VECTOR_DIMENSION: &str = "MANIFOLD_VECTOR_DIMENSION";
/// Environment variable for [`StoreConfig::index_max_connectivity`].
pub const ENV_INDEX_MAX_CONNECTIVITY: &str = "MANIFOLD_INDEX_MAX_CONNECTIVITY";
/// Environment variable for [`StoreConfig::index_construction_breadth`].
pub const ENV_INDEX_CONSTRUCTION_BREADTH: &str = "MANIFOLD_INDEX_CONSTRUCTION_BREADTH";
/// Environment variable for [`StoreConfig::index_search_breadth`].
pub const ENV_INDEX_SEARCH_BREADTH: &str = "MANIFOLD_INDEX_SEARCH_BREADTH";

/// Default vector dimensionality for stores opened from configuration.
pub const DEFAULT_VECTOR_DIMENSION: usize = 384;

/// What opening a store from configuration does to existing data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetPolicy {
    /// Drop and recreate the store.
    Reset,
    /// Keep existing data; create the store only if absent.
    #[default]
    NoReset,
}

impl FromStr for ResetPolicy {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reset" | "true" | "1" => Ok(ResetPolicy::Reset),
            "no-reset" | "false" | "0" => Ok(ResetPolicy::NoReset),
            other => Err(StoreError::InvalidArgument(format!(
                "unrecognized reset policy '{other}', expected reset or no-reset"
            ))),
        }
    }
}

impl fmt::Display for ResetPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResetPolicy::Reset => f.write_str("reset"),
            ResetPolicy::NoReset => f.write_str("no-reset"),
        }
    }
}

/// Startup configuration for a [`StoreDatabase`](crate::StoreDatabase).
///
/// The default is safe for persistent deployments: existing stores are kept. Use
/// [`StoreConfig::development`] for throwaway environments that should start empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreConfig {
    /// Drop and recreate stores when they are opened from configuration.
    ///
    /// Default: false
    pub reset_on_startup: bool,

    /// Dimensionality of stores opened from configuration.
    ///
    /// Default: 384
    pub vector_dimension: usize,

    /// Maximum links per index node. Persisted with the store at creation.
    ///
    /// Default: 16
    pub index_max_connectivity: usize,

    /// Beam width while building the index. Persisted with the store at creation.
    ///
    /// Default: 64
    pub index_construction_breadth: usize,

    /// Beam width while querying; can be overridden per store handle.
    ///
    /// Default: 40
    pub index_search_breadth: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            reset_on_startup: false,
            vector_dimension: DEFAULT_VECTOR_DIMENSION,
            index_max_connectivity: DEFAULT_MAX_CONNECTIVITY,
            index_construction_breadth: DEFAULT_CONSTRUCTION_BREADTH,
            index_search_breadth: DEFAULT_SEARCH_BREADTH,
        }
    }
}

impl StoreConfig {
    /// Defaults for local development: stores are reset every time they are opened.
    pub fn development() -> Self {
        Self {
            reset_on_startup: true,
            ..Self::default()
        }
    }

    /// Reads the configuration from the process environment.
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, StoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name to its
    /// value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, StoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_RESET_ON_STARTUP) {
            config.reset_on_startup = value.parse::<ResetPolicy>()? == ResetPolicy::Reset;
        }
        if let Some(value) = lookup(ENV_VECTOR_DIMENSION) {
            config.vector_dimension = parse_count(ENV_VECTOR_DIMENSION, &value)?;
        }
        if let Some(value) = lookup(ENV_INDEX_MAX_CONNECTIVITY) {
            config.index_max_connectivity = parse_count(ENV_INDEX_MAX_CONNECTIVITY, &value)?;
        }
        if let Some(value) = lookup(ENV_INDEX_CONSTRUCTION_BREADTH) {
            config.index_construction_breadth =
                parse_count(ENV_INDEX_CONSTRUCTION_BREADTH, &value)?;
        }
        if let Some(value) = lookup(ENV_INDEX_SEARCH_BREADTH) {
            config.index_search_breadth = parse_count(ENV_INDEX_SEARCH_BREADTH, &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Returns the reset flag as a [`ResetPolicy`].
    pub fn reset_policy(&self) -> ResetPolicy {
        if self.reset_on_startup {
            ResetPolicy::Reset
        } else {
            ResetPolicy::NoReset
        }
    }

    /// Returns the index parameters.
    pub fn index_config(&self) -> HnswConfig {
        HnswConfig {
            max_connectivity: self.index_max_connectivity,
            construction_breadth: self.index_construction_breadth,
            search_breadth: self.index_search_breadth,
        }
    }

    /// Checks that every value is usable.
    pub fn validate(&self) -> Result<(), StoreError> {
        validate_dimension(self.vector_dimension)?;
        self.index_config().validate()?;
        if u32::try_from(self.index_max_connectivity).is_err()
            || u32::try_from(self.index_construction_breadth).is_err()
        {
            return Err(StoreError::InvalidArgument(
                "index parameters must fit in 32 bits".to_string(),
            ));
        }
        Ok(())
    }
}

/// Checks that `dimension` can be stored.
pub(crate) fn validate_dimension(dimension: usize) -> Result<(), StoreError> {
    if dimension == 0 {
        return Err(StoreError::InvalidArgument(
            "vector dimension must be at least 1".to_string(),
        ));
    }
    if u32::try_from(dimension).is_err() {
        return Err(StoreError::InvalidArgument(format!(
            "vector dimension {dimension} is too large"
        )));
    }
    Ok(())
}

fn parse_count(key: &str, value: &str) -> Result<usize, StoreError> {
    value.trim().parse::<usize>().map_err(|e| {
        StoreError::InvalidArgument(format!("{key}='{value}' is not a valid count: {e}"))
    })
}

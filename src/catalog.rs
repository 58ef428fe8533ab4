use manifold_vectors::HnswConfig;
use redb::TableDefinition;

use crate::error::StoreError;

/// Magic number opening every encoded [`StoreMetadata`].
///
/// The trailing 0x1A, 0x0A bytes catch text-mode corruption.
pub const MAGIC_NUMBER: [u8; 9] = *b"mnfd-vs\x1A\x0A";

/// Current encoding version of [`StoreMetadata`].
pub const FORMAT_VERSION: u8 = 1;

/// Encoded size: magic | version | dimension | connectivity | breadth | `next_id` | crc.
const ENCODED_LEN: usize = 9 + 1 + 4 + 4 + 4 + 8 + 4;

/// Catalog of every store in the database: store name -> encoded [`StoreMetadata`].
pub(crate) const CATALOG_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("manifold.stores");

/// Name of the table holding a store's records.
pub(crate) fn records_table_name(store: &str) -> String {
    format!("{store}.records")
}

/// Persisted description of one store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreMetadata {
    /// Fixed vector dimensionality.
    pub dimension: usize,
    /// Index links per node, fixed at creation.
    pub max_connectivity: usize,
    /// Index build beam width, fixed at creation.
    pub construction_breadth: usize,
    /// Id the next inserted record receives.
    pub next_id: u64,
}

impl StoreMetadata {
    /// Metadata for a new, empty store.
    pub fn new(dimension: usize, index: &HnswConfig) -> Self {
        Self {
            dimension,
            max_connectivity: index.max_connectivity,
            construction_breadth: index.construction_breadth,
            next_id: 1,
        }
    }

    /// Returns the index parameters, with `search_breadth` as the query default.
    pub fn index_config(&self, search_breadth: usize) -> HnswConfig {
        HnswConfig {
            max_connectivity: self.max_connectivity,
            construction_breadth: self.construction_breadth,
            search_breadth,
        }
    }

    /// Number of records ever committed to the store.
    pub fn committed(&self) -> u64 {
        self.next_id - 1
    }

    /// Serializes the metadata.
    ///
    /// Format: `magic` (9) | `version` (u8) | `dimension` (u32) | `max_connectivity`
    /// (u32) | `construction_breadth` (u32) | `next_id` (u64) | CRC32 of the preceding
    /// bytes (u32). Integers are little-endian.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StoreError> {
        let dimension = to_u32("dimension", self.dimension)?;
        let max_connectivity = to_u32("max connectivity", self.max_connectivity)?;
        let construction_breadth = to_u32("construction breadth", self.construction_breadth)?;

        let mut bytes = Vec::with_capacity(ENCODED_LEN);
        bytes.extend_from_slice(&MAGIC_NUMBER);
        bytes.push(FORMAT_VERSION);
        bytes.extend_from_slice(&dimension.to_le_bytes());
        bytes.extend_from_slice(&max_connectivity.to_le_bytes());
        bytes.extend_from_slice(&construction_breadth.to_le_bytes());
        bytes.extend_from_slice(&self.next_id.to_le_bytes());

        let crc = crc32fast::hash(&bytes);
        bytes.extend_from_slice(&crc.to_le_bytes());

        debug_assert_eq!(bytes.len(), ENCODED_LEN);
        Ok(bytes)
    }

    /// Deserializes metadata, validating magic number, checksum and version.
    pub fn from_bytes(data: &[u8]) -> Result<Self, StoreError> {
        if data.len() != ENCODED_LEN {
            return Err(StoreError::Corrupted(format!(
                "store metadata has {} bytes, expected {ENCODED_LEN}",
                data.len()
            )));
        }
        if data[0..9] != MAGIC_NUMBER {
            return Err(StoreError::Corrupted(
                "invalid store metadata magic number".to_string(),
            ));
        }

        let body = ENCODED_LEN - 4;
        let stored_crc = u32::from_le_bytes(read_array(data, body));
        let computed_crc = crc32fast::hash(&data[0..body]);
        if stored_crc != computed_crc {
            return Err(StoreError::Corrupted(format!(
                "store metadata checksum mismatch: expected {stored_crc:#x}, got {computed_crc:#x}"
            )));
        }

        let version = data[9];
        if version != FORMAT_VERSION {
            return Err(StoreError::Corrupted(format!(
                "unsupported store metadata version: {version}"
            )));
        }

        let metadata = Self {
            dimension: u32::from_le_bytes(read_array(data, 10)) as usize,
            max_connectivity: u32::from_le_bytes(read_array(data, 14)) as usize,
            construction_breadth: u32::from_le_bytes(read_array(data, 18)) as usize,
            next_id: u64::from_le_bytes(read_array(data, 22)),
        };

        if metadata.dimension == 0 || metadata.next_id == 0 {
            return Err(StoreError::Corrupted(
                "store metadata has a zero dimension or id counter".to_string(),
            ));
        }
        Ok(metadata)
    }
}

/// Copies `N` bytes at `offset`; the caller has checked the length.
fn read_array<const N: usize>(data: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&data[offset..offset + N]);
    out
}

fn to_u32(field: &str, value: usize) -> Result<u32, StoreError> {
    u32::try_from(value)
        .map_err(|_| StoreError::InvalidArgument(format!("{field} {value} exceeds 32 bits")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StoreMetadata {
        StoreMetadata {
            dimension: 384,
            max_connectivity: 16,
            construction_breadth: 64,
            next_id: 42,
        }
    }

    #[test]
    fn test_encoding_layout() {
        let bytes = sample().to_bytes().unwrap();
        assert_eq!(bytes.len(), ENCODED_LEN);
        assert_eq!(&bytes[0..9], &MAGIC_NUMBER);
        assert_eq!(bytes[9], FORMAT_VERSION);
        assert_eq!(StoreMetadata::from_bytes(&bytes).unwrap(), sample());
    }

    #[test]
    fn test_new_store_starts_at_one() {
        let meta = StoreMetadata::new(2, &HnswConfig::default());
        assert_eq!(meta.next_id, 1);
        assert_eq!(meta.committed(), 0);
        assert_eq!(meta.index_config(40), HnswConfig::default());
    }

    #[test]
    fn test_invalid_magic_number() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[0..8].copy_from_slice(b"badmagic");
        let err = StoreMetadata::from_bytes(&bytes).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn test_checksum_detects_flipped_bit() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[12] ^= 0x01;
        let err = StoreMetadata::from_bytes(&bytes).unwrap_err();
        assert!(err.to_string().contains("checksum"));
    }

    #[test]
    fn test_too_short_data() {
        assert!(StoreMetadata::from_bytes(&[0u8; 10]).is_err());
    }

    #[test]
    fn test_records_table_name() {
        assert_eq!(records_table_name("design"), "design.records");
    }
}

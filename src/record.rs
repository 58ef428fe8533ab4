use manifold_vectors::{Embedder, RawVector, codec};

use crate::error::StoreError;

/// A record to insert.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    /// Short name of the record. Must not be blank.
    pub title: String,
    /// Free-form text. Must not be blank; the embedding is derived from it when none
    /// is supplied.
    pub description: String,
    /// Supplied embedding, if any.
    pub embedding: RawVector,
}

impl Record {
    /// Creates a record whose embedding will be derived from `description`.
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            embedding: RawVector::Missing,
        }
    }

    /// Supplies the embedding explicitly.
    #[must_use]
    pub fn with_embedding(mut self, embedding: impl Into<RawVector>) -> Self {
        self.embedding = embedding.into();
        self
    }

    /// Checks the text fields and resolves the embedding to exactly `dimension`
    /// elements, generating it with `embedder` when none was supplied.
    pub(crate) fn prepare(
        &self,
        dimension: usize,
        embedder: &dyn Embedder,
    ) -> Result<PreparedRecord, StoreError> {
        require_text("title", &self.title)?;
        require_text("description", &self.description)?;

        let supplied = self.embedding.parse()?;
        let vector = codec::resolve_or_generate(
            supplied.as_deref(),
            &self.description,
            dimension,
            embedder,
        )?;

        Ok(PreparedRecord {
            title: self.title.clone(),
            description: self.description.clone(),
            vector,
        })
    }
}

fn require_text(field: &'static str, value: &str) -> Result<(), StoreError> {
    if value.trim().is_empty() {
        return Err(StoreError::validation(field, "is required"));
    }
    Ok(())
}

/// A validated record with its final embedding.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PreparedRecord {
    pub title: String,
    pub description: String,
    pub vector: Vec<f32>,
}

impl PreparedRecord {
    /// Serializes the record.
    ///
    /// Format: `title_len` (u32) | `title` | `description_len` (u32) | `description` |
    /// `dim` (u32) | `dim` little-endian f32 values.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StoreError> {
        let title = self.title.as_bytes();
        let description = self.description.as_bytes();

        let mut bytes =
            Vec::with_capacity(12 + title.len() + description.len() + self.vector.len() * 4);
        bytes.extend_from_slice(&length_prefix("title", title.len())?.to_le_bytes());
        bytes.extend_from_slice(title);
        bytes.extend_from_slice(&length_prefix("description", description.len())?.to_le_bytes());
        bytes.extend_from_slice(description);
        bytes.extend_from_slice(&length_prefix("embedding", self.vector.len())?.to_le_bytes());
        for value in &self.vector {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        Ok(bytes)
    }
}

fn length_prefix(field: &'static str, len: usize) -> Result<u32, StoreError> {
    u32::try_from(len).map_err(|_| StoreError::validation(field, "is too long"))
}

/// A record as persisted in a store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    /// Id assigned at insert.
    pub id: u64,
    /// Record title.
    pub title: String,
    /// Record description.
    pub description: String,
    /// The stored embedding.
    pub embedding: Vec<f32>,
}

impl StoredRecord {
    /// Deserializes a record written by [`PreparedRecord::to_bytes`].
    pub(crate) fn from_bytes(id: u64, data: &[u8]) -> Result<Self, StoreError> {
        let mut reader = Reader { id, data, offset: 0 };
        let title = reader.text()?;
        let description = reader.text()?;
        let dim = reader.u32()? as usize;
        let byte_len = dim.checked_mul(4).ok_or_else(|| reader.corrupt())?;
        let raw = reader.take(byte_len)?;
        let embedding = raw
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        if reader.offset != data.len() {
            return Err(reader.corrupt());
        }

        Ok(Self {
            id,
            title,
            description,
            embedding,
        })
    }
}

struct Reader<'a> {
    id: u64,
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn corrupt(&self) -> StoreError {
        StoreError::Corrupted(format!("record {} is truncated or malformed", self.id))
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], StoreError> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| self.corrupt())?;
        let data: &'a [u8] = self.data;
        let slice = &data[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32, StoreError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn text(&mut self) -> Result<String, StoreError> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| {
            StoreError::Corrupted(format!("record {} has invalid UTF-8 text: {e}", self.id))
        })
    }
}

//! Validation and textual encoding of fixed-length vectors.
//!
//! Vectors travel in and out of the store as a bracketed literal, `[v1,v2,...,vD]`,
//! with every element printed to exactly six fractional digits. The parser accepts
//! that form (plus whitespace around elements) and nothing else: it never evaluates
//! expressions and rejects `nan`/`inf` spellings outright.

use crate::embed::Embedder;
use crate::error::VectorError;

/// Number of fractional digits written by [`serialize`].
pub const LITERAL_PRECISION: usize = 6;

/// A vector as supplied by a caller, before validation.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RawVector {
    /// No vector was supplied; one will be generated from text.
    #[default]
    Missing,
    /// An already structured numeric sequence.
    Values(Vec<f64>),
    /// A textual literal such as `"[0.1, 0.2]"`.
    Literal(String),
}

impl RawVector {
    /// Parses the raw input into numbers.
    ///
    /// Returns `Ok(None)` for missing or blank input and an error for a malformed
    /// literal. An explicit empty sequence (`[]`) is returned as `Some(vec![])`.
    pub fn parse(&self) -> Result<Option<Vec<f64>>, VectorError> {
        match self {
            RawVector::Missing => Ok(None),
            RawVector::Values(values) => Ok(Some(values.clone())),
            RawVector::Literal(raw) => parse_literal(raw),
        }
    }

    /// Consuming variant of [`RawVector::parse`].
    pub fn into_values(self) -> Result<Option<Vec<f64>>, VectorError> {
        match self {
            RawVector::Missing => Ok(None),
            RawVector::Values(values) => Ok(Some(values)),
            RawVector::Literal(raw) => parse_literal(&raw),
        }
    }

    /// Returns `true` if no vector was supplied.
    pub fn is_missing(&self) -> bool {
        match self {
            RawVector::Missing => true,
            RawVector::Literal(raw) => raw.trim().is_empty(),
            RawVector::Values(_) => false,
        }
    }
}

impl From<Vec<f64>> for RawVector {
    fn from(values: Vec<f64>) -> Self {
        RawVector::Values(values)
    }
}

impl From<Vec<f32>> for RawVector {
    fn from(values: Vec<f32>) -> Self {
        RawVector::Values(values.into_iter().map(f64::from).collect())
    }
}

impl From<&[f32]> for RawVector {
    fn from(values: &[f32]) -> Self {
        RawVector::Values(values.iter().copied().map(f64::from).collect())
    }
}

impl<T: Into<RawVector>> From<Option<T>> for RawVector {
    fn from(value: Option<T>) -> Self {
        value.map_or(RawVector::Missing, Into::into)
    }
}

impl From<&str> for RawVector {
    fn from(raw: &str) -> Self {
        RawVector::Literal(raw.to_string())
    }
}

impl From<String> for RawVector {
    fn from(raw: String) -> Self {
        RawVector::Literal(raw)
    }
}

/// Checks the length of `values` and converts every element to `f32`.
///
/// Fails with [`VectorError::DimensionMismatch`] when `values.len() != expected` and
/// with [`VectorError::NonFinite`] for NaN, infinities, or values that overflow `f32`.
/// Vectors are never padded or truncated.
#[allow(clippy::cast_possible_truncation)]
pub fn validate<T>(values: &[T], expected: usize) -> Result<Vec<f32>, VectorError>
where
    T: Copy + Into<f64>,
{
    if values.len() != expected {
        return Err(VectorError::DimensionMismatch {
            expected,
            actual: values.len(),
        });
    }

    let mut out = Vec::with_capacity(expected);
    for (position, value) in values.iter().enumerate() {
        let wide: f64 = (*value).into();
        let narrow = wide as f32;
        if !wide.is_finite() || !narrow.is_finite() {
            return Err(VectorError::NonFinite { position });
        }
        out.push(narrow);
    }
    Ok(out)
}

/// Returns the supplied vector after validation, or derives one from `text`.
///
/// Generation goes through `embedder`, whose output is validated as well.
pub fn resolve_or_generate(
    supplied: Option<&[f64]>,
    text: &str,
    dimension: usize,
    embedder: &dyn Embedder,
) -> Result<Vec<f32>, VectorError> {
    match supplied {
        Some(values) => validate(values, dimension),
        None => validate(&embedder.embed(text, dimension), dimension),
    }
}

/// Writes the external literal form of `vector`: `[v1,v2,...]`, six fractional
/// digits per element, no whitespace.
pub fn serialize(vector: &[f32]) -> String {
    let mut out = String::with_capacity(2 + vector.len() * 10);
    out.push('[');
    for (i, value) in vector.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&format!("{:.*}", LITERAL_PRECISION, value));
    }
    out.push(']');
    out
}

/// Parses a vector literal.
///
/// Grammar: optional whitespace, `[`, comma separated decimal numbers (each may be
/// surrounded by whitespace), `]`, optional whitespace. Blank input yields `Ok(None)`.
pub fn parse_literal(raw: &str) -> Result<Option<Vec<f64>>, VectorError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let inner = trimmed
        .strip_prefix('[')
        .ok_or_else(|| VectorError::parse(raw, "expected '['"))?
        .strip_suffix(']')
        .ok_or_else(|| VectorError::parse(raw, "expected ']'"))?;

    if inner.trim().is_empty() {
        return Ok(Some(Vec::new()));
    }

    inner
        .split(',')
        .enumerate()
        .map(|(position, token)| parse_element(raw, position, token.trim()))
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn parse_element(raw: &str, position: usize, token: &str) -> Result<f64, VectorError> {
    if token.is_empty() {
        return Err(VectorError::parse(
            raw,
            format!("element {position} is empty"),
        ));
    }
    let well_formed = token
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'));
    if !well_formed || !token.bytes().any(|b| b.is_ascii_digit()) {
        return Err(VectorError::parse(
            raw,
            format!("element {position} ('{token}') is not a decimal number"),
        ));
    }
    let value: f64 = token.parse().map_err(|_| {
        VectorError::parse(
            raw,
            format!("element {position} ('{token}') is not a decimal number"),
        )
    })?;
    if !value.is_finite() {
        return Err(VectorError::parse(
            raw,
            format!("element {position} ('{token}') is out of range"),
        ));
    }
    Ok(value)
}

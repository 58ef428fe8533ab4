//! Text-to-vector seam.
//!
//! The store treats embedding inference as an opaque function. [`Embedder`] is that
//! function; [`DeterministicEmbedder`] is the placeholder used when no model is wired
//! in. It is reproducible across runs and processes, which ingestion relies on, but
//! its output carries no semantic meaning.

/// Produces a fixed-length vector for a piece of text.
pub trait Embedder: Send + Sync {
    /// Embeds `text` into a vector of exactly `dimension` elements.
    fn embed(&self, text: &str, dimension: usize) -> Vec<f32>;
}

impl<F> Embedder for F
where
    F: Fn(&str, usize) -> Vec<f32> + Send + Sync,
{
    fn embed(&self, text: &str, dimension: usize) -> Vec<f32> {
        self(text, dimension)
    }
}

/// Placeholder embedder derived from the character codes of the text.
///
/// With `b` the sum of the text's code points, element `i` is
/// `(sin(b * (i + 1)) + 1) / 2`, so every element lies in `[0, 1]`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeterministicEmbedder;

impl Embedder for DeterministicEmbedder {
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    fn embed(&self, text: &str, dimension: usize) -> Vec<f32> {
        let base = text.chars().map(|c| u64::from(u32::from(c))).sum::<u64>() as f64;
        (0..dimension)
            .map(|i| (((base * (i + 1) as f64).sin() + 1.0) / 2.0) as f32)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_text_same_vector() {
        let a = DeterministicEmbedder.embed("same text", 64);
        let b = DeterministicEmbedder.embed("same text", 64);
        assert_eq!(a.len(), 64);
        assert!(a.iter().zip(&b).all(|(x, y)| x.to_bits() == y.to_bits()));
    }

    #[test]
    fn test_elements_in_unit_interval() {
        let v = DeterministicEmbedder.embed("door handle design v1", 384);
        assert!(v.iter().all(|x| (0.0..=1.0).contains(x)));
    }

    #[test]
    fn test_empty_text_is_constant() {
        // sin(0) == 0 for every element
        let v = DeterministicEmbedder.embed("", 8);
        assert!(v.iter().all(|x| (*x - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_closure_embedder() {
        let embedder = |_: &str, dim: usize| vec![1.0f32; dim];
        assert_eq!(embedder.embed("anything", 3), vec![1.0, 1.0, 1.0]);
    }
}

//! The opaque embedding capability used by dense backends.
//!
//! Model runtimes live outside this crate; a backend only needs
//! `encode(texts) -> vectors`. Implementations wrap whatever inference stack
//! hosts the instruction-tuned / E5 / GTR checkpoints.

use crate::error::Result;

/// Encodes a batch of texts into fixed-dimensionality embedding vectors.
///
/// One vector per input text, in input order, all of the same length.
/// Failures are surfaced as-is; the index layer performs no retry.
pub trait TextEncoder: Send + Sync {
    fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Deterministic toy encoder: maps each text to a small vector of
    /// character-class counts. Texts sharing words land closer together,
    /// which is enough structure for ranking tests.
    pub struct CountingEncoder;

    impl TextEncoder for CountingEncoder {
        fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| embed(t)).collect())
        }
    }

    fn embed(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; 8];
        for word in text.split_whitespace() {
            let bucket = word
                .bytes()
                .fold(0usize, |acc, b| (acc * 31 + b as usize) % 8);
            v[bucket] += 1.0;
        }
        v
    }

    /// Encoder that always fails, for propagation tests.
    pub struct FailingEncoder;

    impl TextEncoder for FailingEncoder {
        fn encode_batch(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            Err(crate::error::Error::Encode("model unavailable".to_string()))
        }
    }
}

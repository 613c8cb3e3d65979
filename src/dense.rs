//! Dense backend family: brute-force cosine similarity over stored vectors.
//!
//! One shape serves the instruction-tuned, E5 and GTR variants; they differ
//! only in the affix prepended to queries and keys before encoding. Vectors
//! are stored at half precision to shrink the persisted snapshot; similarity
//! is computed in f32 after widening.

use std::sync::Arc;

use half::f16;

use crate::{
    backend::BackendKind,
    chunker::Granularity,
    encoder::TextEncoder,
    error::{Error, Result},
};

/// Texts per embedding-model invocation.
pub const EMBED_BATCH_SIZE: usize = 256;

// Instruction pairs for the instruction-tuned variant, fixed by chunk
// granularity at construction time.
const INSTRUCT_QUERY_PROPOSITIONS: &str =
    "Represent the question for retrieving propositions from relevant documents:";
const INSTRUCT_KEY_PROPOSITIONS: &str =
    "Represent the propositions of a document for retrieval:";
const INSTRUCT_QUERY_PARAGRAPHS: &str =
    "Represent the question for retrieving passages from relevant documents:";
const INSTRUCT_KEY_PARAGRAPHS: &str =
    "Represent the passage from the documents for retrieval:";

// E5 uses short fixed prefixes rather than full instructions.
const E5_QUERY_PREFIX: &str = "query:";
const E5_KEY_PREFIX: &str = "passage:";

/// A dense embedding strategy around an opaque [`TextEncoder`].
pub struct DenseBackend {
    kind: BackendKind,
    key_affix: String,
    query_affix: String,
    encoder: Arc<dyn TextEncoder>,
}

impl DenseBackend {
    /// Instruction-tuned variant. The instruction pair is derived from the
    /// granularity and cannot change after index creation.
    pub fn instructor(
        encoder: Arc<dyn TextEncoder>,
        granularity: Granularity,
    ) -> Self {
        let (key_affix, query_affix) = match granularity {
            Granularity::Propositions => {
                (INSTRUCT_KEY_PROPOSITIONS, INSTRUCT_QUERY_PROPOSITIONS)
            }
            Granularity::Paragraphs => {
                (INSTRUCT_KEY_PARAGRAPHS, INSTRUCT_QUERY_PARAGRAPHS)
            }
        };
        Self {
            kind: BackendKind::Instructor,
            key_affix: key_affix.to_string(),
            query_affix: query_affix.to_string(),
            encoder,
        }
    }

    /// E5 variant: `query:` / `passage:` prefixes.
    pub fn e5(encoder: Arc<dyn TextEncoder>) -> Self {
        Self {
            kind: BackendKind::E5,
            key_affix: E5_KEY_PREFIX.to_string(),
            query_affix: E5_QUERY_PREFIX.to_string(),
            encoder,
        }
    }

    /// GTR variant: symmetric, no affixes.
    pub fn gtr(encoder: Arc<dyn TextEncoder>) -> Self {
        Self {
            kind: BackendKind::Gtr,
            key_affix: String::new(),
            query_affix: String::new(),
            encoder,
        }
    }

    /// Reconstruct a variant from persisted affixes (load path).
    pub fn from_affixes(
        kind: BackendKind,
        encoder: Arc<dyn TextEncoder>,
        key_affix: String,
        query_affix: String,
    ) -> Result<Self> {
        if !kind.is_dense() {
            return Err(Error::InvalidBackend(kind.as_str().to_string()));
        }
        Ok(Self {
            kind,
            key_affix,
            query_affix,
            encoder,
        })
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn key_affix(&self) -> &str {
        &self.key_affix
    }

    pub fn query_affix(&self) -> &str {
        &self.query_affix
    }

    /// Overwrite the affix pair with values restored from a snapshot.
    pub fn set_affixes(&mut self, key_affix: String, query_affix: String) {
        self.key_affix = key_affix;
        self.query_affix = query_affix;
    }

    fn affixed(affix: &str, text: &str) -> String {
        if affix.is_empty() {
            text.to_string()
        } else {
            format!("{affix} {text}")
        }
    }

    fn encode(&self, texts: &[String], affix: &str) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBED_BATCH_SIZE) {
            let affixed: Vec<String> =
                batch.iter().map(|t| Self::affixed(affix, t)).collect();
            let refs: Vec<&str> =
                affixed.iter().map(String::as_str).collect();
            let encoded = self.encoder.encode_batch(&refs)?;
            if encoded.len() != refs.len() {
                return Err(Error::Encode(format!(
                    "encoder returned {} vectors for {} texts",
                    encoded.len(),
                    refs.len()
                )));
            }
            vectors.extend(encoded);
        }
        Ok(vectors)
    }

    /// Encode key texts into half-precision vectors for storage.
    pub fn encode_keys(&self, texts: &[String]) -> Result<Vec<Vec<f16>>> {
        let vectors = self.encode(texts, &self.key_affix)?;
        Ok(vectors
            .into_iter()
            .map(|v| v.into_iter().map(f16::from_f32).collect())
            .collect())
    }

    /// Encode a single query text at full precision.
    pub fn encode_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors =
            self.encode(&[text.to_string()], &self.query_affix)?;
        vectors.pop().ok_or_else(|| {
            Error::Encode("encoder returned no vector for query".to_string())
        })
    }

    /// Top `n` key positions by cosine similarity, best first. Ties keep
    /// insertion order so results are reproducible.
    pub fn rank(&self, query: &[f32], keys: &[Vec<f16>], n: usize) -> Vec<usize> {
        let similarities: Vec<f32> =
            keys.iter().map(|key| cosine(query, key)).collect();
        let mut indices: Vec<usize> = (0..keys.len()).collect();
        indices.sort_by(|&a, &b| {
            similarities[b]
                .partial_cmp(&similarities[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        indices.truncate(n);
        indices
    }
}

impl std::fmt::Debug for DenseBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DenseBackend")
            .field("kind", &self.kind)
            .field("key_affix", &self.key_affix)
            .field("query_affix", &self.query_affix)
            .finish_non_exhaustive()
    }
}

fn cosine(query: &[f32], key: &[f16]) -> f32 {
    if query.len() != key.len() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut query_norm = 0.0f32;
    let mut key_norm = 0.0f32;
    for (&q, &k) in query.iter().zip(key) {
        let k = k.to_f32();
        dot += q * k;
        query_norm += q * q;
        key_norm += k * k;
    }
    if query_norm == 0.0 || key_norm == 0.0 {
        return 0.0;
    }
    dot / (query_norm.sqrt() * key_norm.sqrt())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::encoder::testing::CountingEncoder;

    /// Records every text it is asked to encode.
    struct RecordingEncoder {
        seen: Mutex<Vec<String>>,
    }

    impl RecordingEncoder {
        fn new() -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl TextEncoder for RecordingEncoder {
        fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            let mut seen = self.seen.lock().unwrap();
            seen.extend(texts.iter().map(|t| t.to_string()));
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn to_f16(v: &[f32]) -> Vec<f16> {
        v.iter().copied().map(f16::from_f32).collect()
    }

    #[test]
    fn instructor_affixes_follow_granularity() {
        let enc = Arc::new(CountingEncoder);
        let para =
            DenseBackend::instructor(enc.clone(), Granularity::Paragraphs);
        assert!(para.key_affix().contains("passage"));
        assert!(para.query_affix().contains("passages"));

        let prop = DenseBackend::instructor(enc, Granularity::Propositions);
        assert!(prop.key_affix().contains("propositions"));
        assert!(prop.query_affix().contains("propositions"));
        assert_ne!(prop.key_affix(), prop.query_affix());
    }

    #[test]
    fn e5_prefixes_are_asymmetric() {
        let encoder = Arc::new(RecordingEncoder::new());
        let backend = DenseBackend::e5(encoder.clone());

        backend.encode_keys(&["some text".to_string()]).unwrap();
        backend.encode_query("some text").unwrap();

        let seen = encoder.seen.lock().unwrap();
        assert_eq!(seen[0], "passage: some text");
        assert_eq!(seen[1], "query: some text");
    }

    #[test]
    fn gtr_is_symmetric() {
        let encoder = Arc::new(RecordingEncoder::new());
        let backend = DenseBackend::gtr(encoder.clone());

        backend.encode_keys(&["plain".to_string()]).unwrap();
        backend.encode_query("plain").unwrap();

        let seen = encoder.seen.lock().unwrap();
        assert_eq!(*seen, vec!["plain".to_string(), "plain".to_string()]);
    }

    #[test]
    fn rank_orders_by_cosine() {
        let backend = DenseBackend::gtr(Arc::new(CountingEncoder));
        let keys = vec![
            to_f16(&[0.0, 1.0]),
            to_f16(&[1.0, 0.0]),
            to_f16(&[0.7, 0.7]),
        ];
        let ranked = backend.rank(&[1.0, 0.0], &keys, 3);
        assert_eq!(ranked, vec![1, 2, 0]);
    }

    #[test]
    fn rank_clamps_to_key_count() {
        let backend = DenseBackend::gtr(Arc::new(CountingEncoder));
        let keys = vec![to_f16(&[1.0, 0.0])];
        assert_eq!(backend.rank(&[1.0, 0.0], &keys, 10).len(), 1);
    }

    #[test]
    fn equal_similarities_keep_insertion_order() {
        let backend = DenseBackend::gtr(Arc::new(CountingEncoder));
        let keys = vec![
            to_f16(&[1.0, 0.0]),
            to_f16(&[1.0, 0.0]),
            to_f16(&[0.0, 1.0]),
        ];
        let ranked = backend.rank(&[1.0, 0.0], &keys, 3);
        assert_eq!(ranked, vec![0, 1, 2]);
    }

    #[test]
    fn zero_vectors_rank_last() {
        let backend = DenseBackend::gtr(Arc::new(CountingEncoder));
        let keys = vec![to_f16(&[0.0, 0.0]), to_f16(&[0.5, 0.5])];
        let ranked = backend.rank(&[1.0, 1.0], &keys, 2);
        assert_eq!(ranked[0], 1);
    }

    #[test]
    fn from_affixes_rejects_lexical_kind() {
        let result = DenseBackend::from_affixes(
            BackendKind::Bm25,
            Arc::new(CountingEncoder),
            String::new(),
            String::new(),
        );
        assert!(matches!(result, Err(Error::InvalidBackend(_))));
    }
}

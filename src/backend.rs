//! Backend selection and dispatch.
//!
//! The two strategy shapes (lexical BM25 and the dense embedding family)
//! share a single dispatch surface: encode a batch of keys, encode a query,
//! rank stored positions, rebuild derived state. The index engine in
//! [`crate::store`] is written against this surface only.

use std::str::FromStr;
use std::sync::Arc;

use half::f16;
use serde::{Deserialize, Serialize};

use crate::{
    bm25::Bm25Backend,
    chunker::Granularity,
    dense::DenseBackend,
    encoder::TextEncoder,
    error::{Error, Result},
};

/// Which backend an index uses. The string form doubles as the persisted
/// file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Bm25,
    Instructor,
    E5,
    Gtr,
}

impl BackendKind {
    pub const ALL: [BackendKind; 4] = [
        BackendKind::Bm25,
        BackendKind::Instructor,
        BackendKind::E5,
        BackendKind::Gtr,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Bm25 => "bm25",
            BackendKind::Instructor => "instructor",
            BackendKind::E5 => "e5",
            BackendKind::Gtr => "gtr",
        }
    }

    /// True for the embedding variants sharing the dense strategy shape.
    pub fn is_dense(&self) -> bool {
        !matches!(self, BackendKind::Bm25)
    }

    /// Parse a persisted-file extension. Unlike [`FromStr`], an unknown
    /// suffix is an [`Error::UnsupportedIndexType`].
    pub fn from_extension(ext: &str) -> Result<Self> {
        ext.parse()
            .map_err(|_| Error::UnsupportedIndexType(ext.to_string()))
    }

    /// Single-byte tag written to the snapshot header.
    pub(crate) fn tag(&self) -> u8 {
        match self {
            BackendKind::Bm25 => 1,
            BackendKind::Instructor => 2,
            BackendKind::E5 => 3,
            BackendKind::Gtr => 4,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(BackendKind::Bm25),
            2 => Some(BackendKind::Instructor),
            3 => Some(BackendKind::E5),
            4 => Some(BackendKind::Gtr),
            _ => None,
        }
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bm25" => Ok(BackendKind::Bm25),
            "instructor" => Ok(BackendKind::Instructor),
            "e5" => Ok(BackendKind::E5),
            "gtr" => Ok(BackendKind::Gtr),
            other => Err(Error::InvalidBackend(other.to_string())),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoded key representations, one entry per stored key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EncodedKeys {
    /// Analyzed token lists (lexical backend).
    Tokens(Vec<Vec<String>>),
    /// Half-precision embedding vectors (dense backends).
    Vectors(Vec<Vec<f16>>),
}

impl EncodedKeys {
    pub fn len(&self) -> usize {
        match self {
            EncodedKeys::Tokens(t) => t.len(),
            EncodedKeys::Vectors(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append another batch of the same representation.
    pub fn extend(&mut self, other: EncodedKeys) -> Result<()> {
        match (self, other) {
            (EncodedKeys::Tokens(a), EncodedKeys::Tokens(b)) => {
                a.extend(b);
                Ok(())
            }
            (EncodedKeys::Vectors(a), EncodedKeys::Vectors(b)) => {
                a.extend(b);
                Ok(())
            }
            _ => Err(Error::Snapshot(
                "encoded key representations do not match".to_string(),
            )),
        }
    }
}

/// An encoded query, matching the backend's key representation.
#[derive(Debug, Clone)]
pub enum EncodedQuery {
    Tokens(Vec<String>),
    Vector(Vec<f32>),
}

/// A backend strategy instance. Selected once at construction; the encoded
/// state it owns is tied to that choice for the index's lifetime.
#[derive(Debug)]
pub enum Backend {
    Lexical(Bm25Backend),
    Dense(DenseBackend),
}

impl Backend {
    /// Construct a backend for `kind`.
    ///
    /// Dense kinds need the opaque embedding capability; `granularity`
    /// fixes the instruction pair for the instruction-tuned variant.
    pub fn for_kind(
        kind: BackendKind,
        granularity: Granularity,
        encoder: Option<Arc<dyn TextEncoder>>,
    ) -> Result<Self> {
        match kind {
            BackendKind::Bm25 => Ok(Backend::Lexical(Bm25Backend::new()?)),
            dense_kind => {
                let encoder = encoder.ok_or_else(|| {
                    Error::Config(format!(
                        "backend {dense_kind} requires an embedding model"
                    ))
                })?;
                let dense = match dense_kind {
                    BackendKind::Instructor => {
                        DenseBackend::instructor(encoder, granularity)
                    }
                    BackendKind::E5 => DenseBackend::e5(encoder),
                    BackendKind::Gtr => DenseBackend::gtr(encoder),
                    BackendKind::Bm25 => unreachable!(),
                };
                Ok(Backend::Dense(dense))
            }
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Lexical(_) => BackendKind::Bm25,
            Backend::Dense(d) => d.kind(),
        }
    }

    /// An empty encoded-key container of the right representation.
    pub fn empty_keys(&self) -> EncodedKeys {
        match self {
            Backend::Lexical(_) => EncodedKeys::Tokens(Vec::new()),
            Backend::Dense(_) => EncodedKeys::Vectors(Vec::new()),
        }
    }

    /// Encode a batch of key texts.
    pub fn encode_keys(&mut self, texts: &[String]) -> Result<EncodedKeys> {
        match self {
            Backend::Lexical(b) => {
                Ok(EncodedKeys::Tokens(b.encode_batch(texts)))
            }
            Backend::Dense(d) => Ok(EncodedKeys::Vectors(d.encode_keys(texts)?)),
        }
    }

    /// Encode a single query text in query mode.
    pub fn encode_query(&mut self, text: &str) -> Result<EncodedQuery> {
        match self {
            Backend::Lexical(b) => Ok(EncodedQuery::Tokens(b.tokenize(text))),
            Backend::Dense(d) => Ok(EncodedQuery::Vector(d.encode_query(text)?)),
        }
    }

    /// Top `n` stored positions for the encoded query, best first.
    pub fn rank(
        &self,
        query: &EncodedQuery,
        keys: &EncodedKeys,
        n: usize,
    ) -> Result<Vec<usize>> {
        match (self, query, keys) {
            (
                Backend::Lexical(b),
                EncodedQuery::Tokens(tokens),
                EncodedKeys::Tokens(_),
            ) => Ok(b.rank(tokens, n)),
            (
                Backend::Dense(d),
                EncodedQuery::Vector(vector),
                EncodedKeys::Vectors(stored),
            ) => Ok(d.rank(vector, stored, n)),
            _ => Err(Error::Snapshot(
                "encoded query does not match backend representation"
                    .to_string(),
            )),
        }
    }

    /// Re-derive backend state over the full encoded key set. A no-op for
    /// dense backends, which keep no auxiliary structure.
    pub fn rebuild(&mut self, keys: &EncodedKeys) -> Result<()> {
        match (self, keys) {
            (Backend::Lexical(b), EncodedKeys::Tokens(tokens)) => {
                b.rebuild(tokens);
                Ok(())
            }
            (Backend::Dense(_), EncodedKeys::Vectors(_)) => Ok(()),
            _ => Err(Error::Snapshot(
                "encoded keys do not match backend representation".to_string(),
            )),
        }
    }

    /// Drop derived state (index cleared).
    pub fn clear_model(&mut self) {
        if let Backend::Lexical(b) = self {
            b.clear_model();
        }
    }

    /// Restore persisted affixes (load path). Lexical backends carry none.
    pub fn restore_affixes(
        &mut self,
        key_affix: Option<String>,
        query_affix: Option<String>,
    ) {
        if let (Backend::Dense(d), Some(key), Some(query)) =
            (self, key_affix, query_affix)
        {
            d.set_affixes(key, query);
        }
    }

    /// Key/query affixes to persist, if the backend uses any.
    pub fn affixes(&self) -> (Option<String>, Option<String>) {
        match self {
            Backend::Lexical(_) => (None, None),
            Backend::Dense(d) => (
                Some(d.key_affix().to_string()),
                Some(d.query_affix().to_string()),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::testing::CountingEncoder;

    #[test]
    fn kind_round_trips_through_strings() {
        for kind in BackendKind::ALL {
            assert_eq!(kind.as_str().parse::<BackendKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_name_is_invalid_backend() {
        assert!(matches!(
            "dpr".parse::<BackendKind>(),
            Err(Error::InvalidBackend(_))
        ));
    }

    #[test]
    fn unknown_extension_is_unsupported_index_type() {
        assert!(matches!(
            BackendKind::from_extension("grit"),
            Err(Error::UnsupportedIndexType(_))
        ));
    }

    #[test]
    fn tags_round_trip() {
        for kind in BackendKind::ALL {
            assert_eq!(BackendKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(BackendKind::from_tag(0), None);
        assert_eq!(BackendKind::from_tag(9), None);
    }

    #[test]
    fn dense_without_encoder_fails() {
        let result =
            Backend::for_kind(BackendKind::E5, Granularity::Paragraphs, None);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn bm25_needs_no_encoder() {
        let backend =
            Backend::for_kind(BackendKind::Bm25, Granularity::Paragraphs, None)
                .unwrap();
        assert_eq!(backend.kind(), BackendKind::Bm25);
        assert!(matches!(backend.empty_keys(), EncodedKeys::Tokens(_)));
    }

    #[test]
    fn mismatched_representations_are_rejected() {
        let mut backend =
            Backend::for_kind(BackendKind::Bm25, Granularity::Paragraphs, None)
                .unwrap();
        let vectors = EncodedKeys::Vectors(Vec::new());
        assert!(backend.rebuild(&vectors).is_err());

        let query = EncodedQuery::Vector(vec![1.0]);
        assert!(backend.rank(&query, &vectors, 1).is_err());

        let mut tokens = EncodedKeys::Tokens(Vec::new());
        assert!(tokens.extend(vectors).is_err());
    }

    #[test]
    fn dense_backend_dispatch() {
        let mut backend = Backend::for_kind(
            BackendKind::Gtr,
            Granularity::Paragraphs,
            Some(Arc::new(CountingEncoder)),
        )
        .unwrap();
        let keys = backend
            .encode_keys(&["alpha beta".to_string(), "gamma".to_string()])
            .unwrap();
        assert_eq!(keys.len(), 2);
        let query = backend.encode_query("alpha beta").unwrap();
        let ranked = backend.rank(&query, &keys, 2).unwrap();
        assert_eq!(ranked[0], 0);
    }
}

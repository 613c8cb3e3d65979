//! Orchestrates chunking into key-value pairs and drives index construction.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::{
    backend::{Backend, BackendKind},
    chunker::{self, Granularity, Propositionizer, DEFAULT_MIN_WORDS},
    encoder::TextEncoder,
    error::Result,
    record::CorpusRecord,
    store::{ChunkRef, KvIndex},
};

/// Builds a [`KvIndex`] from a corpus at a fixed backend and granularity.
///
/// Selecting the backend also fixes the instruction pair for the
/// instruction-tuned variant; both choices are immutable once the index is
/// created.
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    kind: BackendKind,
    index_name: String,
    granularity: Granularity,
    min_words: usize,
}

impl IndexBuilder {
    pub fn new(
        kind: BackendKind,
        index_name: impl Into<String>,
        granularity: Granularity,
    ) -> Self {
        Self {
            kind,
            index_name: index_name.into(),
            granularity,
            min_words: DEFAULT_MIN_WORDS,
        }
    }

    /// Override the paragraph word-count filter.
    pub fn min_words(mut self, min_words: usize) -> Self {
        self.min_words = min_words;
        self
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Construct the empty index for this builder's backend.
    pub fn initialize_index(
        &self,
        encoder: Option<Arc<dyn TextEncoder>>,
    ) -> Result<KvIndex> {
        let backend = Backend::for_kind(self.kind, self.granularity, encoder)?;
        Ok(KvIndex::new(self.index_name.clone(), backend))
    }

    /// Chunk every record and assemble the ordered key-value mapping.
    ///
    /// Key = chunk text, value = (corpus id, ordinal). Duplicate chunk text
    /// across records keeps the first insertion position but takes the later
    /// value; the collision is logged since it drops a retrievable unit.
    pub fn create_kv_pairs(
        &self,
        records: &[CorpusRecord],
        propositionizer: Option<&dyn Propositionizer>,
    ) -> Result<IndexMap<String, ChunkRef>> {
        let mut pairs = IndexMap::new();
        for record in records {
            let chunks = chunker::chunk_record(
                record,
                self.granularity,
                propositionizer,
                self.min_words,
            )?;
            for chunk in chunks {
                let value = ChunkRef::new(&record.corpus_id, chunk.ordinal);
                if let Some(previous) = pairs.insert(chunk.text, value) {
                    tracing::warn!(
                        corpus_id = %record.corpus_id,
                        previous_corpus_id = %previous.corpus_id,
                        "duplicate chunk text; keeping the later value"
                    );
                }
            }
        }
        Ok(pairs)
    }

    /// Full build: chunk, assemble pairs, construct the backend, create the
    /// index. The result is in-memory only; the caller decides where (and
    /// whether) to save it.
    pub fn build(
        &self,
        records: &[CorpusRecord],
        encoder: Option<Arc<dyn TextEncoder>>,
        propositionizer: Option<&dyn Propositionizer>,
    ) -> Result<KvIndex> {
        let mut index = self.initialize_index(encoder)?;
        let pairs = self.create_kv_pairs(records, propositionizer)?;
        index.create_index(pairs)?;
        Ok(index)
    }
}

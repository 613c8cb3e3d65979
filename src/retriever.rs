//! Lifecycle facade over the index engine.
//!
//! Two entry workflows:
//! 1. Build new: `Retriever::new(kind, name, save_dir)` then
//!    [`build_and_save`](Retriever::build_and_save).
//! 2. Reopen: [`Retriever::load_from_path`], which dispatches on the backend
//!    tag stored in the snapshot header (the file suffix is only
//!    cross-checked, so index names containing dots stay unambiguous).

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    backend::{Backend, BackendKind},
    builder::IndexBuilder,
    chunker::{Granularity, Propositionizer},
    encoder::TextEncoder,
    error::{Error, Result},
    record::CorpusRecord,
    store::{self, ChunkRef, KvIndex},
};

/// Supplies embedding capabilities when reopening dense indices.
///
/// Called only for dense kinds; a BM25 snapshot never needs one.
pub trait EncoderProvider {
    fn encoder(&self, kind: BackendKind) -> Result<Arc<dyn TextEncoder>>;
}

/// Provider for deployments without any embedding model: dense loads fail
/// with a clear configuration error.
pub struct NoDenseEncoders;

impl EncoderProvider for NoDenseEncoders {
    fn encoder(&self, kind: BackendKind) -> Result<Arc<dyn TextEncoder>> {
        Err(Error::Config(format!(
            "no embedding model registered for backend {kind}"
        )))
    }
}

/// Retrieval entry point: builds or reopens one index and answers queries.
#[derive(Debug)]
pub struct Retriever {
    kind: BackendKind,
    index_name: String,
    save_dir: PathBuf,
    index: Option<KvIndex>,
}

impl Retriever {
    pub fn new(
        kind: BackendKind,
        index_name: impl Into<String>,
        save_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            kind,
            index_name: index_name.into(),
            save_dir: save_dir.into(),
            index: None,
        }
    }

    /// Chunk the records, build a fresh index, and persist it to the save
    /// directory. Returns the path of the written snapshot.
    pub fn build_and_save(
        &mut self,
        records: &[CorpusRecord],
        granularity: Granularity,
        min_words: usize,
        encoder: Option<Arc<dyn TextEncoder>>,
        propositionizer: Option<&dyn Propositionizer>,
    ) -> Result<PathBuf> {
        let builder =
            IndexBuilder::new(self.kind, self.index_name.clone(), granularity)
                .min_words(min_words);
        let index = builder.build(records, encoder, propositionizer)?;
        let path = index.save(&self.save_dir)?;
        self.index = Some(index);
        Ok(path)
    }

    /// Reopen a persisted index.
    ///
    /// The backend kind comes from the snapshot header tag; if the file
    /// suffix names a different known backend the header wins and the
    /// mismatch is logged.
    pub fn load_from_path(
        path: &Path,
        provider: &dyn EncoderProvider,
    ) -> Result<Self> {
        let kind = store::snapshot_kind(path)?;

        if let Some(ext) = path.extension().and_then(|e| e.to_str())
            && let Ok(suffix_kind) = ext.parse::<BackendKind>()
            && suffix_kind != kind
        {
            tracing::warn!(
                path = %path.display(),
                suffix = %suffix_kind,
                header = %kind,
                "file suffix disagrees with snapshot header; trusting the header"
            );
        }

        let encoder = if kind.is_dense() {
            Some(provider.encoder(kind)?)
        } else {
            None
        };
        // Granularity only seeds the affixes, which the snapshot overwrites.
        let backend =
            Backend::for_kind(kind, Granularity::Paragraphs, encoder)?;

        let index_name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("index")
            .to_string();
        let mut index = KvIndex::new(index_name.clone(), backend);
        index.load(path)?;

        let save_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Self {
            kind,
            index_name: index.index_name().to_string(),
            save_dir,
            index: Some(index),
        })
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }

    /// The underlying index, if one has been built or loaded.
    pub fn index_mut(&mut self) -> Option<&mut KvIndex> {
        self.index.as_mut()
    }

    /// Consume the facade, yielding the index (e.g. to move it behind the
    /// HTTP service's shared state).
    pub fn into_index(self) -> Result<KvIndex> {
        self.index.ok_or(Error::IndexNotLoaded)
    }

    /// Top `top_k` values for a query.
    pub fn query(
        &mut self,
        query_text: &str,
        top_k: usize,
    ) -> Result<Vec<ChunkRef>> {
        self.index
            .as_mut()
            .ok_or(Error::IndexNotLoaded)?
            .query(query_text, top_k)
    }

    /// Top `top_k` `(key, value)` pairs for a query.
    pub fn query_with_keys(
        &mut self,
        query_text: &str,
        top_k: usize,
    ) -> Result<Vec<(String, ChunkRef)>> {
        self.index
            .as_mut()
            .ok_or(Error::IndexNotLoaded)?
            .query_with_keys(query_text, top_k)
    }
}

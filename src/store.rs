//! The key-value index engine shared by every backend.
//!
//! One [`KvIndex`] owns three parallel sequences: keys (chunk texts, in
//! build order), their encoded representations, and opaque values (chunk
//! provenance). After any successful mutation the three are the same length.
//! Lifecycle: an empty index accepts `create_index` or `load`; a built index
//! accepts `query`, `add_kv_pairs` and `save`; `clear` empties it again.
//!
//! Persistence is one file per index at `{dir}/{index_name}.{kind}`. The
//! file starts with a fixed header (magic, format version, backend tag) so
//! loaders dispatch on the stored tag rather than trusting the file name.
//! Derived state (the BM25 frequency model, model handles) is never
//! serialized; it is reconstructed from the decoded key representations.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    backend::{Backend, BackendKind, EncodedKeys},
    error::{Error, Result},
};

const MAGIC: &[u8; 8] = b"kvindex\0";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 13; // magic + version + backend tag

/// Provenance of one chunk: which record it came from and its position
/// within that record's chunk sequence. Opaque to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRef {
    pub corpus_id: String,
    pub ordinal: usize,
}

impl ChunkRef {
    pub fn new(corpus_id: impl Into<String>, ordinal: usize) -> Self {
        Self {
            corpus_id: corpus_id.into(),
            ordinal,
        }
    }
}

/// Explicit list of persisted fields. Anything not in here (frequency
/// models, encoder handles) is reconstructed on load.
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    index_name: String,
    kind: BackendKind,
    key_affix: Option<String>,
    query_affix: Option<String>,
    keys: Vec<String>,
    encoded_keys: EncodedKeys,
    values: Vec<ChunkRef>,
}

/// A retrieval index: ordered keys, encoded keys, values, and the backend
/// strategy that encodes and ranks them.
#[derive(Debug)]
pub struct KvIndex {
    index_name: String,
    backend: Backend,
    keys: Vec<String>,
    encoded_keys: EncodedKeys,
    values: Vec<ChunkRef>,
}

impl KvIndex {
    pub fn new(index_name: impl Into<String>, backend: Backend) -> Self {
        let encoded_keys = backend.empty_keys();
        Self {
            index_name: index_name.into(),
            backend,
            keys: Vec::new(),
            encoded_keys,
            values: Vec::new(),
        }
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn values(&self) -> &[ChunkRef] {
        &self.values
    }

    /// Path this index persists to under `dir`.
    pub fn path_in(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.{}", self.index_name, self.kind()))
    }

    /// Build the index from key-value pairs, in iteration order.
    ///
    /// All keys are encoded in one batch call so dense backends amortize
    /// model-invocation overhead. Fails with [`Error::IndexNotEmpty`] on a
    /// non-empty index. An encode failure mid-build leaves the instance in
    /// an unusable state; callers must discard it.
    pub fn create_index(
        &mut self,
        pairs: IndexMap<String, ChunkRef>,
    ) -> Result<()> {
        if !self.is_empty() {
            return Err(Error::IndexNotEmpty);
        }

        for (key, value) in pairs {
            self.keys.push(key);
            self.values.push(value);
        }
        self.encoded_keys = self.backend.encode_keys(&self.keys)?;
        self.backend.rebuild(&self.encoded_keys)?;

        debug_assert_eq!(self.keys.len(), self.encoded_keys.len());
        debug_assert_eq!(self.keys.len(), self.values.len());
        tracing::info!(
            index = %self.index_name,
            kind = %self.kind(),
            entries = self.len(),
            "created index"
        );
        Ok(())
    }

    /// Append new pairs to a built index.
    ///
    /// Only the new keys are encoded, but backend aggregate statistics are
    /// re-derived over the full key set: they are not incrementally
    /// decomposable.
    pub fn add_kv_pairs(
        &mut self,
        pairs: IndexMap<String, ChunkRef>,
    ) -> Result<()> {
        if pairs.is_empty() {
            return Ok(());
        }

        let mut new_keys = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            new_keys.push(key.clone());
            self.keys.push(key);
            self.values.push(value);
        }
        let encoded = self.backend.encode_keys(&new_keys)?;
        self.encoded_keys.extend(encoded)?;
        self.backend.rebuild(&self.encoded_keys)?;

        debug_assert_eq!(self.keys.len(), self.encoded_keys.len());
        debug_assert_eq!(self.keys.len(), self.values.len());
        tracing::info!(
            index = %self.index_name,
            added = new_keys.len(),
            entries = self.len(),
            "added key-value pairs"
        );
        Ok(())
    }

    /// Top `top_k` values for a query, best first. `top_k` beyond the index
    /// size is clamped; an empty index yields an empty result.
    pub fn query(&mut self, query_text: &str, top_k: usize) -> Result<Vec<ChunkRef>> {
        let positions = self.ranked_positions(query_text, top_k)?;
        Ok(positions
            .into_iter()
            .map(|i| self.values[i].clone())
            .collect())
    }

    /// Like [`query`](Self::query) but returns `(key, value)` pairs.
    pub fn query_with_keys(
        &mut self,
        query_text: &str,
        top_k: usize,
    ) -> Result<Vec<(String, ChunkRef)>> {
        let positions = self.ranked_positions(query_text, top_k)?;
        Ok(positions
            .into_iter()
            .map(|i| (self.keys[i].clone(), self.values[i].clone()))
            .collect())
    }

    fn ranked_positions(
        &mut self,
        query_text: &str,
        top_k: usize,
    ) -> Result<Vec<usize>> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        let n = top_k.min(self.len());
        let encoded = self.backend.encode_query(query_text)?;
        self.backend.rank(&encoded, &self.encoded_keys, n)
    }

    /// Reset to empty. Derived backend state is discarded too.
    pub fn clear(&mut self) {
        self.keys.clear();
        self.values.clear();
        self.encoded_keys = self.backend.empty_keys();
        self.backend.clear_model();
    }

    /// Write the snapshot to `{dir}/{index_name}.{kind}`, creating `dir` if
    /// needed. Returns the written path.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        let snapshot = {
            let (key_affix, query_affix) = self.backend.affixes();
            Snapshot {
                index_name: self.index_name.clone(),
                kind: self.kind(),
                key_affix,
                query_affix,
                keys: self.keys.clone(),
                encoded_keys: self.encoded_keys.clone(),
                values: self.values.clone(),
            }
        };
        let payload = bincode::serialize(&snapshot)
            .map_err(|e| Error::Snapshot(e.to_string()))?;

        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.push(self.kind().tag());
        bytes.extend_from_slice(&payload);

        std::fs::create_dir_all(dir)?;
        let path = self.path_in(dir);
        std::fs::write(&path, bytes)?;
        tracing::info!(path = %path.display(), entries = self.len(), "saved index");
        Ok(path)
    }

    /// Replace this empty index with the snapshot at `path` and reconstruct
    /// derived backend state. Fails with [`Error::IndexNotEmpty`] on a
    /// non-empty instance, and if the snapshot's backend does not match this
    /// instance's backend.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        if !self.is_empty() {
            return Err(Error::IndexNotEmpty);
        }

        let bytes = std::fs::read(path)?;
        let (kind, payload) = parse_header(&bytes)?;
        if kind != self.kind() {
            return Err(Error::Snapshot(format!(
                "snapshot at {} holds a {kind} index but this instance uses {}",
                path.display(),
                self.kind()
            )));
        }

        let snapshot: Snapshot = bincode::deserialize(payload)
            .map_err(|e| Error::Snapshot(e.to_string()))?;
        if snapshot.kind != kind {
            return Err(Error::Snapshot(format!(
                "header tag {kind} disagrees with snapshot kind {}",
                snapshot.kind
            )));
        }
        if snapshot.keys.len() != snapshot.encoded_keys.len()
            || snapshot.keys.len() != snapshot.values.len()
        {
            return Err(Error::Snapshot(format!(
                "inconsistent snapshot: {} keys, {} encoded, {} values",
                snapshot.keys.len(),
                snapshot.encoded_keys.len(),
                snapshot.values.len()
            )));
        }

        self.index_name = snapshot.index_name;
        self.backend
            .restore_affixes(snapshot.key_affix, snapshot.query_affix);
        self.keys = snapshot.keys;
        self.encoded_keys = snapshot.encoded_keys;
        self.values = snapshot.values;
        self.backend.rebuild(&self.encoded_keys)?;

        tracing::info!(
            path = %path.display(),
            entries = self.len(),
            "loaded index"
        );
        Ok(())
    }
}

/// Read only the backend tag from a snapshot file's header.
pub fn snapshot_kind(path: &Path) -> Result<BackendKind> {
    let bytes = std::fs::read(path)?;
    let (kind, _) = parse_header(&bytes)?;
    Ok(kind)
}

fn parse_header(bytes: &[u8]) -> Result<(BackendKind, &[u8])> {
    if bytes.len() < HEADER_LEN || &bytes[..8] != MAGIC {
        return Err(Error::Snapshot(
            "not a kvindex snapshot file".to_string(),
        ));
    }
    let version = u32::from_le_bytes(
        bytes[8..12].try_into().expect("slice length checked"),
    );
    if version != FORMAT_VERSION {
        return Err(Error::Snapshot(format!(
            "unsupported snapshot format version {version}"
        )));
    }
    let kind = BackendKind::from_tag(bytes[12]).ok_or_else(|| {
        Error::UnsupportedIndexType(format!("backend tag {}", bytes[12]))
    })?;
    Ok((kind, &bytes[HEADER_LEN..]))
}

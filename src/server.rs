//! HTTP query/ingest service over one shared index.
//!
//! The process holds exactly one in-memory index, loaded at startup and
//! shared behind a mutex. Ingest mutates and then immediately persists the
//! index, so the lock spans both steps; concurrent ingest requests serialize
//! on it. Core errors are translated into failure responses carrying the
//! error message.

use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::{
    builder::IndexBuilder,
    chunker::{DEFAULT_MIN_WORDS, Granularity, Propositionizer},
    error::{Error, Result},
    record::CorpusRecord,
    store::KvIndex,
};

/// Shared service state: the single index plus where to persist it.
#[derive(Clone)]
pub struct AppState {
    index: Arc<Mutex<KvIndex>>,
    save_dir: PathBuf,
    min_words: usize,
    propositionizer: Option<Arc<dyn Propositionizer + Send + Sync>>,
}

impl AppState {
    pub fn new(index: KvIndex, save_dir: impl Into<PathBuf>) -> Self {
        Self {
            index: Arc::new(Mutex::new(index)),
            save_dir: save_dir.into(),
            min_words: DEFAULT_MIN_WORDS,
            propositionizer: None,
        }
    }

    /// Attach a proposition model so ingest accepts `propositions`.
    pub fn with_propositionizer(
        mut self,
        model: Arc<dyn Propositionizer + Send + Sync>,
    ) -> Self {
        self.propositionizer = Some(model);
        self
    }
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    10
}

#[derive(Debug, Serialize)]
pub struct QueryHit {
    pub key: String,
    pub corpus_id: String,
    pub ordinal: usize,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub results: Vec<QueryHit>,
}

#[derive(Debug, Deserialize)]
pub struct IngestDocument {
    pub corpus_id: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub granularity: String,
    pub documents: Vec<IngestDocument>,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub ingested: usize,
    pub index_len: usize,
}

type HandlerError = (StatusCode, String);

fn into_response_error(error: Error) -> HandlerError {
    let status = match error {
        Error::InvalidBackend(_)
        | Error::InvalidGranularity(_)
        | Error::DocumentTooLong { .. } => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, error.to_string())
}

async fn root() -> &'static str {
    "kvindex retrieval service"
}

async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> std::result::Result<Json<QueryResponse>, HandlerError> {
    let mut index = state.index.lock().map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "index lock poisoned".to_string(),
        )
    })?;

    let hits = index
        .query_with_keys(&request.query, request.top_k)
        .map_err(into_response_error)?;

    Ok(Json(QueryResponse {
        results: hits
            .into_iter()
            .map(|(key, value)| QueryHit {
                key,
                corpus_id: value.corpus_id,
                ordinal: value.ordinal,
            })
            .collect(),
    }))
}

async fn ingest(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> std::result::Result<Json<IngestResponse>, HandlerError> {
    let granularity: Granularity =
        request.granularity.parse().map_err(into_response_error)?;

    let records: Vec<CorpusRecord> = request
        .documents
        .into_iter()
        .map(|doc| CorpusRecord::new(doc.corpus_id, doc.content))
        .collect();

    // The lock spans mutate + persist: the snapshot on disk always reflects
    // a fully applied ingest.
    let mut index = state.index.lock().map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "index lock poisoned".to_string(),
        )
    })?;

    let builder = IndexBuilder::new(
        index.kind(),
        index.index_name().to_string(),
        granularity,
    )
    .min_words(state.min_words);
    let pairs = builder
        .create_kv_pairs(
            &records,
            state
                .propositionizer
                .as_deref()
                .map(|p| p as &dyn Propositionizer),
        )
        .map_err(into_response_error)?;

    let ingested = pairs.len();
    index.add_kv_pairs(pairs).map_err(into_response_error)?;
    index.save(&state.save_dir).map_err(into_response_error)?;

    Ok(Json(IngestResponse {
        ingested,
        index_len: index.len(),
    }))
}

/// Assemble the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/query", post(query))
        .route("/ingest", post(ingest))
        .with_state(state)
}

/// Bind and serve until the process exits.
pub async fn serve(state: AppState, addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "serving retrieval index");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

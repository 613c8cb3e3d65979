//! kvindex - a key-value retrieval index over chunked document corpora.
//!
//! kvindex splits corpus records into retrieval chunks (paragraphs or
//! model-rewritten propositions), indexes the chunk texts as keys under one
//! of several ranking backends (BM25 via a [Tantivy](https://github.com/quickwit-oss/tantivy)
//! analysis pipeline, or dense cosine similarity over instruction-tuned, E5
//! or GTR embeddings), and persists the whole index as a single snapshot
//! file that can be reopened, queried, and grown incrementally.
//!
//! # Quick start
//!
//! ```no_run
//! use kvindex::{BackendKind, Granularity, Retriever};
//! use kvindex::record::CorpusRecord;
//!
//! let records = vec![CorpusRecord::new(
//!     "report.pdf_page_1",
//!     "The committee approved the budget after two hours of debate. \
//!      Funding for the harbor expansion was deferred to next quarter.",
//! )];
//!
//! let mut retriever = Retriever::new(BackendKind::Bm25, "reports", "indices");
//! let path = retriever
//!     .build_and_save(&records, Granularity::Paragraphs, 10, None, None)
//!     .unwrap();
//!
//! for (key, value) in retriever.query_with_keys("harbor budget", 5).unwrap() {
//!     println!("{} (chunk {}): {key}", value.corpus_id, value.ordinal);
//! }
//! println!("snapshot at {}", path.display());
//! ```

pub mod backend;
pub mod bm25;
pub mod builder;
pub mod chunker;
pub mod cli;
pub mod dense;
pub mod encoder;
pub mod error;
pub mod record;
pub mod retriever;
pub mod server;
pub mod store;

pub use backend::{Backend, BackendKind};
pub use builder::IndexBuilder;
pub use chunker::{Granularity, Propositionizer};
pub use encoder::TextEncoder;
pub use error::{Error, Result};
pub use record::CorpusRecord;
pub use retriever::{EncoderProvider, NoDenseEncoders, Retriever};
pub use store::{ChunkRef, KvIndex};

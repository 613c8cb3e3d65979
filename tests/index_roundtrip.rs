//! End-to-end exercise: corpus files on disk, build, persist, reopen, query.

use std::sync::Arc;

use kvindex::{
    BackendKind, EncoderProvider, Granularity, NoDenseEncoders, Propositionizer,
    Result, Retriever, TextEncoder, record,
};

/// Deterministic stand-in for an embedding model: bag-of-words hashed into a
/// small fixed dimension.
struct HashEncoder;

impl TextEncoder for HashEncoder {
    fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; 16];
                for word in text.split_whitespace() {
                    let bucket = word
                        .bytes()
                        .fold(0usize, |acc, b| acc.wrapping_mul(31) + b as usize)
                        % v.len();
                    v[bucket] += 1.0;
                }
                v
            })
            .collect())
    }
}

struct HashEncoders;

impl EncoderProvider for HashEncoders {
    fn encoder(&self, _kind: BackendKind) -> Result<Arc<dyn TextEncoder>> {
        Ok(Arc::new(HashEncoder))
    }
}

/// Splits each paragraph into sentence-sized "propositions".
struct SplitPropositionizer;

impl Propositionizer for SplitPropositionizer {
    fn rewrite_batch(&self, texts: &[&str]) -> Result<Vec<Vec<String>>> {
        Ok(texts
            .iter()
            .map(|text| {
                text.split(". ")
                    .map(|s| s.trim_end_matches('.').to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .collect())
    }
}

fn write_corpus(dir: &std::path::Path) {
    std::fs::write(
        dir.join("ships.json"),
        r#"{
            "file_name": "ships.pdf",
            "page_number": 1,
            "document": "The freighter arrived at the northern dock carrying steel beams and timber. Short note. Harbor pilots guided the vessel through the narrow channel before sunrise that day."
        }"#,
    )
    .unwrap();
    std::fs::write(
        dir.join("orchards.json"),
        r#"[{
            "file_name": "orchard.txt",
            "document": "Workers picked the ripe apples from the oldest trees in the orchard. Cold storage kept the fruit fresh for many months after the autumn harvest."
        }]"#,
    )
    .unwrap();
}

#[test]
fn bm25_build_persist_reopen_query() {
    let corpus = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_corpus(corpus.path());

    let records = record::load_corpus_dir(corpus.path()).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].corpus_id, "orchard.txt");
    assert_eq!(records[1].corpus_id, "ships.pdf_page_1");

    let mut retriever = Retriever::new(BackendKind::Bm25, "docs", out.path());
    let path = retriever
        .build_and_save(&records, Granularity::Paragraphs, 10, None, None)
        .unwrap();
    assert_eq!(path, out.path().join("docs.bm25"));

    // The two-word sentence was dropped; each document kept two paragraphs.
    let built = retriever.index_mut().unwrap();
    assert_eq!(built.len(), 4);

    let hits = retriever
        .query_with_keys("apples from the orchard", 2)
        .unwrap();
    assert_eq!(hits[0].1.corpus_id, "orchard.txt");
    assert!(hits[0].0.contains("apples"));

    let mut reopened = Retriever::load_from_path(&path, &NoDenseEncoders).unwrap();
    assert_eq!(reopened.kind(), BackendKind::Bm25);
    assert_eq!(
        reopened
            .query_with_keys("apples from the orchard", 2)
            .unwrap(),
        hits
    );
}

#[test]
fn dense_build_persist_reopen_query() {
    let corpus = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_corpus(corpus.path());

    let records = record::load_corpus_dir(corpus.path()).unwrap();
    let mut retriever = Retriever::new(BackendKind::Gtr, "docs", out.path());
    let path = retriever
        .build_and_save(
            &records,
            Granularity::Paragraphs,
            10,
            Some(Arc::new(HashEncoder)),
            None,
        )
        .unwrap();
    assert_eq!(path, out.path().join("docs.gtr"));

    let hits = retriever
        .query_with_keys(
            "The freighter arrived at the northern dock carrying steel beams and timber",
            1,
        )
        .unwrap();
    assert_eq!(hits[0].1.corpus_id, "ships.pdf_page_1");

    // Reopening without an embedding model is a configuration error.
    assert!(Retriever::load_from_path(&path, &NoDenseEncoders).is_err());

    let mut reopened = Retriever::load_from_path(&path, &HashEncoders).unwrap();
    assert_eq!(reopened.kind(), BackendKind::Gtr);
    assert_eq!(
        reopened
            .query_with_keys(
                "The freighter arrived at the northern dock carrying steel beams and timber",
                1,
            )
            .unwrap(),
        hits
    );
}

#[test]
fn propositions_index_keys_are_rewrites() {
    let corpus = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_corpus(corpus.path());

    let records = record::load_corpus_dir(corpus.path()).unwrap();
    let mut retriever = Retriever::new(BackendKind::Bm25, "props", out.path());
    retriever
        .build_and_save(
            &records,
            Granularity::Propositions,
            10,
            None,
            Some(&SplitPropositionizer),
        )
        .unwrap();

    let index = retriever.index_mut().unwrap();
    // The splitter leaves whole sentences, so keys carry no trailing periods.
    assert!(index.keys().iter().all(|k| !k.ends_with('.')));

    let hits = retriever.query_with_keys("autumn harvest", 1).unwrap();
    assert_eq!(hits[0].1.corpus_id, "orchard.txt");
}

#[test]
fn incremental_add_after_reopen() {
    let corpus = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_corpus(corpus.path());

    let records = record::load_corpus_dir(corpus.path()).unwrap();
    let mut retriever = Retriever::new(BackendKind::Bm25, "docs", out.path());
    let path = retriever
        .build_and_save(&records, Granularity::Paragraphs, 10, None, None)
        .unwrap();

    let mut reopened = Retriever::load_from_path(&path, &NoDenseEncoders).unwrap();
    let index = reopened.index_mut().unwrap();
    let before = index.len();

    let mut pairs = indexmap::IndexMap::new();
    pairs.insert(
        "lighthouse keepers recorded every passing ship in the log".to_string(),
        kvindex::ChunkRef::new("log.txt", 0),
    );
    index.add_kv_pairs(pairs).unwrap();
    assert_eq!(index.len(), before + 1);
    index.save(out.path()).unwrap();

    let mut again = Retriever::load_from_path(&path, &NoDenseEncoders).unwrap();
    let hits = again.query_with_keys("lighthouse keepers", 1).unwrap();
    assert_eq!(hits[0].1.corpus_id, "log.txt");
}

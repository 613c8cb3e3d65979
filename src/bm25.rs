//! Lexical backend: Okapi BM25 over stemmed token lists.
//!
//! Keys and queries share one analysis pipeline (lowercase, split, English
//! stop-word removal, English stemming) built from Tantivy's tokenizer
//! components. The frequency model is derived state: it is rebuilt from the
//! stored token lists on load and after every incremental add, and is never
//! persisted itself.

use std::collections::HashMap;

use tantivy::tokenizer::{
    Language, LowerCaser, SimpleTokenizer, Stemmer, StopWordFilter,
    TextAnalyzer,
};

use crate::error::{Error, Result};

const K1: f64 = 1.5;
const B: f64 = 0.75;
/// Floor applied to negative IDF values, as a fraction of the average IDF.
const EPSILON: f64 = 0.25;

/// Okapi BM25 frequency model over an encoded corpus.
#[derive(Debug, Clone, Default)]
pub struct Bm25Model {
    avgdl: f64,
    doc_lens: Vec<f64>,
    term_freqs: Vec<HashMap<String, f64>>,
    idf: HashMap<String, f64>,
}

impl Bm25Model {
    /// Fit the model to a corpus of token lists.
    pub fn fit(corpus: &[Vec<String>]) -> Self {
        let num_docs = corpus.len();
        if num_docs == 0 {
            return Self::default();
        }

        let mut doc_lens = Vec::with_capacity(num_docs);
        let mut term_freqs = Vec::with_capacity(num_docs);
        let mut doc_counts: HashMap<String, usize> = HashMap::new();

        for tokens in corpus {
            doc_lens.push(tokens.len() as f64);
            let mut freqs: HashMap<String, f64> = HashMap::new();
            for token in tokens {
                *freqs.entry(token.clone()).or_insert(0.0) += 1.0;
            }
            for term in freqs.keys() {
                *doc_counts.entry(term.clone()).or_insert(0) += 1;
            }
            term_freqs.push(freqs);
        }

        let avgdl = doc_lens.iter().sum::<f64>() / num_docs as f64;

        // Probabilistic IDF goes negative for terms in more than half the
        // corpus; those are floored at EPSILON times the average IDF so a
        // common term still contributes a small positive amount.
        let mut idf: HashMap<String, f64> =
            HashMap::with_capacity(doc_counts.len());
        let mut idf_sum = 0.0;
        let mut negative: Vec<String> = Vec::new();
        for (term, df) in doc_counts {
            let value = (num_docs as f64 - df as f64 + 0.5).ln()
                - (df as f64 + 0.5).ln();
            idf_sum += value;
            if value < 0.0 {
                negative.push(term.clone());
            }
            idf.insert(term, value);
        }
        let average_idf = idf_sum / idf.len() as f64;
        let floor = EPSILON * average_idf;
        for term in negative {
            idf.insert(term, floor);
        }

        Self {
            avgdl,
            doc_lens,
            term_freqs,
            idf,
        }
    }

    /// BM25 relevance of every stored document against the query tokens.
    pub fn scores(&self, query: &[String]) -> Vec<f64> {
        let mut scores = vec![0.0; self.doc_lens.len()];
        for term in query {
            let Some(&idf) = self.idf.get(term) else {
                continue;
            };
            for (i, freqs) in self.term_freqs.iter().enumerate() {
                let Some(&tf) = freqs.get(term) else {
                    continue;
                };
                let norm =
                    K1 * (1.0 - B + B * self.doc_lens[i] / self.avgdl);
                scores[i] += idf * tf * (K1 + 1.0) / (tf + norm);
            }
        }
        scores
    }

    pub fn len(&self) -> usize {
        self.doc_lens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_lens.is_empty()
    }
}

/// The lexical strategy: analyzer plus (rebuildable) frequency model.
pub struct Bm25Backend {
    analyzer: TextAnalyzer,
    model: Option<Bm25Model>,
}

impl Bm25Backend {
    pub fn new() -> Result<Self> {
        let stop_words =
            StopWordFilter::new(Language::English).ok_or_else(|| {
                Error::Config(
                    "English stop-word list unavailable".to_string(),
                )
            })?;
        let analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(LowerCaser)
            .filter(stop_words)
            .filter(Stemmer::new(Language::English))
            .build();
        Ok(Self {
            analyzer,
            model: None,
        })
    }

    /// Run one text through the analysis pipeline.
    pub fn tokenize(&mut self, text: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        let mut stream = self.analyzer.token_stream(text);
        while let Some(token) = stream.next() {
            tokens.push(token.text.clone());
        }
        tokens
    }

    /// Encode a batch of texts into token lists. Keys and queries are
    /// analyzed identically.
    pub fn encode_batch(&mut self, texts: &[String]) -> Vec<Vec<String>> {
        texts.iter().map(|t| self.tokenize(t)).collect()
    }

    /// Rebuild the frequency model from the full set of stored token lists.
    ///
    /// Aggregate statistics (IDF, average length) are not incrementally
    /// decomposable, so this runs over the whole corpus every time.
    pub fn rebuild(&mut self, token_lists: &[Vec<String>]) {
        self.model = Some(Bm25Model::fit(token_lists));
    }

    pub fn clear_model(&mut self) {
        self.model = None;
    }

    /// Top `n` document positions for the encoded query, best first.
    /// Ties keep insertion order.
    pub fn rank(&self, query_tokens: &[String], n: usize) -> Vec<usize> {
        let Some(model) = &self.model else {
            return Vec::new();
        };
        let scores = model.scores(query_tokens);
        let mut indices: Vec<usize> = (0..scores.len()).collect();
        // Stable sort: equal scores stay in insertion order.
        indices.sort_by(|&a, &b| {
            scores[b]
                .partial_cmp(&scores[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        indices.truncate(n);
        indices
    }
}

impl std::fmt::Debug for Bm25Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bm25Backend")
            .field("model", &self.model.as_ref().map(Bm25Model::len))
            .finish_non_exhaustive()
    }
}

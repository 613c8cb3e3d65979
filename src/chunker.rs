//! Splits corpus records into retrievable chunks.
//!
//! Two granularities are supported: `paragraphs` segments the full text into
//! sentences (UAX #29 boundaries) and keeps those above a minimum word count;
//! `propositions` additionally rewrites each paragraph into zero-or-more
//! atomic factual statements via an external seq2seq model.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::{
    error::{Error, Result},
    record::CorpusRecord,
};

/// Minimum whitespace-delimited word count for a paragraph chunk.
pub const DEFAULT_MIN_WORDS: usize = 10;

/// Hard ceiling on document length, matching the sentence segmenter guard.
/// Longer documents fail fast instead of being silently truncated.
pub const MAX_DOCUMENT_CHARS: usize = 100_000_000;

/// Number of paragraphs rewritten per proposition-model invocation.
pub const PROPOSITION_BATCH_SIZE: usize = 16;

/// Chunk extraction strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Paragraphs,
    Propositions,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Paragraphs => "paragraphs",
            Granularity::Propositions => "propositions",
        }
    }
}

impl FromStr for Granularity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "paragraphs" => Ok(Granularity::Paragraphs),
            "propositions" => Ok(Granularity::Propositions),
            other => Err(Error::InvalidGranularity(other.to_string())),
        }
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A retrievable unit of text extracted from one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Chunk text. Never empty.
    pub text: String,
    /// Zero-based position within the record's chunk sequence.
    pub ordinal: usize,
}

/// Rewrites paragraphs into atomic factual statements.
///
/// Implemented by an external sequence-to-sequence model runtime; the crate
/// treats it as an opaque capability. One output list per input paragraph,
/// in input order. A paragraph may yield zero statements.
pub trait Propositionizer {
    fn rewrite_batch(&self, paragraphs: &[&str]) -> Result<Vec<Vec<String>>>;
}

/// Segment `text` into paragraph chunks.
///
/// Sentences shorter than `min_words` whitespace-delimited words are
/// discarded; the survivors keep their original order. Empty text yields an
/// empty list. Text over [`MAX_DOCUMENT_CHARS`] is rejected.
///
/// # Examples
///
/// ```
/// use kvindex::chunker::paragraphs;
///
/// let text = "Too short. This sentence, on the other hand, has more than \
///             enough words to clear the default threshold.";
/// let chunks = paragraphs(text, 10).unwrap();
/// assert_eq!(chunks.len(), 1);
/// ```
pub fn paragraphs(text: &str, min_words: usize) -> Result<Vec<String>> {
    if text.len() > MAX_DOCUMENT_CHARS {
        return Err(Error::DocumentTooLong {
            len: text.len(),
            max: MAX_DOCUMENT_CHARS,
        });
    }

    Ok(text
        .unicode_sentences()
        .map(str::trim)
        .filter(|sentence| {
            !sentence.is_empty()
                && sentence.split_whitespace().count() >= min_words
        })
        .map(str::to_string)
        .collect())
}

/// Chunk one record at the requested granularity.
///
/// For `propositions` the paragraphs are first extracted, then rewritten in
/// batches of [`PROPOSITION_BATCH_SIZE`]; the outputs are flattened in
/// paragraph order and the ordinal counts positions in the flattened
/// sequence.
pub fn chunk_record(
    record: &CorpusRecord,
    granularity: Granularity,
    propositionizer: Option<&dyn Propositionizer>,
    min_words: usize,
) -> Result<Vec<Chunk>> {
    let paragraphs = paragraphs(&record.text, min_words)?;

    let texts = match granularity {
        Granularity::Paragraphs => paragraphs,
        Granularity::Propositions => {
            let model = propositionizer.ok_or_else(|| {
                Error::Config(
                    "propositions granularity requires a proposition model"
                        .to_string(),
                )
            })?;
            let mut flattened = Vec::new();
            for batch in paragraphs.chunks(PROPOSITION_BATCH_SIZE) {
                let refs: Vec<&str> =
                    batch.iter().map(String::as_str).collect();
                let rewritten = model.rewrite_batch(&refs)?;
                if rewritten.len() != refs.len() {
                    return Err(Error::Encode(format!(
                        "proposition model returned {} outputs for {} paragraphs",
                        rewritten.len(),
                        refs.len()
                    )));
                }
                for statements in rewritten {
                    flattened.extend(
                        statements.into_iter().filter(|s| !s.is_empty()),
                    );
                }
            }
            flattened
        }
    };

    Ok(texts
        .into_iter()
        .enumerate()
        .map(|(ordinal, text)| Chunk { text, ordinal })
        .collect())
}

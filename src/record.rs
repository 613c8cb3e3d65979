//! Corpus records: one entry per source document (or per PDF page).
//!
//! Records arrive as converted JSON files produced by the external dataset
//! conversion step. Each JSON object carries `file_name`, an optional
//! `page_number`, and the extracted `document` text. The identifier combines
//! the file name with the page number when one is present, so multi-page
//! sources yield one record per page.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A single immutable corpus document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusRecord {
    /// Identifier derived from the source file name (and page number).
    pub corpus_id: String,
    /// Full extracted text.
    pub text: String,
}

impl CorpusRecord {
    pub fn new(corpus_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            corpus_id: corpus_id.into(),
            text: text.into(),
        }
    }
}

/// Derive a corpus identifier from a file name and optional page number.
///
/// # Examples
///
/// ```
/// use kvindex::record::corpus_id;
///
/// assert_eq!(corpus_id("report.pdf", Some(3)), "report.pdf_page_3");
/// assert_eq!(corpus_id("notes.txt", None), "notes.txt");
/// ```
pub fn corpus_id(file_name: &str, page_number: Option<u64>) -> String {
    match page_number {
        Some(page) => format!("{file_name}_page_{page}"),
        None => file_name.to_string(),
    }
}

/// Shape of a converted corpus JSON entry on disk.
#[derive(Debug, Deserialize)]
struct RawRecord {
    file_name: String,
    #[serde(default)]
    page_number: Option<u64>,
    document: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(RawRecord),
    Many(Vec<RawRecord>),
}

impl RawRecord {
    fn into_record(self) -> CorpusRecord {
        let id = corpus_id(&self.file_name, self.page_number);
        CorpusRecord::new(id, self.document)
    }
}

/// Load every `.json` corpus file under `dir` into records.
///
/// Files are visited in lexicographic name order so record order (and thus
/// index build order) is deterministic across runs. A file may hold either a
/// single record object or an array of them.
pub fn load_corpus_dir(dir: &Path) -> Result<Vec<CorpusRecord>> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)?
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut records = Vec::new();
    for path in paths {
        let contents = std::fs::read_to_string(&path)?;
        let parsed: OneOrMany = serde_json::from_str(&contents).map_err(|e| {
            crate::error::Error::Snapshot(format!(
                "malformed corpus file {}: {e}",
                path.display()
            ))
        })?;
        match parsed {
            OneOrMany::One(raw) => records.push(raw.into_record()),
            OneOrMany::Many(raws) => {
                records.extend(raws.into_iter().map(RawRecord::into_record));
            }
        }
    }

    tracing::debug!(count = records.len(), dir = %dir.display(), "loaded corpus records");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corpus_id_with_page() {
        assert_eq!(corpus_id("a.pdf", Some(0)), "a.pdf_page_0");
    }

    #[test]
    fn corpus_id_without_page() {
        assert_eq!(corpus_id("a.pdf", None), "a.pdf");
    }

    #[test]
    fn load_single_object_file() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("doc.json"),
            r#"{"file_name": "doc.pdf", "page_number": 1, "document": "hello"}"#,
        )
        .unwrap();

        let records = load_corpus_dir(tmp.path()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].corpus_id, "doc.pdf_page_1");
        assert_eq!(records[0].text, "hello");
    }

    #[test]
    fn load_array_file_and_order() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("b.json"),
            r#"[{"file_name": "b.txt", "document": "second"}]"#,
        )
        .unwrap();
        std::fs::write(
            tmp.path().join("a.json"),
            r#"{"file_name": "a.txt", "document": "first"}"#,
        )
        .unwrap();
        // Non-JSON files are skipped.
        std::fs::write(tmp.path().join("readme.md"), "ignore me").unwrap();

        let records = load_corpus_dir(tmp.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].corpus_id, "a.txt");
        assert_eq!(records[1].corpus_id, "b.txt");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("bad.json"), "{not json").unwrap();
        assert!(load_corpus_dir(tmp.path()).is_err());
    }
}

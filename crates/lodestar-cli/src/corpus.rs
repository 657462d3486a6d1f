//! JSONL document corpus reader.
//!
//! One JSON object per line: `{"id": "...", "text": "...", "metadata": {...}}`.
//! Blank lines are skipped; `metadata` is optional and only scalar values
//! are kept.

use anyhow::{bail, Context, Result};
use lodestar_core::{Metadata, MetadataValue};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A document to embed and index.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
}

#[derive(Deserialize)]
struct RawDocument {
    id: String,
    text: String,
    #[serde(default)]
    metadata: serde_json::Map<String, serde_json::Value>,
}

/// Reads every document of a JSONL file.
pub fn read_documents(path: &Path) -> Result<Vec<Document>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    parse_documents(BufReader::new(file))
}

/// Parses JSONL documents, rejecting duplicate ids and empty texts.
pub fn parse_documents(reader: impl BufRead) -> Result<Vec<Document>> {
    let mut documents = Vec::new();
    let mut seen = HashSet::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let raw: RawDocument = serde_json::from_str(&line)
            .with_context(|| format!("line {}: invalid document", number + 1))?;
        if raw.text.trim().is_empty() {
            bail!("line {}: document {} has no text", number + 1, raw.id);
        }
        if !seen.insert(raw.id.clone()) {
            bail!("line {}: duplicate document id {}", number + 1, raw.id);
        }

        let mut metadata = Metadata::new();
        for (key, value) in &raw.metadata {
            match MetadataValue::from_json(value) {
                Some(v) => {
                    metadata.insert(key.clone(), v);
                }
                None => tracing::warn!(id = %raw.id, key = %key, "skipping non-scalar metadata"),
            }
        }
        metadata
            .entry("text".to_string())
            .or_insert_with(|| MetadataValue::String(raw.text.clone()));

        documents.push(Document {
            id: raw.id,
            text: raw.text,
            metadata,
        });
    }
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_documents_with_metadata() {
        let input = r#"{"id": "a", "text": "first doc", "metadata": {"page": 3, "tags": ["x"]}}

{"id": "b", "text": "second doc"}
"#;
        let docs = parse_documents(input.as_bytes()).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].metadata.get("page"), Some(&MetadataValue::Integer(3)));
        assert!(docs[0].metadata.get("tags").is_none());
        assert_eq!(
            docs[1].metadata.get("text"),
            Some(&MetadataValue::String("second doc".into()))
        );
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let input = "{\"id\": \"a\", \"text\": \"x\"}\n{\"id\": \"a\", \"text\": \"y\"}\n";
        let err = parse_documents(input.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_malformed_line_reports_line_number() {
        let input = "{\"id\": \"a\", \"text\": \"x\"}\nnot json\n";
        let err = parse_documents(input.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_empty_text_rejected() {
        assert!(parse_documents("{\"id\": \"a\", \"text\": \"  \"}".as_bytes()).is_err());
    }
}

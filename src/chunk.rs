use crate::error::{Result, RetrievalError};
use serde::{Deserialize, Serialize};

/// Where a chunk came from. Every field is optional; ingestion fills in what it knows.
/// Also stored inside bincode metadata, so no field may be skipped on serialize.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct SourceAttributes {
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub chunk_index: Option<usize>,
    #[serde(default)]
    pub start_line: Option<usize>,
    #[serde(default)]
    pub end_line: Option<usize>,
}

/// A unit of source text as supplied by ingestion.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Chunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceAttributes>,
}

impl Chunk {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: None,
            text: text.into(),
            source: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_source(mut self, source: SourceAttributes) -> Self {
        self.source = Some(source);
        self
    }
}

/// Per-slot record kept alongside the index.
///
/// Bincode is not self-describing, so unlike [`Chunk`] no field is skipped.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct MetadataRecord {
    pub id: Option<String>,
    pub text: String,
    pub source: Option<SourceAttributes>,
}

impl From<Chunk> for MetadataRecord {
    fn from(chunk: Chunk) -> Self {
        Self {
            id: chunk.id,
            text: chunk.text,
            source: chunk.source,
        }
    }
}

impl MetadataRecord {
    /// Short single-line preview of the text for listings.
    pub fn preview(&self, max_chars: usize) -> String {
        let flat: String = self
            .text
            .chars()
            .map(|c| if c.is_whitespace() { ' ' } else { c })
            .collect();
        let trimmed = flat.trim();
        if trimmed.chars().count() <= max_chars {
            trimmed.to_string()
        } else {
            let mut out: String = trimmed.chars().take(max_chars).collect();
            out.push_str("...");
            out
        }
    }
}

/// Parse one JSONL line into a [`Chunk`].
pub fn parse_chunk_line(line: &str) -> Result<Chunk> {
    serde_json::from_str(line)
        .map_err(|e| RetrievalError::Config(format!("failed to parse chunk JSON: {}", e)))
}

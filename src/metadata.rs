use crate::chunk::MetadataRecord;
use crate::error::{Result, RetrievalError};
use crate::index::Checksum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const FORMAT_VERSION: u32 = 1;

/// Slot-ordered records kept in lockstep with the vector index.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MetadataStore {
    records: Vec<MetadataRecord>,
}

/// Everything written to the metadata artifact. The header ties the records
/// to the exact index file saved with them.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct MetadataArtifact {
    pub version: u32,
    pub model_id: String,
    pub dimension: u32,
    pub index_checksum: Checksum,
    pub records: Vec<MetadataRecord>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<MetadataRecord>) -> Self {
        Self { records }
    }

    pub fn get(&self, slot: usize) -> Option<&MetadataRecord> {
        self.records.get(slot)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[MetadataRecord] {
        &self.records
    }

    pub(crate) fn to_bytes(
        &self,
        model_id: &str,
        dimension: usize,
        index_checksum: Checksum,
    ) -> Result<Vec<u8>> {
        let artifact = MetadataArtifact {
            version: FORMAT_VERSION,
            model_id: model_id.to_string(),
            dimension: dimension as u32,
            index_checksum,
            records: self.records.clone(),
        };
        bincode::serialize(&artifact)
            .map_err(|e| RetrievalError::IndexCorrupt(format!("failed to encode metadata: {}", e)))
    }

    pub(crate) fn read_artifact(path: &Path) -> Result<MetadataArtifact> {
        let bytes = fs::read(path).map_err(|e| RetrievalError::io(path, e))?;
        let artifact: MetadataArtifact = bincode::deserialize(&bytes).map_err(|e| {
            RetrievalError::IndexCorrupt(format!(
                "failed to decode metadata '{}': {}",
                path.display(),
                e
            ))
        })?;
        if artifact.version != FORMAT_VERSION {
            return Err(RetrievalError::IndexCorrupt(format!(
                "unsupported metadata format version {}",
                artifact.version
            )));
        }
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{Chunk, SourceAttributes};

    #[test]
    fn get_follows_slot_order_and_misses_past_end() {
        let store =
            MetadataStore::from_records(vec![Chunk::new("a").into(), Chunk::new("b").into()]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(1).unwrap().text, "b");
        assert!(store.get(2).is_none());
    }

    #[test]
    fn artifact_round_trips_records_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.bin");
        let store = MetadataStore::from_records(vec![
            Chunk::new("first\n\tline").with_id("a#0").into(),
            Chunk::new("")
                .with_source(SourceAttributes {
                    file_path: Some("data/b.txt".into()),
                    start_line: Some(3),
                    ..Default::default()
                })
                .into(),
        ]);

        let bytes = store.to_bytes("hashing-v1", 16, [7u8; 32]).unwrap();
        fs::write(&path, bytes).unwrap();

        let artifact = MetadataStore::read_artifact(&path).unwrap();
        assert_eq!(artifact.model_id, "hashing-v1");
        assert_eq!(artifact.dimension, 16);
        assert_eq!(artifact.index_checksum, [7u8; 32]);
        assert_eq!(MetadataStore::from_records(artifact.records), store);
    }

    #[test]
    fn garbage_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.bin");
        fs::write(&path, b"\x01\x02").unwrap();
        assert!(matches!(
            MetadataStore::read_artifact(&path),
            Err(RetrievalError::IndexCorrupt(_))
        ));
    }
}

use crate::chunk::{Chunk, MetadataRecord};
use crate::config::{Number, SearchMethod, Settings};
use crate::embedder::Embedder;
use crate::error::{Result, RetrievalError};
use crate::index::{checksum, FlatIndex};
use crate::metadata::MetadataStore;
use crate::persist::write_atomic;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Names the committed generation. Replacing it is the single commit step of a save.
pub const MANIFEST_FILE: &str = "CURRENT";
const INDEX_STEM: &str = "vectors";
const INDEX_EXT: &str = "index";
const METADATA_STEM: &str = "metadata";
const METADATA_EXT: &str = "bin";

/// Lifecycle of a [`VectorStore`]. Both `Built` and `Loaded` count as ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    Uninitialized,
    Built,
    Loaded,
}

impl StoreState {
    pub fn is_ready(self) -> bool {
        !matches!(self, StoreState::Uninitialized)
    }
}

impl fmt::Display for StoreState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreState::Uninitialized => f.write_str("uninitialized"),
            StoreState::Built => f.write_str("built"),
            StoreState::Loaded => f.write_str("loaded"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    pub search_method: SearchMethod,
    pub ann_num_tables: Option<usize>,
    pub ann_num_projections: Option<usize>,
}

impl From<&Settings> for StoreOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            search_method: settings.search_method,
            ann_num_tables: settings.ann_num_tables,
            ann_num_projections: settings.ann_num_projections,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub slot: usize,
    pub score: Number,
    pub metadata: MetadataRecord,
}

/// Paths of one saved generation of the artifact pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub generation: u64,
    pub index: PathBuf,
    pub metadata: PathBuf,
}

impl ArtifactPaths {
    pub fn for_generation(persist_dir: &Path, generation: u64) -> Self {
        Self {
            generation,
            index: persist_dir.join(format!("{}-{}.{}", INDEX_STEM, generation, INDEX_EXT)),
            metadata: persist_dir.join(format!(
                "{}-{}.{}",
                METADATA_STEM, generation, METADATA_EXT
            )),
        }
    }
}

pub fn manifest_path(persist_dir: &Path) -> PathBuf {
    persist_dir.join(MANIFEST_FILE)
}

/// The generation named by the manifest, or `None` when nothing was ever committed.
pub fn current_artifacts(persist_dir: &Path) -> Result<Option<ArtifactPaths>> {
    let manifest = manifest_path(persist_dir);
    let contents = match fs::read_to_string(&manifest) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(RetrievalError::io(&manifest, e)),
    };
    let generation: u64 = contents.trim().parse().map_err(|_| {
        RetrievalError::IndexCorrupt(format!(
            "manifest '{}' does not name a generation",
            manifest.display()
        ))
    })?;
    Ok(Some(ArtifactPaths::for_generation(persist_dir, generation)))
}

/// True once a save has been committed to `persist_dir`.
pub fn has_artifacts(persist_dir: &Path) -> bool {
    manifest_path(persist_dir).exists()
}

fn remove_generation(paths: &ArtifactPaths) {
    for file in [&paths.index, &paths.metadata] {
        if let Err(e) = fs::remove_file(file) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(file = %file.display(), error = %e, "failed to remove stale artifact");
            }
        }
    }
}

/// Embedder, vector index and metadata as one persistable unit.
///
/// Mutation (`build_from_documents`, `load`) needs `&mut self`; once ready the
/// store is shared read-only and `query` can run from many threads at once.
pub struct VectorStore<E: Embedder> {
    embedder: E,
    options: StoreOptions,
    state: StoreState,
    index: FlatIndex,
    metadata: MetadataStore,
}

impl<E: Embedder> VectorStore<E> {
    pub fn new(embedder: E, options: StoreOptions) -> Self {
        let index = FlatIndex::new(embedder.dimension());
        Self {
            embedder,
            options,
            state: StoreState::Uninitialized,
            index,
            metadata: MetadataStore::new(),
        }
    }

    pub fn state(&self) -> StoreState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    pub fn records(&self) -> &[MetadataRecord] {
        self.metadata.records()
    }

    pub fn vector(&self, slot: usize) -> Option<&[Number]> {
        self.index.vector(slot)
    }

    fn fresh_index(&self) -> FlatIndex {
        FlatIndex::new(self.embedder.dimension())
    }

    fn attach_ann(&self, index: &mut FlatIndex) {
        if self.options.search_method == SearchMethod::Ann {
            index.enable_ann(self.options.ann_num_tables, self.options.ann_num_projections);
        }
    }

    /// Embed every chunk in one batch and replace the store contents. On error
    /// the store keeps whatever it held before.
    pub fn build_from_documents(&mut self, chunks: Vec<Chunk>) -> Result<()> {
        let start = Instant::now();
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let vectors = self.embedder.embed_batch(&texts)?;
        if vectors.len() != chunks.len() {
            return Err(RetrievalError::Embedding(format!(
                "embedder returned {} vectors for {} texts",
                vectors.len(),
                chunks.len()
            )));
        }

        let mut index = self.fresh_index();
        index.add(&vectors)?;
        self.attach_ann(&mut index);

        let metadata =
            MetadataStore::from_records(chunks.into_iter().map(MetadataRecord::from).collect());
        debug_assert_eq!(index.len(), metadata.len());

        self.index = index;
        self.metadata = metadata;
        self.state = StoreState::Built;

        tracing::info!(
            vectors = self.index.len(),
            dimension = self.index.dimension(),
            elapsed = ?start.elapsed(),
            "built vector store"
        );
        Ok(())
    }

    /// Write both artifacts into `persist_dir`, creating it if needed.
    ///
    /// The pair is written under a fresh generation number next to the live
    /// one, then the manifest is replaced in one rename. Until that rename the
    /// previous generation stays the one `load` sees, so an interrupted or
    /// failed save leaves the directory as it was.
    pub fn save(&self, persist_dir: &Path) -> Result<()> {
        if !self.is_ready() {
            return Err(RetrievalError::NotReady);
        }

        let previous = current_artifacts(persist_dir)?;
        let paths = self.write_generation(persist_dir, previous.as_ref())?;

        let manifest = format!("{}\n", paths.generation);
        if let Err(e) = write_atomic(&manifest_path(persist_dir), manifest.as_bytes())
            .and_then(|staged| staged.persist())
        {
            remove_generation(&paths);
            return Err(e);
        }

        if let Some(old) = previous {
            remove_generation(&old);
        }

        tracing::info!(
            dir = %persist_dir.display(),
            generation = paths.generation,
            vectors = self.index.len(),
            "saved vector store"
        );
        Ok(())
    }

    /// Write the next generation's files. They are not visible to `load`
    /// until the manifest names them.
    fn write_generation(
        &self,
        persist_dir: &Path,
        previous: Option<&ArtifactPaths>,
    ) -> Result<ArtifactPaths> {
        let generation = previous.map_or(1, |p| p.generation + 1);
        let paths = ArtifactPaths::for_generation(persist_dir, generation);

        let index_bytes = self.index.to_bytes();
        let metadata_bytes = self.metadata.to_bytes(
            self.embedder.model_id(),
            self.index.dimension(),
            checksum(&index_bytes),
        )?;

        let staged_index = write_atomic(&paths.index, &index_bytes)?;
        let staged_metadata = write_atomic(&paths.metadata, &metadata_bytes)?;
        staged_index.persist()?;
        if let Err(e) = staged_metadata.persist() {
            remove_generation(&paths);
            return Err(e);
        }
        Ok(paths)
    }

    /// Load the committed generation from `persist_dir`. On error the store
    /// keeps whatever it held before.
    pub fn load(&mut self, persist_dir: &Path) -> Result<()> {
        let paths = current_artifacts(persist_dir)?
            .ok_or_else(|| RetrievalError::ArtifactMissing(persist_dir.to_path_buf()))?;
        let index_file = paths.index;
        let metadata_file = paths.metadata;

        match (index_file.exists(), metadata_file.exists()) {
            (false, false) => {
                return Err(RetrievalError::PartialArtifact {
                    present: manifest_path(persist_dir),
                    missing: index_file,
                })
            }
            (true, false) => {
                return Err(RetrievalError::PartialArtifact {
                    present: index_file,
                    missing: metadata_file,
                })
            }
            (false, true) => {
                return Err(RetrievalError::PartialArtifact {
                    present: metadata_file,
                    missing: index_file,
                })
            }
            (true, true) => {}
        }

        let artifact = MetadataStore::read_artifact(&metadata_file)?;
        if artifact.model_id != self.embedder.model_id() {
            return Err(RetrievalError::IndexCorrupt(format!(
                "artifacts were built with model '{}', store uses '{}'",
                artifact.model_id,
                self.embedder.model_id()
            )));
        }
        if artifact.dimension as usize != self.embedder.dimension() {
            return Err(RetrievalError::IndexCorrupt(format!(
                "metadata records dimension {}, embedder produces {}",
                artifact.dimension,
                self.embedder.dimension()
            )));
        }

        let (mut index, index_checksum) =
            FlatIndex::load_with_checksum(&index_file, Some(self.embedder.dimension()))?;
        if index_checksum != artifact.index_checksum {
            return Err(RetrievalError::IndexCorrupt(
                "index file does not match the one the metadata was saved with".into(),
            ));
        }
        if index.len() != artifact.records.len() {
            return Err(RetrievalError::IndexCorrupt(format!(
                "index holds {} vectors but metadata holds {} records",
                index.len(),
                artifact.records.len()
            )));
        }
        self.attach_ann(&mut index);

        self.index = index;
        self.metadata = MetadataStore::from_records(artifact.records);
        self.state = StoreState::Loaded;

        tracing::info!(
            dir = %persist_dir.display(),
            vectors = self.index.len(),
            "loaded vector store"
        );
        Ok(())
    }

    /// Nearest records for `text`, best first. Slots without metadata are skipped.
    pub fn query(&self, text: &str, top_k: usize) -> Result<Vec<QueryResult>> {
        if !self.is_ready() {
            return Err(RetrievalError::NotReady);
        }
        if top_k == 0 {
            return Err(RetrievalError::InvalidTopK);
        }

        let query_vector = self.embedder.embed(text)?;
        let hits = self.index.search(&query_vector, top_k)?;
        tracing::debug!(top_k, hits = hits.len(), "index search finished");

        let results = hits
            .into_iter()
            .filter_map(|(slot, score)| match self.metadata.get(slot) {
                Some(record) => Some(QueryResult {
                    slot,
                    score,
                    metadata: record.clone(),
                }),
                None => {
                    tracing::warn!(slot, "no metadata for slot, skipping");
                    None
                }
            })
            .collect();
        Ok(results)
    }
}

//! Composition of the retrieval core with an external summarizer, plus the
//! once-only initialization used by long-lived callers.

use crate::chunk::Chunk;
use crate::embedder::Embedder;
use crate::error::{Result, RetrievalError};
use crate::pipeline::{Context, RetrievalPipeline};
use crate::store::{has_artifacts, StoreState, VectorStore};
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

pub const NO_RELEVANT_DOCUMENTS: &str = "No relevant documents found.";

/// Black-box text generator fed with a fully rendered prompt.
pub trait Summarizer {
    fn summarize(&self, prompt: &str) -> anyhow::Result<String>;
}

impl<F> Summarizer for F
where
    F: Fn(&str) -> anyhow::Result<String>,
{
    fn summarize(&self, prompt: &str) -> anyhow::Result<String> {
        self(prompt)
    }
}

pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "Summarize the following context for the query: '{}'\n\nContext:\n{}\n\nSummary:",
        question, context
    )
}

/// Retrieve context for `question` and summarize it. The summarizer is not
/// called when nothing relevant was retrieved.
pub fn search_and_summarize<E, S>(
    pipeline: &RetrievalPipeline<E>,
    summarizer: &S,
    question: &str,
    top_k: usize,
) -> anyhow::Result<String>
where
    E: Embedder,
    S: Summarizer + ?Sized,
{
    tracing::info!(question, top_k, "querying vector store");
    match pipeline.retrieve_context(question, top_k)? {
        Context::Empty => Ok(NO_RELEVANT_DOCUMENTS.to_string()),
        Context::Found(context) => summarizer.summarize(&build_prompt(question, &context)),
    }
}

/// Load the store from `persist_dir` if any artifact is there, otherwise build
/// it from `chunks` and save it. A lone artifact surfaces as
/// [`RetrievalError::PartialArtifact`] rather than triggering a rebuild.
pub fn open_or_build<E, F>(
    store: &mut VectorStore<E>,
    persist_dir: &Path,
    chunks: F,
) -> Result<StoreState>
where
    E: Embedder,
    F: FnOnce() -> Result<Vec<Chunk>>,
{
    if has_artifacts(persist_dir) {
        store.load(persist_dir)?;
    } else {
        store.build_from_documents(chunks()?)?;
        store.save(persist_dir)?;
    }
    Ok(store.state())
}

/// Memoized, read-only handle to a ready pipeline, initialized at most once.
///
/// Concurrent callers of [`get_or_init`](Self::get_or_init) serialize on the
/// initializer; only the first runs it. A failed initialization is not cached.
pub struct SharedRetriever<E: Embedder> {
    cell: OnceLock<RetrievalPipeline<E>>,
    init: Mutex<()>,
}

impl<E: Embedder> Default for SharedRetriever<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Embedder> SharedRetriever<E> {
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
            init: Mutex::new(()),
        }
    }

    pub fn get(&self) -> Option<&RetrievalPipeline<E>> {
        self.cell.get()
    }

    pub fn get_or_init<F>(&self, init: F) -> Result<&RetrievalPipeline<E>>
    where
        F: FnOnce() -> Result<VectorStore<E>>,
    {
        if let Some(pipeline) = self.cell.get() {
            return Ok(pipeline);
        }

        let _guard = self.init.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pipeline) = self.cell.get() {
            return Ok(pipeline);
        }

        let store = init()?;
        if !store.is_ready() {
            return Err(RetrievalError::NotReady);
        }
        tracing::debug!(state = %store.state(), vectors = store.len(), "retriever initialized");

        let pipeline = RetrievalPipeline::new(Arc::new(store));
        Ok(self.cell.get_or_init(|| pipeline))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashingEmbedder;
    use crate::store::StoreOptions;
    use std::cell::Cell;

    fn ready_pipeline(chunks: Vec<Chunk>) -> RetrievalPipeline<HashingEmbedder> {
        let mut store = VectorStore::new(HashingEmbedder::new(32).unwrap(), StoreOptions::default());
        store.build_from_documents(chunks).unwrap();
        RetrievalPipeline::new(Arc::new(store))
    }

    #[test]
    fn prompt_matches_template() {
        assert_eq!(
            build_prompt("what?", "A\n\nB"),
            "Summarize the following context for the query: 'what?'\n\nContext:\nA\n\nB\n\nSummary:"
        );
    }

    #[test]
    fn empty_context_short_circuits_summarizer() {
        let calls = Cell::new(0);
        let summarizer = |_: &str| -> anyhow::Result<String> {
            calls.set(calls.get() + 1);
            Ok("summary".into())
        };
        let pipeline = ready_pipeline(vec![Chunk::new("   ")]);

        let answer = search_and_summarize(&pipeline, &summarizer, "anything", 5).unwrap();
        assert_eq!(answer, NO_RELEVANT_DOCUMENTS);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn found_context_reaches_summarizer() {
        let summarizer = |prompt: &str| -> anyhow::Result<String> { Ok(prompt.to_uppercase()) };
        let pipeline = ready_pipeline(vec![Chunk::new("gradient descent")]);

        let answer = search_and_summarize(&pipeline, &summarizer, "descent", 1).unwrap();
        assert!(answer.contains("GRADIENT DESCENT"));
        assert!(answer.ends_with("SUMMARY:"));
    }

    #[test]
    fn summarizer_errors_propagate() {
        let summarizer = |_: &str| -> anyhow::Result<String> { anyhow::bail!("rate limited") };
        let pipeline = ready_pipeline(vec![Chunk::new("text")]);
        let err = search_and_summarize(&pipeline, &summarizer, "text", 1).unwrap_err();
        assert!(err.to_string().contains("rate limited"));
    }

    #[test]
    fn open_or_build_builds_then_loads() {
        let dir = tempfile::tempdir().unwrap();
        let chunks = || Ok(vec![Chunk::new("alpha"), Chunk::new("beta")]);

        let mut first = VectorStore::new(HashingEmbedder::new(32).unwrap(), StoreOptions::default());
        assert_eq!(
            open_or_build(&mut first, dir.path(), chunks).unwrap(),
            StoreState::Built
        );

        let mut second = VectorStore::new(HashingEmbedder::new(32).unwrap(), StoreOptions::default());
        let state = open_or_build(&mut second, dir.path(), || -> Result<Vec<Chunk>> {
            panic!("ingestion must not run when artifacts exist")
        })
        .unwrap();
        assert_eq!(state, StoreState::Loaded);
        assert_eq!(second.len(), 2);
    }

    #[test]
    fn failed_init_is_not_memoized() {
        let shared: SharedRetriever<HashingEmbedder> = SharedRetriever::new();
        assert!(shared
            .get_or_init(|| Err(RetrievalError::Embedding("offline".into())))
            .is_err());
        assert!(shared.get().is_none());

        let pipeline = shared
            .get_or_init(|| {
                let mut store =
                    VectorStore::new(HashingEmbedder::new(32).unwrap(), StoreOptions::default());
                store.build_from_documents(vec![Chunk::new("x")])?;
                Ok(store)
            })
            .unwrap();
        assert_eq!(pipeline.store().len(), 1);
        assert!(shared.get().is_some());
    }

    #[test]
    fn unready_store_is_refused() {
        let shared: SharedRetriever<HashingEmbedder> = SharedRetriever::new();
        let result = shared.get_or_init(|| {
            Ok(VectorStore::new(
                HashingEmbedder::new(32).unwrap(),
                StoreOptions::default(),
            ))
        });
        assert!(matches!(result, Err(RetrievalError::NotReady)));
    }
}

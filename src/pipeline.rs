use crate::embedder::Embedder;
use crate::error::Result;
use crate::store::VectorStore;
use std::sync::Arc;

pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Context assembled for a question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Context {
    /// Retrieved texts joined in similarity order.
    Found(String),
    /// Nothing usable was retrieved; callers should skip the summarizer.
    Empty,
}

impl Context {
    pub fn is_empty(&self) -> bool {
        matches!(self, Context::Empty)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Context::Found(text) => Some(text.as_str()),
            Context::Empty => None,
        }
    }
}

/// Turns a question into a single context blob from a ready [`VectorStore`].
pub struct RetrievalPipeline<E: Embedder> {
    store: Arc<VectorStore<E>>,
}

impl<E: Embedder> Clone for RetrievalPipeline<E> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<E: Embedder> RetrievalPipeline<E> {
    pub fn new(store: Arc<VectorStore<E>>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &VectorStore<E> {
        &self.store
    }

    pub fn retrieve_context(&self, question: &str, top_k: usize) -> Result<Context> {
        let results = self.store.query(question, top_k)?;
        let total = results.len();

        let texts: Vec<&str> = results
            .iter()
            .map(|r| r.metadata.text.as_str())
            .filter(|text| !text.trim().is_empty())
            .collect();

        if texts.is_empty() {
            tracing::warn!(retrieved = total, "no context found for question");
            return Ok(Context::Empty);
        }

        tracing::debug!(retrieved = total, kept = texts.len(), "assembled context");
        Ok(Context::Found(texts.join(CONTEXT_SEPARATOR)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Chunk;
    use crate::embedder::HashingEmbedder;
    use crate::store::StoreOptions;

    fn pipeline(chunks: Vec<Chunk>) -> RetrievalPipeline<HashingEmbedder> {
        let mut store = VectorStore::new(HashingEmbedder::new(64).unwrap(), StoreOptions::default());
        store.build_from_documents(chunks).unwrap();
        RetrievalPipeline::new(Arc::new(store))
    }

    #[test]
    fn blank_texts_only_give_empty_sentinel() {
        let pipeline = pipeline(vec![Chunk::new(""), Chunk::new("  \n\t")]);
        let context = pipeline.retrieve_context("anything", 5).unwrap();
        assert_eq!(context, Context::Empty);
        assert!(context.as_str().is_none());
    }

    #[test]
    fn empty_store_gives_empty_sentinel() {
        let pipeline = pipeline(Vec::new());
        assert!(pipeline.retrieve_context("anything", 5).unwrap().is_empty());
    }

    #[test]
    fn found_context_keeps_similarity_order() {
        let pipeline = pipeline(vec![
            Chunk::new("cats purr"),
            Chunk::new("dogs bark loudly at night"),
        ]);
        let context = pipeline.retrieve_context("dogs bark", 2).unwrap();
        let text = context.as_str().unwrap();
        assert!(text.starts_with("dogs bark loudly at night"));
        assert_eq!(text.split(CONTEXT_SEPARATOR).count(), 2);
    }
}

//! Retrieval core for question answering over a private document collection.
//!
//! Chunks are embedded, stored in a flat vector index next to their metadata,
//! persisted as an artifact pair, and queried to assemble context for an
//! external summarizer.

pub mod ann;
pub mod chunk;
pub mod config;
pub mod embedder;
pub mod error;
pub mod index;
pub mod metadata;
pub mod persist;
pub mod pipeline;
pub mod rag;
pub mod store;
pub mod vector_ops;

pub use chunk::{Chunk, MetadataRecord, SourceAttributes};
pub use config::{SearchMethod, Settings};
pub use embedder::{Embedder, HashingEmbedder};
pub use error::{Result, RetrievalError};
pub use index::FlatIndex;
pub use metadata::MetadataStore;
pub use pipeline::{Context, RetrievalPipeline};
pub use rag::{open_or_build, search_and_summarize, SharedRetriever, Summarizer};
pub use store::{QueryResult, StoreOptions, StoreState, VectorStore};

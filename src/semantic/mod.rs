//! Embedding, indexing and retrieval.
//!
//! # Architecture
//!
//! - `preprocess`: Deterministic text cleaning applied before embedding
//! - `embeddings`: Encoder capability, fastembed model, batched encoding
//! - `index`: Exact flat inner-product index over unit vectors
//! - `storage`: Binary file I/O for index and embedding files
//! - `service`: Query engine and per-corpus search service

pub mod embeddings;
pub mod index;
mod preprocess;
pub mod service;
pub mod storage;

pub use embeddings::{embed_all, EmbeddingError, EmbeddingModel, Encoder};
pub use index::{FlatIndex, IndexError, Neighbor, NO_MATCH};
pub use preprocess::{clean_text, content_hash};
pub use service::{QueryEngine, SearchError, SearchResult, SearchService};
pub use storage::{VectorStorage, VectorStorageError};

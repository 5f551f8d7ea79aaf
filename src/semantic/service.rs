//! Query-time retrieval.
//!
//! - `QueryEngine`: one loaded corpus (index + metadata table), checked for
//!   row alignment when opened
//! - `SearchService`: lazily opens and caches one engine per corpus

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::Serialize;

use crate::corpus::{Corpus, DataPaths};
use crate::indexer::CorpusManifest;
use crate::semantic::embeddings::{EmbeddingError, Encoder};
use crate::semantic::index::{l2_normalize, FlatIndex, IndexError};
use crate::semantic::preprocess::{clean_text, content_hash};
use crate::semantic::storage::{VectorStorage, VectorStorageError};
use crate::verses::{load_existing, TableError, Tradition, VerseTable};

/// Errors that can occur during search.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Storage error: {0}")]
    Storage(#[from] VectorStorageError),

    #[error("Metadata error: {0}")]
    Table(#[from] TableError),

    #[error("Corpus '{0}' has no index, run build first")]
    NotBuilt(Corpus),

    #[error("Index and metadata for '{corpus}' are out of step: {reason}")]
    Misaligned { corpus: Corpus, reason: String },

    #[error("Result count must be at least 1, got {0}")]
    InvalidK(usize),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// One ranked verse.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub tradition: Tradition,
    pub book: String,
    pub chapter: u32,
    pub verse: u32,
    pub text: String,
    pub score: f32,
}

/// A corpus opened for querying. Immutable once opened.
pub struct QueryEngine {
    corpus: Corpus,
    encoder: Arc<dyn Encoder>,
    index: FlatIndex,
    table: VerseTable,
}

impl QueryEngine {
    /// Load the index and metadata table of `corpus`.
    pub fn open(paths: &DataPaths, corpus: Corpus, encoder: Arc<dyn Encoder>) -> Result<Self, SearchError> {
        let span = tracing::info_span!("open", corpus = corpus.id());
        let _enter = span.enter();
        let now = Instant::now();

        let storage = VectorStorage::new(paths.index_file(corpus));
        if !storage.exists() {
            return Err(SearchError::NotBuilt(corpus));
        }
        let index = storage.load_index(&encoder.model_id_hash(), encoder.dimensions())?;
        let table = load_existing(&paths.metadata_file(corpus))?;
        check_manifest(paths, corpus, &table)?;

        let engine = Self::from_parts(corpus, encoder, index, table)?;
        log::info!(
            "open {} completed in {:.4} sec ({} rows)",
            corpus,
            now.elapsed().as_secs_f64(),
            engine.index.len()
        );
        Ok(engine)
    }

    /// Pair an index with its metadata table, refusing any row drift.
    pub fn from_parts(
        corpus: Corpus,
        encoder: Arc<dyn Encoder>,
        index: FlatIndex,
        table: VerseTable,
    ) -> Result<Self, SearchError> {
        if index.dimensions() != encoder.dimensions() {
            return Err(IndexError::DimensionMismatch {
                expected: encoder.dimensions(),
                got: index.dimensions(),
            }
            .into());
        }

        if index.len() != table.len() {
            return Err(SearchError::Misaligned {
                corpus,
                reason: format!("index has {} rows, metadata has {}", index.len(), table.len()),
            });
        }

        let tradition = corpus.tradition();
        if let Some(record) = table.rows().iter().find(|r| r.tradition != tradition) {
            return Err(SearchError::Misaligned {
                corpus,
                reason: format!(
                    "row {} is {} but {} holds {} verses",
                    record.row_id, record.tradition, corpus, tradition
                ),
            });
        }

        let drift = index
            .row_ids()
            .iter()
            .zip(table.rows())
            .position(|(&row_id, record)| row_id != record.row_id);
        if let Some(position) = drift {
            return Err(SearchError::Misaligned {
                corpus,
                reason: format!(
                    "position {} holds row {:?} in the index but row {} in metadata",
                    position,
                    index.row_id(position),
                    table.rows()[position].row_id
                ),
            });
        }

        Ok(Self {
            corpus,
            encoder,
            index,
            table,
        })
    }

    /// Embed `query` and return up to `k` verses, best first.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>, SearchError> {
        if k == 0 {
            return Err(SearchError::InvalidK(k));
        }
        if self.index.is_empty() {
            return Ok(Vec::new());
        }

        let mut query_vector = self.encoder.encode_one(&clean_text(query))?;
        l2_normalize(&mut query_vector);

        let neighbors = self.index.search(&query_vector, k)?;

        let mut results = Vec::with_capacity(neighbors.len());
        for neighbor in neighbors {
            if !neighbor.is_match() {
                log::debug!("{}: dropping empty result slot", self.corpus);
                continue;
            }
            let record = match usize::try_from(neighbor.position)
                .ok()
                .and_then(|position| self.table.get(position))
            {
                Some(record) => record,
                None => {
                    log::warn!(
                        "{}: dropping out-of-range position {}",
                        self.corpus,
                        neighbor.position
                    );
                    continue;
                }
            };

            results.push(SearchResult {
                tradition: record.tradition,
                book: record.book.clone(),
                chapter: record.chapter,
                verse: record.verse,
                text: record.display_text().to_string(),
                score: neighbor.score,
            });
        }

        Ok(results)
    }
}

/// A metadata table edited after the build keeps its row ids but no longer
/// matches the embedded texts; the manifest fingerprint catches that.
fn check_manifest(paths: &DataPaths, corpus: Corpus, table: &VerseTable) -> Result<(), SearchError> {
    let path = paths.manifest_file(corpus);
    if !path.exists() {
        log::warn!("{corpus}: no manifest, skipping content check");
        return Ok(());
    }

    let manifest = CorpusManifest::load(&path).map_err(|e| SearchError::Misaligned {
        corpus,
        reason: format!("unreadable manifest: {e}"),
    })?;

    let texts = table.embedding_texts();
    if manifest.content_hash != content_hash(texts.iter().map(String::as_str)) {
        return Err(SearchError::Misaligned {
            corpus,
            reason: "metadata text changed since the index was built".to_string(),
        });
    }
    Ok(())
}

/// `search(query, corpus, k)` over every built corpus.
///
/// Engines are opened on first use and then shared. Opening happens under
/// the cache lock so a corpus is never loaded twice.
pub struct SearchService {
    paths: DataPaths,
    encoder: Arc<dyn Encoder>,
    engines: Mutex<HashMap<Corpus, Arc<QueryEngine>>>,
}

impl SearchService {
    pub fn new(paths: DataPaths, encoder: Arc<dyn Encoder>) -> Self {
        Self {
            paths,
            encoder,
            engines: Mutex::new(HashMap::new()),
        }
    }

    /// Search one corpus.
    pub fn search(&self, query: &str, corpus: Corpus, k: usize) -> Result<Vec<SearchResult>, SearchError> {
        if k == 0 {
            return Err(SearchError::InvalidK(k));
        }
        self.engine(corpus)?.search(query, k)
    }

    /// Search several corpora and merge by score, keeping the best `k`.
    /// Corpora that were never built are skipped.
    pub fn search_all(
        &self,
        query: &str,
        corpora: &[Corpus],
        k: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        if k == 0 {
            return Err(SearchError::InvalidK(k));
        }

        let mut merged = vec![];
        for &corpus in corpora {
            match self.search(query, corpus, k) {
                Ok(results) => merged.extend(results),
                Err(SearchError::NotBuilt(corpus)) => {
                    log::debug!("skipping {corpus}: not built");
                }
                Err(e) => return Err(e),
            }
        }

        // stable: equal scores keep corpus order
        merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        merged.truncate(k);
        Ok(merged)
    }

    fn engine(&self, corpus: Corpus) -> Result<Arc<QueryEngine>, SearchError> {
        let mut engines = self
            .engines
            .lock()
            .map_err(|e| SearchError::Internal(format!("Lock poisoned: {}", e)))?;

        if let Some(engine) = engines.get(&corpus) {
            return Ok(engine.clone());
        }

        let engine = Arc::new(QueryEngine::open(&self.paths, corpus, self.encoder.clone())?);
        engines.insert(corpus, engine.clone());
        Ok(engine)
    }
}

//! Corpus ingestion and index builds.
//!
//! `ingest` turns a raw source into the metadata table. `IndexBuilder`
//! turns the metadata table into embeddings, an index and a manifest.
//! Both take the corpus build lock and publish every file by rename.

use std::path::Path;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::corpus::{Corpus, DataPaths};
use crate::lock::FileLock;
use crate::semantic::storage::VectorStorage;
use crate::semantic::{
    content_hash, embed_all, EmbeddingError, Encoder, FlatIndex, IndexError, VectorStorageError,
};
use crate::sources::{self, SourceError};
use crate::verses::{load_existing, temp_path_for, TableError, VerseTable};

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Metadata error: {0}")]
    Table(#[from] TableError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Storage error: {0}")]
    Storage(#[from] VectorStorageError),

    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("Cannot lock corpus: {0}")]
    Locked(std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corpus '{0}' has no verses to index")]
    Empty(Corpus),
}

/// Describes the published artifacts of one corpus build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusManifest {
    pub corpus: String,
    pub model: String,
    pub dimensions: usize,
    pub rows: usize,
    /// Fingerprint of the embedded texts, in row order
    pub content_hash: String,
    pub zero_norm_rows: usize,
    pub built_at: DateTime<Utc>,
}

impl CorpusManifest {
    pub fn load(path: &Path) -> Result<Self, BuildError> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), BuildError> {
        let data = serde_json::to_string_pretty(self)?;
        let temp_path = temp_path_for(path);
        let result = std::fs::write(&temp_path, data).and_then(|_| std::fs::rename(&temp_path, path));
        if let Err(err) = result {
            let _ = std::fs::remove_file(&temp_path);
            return Err(err.into());
        }
        Ok(())
    }
}

/// Outcome of a build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub corpus: Corpus,
    pub rows: usize,
    pub dimensions: usize,
    pub zero_norm_rows: usize,
    pub elapsed: Duration,
}

/// Parse the raw source of `corpus`, assign row ids, normalize, and publish
/// the metadata table. Returns the number of verses.
pub fn ingest(paths: &DataPaths, config: &Config, corpus: Corpus) -> Result<usize, BuildError> {
    let span = tracing::info_span!("ingest", corpus = corpus.id());
    let _enter = span.enter();
    let now = Instant::now();

    paths.ensure_dirs()?;
    let _lock = FileLock::try_acquire(&paths.index_path, corpus.id()).map_err(BuildError::Locked)?;

    let records = sources::load(corpus, &paths.raw_file(corpus), &config.sources)?;
    let mut table = VerseTable::from_records(records);
    table.normalize();
    log::info!(
        "Parsed {} verses across {} books",
        table.len(),
        table.book_count()
    );

    table.save(&paths.metadata_file(corpus))?;
    log::info!(
        "ingest {} completed in {:.4} sec",
        corpus,
        now.elapsed().as_secs_f64()
    );
    Ok(table.len())
}

/// Builds the embeddings, index and manifest of a corpus.
pub struct IndexBuilder<'a> {
    paths: &'a DataPaths,
    encoder: &'a dyn Encoder,
    batch_size: usize,
    parallelism: Option<usize>,
    show_progress: bool,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(paths: &'a DataPaths, encoder: &'a dyn Encoder, config: &Config) -> Self {
        Self {
            paths,
            encoder,
            batch_size: config.batch_size,
            parallelism: config.parallelism(),
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Build from the published metadata table.
    pub fn build_from_metadata(&self, corpus: Corpus) -> Result<BuildReport, BuildError> {
        let table = load_existing(&self.paths.metadata_file(corpus))?;
        self.build(corpus, table)
    }

    /// Rebuild `corpus` from `table`.
    pub fn build(&self, corpus: Corpus, mut table: VerseTable) -> Result<BuildReport, BuildError> {
        let span = tracing::info_span!("build", corpus = corpus.id());
        let _enter = span.enter();
        let now = Instant::now();

        if table.is_empty() {
            return Err(BuildError::Empty(corpus));
        }

        self.paths.ensure_dirs()?;
        let _lock =
            FileLock::try_acquire(&self.paths.index_path, corpus.id()).map_err(BuildError::Locked)?;

        table.normalize();
        if !table.extra_headers().is_empty() {
            log::info!("{corpus}: keeping columns {}", table.extra_headers().join(", "));
        }
        let texts = table.embedding_texts();
        let row_ids: Vec<u64> = table.rows().iter().map(|r| r.row_id).collect();
        let hash = content_hash(texts.iter().map(String::as_str));

        let dimensions = self.encoder.dimensions();
        let model_id = self.encoder.model_id_hash();

        let embeddings = match self.cached_embeddings(corpus, &row_ids, &hash) {
            Some(embeddings) => {
                log::info!("{corpus}: reusing {} stored embeddings", embeddings.len());
                embeddings
            }
            None => {
                let progress = self.progress_bar(texts.len());
                let embeddings = embed_all(
                    self.encoder,
                    &texts,
                    self.batch_size,
                    self.parallelism,
                    progress.as_ref(),
                )?;
                if let Some(pb) = &progress {
                    pb.finish_and_clear();
                }

                VectorStorage::new(self.paths.embeddings_file(corpus))
                    .save_embeddings(&row_ids, &embeddings, dimensions, &model_id)?;
                embeddings
            }
        };

        let index_started = Instant::now();
        let index = FlatIndex::build(dimensions, &row_ids, embeddings)?;
        log::info!(
            "index {} completed in {:.4} sec",
            corpus,
            index_started.elapsed().as_secs_f64()
        );

        let manifest = CorpusManifest {
            corpus: corpus.id().to_string(),
            model: self.encoder.name().to_string(),
            dimensions,
            rows: index.len(),
            content_hash: hash,
            zero_norm_rows: index.zero_rows(),
            built_at: Utc::now(),
        };

        // manifest last
        table.save(&self.paths.metadata_file(corpus))?;
        VectorStorage::new(self.paths.index_file(corpus)).save_index(&index, &model_id)?;
        manifest.save(&self.paths.manifest_file(corpus))?;

        let report = BuildReport {
            corpus,
            rows: index.len(),
            dimensions,
            zero_norm_rows: index.zero_rows(),
            elapsed: now.elapsed(),
        };
        log::info!(
            "build {} completed in {:.4} sec ({} rows, {} dims)",
            corpus,
            report.elapsed.as_secs_f64(),
            report.rows,
            report.dimensions
        );
        Ok(report)
    }

    /// Vectors from the previous build when the model, the row ids and the
    /// embedded texts are all unchanged. Anything unreadable means re-embed.
    fn cached_embeddings(&self, corpus: Corpus, row_ids: &[u64], hash: &str) -> Option<Vec<Vec<f32>>> {
        let manifest = CorpusManifest::load(&self.paths.manifest_file(corpus)).ok()?;
        if manifest.model != self.encoder.name() || manifest.content_hash != hash {
            return None;
        }

        let stored = VectorStorage::new(self.paths.embeddings_file(corpus))
            .load_embeddings(&self.encoder.model_id_hash(), self.encoder.dimensions())
            .map_err(|e| log::debug!("{corpus}: stored embeddings unusable: {e}"))
            .ok()?;
        if stored.row_ids != row_ids {
            return None;
        }
        Some(stored.vectors)
    }

    fn progress_bar(&self, len: usize) -> Option<ProgressBar> {
        if !self.show_progress {
            return None;
        }
        let progress = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            progress.set_style(style.progress_chars("##-"));
        }
        progress.set_message("embedding");
        Some(progress)
    }
}

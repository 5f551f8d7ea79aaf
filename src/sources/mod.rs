//! Raw source parsers, one per tradition.
//!
//! Every parser turns a raw text blob into verse records in source order.
//! Row ids are assigned afterwards by the verse table.

pub mod bible;
pub mod gita;
pub mod quran;

use std::path::Path;
use std::time::Instant;

use crate::config::SourceConfig;
use crate::corpus::Corpus;
use crate::verses::VerseRecord;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to read raw source {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid Gita JSON: {0}")]
    GitaJson(#[from] serde_json::Error),

    #[error("no verses parsed from {0}")]
    Empty(String),
}

/// Parse raw text for a corpus.
pub fn parse(corpus: Corpus, raw: &str, config: &SourceConfig) -> Result<Vec<VerseRecord>, SourceError> {
    let records = match corpus {
        Corpus::Bible => bible::parse_bible(raw),
        Corpus::Quran => quran::parse_quran(raw, &config.quran_edition),
        Corpus::Gita => gita::parse_gita(raw, config.gita_filter())?,
    };
    Ok(records)
}

/// Read and parse a raw file. An empty result is an error: publishing an
/// empty corpus would only hide a bad download.
pub fn load(corpus: Corpus, path: &Path, config: &SourceConfig) -> Result<Vec<VerseRecord>, SourceError> {
    let now = Instant::now();
    let raw = std::fs::read_to_string(path).map_err(|source| SourceError::Read {
        path: path.display().to_string(),
        source,
    })?;

    let records = parse(corpus, &raw, config)?;
    if records.is_empty() {
        return Err(SourceError::Empty(path.display().to_string()));
    }

    log::info!(
        "parse {} completed in {:.4} sec",
        corpus,
        now.elapsed().as_secs_f64()
    );
    Ok(records)
}

use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod corpus;
mod fetch;
mod indexer;
mod lock;
mod semantic;
mod sources;
#[cfg(test)]
mod tests;
mod verses;

use config::Config;
use corpus::{Corpus, DataPaths};
use indexer::{CorpusManifest, IndexBuilder};
use semantic::{EmbeddingModel, SearchService, VectorStorage};

fn init_logging() {
    let filter = EnvFilter::try_from_env("VERSEDEX_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

fn load_model(paths: &DataPaths, config: &Config) -> anyhow::Result<EmbeddingModel> {
    EmbeddingModel::new(&config.model, paths.models_path.clone())
        .with_context(|| format!("failed to load embedding model '{}'", config.model))
}

fn build(paths: &DataPaths, config: &Config, corpora: &[Corpus], progress: bool) -> anyhow::Result<()> {
    let model = load_model(paths, config)?;
    let builder = IndexBuilder::new(paths, &model, config).with_progress(progress);
    for &corpus in corpora {
        let report = builder
            .build_from_metadata(corpus)
            .with_context(|| format!("failed to build {corpus}"))?;
        if report.zero_norm_rows > 0 {
            log::warn!("{corpus}: {} rows embedded to a zero vector", report.zero_norm_rows);
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();
    init_logging();

    let paths = DataPaths::resolve(args.base_dir.as_deref())?;
    paths.ensure_dirs()?;
    let config = Config::load_with(&paths.base_path)?;

    match args.command {
        cli::Command::Fetch { corpus } => {
            for corpus in corpus.corpora() {
                fetch::fetch(&config, &paths, corpus)
                    .with_context(|| format!("failed to fetch {corpus}"))?;
            }
        }

        cli::Command::Ingest { corpus } => {
            for corpus in corpus.corpora() {
                indexer::ingest(&paths, &config, corpus)
                    .with_context(|| format!("failed to ingest {corpus}"))?;
            }
        }

        cli::Command::Build { corpus, progress } => {
            build(&paths, &config, &corpus.corpora(), progress)?;
        }

        cli::Command::Run { corpus, progress } => {
            let corpora = corpus.corpora();
            for &corpus in &corpora {
                fetch::fetch_if_missing(&config, &paths, corpus)
                    .with_context(|| format!("failed to fetch {corpus}"))?;
                indexer::ingest(&paths, &config, corpus)
                    .with_context(|| format!("failed to ingest {corpus}"))?;
            }
            build(&paths, &config, &corpora, progress)?;
        }

        cli::Command::Search { query, corpus, k } => {
            let k = k.unwrap_or(config.default_k);
            if k == 0 {
                bail!("-k must be at least 1");
            }

            let model = load_model(&paths, &config)?;
            let service = SearchService::new(paths.clone(), Arc::new(model));
            let results = match corpus {
                Some(corpus) => service.search(&query, corpus, k)?,
                None => service.search_all(&query, &Corpus::ALL, k)?,
            };

            println!("{}", serde_json::to_string_pretty(&results)?);
        }

        cli::Command::Info { corpus } => {
            let path = paths.manifest_file(corpus);
            if !path.exists() {
                bail!("{corpus} has not been built yet");
            }
            let manifest = CorpusManifest::load(&path)?;
            let header = VectorStorage::new(paths.index_file(corpus))
                .header()
                .with_context(|| format!("failed to read {corpus} index"))?;
            if header.entry_count as usize != manifest.rows || header.dimensions as usize != manifest.dimensions {
                log::warn!(
                    "{corpus}: index holds {} x {} but the manifest says {} x {}",
                    header.entry_count,
                    header.dimensions,
                    manifest.rows,
                    manifest.dimensions
                );
            }
            println!("{}", serde_json::to_string_pretty(&manifest)?);
        }
    };

    Ok(())
}

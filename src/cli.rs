use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::corpus::{Corpus, CorpusSelection};

#[derive(Parser, Debug)]
#[command(version, about = "Semantic search over scripture", long_about = None)]
pub struct Args {
    /// Data directory (defaults to $VERSEDEX_BASE_PATH or ~/.local/share/versedex)
    #[clap(long, global = true)]
    pub base_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Download raw sources
    Fetch {
        /// bible, quran, gita or all
        #[clap(default_value = "all")]
        corpus: CorpusSelection,
    },

    /// Parse raw sources into metadata tables
    Ingest {
        /// bible, quran, gita or all
        #[clap(default_value = "all")]
        corpus: CorpusSelection,
    },

    /// Embed metadata tables and build indexes
    Build {
        /// bible, quran, gita or all
        #[clap(default_value = "all")]
        corpus: CorpusSelection,

        /// Show a progress bar while embedding
        #[clap(long, default_value = "false")]
        progress: bool,
    },

    /// Fetch (when missing), ingest and build
    Run {
        /// bible, quran, gita or all
        #[clap(default_value = "all")]
        corpus: CorpusSelection,

        /// Show a progress bar while embedding
        #[clap(long, default_value = "false")]
        progress: bool,
    },

    /// Search one corpus, or every built corpus
    Search {
        query: String,

        /// Corpus to search; all built corpora when omitted
        #[clap(short, long)]
        corpus: Option<Corpus>,

        /// Number of results (config default_k when omitted)
        #[clap(short, long)]
        k: Option<usize>,
    },

    /// Print the build manifest of a corpus
    Info { corpus: Corpus },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search() {
        let args = Args::parse_from(["versedex", "search", "let there be light", "-c", "bible", "-k", "3"]);
        match args.command {
            Command::Search { query, corpus, k } => {
                assert_eq!(query, "let there be light");
                assert_eq!(corpus, Some(Corpus::Bible));
                assert_eq!(k, Some(3));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_corpus_defaults_to_all() {
        let args = Args::parse_from(["versedex", "--base-dir", "/tmp/vx", "build", "--progress"]);
        assert_eq!(args.base_dir, Some(PathBuf::from("/tmp/vx")));
        assert!(matches!(
            args.command,
            Command::Build {
                corpus: CorpusSelection::All,
                progress: true
            }
        ));
    }

    #[test]
    fn test_unknown_corpus_rejected() {
        assert!(Args::try_parse_from(["versedex", "ingest", "vedas"]).is_err());
    }
}

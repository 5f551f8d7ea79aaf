use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use homedir::my_home;

use crate::verses::Tradition;

/// One tradition's full set of verses and its derived artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Corpus {
    Bible,
    Quran,
    Gita,
}

impl Corpus {
    pub const ALL: [Corpus; 3] = [Corpus::Bible, Corpus::Quran, Corpus::Gita];

    /// Identifier shared by every artifact of this corpus.
    pub fn id(&self) -> &'static str {
        match self {
            Corpus::Bible => "bible",
            Corpus::Quran => "quran_english",
            Corpus::Gita => "gita_english",
        }
    }

    pub fn tradition(&self) -> Tradition {
        match self {
            Corpus::Bible => Tradition::Christianity,
            Corpus::Quran => Tradition::Islam,
            Corpus::Gita => Tradition::Hinduism,
        }
    }

    pub fn raw_file_name(&self) -> &'static str {
        match self {
            Corpus::Bible => "bible_kjv.txt",
            Corpus::Quran => "quran_pickthall.txt",
            Corpus::Gita => "gita_translation.json",
        }
    }
}

impl std::fmt::Display for Corpus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

impl std::str::FromStr for Corpus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bible" | "kjv" => Ok(Corpus::Bible),
            "quran" | "quran_english" => Ok(Corpus::Quran),
            "gita" | "gita_english" => Ok(Corpus::Gita),
            other => Err(format!(
                "unknown corpus '{other}', expected one of: bible, quran, gita"
            )),
        }
    }
}

/// A corpus selection on the command line: one corpus or `all`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorpusSelection {
    One(Corpus),
    All,
}

impl CorpusSelection {
    pub fn corpora(&self) -> Vec<Corpus> {
        match self {
            CorpusSelection::One(corpus) => vec![*corpus],
            CorpusSelection::All => Corpus::ALL.to_vec(),
        }
    }
}

impl std::str::FromStr for CorpusSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            Ok(CorpusSelection::All)
        } else {
            s.parse().map(CorpusSelection::One)
        }
    }
}

/// On-disk layout of the data directory.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub base_path: PathBuf,
    pub raw_path: PathBuf,
    pub metadata_path: PathBuf,
    pub embedded_path: PathBuf,
    pub index_path: PathBuf,
    pub models_path: PathBuf,
}

impl DataPaths {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        let base_path = base_path.into();
        Self {
            raw_path: base_path.join("raw"),
            metadata_path: base_path.join("metadata"),
            embedded_path: base_path.join("embedded"),
            index_path: base_path.join("index"),
            models_path: base_path.join("models"),
            base_path,
        }
    }

    /// Resolve the base directory: explicit path, then `VERSEDEX_BASE_PATH`,
    /// then `~/.local/share/versedex`.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Ok(Self::new(path));
        }
        if let Ok(path) = std::env::var("VERSEDEX_BASE_PATH") {
            return Ok(Self::new(path));
        }
        let home = my_home()
            .context("could not determine home directory")?
            .context("home directory path is empty")?;
        Ok(Self::new(home.join(".local/share/versedex")))
    }

    /// Create every directory of the layout.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            &self.base_path,
            &self.raw_path,
            &self.metadata_path,
            &self.embedded_path,
            &self.index_path,
            &self.models_path,
        ] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn raw_file(&self, corpus: Corpus) -> PathBuf {
        self.raw_path.join(corpus.raw_file_name())
    }

    pub fn metadata_file(&self, corpus: Corpus) -> PathBuf {
        self.metadata_path.join(format!("{}_metadata.csv", corpus.id()))
    }

    pub fn embeddings_file(&self, corpus: Corpus) -> PathBuf {
        self.embedded_path.join(format!("{}_embeddings.bin", corpus.id()))
    }

    pub fn index_file(&self, corpus: Corpus) -> PathBuf {
        self.index_path.join(format!("{}.index", corpus.id()))
    }

    pub fn manifest_file(&self, corpus: Corpus) -> PathBuf {
        self.index_path.join(format!("{}.manifest.json", corpus.id()))
    }
}

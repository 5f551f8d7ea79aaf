use std::path::Path;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::sources::gita::GitaFilter;
use crate::sources::quran::DEFAULT_EDITION;

const CONFIG_FILE: &str = "config.yaml";

/// Default embedding model (384-dim sentence encoder)
const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";
/// Default number of texts per encoder call
const DEFAULT_BATCH_SIZE: usize = 64;
/// Default number of results per query
const DEFAULT_K: usize = 5;
/// Default source download timeout in seconds
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;

const DEFAULT_BIBLE_URL: &str = "https://www.gutenberg.org/cache/epub/10/pg10.txt";
const DEFAULT_QURAN_URL: &str = "https://tanzil.net/trans/?transID=en.pickthall&type=txt-2";
const DEFAULT_GITA_URL: &str = "https://raw.githubusercontent.com/gita/gita/main/data/translation.json";

/// Where raw sources come from and which edition/translation to keep.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_bible_url")]
    pub bible_url: String,

    #[serde(default = "default_quran_url")]
    pub quran_url: String,

    #[serde(default = "default_gita_url")]
    pub gita_url: String,

    /// Written into the `source` column of Quran rows
    #[serde(default = "default_quran_edition")]
    pub quran_edition: String,

    #[serde(default = "default_gita_language_id")]
    pub gita_language_id: u32,

    #[serde(default = "default_gita_author_id")]
    pub gita_author_id: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            bible_url: default_bible_url(),
            quran_url: default_quran_url(),
            gita_url: default_gita_url(),
            quran_edition: default_quran_edition(),
            gita_language_id: default_gita_language_id(),
            gita_author_id: default_gita_author_id(),
        }
    }
}

impl SourceConfig {
    pub fn gita_filter(&self) -> GitaFilter {
        GitaFilter {
            language_id: self.gita_language_id,
            author_id: self.gita_author_id,
        }
    }
}

fn default_bible_url() -> String {
    DEFAULT_BIBLE_URL.to_string()
}

fn default_quran_url() -> String {
    DEFAULT_QURAN_URL.to_string()
}

fn default_gita_url() -> String {
    DEFAULT_GITA_URL.to_string()
}

fn default_quran_edition() -> String {
    DEFAULT_EDITION.to_string()
}

fn default_gita_language_id() -> u32 {
    GitaFilter::default().language_id
}

fn default_gita_author_id() -> u32 {
    GitaFilter::default().author_id
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Model name for embeddings (e.g., "all-MiniLM-L6-v2")
    #[serde(default = "default_model")]
    pub model: String,

    /// Texts per encoder call. Has no effect on the vectors produced.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Parallelism for embedding generation: "auto" or a positive integer
    #[serde(default = "default_embedding_parallelism")]
    pub embedding_parallelism: String,

    /// Timeout for raw source downloads in seconds
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    /// Results returned by a query when no count is given
    #[serde(default = "default_k")]
    pub default_k: usize,

    #[serde(default)]
    pub sources: SourceConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: default_model(),
            batch_size: default_batch_size(),
            embedding_parallelism: default_embedding_parallelism(),
            download_timeout_secs: default_download_timeout_secs(),
            default_k: default_k(),
            sources: SourceConfig::default(),
        }
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_embedding_parallelism() -> String {
    "auto".to_string()
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

fn default_k() -> usize {
    DEFAULT_K
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.batch_size == 0 {
            bail!("batch_size must be greater than 0");
        }

        if self.default_k == 0 {
            bail!("default_k must be greater than 0");
        }

        if self.embedding_parallelism != "auto" {
            match self.embedding_parallelism.parse::<usize>() {
                Ok(0) | Err(_) => bail!(
                    "embedding_parallelism must be 'auto' or a positive integer, got '{}'",
                    self.embedding_parallelism
                ),
                Ok(_) => {}
            }
        }

        if self.download_timeout_secs == 0 {
            bail!("download_timeout_secs must be greater than 0");
        }

        for (key, value) in [
            ("sources.bible_url", &self.sources.bible_url),
            ("sources.quran_url", &self.sources.quran_url),
            ("sources.gita_url", &self.sources.gita_url),
        ] {
            url::Url::parse(value).with_context(|| format!("{key} is not a valid url: {value}"))?;
        }

        Ok(())
    }

    /// Embedding worker threads; `None` means let rayon decide.
    pub fn parallelism(&self) -> Option<usize> {
        self.embedding_parallelism.parse().ok()
    }

    /// Load `config.yaml` from `base_path`, creating it with defaults first.
    pub fn load_with(base_path: &Path) -> anyhow::Result<Self> {
        let path = base_path.join(CONFIG_FILE);

        if !path.exists() {
            std::fs::create_dir_all(base_path)
                .with_context(|| format!("failed to create {}", base_path.display()))?;
            Self::default().save(base_path)?;
        }

        let config_str = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = serde_yml::from_str(&config_str)
            .with_context(|| format!("{} is malformed", path.display()))?;

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save(base_path)?;
        }

        Ok(config)
    }

    pub fn save(&self, base_path: &Path) -> anyhow::Result<()> {
        let path = base_path.join(CONFIG_FILE);
        let temp_path = crate::verses::temp_path_for(&path);

        let config_str = serde_yml::to_string(&self)?;
        std::fs::write(&temp_path, config_str)
            .with_context(|| format!("failed to write {}", temp_path.display()))?;
        std::fs::rename(&temp_path, &path)?;
        Ok(())
    }
}

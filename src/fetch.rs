//! Download raw sources into `raw/`.
//!
//! The only network-facing part of the pipeline. A download is written to a
//! temp file and renamed into place, so a failed or partial download never
//! replaces a good raw file.

use std::io::Write;
use std::path::Path;
use std::thread::sleep;
use std::time::{Duration, Instant};

use reqwest::StatusCode;

use crate::config::Config;
use crate::corpus::{Corpus, DataPaths};
use crate::verses::temp_path_for;

const USER_AGENT: &str = concat!("versedex/", env!("CARGO_PKG_VERSION"));
const MAX_ATTEMPTS: u64 = 3;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid url {url}: {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("http client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("{url} answered {status}")]
    Status { url: String, status: StatusCode },

    #[error("gave up on {url} after {attempts} attempts")]
    Exhausted { url: String, attempts: u64 },

    #[error("downloaded {corpus} source is not usable: {reason}")]
    Invalid { corpus: Corpus, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Source url configured for `corpus`.
pub fn source_url(config: &Config, corpus: Corpus) -> &str {
    match corpus {
        Corpus::Bible => &config.sources.bible_url,
        Corpus::Quran => &config.sources.quran_url,
        Corpus::Gita => &config.sources.gita_url,
    }
}

/// Download the raw source of `corpus` and publish it under `raw/`.
pub fn fetch(config: &Config, paths: &DataPaths, corpus: Corpus) -> Result<(), FetchError> {
    let url = source_url(config, corpus);
    let now = Instant::now();

    let bytes = download(url, Duration::from_secs(config.download_timeout_secs))?;
    validate(corpus, &bytes)?;

    let target = paths.raw_file(corpus);
    publish(&target, &bytes)?;

    log::info!(
        "fetch {} completed in {:.4} sec ({} bytes -> {})",
        corpus,
        now.elapsed().as_secs_f64(),
        bytes.len(),
        target.display()
    );
    Ok(())
}

/// Fetch only when the raw file is not there yet.
pub fn fetch_if_missing(config: &Config, paths: &DataPaths, corpus: Corpus) -> Result<bool, FetchError> {
    if paths.raw_file(corpus).exists() {
        log::debug!("{corpus}: raw source present, not fetching");
        return Ok(false);
    }
    fetch(config, paths, corpus)?;
    Ok(true)
}

fn download(url: &str, timeout: Duration) -> Result<Vec<u8>, FetchError> {
    let parsed = url::Url::parse(url).map_err(|source| FetchError::Url {
        url: url.to_string(),
        source,
    })?;
    let iden = format!("{}{}", parsed.host_str().unwrap_or_default(), parsed.path());

    let client = reqwest::blocking::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()?;

    let mut attempt = 0;
    loop {
        if attempt >= MAX_ATTEMPTS {
            return Err(FetchError::Exhausted {
                url: url.to_string(),
                attempts: attempt,
            });
        }
        if attempt > 0 {
            log::debug!("{iden}: retrying");
            sleep(Duration::from_secs(attempt * 2));
        }
        attempt += 1;

        log::debug!("{iden}: requesting");
        let resp = match client.get(url).send() {
            Ok(r) => r,
            Err(err) => {
                log::warn!("{iden}: {err}");
                continue;
            }
        };

        let status = resp.status();
        if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
            // no point retrying
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }
        if !status.is_success() {
            log::warn!("{iden}: {status}");
            continue;
        }

        match resp.bytes() {
            Ok(bytes) => return Ok(bytes.to_vec()),
            Err(err) => {
                log::warn!("{iden}: body: {err}");
                continue;
            }
        }
    }
}

/// Cheap sanity check before a download replaces anything.
fn validate(corpus: Corpus, bytes: &[u8]) -> Result<(), FetchError> {
    let invalid = |reason: &str| FetchError::Invalid {
        corpus,
        reason: reason.to_string(),
    };

    let text = std::str::from_utf8(bytes).map_err(|_| invalid("not UTF-8"))?;
    if text.trim().is_empty() {
        return Err(invalid("empty body"));
    }

    if corpus == Corpus::Gita {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| invalid(&format!("not JSON: {e}")))?;
        if !value.is_array() {
            return Err(invalid("expected a JSON array of translations"));
        }
    }
    Ok(())
}

fn publish(target: &Path, bytes: &[u8]) -> Result<(), FetchError> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let temp_path = temp_path_for(target);
    let result = (|| -> std::io::Result<()> {
        let mut file = std::fs::File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()
    })();

    if let Err(err) = result {
        let _ = std::fs::remove_file(&temp_path);
        return Err(err.into());
    }
    std::fs::rename(&temp_path, target)?;
    Ok(())
}

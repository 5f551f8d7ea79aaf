//! Bhagavad Gita translation table.
//!
//! The upstream JSON is a flat list of translations for every verse, by
//! every translator, in every language. It carries a sequential `verse_id`
//! but no chapter/verse numbers, so those are rebuilt from the edition's
//! fixed chapter sizes.

use serde::Deserialize;

use crate::verses::{Tradition, VerseRecord};

pub const BOOK: &str = "Bhagavad Gita";

/// Verses per chapter for the indexed edition (18 chapters, 701 verses).
pub const CHAPTER_SIZES: [u32; 18] = [
    47, 72, 43, 42, 29, 47, 30, 28, 34, 42, 55, 20, 35, 27, 20, 24, 28, 78,
];

/// One translation row as published upstream.
#[derive(Debug, Clone, Deserialize)]
pub struct GitaRow {
    pub language_id: u32,
    pub author_id: u32,
    pub verse_id: u32,
    pub description: String,
    #[serde(rename = "authorName", default)]
    pub author_name: String,
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub lang: String,
}

/// Which translation to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GitaFilter {
    pub language_id: u32,
    pub author_id: u32,
}

impl Default for GitaFilter {
    fn default() -> Self {
        // English, Swami Sivananda
        Self {
            language_id: 1,
            author_id: 19,
        }
    }
}

/// Sequential (chapter, verse) pairs for `rows` rows, walking `chapter_sizes`
/// in order. Output is truncated to the shorter of `rows` and the table total.
pub fn assign_positions(rows: usize, chapter_sizes: &[u32]) -> Vec<(u32, u32)> {
    (0..rows)
        .map_while(|k| position_of(k, chapter_sizes))
        .collect()
}

/// Chapter and verse (both 1-based) for 0-based row `k`.
fn position_of(k: usize, chapter_sizes: &[u32]) -> Option<(u32, u32)> {
    let mut remainder = k;
    for (chapter_idx, &size) in chapter_sizes.iter().enumerate() {
        let size = size as usize;
        if remainder < size {
            return Some((chapter_idx as u32 + 1, remainder as u32 + 1));
        }
        remainder -= size;
    }
    None
}

/// Translator surname as used for the `source` column ("Swami Sivananda" -> "Sivananda").
fn source_name(author_name: &str) -> String {
    let mut words = author_name.split_whitespace();
    match (words.next(), words.next()) {
        (Some(_), Some(second)) => second.to_string(),
        (Some(only), None) => only.to_string(),
        _ => String::new(),
    }
}

/// Two-letter code matching the other corpora's `lang` column.
fn lang_code(lang: &str) -> String {
    match lang.trim().to_lowercase().as_str() {
        "english" | "en" => "EN".to_string(),
        "hindi" | "hi" => "HI".to_string(),
        "sanskrit" | "sa" => "SA".to_string(),
        other => other.to_uppercase(),
    }
}

/// Parse the upstream JSON array and rebuild chapter/verse numbering.
pub fn parse_gita(json: &str, filter: GitaFilter) -> Result<Vec<VerseRecord>, serde_json::Error> {
    let rows: Vec<GitaRow> = serde_json::from_str(json)?;
    Ok(records_from_rows(rows, filter, &CHAPTER_SIZES))
}

pub fn records_from_rows(
    rows: Vec<GitaRow>,
    filter: GitaFilter,
    chapter_sizes: &[u32],
) -> Vec<VerseRecord> {
    let mut rows: Vec<GitaRow> = rows
        .into_iter()
        .filter(|r| r.language_id == filter.language_id && r.author_id == filter.author_id)
        .collect();
    rows.sort_by_key(|r| r.verse_id);

    let expected: u32 = chapter_sizes.iter().sum();
    if rows.len() != expected as usize {
        log::warn!(
            "Gita row count {} does not match chapter table total {}; truncating to {}",
            rows.len(),
            expected,
            rows.len().min(expected as usize)
        );
    }

    let positions = assign_positions(rows.len(), chapter_sizes);
    let source = rows
        .first()
        .map(|r| source_name(&r.author_name))
        .unwrap_or_default();

    let records: Vec<VerseRecord> = rows
        .into_iter()
        .zip(positions)
        .map(|(row, (chapter, verse))| {
            VerseRecord::new(
                Tradition::Hinduism,
                BOOK,
                chapter,
                verse,
                row.description.trim(),
                lang_code(&row.lang),
                source.clone(),
            )
        })
        .collect();

    log::info!("Processed Gita ({source}): {} verses", records.len());
    records
}

//! Tanzil-style Quran translation parser: `surah|ayah|text`, one ayah per line.

use crate::verses::{Tradition, VerseRecord};

pub const LANG: &str = "EN";
pub const DEFAULT_EDITION: &str = "Pickthall";

/// Parse a delimited translation file. Malformed lines are skipped with a
/// warning; `#` lines and blank lines are ignored.
pub fn parse_quran(input: &str, edition: &str) -> Vec<VerseRecord> {
    let mut records = Vec::new();
    let mut skipped = 0usize;

    for (idx, raw) in input.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        match parse_line(line, edition) {
            Some(record) => records.push(record),
            None => {
                skipped += 1;
                log::warn!("Skipping malformed line {}: {}", idx + 1, line);
            }
        }
    }

    if skipped > 0 {
        log::warn!("Skipped {skipped} malformed lines in {edition} translation");
    }
    log::info!("Processed Quran {edition}: {} ayat", records.len());

    records
}

fn parse_line(line: &str, edition: &str) -> Option<VerseRecord> {
    let parts: Vec<&str> = line.splitn(3, '|').collect();
    let [surah, ayah, text] = parts.as_slice() else {
        return None;
    };

    let surah: u32 = surah.trim().parse().ok().filter(|n| *n > 0)?;
    let ayah: u32 = ayah.trim().parse().ok().filter(|n| *n > 0)?;
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    Some(VerseRecord::new(
        Tradition::Islam,
        surah.to_string(),
        surah,
        ayah,
        text,
        LANG,
        edition,
    ))
}

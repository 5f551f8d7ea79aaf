//! Verse records and the on-disk metadata table.
//!
//! The metadata table is a CSV file with one row per verse. Row order is the
//! contract shared with the embeddings and index files: row `i` of the table
//! is row `i` of both vector files, and each row also carries its `row_id`
//! so drift can be detected instead of silently trusted.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::semantic::clean_text;

/// Known columns, in the order they are written.
const CSV_HEADERS: [&str; 9] = [
    "row_id",
    "tradition",
    "book",
    "chapter",
    "verse",
    "text",
    "clean_text",
    "lang",
    "source",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tradition {
    Christianity,
    Islam,
    Hinduism,
}

impl Tradition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tradition::Christianity => "Christianity",
            Tradition::Islam => "Islam",
            Tradition::Hinduism => "Hinduism",
        }
    }
}

impl std::fmt::Display for Tradition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Tradition {
    type Err = TableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Christianity" => Ok(Tradition::Christianity),
            "Islam" => Ok(Tradition::Islam),
            "Hinduism" => Ok(Tradition::Hinduism),
            other => Err(TableError::InvalidValue {
                column: "tradition",
                value: other.to_string(),
            }),
        }
    }
}

/// One verse of scripture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerseRecord {
    /// Stable row identifier, dense from 0 in source order.
    pub row_id: u64,
    pub tradition: Tradition,
    pub book: String,
    pub chapter: u32,
    pub verse: u32,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clean_text: Option<String>,
    pub lang: String,
    pub source: String,
}

impl VerseRecord {
    /// Builds a record straight out of a parser. `row_id` is assigned later
    /// by [`VerseTable::from_records`].
    pub fn new(
        tradition: Tradition,
        book: impl Into<String>,
        chapter: u32,
        verse: u32,
        text: impl Into<String>,
        lang: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            row_id: 0,
            tradition,
            book: book.into(),
            chapter,
            verse,
            text: text.into(),
            clean_text: None,
            lang: lang.into(),
            source: source.into(),
        }
    }

    /// Text to show for this verse: cleaned text when available.
    pub fn display_text(&self) -> &str {
        match self.clean_text.as_deref() {
            Some(clean) if !clean.is_empty() => clean,
            _ => &self.text,
        }
    }

    /// Text fed to the encoder.
    pub fn embedding_text(&self) -> String {
        match &self.clean_text {
            Some(clean) => clean.clone(),
            None => clean_text(&self.text),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("missing column '{0}' in metadata table")]
    MissingColumn(&'static str),

    #[error("invalid value {value:?} in column '{column}'")]
    InvalidValue { column: &'static str, value: String },

    #[error("row {row} has {got} extra fields, table declares {expected}")]
    ExtraFieldCount {
        row: usize,
        expected: usize,
        got: usize,
    },
}

/// Ordered verse table.
///
/// Columns that are not part of the verse schema (enrichment output such as
/// sentiment scores or keyword lists) are kept per row and written back in
/// place, so a table survives a load/save cycle without losing them.
#[derive(Debug, Clone, Default)]
pub struct VerseTable {
    rows: Vec<VerseRecord>,
    extra_headers: Vec<String>,
    extra_values: Vec<Vec<String>>,
}

impl VerseTable {
    /// Assigns dense row ids in the given order.
    pub fn from_records(records: Vec<VerseRecord>) -> Self {
        let rows: Vec<VerseRecord> = records
            .into_iter()
            .enumerate()
            .map(|(idx, mut record)| {
                record.row_id = idx as u64;
                record
            })
            .collect();

        let duplicates = count_duplicate_keys(&rows);
        if duplicates > 0 {
            log::warn!("{duplicates} verse records share a (tradition, book, chapter, verse) key");
        }

        let extra_values = vec![Vec::new(); rows.len()];
        Self {
            rows,
            extra_headers: Vec::new(),
            extra_values,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&VerseRecord> {
        self.rows.get(position)
    }

    pub fn rows(&self) -> &[VerseRecord] {
        &self.rows
    }

    pub fn extra_headers(&self) -> &[String] {
        &self.extra_headers
    }

    /// Number of distinct book names.
    pub fn book_count(&self) -> usize {
        self.rows
            .iter()
            .map(|r| r.book.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    /// Fills `clean_text` for every row. Only derived data changes, so row
    /// order and ids are untouched.
    pub fn normalize(&mut self) {
        for row in &mut self.rows {
            row.clean_text = Some(clean_text(&row.text));
        }
    }

    /// Texts to embed, co-indexed with the rows.
    pub fn embedding_texts(&self) -> Vec<String> {
        self.rows.iter().map(VerseRecord::embedding_text).collect()
    }

    pub fn load(path: &Path) -> Result<Self, TableError> {
        let now = Instant::now();
        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.clone();

        let column = |name: &'static str| -> Result<usize, TableError> {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or(TableError::MissingColumn(name))
        };

        let row_id_col = column("row_id")?;
        let tradition_col = column("tradition")?;
        let book_col = column("book")?;
        let chapter_col = column("chapter")?;
        let verse_col = column("verse")?;
        let text_col = column("text")?;
        let clean_col = headers.iter().position(|h| h == "clean_text");
        let lang_col = headers.iter().position(|h| h == "lang");
        let source_col = headers.iter().position(|h| h == "source");

        let extra_cols: Vec<usize> = headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !CSV_HEADERS.contains(h))
            .map(|(idx, _)| idx)
            .collect();
        let extra_headers: Vec<String> = extra_cols
            .iter()
            .map(|&idx| headers[idx].to_string())
            .collect();

        let mut rows = vec![];
        let mut extra_values = vec![];
        for record in reader.records() {
            let record = record?;
            let field = |idx: usize| record.get(idx).unwrap_or_default();

            let clean_text = clean_col.map(field).filter(|s| !s.is_empty());
            rows.push(VerseRecord {
                row_id: parse_number(field(row_id_col), "row_id")?,
                tradition: field(tradition_col).parse()?,
                book: field(book_col).to_string(),
                chapter: parse_number(field(chapter_col), "chapter")?,
                verse: parse_number(field(verse_col), "verse")?,
                text: field(text_col).to_string(),
                clean_text: clean_text.map(str::to_string),
                lang: lang_col.map(field).unwrap_or_default().to_string(),
                source: source_col.map(field).unwrap_or_default().to_string(),
            });
            extra_values.push(extra_cols.iter().map(|&idx| field(idx).to_string()).collect());
        }

        log::debug!(
            "took {}ms to read {} rows from {}",
            now.elapsed().as_micros() as f64 / 1000.0,
            rows.len(),
            path.display()
        );

        Ok(Self {
            rows,
            extra_headers,
            extra_values,
        })
    }

    /// Writes the table through a temp file and renames it into place.
    pub fn save(&self, path: &Path) -> Result<(), TableError> {
        let temp_path = temp_path_for(path);
        let result = self.write_to(&temp_path);
        if let Err(err) = result {
            let _ = std::fs::remove_file(&temp_path);
            return Err(err);
        }
        std::fs::rename(&temp_path, path)?;
        Ok(())
    }

    fn write_to(&self, path: &Path) -> Result<(), TableError> {
        let mut writer = csv::Writer::from_path(path)?;

        let headers: Vec<&str> = CSV_HEADERS
            .iter()
            .copied()
            .chain(self.extra_headers.iter().map(String::as_str))
            .collect();
        writer.write_record(&headers)?;

        for (idx, row) in self.rows.iter().enumerate() {
            let extras = self.extra_values.get(idx).map(Vec::as_slice).unwrap_or(&[]);
            if extras.len() != self.extra_headers.len() {
                return Err(TableError::ExtraFieldCount {
                    row: idx,
                    expected: self.extra_headers.len(),
                    got: extras.len(),
                });
            }

            let mut fields = vec![
                row.row_id.to_string(),
                row.tradition.to_string(),
                row.book.clone(),
                row.chapter.to_string(),
                row.verse.to_string(),
                row.text.clone(),
                row.clean_text.clone().unwrap_or_default(),
                row.lang.clone(),
                row.source.clone(),
            ];
            fields.extend(extras.iter().cloned());
            writer.write_record(&fields)?;
        }

        writer.flush()?;
        Ok(())
    }
}

/// Sibling temp path used for atomic publishes.
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push("-tmp");
    path.with_file_name(name)
}

/// Loads a table, mapping a missing file to a clearer error.
pub fn load_existing(path: &Path) -> Result<VerseTable, TableError> {
    if let Err(err) = std::fs::metadata(path) {
        return match err.kind() {
            ErrorKind::NotFound => Err(TableError::Io(std::io::Error::new(
                ErrorKind::NotFound,
                format!("metadata table {} does not exist, run ingest first", path.display()),
            ))),
            _ => Err(err.into()),
        };
    }
    VerseTable::load(path)
}

fn parse_number<T: std::str::FromStr>(value: &str, column: &'static str) -> Result<T, TableError> {
    value.trim().parse().map_err(|_| TableError::InvalidValue {
        column,
        value: value.to_string(),
    })
}

fn count_duplicate_keys(rows: &[VerseRecord]) -> usize {
    let mut seen = HashSet::with_capacity(rows.len());
    rows.iter()
        .filter(|r| !seen.insert((r.tradition, r.book.as_str(), r.chapter, r.verse)))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(book: &str, chapter: u32, verse: u32, text: &str) -> VerseRecord {
        VerseRecord::new(Tradition::Christianity, book, chapter, verse, text, "EN", "KJV")
    }

    #[test]
    fn test_from_records_assigns_dense_row_ids() {
        let table = VerseTable::from_records(vec![
            record("Genesis", 1, 1, "a"),
            record("Genesis", 1, 2, "b"),
            record("Exodus", 1, 1, "c"),
        ]);

        let ids: Vec<u64> = table.rows().iter().map(|r| r.row_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(table.book_count(), 2);
    }

    #[test]
    fn test_normalize_fills_clean_text() {
        let mut table = VerseTable::from_records(vec![record("Genesis", 1, 1, "In the [note] beginning")]);
        assert!(table.get(0).unwrap().clean_text.is_none());

        table.normalize();
        assert_eq!(table.get(0).unwrap().clean_text.as_deref(), Some("In the beginning"));
    }

    #[test]
    fn test_display_text_prefers_clean_text() {
        let mut r = record("Genesis", 1, 1, "raw  text");
        assert_eq!(r.display_text(), "raw  text");

        r.clean_text = Some(String::new());
        assert_eq!(r.display_text(), "raw  text");

        r.clean_text = Some("raw text".to_string());
        assert_eq!(r.display_text(), "raw text");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bible_metadata.csv");

        let mut table = VerseTable::from_records(vec![
            record("Genesis", 1, 1, "In the beginning, God created"),
            record("1 Samuel", 2, 3, "Talk no more so \"exceeding\" proudly"),
        ]);
        table.normalize();
        table.save(&path).unwrap();

        assert!(!temp_path_for(&path).exists());

        let loaded = VerseTable::load(&path).unwrap();
        assert_eq!(loaded.rows(), table.rows());
    }

    #[test]
    fn test_tolerates_enrichment_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quran_english_metadata.csv");
        std::fs::write(
            &path,
            "row_id,tradition,book,chapter,verse,text,sentiment,lang,source,keywords\n\
             0,Islam,1,1,1,In the name of Allah,0.5,EN,Pickthall,\"name,allah\"\n\
             1,Islam,1,1,2,Praise be to Allah,0.8,EN,Pickthall,praise\n",
        )
        .unwrap();

        let table = VerseTable::load(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.extra_headers(), &["sentiment".to_string(), "keywords".to_string()]);
        assert_eq!(table.get(1).unwrap().verse, 2);
        assert!(table.get(1).unwrap().clean_text.is_none());

        let out = dir.path().join("roundtrip.csv");
        table.save(&out).unwrap();
        let written = std::fs::read_to_string(&out).unwrap();
        assert!(written.contains("In the name of Allah,,EN,Pickthall,0.5,\"name,allah\""));
        assert!(written.contains("Praise be to Allah,,EN,Pickthall,0.8,praise"));

        let reloaded = VerseTable::load(&out).unwrap();
        assert_eq!(reloaded.extra_headers(), table.extra_headers());
        assert_eq!(reloaded.rows(), table.rows());
    }

    #[test]
    fn test_missing_column_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.csv");
        std::fs::write(&path, "row_id,book,chapter,verse,text\n0,Genesis,1,1,x\n").unwrap();

        let result = VerseTable::load(&path);
        assert!(matches!(result, Err(TableError::MissingColumn("tradition"))));
    }

    #[test]
    fn test_load_existing_reports_missing_table() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_existing(&dir.path().join("nope.csv")).unwrap_err();
        assert!(err.to_string().contains("run ingest first"));
    }

    #[test]
    fn test_duplicate_keys_are_counted() {
        let rows = vec![
            record("Genesis", 1, 1, "a"),
            record("Genesis", 1, 1, "b"),
            record("Genesis", 1, 2, "c"),
        ];
        assert_eq!(count_duplicate_keys(&rows), 1);
    }
}

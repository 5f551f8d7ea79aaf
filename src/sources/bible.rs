//! Project Gutenberg KJV parser.
//!
//! The source is line oriented: everything before `*** START OF` is license
//! boilerplate, book titles sit on their own line, and verses look like
//! `1:1 In the beginning...` with prose wrapping onto following lines.
//!
//! Parsing is split into a pure line classifier ([`classify`]) and a small
//! state machine ([`BibleParser`]) that owns the verse accumulator.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::verses::{Tradition, VerseRecord};

pub const LANG: &str = "EN";
pub const SOURCE: &str = "KJV";

static START_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\*\*\* START OF").unwrap());
static END_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\*\*\* END OF").unwrap());
static VERSE_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+):(\d+)\s+(.*)$").unwrap());

/// Book titles as printed in the Gutenberg KJV, mapped to canonical names.
pub const BOOK_TITLES: [(&str, &str); 66] = [
    // Old Testament
    ("The First Book of Moses: Called Genesis", "Genesis"),
    ("The Second Book of Moses: Called Exodus", "Exodus"),
    ("The Third Book of Moses: Called Leviticus", "Leviticus"),
    ("The Fourth Book of Moses: Called Numbers", "Numbers"),
    ("The Fifth Book of Moses: Called Deuteronomy", "Deuteronomy"),
    ("The Book of Joshua", "Joshua"),
    ("The Book of Judges", "Judges"),
    ("The Book of Ruth", "Ruth"),
    ("The First Book of Samuel", "1 Samuel"),
    ("The Second Book of Samuel", "2 Samuel"),
    ("The First Book of the Kings", "1 Kings"),
    ("The Second Book of the Kings", "2 Kings"),
    ("The First Book of the Chronicles", "1 Chronicles"),
    ("The Second Book of the Chronicles", "2 Chronicles"),
    ("Ezra", "Ezra"),
    ("The Book of Nehemiah", "Nehemiah"),
    ("The Book of Esther", "Esther"),
    ("The Book of Job", "Job"),
    ("The Book of Psalms", "Psalms"),
    ("The Proverbs", "Proverbs"),
    ("Ecclesiastes", "Ecclesiastes"),
    ("The Song of Solomon", "Song of Solomon"),
    ("The Book of the Prophet Isaiah", "Isaiah"),
    ("The Book of the Prophet Jeremiah", "Jeremiah"),
    ("The Lamentations of Jeremiah", "Lamentations"),
    ("The Book of the Prophet Ezekiel", "Ezekiel"),
    ("The Book of Daniel", "Daniel"),
    ("Hosea", "Hosea"),
    ("Joel", "Joel"),
    ("Amos", "Amos"),
    ("Obadiah", "Obadiah"),
    ("Jonah", "Jonah"),
    ("Micah", "Micah"),
    ("Nahum", "Nahum"),
    ("Habakkuk", "Habakkuk"),
    ("Zephaniah", "Zephaniah"),
    ("Haggai", "Haggai"),
    ("Zechariah", "Zechariah"),
    ("Malachi", "Malachi"),
    // New Testament
    ("The Gospel According to Saint Matthew", "Matthew"),
    ("The Gospel According to Saint Mark", "Mark"),
    ("The Gospel According to Saint Luke", "Luke"),
    ("The Gospel According to Saint John", "John"),
    ("The Acts of the Apostles", "Acts"),
    ("The Epistle of Paul the Apostle to the Romans", "Romans"),
    ("The First Epistle of Paul the Apostle to the Corinthians", "1 Corinthians"),
    ("The Second Epistle of Paul the Apostle to the Corinthians", "2 Corinthians"),
    ("The Epistle of Paul the Apostle to the Galatians", "Galatians"),
    ("The Epistle of Paul the Apostle to the Ephesians", "Ephesians"),
    ("The Epistle of Paul the Apostle to the Philippians", "Philippians"),
    ("The Epistle of Paul the Apostle to the Colossians", "Colossians"),
    ("The First Epistle of Paul the Apostle to the Thessalonians", "1 Thessalonians"),
    ("The Second Epistle of Paul the Apostle to the Thessalonians", "2 Thessalonians"),
    ("The First Epistle of Paul the Apostle to Timothy", "1 Timothy"),
    ("The Second Epistle of Paul the Apostle to Timothy", "2 Timothy"),
    ("The Epistle of Paul the Apostle to Titus", "Titus"),
    ("The Epistle of Paul the Apostle to Philemon", "Philemon"),
    ("The Epistle of Paul the Apostle to the Hebrews", "Hebrews"),
    ("The General Epistle of James", "James"),
    ("The First Epistle General of Peter", "1 Peter"),
    ("The Second General Epistle of Peter", "2 Peter"),
    ("The First Epistle General of John", "1 John"),
    ("The Second Epistle General of John", "2 John"),
    ("The Third Epistle General of John", "3 John"),
    ("The General Epistle of Jude", "Jude"),
    ("The Revelation of Saint John the Divine", "Revelation"),
];

static BOOK_LOOKUP: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| BOOK_TITLES.iter().copied().collect());

/// Canonical book name for an exact title line.
pub fn canonical_book(title: &str) -> Option<&'static str> {
    BOOK_LOOKUP.get(title).copied()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    BeforeStart,
    InBody,
    Done,
}

/// What a single trimmed line means to the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line<'a> {
    Blank,
    StartMarker,
    EndMarker,
    BookTitle(&'static str),
    Verse {
        chapter: u32,
        verse: u32,
        text: &'a str,
    },
    Text(&'a str),
}

/// Classify a trimmed line. End markers win over every other body pattern.
pub fn classify(line: &str) -> Line<'_> {
    if line.is_empty() {
        return Line::Blank;
    }
    if START_MARKER.is_match(line) {
        return Line::StartMarker;
    }
    if END_MARKER.is_match(line) {
        return Line::EndMarker;
    }
    if let Some(book) = canonical_book(line) {
        return Line::BookTitle(book);
    }
    if let Some(caps) = VERSE_LINE.captures(line) {
        let chapter = caps.get(1).and_then(|m| m.as_str().parse().ok());
        let verse = caps.get(2).and_then(|m| m.as_str().parse().ok());
        if let (Some(chapter), Some(verse)) = (chapter, verse) {
            let text = caps.get(3).map(|m| m.as_str().trim()).unwrap_or_default();
            return Line::Verse {
                chapter,
                verse,
                text,
            };
        }
    }
    Line::Text(line)
}

#[derive(Debug)]
struct PendingVerse {
    chapter: u32,
    verse: u32,
    lines: Vec<String>,
}

/// Streaming parser state.
#[derive(Debug)]
pub struct BibleParser {
    state: ParserState,
    book: Option<&'static str>,
    pending: Option<PendingVerse>,
    records: Vec<VerseRecord>,
}

impl Default for BibleParser {
    fn default() -> Self {
        Self::new()
    }
}

impl BibleParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::BeforeStart,
            book: None,
            pending: None,
            records: Vec::new(),
        }
    }

    /// Feed one raw line. Returns the state after the transition.
    pub fn feed(&mut self, raw: &str) -> ParserState {
        let line = classify(raw.trim());

        match self.state {
            ParserState::BeforeStart => {
                if line == Line::StartMarker {
                    self.state = ParserState::InBody;
                }
            }
            ParserState::InBody => match line {
                Line::EndMarker => {
                    self.flush();
                    self.state = ParserState::Done;
                }
                Line::BookTitle(book) => {
                    self.flush();
                    self.book = Some(book);
                }
                Line::Verse {
                    chapter,
                    verse,
                    text,
                } => {
                    self.flush();
                    self.pending = Some(PendingVerse {
                        chapter,
                        verse,
                        lines: vec![text.to_string()],
                    });
                }
                Line::Text(text) => {
                    if let Some(pending) = self.pending.as_mut() {
                        pending.lines.push(text.to_string());
                    }
                }
                // A repeated start marker inside the body is just prose.
                Line::StartMarker => {
                    if let Some(pending) = self.pending.as_mut() {
                        pending.lines.push(raw.trim().to_string());
                    }
                }
                Line::Blank => {}
            },
            ParserState::Done => {}
        }

        self.state
    }

    /// Flush whatever is pending and return the committed records.
    pub fn finish(mut self) -> Vec<VerseRecord> {
        if self.state == ParserState::InBody {
            self.flush();
        }
        self.records
    }

    /// Commit the pending verse, if it belongs to a book and has text.
    fn flush(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        let Some(book) = self.book else {
            return;
        };

        let text = pending.lines.join(" ").trim().to_string();
        if text.is_empty() {
            return;
        }

        self.records.push(VerseRecord::new(
            Tradition::Christianity,
            book,
            pending.chapter,
            pending.verse,
            text,
            LANG,
            SOURCE,
        ));
    }
}

/// Parse a whole Gutenberg text.
pub fn parse_bible(input: &str) -> Vec<VerseRecord> {
    let mut parser = BibleParser::new();
    for line in input.lines() {
        if parser.feed(line) == ParserState::Done {
            break;
        }
    }
    parser.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
The Project Gutenberg eBook of The King James Bible
1:1 this verse-looking line is license text

*** START OF THE PROJECT GUTENBERG EBOOK THE KING JAMES BIBLE ***

The Old Testament of the King James Version of the Bible

The First Book of Moses: Called Genesis


1:1 In the beginning God created the heaven and the earth.

1:2 And the earth was without form, and void; and darkness was upon
the face of the deep. And the Spirit of God moved upon the face of the
waters.

1:3 And God said, Let there be light: and there was light.

The Second Book of Moses: Called Exodus

1:1 Now these are the names of the children of Israel, which came into
Egypt; every man and his household came with Jacob.

*** END OF THE PROJECT GUTENBERG EBOOK THE KING JAMES BIBLE ***

2:1 trailing text after the end marker
";

    #[test]
    fn test_parses_books_and_continuations() {
        let records = parse_bible(SAMPLE);
        assert_eq!(records.len(), 4);

        let keys: Vec<(&str, u32, u32)> = records
            .iter()
            .map(|r| (r.book.as_str(), r.chapter, r.verse))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("Genesis", 1, 1),
                ("Genesis", 1, 2),
                ("Genesis", 1, 3),
                ("Exodus", 1, 1),
            ]
        );

        assert_eq!(
            records[1].text,
            "And the earth was without form, and void; and darkness was upon \
             the face of the deep. And the Spirit of God moved upon the face of the \
             waters."
        );
        assert_eq!(
            records[3].text,
            "Now these are the names of the children of Israel, which came into \
             Egypt; every man and his household came with Jacob."
        );
        assert!(records.iter().all(|r| r.tradition == Tradition::Christianity));
        assert!(records.iter().all(|r| r.lang == "EN" && r.source == "KJV"));
    }

    #[test]
    fn test_verse_followed_by_book_header_commits_once() {
        let input = "\
*** START OF THE BOOK ***
The Book of Ruth
4:22 And Obed begat Jesse, and Jesse begat David.
The First Book of Samuel
1:1 Now there was a certain man of Ramathaimzophim.
";
        let records = parse_bible(input);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].book, "Ruth");
        assert_eq!((records[0].chapter, records[0].verse), (4, 22));
        assert_eq!(records[0].text, "And Obed begat Jesse, and Jesse begat David.");
        assert_eq!(records[1].book, "1 Samuel");
    }

    #[test]
    fn test_nothing_before_start_marker() {
        let input = "The Book of Ruth\n1:1 Now it came to pass\n";
        assert!(parse_bible(input).is_empty());
    }

    #[test]
    fn test_flushes_at_end_of_input_without_end_marker() {
        let input = "*** start of text ***\nJoel\n1:1 The word of the LORD\nthat came to Joel\n";
        let records = parse_bible(input);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text, "The word of the LORD that came to Joel");
    }

    #[test]
    fn test_verses_without_book_are_dropped() {
        let input = "*** START OF X ***\n1:1 Preface verse\nJonah\n1:1 Now the word of the LORD\n";
        let records = parse_bible(input);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].book, "Jonah");
    }

    #[test]
    fn test_text_before_first_verse_is_ignored() {
        let input = "*** START OF X ***\nAmos\nsome heading prose\n1:1 The words of Amos\n";
        let records = parse_bible(input);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text, "The words of Amos");
    }

    #[test]
    fn test_state_transitions() {
        let mut parser = BibleParser::new();
        assert_eq!(parser.feed("junk"), ParserState::BeforeStart);
        assert_eq!(parser.feed("*** START OF IT"), ParserState::InBody);
        assert_eq!(parser.feed("Micah"), ParserState::InBody);
        assert_eq!(parser.feed("1:1 The word"), ParserState::InBody);
        assert_eq!(parser.feed("*** END OF IT"), ParserState::Done);
        assert_eq!(parser.feed("1:2 ignored"), ParserState::Done);

        let records = parser.finish();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].book, "Micah");
        assert_eq!(records[0].text, "The word");
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(""), Line::Blank);
        assert_eq!(classify("*** END OF THE BOOK"), Line::EndMarker);
        assert_eq!(classify("The Proverbs"), Line::BookTitle("Proverbs"));
        assert_eq!(
            classify("3:16 For God so loved the world"),
            Line::Verse {
                chapter: 3,
                verse: 16,
                text: "For God so loved the world"
            }
        );
        assert_eq!(classify("3:16"), Line::Text("3:16"));
        assert_eq!(classify("Proverbs"), Line::Text("Proverbs"));
    }

    #[test]
    fn test_book_table_is_exhaustive() {
        assert_eq!(BOOK_LOOKUP.len(), 66);
        assert_eq!(canonical_book("The Revelation of Saint John the Divine"), Some("Revelation"));
        assert_eq!(canonical_book("Revelation"), None);
    }
}

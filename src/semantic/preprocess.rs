//! Text normalization applied before embedding.
//!
//! Steps, in order:
//! 1. Drop bracketed spans `[...]` (non-greedy, no nesting)
//! 2. Replace runs of non-ASCII characters with a single space
//! 3. Collapse whitespace runs to one space
//! 4. Trim both ends
//!
//! The transform is idempotent.

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

static BRACKETED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\]]+\]").unwrap());
static NON_ASCII: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\x00-\x7F]+").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Normalize raw verse text into its embedding form.
pub fn clean_text(text: &str) -> String {
    let text = BRACKETED.replace_all(text, "");
    let text = NON_ASCII.replace_all(&text, " ");
    let text = WHITESPACE.replace_all(&text, " ");
    text.trim().to_string()
}

/// Fingerprint of an ordered sequence of texts.
/// Recorded in the corpus manifest so a stale index can be spotted.
pub fn content_hash<'a, I>(texts: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut hasher = Sha256::new();
    for text in texts {
        hasher.update((text.len() as u64).to_le_bytes());
        hasher.update(text.as_bytes());
    }
    let digest: [u8; 32] = hasher.finalize().into();
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removes_bracketed_content() {
        assert_eq!(clean_text("a [note] b"), "a b");
        assert_eq!(clean_text("[Heading] text [x] and [y]"), "text and");
    }

    #[test]
    fn test_brackets_are_not_nested() {
        // The first `]` closes the span; the stray one stays.
        assert_eq!(clean_text("a [b [c] d] e"), "a d] e");
    }

    #[test]
    fn test_empty_brackets_are_kept() {
        assert_eq!(clean_text("a [] b"), "a [] b");
    }

    #[test]
    fn test_non_ascii_becomes_space() {
        assert_eq!(clean_text("God\u{2019}s word"), "God s word");
        assert_eq!(clean_text("Allah\u{fdfd} is"), "Allah is");
        assert_eq!(clean_text("k\u{1e5b}\u{1e63}\u{1e47}a"), "k a");
    }

    #[test]
    fn test_collapses_whitespace_and_trims() {
        assert_eq!(clean_text("  In the\tbeginning\n\nGod  "), "In the beginning God");
        assert_eq!(clean_text(""), "");
        assert_eq!(clean_text(" \t\n "), "");
    }

    #[test]
    fn test_idempotent() {
        let samples = [
            "a [note] b",
            "  spaced   out  ",
            "“Quoted” — dashes … and [brackets]",
            "[[double]] [open",
            "mixed [é] ü text\u{00a0}nbsp",
            "]close first [then open",
            "1:1 In the beginning God created the heaven and the earth.",
            "",
        ];
        for sample in samples {
            let once = clean_text(sample);
            assert_eq!(clean_text(&once), once, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn test_content_hash_is_order_sensitive() {
        let a = content_hash(["one", "two"]);
        let b = content_hash(["two", "one"]);
        let c = content_hash(["one", "two"]);
        assert_ne!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_content_hash_separates_boundaries() {
        assert_ne!(content_hash(["ab", "c"]), content_hash(["a", "bc"]));
    }
}

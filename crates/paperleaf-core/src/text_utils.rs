//! Text cleanup applied to extracted chapters before pagination.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

static SPLIT_APOSTROPHE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\w)'[ \t]+(t|s|m|d|ll|re|ve)\b").expect("valid apostrophe regex"));
static COLON_SPACING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":[ \t]+").expect("valid colon regex"));
static SENTENCE_SPACING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.[ \t]{2,}").expect("valid sentence spacing regex"));
static BLANK_RUNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").expect("valid blank run regex"));

/// Repair spacing artifacts left by XHTML-to-text conversion.
pub fn clean_text(raw: &str) -> String {
    let normalized: String = raw.replace("\r\n", "\n").nfc().collect();
    let text = SPLIT_APOSTROPHE.replace_all(&normalized, "$1'$2");
    let text = COLON_SPACING.replace_all(&text, ": ");
    let text = SENTENCE_SPACING.replace_all(&text, ". ");
    let text = BLANK_RUNS.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// First non-empty line, if short enough to stand in for a heading.
pub fn heading_candidate(text: &str) -> Option<String> {
    let line = text.lines().map(str::trim).find(|line| !line.is_empty())?;
    (line.chars().count() <= 100).then(|| line.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejoins_split_contractions() {
        assert_eq!(clean_text("don'  t panic, it' s fine"), "don't panic, it's fine");
        assert_eq!(clean_text("the readers' books"), "the readers' books");
    }

    #[test]
    fn collapses_blank_runs_and_sentence_gaps() {
        let cleaned = clean_text("One.   Two:\t three\n\n\n\n  \nFour\r\n");
        assert_eq!(cleaned, "One. Two: three\n\nFour");
    }

    #[test]
    fn composes_unicode() {
        assert_eq!(clean_text("Cafe\u{301}"), "Caf\u{e9}");
    }

    #[test]
    fn heading_candidate_skips_blank_lines_and_long_text() {
        assert_eq!(
            heading_candidate("\n\n  Chapter One \nBody"),
            Some("Chapter One".to_string())
        );
        assert_eq!(heading_candidate(&"x".repeat(120)), None);
        assert_eq!(heading_candidate("   \n"), None);
    }
}

//! Filesystem-safe file names for harvested records.

use regex::Regex;
use std::sync::OnceLock;

/// Maximum length of a sanitized file name (before the `.pdf` extension).
pub const MAX_FILENAME_LEN: usize = 200;

/// Number of title characters used in a derived file name.
const TITLE_CHARS: usize = 50;

/// Placeholder surname for records without authors.
const ANONYMOUS: &str = "anon";

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"))
}

fn disallowed_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^0-9A-Za-z_.\-]+").expect("valid regex"))
}

fn non_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\W+").expect("valid regex"))
}

/// Collapse whitespace to `_`, drop anything outside `[0-9A-Za-z_.-]` and
/// truncate to [`MAX_FILENAME_LEN`] characters.
pub fn sanitize_filename(s: &str) -> String {
    let underscored = whitespace_re().replace_all(s, "_");
    let cleaned = disallowed_re().replace_all(&underscored, "");
    // Only ASCII survives the filter, so byte and char counts agree.
    cleaned.chars().take(MAX_FILENAME_LEN).collect()
}

/// Build `{year}_{surname}_{short title}.pdf` for a record.
///
/// `surname` falls back to `anon` when empty; the year part is omitted when
/// unknown.
pub fn build_filename(year: Option<i32>, surname: &str, title: &str) -> String {
    let surname = surname.trim();
    let surname = if surname.is_empty() { ANONYMOUS } else { surname };

    let short: String = non_word_re()
        .replace_all(title, "_")
        .chars()
        .take(TITLE_CHARS)
        .collect();

    let base = match year {
        Some(y) => format!("{}_{}_{}", y, surname, short),
        None => format!("{}_{}", surname, short),
    };

    format!("{}.pdf", sanitize_filename(&base))
}

//! The common record shape every source normalizes into.

use crate::filename::build_filename;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of authors kept per record.
pub const MAX_AUTHORS: usize = 6;

/// Column order of the metadata table.
pub const METADATA_COLUMNS: &[&str] = &[
    "filename", "title", "authors", "year", "journal", "doi", "url", "abstract", "language",
];

/// Column order of the summary table.
pub const SUMMARY_COLUMNS: &[&str] = &[
    "filename", "objective", "methods", "main_findings", "relevance_notes",
];

/// Which source produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Crossref,
    Pubmed,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Crossref => write!(f, "crossref"),
            SourceKind::Pubmed => write!(f, "pubmed"),
        }
    }
}

/// A single author name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub given: String,
    pub family: String,
}

impl Author {
    pub fn new(given: impl Into<String>, family: impl Into<String>) -> Self {
        Self {
            given: given.into().trim().to_string(),
            family: family.into().trim().to_string(),
        }
    }

    /// "Given Family", skipping empty parts
    pub fn display_name(&self) -> String {
        format!("{} {}", self.given, self.family).trim().to_string()
    }

    /// Family name, or the last token of the display name if no family
    /// name was given.
    pub fn surname(&self) -> String {
        if !self.family.is_empty() {
            return self.family.clone();
        }
        self.given
            .split_whitespace()
            .last()
            .unwrap_or_default()
            .to_string()
    }
}

/// One bibliographic entry, normalized across sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiteratureRecord {
    /// Derived `.pdf` file name, the dedup key within a run
    pub filename: String,
    pub title: String,
    pub authors: Vec<Author>,
    pub year: Option<i32>,
    pub journal: String,
    pub doi: Option<String>,
    /// Landing page URL
    pub url: String,
    /// Direct PDF link, when the source advertises one
    pub pdf_url: Option<String>,
    pub abstract_text: String,
    pub language: String,
    pub source: SourceKind,
}

/// Source-agnostic fields collected by a normalizer before the file name
/// is derived.
#[derive(Debug, Clone, Default)]
pub struct RecordFields {
    pub title: String,
    pub authors: Vec<Author>,
    pub year: Option<i32>,
    pub journal: String,
    pub doi: Option<String>,
    pub url: String,
    pub pdf_url: Option<String>,
    pub abstract_text: String,
    pub language: String,
}

impl LiteratureRecord {
    /// Finish a record: cap the author list and derive the file name.
    pub fn new(source: SourceKind, fields: RecordFields) -> Self {
        let mut authors = fields.authors;
        authors.retain(|a| !a.display_name().is_empty());
        authors.truncate(MAX_AUTHORS);

        let surname = authors.first().map(Author::surname).unwrap_or_default();
        let filename = build_filename(fields.year, &surname, &fields.title);

        Self {
            filename,
            title: fields.title,
            authors,
            year: fields.year,
            journal: fields.journal,
            doi: fields.doi.filter(|d| !d.trim().is_empty()),
            url: fields.url,
            pdf_url: fields.pdf_url.filter(|u| !u.trim().is_empty()),
            abstract_text: fields.abstract_text,
            language: fields.language,
            source,
        }
    }

    /// Authors joined as `"Given Family; Given Family"`.
    pub fn authors_joined(&self) -> String {
        self.authors
            .iter()
            .map(Author::display_name)
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Direct PDF link if known, else the landing page, else empty.
    pub fn preferred_url(&self) -> &str {
        self.pdf_url.as_deref().unwrap_or(&self.url)
    }

    /// Row for the metadata table, in [`METADATA_COLUMNS`] order.
    pub fn metadata_row(&self) -> [String; 9] {
        [
            self.filename.clone(),
            self.title.clone(),
            self.authors_joined(),
            self.year.map(|y| y.to_string()).unwrap_or_default(),
            self.journal.clone(),
            self.doi.clone().unwrap_or_default(),
            self.preferred_url().to_string(),
            self.abstract_text.clone(),
            self.language.clone(),
        ]
    }

    /// Row for the summary table; the free-text columns start empty.
    pub fn summary_row(&self) -> [String; 5] {
        [
            self.filename.clone(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LiteratureRecord {
        LiteratureRecord::new(
            SourceKind::Crossref,
            RecordFields {
                title: "Foo Bar".to_string(),
                authors: vec![Author::new("Jane", "Smith"), Author::new("", "Doe")],
                year: Some(2020),
                journal: "Toxins".to_string(),
                doi: Some("10.1234/foo".to_string()),
                url: "https://doi.org/10.1234/foo".to_string(),
                pdf_url: None,
                abstract_text: String::new(),
                language: "en".to_string(),
            },
        )
    }

    #[test]
    fn test_new_derives_filename() {
        assert_eq!(sample().filename, "2020_Smith_Foo_Bar.pdf");
    }

    #[test]
    fn test_authors_joined() {
        assert_eq!(sample().authors_joined(), "Jane Smith; Doe");
    }

    #[test]
    fn test_authors_capped() {
        let authors = (0..10).map(|i| Author::new("A", format!("N{}", i))).collect();
        let record = LiteratureRecord::new(
            SourceKind::Pubmed,
            RecordFields {
                title: "T".to_string(),
                authors,
                ..Default::default()
            },
        );
        assert_eq!(record.authors.len(), MAX_AUTHORS);
        assert_eq!(record.filename, "N0_T.pdf");
    }

    #[test]
    fn test_preferred_url_prefers_pdf() {
        let mut record = sample();
        assert_eq!(record.preferred_url(), "https://doi.org/10.1234/foo");
        record.pdf_url = Some("https://example.org/foo.pdf".to_string());
        assert_eq!(record.preferred_url(), "https://example.org/foo.pdf");
    }

    #[test]
    fn test_surname_fallback() {
        assert_eq!(Author::new("John Q Public", "").surname(), "Public");
        assert_eq!(Author::default().surname(), "");
    }
}
